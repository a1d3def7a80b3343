use search_core::store::{id_key, KvStore, MemoryStore, Namespace};
use search_core::tokenizer::EnglishAnalyzer;
use search_core::{ChildFilter, FetchedPage, SearchIndex};
use std::collections::HashMap;
use std::sync::Arc;

fn page(title: &str, body: &str, links: &[&str]) -> FetchedPage {
    FetchedPage {
        links: links.iter().map(|l| l.to_string()).collect(),
        title: title.to_string(),
        last_modified: "Mon, 01 Jan 2024 00:00:00 +0000".to_string(),
        content_length: body.len() as u64,
        body_text: body.to_string(),
    }
}

fn open() -> (Arc<MemoryStore>, SearchIndex) {
    let store = Arc::new(MemoryStore::new());
    let index = SearchIndex::open(store.clone(), Arc::new(EnglishAnalyzer)).unwrap();
    (store, index)
}

fn stem(index: &SearchIndex, word: &str) -> String {
    index.analyzer().stem(word)
}

fn snapshot(store: &MemoryStore) -> HashMap<Namespace, Vec<(Vec<u8>, Vec<u8>)>> {
    Namespace::ALL
        .iter()
        .map(|ns| (*ns, store.scan_all(*ns).map(|kv| kv.unwrap()).collect()))
        .collect()
}

#[test]
fn index_page_writes_forward_meta_and_postings() {
    let (_store, index) = open();
    let url = "https://www.cse.ust.hk/a";
    let id = index.registry.page_id(url, true).unwrap().unwrap();
    let update = index
        .index_page(
            id,
            url,
            &page("Alpha page", "rainbow hkust rainbow rainbow", &["https://www.cse.ust.hk/b", url, "https://www.cse.ust.hk/b"]),
        )
        .unwrap();
    assert!(!update.purged);
    assert_eq!(update.keywords, 2);
    assert_eq!(update.children, 1);
    assert_eq!(update.max_tf, 3);

    let record = index.forward.get(id).unwrap().unwrap();
    assert_eq!(record.keywords, vec!["rainbow".to_string(), "hkust".to_string()]);
    assert_eq!(record.title_words, vec!["alpha".to_string(), "page".to_string()]);
    assert_eq!(index.forward.max_term_frequency(id).unwrap(), Some(3));

    let rainbow = index.registry.word_id("rainbow", false).unwrap().unwrap();
    assert_eq!(index.postings.positions(rainbow, id).unwrap(), Some(vec![0, 2, 3]));
    assert_eq!(index.postings.document_frequency(rainbow).unwrap(), 1);

    let meta = index.meta.get(id).unwrap().unwrap();
    assert_eq!(meta.url, url);
    assert_eq!(meta.fetch_count, 1);
    assert_eq!(index.page_count(), 1);

    assert_eq!(index.child_urls(id, ChildFilter::All).unwrap(), vec!["https://www.cse.ust.hk/b".to_string()]);
    assert!(index.child_urls(id, ChildFilter::Indexed).unwrap().is_empty());
    assert_eq!(index.child_urls(id, ChildFilter::Unindexed).unwrap().len(), 1);
    assert_eq!(index.keyword_frequencies(id).unwrap()[0], ("rainbow".to_string(), 3));
}

#[test]
fn frequencies_match_position_counts() {
    let (_store, index) = open();
    let bodies = ["alpha beta alpha gamma", "beta beta delta alpha", "gamma"];
    for (i, body) in bodies.iter().enumerate() {
        let url = format!("https://x.example/{i}");
        let id = index.registry.page_id(&url, true).unwrap().unwrap();
        index.index_page(id, &url, &page("", body, &[])).unwrap();
    }

    let mut per_page_freq: HashMap<u32, u32> = HashMap::new();
    let mut per_page_positions: HashMap<u32, usize> = HashMap::new();
    for item in index.postings.scan() {
        let (_, list) = item.unwrap();
        for (p, positions) in list.iter() {
            *per_page_freq.entry(p).or_default() += list.frequency(p).unwrap();
            *per_page_positions.entry(p).or_default() += positions.len();
        }
    }
    for (p, freq) in &per_page_freq {
        assert_eq!(*freq as usize, per_page_positions[p]);
    }
    assert_eq!(per_page_freq[&1], 4);
    assert_eq!(per_page_freq[&2], 4);
    assert_eq!(per_page_freq[&3], 1);
}

#[test]
fn reindexing_purges_previous_contribution() {
    let (_store, index) = open();
    let url = "https://x.example/p";
    let id = index.registry.page_id(url, true).unwrap().unwrap();
    index.index_page(id, url, &page("", "orange banana", &[])).unwrap();
    let orange = stem(&index, "orange");
    assert!(index.registry.word_id(&orange, false).unwrap().is_some());

    let update = index.index_page(id, url, &page("", "banana cherry", &[])).unwrap();
    assert!(update.purged);
    assert!(index.registry.word_id(&orange, false).unwrap().is_none());
    assert_eq!(index.meta.get(id).unwrap().unwrap().fetch_count, 2);
    let banana = index.registry.word_id("banana", false).unwrap().unwrap();
    assert_eq!(index.postings.positions(banana, id).unwrap(), Some(vec![0]));
}

#[test]
fn clear_page_is_idempotent() {
    let (store, index) = open();
    for (i, body) in ["shared alone", "shared other"].iter().enumerate() {
        let url = format!("https://x.example/{i}");
        let id = index.registry.page_id(&url, true).unwrap().unwrap();
        index.index_page(id, &url, &page("", body, &[])).unwrap();
    }

    assert!(index.clear_page(1).unwrap());
    let once = snapshot(&store);
    assert!(!index.clear_page(1).unwrap());
    assert_eq!(snapshot(&store), once);

    assert!(index.forward.get(1).unwrap().is_none());
    assert!(index.registry.word_id(&stem(&index, "alone"), false).unwrap().is_none());
    let shared = index.registry.word_id(&stem(&index, "shared"), false).unwrap().unwrap();
    assert_eq!(index.postings.pages(shared).unwrap(), Some(vec![2]));
}

#[test]
fn remove_page_drops_metadata_and_orphaned_words() {
    let (_store, index) = open();
    let url = "https://x.example/gone";
    let id = index.registry.page_id(url, true).unwrap().unwrap();
    index.index_page(id, url, &page("Gone", "ephemeral", &[])).unwrap();
    let word = index.registry.word_id(&stem(&index, "ephemeral"), false).unwrap().unwrap();

    assert!(index.remove_page(id).unwrap());
    assert!(index.meta.get(id).unwrap().is_none());
    assert_eq!(index.page_count(), 0);
    assert!(index.registry.word(word).is_none());
    assert!(index.postings.get(word).unwrap().is_none());
    // the URL keeps its ID
    assert_eq!(index.registry.page_id(url, false).unwrap(), Some(id));
    assert!(!index.remove_page(id).unwrap());
}

#[test]
fn derived_parents_only_cover_fetched_children() {
    let (_store, index) = open();
    let urls = ["https://x.example/a", "https://x.example/b"];
    let a = index.registry.page_id(urls[0], true).unwrap().unwrap();
    index
        .index_page(a, urls[0], &page("", "alpha", &[urls[1], "https://x.example/never"]))
        .unwrap();
    let b = index.registry.page_id(urls[1], true).unwrap().unwrap();
    index.index_page(b, urls[1], &page("", "beta", &[urls[0]])).unwrap();

    assert_eq!(index.derive_parent_links().unwrap(), 2);
    assert_eq!(index.parents.get(b).unwrap(), Some(vec![a]));
    assert_eq!(index.parents.get(a).unwrap(), Some(vec![b]));
    let never = index.registry.page_id("https://x.example/never", false).unwrap().unwrap();
    assert!(index.parents.get(never).unwrap().is_none());
    assert_eq!(index.parent_urls(b).unwrap(), vec![urls[0].to_string()]);
}

#[test]
fn doc_length_is_norm_of_term_weights() {
    let (_store, index) = open();
    for (i, body) in ["hkust", "hkust rainbow", "bravo"].iter().enumerate() {
        let url = format!("https://x.example/{i}");
        let id = index.registry.page_id(&url, true).unwrap().unwrap();
        index.index_page(id, &url, &page("", body, &[])).unwrap();
    }
    index.derive_doc_lengths().unwrap();

    let hkust_idf = (3.0f64 / 2.0).log2();
    let rainbow_idf = 3.0f64.log2();
    let len1 = index.doc_lengths.get(1).unwrap().unwrap();
    let len2 = index.doc_lengths.get(2).unwrap().unwrap();
    assert!((len1 - hkust_idf).abs() < 1e-12);
    assert!((len2 - (hkust_idf.powi(2) + rainbow_idf.powi(2)).sqrt()).abs() < 1e-12);
}

#[test]
fn sled_backed_index_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let index = SearchIndex::open_dir(dir.path()).unwrap();
        let url = "https://x.example/persist";
        let id = index.registry.page_id(url, true).unwrap().unwrap();
        index.index_page(id, url, &page("Kept", "durable words", &[])).unwrap();
        index.flush().unwrap();
    }
    let index = SearchIndex::open_dir(dir.path()).unwrap();
    assert_eq!(index.page_count(), 1);
    assert_eq!(index.registry.page_id("https://x.example/persist", false).unwrap(), Some(1));
    assert!(index.vocabulary().contains(&stem(&index, "durable")));
}

#[test]
fn clear_page_survives_a_corrupt_posting_list() {
    let (store, index) = open();
    let url = "https://x.example/corrupt";
    let id = index.registry.page_id(url, true).unwrap().unwrap();
    index.index_page(id, url, &page("", "alpha beta", &[])).unwrap();
    let alpha = index.registry.word_id(&stem(&index, "alpha"), false).unwrap().unwrap();
    let beta = index.registry.word_id(&stem(&index, "beta"), false).unwrap().unwrap();
    store.put(Namespace::Postings, &id_key(alpha), b"garbage").unwrap();

    assert!(index.clear_page(id).unwrap());
    assert!(index.postings.get(beta).unwrap().is_none());
    assert!(store.get(Namespace::Postings, &id_key(alpha)).unwrap().is_none());
    assert!(index.registry.word_id(&stem(&index, "alpha"), false).unwrap().is_none());
    assert!(index.forward.get(id).unwrap().is_none());

    let update = index.index_page(id, url, &page("", "gamma", &[])).unwrap();
    assert!(!update.purged);
    assert!(index.remove_page(id).unwrap());
}

#[test]
fn unreadable_forward_record_is_purged_by_scan() {
    let (store, index) = open();
    let urls = ["https://x.example/0", "https://x.example/1"];
    let ids: Vec<u32> = urls.iter().map(|u| index.registry.page_id(u, true).unwrap().unwrap()).collect();
    index.index_page(ids[0], urls[0], &page("", "alpha beta", &[])).unwrap();
    index.index_page(ids[1], urls[1], &page("", "alpha", &[])).unwrap();
    store.put(Namespace::Forward, &id_key(ids[0]), b"x").unwrap();

    assert!(index.clear_page(ids[0]).unwrap());
    let alpha = index.registry.word_id(&stem(&index, "alpha"), false).unwrap().unwrap();
    assert_eq!(index.postings.pages(alpha).unwrap(), Some(vec![ids[1]]));
    assert!(index.registry.word_id(&stem(&index, "beta"), false).unwrap().is_none());
    assert!(index.forward.get(ids[0]).unwrap().is_none());
}

#[test]
fn derivations_skip_corrupt_entries() {
    let (store, index) = open();
    let urls = ["https://x.example/0", "https://x.example/1", "https://x.example/2"];
    let ids: Vec<u32> = urls.iter().map(|u| index.registry.page_id(u, true).unwrap().unwrap()).collect();
    index.index_page(ids[0], urls[0], &page("", "hkust", &[urls[1]])).unwrap();
    index.index_page(ids[1], urls[1], &page("", "hkust rainbow", &[])).unwrap();
    index.index_page(ids[2], urls[2], &page("", "bravo", &[urls[0]])).unwrap();

    let rainbow = index.registry.word_id(&stem(&index, "rainbow"), false).unwrap().unwrap();
    store.put(Namespace::Postings, &id_key(rainbow), b"1:2:3").unwrap();
    store.put(Namespace::Forward, &id_key(ids[2]), b"x").unwrap();

    index.derive_parent_links().unwrap();
    assert_eq!(index.parents.get(ids[1]).unwrap(), Some(vec![ids[0]]));
    assert!(index.parents.get(ids[0]).unwrap().is_none());

    index.derive_doc_lengths().unwrap();
    let hkust_idf = (3.0f64 / 2.0).log2();
    assert!((index.doc_lengths.get(ids[0]).unwrap().unwrap() - hkust_idf).abs() < 1e-12);
    assert!((index.doc_lengths.get(ids[1]).unwrap().unwrap() - hkust_idf).abs() < 1e-12);
    assert!(index.doc_lengths.get(ids[2]).unwrap().is_none());
}
