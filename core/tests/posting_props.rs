use proptest::prelude::*;
use search_core::posting::PostingList;
use std::collections::BTreeMap;

fn lists() -> impl Strategy<Value = BTreeMap<u32, Vec<u32>>> {
    prop::collection::btree_map(1u32..10_000, prop::collection::btree_set(0u32..5_000, 0..20), 0..30)
        .prop_map(|m| m.into_iter().map(|(p, s)| (p, s.into_iter().collect())).collect())
}

proptest! {
    #[test]
    fn textual_form_survives_decoding(entries in lists()) {
        let mut list = PostingList::new();
        for (page, positions) in &entries {
            list.extend(*page, positions);
        }
        let decoded = PostingList::decode(&list.encode()).unwrap();
        prop_assert_eq!(&decoded, &list);
        prop_assert_eq!(decoded.len(), entries.values().filter(|p| !p.is_empty()).count());
        for (page, positions) in &entries {
            if positions.is_empty() {
                prop_assert_eq!(decoded.frequency(*page), None);
            } else {
                prop_assert_eq!(decoded.frequency(*page), Some(positions.len() as u32));
                prop_assert_eq!(decoded.positions(*page), Some(positions.as_slice()));
            }
        }
    }

    #[test]
    fn garbage_never_panics(text in "[0-9:, a-z]{0,40}") {
        let _ = PostingList::decode(&text);
    }
}
