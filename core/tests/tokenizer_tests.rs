use search_core::tokenizer::{keyword_stream, parse_query, Analyzer, EnglishAnalyzer, QueryTerm};

#[test]
fn it_normalizes_and_stems() {
    let words = keyword_stream(&EnglishAnalyzer, "Running Runners RUN! The café menu.");
    // Stemming to "run" should appear
    assert!(words.contains(&"run".to_string()));
    // NFKC + lowercase keeps the accented letter, punctuation is stripped
    assert!(words.contains(&EnglishAnalyzer.stem("café")));
    assert!(words.contains(&"menu".to_string()));
}

#[test]
fn it_filters_stopwords() {
    let words = keyword_stream(&EnglishAnalyzer, "The quick brown fox and the lazy dog");
    assert!(!words.contains(&"the".to_string()));
    assert!(!words.contains(&"and".to_string()));
    assert_eq!(words.len(), 5);
}

#[test]
fn short_and_numeric_tokens_are_not_meaningful() {
    let a = EnglishAnalyzer;
    assert!(!a.is_meaningful("x"));
    assert!(!a.is_meaningful("4190"));
    assert!(!a.is_meaningful("c3po"));
    assert!(a.is_meaningful("apples."));
    assert_eq!(a.stem("apples."), a.stem("apples"));
}

#[test]
fn positions_follow_the_filtered_stream() {
    let words = keyword_stream(&EnglishAnalyzer, "hong the kong of university");
    assert_eq!(words[0], "hong");
    assert_eq!(words[1], "kong");
}

#[test]
fn query_drops_meaningless_single_tokens_but_keeps_phrase_words() {
    let terms = parse_query(&EnglishAnalyzer, r#"a "the rainbow" x rainbow rainbow"#);
    assert_eq!(
        terms,
        vec![
            QueryTerm::Phrase(vec!["the".into(), "rainbow".into()]),
            QueryTerm::Word("rainbow".into()),
        ]
    );
}

#[test]
fn empty_query_has_no_terms() {
    assert!(parse_query(&EnglishAnalyzer, "   ").is_empty());
    assert!(parse_query(&EnglishAnalyzer, "the of and").is_empty());
}
