use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::HashSet;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref QUERY_UNIT: Regex = Regex::new(r#"([^"]\S*|".+?")\s*"#).expect("valid regex");
    static ref STEMMER: Stemmer = Stemmer::create(Algorithm::English);
    static ref STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "a","about","above","after","again","against","all","am","an","and","any","are","aren't","as","at",
            "be","because","been","before","being","below","between","both","but","by",
            "can","can't","cannot","could","couldn't",
            "did","didn't","do","does","doesn't","doing","don't","down","during",
            "each","few","for","from","further",
            "had","hadn't","has","hasn't","have","haven't","having","he","he'd","he'll","he's","her","here","here's","hers","herself","him","himself","his","how","how's",
            "i","i'd","i'll","i'm","i've","if","in","into","is","isn't","it","it's","its","itself",
            "let's","me","more","most","mustn't","my","myself",
            "no","nor","not","of","off","on","once","only","or","other","ought","our","ours","ourselves","out","over","own",
            "same","she","she'd","she'll","she's","should","shouldn't","so","some","such",
            "than","that","that's","the","their","theirs","them","themselves","then","there","there's","these","they","they'd","they'll","they're","they've","this","those","through","to","too",
            "under","until","up","very",
            "was","wasn't","we","we'd","we'll","we're","we've","were","weren't","what","what's","when","when's","where","where's","which","while","who","who's","whom","why","why's","with","won't","would","wouldn't",
            "you","you'd","you'll","you're","you've","your","yours","yourself","yourselves"
        ];
        words.iter().copied().collect()
    };
}

/// Decides which raw tokens are worth indexing and maps them to stems.
pub trait Analyzer: Send + Sync {
    fn is_meaningful(&self, token: &str) -> bool;
    fn stem(&self, token: &str) -> String;
}

/// English Porter2 stemming with the stop-word list above.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnglishAnalyzer;

/// NFKC, lowercase, and strip punctuation hugging the word ("apples." -> "apples").
fn normalize(token: &str) -> String {
    token
        .nfkc()
        .collect::<String>()
        .to_lowercase()
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_string()
}

impl Analyzer for EnglishAnalyzer {
    fn is_meaningful(&self, token: &str) -> bool {
        let word = normalize(token);
        word.chars().count() >= 2 && word.chars().all(char::is_alphabetic) && !STOPWORDS.contains(word.as_str())
    }

    fn stem(&self, token: &str) -> String {
        STEMMER.stem(&normalize(token)).into_owned()
    }
}

/// Whitespace-split `text`, keep meaningful tokens and stem them. The index of
/// a stem in the returned vector is its position in the page's keyword stream.
pub fn keyword_stream(analyzer: &dyn Analyzer, text: &str) -> Vec<String> {
    text.split_whitespace()
        .filter(|t| analyzer.is_meaningful(t))
        .map(|t| analyzer.stem(t))
        .collect()
}

/// One unit of a parsed query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryTerm {
    Word(String),
    /// Stems of a quoted multi-word phrase, in order.
    Phrase(Vec<String>),
}

impl QueryTerm {
    /// How many terms this unit contributes to the query vector length.
    pub fn width(&self) -> usize {
        match self {
            QueryTerm::Word(_) => 1,
            QueryTerm::Phrase(words) => words.len(),
        }
    }
}

/// Split a free-text query into stemmed words and quoted phrases.
///
/// Single tokens are dropped unless meaningful; phrase words are stemmed as
/// they are. Duplicates collapse onto their first occurrence.
pub fn parse_query(analyzer: &dyn Analyzer, query: &str) -> Vec<QueryTerm> {
    let mut terms: Vec<QueryTerm> = Vec::new();
    for caps in QUERY_UNIT.captures_iter(query) {
        let unit = caps[1].replace('"', "");
        let term = if unit.contains(' ') {
            let words: Vec<String> = unit.split_whitespace().map(|w| analyzer.stem(w)).collect();
            match words.len() {
                0 => continue,
                1 => QueryTerm::Word(words.into_iter().next().unwrap_or_default()),
                _ => QueryTerm::Phrase(words),
            }
        } else if analyzer.is_meaningful(&unit) {
            QueryTerm::Word(analyzer.stem(&unit))
        } else {
            continue;
        };
        if !terms.contains(&term) {
            terms.push(term);
        }
    }
    terms
}
