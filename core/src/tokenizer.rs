use crate::config::IndexConfig;
use crate::model::TermPositions;
use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::{BTreeMap, HashSet};
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref RE: Regex = Regex::new(r"(?u)[\p{L}\p{N}][\p{L}\p{N}_']*").expect("valid regex");
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

fn is_stopword(token: &str) -> bool { STOPWORDS.contains(token.to_lowercase().as_str()) }

/// Applies the index's term normalization to a single token or query term.
///
/// Index-time and query-time terms both pass through here so they compare equal.
pub fn normalize_term(term: &str, config: &IndexConfig) -> Option<String> {
    let mut normalized = term.trim().nfkc().collect::<String>();
    if config.case_insensitive {
        normalized = normalized.to_lowercase();
    }
    if normalized.is_empty() {
        return None;
    }
    if config.stem {
        normalized = STEMMER.stem(&normalized).to_string();
    }
    Some(normalized)
}

/// Split text into raw (token, position) pairs. Positions count every token,
/// including dropped stop words, starting at `offset`. Terms are not yet
/// normalized; the index applies [`normalize_term`] when postings are written.
pub fn tokenize(text: &str, offset: u32, config: &IndexConfig) -> Vec<(String, u32)> {
    let normalized = text.nfkc().collect::<String>();
    let mut tokens = Vec::new();
    for (pos, mat) in RE.find_iter(&normalized).enumerate() {
        let token = mat.as_str();
        if config.remove_stopwords && is_stopword(token) { continue; }
        tokens.push((token.to_string(), offset + pos as u32));
    }
    tokens
}

/// Number of raw tokens in `text`, used to advance position offsets across fields.
pub fn token_count(text: &str) -> u32 {
    RE.find_iter(&text.nfkc().collect::<String>()).count() as u32
}

/// Groups (term, position) pairs into one entry per distinct term, positions in discovery order.
pub fn group_positions<I: IntoIterator<Item = (String, u32)>>(tokens: I) -> Vec<TermPositions> {
    let mut grouped: BTreeMap<String, Vec<u32>> = BTreeMap::new();
    for (term, pos) in tokens {
        grouped.entry(term).or_default().push(pos);
    }
    grouped.into_iter().map(|(term, positions)| TermPositions { term, positions }).collect()
}
