//! Interface to the external word-segmentation collaborator.
//!
//! The engine never tokenizes Japanese itself; callers inject a
//! [`WordSegmenter`] (typically backed by a morphological analyzer). The
//! crate ships [`SpaceSegmenter`], a whitespace shim good enough for tests
//! and the demo CLI.

use std::collections::HashSet;

/// One token from the segmentation service.
#[derive(Debug, Clone)]
pub struct Token {
    pub surface: String,
    /// Dictionary (lemma) form; keywords are stored under this.
    pub dictionary_form: String,
    /// Part-of-speech tag chain, most general first (e.g. ["助詞", "格助詞"]).
    pub tags: Vec<String>,
    pub out_of_vocabulary: bool,
}

pub trait WordSegmenter: Send + Sync {
    fn segment(&self, text: &str) -> Vec<Token>;
}

/// Tags whose tokens are not content words: grammatical particles and
/// auxiliaries, symbols/punctuation, fillers, and proper nouns.
const EXCLUDED_TAGS: &[&str] = &[
    "助詞",
    "助動詞",
    "記号",
    "補助記号",
    "空白",
    "フィラー",
    "固有名詞",
];

fn is_content_token(token: &Token) -> bool {
    if token.out_of_vocabulary || token.dictionary_form.is_empty() {
        return false;
    }
    !token
        .tags
        .iter()
        .any(|t| EXCLUDED_TAGS.contains(&t.as_str()))
}

/// Distinct content words of `text`, in first-seen order. Distinctness
/// matters: the store records one keyword association per element, and
/// `total_words` must equal this list's length for the comprehension
/// bookkeeping to close.
pub fn content_words(segmenter: &dyn WordSegmenter, text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut words = Vec::new();
    for token in segmenter.segment(text) {
        if !is_content_token(&token) {
            continue;
        }
        if seen.insert(token.dictionary_form.clone()) {
            words.push(token.dictionary_form);
        }
    }
    words
}

/// Whitespace-based segmenter. Splits on spaces, strips surrounding
/// punctuation, and tags punctuation-only tokens as symbols. Real
/// deployments should inject an analyzer-backed implementation instead.
#[derive(Debug, Default, Clone, Copy)]
pub struct SpaceSegmenter;

impl WordSegmenter for SpaceSegmenter {
    fn segment(&self, text: &str) -> Vec<Token> {
        text.split_whitespace()
            .map(|raw| {
                let core: String = raw
                    .chars()
                    .filter(|c| c.is_alphanumeric() || crate::script::is_japanese(*c))
                    .collect();
                if core.is_empty() {
                    Token {
                        surface: raw.to_string(),
                        dictionary_form: String::new(),
                        tags: vec!["記号".to_string()],
                        out_of_vocabulary: false,
                    }
                } else {
                    Token {
                        surface: raw.to_string(),
                        dictionary_form: core,
                        tags: Vec::new(),
                        out_of_vocabulary: false,
                    }
                }
            })
            .collect()
    }
}
