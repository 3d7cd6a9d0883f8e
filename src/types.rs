use serde::Serialize;

/// Numeric provenance tag identifying which source adapter produced a
/// sentence. Assigned monotonically from 1 by the source ledger.
pub type SourceTag = u32;

/// A raw sentence pulled from a source adapter, before quality evaluation.
#[derive(Debug, Clone, Serialize)]
pub struct Candidate {
    pub text: String,
    pub translation: Option<String>,
    /// Human-readable attribution (contributor name, license note).
    pub credit: Option<String>,
}

impl Candidate {
    pub fn new(text: impl Into<String>, translation: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            translation: Some(translation.into()),
            credit: None,
        }
    }
}

/// A stored example sentence as returned by retrieval.
#[derive(Debug, Clone, Serialize)]
pub struct Sentence {
    pub id: i64,
    pub text: String,
    pub translation: String,
    pub source_tag: SourceTag,
    /// Passed the extra quality tier at ingestion time.
    pub trusted: bool,
    pub credit: Option<String>,
    /// Cached distinct content-word count; ranking denominator.
    pub total_words: i64,
    pub known_words: i64,
    pub unknown_words: i64,
}

/// A fully-formed sentence plus its content-word set, ready for insertion.
/// Built by the production manager; the store is the only component that
/// turns these into rows.
#[derive(Debug, Clone)]
pub struct NewSentence {
    pub text: String,
    pub translation: String,
    pub source_tag: SourceTag,
    pub trusted: bool,
    pub credit: Option<String>,
    /// Distinct content words, as produced by the segmenter.
    pub content_words: Vec<String>,
}
