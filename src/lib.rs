//! Example-sentence corpus engine.
//!
//! Pulls candidate sentences from pluggable sources, filters them through a
//! quality evaluator, stores the survivors in a relational corpus, and serves
//! them back ranked by estimated comprehensibility for each requested word.
//! [`engine::CorpusEngine`] is the surface most callers want.

pub mod adapters;
pub mod comprehension;
pub mod config_file;
pub mod corpus_db;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod production;
pub mod quality;
mod script;
pub mod segment;
pub mod types;

pub use engine::CorpusEngine;
pub use error::{CorpusError, Result};
pub use types::{Candidate, NewSentence, Sentence, SourceTag};
