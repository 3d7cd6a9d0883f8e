//! Comprehension tracker.
//!
//! Thin coordination over the store: pull the caller's known-word set in,
//! then refresh every sentence's known/unknown counts. Invoked at review
//! session boundaries rather than during ingestion, which is why it lives
//! apart from the production manager. Holds no state of its own.

use std::collections::HashSet;

use tracing::debug;

use crate::corpus_db::CorpusDb;
use crate::error::Result;

/// Mark `known` words known and recompute per-sentence comprehension
/// counts. Words are only ever promoted to known, never demoted.
pub fn sync_known_words(db: &mut CorpusDb, known: &HashSet<String>) -> Result<()> {
    db.set_known(known)?;
    db.recompute_comprehension()?;
    debug!(words = known.len(), "known-word set synchronized");
    Ok(())
}
