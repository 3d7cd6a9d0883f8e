//! Production manager: orchestrates source adapters under quota, quality,
//! and deduplication constraints.
//!
//! One `Producer` is one production session. Its seen-set is an optimization
//! only; correctness rests on the store's uniqueness check. Concurrent
//! callers should each own a `Producer` over a shared store.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};

use crate::corpus_db::CorpusDb;
use crate::error::{CorpusError, Result, SourceFailure};
use crate::ledger::SourceLedger;
use crate::quality::{self, Verdict};
use crate::segment::{self, WordSegmenter};
use crate::types::{Candidate, NewSentence, Sentence, SourceTag};

/// A lazily-pulled stream of candidates; an `Err` item is logged and treated
/// as exhaustion of the stream.
pub type CandidateStream<'a> =
    Box<dyn Iterator<Item = std::result::Result<Candidate, SourceFailure>> + 'a>;

/// Adapter that searches for a specific word.
pub trait TargetedSource: Send {
    fn stream<'a>(&'a self, word: &str) -> CandidateStream<'a>;
}

/// Adapter that streams an unordered bulk corpus; used for bootstrap.
pub trait BulkSource: Send {
    fn stream<'a>(&'a self) -> CandidateStream<'a>;
}

/// Capability-tagged adapter, dispatched explicitly rather than through an
/// inheritance chain.
pub enum SourceKind {
    Targeted(Box<dyn TargetedSource>),
    Bulk(Box<dyn BulkSource>),
}

struct RegisteredSource {
    tag: SourceTag,
    name: String,
    kind: SourceKind,
}

/// Abandon an adapter for a word once its reject count exceeds
/// `REJECT_SLOPE * pulls + REJECT_GRACE`. Empirically chosen constants,
/// tunable; they bound wasted work against sources that return near-random
/// results for some queries.
const REJECT_SLOPE: f64 = 0.8;
const REJECT_GRACE: f64 = 21.0;

fn breaker_tripped(pulls: u64, rejects: u64) -> bool {
    rejects as f64 > REJECT_SLOPE * pulls as f64 + REJECT_GRACE
}

#[derive(Debug, Clone)]
pub struct ProducerConfig {
    /// Bootstrap runs while the corpus holds fewer than half this many
    /// sentences.
    pub bootstrap_floor: usize,
    /// Per-word occurrence ceiling during bulk ingestion.
    pub ingest_ceiling: u64,
    /// Sentences per insert transaction during bootstrap.
    pub block_size: usize,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            bootstrap_floor: 3000,
            ingest_ceiling: 50,
            block_size: 50,
        }
    }
}

pub struct Producer {
    ledger: SourceLedger,
    sources: Vec<RegisteredSource>,
    seen: HashSet<String>,
    config: ProducerConfig,
    cancel: Arc<AtomicBool>,
}

impl Producer {
    pub fn new(ledger: SourceLedger, config: ProducerConfig) -> Self {
        Self {
            ledger,
            sources: Vec::new(),
            seen: HashSet::new(),
            config,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle for cooperative cancellation; checked between stream pulls and
    /// between insert blocks. Progress already committed is retained.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    pub fn register_targeted(
        &mut self,
        name: &str,
        license: &str,
        source: Box<dyn TargetedSource>,
    ) -> Result<SourceTag> {
        let tag = self.ledger.register(name, license)?;
        self.sources.push(RegisteredSource {
            tag,
            name: name.to_string(),
            kind: SourceKind::Targeted(source),
        });
        Ok(tag)
    }

    pub fn register_bulk(
        &mut self,
        name: &str,
        license: &str,
        source: Box<dyn BulkSource>,
    ) -> Result<SourceTag> {
        let tag = self.ledger.register(name, license)?;
        self.sources.push(RegisteredSource {
            tag,
            name: name.to_string(),
            kind: SourceKind::Bulk(source),
        });
        Ok(tag)
    }

    pub fn ledger(&self) -> &SourceLedger {
        &self.ledger
    }

    /// Produce up to the requested number of new sentences per word from the
    /// targeted adapters, in registration order. Returns only the newly
    /// inserted sentences; the store keeps whatever it already had.
    pub fn produce_for_words(
        &mut self,
        db: &mut CorpusDb,
        segmenter: &dyn WordSegmenter,
        requests: &HashMap<String, usize>,
    ) -> Result<HashMap<String, Vec<Sentence>>> {
        let mut words: Vec<&String> = requests.iter().filter(|(_, n)| **n > 0).map(|(w, _)| w).collect();
        words.sort();

        let mut remaining: HashMap<&String, usize> =
            words.iter().map(|w| (*w, requests[*w])).collect();
        let mut buffered: Vec<(String, NewSentence)> = Vec::new();

        'sources: for source in &self.sources {
            let SourceKind::Targeted(adapter) = &source.kind else {
                continue;
            };
            for word in &words {
                if remaining[*word] == 0 {
                    continue;
                }
                let mut pulls = 0u64;
                let mut rejects = 0u64;
                let mut stream = adapter.stream(word.as_str());
                while remaining[*word] > 0 {
                    if self.cancelled() {
                        break 'sources;
                    }
                    let candidate = match stream.next() {
                        None => break,
                        Some(Err(failure)) => {
                            warn!(source = %source.name, word = %word, error = %failure,
                                  "adapter failed; treating stream as exhausted");
                            break;
                        }
                        Some(Ok(candidate)) => candidate,
                    };
                    pulls += 1;
                    match quality::evaluate(&candidate, Some(word.as_str()), segmenter) {
                        Verdict::Reject(_) => {
                            rejects += 1;
                            if breaker_tripped(pulls, rejects) {
                                warn!(source = %source.name, word = %word, pulls, rejects,
                                      "abandoning adapter for word: reject rate too high");
                                break;
                            }
                        }
                        verdict => {
                            if self.seen.contains(&candidate.text) || db.exists(&candidate.text) {
                                continue;
                            }
                            let content_words =
                                segment::content_words(segmenter, &candidate.text);
                            let translation = candidate.translation.clone().unwrap_or_default();
                            self.seen.insert(candidate.text.clone());
                            buffered.push((
                                (*word).clone(),
                                NewSentence {
                                    text: candidate.text,
                                    translation,
                                    source_tag: source.tag,
                                    trusted: verdict == Verdict::HighQuality,
                                    credit: candidate.credit,
                                    content_words,
                                },
                            ));
                            if let Some(n) = remaining.get_mut(*word) {
                                *n -= 1;
                            }
                        }
                    }
                }
            }
        }

        let batch: Vec<NewSentence> = buffered.iter().map(|(_, s)| s.clone()).collect();
        let inserted = insert_with_retry(db, batch)?;
        let by_text: HashMap<&str, &Sentence> =
            inserted.iter().map(|s| (s.text.as_str(), s)).collect();

        let mut out: HashMap<String, Vec<Sentence>> = HashMap::new();
        for (word, sentence) in &buffered {
            if let Some(stored) = by_text.get(sentence.text.as_str()) {
                out.entry(word.clone()).or_default().push((*stored).clone());
            }
        }
        debug!(produced = inserted.len(), "production run complete");
        Ok(out)
    }

    /// Bootstrap the corpus from the bulk adapters when it is near-empty
    /// (below half the configured floor). Inserts in fixed-size blocks so a
    /// cancelled run keeps its committed progress. Returns the number of
    /// sentences inserted.
    pub fn bootstrap_if_empty(
        &mut self,
        db: &mut CorpusDb,
        segmenter: &dyn WordSegmenter,
    ) -> Result<usize> {
        if db.sentence_count() >= self.config.bootstrap_floor / 2 {
            return Ok(0);
        }
        let ceiling = self.config.ingest_ceiling;
        let block_size = self.config.block_size.max(1);
        let mut counts: HashMap<String, u64> = HashMap::new();
        let mut inserted_total = 0usize;

        'sources: for source in &self.sources {
            let SourceKind::Bulk(adapter) = &source.kind else {
                continue;
            };
            info!(source = %source.name, "bootstrap: streaming bulk source");
            let mut block: Vec<NewSentence> = Vec::with_capacity(block_size);
            let mut stream = adapter.stream();
            loop {
                if self.cancelled() {
                    break 'sources;
                }
                let candidate = match stream.next() {
                    None => break,
                    Some(Err(failure)) => {
                        warn!(source = %source.name, error = %failure,
                              "bulk adapter failed; treating stream as exhausted");
                        break;
                    }
                    Some(Ok(candidate)) => candidate,
                };
                let verdict = quality::evaluate(&candidate, None, segmenter);
                if !verdict.is_accepted() {
                    continue;
                }
                if self.seen.contains(&candidate.text) || db.exists(&candidate.text) {
                    continue;
                }
                let content_words = segment::content_words(segmenter, &candidate.text);

                let unseen: Vec<String> = content_words
                    .iter()
                    .filter(|w| !counts.contains_key(*w))
                    .cloned()
                    .collect();
                if !unseen.is_empty() {
                    for (word, count) in db.count_occurrences(&unseen, None)? {
                        counts.insert(word, count);
                    }
                }
                if content_words
                    .iter()
                    .all(|w| counts.get(w).copied().unwrap_or(0) >= ceiling)
                {
                    continue;
                }

                for word in &content_words {
                    *counts.entry(word.clone()).or_insert(0) += 1;
                }
                let translation = candidate.translation.clone().unwrap_or_default();
                self.seen.insert(candidate.text.clone());
                block.push(NewSentence {
                    text: candidate.text,
                    translation,
                    source_tag: source.tag,
                    trusted: verdict == Verdict::HighQuality,
                    credit: candidate.credit,
                    content_words,
                });
                if block.len() >= block_size {
                    inserted_total += insert_with_retry(db, std::mem::take(&mut block))?.len();
                    info!(inserted_total, "bootstrap progress");
                }
            }
            if !block.is_empty() {
                inserted_total += insert_with_retry(db, block)?.len();
            }
        }
        info!(inserted_total, "bootstrap finished");
        Ok(inserted_total)
    }
}

/// Insert a batch, recovering from a duplicate race with a single retry:
/// the named row plus every row that is meanwhile stored gets dropped first.
/// The duplicate error never escapes the production manager.
fn insert_with_retry(db: &mut CorpusDb, mut batch: Vec<NewSentence>) -> Result<Vec<Sentence>> {
    if batch.is_empty() {
        return Ok(Vec::new());
    }
    match db.insert_batch(&batch) {
        Ok(rows) => return Ok(rows),
        Err(CorpusError::DuplicateSentence { text }) => {
            warn!(%text, "dropping duplicate rows and retrying insert once");
            batch.retain(|s| s.text != text && !db.exists(&s.text));
        }
        Err(other) => return Err(other),
    }
    if batch.is_empty() {
        return Ok(Vec::new());
    }
    match db.insert_batch(&batch) {
        Ok(rows) => Ok(rows),
        Err(CorpusError::DuplicateSentence { text }) => {
            warn!(%text, "retry still raced a duplicate; abandoning the batch");
            Ok(Vec::new())
        }
        Err(other) => Err(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::SpaceSegmenter;
    use std::sync::atomic::AtomicUsize;

    fn test_producer(config: ProducerConfig) -> (tempfile::TempDir, Producer) {
        let dir = tempfile::tempdir().unwrap();
        let ledger = SourceLedger::open(&dir.path().join("sources.ledger")).unwrap();
        (dir, Producer::new(ledger, config))
    }

    fn good_candidates(n: usize) -> Vec<Candidate> {
        (0..n)
            .map(|i| {
                Candidate::new(
                    format!("犬 が {i} 回 吠える。"),
                    format!("The dog barks {i} times."),
                )
            })
            .collect()
    }

    struct StaticSource {
        candidates: Vec<Candidate>,
        pulls: Arc<AtomicUsize>,
    }

    impl TargetedSource for StaticSource {
        fn stream<'a>(&'a self, _word: &str) -> CandidateStream<'a> {
            let pulls = Arc::clone(&self.pulls);
            Box::new(self.candidates.iter().map(move |c| {
                pulls.fetch_add(1, Ordering::Relaxed);
                Ok(c.clone())
            }))
        }
    }

    struct FailingSource;

    impl TargetedSource for FailingSource {
        fn stream<'a>(&'a self, _word: &str) -> CandidateStream<'a> {
            Box::new(std::iter::once(Err(SourceFailure::new("connection reset"))))
        }
    }

    struct StaticBulk {
        candidates: Vec<Candidate>,
    }

    impl BulkSource for StaticBulk {
        fn stream<'a>(&'a self) -> CandidateStream<'a> {
            Box::new(self.candidates.iter().cloned().map(Ok))
        }
    }

    #[test]
    fn production_respects_per_word_quota() {
        let mut db = CorpusDb::open_in_memory().unwrap();
        let (_dir, mut producer) = test_producer(ProducerConfig::default());
        producer
            .register_targeted(
                "static",
                "test",
                Box::new(StaticSource {
                    candidates: good_candidates(10),
                    pulls: Arc::new(AtomicUsize::new(0)),
                }),
            )
            .unwrap();

        let mut requests = HashMap::new();
        requests.insert("犬".to_string(), 3);
        let produced = producer
            .produce_for_words(&mut db, &SpaceSegmenter, &requests)
            .unwrap();
        assert_eq!(produced["犬"].len(), 3);
        assert_eq!(db.sentence_count(), 3);
        for sentence in &produced["犬"] {
            assert!(sentence.trusted);
            assert_eq!(sentence.source_tag, 1);
        }
    }

    #[test]
    fn circuit_breaker_trips_at_the_exact_threshold() {
        // All pulls reject, so rejects == pulls; the first n with
        // n > 0.8n + 21 is 106.
        assert!(!breaker_tripped(25, 25));
        assert!(!breaker_tripped(105, 105));
        assert!(breaker_tripped(106, 106));

        let mut db = CorpusDb::open_in_memory().unwrap();
        let (_dir, mut producer) = test_producer(ProducerConfig::default());
        let pulls = Arc::new(AtomicUsize::new(0));
        let junk: Vec<Candidate> = (0..500)
            .map(|i| Candidate::new(format!("junk {i}"), "irrelevant text"))
            .collect();
        producer
            .register_targeted(
                "noisy",
                "test",
                Box::new(StaticSource {
                    candidates: junk,
                    pulls: Arc::clone(&pulls),
                }),
            )
            .unwrap();

        let mut requests = HashMap::new();
        requests.insert("犬".to_string(), 1);
        let produced = producer
            .produce_for_words(&mut db, &SpaceSegmenter, &requests)
            .unwrap();
        assert!(produced.is_empty());
        assert_eq!(pulls.load(Ordering::Relaxed), 106);
        assert_eq!(db.sentence_count(), 0);
    }

    #[test]
    fn failing_adapter_does_not_abort_the_run() {
        let mut db = CorpusDb::open_in_memory().unwrap();
        let (_dir, mut producer) = test_producer(ProducerConfig::default());
        producer
            .register_targeted("flaky", "test", Box::new(FailingSource))
            .unwrap();
        producer
            .register_targeted(
                "static",
                "test",
                Box::new(StaticSource {
                    candidates: good_candidates(5),
                    pulls: Arc::new(AtomicUsize::new(0)),
                }),
            )
            .unwrap();

        let mut requests = HashMap::new();
        requests.insert("犬".to_string(), 2);
        let produced = producer
            .produce_for_words(&mut db, &SpaceSegmenter, &requests)
            .unwrap();
        assert_eq!(produced["犬"].len(), 2);
    }

    #[test]
    fn seen_set_and_store_dedupe_candidates() {
        let mut db = CorpusDb::open_in_memory().unwrap();
        let (_dir, mut producer) = test_producer(ProducerConfig::default());
        let mut candidates = good_candidates(1);
        candidates.push(candidates[0].clone());
        producer
            .register_targeted(
                "static",
                "test",
                Box::new(StaticSource {
                    candidates,
                    pulls: Arc::new(AtomicUsize::new(0)),
                }),
            )
            .unwrap();

        let mut requests = HashMap::new();
        requests.insert("犬".to_string(), 2);
        let produced = producer
            .produce_for_words(&mut db, &SpaceSegmenter, &requests)
            .unwrap();
        assert_eq!(produced["犬"].len(), 1);
        assert_eq!(db.sentence_count(), 1);
    }

    #[test]
    fn bootstrap_inserts_in_blocks() {
        let mut db = CorpusDb::open_in_memory().unwrap();
        let (_dir, mut producer) = test_producer(ProducerConfig {
            bootstrap_floor: 1000,
            ingest_ceiling: 1000,
            block_size: 50,
        });
        producer
            .register_bulk(
                "pairs",
                "test",
                Box::new(StaticBulk {
                    candidates: good_candidates(120),
                }),
            )
            .unwrap();

        let inserted = producer
            .bootstrap_if_empty(&mut db, &SpaceSegmenter)
            .unwrap();
        assert_eq!(inserted, 120);
        assert_eq!(db.sentence_count(), 120);
    }

    #[test]
    fn bootstrap_skips_when_corpus_is_large_enough() {
        let mut db = CorpusDb::open_in_memory().unwrap();
        db.insert_batch(&[NewSentence {
            text: "犬 が 好き です。".into(),
            translation: "I like dogs.".into(),
            source_tag: 1,
            trusted: true,
            credit: None,
            content_words: vec!["犬".into(), "が".into(), "好き".into(), "です".into()],
        }])
        .unwrap();
        let (_dir, mut producer) = test_producer(ProducerConfig {
            bootstrap_floor: 2,
            ..ProducerConfig::default()
        });
        producer
            .register_bulk(
                "pairs",
                "test",
                Box::new(StaticBulk {
                    candidates: good_candidates(10),
                }),
            )
            .unwrap();
        let inserted = producer
            .bootstrap_if_empty(&mut db, &SpaceSegmenter)
            .unwrap();
        assert_eq!(inserted, 0);
        assert_eq!(db.sentence_count(), 1);
    }

    #[test]
    fn bootstrap_ceiling_skips_saturated_candidates() {
        let mut db = CorpusDb::open_in_memory().unwrap();
        let (_dir, mut producer) = test_producer(ProducerConfig {
            bootstrap_floor: 1000,
            ingest_ceiling: 1,
            block_size: 50,
        });
        // Same word set, distinct texts: once every word meets the ceiling
        // the later candidates add nothing scarce.
        let candidates = vec![
            Candidate::new("犬 が 好き です。", "I like dogs."),
            Candidate::new("犬 が です 好き。", "I like dogs, scrambled."),
            Candidate::new("好き です 犬 が。", "Dogs I like."),
        ];
        producer
            .register_bulk("pairs", "test", Box::new(StaticBulk { candidates }))
            .unwrap();
        let inserted = producer
            .bootstrap_if_empty(&mut db, &SpaceSegmenter)
            .unwrap();
        assert_eq!(inserted, 1);
    }

    #[test]
    fn duplicate_race_is_dropped_and_retried() {
        let mut db = CorpusDb::open_in_memory().unwrap();
        let stored = NewSentence {
            text: "犬 が 好き です。".into(),
            translation: "I like dogs.".into(),
            source_tag: 1,
            trusted: true,
            credit: None,
            content_words: vec!["犬".into(), "が".into(), "好き".into(), "です".into()],
        };
        db.insert_batch(std::slice::from_ref(&stored)).unwrap();

        let fresh = NewSentence {
            text: "猫 が 好き です。".into(),
            translation: "I like cats.".into(),
            source_tag: 1,
            trusted: false,
            credit: None,
            content_words: vec!["猫".into(), "が".into(), "好き".into(), "です".into()],
        };
        let kept = insert_with_retry(&mut db, vec![stored, fresh]).unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].text, "猫 が 好き です。");
        assert_eq!(db.sentence_count(), 2);
    }

    #[test]
    fn several_duplicates_are_cleared_in_one_retry() {
        let mut db = CorpusDb::open_in_memory().unwrap();
        let make = |text: &str, translation: &str| NewSentence {
            text: text.into(),
            translation: translation.into(),
            source_tag: 1,
            trusted: false,
            credit: None,
            content_words: crate::segment::content_words(&SpaceSegmenter, text),
        };
        let first = make("犬 が 好き です。", "I like dogs.");
        let second = make("猫 が 好き です。", "I like cats.");
        db.insert_batch(&[first.clone(), second.clone()]).unwrap();

        // Two rows already stored by the race, one genuinely new; the single
        // retry must insert exactly the new one.
        let fresh = make("鳥 が 好き です。", "I like birds.");
        let kept = insert_with_retry(&mut db, vec![first, second, fresh]).unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].text, "鳥 が 好き です。");
        assert_eq!(db.sentence_count(), 3);
    }

    #[test]
    fn cancellation_stops_production_between_pulls() {
        let mut db = CorpusDb::open_in_memory().unwrap();
        let (_dir, mut producer) = test_producer(ProducerConfig::default());
        producer
            .register_targeted(
                "static",
                "test",
                Box::new(StaticSource {
                    candidates: good_candidates(10),
                    pulls: Arc::new(AtomicUsize::new(0)),
                }),
            )
            .unwrap();
        producer.cancel_handle().store(true, Ordering::Relaxed);

        let mut requests = HashMap::new();
        requests.insert("犬".to_string(), 5);
        let produced = producer
            .produce_for_words(&mut db, &SpaceSegmenter, &requests)
            .unwrap();
        assert!(produced.is_empty());
        assert_eq!(db.sentence_count(), 0);
    }
}
