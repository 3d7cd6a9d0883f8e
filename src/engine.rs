//! Top-level engine: the surface exposed to calling application code.
//!
//! Wires the corpus store, the production manager, and the injected word
//! segmenter together. One engine instance per caller; concurrent callers
//! open their own engines over the same store path.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use crate::comprehension;
use crate::config_file::{FileConfig, ledger_path_for};
use crate::corpus_db::CorpusDb;
use crate::error::Result;
use crate::ledger::SourceLedger;
use crate::production::{BulkSource, Producer, TargetedSource};
use crate::segment::WordSegmenter;
use crate::types::{Sentence, SourceTag};

pub struct CorpusEngine {
    db: CorpusDb,
    producer: Producer,
    segmenter: Box<dyn WordSegmenter>,
    config: FileConfig,
}

impl CorpusEngine {
    /// Open the store at `db_path` (ledger lives beside it) with the given
    /// configuration and segmentation collaborator.
    pub fn open(
        db_path: &Path,
        config: FileConfig,
        segmenter: Box<dyn WordSegmenter>,
    ) -> Result<Self> {
        let db = CorpusDb::open_or_create(db_path)?;
        let ledger = SourceLedger::open(&ledger_path_for(db_path))?;
        let producer = Producer::new(ledger, config.producer_config());
        Ok(Self {
            db,
            producer,
            segmenter,
            config,
        })
    }

    /// In-memory engine for tests.
    pub fn open_in_memory(
        ledger_path: &Path,
        config: FileConfig,
        segmenter: Box<dyn WordSegmenter>,
    ) -> Result<Self> {
        let db = CorpusDb::open_in_memory()?;
        let ledger = SourceLedger::open(ledger_path)?;
        let producer = Producer::new(ledger, config.producer_config());
        Ok(Self {
            db,
            producer,
            segmenter,
            config,
        })
    }

    pub fn register_targeted(
        &mut self,
        name: &str,
        license: &str,
        source: Box<dyn TargetedSource>,
    ) -> Result<SourceTag> {
        self.producer.register_targeted(name, license, source)
    }

    pub fn register_bulk(
        &mut self,
        name: &str,
        license: &str,
        source: Box<dyn BulkSource>,
    ) -> Result<SourceTag> {
        self.producer.register_bulk(name, license, source)
    }

    /// Ranked sentences per word. With `produce_new`, shortfalls are filled
    /// from the targeted adapters before answering; the result is capped at
    /// each word's requested count either way. Partial source failure means
    /// fewer sentences, never an error.
    pub fn get_sentences_for_words(
        &mut self,
        requests: &HashMap<String, usize>,
        produce_new: bool,
    ) -> Result<HashMap<String, Vec<Sentence>>> {
        let mut results = self.db.retrieve_ranked_many(requests)?;

        if produce_new {
            let mut shortfall: HashMap<String, usize> = HashMap::new();
            for (word, want) in requests {
                let have = results.get(word).map_or(0, Vec::len);
                if have < *want {
                    shortfall.insert(word.clone(), want - have);
                }
            }
            if !shortfall.is_empty() {
                let fresh = self.producer.produce_for_words(
                    &mut self.db,
                    self.segmenter.as_ref(),
                    &shortfall,
                )?;
                for (word, sentences) in fresh {
                    let want = requests.get(&word).copied().unwrap_or(0);
                    let entry = results.entry(word).or_default();
                    for sentence in sentences {
                        if entry.len() >= want {
                            break;
                        }
                        if entry.iter().all(|s| s.id != sentence.id) {
                            entry.push(sentence);
                        }
                    }
                }
            }
        }
        Ok(results)
    }

    pub fn count_occurrences(
        &self,
        words: &[String],
        min_comprehensibility: Option<f64>,
    ) -> Result<HashMap<String, u64>> {
        self.db.count_occurrences(words, min_comprehensibility)
    }

    /// Comprehension tracker entry point, called at review-session
    /// boundaries with the collaborator's current known-word set.
    pub fn update_known(&mut self, known_words: &HashSet<String>) -> Result<()> {
        comprehension::sync_known_words(&mut self.db, known_words)
    }

    /// Bootstrap from the bulk adapters when the corpus is near-empty.
    pub fn bootstrap_if_empty(&mut self) -> Result<usize> {
        self.producer
            .bootstrap_if_empty(&mut self.db, self.segmenter.as_ref())
    }

    pub fn sentence_count(&self) -> usize {
        self.db.sentence_count()
    }

    pub fn default_quota(&self) -> usize {
        self.config.default_quota
    }

    pub fn config(&self) -> &FileConfig {
        &self.config
    }

    pub fn ledger(&self) -> &SourceLedger {
        self.producer.ledger()
    }

    /// Cancellation handle for long-running production or bootstrap calls.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.producer.cancel_handle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::production::CandidateStream;
    use crate::segment::SpaceSegmenter;
    use crate::types::Candidate;

    struct StaticSource {
        candidates: Vec<Candidate>,
    }

    impl TargetedSource for StaticSource {
        fn stream<'a>(&'a self, _word: &str) -> CandidateStream<'a> {
            Box::new(self.candidates.iter().cloned().map(Ok))
        }
    }

    fn engine() -> (tempfile::TempDir, CorpusEngine) {
        let dir = tempfile::tempdir().unwrap();
        let engine = CorpusEngine::open_in_memory(
            &dir.path().join("sources.ledger"),
            FileConfig::default(),
            Box::new(SpaceSegmenter),
        )
        .unwrap();
        (dir, engine)
    }

    #[test]
    fn stored_plus_produced_meets_the_request() {
        let (_dir, mut engine) = engine();
        let stored: Vec<Candidate> = (0..2)
            .map(|i| {
                Candidate::new(
                    format!("犬 が {i} 匹 いる。"),
                    format!("There are {i} dogs."),
                )
            })
            .collect();
        let fresh: Vec<Candidate> = (0..10)
            .map(|i| {
                Candidate::new(
                    format!("犬 が {i} 回 吠える。"),
                    format!("The dog barks {i} times."),
                )
            })
            .collect();
        engine
            .register_targeted("seed", "test", Box::new(StaticSource { candidates: stored }))
            .unwrap();

        let mut seed_request = HashMap::new();
        seed_request.insert("犬".to_string(), 2);
        let seeded = engine
            .get_sentences_for_words(&seed_request, true)
            .unwrap();
        assert_eq!(seeded["犬"].len(), 2);
        assert_eq!(engine.sentence_count(), 2);

        engine
            .register_targeted("fresh", "test", Box::new(StaticSource { candidates: fresh }))
            .unwrap();
        let mut request = HashMap::new();
        request.insert("犬".to_string(), 5);
        let results = engine.get_sentences_for_words(&request, true).unwrap();
        assert_eq!(results["犬"].len(), 5);
        // 2 already stored, exactly 3 newly inserted.
        assert_eq!(engine.sentence_count(), 5);
    }

    #[test]
    fn without_produce_new_only_stored_sentences_return() {
        let (_dir, mut engine) = engine();
        engine
            .register_targeted(
                "fresh",
                "test",
                Box::new(StaticSource {
                    candidates: vec![Candidate::new("犬 が 走る よ。", "The dog runs.")],
                }),
            )
            .unwrap();
        let mut request = HashMap::new();
        request.insert("犬".to_string(), 3);
        let results = engine.get_sentences_for_words(&request, false).unwrap();
        assert!(results.get("犬").map_or(true, Vec::is_empty));
        assert_eq!(engine.sentence_count(), 0);
    }

    #[test]
    fn update_known_reorders_retrieval() {
        let (_dir, mut engine) = engine();
        engine
            .register_targeted(
                "fresh",
                "test",
                Box::new(StaticSource {
                    candidates: vec![
                        Candidate::new("犬 が 公園 に 行く。", "The dog goes to the park."),
                        Candidate::new("犬 は 良い です。", "The dog is good."),
                    ],
                }),
            )
            .unwrap();
        let mut request = HashMap::new();
        request.insert("犬".to_string(), 2);
        engine.get_sentences_for_words(&request, true).unwrap();

        let known: HashSet<String> =
            ["は", "良い", "です"].iter().map(|s| s.to_string()).collect();
        engine.update_known(&known).unwrap();

        let results = engine.get_sentences_for_words(&request, false).unwrap();
        assert_eq!(results["犬"][0].text, "犬 は 良い です。");
        assert_eq!(results["犬"][0].known_words, 3);
    }
}
