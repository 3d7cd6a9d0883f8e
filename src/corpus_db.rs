//! SQLite-backed corpus store.
//!
//! Owns the three relational tables (sentences, keywords, associations) and
//! is the only component allowed to mutate them. WAL mode keeps concurrent
//! readers unblocked while SQLite serializes writers.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use chrono::Utc;
use rusqlite::{Connection, params};

use crate::error::{CorpusError, Result};
use crate::types::{NewSentence, Sentence};

/// Ranking bonus subtracted from a trusted sentence's unknown count before
/// dividing by length. Empirically chosen; tunable, not load-bearing.
const TRUST_BONUS: f64 = 2.0;

pub struct CorpusDb {
    conn: Connection,
}

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS sentences (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    text TEXT NOT NULL UNIQUE,
    translation TEXT NOT NULL,
    source_tag INTEGER NOT NULL,
    trusted INTEGER NOT NULL DEFAULT 0,
    credit TEXT,
    total_words INTEGER NOT NULL,
    known_words INTEGER NOT NULL DEFAULT 0,
    unknown_words INTEGER NOT NULL,
    created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
);

CREATE TABLE IF NOT EXISTS keywords (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    text TEXT NOT NULL UNIQUE,
    known INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS sentence_keywords (
    sentence_id INTEGER NOT NULL REFERENCES sentences(id) ON DELETE CASCADE,
    keyword_id INTEGER NOT NULL REFERENCES keywords(id),
    PRIMARY KEY (sentence_id, keyword_id)
);

CREATE INDEX IF NOT EXISTS idx_sentence_keywords_keyword
    ON sentence_keywords(keyword_id);
";

const SENTENCE_COLUMNS: &str = "id, text, translation, source_tag, trusted, credit,
       total_words, known_words, unknown_words";

impl CorpusDb {
    /// Open or create the store at `path`. Failure to open or prepare the
    /// schema is fatal (`StoreUnavailable`).
    pub fn open_or_create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CorpusError::StoreUnavailable(format!("create {}: {e}", parent.display()))
            })?;
        }
        let conn = Connection::open(path)
            .map_err(|e| CorpusError::StoreUnavailable(format!("open {}: {e}", path.display())))?;
        let db = Self { conn };
        db.apply_pragmas()?;
        db.init_schema()?;
        Ok(db)
    }

    /// In-memory store, used by tests and throwaway sessions.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| CorpusError::StoreUnavailable(format!("open in-memory: {e}")))?;
        let db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    fn apply_pragmas(&self) -> Result<()> {
        self.conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )?;
        Ok(())
    }

    fn init_schema(&self) -> Result<()> {
        self.conn
            .execute_batch(SCHEMA_SQL)
            .map_err(|e| CorpusError::StoreUnavailable(format!("schema: {e}")))?;
        Ok(())
    }

    // ── Read operations ──────────────────────────────────────────────

    pub fn sentence_count(&self) -> usize {
        self.conn
            .query_row("SELECT COUNT(*) FROM sentences", [], |row| {
                row.get::<_, i64>(0)
            })
            .unwrap_or(0) as usize
    }

    /// Existence probe used for deduplication. Non-transactional so it can
    /// run speculatively inside a batch-build loop.
    pub fn exists(&self, text: &str) -> bool {
        self.conn
            .query_row(
                "SELECT 1 FROM sentences WHERE text = ?1 LIMIT 1",
                params![text],
                |_| Ok(()),
            )
            .is_ok()
    }

    /// Top `limit` sentences containing `word`, easiest first.
    pub fn retrieve_ranked(&self, word: &str, limit: usize) -> Result<Vec<Sentence>> {
        let mut requests = HashMap::new();
        requests.insert(word.to_string(), limit);
        let mut by_word = self.retrieve_ranked_many(&requests)?;
        Ok(by_word.remove(word).unwrap_or_default())
    }

    /// Batched ranked retrieval: one window-function pass partitioned per
    /// keyword, trimmed to each word's own limit afterwards. Work is bounded
    /// by words × max limit, never by corpus size per word requested.
    pub fn retrieve_ranked_many(
        &self,
        requests: &HashMap<String, usize>,
    ) -> Result<HashMap<String, Vec<Sentence>>> {
        let mut out: HashMap<String, Vec<Sentence>> = HashMap::new();
        let words: Vec<&String> = {
            let mut w: Vec<&String> = requests.iter().filter(|(_, n)| **n > 0).map(|(k, _)| k).collect();
            w.sort();
            w
        };
        if words.is_empty() {
            return Ok(out);
        }
        let max_limit = requests.values().copied().max().unwrap_or(0);

        let placeholders = repeat_vars(words.len());
        let sql = format!(
            "WITH ranked AS (
                 SELECT s.id, s.text, s.translation, s.source_tag, s.trusted, s.credit,
                        s.total_words, s.known_words, s.unknown_words,
                        k.text AS keyword,
                        ROW_NUMBER() OVER (
                            PARTITION BY k.id
                            ORDER BY (CAST(s.unknown_words AS REAL) - {TRUST_BONUS} * s.trusted)
                                         / MAX(s.total_words, 1) ASC,
                                     s.id ASC
                        ) AS rn
                 FROM keywords k
                 JOIN sentence_keywords sk ON sk.keyword_id = k.id
                 JOIN sentences s ON s.id = sk.sentence_id
                 WHERE k.text IN ({placeholders})
             )
             SELECT keyword, id, text, translation, source_tag, trusted, credit,
                    total_words, known_words, unknown_words
             FROM ranked
             WHERE rn <= ?{limit_idx}
             ORDER BY keyword, rn",
            limit_idx = words.len() + 1,
        );

        let mut bind_values: Vec<Box<dyn rusqlite::types::ToSql>> = words
            .iter()
            .map(|w| Box::new((*w).clone()) as Box<dyn rusqlite::types::ToSql>)
            .collect();
        bind_values.push(Box::new(max_limit as i64));
        let bind_refs: Vec<&dyn rusqlite::types::ToSql> =
            bind_values.iter().map(|b| b.as_ref()).collect();

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(bind_refs.as_slice(), |row| {
            let keyword: String = row.get(0)?;
            let sentence = Sentence {
                id: row.get(1)?,
                text: row.get(2)?,
                translation: row.get(3)?,
                source_tag: row.get::<_, i64>(4)? as u32,
                trusted: row.get::<_, i64>(5)? != 0,
                credit: row.get(6)?,
                total_words: row.get(7)?,
                known_words: row.get(8)?,
                unknown_words: row.get(9)?,
            };
            Ok((keyword, sentence))
        })?;

        for row in rows {
            let (keyword, sentence) = row?;
            let limit = requests.get(&keyword).copied().unwrap_or(0);
            let entry = out.entry(keyword).or_default();
            if entry.len() < limit {
                entry.push(sentence);
            }
        }
        Ok(out)
    }

    /// Sentence counts per word. With `min_comprehensibility` set, only
    /// sentences whose known fraction meets the threshold are counted.
    /// Absent words map to 0; empty input returns an empty map.
    pub fn count_occurrences(
        &self,
        words: &[String],
        min_comprehensibility: Option<f64>,
    ) -> Result<HashMap<String, u64>> {
        let mut out: HashMap<String, u64> = words.iter().map(|w| (w.clone(), 0)).collect();
        if words.is_empty() {
            return Ok(out);
        }

        let placeholders = repeat_vars(words.len());
        let mut sql = format!(
            "SELECT k.text, COUNT(*)
             FROM keywords k
             JOIN sentence_keywords sk ON sk.keyword_id = k.id
             JOIN sentences s ON s.id = sk.sentence_id
             WHERE k.text IN ({placeholders})"
        );
        let mut bind_values: Vec<Box<dyn rusqlite::types::ToSql>> = words
            .iter()
            .map(|w| Box::new(w.clone()) as Box<dyn rusqlite::types::ToSql>)
            .collect();
        if let Some(min) = min_comprehensibility {
            bind_values.push(Box::new(min));
            sql.push_str(&format!(
                " AND (CAST(s.known_words AS REAL) / MAX(s.total_words, 1)) >= ?{}",
                bind_values.len()
            ));
        }
        sql.push_str(" GROUP BY k.text");

        let bind_refs: Vec<&dyn rusqlite::types::ToSql> =
            bind_values.iter().map(|b| b.as_ref()).collect();
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(bind_refs.as_slice(), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (word, count) = row?;
            out.insert(word, count.max(0) as u64);
        }
        Ok(out)
    }

    // ── Write operations ─────────────────────────────────────────────

    /// Insert a batch of sentences with their keyword associations,
    /// all-or-nothing. Any already-stored text (or repeat within the batch)
    /// aborts the whole batch with `DuplicateSentence`.
    ///
    /// Keyword rows are resolved in bulk: one upsert pass and one IN-list
    /// id lookup per batch. Returns the inserted rows with ids and fresh
    /// comprehension counts.
    pub fn insert_batch(&mut self, batch: &[NewSentence]) -> Result<Vec<Sentence>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        let tx = self.conn.transaction()?;
        let now = Utc::now().timestamp();

        let mut batch_texts: HashSet<&str> = HashSet::new();
        for sentence in batch {
            let present = tx
                .query_row(
                    "SELECT 1 FROM sentences WHERE text = ?1 LIMIT 1",
                    params![sentence.text],
                    |_| Ok(()),
                )
                .is_ok();
            if present || !batch_texts.insert(sentence.text.as_str()) {
                return Err(CorpusError::DuplicateSentence {
                    text: sentence.text.clone(),
                });
            }
        }

        let mut sentence_ids = Vec::with_capacity(batch.len());
        {
            let mut insert = tx.prepare(
                "INSERT INTO sentences
                     (text, translation, source_tag, trusted, credit,
                      total_words, known_words, unknown_words, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?6, ?7)",
            )?;
            for sentence in batch {
                insert.execute(params![
                    sentence.text,
                    sentence.translation,
                    sentence.source_tag as i64,
                    sentence.trusted as i64,
                    sentence.credit,
                    sentence.content_words.len() as i64,
                    now,
                ])?;
                sentence_ids.push(tx.last_insert_rowid());
            }
        }

        let mut all_words: Vec<&str> = Vec::new();
        {
            let mut seen = HashSet::new();
            for sentence in batch {
                for word in &sentence.content_words {
                    if seen.insert(word.as_str()) {
                        all_words.push(word);
                    }
                }
            }
        }

        let keyword_ids: HashMap<String, i64> = if all_words.is_empty() {
            HashMap::new()
        } else {
            {
                let mut upsert =
                    tx.prepare("INSERT OR IGNORE INTO keywords (text, known) VALUES (?1, 0)")?;
                for word in &all_words {
                    upsert.execute(params![word])?;
                }
            }
            let placeholders = repeat_vars(all_words.len());
            let sql = format!("SELECT text, id FROM keywords WHERE text IN ({placeholders})");
            let bind_values: Vec<Box<dyn rusqlite::types::ToSql>> = all_words
                .iter()
                .map(|w| Box::new(w.to_string()) as Box<dyn rusqlite::types::ToSql>)
                .collect();
            let bind_refs: Vec<&dyn rusqlite::types::ToSql> =
                bind_values.iter().map(|b| b.as_ref()).collect();
            let mut stmt = tx.prepare(&sql)?;
            let rows = stmt.query_map(bind_refs.as_slice(), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            let mut map = HashMap::new();
            for row in rows {
                let (text, id) = row?;
                map.insert(text, id);
            }
            map
        };

        {
            let mut associate = tx.prepare(
                "INSERT OR IGNORE INTO sentence_keywords (sentence_id, keyword_id)
                 VALUES (?1, ?2)",
            )?;
            for (sentence, sentence_id) in batch.iter().zip(&sentence_ids) {
                for word in &sentence.content_words {
                    if let Some(keyword_id) = keyword_ids.get(word.as_str()) {
                        associate.execute(params![sentence_id, keyword_id])?;
                    }
                }
            }
        }

        let id_list = sentence_ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        tx.execute_batch(&format!(
            "UPDATE sentences SET known_words = (
                 SELECT COUNT(*) FROM sentence_keywords sk
                 JOIN keywords k ON k.id = sk.keyword_id
                 WHERE sk.sentence_id = sentences.id AND k.known = 1
             ) WHERE id IN ({id_list});
             UPDATE sentences SET unknown_words = total_words - known_words
             WHERE id IN ({id_list});"
        ))?;

        let mut inserted = Vec::with_capacity(sentence_ids.len());
        {
            let mut stmt = tx.prepare(&format!(
                "SELECT {SENTENCE_COLUMNS} FROM sentences WHERE id = ?1"
            ))?;
            for id in &sentence_ids {
                inserted.push(stmt.query_row(params![id], row_to_sentence)?);
            }
        }

        tx.commit()?;
        Ok(inserted)
    }

    /// Mark every word known, inserting keyword rows for words never seen in
    /// a sentence. Never un-marks.
    pub fn set_known(&mut self, words: &HashSet<String>) -> Result<()> {
        if words.is_empty() {
            return Ok(());
        }
        let tx = self.conn.transaction()?;
        {
            let mut upsert = tx.prepare(
                "INSERT INTO keywords (text, known) VALUES (?1, 1)
                 ON CONFLICT(text) DO UPDATE SET known = 1",
            )?;
            for word in words {
                upsert.execute(params![word])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Recompute the per-sentence known/unknown counts from the keyword
    /// table. Idempotent; safe to run after every known-set change.
    pub fn recompute_comprehension(&mut self) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "UPDATE sentences SET known_words = (
                 SELECT COUNT(*) FROM sentence_keywords sk
                 JOIN keywords k ON k.id = sk.keyword_id
                 WHERE sk.sentence_id = sentences.id AND k.known = 1
             )",
            [],
        )?;
        tx.execute(
            "UPDATE sentences SET unknown_words = total_words - known_words",
            [],
        )?;
        tx.commit()?;
        Ok(())
    }
}

fn row_to_sentence(row: &rusqlite::Row) -> std::result::Result<Sentence, rusqlite::Error> {
    Ok(Sentence {
        id: row.get(0)?,
        text: row.get(1)?,
        translation: row.get(2)?,
        source_tag: row.get::<_, i64>(3)? as u32,
        trusted: row.get::<_, i64>(4)? != 0,
        credit: row.get(5)?,
        total_words: row.get(6)?,
        known_words: row.get(7)?,
        unknown_words: row.get(8)?,
    })
}

fn repeat_vars(count: usize) -> String {
    let mut out = String::with_capacity(count * 2);
    for i in 1..=count {
        if i > 1 {
            out.push(',');
        }
        out.push('?');
        out.push_str(&i.to_string());
    }
    out
}
