use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::production::ProducerConfig;

fn default_bootstrap_floor() -> usize {
    3000
}
fn default_ingest_ceiling() -> u64 {
    50
}
fn default_block_size() -> usize {
    50
}
fn default_quota() -> usize {
    5
}
fn default_connect_timeout_ms() -> u64 {
    5_000
}
fn default_read_timeout_ms() -> u64 {
    15_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    /// Bootstrap runs while the corpus holds fewer than half this many
    /// sentences.
    #[serde(default = "default_bootstrap_floor")]
    pub bootstrap_floor: usize,
    /// Per-word occurrence ceiling during bulk ingestion.
    #[serde(default = "default_ingest_ceiling")]
    pub ingest_ceiling: u64,
    /// Sentences per insert transaction during bootstrap.
    #[serde(default = "default_block_size")]
    pub block_size: usize,
    /// Default sentences per word when the caller does not say.
    #[serde(default = "default_quota")]
    pub default_quota: usize,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            bootstrap_floor: default_bootstrap_floor(),
            ingest_ceiling: default_ingest_ceiling(),
            block_size: default_block_size(),
            default_quota: default_quota(),
            connect_timeout_ms: default_connect_timeout_ms(),
            read_timeout_ms: default_read_timeout_ms(),
        }
    }
}

impl FileConfig {
    pub fn producer_config(&self) -> ProducerConfig {
        ProducerConfig {
            bootstrap_floor: self.bootstrap_floor,
            ingest_ceiling: self.ingest_ceiling,
            block_size: self.block_size,
        }
    }
}

pub fn load_file_config(path: &Path) -> FileConfig {
    match std::fs::read_to_string(path) {
        Ok(data) => serde_json::from_str(&data).unwrap_or_default(),
        Err(_) => FileConfig::default(),
    }
}

pub fn save_file_config(path: &Path, config: &FileConfig) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(config)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Default ledger path: a `.sources` sibling of the corpus database.
pub fn ledger_path_for(db_path: &Path) -> PathBuf {
    let mut name = db_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "corpus".to_string());
    name.push_str(".sources");
    db_path.with_file_name(name)
}
