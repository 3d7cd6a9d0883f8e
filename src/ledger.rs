//! Append-only provenance ledger.
//!
//! Maps numeric source tags to human-readable names and license strings, one
//! `tag;name;license` record per line. Tags are assigned monotonically from
//! 1 and never reused for a different name; re-registering a known name
//! returns its existing tag.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{CorpusError, Result};
use crate::types::SourceTag;

#[derive(Debug, Clone)]
pub struct LedgerEntry {
    pub tag: SourceTag,
    pub name: String,
    pub license: String,
}

pub struct SourceLedger {
    path: PathBuf,
    entries: Vec<LedgerEntry>,
}

impl SourceLedger {
    /// Load the ledger at `path`, creating nothing until the first
    /// registration. Malformed lines are skipped with a warning.
    pub fn open(path: &Path) -> Result<Self> {
        let mut entries = Vec::new();
        match std::fs::read_to_string(path) {
            Ok(data) => {
                for (lineno, line) in data.lines().enumerate() {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match parse_line(line) {
                        Some(entry) => entries.push(entry),
                        None => {
                            warn!(path = %path.display(), lineno, "skipping malformed ledger line");
                        }
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    /// Register a source by name, appending a new record when unseen.
    pub fn register(&mut self, name: &str, license: &str) -> Result<SourceTag> {
        if name.is_empty() || name.contains(';') || name.contains('\n') {
            return Err(CorpusError::InvalidRegistration(format!(
                "bad source name {name:?}"
            )));
        }
        if license.contains(';') || license.contains('\n') {
            return Err(CorpusError::InvalidRegistration(format!(
                "bad license string {license:?}"
            )));
        }
        if let Some(entry) = self.entries.iter().find(|e| e.name == name) {
            return Ok(entry.tag);
        }

        let tag = self.entries.iter().map(|e| e.tag).max().unwrap_or(0) + 1;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{tag};{name};{license}")?;
        self.entries.push(LedgerEntry {
            tag,
            name: name.to_string(),
            license: license.to_string(),
        });
        Ok(tag)
    }

    pub fn name_of(&self, tag: SourceTag) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.tag == tag)
            .map(|e| e.name.as_str())
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }
}

fn parse_line(line: &str) -> Option<LedgerEntry> {
    let mut parts = line.splitn(3, ';');
    let tag = parts.next()?.trim().parse().ok()?;
    let name = parts.next()?.to_string();
    let license = parts.next().unwrap_or("").to_string();
    if name.is_empty() {
        return None;
    }
    Some(LedgerEntry { tag, name, license })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_ledger() -> (tempfile::TempDir, SourceLedger) {
        let dir = tempfile::tempdir().unwrap();
        let ledger = SourceLedger::open(&dir.path().join("sources.ledger")).unwrap();
        (dir, ledger)
    }

    #[test]
    fn tags_are_monotonic_from_one() {
        let (_dir, mut ledger) = temp_ledger();
        assert_eq!(ledger.register("tatoeba", "CC-BY 2.0 FR").unwrap(), 1);
        assert_eq!(ledger.register("pairs-file", "mixed").unwrap(), 2);
        assert_eq!(ledger.name_of(2), Some("pairs-file"));
    }

    #[test]
    fn reregistration_reuses_the_tag() {
        let (_dir, mut ledger) = temp_ledger();
        let first = ledger.register("tatoeba", "CC-BY 2.0 FR").unwrap();
        let again = ledger.register("tatoeba", "CC-BY 2.0 FR").unwrap();
        assert_eq!(first, again);
        assert_eq!(ledger.entries().len(), 1);
    }

    #[test]
    fn records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sources.ledger");
        {
            let mut ledger = SourceLedger::open(&path).unwrap();
            ledger.register("tatoeba", "CC-BY 2.0 FR").unwrap();
            ledger.register("pairs-file", "mixed").unwrap();
        }
        let mut ledger = SourceLedger::open(&path).unwrap();
        assert_eq!(ledger.entries().len(), 2);
        assert_eq!(ledger.register("tatoeba", "CC-BY 2.0 FR").unwrap(), 1);

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.starts_with("1;tatoeba;CC-BY 2.0 FR\n"));
    }

    #[test]
    fn semicolons_in_names_are_refused() {
        let (_dir, mut ledger) = temp_ledger();
        assert!(matches!(
            ledger.register("bad;name", ""),
            Err(CorpusError::InvalidRegistration(_))
        ));
    }
}
