//! Bulk adapter streaming a local tab-separated sentence-pair export.
//!
//! Two layouts are accepted per line:
//!   `text<TAB>translation[<TAB>credit]`
//!   `id<TAB>text<TAB>id<TAB>translation`   (Tatoeba pair export)
//! Blank and malformed lines are skipped.

use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::PathBuf;

use crate::error::SourceFailure;
use crate::production::{BulkSource, CandidateStream};
use crate::types::Candidate;

pub struct PairsFileSource {
    path: PathBuf,
}

impl PairsFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl BulkSource for PairsFileSource {
    fn stream<'a>(&'a self) -> CandidateStream<'a> {
        match File::open(&self.path) {
            Ok(file) => Box::new(PairsIter {
                lines: BufReader::new(file).lines(),
            }),
            Err(e) => Box::new(std::iter::once(Err(SourceFailure::new(format!(
                "open {}: {e}",
                self.path.display()
            ))))),
        }
    }
}

struct PairsIter {
    lines: Lines<BufReader<File>>,
}

impl Iterator for PairsIter {
    type Item = Result<Candidate, SourceFailure>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e.into())),
            };
            if let Some(candidate) = parse_pair_line(&line) {
                return Some(Ok(candidate));
            }
        }
    }
}

fn parse_pair_line(line: &str) -> Option<Candidate> {
    let fields: Vec<&str> = line.split('\t').collect();
    let (text, translation, credit) = match fields.as_slice() {
        [a, b, c, d]
            if a.parse::<u64>().is_ok() && c.parse::<u64>().is_ok() =>
        {
            (*b, *d, None)
        }
        [text, translation] => (*text, *translation, None),
        [text, translation, credit] => (*text, *translation, Some((*credit).to_string())),
        _ => return None,
    };
    if text.trim().is_empty() || translation.trim().is_empty() {
        return None;
    }
    Some(Candidate {
        text: text.trim().to_string(),
        translation: Some(translation.trim().to_string()),
        credit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_pairs(contents: &str) -> (tempfile::TempDir, PairsFileSource) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pairs.tsv");
        let mut file = File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        (dir, PairsFileSource::new(path))
    }

    #[test]
    fn parses_simple_pairs_with_optional_credit() {
        let (_dir, source) = write_pairs(
            "犬が好きです。\tI like dogs.\n\
             猫が好きです。\tI like cats.\tsomeone (CC-BY)\n",
        );
        let candidates: Vec<Candidate> = source.stream().map(|c| c.unwrap()).collect();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].text, "犬が好きです。");
        assert_eq!(candidates[1].credit.as_deref(), Some("someone (CC-BY)"));
    }

    #[test]
    fn parses_tatoeba_export_layout() {
        let (_dir, source) = write_pairs("4924\t犬が好きです。\t1300\tI like dogs.\n");
        let candidates: Vec<Candidate> = source.stream().map(|c| c.unwrap()).collect();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].text, "犬が好きです。");
        assert_eq!(candidates[0].translation.as_deref(), Some("I like dogs."));
    }

    #[test]
    fn skips_blank_and_malformed_lines() {
        let (_dir, source) = write_pairs("\nonly-one-field\n犬が好きです。\tI like dogs.\n");
        let candidates: Vec<Candidate> = source.stream().map(|c| c.unwrap()).collect();
        assert_eq!(candidates.len(), 1);
    }

    #[test]
    fn missing_file_yields_one_failure() {
        let source = PairsFileSource::new("/nonexistent/pairs.tsv");
        let items: Vec<_> = source.stream().collect();
        assert_eq!(items.len(), 1);
        assert!(items[0].is_err());
    }
}
