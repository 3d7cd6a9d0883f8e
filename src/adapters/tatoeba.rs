//! Targeted adapter for the Tatoeba search API.
//!
//! Pages through `GET /eng/api_v0/search` lazily, one HTTP request per page
//! pull. Network and decode failures surface as a single `SourceFailure`
//! item, which the production manager treats as stream exhaustion.

use std::collections::VecDeque;
use std::time::Duration;

use serde::Deserialize;

use crate::error::SourceFailure;
use crate::production::{CandidateStream, TargetedSource};
use crate::types::Candidate;

const DEFAULT_BASE_URL: &str = "https://tatoeba.org";
const DEFAULT_MAX_PAGES: u32 = 10;

pub struct TatoebaSource {
    agent: ureq::Agent,
    base_url: String,
    max_pages: u32,
}

impl TatoebaSource {
    pub fn new(connect_timeout: Duration, read_timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(connect_timeout)
            .timeout_read(read_timeout)
            .build();
        Self {
            agent,
            base_url: DEFAULT_BASE_URL.to_string(),
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    /// Point the adapter at a mirror (or a test server).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn page_url(&self, word: &str, page: u32) -> String {
        format!(
            "{}/eng/api_v0/search?from=jpn&to=eng&sort=relevance&query={}&page={page}",
            self.base_url,
            urlencoding::encode(word),
        )
    }

    fn fetch_page(&self, word: &str, page: u32) -> Result<SearchPage, SourceFailure> {
        let url = self.page_url(word, page);
        match self.agent.get(&url).call() {
            Ok(resp) => resp
                .into_json::<SearchPage>()
                .map_err(|e| SourceFailure::new(format!("decode search page: {e}"))),
            Err(ureq::Error::Status(code, _resp)) => {
                Err(SourceFailure::new(format!("search returned HTTP {code}")))
            }
            Err(err) => Err(SourceFailure::new(format!("search request failed: {err}"))),
        }
    }
}

impl TargetedSource for TatoebaSource {
    fn stream<'a>(&'a self, word: &str) -> CandidateStream<'a> {
        Box::new(TatoebaStream {
            source: self,
            word: word.to_string(),
            next_page: 1,
            buffer: VecDeque::new(),
            done: false,
        })
    }
}

struct TatoebaStream<'a> {
    source: &'a TatoebaSource,
    word: String,
    next_page: u32,
    buffer: VecDeque<Candidate>,
    done: bool,
}

impl Iterator for TatoebaStream<'_> {
    type Item = Result<Candidate, SourceFailure>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(candidate) = self.buffer.pop_front() {
                return Some(Ok(candidate));
            }
            if self.done || self.next_page > self.source.max_pages {
                return None;
            }
            let page = match self.source.fetch_page(&self.word, self.next_page) {
                Ok(page) => page,
                Err(failure) => {
                    self.done = true;
                    return Some(Err(failure));
                }
            };
            let (candidates, has_more) = page_to_candidates(page, self.next_page);
            self.next_page += 1;
            self.done = !has_more;
            if candidates.is_empty() && self.done {
                return None;
            }
            self.buffer.extend(candidates);
        }
    }
}

// ── Wire format ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(default)]
    results: Vec<ApiSentence>,
    #[serde(default)]
    paging: Option<Paging>,
}

#[derive(Debug, Deserialize)]
struct Paging {
    #[serde(rename = "Sentences")]
    sentences: Option<PageInfo>,
}

#[derive(Debug, Deserialize)]
struct PageInfo {
    #[serde(rename = "pageCount", default)]
    page_count: u32,
}

#[derive(Debug, Deserialize)]
struct ApiSentence {
    text: String,
    #[serde(default)]
    license: Option<String>,
    #[serde(default)]
    owner: Option<String>,
    /// Nested: direct translations first, then indirect.
    #[serde(default)]
    translations: Vec<Vec<ApiTranslation>>,
}

#[derive(Debug, Deserialize)]
struct ApiTranslation {
    text: String,
    #[serde(default)]
    lang: Option<String>,
}

fn sentence_to_candidate(sentence: ApiSentence) -> Candidate {
    let translation = sentence
        .translations
        .iter()
        .flatten()
        .find(|t| t.lang.as_deref() == Some("eng"))
        .or_else(|| sentence.translations.iter().flatten().next())
        .map(|t| t.text.clone());
    let credit = match (sentence.owner.as_deref(), sentence.license.as_deref()) {
        (Some(owner), Some(license)) => Some(format!("{owner} ({license})")),
        (Some(owner), None) => Some(owner.to_string()),
        (None, Some(license)) => Some(license.to_string()),
        (None, None) => None,
    };
    Candidate {
        text: sentence.text,
        translation,
        credit,
    }
}

fn page_to_candidates(page: SearchPage, current_page: u32) -> (Vec<Candidate>, bool) {
    let page_count = page
        .paging
        .as_ref()
        .and_then(|p| p.sentences.as_ref())
        .map(|s| s.page_count)
        .unwrap_or(current_page);
    let has_more = current_page < page_count && !page.results.is_empty();
    let candidates = page.results.into_iter().map(sentence_to_candidate).collect();
    (candidates, has_more)
}
