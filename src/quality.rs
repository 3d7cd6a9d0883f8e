//! Layered quality filters for candidate sentences.
//!
//! Filters run in tiers ordered by cost: cheap character-level checks on the
//! source text first, then the target-word and translation checks, then the
//! extra tier that separates trusted sentences from merely usable ones.

use tracing::debug;

use crate::script;
use crate::segment::{self, WordSegmenter};
use crate::types::Candidate;

/// Three-level verdict. `Reject` carries the name of the failing rule for
/// diagnostics; it is never surfaced past the production manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Reject(&'static str),
    Acceptable,
    HighQuality,
}

impl Verdict {
    pub fn is_accepted(self) -> bool {
        !matches!(self, Verdict::Reject(_))
    }
}

const MIN_TEXT_CHARS: usize = 5; // exclusive
const MAX_TEXT_CHARS: usize = 140; // inclusive
const MIN_JAPANESE_RATIO: f64 = 0.7;
const MIN_TRANSLATION_CHARS: usize = 5; // exclusive
const MIN_CONTENT_WORDS: usize = 2;
const MAX_CONTENT_WORDS: usize = 20;

const MARKUP_FRAGMENTS: &[&str] = &[
    "<", ">", "&lt;", "&gt;", "&amp;", "&quot;", "&nbsp;", "&#", "http://", "https://",
];

/// Punctuation admitted in source text beyond the Japanese classes.
const SOURCE_PUNCTUATION: &str = " .,!?'\"()-:;%…“”‘’";

/// Characters admitted in translations beyond alphanumerics.
const TRANSLATION_PUNCTUATION: &str = " .,!?'\"()-:;%&/$…“”‘’—";

fn reject(rule: &'static str, text: &str) -> Verdict {
    debug!(rule, text, "candidate rejected");
    Verdict::Reject(rule)
}

fn contains_markup(text: &str) -> bool {
    MARKUP_FRAGMENTS.iter().any(|frag| text.contains(frag))
}

fn contains_break(text: &str) -> bool {
    text.chars().any(|c| c == '\n' || c == '\r' || c == '\t')
}

fn quotes_balanced(text: &str) -> bool {
    let count = |target: char| text.chars().filter(|c| *c == target).count();
    count('"') % 2 == 0
        && count('「') == count('」')
        && count('『') == count('』')
        && count('（') == count('）')
        && count('(') == count(')')
}

fn allowed_source_char(c: char) -> bool {
    c.is_alphabetic()
        || c.is_numeric()
        || script::is_japanese(c)
        || script::is_japanese_punct(c)
        || SOURCE_PUNCTUATION.contains(c)
}

fn allowed_translation_char(c: char) -> bool {
    c.is_alphabetic() || c.is_numeric() || TRANSLATION_PUNCTUATION.contains(c)
}

fn pre_translation_rule(text: &str) -> Option<&'static str> {
    let chars = text.chars().count();
    if chars <= MIN_TEXT_CHARS || chars > MAX_TEXT_CHARS {
        return Some("length");
    }
    if script::japanese_ratio(text) < MIN_JAPANESE_RATIO {
        return Some("script_ratio");
    }
    if contains_markup(text) {
        return Some("markup");
    }
    if contains_break(text) {
        return Some("line_break");
    }
    if !text.chars().all(allowed_source_char) {
        return Some("disallowed_char");
    }
    if !quotes_balanced(text) {
        return Some("unbalanced_quotes");
    }
    None
}

fn post_translation_rule(translation: &str, content_word_count: usize) -> Option<&'static str> {
    if script::contains_japanese(translation) {
        return Some("translation_japanese");
    }
    if contains_markup(translation) {
        return Some("translation_markup");
    }
    if contains_break(translation) {
        return Some("translation_line_break");
    }
    if !translation.chars().all(allowed_translation_char) {
        return Some("translation_disallowed_char");
    }
    if content_word_count < MIN_CONTENT_WORDS {
        return Some("too_few_content_words");
    }
    None
}

/// Evaluate one candidate. When `target_word` is given the candidate must
/// contain it as a content word. Pure apart from debug logging of rejects.
pub fn evaluate(
    candidate: &Candidate,
    target_word: Option<&str>,
    segmenter: &dyn WordSegmenter,
) -> Verdict {
    let text = candidate.text.as_str();

    if let Some(rule) = pre_translation_rule(text) {
        return reject(rule, text);
    }

    let words = segment::content_words(segmenter, text);
    if let Some(target) = target_word {
        if !words.iter().any(|w| w == target) {
            return reject("missing_target_word", text);
        }
    }

    let translation = match candidate.translation.as_deref() {
        Some(t) if t.chars().count() > MIN_TRANSLATION_CHARS => t,
        _ => return reject("missing_translation", text),
    };

    if let Some(rule) = post_translation_rule(translation, words.len()) {
        return reject(rule, text);
    }

    let extra_quality = words.len() <= MAX_CONTENT_WORDS
        && !text
            .chars()
            .any(|c| c.is_alphabetic() && !script::is_japanese(c))
        && !script::contains_japanese(translation);

    if extra_quality {
        Verdict::HighQuality
    } else {
        Verdict::Acceptable
    }
}
