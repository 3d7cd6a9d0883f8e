//! Japanese character classification used by the quality filters.
//!
//! The ranges are deliberately broad: the filters care about "does this look
//! like Japanese running text", not about Unicode-exact script properties.

pub(crate) fn is_hiragana(c: char) -> bool {
    ('\u{3041}'..='\u{309F}').contains(&c)
}

pub(crate) fn is_katakana(c: char) -> bool {
    ('\u{30A0}'..='\u{30FF}').contains(&c) || ('\u{FF66}'..='\u{FF9D}').contains(&c)
}

pub(crate) fn is_kanji(c: char) -> bool {
    ('\u{4E00}'..='\u{9FFF}').contains(&c)
        || ('\u{3400}'..='\u{4DBF}').contains(&c)
        || c == '々'
        || c == '〆'
        || c == 'ヶ'
}

/// CJK punctuation and fullwidth forms (、。「」！？ and friends).
pub(crate) fn is_japanese_punct(c: char) -> bool {
    ('\u{3000}'..='\u{303F}').contains(&c) || ('\u{FF01}'..='\u{FF65}').contains(&c)
}

pub(crate) fn is_japanese(c: char) -> bool {
    is_hiragana(c) || is_katakana(c) || is_kanji(c)
}

pub(crate) fn contains_japanese(text: &str) -> bool {
    text.chars().any(is_japanese)
}

/// Fraction of non-whitespace characters that belong to the Japanese script
/// classes (including CJK punctuation). Whitespace is ignored so that
/// segmenter-normalized or spaced text is judged on its actual content.
pub(crate) fn japanese_ratio(text: &str) -> f64 {
    let mut total = 0usize;
    let mut japanese = 0usize;
    for c in text.chars() {
        if c.is_whitespace() {
            continue;
        }
        total += 1;
        if is_japanese(c) || is_japanese_punct(c) {
            japanese += 1;
        }
    }
    if total == 0 {
        return 0.0;
    }
    japanese as f64 / total as f64
}
