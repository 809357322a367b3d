//! Finding ticket references in free-text notes.

use once_cell::sync::Lazy;
use regex::Regex;

static KEYED_ID_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i-u:[A-Z][A-Z0-9]+)-\d+").expect("invalid keyed ticket id regex"));
static NUMERIC_ID_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"#\d+").expect("invalid numeric ticket id regex"));

/// How a bug tracker spells its ticket ids.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdStyle {
    /// Project key and number, e.g. `ABC-123`, optionally written `#ABC-123`.
    Keyed,
    /// Hash and case number, e.g. `#123`.
    Numeric,
}

/// A ticket id occurrence inside a note. `start..end` covers the id text as
/// written; `id` is its normalized form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdMatch {
    pub start: usize,
    pub end: usize,
    pub id: String,
}

impl IdStyle {
    fn regex(self) -> &'static Regex {
        match self {
            IdStyle::Keyed => &KEYED_ID_REGEX,
            IdStyle::Numeric => &NUMERIC_ID_REGEX,
        }
    }

    pub fn normalize(self, raw: &str) -> String {
        match self {
            IdStyle::Keyed => raw.trim_start_matches('#').to_ascii_uppercase(),
            IdStyle::Numeric => raw.to_string(),
        }
    }
}

/// Every id occurrence in `text`, in order, duplicates included.
pub fn find_ids(text: &str, style: IdStyle) -> Vec<IdMatch> {
    style
        .regex()
        .find_iter(text)
        .filter(|found| style != IdStyle::Keyed || !glued_to_word(text, found.start()))
        .map(|found| IdMatch {
            start: found.start(),
            end: found.end(),
            id: style.normalize(found.as_str()),
        })
        .collect()
}

/// Normalized ids referenced by `text`, de-duplicated in first-seen order.
pub fn extract_ids(text: &str, style: IdStyle) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for found in find_ids(text, style) {
        if !ids.contains(&found.id) {
            ids.push(found.id);
        }
    }
    ids
}

// Rejects `1-on-1` and `1stuff-2` style false positives.
fn glued_to_word(text: &str, start: usize) -> bool {
    text[..start]
        .chars()
        .next_back()
        .map(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        .unwrap_or(false)
}
