//! FogBugz JSON API envelopes.

use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct FogBugzEnvelope<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Vec<FogBugzError>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FogBugzError {
    pub message: String,
    pub code: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct FogBugzSearchData {
    #[serde(default)]
    pub cases: Vec<FogBugzCase>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct FogBugzCase {
    pub ix_bug: u64,
    pub s_title: Option<String>,
    #[serde(default)]
    pub hrs_elapsed_extra: f64,
    #[serde(default)]
    pub events: Vec<FogBugzEvent>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct FogBugzEvent {
    pub ix_bug_event: u64,
    pub s: Option<String>,
    pub s_html: Option<String>,
}

/// Event text in the form FogBugz delivered it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventText<'a> {
    Plain(&'a str),
    Html(&'a str),
}

impl FogBugzEvent {
    /// The plain `s` field when present, otherwise the HTML rendering.
    pub fn text(&self) -> Option<EventText<'_>> {
        match self.s.as_deref().filter(|text| !text.is_empty()) {
            Some(text) => Some(EventText::Plain(text)),
            None => self.s_html.as_deref().map(EventText::Html),
        }
    }
}
