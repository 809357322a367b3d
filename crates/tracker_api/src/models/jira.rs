//! Jira REST v2 issue and worklog payloads.

use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Clone)]
pub struct JiraIssue {
    pub key: String,
    #[serde(default)]
    pub fields: JiraIssueFields,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct JiraIssueFields {
    pub summary: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct JiraWorklogPage {
    #[serde(default)]
    pub start_at: u32,
    #[serde(default)]
    pub max_results: u32,
    #[serde(default)]
    pub total: u32,
    #[serde(default)]
    pub worklogs: Vec<JiraWorklog>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct JiraWorklog {
    pub id: String,
    #[serde(default)]
    pub comment: Option<String>,
    pub started: Option<String>,
    #[serde(default)]
    pub time_spent_seconds: u64,
    pub author: Option<JiraAuthor>,
}

impl JiraWorklog {
    /// Calendar day part of `started` (`2024-03-01T12:00:00.000+0000`).
    pub fn started_date(&self) -> Option<&str> {
        self.started.as_deref().and_then(|value| value.get(..10))
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct JiraAuthor {
    pub name: Option<String>,
    pub display_name: Option<String>,
    pub email_address: Option<String>,
}

/// Body for creating or updating a worklog.
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JiraWorklogInput {
    pub comment: String,
    pub started: String,
    pub time_spent_seconds: u64,
}
