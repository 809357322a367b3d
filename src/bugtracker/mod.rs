//! Issue tracker capability and its backends.

use std::fmt;
use std::str::FromStr;

use crate::config::TrackerSettings;
use crate::error::{Error, Result};
use crate::ticket_ids::{self, IdStyle};
use crate::titles;
use crate::worklog::WorklogRecord;

pub mod fogbugz;
pub mod jira;

pub use fogbugz::FogBugzTracker;
pub use jira::JiraTracker;

/// Operations BugYield needs from an issue tracker.
#[allow(async_fn_in_trait)]
pub trait BugTracker {
    fn name(&self) -> &str;

    /// Base address of the tracker.
    fn url(&self) -> &str;

    fn ticket_url(&self, ticket_id: &str, worklog_id: Option<&str>) -> String;

    fn id_style(&self) -> IdStyle;

    fn extract_ids(&self, text: &str) -> Vec<String> {
        ticket_ids::extract_ids(text, self.id_style())
    }

    fn strip_titles(&self, text: &str) -> String {
        titles::strip_titles(text, self.id_style())
    }

    /// Ids referenced by a note, ignoring ids that only occur inside titles.
    fn referenced_ids(&self, notes: &str) -> Vec<String> {
        self.extract_ids(&self.strip_titles(notes))
    }

    /// `Err(Error::TicketNotFound)` when the ticket does not exist.
    async fn get_title(&self, ticket_id: &str) -> Result<String>;

    /// Worklogs on the ticket that BugYield wrote. Foreign worklogs are
    /// skipped.
    async fn timelog_entries(&self, ticket_id: &str) -> Result<Vec<WorklogRecord>>;

    /// Creates, updates or (for zero hours) removes the worklog for
    /// `record.entry_id`. Returns `false` when nothing had to be written.
    async fn save_timelog_entry(&self, ticket_id: &str, record: &WorklogRecord) -> Result<bool>;

    /// Returns `false` when the backend cannot remove worklogs.
    async fn delete_worklog(&self, ticket_id: &str, worklog_id: &str) -> Result<bool>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BugTrackerKind {
    Jira,
    FogBugz,
}

impl FromStr for BugTrackerKind {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "jira" => Ok(BugTrackerKind::Jira),
            "fogbugz" => Ok(BugTrackerKind::FogBugz),
            other => Err(Error::UnknownBugTracker(other.to_string())),
        }
    }
}

impl fmt::Display for BugTrackerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BugTrackerKind::Jira => write!(f, "Jira"),
            BugTrackerKind::FogBugz => write!(f, "FogBugz"),
        }
    }
}

/// A configured backend, selected by [`BugTrackerKind`].
pub enum AnyBugTracker {
    Jira(JiraTracker),
    FogBugz(FogBugzTracker),
}

impl AnyBugTracker {
    pub fn from_settings(kind: BugTrackerKind, settings: &TrackerSettings) -> Result<Self> {
        match kind {
            BugTrackerKind::Jira => Ok(AnyBugTracker::Jira(JiraTracker::from_settings(settings)?)),
            BugTrackerKind::FogBugz => {
                Ok(AnyBugTracker::FogBugz(FogBugzTracker::from_settings(settings)?))
            }
        }
    }
}

impl BugTracker for AnyBugTracker {
    fn name(&self) -> &str {
        match self {
            AnyBugTracker::Jira(tracker) => tracker.name(),
            AnyBugTracker::FogBugz(tracker) => tracker.name(),
        }
    }

    fn url(&self) -> &str {
        match self {
            AnyBugTracker::Jira(tracker) => tracker.url(),
            AnyBugTracker::FogBugz(tracker) => tracker.url(),
        }
    }

    fn ticket_url(&self, ticket_id: &str, worklog_id: Option<&str>) -> String {
        match self {
            AnyBugTracker::Jira(tracker) => tracker.ticket_url(ticket_id, worklog_id),
            AnyBugTracker::FogBugz(tracker) => tracker.ticket_url(ticket_id, worklog_id),
        }
    }

    fn id_style(&self) -> IdStyle {
        match self {
            AnyBugTracker::Jira(tracker) => tracker.id_style(),
            AnyBugTracker::FogBugz(tracker) => tracker.id_style(),
        }
    }

    async fn get_title(&self, ticket_id: &str) -> Result<String> {
        match self {
            AnyBugTracker::Jira(tracker) => tracker.get_title(ticket_id).await,
            AnyBugTracker::FogBugz(tracker) => tracker.get_title(ticket_id).await,
        }
    }

    async fn timelog_entries(&self, ticket_id: &str) -> Result<Vec<WorklogRecord>> {
        match self {
            AnyBugTracker::Jira(tracker) => tracker.timelog_entries(ticket_id).await,
            AnyBugTracker::FogBugz(tracker) => tracker.timelog_entries(ticket_id).await,
        }
    }

    async fn save_timelog_entry(&self, ticket_id: &str, record: &WorklogRecord) -> Result<bool> {
        match self {
            AnyBugTracker::Jira(tracker) => tracker.save_timelog_entry(ticket_id, record).await,
            AnyBugTracker::FogBugz(tracker) => tracker.save_timelog_entry(ticket_id, record).await,
        }
    }

    async fn delete_worklog(&self, ticket_id: &str, worklog_id: &str) -> Result<bool> {
        match self {
            AnyBugTracker::Jira(tracker) => tracker.delete_worklog(ticket_id, worklog_id).await,
            AnyBugTracker::FogBugz(tracker) => tracker.delete_worklog(ticket_id, worklog_id).await,
        }
    }
}

/// Expands `{ticket}` and `{worklog}` in a link pattern relative to `base`.
pub(crate) fn expand_ticket_url(
    base: &str,
    pattern: &str,
    ticket: &str,
    worklog_id: Option<&str>,
) -> String {
    let path = pattern
        .replace("{ticket}", ticket)
        .replace("{worklog}", worklog_id.unwrap_or_default());
    if path.starts_with("http://") || path.starts_with("https://") {
        return path;
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
