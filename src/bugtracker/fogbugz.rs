//! FogBugz backend. Worklogs are case events; the case keeps a running total
//! of elapsed hours that is recomputed on every save.

use log::warn;
use tracker_api::{EventText, FogBugzCase, FogBugzClient, FogBugzEvent};

use super::{expand_ticket_url, BugTracker};
use crate::comment;
use crate::config::TrackerSettings;
use crate::error::{Error, Result};
use crate::ticket_ids::IdStyle;
use crate::worklog::{Hours, WorklogRecord};

pub const DEFAULT_TICKET_PATTERN: &str = "/default.asp?{ticket}#BugEvent.{worklog}";

const TITLE_COLUMNS: &[&str] = &["sTitle"];
const WORKLOG_COLUMNS: &[&str] = &["sTitle", "hrsElapsedExtra", "events"];

pub struct FogBugzTracker {
    url: String,
    ticket_pattern: String,
    client: FogBugzClient,
}

impl FogBugzTracker {
    pub fn new(url: &str, client: FogBugzClient) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            ticket_pattern: DEFAULT_TICKET_PATTERN.to_string(),
            client,
        }
    }

    pub fn from_settings(settings: &TrackerSettings) -> Result<Self> {
        let token = settings
            .token
            .as_deref()
            .ok_or_else(|| Error::Config("FogBugz token is required".into()))?;
        let mut tracker = Self::new(&settings.url, FogBugzClient::new(&settings.url, token)?);
        if let Some(pattern) = &settings.url_ticket_pattern {
            tracker.ticket_pattern = pattern.clone();
        }
        Ok(tracker)
    }

    async fn case(&self, ticket_id: &str, columns: &[&str]) -> Result<FogBugzCase> {
        let number = case_number(ticket_id)?;
        self.client
            .find_case(number, columns)
            .await?
            .ok_or_else(|| Error::TicketNotFound(ticket_id.to_string()))
    }
}

fn case_number(ticket_id: &str) -> Result<u64> {
    ticket_id
        .trim()
        .trim_start_matches('#')
        .parse()
        .map_err(|_| Error::TicketNotFound(ticket_id.to_string()))
}

/// Reduces an HTML event rendering to the text BugYield wrote.
fn html_to_text(html: &str) -> String {
    let mut stripped = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => stripped.push(c),
            _ => {}
        }
    }
    html_escape::decode_html_entities(&stripped)
        .replace('\u{a0}', " ")
        .trim()
        .to_string()
}

/// Plain event text is taken verbatim.
fn event_text(event: &FogBugzEvent) -> Option<String> {
    match event.text()? {
        EventText::Plain(text) => Some(text.to_string()),
        EventText::Html(html) => Some(html_to_text(html)),
    }
}

/// Latest event per time entry, in order of first appearance.
fn case_worklogs(case: &FogBugzCase) -> Vec<WorklogRecord> {
    let mut records: Vec<WorklogRecord> = Vec::new();
    for event in &case.events {
        let Some(text) = event_text(event) else {
            continue;
        };
        let Some(decoded) = comment::decode(&text) else {
            continue;
        };
        let (Some(hours), Some(spent_at)) = (decoded.hours, decoded.spent_at) else {
            continue;
        };
        let record = decoded
            .into_record(hours, spent_at)
            .with_remote_id(event.ix_bug_event.to_string());
        match records.iter_mut().find(|known| known.entry_id == record.entry_id) {
            Some(known) => *known = record,
            None => records.push(record),
        }
    }
    records
}

impl BugTracker for FogBugzTracker {
    fn name(&self) -> &str {
        "FogBugz"
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn ticket_url(&self, ticket_id: &str, worklog_id: Option<&str>) -> String {
        expand_ticket_url(
            &self.url,
            &self.ticket_pattern,
            ticket_id.trim_start_matches('#'),
            worklog_id,
        )
    }

    fn id_style(&self) -> IdStyle {
        IdStyle::Numeric
    }

    async fn get_title(&self, ticket_id: &str) -> Result<String> {
        self.case(ticket_id, TITLE_COLUMNS)
            .await?
            .s_title
            .ok_or_else(|| Error::TicketNotFound(ticket_id.to_string()))
    }

    async fn timelog_entries(&self, ticket_id: &str) -> Result<Vec<WorklogRecord>> {
        let case = self.case(ticket_id, WORKLOG_COLUMNS).await?;
        Ok(case_worklogs(&case))
    }

    async fn save_timelog_entry(&self, ticket_id: &str, record: &WorklogRecord) -> Result<bool> {
        let case = self.case(ticket_id, WORKLOG_COLUMNS).await?;
        let worklogs = case_worklogs(&case);
        let existing = worklogs
            .iter()
            .find(|remote| remote.entry_id == record.entry_id);

        match existing {
            Some(remote) if record.matches(remote) => return Ok(false),
            None if record.hours.is_zero() => return Ok(false),
            _ => {}
        }

        let logged: Hours = worklogs.iter().map(|remote| remote.hours).sum();
        let elapsed = logged - existing.map(|remote| remote.hours).unwrap_or_default() + record.hours;
        let event = comment::encode_event(record, existing.is_some());
        self.client
            .edit_case(case.ix_bug, &event, elapsed.as_f64())
            .await?;
        Ok(true)
    }

    async fn delete_worklog(&self, ticket_id: &str, worklog_id: &str) -> Result<bool> {
        warn!(
            "FogBugz events cannot be deleted, event {} on {} stays",
            worklog_id, ticket_id
        );
        Ok(false)
    }
}
