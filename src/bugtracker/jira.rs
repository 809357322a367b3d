//! Jira backend: `ABC-123` ids, one worklog per time entry and ticket.

use std::collections::HashMap;

use chrono::NaiveDate;
use log::{debug, warn};
use tracker_api::{ApiError, JiraClient, JiraWorklog, JiraWorklogInput};

use super::{expand_ticket_url, BugTracker};
use crate::comment;
use crate::config::TrackerSettings;
use crate::error::{Error, Result};
use crate::ticket_ids::IdStyle;
use crate::worklog::{Hours, WorklogRecord};

pub const DEFAULT_TICKET_PATTERN: &str = "/browse/{ticket}?focusedWorklogId={worklog}";

pub struct JiraTracker {
    url: String,
    ticket_pattern: String,
    admin: JiraClient,
    /// Clients logged in as individual users, keyed by lowercase email.
    user_clients: HashMap<String, JiraClient>,
    individual_logins: bool,
    allow_admin: bool,
}

impl JiraTracker {
    pub fn new(url: &str, admin: JiraClient) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            ticket_pattern: DEFAULT_TICKET_PATTERN.to_string(),
            admin,
            user_clients: HashMap::new(),
            individual_logins: false,
            allow_admin: false,
        }
    }

    pub fn from_settings(settings: &TrackerSettings) -> Result<Self> {
        let username = settings
            .username
            .as_deref()
            .ok_or_else(|| Error::Config("Jira username is required".into()))?;
        let password = settings
            .password
            .as_deref()
            .ok_or_else(|| Error::Config("Jira password is required".into()))?;

        let mut tracker = Self::new(&settings.url, JiraClient::new(&settings.url, username, password)?)
            .with_individual_logins(settings.worklog_individual_logins, settings.worklog_allow_admin);
        if let Some(pattern) = &settings.url_ticket_pattern {
            tracker = tracker.with_ticket_pattern(pattern);
        }
        if settings.worklog_individual_logins {
            for (email, login) in &settings.users {
                let client = JiraClient::new(&settings.url, &login.username, &login.password)?;
                tracker = tracker.with_user_client(email, client);
            }
        }
        Ok(tracker)
    }

    pub fn with_ticket_pattern(mut self, pattern: &str) -> Self {
        self.ticket_pattern = pattern.to_string();
        self
    }

    pub fn with_individual_logins(mut self, enabled: bool, allow_admin: bool) -> Self {
        self.individual_logins = enabled;
        self.allow_admin = allow_admin;
        self
    }

    pub fn with_user_client(mut self, email: &str, client: JiraClient) -> Self {
        self.user_clients.insert(email.to_ascii_lowercase(), client);
        self
    }

    /// Client that writes worklogs on behalf of the record's user.
    fn writer_for(&self, record: &WorklogRecord) -> Result<&JiraClient> {
        if !self.individual_logins {
            return Ok(&self.admin);
        }
        let login = record
            .user_email
            .as_deref()
            .and_then(|email| self.user_clients.get(&email.to_ascii_lowercase()));
        match login {
            Some(client) => Ok(client),
            None if self.allow_admin => {
                debug!(
                    "No Jira login for {}, writing as {}",
                    record.user,
                    self.admin.username()
                );
                Ok(&self.admin)
            }
            None => Err(Error::MissingCredentials(
                record.user_email.clone().unwrap_or_else(|| record.user.clone()),
            )),
        }
    }

    fn decode_worklog(worklog: JiraWorklog) -> Option<WorklogRecord> {
        let decoded = comment::decode(worklog.comment.as_deref()?)?;
        let spent_at = NaiveDate::parse_from_str(worklog.started_date()?, "%Y-%m-%d").ok()?;
        let hours = Hours::from_seconds(worklog.time_spent_seconds);
        Some(decoded.into_record(hours, spent_at).with_remote_id(worklog.id))
    }
}

/// Jira wants a full timestamp; noon keeps the day stable across zones.
fn started_timestamp(date: NaiveDate) -> String {
    format!("{}T12:00:00.000+0000", date.format("%Y-%m-%d"))
}

impl BugTracker for JiraTracker {
    fn name(&self) -> &str {
        "Jira"
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn ticket_url(&self, ticket_id: &str, worklog_id: Option<&str>) -> String {
        expand_ticket_url(&self.url, &self.ticket_pattern, ticket_id, worklog_id)
    }

    fn id_style(&self) -> IdStyle {
        IdStyle::Keyed
    }

    async fn get_title(&self, ticket_id: &str) -> Result<String> {
        match self.admin.get_issue(ticket_id).await {
            Ok(issue) => issue
                .fields
                .summary
                .ok_or_else(|| Error::TicketNotFound(ticket_id.to_string())),
            Err(ApiError::NotFound(_)) => Err(Error::TicketNotFound(ticket_id.to_string())),
            Err(err) => Err(err.into()),
        }
    }

    async fn timelog_entries(&self, ticket_id: &str) -> Result<Vec<WorklogRecord>> {
        let worklogs = match self.admin.get_worklogs(ticket_id).await {
            Ok(worklogs) => worklogs,
            Err(ApiError::NotFound(_)) => return Err(Error::TicketNotFound(ticket_id.to_string())),
            Err(err) => return Err(err.into()),
        };
        Ok(worklogs.into_iter().filter_map(Self::decode_worklog).collect())
    }

    async fn save_timelog_entry(&self, ticket_id: &str, record: &WorklogRecord) -> Result<bool> {
        let existing = self
            .timelog_entries(ticket_id)
            .await?
            .into_iter()
            .find(|remote| remote.entry_id == record.entry_id);

        if record.hours.is_zero() {
            let Some(worklog_id) = existing.and_then(|remote| remote.remote_id) else {
                return Ok(false);
            };
            self.writer_for(record)?
                .delete_worklog(ticket_id, &worklog_id)
                .await?;
            debug!("Removed empty worklog {} from {}", worklog_id, ticket_id);
            return Ok(true);
        }

        if existing.as_ref().is_some_and(|remote| record.matches(remote)) {
            return Ok(false);
        }

        let client = self.writer_for(record)?;
        let input = JiraWorklogInput {
            comment: comment::encode(record),
            started: started_timestamp(record.spent_at),
            time_spent_seconds: record.hours.to_seconds(),
        };
        match existing.and_then(|remote| remote.remote_id) {
            Some(worklog_id) => {
                client.update_worklog(ticket_id, &worklog_id, &input).await?;
            }
            None => {
                client.add_worklog(ticket_id, &input).await?;
            }
        }
        Ok(true)
    }

    async fn delete_worklog(&self, ticket_id: &str, worklog_id: &str) -> Result<bool> {
        match self.admin.delete_worklog(ticket_id, worklog_id).await {
            Ok(()) => Ok(true),
            Err(ApiError::NotFound(_)) => {
                warn!("Worklog {} on {} no longer exists", worklog_id, ticket_id);
                Ok(false)
            }
            Err(err) => Err(err.into()),
        }
    }
}
