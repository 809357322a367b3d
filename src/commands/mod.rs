//! Commands run against a bug tracker, a time tracker and a mail notifier.

use std::fmt;

use chrono::{Duration, NaiveDate};
use log::{debug, error, info, warn};

use crate::bugtracker::BugTracker;
use crate::error::Result;
use crate::notify::{Mail, Notifier};
use crate::timetracker::{DirectoryCache, Project, TimeEntry, TimeTracker};
use crate::worklog::Hours;

pub mod discrepancy;
pub mod max_hours;
pub mod time_sync;
pub mod title_sync;

pub use discrepancy::{Discrepancy, DiscrepancyKind, DiscrepancySummary};
pub use max_hours::MaxHoursSummary;
pub use time_sync::TimeSyncSummary;
pub use title_sync::TitleSyncSummary;

/// Knobs shared by all commands.
#[derive(Clone, Debug)]
pub struct Options {
    pub today: NaiveDate,
    pub days_back: u32,
    pub max_entry_hours: Option<Hours>,
    pub extended_test: bool,
    pub fix_missing_references: bool,
    /// Copied on every warning or error mail.
    pub notify_on_error: Option<String>,
    /// Receives mails that cannot be delivered to the responsible user.
    pub admin_email: Option<String>,
    /// Sender address quoted in mails as the contact for help.
    pub contact_email: Option<String>,
}

impl Options {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            today,
            days_back: 3,
            max_entry_hours: None,
            extended_test: false,
            fix_missing_references: false,
            notify_on_error: None,
            admin_email: None,
            contact_email: None,
        }
    }

    /// `(from, to)`, both inclusive.
    pub fn window(&self) -> (NaiveDate, NaiveDate) {
        let from = self
            .today
            .checked_sub_signed(Duration::days(i64::from(self.days_back)))
            .unwrap_or(self.today);
        (from, self.today)
    }

    pub(crate) fn help_footer(&self) -> String {
        let contact = self
            .contact_email
            .as_deref()
            .or(self.admin_email.as_deref())
            .unwrap_or("your administrator");
        format!(
            "NOTICE: If you have no clue what you should do to fix your time registration\n\
             in Harvest please ask your friendly BugYield administrator: {}",
            contact
        )
    }
}

/// Collaborators one command run works with.
pub struct Context<'a, B, T, N> {
    pub bugtracker: &'a B,
    pub timetracker: &'a T,
    pub notifier: &'a N,
    pub directory: &'a DirectoryCache,
    pub options: &'a Options,
}

impl<'a, B, T, N> Context<'a, B, T, N>
where
    B: BugTracker,
    T: TimeTracker,
    N: Notifier,
{
    pub fn new(
        bugtracker: &'a B,
        timetracker: &'a T,
        notifier: &'a N,
        directory: &'a DirectoryCache,
        options: &'a Options,
    ) -> Self {
        Self {
            bugtracker,
            timetracker,
            notifier,
            directory,
            options,
        }
    }

    /// Entries of the projects within the window that reference at least one
    /// ticket, ordered by user and entry id.
    pub async fn ticket_entries(
        &self,
        projects: &[Project],
        only_editable: bool,
    ) -> Result<CollectedEntries> {
        let (from, to) = self.options.window();
        info!("Collecting Harvest entries between {} and {}", from, to);
        if only_editable {
            info!("-- Ignoring entries already billed or otherwise closed.");
        }

        let mut collected = Vec::new();
        let mut skipped_no_ticket_ids = 0;
        for project in projects {
            let entries = self
                .timetracker
                .project_entries(project, only_editable, from, to)
                .await?;
            for entry in entries {
                let ticket_ids = self.bugtracker.referenced_ids(&entry.notes);
                if ticket_ids.is_empty() {
                    debug!("SKIPPED (no ticket ids) entry #{}: {}", entry.id, entry.notes);
                    skipped_no_ticket_ids += 1;
                    continue;
                }
                collected.push(TicketEntry {
                    entry,
                    ticket_ids,
                    project_name: project.name.clone(),
                });
            }
        }
        collected.sort_by_key(|item| (item.entry.user_id, item.entry.id));
        info!(
            "Collected {} ticket entries, skipped {} without ticket ids",
            collected.len(),
            skipped_no_ticket_ids
        );
        Ok(CollectedEntries {
            entries: collected,
            skipped_no_ticket_ids,
        })
    }

    /// Mails the user when an address is known, otherwise the admin with a
    /// `FALLBACK: ` subject. A failed delivery to the user is retried to the
    /// admin the same way. Returns whether any mail went out.
    pub async fn notify_with_fallback(
        &self,
        recipient: Option<(String, Option<String>)>,
        subject: &str,
        body: &str,
    ) -> bool {
        let cc = self.options.notify_on_error.as_deref();
        if let Some((email, name)) = recipient {
            let mail = Mail::new(email.as_str(), subject, body).named(name).cc(cc);
            match self.notifier.mail(&mail).await {
                Ok(()) => {
                    info!("  > Email sent to {}", email);
                    return true;
                }
                Err(err) => warn!("  > Could not send email to {}: {}", email, err),
            }
        }

        let Some(admin) = self.options.admin_email.as_deref() else {
            error!("  > No fallback address configured, '{}' was not delivered", subject);
            return false;
        };
        let mail = Mail::new(admin, format!("FALLBACK: {}", subject), body).cc(cc);
        match self.notifier.mail(&mail).await {
            Ok(()) => {
                info!("  > Email sent to fallback address {}", admin);
                true
            }
            Err(err) => {
                error!("  > Could not send email to fallback address {}: {}", admin, err);
                false
            }
        }
    }

    /// Address and display name of a time tracker user, if known.
    pub async fn user_contact(&self, user_id: u64) -> Result<Option<(String, Option<String>)>> {
        let user = self.directory.user(self.timetracker, user_id).await?;
        Ok(user.and_then(|user| {
            user.email
                .clone()
                .filter(|email| !email.trim().is_empty())
                .map(|email| (email, Some(user.full_name())))
        }))
    }

    pub async fn user_label(&self, user_id: u64) -> Result<String> {
        Ok(self
            .directory
            .user_name(self.timetracker, user_id)
            .await?
            .unwrap_or_else(|| format!("User #{}", user_id)))
    }

    pub async fn task_label(&self, task_id: u64) -> Result<String> {
        Ok(self
            .directory
            .task_name(self.timetracker, task_id)
            .await?
            .unwrap_or_else(|| format!("Task #{}", task_id)))
    }
}

/// A time entry together with the tickets its notes reference.
#[derive(Clone, Debug)]
pub struct TicketEntry {
    pub entry: TimeEntry,
    pub ticket_ids: Vec<String>,
    pub project_name: String,
}

/// Result of [`Context::ticket_entries`].
#[derive(Clone, Debug, Default)]
pub struct CollectedEntries {
    pub entries: Vec<TicketEntry>,
    pub skipped_no_ticket_ids: usize,
}

/// Logs the projects a run works on. Returns the active ones when
/// `skip_archived` is set.
pub fn announce_projects(projects: &[Project], skip_archived: bool) -> Vec<Project> {
    let mut selected = Vec::with_capacity(projects.len());
    for project in projects {
        let archived = if project.active {
            String::new()
        } else {
            format!(
                "ARCHIVED (Latest activity: {})",
                project.updated_at.as_deref().unwrap_or("unknown")
            )
        };
        info!(
            "Working with project: {:<40} {:<18} {}",
            project.name,
            project.code.as_deref().unwrap_or(""),
            archived
        );
        if project.active || !skip_archived {
            selected.push(project.clone());
        } else {
            warn!("Skipping archived project {}", project.name);
        }
    }
    selected
}

/// Outcome of a command, printed when the run ends.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Summary {
    TimeSync(TimeSyncSummary),
    TitleSync(TitleSyncSummary),
    MaxHours(MaxHoursSummary),
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Summary::TimeSync(summary) => fmt::Display::fmt(summary, f),
            Summary::TitleSync(summary) => fmt::Display::fmt(summary, f),
            Summary::MaxHours(summary) => fmt::Display::fmt(summary, f),
        }
    }
}
