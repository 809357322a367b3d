//! Warns users about single time entries with implausibly many hours.

use std::fmt;

use log::{debug, info, warn};

use super::{announce_projects, Context, Options};
use crate::bugtracker::BugTracker;
use crate::error::Result;
use crate::notify::Notifier;
use crate::timetracker::{Project, TimeEntry, TimeTracker};
use crate::worklog::Hours;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MaxHoursSummary {
    pub entries_checked: usize,
    pub skipped_active_timer: usize,
    pub warnings_sent: usize,
    pub warnings_failed: usize,
}

impl fmt::Display for MaxHoursSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "MaxHoursCheck completed")?;
        writeln!(f, "  ticket entries checked: {}", self.entries_checked)?;
        writeln!(f, "  skipped (active timer): {}", self.skipped_active_timer)?;
        writeln!(f, "  warnings sent:          {}", self.warnings_sent)?;
        write!(f, "  warnings not delivered: {}", self.warnings_failed)
    }
}

pub(crate) fn warning_subject(hours: Hours, entry: &TimeEntry) -> String {
    format!(
        "BugYield warning: {} hours registered on {}. Really?",
        hours, entry.notes
    )
}

pub(crate) fn warning_body(
    options: &Options,
    max: Hours,
    entry: &TimeEntry,
    user: &str,
    project: &str,
    entry_url: &str,
) -> String {
    [
        format!(
            "The following Harvest entry seems invalid due to more than {} registered hours on one task:",
            max
        ),
        String::new(),
        format!(
            "Entry #{} by {} on {} in \"{}\": {} hours, \"{}\"",
            entry.id, user, entry.spent_at, project, entry.hours, entry.notes
        ),
        format!("Link to Harvest: {}", entry_url),
        String::new(),
        "ACTION: Please review the time entry.".to_string(),
        format!(
            "If it is actually valid, then you have to split it up in separate entries below {} hours in order to avoid this message.",
            max
        ),
        String::new(),
        options.help_footer(),
    ]
    .join("\n")
}

impl<'a, B, T, N> Context<'a, B, T, N>
where
    B: BugTracker,
    T: TimeTracker,
    N: Notifier,
{
    /// Mails the entry's user about `hours` exceeding the configured limit.
    pub(crate) async fn warn_max_hours(
        &self,
        max: Hours,
        hours: Hours,
        entry: &TimeEntry,
        project: &str,
    ) -> Result<bool> {
        let user = self.user_label(entry.user_id).await?;
        warn!(
            "WARNING: More than {} hours registered on {}: {} ({} hours). Email sent to user.",
            max, entry.id, entry.notes, hours
        );
        let subject = warning_subject(hours, entry);
        let body = warning_body(
            self.options,
            max,
            entry,
            &user,
            project,
            &self.timetracker.entry_url(entry),
        );
        let recipient = self.user_contact(entry.user_id).await?;
        Ok(self.notify_with_fallback(recipient, &subject, &body).await)
    }
}

pub async fn run<B, T, N>(ctx: &Context<'_, B, T, N>, projects: &[Project]) -> Result<MaxHoursSummary>
where
    B: BugTracker,
    T: TimeTracker,
    N: Notifier,
{
    let mut summary = MaxHoursSummary::default();
    let Some(max) = ctx.options.max_entry_hours else {
        info!("max_entry_hours is not configured, nothing to check");
        return Ok(summary);
    };

    let projects = announce_projects(projects, false);
    let collected = ctx.ticket_entries(&projects, false).await?;
    for item in &collected.entries {
        let entry = &item.entry;
        summary.entries_checked += 1;
        if entry.timer_active() {
            debug!("SKIPPED (active timer) entry #{}: {}", entry.id, entry.notes);
            summary.skipped_active_timer += 1;
            continue;
        }
        if entry.hours <= max {
            continue;
        }
        if ctx.warn_max_hours(max, entry.hours, entry, &item.project_name).await? {
            summary.warnings_sent += 1;
        } else {
            summary.warnings_failed += 1;
        }
    }
    Ok(summary)
}
