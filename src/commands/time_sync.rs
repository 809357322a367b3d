//! Copies Harvest hours into worklogs of the referenced tickets.

use std::collections::{HashMap, HashSet};
use std::fmt;

use log::{debug, info, warn};

use super::discrepancy::{self, DiscrepancySummary};
use super::{announce_projects, CollectedEntries, Context, TicketEntry};
use crate::bugtracker::BugTracker;
use crate::comment;
use crate::error::{Error, Result};
use crate::notify::Notifier;
use crate::timetracker::{Project, TimeTracker};
use crate::worklog::WorklogRecord;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TimeSyncSummary {
    pub projects: usize,
    pub entries_collected: usize,
    pub skipped_no_ticket_ids: usize,
    pub skipped_active_timer: usize,
    pub worklogs_saved: usize,
    pub worklogs_unchanged: usize,
    pub max_hours_warnings: usize,
    pub failures: usize,
    pub discrepancies: DiscrepancySummary,
}

impl fmt::Display for TimeSyncSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "TimeSync completed")?;
        writeln!(f, "  projects:               {}", self.projects)?;
        writeln!(f, "  ticket entries:         {}", self.entries_collected)?;
        writeln!(f, "  skipped (no ticket id): {}", self.skipped_no_ticket_ids)?;
        writeln!(f, "  skipped (active timer): {}", self.skipped_active_timer)?;
        writeln!(f, "  worklogs saved:         {}", self.worklogs_saved)?;
        writeln!(f, "  worklogs unchanged:     {}", self.worklogs_unchanged)?;
        writeln!(f, "  max hours warnings:     {}", self.max_hours_warnings)?;
        writeln!(f, "  failed saves:           {}", self.failures)?;
        write!(f, "{}", self.discrepancies)
    }
}

fn failure_body<B: BugTracker>(
    bugtracker: &B,
    ticket_id: &str,
    record: &WorklogRecord,
    err: &Error,
    footer: &str,
) -> String {
    [
        format!(
            "Harvest entry #{} could not be synchronised to {} ticket {}.",
            record.entry_id,
            bugtracker.name(),
            ticket_id
        ),
        String::new(),
        format!("Worklog: {}", comment::encode(record)),
        format!("Date: {}", record.spent_at),
        format!("Link to {}: {}", bugtracker.name(), bugtracker.ticket_url(ticket_id, None)),
        String::new(),
        format!("Error: {}", err),
        String::new(),
        "ACTION: Please check that the ticket exists and that you are allowed to log work on it.".to_string(),
        String::new(),
        footer.to_string(),
    ]
    .join("\n")
}

impl<'a, B, T, N> Context<'a, B, T, N>
where
    B: BugTracker,
    T: TimeTracker,
    N: Notifier,
{
    async fn worklog_record(&self, item: &TicketEntry) -> Result<WorklogRecord> {
        let entry = &item.entry;
        let share = entry.hours.split(item.ticket_ids.len());
        let user = self.user_label(entry.user_id).await?;
        let task = self.task_label(entry.task_id).await?;
        let email = self.directory.user_email(self.timetracker, entry.user_id).await?;
        Ok(WorklogRecord::new(
            entry.id,
            user,
            share,
            entry.spent_at,
            item.project_name.as_str(),
            task,
            &entry.notes,
        )
        .with_email(email))
    }

    async fn report_failure(&self, user_id: u64, ticket_id: &str, record: &WorklogRecord, err: &Error) {
        let recipient = match self.user_contact(user_id).await {
            Ok(recipient) => recipient,
            Err(lookup) => {
                warn!("Could not look up user of entry #{}: {}", record.entry_id, lookup);
                None
            }
        };
        let subject = format!("{}: time sync exception", ticket_id);
        let body = failure_body(
            self.bugtracker,
            ticket_id,
            record,
            err,
            &self.options.help_footer(),
        );
        self.notify_with_fallback(recipient, &subject, &body).await;
    }
}

pub async fn run<B, T, N>(ctx: &Context<'_, B, T, N>, projects: &[Project]) -> Result<TimeSyncSummary>
where
    B: BugTracker,
    T: TimeTracker,
    N: Notifier,
{
    let mut summary = TimeSyncSummary::default();
    let projects = announce_projects(projects, false);
    summary.projects = projects.len();

    let CollectedEntries {
        entries,
        skipped_no_ticket_ids,
    } = ctx.ticket_entries(&projects, true).await?;
    summary.entries_collected = entries.len();
    summary.skipped_no_ticket_ids = skipped_no_ticket_ids;

    let mut references: HashMap<u64, Vec<String>> = HashMap::with_capacity(entries.len());
    let mut touched: Vec<String> = Vec::new();

    for item in &entries {
        let entry = &item.entry;
        references.insert(entry.id, item.ticket_ids.clone());
        if ctx.options.extended_test {
            touched.extend(item.ticket_ids.iter().cloned());
        }

        if entry.timer_active() {
            info!("SKIPPED (active timer) entry #{}: {}", entry.id, entry.notes);
            summary.skipped_active_timer += 1;
            continue;
        }

        let record = ctx.worklog_record(item).await?;
        if let Some(max) = ctx.options.max_entry_hours {
            if record.hours > max {
                ctx.warn_max_hours(max, record.hours, entry, &item.project_name).await?;
                summary.max_hours_warnings += 1;
            }
        }

        for ticket_id in &item.ticket_ids {
            match ctx.bugtracker.save_timelog_entry(ticket_id, &record).await {
                Ok(true) => {
                    info!(
                        "Added/updated worklog for entry #{} on {} ({} hours)",
                        entry.id, ticket_id, record.hours
                    );
                    summary.worklogs_saved += 1;
                    touched.push(ticket_id.clone());
                }
                Ok(false) => {
                    debug!("Worklog for entry #{} on {} is up to date", entry.id, ticket_id);
                    summary.worklogs_unchanged += 1;
                }
                Err(err) => {
                    warn!(
                        "Could not save worklog for entry #{} on {}: {}",
                        entry.id, ticket_id, err
                    );
                    summary.failures += 1;
                    ctx.report_failure(entry.user_id, ticket_id, &record, &err).await;
                }
            }
        }
    }

    let mut seen = HashSet::new();
    touched.retain(|ticket_id| seen.insert(ticket_id.clone()));
    info!("Checking {} tickets for discrepancies", touched.len());
    summary.discrepancies = discrepancy::check(ctx, &touched, &references).await?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::fake::FakeBugTracker;
    use crate::commands::Options;
    use crate::notify::fake::FakeNotifier;
    use crate::timetracker::fake::FakeTimeTracker;
    use crate::timetracker::{DirectoryCache, Task, TimeEntry, User};
    use crate::worklog::Hours;
    use chrono::NaiveDate;
    use std::cell::RefCell;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()
    }

    fn entry(id: u64, centi: u64, notes: &str) -> TimeEntry {
        TimeEntry {
            id,
            user_id: 7,
            task_id: 3,
            project_id: 1,
            notes: notes.into(),
            hours: Hours::from_centi(centi),
            spent_at: day(),
            timer_started_at: None,
            is_running: false,
            locked: false,
        }
    }

    fn timetracker(entries: Vec<TimeEntry>) -> FakeTimeTracker {
        FakeTimeTracker {
            projects: vec![Project {
                id: 1,
                name: "Website".into(),
                code: Some("WEB".into()),
                active: true,
                updated_at: None,
            }],
            entries: RefCell::new(entries),
            users: vec![User {
                id: 7,
                first_name: "Ada".into(),
                last_name: "Lovelace".into(),
                email: Some("ada@example.com".into()),
            }],
            tasks: vec![Task { id: 3, name: "Development".into() }],
            ..FakeTimeTracker::default()
        }
    }

    fn options() -> Options {
        let mut options = Options::new(day());
        options.admin_email = Some("admin@example.com".into());
        options
    }

    #[tokio::test]
    async fn hours_are_split_evenly_across_tickets() {
        let timetracker = timetracker(vec![entry(1, 200, "#ID-3 #ID-4")]);
        let bugtracker = FakeBugTracker::default();
        let notifier = FakeNotifier::default();
        let directory = DirectoryCache::new();
        let options = options();
        let ctx = Context::new(&bugtracker, &timetracker, &notifier, &directory, &options);

        let summary = run(&ctx, &timetracker.projects.clone()).await.expect("run");

        assert_eq!(summary.entries_collected, 1);
        assert_eq!(summary.worklogs_saved, 2);
        let saves = bugtracker.saves.borrow();
        let tickets: Vec<&str> = saves.iter().map(|(ticket, _)| ticket.as_str()).collect();
        assert_eq!(tickets, ["ID-3", "ID-4"]);
        for (_, record) in saves.iter() {
            assert_eq!(record.hours, Hours::from_centi(100));
            assert_eq!(record.user, "Ada Lovelace");
            assert_eq!(record.task, "Development");
            assert_eq!(record.project, "Website");
            assert_eq!(record.user_email.as_deref(), Some("ada@example.com"));
        }
        assert_eq!(summary.discrepancies.tickets_checked, 2);
        assert_eq!(summary.discrepancies.found, 0);
    }

    #[tokio::test]
    async fn second_run_writes_nothing() {
        let timetracker = timetracker(vec![entry(1, 150, "AB-1 review")]);
        let bugtracker = FakeBugTracker::default();
        let notifier = FakeNotifier::default();
        let directory = DirectoryCache::new();
        let options = options();
        let ctx = Context::new(&bugtracker, &timetracker, &notifier, &directory, &options);
        let projects = timetracker.projects.clone();

        let first = run(&ctx, &projects).await.expect("first run");
        let second = run(&ctx, &projects).await.expect("second run");

        assert_eq!(first.worklogs_saved, 1);
        assert_eq!(second.worklogs_saved, 0);
        assert_eq!(second.worklogs_unchanged, 1);
        assert_eq!(*bugtracker.writes.borrow(), 1);
        assert_eq!(second.discrepancies.tickets_checked, 0);
    }

    #[tokio::test]
    async fn entries_without_ticket_ids_are_counted() {
        let timetracker = timetracker(vec![
            entry(1, 100, "AB-1 done"),
            entry(2, 50, "standup"),
            entry(3, 50, "1-on-1 with Bob"),
        ]);
        let bugtracker = FakeBugTracker::default();
        let notifier = FakeNotifier::default();
        let directory = DirectoryCache::new();
        let options = options();
        let ctx = Context::new(&bugtracker, &timetracker, &notifier, &directory, &options);

        let summary = run(&ctx, &timetracker.projects.clone()).await.expect("run");

        assert_eq!(summary.entries_collected, 1);
        assert_eq!(summary.skipped_no_ticket_ids, 2);
        assert_eq!(summary.worklogs_saved, 1);
        assert!(summary.to_string().contains("skipped (no ticket id): 2"));
    }

    #[tokio::test]
    async fn active_timers_are_never_written() {
        let mut running = entry(2, 100, "AB-5 live");
        running.timer_started_at = Some("2024-03-04T09:00:00Z".into());
        let timetracker = timetracker(vec![entry(1, 100, "AB-1 done"), running]);
        let bugtracker = FakeBugTracker::default();
        let notifier = FakeNotifier::default();
        let directory = DirectoryCache::new();
        let options = options();
        let ctx = Context::new(&bugtracker, &timetracker, &notifier, &directory, &options);

        let summary = run(&ctx, &timetracker.projects.clone()).await.expect("run");

        assert_eq!(summary.skipped_active_timer, 1);
        assert!(bugtracker.saves.borrow().iter().all(|(_, record)| record.entry_id != 2));
        assert!(timetracker.updates.borrow().is_empty());
        assert!(bugtracker.deletes.borrow().is_empty());
    }

    #[tokio::test]
    async fn one_failing_ticket_does_not_stop_the_others() {
        let timetracker = timetracker(vec![entry(1, 200, "AB-1 AB-2"), entry(2, 100, "AB-3")]);
        let bugtracker = FakeBugTracker {
            failing_tickets: ["AB-1".to_string()].into_iter().collect(),
            ..FakeBugTracker::default()
        };
        let notifier = FakeNotifier::default();
        let directory = DirectoryCache::new();
        let mut options = options();
        options.notify_on_error = Some("pm@example.com".into());
        let ctx = Context::new(&bugtracker, &timetracker, &notifier, &directory, &options);

        let summary = run(&ctx, &timetracker.projects.clone()).await.expect("run");

        assert_eq!(summary.failures, 1);
        assert_eq!(summary.worklogs_saved, 2);
        let sent = notifier.sent.borrow();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "AB-1: time sync exception");
        assert_eq!(sent[0].to, "ada@example.com");
        assert_eq!(sent[0].cc.as_deref(), Some("pm@example.com"));
        assert!(sent[0].body.contains("Entry #1 [1/Development]"));
    }

    #[tokio::test]
    async fn oversized_share_warns_but_still_syncs() {
        let timetracker = timetracker(vec![entry(1, 2000, "AB-1 marathon")]);
        let bugtracker = FakeBugTracker::default();
        let notifier = FakeNotifier::default();
        let directory = DirectoryCache::new();
        let mut options = options();
        options.max_entry_hours = Some(Hours::from_centi(800));
        let ctx = Context::new(&bugtracker, &timetracker, &notifier, &directory, &options);

        let summary = run(&ctx, &timetracker.projects.clone()).await.expect("run");

        assert_eq!(summary.max_hours_warnings, 1);
        assert_eq!(summary.worklogs_saved, 1);
        assert_eq!(
            notifier.sent.borrow()[0].subject,
            "BugYield warning: 20 hours registered on AB-1 marathon. Really?"
        );
    }

    #[tokio::test]
    async fn extended_test_checks_untouched_tickets_too() {
        let timetracker = timetracker(vec![entry(1, 100, "AB-1 review")]);
        let bugtracker = FakeBugTracker::default()
            .with_worklog(
                "AB-1",
                WorklogRecord::new(1, "Ada Lovelace", Hours::from_centi(100), day(), "Website", "Development", "AB-1 review")
                    .with_remote_id("wl-1"),
            )
            .with_worklog(
                "AB-1",
                WorklogRecord::new(99, "Ada Lovelace", Hours::from_centi(100), day(), "Website", "Development", "gone")
                    .with_remote_id("wl-99"),
            );
        let notifier = FakeNotifier::default();
        let directory = DirectoryCache::new();
        let mut options = options();
        options.extended_test = true;
        let ctx = Context::new(&bugtracker, &timetracker, &notifier, &directory, &options);

        let summary = run(&ctx, &timetracker.projects.clone()).await.expect("run");

        assert_eq!(summary.worklogs_unchanged, 1);
        assert_eq!(summary.discrepancies.tickets_checked, 1);
        assert_eq!(summary.discrepancies.found, 1);
        assert_eq!(summary.discrepancies.notified, 1);
    }
}
