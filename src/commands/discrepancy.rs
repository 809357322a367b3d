//! Cross-checks BugYield worklogs against the Harvest entries they came from.
//!
//! A worklog is in order while its entry still references the ticket. Two
//! kinds of drift are reported:
//!
//! * the entry exists but its notes no longer name the ticket, usually
//!   because the user corrected a typo in the ticket id;
//! * the entry was deleted in Harvest after it had been synchronised.
//!
//! Drift is either repaired by deleting the worklog (when configured and the
//! bug tracker supports it) or mailed to the user who logged the hours.

use std::collections::HashMap;
use std::fmt;

use log::{info, warn};

use super::Context;
use crate::bugtracker::BugTracker;
use crate::comment;
use crate::error::{Error, Result};
use crate::notify::Notifier;
use crate::timetracker::{TimeEntry, TimeTracker};
use crate::worklog::WorklogRecord;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiscrepancyKind {
    /// The entry exists but no longer references the ticket.
    StaleReference,
    /// The entry no longer exists.
    OrphanedWorklog,
}

impl DiscrepancyKind {
    pub fn code(self) -> u8 {
        match self {
            DiscrepancyKind::StaleReference => 1,
            DiscrepancyKind::OrphanedWorklog => 2,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Discrepancy {
    pub kind: DiscrepancyKind,
    pub ticket_id: String,
    pub worklog: WorklogRecord,
    /// Current state of the entry, absent for orphaned worklogs.
    pub entry: Option<TimeEntry>,
}

impl Discrepancy {
    pub fn reason(&self, bugtracker_name: &str) -> String {
        match self.kind {
            DiscrepancyKind::StaleReference => format!(
                "Error 1: Harvest entry #{} no longer references {}, but the hours are still registered on the ticket in {}. \
                 The ticket id has probably been changed or removed in the entry notes.",
                self.worklog.entry_id, self.ticket_id, bugtracker_name
            ),
            DiscrepancyKind::OrphanedWorklog => format!(
                "Error 2: Harvest entry #{} no longer exists, but the hours are still registered on {} in {}. \
                 The entry has probably been deleted in Harvest after it was synchronised.",
                self.worklog.entry_id, self.ticket_id, bugtracker_name
            ),
        }
    }

    pub fn subject(&self) -> String {
        format!(
            "BugYield Synchronisation error found in {} registered {} by {}",
            self.ticket_id, self.worklog.spent_at, self.worklog.user
        )
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DiscrepancySummary {
    pub tickets_checked: usize,
    pub found: usize,
    pub fixed: usize,
    pub fix_failed: usize,
    pub notified: usize,
    pub notify_failed: usize,
}

impl fmt::Display for DiscrepancySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  tickets checked:        {}", self.tickets_checked)?;
        writeln!(f, "  discrepancies found:    {}", self.found)?;
        writeln!(f, "  discrepancies fixed:    {}", self.fixed)?;
        writeln!(f, "  fixes failed:           {}", self.fix_failed)?;
        writeln!(f, "  users notified:         {}", self.notified)?;
        write!(f, "  notifications failed:   {}", self.notify_failed)
    }
}

impl<'a, B, T, N> Context<'a, B, T, N>
where
    B: BugTracker,
    T: TimeTracker,
    N: Notifier,
{
    /// `None` when the worklog is in order or its entry cannot be looked up.
    async fn classify(
        &self,
        ticket_id: &str,
        worklog: &WorklogRecord,
        references: &HashMap<u64, Vec<String>>,
    ) -> Option<Discrepancy> {
        if references
            .get(&worklog.entry_id)
            .is_some_and(|ids| ids.iter().any(|id| id == ticket_id))
        {
            return None;
        }

        let entry = match self.timetracker.entry_by_id(worklog.entry_id).await {
            Ok(entry) => entry,
            Err(err) => {
                warn!("Could not look up Harvest entry #{}: {}", worklog.entry_id, err);
                return None;
            }
        };
        let kind = match &entry {
            Some(current) => {
                let ids = self.bugtracker.referenced_ids(&current.notes);
                if ids.iter().any(|id| id == ticket_id) {
                    return None;
                }
                DiscrepancyKind::StaleReference
            }
            None => DiscrepancyKind::OrphanedWorklog,
        };
        Some(Discrepancy {
            kind,
            ticket_id: ticket_id.to_string(),
            worklog: worklog.clone(),
            entry,
        })
    }

    async fn try_fix(&self, discrepancy: &Discrepancy) -> bool {
        let Some(worklog_id) = discrepancy.worklog.remote_id.as_deref() else {
            warn!("  > Worklog of entry #{} has no remote id", discrepancy.worklog.entry_id);
            return false;
        };
        match self
            .bugtracker
            .delete_worklog(&discrepancy.ticket_id, worklog_id)
            .await
        {
            Ok(true) => {
                info!("  > Deleted worklog {} from {}", worklog_id, discrepancy.ticket_id);
                true
            }
            Ok(false) => {
                warn!(
                    "  > {} does not allow deleting worklog {} from {}",
                    self.bugtracker.name(),
                    worklog_id,
                    discrepancy.ticket_id
                );
                false
            }
            Err(err) => {
                warn!(
                    "  > Could not delete worklog {} from {}: {}",
                    worklog_id, discrepancy.ticket_id, err
                );
                false
            }
        }
    }

    async fn notify_discrepancy(&self, discrepancy: &Discrepancy) -> bool {
        let worklog = &discrepancy.worklog;
        let recipient = match self
            .directory
            .user_by_full_name(self.timetracker, &worklog.user)
            .await
        {
            Ok(user) => user
                .email
                .clone()
                .filter(|email| !email.trim().is_empty())
                .map(|email| (email, Some(user.full_name()))),
            Err(Error::UserNotFound(name)) => {
                warn!("  > No Harvest user named '{}'", name);
                None
            }
            Err(err) => {
                warn!("  > Could not look up Harvest user '{}': {}", worklog.user, err);
                None
            }
        };

        let bugtracker = self.bugtracker.name();
        let harvest_link = discrepancy
            .entry
            .as_ref()
            .map(|entry| self.timetracker.entry_url(entry))
            .unwrap_or_else(|| self.timetracker.url().to_string());
        let current = discrepancy
            .entry
            .as_ref()
            .map(|entry| format!("\"{}\"", entry.notes))
            .unwrap_or_else(|| "ENTRY DELETED".to_string());

        let body = [
            format!("Hi {}", worklog.user),
            String::new(),
            "BugYield found an inconsistency between Harvest and the registration in the bug tracker.".to_string(),
            String::new(),
            discrepancy.reason(bugtracker),
            String::new(),
            format!(
                "Link to {}: {}",
                bugtracker,
                self.bugtracker
                    .ticket_url(&discrepancy.ticket_id, worklog.remote_id.as_deref())
            ),
            format!("Link to Harvest: {}", harvest_link),
            String::new(),
            format!("Current data from Harvest entry: {}", current),
            format!("Current data from {} worklog: {}", bugtracker, comment::encode(worklog)),
            String::new(),
            format!(
                "ACTION: Please correct the entry in Harvest, or delete the worklog in {}.",
                bugtracker
            ),
            String::new(),
            self.options.help_footer(),
        ]
        .join("\n");

        self.notify_with_fallback(recipient, &discrepancy.subject(), &body)
            .await
    }
}

/// Checks every worklog of `ticket_ids`. `references` maps entry ids
/// collected in this run to the tickets they reference; entries outside it
/// are looked up individually.
pub async fn check<B, T, N>(
    ctx: &Context<'_, B, T, N>,
    ticket_ids: &[String],
    references: &HashMap<u64, Vec<String>>,
) -> Result<DiscrepancySummary>
where
    B: BugTracker,
    T: TimeTracker,
    N: Notifier,
{
    let mut summary = DiscrepancySummary::default();
    for ticket_id in ticket_ids {
        summary.tickets_checked += 1;
        let worklogs = match ctx.bugtracker.timelog_entries(ticket_id).await {
            Ok(worklogs) => worklogs,
            Err(err) => {
                warn!("Could not read worklogs of {}: {}", ticket_id, err);
                continue;
            }
        };

        for worklog in &worklogs {
            let Some(discrepancy) = ctx.classify(ticket_id, worklog, references).await else {
                continue;
            };
            summary.found += 1;
            warn!(
                "Discrepancy (error {}) in {}: worklog of entry #{} by {} on {}",
                discrepancy.kind.code(),
                ticket_id,
                worklog.entry_id,
                worklog.user,
                worklog.spent_at
            );

            if ctx.options.fix_missing_references {
                if ctx.try_fix(&discrepancy).await {
                    summary.fixed += 1;
                    continue;
                }
                summary.fix_failed += 1;
            }

            if ctx.notify_discrepancy(&discrepancy).await {
                summary.notified += 1;
            } else {
                summary.notify_failed += 1;
            }
        }
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::fake::FakeBugTracker;
    use crate::commands::Options;
    use crate::notify::fake::FakeNotifier;
    use crate::timetracker::fake::FakeTimeTracker;
    use crate::timetracker::{DirectoryCache, User};
    use crate::worklog::Hours;
    use chrono::NaiveDate;
    use std::cell::RefCell;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()
    }

    fn entry(id: u64, notes: &str) -> TimeEntry {
        TimeEntry {
            id,
            user_id: 7,
            task_id: 3,
            project_id: 1,
            notes: notes.into(),
            hours: Hours::from_centi(100),
            spent_at: day(),
            timer_started_at: None,
            is_running: false,
            locked: false,
        }
    }

    fn worklog(entry_id: u64, user: &str) -> WorklogRecord {
        WorklogRecord::new(entry_id, user, Hours::from_centi(100), day(), "Website", "Dev", "AB-1 work")
            .with_remote_id(format!("wl-{entry_id}"))
    }

    fn timetracker() -> FakeTimeTracker {
        FakeTimeTracker {
            entries: RefCell::new(vec![entry(51, "AB-2 moved"), entry(52, "AB-1[Title] fine")]),
            users: vec![User {
                id: 7,
                first_name: "Ada".into(),
                last_name: "Lovelace".into(),
                email: Some("ada@example.com".into()),
            }],
            ..FakeTimeTracker::default()
        }
    }

    fn bugtracker(can_delete: bool) -> FakeBugTracker {
        FakeBugTracker {
            can_delete,
            ..FakeBugTracker::default()
        }
        .with_worklog("AB-1", worklog(50, "Ada Lovelace"))
        .with_worklog("AB-1", worklog(51, "Ada Lovelace"))
        .with_worklog("AB-1", worklog(52, "Ada Lovelace"))
    }

    fn options() -> Options {
        let mut options = Options::new(day());
        options.admin_email = Some("admin@example.com".into());
        options
    }

    #[tokio::test]
    async fn stale_and_orphaned_worklogs_are_mailed_to_the_user() {
        let timetracker = timetracker();
        let bugtracker = bugtracker(false);
        let notifier = FakeNotifier::default();
        let directory = DirectoryCache::new();
        let options = options();
        let ctx = Context::new(&bugtracker, &timetracker, &notifier, &directory, &options);

        let summary = check(&ctx, &["AB-1".to_string()], &HashMap::new())
            .await
            .expect("check");

        assert_eq!(summary.tickets_checked, 1);
        assert_eq!(summary.found, 2);
        assert_eq!(summary.notified, 2);
        assert!(bugtracker.deletes.borrow().is_empty());

        let sent = notifier.sent.borrow();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|mail| mail.to == "ada@example.com"));
        assert_eq!(
            sent[0].subject,
            "BugYield Synchronisation error found in AB-1 registered 2024-03-04 by Ada Lovelace"
        );
        assert!(sent[0].body.contains("Error 2"));
        assert!(sent[0].body.contains("ENTRY DELETED"));
        assert!(sent[1].body.contains("Error 1"));
        assert!(sent[1].body.contains("\"AB-2 moved\""));
        assert!(sent[1].body.contains("focusedWorklogId=wl-51"));
    }

    #[tokio::test]
    async fn entries_collected_in_this_run_skip_the_lookup() {
        let timetracker = FakeTimeTracker::default();
        let bugtracker = FakeBugTracker::default().with_worklog("AB-1", worklog(60, "Ada Lovelace"));
        let notifier = FakeNotifier::default();
        let directory = DirectoryCache::new();
        let options = options();
        let ctx = Context::new(&bugtracker, &timetracker, &notifier, &directory, &options);

        let references = HashMap::from([(60, vec!["AB-1".to_string()])]);
        let summary = check(&ctx, &["AB-1".to_string()], &references)
            .await
            .expect("check");
        assert_eq!(summary.found, 0);
        assert!(notifier.sent.borrow().is_empty());
    }

    #[tokio::test]
    async fn auto_fix_deletes_offending_worklogs() {
        let timetracker = timetracker();
        let bugtracker = bugtracker(true);
        let notifier = FakeNotifier::default();
        let directory = DirectoryCache::new();
        let mut options = options();
        options.fix_missing_references = true;
        let ctx = Context::new(&bugtracker, &timetracker, &notifier, &directory, &options);

        let summary = check(&ctx, &["AB-1".to_string()], &HashMap::new())
            .await
            .expect("check");

        assert_eq!(summary.fixed, 2);
        assert_eq!(summary.notified, 0);
        assert!(notifier.sent.borrow().is_empty());
        let remaining = bugtracker.worklogs.borrow()["AB-1"].clone();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].entry_id, 52);
    }

    #[tokio::test]
    async fn failed_fix_falls_back_to_a_mail() {
        let timetracker = timetracker();
        let bugtracker = bugtracker(false);
        let notifier = FakeNotifier::default();
        let directory = DirectoryCache::new();
        let mut options = options();
        options.fix_missing_references = true;
        let ctx = Context::new(&bugtracker, &timetracker, &notifier, &directory, &options);

        let summary = check(&ctx, &["AB-1".to_string()], &HashMap::new())
            .await
            .expect("check");
        assert_eq!(summary.fix_failed, 2);
        assert_eq!(summary.notified, 2);
        assert_eq!(bugtracker.deletes.borrow().len(), 2);
    }

    #[tokio::test]
    async fn unknown_user_is_routed_to_the_admin() {
        let timetracker = timetracker();
        let bugtracker = FakeBugTracker::default().with_worklog("AB-1", worklog(50, "Ghost Writer"));
        let notifier = FakeNotifier::default();
        let directory = DirectoryCache::new();
        let options = options();
        let ctx = Context::new(&bugtracker, &timetracker, &notifier, &directory, &options);

        let summary = check(&ctx, &["AB-1".to_string()], &HashMap::new())
            .await
            .expect("check");
        assert_eq!(summary.notified, 1);
        let sent = notifier.sent.borrow();
        assert_eq!(sent[0].to, "admin@example.com");
        assert!(sent[0].subject.starts_with("FALLBACK: BugYield Synchronisation error"));
    }

    #[tokio::test]
    async fn rejected_user_mail_is_retried_to_the_admin() {
        let timetracker = timetracker();
        let bugtracker = FakeBugTracker::default().with_worklog("AB-1", worklog(50, "Ada Lovelace"));
        let notifier = FakeNotifier {
            failing: vec!["ada@example.com".into()],
            ..FakeNotifier::default()
        };
        let directory = DirectoryCache::new();
        let options = options();
        let ctx = Context::new(&bugtracker, &timetracker, &notifier, &directory, &options);

        let summary = check(&ctx, &["AB-1".to_string()], &HashMap::new())
            .await
            .expect("check");
        assert_eq!(summary.notified, 1);
        assert_eq!(notifier.sent.borrow()[0].to, "admin@example.com");
    }
}
