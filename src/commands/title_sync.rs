//! Writes current ticket titles back into Harvest entry notes.

use std::collections::HashMap;
use std::fmt;

use log::{debug, error, info, warn};

use super::{announce_projects, CollectedEntries, Context};
use crate::bugtracker::BugTracker;
use crate::error::Result;
use crate::notify::Notifier;
use crate::timetracker::{Project, TimeTracker};
use crate::titles;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TitleSyncSummary {
    pub projects: usize,
    pub entries_collected: usize,
    pub skipped_no_ticket_ids: usize,
    pub skipped_active_timer: usize,
    pub notes_updated: usize,
    pub unchanged: usize,
    pub title_lookups_failed: usize,
    pub failures: usize,
}

impl fmt::Display for TitleSyncSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "TitleSync completed")?;
        writeln!(f, "  projects:               {}", self.projects)?;
        writeln!(f, "  ticket entries:         {}", self.entries_collected)?;
        writeln!(f, "  skipped (no ticket id): {}", self.skipped_no_ticket_ids)?;
        writeln!(f, "  skipped (active timer): {}", self.skipped_active_timer)?;
        writeln!(f, "  notes updated:          {}", self.notes_updated)?;
        writeln!(f, "  notes unchanged:        {}", self.unchanged)?;
        writeln!(f, "  title lookups failed:   {}", self.title_lookups_failed)?;
        write!(f, "  failed updates:         {}", self.failures)
    }
}

pub async fn run<B, T, N>(ctx: &Context<'_, B, T, N>, projects: &[Project]) -> Result<TitleSyncSummary>
where
    B: BugTracker,
    T: TimeTracker,
    N: Notifier,
{
    let mut summary = TitleSyncSummary::default();
    let projects = announce_projects(projects, true);
    summary.projects = projects.len();

    let CollectedEntries {
        entries,
        skipped_no_ticket_ids,
    } = ctx.ticket_entries(&projects, true).await?;
    summary.entries_collected = entries.len();
    summary.skipped_no_ticket_ids = skipped_no_ticket_ids;

    // Ticket id to title, `None` when the lookup failed.
    let mut titles: HashMap<String, Option<String>> = HashMap::new();

    for item in &entries {
        let entry = &item.entry;
        if entry.timer_active() {
            info!("SKIPPED (active timer) entry #{}: {}", entry.id, entry.notes);
            summary.skipped_active_timer += 1;
            continue;
        }

        for ticket_id in &item.ticket_ids {
            if titles.contains_key(ticket_id) {
                continue;
            }
            let title = match ctx.bugtracker.get_title(ticket_id).await {
                Ok(title) => Some(title),
                Err(err) => {
                    warn!("Could not fetch title of {}: {}", ticket_id, err);
                    summary.title_lookups_failed += 1;
                    None
                }
            };
            titles.insert(ticket_id.clone(), title);
        }

        let Some(notes) = titles::inject_titles(&entry.notes, &titles, ctx.bugtracker.id_style())
        else {
            debug!("Entry #{} already carries current titles", entry.id);
            summary.unchanged += 1;
            continue;
        };

        match ctx.timetracker.update_entry_notes(entry, &notes).await {
            Ok(()) => {
                info!("Updated entry #{}: {}", entry.id, notes);
                summary.notes_updated += 1;
            }
            Err(err) => {
                error!("Could not update entry #{} with '{}': {}", entry.id, notes, err);
                summary.failures += 1;
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
    use crate::timetracker::{DirectoryCache, TimeEntry};
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

    fn project(id: u64, active: bool) -> Project {
        Project {
            id,
            name: format!("Project {id}"),
            code: None,
            active,
            updated_at: None,
        }
    }

    fn bugtracker() -> FakeBugTracker {
        FakeBugTracker {
            titles: HashMap::from([
                ("AB-1".to_string(), "Login fails".to_string()),
                ("AB-2".to_string(), "Bug [blocker]".to_string()),
            ]),
            ..FakeBugTracker::default()
        }
    }

    #[tokio::test]
    async fn titles_are_written_back_once() {
        let mut locked = entry(4, "AB-1 billed");
        locked.locked = true;
        let mut running = entry(5, "AB-1 live");
        running.is_running = true;
        let timetracker = FakeTimeTracker {
            entries: RefCell::new(vec![
                entry(1, "ab-1 fixing"),
                entry(2, "AB-2[Bug \\[blocker\\]] review"),
                entry(3, "AB-1[Old title] and AB-2"),
                locked,
                running,
            ]),
            ..FakeTimeTracker::default()
        };
        let bugtracker = bugtracker();
        let notifier = FakeNotifier::default();
        let directory = DirectoryCache::new();
        let options = Options::new(day());
        let ctx = Context::new(&bugtracker, &timetracker, &notifier, &directory, &options);

        let summary = run(&ctx, &[project(1, true)]).await.expect("run");

        assert_eq!(summary.entries_collected, 4);
        assert_eq!(summary.skipped_active_timer, 1);
        assert_eq!(summary.notes_updated, 2);
        assert_eq!(summary.unchanged, 1);
        assert_eq!(
            *timetracker.updates.borrow(),
            vec![
                (1, "AB-1[Login fails] fixing".to_string()),
                (3, "AB-1[Login fails] and AB-2[Bug \\[blocker\\]]".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn failed_lookups_leave_ids_alone() {
        let timetracker = FakeTimeTracker {
            entries: RefCell::new(vec![entry(1, "AB-1 and AB-9"), entry(2, "AB-9 again")]),
            ..FakeTimeTracker::default()
        };
        let bugtracker = bugtracker();
        let notifier = FakeNotifier::default();
        let directory = DirectoryCache::new();
        let options = Options::new(day());
        let ctx = Context::new(&bugtracker, &timetracker, &notifier, &directory, &options);

        let summary = run(&ctx, &[project(1, true)]).await.expect("run");

        assert_eq!(summary.title_lookups_failed, 1);
        assert_eq!(summary.notes_updated, 1);
        assert_eq!(summary.unchanged, 1);
        assert_eq!(
            timetracker.updates.borrow()[0],
            (1, "AB-1[Login fails] and AB-9".to_string())
        );
    }

    #[tokio::test]
    async fn entries_without_ticket_ids_are_counted() {
        let timetracker = FakeTimeTracker {
            entries: RefCell::new(vec![entry(1, "AB-1"), entry(2, "planning"), entry(3, "1-on-1")]),
            ..FakeTimeTracker::default()
        };
        let bugtracker = bugtracker();
        let notifier = FakeNotifier::default();
        let directory = DirectoryCache::new();
        let options = Options::new(day());
        let ctx = Context::new(&bugtracker, &timetracker, &notifier, &directory, &options);

        let summary = run(&ctx, &[project(1, true)]).await.expect("run");
        assert_eq!(summary.entries_collected, 1);
        assert_eq!(summary.skipped_no_ticket_ids, 2);
        assert!(summary.to_string().contains("skipped (no ticket id): 2"));
    }

    #[tokio::test]
    async fn rejected_updates_are_counted() {
        let timetracker = FakeTimeTracker {
            entries: RefCell::new(vec![entry(1, "AB-1")]),
            fail_updates: true,
            ..FakeTimeTracker::default()
        };
        let bugtracker = bugtracker();
        let notifier = FakeNotifier::default();
        let directory = DirectoryCache::new();
        let options = Options::new(day());
        let ctx = Context::new(&bugtracker, &timetracker, &notifier, &directory, &options);

        let summary = run(&ctx, &[project(1, true)]).await.expect("run");
        assert_eq!(summary.failures, 1);
        assert_eq!(summary.notes_updated, 0);
    }

    #[tokio::test]
    async fn archived_projects_are_left_alone() {
        let timetracker = FakeTimeTracker {
            entries: RefCell::new(vec![entry(1, "AB-1")]),
            ..FakeTimeTracker::default()
        };
        let bugtracker = bugtracker();
        let notifier = FakeNotifier::default();
        let directory = DirectoryCache::new();
        let options = Options::new(day());
        let ctx = Context::new(&bugtracker, &timetracker, &notifier, &directory, &options);

        let summary = run(&ctx, &[project(1, false)]).await.expect("run");
        assert_eq!(summary.projects, 0);
        assert!(timetracker.updates.borrow().is_empty());
    }
}
