//! Time tracking capability, its data model and the run-scoped user/task cache.

use chrono::NaiveDate;
use log::warn;
use tokio::sync::OnceCell;

use crate::error::{Error, Result};
use crate::worklog::Hours;

pub mod harvest;

pub use harvest::HarvestTracker;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Project {
    pub id: u64,
    pub name: String,
    pub code: Option<String>,
    pub active: bool,
    /// Last change reported by the time tracker, shown for archived projects.
    pub updated_at: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct User {
    pub id: u64,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
            .trim()
            .to_string()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Task {
    pub id: u64,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TimeEntry {
    pub id: u64,
    pub user_id: u64,
    pub task_id: u64,
    pub project_id: u64,
    pub notes: String,
    pub hours: Hours,
    pub spent_at: NaiveDate,
    pub timer_started_at: Option<String>,
    pub is_running: bool,
    /// Billed or closed; such entries can no longer be edited.
    pub locked: bool,
}

impl TimeEntry {
    pub fn timer_active(&self) -> bool {
        self.is_running
            || self
                .timer_started_at
                .as_deref()
                .is_some_and(|started| !started.trim().is_empty())
    }
}

/// Operations BugYield needs from a time tracker.
#[allow(async_fn_in_trait)]
pub trait TimeTracker {
    fn name(&self) -> &str;

    fn url(&self) -> &str;

    /// Web link to the day view holding the entry.
    fn entry_url(&self, entry: &TimeEntry) -> String;

    async fn list_projects(&self) -> Result<Vec<Project>>;

    /// Entries of the project spent within `from..=to`. With `only_editable`
    /// locked entries are left out.
    async fn project_entries(
        &self,
        project: &Project,
        only_editable: bool,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<TimeEntry>>;

    async fn list_users(&self) -> Result<Vec<User>>;

    async fn list_tasks(&self) -> Result<Vec<Task>>;

    /// `Ok(None)` when the entry no longer exists.
    async fn entry_by_id(&self, entry_id: u64) -> Result<Option<TimeEntry>>;

    async fn update_entry_notes(&self, entry: &TimeEntry, notes: &str) -> Result<()>;

    /// Projects matching the selectors: ids, names or codes, or `all`.
    /// Unknown selectors are logged and ignored.
    async fn projects(&self, selectors: &[String]) -> Result<Vec<Project>> {
        let available = self.list_projects().await?;
        Ok(select_projects(available, selectors))
    }
}

pub fn select_projects(available: Vec<Project>, selectors: &[String]) -> Vec<Project> {
    if selectors.is_empty() || selectors.iter().any(|s| s.eq_ignore_ascii_case("all")) {
        return available;
    }

    for selector in selectors {
        if !available.iter().any(|project| project_matches(project, selector)) {
            warn!("No project matches '{}'", selector);
        }
    }
    available
        .into_iter()
        .filter(|project| selectors.iter().any(|s| project_matches(project, s)))
        .collect()
}

fn project_matches(project: &Project, selector: &str) -> bool {
    let selector = selector.trim();
    selector.parse::<u64>().ok() == Some(project.id)
        || project.name.eq_ignore_ascii_case(selector)
        || project
            .code
            .as_deref()
            .is_some_and(|code| code.eq_ignore_ascii_case(selector))
}

/// Users and tasks fetched at most once per run.
#[derive(Default)]
pub struct DirectoryCache {
    users: OnceCell<Vec<User>>,
    tasks: OnceCell<Vec<Task>>,
}

impl DirectoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn users<T: TimeTracker>(&self, tracker: &T) -> Result<&[User]> {
        let users = self
            .users
            .get_or_try_init(|| async { tracker.list_users().await })
            .await?;
        Ok(users.as_slice())
    }

    pub async fn tasks<T: TimeTracker>(&self, tracker: &T) -> Result<&[Task]> {
        let tasks = self
            .tasks
            .get_or_try_init(|| async { tracker.list_tasks().await })
            .await?;
        Ok(tasks.as_slice())
    }

    pub async fn user<T: TimeTracker>(&self, tracker: &T, user_id: u64) -> Result<Option<&User>> {
        Ok(self.users(tracker).await?.iter().find(|user| user.id == user_id))
    }

    pub async fn user_name<T: TimeTracker>(&self, tracker: &T, user_id: u64) -> Result<Option<String>> {
        Ok(self.user(tracker, user_id).await?.map(User::full_name))
    }

    pub async fn user_email<T: TimeTracker>(&self, tracker: &T, user_id: u64) -> Result<Option<String>> {
        Ok(self
            .user(tracker, user_id)
            .await?
            .and_then(|user| user.email.clone()))
    }

    pub async fn task_name<T: TimeTracker>(&self, tracker: &T, task_id: u64) -> Result<Option<String>> {
        Ok(self
            .tasks(tracker)
            .await?
            .iter()
            .find(|task| task.id == task_id)
            .map(|task| task.name.clone()))
    }

    /// Matches on the full name, ignoring case and surrounding blanks.
    pub async fn user_by_full_name<T: TimeTracker>(&self, tracker: &T, name: &str) -> Result<&User> {
        let wanted = name.trim();
        self.users(tracker)
            .await?
            .iter()
            .find(|user| user.full_name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| Error::UserNotFound(wanted.to_string()))
    }

    pub fn invalidate(&mut self) {
        self.users.take();
        self.tasks.take();
    }
}
