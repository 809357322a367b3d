//! Harvest API v2 payloads.

use chrono::NaiveDate;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct HarvestProject {
    pub id: u64,
    pub name: String,
    pub code: Option<String>,
    #[serde(default)]
    pub is_active: bool,
    pub updated_at: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HarvestUser {
    pub id: u64,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub email: Option<String>,
    #[serde(default)]
    pub is_active: bool,
}

impl HarvestUser {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
            .trim()
            .to_string()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct HarvestTask {
    pub id: u64,
    pub name: String,
}

/// Id/name pair embedded in time entries.
#[derive(Debug, Deserialize, Clone)]
pub struct HarvestRef {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HarvestTimeEntry {
    pub id: u64,
    pub spent_date: NaiveDate,
    #[serde(default)]
    pub hours: f64,
    pub notes: Option<String>,
    #[serde(default)]
    pub is_locked: bool,
    #[serde(default)]
    pub is_closed: bool,
    #[serde(default)]
    pub is_billed: bool,
    #[serde(default)]
    pub is_running: bool,
    pub timer_started_at: Option<String>,
    pub user: HarvestRef,
    pub task: HarvestRef,
    pub project: HarvestRef,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProjectsPage {
    pub projects: Vec<HarvestProject>,
    pub next_page: Option<u32>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UsersPage {
    pub users: Vec<HarvestUser>,
    pub next_page: Option<u32>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TasksPage {
    pub tasks: Vec<HarvestTask>,
    pub next_page: Option<u32>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TimeEntriesPage {
    pub time_entries: Vec<HarvestTimeEntry>,
    pub next_page: Option<u32>,
}
