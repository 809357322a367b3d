//! Harvest API v2 client: projects, users, tasks and time entries.

use chrono::NaiveDate;
use serde::Serialize;

use crate::config::{Auth, ClientConfig};
use crate::error::{ApiError, Result};
use crate::http::HttpClient;
use crate::models::{
    HarvestProject, HarvestTask, HarvestTimeEntry, HarvestUser, ProjectsPage, TasksPage,
    TimeEntriesPage, UsersPage,
};

pub const DEFAULT_HARVEST_API: &str = "https://api.harvestapp.com/v2";
const PER_PAGE: &str = "100";

#[derive(Clone)]
pub struct HarvestClient {
    http: HttpClient,
}

impl HarvestClient {
    pub fn new(account_id: &str, token: &str) -> Result<Self> {
        let config = ClientConfig::new(DEFAULT_HARVEST_API, Auth::Bearer(token.to_string()))
            .with_header("Harvest-Account-Id", account_id);
        Self::with_config(config)
    }

    pub fn with_config(config: ClientConfig) -> Result<Self> {
        Ok(Self {
            http: HttpClient::new(config)?,
        })
    }

    pub async fn list_projects(&self) -> Result<Vec<HarvestProject>> {
        let mut projects = Vec::new();
        let mut page = Some(1u32);
        while let Some(current) = page {
            let response: ProjectsPage = self
                .http
                .get_with_query("projects", &page_query(current))
                .await?;
            projects.extend(response.projects);
            page = response.next_page;
        }
        Ok(projects)
    }

    pub async fn get_project(&self, project_id: u64) -> Result<Option<HarvestProject>> {
        optional(self.http.get(&format!("projects/{}", project_id)).await)
    }

    pub async fn list_users(&self) -> Result<Vec<HarvestUser>> {
        let mut users = Vec::new();
        let mut page = Some(1u32);
        while let Some(current) = page {
            let response: UsersPage = self.http.get_with_query("users", &page_query(current)).await?;
            users.extend(response.users);
            page = response.next_page;
        }
        Ok(users)
    }

    pub async fn list_tasks(&self) -> Result<Vec<HarvestTask>> {
        let mut tasks = Vec::new();
        let mut page = Some(1u32);
        while let Some(current) = page {
            let response: TasksPage = self.http.get_with_query("tasks", &page_query(current)).await?;
            tasks.extend(response.tasks);
            page = response.next_page;
        }
        Ok(tasks)
    }

    /// Time entries of one project spent within `from..=to`.
    pub async fn list_time_entries(
        &self,
        project_id: u64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<HarvestTimeEntry>> {
        let mut entries = Vec::new();
        let mut page = Some(1u32);
        while let Some(current) = page {
            let mut query = page_query(current);
            query.push(("project_id", project_id.to_string()));
            query.push(("from", from.format("%Y-%m-%d").to_string()));
            query.push(("to", to.format("%Y-%m-%d").to_string()));
            let response: TimeEntriesPage = self.http.get_with_query("time_entries", &query).await?;
            entries.extend(response.time_entries);
            page = response.next_page;
        }
        Ok(entries)
    }

    pub async fn get_time_entry(&self, entry_id: u64) -> Result<Option<HarvestTimeEntry>> {
        optional(self.http.get(&format!("time_entries/{}", entry_id)).await)
    }

    pub async fn update_time_entry_notes(&self, entry_id: u64, notes: &str) -> Result<HarvestTimeEntry> {
        let payload = TimeEntryNotesUpdate { notes };
        self.http
            .patch(&format!("time_entries/{}", entry_id), &payload)
            .await
    }
}

fn page_query(page: u32) -> Vec<(&'static str, String)> {
    vec![("page", page.to_string()), ("per_page", PER_PAGE.to_string())]
}

fn optional<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(ApiError::NotFound(_)) => Ok(None),
        Err(err) => Err(err),
    }
}

#[derive(Debug, Serialize)]
struct TimeEntryNotesUpdate<'a> {
    notes: &'a str,
}
