//! Harvest adapter over the v2 REST client.

use chrono::NaiveDate;
use tracker_api::{HarvestClient, HarvestProject, HarvestTask, HarvestTimeEntry, HarvestUser};

use super::{Project, Task, TimeEntry, TimeTracker, User};
use crate::config::HarvestSettings;
use crate::error::Result;
use crate::worklog::Hours;

pub struct HarvestTracker {
    client: HarvestClient,
    web_url: String,
}

impl HarvestTracker {
    pub fn new(client: HarvestClient, web_url: &str) -> Self {
        Self {
            client,
            web_url: web_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_settings(settings: &HarvestSettings) -> Result<Self> {
        let client = HarvestClient::new(&settings.account_id, &settings.token)?;
        Ok(Self::new(client, &settings.url))
    }
}

impl From<HarvestProject> for Project {
    fn from(project: HarvestProject) -> Self {
        Project {
            id: project.id,
            name: project.name,
            code: project.code.filter(|code| !code.trim().is_empty()),
            active: project.is_active,
            updated_at: project.updated_at,
        }
    }
}

impl From<HarvestUser> for User {
    fn from(user: HarvestUser) -> Self {
        User {
            id: user.id,
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
        }
    }
}

impl From<HarvestTask> for Task {
    fn from(task: HarvestTask) -> Self {
        Task {
            id: task.id,
            name: task.name,
        }
    }
}

impl From<HarvestTimeEntry> for TimeEntry {
    fn from(entry: HarvestTimeEntry) -> Self {
        TimeEntry {
            id: entry.id,
            user_id: entry.user.id,
            task_id: entry.task.id,
            project_id: entry.project.id,
            notes: entry.notes.unwrap_or_default(),
            hours: Hours::from_decimal(entry.hours),
            spent_at: entry.spent_date,
            timer_started_at: entry.timer_started_at,
            is_running: entry.is_running,
            locked: entry.is_locked || entry.is_closed || entry.is_billed,
        }
    }
}

impl TimeTracker for HarvestTracker {
    fn name(&self) -> &str {
        "Harvest"
    }

    fn url(&self) -> &str {
        &self.web_url
    }

    fn entry_url(&self, entry: &TimeEntry) -> String {
        format!(
            "{}/time/day/{}/{}",
            self.web_url,
            entry.spent_at.format("%Y/%m/%d"),
            entry.user_id
        )
    }

    async fn list_projects(&self) -> Result<Vec<Project>> {
        let projects = self.client.list_projects().await?;
        Ok(projects.into_iter().map(Project::from).collect())
    }

    async fn project_entries(
        &self,
        project: &Project,
        only_editable: bool,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<TimeEntry>> {
        let entries = self.client.list_time_entries(project.id, from, to).await?;
        Ok(entries
            .into_iter()
            .map(TimeEntry::from)
            .filter(|entry| !only_editable || !entry.locked)
            .collect())
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let users = self.client.list_users().await?;
        Ok(users.into_iter().map(User::from).collect())
    }

    async fn list_tasks(&self) -> Result<Vec<Task>> {
        let tasks = self.client.list_tasks().await?;
        Ok(tasks.into_iter().map(Task::from).collect())
    }

    async fn entry_by_id(&self, entry_id: u64) -> Result<Option<TimeEntry>> {
        Ok(self.client.get_time_entry(entry_id).await?.map(TimeEntry::from))
    }

    async fn update_entry_notes(&self, entry: &TimeEntry, notes: &str) -> Result<()> {
        self.client.update_time_entry_notes(entry.id, notes).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use std::time::Duration;
    use tracker_api::{Auth, ClientConfig};

    fn tracker_for(server: &mockito::Server) -> HarvestTracker {
        let config = ClientConfig::new(server.url(), Auth::Bearer("tok".into()))
            .with_cooldown(Duration::ZERO)
            .with_retries(0, Duration::ZERO);
        let client = HarvestClient::with_config(config).expect("client builds");
        HarvestTracker::new(client, "https://acme.harvestapp.com/")
    }

    #[tokio::test]
    async fn locked_entries_are_dropped_when_only_editable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/time_entries")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                r#"{"time_entries":[
                    {"id":1,"spent_date":"2024-03-04","hours":2.0,"notes":"AB-1","is_locked":false,
                     "user":{"id":7},"task":{"id":3},"project":{"id":9}},
                    {"id":2,"spent_date":"2024-03-04","hours":1.0,"notes":null,"is_billed":true,
                     "user":{"id":7},"task":{"id":3},"project":{"id":9}}
                ],"next_page":null}"#,
            )
            .create_async()
            .await;

        let project = Project {
            id: 9,
            name: "Website".into(),
            code: None,
            active: true,
            updated_at: None,
        };
        let day = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        let tracker = tracker_for(&server);

        let editable = tracker.project_entries(&project, true, day, day).await.expect("entries");
        assert_eq!(editable.len(), 1);
        assert_eq!(editable[0].hours, Hours::from_centi(200));

        let all = tracker.project_entries(&project, false, day, day).await.expect("entries");
        assert_eq!(all.len(), 2);
        assert!(all[1].locked);
        assert_eq!(all[1].notes, "");
        assert_eq!(
            tracker.entry_url(&all[0]),
            "https://acme.harvestapp.com/time/day/2024/03/04/7"
        );
    }
}
