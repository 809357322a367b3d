//! Jira REST v2 client limited to issue summaries and worklogs.

use reqwest::Method;

use crate::config::{Auth, ClientConfig};
use crate::error::Result;
use crate::http::HttpClient;
use crate::models::{JiraIssue, JiraWorklog, JiraWorklogInput, JiraWorklogPage};

pub const JIRA_API_PATH: &str = "rest/api/2";

#[derive(Clone)]
pub struct JiraClient {
    http: HttpClient,
    username: String,
}

impl JiraClient {
    /// `site_url` is the Jira root, e.g. `https://example.atlassian.net`.
    pub fn new(site_url: &str, username: &str, password: &str) -> Result<Self> {
        let config = ClientConfig::new(
            format!("{}/{}", site_url.trim_end_matches('/'), JIRA_API_PATH),
            Auth::basic(username, password),
        );
        Self::with_config(config, username)
    }

    pub fn with_config(config: ClientConfig, username: &str) -> Result<Self> {
        Ok(Self {
            http: HttpClient::new(config)?,
            username: username.to_string(),
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub async fn get_issue(&self, issue_key: &str) -> Result<JiraIssue> {
        let path = format!("issue/{}", issue_key);
        self.http
            .get_with_query(&path, &[("fields", "summary".to_string())])
            .await
    }

    pub async fn get_worklogs(&self, issue_key: &str) -> Result<Vec<JiraWorklog>> {
        let path = format!("issue/{}/worklog", issue_key);
        let mut worklogs = Vec::new();
        loop {
            let page: JiraWorklogPage = self
                .http
                .get_with_query(&path, &[("startAt", worklogs.len().to_string())])
                .await?;
            let fetched = page.worklogs.len();
            worklogs.extend(page.worklogs);
            if fetched == 0 || worklogs.len() >= page.total as usize {
                break;
            }
        }
        Ok(worklogs)
    }

    pub async fn add_worklog(&self, issue_key: &str, input: &JiraWorklogInput) -> Result<JiraWorklog> {
        let path = format!("issue/{}/worklog", issue_key);
        self.http.post(&path, input).await
    }

    pub async fn update_worklog(
        &self,
        issue_key: &str,
        worklog_id: &str,
        input: &JiraWorklogInput,
    ) -> Result<JiraWorklog> {
        let path = format!("issue/{}/worklog/{}", issue_key, worklog_id);
        self.http.put(&path, input).await
    }

    /// Deletes a worklog and leaves the remaining estimate untouched.
    pub async fn delete_worklog(&self, issue_key: &str, worklog_id: &str) -> Result<()> {
        let path = format!("issue/{}/worklog/{}", issue_key, worklog_id);
        self.http
            .send_expect_empty(
                Method::DELETE,
                &path,
                &[("adjustEstimate", "leave".to_string())],
                Option::<&serde_json::Value>::None,
            )
            .await
    }
}
