//! Typed async clients for the remote services BugYield talks to: Jira,
//! Harvest, FogBugz and SendGrid.

pub mod config;
pub mod error;
pub mod fogbugz;
pub mod harvest;
pub mod http;
pub mod jira;
pub mod models;
pub mod sendgrid;
pub mod throttle;

pub use config::{Auth, ClientConfig};
pub use error::{ApiError, Result};
pub use fogbugz::FogBugzClient;
pub use harvest::HarvestClient;
pub use http::HttpClient;
pub use jira::JiraClient;
pub use models::{
    EventText, FogBugzCase, FogBugzEvent, HarvestProject, HarvestRef, HarvestTask,
    HarvestTimeEntry, HarvestUser, JiraIssue, JiraWorklog, JiraWorklogInput, MailAddress,
    MailMessage,
};
pub use sendgrid::SendGridClient;
pub use throttle::Throttle;
