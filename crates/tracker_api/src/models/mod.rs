mod fogbugz;
mod harvest;
mod jira;
mod mail;

pub use fogbugz::{
    EventText, FogBugzCase, FogBugzEnvelope, FogBugzError, FogBugzEvent, FogBugzSearchData,
};
pub use harvest::{
    HarvestProject, HarvestRef, HarvestTask, HarvestTimeEntry, HarvestUser, ProjectsPage,
    TasksPage, TimeEntriesPage, UsersPage,
};
pub use jira::{JiraAuthor, JiraIssue, JiraIssueFields, JiraWorklog, JiraWorklogInput, JiraWorklogPage};
pub use mail::{MailAddress, MailMessage};
