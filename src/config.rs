//! YAML configuration model and file loader.

use serde::{Deserialize, Deserializer};
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;

use crate::bugtracker::BugTrackerKind;
use crate::error::{Error, Result};

pub const DEFAULT_CONFIG_PATH: &str = "config.yml";
pub const SENDGRID_API_KEY_ENV: &str = "SENDGRID_API_KEY";

/// Default number of days back from today that a run looks at.
fn default_days_back() -> u32 {
    3
}

fn default_harvest_url() -> String {
    "https://harvestapp.com".to_string()
}

/// Whole configuration file: `harvest`, `bugyield` and one section per
/// configured bug tracker, keyed by a free label.
#[derive(Deserialize, Clone, Debug)]
pub struct Settings {
    pub harvest: HarvestSettings,
    #[serde(default)]
    pub bugyield: BugYieldSettings,
    #[serde(flatten)]
    trackers: BTreeMap<String, Value>,
}

#[derive(Deserialize, Clone, Debug)]
pub struct HarvestSettings {
    pub account_id: String,
    pub token: String,
    /// Web address used when linking to time entries.
    #[serde(default = "default_harvest_url")]
    pub url: String,
    #[serde(default = "default_days_back", alias = "daysback")]
    pub days_back: u32,
    #[serde(default)]
    pub max_entry_hours: Option<f64>,
    /// Projects used when the bug tracker section does not name any.
    #[serde(default, deserialize_with = "string_list")]
    pub projects: Vec<String>,
}

#[derive(Deserialize, Clone, Debug, Default)]
pub struct BugYieldSettings {
    #[serde(default)]
    pub email_from: Option<String>,
    #[serde(default)]
    pub email_fallback: Option<String>,
    #[serde(default)]
    pub sendgrid_api_key: Option<String>,
}

/// Per user Jira login used to write worklogs under the user's own name.
#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct UserLogin {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize, Clone, Debug, Default)]
pub struct TrackerSettings {
    #[serde(default)]
    pub bugtracker: Option<String>,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default, deserialize_with = "string_list")]
    pub projects: Vec<String>,
    #[serde(default)]
    pub extended_test: bool,
    #[serde(default)]
    pub fix_missing_references: bool,
    #[serde(default)]
    pub email_notify_on_error: Option<String>,
    /// Ticket link relative to `url`, with `{ticket}` and `{worklog}`
    /// placeholders.
    #[serde(default)]
    pub url_ticket_pattern: Option<String>,
    #[serde(default)]
    pub worklog_individual_logins: bool,
    #[serde(default)]
    pub worklog_allow_admin: bool,
    #[serde(default)]
    pub users: BTreeMap<String, UserLogin>,
}

impl Settings {
    /// Reads and validates the file, then applies environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|err| {
            Error::Config(format!("cannot read {}: {}", path.display(), err))
        })?;
        let mut settings = Self::parse(&content)?;
        if let Ok(key) = env::var(SENDGRID_API_KEY_ENV) {
            if !key.trim().is_empty() {
                settings.bugyield.sendgrid_api_key = Some(key);
            }
        }
        Ok(settings)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let settings: Settings = serde_yaml::from_str(content)
            .map_err(|err| Error::Config(format!("invalid configuration: {}", err)))?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if let Some(max) = self.harvest.max_entry_hours {
            if max.is_nan() || max <= 0.0 {
                return Err(Error::Config(format!(
                    "max_entry_hours must be greater than zero, got {}",
                    max
                )));
            }
        }
        if self.harvest.account_id.trim().is_empty() || self.harvest.token.trim().is_empty() {
            return Err(Error::Config("harvest account_id and token are required".into()));
        }
        Ok(())
    }

    /// Labels of the bug tracker sections present in the file.
    pub fn tracker_labels(&self) -> Vec<&str> {
        self.trackers.keys().map(String::as_str).collect()
    }

    /// The section named `label` together with the backend it configures.
    pub fn tracker(&self, label: &str) -> Result<(BugTrackerKind, TrackerSettings)> {
        let section = self
            .trackers
            .get(label)
            .ok_or_else(|| Error::UnknownBugTracker(label.to_string()))?;
        let settings: TrackerSettings = serde_yaml::from_value(section.clone())
            .map_err(|err| Error::Config(format!("invalid [{}] section: {}", label, err)))?;
        let kind = settings.bugtracker.as_deref().unwrap_or(label).parse()?;
        if settings.url.trim().is_empty() {
            return Err(Error::Config(format!("[{}] url is required", label)));
        }
        Ok((kind, settings))
    }

    /// Address used when a user cannot be reached, falling back to the sender.
    pub fn admin_email(&self) -> Option<&str> {
        self.bugyield
            .email_fallback
            .as_deref()
            .or(self.bugyield.email_from.as_deref())
            .filter(|value| !value.trim().is_empty())
    }
}

/// Accepts a YAML list, a comma separated string or a single number.
fn string_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let items = match value {
        Value::Null => Vec::new(),
        Value::Sequence(values) => values.iter().filter_map(scalar_to_string).collect(),
        other => scalar_to_string(&other)
            .map(|joined| joined.split(',').map(str::to_string).collect())
            .unwrap_or_default(),
    };
    Ok(items
        .into_iter()
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect())
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}
