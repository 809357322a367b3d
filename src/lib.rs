use std::path::PathBuf;
use std::process::ExitCode;

use chrono::Local;
use clap::{Parser, Subcommand};
use log::{error, info, warn};

pub mod bugtracker;
pub mod commands;
pub mod comment;
pub mod config;
pub mod error;
pub mod notify;
pub mod ticket_ids;
pub mod timetracker;
pub mod titles;
pub mod worklog;

use bugtracker::AnyBugTracker;
use commands::{Context, Options, Summary};
use config::{Settings, TrackerSettings};
use error::{Error, Result};
use notify::{AnyNotifier, LogNotifier, SendGridNotifier};
use timetracker::{DirectoryCache, HarvestTracker, TimeTracker};
use tracker_api::SendGridClient;
use worklog::Hours;

/// Synchronises Harvest time entries with bug tracker worklogs.
#[derive(Debug, Parser)]
#[command(name = "bugyield", version, about, long_about = None)]
pub struct Cli {
    /// Configuration file.
    #[arg(short, long, default_value = config::DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Bug tracker section of the configuration to use.
    #[arg(short, long, default_value = "jira")]
    pub bugtracker: String,

    /// Harvest projects to work on (ids, names or codes, comma separated).
    #[arg(short = 'p', long = "harvest-project", value_delimiter = ',')]
    pub harvest_project: Vec<String>,

    /// Verbose logging; mails are validated but not delivered.
    #[arg(short, long, default_value_t = false)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Copy Harvest hours into ticket worklogs and check for discrepancies.
    #[command(name = "timesync", visible_alias = "tim")]
    TimeSync,
    /// Write ticket titles into Harvest entry notes.
    #[command(name = "titlesync", visible_alias = "tit")]
    TitleSync,
    /// Warn users about entries above the configured hour limit.
    #[command(name = "maxhourscheck", visible_aliases = ["mhc", "maxhours"])]
    MaxHoursCheck,
}

fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_text(value: &str, limit: usize) -> String {
    let trimmed = value.trim();
    if trimmed.chars().count() <= limit {
        return trimmed.to_string();
    }
    if limit <= 1 {
        return "…".to_string();
    }
    let mut truncated: String = trimmed.chars().take(limit - 1).collect();
    truncated.push('…');
    truncated
}

fn redact_log_details(value: &str) -> String {
    let collapsed = collapse_whitespace(value);
    let category = collapsed
        .split(':')
        .next()
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .unwrap_or("error");
    let lowered = collapsed.to_lowercase();
    let has_sensitive_hint = [
        "token",
        "authorization",
        "bearer",
        "password",
        "api_key",
        "apikey",
        "set-cookie",
    ]
    .iter()
    .any(|hint| lowered.contains(hint));

    if has_sensitive_hint {
        return format!(
            "{}: <redacted-sensitive-details>",
            truncate_text(category, 64)
        );
    }

    truncate_text(&collapsed, 180)
}

fn init_logging(debug: bool) {
    let level = if debug { "debug" } else { "info" };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_millis()
        .try_init();
}

fn build_options(settings: &Settings, tracker: &TrackerSettings) -> Options {
    let mut options = Options::new(Local::now().date_naive());
    options.days_back = settings.harvest.days_back;
    options.max_entry_hours = settings.harvest.max_entry_hours.map(Hours::from_decimal);
    options.extended_test = tracker.extended_test;
    options.fix_missing_references = tracker.fix_missing_references;
    options.notify_on_error = tracker.email_notify_on_error.clone();
    options.admin_email = settings.admin_email().map(str::to_string);
    options.contact_email = settings.bugyield.email_from.clone();
    options
}

fn build_notifier(settings: &Settings, sandbox: bool) -> Result<AnyNotifier> {
    let key = settings
        .bugyield
        .sendgrid_api_key
        .as_deref()
        .filter(|key| !key.trim().is_empty());
    let from = settings
        .bugyield
        .email_from
        .as_deref()
        .filter(|from| !from.trim().is_empty());

    match (key, from) {
        (Some(key), Some(from)) => {
            let client = SendGridClient::new(key)?.sandbox(sandbox);
            if sandbox {
                info!("SendGrid sandbox mode: mails are validated but not delivered");
            }
            Ok(AnyNotifier::SendGrid(SendGridNotifier::new(client, from)))
        }
        (Some(_), None) => Err(Error::Config(
            "bugyield.email_from is required to send mail".into(),
        )),
        (None, _) => {
            warn!("No SendGrid API key configured, mails will only be logged");
            Ok(AnyNotifier::Log(LogNotifier))
        }
    }
}

async fn execute(cli: &Cli) -> Result<Option<Summary>> {
    let settings = Settings::load(&cli.config)?;
    let (kind, tracker_settings) = settings.tracker(&cli.bugtracker).map_err(|err| {
        if matches!(err, Error::UnknownBugTracker(_)) {
            error!("Configured bug trackers: {}", settings.tracker_labels().join(", "));
        }
        err
    })?;
    info!("Using {} bug tracker [{}] at {}", kind, cli.bugtracker, tracker_settings.url);

    let bugtracker = AnyBugTracker::from_settings(kind, &tracker_settings)?;
    let timetracker = HarvestTracker::from_settings(&settings.harvest)?;
    let notifier = build_notifier(&settings, cli.debug)?;
    let options = build_options(&settings, &tracker_settings);

    let selectors = if !cli.harvest_project.is_empty() {
        cli.harvest_project.clone()
    } else if !tracker_settings.projects.is_empty() {
        tracker_settings.projects.clone()
    } else {
        settings.harvest.projects.clone()
    };
    let projects = timetracker.projects(&selectors).await?;
    if projects.is_empty() {
        println!("No Harvest projects match the selection, nothing to do.");
        return Ok(None);
    }

    let directory = DirectoryCache::new();
    let ctx = Context::new(&bugtracker, &timetracker, &notifier, &directory, &options);
    let summary = match cli.command {
        Command::TimeSync => Summary::TimeSync(commands::time_sync::run(&ctx, &projects).await?),
        Command::TitleSync => Summary::TitleSync(commands::title_sync::run(&ctx, &projects).await?),
        Command::MaxHoursCheck => Summary::MaxHours(commands::max_hours::run(&ctx, &projects).await?),
    };
    Ok(Some(summary))
}

/// Parses the command line, runs the selected command and prints its summary.
pub async fn run() -> ExitCode {
    let cli = Cli::parse();
    let _ = dotenvy::dotenv();
    init_logging(cli.debug);

    info!("Starting BugYield {}", env!("CARGO_PKG_VERSION"));
    match execute(&cli).await {
        Ok(Some(summary)) => {
            println!("{}", summary);
            ExitCode::SUCCESS
        }
        Ok(None) => ExitCode::SUCCESS,
        Err(err) => {
            let details = redact_log_details(&err.to_string());
            if err.is_fatal() {
                error!("Setup failed: {}", details);
            } else {
                error!("Run aborted: {}", details);
            }
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_aliases_parse() {
        let cli = Cli::try_parse_from(["bugyield", "tim"]).expect("parses");
        assert_eq!(cli.command, Command::TimeSync);
        assert_eq!(cli.bugtracker, "jira");
        assert_eq!(cli.config, PathBuf::from("config.yml"));

        let cli = Cli::try_parse_from(["bugyield", "-b", "fogbugz", "tit"]).expect("parses");
        assert_eq!(cli.command, Command::TitleSync);
        assert_eq!(cli.bugtracker, "fogbugz");

        let cli = Cli::try_parse_from(["bugyield", "mhc"]).expect("parses");
        assert_eq!(cli.command, Command::MaxHoursCheck);
    }

    #[test]
    fn harvest_projects_split_on_commas() {
        let cli = Cli::try_parse_from([
            "bugyield",
            "--harvest-project",
            "WEB,42",
            "--debug",
            "timesync",
        ])
        .expect("parses");
        assert_eq!(cli.harvest_project, vec!["WEB", "42"]);
        assert!(cli.debug);
    }

    #[test]
    fn sensitive_errors_are_redacted() {
        assert_eq!(
            redact_log_details("Authentication failed: bad password for ada"),
            "Authentication failed: <redacted-sensitive-details>"
        );
        assert_eq!(
            redact_log_details("ticket   AB-1\nnot found"),
            "ticket AB-1 not found"
        );
        assert_eq!(truncate_text("abcdef", 4), "abc…");
    }

    #[test]
    fn options_follow_settings() {
        let settings = Settings::parse(
            "harvest:\n  account_id: '1'\n  token: t\n  daysback: 5\n  max_entry_hours: 7.5\n\
             bugyield:\n  email_from: bugyield@example.com\n\
             jira:\n  url: https://jira.example.com\n  extended_test: true\n  email_notify_on_error: pm@example.com\n",
        )
        .expect("parses");
        let (_, tracker) = settings.tracker("jira").expect("tracker");
        let options = build_options(&settings, &tracker);
        assert_eq!(options.days_back, 5);
        assert_eq!(options.max_entry_hours, Some(Hours::from_centi(750)));
        assert!(options.extended_test);
        assert_eq!(options.notify_on_error.as_deref(), Some("pm@example.com"));
        assert_eq!(options.admin_email.as_deref(), Some("bugyield@example.com"));
    }
}
