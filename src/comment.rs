//! Text encoding of worklog records stored as remote worklog comments.
//!
//! The canonical form is
//! `Entry #<id> [<hours>/<task>]: "<notes>" by <user> in "<project>"`.
//! Event based trackers add ` @ <date>` after the user and an ` (updated)`
//! suffix when an earlier event for the same entry is superseded. Older
//! comments without the hours part still decode.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::worklog::{single_line, Hours, WorklogRecord};

static COMMENT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"^Entry\s#(\d+)\s\[(?:(\d+(?:[.,]\d+)?)/)?([^\]]*)\]:\s"(.*)"\s+by\s(.*?)(?:\s@\s(\d{4}-\d{2}-\d{2}))?\sin\s"(.*)"(\s\(updated\))?\s*$"#,
    )
    .expect("invalid worklog comment regex")
});

/// Fields recovered from a comment. Optional parts absent from the text
/// decode to `None`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedComment {
    pub entry_id: u64,
    pub hours: Option<Hours>,
    pub task: String,
    pub notes: String,
    pub user: String,
    pub spent_at: Option<NaiveDate>,
    pub project: String,
    pub updated: bool,
}

impl DecodedComment {
    /// Builds a record once the tracker supplied what the text lacked.
    pub fn into_record(self, hours: Hours, spent_at: NaiveDate) -> WorklogRecord {
        WorklogRecord::new(
            self.entry_id,
            self.user,
            hours,
            spent_at,
            self.project,
            self.task,
            &self.notes,
        )
    }
}

pub fn encode(record: &WorklogRecord) -> String {
    format!(
        "Entry #{} [{}/{}]: \"{}\" by {} in \"{}\"",
        record.entry_id,
        record.hours,
        record.task,
        single_line(&record.notes),
        record.user,
        record.project
    )
}

/// Event flavour carrying the spent date and an optional update marker.
pub fn encode_event(record: &WorklogRecord, updated: bool) -> String {
    format!(
        "Entry #{} [{}/{}]: \"{}\" by {} @ {} in \"{}\"{}",
        record.entry_id,
        record.hours,
        record.task,
        single_line(&record.notes),
        record.user,
        record.spent_at.format("%Y-%m-%d"),
        record.project,
        if updated { " (updated)" } else { "" }
    )
}

/// `None` means the comment was not written by BugYield.
pub fn decode(comment: &str) -> Option<DecodedComment> {
    let captures = COMMENT_REGEX.captures(comment.trim())?;
    let entry_id = captures.get(1)?.as_str().parse().ok()?;
    let hours = match captures.get(2) {
        Some(raw) => Some(Hours::parse(raw.as_str())?),
        None => None,
    };
    let spent_at = match captures.get(6) {
        Some(raw) => Some(NaiveDate::parse_from_str(raw.as_str(), "%Y-%m-%d").ok()?),
        None => None,
    };

    Some(DecodedComment {
        entry_id,
        hours,
        task: captures.get(3)?.as_str().trim().to_string(),
        notes: captures.get(4)?.as_str().to_string(),
        user: captures.get(5)?.as_str().trim().to_string(),
        spent_at,
        project: captures.get(7)?.as_str().to_string(),
        updated: captures.get(8).is_some(),
    })
}
