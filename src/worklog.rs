//! Hours arithmetic and the record written to a remote worklog.

use std::fmt;
use std::ops::{Add, Sub};

use chrono::NaiveDate;

const SECONDS_PER_CENTI_HOUR: u64 = 36;

/// A duration in hundredths of an hour.
///
/// Seconds are converted to hours by rounding half up to the nearest
/// hundredth, and hours convert back to seconds exactly, so a value that went
/// through a remote tracker once comes back unchanged on the next pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Hours(u64);

impl Hours {
    pub const ZERO: Hours = Hours(0);

    pub fn from_centi(centi: u64) -> Self {
        Hours(centi)
    }

    pub fn from_seconds(seconds: u64) -> Self {
        Hours(seconds.saturating_add(SECONDS_PER_CENTI_HOUR / 2) / SECONDS_PER_CENTI_HOUR)
    }

    /// Negative and non-finite inputs collapse to zero.
    pub fn from_decimal(hours: f64) -> Self {
        if !hours.is_finite() || hours <= 0.0 {
            return Hours::ZERO;
        }
        Hours((hours * 100.0).round() as u64)
    }

    /// Accepts `2`, `1.5`, `0.25` and the comma variant `1,25`.
    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().replace(',', ".");
        if normalized.is_empty() {
            return None;
        }
        let (whole, fraction) = match normalized.split_once('.') {
            Some((whole, fraction)) => (whole, fraction),
            None => (normalized.as_str(), ""),
        };
        if !whole.chars().all(|c| c.is_ascii_digit())
            || !fraction.chars().all(|c| c.is_ascii_digit())
            || (whole.is_empty() && fraction.is_empty())
        {
            return None;
        }
        let whole: u64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
        let mut digits = fraction.chars().map(|c| c as u64 - '0' as u64);
        let tenths = digits.next().unwrap_or(0);
        let hundredths = digits.next().unwrap_or(0);
        let round_up = digits.next().map(|d| d >= 5).unwrap_or(false);
        let centi = whole
            .checked_mul(100)?
            .checked_add(tenths * 10 + hundredths + u64::from(round_up))?;
        Some(Hours(centi))
    }

    pub fn centi(self) -> u64 {
        self.0
    }

    pub fn to_seconds(self) -> u64 {
        self.0.saturating_mul(SECONDS_PER_CENTI_HOUR)
    }

    pub fn as_f64(self) -> f64 {
        self.0 as f64 / 100.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Even share of these hours over `parts` tickets, rounded half up.
    /// The rounding residue is not redistributed.
    pub fn split(self, parts: usize) -> Self {
        if parts <= 1 {
            return self;
        }
        let parts = parts as u64;
        let (share, rest) = (self.0 / parts, self.0 % parts);
        Hours(share + u64::from(rest * 2 >= parts))
    }
}

impl fmt::Display for Hours {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / 100;
        let fraction = self.0 % 100;
        if fraction == 0 {
            write!(f, "{}", whole)
        } else if fraction % 10 == 0 {
            write!(f, "{}.{}", whole, fraction / 10)
        } else {
            write!(f, "{}.{:02}", whole, fraction)
        }
    }
}

impl Add for Hours {
    type Output = Hours;

    fn add(self, rhs: Hours) -> Hours {
        Hours(self.0.saturating_add(rhs.0))
    }
}

impl Sub for Hours {
    type Output = Hours;

    fn sub(self, rhs: Hours) -> Hours {
        Hours(self.0.saturating_sub(rhs.0))
    }
}

impl std::iter::Sum for Hours {
    fn sum<I: Iterator<Item = Hours>>(iter: I) -> Hours {
        iter.fold(Hours::ZERO, Add::add)
    }
}

/// One time entry's share of hours as written to one ticket.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorklogRecord {
    pub entry_id: u64,
    pub user: String,
    pub user_email: Option<String>,
    pub hours: Hours,
    pub spent_at: NaiveDate,
    pub project: String,
    pub task: String,
    pub notes: String,
    /// Identifier of the remote worklog this record was read from.
    pub remote_id: Option<String>,
}

impl WorklogRecord {
    pub fn new(
        entry_id: u64,
        user: impl Into<String>,
        hours: Hours,
        spent_at: NaiveDate,
        project: impl Into<String>,
        task: impl Into<String>,
        notes: &str,
    ) -> Self {
        Self {
            entry_id,
            user: user.into(),
            user_email: None,
            hours,
            spent_at,
            project: project.into(),
            task: task.into(),
            notes: single_line(notes),
            remote_id: None,
        }
    }

    pub fn with_email(mut self, email: Option<String>) -> Self {
        self.user_email = email;
        self
    }

    pub fn with_remote_id(mut self, remote_id: impl Into<String>) -> Self {
        self.remote_id = Some(remote_id.into());
        self
    }

    /// True when a remote copy carries exactly the data this record would
    /// write. The remote id and email are bookkeeping and not compared.
    pub fn matches(&self, remote: &WorklogRecord) -> bool {
        self.entry_id == remote.entry_id
            && self.user == remote.user
            && self.hours == remote.hours
            && self.spent_at == remote.spent_at
            && self.project == remote.project
            && self.task == remote.task
            && self.notes == remote.notes
    }
}

/// Collapses line breaks (and the blanks around them) to single spaces.
pub fn single_line(text: &str) -> String {
    if !text.contains(['\r', '\n']) {
        return text.to_string();
    }
    text.split(['\r', '\n'])
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
