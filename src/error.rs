//! Error type shared by every BugYield module.

use thiserror::Error;
use tracker_api::ApiError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("unknown bug tracker '{0}'")]
    UnknownBugTracker(String),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("ticket {0} not found")]
    TicketNotFound(String),
    #[error("user {0} not found")]
    UserNotFound(String),
    #[error("no worklog credentials configured for {0}")]
    MissingCredentials(String),
    #[error("notification failed: {0}")]
    Notification(String),
}

impl Error {
    /// Setup failures abort a run; everything else is handled per item.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Config(_) | Error::UnknownBugTracker(_))
            || matches!(self, Error::Api(ApiError::Authentication(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::Error;
    use tracker_api::ApiError;

    #[test]
    fn setup_errors_are_fatal() {
        assert!(Error::Config("bad".into()).is_fatal());
        assert!(Error::UnknownBugTracker("trac".into()).is_fatal());
        assert!(Error::Api(ApiError::Authentication("denied".into())).is_fatal());
        assert!(!Error::TicketNotFound("AB-1".into()).is_fatal());
        assert!(!Error::UserNotFound("Ada".into()).is_fatal());
        assert!(!Error::Api(ApiError::NotFound("x".into())).is_fatal());
    }
}
