use thiserror::Error;

/// Everything that can go wrong between pasting a timesheet and creating
/// its entries on the server.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("line {line}: {reason}")]
    ParseFailure { line: usize, reason: String },
    #[error("API key not found in /my/api_key response")]
    AuthUnavailable,
    #[error("no project with identifier '{0}'")]
    ProjectNotFound(String),
    #[error("activity select not found on the time entry form")]
    ActivityMapUnavailable,
    #[error("current user id not found on the page")]
    UserUnavailable,
    #[error("no activity named '{0}'")]
    UnknownCategory(String),
    #[error("request failed: {0}")]
    RemoteRequestFailed(String),
    #[error("a submission is already running")]
    Busy,
    #[error("batch was replaced by a newer import")]
    Superseded,
    #[error("nothing has been imported")]
    NoBatch,
    #[error("batch must be reconciled before it can be submitted")]
    ReconcileRequired,
}

impl ImportError {
    pub(crate) fn parse(line: usize, reason: impl Into<String>) -> Self {
        ImportError::ParseFailure {
            line,
            reason: reason.into(),
        }
    }
}

impl From<reqwest::Error> for ImportError {
    fn from(err: reqwest::Error) -> Self {
        ImportError::RemoteRequestFailed(err.to_string())
    }
}
