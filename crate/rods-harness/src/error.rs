use rods_types::PathError;

/// Errors returned by the harness.
///
/// Acquire-phase errors (creation, transfer, metadata, session start)
/// propagate to the caller and abort the test before it runs.
/// Release-phase errors are suppressed by the fixtures, which log
/// them and keep removing whatever is left.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("cannot create {path}: {detail}")]
    Creation { path: String, detail: String },

    #[error("transfer to {path} failed: {detail}")]
    Transfer { path: String, detail: String },

    #[error("metadata operation on {path} failed: {detail}")]
    Metadata { path: String, detail: String },

    #[error("cannot remove {path}: {detail}")]
    Removal { path: String, detail: String },

    #[error("session failed to start: {0}")]
    SessionStart(String),

    #[error("session is not running")]
    SessionNotRunning,

    #[error(transparent)]
    Path(#[from] PathError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HarnessError {
    pub(crate) fn creation(path: impl std::fmt::Display, detail: impl Into<String>) -> Self {
        HarnessError::Creation {
            path: path.to_string(),
            detail: detail.into(),
        }
    }

    pub(crate) fn transfer(path: impl std::fmt::Display, detail: impl Into<String>) -> Self {
        HarnessError::Transfer {
            path: path.to_string(),
            detail: detail.into(),
        }
    }

    pub(crate) fn metadata(path: impl std::fmt::Display, detail: impl Into<String>) -> Self {
        HarnessError::Metadata {
            path: path.to_string(),
            detail: detail.into(),
        }
    }

    pub(crate) fn removal(path: impl std::fmt::Display, detail: impl Into<String>) -> Self {
        HarnessError::Removal {
            path: path.to_string(),
            detail: detail.into(),
        }
    }
}
