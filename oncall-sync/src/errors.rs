use chrono::{DateTime, Utc};
use thiserror::Error;

/// Structured error types for the on-call calendar sync
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    /// A required credential or identifier is absent
    #[error("Configuration missing: {field} is not set. Run `oncall-calendar-sync configure` or edit the config file")]
    ConfigurationMissing { field: String },

    /// Network-level failure reaching an external service
    #[error("Network error: could not reach {service}: {message}")]
    Transport { service: String, message: String },

    /// External service answered with a non-success status
    #[error("API error: {service} responded with {status}: {body}")]
    UpstreamStatus {
        service: String,
        status: u16,
        body: String,
    },

    /// A response body did not match the expected shape
    #[error("Decode error: failed to parse {context}: {message}")]
    Decode { context: String, message: String },

    /// OAuth token missing, expired without refresh token, or rejected
    #[error("Authentication error: {message}")]
    Authentication { message: String },

    /// The user belongs to no group, so there is no rotation to read
    #[error("No group membership found for {user}")]
    NoGroupMembership { user: String },

    /// File system errors
    #[error("File system error: {operation} failed for path '{path}': {message}")]
    FileSystem {
        operation: String,
        path: String,
        message: String,
    },

    /// Parsing errors (JSON, TOML)
    #[error("Parsing error: Failed to parse {format}: {message}")]
    Parsing { format: String, message: String },

    /// `now + horizon` does not fit in a timestamp
    #[error("Schedule window of {months} months from {from} is out of range")]
    ScheduleWindow { from: DateTime<Utc>, months: u32 },

    /// A reconciliation step failed; the run stopped there
    #[error("Step '{step}' failed: {error}")]
    Step { step: String, error: Box<SyncError> },
}

/// Result type alias using SyncError
pub type SyncResult<T> = std::result::Result<T, SyncError>;

impl SyncError {
    pub fn missing(field: impl Into<String>) -> Self {
        Self::ConfigurationMissing {
            field: field.into(),
        }
    }

    /// Tag the error with the step that produced it
    pub fn in_step(self, step: &str) -> Self {
        Self::Step {
            step: step.to_string(),
            error: Box::new(self),
        }
    }

    pub fn file_system(operation: &str, path: &std::path::Path, error: std::io::Error) -> Self {
        Self::FileSystem {
            operation: operation.to_string(),
            path: path.display().to_string(),
            message: error.to_string(),
        }
    }
}

/// Convert serde_json::Error to SyncError
impl From<serde_json::Error> for SyncError {
    fn from(error: serde_json::Error) -> Self {
        Self::Parsing {
            format: "JSON".to_string(),
            message: error.to_string(),
        }
    }
}

/// Convert toml::de::Error to SyncError
impl From<toml::de::Error> for SyncError {
    fn from(error: toml::de::Error) -> Self {
        Self::Parsing {
            format: "TOML".to_string(),
            message: error.to_string(),
        }
    }
}
