use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error while {operation} at {path}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("blob '{key}' in session '{session}' is corrupt: {source}")]
    Corrupt {
        session: String,
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("blob '{key}' in session '{session}' has unsupported version {found}; expected 1")]
    UnsupportedVersion {
        session: String,
        key: String,
        found: u32,
    },

    #[error("blob '{key}' in session '{session}' has invalid RFC3339 timestamp: {value}")]
    InvalidTimestamp {
        session: String,
        key: String,
        value: String,
    },

    #[error("'{segment}' is not a valid session id or key")]
    InvalidSegment { segment: String },

    #[error("failed to serialize blob '{key}': {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to format current UTC timestamp as RFC3339: {0}")]
    ClockFormat(#[source] time::error::Format),
}

impl StoreError {
    #[must_use]
    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    #[must_use]
    pub fn corrupt(session: &str, key: &str, source: serde_json::Error) -> Self {
        Self::Corrupt {
            session: session.to_string(),
            key: key.to_string(),
            source,
        }
    }
}
