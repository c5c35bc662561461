//! Error types for the FitRec core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them all for callers that want a
//! single error type.
//!
//! Validation-style failures in the resolver and record-manager layers are
//! deliberately *not* errors: those layers report structured outcomes with a
//! `success` flag so callers can present them without try/catch plumbing.
//! Only repository I/O and configuration problems travel on this channel.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Record(#[from] RecordError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

// ---------------------------------------------------------------------------
// Record validation errors
// ---------------------------------------------------------------------------

/// Errors from exercise-record validation.
#[derive(Debug, Error)]
pub enum RecordError {
    /// The record name is empty or exceeds the length limit.
    #[error("invalid record name: {0}")]
    InvalidName(String),

    /// The duration is below the one-minute minimum.
    #[error("invalid duration {0} minutes (must be >= 1)")]
    InvalidDuration(i64),

    /// `platform` must be set when `source` is synced, and absent otherwise.
    #[error("record {id}: platform is {platform}, but source is {record_source}")]
    PlatformMismatch {
        id: String,
        record_source: String,
        platform: String,
    },

    /// The metadata extension map exceeds the bounded key count.
    #[error("metadata extension map has {count} entries (max {max})")]
    MetadataOverflow { count: usize, max: usize },
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Repository errors
// ---------------------------------------------------------------------------

/// Errors from the storage boundary.
///
/// [`RecordRepository`](crate::repository::RecordRepository) implementations
/// map their backend failures onto these variants; the core propagates them
/// unchanged from every await point.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// A record or audit entry was not found.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Backend-specific storage failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Generic I/O error.
    #[error("repository I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Engine errors
// ---------------------------------------------------------------------------

/// Errors from the reconciliation engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Another ingest cycle is already running on this engine.
    #[error("ingest cycle already in progress")]
    IngestInProgress,

    /// Repository error during a cycle.
    #[error("engine repository error: {0}")]
    Repository(#[from] RepositoryError),
}

// CoreError implements `std::error::Error` via `thiserror`, so
// `anyhow::Error: From<CoreError>` is already provided by the blanket impl
// in `anyhow`. No manual `From` impl is needed.

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = RecordError::InvalidDuration(0);
        assert_eq!(err.to_string(), "invalid duration 0 minutes (must be >= 1)");

        let err = RepositoryError::NotFound {
            entity: "exercise record".into(),
            id: "abc".into(),
        };
        assert_eq!(err.to_string(), "exercise record not found: abc");

        let err = ConfigError::InvalidValue {
            field: "audit.max_records".into(),
            detail: "must be > 0".into(),
        };
        assert!(err.to_string().contains("audit.max_records"));

        let err = EngineError::IngestInProgress;
        assert!(err.to_string().contains("already in progress"));
    }

    #[test]
    fn test_core_error_from_subsystem() {
        let rec_err = RecordError::InvalidName("empty".into());
        let core_err: CoreError = rec_err.into();
        assert!(matches!(core_err, CoreError::Record(_)));

        let repo_err = RepositoryError::Storage("disk full".into());
        let core_err: CoreError = repo_err.into();
        assert!(matches!(core_err, CoreError::Repository(_)));
    }
}
