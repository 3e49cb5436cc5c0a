//! Error types for Issuedex.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=backend, 3=not_found, 4=validation, etc.)
//! - Retryability flags so schedulers and callers know what to reissue
//! - Context-aware recovery hints
//! - Structured JSON output for piped / non-TTY consumers

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Issuedex operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
///
/// Each code maps to a SCREAMING_SNAKE string and a category-based
/// exit code. Callers match on the string; shell scripts on the exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Backend (exit 2)
    NotInitialized,
    AlreadyInitialized,
    DatabaseError,
    TransientBackend,

    // Not Found (exit 3)
    IssueNotFound,

    // Validation (exit 4)
    ValidationError,
    InvalidArgument,

    // Document shape (exit 5)
    SchemaError,

    // Query (exit 6)
    QueryError,

    // Config (exit 7)
    ConfigError,

    // I/O (exit 8)
    IoError,
    JsonError,

    // Internal (exit 1)
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::NotInitialized => "NOT_INITIALIZED",
            Self::AlreadyInitialized => "ALREADY_INITIALIZED",
            Self::DatabaseError => "DATABASE_ERROR",
            Self::TransientBackend => "TRANSIENT_BACKEND",
            Self::IssueNotFound => "ISSUE_NOT_FOUND",
            Self::ValidationError => "VALIDATION_ERROR",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::SchemaError => "SCHEMA_ERROR",
            Self::QueryError => "QUERY_ERROR",
            Self::ConfigError => "CONFIG_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code (1-8).
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::NotInitialized
            | Self::AlreadyInitialized
            | Self::DatabaseError
            | Self::TransientBackend => 2,
            Self::IssueNotFound => 3,
            Self::ValidationError | Self::InvalidArgument => 4,
            Self::SchemaError => 5,
            Self::QueryError => 6,
            Self::ConfigError => 7,
            Self::IoError | Self::JsonError => 8,
        }
    }

    /// Whether reissuing the same operation later can succeed.
    ///
    /// True for backend unavailability and failed reads. False for
    /// malformed input, which fails the same way every time.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientBackend | Self::QueryError)
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in Issuedex operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Not initialized: run `issuedex init` first")]
    NotInitialized,

    #[error("Already initialized at {path}")]
    AlreadyInitialized { path: PathBuf },

    #[error("Issue not found: {key}")]
    IssueNotFound { key: String },

    /// Malformed input rejected before touching any backend.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Store or index unreachable, busy, or timed out.
    #[error("Backend unavailable: {0}")]
    TransientBackend(String),

    /// A document does not conform to its collection definition.
    #[error("Schema error for '{key}': {reason}")]
    Schema { key: String, reason: String },

    /// Malformed filter or failed read.
    #[error("Query error: {0}")]
    Query(String),

    #[error("Database error: {0}")]
    Database(rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode as Code;

        match err.sqlite_error_code() {
            Some(
                Code::DatabaseBusy
                | Code::DatabaseLocked
                | Code::CannotOpen
                | Code::SystemIoFailure
                | Code::OperationInterrupted,
            ) => Self::TransientBackend(err.to_string()),
            _ => Self::Database(err),
        }
    }
}

impl Error {
    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotInitialized => ErrorCode::NotInitialized,
            Self::AlreadyInitialized { .. } => ErrorCode::AlreadyInitialized,
            Self::IssueNotFound { .. } => ErrorCode::IssueNotFound,
            Self::Validation(_) => ErrorCode::ValidationError,
            Self::TransientBackend(_) => ErrorCode::TransientBackend,
            Self::Schema { .. } => ErrorCode::SchemaError,
            Self::Query(_) => ErrorCode::QueryError,
            Self::Database(_) => ErrorCode::DatabaseError,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Whether the failed operation may be reissued unchanged.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        self.error_code().is_retryable()
    }

    /// Context-aware recovery hint for operators.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::NotInitialized => {
                Some("Run `issuedex init` to create the record and index databases".to_string())
            }

            Self::AlreadyInitialized { path } => Some(format!(
                "Database already exists at {}. Use `--force` to reinitialize.",
                path.display()
            )),

            Self::IssueNotFound { key } => Some(format!(
                "No issue with key '{key}'. Run `issuedex sync run` if it was created recently."
            )),

            Self::Validation(msg) if msg.contains("user") || msg.contains("group") => Some(
                "A grant names exactly one of --user or --group.".to_string(),
            ),

            Self::TransientBackend(_) => Some(
                "The store was busy or unreachable. The next sync tick retries automatically."
                    .to_string(),
            ),

            Self::InvalidArgument(msg) => {
                if msg.contains("status") {
                    Some("Valid statuses: OPEN, CONFIRMED, REOPENED, RESOLVED, CLOSED".to_string())
                } else if msg.contains("severity") {
                    Some("Valid severities: INFO, MINOR, MAJOR, CRITICAL, BLOCKER".to_string())
                } else {
                    None
                }
            }

            Self::Validation(_)
            | Self::Schema { .. }
            | Self::Query(_)
            | Self::Database(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Config(_)
            | Self::Other(_) => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    ///
    /// Includes error code, message, retryability, exit code, and
    /// optional recovery hint.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}
