//! Error types for migration operations.
//!
//! Every failure of a run maps onto one variant here. Soft directory lookup misses are not
//! errors at all (they surface as `Ok(None)`); [`Error::DryRun`] is the expected control signal
//! raised when a run finishes without the apply flag.

use thiserror::Error;

/// Main error type for migration operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Invalid or missing domain, unsupported provider, bad option values
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No reachable endpoint or bind failure
    #[error("Connection error: {0}")]
    Connection(String),

    /// A directory search failed in a way that is not a simple miss
    #[error("Directory lookup failed: {0}")]
    DirectoryLookup(String),

    /// Target authorization domain already has rows
    #[error("Persistence conflict: {0}")]
    PersistenceConflict(String),

    /// Output artifact already exists
    #[error("Artifact collision: {0}")]
    ArtifactCollision(String),

    /// External helper exited unsuccessfully
    #[error("External tool failed: {tool}: {message}")]
    ExternalTool {
        /// Tool that failed
        tool: String,
        /// Error message
        message: String,
    },

    /// Run completed without the apply flag; every staged change is discarded
    #[error("{0}")]
    DryRun(String),

    /// LDAP protocol error
    #[error("LDAP error: {0}")]
    Ldap(String),

    /// Relational store error
    #[error("Database error: {0}")]
    Database(String),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(String),

    /// Malformed entry or record identifier
    #[error("Invalid identifier: {0}")]
    InvalidId(String),

    /// Password decryption failed
    #[error("Decryption failed: {0}")]
    Decryption(String),

    /// Service record lookup failed
    #[error("DNS lookup failed: {0}")]
    Dns(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Specialized result type for migration operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns the error code for this error type.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::Connection(_) => "CONNECTION_ERROR",
            Self::DirectoryLookup(_) => "DIRECTORY_LOOKUP_FAILURE",
            Self::PersistenceConflict(_) => "PERSISTENCE_CONFLICT",
            Self::ArtifactCollision(_) => "ARTIFACT_COLLISION",
            Self::ExternalTool { .. } => "EXTERNAL_TOOL_FAILURE",
            Self::DryRun(_) => "DRY_RUN_ABORT",
            Self::Ldap(_) => "LDAP_ERROR",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::InvalidId(_) => "INVALID_ID",
            Self::Decryption(_) => "DECRYPTION_ERROR",
            Self::Dns(_) => "DNS_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns true for the deliberate dry-run abort.
    #[must_use]
    pub const fn is_dry_run(&self) -> bool {
        matches!(self, Self::DryRun(_))
    }
}

// Conversions from external error types
impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::Configuration(format!("invalid URI: {err}"))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
