use std::fmt;

use thiserror::Error;

/// Recoverable errors returned to the caller for case-by-case handling
#[derive(Debug, Error)]
pub enum Error {
    #[error("MongoDB error: {0}")]
    Mongo(#[from] mongodb::error::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to create file {file} in store {store}: {source}")]
    BlobCreate {
        store: String,
        file: String,
        #[source]
        source: mongodb::error::Error,
    },

    #[error("failed to write file {file} in store {store}: {source}")]
    BlobWrite {
        store: String,
        file: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to close file {file} in store {store}: {source}")]
    BlobClose {
        store: String,
        file: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Credential error: {0}")]
    Credential(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Convenience Result type using our Error
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// What kind of broken invariant a [`FatalError`] reports
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FatalKind {
    Config,
    Runtime,
    Dial,
    IndexProvisioning,
    DropDatabase,
}

impl FatalKind {
    pub fn label(self) -> &'static str {
        match self {
            FatalKind::Config => "configuration",
            FatalKind::Runtime => "runtime",
            FatalKind::Dial => "dial",
            FatalKind::IndexProvisioning => "index provisioning",
            FatalKind::DropDatabase => "drop database",
        }
    }
}

impl fmt::Display for FatalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A startup-time or administrative failure the process must not continue past.
///
/// These are never expected in normal operation: a missing database, an index that
/// cannot be built, a failed database drop. The top-level caller is required to
/// check for them and terminate, usually through [`FatalError::exit`].
#[derive(Debug, Error)]
#[error("fatal {kind} error: {message}")]
#[must_use = "a fatal error must terminate the process"]
pub struct FatalError {
    kind: FatalKind,
    message: String,
    #[source]
    source: Option<mongodb::error::Error>,
}

impl FatalError {
    pub fn new(kind: FatalKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), source: None }
    }

    pub fn with_source(
        kind: FatalKind,
        message: impl Into<String>,
        source: mongodb::error::Error,
    ) -> Self {
        Self { kind, message: message.into(), source: Some(source) }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(FatalKind::Config, message)
    }

    pub fn kind(&self) -> FatalKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Log the error and terminate the process with a non-zero status.
    pub fn exit(self) -> ! {
        log::error!("{self}");
        if let Some(source) = &self.source {
            log::error!("caused by: {source}");
        }
        std::process::exit(1)
    }
}
