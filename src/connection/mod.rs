//! MongoDB connection management and operations.
//!
//! This module provides:
//! - `ConnectionManager`: the lazily dialed pool and the runtime that drives it
//! - `SessionHandle`: a per-caller session bound to one database
//! - `ops`: collection, index and GridFS operations run through a session
//! - `config` / `uri`: connection configuration derived from a host URI
//! - `types`: shared types for all operations

pub mod config;
pub mod manager;
pub mod ops;
pub mod session;
pub mod types;
pub mod uri;

// Re-export commonly used items at the crate level
pub use config::{ConnectionConfig, ConnectionOptions, TlsSettings};
pub use manager::{ConnectionManager, Dialer, MongoDialer, global, install_global};
pub use ops::collections::is_duplicate_key_error;
pub use session::SessionHandle;
pub use types::{
    ConsistencyMode, DuplicatePolicy, IndexSpec, Page, StoredFile, UploadedFile,
};
