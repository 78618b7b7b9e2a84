//! Pooled MongoDB sessions with TLS-aware connection setup, GridFS uploads,
//! index provisioning, and credential primitives.
//!
//! Obtain a [`ConnectionManager`], call [`ConnectionManager::init`] for every logical
//! operation, and close (or drop) the returned [`SessionHandle`] when done. The
//! first `init` dials the deployment; later calls share the pool.

pub mod config;
pub mod connection;
pub mod error;
pub mod helpers;

pub use config::{DatabaseTarget, Settings};
pub use connection::{
    ConnectionConfig, ConnectionManager, ConnectionOptions, DuplicatePolicy, IndexSpec, Page,
    SessionHandle, StoredFile, UploadedFile, is_duplicate_key_error,
};
pub use error::{Error, FatalError, FatalKind, Result};
pub use helpers::credentials::{
    Credentials, generate_token, hash_password, new_uuid, verify_password,
};
