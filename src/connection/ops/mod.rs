//! Operations that run through a session handle, split into focused modules.

pub mod blobs;
pub mod collections;
pub mod indexes;
