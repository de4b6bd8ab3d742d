//! Storage backends for the multifs virtual filesystem.
//!
//! A backend is a flat object store addressed by object name. The VFS layer
//! stripes file content across an ordered list of backends: writes land on
//! the first backend until it runs out of space, then spill over to the next.
//! Backends therefore must report out-of-space as a distinct error so the
//! caller can route the remainder of a write elsewhere.
//!
//! Two implementations are provided:
//! - [`DirBackend`] stores objects as regular files under a root directory.
//! - [`MemBackend`] keeps objects in memory with a fixed byte capacity.

pub mod dir_backend;
pub mod error;
pub mod mem_backend;
pub mod traits;

pub use dir_backend::DirBackend;
pub use error::StorageError;
pub use mem_backend::MemBackend;
pub use traits::{BackendUsage, StorageBackend};
