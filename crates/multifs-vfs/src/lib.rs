//! Virtual filesystem aggregating several storage backends behind one tree.
//!
//! The tree (directories, names, attributes) lives in memory; file content is
//! routed to an ordered list of [`multifs_storage::StorageBackend`]s by the
//! spillover engine. A file starts on the first backend and spills onto the
//! next one when that backend runs out of space, so the mount exposes the
//! combined capacity of all backends as one filesystem.
//!
//! # Architecture
//!
//! ```text
//! FUSE kernel module
//!         |
//!      MultiFs            (fuse, feature "fuse")
//!         |
//!   +-----+-------+
//!   |             |
//! INodeManager  SpillEngine
//! (tree, attrs) (chunk maps)
//!                 |
//!        [backend 0] [backend 1] ...
//! ```

pub mod error;
pub mod inode;
pub mod options;
pub mod spill;

#[cfg(feature = "fuse")]
pub mod fuse;

pub use error::VfsError;
pub use options::VfsOptions;
pub use spill::SpillEngine;

#[cfg(feature = "fuse")]
pub use fuse::{mount, spawn_mount, MultiFs, VfsStats, VfsStatsCollector};
