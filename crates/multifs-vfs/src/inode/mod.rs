//! Inode primitives for the virtual filesystem.
//!
//! This module provides the core data structures for representing files,
//! directories, and symlinks, and the manager that owns the tree.

mod dir;
mod file;
mod manager;
mod symlink;
mod types;

pub use dir::INodeDir;
pub use file::{Chunk, ChunkMap, INodeFile};
pub use manager::{Detached, INodeManager};
pub use symlink::INodeSymlink;
pub use types::{
    Attrs, INode, INodeId, INodeType, DEFAULT_DIR_PERMS, DEFAULT_FILE_PERMS, ROOT_INODE,
    SYMLINK_PERMS,
};
