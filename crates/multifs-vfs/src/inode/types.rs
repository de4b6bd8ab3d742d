//! Core inode types and traits.

use std::any::Any;
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

/// Unique identifier for an inode.
pub type INodeId = u64;

/// Root directory inode ID (always 1 per FUSE convention).
pub const ROOT_INODE: INodeId = 1;

/// Default file permissions (rw-r--r--).
pub const DEFAULT_FILE_PERMS: u16 = 0o644;

/// Default directory permissions (rwxr-xr-x).
pub const DEFAULT_DIR_PERMS: u16 = 0o755;

/// Symlink permissions (lrwxrwxrwx).
pub const SYMLINK_PERMS: u16 = 0o777;

/// Type of inode entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum INodeType {
    /// Regular file.
    File,
    /// Directory.
    Directory,
    /// Symbolic link.
    Symlink,
}

/// Mutable POSIX attributes of an inode.
#[derive(Debug, Clone, Copy)]
pub struct Attrs {
    /// Permission bits (no file-type bits).
    pub perm: u16,
    /// Owner user ID.
    pub uid: u32,
    /// Owner group ID.
    pub gid: u32,
    /// Size in bytes.
    pub size: u64,
    /// Number of hard links.
    pub nlink: u32,
    /// Last access time.
    pub atime: SystemTime,
    /// Last modification time.
    pub mtime: SystemTime,
    /// Last status change time.
    pub ctime: SystemTime,
}

impl Attrs {
    /// Fresh attributes owned by `uid`/`gid` with all times set to now.
    pub fn new(perm: u16, uid: u32, gid: u32, nlink: u32) -> Self {
        let now: SystemTime = SystemTime::now();
        Self {
            perm,
            uid,
            gid,
            size: 0,
            nlink,
            atime: now,
            mtime: now,
            ctime: now,
        }
    }

    /// Stamp a content modification (mtime + ctime).
    pub fn touch_modified(&mut self) {
        let now: SystemTime = SystemTime::now();
        self.mtime = now;
        self.ctime = now;
    }

    /// Stamp a metadata change (ctime only).
    pub fn touch_changed(&mut self) {
        self.ctime = SystemTime::now();
    }
}

/// Common trait for all inode types.
///
/// Name and parent are mutable because rename moves entries; attributes are
/// behind a lock so concurrent FUSE requests see consistent snapshots.
pub trait INode: Send + Sync + std::fmt::Debug {
    /// Get the inode ID.
    fn id(&self) -> INodeId;

    /// Get the parent directory inode ID.
    fn parent_id(&self) -> INodeId;

    /// Reparent this inode (rename across directories).
    fn set_parent(&self, parent: INodeId);

    /// Get the entry name.
    fn name(&self) -> String;

    /// Set the entry name (rename).
    fn set_name(&self, name: String);

    /// Get the inode type.
    fn inode_type(&self) -> INodeType;

    /// Get the attribute lock.
    fn attrs(&self) -> &RwLock<Attrs>;

    /// Downcast to Any for type-safe downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Consume the Arc for owned downcasting via [`std::sync::Arc::downcast`].
    fn as_arc_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl dyn INode + '_ {
    /// Snapshot the attributes.
    pub fn attrs_snapshot(&self) -> Attrs {
        *self.attrs().read().unwrap()
    }
}
