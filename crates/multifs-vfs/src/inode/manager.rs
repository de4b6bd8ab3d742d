//! Inode manager: allocation, lookup, and tree manipulation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::VfsError;

use super::dir::INodeDir;
use super::file::INodeFile;
use super::symlink::INodeSymlink;
use super::types::{
    Attrs, INode, INodeId, INodeType, DEFAULT_DIR_PERMS, ROOT_INODE, SYMLINK_PERMS,
};

/// Outcome of detaching an entry from the tree.
pub struct Detached {
    /// The inode that was detached.
    pub inode: Arc<dyn INode>,
    /// True when no hard link references it anymore.
    pub orphaned: bool,
}

impl std::fmt::Debug for Detached {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Detached")
            .field("inode", &self.inode.id())
            .field("orphaned", &self.orphaned)
            .finish()
    }
}

/// Manages inode allocation and the directory tree.
///
/// All lookups go through parent directories; there is no separate path
/// index, so rename only touches the entries involved.
pub struct INodeManager {
    /// Next inode ID to allocate.
    next_id: AtomicU64,
    /// All inodes by ID.
    inodes: RwLock<HashMap<INodeId, Arc<dyn INode>>>,
}

impl INodeManager {
    /// Create a new manager whose root directory is owned by `uid`/`gid`.
    pub fn new(uid: u32, gid: u32) -> Self {
        let manager = Self {
            next_id: AtomicU64::new(ROOT_INODE + 1),
            inodes: RwLock::new(HashMap::new()),
        };

        let attrs: Attrs = Attrs::new(DEFAULT_DIR_PERMS, uid, gid, 2);
        let root: Arc<INodeDir> =
            Arc::new(INodeDir::new(ROOT_INODE, ROOT_INODE, String::new(), attrs));
        manager
            .inodes
            .write()
            .unwrap()
            .insert(ROOT_INODE, root);

        manager
    }

    /// Allocate a new inode ID.
    fn allocate_id(&self) -> INodeId {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Get an inode by ID.
    pub fn get(&self, id: INodeId) -> Option<Arc<dyn INode>> {
        self.inodes.read().unwrap().get(&id).cloned()
    }

    /// Get the root directory.
    pub fn root(&self) -> Arc<dyn INode> {
        self.get(ROOT_INODE).expect("Root inode must exist")
    }

    /// Get the total number of inodes.
    pub fn inode_count(&self) -> usize {
        self.inodes.read().unwrap().len()
    }

    /// Get an inode, requiring it to be a directory.
    fn get_dir(&self, id: INodeId) -> Result<Arc<dyn INode>, VfsError> {
        let inode: Arc<dyn INode> = self.get(id).ok_or(VfsError::InodeNotFound(id))?;
        if inode.inode_type() != INodeType::Directory {
            return Err(VfsError::NotADirectory(id));
        }
        Ok(inode)
    }

    /// Look up a child entry by name under a parent directory.
    ///
    /// # Arguments
    /// * `parent` - Parent directory inode ID
    /// * `name` - Entry name
    pub fn lookup(&self, parent: INodeId, name: &str) -> Result<Arc<dyn INode>, VfsError> {
        let parent_inode: Arc<dyn INode> = self.get_dir(parent)?;
        let dir: &INodeDir = parent_inode
            .as_any()
            .downcast_ref::<INodeDir>()
            .ok_or(VfsError::NotADirectory(parent))?;
        let child_id: INodeId = dir
            .get_child(name)
            .ok_or_else(|| VfsError::EntryNotFound(name.to_string()))?;
        self.get(child_id).ok_or(VfsError::InodeNotFound(child_id))
    }

    /// Children of a directory as (name, inode_id) pairs.
    pub fn children(&self, id: INodeId) -> Result<Vec<(String, INodeId)>, VfsError> {
        let inode: Arc<dyn INode> = self.get_dir(id)?;
        let dir: &INodeDir = inode
            .as_any()
            .downcast_ref::<INodeDir>()
            .ok_or(VfsError::NotADirectory(id))?;
        Ok(dir.children())
    }

    /// Insert a freshly created inode under its parent.
    fn attach(
        &self,
        parent: &Arc<dyn INode>,
        name: &str,
        inode: Arc<dyn INode>,
    ) -> Result<(), VfsError> {
        let dir: &INodeDir = parent
            .as_any()
            .downcast_ref::<INodeDir>()
            .ok_or(VfsError::NotADirectory(parent.id()))?;
        if dir.get_child(name).is_some() {
            return Err(VfsError::AlreadyExists(name.to_string()));
        }
        dir.add_child(name.to_string(), inode.id());
        dir.attrs().write().unwrap().touch_modified();
        self.inodes.write().unwrap().insert(inode.id(), inode);
        Ok(())
    }

    /// Create a regular file under `parent`.
    ///
    /// # Arguments
    /// * `parent` - Parent directory inode ID
    /// * `name` - File name
    /// * `perm` - Permission bits
    /// * `uid`/`gid` - Owner of the new file
    pub fn create_file(
        &self,
        parent: INodeId,
        name: &str,
        perm: u16,
        uid: u32,
        gid: u32,
    ) -> Result<Arc<INodeFile>, VfsError> {
        let parent_inode: Arc<dyn INode> = self.get_dir(parent)?;
        let id: INodeId = self.allocate_id();
        let file: Arc<INodeFile> = Arc::new(INodeFile::new(
            id,
            parent,
            name.to_string(),
            Attrs::new(perm, uid, gid, 1),
        ));
        self.attach(&parent_inode, name, file.clone())?;
        Ok(file)
    }

    /// Create a directory under `parent`.
    pub fn create_dir(
        &self,
        parent: INodeId,
        name: &str,
        perm: u16,
        uid: u32,
        gid: u32,
    ) -> Result<Arc<INodeDir>, VfsError> {
        let parent_inode: Arc<dyn INode> = self.get_dir(parent)?;
        let id: INodeId = self.allocate_id();
        let dir: Arc<INodeDir> = Arc::new(INodeDir::new(
            id,
            parent,
            name.to_string(),
            Attrs::new(perm, uid, gid, 2),
        ));
        self.attach(&parent_inode, name, dir.clone())?;
        parent_inode.attrs().write().unwrap().nlink += 1;
        Ok(dir)
    }

    /// Create a symlink under `parent` pointing at `target`.
    pub fn create_symlink(
        &self,
        parent: INodeId,
        name: &str,
        target: &str,
        uid: u32,
        gid: u32,
    ) -> Result<Arc<INodeSymlink>, VfsError> {
        let parent_inode: Arc<dyn INode> = self.get_dir(parent)?;
        let id: INodeId = self.allocate_id();
        let symlink: Arc<INodeSymlink> = Arc::new(INodeSymlink::new(
            id,
            parent,
            name.to_string(),
            target.to_string(),
            Attrs::new(SYMLINK_PERMS, uid, gid, 1),
        ));
        self.attach(&parent_inode, name, symlink.clone())?;
        Ok(symlink)
    }

    /// Add a hard link to an existing inode.
    ///
    /// Directories cannot be linked.
    pub fn link(
        &self,
        ino: INodeId,
        newparent: INodeId,
        newname: &str,
    ) -> Result<Arc<dyn INode>, VfsError> {
        let inode: Arc<dyn INode> = self.get(ino).ok_or(VfsError::InodeNotFound(ino))?;
        if inode.inode_type() == INodeType::Directory {
            return Err(VfsError::NotAFile(ino));
        }

        let parent_inode: Arc<dyn INode> = self.get_dir(newparent)?;
        let dir: &INodeDir = parent_inode
            .as_any()
            .downcast_ref::<INodeDir>()
            .ok_or(VfsError::NotADirectory(newparent))?;
        if dir.get_child(newname).is_some() {
            return Err(VfsError::AlreadyExists(newname.to_string()));
        }

        dir.add_child(newname.to_string(), ino);
        dir.attrs().write().unwrap().touch_modified();
        {
            let mut attrs = inode.attrs().write().unwrap();
            attrs.nlink += 1;
            attrs.touch_changed();
        }
        Ok(inode)
    }

    /// Detach a non-directory entry from `parent`.
    ///
    /// The inode stays in the table while other hard links or open handles
    /// reference it; the caller drops it with [`INodeManager::forget`] once
    /// storage has been reclaimed.
    pub fn unlink(&self, parent: INodeId, name: &str) -> Result<Detached, VfsError> {
        let inode: Arc<dyn INode> = self.lookup(parent, name)?;
        if inode.inode_type() == INodeType::Directory {
            return Err(VfsError::NotAFile(inode.id()));
        }

        let parent_inode: Arc<dyn INode> = self.get_dir(parent)?;
        let dir: &INodeDir = parent_inode
            .as_any()
            .downcast_ref::<INodeDir>()
            .ok_or(VfsError::NotADirectory(parent))?;
        dir.remove_child(name);
        dir.attrs().write().unwrap().touch_modified();

        let orphaned: bool = {
            let mut attrs = inode.attrs().write().unwrap();
            attrs.nlink = attrs.nlink.saturating_sub(1);
            attrs.touch_changed();
            attrs.nlink == 0
        };

        Ok(Detached { inode, orphaned })
    }

    /// Remove an empty directory entry from `parent`.
    pub fn rmdir(&self, parent: INodeId, name: &str) -> Result<(), VfsError> {
        let inode: Arc<dyn INode> = self.lookup(parent, name)?;
        let id: INodeId = inode.id();
        let dir: &INodeDir = inode
            .as_any()
            .downcast_ref::<INodeDir>()
            .ok_or(VfsError::NotADirectory(id))?;
        if dir.child_count() > 0 {
            return Err(VfsError::DirectoryNotEmpty(id));
        }

        let parent_inode: Arc<dyn INode> = self.get_dir(parent)?;
        let parent_dir: &INodeDir = parent_inode
            .as_any()
            .downcast_ref::<INodeDir>()
            .ok_or(VfsError::NotADirectory(parent))?;
        parent_dir.remove_child(name);
        {
            let mut attrs = parent_inode.attrs().write().unwrap();
            attrs.nlink = attrs.nlink.saturating_sub(1);
            attrs.touch_modified();
        }

        self.inodes.write().unwrap().remove(&id);
        Ok(())
    }

    /// Rename an entry, honoring `RENAME_NOREPLACE` and `RENAME_EXCHANGE`.
    ///
    /// # Returns
    /// The inode displaced by a replacing rename, already detached, so the
    /// caller can reclaim its storage. None when nothing was replaced.
    pub fn rename(
        &self,
        parent: INodeId,
        name: &str,
        newparent: INodeId,
        newname: &str,
        flags: u32,
    ) -> Result<Option<Detached>, VfsError> {
        let source: Arc<dyn INode> = self.lookup(parent, name)?;
        let target: Option<Arc<dyn INode>> = self.lookup(newparent, newname).ok();

        if flags & libc::RENAME_NOREPLACE != 0 {
            if target.is_some() {
                return Err(VfsError::AlreadyExists(newname.to_string()));
            }
        } else if flags & libc::RENAME_EXCHANGE != 0 {
            let target: Arc<dyn INode> =
                target.ok_or_else(|| VfsError::EntryNotFound(newname.to_string()))?;
            self.set_entry(parent, name, target.clone())?;
            self.set_entry(newparent, newname, source.clone())?;
            source.set_parent(newparent);
            source.set_name(newname.to_string());
            target.set_parent(parent);
            target.set_name(name.to_string());
            return Ok(None);
        }

        // Default rename: displace any existing target.
        let displaced: Option<Detached> = match target {
            Some(existing) => {
                // An existing directory can only be replaced by a directory,
                // and only when empty.
                match (existing.inode_type(), source.inode_type()) {
                    (INodeType::Directory, INodeType::Directory) => {
                        self.rmdir(newparent, newname)?;
                        None
                    }
                    (INodeType::Directory, _) => return Err(VfsError::NotAFile(existing.id())),
                    (_, INodeType::Directory) => {
                        return Err(VfsError::NotADirectory(existing.id()))
                    }
                    _ => Some(self.unlink(newparent, newname)?),
                }
            }
            None => None,
        };

        // Detach from the old parent and attach under the new name.
        {
            let parent_inode: Arc<dyn INode> = self.get_dir(parent)?;
            let dir: &INodeDir = parent_inode
                .as_any()
                .downcast_ref::<INodeDir>()
                .ok_or(VfsError::NotADirectory(parent))?;
            dir.remove_child(name);
            dir.attrs().write().unwrap().touch_modified();
            if source.inode_type() == INodeType::Directory && parent != newparent {
                parent_inode.attrs().write().unwrap().nlink -= 1;
            }
        }
        {
            let parent_inode: Arc<dyn INode> = self.get_dir(newparent)?;
            let dir: &INodeDir = parent_inode
                .as_any()
                .downcast_ref::<INodeDir>()
                .ok_or(VfsError::NotADirectory(newparent))?;
            dir.add_child(newname.to_string(), source.id());
            dir.attrs().write().unwrap().touch_modified();
            if source.inode_type() == INodeType::Directory && parent != newparent {
                parent_inode.attrs().write().unwrap().nlink += 1;
            }
        }
        source.set_parent(newparent);
        source.set_name(newname.to_string());
        source.attrs().write().unwrap().touch_changed();

        Ok(displaced)
    }

    /// Point an existing directory entry at a different inode.
    fn set_entry(
        &self,
        parent: INodeId,
        name: &str,
        inode: Arc<dyn INode>,
    ) -> Result<(), VfsError> {
        let parent_inode: Arc<dyn INode> = self.get_dir(parent)?;
        let dir: &INodeDir = parent_inode
            .as_any()
            .downcast_ref::<INodeDir>()
            .ok_or(VfsError::NotADirectory(parent))?;
        dir.add_child(name.to_string(), inode.id());
        Ok(())
    }

    /// Drop an inode from the table once its storage has been reclaimed.
    pub fn forget(&self, id: INodeId) {
        self.inodes.write().unwrap().remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> INodeManager {
        INodeManager::new(1000, 1000)
    }

    #[test]
    fn test_new_manager_has_root() {
        let m: INodeManager = manager();
        let root: Arc<dyn INode> = m.root();
        assert_eq!(root.id(), ROOT_INODE);
        assert_eq!(root.inode_type(), INodeType::Directory);
        assert_eq!(root.attrs_snapshot().nlink, 2);
    }

    #[test]
    fn test_create_and_lookup_file() {
        let m: INodeManager = manager();
        let file = m.create_file(ROOT_INODE, "a.txt", 0o644, 1000, 1000).unwrap();

        let found: Arc<dyn INode> = m.lookup(ROOT_INODE, "a.txt").unwrap();
        assert_eq!(found.id(), file.id());
        assert_eq!(found.name(), "a.txt");
        assert_eq!(found.attrs_snapshot().uid, 1000);
    }

    #[test]
    fn test_create_duplicate_fails() {
        let m: INodeManager = manager();
        m.create_file(ROOT_INODE, "a", 0o644, 0, 0).unwrap();
        let err = m.create_file(ROOT_INODE, "a", 0o644, 0, 0).unwrap_err();
        assert!(matches!(err, VfsError::AlreadyExists(_)));
    }

    #[test]
    fn test_mkdir_bumps_parent_nlink() {
        let m: INodeManager = manager();
        m.create_dir(ROOT_INODE, "d", 0o755, 0, 0).unwrap();
        assert_eq!(m.root().attrs_snapshot().nlink, 3);
    }

    #[test]
    fn test_rmdir_requires_empty() {
        let m: INodeManager = manager();
        let d = m.create_dir(ROOT_INODE, "d", 0o755, 0, 0).unwrap();
        m.create_file(d.id(), "f", 0o644, 0, 0).unwrap();

        let err = m.rmdir(ROOT_INODE, "d").unwrap_err();
        assert!(matches!(err, VfsError::DirectoryNotEmpty(_)));

        m.unlink(d.id(), "f").unwrap();
        m.rmdir(ROOT_INODE, "d").unwrap();
        assert!(m.lookup(ROOT_INODE, "d").is_err());
        assert_eq!(m.root().attrs_snapshot().nlink, 2);
    }

    #[test]
    fn test_unlink_on_directory_fails() {
        let m: INodeManager = manager();
        m.create_dir(ROOT_INODE, "d", 0o755, 0, 0).unwrap();
        assert!(m.unlink(ROOT_INODE, "d").is_err());
    }

    #[test]
    fn test_hard_link_shares_inode() {
        let m: INodeManager = manager();
        let file = m.create_file(ROOT_INODE, "a", 0o644, 0, 0).unwrap();
        m.link(file.id(), ROOT_INODE, "b").unwrap();

        assert_eq!(m.lookup(ROOT_INODE, "b").unwrap().id(), file.id());
        assert_eq!(m.get(file.id()).unwrap().attrs_snapshot().nlink, 2);

        let detached: Detached = m.unlink(ROOT_INODE, "a").unwrap();
        assert!(!detached.orphaned);
        let detached: Detached = m.unlink(ROOT_INODE, "b").unwrap();
        assert!(detached.orphaned);
    }

    #[test]
    fn test_link_directory_rejected() {
        let m: INodeManager = manager();
        let d = m.create_dir(ROOT_INODE, "d", 0o755, 0, 0).unwrap();
        assert!(m.link(d.id(), ROOT_INODE, "d2").is_err());
    }

    #[test]
    fn test_rename_plain_move() {
        let m: INodeManager = manager();
        let d = m.create_dir(ROOT_INODE, "d", 0o755, 0, 0).unwrap();
        let f = m.create_file(ROOT_INODE, "a", 0o644, 0, 0).unwrap();

        let displaced = m.rename(ROOT_INODE, "a", d.id(), "b", 0).unwrap();
        assert!(displaced.is_none());
        assert!(m.lookup(ROOT_INODE, "a").is_err());
        let moved: Arc<dyn INode> = m.lookup(d.id(), "b").unwrap();
        assert_eq!(moved.id(), f.id());
        assert_eq!(moved.parent_id(), d.id());
        assert_eq!(moved.name(), "b");
    }

    #[test]
    fn test_rename_noreplace_refuses_existing_target() {
        let m: INodeManager = manager();
        m.create_file(ROOT_INODE, "a", 0o644, 0, 0).unwrap();
        m.create_file(ROOT_INODE, "b", 0o644, 0, 0).unwrap();

        let err = m
            .rename(ROOT_INODE, "a", ROOT_INODE, "b", libc::RENAME_NOREPLACE)
            .unwrap_err();
        assert!(matches!(err, VfsError::AlreadyExists(_)));
    }

    #[test]
    fn test_rename_replaces_and_detaches_target() {
        let m: INodeManager = manager();
        let a = m.create_file(ROOT_INODE, "a", 0o644, 0, 0).unwrap();
        let b = m.create_file(ROOT_INODE, "b", 0o644, 0, 0).unwrap();

        let displaced: Detached = m
            .rename(ROOT_INODE, "a", ROOT_INODE, "b", 0)
            .unwrap()
            .expect("target should have been displaced");
        assert_eq!(displaced.inode.id(), b.id());
        assert!(displaced.orphaned);
        assert_eq!(m.lookup(ROOT_INODE, "b").unwrap().id(), a.id());
    }

    #[test]
    fn test_rename_exchange_swaps_entries() {
        let m: INodeManager = manager();
        let a = m.create_file(ROOT_INODE, "a", 0o644, 0, 0).unwrap();
        let d = m.create_dir(ROOT_INODE, "d", 0o755, 0, 0).unwrap();

        m.rename(ROOT_INODE, "a", ROOT_INODE, "d", libc::RENAME_EXCHANGE)
            .unwrap();
        assert_eq!(m.lookup(ROOT_INODE, "a").unwrap().id(), d.id());
        assert_eq!(m.lookup(ROOT_INODE, "d").unwrap().id(), a.id());
    }

    #[test]
    fn test_rename_exchange_requires_target() {
        let m: INodeManager = manager();
        m.create_file(ROOT_INODE, "a", 0o644, 0, 0).unwrap();
        let err = m
            .rename(ROOT_INODE, "a", ROOT_INODE, "missing", libc::RENAME_EXCHANGE)
            .unwrap_err();
        assert!(matches!(err, VfsError::EntryNotFound(_)));
    }
}
