//! FUSE filesystem implementation.

#[cfg(feature = "fuse")]
mod impl_fuse {
    use std::collections::HashMap;
    use std::ffi::OsStr;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::{Arc, RwLock};
    use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

    use fuser::{
        FileAttr, FileType, Filesystem, KernelConfig, ReplyAttr, ReplyCreate, ReplyData,
        ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyLseek, ReplyOpen, ReplyStatfs, ReplyWrite,
        Request, TimeOrNow,
    };
    use multifs_storage::{BackendUsage, StorageBackend};
    use serde::Serialize;
    use tokio::runtime::Handle;
    use tracing::{debug, warn};

    use crate::inode::{Detached, INode, INodeFile, INodeManager, INodeSymlink, INodeType};
    use crate::options::VfsOptions;
    use crate::spill::SpillEngine;
    use crate::VfsError;

    /// Block size reported through `statfs`, matching the original multifs.
    const STATFS_BLOCK_SIZE: u64 = 4 * 1024;

    /// Maximum file name length reported through `statfs`.
    const MAX_NAME: u32 = 255;

    /// Information about an open file handle.
    #[derive(Debug, Clone, Serialize)]
    pub struct OpenFileInfo {
        /// Inode ID of the open file.
        pub inode: u64,
        /// Entry name.
        pub name: String,
        /// File size in bytes.
        pub size: u64,
        /// File handle ID.
        pub handle_id: u64,
    }

    /// Usage of one backend, labeled for display.
    #[derive(Debug, Clone, Serialize)]
    pub struct BackendStats {
        /// Backend label.
        pub label: String,
        /// Capacity report.
        pub usage: BackendUsage,
    }

    /// Statistics snapshot from the VFS.
    #[derive(Debug, Clone, Serialize)]
    pub struct VfsStats {
        /// Number of inodes in the filesystem.
        pub inode_count: usize,
        /// Number of currently open file handles.
        pub open_files: usize,
        /// List of currently open files with details.
        pub open_file_list: Vec<OpenFileInfo>,
        /// Per-backend capacity reports, in spillover order.
        pub backends: Vec<BackendStats>,
        /// Time since the VFS was created.
        pub uptime_secs: u64,
    }

    struct OpenHandle {
        inode: u64,
    }

    /// Shared state for stats collection from another thread.
    pub struct VfsStatsCollector {
        inodes: Arc<INodeManager>,
        engine: Arc<SpillEngine>,
        handles: Arc<RwLock<HashMap<u64, OpenHandle>>>,
        runtime: Handle,
        start_time: Instant,
    }

    impl VfsStatsCollector {
        /// Collect current VFS statistics.
        pub fn collect(&self) -> VfsStats {
            let open_file_list: Vec<OpenFileInfo> = {
                let handles = self.handles.read().unwrap();
                handles
                    .iter()
                    .filter_map(|(&handle_id, h)| {
                        let inode = self.inodes.get(h.inode)?;
                        Some(OpenFileInfo {
                            inode: h.inode,
                            name: inode.name(),
                            size: inode.attrs_snapshot().size,
                            handle_id,
                        })
                    })
                    .collect()
            };
            let open_files: usize = open_file_list.len();

            let backends: Vec<BackendStats> = self.runtime.block_on(async {
                let mut out: Vec<BackendStats> = Vec::new();
                for backend in self.engine.backends() {
                    let usage: BackendUsage = backend.usage().await.unwrap_or_default();
                    out.push(BackendStats {
                        label: backend.label().to_string(),
                        usage,
                    });
                }
                out
            });

            VfsStats {
                inode_count: self.inodes.inode_count(),
                open_files,
                open_file_list,
                backends,
                uptime_secs: self.start_time.elapsed().as_secs(),
            }
        }
    }

    /// FUSE filesystem aggregating several backends behind one mount point.
    pub struct MultiFs {
        /// Inode manager owning the directory tree.
        inodes: Arc<INodeManager>,
        /// Spillover engine routing file content to backends.
        engine: Arc<SpillEngine>,
        /// Open file handles.
        handles: Arc<RwLock<HashMap<u64, OpenHandle>>>,
        /// Next file handle ID.
        next_handle: AtomicU64,
        /// VFS options.
        options: VfsOptions,
        /// Tokio runtime handle bridging the sync callbacks to the backends.
        runtime: Handle,
        /// VFS creation time.
        start_time: Instant,
    }

    impl MultiFs {
        /// Create a new VFS over an ordered backend list.
        ///
        /// Must be called within a Tokio runtime; the runtime handle is
        /// captured for use from the FUSE callback threads.
        ///
        /// # Arguments
        /// * `backends` - Backends in spillover order
        /// * `options` - VFS configuration options
        pub fn new(
            backends: Vec<Arc<dyn StorageBackend>>,
            options: VfsOptions,
        ) -> Result<Self, VfsError> {
            let engine: Arc<SpillEngine> = Arc::new(SpillEngine::new(backends)?);
            let runtime: Handle = Handle::try_current()
                .map_err(|e| VfsError::MountFailed(format!("No tokio runtime: {}", e)))?;

            let uid: u32 = unsafe { libc::getuid() };
            let gid: u32 = unsafe { libc::getgid() };

            Ok(Self {
                inodes: Arc::new(INodeManager::new(uid, gid)),
                engine,
                handles: Arc::new(RwLock::new(HashMap::new())),
                next_handle: AtomicU64::new(1),
                options,
                runtime,
                start_time: Instant::now(),
            })
        }

        /// Get a stats collector that can be used from another thread.
        pub fn stats_collector(&self) -> VfsStatsCollector {
            VfsStatsCollector {
                inodes: self.inodes.clone(),
                engine: self.engine.clone(),
                handles: self.handles.clone(),
                runtime: self.runtime.clone(),
                start_time: self.start_time,
            }
        }

        /// Get current VFS statistics.
        pub fn stats(&self) -> VfsStats {
            self.stats_collector().collect()
        }

        /// TTL for FUSE attribute and entry replies.
        fn ttl(&self) -> Duration {
            Duration::from_secs(self.options.attr_timeout_secs)
        }

        /// Convert an inode to FUSE file attributes.
        fn to_file_attr(&self, inode: &dyn INode) -> FileAttr {
            let kind: FileType = match inode.inode_type() {
                INodeType::File => FileType::RegularFile,
                INodeType::Directory => FileType::Directory,
                INodeType::Symlink => FileType::Symlink,
            };
            let attrs = inode.attrs_snapshot();

            FileAttr {
                ino: inode.id(),
                size: attrs.size,
                blocks: (attrs.size + 511) / 512,
                atime: attrs.atime,
                mtime: attrs.mtime,
                ctime: attrs.ctime,
                crtime: UNIX_EPOCH,
                kind,
                perm: attrs.perm,
                nlink: attrs.nlink,
                uid: attrs.uid,
                gid: attrs.gid,
                rdev: 0,
                blksize: 512,
                flags: 0,
            }
        }

        /// Get a file inode or fail with the matching errno.
        fn get_file(&self, ino: u64) -> Result<Arc<INodeFile>, VfsError> {
            let inode: Arc<dyn INode> =
                self.inodes.get(ino).ok_or(VfsError::InodeNotFound(ino))?;
            Arc::downcast::<INodeFile>(inode.as_arc_any()).map_err(|_| VfsError::NotAFile(ino))
        }

        /// Whether any open handle still references `ino`.
        fn is_open(&self, ino: u64) -> bool {
            self.handles.read().unwrap().values().any(|h| h.inode == ino)
        }

        /// Reclaim storage for a detached inode once nothing references it.
        fn reclaim(&self, detached: Detached) {
            if !detached.orphaned {
                return;
            }
            let ino: u64 = detached.inode.id();
            if self.is_open(ino) {
                // Unlinked while open: data stays reachable through the
                // handle; release() reclaims once the last handle drops.
                return;
            }
            if let Some(file) = detached.inode.as_any().downcast_ref::<INodeFile>() {
                if let Err(e) = self.runtime.block_on(self.engine.remove(file)) {
                    warn!(ino, error = %e, "failed to reclaim backend storage");
                }
            }
            self.inodes.forget(ino);
        }

        /// Apply umask and strip file-type bits from a create mode.
        fn perm_from_mode(mode: u32, umask: u32) -> u16 {
            ((mode & !umask) & 0o7777) as u16
        }

        /// Whether `fh` is a live handle for `ino`.
        fn handle_matches(&self, fh: u64, ino: u64) -> bool {
            matches!(self.handles.read().unwrap().get(&fh), Some(h) if h.inode == ino)
        }
    }

    impl Filesystem for MultiFs {
        fn init(&mut self, _req: &Request, _config: &mut KernelConfig) -> Result<(), libc::c_int> {
            debug!(backends = self.engine.backends().len(), "multifs mounted");
            Ok(())
        }

        fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
            let Some(name) = name.to_str() else {
                reply.error(libc::ENOENT);
                return;
            };
            debug!(parent, name, "lookup");

            match self.inodes.lookup(parent, name) {
                Ok(inode) => reply.entry(&self.ttl(), &self.to_file_attr(inode.as_ref()), 0),
                Err(e) => reply.error(e.errno()),
            }
        }

        fn getattr(&mut self, _req: &Request, ino: u64, reply: ReplyAttr) {
            debug!(ino, "getattr");
            match self.inodes.get(ino) {
                Some(inode) => reply.attr(&self.ttl(), &self.to_file_attr(inode.as_ref())),
                None => reply.error(libc::ENOENT),
            }
        }

        #[allow(clippy::too_many_arguments)]
        fn setattr(
            &mut self,
            _req: &Request,
            ino: u64,
            mode: Option<u32>,
            uid: Option<u32>,
            gid: Option<u32>,
            size: Option<u64>,
            atime: Option<TimeOrNow>,
            mtime: Option<TimeOrNow>,
            _ctime: Option<SystemTime>,
            _fh: Option<u64>,
            _crtime: Option<SystemTime>,
            _chgtime: Option<SystemTime>,
            _bkuptime: Option<SystemTime>,
            _flags: Option<u32>,
            reply: ReplyAttr,
        ) {
            debug!(ino, ?mode, ?uid, ?gid, ?size, "setattr");
            let Some(inode) = self.inodes.get(ino) else {
                reply.error(libc::ENOENT);
                return;
            };

            if let Some(new_size) = size {
                let file: Arc<INodeFile> = match self.get_file(ino) {
                    Ok(f) => f,
                    Err(e) => {
                        reply.error(e.errno());
                        return;
                    }
                };
                if let Err(e) = self.runtime.block_on(self.engine.truncate(&file, new_size)) {
                    reply.error(e.errno());
                    return;
                }
            }

            {
                let mut attrs = inode.attrs().write().unwrap();
                let now: SystemTime = SystemTime::now();
                if let Some(mode) = mode {
                    attrs.perm = (mode & 0o7777) as u16;
                }
                if let Some(uid) = uid {
                    attrs.uid = uid;
                }
                if let Some(gid) = gid {
                    attrs.gid = gid;
                }
                if let Some(atime) = atime {
                    attrs.atime = match atime {
                        TimeOrNow::SpecificTime(t) => t,
                        TimeOrNow::Now => now,
                    };
                }
                if let Some(mtime) = mtime {
                    attrs.mtime = match mtime {
                        TimeOrNow::SpecificTime(t) => t,
                        TimeOrNow::Now => now,
                    };
                }
                attrs.ctime = now;
            }

            reply.attr(&self.ttl(), &self.to_file_attr(inode.as_ref()));
        }

        fn readlink(&mut self, _req: &Request, ino: u64, reply: ReplyData) {
            debug!(ino, "readlink");
            let Some(inode) = self.inodes.get(ino) else {
                reply.error(libc::ENOENT);
                return;
            };
            match inode.as_any().downcast_ref::<INodeSymlink>() {
                Some(symlink) => reply.data(symlink.target().as_bytes()),
                None => reply.error(libc::EINVAL),
            }
        }

        fn mknod(
            &mut self,
            req: &Request,
            parent: u64,
            name: &OsStr,
            mode: u32,
            umask: u32,
            _rdev: u32,
            reply: ReplyEntry,
        ) {
            let Some(name) = name.to_str() else {
                reply.error(libc::EINVAL);
                return;
            };
            debug!(parent, name, mode = format_args!("0o{:o}", mode), "mknod");

            // Only regular files; devices and fifos have no backend mapping.
            if mode & libc::S_IFMT != libc::S_IFREG {
                reply.error(libc::EOPNOTSUPP);
                return;
            }

            let perm: u16 = Self::perm_from_mode(mode, umask);
            match self
                .inodes
                .create_file(parent, name, perm, req.uid(), req.gid())
            {
                Ok(file) => reply.entry(&self.ttl(), &self.to_file_attr(file.as_ref()), 0),
                Err(e) => reply.error(e.errno()),
            }
        }

        fn mkdir(
            &mut self,
            req: &Request,
            parent: u64,
            name: &OsStr,
            mode: u32,
            umask: u32,
            reply: ReplyEntry,
        ) {
            let Some(name) = name.to_str() else {
                reply.error(libc::EINVAL);
                return;
            };
            debug!(parent, name, mode = format_args!("0o{:o}", mode), "mkdir");

            let perm: u16 = Self::perm_from_mode(mode, umask);
            match self
                .inodes
                .create_dir(parent, name, perm, req.uid(), req.gid())
            {
                Ok(dir) => reply.entry(&self.ttl(), &self.to_file_attr(dir.as_ref()), 0),
                Err(e) => reply.error(e.errno()),
            }
        }

        fn unlink(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
            let Some(name) = name.to_str() else {
                reply.error(libc::ENOENT);
                return;
            };
            debug!(parent, name, "unlink");

            match self.inodes.unlink(parent, name) {
                Ok(detached) => {
                    self.reclaim(detached);
                    reply.ok();
                }
                Err(e) => reply.error(e.errno()),
            }
        }

        fn rmdir(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
            let Some(name) = name.to_str() else {
                reply.error(libc::ENOENT);
                return;
            };
            debug!(parent, name, "rmdir");

            match self.inodes.rmdir(parent, name) {
                Ok(()) => reply.ok(),
                Err(e) => reply.error(e.errno()),
            }
        }

        fn symlink(
            &mut self,
            req: &Request,
            parent: u64,
            link_name: &OsStr,
            target: &std::path::Path,
            reply: ReplyEntry,
        ) {
            let (Some(link_name), Some(target)) = (link_name.to_str(), target.to_str()) else {
                reply.error(libc::EINVAL);
                return;
            };
            debug!(parent, link_name, target, "symlink");

            match self
                .inodes
                .create_symlink(parent, link_name, target, req.uid(), req.gid())
            {
                Ok(symlink) => reply.entry(&self.ttl(), &self.to_file_attr(symlink.as_ref()), 0),
                Err(e) => reply.error(e.errno()),
            }
        }

        fn rename(
            &mut self,
            _req: &Request,
            parent: u64,
            name: &OsStr,
            newparent: u64,
            newname: &OsStr,
            flags: u32,
            reply: ReplyEmpty,
        ) {
            let (Some(name), Some(newname)) = (name.to_str(), newname.to_str()) else {
                reply.error(libc::ENOENT);
                return;
            };
            debug!(parent, name, newparent, newname, flags, "rename");

            match self.inodes.rename(parent, name, newparent, newname, flags) {
                Ok(displaced) => {
                    if let Some(detached) = displaced {
                        self.reclaim(detached);
                    }
                    reply.ok();
                }
                Err(e) => reply.error(e.errno()),
            }
        }

        fn link(
            &mut self,
            _req: &Request,
            ino: u64,
            newparent: u64,
            newname: &OsStr,
            reply: ReplyEntry,
        ) {
            let Some(newname) = newname.to_str() else {
                reply.error(libc::EINVAL);
                return;
            };
            debug!(ino, newparent, newname, "link");

            match self.inodes.link(ino, newparent, newname) {
                Ok(inode) => reply.entry(&self.ttl(), &self.to_file_attr(inode.as_ref()), 0),
                Err(e) => reply.error(e.errno()),
            }
        }

        fn open(&mut self, _req: &Request, ino: u64, flags: i32, reply: ReplyOpen) {
            debug!(ino, flags = format_args!("0o{:o}", flags), "open");
            let file: Arc<INodeFile> = match self.get_file(ino) {
                Ok(f) => f,
                Err(e) => {
                    reply.error(e.errno());
                    return;
                }
            };

            let writable: bool = flags & (libc::O_WRONLY | libc::O_RDWR) != 0;
            if flags & libc::O_TRUNC != 0 && writable {
                if let Err(e) = self.runtime.block_on(self.engine.truncate(&file, 0)) {
                    reply.error(e.errno());
                    return;
                }
            }

            let fh: u64 = self.next_handle.fetch_add(1, Ordering::SeqCst);
            self.handles
                .write()
                .unwrap()
                .insert(fh, OpenHandle { inode: ino });
            reply.opened(fh, 0);
        }

        fn create(
            &mut self,
            req: &Request,
            parent: u64,
            name: &OsStr,
            mode: u32,
            umask: u32,
            _flags: i32,
            reply: ReplyCreate,
        ) {
            let Some(name) = name.to_str() else {
                reply.error(libc::EINVAL);
                return;
            };
            debug!(parent, name, mode = format_args!("0o{:o}", mode), "create");

            let perm: u16 = Self::perm_from_mode(mode, umask);
            let file = match self
                .inodes
                .create_file(parent, name, perm, req.uid(), req.gid())
            {
                Ok(f) => f,
                Err(e) => {
                    reply.error(e.errno());
                    return;
                }
            };

            let fh: u64 = self.next_handle.fetch_add(1, Ordering::SeqCst);
            self.handles
                .write()
                .unwrap()
                .insert(fh, OpenHandle { inode: file.id() });
            reply.created(&self.ttl(), &self.to_file_attr(file.as_ref()), 0, fh, 0);
        }

        #[allow(clippy::too_many_arguments)]
        fn read(
            &mut self,
            _req: &Request,
            ino: u64,
            fh: u64,
            offset: i64,
            size: u32,
            _flags: i32,
            _lock: Option<u64>,
            reply: ReplyData,
        ) {
            debug!(ino, fh, offset, size, "read");
            if !self.handle_matches(fh, ino) {
                reply.error(libc::EBADF);
                return;
            }
            let file: Arc<INodeFile> = match self.get_file(ino) {
                Ok(f) => f,
                Err(e) => {
                    reply.error(e.errno());
                    return;
                }
            };

            match self
                .runtime
                .block_on(self.engine.read_at(&file, offset as u64, size as usize))
            {
                Ok(data) => {
                    file.attrs().write().unwrap().atime = SystemTime::now();
                    reply.data(&data);
                }
                Err(e) => reply.error(e.errno()),
            }
        }

        #[allow(clippy::too_many_arguments)]
        fn write(
            &mut self,
            _req: &Request,
            ino: u64,
            fh: u64,
            offset: i64,
            data: &[u8],
            _write_flags: u32,
            _flags: i32,
            _lock_owner: Option<u64>,
            reply: ReplyWrite,
        ) {
            debug!(ino, fh, offset, len = data.len(), "write");
            if !self.handle_matches(fh, ino) {
                reply.error(libc::EBADF);
                return;
            }
            let file: Arc<INodeFile> = match self.get_file(ino) {
                Ok(f) => f,
                Err(e) => {
                    reply.error(e.errno());
                    return;
                }
            };

            match self
                .runtime
                .block_on(self.engine.write_at(&file, offset as u64, data))
            {
                Ok(written) => reply.written(written as u32),
                Err(e) => reply.error(e.errno()),
            }
        }

        fn flush(&mut self, _req: &Request, ino: u64, fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
            debug!(ino, fh, "flush");
            if !self.handle_matches(fh, ino) {
                reply.error(libc::EBADF);
                return;
            }
            reply.ok();
        }

        fn release(
            &mut self,
            _req: &Request,
            ino: u64,
            fh: u64,
            _flags: i32,
            _lock: Option<u64>,
            _flush: bool,
            reply: ReplyEmpty,
        ) {
            debug!(ino, fh, "release");
            self.handles.write().unwrap().remove(&fh);

            // Reclaim files that were unlinked while open.
            if let Some(inode) = self.inodes.get(ino) {
                let orphaned: bool = inode.attrs_snapshot().nlink == 0;
                if orphaned && !self.is_open(ino) {
                    self.reclaim(Detached {
                        inode,
                        orphaned: true,
                    });
                }
            }
            reply.ok();
        }

        fn fsync(&mut self, _req: &Request, ino: u64, fh: u64, datasync: bool, reply: ReplyEmpty) {
            debug!(ino, fh, datasync, "fsync");
            let file: Arc<INodeFile> = match self.get_file(ino) {
                Ok(f) => f,
                Err(e) => {
                    reply.error(e.errno());
                    return;
                }
            };
            match self.runtime.block_on(self.engine.sync(&file)) {
                Ok(()) => reply.ok(),
                Err(e) => reply.error(e.errno()),
            }
        }

        fn readdir(
            &mut self,
            _req: &Request,
            ino: u64,
            _fh: u64,
            offset: i64,
            mut reply: ReplyDirectory,
        ) {
            debug!(ino, offset, "readdir");
            let Some(inode) = self.inodes.get(ino) else {
                reply.error(libc::ENOENT);
                return;
            };
            if inode.inode_type() != INodeType::Directory {
                reply.error(libc::ENOTDIR);
                return;
            }

            let mut entries: Vec<(u64, FileType, String)> = vec![
                (ino, FileType::Directory, ".".to_string()),
                (inode.parent_id(), FileType::Directory, "..".to_string()),
            ];

            if let Ok(children) = self.inodes.children(ino) {
                for (name, cid) in children {
                    if let Some(c) = self.inodes.get(cid) {
                        let kind: FileType = match c.inode_type() {
                            INodeType::File => FileType::RegularFile,
                            INodeType::Directory => FileType::Directory,
                            INodeType::Symlink => FileType::Symlink,
                        };
                        entries.push((cid, kind, name));
                    }
                }
            }

            for (i, (e_ino, kind, name)) in entries.iter().enumerate().skip(offset as usize) {
                if reply.add(*e_ino, (i + 1) as i64, *kind, name) {
                    break;
                }
            }
            reply.ok();
        }

        fn statfs(&mut self, _req: &Request, _ino: u64, reply: ReplyStatfs) {
            debug!("statfs");
            let usages: Vec<BackendUsage> = self.runtime.block_on(async {
                let mut out: Vec<BackendUsage> = Vec::new();
                for backend in self.engine.backends() {
                    out.push(backend.usage().await.unwrap_or_default());
                }
                out
            });

            // Normalize every backend to our block size and sum.
            let mut blocks: u64 = 0;
            let mut bfree: u64 = 0;
            let mut bavail: u64 = 0;
            let mut files: u64 = 0;
            let mut ffree: u64 = 0;
            for u in &usages {
                blocks += u.total_blocks * u.block_size / STATFS_BLOCK_SIZE;
                bfree += u.free_blocks * u.block_size / STATFS_BLOCK_SIZE;
                bavail += u.available_blocks * u.block_size / STATFS_BLOCK_SIZE;
                files += u.total_inodes;
                ffree += u.free_inodes;
            }

            reply.statfs(
                blocks,
                bfree,
                bavail,
                files,
                ffree,
                STATFS_BLOCK_SIZE as u32,
                MAX_NAME,
                STATFS_BLOCK_SIZE as u32,
            );
        }

        fn access(&mut self, _req: &Request, ino: u64, _mask: i32, reply: ReplyEmpty) {
            debug!(ino, "access");
            // Permission checks are delegated to the kernel via the
            // DefaultPermissions mount option; only existence matters here.
            if self.inodes.get(ino).is_some() {
                reply.ok();
            } else {
                reply.error(libc::ENOENT);
            }
        }

        #[allow(clippy::too_many_arguments)]
        fn fallocate(
            &mut self,
            _req: &Request,
            ino: u64,
            _fh: u64,
            offset: i64,
            length: i64,
            mode: i32,
            reply: ReplyEmpty,
        ) {
            debug!(ino, offset, length, mode, "fallocate");
            if mode & !libc::FALLOC_FL_KEEP_SIZE != 0 {
                reply.error(libc::EOPNOTSUPP);
                return;
            }
            let file: Arc<INodeFile> = match self.get_file(ino) {
                Ok(f) => f,
                Err(e) => {
                    reply.error(e.errno());
                    return;
                }
            };

            let end: u64 = (offset + length) as u64;
            if mode & libc::FALLOC_FL_KEEP_SIZE == 0 && end > file.size() {
                if let Err(e) = self.runtime.block_on(self.engine.truncate(&file, end)) {
                    reply.error(e.errno());
                    return;
                }
            }
            reply.ok();
        }

        fn lseek(
            &mut self,
            _req: &Request,
            ino: u64,
            _fh: u64,
            offset: i64,
            whence: i32,
            reply: ReplyLseek,
        ) {
            debug!(ino, offset, whence, "lseek");
            let file: Arc<INodeFile> = match self.get_file(ino) {
                Ok(f) => f,
                Err(e) => {
                    reply.error(e.errno());
                    return;
                }
            };
            let size: u64 = file.size();

            // Holes are not tracked, so data extends to the file size.
            match whence {
                libc::SEEK_DATA => {
                    if (offset as u64) < size {
                        reply.offset(offset);
                    } else {
                        reply.error(libc::ENXIO);
                    }
                }
                libc::SEEK_HOLE => {
                    if (offset as u64) <= size {
                        reply.offset(size as i64);
                    } else {
                        reply.error(libc::ENXIO);
                    }
                }
                _ => reply.error(libc::EINVAL),
            }
        }
    }

    /// Mount options derived from [`VfsOptions`].
    fn mount_options(options: &VfsOptions) -> Vec<fuser::MountOption> {
        use fuser::MountOption;
        let mut opts: Vec<MountOption> = vec![
            MountOption::FSName(options.fs_name.clone()),
            MountOption::AutoUnmount,
            MountOption::DefaultPermissions,
        ];
        if options.allow_other {
            opts.push(MountOption::AllowOther);
        }
        opts
    }

    /// Mount the VFS in the foreground until unmounted.
    ///
    /// # Arguments
    /// * `vfs` - The VFS to mount
    /// * `mountpoint` - Path to mount at
    pub fn mount(vfs: MultiFs, mountpoint: &std::path::Path) -> Result<(), VfsError> {
        let opts: Vec<fuser::MountOption> = mount_options(&vfs.options);
        fuser::mount2(vfs, mountpoint, &opts).map_err(|e| VfsError::MountFailed(e.to_string()))
    }

    /// Spawn the VFS mount in the background.
    ///
    /// # Returns
    /// Background session handle; dropping it unmounts.
    pub fn spawn_mount(
        vfs: MultiFs,
        mountpoint: &std::path::Path,
    ) -> Result<fuser::BackgroundSession, VfsError> {
        let opts: Vec<fuser::MountOption> = mount_options(&vfs.options);
        fuser::spawn_mount2(vfs, mountpoint, &opts)
            .map_err(|e| VfsError::MountFailed(e.to_string()))
    }
}

#[cfg(feature = "fuse")]
pub use impl_fuse::{
    mount, spawn_mount, BackendStats, MultiFs, OpenFileInfo, VfsStats, VfsStatsCollector,
};
