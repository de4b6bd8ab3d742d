//! Directory-backed storage.

use std::io;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::traits::{BackendUsage, StorageBackend};

/// Block size reported for quota-limited backends.
const QUOTA_BLOCK_SIZE: u64 = 4096;

/// Backend that stores each object as a regular file under a root directory.
///
/// Out-of-space is taken from the OS (`ENOSPC`); an optional byte quota lets
/// a small capacity be emulated on top of a large filesystem, which is how
/// tiered setups and the spillover tests bound each backend.
#[derive(Debug)]
pub struct DirBackend {
    root: PathBuf,
    label: String,
    quota_bytes: Option<u64>,
    /// Bytes currently stored, tracked only when a quota is set.
    used_bytes: Arc<AtomicU64>,
}

impl DirBackend {
    /// Open a backend rooted at an existing directory.
    ///
    /// # Arguments
    /// * `root` - Absolute path to an existing directory
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        Self::with_quota(root, None)
    }

    /// Open a backend with an optional byte quota.
    ///
    /// # Arguments
    /// * `root` - Absolute path to an existing directory
    /// * `quota_bytes` - Reject writes that would push stored bytes past this
    pub fn with_quota(
        root: impl Into<PathBuf>,
        quota_bytes: Option<u64>,
    ) -> Result<Self, StorageError> {
        let root: PathBuf = root.into();
        if !root.is_absolute() {
            return Err(StorageError::InvalidRoot {
                root: root.display().to_string(),
                reason: "root must be an absolute path".to_string(),
            });
        }
        if !root.is_dir() {
            return Err(StorageError::InvalidRoot {
                root: root.display().to_string(),
                reason: "root must be an existing directory".to_string(),
            });
        }

        let used: u64 = if quota_bytes.is_some() {
            scan_used_bytes(&root)?
        } else {
            0
        };

        let label: String = root.display().to_string();
        Ok(Self {
            root,
            label,
            quota_bytes,
            used_bytes: Arc::new(AtomicU64::new(used)),
        })
    }

    /// Root directory of this backend.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn map_io(&self, name: &str, e: io::Error) -> StorageError {
        StorageError::from_io(&self.label, name, e)
    }

    /// How many more bytes this backend will accept, if a quota is set.
    fn quota_headroom(&self) -> Option<u64> {
        self.quota_bytes
            .map(|q| q.saturating_sub(self.used_bytes.load(Ordering::SeqCst)))
    }
}

/// Sum the sizes of all regular files directly under `root`.
fn scan_used_bytes(root: &Path) -> Result<u64, StorageError> {
    let mut used: u64 = 0;
    let entries = std::fs::read_dir(root)
        .map_err(|e| StorageError::from_io(&root.display().to_string(), ".", e))?;
    for entry in entries {
        let entry = entry.map_err(|e| StorageError::from_io(&root.display().to_string(), ".", e))?;
        if let Ok(meta) = entry.metadata() {
            if meta.is_file() {
                used += meta.len();
            }
        }
    }
    Ok(used)
}

#[async_trait]
impl StorageBackend for DirBackend {
    fn label(&self) -> &str {
        &self.label
    }

    async fn create(&self, name: &str) -> Result<(), StorageError> {
        let path: PathBuf = self.object_path(name);
        let label: String = self.label.clone();
        let name: String = name.to_string();
        tokio::task::spawn_blocking(move || {
            std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .map(|_| ())
                .map_err(|e| {
                    if e.kind() == io::ErrorKind::AlreadyExists {
                        StorageError::AlreadyExists { name: name.clone() }
                    } else {
                        StorageError::from_io(&label, &name, e)
                    }
                })
        })
        .await
        .expect("blocking task panicked")
    }

    async fn write_at(&self, name: &str, offset: u64, data: &[u8]) -> Result<usize, StorageError> {
        let headroom: Option<u64> = self.quota_headroom();
        let path: PathBuf = self.object_path(name);
        let label: String = self.label.clone();
        let name_owned: String = name.to_string();
        let data: Vec<u8> = data.to_vec();
        let used: Arc<AtomicU64> = self.used_bytes.clone();
        let quota_enabled: bool = self.quota_bytes.is_some();

        tokio::task::spawn_blocking(move || {
            let file = std::fs::OpenOptions::new()
                .write(true)
                .open(&path)
                .map_err(|e| {
                    if e.kind() == io::ErrorKind::NotFound {
                        StorageError::NotFound {
                            name: name_owned.clone(),
                        }
                    } else {
                        StorageError::from_io(&label, &name_owned, e)
                    }
                })?;

            let old_len: u64 = file
                .metadata()
                .map_err(|e| StorageError::from_io(&label, &name_owned, e))?
                .len();

            // Under a quota, only growth counts against the budget.
            let mut writable: usize = data.len();
            if quota_enabled {
                let end: u64 = offset + data.len() as u64;
                let growth: u64 = end.saturating_sub(old_len);
                let headroom: u64 = headroom.unwrap_or(0);
                if growth > headroom {
                    let over: u64 = growth - headroom;
                    if over >= data.len() as u64 {
                        return Err(StorageError::NoSpace { backend: label });
                    }
                    writable = data.len() - over as usize;
                }
            }

            file.write_all_at(&data[..writable], offset)
                .map_err(|e| StorageError::from_io(&label, &name_owned, e))?;

            if quota_enabled {
                let new_len: u64 = (offset + writable as u64).max(old_len);
                used.fetch_add(new_len - old_len, Ordering::SeqCst);
            }

            Ok(writable)
        })
        .await
        .expect("blocking task panicked")
    }

    async fn read_at(
        &self,
        name: &str,
        offset: u64,
        buf_size: usize,
    ) -> Result<Vec<u8>, StorageError> {
        let path: PathBuf = self.object_path(name);
        let label: String = self.label.clone();
        let name_owned: String = name.to_string();

        tokio::task::spawn_blocking(move || {
            let file = std::fs::File::open(&path).map_err(|e| {
                if e.kind() == io::ErrorKind::NotFound {
                    StorageError::NotFound {
                        name: name_owned.clone(),
                    }
                } else {
                    StorageError::from_io(&label, &name_owned, e)
                }
            })?;

            let mut buf: Vec<u8> = vec![0u8; buf_size];
            let mut read: usize = 0;
            while read < buf_size {
                let n: usize = file
                    .read_at(&mut buf[read..], offset + read as u64)
                    .map_err(|e| StorageError::from_io(&label, &name_owned, e))?;
                if n == 0 {
                    break;
                }
                read += n;
            }
            buf.truncate(read);
            Ok(buf)
        })
        .await
        .expect("blocking task panicked")
    }

    async fn truncate(&self, name: &str, size: u64) -> Result<(), StorageError> {
        let path: PathBuf = self.object_path(name);
        let label: String = self.label.clone();
        let name_owned: String = name.to_string();
        let used: Arc<AtomicU64> = self.used_bytes.clone();
        let quota_enabled: bool = self.quota_bytes.is_some();

        tokio::task::spawn_blocking(move || {
            let file = std::fs::OpenOptions::new()
                .write(true)
                .open(&path)
                .map_err(|e| {
                    if e.kind() == io::ErrorKind::NotFound {
                        StorageError::NotFound {
                            name: name_owned.clone(),
                        }
                    } else {
                        StorageError::from_io(&label, &name_owned, e)
                    }
                })?;

            let old_len: u64 = file
                .metadata()
                .map_err(|e| StorageError::from_io(&label, &name_owned, e))?
                .len();

            file.set_len(size)
                .map_err(|e| StorageError::from_io(&label, &name_owned, e))?;

            if quota_enabled {
                if size >= old_len {
                    used.fetch_add(size - old_len, Ordering::SeqCst);
                } else {
                    used.fetch_sub(old_len - size, Ordering::SeqCst);
                }
            }
            Ok(())
        })
        .await
        .expect("blocking task panicked")
    }

    async fn remove(&self, name: &str) -> Result<(), StorageError> {
        let path: PathBuf = self.object_path(name);
        let label: String = self.label.clone();
        let name_owned: String = name.to_string();
        let used: Arc<AtomicU64> = self.used_bytes.clone();
        let quota_enabled: bool = self.quota_bytes.is_some();

        tokio::task::spawn_blocking(move || {
            let old_len: u64 = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    if quota_enabled {
                        used.fetch_sub(old_len, Ordering::SeqCst);
                    }
                    Ok(())
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(StorageError::from_io(&label, &name_owned, e)),
            }
        })
        .await
        .expect("blocking task panicked")
    }

    async fn sync(&self, name: &str) -> Result<(), StorageError> {
        let path: PathBuf = self.object_path(name);
        let label: String = self.label.clone();
        let name_owned: String = name.to_string();

        tokio::task::spawn_blocking(move || {
            let file = std::fs::File::open(&path).map_err(|e| {
                if e.kind() == io::ErrorKind::NotFound {
                    StorageError::NotFound {
                        name: name_owned.clone(),
                    }
                } else {
                    StorageError::from_io(&label, &name_owned, e)
                }
            })?;
            file.sync_all()
                .map_err(|e| StorageError::from_io(&label, &name_owned, e))
        })
        .await
        .expect("blocking task panicked")
    }

    async fn usage(&self) -> Result<BackendUsage, StorageError> {
        if let Some(quota) = self.quota_bytes {
            let used: u64 = self.used_bytes.load(Ordering::SeqCst);
            let free: u64 = quota.saturating_sub(used);
            return Ok(BackendUsage {
                block_size: QUOTA_BLOCK_SIZE,
                total_blocks: quota / QUOTA_BLOCK_SIZE,
                free_blocks: free / QUOTA_BLOCK_SIZE,
                available_blocks: free / QUOTA_BLOCK_SIZE,
                total_inodes: 0,
                free_inodes: 0,
            });
        }

        let root: PathBuf = self.root.clone();
        let label: String = self.label.clone();
        tokio::task::spawn_blocking(move || statvfs(&root, &label))
            .await
            .expect("blocking task panicked")
    }
}

/// Query the OS for filesystem usage at `path`.
fn statvfs(path: &Path, label: &str) -> Result<BackendUsage, StorageError> {
    use std::os::unix::ffi::OsStrExt;

    let cpath = std::ffi::CString::new(path.as_os_str().as_bytes()).map_err(|_| {
        StorageError::InvalidRoot {
            root: path.display().to_string(),
            reason: "root path contains a NUL byte".to_string(),
        }
    })?;

    let mut st: libc::statvfs = unsafe { std::mem::zeroed() };
    let res: i32 = unsafe { libc::statvfs(cpath.as_ptr(), &mut st) };
    if res != 0 {
        return Err(StorageError::from_io(
            label,
            ".",
            std::io::Error::last_os_error(),
        ));
    }

    Ok(BackendUsage {
        block_size: st.f_frsize as u64,
        total_blocks: st.f_blocks as u64,
        free_blocks: st.f_bfree as u64,
        available_blocks: st.f_bavail as u64,
        total_inodes: st.f_files as u64,
        free_inodes: st.f_ffree as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(dir: &tempfile::TempDir, quota: Option<u64>) -> DirBackend {
        DirBackend::with_quota(dir.path().to_path_buf(), quota).unwrap()
    }

    #[tokio::test]
    async fn test_create_write_read() {
        let dir = tempfile::tempdir().unwrap();
        let b: DirBackend = backend(&dir, None);

        b.create("obj").await.unwrap();
        let n: usize = b.write_at("obj", 0, b"hello world").await.unwrap();
        assert_eq!(n, 11);

        let data: Vec<u8> = b.read_at("obj", 6, 16).await.unwrap();
        assert_eq!(data, b"world");
    }

    #[tokio::test]
    async fn test_create_existing_fails() {
        let dir = tempfile::tempdir().unwrap();
        let b: DirBackend = backend(&dir, None);

        b.create("obj").await.unwrap();
        let err = b.create("obj").await.unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_write_missing_object() {
        let dir = tempfile::tempdir().unwrap();
        let b: DirBackend = backend(&dir, None);

        let err = b.write_at("nope", 0, b"x").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_quota_short_write_then_no_space() {
        let dir = tempfile::tempdir().unwrap();
        let b: DirBackend = backend(&dir, Some(8));

        b.create("obj").await.unwrap();
        // 8 of 12 bytes fit.
        let n: usize = b.write_at("obj", 0, b"abcdefghijkl").await.unwrap();
        assert_eq!(n, 8);

        // Backend is now full.
        let err = b.write_at("obj", 8, b"mn").await.unwrap_err();
        assert!(err.is_no_space());

        // Overwriting in place does not count against the quota.
        let n: usize = b.write_at("obj", 0, b"ABCD").await.unwrap();
        assert_eq!(n, 4);
    }

    #[tokio::test]
    async fn test_quota_freed_by_truncate_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let b: DirBackend = backend(&dir, Some(8192));

        b.create("obj").await.unwrap();
        let payload: Vec<u8> = vec![7u8; 8192];
        assert_eq!(b.write_at("obj", 0, &payload).await.unwrap(), 8192);
        assert_eq!(b.usage().await.unwrap().free_bytes(), 0);

        b.truncate("obj", 4096).await.unwrap();
        assert_eq!(b.usage().await.unwrap().free_bytes(), 4096);

        b.remove("obj").await.unwrap();
        assert_eq!(b.usage().await.unwrap().free_bytes(), 8192);
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let b: DirBackend = backend(&dir, None);
        b.remove("never-existed").await.unwrap();
    }

    #[tokio::test]
    async fn test_quota_scan_counts_existing_objects() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("pre"), vec![1u8; 4096]).unwrap();

        let b: DirBackend = backend(&dir, Some(8192));
        let usage: BackendUsage = b.usage().await.unwrap();
        assert_eq!(usage.free_bytes(), 4096);
    }

    #[tokio::test]
    async fn test_usage_without_quota_reports_os_numbers() {
        let dir = tempfile::tempdir().unwrap();
        let b: DirBackend = backend(&dir, None);
        let usage: BackendUsage = b.usage().await.unwrap();
        assert!(usage.block_size > 0);
        assert!(usage.total_blocks > 0);
    }

    #[test]
    fn test_relative_root_rejected() {
        let err = DirBackend::new("relative/path").unwrap_err();
        assert!(matches!(err, StorageError::InvalidRoot { .. }));
    }
}
