//! Error types for the VFS crate.

use std::fmt;

use multifs_storage::StorageError;

/// Errors that can occur during VFS operations.
#[derive(Debug)]
pub enum VfsError {
    /// Inode not found.
    InodeNotFound(u64),

    /// Not a directory.
    NotADirectory(u64),

    /// Not a regular file.
    NotAFile(u64),

    /// An entry with this name already exists.
    AlreadyExists(String),

    /// Directory entry not found.
    EntryNotFound(String),

    /// Directory is not empty.
    DirectoryNotEmpty(u64),

    /// Every backend is out of space.
    NoSpace,

    /// No backends were configured.
    NoBackends,

    /// Operation is not supported.
    NotSupported,

    /// Mount operation failed.
    MountFailed(String),

    /// Backend error.
    Storage(StorageError),

    /// IO error.
    Io(std::io::Error),
}

impl fmt::Display for VfsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VfsError::InodeNotFound(id) => write!(f, "Inode not found: {}", id),
            VfsError::NotADirectory(id) => write!(f, "Not a directory: {}", id),
            VfsError::NotAFile(id) => write!(f, "Not a regular file: {}", id),
            VfsError::AlreadyExists(name) => write!(f, "Entry already exists: {}", name),
            VfsError::EntryNotFound(name) => write!(f, "Entry not found: {}", name),
            VfsError::DirectoryNotEmpty(id) => write!(f, "Directory not empty: {}", id),
            VfsError::NoSpace => write!(f, "No space left on any backend"),
            VfsError::NoBackends => write!(f, "No storage backends configured"),
            VfsError::NotSupported => write!(f, "Operation not supported"),
            VfsError::MountFailed(msg) => write!(f, "Mount failed: {}", msg),
            VfsError::Storage(e) => write!(f, "Backend error: {}", e),
            VfsError::Io(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for VfsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            VfsError::Storage(e) => Some(e),
            VfsError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StorageError> for VfsError {
    fn from(e: StorageError) -> Self {
        VfsError::Storage(e)
    }
}

impl From<std::io::Error> for VfsError {
    fn from(e: std::io::Error) -> Self {
        VfsError::Io(e)
    }
}

impl VfsError {
    /// Map to the errno reported through FUSE.
    pub fn errno(&self) -> i32 {
        match self {
            VfsError::InodeNotFound(_) => libc::ENOENT,
            VfsError::NotADirectory(_) => libc::ENOTDIR,
            VfsError::NotAFile(_) => libc::EISDIR,
            VfsError::AlreadyExists(_) => libc::EEXIST,
            VfsError::EntryNotFound(_) => libc::ENOENT,
            VfsError::DirectoryNotEmpty(_) => libc::ENOTEMPTY,
            VfsError::NoSpace => libc::ENOSPC,
            VfsError::NoBackends => libc::EINVAL,
            VfsError::NotSupported => libc::EOPNOTSUPP,
            VfsError::MountFailed(_) => libc::EIO,
            VfsError::Storage(StorageError::NoSpace { .. }) => libc::ENOSPC,
            VfsError::Storage(StorageError::NotFound { .. }) => libc::ENOENT,
            VfsError::Storage(StorageError::AlreadyExists { .. }) => libc::EEXIST,
            VfsError::Storage(StorageError::Io { source, .. }) => {
                source.raw_os_error().unwrap_or(libc::EIO)
            }
            VfsError::Storage(_) => libc::EIO,
            VfsError::Io(e) => e.raw_os_error().unwrap_or(libc::EIO),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_mapping() {
        assert_eq!(VfsError::InodeNotFound(7).errno(), libc::ENOENT);
        assert_eq!(VfsError::NoSpace.errno(), libc::ENOSPC);
        assert_eq!(
            VfsError::Storage(StorageError::NoSpace {
                backend: "ram0".to_string()
            })
            .errno(),
            libc::ENOSPC
        );
        assert_eq!(VfsError::DirectoryNotEmpty(2).errno(), libc::ENOTEMPTY);
    }
}
