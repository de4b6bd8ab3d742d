//! Storage backend error types.

use thiserror::Error;

/// Errors that can occur during backend operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Backend has no room left for the requested write.
    ///
    /// Distinct from [`StorageError::Io`] so the spillover engine can seal
    /// the current chunk and continue on the next backend.
    #[error("No space left on backend: {backend}")]
    NoSpace {
        /// Label of the backend that ran out of space.
        backend: String,
    },

    /// Object not found on this backend.
    #[error("Object not found: {name}")]
    NotFound {
        /// The object name that was looked up.
        name: String,
    },

    /// Object already exists on this backend.
    #[error("Object already exists: {name}")]
    AlreadyExists {
        /// The object name that collided.
        name: String,
    },

    /// Backend root is not usable.
    #[error("Invalid backend root {root}: {reason}")]
    InvalidRoot {
        /// The configured root path.
        root: String,
        /// Why it was rejected.
        reason: String,
    },

    /// IO error.
    #[error("IO error at {name}: {source}")]
    Io {
        /// Object name where the error occurred.
        name: String,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl StorageError {
    /// Whether this error means the backend is full.
    pub fn is_no_space(&self) -> bool {
        matches!(self, StorageError::NoSpace { .. })
    }

    /// Map an IO error for `name`, promoting `ENOSPC` to [`StorageError::NoSpace`].
    pub fn from_io(backend: &str, name: &str, source: std::io::Error) -> Self {
        if source.raw_os_error() == Some(libc::ENOSPC) {
            StorageError::NoSpace {
                backend: backend.to_string(),
            }
        } else {
            StorageError::Io {
                name: name.to_string(),
                source,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enospc_promoted_to_no_space() {
        let io = std::io::Error::from_raw_os_error(libc::ENOSPC);
        let err: StorageError = StorageError::from_io("disk0", "obj", io);
        assert!(err.is_no_space());
    }

    #[test]
    fn test_other_io_errors_stay_io() {
        let io = std::io::Error::from_raw_os_error(libc::EACCES);
        let err: StorageError = StorageError::from_io("disk0", "obj", io);
        assert!(!err.is_no_space());
        assert!(matches!(err, StorageError::Io { .. }));
    }
}
