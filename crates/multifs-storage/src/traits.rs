//! Backend trait and shared types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Capacity and usage report from a backend, in `statvfs` terms.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct BackendUsage {
    /// Block size in bytes.
    pub block_size: u64,
    /// Total size in blocks.
    pub total_blocks: u64,
    /// Free blocks.
    pub free_blocks: u64,
    /// Blocks available to unprivileged users.
    pub available_blocks: u64,
    /// Total inodes.
    pub total_inodes: u64,
    /// Free inodes.
    pub free_inodes: u64,
}

impl BackendUsage {
    /// Total capacity in bytes.
    pub fn total_bytes(&self) -> u64 {
        self.total_blocks * self.block_size
    }

    /// Free capacity in bytes.
    pub fn free_bytes(&self) -> u64 {
        self.free_blocks * self.block_size
    }
}

/// A flat object store that file content can be spilled onto.
///
/// Object names are chosen by the caller and are opaque to the backend. All
/// operations on absent objects return [`StorageError::NotFound`] except
/// `remove`, which is idempotent.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Human-readable label used in logs and errors.
    fn label(&self) -> &str;

    /// Create an empty object.
    ///
    /// # Arguments
    /// * `name` - Object name
    async fn create(&self, name: &str) -> Result<(), StorageError>;

    /// Write `data` at `offset` within an object.
    ///
    /// # Returns
    /// Number of bytes written. A short count is only returned when the
    /// backend hit its capacity mid-buffer; bytes written before the
    /// boundary stay intact.
    async fn write_at(&self, name: &str, offset: u64, data: &[u8]) -> Result<usize, StorageError>;

    /// Read up to `buf_size` bytes at `offset` from an object.
    ///
    /// # Returns
    /// The bytes read; shorter than `buf_size` at end of object.
    async fn read_at(&self, name: &str, offset: u64, buf_size: usize)
        -> Result<Vec<u8>, StorageError>;

    /// Truncate an object to `size` bytes.
    async fn truncate(&self, name: &str, size: u64) -> Result<(), StorageError>;

    /// Remove an object. Removing an absent object is not an error.
    async fn remove(&self, name: &str) -> Result<(), StorageError>;

    /// Flush an object's data to durable storage.
    async fn sync(&self, name: &str) -> Result<(), StorageError>;

    /// Report capacity and usage.
    async fn usage(&self) -> Result<BackendUsage, StorageError>;
}
