//! In-memory storage backend.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::traits::{BackendUsage, StorageBackend};

/// Backend that keeps objects in memory, bounded by a byte capacity.
///
/// The capacity bound is what makes it useful beyond tests: spillover only
/// happens when a backend fills up, and an in-memory tier with a small
/// capacity produces that deterministically.
pub struct MemBackend {
    label: String,
    capacity_bytes: u64,
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemBackend {
    /// Create a backend holding at most `capacity_bytes` of object data.
    ///
    /// # Arguments
    /// * `label` - Label used in logs and errors
    /// * `capacity_bytes` - Total byte capacity
    pub fn new(label: impl Into<String>, capacity_bytes: u64) -> Self {
        Self {
            label: label.into(),
            capacity_bytes,
            objects: RwLock::new(HashMap::new()),
        }
    }

    /// Bytes currently stored across all objects.
    pub fn used_bytes(&self) -> u64 {
        let objects = self.objects.read().unwrap();
        objects.values().map(|v| v.len() as u64).sum()
    }

    /// Number of objects currently stored.
    pub fn object_count(&self) -> usize {
        self.objects.read().unwrap().len()
    }
}

#[async_trait]
impl StorageBackend for MemBackend {
    fn label(&self) -> &str {
        &self.label
    }

    async fn create(&self, name: &str) -> Result<(), StorageError> {
        let mut objects = self.objects.write().unwrap();
        if objects.contains_key(name) {
            return Err(StorageError::AlreadyExists {
                name: name.to_string(),
            });
        }
        objects.insert(name.to_string(), Vec::new());
        Ok(())
    }

    async fn write_at(&self, name: &str, offset: u64, data: &[u8]) -> Result<usize, StorageError> {
        let mut objects = self.objects.write().unwrap();

        let used: u64 = objects.values().map(|v| v.len() as u64).sum();
        let obj: &mut Vec<u8> = objects.get_mut(name).ok_or_else(|| StorageError::NotFound {
            name: name.to_string(),
        })?;

        let end: u64 = offset + data.len() as u64;
        let growth: u64 = end.saturating_sub(obj.len() as u64);
        let headroom: u64 = self.capacity_bytes.saturating_sub(used);

        let writable: usize = if growth > headroom {
            let over: u64 = growth - headroom;
            if over >= data.len() as u64 {
                return Err(StorageError::NoSpace {
                    backend: self.label.clone(),
                });
            }
            data.len() - over as usize
        } else {
            data.len()
        };

        let write_end: usize = offset as usize + writable;
        if obj.len() < write_end {
            obj.resize(write_end, 0);
        }
        obj[offset as usize..write_end].copy_from_slice(&data[..writable]);
        Ok(writable)
    }

    async fn read_at(
        &self,
        name: &str,
        offset: u64,
        buf_size: usize,
    ) -> Result<Vec<u8>, StorageError> {
        let objects = self.objects.read().unwrap();
        let obj: &Vec<u8> = objects.get(name).ok_or_else(|| StorageError::NotFound {
            name: name.to_string(),
        })?;

        let start: usize = (offset as usize).min(obj.len());
        let end: usize = (start + buf_size).min(obj.len());
        Ok(obj[start..end].to_vec())
    }

    async fn truncate(&self, name: &str, size: u64) -> Result<(), StorageError> {
        let mut objects = self.objects.write().unwrap();
        let obj: &mut Vec<u8> = objects.get_mut(name).ok_or_else(|| StorageError::NotFound {
            name: name.to_string(),
        })?;
        obj.resize(size as usize, 0);
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<(), StorageError> {
        self.objects.write().unwrap().remove(name);
        Ok(())
    }

    async fn sync(&self, _name: &str) -> Result<(), StorageError> {
        Ok(())
    }

    async fn usage(&self) -> Result<BackendUsage, StorageError> {
        let used: u64 = self.used_bytes();
        let free: u64 = self.capacity_bytes.saturating_sub(used);
        Ok(BackendUsage {
            block_size: 1,
            total_blocks: self.capacity_bytes,
            free_blocks: free,
            available_blocks: free,
            total_inodes: 0,
            free_inodes: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_then_read_back() {
        let b = MemBackend::new("ram0", 64);
        b.create("obj").await.unwrap();
        assert_eq!(b.write_at("obj", 0, b"spill me").await.unwrap(), 8);
        assert_eq!(b.read_at("obj", 0, 64).await.unwrap(), b"spill me");
    }

    #[tokio::test]
    async fn test_capacity_produces_short_write() {
        let b = MemBackend::new("ram0", 10);
        b.create("obj").await.unwrap();

        let n: usize = b.write_at("obj", 0, b"0123456789abcdef").await.unwrap();
        assert_eq!(n, 10);
        assert_eq!(b.used_bytes(), 10);

        let err = b.write_at("obj", 10, b"x").await.unwrap_err();
        assert!(err.is_no_space());
    }

    #[tokio::test]
    async fn test_capacity_shared_across_objects() {
        let b = MemBackend::new("ram0", 10);
        b.create("a").await.unwrap();
        b.create("b").await.unwrap();

        assert_eq!(b.write_at("a", 0, b"123456").await.unwrap(), 6);
        assert_eq!(b.write_at("b", 0, b"abcdef").await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_sparse_write_zero_fills() {
        let b = MemBackend::new("ram0", 64);
        b.create("obj").await.unwrap();
        b.write_at("obj", 4, b"tail").await.unwrap();

        let data: Vec<u8> = b.read_at("obj", 0, 8).await.unwrap();
        assert_eq!(data, b"\0\0\0\0tail");
    }

    #[tokio::test]
    async fn test_truncate_extends_and_shrinks() {
        let b = MemBackend::new("ram0", 64);
        b.create("obj").await.unwrap();
        b.write_at("obj", 0, b"abcd").await.unwrap();

        b.truncate("obj", 2).await.unwrap();
        assert_eq!(b.read_at("obj", 0, 8).await.unwrap(), b"ab");

        b.truncate("obj", 4).await.unwrap();
        assert_eq!(b.read_at("obj", 0, 8).await.unwrap(), b"ab\0\0");
    }

    #[tokio::test]
    async fn test_read_past_end_is_empty() {
        let b = MemBackend::new("ram0", 64);
        b.create("obj").await.unwrap();
        b.write_at("obj", 0, b"abc").await.unwrap();
        assert!(b.read_at("obj", 10, 4).await.unwrap().is_empty());
    }
}
