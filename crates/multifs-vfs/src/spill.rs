//! Capacity-spillover engine.
//!
//! Routes file content across an ordered list of backends. A file starts on
//! the first backend; when that backend reports out-of-space the current
//! chunk is sealed at the write position and the remainder of the file
//! continues on the next backend. The resulting chunk map lives in the file
//! inode and covers the file contiguously.
//!
//! Backend objects are named after the inode id, so rename never touches
//! storage and hard links share one object set.

use std::sync::Arc;

use multifs_storage::{StorageBackend, StorageError};
use tracing::debug;

use crate::inode::{Chunk, ChunkMap, INode, INodeFile, INodeId};
use crate::VfsError;

/// Routes file content across the configured backends.
pub struct SpillEngine {
    backends: Vec<Arc<dyn StorageBackend>>,
}

impl std::fmt::Debug for SpillEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpillEngine")
            .field("backends", &self.backends.len())
            .finish()
    }
}

impl SpillEngine {
    /// Create an engine over an ordered, non-empty backend list.
    pub fn new(backends: Vec<Arc<dyn StorageBackend>>) -> Result<Self, VfsError> {
        if backends.is_empty() {
            return Err(VfsError::NoBackends);
        }
        Ok(Self { backends })
    }

    /// The configured backends, in spillover order.
    pub fn backends(&self) -> &[Arc<dyn StorageBackend>] {
        &self.backends
    }

    /// Backend object name for a file inode.
    pub fn object_name(ino: INodeId) -> String {
        format!("{:016x}.chunk", ino)
    }

    /// Write `data` at `offset`, spilling onto further backends as needed.
    ///
    /// # Returns
    /// Bytes written. Shorter than `data` only when every remaining backend
    /// filled up mid-write; [`VfsError::NoSpace`] when nothing could be
    /// written at all.
    pub async fn write_at(
        &self,
        file: &INodeFile,
        offset: u64,
        data: &[u8],
    ) -> Result<usize, VfsError> {
        if data.is_empty() {
            return Ok(0);
        }

        let name: String = Self::object_name(file.id());
        let mut map: ChunkMap = file.chunks_snapshot();
        let mut written: usize = 0;
        let mut pos: u64 = offset;

        while written < data.len() {
            let idx: usize = match map.chunk_at(pos) {
                Some(idx) => idx,
                None => match self.allocate_chunk(&name, &mut map, pos).await {
                    Ok(idx) => idx,
                    Err(e) if written > 0 => {
                        debug!(error = %e, "spill write stopped short");
                        break;
                    }
                    Err(e) => {
                        self.store_map(file, map);
                        return Err(e);
                    }
                },
            };

            let chunk: Chunk = map.chunks[idx];
            let want: usize =
                ((data.len() - written) as u64).min(chunk.end - pos) as usize;
            let backend: &Arc<dyn StorageBackend> = &self.backends[chunk.backend];

            let res: Result<usize, StorageError> = backend
                .write_at(&name, pos - chunk.start, &data[written..written + want])
                .await;

            let n: usize = match res {
                Ok(n) => n,
                Err(e) if e.is_no_space() && chunk.is_open() => 0,
                Err(e) => {
                    self.store_map(file, map);
                    if written > 0 {
                        self.grow_size(file, offset + written as u64);
                        return Ok(written);
                    }
                    return Err(e.into());
                }
            };

            written += n;
            pos += n as u64;

            if n < want {
                if !map.chunks[idx].is_open() {
                    // A sealed chunk's range is fully backed; a short write
                    // there means the backend lost data.
                    self.store_map(file, map);
                    return Err(VfsError::Io(std::io::Error::other(format!(
                        "short write inside sealed chunk on {}",
                        backend.label()
                    ))));
                }
                self.seal_open_chunk(&name, &mut map, pos).await;
            }
        }

        if written > 0 {
            self.grow_size(file, offset + written as u64);
        }
        self.store_map(file, map);

        if written == 0 {
            return Err(VfsError::NoSpace);
        }
        Ok(written)
    }

    /// Read up to `buf_size` bytes at `offset`, gathering across chunks.
    pub async fn read_at(
        &self,
        file: &INodeFile,
        offset: u64,
        buf_size: usize,
    ) -> Result<Vec<u8>, VfsError> {
        let size: u64 = file.size();
        if offset >= size || buf_size == 0 {
            return Ok(Vec::new());
        }
        let len: usize = buf_size.min((size - offset) as usize);

        let name: String = Self::object_name(file.id());
        let map: ChunkMap = file.chunks_snapshot();
        let mut out: Vec<u8> = Vec::with_capacity(len);
        let mut pos: u64 = offset;

        while out.len() < len {
            let Some(idx) = map.chunk_at(pos) else {
                // Hole past the last sealed chunk (sparse extend).
                out.resize(len, 0);
                break;
            };
            let chunk: Chunk = map.chunks[idx];
            let want: usize = ((len - out.len()) as u64).min(chunk.end - pos) as usize;

            let data: Vec<u8> = self.backends[chunk.backend]
                .read_at(&name, pos - chunk.start, want)
                .await?;
            let n: usize = data.len();
            out.extend_from_slice(&data);
            pos += n as u64;

            if n < want {
                // Backend object is shorter than the logical size (sparse
                // region created by truncate-extend); the rest reads as zeros.
                out.resize(len, 0);
                break;
            }
        }

        Ok(out)
    }

    /// Truncate the file to `new_size`, releasing chunks past the end.
    pub async fn truncate(&self, file: &INodeFile, new_size: u64) -> Result<(), VfsError> {
        let name: String = Self::object_name(file.id());
        let mut map: ChunkMap = file.chunks_snapshot();
        let old_size: u64 = file.size();

        if new_size < old_size {
            while let Some(last) = map.chunks.last().copied() {
                if last.start < new_size {
                    break;
                }
                self.backends[last.backend].remove(&name).await?;
                map.chunks.pop();
            }
            if let Some(last) = map.chunks.last_mut() {
                self.backends[last.backend]
                    .truncate(&name, new_size - last.start)
                    .await?;
                // Reopen the tail so future appends try this backend first.
                last.end = u64::MAX;
            }
            // Released backends become eligible for spilling again.
            map.next_backend = map.chunks.last().map(|c| c.backend + 1).unwrap_or(0);
        } else if new_size > old_size {
            if let Some(last) = map.chunks.last() {
                if last.is_open() {
                    self.backends[last.backend]
                        .truncate(&name, new_size - last.start)
                        .await?;
                }
            }
        }

        {
            let mut attrs = file.attrs().write().unwrap();
            attrs.size = new_size;
            attrs.touch_modified();
        }
        self.store_map(file, map);
        Ok(())
    }

    /// Remove the file's object from every backend it touched.
    pub async fn remove(&self, file: &INodeFile) -> Result<(), VfsError> {
        let name: String = Self::object_name(file.id());
        let map: ChunkMap = file.chunks_snapshot();
        for chunk in &map.chunks {
            self.backends[chunk.backend].remove(&name).await?;
        }
        self.store_map(file, ChunkMap::default());
        Ok(())
    }

    /// Flush the file on every backend holding a chunk.
    pub async fn sync(&self, file: &INodeFile) -> Result<(), VfsError> {
        let name: String = Self::object_name(file.id());
        let map: ChunkMap = file.chunks_snapshot();
        for chunk in &map.chunks {
            self.backends[chunk.backend].sync(&name).await?;
        }
        Ok(())
    }

    /// Allocate a fresh open chunk on the next backend in order.
    ///
    /// # Returns
    /// Index of the new chunk in `map.chunks`.
    async fn allocate_chunk(
        &self,
        name: &str,
        map: &mut ChunkMap,
        pos: u64,
    ) -> Result<usize, VfsError> {
        if map.next_backend >= self.backends.len() {
            return Err(VfsError::NoSpace);
        }
        let backend_idx: usize = map.next_backend;
        map.next_backend += 1;

        match self.backends[backend_idx].create(name).await {
            Ok(()) | Err(StorageError::AlreadyExists { .. }) => {}
            Err(e) => return Err(e.into()),
        }

        // The new chunk picks up where coverage ends; a seek past that point
        // becomes a sparse region inside the new chunk.
        let start: u64 = map.chunks.last().map(|c| c.end).unwrap_or(0);
        debug_assert!(start <= pos);
        map.chunks.push(Chunk {
            start,
            end: u64::MAX,
            backend: backend_idx,
        });
        debug!(backend = self.backends[backend_idx].label(), start, "allocated spill chunk");
        Ok(map.chunks.len() - 1)
    }

    /// Seal the open tail chunk at `pos` after its backend filled up.
    ///
    /// A chunk sealed to zero length is dropped and its (empty) object
    /// removed, so the full backend is skipped entirely.
    async fn seal_open_chunk(&self, name: &str, map: &mut ChunkMap, pos: u64) {
        let Some(last) = map.chunks.last_mut() else {
            return;
        };
        if !last.is_open() {
            return;
        }
        last.end = pos;
        debug!(backend = self.backends[last.backend].label(), end = pos, "sealed spill chunk");
        if last.start == last.end {
            let chunk: Chunk = map.chunks.pop().expect("chunk checked above");
            let _ = self.backends[chunk.backend].remove(name).await;
        }
    }

    /// Grow the recorded file size after a successful write.
    fn grow_size(&self, file: &INodeFile, end: u64) {
        let mut attrs = file.attrs().write().unwrap();
        if end > attrs.size {
            attrs.size = end;
        }
        attrs.touch_modified();
    }

    /// Publish an updated chunk map into the inode.
    fn store_map(&self, file: &INodeFile, map: ChunkMap) {
        *file.chunks().write().unwrap() = map;
    }
}
