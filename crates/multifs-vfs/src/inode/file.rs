//! File inode implementation.

use std::any::Any;
use std::sync::{Arc, RwLock};

use super::types::{Attrs, INode, INodeId, INodeType};

/// A contiguous byte range of a file stored on one backend.
///
/// `end` is exclusive; the last chunk of a growing file is open-ended
/// (`u64::MAX`) until its backend runs out of space and the chunk is sealed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    /// First byte offset covered by this chunk.
    pub start: u64,
    /// One past the last byte offset covered (exclusive).
    pub end: u64,
    /// Index into the backend list.
    pub backend: usize,
}

impl Chunk {
    /// Length of the chunk range, unbounded for the open chunk.
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    /// Whether this chunk still accepts appended bytes.
    pub fn is_open(&self) -> bool {
        self.end == u64::MAX
    }
}

/// Ordered chunk map of a spilled file.
///
/// Invariants: chunks are contiguous, non-overlapping, and sorted by offset;
/// each backend index appears at most once and in increasing order;
/// `next_backend` is one past the backend of the last chunk.
#[derive(Debug, Clone, Default)]
pub struct ChunkMap {
    /// Chunks in offset order.
    pub chunks: Vec<Chunk>,
    /// Next backend index to spill onto.
    pub next_backend: usize,
}

impl ChunkMap {
    /// Index of the chunk covering `offset`, if any.
    pub fn chunk_at(&self, offset: u64) -> Option<usize> {
        // First chunk whose end is past the offset; chunks are sorted.
        let idx: usize = self.chunks.partition_point(|c| c.end <= offset);
        let chunk: &Chunk = self.chunks.get(idx)?;
        (chunk.start <= offset).then_some(idx)
    }
}

/// File inode representing a regular file striped across backends.
#[derive(Debug)]
pub struct INodeFile {
    /// Inode ID.
    id: INodeId,
    /// Parent directory inode ID.
    parent_id: RwLock<INodeId>,
    /// File name.
    name: RwLock<String>,
    /// POSIX attributes.
    attrs: RwLock<Attrs>,
    /// Where each byte range of the file lives.
    chunks: RwLock<ChunkMap>,
}

impl INodeFile {
    /// Create a new empty file inode.
    ///
    /// # Arguments
    /// * `id` - Inode ID
    /// * `parent_id` - Parent directory inode ID
    /// * `name` - File name
    /// * `attrs` - Initial attributes
    pub fn new(id: INodeId, parent_id: INodeId, name: String, attrs: Attrs) -> Self {
        Self {
            id,
            parent_id: RwLock::new(parent_id),
            name: RwLock::new(name),
            attrs: RwLock::new(attrs),
            chunks: RwLock::new(ChunkMap::default()),
        }
    }

    /// Get the chunk map lock.
    pub fn chunks(&self) -> &RwLock<ChunkMap> {
        &self.chunks
    }

    /// Snapshot the chunk map.
    pub fn chunks_snapshot(&self) -> ChunkMap {
        self.chunks.read().unwrap().clone()
    }

    /// Current file size in bytes.
    pub fn size(&self) -> u64 {
        self.attrs.read().unwrap().size
    }
}

impl INode for INodeFile {
    fn id(&self) -> INodeId {
        self.id
    }

    fn parent_id(&self) -> INodeId {
        *self.parent_id.read().unwrap()
    }

    fn set_parent(&self, parent: INodeId) {
        *self.parent_id.write().unwrap() = parent;
    }

    fn name(&self) -> String {
        self.name.read().unwrap().clone()
    }

    fn set_name(&self, name: String) {
        *self.name.write().unwrap() = name;
    }

    fn inode_type(&self) -> INodeType {
        INodeType::File
    }

    fn attrs(&self) -> &RwLock<Attrs> {
        &self.attrs
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_arc_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(ranges: &[(u64, u64, usize)]) -> ChunkMap {
        ChunkMap {
            chunks: ranges
                .iter()
                .map(|&(start, end, backend)| Chunk {
                    start,
                    end,
                    backend,
                })
                .collect(),
            next_backend: ranges.len(),
        }
    }

    #[test]
    fn test_chunk_at_covers_ranges() {
        let m: ChunkMap = map(&[(0, 10, 0), (10, 25, 1), (25, u64::MAX, 2)]);
        assert_eq!(m.chunk_at(0), Some(0));
        assert_eq!(m.chunk_at(9), Some(0));
        assert_eq!(m.chunk_at(10), Some(1));
        assert_eq!(m.chunk_at(24), Some(1));
        assert_eq!(m.chunk_at(25), Some(2));
        assert_eq!(m.chunk_at(1 << 40), Some(2));
    }

    #[test]
    fn test_chunk_at_empty_map() {
        let m = ChunkMap::default();
        assert_eq!(m.chunk_at(0), None);
    }

    #[test]
    fn test_chunk_at_sealed_tail() {
        // All chunks sealed: offsets past the last end are uncovered.
        let m: ChunkMap = map(&[(0, 10, 0), (10, 20, 1)]);
        assert_eq!(m.chunk_at(19), Some(1));
        assert_eq!(m.chunk_at(20), None);
    }
}
