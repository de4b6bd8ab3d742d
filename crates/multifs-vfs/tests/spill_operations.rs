//! End-to-end spillover behavior over capacity-bounded backends.

use std::sync::Arc;

use multifs_storage::{DirBackend, MemBackend, StorageBackend};
use multifs_vfs::inode::{INode, INodeFile, INodeManager, ROOT_INODE};
use multifs_vfs::{SpillEngine, VfsError};

fn engine_over(caps: &[u64]) -> (SpillEngine, Vec<Arc<MemBackend>>) {
    let backends: Vec<Arc<MemBackend>> = caps
        .iter()
        .enumerate()
        .map(|(i, &cap)| Arc::new(MemBackend::new(format!("ram{}", i), cap)))
        .collect();
    let dyns: Vec<Arc<dyn StorageBackend>> = backends
        .iter()
        .map(|b| b.clone() as Arc<dyn StorageBackend>)
        .collect();
    (SpillEngine::new(dyns).unwrap(), backends)
}

fn new_file(manager: &INodeManager, name: &str) -> Arc<INodeFile> {
    manager.create_file(ROOT_INODE, name, 0o644, 1000, 1000).unwrap()
}

// ---------------------------------------------------------------------------
// Writing and spilling
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_write_spills_onto_second_backend() {
    let (engine, backends) = engine_over(&[10, 100]);
    let manager: INodeManager = INodeManager::new(1000, 1000);
    let file: Arc<INodeFile> = new_file(&manager, "big");

    let payload: Vec<u8> = (0..25u8).collect();
    assert_eq!(engine.write_at(&file, 0, &payload).await.unwrap(), 25);
    assert_eq!(file.size(), 25);

    assert_eq!(backends[0].used_bytes(), 10);
    assert_eq!(backends[1].used_bytes(), 15);

    let map = file.chunks_snapshot();
    assert_eq!(map.chunks.len(), 2);
    assert_eq!((map.chunks[0].start, map.chunks[0].end), (0, 10));
    assert_eq!(map.chunks[1].start, 10);
    assert!(map.chunks[1].is_open());
}

#[tokio::test]
async fn test_read_gathers_across_chunk_boundary() {
    let (engine, _backends) = engine_over(&[10, 100]);
    let manager: INodeManager = INodeManager::new(1000, 1000);
    let file: Arc<INodeFile> = new_file(&manager, "big");

    let payload: Vec<u8> = (0..25u8).collect();
    engine.write_at(&file, 0, &payload).await.unwrap();

    assert_eq!(engine.read_at(&file, 0, 25).await.unwrap(), payload);
    // A read straddling the seam at offset 10.
    assert_eq!(engine.read_at(&file, 8, 4).await.unwrap(), &payload[8..12]);
    // A read clamped by the file size.
    assert_eq!(engine.read_at(&file, 20, 100).await.unwrap(), &payload[20..]);
}

#[tokio::test]
async fn test_write_stops_short_when_all_backends_fill() {
    let (engine, _backends) = engine_over(&[5, 5]);
    let manager: INodeManager = INodeManager::new(1000, 1000);
    let file: Arc<INodeFile> = new_file(&manager, "big");

    let n: usize = engine.write_at(&file, 0, &[7u8; 20]).await.unwrap();
    assert_eq!(n, 10);
    assert_eq!(file.size(), 10);

    let err: VfsError = engine.write_at(&file, 10, b"x").await.unwrap_err();
    assert!(matches!(err, VfsError::NoSpace));
}

#[tokio::test]
async fn test_full_backend_is_skipped_entirely() {
    // The middle backend holds nothing; no zero-length chunk may remain.
    let (engine, backends) = engine_over(&[4, 0, 20]);
    let manager: INodeManager = INodeManager::new(1000, 1000);
    let file: Arc<INodeFile> = new_file(&manager, "big");

    assert_eq!(engine.write_at(&file, 0, &[1u8; 10]).await.unwrap(), 10);
    assert_eq!(backends[0].used_bytes(), 4);
    assert_eq!(backends[1].object_count(), 0);
    assert_eq!(backends[2].used_bytes(), 6);

    let map = file.chunks_snapshot();
    assert_eq!(map.chunks.len(), 2);
    assert!(map.chunks.iter().all(|c| c.start < c.end));
}

#[tokio::test]
async fn test_overwrite_within_sealed_chunk() {
    let (engine, backends) = engine_over(&[10, 100]);
    let manager: INodeManager = INodeManager::new(1000, 1000);
    let file: Arc<INodeFile> = new_file(&manager, "big");

    engine.write_at(&file, 0, &[0u8; 25]).await.unwrap();
    // Rewrite bytes 5..15, spanning the sealed chunk and the open one.
    assert_eq!(engine.write_at(&file, 5, &[9u8; 10]).await.unwrap(), 10);

    assert_eq!(file.size(), 25);
    assert_eq!(backends[0].used_bytes(), 10);
    let data: Vec<u8> = engine.read_at(&file, 5, 10).await.unwrap();
    assert_eq!(data, [9u8; 10]);
}

#[tokio::test]
async fn test_seek_past_end_creates_readable_hole() {
    let (engine, _backends) = engine_over(&[100]);
    let manager: INodeManager = INodeManager::new(1000, 1000);
    let file: Arc<INodeFile> = new_file(&manager, "sparse");

    engine.write_at(&file, 0, b"head").await.unwrap();
    engine.write_at(&file, 10, b"tail").await.unwrap();
    assert_eq!(file.size(), 14);

    let data: Vec<u8> = engine.read_at(&file, 0, 14).await.unwrap();
    assert_eq!(&data[..4], b"head");
    assert_eq!(&data[4..10], &[0u8; 6]);
    assert_eq!(&data[10..], b"tail");
}

// ---------------------------------------------------------------------------
// Truncate and remove
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_truncate_shrink_releases_spilled_chunks() {
    let (engine, backends) = engine_over(&[10, 100]);
    let manager: INodeManager = INodeManager::new(1000, 1000);
    let file: Arc<INodeFile> = new_file(&manager, "big");

    engine.write_at(&file, 0, &[3u8; 25]).await.unwrap();
    engine.truncate(&file, 5).await.unwrap();

    assert_eq!(file.size(), 5);
    assert_eq!(backends[0].used_bytes(), 5);
    assert_eq!(backends[1].object_count(), 0);
    assert_eq!(engine.read_at(&file, 0, 25).await.unwrap(), [3u8; 5]);

    // The surviving tail chunk accepts appends again.
    assert_eq!(engine.write_at(&file, 5, &[4u8; 5]).await.unwrap(), 5);
    assert_eq!(backends[0].used_bytes(), 10);
}

#[tokio::test]
async fn test_truncate_extend_reads_zeros() {
    let (engine, _backends) = engine_over(&[100]);
    let manager: INodeManager = INodeManager::new(1000, 1000);
    let file: Arc<INodeFile> = new_file(&manager, "f");

    engine.write_at(&file, 0, b"ab").await.unwrap();
    engine.truncate(&file, 6).await.unwrap();

    assert_eq!(file.size(), 6);
    assert_eq!(engine.read_at(&file, 0, 6).await.unwrap(), b"ab\0\0\0\0");
}

#[tokio::test]
async fn test_truncate_to_zero_then_rewrite() {
    let (engine, backends) = engine_over(&[10, 100]);
    let manager: INodeManager = INodeManager::new(1000, 1000);
    let file: Arc<INodeFile> = new_file(&manager, "f");

    engine.write_at(&file, 0, &[1u8; 25]).await.unwrap();
    engine.truncate(&file, 0).await.unwrap();
    assert_eq!(file.size(), 0);
    assert_eq!(backends[1].object_count(), 0);

    engine.write_at(&file, 0, b"fresh").await.unwrap();
    assert_eq!(engine.read_at(&file, 0, 10).await.unwrap(), b"fresh");
    assert_eq!(backends[0].used_bytes(), 5);
}

#[tokio::test]
async fn test_remove_clears_every_backend() {
    let (engine, backends) = engine_over(&[10, 100]);
    let manager: INodeManager = INodeManager::new(1000, 1000);
    let file: Arc<INodeFile> = new_file(&manager, "f");

    engine.write_at(&file, 0, &[1u8; 25]).await.unwrap();
    engine.remove(&file).await.unwrap();

    assert_eq!(backends[0].object_count(), 0);
    assert_eq!(backends[1].object_count(), 0);
    assert!(file.chunks_snapshot().chunks.is_empty());
}

// ---------------------------------------------------------------------------
// Directory-backed backends
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_spillover_across_quota_limited_directories() {
    let dir0 = tempfile::tempdir().unwrap();
    let dir1 = tempfile::tempdir().unwrap();

    let b0 = Arc::new(DirBackend::with_quota(dir0.path(), Some(8192)).unwrap());
    let b1 = Arc::new(DirBackend::new(dir1.path()).unwrap());
    let engine: SpillEngine =
        SpillEngine::new(vec![b0 as Arc<dyn StorageBackend>, b1 as Arc<dyn StorageBackend>])
            .unwrap();

    let manager: INodeManager = INodeManager::new(1000, 1000);
    let file: Arc<INodeFile> = new_file(&manager, "data.bin");

    let payload: Vec<u8> = (0..12000u32).map(|i| (i % 251) as u8).collect();
    assert_eq!(engine.write_at(&file, 0, &payload).await.unwrap(), 12000);

    // The first directory holds exactly its quota; the rest spilled over.
    let name: String = SpillEngine::object_name(file.id());
    let first: u64 = std::fs::metadata(dir0.path().join(&name)).unwrap().len();
    let second: u64 = std::fs::metadata(dir1.path().join(&name)).unwrap().len();
    assert_eq!(first, 8192);
    assert_eq!(second, 12000 - 8192);

    assert_eq!(engine.read_at(&file, 0, 12000).await.unwrap(), payload);

    engine.remove(&file).await.unwrap();
    assert!(!dir0.path().join(&name).exists());
    assert!(!dir1.path().join(&name).exists());
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[test]
fn test_engine_requires_backends() {
    let err: VfsError = SpillEngine::new(Vec::new()).unwrap_err();
    assert!(matches!(err, VfsError::NoBackends));
}
