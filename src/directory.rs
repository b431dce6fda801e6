//! Segment directory management.
//!
//! The library owns the segment files themselves; this module owns the
//! engine's sidecar files (`index.version`, the advisory
//! `writing-to-index.lock`), point-in-time file listings, the
//! memory-to-disk materialization, and the snapshot retention policy that
//! pins commit files while a backup is in flight.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tantivy::directory::{Directory, DirectoryClone};
use tantivy::HasLen;
use tantivy::Index as TantivyIndex;
use tracing::{debug, warn};

use crate::error::{Error, Result};

pub const INDEX_VERSION_FILENAME: &str = "index.version";
pub const WRITING_LOCK_FILENAME: &str = "writing-to-index.lock";
pub const META_FILENAME: &str = "meta.json";

/// Engine directory format version; one decimal integer, one line.
pub const INDEX_VERSION: u64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryKind {
    Memory,
    Disk,
}

/// The engine's view of one index directory.
#[derive(Debug, Clone)]
pub struct SegmentDirectory {
    pub kind: DirectoryKind,
    /// On-disk location; `None` while memory-backed.
    pub path: Option<PathBuf>,
}

impl SegmentDirectory {
    pub fn memory() -> Self {
        Self {
            kind: DirectoryKind::Memory,
            path: None,
        }
    }

    pub fn disk(path: PathBuf) -> Self {
        Self {
            kind: DirectoryKind::Disk,
            path: Some(path),
        }
    }

    pub fn is_memory(&self) -> bool {
        self.kind == DirectoryKind::Memory
    }
}

fn read_error(err: tantivy::directory::error::OpenReadError) -> Error {
    Error::Tantivy(err.into())
}

/// Write the engine version sidecar into the index directory.
pub fn write_version(index: &TantivyIndex) -> Result<()> {
    index
        .directory()
        .atomic_write(
            Path::new(INDEX_VERSION_FILENAME),
            format!("{INDEX_VERSION}\n").as_bytes(),
        )
        .map_err(Error::Io)
}

/// Verify the engine version sidecar; a missing or mismatched file means
/// the directory was produced by an incompatible engine.
pub fn verify_version(index: &TantivyIndex) -> Result<()> {
    let bytes = index
        .directory()
        .atomic_read(Path::new(INDEX_VERSION_FILENAME))
        .map_err(|_| Error::CorruptIndex(format!("missing {INDEX_VERSION_FILENAME}")))?;
    let text = String::from_utf8_lossy(&bytes);
    let version: u64 = text
        .trim()
        .parse()
        .map_err(|_| Error::CorruptIndex(format!("unreadable {INDEX_VERSION_FILENAME}: {text:?}")))?;
    if version != INDEX_VERSION {
        return Err(Error::CorruptIndex(format!(
            "index version {version} is not supported (expected {INDEX_VERSION})"
        )));
    }
    Ok(())
}

/// Advisory write lock held for the duration of one batch application.
/// Removing the file on drop covers every exit path.
pub struct WriteLockFile {
    directory: Box<dyn Directory>,
}

impl WriteLockFile {
    pub fn acquire(index: &TantivyIndex) -> Result<Self> {
        let directory = index.directory().box_clone();
        let path = Path::new(WRITING_LOCK_FILENAME);
        if directory.exists(path).map_err(read_error)? {
            return Err(Error::WriteLockHeld(WRITING_LOCK_FILENAME.to_string()));
        }
        directory
            .atomic_write(path, format!("{}\n", std::process::id()).as_bytes())
            .map_err(Error::Io)?;
        Ok(Self { directory })
    }
}

impl Drop for WriteLockFile {
    fn drop(&mut self) {
        if let Err(err) = self.directory.delete(Path::new(WRITING_LOCK_FILENAME)) {
            warn!("failed to remove {WRITING_LOCK_FILENAME}: {err}");
        }
    }
}

/// All files that make up the current searchable state: the commit file,
/// the engine version sidecar, and every live segment file.
pub fn live_files(index: &TantivyIndex) -> Result<Vec<PathBuf>> {
    let directory = index.directory();
    let mut files: BTreeSet<PathBuf> = BTreeSet::new();
    files.insert(PathBuf::from(META_FILENAME));
    if directory
        .exists(Path::new(INDEX_VERSION_FILENAME))
        .map_err(read_error)?
    {
        files.insert(PathBuf::from(INDEX_VERSION_FILENAME));
    }
    for meta in index.searchable_segment_metas()? {
        for path in meta.list_files() {
            if directory.exists(&path).map_err(read_error)? {
                files.insert(path);
            }
        }
    }
    Ok(files.into_iter().collect())
}

/// Approximate byte size of the current searchable state.
pub fn directory_size(index: &TantivyIndex) -> Result<u64> {
    let directory = index.directory();
    let mut total = 0u64;
    for file in live_files(index)? {
        if let Ok(slice) = directory.open_read(&file) {
            total += slice.len() as u64;
        }
    }
    Ok(total)
}

/// Copy every live file of a memory-backed index into `dest` and stamp the
/// engine version sidecar. The caller reopens the index on the new
/// directory afterwards.
pub fn materialize_to_disk(index: &TantivyIndex, dest: &Path) -> Result<()> {
    std::fs::create_dir_all(dest)?;
    let directory = index.directory();
    let files = live_files(index)?;
    debug!("materializing {} files to {}", files.len(), dest.display());
    for file in &files {
        let bytes = directory.atomic_read(file).map_err(read_error)?;
        std::fs::write(dest.join(file), bytes)?;
    }
    std::fs::write(
        dest.join(INDEX_VERSION_FILENAME),
        format!("{INDEX_VERSION}\n"),
    )?;
    Ok(())
}

/// Pins the file set of the last successful commit while a backup snapshot
/// is outstanding. The writer consults `is_pinned` before collecting stale
/// files and runs the deferred collection once the pin is released.
#[derive(Default)]
pub struct SnapshotRetention {
    pins: Mutex<usize>,
    gc_pending: AtomicBool,
}

impl SnapshotRetention {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Take a snapshot of the given file list. The returned guard keeps the
    /// pin alive; dropping it releases the pin on every exit path.
    pub fn snapshot(self: &Arc<Self>, files: Vec<PathBuf>) -> IndexSnapshot {
        *self.pins.lock() += 1;
        IndexSnapshot {
            retention: Arc::clone(self),
            files,
        }
    }

    pub fn is_pinned(&self) -> bool {
        *self.pins.lock() > 0
    }

    /// Called by the writer when it skips stale-file collection because a
    /// snapshot is outstanding.
    pub fn defer_gc(&self) {
        self.gc_pending.store(true, Ordering::SeqCst);
    }

    /// True once after a deferred collection became runnable.
    pub fn take_pending_gc(&self) -> bool {
        !self.is_pinned() && self.gc_pending.swap(false, Ordering::SeqCst)
    }
}

/// A pinned, point-in-time file listing used by backup.
pub struct IndexSnapshot {
    retention: Arc<SnapshotRetention>,
    files: Vec<PathBuf>,
}

impl IndexSnapshot {
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }
}

impl Drop for IndexSnapshot {
    fn drop(&mut self) {
        let mut pins = self.retention.pins.lock();
        *pins = pins.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retention_pin_tracks_guard_lifetime() {
        let retention = SnapshotRetention::new();
        assert!(!retention.is_pinned());
        {
            let _snapshot = retention.snapshot(vec![PathBuf::from(META_FILENAME)]);
            assert!(retention.is_pinned());
            retention.defer_gc();
            assert!(!retention.take_pending_gc());
        }
        assert!(!retention.is_pinned());
        assert!(retention.take_pending_gc());
        assert!(!retention.take_pending_gc());
    }

    #[test]
    fn nested_snapshots_keep_the_pin() {
        let retention = SnapshotRetention::new();
        let first = retention.snapshot(Vec::new());
        let second = retention.snapshot(Vec::new());
        drop(first);
        assert!(retention.is_pinned());
        drop(second);
        assert!(!retention.is_pinned());
    }
}
