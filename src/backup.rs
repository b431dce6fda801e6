//! Hot, point-in-time backup of one index directory.
//!
//! Backups run concurrently with live indexing: the commit-identity files
//! are captured under the write lock with an empty commit, a retention
//! snapshot pins the segment files, and the bulk copy happens without any
//! lock held. A cumulative manifest at the destination makes follow-up
//! backups incremental; a required-files manifest drives restore.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tantivy::directory::Directory;
use tracing::{info, warn};

use crate::directory::{INDEX_VERSION_FILENAME, META_FILENAME};
use crate::error::{Error, Result};
use crate::index::Index;

/// Suffix of the cumulative per-index file log at the backup root.
pub const ALL_EXISTING_SUFFIX: &str = "all-existing-index-files";
/// Manifest of every file a restore must find.
pub const REQUIRED_FILES_FILENAME: &str = "index-files.required-for-index-restore";

#[derive(Debug, Clone)]
pub struct BackupSummary {
    pub destination: PathBuf,
    /// Files newly copied by this run; an incremental backup over an
    /// unchanged index copies nothing.
    pub copied_files: usize,
    /// Files the restore manifest references.
    pub total_files: usize,
    /// Set when a corrupt index made the backup abandon itself gracefully;
    /// restore will force a full reset.
    pub abandoned: bool,
}

impl Index {
    /// Back up this index into `destination`, optionally under an
    /// incremental tag sub-directory.
    pub fn backup(&self, destination: &Path, incremental_tag: Option<&str>) -> Result<BackupSummary> {
        let dest_root = match incremental_tag {
            Some(tag) => destination.join(tag),
            None => destination.to_path_buf(),
        };
        let index_id = self.definition().index_id;
        let index_dest = dest_root.join("Indexes").join(index_id.to_string());
        fs::create_dir_all(&index_dest)?;

        // Capture the commit identity under the write lock, and pin the
        // snapshot before the lock is released.
        let setup = self.backup_setup(|tantivy| {
            copy_sidecar(tantivy, META_FILENAME, &index_dest)?;
            copy_sidecar(tantivy, INDEX_VERSION_FILENAME, &index_dest)?;
            Ok(())
        });
        let snapshot = match setup {
            Ok(snapshot) => snapshot,
            Err(err @ Error::CorruptIndex(_)) => {
                warn!(index = %self.definition().name, "backup abandoned: {err}");
                let _ = fs::remove_file(index_dest.join(REQUIRED_FILES_FILENAME));
                return Ok(BackupSummary {
                    destination: dest_root,
                    copied_files: 0,
                    total_files: 0,
                    abandoned: true,
                });
            }
            Err(err) => return Err(err),
        };

        // The snapshot guard releases the retention pin on every exit path.
        // The cumulative log lives at the backup root so tagged incremental
        // runs share it.
        let log_path = destination.join(format!("{index_id}.{ALL_EXISTING_SUFFIX}"));
        let previously_backed_up: HashSet<String> = match fs::read_to_string(&log_path) {
            Ok(text) => text.lines().map(str::to_string).collect(),
            Err(_) => HashSet::new(),
        };

        let source = self.disk_path();
        let mut log_lines: Vec<String> = Vec::new();
        let mut required: Vec<String> = Vec::new();
        let mut copied_files = 0usize;

        for file in snapshot.files() {
            let name = file.to_string_lossy().to_string();
            if name.ends_with(".lock") {
                continue;
            }
            required.push(name.clone());
            if previously_backed_up.contains(&name) {
                continue;
            }
            let target = index_dest.join(file);
            // The commit-identity files were captured under the lock; do
            // not overwrite them with a possibly newer on-disk state.
            if !(name == META_FILENAME || name == INDEX_VERSION_FILENAME) || !target.exists() {
                fs::copy(source.join(file), &target)?;
                copied_files += 1;
            }
            log_lines.push(name);
        }

        append_lines(&log_path, &log_lines)?;
        fs::write(
            index_dest.join(REQUIRED_FILES_FILENAME),
            manifest_text(&required),
        )?;

        info!(
            index = %self.definition().name,
            copied = copied_files,
            total = required.len(),
            destination = %dest_root.display(),
            "backup complete"
        );
        Ok(BackupSummary {
            destination: dest_root,
            copied_files,
            total_files: required.len(),
            abandoned: false,
        })
    }
}

/// Rebuild an index directory from one or more backup roots (the full
/// backup first, incremental tags in order). Every file in the newest
/// required-files manifest is copied from the most recent root carrying it.
pub fn restore_index(roots: &[&Path], index_id: u32, dest: &Path) -> Result<()> {
    let newest = roots
        .last()
        .ok_or_else(|| Error::CorruptIndex("no backup roots given".to_string()))?;
    let index_sub = |root: &Path| root.join("Indexes").join(index_id.to_string());

    let required_path = index_sub(newest).join(REQUIRED_FILES_FILENAME);
    let required = fs::read_to_string(&required_path).map_err(|_| {
        Error::CorruptIndex(format!(
            "backup at {} has no {REQUIRED_FILES_FILENAME}; a full index reset is required",
            newest.display()
        ))
    })?;

    fs::create_dir_all(dest)?;
    for name in required.lines().filter(|line| !line.is_empty()) {
        let copied = roots.iter().rev().any(|root| {
            let candidate = index_sub(root).join(name);
            candidate.exists() && fs::copy(&candidate, dest.join(name)).is_ok()
        });
        if !copied {
            return Err(Error::CorruptIndex(format!(
                "backup is missing required file '{name}'"
            )));
        }
    }
    info!(index_id, dest = %dest.display(), "index restored from backup");
    Ok(())
}

fn copy_sidecar(tantivy: &tantivy::Index, name: &str, dest: &Path) -> Result<()> {
    let bytes = tantivy
        .directory()
        .atomic_read(Path::new(name))
        .map_err(|err| Error::CorruptIndex(format!("cannot read {name}: {err}")))?;
    fs::write(dest.join(name), bytes)?;
    Ok(())
}

fn append_lines(path: &Path, lines: &[String]) -> Result<()> {
    use std::io::Write;
    let mut file = fs::OpenOptions::new().create(true).append(true).open(path)?;
    for line in lines {
        writeln!(file, "{line}")?;
    }
    Ok(())
}

fn manifest_text(names: &[String]) -> String {
    let mut text = names.join("\n");
    if !text.is_empty() {
        text.push('\n');
    }
    text
}
