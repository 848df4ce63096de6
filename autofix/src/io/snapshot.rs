//! Whole-tree backup and restore of the target project.
//!
//! Only one snapshot exists at a time: taking a new one removes the previous
//! backup first. Restoring replaces the live tree wholesale, so it is never
//! left half-restored relative to the backup contents.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

/// A full copy of `target` held at `backup`.
#[derive(Debug, Clone)]
pub struct Snapshot {
    target: PathBuf,
    backup: PathBuf,
}

impl Snapshot {
    /// Copy `target` into `backup`, replacing any earlier backup.
    #[instrument(skip_all, fields(target = %target.display(), backup = %backup.display()))]
    pub fn take(target: &Path, backup: &Path) -> Result<Self> {
        if !target.is_dir() {
            bail!("target directory {} does not exist", target.display());
        }
        ensure_disjoint(target, backup)?;
        if backup.exists() {
            debug!("removing previous backup");
            fs::remove_dir_all(backup)
                .with_context(|| format!("remove previous backup {}", backup.display()))?;
        }
        let files = copy_tree(target, backup)?;
        info!(files, "project backed up");
        Ok(Self {
            target: target.to_path_buf(),
            backup: backup.to_path_buf(),
        })
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn backup(&self) -> &Path {
        &self.backup
    }

    /// Replace the live tree with the backup.
    ///
    /// A missing backup is logged and skipped; there is nothing to roll back to.
    #[instrument(skip_all, fields(target = %self.target.display()))]
    pub fn restore(&self) -> Result<()> {
        if !self.backup.exists() {
            warn!(backup = %self.backup.display(), "backup directory missing, skipping restore");
            return Ok(());
        }
        if self.target.exists() {
            fs::remove_dir_all(&self.target)
                .with_context(|| format!("remove live tree {}", self.target.display()))?;
        }
        let files = copy_tree(&self.backup, &self.target)?;
        info!(files, "project restored from backup");
        Ok(())
    }
}

fn ensure_disjoint(target: &Path, backup: &Path) -> Result<()> {
    let target_abs = std::path::absolute(target)
        .with_context(|| format!("resolve {}", target.display()))?;
    let backup_abs = std::path::absolute(backup)
        .with_context(|| format!("resolve {}", backup.display()))?;
    if backup_abs.starts_with(&target_abs) || target_abs.starts_with(&backup_abs) {
        bail!(
            "backup {} and target {} must not contain each other",
            backup.display(),
            target.display()
        );
    }
    Ok(())
}

/// Recursively copy `src` into `dst` (created if missing). Returns the file count.
///
/// Symlinks are followed, so the copy holds file contents rather than links.
fn copy_tree(src: &Path, dst: &Path) -> Result<usize> {
    fs::create_dir_all(dst).with_context(|| format!("create {}", dst.display()))?;
    let mut files = 0usize;
    for entry in WalkDir::new(src).min_depth(1).follow_links(true) {
        let entry = entry.with_context(|| format!("walk {}", src.display()))?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .with_context(|| format!("relativize {}", entry.path().display()))?;
        let dest = dst.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest).with_context(|| format!("create {}", dest.display()))?;
        } else {
            fs::copy(entry.path(), &dest).with_context(|| {
                format!("copy {} to {}", entry.path().display(), dest.display())
            })?;
            files += 1;
        }
    }
    Ok(files)
}
