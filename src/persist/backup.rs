//! Timestamped sibling backups around destructive writes.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

/// A sibling copy of the destination taken before any destructive write.
#[derive(Debug, Clone)]
pub struct BackupHandle {
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
}

fn backup_path(dest: &Path, timestamp: i64) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".backup_{timestamp}"));
    dest.with_file_name(name)
}

/// Copies `dest` next to itself with a `.backup_{unix-ts}` suffix. Returns
/// `None` when there is nothing to back up yet.
pub fn create_backup(dest: &Path) -> Result<Option<BackupHandle>> {
    if !dest.exists() {
        return Ok(None);
    }
    let created_at = Utc::now();
    let path = backup_path(dest, created_at.timestamp());
    std::fs::copy(dest, &path)
        .with_context(|| format!("backing up {} to {}", dest.display(), path.display()))?;
    log::info!("backup created: {}", path.display());
    Ok(Some(BackupHandle { path, created_at }))
}

/// Puts the pre-operation bytes back at `dest`.
pub fn restore_from_backup(handle: &BackupHandle, dest: &Path) -> Result<()> {
    std::fs::copy(&handle.path, dest)
        .with_context(|| format!("restoring {} from {}", dest.display(), handle.path.display()))?;
    log::warn!("destination restored from backup: {}", dest.display());
    Ok(())
}

/// Deletes all but the `keep` newest backups of `dest`, judged by
/// modification time.
pub fn prune_backups(dest: &Path, keep: usize) -> Result<usize> {
    let dir = dest.parent().unwrap_or_else(|| Path::new("."));
    let prefix = format!(
        "{}.backup_",
        dest.file_name().unwrap_or_default().to_string_lossy()
    );

    let mut backups: Vec<(PathBuf, std::time::SystemTime)> = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_name().to_string_lossy().starts_with(&prefix) {
            let modified = entry.metadata()?.modified()?;
            backups.push((entry.path(), modified));
        }
    }

    backups.sort_by(|a, b| b.1.cmp(&a.1));
    let mut removed = 0usize;
    for (path, _) in backups.into_iter().skip(keep) {
        if let Err(err) = std::fs::remove_file(&path) {
            log::warn!("could not prune backup {}: {err}", path.display());
        } else {
            removed += 1;
        }
    }
    if removed > 0 {
        log::debug!("pruned {removed} old backups of {}", dest.display());
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backup_restores_byte_for_byte() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("通报.docx");
        std::fs::write(&dest, b"original bytes").unwrap();

        let handle = create_backup(&dest).unwrap().expect("file existed");
        std::fs::write(&dest, b"corrupted").unwrap();
        restore_from_backup(&handle, &dest).unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"original bytes");
    }

    #[test]
    fn missing_destination_yields_no_backup() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("absent.docx");
        assert!(create_backup(&dest).unwrap().is_none());
    }

    #[test]
    fn pruning_keeps_newest() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("report.docx");
        std::fs::write(&dest, b"x").unwrap();

        for ts in [100, 200, 300, 400] {
            let path = backup_path(&dest, ts);
            std::fs::write(&path, b"x").unwrap();
            let mtime = std::time::SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(ts as u64);
            let file = std::fs::File::options().write(true).open(&path).unwrap();
            file.set_modified(mtime).unwrap();
        }

        let removed = prune_backups(&dest, 2).unwrap();
        assert_eq!(removed, 2);
        assert!(backup_path(&dest, 400).exists());
        assert!(backup_path(&dest, 300).exists());
        assert!(!backup_path(&dest, 100).exists());
    }
}
