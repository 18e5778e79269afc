//! Rollback-able filesystem operations
//!
//! `FsTransaction` journals every mutation it performs so that aborting
//! (or dropping the value without committing) puts the filesystem back:
//! created files and directories are removed, deleted and overwritten
//! files are restored from backups staged in a temp directory.
//!
//! This undoes clean failures; it is not crash-proof. A process killed
//! mid-operation leaves whatever it had done so far.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};

use brokkr_core::{Error, Result};

enum Journal {
    CreatedFile(PathBuf),
    CreatedDir(PathBuf),
    /// A file that existed before we touched it; the backup restores it.
    Snapshot { path: PathBuf, backup: PathBuf },
}

/// One transactional batch of filesystem mutations.
pub struct FsTransaction {
    staging: TempDir,
    journal: Vec<Journal>,
    backups: HashMap<PathBuf, PathBuf>,
    committed: bool,
}

impl FsTransaction {
    pub fn new() -> Result<Self> {
        Ok(Self {
            staging: TempDir::new()?,
            journal: Vec::new(),
            backups: HashMap::new(),
            committed: false,
        })
    }

    /// Create a directory (and any missing parents), journaling only the
    /// ones that did not exist yet.
    pub fn create_dir_all(&mut self, path: &Path) -> Result<()> {
        let mut missing = Vec::new();
        let mut current = path;
        while !current.exists() {
            missing.push(current.to_path_buf());
            match current.parent() {
                Some(parent) => current = parent,
                None => break,
            }
        }
        fs::create_dir_all(path)?;
        // Parents first in the journal, so rollback removes children first.
        for dir in missing.into_iter().rev() {
            self.journal.push(Journal::CreatedDir(dir));
        }
        Ok(())
    }

    /// Copy `source` to `destination`, refusing to overwrite.
    pub fn copy_file(&mut self, source: &Path, destination: &Path) -> Result<()> {
        if destination.exists() {
            return Err(Error::FileExists {
                path: destination.display().to_string(),
                installing: source.display().to_string(),
                owner: None,
            });
        }
        if let Some(parent) = destination.parent() {
            self.create_dir_all(parent)?;
        }
        debug!("Copying {} -> {}", source.display(), destination.display());
        fs::copy(source, destination)?;
        self.journal.push(Journal::CreatedFile(destination.to_path_buf()));
        Ok(())
    }

    /// Delete a file, staging a backup so rollback can restore it.
    pub fn delete_file(&mut self, path: &Path) -> Result<()> {
        if !path.is_file() {
            return Err(Error::file_not_found(path.display().to_string()));
        }
        let backup = self.stage_backup(path)?;
        debug!("Deleting {}", path.display());
        fs::remove_file(path)?;
        self.journal.push(Journal::Snapshot {
            path: path.to_path_buf(),
            backup,
        });
        Ok(())
    }

    /// Record the current state of `path` so rollback restores it even if
    /// later operations outside this journal change it. Snapshotting a
    /// missing file means rollback removes whatever appeared there.
    pub fn snapshot(&mut self, path: &Path) -> Result<()> {
        if self.backups.contains_key(path) {
            return Ok(());
        }
        if path.is_file() {
            let backup = self.stage_backup(path)?;
            self.journal.push(Journal::Snapshot {
                path: path.to_path_buf(),
                backup,
            });
        } else {
            self.journal.push(Journal::CreatedFile(path.to_path_buf()));
        }
        Ok(())
    }

    fn stage_backup(&mut self, path: &Path) -> Result<PathBuf> {
        let backup = self
            .staging
            .path()
            .join(format!("backup-{}", self.journal.len()));
        fs::copy(path, &backup)?;
        self.backups.insert(path.to_path_buf(), backup.clone());
        Ok(backup)
    }

    /// Keep every mutation.
    pub fn commit(mut self) {
        self.committed = true;
        debug!("Filesystem transaction committed ({} ops)", self.journal.len());
    }

    /// Undo every mutation. Equivalent to dropping the value.
    pub fn abort(self) {}

    fn rollback(&mut self) {
        warn!("Rolling back {} filesystem operation(s)", self.journal.len());
        // Walk the journal backwards so later ops are undone first.
        while let Some(entry) = self.journal.pop() {
            let outcome = match entry {
                Journal::CreatedFile(path) => {
                    if path.is_file() {
                        fs::remove_file(&path).map_err(|e| (path, e))
                    } else {
                        Ok(())
                    }
                }
                Journal::CreatedDir(path) => {
                    if path.is_dir() {
                        fs::remove_dir(&path).map_err(|e| (path, e))
                    } else {
                        Ok(())
                    }
                }
                Journal::Snapshot { path, backup } => {
                    if path.exists() {
                        let _ = fs::remove_file(&path);
                    }
                    fs::copy(&backup, &path).map(|_| ()).map_err(|e| (path, e))
                }
            };
            if let Err((path, e)) = outcome {
                warn!("Rollback of {} failed: {}", path.display(), e);
            }
        }
    }
}

impl Drop for FsTransaction {
    fn drop(&mut self) {
        if !self.committed {
            self.rollback();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_commit_keeps_copies() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("source.zip");
        fs::write(&source, b"data").unwrap();
        let destination = tmp.path().join("mods").join("dest.zip");

        let mut tx = FsTransaction::new().unwrap();
        tx.copy_file(&source, &destination).unwrap();
        tx.commit();

        assert_eq!(fs::read(&destination).unwrap(), b"data");
    }

    #[test]
    fn test_abort_removes_copies_and_created_dirs() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("source.zip");
        fs::write(&source, b"data").unwrap();
        let destination = tmp.path().join("mods").join("deep").join("dest.zip");

        let mut tx = FsTransaction::new().unwrap();
        tx.copy_file(&source, &destination).unwrap();
        tx.abort();

        assert!(!destination.exists());
        assert!(!tmp.path().join("mods").exists());
        assert!(source.exists());
    }

    #[test]
    fn test_abort_restores_deleted_files() {
        let tmp = TempDir::new().unwrap();
        let victim = tmp.path().join("victim.zip");
        fs::write(&victim, b"precious").unwrap();

        let mut tx = FsTransaction::new().unwrap();
        tx.delete_file(&victim).unwrap();
        assert!(!victim.exists());
        tx.abort();

        assert_eq!(fs::read(&victim).unwrap(), b"precious");
    }

    #[test]
    fn test_copy_refuses_overwrite() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("source.zip");
        let destination = tmp.path().join("dest.zip");
        fs::write(&source, b"new").unwrap();
        fs::write(&destination, b"old").unwrap();

        let mut tx = FsTransaction::new().unwrap();
        let err = tx.copy_file(&source, &destination).unwrap_err();
        assert!(matches!(err, Error::FileExists { .. }));
        tx.commit();
        assert_eq!(fs::read(&destination).unwrap(), b"old");
    }

    #[test]
    fn test_drop_without_commit_rolls_back() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("source.zip");
        fs::write(&source, b"data").unwrap();
        let destination = tmp.path().join("dest.zip");

        {
            let mut tx = FsTransaction::new().unwrap();
            tx.copy_file(&source, &destination).unwrap();
        }
        assert!(!destination.exists());
    }

    #[test]
    fn test_partial_batch_rolls_back_earlier_ops() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("source.zip");
        fs::write(&source, b"data").unwrap();
        let first = tmp.path().join("first.zip");
        let occupied = tmp.path().join("occupied.zip");
        fs::write(&occupied, b"already here").unwrap();

        let mut tx = FsTransaction::new().unwrap();
        tx.copy_file(&source, &first).unwrap();
        assert!(tx.copy_file(&source, &occupied).is_err());
        tx.abort();

        assert!(!first.exists());
        assert_eq!(fs::read(&occupied).unwrap(), b"already here");
    }
}
