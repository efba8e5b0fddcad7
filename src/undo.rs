/// Single-step undo of organize moves.
///
/// Each call reverses the most recent ledger entry of a directory, so a full
/// organize pass is undone by calling [`UndoManager::undo`] repeatedly.
use crate::file_organizer::move_file;
use crate::ledger::{Ledger, LedgerEntry, LedgerError};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result of an undo call that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UndoOutcome {
    /// The last move was reversed and dropped from the ledger.
    Restored {
        /// The ledger entry that was undone.
        entry: LedgerEntry,
        /// Where a file found at the original location was set aside.
        backup: Option<PathBuf>,
        /// Entries left in the ledger.
        remaining: usize,
    },
    /// The directory has no ledger file.
    NoHistory,
    /// The ledger file exists but holds no entries.
    EmptyHistory,
}

impl UndoOutcome {
    /// File name of the restored file, if any.
    pub fn restored_file_name(&self) -> Option<String> {
        match self {
            Self::Restored { entry, .. } => entry
                .source
                .file_name()
                .map(|n| n.to_string_lossy().to_string()),
            _ => None,
        }
    }
}

/// Errors that stop an undo.
///
/// The ledger is never modified when one occurs. Only
/// [`UndoError::LedgerNotUpdated`] leaves the filesystem changed: the file is
/// back at its source but the ledger still lists its move.
#[derive(Debug, Error)]
pub enum UndoError {
    /// The ledger could not be read, is not text, or has a malformed line.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    /// The moved file is no longer where the ledger says it is.
    #[error("File not found at expected location: {}", .0.display())]
    MissingFile(PathBuf),
    /// A file sits at the original location and could not be set aside.
    #[error("Could not back up conflicting file {}: {error}", path.display())]
    Backup {
        path: PathBuf,
        #[source]
        error: io::Error,
    },
    /// Moving the file back failed.
    #[error("Failed to restore {} to {}: {error}", from.display(), to.display())]
    Restore {
        from: PathBuf,
        to: PathBuf,
        #[source]
        error: io::Error,
    },
    /// Moving the file back failed, and the file set aside from the original
    /// location could not be put back either.
    #[error(
        "Failed to restore {} to {}: {error}; the file previously at {} was left at {}",
        from.display(),
        to.display(),
        to.display(),
        backup.display()
    )]
    RestoreStranded {
        from: PathBuf,
        to: PathBuf,
        backup: PathBuf,
        #[source]
        error: io::Error,
    },
    /// The file was restored but its entry could not be dropped from the
    /// ledger, so the last entry no longer matches the filesystem.
    #[error(
        "Restored {} but the ledger still lists its move; remove the last line of the ledger by hand or run `shelve clean`: {error}",
        restored.display()
    )]
    LedgerNotUpdated {
        restored: PathBuf,
        #[source]
        error: LedgerError,
    },
}

/// Manages undo and ledger teardown for organized directories.
pub struct UndoManager;

impl UndoManager {
    /// Reverses the most recent move recorded for `target`.
    ///
    /// A missing ledger yields [`UndoOutcome::NoHistory`] and an empty one
    /// [`UndoOutcome::EmptyHistory`]; neither touches the filesystem. The
    /// ledger is rewritten only after the file is back in place.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use shelve::undo::{UndoManager, UndoOutcome};
    /// use std::path::Path;
    ///
    /// match UndoManager::undo(Path::new("/path/to/downloads")) {
    ///     Ok(UndoOutcome::Restored { entry, .. }) => println!("Reverted {}", entry.source.display()),
    ///     Ok(_) => println!("Nothing to undo"),
    ///     Err(e) => eprintln!("Undo failed: {}", e),
    /// }
    /// ```
    pub fn undo(target: &Path) -> Result<UndoOutcome, UndoError> {
        let ledger = Ledger::for_directory(target);
        if !ledger.exists() {
            return Ok(UndoOutcome::NoHistory);
        }

        let mut entries = ledger.read_all()?;
        let Some(entry) = entries.pop() else {
            return Ok(UndoOutcome::EmptyHistory);
        };
        let entry = Self::resolve(target, entry);

        let backup = Self::restore_file(&entry)?;
        Self::record_restore(&ledger, &entries, &entry)?;

        tracing::info!(
            from = %entry.destination.display(),
            to = %entry.source.display(),
            remaining = entries.len(),
            "move reverted"
        );

        Ok(UndoOutcome::Restored {
            entry,
            backup,
            remaining: entries.len(),
        })
    }

    /// Deletes the ledger of `target`. Never fails.
    ///
    /// Meant to be called by the shell on normal shutdown. Files that were
    /// moved stay where they are; only the ability to undo them goes away.
    pub fn cleanup(target: &Path) {
        Ledger::for_directory(target).delete();
    }

    /// Anchors relative ledger paths at `target`.
    fn resolve(target: &Path, entry: LedgerEntry) -> LedgerEntry {
        let anchor = |path: PathBuf| {
            if path.is_relative() {
                target.join(path)
            } else {
                path
            }
        };
        LedgerEntry {
            source: anchor(entry.source),
            destination: anchor(entry.destination),
            ..entry
        }
    }

    /// Drops the entry for a move that was just reversed.
    fn record_restore(
        ledger: &Ledger,
        remaining: &[LedgerEntry],
        entry: &LedgerEntry,
    ) -> Result<(), UndoError> {
        ledger.drop_last(remaining).map_err(|e| {
            tracing::warn!(
                ledger = %ledger.path().display(),
                restored = %entry.source.display(),
                error = %e,
                "file restored but ledger not updated"
            );
            UndoError::LedgerNotUpdated {
                restored: entry.source.clone(),
                error: e,
            }
        })
    }

    /// Moves the file of `entry` back to its original location.
    ///
    /// A file occupying the original location is first renamed with a
    /// timestamped `.bak` suffix; its new path is returned.
    fn restore_file(entry: &LedgerEntry) -> Result<Option<PathBuf>, UndoError> {
        if entry.destination.symlink_metadata().is_err() {
            return Err(UndoError::MissingFile(entry.destination.clone()));
        }

        let backup = if entry.source.symlink_metadata().is_ok() {
            let backup_path = Self::generate_backup_path(&entry.source);
            fs::rename(&entry.source, &backup_path).map_err(|e| UndoError::Backup {
                path: entry.source.clone(),
                error: e,
            })?;
            tracing::warn!(
                path = %entry.source.display(),
                backup = %backup_path.display(),
                "original location occupied, existing file set aside"
            );
            Some(backup_path)
        } else {
            None
        };

        if let Err(e) = move_file(&entry.destination, &entry.source) {
            if let Some(stranded) = backup
                .as_deref()
                .and_then(|backup_path| Self::put_back(backup_path, &entry.source))
            {
                return Err(UndoError::RestoreStranded {
                    from: entry.destination.clone(),
                    to: entry.source.clone(),
                    backup: stranded,
                    error: e,
                });
            }
            return Err(UndoError::Restore {
                from: entry.destination.clone(),
                to: entry.source.clone(),
                error: e,
            });
        }

        Ok(backup)
    }

    /// Returns a set-aside file to `original`. Yields the backup path when
    /// that fails and the file stays stranded there.
    fn put_back(backup_path: &Path, original: &Path) -> Option<PathBuf> {
        match fs::rename(backup_path, original) {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!(
                    backup = %backup_path.display(),
                    original = %original.display(),
                    error = %e,
                    "could not return set-aside file to its location"
                );
                Some(backup_path.to_path_buf())
            }
        }
    }

    /// Generates a backup path for a file by appending a timestamp.
    ///
    /// Example: `file.txt` becomes `file.txt.bak.20251109-143052`
    fn generate_backup_path(original_path: &Path) -> PathBuf {
        let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
        let filename = original_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "file".to_string());
        let parent = original_path.parent().unwrap_or_else(|| Path::new(""));

        let mut candidate = parent.join(format!("{}.bak.{}", filename, timestamp));
        let mut counter = 1;
        while candidate.symlink_metadata().is_ok() {
            candidate = parent.join(format!("{}.bak.{}-{}", filename, timestamp, counter));
            counter += 1;
        }
        candidate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_organizer::FileOrganizer;
    use crate::ledger::LEDGER_FILE_NAME;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_undo_no_history() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let outcome = UndoManager::undo(temp_dir.path()).unwrap();
        assert_eq!(outcome, UndoOutcome::NoHistory);
    }

    #[test]
    fn test_undo_empty_history() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        Ledger::for_directory(temp_dir.path()).ensure().unwrap();

        let outcome = UndoManager::undo(temp_dir.path()).unwrap();
        assert_eq!(outcome, UndoOutcome::EmptyHistory);
    }

    #[test]
    fn test_undo_single_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base_path = temp_dir.path();

        let file_path = base_path.join("test.txt");
        fs::write(&file_path, "test content").expect("Failed to write test file");
        FileOrganizer::default().organize(base_path).unwrap();

        let moved_file = base_path.join("docs").join("test.txt");
        assert!(moved_file.exists());

        let outcome = UndoManager::undo(base_path).expect("Undo failed");

        assert_eq!(outcome.restored_file_name().as_deref(), Some("test.txt"));
        assert!(matches!(
            outcome,
            UndoOutcome::Restored { backup: None, remaining: 0, .. }
        ));
        assert_eq!(fs::read_to_string(&file_path).unwrap(), "test content");
        assert!(!moved_file.exists());

        // Ledger is now empty but still present
        assert_eq!(
            UndoManager::undo(base_path).unwrap(),
            UndoOutcome::EmptyHistory
        );
    }

    #[test]
    fn test_undo_reverses_one_move_per_call() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base_path = temp_dir.path();

        fs::write(base_path.join("a.png"), "image data").unwrap();
        fs::write(base_path.join("b.pdf"), "pdf data").unwrap();
        FileOrganizer::default().organize(base_path).unwrap();

        let first = UndoManager::undo(base_path).unwrap();
        assert_eq!(first.restored_file_name().as_deref(), Some("b.pdf"));
        assert!(base_path.join("b.pdf").exists());
        assert!(base_path.join("images/a.png").exists());

        let second = UndoManager::undo(base_path).unwrap();
        assert_eq!(second.restored_file_name().as_deref(), Some("a.png"));
        assert!(base_path.join("a.png").exists());
    }

    #[test]
    fn test_undo_with_file_name_conflict() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base_path = temp_dir.path();

        let file_path = base_path.join("test.txt");
        fs::write(&file_path, "original content").unwrap();
        FileOrganizer::default().organize(base_path).unwrap();

        // Simulates a new file appearing where the old one used to be
        fs::write(&file_path, "new content").unwrap();

        let outcome = UndoManager::undo(base_path).expect("Undo failed");
        let UndoOutcome::Restored {
            backup: Some(backup),
            ..
        } = &outcome
        else {
            panic!("expected a backup, got {outcome:?}");
        };

        assert_eq!(fs::read_to_string(&file_path).unwrap(), "original content");
        assert_eq!(fs::read_to_string(backup).unwrap(), "new content");
        assert!(
            backup
                .file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with("test.txt.bak.")
        );
    }

    #[test]
    fn test_undo_with_missing_file_keeps_ledger() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base_path = temp_dir.path();

        fs::write(base_path.join("gone.txt"), "x").unwrap();
        FileOrganizer::default().organize(base_path).unwrap();
        fs::remove_file(base_path.join("docs/gone.txt")).unwrap();

        let ledger_path = base_path.join(LEDGER_FILE_NAME);
        let before = fs::read(&ledger_path).unwrap();

        let result = UndoManager::undo(base_path);
        assert!(matches!(result, Err(UndoError::MissingFile(_))));
        assert_eq!(fs::read(&ledger_path).unwrap(), before);
    }

    #[test]
    fn test_undo_with_missing_source_parent_keeps_ledger() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base_path = temp_dir.path();
        let ledger = Ledger::for_directory(base_path);

        fs::create_dir(base_path.join("docs")).unwrap();
        let destination = base_path.join("docs/report.txt");
        fs::write(&destination, "r").unwrap();
        ledger
            .append(&LedgerEntry::now(
                base_path.join("vanished/report.txt"),
                destination.clone(),
            ))
            .unwrap();

        let result = UndoManager::undo(base_path);
        assert!(matches!(result, Err(UndoError::Restore { .. })));
        assert!(destination.exists());
        assert_eq!(ledger.read_all().unwrap().len(), 1);
    }

    #[test]
    fn test_undo_resolves_directory_relative_entries() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base_path = temp_dir.path();
        fs::create_dir(base_path.join("images")).unwrap();
        fs::write(base_path.join("images/photo.jpg"), "img").unwrap();
        Ledger::for_directory(base_path)
            .append(&LedgerEntry::now("photo.jpg", "images/photo.jpg"))
            .unwrap();

        let outcome = UndoManager::undo(base_path).unwrap();

        assert!(matches!(outcome, UndoOutcome::Restored { remaining: 0, .. }));
        assert_eq!(fs::read_to_string(base_path.join("photo.jpg")).unwrap(), "img");
        assert!(!base_path.join("images/photo.jpg").exists());
    }

    #[test]
    fn test_record_restore_failure_reports_unrecorded_restore() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let ledger = Ledger::for_directory(&temp_dir.path().join("removed"));
        let entry = LedgerEntry::now(
            temp_dir.path().join("a.txt"),
            temp_dir.path().join("docs/a.txt"),
        );

        let result = UndoManager::record_restore(&ledger, &[], &entry);

        let Err(UndoError::LedgerNotUpdated { restored, .. }) = &result else {
            panic!("expected LedgerNotUpdated, got {result:?}");
        };
        assert_eq!(restored, &entry.source);
    }

    #[test]
    fn test_put_back_returns_set_aside_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let original = temp_dir.path().join("a.txt");
        let backup = temp_dir.path().join("a.txt.bak.20250101-000000");
        fs::write(&backup, "kept").unwrap();

        assert_eq!(UndoManager::put_back(&backup, &original), None);
        assert_eq!(fs::read_to_string(&original).unwrap(), "kept");
        assert!(!backup.exists());
    }

    #[test]
    fn test_put_back_failure_reports_backup_path() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let original = temp_dir.path().join("a.txt");
        let backup = temp_dir.path().join("a.txt.bak.20250101-000000");

        assert_eq!(UndoManager::put_back(&backup, &original), Some(backup));
        assert!(!original.exists());
    }

    #[test]
    fn test_undo_corrupt_ledger_untouched() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let ledger_path = temp_dir.path().join(LEDGER_FILE_NAME);
        let garbage = [0xc3, 0x28, 0xa0, 0xa1, b'\n'];
        fs::write(&ledger_path, garbage).unwrap();

        let result = UndoManager::undo(temp_dir.path());
        assert!(matches!(
            result,
            Err(UndoError::Ledger(LedgerError::Corrupt { .. }))
        ));
        assert_eq!(fs::read(&ledger_path).unwrap(), garbage);
    }

    #[test]
    fn test_undo_malformed_ledger_untouched() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let ledger_path = temp_dir.path().join(LEDGER_FILE_NAME);
        fs::write(&ledger_path, "not a ledger line\n").unwrap();

        let result = UndoManager::undo(temp_dir.path());
        assert!(matches!(
            result,
            Err(UndoError::Ledger(LedgerError::Parse { .. }))
        ));
        assert_eq!(
            fs::read_to_string(&ledger_path).unwrap(),
            "not a ledger line\n"
        );
    }

    #[test]
    fn test_cleanup_removes_ledger_only() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base_path = temp_dir.path();
        fs::write(base_path.join("song.mp3"), "la").unwrap();
        FileOrganizer::default().organize(base_path).unwrap();

        UndoManager::cleanup(base_path);

        assert!(!base_path.join(LEDGER_FILE_NAME).exists());
        assert!(base_path.join("audio/song.mp3").exists());
        assert_eq!(UndoManager::undo(base_path).unwrap(), UndoOutcome::NoHistory);

        // Second cleanup is a no-op
        UndoManager::cleanup(base_path);
    }

    #[test]
    fn test_generate_backup_path_avoids_existing() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let original = temp_dir.path().join("a.txt");

        let first = UndoManager::generate_backup_path(&original);
        fs::write(&first, "").unwrap();
        let second = UndoManager::generate_backup_path(&original);

        assert_ne!(first, second);
        assert_eq!(first.parent(), Some(temp_dir.path()));
    }
}
