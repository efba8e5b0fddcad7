/// Sorting the top level of a directory into category folders.
///
/// An organize pass creates one subfolder per category, moves every
/// classifiable top-level file into its category folder and appends one
/// ledger line per move so that [`crate::undo::UndoManager`] can reverse it.
use crate::config::{CollisionPolicy, CompiledFilters, ConfigError, OrganizerConfig};
use crate::file_category::CategoryTable;
use crate::ledger::{LEDGER_FILE_NAME, Ledger, LedgerEntry, LedgerError};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that abort an organize pass.
///
/// Moves completed before the error stay in place and stay in the ledger.
#[derive(Debug, Error)]
pub enum OrganizeError {
    /// The target is missing or not a directory.
    #[error("Invalid target directory {}: {error}", path.display())]
    InvalidTarget {
        path: PathBuf,
        #[source]
        error: io::Error,
    },
    /// Failed to create a category directory.
    #[error("Failed to create directory {}: {error}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        error: io::Error,
    },
    /// Failed to list the target directory.
    #[error("Failed to read directory {}: {error}", path.display())]
    ReadDir {
        path: PathBuf,
        #[source]
        error: io::Error,
    },
    /// Failed to move a file into its category directory.
    #[error("Failed to move {} to {}: {error}", from.display(), to.display())]
    Move {
        from: PathBuf,
        to: PathBuf,
        #[source]
        error: io::Error,
    },
    /// The destination is taken and the collision policy is `fail`.
    #[error("Destination already exists: {}", .0.display())]
    DestinationExists(PathBuf),
    /// The ledger could not be written.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Result type for organize operations.
pub type OrganizeResult<T> = Result<T, OrganizeError>;

/// Why a classifiable or candidate file was left in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Matched an exclusion rule from the configuration.
    Excluded,
    /// The category folder already holds a file with that name.
    DestinationExists,
    /// The file name is not valid UTF-8 and cannot be recorded in the ledger.
    NonUtf8Name,
}

/// A top-level file the pass deliberately did not move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: SkipReason,
}

/// What one organize pass did.
#[derive(Debug, Clone, Default)]
pub struct OrganizeReport {
    /// The organized directory.
    pub directory: PathBuf,
    /// Moves performed, in ledger order.
    pub moved: Vec<LedgerEntry>,
    /// Files left in place on purpose.
    pub skipped: Vec<SkippedFile>,
    /// Files whose extension matched no category.
    pub unclassified: usize,
}

impl OrganizeReport {
    /// Number of files moved into category folders.
    pub fn moved_count(&self) -> usize {
        self.moved.len()
    }

    /// Moved files per category folder, sorted by category name.
    pub fn category_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for entry in &self.moved {
            let category = entry
                .destination
                .parent()
                .and_then(|p| p.file_name())
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            *counts.entry(category).or_insert(0) += 1;
        }
        counts
    }
}

/// Organizes a directory's top-level files into category subdirectories.
///
/// # Examples
///
/// ```no_run
/// use shelve::file_organizer::FileOrganizer;
/// use std::path::Path;
///
/// let organizer = FileOrganizer::default();
/// match organizer.organize(Path::new("/path/to/downloads")) {
///     Ok(report) => println!("Moved {} files", report.moved_count()),
///     Err(e) => eprintln!("Organization failed: {}", e),
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct FileOrganizer {
    table: CategoryTable,
    filters: CompiledFilters,
    on_collision: CollisionPolicy,
}

impl FileOrganizer {
    /// Creates an organizer over `table` with no exclusions and the default
    /// collision policy.
    pub fn new(table: CategoryTable) -> Self {
        Self {
            table,
            filters: CompiledFilters::default(),
            on_collision: CollisionPolicy::default(),
        }
    }

    /// Creates an organizer over the standard table configured by `config`.
    pub fn from_config(config: &OrganizerConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(CategoryTable::standard())
            .with_filters(config.compile_filters()?)
            .with_collision_policy(config.organize.on_collision))
    }

    pub fn with_filters(mut self, filters: CompiledFilters) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_collision_policy(mut self, policy: CollisionPolicy) -> Self {
        self.on_collision = policy;
        self
    }

    pub fn table(&self) -> &CategoryTable {
        &self.table
    }

    pub fn collision_policy(&self) -> CollisionPolicy {
        self.on_collision
    }

    /// Runs one organize pass over `target`.
    ///
    /// `target` is resolved to its canonical absolute path first, so the
    /// ledger never depends on the working directory. Files whose names are
    /// not valid UTF-8 are left in place and reported as skipped.
    ///
    /// Every category folder is created first, even for categories with no
    /// matching file. Only immediate entries are considered; directories and
    /// the ledger file itself are never moved. Entries are visited in file
    /// name order so the ledger order is reproducible.
    ///
    /// Any filesystem failure stops the pass. Files moved before the failure
    /// remain moved and remain individually undoable.
    pub fn organize(&self, target: &Path) -> OrganizeResult<OrganizeReport> {
        let invalid_target = |e: io::Error| OrganizeError::InvalidTarget {
            path: target.to_path_buf(),
            error: e,
        };
        let metadata = fs::metadata(target).map_err(invalid_target)?;
        if !metadata.is_dir() {
            return Err(invalid_target(io::Error::new(
                io::ErrorKind::NotADirectory,
                "not a directory",
            )));
        }

        // Ledger paths must not depend on the working directory.
        let target = fs::canonicalize(target).map_err(invalid_target)?;
        if target.to_str().is_none() {
            return Err(invalid_target(io::Error::new(
                io::ErrorKind::InvalidData,
                "path is not valid UTF-8",
            )));
        }
        let target = target.as_path();

        for category in self.table.categories() {
            let category_path = target.join(category);
            fs::create_dir_all(&category_path).map_err(|e| OrganizeError::CreateDir {
                path: category_path.clone(),
                error: e,
            })?;
        }

        let ledger = Ledger::for_directory(target);
        ledger.ensure()?;

        let read_dir_error = |e: io::Error| OrganizeError::ReadDir {
            path: target.to_path_buf(),
            error: e,
        };
        let mut entries = fs::read_dir(target)
            .map_err(read_dir_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(read_dir_error)?;
        entries.sort_by_key(|entry| entry.file_name());

        let mut report = OrganizeReport {
            directory: target.to_path_buf(),
            ..Default::default()
        };

        for entry in entries {
            let path = entry.path();
            if path.is_dir() {
                continue;
            }

            let file_name = entry.file_name();
            if file_name == LEDGER_FILE_NAME {
                continue;
            }

            let Some(name) = file_name.to_str() else {
                tracing::warn!(file = %path.display(), "file name is not valid UTF-8, leaving file in place");
                report.skipped.push(SkippedFile {
                    path,
                    reason: SkipReason::NonUtf8Name,
                });
                continue;
            };

            if self.filters.is_excluded(name) {
                tracing::debug!(file = %path.display(), "excluded by configuration");
                report.skipped.push(SkippedFile {
                    path,
                    reason: SkipReason::Excluded,
                });
                continue;
            }

            let Some(category) = self.table.classify(name) else {
                report.unclassified += 1;
                continue;
            };

            let destination = target.join(category).join(name);
            if destination.symlink_metadata().is_ok() {
                match self.on_collision {
                    CollisionPolicy::Skip => {
                        tracing::warn!(
                            file = %path.display(),
                            destination = %destination.display(),
                            "destination exists, leaving file in place"
                        );
                        report.skipped.push(SkippedFile {
                            path,
                            reason: SkipReason::DestinationExists,
                        });
                        continue;
                    }
                    CollisionPolicy::Fail => {
                        return Err(OrganizeError::DestinationExists(destination));
                    }
                    CollisionPolicy::Overwrite => {
                        tracing::warn!(destination = %destination.display(), "overwriting existing file");
                    }
                }
            }

            move_file(&path, &destination).map_err(|e| OrganizeError::Move {
                from: path.clone(),
                to: destination.clone(),
                error: e,
            })?;

            let record = LedgerEntry::now(path, destination);
            ledger.append(&record)?;
            tracing::debug!(
                from = %record.source.display(),
                to = %record.destination.display(),
                category,
                "moved"
            );
            report.moved.push(record);
        }

        tracing::info!(
            directory = %target.display(),
            moved = report.moved.len(),
            skipped = report.skipped.len(),
            unclassified = report.unclassified,
            "organize pass complete"
        );

        Ok(report)
    }
}

/// Moves a file, falling back to copy-then-remove when a rename cannot cross
/// filesystems. An existing file at `to` is replaced.
pub fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            fs::copy(from, to)?;
            fs::remove_file(from)
        }
        Err(e) => Err(e),
    }
}
