/// Per-directory move ledger.
///
/// Every move performed while organizing a directory is appended as one line
/// to a hidden text file inside that directory. Undo reads the file back,
/// reverses the last line and rewrites the file without it.
///
/// Record format, one per line:
///
/// ```text
/// 2024-05-01 09:30:12 | Moved: /data/inbox/photo.jpg → /data/inbox/images/photo.jpg
/// ```
///
/// The delimiters are not escaped. A path containing `" → "` or
/// `" | Moved: "` cannot be read back and is reported as a parse error.
use chrono::{Local, NaiveDateTime, SubsecRound};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;

/// Name of the ledger file kept inside each organized directory.
pub const LEDGER_FILE_NAME: &str = ".organizer_log.txt";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const MOVED_DELIMITER: &str = " | Moved: ";
const ARROW_DELIMITER: &str = " → ";

/// One completed move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    /// When the move happened, local time, second precision.
    pub timestamp: NaiveDateTime,
    /// Where the file was before the move.
    pub source: PathBuf,
    /// Where the file was moved to.
    pub destination: PathBuf,
}

impl LedgerEntry {
    /// Creates an entry stamped with the current local time.
    pub fn now(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            timestamp: Local::now().naive_local().trunc_subsecs(0),
            source: source.into(),
            destination: destination.into(),
        }
    }

    /// Renders the entry as a ledger line, without the trailing newline.
    ///
    /// Paths that are not valid UTF-8 are rendered lossily and will not parse
    /// back to the same path; organize never records such paths.
    pub fn to_line(&self) -> String {
        format!(
            "{}{}{}{}{}",
            self.timestamp.format(TIMESTAMP_FORMAT),
            MOVED_DELIMITER,
            self.source.to_string_lossy(),
            ARROW_DELIMITER,
            self.destination.to_string_lossy()
        )
    }

    /// Parses one ledger line.
    ///
    /// `line_number` is only used for error reporting.
    pub fn parse_line(line: &str, line_number: usize) -> Result<Self, LedgerError> {
        let parse_error = |reason: &str| LedgerError::Parse {
            line: line_number,
            reason: reason.to_string(),
        };

        let (timestamp, moved) = line
            .split_once(MOVED_DELIMITER)
            .ok_or_else(|| parse_error("missing ' | Moved: ' delimiter"))?;

        if moved.matches(ARROW_DELIMITER).count() != 1 {
            return Err(parse_error("expected exactly one ' → ' delimiter"));
        }
        let (source, destination) = moved
            .split_once(ARROW_DELIMITER)
            .ok_or_else(|| parse_error("missing ' → ' delimiter"))?;

        if source.is_empty() || destination.is_empty() {
            return Err(parse_error("empty path"));
        }

        let timestamp = NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT)
            .map_err(|e| parse_error(&format!("invalid timestamp '{}': {}", timestamp, e)))?;

        Ok(Self {
            timestamp,
            source: PathBuf::from(source),
            destination: PathBuf::from(destination),
        })
    }
}

/// Errors raised while reading or writing a ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The ledger file could not be read or written.
    #[error("ledger I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The ledger file is not valid UTF-8 text.
    #[error("ledger file {path} is corrupted (not valid UTF-8)")]
    Corrupt { path: PathBuf },
    /// A ledger line does not have the expected shape.
    #[error("malformed ledger line {line}: {reason}")]
    Parse { line: usize, reason: String },
}

/// Handle on the ledger of one directory.
///
/// The handle is derived from the directory alone and holds no open file;
/// every operation opens and releases the file itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ledger {
    path: PathBuf,
}

impl Ledger {
    /// Returns the ledger belonging to `directory`.
    pub fn for_directory(directory: &Path) -> Self {
        Self {
            path: directory.join(LEDGER_FILE_NAME),
        }
    }

    /// Path of the ledger file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True when the ledger file exists.
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    fn io_error(&self, source: io::Error) -> LedgerError {
        LedgerError::Io {
            path: self.path.clone(),
            source,
        }
    }

    /// Creates the ledger file empty if it does not exist yet.
    pub fn ensure(&self) -> Result<(), LedgerError> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_error(e))?;
        Ok(())
    }

    /// Appends one entry, creating the file if needed.
    pub fn append(&self, entry: &LedgerEntry) -> Result<(), LedgerError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_error(e))?;
        let line = format!("{}\n", entry.to_line());
        file.write_all(line.as_bytes())
            .map_err(|e| self.io_error(e))?;
        Ok(())
    }

    /// Reads every entry in append order.
    ///
    /// A missing ledger reads as empty; use [`Ledger::exists`] to tell the
    /// two apart. Blank lines are ignored.
    pub fn read_all(&self) -> Result<Vec<LedgerEntry>, LedgerError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io_error(e)),
        };

        let text = String::from_utf8(bytes).map_err(|_| LedgerError::Corrupt {
            path: self.path.clone(),
        })?;

        text.lines()
            .enumerate()
            .map(|(i, line)| (i + 1, line.trim_end_matches('\r')))
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(number, line)| LedgerEntry::parse_line(line, number))
            .collect()
    }

    /// Rewrites the ledger so that it holds exactly `remaining`.
    ///
    /// The new content goes to a temporary file next to the ledger which is
    /// then renamed over it, so readers see either the old or the new ledger.
    pub fn drop_last(&self, remaining: &[LedgerEntry]) -> Result<(), LedgerError> {
        let directory = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let mut content = String::new();
        for entry in remaining {
            content.push_str(&entry.to_line());
            content.push('\n');
        }

        let mut temp = NamedTempFile::new_in(directory).map_err(|e| self.io_error(e))?;
        temp.write_all(content.as_bytes())
            .map_err(|e| self.io_error(e))?;
        temp.flush().map_err(|e| self.io_error(e))?;
        temp.persist(&self.path)
            .map_err(|e| self.io_error(e.error))?;
        Ok(())
    }

    /// Removes the ledger file. Never fails: problems are logged and dropped.
    pub fn delete(&self) {
        match fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "ledger removed"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "could not delete ledger")
            }
        }
    }
}
