//! shelve - sort a directory into category folders, one undoable move at a time
//!
//! This library classifies files by extension, moves the top-level files of a
//! directory into per-category subfolders, records every move in a ledger kept
//! inside that directory, and reverses those moves one at a time.

pub mod cli;
pub mod config;
pub mod file_category;
pub mod file_organizer;
pub mod ledger;
pub mod output;
pub mod undo;

pub use config::{CollisionPolicy, CompiledFilters, ConfigError, OrganizerConfig};
pub use file_category::{CategoryError, CategoryTable};
pub use file_organizer::{FileOrganizer, OrganizeError, OrganizeReport};
pub use ledger::{Ledger, LedgerEntry, LedgerError};
pub use undo::{UndoError, UndoManager, UndoOutcome};

pub use cli::{OrganizeCommand, run_cli};
