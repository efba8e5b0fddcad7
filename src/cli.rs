//! Command-line shell for shelve.
//!
//! The shell is a thin layer over the library: it picks the directory,
//! calls [`FileOrganizer::organize`] or [`UndoManager::undo`] and renders the
//! outcome. Two ways of working are offered:
//! - one-shot `organize`, `undo` and `clean` commands, where the ledger stays
//!   on disk between invocations until `clean` is run;
//! - an interactive `session` which deletes the ledgers of every directory it
//!   organized when it ends normally.

use crate::config::OrganizerConfig;
use crate::file_organizer::{FileOrganizer, OrganizeReport, SkipReason};
use crate::ledger::Ledger;
use crate::output::{OutputFormatter, plural};
use crate::undo::{UndoManager, UndoOutcome};
use clap::{Parser, Subcommand};
use std::collections::BTreeSet;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

/// Top-level command-line arguments.
#[derive(Debug, Parser)]
#[command(
    name = "shelve",
    version,
    about = "Sort a directory's files into category folders, with step-by-step undo"
)]
pub struct Cli {
    /// Print debug logs to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (defaults to .shelverc.toml, then ~/.config/shelve/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: OrganizeCommand,
}

/// Represents a CLI command to execute.
#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum OrganizeCommand {
    /// Move the top-level files of DIR into category folders
    Organize {
        #[arg(value_name = "DIR")]
        dir: PathBuf,
    },
    /// Move the most recently organized file of DIR back
    Undo {
        #[arg(value_name = "DIR")]
        dir: PathBuf,
    },
    /// Delete the undo ledger of DIR
    Clean {
        #[arg(value_name = "DIR")]
        dir: PathBuf,
    },
    /// Read organize/undo commands from stdin; ledgers are removed on exit
    Session,
}

/// Runs one command.
///
/// # Examples
///
/// ```no_run
/// use shelve::cli::{run_cli, OrganizeCommand};
/// use std::path::PathBuf;
///
/// let command = OrganizeCommand::Organize { dir: PathBuf::from("/path/to/directory") };
/// if let Err(e) = run_cli(command, None) {
///     eprintln!("{}", e);
/// }
/// ```
pub fn run_cli(command: OrganizeCommand, config_path: Option<&Path>) -> Result<(), String> {
    match command {
        OrganizeCommand::Organize { dir } => {
            let organizer = load_organizer(config_path)?;
            organize_directory(&organizer, &dir)
        }
        OrganizeCommand::Undo { dir } => undo_last_move(&dir),
        OrganizeCommand::Clean { dir } => {
            UndoManager::cleanup(&dir);
            OutputFormatter::success(&format!("Undo history cleared for: {}", dir.display()));
            Ok(())
        }
        OrganizeCommand::Session => {
            let organizer = load_organizer(config_path)?;
            let stdin = io::stdin();
            run_session(stdin.lock(), organizer);
            Ok(())
        }
    }
}

/// Builds an organizer from the configuration found for this invocation.
pub fn load_organizer(config_path: Option<&Path>) -> Result<FileOrganizer, String> {
    let config = OrganizerConfig::load(config_path)
        .map_err(|e| format!("Error loading configuration: {}", e))?;
    FileOrganizer::from_config(&config).map_err(|e| format!("Error compiling filters: {}", e))
}

/// Organizes `dir` and renders the result.
pub fn organize_directory(organizer: &FileOrganizer, dir: &Path) -> Result<(), String> {
    OutputFormatter::info(&format!("Organizing contents of: {}", dir.display()));

    let report = organizer
        .organize(dir)
        .map_err(|e| format!("Failed to organize:\n{}", e))?;
    render_report(&report);
    Ok(())
}

fn render_report(report: &OrganizeReport) {
    for entry in &report.moved {
        OutputFormatter::plain(&format!(
            " - {} → {}",
            entry.source.display(),
            entry.destination.display()
        ));
    }

    for skipped in &report.skipped {
        let reason = match skipped.reason {
            SkipReason::Excluded => "excluded by configuration",
            SkipReason::DestinationExists => "a file with that name is already sorted",
            SkipReason::NonUtf8Name => "the file name is not valid UTF-8",
        };
        OutputFormatter::warning(&format!("Left {} in place: {}", skipped.path.display(), reason));
    }

    if report.moved.is_empty() {
        OutputFormatter::info("No files needed moving.");
    } else {
        OutputFormatter::summary_table(&report.category_counts(), report.moved_count());
    }

    if report.unclassified > 0 {
        OutputFormatter::plain(&format!(
            "{} unrecognized {} left at the top level.",
            report.unclassified,
            plural(report.unclassified)
        ));
    }

    OutputFormatter::success(&format!("Organized files in:\n{}", report.directory.display()));
}

/// Undoes the last recorded move in `dir` and renders the result.
pub fn undo_last_move(dir: &Path) -> Result<(), String> {
    match UndoManager::undo(dir) {
        Ok(UndoOutcome::Restored {
            entry,
            backup,
            remaining,
        }) => {
            if let Some(backup) = backup {
                OutputFormatter::warning(&format!(
                    "A file was in the way and was kept as: {}",
                    backup.display()
                ));
            }
            let name = entry
                .source
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| entry.source.display().to_string());
            OutputFormatter::success(&format!("Reverted: {}", name));
            let moves = if remaining == 1 { "move" } else { "moves" };
            OutputFormatter::plain(&format!("{} more {} can be undone.", remaining, moves));
            Ok(())
        }
        Ok(UndoOutcome::NoHistory) => {
            OutputFormatter::warning("No undo history found!");
            Ok(())
        }
        Ok(UndoOutcome::EmptyHistory) => {
            OutputFormatter::warning("Nothing to undo!");
            Ok(())
        }
        Err(e) => Err(format!("Undo failed: {}", e)),
    }
}

/// Whether the session loop should keep reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionControl {
    Continue,
    Exit,
}

/// An interactive session over any number of directories.
///
/// The session remembers which directories it organized, and
/// [`Session::finish`] deletes their ledgers. Undoing in a directory the
/// session never organized leaves that directory's ledger in place.
pub struct Session {
    organizer: FileOrganizer,
    touched: BTreeSet<PathBuf>,
}

impl Session {
    pub fn new(organizer: FileOrganizer) -> Self {
        Self {
            organizer,
            touched: BTreeSet::new(),
        }
    }

    /// Directories whose ledgers will be removed by [`Session::finish`].
    pub fn touched(&self) -> impl Iterator<Item = &Path> {
        self.touched.iter().map(PathBuf::as_path)
    }

    /// Runs one command line.
    pub fn handle_line(&mut self, line: &str) -> SessionControl {
        let line = line.trim();
        let (command, argument) = match line.split_once(char::is_whitespace) {
            Some((command, rest)) => (command, rest.trim()),
            None => (line, ""),
        };

        match (command, argument) {
            ("", _) => {}
            ("exit" | "quit", _) => return SessionControl::Exit,
            ("help", _) => print_session_help(),
            ("organize" | "undo", "") => {
                OutputFormatter::warning(&format!("Usage: {} <directory>", command));
            }
            ("organize", dir) => {
                let dir = PathBuf::from(dir);
                let had_ledger = Ledger::for_directory(&dir).exists();
                match organize_directory(&self.organizer, &dir) {
                    Ok(()) => {
                        self.touched.insert(dir);
                    }
                    Err(e) => {
                        // A pass that failed part way still owns the ledger it created.
                        if !had_ledger && Ledger::for_directory(&dir).exists() {
                            self.touched.insert(dir);
                        }
                        OutputFormatter::error(&e);
                    }
                }
            }
            ("undo", dir) => {
                if let Err(e) = undo_last_move(Path::new(dir)) {
                    OutputFormatter::error(&e);
                }
            }
            (other, _) => {
                OutputFormatter::warning(&format!("Unknown command '{}'. Type 'help'.", other));
            }
        }

        SessionControl::Continue
    }

    /// Ends the session, deleting the ledger of every organized directory.
    pub fn finish(self) {
        for dir in &self.touched {
            UndoManager::cleanup(dir);
        }
        tracing::debug!(directories = self.touched.len(), "session ledgers cleaned up");
    }
}

fn print_session_help() {
    OutputFormatter::plain("Commands:");
    OutputFormatter::plain("  organize <directory>   sort top-level files into category folders");
    OutputFormatter::plain("  undo <directory>       move the last sorted file back");
    OutputFormatter::plain("  exit | quit            leave and clear undo history");
}

/// Reads commands from `input` until `exit` or end of input, then cleans up.
pub fn run_session<R: BufRead>(input: R, organizer: FileOrganizer) {
    let mut session = Session::new(organizer);
    OutputFormatter::info("Type 'help' for commands.");
    prompt();

    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                OutputFormatter::error(&format!("Could not read input: {}", e));
                break;
            }
        };
        if session.handle_line(&line) == SessionControl::Exit {
            break;
        }
        prompt();
    }

    session.finish();
}

fn prompt() {
    print!("> ");
    let _ = io::stdout().flush();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LEDGER_FILE_NAME;
    use clap::CommandFactory;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_organize() {
        let cli = Cli::try_parse_from(["shelve", "organize", "/tmp/inbox"]).unwrap();
        assert_eq!(
            cli.command,
            OrganizeCommand::Organize {
                dir: PathBuf::from("/tmp/inbox")
            }
        );
        assert!(!cli.verbose);
    }

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let cli =
            Cli::try_parse_from(["shelve", "undo", "/tmp/inbox", "-v", "--config", "c.toml"])
                .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("c.toml")));
    }

    #[test]
    fn test_parse_requires_directory() {
        assert!(Cli::try_parse_from(["shelve", "organize"]).is_err());
    }

    #[test]
    fn test_session_organize_undo_and_finish() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base_path = temp_dir.path();
        fs::write(base_path.join("photo.jpg"), "img").unwrap();
        fs::write(base_path.join("notes.txt"), "txt").unwrap();

        let mut session = Session::new(FileOrganizer::default());
        let dir = base_path.display().to_string();

        assert_eq!(
            session.handle_line(&format!("organize {}", dir)),
            SessionControl::Continue
        );
        assert!(base_path.join("images/photo.jpg").exists());
        assert!(base_path.join("docs/notes.txt").exists());

        session.handle_line(&format!("undo {}", dir));
        // Files are visited in name order, so photo.jpg was the last move
        assert!(base_path.join("photo.jpg").exists());
        assert!(base_path.join("docs/notes.txt").exists());

        assert_eq!(session.handle_line("exit"), SessionControl::Exit);
        session.finish();
        assert!(!base_path.join(LEDGER_FILE_NAME).exists());
        assert!(base_path.join("docs/notes.txt").exists());
    }

    #[test]
    fn test_session_ignores_blank_and_unknown_lines() {
        let mut session = Session::new(FileOrganizer::default());
        assert_eq!(session.handle_line("   "), SessionControl::Continue);
        assert_eq!(session.handle_line("frobnicate"), SessionControl::Continue);
        assert_eq!(session.handle_line("organize"), SessionControl::Continue);
        assert_eq!(session.touched().count(), 0);
        assert_eq!(session.handle_line("quit"), SessionControl::Exit);
    }

    #[test]
    fn test_session_undo_keeps_ledger_it_did_not_create() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base_path = temp_dir.path();
        fs::write(base_path.join("a.txt"), "a").unwrap();
        fs::write(base_path.join("b.txt"), "b").unwrap();
        FileOrganizer::default().organize(base_path).unwrap();

        let mut session = Session::new(FileOrganizer::default());
        session.handle_line(&format!("undo {}", base_path.display()));
        assert_eq!(session.touched().count(), 0);
        session.finish();

        assert!(base_path.join("b.txt").exists());
        assert_eq!(Ledger::for_directory(base_path).read_all().unwrap().len(), 1);
    }

    #[test]
    fn test_session_failed_organize_is_not_tracked() {
        let mut session = Session::new(FileOrganizer::default());
        session.handle_line("organize /non/existent/path");
        assert_eq!(session.touched().count(), 0);
    }

    #[test]
    fn test_run_session_cleans_up_on_end_of_input() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base_path = temp_dir.path();
        fs::write(base_path.join("clip.mp4"), "v").unwrap();

        let script = format!("organize {}\n", base_path.display());
        run_session(script.as_bytes(), FileOrganizer::default());

        assert!(base_path.join("videos/clip.mp4").exists());
        assert!(!base_path.join(LEDGER_FILE_NAME).exists());
    }

    #[test]
    fn test_run_cli_undo_without_history_is_ok() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let result = run_cli(
            OrganizeCommand::Undo {
                dir: temp_dir.path().to_path_buf(),
            },
            None,
        );
        assert!(result.is_ok());
    }
}
