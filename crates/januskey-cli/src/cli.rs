//! CLI argument definitions for jk
//!
//! Uses clap for argument parsing. This module defines all subcommands
//! and their options.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// jk - reversible file operations
///
/// Every mutation inside a managed directory is recorded with enough
/// metadata to undo it. Obliteration is the one-way exception: erased
/// content is gone, with a proof and an audit record to show for it.
#[derive(Parser, Debug)]
#[command(name = "jk")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Managed root directory (default: $JANUSKEY_ROOT, then the
    /// current directory)
    #[arg(long, global = true, value_name = "DIR")]
    pub root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize the current directory as a managed root
    #[command(after_help = "EXAMPLES:
    # Manage the current directory
    jk init

    # Manage another directory
    jk --root ./project init
")]
    Init,

    /// Show tracked files, store usage, history length, and the active
    /// transaction
    Status(StatusArgs),

    /// List recorded operations
    #[command(after_help = "EXAMPLES:
    # Most recent operations
    jk history

    # Only deletes, as JSON
    jk history --kind delete --json

    # Everything that touched a path
    jk history --path src/main.rs
")]
    History(HistoryArgs),

    /// Create a new file
    #[command(after_help = "EXAMPLES:
    # Content from the command line
    jk create notes.txt --content 'first line'

    # Content from stdin
    echo 'first line' | jk create notes.txt
")]
    Create(ContentArgs),

    /// Delete a file (reversibly: its content is parked in the store)
    Delete {
        /// File to delete
        path: PathBuf,
    },

    /// Replace a file's content (reversibly)
    Modify(ContentArgs),

    /// Move or rename a file
    #[command(name = "move")]
    Move {
        source: PathBuf,
        destination: PathBuf,
    },

    /// Copy a file
    Copy {
        source: PathBuf,
        destination: PathBuf,
    },

    /// Undo an operation (default: the most recent one)
    #[command(after_help = "EXAMPLES:
    # Undo the last operation
    jk undo

    # Undo a specific operation from 'jk history'
    jk undo 17
")]
    Undo {
        /// Operation id to undo
        id: Option<u64>,
    },

    /// Begin a transaction
    Begin,

    /// Commit the active transaction (freeze it; no files change)
    Commit,

    /// Roll back the active transaction, undoing its operations in
    /// reverse order
    Rollback,

    /// List the active transaction's pending operations
    Preview,

    /// Irrecoverably erase stored content by digest
    #[command(after_help = "EXAMPLES:
    # Erase one digest (64 hex characters, from 'jk history --json')
    jk obliterate 3f2a... --reason 'subject-42' --legal-basis 'GDPR Art.17(1)(a)'

    # Best-effort batch
    jk obliterate 3f2a... 9c1b... 77de...
")]
    Obliterate(ObliterateArgs),
}

#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct HistoryArgs {
    /// Show at most this many records, newest first
    #[arg(long, short = 'n', value_name = "N")]
    pub limit: Option<usize>,

    /// Filter by operation kind (create, delete, modify, ...)
    #[arg(long, value_name = "KIND")]
    pub kind: Option<String>,

    /// Filter by exact path
    #[arg(long, value_name = "PATH")]
    pub path: Option<PathBuf>,

    /// Machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct ContentArgs {
    /// Target file
    pub path: PathBuf,

    /// New content; read from stdin when omitted
    #[arg(long, value_name = "TEXT")]
    pub content: Option<String>,
}

#[derive(Parser, Debug)]
pub struct ObliterateArgs {
    /// Content digests to erase (64 hex characters each)
    #[arg(required = true, value_name = "HASH")]
    pub hashes: Vec<String>,

    /// Recorded reason (e.g. a data-subject id)
    #[arg(long, value_name = "TEXT")]
    pub reason: Option<String>,

    /// Recorded legal basis (e.g. 'GDPR Art.17(1)(a)')
    #[arg(long, value_name = "TEXT")]
    pub legal_basis: Option<String>,
}
