//! januskey - Reversible file operations with irrecoverable erasure
//!
//! This library manages a directory tree so that every mutation is
//! reversible: each operation records metadata sufficient to derive its
//! inverse, and pre-image content is parked in a content-addressed
//! store. An orthogonal obliteration primitive removes content from the
//! store irrecoverably, emits a verifiable proof, and appends an audit
//! record; undo of anything that needed that content fails from then on.
//!
//! # Overview
//!
//! Two disjoint primitives govern a managed root:
//!
//! - **Reversible operations** (create, delete, modify, move, copy,
//!   chmod, mkdir, rmdir, symlink, append, truncate, touch): applied
//!   through the [`Engine`], each leaves an [`OpRecord`] in the
//!   append-only history. `undo` derives the inverse from the record
//!   plus the store.
//! - **Obliteration**: secure multi-pass overwrite, store removal, a
//!   commitment-bound [`ObliterationProof`], and an audit-log entry.
//!   Not an operation in the reversible sense; it never appears in
//!   history and is never undone.
//!
//! # Example
//!
//! ```no_run
//! use januskey::Engine;
//! use std::path::Path;
//!
//! fn main() -> januskey::Result<()> {
//!     let mut engine = Engine::init(Path::new("/project"))?;
//!
//!     let record = engine.apply_delete(Path::new("notes.txt"))?;
//!     // ... later:
//!     engine.undo(record.id)?;
//!
//!     // Or group operations and roll them all back
//!     engine.begin()?;
//!     engine.apply_modify(Path::new("a.txt"), b"draft")?;
//!     engine.apply_create(Path::new("b.txt"), b"new")?;
//!     engine.rollback()?;
//!     Ok(())
//! }
//! ```
//!
//! # Concurrency
//!
//! The engine is single-writer: one `Engine` value owns all mutable
//! state for one managed root, and operations are synchronous. Nothing
//! in this crate is a process-wide singleton.

pub mod engine;
pub mod error;
pub mod hash;
pub mod history;
pub mod obliterate;
pub mod store;
pub mod tree;
pub mod txn;

// Re-exports for convenience
pub use engine::{Engine, EngineStatus, RecordState};
pub use error::{JanusError, Result};
pub use hash::{hash_bytes, null_hash, ContentHash};
pub use history::{History, OpKind, OpRecord};
pub use obliterate::{
    AuditLog, ErasureRequest, ErasureResponse, ObliterationProof, ObliterationRecord,
    MIN_OVERWRITE_PASSES,
};
pub use store::{ContentStore, RemovalState};
pub use tree::{FileMeta, TreeEntry, TreeIndex};
pub use txn::TxnInfo;
