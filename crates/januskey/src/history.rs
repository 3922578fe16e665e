//! Operation metadata and the append-only history log
//!
//! Every applied mutation leaves one record carrying enough metadata to
//! derive its inverse. The log is JSON-lines and strictly append-only:
//! undoing an operation appends a marker referencing the original id,
//! it never rewrites the original record. The in-memory view replays
//! markers at load time.

use crate::error::{JanusError, Result};
use crate::hash::ContentHash;
use crate::tree::FileMeta;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Hard bound on history length; appends beyond it are refused.
const MAX_HISTORY: usize = 100_000;

/// Operation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OpKind {
    Create,
    Delete,
    Modify,
    Move,
    Copy,
    Chmod,
    Mkdir,
    Rmdir,
    Symlink,
    Append,
    Truncate,
    Touch,
}

impl std::fmt::Display for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Create => "CREATE",
            Self::Delete => "DELETE",
            Self::Modify => "MODIFY",
            Self::Move => "MOVE",
            Self::Copy => "COPY",
            Self::Chmod => "CHMOD",
            Self::Mkdir => "MKDIR",
            Self::Rmdir => "RMDIR",
            Self::Symlink => "SYMLINK",
            Self::Append => "APPEND",
            Self::Truncate => "TRUNCATE",
            Self::Touch => "TOUCH",
        };
        f.write_str(name)
    }
}

/// Metadata recorded for one applied operation, sufficient for undo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpRecord {
    /// Monotonic operation id
    pub id: u64,
    pub kind: OpKind,
    pub timestamp: DateTime<Utc>,
    /// Primary path (canonical, relative to the managed root)
    pub path: PathBuf,
    /// Secondary path for move/copy (destination) and symlink (target)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary: Option<PathBuf>,
    /// Digest of the pre-image content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_hash: Option<ContentHash>,
    /// Digest of the post-image content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_hash: Option<ContentHash>,
    /// File metadata before the operation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_meta: Option<FileMeta>,
    /// File size before the operation (append/truncate undo)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_size: Option<u64>,
    /// Enclosing transaction id, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub txn: Option<u64>,
    /// Derived at load by replaying undo markers; never persisted
    #[serde(skip)]
    pub undone: bool,
    /// Id of the undo marker that undid this record
    #[serde(skip)]
    pub undone_by: Option<u64>,
}

impl OpRecord {
    /// Check that this record carries every field its kind requires
    /// for undo.
    pub fn check_sufficient(&self) -> Result<()> {
        let missing = |field: &'static str| JanusError::InsufficientMetadata {
            id: self.id,
            field,
        };

        match self.kind {
            OpKind::Create => {
                if self.post_hash.is_none() {
                    return Err(missing("post_hash"));
                }
            }
            OpKind::Delete => {
                if self.pre_hash.is_none() {
                    return Err(missing("pre_hash"));
                }
                if self.pre_meta.is_none() {
                    return Err(missing("pre_meta"));
                }
            }
            OpKind::Modify => {
                if self.pre_hash.is_none() {
                    return Err(missing("pre_hash"));
                }
                if self.post_hash.is_none() {
                    return Err(missing("post_hash"));
                }
                if self.pre_meta.is_none() {
                    return Err(missing("pre_meta"));
                }
            }
            OpKind::Move | OpKind::Copy => {
                if self.secondary.is_none() {
                    return Err(missing("secondary"));
                }
            }
            OpKind::Append => {
                if self.pre_size.is_none() {
                    return Err(missing("pre_size"));
                }
            }
            OpKind::Truncate => {
                if self.pre_hash.is_none() {
                    return Err(missing("pre_hash"));
                }
                if self.pre_size.is_none() {
                    return Err(missing("pre_size"));
                }
            }
            OpKind::Chmod => {
                if self.pre_meta.is_none() {
                    return Err(missing("pre_meta"));
                }
            }
            // Touch of an existing file records pre_meta; touch-create
            // records none, and undo deletes. Nothing to check here.
            OpKind::Touch | OpKind::Mkdir | OpKind::Rmdir | OpKind::Symlink => {}
        }
        Ok(())
    }

    /// The pre-image digests this record needs retrievable for undo.
    #[must_use]
    pub fn required_hashes(&self) -> Vec<ContentHash> {
        match self.kind {
            OpKind::Delete | OpKind::Modify | OpKind::Truncate => {
                self.pre_hash.into_iter().collect()
            }
            _ => Vec::new(),
        }
    }

    /// True iff the record's metadata points at this digest.
    #[must_use]
    pub fn references(&self, hash: &ContentHash) -> bool {
        self.pre_hash == Some(*hash) || self.post_hash == Some(*hash)
    }

    /// The set of paths this record touches.
    #[must_use]
    pub fn paths(&self) -> Vec<&Path> {
        let mut paths = vec![self.path.as_path()];
        if let Some(secondary) = &self.secondary {
            paths.push(secondary.as_path());
        }
        paths
    }

    /// Two records are independent iff their path sets are disjoint.
    /// Independent records may be undone in either order.
    #[must_use]
    pub fn independent(&self, other: &OpRecord) -> bool {
        let mine = self.paths();
        other.paths().iter().all(|p| !mine.contains(p))
    }
}

/// One line in the history log: a record or an undo marker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "entry", rename_all = "snake_case")]
enum LogLine {
    Op {
        #[serde(flatten)]
        op: Box<OpRecord>,
    },
    Undo {
        op_id: u64,
        undone_by: u64,
        timestamp: DateTime<Utc>,
    },
}

/// Append-only operation history backed by a JSON-lines file.
pub struct History {
    path: PathBuf,
    ops: Vec<OpRecord>,
    index: HashMap<u64, usize>,
}

impl History {
    /// Load the history log, replaying undo markers onto their records.
    pub fn open(path: PathBuf) -> Result<Self> {
        let mut ops: Vec<OpRecord> = Vec::new();
        let mut index: HashMap<u64, usize> = HashMap::new();

        if path.exists() {
            let content = fs::read_to_string(&path).map_err(|e| JanusError::io(&path, e))?;
            for (lineno, line) in content.lines().enumerate() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let parsed: LogLine = serde_json::from_str(line).map_err(|e| {
                    JanusError::InvalidState(format!(
                        "corrupt history line {}: {e}",
                        lineno + 1
                    ))
                })?;
                match parsed {
                    LogLine::Op { op } => {
                        index.insert(op.id, ops.len());
                        ops.push(*op);
                    }
                    LogLine::Undo {
                        op_id, undone_by, ..
                    } => {
                        let slot = index.get(&op_id).copied().ok_or_else(|| {
                            JanusError::InvalidState(format!(
                                "undo marker for unknown operation {op_id}"
                            ))
                        })?;
                        ops[slot].undone = true;
                        ops[slot].undone_by = Some(undone_by);
                    }
                }
            }
        }

        Ok(Self { path, ops, index })
    }

    /// Append one operation record.
    pub fn append(&mut self, op: OpRecord) -> Result<()> {
        if self.ops.len() >= MAX_HISTORY {
            return Err(JanusError::ResourceExhausted(format!(
                "history holds {MAX_HISTORY} operations"
            )));
        }
        self.write_line(&LogLine::Op {
            op: Box::new(op.clone()),
        })?;
        self.index.insert(op.id, self.ops.len());
        self.ops.push(op);
        Ok(())
    }

    /// Mark a record undone by appending a marker line.
    pub fn mark_undone(&mut self, op_id: u64, undone_by: u64) -> Result<()> {
        let slot = self
            .index
            .get(&op_id)
            .copied()
            .ok_or_else(|| JanusError::NotFound(format!("operation {op_id}")))?;
        self.write_line(&LogLine::Undo {
            op_id,
            undone_by,
            timestamp: Utc::now(),
        })?;
        self.ops[slot].undone = true;
        self.ops[slot].undone_by = Some(undone_by);
        Ok(())
    }

    fn write_line(&self, line: &LogLine) -> Result<()> {
        let json = serde_json::to_string(line)
            .map_err(|e| JanusError::InvalidState(format!("history serialization: {e}")))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| JanusError::io(&self.path, e))?;
        writeln!(file, "{json}").map_err(|e| JanusError::io(&self.path, e))?;
        file.sync_all().map_err(|e| JanusError::io(&self.path, e))?;
        Ok(())
    }

    /// Look up a record by id.
    #[must_use]
    pub fn get(&self, id: u64) -> Option<&OpRecord> {
        self.index.get(&id).map(|&slot| &self.ops[slot])
    }

    /// Most recent record that has not been undone.
    #[must_use]
    pub fn last_undoable(&self) -> Option<&OpRecord> {
        self.ops.iter().rev().find(|op| !op.undone)
    }

    /// All records in application order.
    #[must_use]
    pub fn ops(&self) -> &[OpRecord] {
        &self.ops
    }

    /// Records belonging to a transaction, in application order.
    #[must_use]
    pub fn ops_for_txn(&self, txn: u64) -> Vec<&OpRecord> {
        self.ops.iter().filter(|op| op.txn == Some(txn)).collect()
    }

    /// Records whose metadata points at a digest.
    #[must_use]
    pub fn referencing(&self, hash: &ContentHash) -> Vec<&OpRecord> {
        self.ops.iter().filter(|op| op.references(hash)).collect()
    }

    /// Records of a given kind.
    #[must_use]
    pub fn by_kind(&self, kind: OpKind) -> Vec<&OpRecord> {
        self.ops.iter().filter(|op| op.kind == kind).collect()
    }

    /// Records touching a path.
    #[must_use]
    pub fn by_path(&self, rel: &Path) -> Vec<&OpRecord> {
        self.ops
            .iter()
            .filter(|op| op.paths().contains(&rel))
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::hash_bytes;
    use tempfile::TempDir;

    fn record(id: u64, kind: OpKind, path: &str) -> OpRecord {
        OpRecord {
            id,
            kind,
            timestamp: Utc::now(),
            path: PathBuf::from(path),
            secondary: None,
            pre_hash: None,
            post_hash: None,
            pre_meta: None,
            pre_size: None,
            txn: None,
            undone: false,
            undone_by: None,
        }
    }

    #[test]
    fn append_and_reload() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("history.jsonl");

        {
            let mut history = History::open(path.clone()).expect("open");
            let mut op = record(1, OpKind::Delete, "a.txt");
            op.pre_hash = Some(hash_bytes(b"hello"));
            history.append(op).expect("append");
            history.append(record(2, OpKind::Create, "b.txt")).expect("append");
            history.mark_undone(1, 3).expect("mark");
        }

        let history = History::open(path).expect("reopen");
        assert_eq!(history.len(), 2);
        assert!(history.get(1).expect("op 1").undone);
        assert_eq!(history.get(1).expect("op 1").undone_by, Some(3));
        assert!(!history.get(2).expect("op 2").undone);
    }

    #[test]
    fn log_is_append_only() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("history.jsonl");
        let mut history = History::open(path.clone()).expect("open");
        history.append(record(1, OpKind::Create, "a.txt")).expect("append");
        let after_one = fs::read_to_string(&path).expect("read");

        history.mark_undone(1, 2).expect("mark");
        let after_mark = fs::read_to_string(&path).expect("read");

        // The original record line is untouched; the marker is appended
        assert!(after_mark.starts_with(&after_one));
        assert_eq!(after_mark.lines().count(), 2);
    }

    #[test]
    fn last_undoable_skips_undone() {
        let dir = TempDir::new().expect("tempdir");
        let mut history = History::open(dir.path().join("h.jsonl")).expect("open");
        history.append(record(1, OpKind::Create, "a")).expect("a");
        history.append(record(2, OpKind::Create, "b")).expect("b");
        history.mark_undone(2, 3).expect("mark");

        assert_eq!(history.last_undoable().expect("last").id, 1);
    }

    #[test]
    fn sufficiency_per_kind() {
        let mut op = record(1, OpKind::Delete, "a.txt");
        assert!(matches!(
            op.check_sufficient(),
            Err(JanusError::InsufficientMetadata { field: "pre_hash", .. })
        ));

        op.pre_hash = Some(hash_bytes(b"x"));
        assert!(matches!(
            op.check_sufficient(),
            Err(JanusError::InsufficientMetadata { field: "pre_meta", .. })
        ));

        let mut mv = record(2, OpKind::Move, "src");
        assert!(mv.check_sufficient().is_err());
        mv.secondary = Some(PathBuf::from("dst"));
        assert!(mv.check_sufficient().is_ok());

        let mut append = record(3, OpKind::Append, "log.txt");
        assert!(append.check_sufficient().is_err());
        append.pre_size = Some(10);
        assert!(append.check_sufficient().is_ok());

        assert!(record(4, OpKind::Mkdir, "dir").check_sufficient().is_ok());
    }

    #[test]
    fn independence_is_path_disjointness() {
        let a = record(1, OpKind::Delete, "a.txt");
        let b = record(2, OpKind::Delete, "b.txt");
        assert!(a.independent(&b));

        let mut mv = record(3, OpKind::Move, "x");
        mv.secondary = Some(PathBuf::from("a.txt"));
        assert!(!mv.independent(&a));
        assert!(mv.independent(&b));
    }

    #[test]
    fn marker_for_unknown_op_is_rejected_on_load() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("h.jsonl");
        fs::write(
            &path,
            "{\"entry\":\"undo\",\"op_id\":42,\"undone_by\":43,\"timestamp\":\"2026-01-01T00:00:00Z\"}\n",
        )
        .expect("write");
        assert!(matches!(
            History::open(path),
            Err(JanusError::InvalidState(_))
        ));
    }
}
