//! The operation engine
//!
//! One `Engine` value owns all mutable state for a managed root: the
//! content store, the file-system model, the history log, transaction
//! state, and the obliteration audit log. Applies check every
//! precondition before mutating anything; a failure after a partial
//! effect is compensated before the error is surfaced, so each single
//! operation is atomically visible.

use crate::error::{JanusError, Result};
use crate::hash::{self, ContentHash};
use crate::history::{History, OpKind, OpRecord};
use crate::obliterate::{
    AuditLog, ErasureRequest, ErasureResponse, ObliterationProof, ObliterationRecord,
    MIN_OVERWRITE_PASSES,
};
use crate::store::{atomic_write, ContentStore, RemovalState};
use crate::tree::{canonical_rel, FileMeta, TreeEntry, TreeIndex, META_DIR};
use crate::txn::{TxnInfo, TxnState};
use chrono::Utc;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Lifecycle state of an operation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    /// Applied and undoable (given its content is still available)
    Applied,
    /// Undone; terminal
    Undone,
    /// A digest the record points at was obliterated; undo will fail
    ObliteratedRef,
}

/// Summary counters for the `status` verb.
#[derive(Debug, Clone)]
pub struct EngineStatus {
    pub tracked_entries: usize,
    pub store_objects: usize,
    pub store_bytes: u64,
    pub history_len: usize,
    pub obliterations: usize,
    pub active_txn: Option<u64>,
}

/// The reversible-operation engine for one managed root.
pub struct Engine {
    root: PathBuf,
    store: ContentStore,
    tree: TreeIndex,
    history: History,
    txn: TxnState,
    audit: AuditLog,
    min_passes: u32,
}

impl Engine {
    /// Initialize a managed root: create the metadata subtree and open
    /// the engine. Idempotent on an already-managed directory.
    pub fn init(root: &Path) -> Result<Self> {
        let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
        let meta = root.join(META_DIR);
        fs::create_dir_all(&meta).map_err(|e| JanusError::io(&meta, e))?;
        Self::open(&root)
    }

    /// Open an existing managed root.
    pub fn open(root: &Path) -> Result<Self> {
        let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
        let meta = root.join(META_DIR);
        if !meta.exists() {
            return Err(JanusError::NotInitialized(root));
        }

        let store = ContentStore::open(meta.join("content"))?;
        let history = History::open(meta.join("history.jsonl"))?;
        let txn = TxnState::open(meta.join("state.json"))?;
        let audit = AuditLog::open(meta.join("obliterations.jsonl"))?;
        let tree = TreeIndex::scan(&root)?;

        Ok(Self {
            root,
            store,
            tree,
            history,
            txn,
            audit,
            min_passes: MIN_OVERWRITE_PASSES,
        })
    }

    /// Whether a directory is managed.
    #[must_use]
    pub fn is_initialized(root: &Path) -> bool {
        root.join(META_DIR).exists()
    }

    /// Raise the overwrite pass count. Values below the floor are
    /// clamped up.
    pub fn set_min_passes(&mut self, passes: u32) {
        self.min_passes = passes.max(MIN_OVERWRITE_PASSES);
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn history(&self) -> &History {
        &self.history
    }

    #[must_use]
    pub fn store(&self) -> &ContentStore {
        &self.store
    }

    #[must_use]
    pub fn tree(&self) -> &TreeIndex {
        &self.tree
    }

    #[must_use]
    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Summary counters for status output.
    #[must_use]
    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            tracked_entries: self.tree.len_existing(),
            store_objects: self.store.count(),
            store_bytes: self.store.total_size(),
            history_len: self.history.len(),
            obliterations: self.audit.len(),
            active_txn: self.txn.active().map(|t| t.id),
        }
    }

    /// Check the validity invariant of the managed state.
    pub fn verify(&self) -> Result<()> {
        self.tree.verify(&self.root)
    }

    /// Whether a path currently exists in the managed tree.
    pub fn exists(&self, path: &Path) -> Result<bool> {
        let rel = self.rel(path)?;
        Ok(self.tree.exists(&rel))
    }

    /// Content digest of an existing file.
    pub fn get_hash(&self, path: &Path) -> Result<Option<ContentHash>> {
        let rel = self.rel(path)?;
        Ok(self.tree.get_hash(&rel))
    }

    /// Content of an existing file; `None` for absent paths and
    /// non-files.
    pub fn get_content(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        let rel = self.rel(path)?;
        if !self.tree.exists(&rel) {
            return Ok(None);
        }
        let abs = self.abs(&rel);
        if !abs.is_file() {
            return Ok(None);
        }
        let content = fs::read(&abs).map_err(|e| JanusError::io(&abs, e))?;
        Ok(Some(content))
    }

    fn rel(&self, path: &Path) -> Result<PathBuf> {
        canonical_rel(&self.root, path)
    }

    fn abs(&self, rel: &Path) -> PathBuf {
        self.root.join(rel)
    }

    /// Stage a pre- or post-image into the store, tolerating digests
    /// that were obliterated earlier: the digest is still recorded in
    /// metadata (so a later undo fails `ContentUnavailable` instead of
    /// silently resurrecting erased content).
    fn stage(&self, content: &[u8]) -> Result<ContentHash> {
        match self.store.store(content) {
            Ok(hash) => Ok(hash),
            Err(JanusError::ContentUnavailable(hash)) => {
                tracing::warn!("digest {} is obliterated; staging skipped", hash);
                Ok(hash)
            }
            Err(e) => Err(e),
        }
    }

    fn record(&mut self, kind: OpKind, path: PathBuf) -> Result<OpRecord> {
        let id = self.txn.next_id()?;
        Ok(OpRecord {
            id,
            kind,
            timestamp: Utc::now(),
            path,
            secondary: None,
            pre_hash: None,
            post_hash: None,
            pre_meta: None,
            pre_size: None,
            txn: self.txn.active().map(|t| t.id),
            undone: false,
            undone_by: None,
        })
    }

    /// Append the record and enroll it in the active transaction. On
    /// append failure, runs `compensate` to reverse the filesystem
    /// effect before surfacing the error.
    fn finish(&mut self, record: OpRecord, compensate: impl FnOnce()) -> Result<OpRecord> {
        if let Err(e) = self.history.append(record.clone()) {
            compensate();
            return Err(e);
        }
        self.txn.record_op(record.id)?;
        tracing::debug!("applied {} {} (op {})", record.kind, record.path.display(), record.id);
        Ok(record)
    }

    // ------------------------------------------------------------------
    // Applies
    // ------------------------------------------------------------------

    /// Create a new file. Fails with `AlreadyExists` if the path is
    /// present.
    pub fn apply_create(&mut self, path: &Path, content: &[u8]) -> Result<OpRecord> {
        let rel = self.rel(path)?;
        let abs = self.abs(&rel);
        if self.tree.exists(&rel) || abs.symlink_metadata().is_ok() {
            return Err(JanusError::AlreadyExists(rel));
        }

        let post_hash = self.stage(content)?;
        let mut record = self.record(OpKind::Create, rel.clone())?;
        record.post_hash = Some(post_hash);

        if let Some(parent) = abs.parent() {
            fs::create_dir_all(parent).map_err(|e| JanusError::io(parent, e))?;
        }
        atomic_write(&abs, content)?;
        let meta = match FileMeta::capture(&abs) {
            Ok(m) => m,
            Err(e) => {
                let _ = fs::remove_file(&abs);
                return Err(e);
            }
        };

        let abs_for_undo = abs.clone();
        let record = self.finish(record, move || {
            let _ = fs::remove_file(&abs_for_undo);
        })?;
        self.tree.upsert(rel, TreeEntry::file(post_hash, meta));
        Ok(record)
    }

    /// Delete a file, staging its content for reversal.
    pub fn apply_delete(&mut self, path: &Path) -> Result<OpRecord> {
        let rel = self.rel(path)?;
        let abs = self.abs(&rel);
        if !self.tree.exists(&rel) && !abs.exists() {
            return Err(JanusError::NotFound(rel.display().to_string()));
        }

        let content = fs::read(&abs).map_err(|e| JanusError::io(&abs, e))?;
        let meta = FileMeta::capture(&abs)?;
        let pre_hash = self.stage(&content)?;

        let mut record = self.record(OpKind::Delete, rel.clone())?;
        record.pre_hash = Some(pre_hash);
        record.pre_meta = Some(meta.clone());

        fs::remove_file(&abs).map_err(|e| JanusError::io(&abs, e))?;

        let record = self.finish(record, move || {
            let _ = atomic_write(&abs, &content);
            let _ = meta.apply(&abs);
        })?;
        self.tree.hollow(&rel);
        Ok(record)
    }

    /// Replace a file's content, staging the pre-image.
    pub fn apply_modify(&mut self, path: &Path, new_content: &[u8]) -> Result<OpRecord> {
        let rel = self.rel(path)?;
        let abs = self.abs(&rel);
        if !self.tree.exists(&rel) && !abs.exists() {
            return Err(JanusError::NotFound(rel.display().to_string()));
        }

        let original = fs::read(&abs).map_err(|e| JanusError::io(&abs, e))?;
        let meta = FileMeta::capture(&abs)?;
        let pre_hash = self.stage(&original)?;
        let post_hash = self.stage(new_content)?;

        let mut record = self.record(OpKind::Modify, rel.clone())?;
        record.pre_hash = Some(pre_hash);
        record.post_hash = Some(post_hash);
        record.pre_meta = Some(meta.clone());

        // In-place write keeps the inode and its permissions
        fs::write(&abs, new_content).map_err(|e| JanusError::io(&abs, e))?;

        let abs_c = abs.clone();
        let record = self.finish(record, move || {
            let _ = fs::write(&abs_c, &original);
        })?;
        self.tree.upsert(rel, TreeEntry::file(post_hash, meta));
        Ok(record)
    }

    /// Move a file. Fails `NotFound` for an absent source and
    /// `AlreadyExists` for a present destination.
    pub fn apply_move(&mut self, source: &Path, destination: &Path) -> Result<OpRecord> {
        let rel_src = self.rel(source)?;
        let rel_dst = self.rel(destination)?;
        let abs_src = self.abs(&rel_src);
        let abs_dst = self.abs(&rel_dst);

        if !self.tree.exists(&rel_src) && !abs_src.exists() {
            return Err(JanusError::NotFound(rel_src.display().to_string()));
        }
        if self.tree.exists(&rel_dst) || abs_dst.symlink_metadata().is_ok() {
            return Err(JanusError::AlreadyExists(rel_dst));
        }

        let entry = self.tree.find(&rel_src).cloned();
        let mut record = self.record(OpKind::Move, rel_src.clone())?;
        record.secondary = Some(rel_dst.clone());

        if let Some(parent) = abs_dst.parent() {
            fs::create_dir_all(parent).map_err(|e| JanusError::io(parent, e))?;
        }
        fs::rename(&abs_src, &abs_dst).map_err(|e| JanusError::io(&abs_src, e))?;

        let (abs_src_c, abs_dst_c) = (abs_src.clone(), abs_dst.clone());
        let record = self.finish(record, move || {
            let _ = fs::rename(&abs_dst_c, &abs_src_c);
        })?;

        let entry = entry.unwrap_or_else(|| {
            // Source was on disk but not yet indexed; rebuild its entry
            rebuild_entry(&abs_dst)
        });
        self.tree.upsert(rel_dst, entry);
        self.tree.hollow(&rel_src);
        Ok(record)
    }

    /// Copy a file. The inverse is deleting the copy.
    pub fn apply_copy(&mut self, source: &Path, destination: &Path) -> Result<OpRecord> {
        let rel_src = self.rel(source)?;
        let rel_dst = self.rel(destination)?;
        let abs_src = self.abs(&rel_src);
        let abs_dst = self.abs(&rel_dst);

        if !self.tree.exists(&rel_src) && !abs_src.exists() {
            return Err(JanusError::NotFound(rel_src.display().to_string()));
        }
        if self.tree.exists(&rel_dst) || abs_dst.symlink_metadata().is_ok() {
            return Err(JanusError::AlreadyExists(rel_dst));
        }

        let mut record = self.record(OpKind::Copy, rel_src.clone())?;
        record.secondary = Some(rel_dst.clone());

        if let Some(parent) = abs_dst.parent() {
            fs::create_dir_all(parent).map_err(|e| JanusError::io(parent, e))?;
        }
        fs::copy(&abs_src, &abs_dst).map_err(|e| JanusError::io(&abs_src, e))?;

        let abs_dst_c = abs_dst.clone();
        let record = self.finish(record, move || {
            let _ = fs::remove_file(&abs_dst_c);
        })?;
        self.tree.upsert(rel_dst, rebuild_entry(&abs_dst));
        Ok(record)
    }

    /// Change permission bits, recording the prior metadata.
    #[cfg(unix)]
    pub fn apply_chmod(&mut self, path: &Path, mode: u32) -> Result<OpRecord> {
        use std::os::unix::fs::PermissionsExt;

        let rel = self.rel(path)?;
        let abs = self.abs(&rel);
        if !self.tree.exists(&rel) && !abs.exists() {
            return Err(JanusError::NotFound(rel.display().to_string()));
        }

        let meta = FileMeta::capture(&abs)?;
        let mut record = self.record(OpKind::Chmod, rel.clone())?;
        record.pre_meta = Some(meta.clone());

        fs::set_permissions(&abs, fs::Permissions::from_mode(mode))
            .map_err(|e| JanusError::io(&abs, e))?;

        let abs_c = abs.clone();
        let old_mode = meta.permissions;
        let record = self.finish(record, move || {
            let _ = fs::set_permissions(&abs_c, fs::Permissions::from_mode(old_mode));
        })?;

        let mut new_meta = meta;
        new_meta.permissions = mode;
        let hash = self.tree.get_hash(&rel);
        self.tree.upsert(
            rel,
            TreeEntry {
                hash,
                meta: Some(new_meta),
                exists: true,
            },
        );
        Ok(record)
    }

    #[cfg(not(unix))]
    pub fn apply_chmod(&mut self, _path: &Path, _mode: u32) -> Result<OpRecord> {
        Err(JanusError::InvalidState(
            "chmod is not supported on this platform".to_string(),
        ))
    }

    /// Create a directory (parents must already exist).
    pub fn apply_mkdir(&mut self, path: &Path) -> Result<OpRecord> {
        let rel = self.rel(path)?;
        let abs = self.abs(&rel);
        if self.tree.exists(&rel) || abs.exists() {
            return Err(JanusError::AlreadyExists(rel));
        }

        let record = self.record(OpKind::Mkdir, rel.clone())?;
        fs::create_dir(&abs).map_err(|e| JanusError::io(&abs, e))?;

        let abs_c = abs.clone();
        let record = self.finish(record, move || {
            let _ = fs::remove_dir(&abs_c);
        })?;
        let meta = FileMeta::capture(&abs)?;
        self.tree.upsert(rel, TreeEntry::other(meta));
        Ok(record)
    }

    /// Remove an empty directory.
    pub fn apply_rmdir(&mut self, path: &Path) -> Result<OpRecord> {
        let rel = self.rel(path)?;
        let abs = self.abs(&rel);
        if !self.tree.exists(&rel) && !abs.exists() {
            return Err(JanusError::NotFound(rel.display().to_string()));
        }
        if !abs.is_dir() {
            return Err(JanusError::NotFound(format!(
                "directory {}",
                rel.display()
            )));
        }

        let meta = FileMeta::capture(&abs)?;
        let mut record = self.record(OpKind::Rmdir, rel.clone())?;
        record.pre_meta = Some(meta);

        fs::remove_dir(&abs).map_err(|e| JanusError::io(&abs, e))?;

        let abs_c = abs.clone();
        let record = self.finish(record, move || {
            let _ = fs::create_dir(&abs_c);
        })?;
        self.tree.hollow(&rel);
        Ok(record)
    }

    /// Create a symbolic link at `link` pointing at `target`.
    #[cfg(unix)]
    pub fn apply_symlink(&mut self, target: &Path, link: &Path) -> Result<OpRecord> {
        let rel_link = self.rel(link)?;
        let abs_link = self.abs(&rel_link);
        if self.tree.exists(&rel_link) || abs_link.symlink_metadata().is_ok() {
            return Err(JanusError::AlreadyExists(rel_link));
        }

        let mut record = self.record(OpKind::Symlink, rel_link.clone())?;
        record.secondary = Some(target.to_path_buf());

        if let Some(parent) = abs_link.parent() {
            fs::create_dir_all(parent).map_err(|e| JanusError::io(parent, e))?;
        }
        std::os::unix::fs::symlink(target, &abs_link)
            .map_err(|e| JanusError::io(&abs_link, e))?;

        let abs_c = abs_link.clone();
        let record = self.finish(record, move || {
            let _ = fs::remove_file(&abs_c);
        })?;
        let meta = FileMeta::capture(&abs_link)?;
        self.tree.upsert(rel_link, TreeEntry::other(meta));
        Ok(record)
    }

    #[cfg(not(unix))]
    pub fn apply_symlink(&mut self, _target: &Path, _link: &Path) -> Result<OpRecord> {
        Err(JanusError::InvalidState(
            "symlinks are not supported on this platform".to_string(),
        ))
    }

    /// Append bytes to a file, recording the prior size for truncation
    /// undo.
    pub fn apply_append(&mut self, path: &Path, content: &[u8]) -> Result<OpRecord> {
        let rel = self.rel(path)?;
        let abs = self.abs(&rel);
        if !self.tree.exists(&rel) && !abs.exists() {
            return Err(JanusError::NotFound(rel.display().to_string()));
        }

        let pre_size = fs::metadata(&abs).map_err(|e| JanusError::io(&abs, e))?.len();
        // Stage the appended chunk so the forward image stays auditable
        self.stage(content)?;

        let mut record = self.record(OpKind::Append, rel.clone())?;
        record.pre_size = Some(pre_size);

        let mut file = OpenOptions::new()
            .append(true)
            .open(&abs)
            .map_err(|e| JanusError::io(&abs, e))?;
        file.write_all(content).map_err(|e| JanusError::io(&abs, e))?;
        file.sync_all().map_err(|e| JanusError::io(&abs, e))?;
        drop(file);

        let abs_c = abs.clone();
        let record = self.finish(record, move || {
            let _ = truncate_file(&abs_c, pre_size);
        })?;
        self.tree.upsert(rel, rebuild_entry(&abs));
        Ok(record)
    }

    /// Truncate a file to `new_size`, staging the full prior content.
    pub fn apply_truncate(&mut self, path: &Path, new_size: u64) -> Result<OpRecord> {
        let rel = self.rel(path)?;
        let abs = self.abs(&rel);
        if !self.tree.exists(&rel) && !abs.exists() {
            return Err(JanusError::NotFound(rel.display().to_string()));
        }

        let original = fs::read(&abs).map_err(|e| JanusError::io(&abs, e))?;
        let pre_hash = self.stage(&original)?;

        let mut record = self.record(OpKind::Truncate, rel.clone())?;
        record.pre_hash = Some(pre_hash);
        record.pre_size = Some(original.len() as u64);

        truncate_file(&abs, new_size)?;

        let abs_c = abs.clone();
        let record = self.finish(record, move || {
            let _ = fs::write(&abs_c, &original);
        })?;
        self.tree.upsert(rel, rebuild_entry(&abs));
        Ok(record)
    }

    /// Update a file's mtime, creating an empty file if absent.
    pub fn apply_touch(&mut self, path: &Path) -> Result<OpRecord> {
        let rel = self.rel(path)?;
        let abs = self.abs(&rel);
        let existed = self.tree.exists(&rel) || abs.exists();

        let mut record = self.record(OpKind::Touch, rel.clone())?;

        if existed {
            let meta = FileMeta::capture(&abs)?;
            record.pre_meta = Some(meta.clone());

            filetime::set_file_mtime(&abs, filetime::FileTime::now())
                .map_err(|e| JanusError::io(&abs, e))?;

            let abs_c = abs.clone();
            let record = self.finish(record, move || {
                let prior = filetime::FileTime::from_unix_time(meta.modified.timestamp(), 0);
                let _ = filetime::set_file_mtime(&abs_c, prior);
            })?;
            self.tree.upsert(rel, rebuild_entry(&abs));
            Ok(record)
        } else {
            if let Some(parent) = abs.parent() {
                fs::create_dir_all(parent).map_err(|e| JanusError::io(parent, e))?;
            }
            atomic_write(&abs, b"")?;

            let abs_c = abs.clone();
            let record = self.finish(record, move || {
                let _ = fs::remove_file(&abs_c);
            })?;
            let meta = FileMeta::capture(&abs)?;
            self.tree
                .upsert(rel, TreeEntry::file(hash::null_hash(), meta));
            Ok(record)
        }
    }

    // ------------------------------------------------------------------
    // Undo
    // ------------------------------------------------------------------

    /// Undo one operation by id.
    ///
    /// Preconditions are checked before any mutation: the record must
    /// exist, not be undone already, carry sufficient metadata for its
    /// kind, and every digest its inverse needs must be retrievable.
    /// Otherwise `ContentUnavailable` is returned with the state
    /// unchanged.
    pub fn undo(&mut self, id: u64) -> Result<()> {
        let record = self
            .history
            .get(id)
            .cloned()
            .ok_or_else(|| JanusError::NotFound(format!("operation {id}")))?;

        if record.undone {
            return Err(JanusError::Conflict(format!(
                "operation {id} is already undone"
            )));
        }
        record.check_sufficient()?;

        for hash in record.required_hashes() {
            if !self.store.exists(&hash) {
                return Err(JanusError::ContentUnavailable(hash));
            }
        }

        match record.kind {
            OpKind::Create => self.undo_create(&record)?,
            OpKind::Delete => self.undo_restore_content(&record)?,
            OpKind::Modify => self.undo_restore_content(&record)?,
            OpKind::Move => self.undo_move(&record)?,
            OpKind::Copy => self.undo_copy(&record)?,
            OpKind::Chmod => self.undo_chmod(&record)?,
            OpKind::Mkdir => self.undo_mkdir(&record)?,
            OpKind::Rmdir => self.undo_rmdir(&record)?,
            OpKind::Symlink => self.undo_symlink(&record)?,
            OpKind::Append => self.undo_append(&record)?,
            OpKind::Truncate => self.undo_restore_content(&record)?,
            OpKind::Touch => self.undo_touch(&record)?,
        }

        let marker = self.txn.next_id()?;
        self.history.mark_undone(id, marker)?;
        tracing::debug!("undid {} {} (op {})", record.kind, record.path.display(), id);
        Ok(())
    }

    /// Undo the most recent not-undone operation; returns its id.
    pub fn undo_last(&mut self) -> Result<u64> {
        let id = self
            .history
            .last_undoable()
            .map(|op| op.id)
            .ok_or_else(|| JanusError::NotFound("nothing to undo".to_string()))?;
        self.undo(id)?;
        Ok(id)
    }

    /// Undo a list of operations in reverse application order.
    pub fn undo_sequence(&mut self, ids: &[u64]) -> Result<()> {
        for &id in ids.iter().rev() {
            self.undo(id)?;
        }
        Ok(())
    }

    fn undo_create(&mut self, record: &OpRecord) -> Result<()> {
        let abs = self.abs(&record.path);
        fs::remove_file(&abs).map_err(|e| JanusError::io(&abs, e))?;
        self.tree.hollow(&record.path);
        Ok(())
    }

    /// Shared inverse for delete, modify, and truncate: write the
    /// staged pre-image back and restore recorded metadata.
    fn undo_restore_content(&mut self, record: &OpRecord) -> Result<()> {
        let pre_hash = record.pre_hash.ok_or(JanusError::InsufficientMetadata {
            id: record.id,
            field: "pre_hash",
        })?;
        let content = self
            .store
            .retrieve(&pre_hash)?
            .ok_or(JanusError::ContentUnavailable(pre_hash))?;

        let abs = self.abs(&record.path);
        if let Some(parent) = abs.parent() {
            fs::create_dir_all(parent).map_err(|e| JanusError::io(parent, e))?;
        }
        atomic_write(&abs, &content)?;
        if let Some(meta) = &record.pre_meta {
            meta.apply(&abs)?;
        }

        let meta = FileMeta::capture(&abs)?;
        self.tree
            .upsert(record.path.clone(), TreeEntry::file(pre_hash, meta));
        Ok(())
    }

    fn undo_move(&mut self, record: &OpRecord) -> Result<()> {
        let dst = record
            .secondary
            .as_ref()
            .ok_or(JanusError::InsufficientMetadata {
                id: record.id,
                field: "secondary",
            })?;
        let abs_src = self.abs(&record.path);
        let abs_dst = self.abs(dst);

        fs::rename(&abs_dst, &abs_src).map_err(|e| JanusError::io(&abs_dst, e))?;

        let entry = self
            .tree
            .find(dst)
            .cloned()
            .unwrap_or_else(|| rebuild_entry(&abs_src));
        self.tree.upsert(record.path.clone(), entry);
        self.tree.hollow(dst);
        Ok(())
    }

    fn undo_copy(&mut self, record: &OpRecord) -> Result<()> {
        let dst = record
            .secondary
            .as_ref()
            .ok_or(JanusError::InsufficientMetadata {
                id: record.id,
                field: "secondary",
            })?;
        let abs_dst = self.abs(dst);
        fs::remove_file(&abs_dst).map_err(|e| JanusError::io(&abs_dst, e))?;
        self.tree.hollow(dst);
        Ok(())
    }

    fn undo_chmod(&mut self, record: &OpRecord) -> Result<()> {
        let meta = record
            .pre_meta
            .as_ref()
            .ok_or(JanusError::InsufficientMetadata {
                id: record.id,
                field: "pre_meta",
            })?;
        let abs = self.abs(&record.path);
        meta.apply(&abs)?;
        self.tree.upsert(record.path.clone(), rebuild_entry(&abs));
        Ok(())
    }

    fn undo_mkdir(&mut self, record: &OpRecord) -> Result<()> {
        let abs = self.abs(&record.path);
        fs::remove_dir(&abs).map_err(|e| JanusError::io(&abs, e))?;
        self.tree.hollow(&record.path);
        Ok(())
    }

    fn undo_rmdir(&mut self, record: &OpRecord) -> Result<()> {
        let abs = self.abs(&record.path);
        fs::create_dir(&abs).map_err(|e| JanusError::io(&abs, e))?;
        if let Some(meta) = &record.pre_meta {
            meta.apply(&abs)?;
        }
        let meta = FileMeta::capture(&abs)?;
        self.tree.upsert(record.path.clone(), TreeEntry::other(meta));
        Ok(())
    }

    fn undo_symlink(&mut self, record: &OpRecord) -> Result<()> {
        let abs = self.abs(&record.path);
        fs::remove_file(&abs).map_err(|e| JanusError::io(&abs, e))?;
        self.tree.hollow(&record.path);
        Ok(())
    }

    fn undo_append(&mut self, record: &OpRecord) -> Result<()> {
        let pre_size = record.pre_size.ok_or(JanusError::InsufficientMetadata {
            id: record.id,
            field: "pre_size",
        })?;
        let abs = self.abs(&record.path);
        truncate_file(&abs, pre_size)?;
        self.tree.upsert(record.path.clone(), rebuild_entry(&abs));
        Ok(())
    }

    fn undo_touch(&mut self, record: &OpRecord) -> Result<()> {
        let abs = self.abs(&record.path);
        match &record.pre_meta {
            Some(meta) => {
                // The file predated the touch: restore its identity
                meta.apply(&abs)?;
                let prior = filetime::FileTime::from_unix_time(meta.modified.timestamp(), 0);
                filetime::set_file_mtime(&abs, prior).map_err(|e| JanusError::io(&abs, e))?;
                self.tree.upsert(record.path.clone(), rebuild_entry(&abs));
            }
            None => {
                // The touch created the file: remove it
                fs::remove_file(&abs).map_err(|e| JanusError::io(&abs, e))?;
                self.tree.hollow(&record.path);
            }
        }
        Ok(())
    }

    /// Lifecycle state of a record: applied, undone, or pointing at an
    /// obliterated digest.
    pub fn record_state(&self, id: u64) -> Result<RecordState> {
        let record = self
            .history
            .get(id)
            .ok_or_else(|| JanusError::NotFound(format!("operation {id}")))?;
        if record.undone {
            return Ok(RecordState::Undone);
        }
        // A record whose undo depends on an obliterated digest is stuck
        let obliterated = record
            .required_hashes()
            .iter()
            .any(|h| self.store.removal_state(h) == RemovalState::Obliterated);
        if obliterated {
            Ok(RecordState::ObliteratedRef)
        } else {
            Ok(RecordState::Applied)
        }
    }

    // ------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------

    /// Begin a transaction. Fails `Conflict` while one is active.
    pub fn begin(&mut self) -> Result<u64> {
        self.txn.begin()
    }

    /// Commit the active transaction: freeze it, no structural effect.
    pub fn commit(&mut self) -> Result<TxnInfo> {
        self.txn.commit()
    }

    /// Roll back the active transaction by undoing its operations in
    /// reverse order. Records already undone individually are skipped.
    pub fn rollback(&mut self) -> Result<TxnInfo> {
        let op_ids: Vec<u64> = self
            .txn
            .active()
            .map(|t| t.op_ids.clone())
            .ok_or_else(|| JanusError::Conflict("no active transaction".to_string()))?;

        // Undo before closing the transaction: a failed undo leaves it
        // active so the rollback can be retried.
        for &op_id in op_ids.iter().rev() {
            let already_undone = self
                .history
                .get(op_id)
                .map(|op| op.undone)
                .unwrap_or(true);
            if already_undone {
                continue;
            }
            self.undo(op_id)?;
        }

        self.txn.take_for_rollback()
    }

    /// Pending operations of the active transaction, in application
    /// order.
    pub fn preview(&self) -> Result<Vec<OpRecord>> {
        let active = self
            .txn
            .active()
            .ok_or_else(|| JanusError::Conflict("no active transaction".to_string()))?;
        Ok(active
            .op_ids
            .iter()
            .filter_map(|id| self.history.get(*id))
            .cloned()
            .collect())
    }

    /// Id of the active transaction, if any.
    #[must_use]
    pub fn active_txn(&self) -> Option<u64> {
        self.txn.active().map(|t| t.id)
    }

    // ------------------------------------------------------------------
    // Obliteration
    // ------------------------------------------------------------------

    /// Irrecoverably erase a stored payload: secure overwrite, store
    /// removal, proof, audit record. Not an operation in the reversible
    /// sense; it never appears in history.
    pub fn obliterate(
        &mut self,
        hash: &ContentHash,
        reason: Option<String>,
        legal_basis: Option<String>,
    ) -> Result<ObliterationRecord> {
        if !self.store.exists(hash) {
            return Err(JanusError::NotFound(format!("content {hash}")));
        }

        let passes = self.min_passes;
        self.store.remove_secure(hash, passes)?;

        let proof = ObliterationProof::build(*hash, passes);
        let record = ObliterationRecord {
            id: self.txn.next_id()?,
            content_hash: *hash,
            timestamp: proof.timestamp,
            reason,
            legal_basis,
            proof,
        };
        self.audit.append(record.clone())?;
        tracing::debug!("obliterated {} ({} passes)", hash, passes);
        Ok(record)
    }

    /// Obliterate several digests best-effort. Digests not present
    /// (never stored or already obliterated) are skipped. Completed
    /// sub-obliterations are never rolled back. Returns the success
    /// count and whether every attempted obliteration succeeded.
    pub fn obliterate_batch(
        &mut self,
        hashes: &[ContentHash],
        reason: Option<String>,
        legal_basis: Option<String>,
    ) -> (usize, bool) {
        let mut succeeded = 0;
        let mut all_ok = true;

        for hash in hashes {
            if !self.store.exists(hash) {
                tracing::debug!("skipping {} (not present)", hash);
                continue;
            }
            match self.obliterate(hash, reason.clone(), legal_basis.clone()) {
                Ok(_) => succeeded += 1,
                Err(e) => {
                    tracing::warn!("obliteration of {} failed: {}", hash, e);
                    all_ok = false;
                }
            }
        }

        (succeeded, all_ok)
    }

    /// Process a GDPR Article 17 erasure request by obliterating the
    /// named content with the subject id as the recorded reason.
    pub fn erase(&mut self, request: &ErasureRequest) -> Result<ErasureResponse> {
        let record = self.obliterate(
            &request.content_hash,
            Some(request.subject_id.clone()),
            Some(request.legal_basis.clone()),
        )?;
        Ok(ErasureResponse {
            record_id: record.id,
            proof: record.proof,
        })
    }

    /// Article 17 satisfaction predicate: content absent, matching
    /// audit record present, proof valid.
    #[must_use]
    pub fn satisfies_erasure(&self, request: &ErasureRequest) -> bool {
        !self.store.exists(&request.content_hash)
            && self
                .audit
                .find_by_hash(&request.content_hash)
                .iter()
                .any(|r| {
                    r.legal_basis.as_deref() == Some(request.legal_basis.as_str())
                        && r.proof.is_valid()
                })
    }

    /// Verify an audit record's proof by id.
    pub fn verify_proof(&self, record_id: u64) -> Result<bool> {
        self.audit.verify_proof(record_id)
    }
}

/// Rebuild a tree entry by inspecting the path on disk.
fn rebuild_entry(abs: &Path) -> TreeEntry {
    let Ok(meta) = FileMeta::capture(abs) else {
        return TreeEntry::default();
    };
    if abs.is_file() {
        match fs::read(abs) {
            Ok(content) => TreeEntry::file(hash::hash_bytes(&content), meta),
            Err(_) => TreeEntry::other(meta),
        }
    } else {
        TreeEntry::other(meta)
    }
}

fn truncate_file(abs: &Path, size: u64) -> Result<()> {
    let file = OpenOptions::new()
        .write(true)
        .open(abs)
        .map_err(|e| JanusError::io(abs, e))?;
    file.set_len(size).map_err(|e| JanusError::io(abs, e))?;
    file.sync_all().map_err(|e| JanusError::io(abs, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::hash_bytes;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Engine) {
        let dir = TempDir::new().expect("tempdir");
        let engine = Engine::init(dir.path()).expect("init");
        (dir, engine)
    }

    fn seed(engine: &mut Engine, path: &str, content: &[u8]) {
        engine
            .apply_create(Path::new(path), content)
            .expect("seed file");
    }

    fn read(engine: &Engine, path: &str) -> Vec<u8> {
        fs::read(engine.root().join(path)).expect("read file")
    }

    #[test]
    fn init_and_reopen() {
        let dir = TempDir::new().expect("tempdir");
        assert!(!Engine::is_initialized(dir.path()));

        let mut engine = Engine::init(dir.path()).expect("init");
        assert!(Engine::is_initialized(dir.path()));
        seed(&mut engine, "a.txt", b"alpha");
        drop(engine);

        let engine = Engine::open(dir.path()).expect("reopen");
        assert!(engine.tree().exists(Path::new("a.txt")));
        assert_eq!(engine.history().len(), 1);
    }

    #[test]
    fn open_unmanaged_directory_fails() {
        let dir = TempDir::new().expect("tempdir");
        assert!(matches!(
            Engine::open(dir.path()),
            Err(JanusError::NotInitialized(_))
        ));
    }

    // ------------------------------------------------------------------
    // End-to-end scenarios
    // ------------------------------------------------------------------

    #[test]
    fn delete_then_undo_restores_content() {
        let (_dir, mut engine) = setup();
        seed(&mut engine, "a.txt", b"hello");

        let record = engine.apply_delete(Path::new("a.txt")).expect("delete");
        assert!(!engine.tree().exists(Path::new("a.txt")));
        assert!(engine.store().exists(&hash_bytes(b"hello")));

        engine.undo(record.id).expect("undo");
        assert_eq!(read(&engine, "a.txt"), b"hello");
        assert_eq!(
            engine.get_content(Path::new("a.txt")).expect("content"),
            Some(b"hello".to_vec())
        );
        assert_eq!(
            engine.get_hash(Path::new("a.txt")).expect("hash"),
            Some(hash_bytes(b"hello"))
        );

        let deletes = engine.history().by_kind(OpKind::Delete);
        assert_eq!(deletes.len(), 1);
        assert!(deletes[0].undone);
    }

    #[test]
    fn modify_then_undo_restores_content() {
        let (_dir, mut engine) = setup();
        seed(&mut engine, "c.txt", b"v1");

        let record = engine
            .apply_modify(Path::new("c.txt"), b"v2")
            .expect("modify");
        assert_eq!(read(&engine, "c.txt"), b"v2");
        assert!(engine.store().exists(&hash_bytes(b"v1")));

        engine.undo(record.id).expect("undo");
        assert_eq!(read(&engine, "c.txt"), b"v1");
    }

    #[test]
    fn move_then_undo_restores_both_paths() {
        let (_dir, mut engine) = setup();
        seed(&mut engine, "x", b"data");

        let record = engine
            .apply_move(Path::new("x"), Path::new("y"))
            .expect("move");
        assert!(!engine.exists(Path::new("x")).expect("x"));
        assert!(engine.exists(Path::new("y")).expect("y"));
        assert_eq!(
            engine.get_hash(Path::new("y")).expect("hash"),
            Some(hash_bytes(b"data"))
        );

        engine.undo(record.id).expect("undo");
        assert!(engine.tree().exists(Path::new("x")));
        assert!(!engine.tree().exists(Path::new("y")));
    }

    #[test]
    fn transaction_rollback_restores_pre_txn_state() {
        let (_dir, mut engine) = setup();
        seed(&mut engine, "a.txt", b"aaa");
        seed(&mut engine, "b.txt", b"old");

        engine.begin().expect("begin");
        engine.apply_delete(Path::new("a.txt")).expect("delete");
        engine
            .apply_modify(Path::new("b.txt"), b"new")
            .expect("modify");
        engine.apply_create(Path::new("c.txt"), b"x").expect("create");

        engine.rollback().expect("rollback");

        assert_eq!(read(&engine, "a.txt"), b"aaa");
        assert_eq!(read(&engine, "b.txt"), b"old");
        assert!(!engine.tree().exists(Path::new("c.txt")));
        assert!(engine.active_txn().is_none());
    }

    #[test]
    fn obliterate_blocks_undo() {
        let (_dir, mut engine) = setup();
        seed(&mut engine, "s.txt", b"secret");

        let delete = engine.apply_delete(Path::new("s.txt")).expect("delete");
        let hash = hash_bytes(b"secret");
        let record = engine
            .obliterate(&hash, Some("cleanup".to_string()), None)
            .expect("obliterate");
        assert!(record.proof.is_valid());

        match engine.undo(delete.id) {
            Err(JanusError::ContentUnavailable(h)) => assert_eq!(h, hash),
            other => panic!("expected ContentUnavailable, got {other:?}"),
        }
        assert!(!engine.tree().exists(Path::new("s.txt")));
        assert_eq!(engine.audit().len(), 1);
        assert!(engine.verify_proof(record.id).expect("verify"));
        assert_eq!(
            engine.record_state(delete.id).expect("state"),
            RecordState::ObliteratedRef
        );
    }

    #[test]
    fn identical_creates_deduplicate_in_store() {
        let (_dir, mut engine) = setup();
        seed(&mut engine, "f1", b"payload");
        seed(&mut engine, "f2", b"payload");

        assert_eq!(engine.store().count(), 1);
        assert!(engine.store().exists(&hash_bytes(b"payload")));
    }

    // ------------------------------------------------------------------
    // Invariants
    // ------------------------------------------------------------------

    #[test]
    fn preconditions_leave_state_unchanged() {
        let (_dir, mut engine) = setup();
        seed(&mut engine, "a.txt", b"alpha");
        let before = engine.history().len();

        assert!(matches!(
            engine.apply_create(Path::new("a.txt"), b"dup"),
            Err(JanusError::AlreadyExists(_))
        ));
        assert!(matches!(
            engine.apply_delete(Path::new("missing.txt")),
            Err(JanusError::NotFound(_))
        ));
        assert!(matches!(
            engine.apply_move(Path::new("missing"), Path::new("dst")),
            Err(JanusError::NotFound(_))
        ));
        assert!(matches!(
            engine.apply_move(Path::new("a.txt"), Path::new("a.txt")),
            Err(JanusError::AlreadyExists(_))
        ));

        assert_eq!(engine.history().len(), before);
        assert_eq!(read(&engine, "a.txt"), b"alpha");
        engine.verify().expect("state still valid");
    }

    #[test]
    fn copy_then_undo_removes_only_the_copy() {
        let (_dir, mut engine) = setup();
        seed(&mut engine, "src.txt", b"content");

        let record = engine
            .apply_copy(Path::new("src.txt"), Path::new("dst.txt"))
            .expect("copy");
        assert!(engine.tree().exists(Path::new("src.txt")));
        assert_eq!(
            engine.tree().get_hash(Path::new("dst.txt")),
            Some(hash_bytes(b"content"))
        );

        engine.undo(record.id).expect("undo");
        assert!(engine.tree().exists(Path::new("src.txt")));
        assert!(!engine.tree().exists(Path::new("dst.txt")));
    }

    #[cfg(unix)]
    #[test]
    fn chmod_then_undo_restores_mode() {
        use std::os::unix::fs::PermissionsExt;

        let (_dir, mut engine) = setup();
        seed(&mut engine, "exe.sh", b"#!/bin/sh\n");
        let original = fs::metadata(engine.root().join("exe.sh"))
            .expect("meta")
            .permissions()
            .mode();

        let record = engine
            .apply_chmod(Path::new("exe.sh"), 0o755)
            .expect("chmod");
        let changed = fs::metadata(engine.root().join("exe.sh"))
            .expect("meta")
            .permissions()
            .mode();
        assert_eq!(changed & 0o777, 0o755);

        engine.undo(record.id).expect("undo");
        let restored = fs::metadata(engine.root().join("exe.sh"))
            .expect("meta")
            .permissions()
            .mode();
        assert_eq!(restored, original);
    }

    #[test]
    fn mkdir_rmdir_and_undo() {
        let (_dir, mut engine) = setup();

        let mk = engine.apply_mkdir(Path::new("sub")).expect("mkdir");
        assert!(engine.root().join("sub").is_dir());

        engine.undo(mk.id).expect("undo mkdir");
        assert!(!engine.root().join("sub").exists());

        engine.apply_mkdir(Path::new("sub")).expect("mkdir again");
        let rm = engine.apply_rmdir(Path::new("sub")).expect("rmdir");
        assert!(!engine.root().join("sub").exists());

        engine.undo(rm.id).expect("undo rmdir");
        assert!(engine.root().join("sub").is_dir());
    }

    #[cfg(unix)]
    #[test]
    fn symlink_then_undo_removes_link() {
        let (_dir, mut engine) = setup();
        seed(&mut engine, "target.txt", b"pointed at");

        let record = engine
            .apply_symlink(Path::new("target.txt"), Path::new("link.txt"))
            .expect("symlink");
        assert!(engine.root().join("link.txt").is_symlink());

        engine.undo(record.id).expect("undo");
        assert!(!engine.root().join("link.txt").exists());
        assert!(engine.root().join("target.txt").exists());
    }

    #[test]
    fn append_then_undo_truncates_byte_exact() {
        let (_dir, mut engine) = setup();
        seed(&mut engine, "log.txt", b"line one\n");

        let record = engine
            .apply_append(Path::new("log.txt"), b"line two\n")
            .expect("append");
        assert_eq!(read(&engine, "log.txt"), b"line one\nline two\n");

        engine.undo(record.id).expect("undo");
        assert_eq!(read(&engine, "log.txt"), b"line one\n");
    }

    #[test]
    fn truncate_then_undo_restores_full_content() {
        let (_dir, mut engine) = setup();
        seed(&mut engine, "t.txt", b"this is a long string");

        let record = engine
            .apply_truncate(Path::new("t.txt"), 4)
            .expect("truncate");
        assert_eq!(read(&engine, "t.txt"), b"this");

        engine.undo(record.id).expect("undo");
        assert_eq!(read(&engine, "t.txt"), b"this is a long string");
    }

    #[test]
    fn touch_created_file_is_removed_on_undo() {
        let (_dir, mut engine) = setup();

        let record = engine.apply_touch(Path::new("stamp")).expect("touch");
        assert_eq!(read(&engine, "stamp"), b"");
        assert_eq!(
            engine.tree().get_hash(Path::new("stamp")),
            Some(crate::hash::null_hash())
        );

        engine.undo(record.id).expect("undo");
        assert!(!engine.tree().exists(Path::new("stamp")));
    }

    #[test]
    fn sequence_undo_in_reverse_restores_initial_state() {
        let (dir, mut engine) = setup();
        seed(&mut engine, "a.txt", b"one");
        let initial = TreeIndex::scan(dir.path()).expect("scan");

        let m1 = engine
            .apply_modify(Path::new("a.txt"), b"two")
            .expect("modify");
        let m2 = engine.apply_create(Path::new("b.txt"), b"new").expect("create");
        let m3 = engine
            .apply_move(Path::new("b.txt"), Path::new("c.txt"))
            .expect("move");

        engine
            .undo_sequence(&[m1.id, m2.id, m3.id])
            .expect("undo sequence");

        let after = TreeIndex::scan(dir.path()).expect("scan");
        assert!(initial.equivalent(&after));
        engine.verify().expect("valid");
    }

    #[test]
    fn independent_undos_commute() {
        // Two runs of the same script, undoing the independent pair in
        // opposite orders, must land in equivalent states.
        fn run(order: [usize; 2]) -> (TempDir, TreeIndex) {
            let dir = TempDir::new().expect("tempdir");
            let mut engine = Engine::init(dir.path()).expect("init");
            seed(&mut engine, "a.txt", b"alpha");
            seed(&mut engine, "b.txt", b"beta");

            let ra = engine
                .apply_modify(Path::new("a.txt"), b"alpha2")
                .expect("modify a");
            let rb = engine
                .apply_modify(Path::new("b.txt"), b"beta2")
                .expect("modify b");
            assert!(ra.independent(&rb));

            let ids = [ra.id, rb.id];
            engine.undo(ids[order[0]]).expect("first undo");
            engine.undo(ids[order[1]]).expect("second undo");

            let tree = TreeIndex::scan(dir.path()).expect("scan");
            (dir, tree)
        }

        let (_d1, forward) = run([0, 1]);
        let (_d2, backward) = run([1, 0]);
        assert!(forward.equivalent(&backward));
    }

    #[test]
    fn undo_twice_is_rejected() {
        let (_dir, mut engine) = setup();
        seed(&mut engine, "a.txt", b"alpha");
        let record = engine.apply_delete(Path::new("a.txt")).expect("delete");

        engine.undo(record.id).expect("first undo");
        assert!(matches!(
            engine.undo(record.id),
            Err(JanusError::Conflict(_))
        ));
    }

    #[test]
    fn undo_last_picks_most_recent() {
        let (_dir, mut engine) = setup();
        seed(&mut engine, "a.txt", b"one");
        seed(&mut engine, "b.txt", b"two");

        let undone = engine.undo_last().expect("undo last");
        assert!(!engine.tree().exists(Path::new("b.txt")));
        assert!(engine.tree().exists(Path::new("a.txt")));
        assert_eq!(engine.history().get(undone).expect("record").path, PathBuf::from("b.txt"));
    }

    #[test]
    fn begin_while_active_conflicts() {
        let (_dir, mut engine) = setup();
        engine.begin().expect("begin");
        assert!(matches!(engine.begin(), Err(JanusError::Conflict(_))));
        engine.commit().expect("commit");
        engine.begin().expect("begin after commit");
    }

    #[test]
    fn commit_freezes_without_structural_effect() {
        let (_dir, mut engine) = setup();
        seed(&mut engine, "a.txt", b"alpha");

        engine.begin().expect("begin");
        engine.apply_delete(Path::new("a.txt")).expect("delete");
        let info = engine.commit().expect("commit");

        assert_eq!(info.op_ids.len(), 1);
        assert!(!engine.tree().exists(Path::new("a.txt")));
        assert_eq!(engine.history().len(), 2);
    }

    #[test]
    fn preview_lists_pending_operations() {
        let (_dir, mut engine) = setup();
        seed(&mut engine, "a.txt", b"alpha");

        assert!(matches!(engine.preview(), Err(JanusError::Conflict(_))));

        engine.begin().expect("begin");
        engine.apply_delete(Path::new("a.txt")).expect("delete");
        engine.apply_create(Path::new("b.txt"), b"beta").expect("create");

        let pending = engine.preview().expect("preview");
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].kind, OpKind::Delete);
        assert_eq!(pending[1].kind, OpKind::Create);
    }

    #[test]
    fn nested_subsequence_rolls_back_leaving_outer_rollable() {
        let (_dir, mut engine) = setup();
        seed(&mut engine, "a.txt", b"alpha");
        seed(&mut engine, "b.txt", b"beta");

        engine.begin().expect("begin");
        engine.apply_modify(Path::new("a.txt"), b"alpha2").expect("outer op");
        // Inner contiguous sub-sequence
        let inner = engine.apply_modify(Path::new("b.txt"), b"beta2").expect("inner op");

        // Roll back just the inner sub-sequence by hand
        engine.undo_sequence(&[inner.id]).expect("inner rollback");
        assert_eq!(read(&engine, "b.txt"), b"beta");

        // The outer transaction still rolls back cleanly
        engine.rollback().expect("outer rollback");
        assert_eq!(read(&engine, "a.txt"), b"alpha");
        assert_eq!(read(&engine, "b.txt"), b"beta");
    }

    #[test]
    fn batch_obliteration_is_best_effort() {
        let (_dir, mut engine) = setup();
        seed(&mut engine, "one.txt", b"first");
        seed(&mut engine, "two.txt", b"second");

        let h1 = hash_bytes(b"first");
        let h2 = hash_bytes(b"second");
        let absent = hash_bytes(b"never stored");

        let (count, all_ok) = engine.obliterate_batch(
            &[h1, absent, h2, h1],
            Some("sweep".to_string()),
            None,
        );
        // h1 obliterated once, the repeat and the absent digest skipped
        assert_eq!(count, 2);
        assert!(all_ok);
        assert!(!engine.store().exists(&h1));
        assert!(!engine.store().exists(&h2));
        assert_eq!(engine.audit().len(), 2);
    }

    #[test]
    fn erasure_request_satisfaction() {
        let (_dir, mut engine) = setup();
        seed(&mut engine, "pii.txt", b"subject data");

        let request = ErasureRequest {
            subject_id: "subject-42".to_string(),
            content_hash: hash_bytes(b"subject data"),
            legal_basis: "GDPR Art.17(1)(a)".to_string(),
            request_time: Utc::now(),
        };
        assert!(!engine.satisfies_erasure(&request));

        let response = engine.erase(&request).expect("erase");
        assert!(response.proof.is_valid());
        assert!(engine.satisfies_erasure(&request));

        let record = engine.audit().get(response.record_id).expect("record");
        assert_eq!(record.reason.as_deref(), Some("subject-42"));
    }

    #[test]
    fn obliterate_absent_content_is_not_found() {
        let (_dir, mut engine) = setup();
        assert!(matches!(
            engine.obliterate(&hash_bytes(b"ghost"), None, None),
            Err(JanusError::NotFound(_))
        ));
    }

    #[test]
    fn status_reports_counters() {
        let (_dir, mut engine) = setup();
        seed(&mut engine, "a.txt", b"alpha");
        engine.begin().expect("begin");

        let status = engine.status();
        assert_eq!(status.tracked_entries, 1);
        assert_eq!(status.store_objects, 1);
        assert_eq!(status.history_len, 1);
        assert!(status.active_txn.is_some());
        assert_eq!(status.obliterations, 0);
    }

    #[test]
    fn paths_are_canonicalized_to_one_key() {
        let (_dir, mut engine) = setup();
        seed(&mut engine, "sub/file.txt", b"nested");

        // The same file addressed three ways is one history key
        engine
            .apply_modify(Path::new("sub/./file.txt"), b"v2")
            .expect("modify");
        engine
            .apply_modify(Path::new("sub/x/../file.txt"), b"v3")
            .expect("modify");

        let touched = engine.history().by_path(Path::new("sub/file.txt"));
        assert_eq!(touched.len(), 3);
    }

    #[test]
    fn escaping_paths_are_rejected() {
        let (_dir, mut engine) = setup();
        assert!(matches!(
            engine.apply_create(Path::new("../outside.txt"), b"x"),
            Err(JanusError::NotFound(_))
        ));
    }
}
