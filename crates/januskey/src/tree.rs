//! File-system model for the managed tree
//!
//! The engine keeps an in-memory index mapping canonical relative paths
//! to entries. Entries mirror the working tree; a removal hollows the
//! entry rather than dropping it, so the model remembers which paths
//! once existed. Two engine states are compared by content-hash
//! agreement at every path (history and store internals are ignored).

use crate::error::{JanusError, Result};
use crate::hash::{self, ContentHash};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// Engine-private metadata directory under the managed root
pub const META_DIR: &str = ".januskey";

/// Captured file metadata, sufficient to restore a file's identity
/// after an undo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileMeta {
    /// Unix mode bits
    pub permissions: u32,
    /// Owner uid
    pub uid: u32,
    /// Group gid
    pub gid: u32,
    /// Size in bytes
    pub size: u64,
    /// Last modification time
    pub modified: DateTime<Utc>,
    /// Whether the path is a symbolic link
    pub is_symlink: bool,
    /// Link target when `is_symlink`
    pub symlink_target: Option<PathBuf>,
}

impl FileMeta {
    /// Capture metadata from a path without following symlinks.
    pub fn capture(path: &Path) -> Result<Self> {
        let metadata = fs::symlink_metadata(path).map_err(|e| JanusError::io(path, e))?;

        #[cfg(unix)]
        let (permissions, uid, gid) = {
            use std::os::unix::fs::MetadataExt;
            (metadata.mode(), metadata.uid(), metadata.gid())
        };
        #[cfg(not(unix))]
        let (permissions, uid, gid) = (0o644u32, 0u32, 0u32);

        let is_symlink = metadata.file_type().is_symlink();
        let symlink_target = if is_symlink {
            fs::read_link(path).ok()
        } else {
            None
        };

        let modified = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        Ok(Self {
            permissions,
            uid,
            gid,
            size: metadata.len(),
            modified,
            is_symlink,
            symlink_target,
        })
    }

    /// Re-apply the restorable parts of this metadata (permissions).
    #[cfg(unix)]
    pub fn apply(&self, path: &Path) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;
        let perms = fs::Permissions::from_mode(self.permissions);
        fs::set_permissions(path, perms).map_err(|e| JanusError::io(path, e))
    }

    #[cfg(not(unix))]
    pub fn apply(&self, _path: &Path) -> Result<()> {
        Ok(())
    }
}

/// One entry in the file-system model.
///
/// Existing file entries carry the content digest; directories and
/// symlinks carry metadata only. Hollowed entries keep their slot with
/// `exists = false` and everything else cleared.
#[derive(Debug, Clone, Default)]
pub struct TreeEntry {
    pub hash: Option<ContentHash>,
    pub meta: Option<FileMeta>,
    pub exists: bool,
}

impl TreeEntry {
    /// An existing regular-file entry.
    #[must_use]
    pub fn file(hash: ContentHash, meta: FileMeta) -> Self {
        Self {
            hash: Some(hash),
            meta: Some(meta),
            exists: true,
        }
    }

    /// An existing non-file entry (directory or symlink).
    #[must_use]
    pub fn other(meta: FileMeta) -> Self {
        Self {
            hash: None,
            meta: Some(meta),
            exists: true,
        }
    }
}

/// Canonicalize a path into the platform-neutral key form: relative to
/// the managed root, `.` and duplicate separators collapsed, `..`
/// resolved lexically. Paths that escape the root are rejected.
pub fn canonical_rel(root: &Path, path: &Path) -> Result<PathBuf> {
    let rel = if path.is_absolute() {
        path.strip_prefix(root).map_err(|_| {
            JanusError::NotFound(format!("{} is outside the managed root", path.display()))
        })?
    } else {
        path
    };

    let mut out = PathBuf::new();
    for component in rel.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    return Err(JanusError::NotFound(format!(
                        "{} escapes the managed root",
                        path.display()
                    )));
                }
            }
            Component::RootDir | Component::Prefix(_) => {}
        }
    }

    if out.as_os_str().is_empty() {
        return Err(JanusError::NotFound(
            "path resolves to the managed root itself".to_string(),
        ));
    }
    Ok(out)
}

/// The file-system model: canonical relative path -> entry.
#[derive(Debug, Default)]
pub struct TreeIndex {
    entries: HashMap<PathBuf, TreeEntry>,
}

impl TreeIndex {
    /// Build the model by walking the managed root, skipping the
    /// engine-private metadata subtree. Unreadable files are skipped
    /// with a warning rather than failing the whole scan.
    pub fn scan(root: &Path) -> Result<Self> {
        let mut entries = HashMap::new();

        for entry in WalkDir::new(root)
            .follow_links(false)
            .min_depth(1)
            .into_iter()
            .filter_entry(|e| e.file_name() != META_DIR)
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            let rel = match canonical_rel(root, path) {
                Ok(r) => r,
                Err(_) => continue,
            };

            let meta = match FileMeta::capture(path) {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!("skipping unreadable path {}: {}", path.display(), e);
                    continue;
                }
            };

            let tree_entry = if entry.file_type().is_file() {
                match fs::read(path) {
                    Ok(content) => TreeEntry::file(hash::hash_bytes(&content), meta),
                    Err(e) => {
                        tracing::warn!("skipping unreadable file {}: {}", path.display(), e);
                        continue;
                    }
                }
            } else {
                TreeEntry::other(meta)
            };

            entries.insert(rel, tree_entry);
        }

        Ok(Self { entries })
    }

    /// Look up an entry (existing or hollowed).
    #[must_use]
    pub fn find(&self, rel: &Path) -> Option<&TreeEntry> {
        self.entries.get(rel)
    }

    /// True iff the path currently exists in the model.
    #[must_use]
    pub fn exists(&self, rel: &Path) -> bool {
        self.entries.get(rel).map(|e| e.exists).unwrap_or(false)
    }

    /// Content digest of an existing file entry.
    #[must_use]
    pub fn get_hash(&self, rel: &Path) -> Option<ContentHash> {
        self.entries.get(rel).filter(|e| e.exists).and_then(|e| e.hash)
    }

    /// Insert or replace the entry at a path. Other paths are untouched.
    pub fn upsert(&mut self, rel: PathBuf, entry: TreeEntry) {
        self.entries.insert(rel, entry);
    }

    /// Hollow an entry: `exists` becomes false, content/hash/metadata
    /// are cleared, the slot is kept.
    pub fn hollow(&mut self, rel: &Path) {
        self.entries.insert(rel.to_path_buf(), TreeEntry::default());
    }

    /// Number of existing entries.
    #[must_use]
    pub fn len_existing(&self) -> usize {
        self.entries.values().filter(|e| e.exists).count()
    }

    /// Iterate existing entries.
    pub fn iter_existing(&self) -> impl Iterator<Item = (&PathBuf, &TreeEntry)> {
        self.entries.iter().filter(|(_, e)| e.exists)
    }

    /// Check model validity: every existing file entry's recorded
    /// digest must match the digest of the on-disk content.
    pub fn verify(&self, root: &Path) -> Result<()> {
        for (rel, entry) in self.iter_existing() {
            let Some(expected) = entry.hash else { continue };
            let abs = root.join(rel);
            let content = fs::read(&abs).map_err(|e| JanusError::io(&abs, e))?;
            if !hash::verify(&content, &expected) {
                return Err(JanusError::InvalidState(format!(
                    "content of {} does not match recorded digest {}",
                    rel.display(),
                    expected
                )));
            }
        }
        Ok(())
    }

    /// State equivalence: contents and digests agree at every path.
    /// Hollow entries count the same as absent ones.
    #[must_use]
    pub fn equivalent(&self, other: &TreeIndex) -> bool {
        let mine: HashMap<&PathBuf, Option<ContentHash>> = self
            .iter_existing()
            .map(|(p, e)| (p, e.hash))
            .collect();
        let theirs: HashMap<&PathBuf, Option<ContentHash>> = other
            .iter_existing()
            .map(|(p, e)| (p, e.hash))
            .collect();
        mine == theirs
    }
}
