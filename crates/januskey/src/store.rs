//! Content-addressed store
//!
//! Payloads are stored once per digest under a git-like two-character
//! prefix sharding. Retrieval re-hashes on every read, so a corrupted
//! object can never be handed back as valid content. Secure removal
//! overwrites the payload in place before unlinking and leaves a
//! tombstone, so a removed digest stays removed for the life of the
//! process and `exists` can answer without re-admitting content.

use crate::error::{JanusError, Result};
use crate::hash::{self, ContentHash};
use rand::RngCore;
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Chunk size for overwrite passes
const OVERWRITE_CHUNK: usize = 8192;

/// Tombstone index file, one hex digest per line
const TOMBSTONE_FILE: &str = "tombstones";

/// How a digest relates to the store, for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalState {
    /// Payload is present and retrievable
    Stored,
    /// The digest was never stored in this store
    NeverStored,
    /// The payload was securely removed; the digest is tombstoned
    Obliterated,
}

/// Content-addressed blob store backed by the filesystem
pub struct ContentStore {
    root: PathBuf,
    tombstones: HashSet<ContentHash>,
    max_objects: Option<usize>,
}

impl ContentStore {
    /// Open (or create) a store rooted at `root`.
    ///
    /// Creates the `objects/` subdirectory and loads the tombstone index.
    pub fn open(root: PathBuf) -> Result<Self> {
        let objects = root.join("objects");
        fs::create_dir_all(&objects).map_err(|e| JanusError::io(&objects, e))?;

        let tombstones = load_tombstones(&root.join(TOMBSTONE_FILE))?;

        Ok(Self {
            root,
            tombstones,
            max_objects: None,
        })
    }

    /// Bound the number of stored objects. `store` fails with
    /// `ResourceExhausted` once the bound is reached.
    #[must_use]
    pub fn with_capacity(mut self, max_objects: usize) -> Self {
        self.max_objects = Some(max_objects);
        self
    }

    /// Filesystem path for a digest: `objects/<2-hex>/<62-hex>`.
    fn object_path(&self, hash: &ContentHash) -> PathBuf {
        self.root.join("objects").join(hash.shard()).join(hash.rest())
    }

    /// Store a payload and return its digest.
    ///
    /// Storing content whose digest is already present is a no-op
    /// (deduplication). Storing content whose digest has been tombstoned
    /// fails: removal is monotonic within the process.
    pub fn store(&self, content: &[u8]) -> Result<ContentHash> {
        let hash = hash::hash_bytes(content);

        if self.tombstones.contains(&hash) {
            return Err(JanusError::ContentUnavailable(hash));
        }

        let path = self.object_path(&hash);
        if path.exists() {
            return Ok(hash);
        }

        if let Some(max) = self.max_objects {
            if self.count() >= max {
                return Err(JanusError::ResourceExhausted(format!(
                    "content store holds {max} objects"
                )));
            }
        }

        let shard_dir = self.root.join("objects").join(hash.shard());
        fs::create_dir_all(&shard_dir).map_err(|e| JanusError::io(&shard_dir, e))?;

        atomic_write(&path, content)?;
        tracing::debug!("stored {} ({} bytes)", hash, content.len());
        Ok(hash)
    }

    /// Retrieve a payload by digest.
    ///
    /// Returns `None` when the digest was never stored or has been
    /// removed. Any payload returned is guaranteed to hash back to the
    /// requested digest; a mismatch means on-disk corruption and is
    /// surfaced as `InvalidState`.
    pub fn retrieve(&self, hash: &ContentHash) -> Result<Option<Vec<u8>>> {
        if self.tombstones.contains(hash) {
            return Ok(None);
        }

        let path = self.object_path(hash);
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read(&path).map_err(|e| JanusError::io(&path, e))?;
        if !hash::verify(&content, hash) {
            return Err(JanusError::InvalidState(format!(
                "stored payload for {hash} does not match its digest"
            )));
        }
        Ok(Some(content))
    }

    /// True iff a payload for this digest is present and not tombstoned.
    #[must_use]
    pub fn exists(&self, hash: &ContentHash) -> bool {
        !self.tombstones.contains(hash) && self.object_path(hash).exists()
    }

    /// Distinguish never-stored from obliterated, for diagnostics.
    #[must_use]
    pub fn removal_state(&self, hash: &ContentHash) -> RemovalState {
        if self.tombstones.contains(hash) {
            RemovalState::Obliterated
        } else if self.object_path(hash).exists() {
            RemovalState::Stored
        } else {
            RemovalState::NeverStored
        }
    }

    /// Securely remove a payload: overwrite in place with `passes`
    /// passes (zeros, ones, random, cycling), unlink, and tombstone the
    /// digest.
    ///
    /// On an I/O failure before the unlink the entry stays present and
    /// no tombstone is written. Once this returns `Ok`, `exists` is
    /// false for this digest for the rest of the process lifetime.
    pub fn remove_secure(&mut self, hash: &ContentHash, passes: u32) -> Result<()> {
        if !self.exists(hash) {
            return Err(JanusError::NotFound(format!("content {hash}")));
        }

        let path = self.object_path(hash);
        overwrite_in_place(&path, passes)?;
        fs::remove_file(&path).map_err(|e| JanusError::io(&path, e))?;

        self.append_tombstone(hash)?;
        self.tombstones.insert(*hash);
        tracing::debug!("securely removed {} after {} passes", hash, passes);
        Ok(())
    }

    /// Number of stored objects.
    #[must_use]
    pub fn count(&self) -> usize {
        walkdir::WalkDir::new(self.root.join("objects"))
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .count()
    }

    /// Total payload bytes on disk.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        walkdir::WalkDir::new(self.root.join("objects"))
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| e.metadata().ok())
            .map(|m| m.len())
            .sum()
    }

    fn append_tombstone(&self, hash: &ContentHash) -> Result<()> {
        let path = self.root.join(TOMBSTONE_FILE);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| JanusError::io(&path, e))?;
        writeln!(file, "{hash}").map_err(|e| JanusError::io(&path, e))?;
        file.sync_all().map_err(|e| JanusError::io(&path, e))?;
        Ok(())
    }
}

fn load_tombstones(path: &Path) -> Result<HashSet<ContentHash>> {
    if !path.exists() {
        return Ok(HashSet::new());
    }
    let content = fs::read_to_string(path).map_err(|e| JanusError::io(path, e))?;
    let mut set = HashSet::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let hash = ContentHash::from_str(line).map_err(|e| {
            JanusError::InvalidState(format!("corrupt tombstone entry '{line}': {e}"))
        })?;
        set.insert(hash);
    }
    Ok(set)
}

/// Overwrite a file's bytes in place, syncing after every pass.
///
/// Pass patterns cycle through zeros, ones, and fresh random bytes, so
/// any `passes >= 3` includes at least one random pass. The random
/// buffer is zeroed before it is dropped.
fn overwrite_in_place(path: &Path, passes: u32) -> Result<()> {
    let len = fs::metadata(path)
        .map_err(|e| JanusError::io(path, e))?
        .len() as usize;
    if len == 0 {
        return Ok(());
    }

    let mut file = OpenOptions::new()
        .write(true)
        .open(path)
        .map_err(|e| JanusError::io(path, e))?;

    let mut buffer = vec![0u8; len.min(OVERWRITE_CHUNK)];
    for pass in 0..passes {
        match pass % 3 {
            0 => buffer.fill(0x00),
            1 => buffer.fill(0xFF),
            _ => rand::thread_rng().fill_bytes(&mut buffer),
        }

        file.seek(SeekFrom::Start(0))
            .map_err(|e| JanusError::io(path, e))?;
        let mut written = 0;
        while written < len {
            let chunk = (len - written).min(buffer.len());
            file.write_all(&buffer[..chunk])
                .map_err(|e| JanusError::io(path, e))?;
            written += chunk;
        }
        file.sync_all().map_err(|e| JanusError::io(path, e))?;
    }
    buffer.fill(0);
    Ok(())
}

/// Write content to a file atomically via temp file + rename.
pub(crate) fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let parent = path.parent().ok_or_else(|| {
        JanusError::InvalidState(format!("path has no parent: {}", path.display()))
    })?;

    let temp = parent.join(format!(
        ".jk-tmp-{}-{:08x}",
        std::process::id(),
        rand::thread_rng().next_u32()
    ));

    let write = (|| -> Result<()> {
        let mut file = fs::File::create(&temp).map_err(|e| JanusError::io(&temp, e))?;
        file.write_all(content).map_err(|e| JanusError::io(&temp, e))?;
        file.sync_all().map_err(|e| JanusError::io(&temp, e))?;
        Ok(())
    })();

    if let Err(e) = write {
        let _ = fs::remove_file(&temp);
        return Err(e);
    }

    fs::rename(&temp, path).map_err(|e| {
        let _ = fs::remove_file(&temp);
        JanusError::io(path, e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, ContentStore) {
        let dir = TempDir::new().expect("tempdir");
        let store = ContentStore::open(dir.path().join("content")).expect("store");
        (dir, store)
    }

    #[test]
    fn store_and_retrieve_roundtrip() {
        let (_dir, store) = setup();
        let hash = store.store(b"hello world").expect("store");
        let back = store.retrieve(&hash).expect("retrieve");
        assert_eq!(back.as_deref(), Some(b"hello world".as_slice()));
        assert!(store.exists(&hash));
    }

    #[test]
    fn retrieve_missing_is_none() {
        let (_dir, store) = setup();
        let hash = hash::hash_bytes(b"never stored");
        assert_eq!(store.retrieve(&hash).expect("retrieve"), None);
        assert!(!store.exists(&hash));
        assert_eq!(store.removal_state(&hash), RemovalState::NeverStored);
    }

    #[test]
    fn deduplication_keeps_one_object() {
        let (_dir, store) = setup();
        let h1 = store.store(b"payload").expect("store 1");
        let h2 = store.store(b"payload").expect("store 2");
        assert_eq!(h1, h2);
        assert_eq!(store.count(), 1);
    }

    #[test]
    fn corrupted_object_is_invalid_state() {
        let (_dir, store) = setup();
        let hash = store.store(b"original").expect("store");
        fs::write(store.object_path(&hash), b"tampered").expect("corrupt");

        match store.retrieve(&hash) {
            Err(JanusError::InvalidState(_)) => {}
            other => panic!("expected InvalidState, got {other:?}"),
        }
    }

    #[test]
    fn remove_secure_is_monotonic() {
        let (_dir, mut store) = setup();
        let hash = store.store(b"sensitive").expect("store");

        store.remove_secure(&hash, 3).expect("remove");
        assert!(!store.exists(&hash));
        assert_eq!(store.retrieve(&hash).expect("retrieve"), None);
        assert_eq!(store.removal_state(&hash), RemovalState::Obliterated);

        // Re-storing identical content is refused
        match store.store(b"sensitive") {
            Err(JanusError::ContentUnavailable(h)) => assert_eq!(h, hash),
            other => panic!("expected ContentUnavailable, got {other:?}"),
        }
    }

    #[test]
    fn remove_secure_missing_is_not_found() {
        let (_dir, mut store) = setup();
        let hash = hash::hash_bytes(b"ghost");
        assert!(matches!(
            store.remove_secure(&hash, 3),
            Err(JanusError::NotFound(_))
        ));
    }

    #[test]
    fn tombstones_survive_reopen() {
        let dir = TempDir::new().expect("tempdir");
        let root = dir.path().join("content");
        let hash = {
            let mut store = ContentStore::open(root.clone()).expect("store");
            let h = store.store(b"erase me").expect("store");
            store.remove_secure(&h, 3).expect("remove");
            h
        };

        let store = ContentStore::open(root).expect("reopen");
        assert!(!store.exists(&hash));
        assert_eq!(store.removal_state(&hash), RemovalState::Obliterated);
    }

    #[test]
    fn capacity_bound_is_enforced() {
        let dir = TempDir::new().expect("tempdir");
        let store = ContentStore::open(dir.path().join("content"))
            .expect("store")
            .with_capacity(2);
        store.store(b"one").expect("one");
        store.store(b"two").expect("two");
        assert!(matches!(
            store.store(b"three"),
            Err(JanusError::ResourceExhausted(_))
        ));
        // Re-storing existing content is still fine at capacity
        store.store(b"one").expect("dedupe at capacity");
    }

    #[test]
    fn overwrite_destroys_content_before_unlink() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("victim");
        fs::write(&path, b"secret secret secret").expect("write");

        overwrite_in_place(&path, 3).expect("overwrite");
        let after = fs::read(&path).expect("read");
        assert_ne!(after, b"secret secret secret".to_vec());
    }

    #[test]
    fn overwrite_handles_files_larger_than_chunk() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("large");
        let content = vec![0x41u8; OVERWRITE_CHUNK * 2 + 17];
        fs::write(&path, &content).expect("write");

        overwrite_in_place(&path, 4).expect("overwrite");
        let after = fs::read(&path).expect("read");
        assert_eq!(after.len(), content.len());
        assert_ne!(after, content);
    }
}
