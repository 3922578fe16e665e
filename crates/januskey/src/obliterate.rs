//! Obliteration: one-way erasure with proof and audit trail
//!
//! Obliteration reaches past the reversible layer: the payload is
//! overwritten in place, removed from the store, and a commitment-bound
//! proof plus an audit record are emitted. Once a digest is obliterated,
//! any undo that needs it fails; nothing re-admits content under that
//! digest within the process.

use crate::error::{JanusError, Result};
use crate::hash::{to_hex, ContentHash};
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

/// Floor for overwrite passes (DoD 5220.22-M alignment)
pub const MIN_OVERWRITE_PASSES: u32 = 3;

/// Cryptographic proof that a payload was erased.
///
/// The commitment binds the digest, a fresh nonce, and the timestamp:
/// `SHA-256(content_hash || nonce || RFC3339 timestamp)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObliterationProof {
    pub content_hash: ContentHash,
    pub timestamp: DateTime<Utc>,
    /// 32 random bytes, hex-encoded
    pub nonce: String,
    /// Hex-encoded commitment digest
    pub commitment: String,
    pub overwrite_passes: u32,
    pub storage_cleared: bool,
}

impl ObliterationProof {
    /// Build a proof for a completed erasure.
    #[must_use]
    pub fn build(content_hash: ContentHash, overwrite_passes: u32) -> Self {
        let timestamp = Utc::now();

        let mut nonce_bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);

        let commitment = commit(&content_hash, &nonce_bytes, &timestamp);

        Self {
            content_hash,
            timestamp,
            nonce: to_hex(&nonce_bytes),
            commitment,
            overwrite_passes,
            storage_cleared: true,
        }
    }

    /// Recompute the commitment from the proof's own fields.
    #[must_use]
    pub fn verify_commitment(&self) -> bool {
        let Some(nonce_bytes) = from_hex(&self.nonce) else {
            return false;
        };
        commit(&self.content_hash, &nonce_bytes, &self.timestamp) == self.commitment
    }

    /// A proof is valid iff storage was cleared with at least the
    /// minimum pass count and the commitment checks out.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.storage_cleared
            && self.overwrite_passes >= MIN_OVERWRITE_PASSES
            && self.verify_commitment()
    }
}

fn commit(hash: &ContentHash, nonce: &[u8], timestamp: &DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(hash.as_bytes());
    hasher.update(nonce);
    hasher.update(timestamp.to_rfc3339().as_bytes());
    to_hex(&hasher.finalize())
}

fn from_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    s.as_bytes()
        .chunks(2)
        .map(|pair| {
            std::str::from_utf8(pair)
                .ok()
                .and_then(|p| u8::from_str_radix(p, 16).ok())
        })
        .collect()
}

/// Audit-log entry for one obliteration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObliterationRecord {
    pub id: u64,
    pub content_hash: ContentHash,
    pub timestamp: DateTime<Utc>,
    /// Free-form reason (a data-subject id for GDPR erasures)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Legal basis, e.g. "GDPR Art.17(1)(a)"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legal_basis: Option<String>,
    pub proof: ObliterationProof,
}

/// Append-only audit log backed by a JSON-lines file.
pub struct AuditLog {
    path: PathBuf,
    records: Vec<ObliterationRecord>,
}

impl AuditLog {
    /// Load the audit log (empty if none exists yet).
    pub fn open(path: PathBuf) -> Result<Self> {
        let mut records = Vec::new();
        if path.exists() {
            let content = fs::read_to_string(&path).map_err(|e| JanusError::io(&path, e))?;
            for (lineno, line) in content.lines().enumerate() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let record: ObliterationRecord = serde_json::from_str(line).map_err(|e| {
                    JanusError::InvalidState(format!(
                        "corrupt audit log line {}: {e}",
                        lineno + 1
                    ))
                })?;
                records.push(record);
            }
        }
        Ok(Self { path, records })
    }

    /// Append one record. Records are immutable once written.
    pub fn append(&mut self, record: ObliterationRecord) -> Result<()> {
        let json = serde_json::to_string(&record)
            .map_err(|e| JanusError::InvalidState(format!("audit serialization: {e}")))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| JanusError::io(&self.path, e))?;
        writeln!(file, "{json}").map_err(|e| JanusError::io(&self.path, e))?;
        file.sync_all().map_err(|e| JanusError::io(&self.path, e))?;
        self.records.push(record);
        Ok(())
    }

    #[must_use]
    pub fn records(&self) -> &[ObliterationRecord] {
        &self.records
    }

    #[must_use]
    pub fn get(&self, id: u64) -> Option<&ObliterationRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    /// All records for a digest (a digest can be stored and obliterated
    /// at most once per process, but logs may span processes).
    #[must_use]
    pub fn find_by_hash(&self, hash: &ContentHash) -> Vec<&ObliterationRecord> {
        self.records
            .iter()
            .filter(|r| r.content_hash == *hash)
            .collect()
    }

    /// Verify the proof commitment of a record.
    pub fn verify_proof(&self, id: u64) -> Result<bool> {
        let record = self
            .get(id)
            .ok_or_else(|| JanusError::NotFound(format!("obliteration record {id}")))?;
        Ok(record.proof.is_valid())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// A GDPR Article 17 erasure request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErasureRequest {
    /// Data-subject identifier; recorded as the obliteration reason
    pub subject_id: String,
    pub content_hash: ContentHash,
    pub legal_basis: String,
    pub request_time: DateTime<Utc>,
}

/// Response to a processed erasure request, carrying the proof.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErasureResponse {
    pub record_id: u64,
    pub proof: ObliterationProof,
}
