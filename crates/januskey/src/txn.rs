//! Transaction state and the state pointer file
//!
//! One transaction may be active per managed root. The state pointer
//! file persists the last-allocated operation id and the active
//! transaction (if any), so a reopened engine resumes with monotonic
//! ids and knows whether a transaction was left open.

use crate::error::{JanusError, Result};
use crate::store::atomic_write;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// An open or frozen group of operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxnInfo {
    /// Transaction id (drawn from the same counter as operation ids)
    pub id: u64,
    pub started: DateTime<Utc>,
    /// Ids of operations applied inside this transaction, in order
    pub op_ids: Vec<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StatePointer {
    /// Last allocated id (operations, undo markers, transactions)
    last_id: u64,
    /// Transaction currently accepting operations
    active: Option<TxnInfo>,
}

/// Persistent id allocator and active-transaction holder.
pub struct TxnState {
    path: PathBuf,
    state: StatePointer,
}

impl TxnState {
    /// Load the state pointer, or start fresh if none exists.
    pub fn open(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let content = fs::read_to_string(&path).map_err(|e| JanusError::io(&path, e))?;
            serde_json::from_str(&content).map_err(|e| {
                JanusError::InvalidState(format!("corrupt state pointer: {e}"))
            })?
        } else {
            StatePointer::default()
        };
        Ok(Self { path, state })
    }

    fn save(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.state)
            .map_err(|e| JanusError::InvalidState(format!("state serialization: {e}")))?;
        atomic_write(&self.path, json.as_bytes())
    }

    /// Allocate the next monotonic id and persist the new high-water
    /// mark.
    pub fn next_id(&mut self) -> Result<u64> {
        self.state.last_id += 1;
        self.save()?;
        Ok(self.state.last_id)
    }

    /// Last allocated id (0 when nothing has been applied yet).
    #[must_use]
    pub fn last_id(&self) -> u64 {
        self.state.last_id
    }

    /// Begin a transaction. Fails with `Conflict` while one is active.
    pub fn begin(&mut self) -> Result<u64> {
        if let Some(active) = &self.state.active {
            return Err(JanusError::Conflict(format!(
                "transaction {} is already active",
                active.id
            )));
        }
        let id = self.next_id()?;
        self.state.active = Some(TxnInfo {
            id,
            started: Utc::now(),
            op_ids: Vec::new(),
        });
        self.save()?;
        Ok(id)
    }

    /// The active transaction, if any.
    #[must_use]
    pub fn active(&self) -> Option<&TxnInfo> {
        self.state.active.as_ref()
    }

    /// Record an operation id under the active transaction (no-op when
    /// none is active).
    pub fn record_op(&mut self, op_id: u64) -> Result<()> {
        if let Some(active) = self.state.active.as_mut() {
            active.op_ids.push(op_id);
            self.save()?;
        }
        Ok(())
    }

    /// Freeze and close the active transaction. Commit has no
    /// structural effect on history.
    pub fn commit(&mut self) -> Result<TxnInfo> {
        let info = self
            .state
            .active
            .take()
            .ok_or_else(|| JanusError::Conflict("no active transaction".to_string()))?;
        self.save()?;
        Ok(info)
    }

    /// Take the active transaction for rollback. The caller undoes its
    /// operations; the transaction is closed either way.
    pub fn take_for_rollback(&mut self) -> Result<TxnInfo> {
        let info = self
            .state
            .active
            .take()
            .ok_or_else(|| JanusError::Conflict("no active transaction".to_string()))?;
        self.save()?;
        Ok(info)
    }
}
