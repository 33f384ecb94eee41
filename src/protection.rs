// Runtime binding of a mitigation scope to the blocker enforcing it.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;

/// Get current Unix timestamp in seconds
pub(crate) fn current_timestamp_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_else(|e| {
            warn!("System clock before Unix epoch: {} - using timestamp 0", e);
            0
        })
}

/// One active (or finished) protection. At most one active protection exists
/// per (customer, client identifier, mitigation id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Protection {
    /// Repository row id; 0 until persisted.
    pub id: i64,
    pub customer_id: i64,
    pub client_identifier: String,
    pub mitigation_id: i64,
    /// Blocker hosting this protection
    pub blocker_id: i64,
    pub is_enabled: bool,
    /// Unix seconds when enforcement started; None until executed.
    pub started_at: Option<u64>,
    /// Unix seconds when enforcement stopped; None while live.
    pub finished_at: Option<u64>,
}

impl Protection {
    pub fn new(
        customer_id: i64,
        client_identifier: &str,
        mitigation_id: i64,
        blocker_id: i64,
    ) -> Self {
        Self {
            id: 0,
            customer_id,
            client_identifier: client_identifier.to_string(),
            mitigation_id,
            blocker_id,
            is_enabled: false,
            started_at: None,
            finished_at: None,
        }
    }

    /// Mark enforcement as running.
    pub fn start(&mut self) {
        self.is_enabled = true;
        self.started_at = Some(current_timestamp_secs());
        self.finished_at = None;
    }

    /// Mark enforcement as stopped.
    pub fn finish(&mut self) {
        self.is_enabled = false;
        self.finished_at = Some(current_timestamp_secs());
    }
}
