//! Per-cycle health records and the aggregated cluster snapshot

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Role a node reported during probing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    Writer,
    Replica,
    /// Unreachable, or reachable but the role query failed
    Unknown,
}

/// Result of probing one node in one polling cycle.
///
/// Created fresh every cycle and never mutated afterwards. `reachable =
/// false` means the connection could not be established; `reachable = true`
/// with a `last_error` means the node answered the handshake but a status
/// query failed: the two are weighted differently by alerting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeHealthRecord {
    pub name: String,
    pub reachable: bool,
    pub role: NodeRole,
    pub in_recovery: Option<bool>,
    pub lag_bytes: Option<u64>,
    pub server_version: Option<String>,
    pub last_error: Option<String>,
    pub checked_at_epoch_secs: u64,
}

impl NodeHealthRecord {
    /// Record for a node that could not be reached at all
    pub fn unreachable(name: impl Into<String>, reason: impl Into<String>, now: u64) -> Self {
        Self {
            name: name.into(),
            reachable: false,
            role: NodeRole::Unknown,
            in_recovery: None,
            lag_bytes: None,
            server_version: None,
            last_error: Some(reason.into()),
            checked_at_epoch_secs: now,
        }
    }

    /// Record for a node that answered the handshake but failed a status query
    pub fn query_failed(name: impl Into<String>, reason: impl Into<String>, now: u64) -> Self {
        Self {
            name: name.into(),
            reachable: true,
            role: NodeRole::Unknown,
            in_recovery: None,
            lag_bytes: None,
            server_version: None,
            last_error: Some(reason.into()),
            checked_at_epoch_secs: now,
        }
    }

    pub fn is_unhealthy(&self) -> bool {
        !self.reachable || self.role == NodeRole::Unknown
    }

    /// A replica that is reachable and answered its whole query battery
    pub fn is_healthy_replica(&self) -> bool {
        self.role == NodeRole::Replica && self.reachable && self.last_error.is_none()
    }
}

/// Aggregated point-in-time view of the whole cluster.
///
/// Immutable once built. writer_count + replica_count + unknown-role count
/// always equals the number of records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    pub taken_at_epoch_secs: u64,
    pub writer_count: usize,
    pub replica_count: usize,
    pub unhealthy_count: usize,
    pub max_lag_bytes: Option<u64>,
    pub failover_ready: bool,
    pub issues: Vec<String>,
    pub nodes: Vec<NodeHealthRecord>,
}

pub fn now_epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
