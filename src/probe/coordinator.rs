//! Coordinator state fetch
//!
//! The failover coordinator (pg_auto_failover monitor) is a read-only data
//! source here: one query against its node catalog, no control commands.
//! Its reported roles fill in for nodes whose own probe could not resolve
//! a role.

use std::time::Duration;

use tokio::time::timeout;

use crate::cluster::{NodeHealthRecord, NodeRole};
use crate::config::CoordinatorConfig;

use super::connection::{ConnectionError, NodeConnection};

const STATE_QUERY: &str =
    "SELECT nodename, reportedstate, health FROM pgautofailover.node ORDER BY nodeid";

/// Node state codes reported by the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorNodeState {
    Unknown,
    Draining,
    WaitStandby,
    Secondary,
    Primary,
    Single,
}

impl CoordinatorNodeState {
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Self::Draining,
            1 => Self::WaitStandby,
            2 => Self::Secondary,
            3 => Self::Primary,
            4 => Self::Single,
            _ => Self::Unknown,
        }
    }

    /// Role this state implies, if any
    pub fn role_hint(self) -> Option<NodeRole> {
        match self {
            Self::Primary | Self::Single => Some(NodeRole::Writer),
            Self::Secondary | Self::WaitStandby => Some(NodeRole::Replica),
            Self::Draining | Self::Unknown => None,
        }
    }
}

/// One row of the coordinator's node catalog
#[derive(Debug, Clone)]
pub struct CoordinatorNode {
    pub name: String,
    pub state: CoordinatorNodeState,
    pub healthy: bool,
}

/// Point-in-time view of the coordinator's node catalog
#[derive(Debug, Clone, Default)]
pub struct CoordinatorState {
    pub nodes: Vec<CoordinatorNode>,
}

impl CoordinatorState {
    pub fn role_hint_for(&self, node_name: &str) -> Option<NodeRole> {
        self.nodes
            .iter()
            .find(|n| n.name == node_name)
            .and_then(|n| n.state.role_hint())
    }
}

/// Fetch the coordinator's view of the cluster.
///
/// Failure here degrades the cycle (no role hints) rather than failing it;
/// the caller decides how loudly to log.
pub async fn fetch_coordinator_state(
    config: &CoordinatorConfig,
    fetch_timeout: Duration,
) -> Result<CoordinatorState, ConnectionError> {
    let fetch = async {
        let mut conn = NodeConnection::connect(
            &config.addr(),
            &config.user,
            &config.password,
            &config.database,
        )
        .await?;

        let rows = conn.simple_query(STATE_QUERY).await?;
        conn.close().await;

        let nodes = rows
            .into_iter()
            .filter_map(|row| {
                let mut cols = row.into_iter();
                let name = cols.next().flatten()?;
                let state_code = cols
                    .next()
                    .flatten()
                    .and_then(|v| v.parse::<i32>().ok())
                    .unwrap_or(-1);
                let health_code = cols
                    .next()
                    .flatten()
                    .and_then(|v| v.parse::<i32>().ok())
                    .unwrap_or(0);
                Some(CoordinatorNode {
                    name,
                    state: CoordinatorNodeState::from_code(state_code),
                    healthy: health_code == 1,
                })
            })
            .collect();

        Ok(CoordinatorState { nodes })
    };

    match timeout(fetch_timeout, fetch).await {
        Ok(result) => result,
        Err(_) => Err(ConnectionError::Connect(format!(
            "coordinator query timed out after {}s",
            fetch_timeout.as_secs()
        ))),
    }
}

/// Fill unresolved roles from the coordinator's catalog.
///
/// Only records whose own probe left the role Unknown are touched; a
/// directly observed role always wins over the coordinator's report.
pub fn apply_role_hints(records: &mut [NodeHealthRecord], state: &CoordinatorState) {
    for record in records.iter_mut() {
        if record.role == NodeRole::Unknown {
            if let Some(hint) = state.role_hint_for(&record.name) {
                record.role = hint;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_code_mapping() {
        assert_eq!(
            CoordinatorNodeState::from_code(3),
            CoordinatorNodeState::Primary
        );
        assert_eq!(
            CoordinatorNodeState::from_code(2),
            CoordinatorNodeState::Secondary
        );
        assert_eq!(
            CoordinatorNodeState::from_code(1),
            CoordinatorNodeState::WaitStandby
        );
        assert_eq!(
            CoordinatorNodeState::from_code(0),
            CoordinatorNodeState::Draining
        );
        assert_eq!(
            CoordinatorNodeState::from_code(4),
            CoordinatorNodeState::Single
        );
        assert_eq!(
            CoordinatorNodeState::from_code(-1),
            CoordinatorNodeState::Unknown
        );
        assert_eq!(
            CoordinatorNodeState::from_code(99),
            CoordinatorNodeState::Unknown
        );
    }

    #[test]
    fn test_role_hints() {
        assert_eq!(
            CoordinatorNodeState::Primary.role_hint(),
            Some(NodeRole::Writer)
        );
        assert_eq!(
            CoordinatorNodeState::Single.role_hint(),
            Some(NodeRole::Writer)
        );
        assert_eq!(
            CoordinatorNodeState::Secondary.role_hint(),
            Some(NodeRole::Replica)
        );
        assert_eq!(CoordinatorNodeState::Draining.role_hint(), None);
    }

    #[test]
    fn test_apply_role_hints_only_touches_unknown() {
        let now = 1_700_000_000;
        let mut records = vec![
            NodeHealthRecord {
                name: "pg-1".to_string(),
                reachable: true,
                role: NodeRole::Writer,
                in_recovery: Some(false),
                lag_bytes: None,
                server_version: None,
                last_error: None,
                checked_at_epoch_secs: now,
            },
            NodeHealthRecord::unreachable("pg-2", "connection refused", now),
            NodeHealthRecord::unreachable("pg-3", "connection refused", now),
        ];

        let state = CoordinatorState {
            nodes: vec![
                CoordinatorNode {
                    name: "pg-1".to_string(),
                    state: CoordinatorNodeState::Secondary, // stale report
                    healthy: true,
                },
                CoordinatorNode {
                    name: "pg-2".to_string(),
                    state: CoordinatorNodeState::Secondary,
                    healthy: false,
                },
            ],
        };

        apply_role_hints(&mut records, &state);

        // Observed role wins over the coordinator's stale view
        assert_eq!(records[0].role, NodeRole::Writer);
        // Unreachable node picks up the coordinator's hint
        assert_eq!(records[1].role, NodeRole::Replica);
        // No coordinator data: stays unknown
        assert_eq!(records[2].role, NodeRole::Unknown);
    }
}
