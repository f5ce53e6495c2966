//! Per-node probing
//!
//! One probe call produces exactly one `NodeHealthRecord` and never fails:
//! every failure mode is folded into the record. The connection is opened
//! and dropped within the call; the acquisition and the query battery are
//! each bounded by the configured timeout, so a hung node cannot stall a
//! cycle past its deadline.

use std::time::Duration;

use tokio::time::timeout;
use tracing::debug;

use crate::cluster::{now_epoch_secs, NodeHealthRecord, NodeRole};
use crate::config::{NodeConfig, PostgresConfig};

use super::connection::{ConnectionError, NodeConnection};

/// Lag of a replica behind the WAL it has already received.
/// COALESCE covers the brief window before streaming starts.
const LAG_QUERY: &str =
    "SELECT COALESCE(pg_wal_lsn_diff(pg_last_wal_receive_lsn(), pg_last_wal_replay_lsn()), 0)";

/// Probe one node: connect, run the status battery, return a record.
pub async fn probe_node(
    node: &NodeConfig,
    auth: &PostgresConfig,
    probe_timeout: Duration,
) -> NodeHealthRecord {
    let now = now_epoch_secs();
    let addr = node.addr();

    let mut conn = match timeout(
        probe_timeout,
        NodeConnection::connect(&addr, &auth.user, &auth.password, &auth.database),
    )
    .await
    {
        Ok(Ok(conn)) => conn,
        Ok(Err(e)) => {
            debug!(node = %node.name, error = %e, "Node unreachable");
            return NodeHealthRecord::unreachable(&node.name, e.to_string(), now);
        }
        Err(_) => {
            debug!(node = %node.name, "Connection timed out");
            return NodeHealthRecord::unreachable(
                &node.name,
                format!("connection timed out after {}s", probe_timeout.as_secs()),
                now,
            );
        }
    };

    let record = match timeout(probe_timeout, run_battery(&mut conn, &node.name, now)).await {
        Ok(Ok(record)) => record,
        Ok(Err(e)) => {
            debug!(node = %node.name, error = %e, "Status query failed");
            NodeHealthRecord::query_failed(&node.name, e.to_string(), now)
        }
        Err(_) => {
            debug!(node = %node.name, "Status queries timed out");
            NodeHealthRecord::query_failed(
                &node.name,
                format!("status queries timed out after {}s", probe_timeout.as_secs()),
                now,
            )
        }
    };

    conn.close().await;
    record
}

/// The fixed read-only status battery
async fn run_battery(
    conn: &mut NodeConnection,
    name: &str,
    now: u64,
) -> Result<NodeHealthRecord, ConnectionError> {
    // Liveness
    let ping = conn.query_single_value("SELECT 1").await?;
    if ping.as_deref() != Some("1") {
        return Err(ConnectionError::Query("no response to liveness check".into()));
    }

    let in_recovery = conn
        .query_single_value("SELECT pg_is_in_recovery()")
        .await?
        .map(|v| v == "t" || v == "true")
        .unwrap_or(false);

    let server_version = conn.query_single_value("SELECT version()").await?;

    let lag_bytes = if in_recovery {
        let raw = conn.query_single_value(LAG_QUERY).await?;
        Some(parse_lag_bytes(raw.as_deref()))
    } else {
        None
    };

    Ok(NodeHealthRecord {
        name: name.to_string(),
        reachable: true,
        role: if in_recovery {
            NodeRole::Replica
        } else {
            NodeRole::Writer
        },
        in_recovery: Some(in_recovery),
        lag_bytes,
        server_version,
        last_error: None,
        checked_at_epoch_secs: now,
    })
}

/// pg_wal_lsn_diff returns numeric; it can go negative across a timeline
/// switch, which we clamp to zero.
fn parse_lag_bytes(raw: Option<&str>) -> u64 {
    raw.and_then(|s| s.parse::<f64>().ok())
        .map(|v| if v.is_sign_negative() { 0.0 } else { v })
        .map(|v| v as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RoleHint;

    fn node(name: &str, port: u16) -> NodeConfig {
        NodeConfig {
            name: name.to_string(),
            host: "127.0.0.1".to_string(),
            port,
            role: RoleHint::Replica,
            failover_priority: None,
        }
    }

    #[test]
    fn test_parse_lag_bytes() {
        assert_eq!(parse_lag_bytes(Some("16384")), 16384);
        assert_eq!(parse_lag_bytes(Some("0")), 0);
        assert_eq!(parse_lag_bytes(Some("-4096")), 0);
        assert_eq!(parse_lag_bytes(Some("not a number")), 0);
        assert_eq!(parse_lag_bytes(None), 0);
    }

    #[tokio::test]
    async fn test_probe_refused_connection_is_unreachable() {
        // Port 1 on localhost: nothing listens there
        let record = probe_node(
            &node("pg-down", 1),
            &PostgresConfig::default(),
            Duration::from_secs(1),
        )
        .await;

        assert_eq!(record.name, "pg-down");
        assert!(!record.reachable);
        assert_eq!(record.role, NodeRole::Unknown);
        assert!(record.lag_bytes.is_none());
        assert!(record.last_error.is_some());
    }

    #[tokio::test]
    async fn test_probe_silent_listener_times_out() {
        // A listener that accepts but never speaks the protocol
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let record = probe_node(
            &node("pg-hung", port),
            &PostgresConfig::default(),
            Duration::from_millis(200),
        )
        .await;

        assert!(!record.reachable);
        let reason = record.last_error.unwrap();
        assert!(reason.contains("timed out"), "unexpected reason: {reason}");

        server.abort();
    }
}
