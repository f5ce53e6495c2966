//! Folding one cycle's node records into a cluster snapshot

use super::snapshot::{ClusterSnapshot, NodeHealthRecord, NodeRole};

/// Aggregate one polling cycle's records into a snapshot.
///
/// Pure function of its inputs: no I/O, deterministic, and total: a cycle
/// where every node is unreachable still yields a (degenerate) snapshot.
///
/// Failover readiness requires exactly one writer, at least one healthy
/// replica, and no observed lag at or above the critical threshold.
pub fn aggregate(
    records: Vec<NodeHealthRecord>,
    critical_lag_bytes: u64,
    taken_at_epoch_secs: u64,
) -> ClusterSnapshot {
    let mut writer_count = 0;
    let mut replica_count = 0;
    let mut unhealthy_count = 0;
    let mut healthy_replicas = 0;
    let mut max_lag_bytes: Option<u64> = None;
    let mut issues = Vec::new();

    for record in &records {
        match record.role {
            NodeRole::Writer => writer_count += 1,
            NodeRole::Replica => replica_count += 1,
            NodeRole::Unknown => {}
        }

        if record.is_unhealthy() {
            unhealthy_count += 1;
            let reason = record.last_error.as_deref().unwrap_or("role unknown");
            issues.push(format!("node {}: {}", record.name, reason));
        }

        if record.is_healthy_replica() {
            healthy_replicas += 1;
        }

        if let Some(lag) = record.lag_bytes {
            max_lag_bytes = Some(max_lag_bytes.map_or(lag, |m| m.max(lag)));
        }
    }

    if writer_count == 0 {
        issues.push("no writer node found".to_string());
    } else if writer_count > 1 {
        issues.push(format!("multiple writer nodes detected ({writer_count})"));
    }

    let lag_ok = max_lag_bytes.map_or(true, |lag| lag < critical_lag_bytes);
    if !lag_ok {
        issues.push(format!(
            "replication lag {} bytes exceeds critical threshold {} bytes",
            max_lag_bytes.unwrap_or(0),
            critical_lag_bytes
        ));
    }

    let failover_ready = writer_count == 1 && healthy_replicas >= 1 && lag_ok;

    ClusterSnapshot {
        taken_at_epoch_secs,
        writer_count,
        replica_count,
        unhealthy_count,
        max_lag_bytes,
        failover_ready,
        issues,
        nodes: records,
    }
}
