//! Snapshot rendering
//!
//! Two pure views of a `ClusterSnapshot`: a JSON form with stable field
//! names for machine consumption, and a plain-text table for humans.
//! Neither does any I/O.

use crate::cluster::{ClusterSnapshot, NodeHealthRecord, NodeRole};

/// Machine-readable form; parsing it back yields the source snapshot
pub fn structured(snapshot: &ClusterSnapshot) -> serde_json::Value {
    // ClusterSnapshot serializes with stable field names by construction
    serde_json::to_value(snapshot).unwrap_or(serde_json::Value::Null)
}

/// Pretty-printed JSON for command output
pub fn structured_json(snapshot: &ClusterSnapshot) -> String {
    serde_json::to_string_pretty(&structured(snapshot)).unwrap_or_else(|_| "{}".to_string())
}

/// Human-readable tabular report
pub fn tabular(snapshot: &ClusterSnapshot) -> String {
    let mut out = String::new();
    out.push_str("PostgreSQL HA Cluster Health Report\n");
    out.push_str("===================================\n");
    out.push_str(&format!("Generated: {} (unix)\n\n", snapshot.taken_at_epoch_secs));

    out.push_str("Cluster overview:\n");
    out.push_str(&format!("  Writer nodes:        {}\n", snapshot.writer_count));
    out.push_str(&format!("  Replica nodes:       {}\n", snapshot.replica_count));
    out.push_str(&format!("  Unhealthy nodes:     {}\n", snapshot.unhealthy_count));
    out.push_str(&format!(
        "  Max replication lag: {}\n",
        lag_display(snapshot.max_lag_bytes)
    ));
    out.push_str(&format!(
        "  Failover ready:      {}\n",
        if snapshot.failover_ready { "yes" } else { "no" }
    ));

    out.push_str("\nNode details:\n");
    for node in &snapshot.nodes {
        out.push_str(&node_line(node));
        out.push('\n');
    }

    if !snapshot.issues.is_empty() {
        out.push_str("\nIssues detected:\n");
        for issue in &snapshot.issues {
            out.push_str(&format!("  - {issue}\n"));
        }
    }

    out
}

fn node_line(node: &NodeHealthRecord) -> String {
    let marker = if !node.reachable {
        "[DOWN]"
    } else if node.last_error.is_some() {
        "[WARN]"
    } else {
        "[ OK ]"
    };

    let mut line = format!("  {} {} ({})", marker, node.name, role_str(node.role));

    if let Some(lag) = node.lag_bytes {
        line.push_str(&format!(", lag {:.2} MB", lag as f64 / (1024.0 * 1024.0)));
    }
    if let Some(version) = &node.server_version {
        // "PostgreSQL 16.2 on x86_64..." -> "PostgreSQL 16.2"
        let short: Vec<&str> = version.split_whitespace().take(2).collect();
        line.push_str(&format!(", {}", short.join(" ")));
    }
    if let Some(error) = &node.last_error {
        line.push_str(&format!(" - {error}"));
    }

    line
}

fn role_str(role: NodeRole) -> &'static str {
    match role {
        NodeRole::Writer => "writer",
        NodeRole::Replica => "replica",
        NodeRole::Unknown => "unknown",
    }
}

fn lag_display(lag: Option<u64>) -> String {
    match lag {
        Some(bytes) => format!("{bytes} bytes"),
        None => "n/a".to_string(),
    }
}

/// Verdict for the failover readiness check; evaluates without mutating
/// anything anywhere.
pub fn failover_verdict(snapshot: &ClusterSnapshot) -> serde_json::Value {
    let current_writer = snapshot
        .nodes
        .iter()
        .find(|n| n.role == NodeRole::Writer)
        .map(|n| n.name.clone());

    serde_json::json!({
        "success": snapshot.failover_ready,
        "current_writer": current_writer,
        "replica_count": snapshot.replica_count,
        "unhealthy_count": snapshot.unhealthy_count,
        "max_lag_bytes": snapshot.max_lag_bytes,
        "issues": snapshot.issues,
        "timestamp": snapshot.taken_at_epoch_secs,
    })
}
