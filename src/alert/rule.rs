use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cluster::ClusterSnapshot;
use crate::config::RuleConfig;

/// The closed set of alert conditions.
///
/// Conditions are named predicates over a snapshot, dispatched via an
/// explicit match: a condition name that is not one of these fails
/// config parsing at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertCondition {
    NoWriter,
    MultipleWriters,
    UnhealthyNodePresent,
    LagExceeds,
    FailoverNotReady,
}

impl AlertCondition {
    pub fn name(&self) -> &'static str {
        match self {
            Self::NoWriter => "no_writer",
            Self::MultipleWriters => "multiple_writers",
            Self::UnhealthyNodePresent => "unhealthy_node_present",
            Self::LagExceeds => "lag_exceeds",
            Self::FailoverNotReady => "failover_not_ready",
        }
    }

    /// Evaluate the predicate against a snapshot
    pub fn holds(&self, snapshot: &ClusterSnapshot, threshold: Option<u64>) -> bool {
        match self {
            Self::NoWriter => snapshot.writer_count == 0,
            Self::MultipleWriters => snapshot.writer_count > 1,
            Self::UnhealthyNodePresent => snapshot.unhealthy_count > 0,
            Self::LagExceeds => match (snapshot.max_lag_bytes, threshold) {
                (Some(lag), Some(threshold)) => lag > threshold,
                _ => false,
            },
            Self::FailoverNotReady => !snapshot.failover_ready,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Critical => "critical",
            Self::Warning => "warning",
            Self::Info => "info",
        };
        f.write_str(s)
    }
}

/// A configured alert rule; read-only after startup
#[derive(Debug, Clone)]
pub struct AlertRule {
    pub name: String,
    pub condition: AlertCondition,
    pub threshold: Option<u64>,
    pub severity: Severity,
    pub cooldown: Duration,
    pub enabled: bool,
}

impl AlertRule {
    pub fn from_config(config: &RuleConfig) -> Self {
        Self {
            name: config
                .name
                .clone()
                .unwrap_or_else(|| config.condition.name().to_string()),
            condition: config.condition,
            threshold: config.threshold,
            severity: config.severity,
            cooldown: Duration::from_secs(config.cooldown_seconds),
            enabled: config.enabled,
        }
    }

    /// The built-in rule set, used when no rules are configured
    pub fn default_rules(critical_lag_bytes: u64, cooldown: Duration) -> Vec<Self> {
        vec![
            Self {
                name: "no_writer".to_string(),
                condition: AlertCondition::NoWriter,
                threshold: None,
                severity: Severity::Critical,
                cooldown,
                enabled: true,
            },
            Self {
                name: "multiple_writers".to_string(),
                condition: AlertCondition::MultipleWriters,
                threshold: None,
                severity: Severity::Critical,
                cooldown,
                enabled: true,
            },
            Self {
                name: "unhealthy_node_present".to_string(),
                condition: AlertCondition::UnhealthyNodePresent,
                threshold: None,
                severity: Severity::Warning,
                cooldown,
                enabled: true,
            },
            Self {
                name: "lag_exceeds".to_string(),
                condition: AlertCondition::LagExceeds,
                threshold: Some(critical_lag_bytes),
                severity: Severity::Warning,
                cooldown,
                enabled: true,
            },
            Self {
                name: "failover_not_ready".to_string(),
                condition: AlertCondition::FailoverNotReady,
                threshold: None,
                severity: Severity::Info,
                cooldown,
                enabled: true,
            },
        ]
    }

    /// Human-readable alert message for a snapshot this rule fired on
    pub fn message(&self, snapshot: &ClusterSnapshot) -> String {
        match self.condition {
            AlertCondition::NoWriter => "no writer node found in the cluster".to_string(),
            AlertCondition::MultipleWriters => {
                format!("multiple writer nodes detected ({})", snapshot.writer_count)
            }
            AlertCondition::UnhealthyNodePresent => {
                format!("{} unhealthy node(s) detected", snapshot.unhealthy_count)
            }
            AlertCondition::LagExceeds => {
                let lag_mb = snapshot.max_lag_bytes.unwrap_or(0) as f64 / (1024.0 * 1024.0);
                format!("replication lag {lag_mb:.2} MB exceeds configured threshold")
            }
            AlertCondition::FailoverNotReady => "cluster is not ready for failover".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{aggregate, NodeHealthRecord, NodeRole};

    fn snapshot(writers: usize, replicas: usize, lag: Option<u64>) -> ClusterSnapshot {
        let mut records = Vec::new();
        for i in 0..writers {
            records.push(NodeHealthRecord {
                name: format!("w{i}"),
                reachable: true,
                role: NodeRole::Writer,
                in_recovery: Some(false),
                lag_bytes: None,
                server_version: None,
                last_error: None,
                checked_at_epoch_secs: 0,
            });
        }
        for i in 0..replicas {
            records.push(NodeHealthRecord {
                name: format!("r{i}"),
                reachable: true,
                role: NodeRole::Replica,
                in_recovery: Some(true),
                lag_bytes: lag,
                server_version: None,
                last_error: None,
                checked_at_epoch_secs: 0,
            });
        }
        aggregate(records, 1_000_000, 0)
    }

    #[test]
    fn test_no_writer_condition() {
        assert!(AlertCondition::NoWriter.holds(&snapshot(0, 2, Some(0)), None));
        assert!(!AlertCondition::NoWriter.holds(&snapshot(1, 2, Some(0)), None));
    }

    #[test]
    fn test_multiple_writers_condition_ignores_replica_health() {
        assert!(AlertCondition::MultipleWriters.holds(&snapshot(2, 0, None), None));
        assert!(AlertCondition::MultipleWriters.holds(&snapshot(3, 2, Some(0)), None));
        assert!(!AlertCondition::MultipleWriters.holds(&snapshot(1, 2, Some(0)), None));
    }

    #[test]
    fn test_lag_exceeds_needs_both_lag_and_threshold() {
        let snap = snapshot(1, 1, Some(500));
        assert!(AlertCondition::LagExceeds.holds(&snap, Some(100)));
        assert!(!AlertCondition::LagExceeds.holds(&snap, Some(500))); // strictly greater
        assert!(!AlertCondition::LagExceeds.holds(&snap, None));

        let no_lag = snapshot(1, 0, None);
        assert!(!AlertCondition::LagExceeds.holds(&no_lag, Some(100)));
    }

    #[test]
    fn test_failover_not_ready_condition() {
        assert!(AlertCondition::FailoverNotReady.holds(&snapshot(0, 2, Some(0)), None));
        assert!(!AlertCondition::FailoverNotReady.holds(&snapshot(1, 1, Some(0)), None));
    }

    #[test]
    fn test_default_rules_cover_all_conditions() {
        let rules = AlertRule::default_rules(1_000_000, Duration::from_secs(300));
        assert_eq!(rules.len(), 5);
        assert!(rules.iter().all(|r| r.enabled));
        let lag_rule = rules
            .iter()
            .find(|r| r.condition == AlertCondition::LagExceeds)
            .unwrap();
        assert_eq!(lag_rule.threshold, Some(1_000_000));
        assert_eq!(lag_rule.severity, Severity::Warning);
    }

    #[test]
    fn test_rule_name_defaults_to_condition_name() {
        let rule = AlertRule::from_config(&RuleConfig {
            name: None,
            condition: AlertCondition::NoWriter,
            threshold: None,
            severity: Severity::Critical,
            cooldown_seconds: 60,
            enabled: true,
        });
        assert_eq!(rule.name, "no_writer");
        assert_eq!(rule.cooldown, Duration::from_secs(60));
    }
}
