use serde::Deserialize;

use crate::alert::{AlertCondition, Severity};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Connection settings for the failover coordinator (pg_auto_failover monitor)
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    /// Monitored cluster nodes
    #[serde(default = "default_nodes")]
    pub nodes: Vec<NodeConfig>,
    /// Credentials for direct per-node probe connections
    #[serde(default)]
    pub postgres: PostgresConfig,
    #[serde(default)]
    pub thresholds: ThresholdsConfig,
    /// Alert rules; when empty the built-in default rule set is used
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
    #[serde(default)]
    pub channels: ChannelsConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

// ============================================================================
// Coordinator / Node Configuration
// ============================================================================

/// Coordinator: the pg_auto_failover monitor database.
///
/// Consumed read-only; this subsystem never issues promote/failover commands.
#[derive(Debug, Clone, Deserialize)]
pub struct CoordinatorConfig {
    #[serde(default = "default_coordinator_host")]
    pub host: String,
    #[serde(default = "default_coordinator_port")]
    pub port: u16,
    #[serde(default = "default_coordinator_database")]
    pub database: String,
    #[serde(default = "default_coordinator_user")]
    pub user: String,
    #[serde(default = "default_coordinator_user")]
    pub password: String,
}

fn default_coordinator_host() -> String {
    "localhost".to_string()
}

fn default_coordinator_port() -> u16 {
    5431
}

fn default_coordinator_database() -> String {
    "pg_auto_failover".to_string()
}

fn default_coordinator_user() -> String {
    "autoctl_node".to_string()
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            host: default_coordinator_host(),
            port: default_coordinator_port(),
            database: default_coordinator_database(),
            user: default_coordinator_user(),
            password: default_coordinator_user(),
        }
    }
}

/// A single monitored PostgreSQL node
#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    /// Logical node name (unique within the cluster)
    pub name: String,
    pub host: String,
    #[serde(default = "default_node_port")]
    pub port: u16,
    /// Declared role hint; the observed role from probing takes precedence
    #[serde(default)]
    pub role: RoleHint,
    /// Preferred promotion order on failover (lower is preferred)
    #[serde(default)]
    pub failover_priority: Option<u32>,
}

fn default_node_port() -> u16 {
    5432
}

fn default_nodes() -> Vec<NodeConfig> {
    vec![
        NodeConfig {
            name: "primary".to_string(),
            host: "localhost".to_string(),
            port: 5432,
            role: RoleHint::Writer,
            failover_priority: None,
        },
        NodeConfig {
            name: "replica1".to_string(),
            host: "localhost".to_string(),
            port: 5433,
            role: RoleHint::Replica,
            failover_priority: None,
        },
        NodeConfig {
            name: "replica2".to_string(),
            host: "localhost".to_string(),
            port: 5434,
            role: RoleHint::Replica,
            failover_priority: None,
        },
    ]
}

/// Declared role of a node in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RoleHint {
    Writer,
    #[default]
    Replica,
}

/// Credentials used for direct node probe connections
#[derive(Debug, Clone, Deserialize)]
pub struct PostgresConfig {
    #[serde(default = "default_postgres_user")]
    pub user: String,
    #[serde(default = "default_postgres_password")]
    pub password: String,
    #[serde(default = "default_postgres_user")]
    pub database: String,
}

fn default_postgres_user() -> String {
    "postgres".to_string()
}

fn default_postgres_password() -> String {
    "postgres_password".to_string()
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            user: default_postgres_user(),
            password: default_postgres_password(),
            database: default_postgres_user(),
        }
    }
}

// ============================================================================
// Thresholds
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ThresholdsConfig {
    /// Replication lag above this is critical and blocks failover readiness
    #[serde(default = "default_max_replication_lag_bytes")]
    pub max_replication_lag_bytes: u64,
    /// Per-node connection timeout (also bounds the probe query battery)
    #[serde(default = "default_connection_timeout_seconds")]
    pub connection_timeout_seconds: u64,
    /// Interval between polling cycles in monitor mode
    #[serde(default = "default_poll_interval_seconds")]
    pub poll_interval_seconds: u64,
}

fn default_max_replication_lag_bytes() -> u64 {
    1_000_000
}

fn default_connection_timeout_seconds() -> u64 {
    5
}

fn default_poll_interval_seconds() -> u64 {
    30
}

impl Default for ThresholdsConfig {
    fn default() -> Self {
        Self {
            max_replication_lag_bytes: default_max_replication_lag_bytes(),
            connection_timeout_seconds: default_connection_timeout_seconds(),
            poll_interval_seconds: default_poll_interval_seconds(),
        }
    }
}

// ============================================================================
// Alert Rules
// ============================================================================

/// One configured alert rule.
///
/// `condition` is a closed set of named predicates; an unrecognized name is
/// a parse error, surfaced at startup rather than skipped at runtime.
#[derive(Debug, Clone, Deserialize)]
pub struct RuleConfig {
    /// Rule name; defaults to the condition name
    #[serde(default)]
    pub name: Option<String>,
    pub condition: AlertCondition,
    /// Threshold value, required by threshold-style conditions
    #[serde(default)]
    pub threshold: Option<u64>,
    pub severity: Severity,
    #[serde(default = "default_cooldown_seconds")]
    pub cooldown_seconds: u64,
    #[serde(default = "default_rule_enabled")]
    pub enabled: bool,
}

fn default_cooldown_seconds() -> u64 {
    300
}

fn default_rule_enabled() -> bool {
    true
}

// ============================================================================
// Notification Channels
// ============================================================================

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ChannelsConfig {
    #[serde(default)]
    pub email: Option<EmailChannelConfig>,
    #[serde(default)]
    pub webhook: Vec<WebhookChannelConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailChannelConfig {
    #[serde(default = "default_channel_enabled")]
    pub enabled: bool,
    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default = "default_from_email")]
    pub from_email: String,
    #[serde(default)]
    pub to_emails: Vec<String>,
    /// Domain announced in EHLO
    #[serde(default = "default_helo_domain")]
    pub helo_domain: String,
}

fn default_channel_enabled() -> bool {
    true
}

fn default_smtp_host() -> String {
    "localhost".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_from_email() -> String {
    "monitor@example.com".to_string()
}

fn default_helo_domain() -> String {
    "localhost".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookChannelConfig {
    #[serde(default = "default_channel_enabled")]
    pub enabled: bool,
    pub url: String,
}

// ============================================================================
// Metrics
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_listen_addr")]
    pub listen_addr: String,
}

fn default_metrics_listen_addr() -> String {
    "127.0.0.1:9187".to_string()
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: default_metrics_listen_addr(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            coordinator: CoordinatorConfig::default(),
            nodes: default_nodes(),
            postgres: PostgresConfig::default(),
            thresholds: ThresholdsConfig::default(),
            rules: Vec::new(),
            channels: ChannelsConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Get the address string (host:port)
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl CoordinatorConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl ThresholdsConfig {
    pub fn connection_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.connection_timeout_seconds)
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.poll_interval_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.coordinator.host, "localhost");
        assert_eq!(config.coordinator.port, 5431);
        assert_eq!(config.coordinator.database, "pg_auto_failover");
        assert_eq!(config.nodes.len(), 3);
        assert_eq!(config.nodes[0].name, "primary");
        assert_eq!(config.nodes[0].role, RoleHint::Writer);
        assert_eq!(config.nodes[2].port, 5434);
        assert_eq!(config.thresholds.max_replication_lag_bytes, 1_000_000);
        assert_eq!(config.thresholds.connection_timeout_seconds, 5);
        assert_eq!(config.thresholds.poll_interval_seconds, 30);
        assert!(config.rules.is_empty());
        assert!(config.channels.email.is_none());
        assert!(config.channels.webhook.is_empty());
        assert!(!config.metrics.enabled);
    }

    #[test]
    fn test_parse_nodes_and_thresholds() {
        let toml = r#"
[coordinator]
host = "pgaf-monitor"
port = 5431

[[nodes]]
name = "pg-1"
host = "10.0.0.1"
role = "writer"

[[nodes]]
name = "pg-2"
host = "10.0.0.2"
port = 5433
failover_priority = 1

[thresholds]
max_replication_lag_bytes = 2000000
connection_timeout_seconds = 3
poll_interval_seconds = 15
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.coordinator.host, "pgaf-monitor");
        assert_eq!(config.nodes.len(), 2);
        assert_eq!(config.nodes[0].addr(), "10.0.0.1:5432");
        assert_eq!(config.nodes[0].role, RoleHint::Writer);
        assert_eq!(config.nodes[1].role, RoleHint::Replica); // default
        assert_eq!(config.nodes[1].failover_priority, Some(1));
        assert_eq!(config.thresholds.max_replication_lag_bytes, 2_000_000);
        assert_eq!(config.thresholds.poll_interval_seconds, 15);
    }

    #[test]
    fn test_parse_rules() {
        let toml = r#"
[[rules]]
condition = "no_writer"
severity = "critical"
cooldown_seconds = 120

[[rules]]
name = "lag_too_high"
condition = "lag_exceeds"
threshold = 500000
severity = "warning"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.rules.len(), 2);
        assert_eq!(config.rules[0].condition, AlertCondition::NoWriter);
        assert_eq!(config.rules[0].severity, Severity::Critical);
        assert_eq!(config.rules[0].cooldown_seconds, 120);
        assert!(config.rules[0].enabled);
        assert_eq!(config.rules[1].name.as_deref(), Some("lag_too_high"));
        assert_eq!(config.rules[1].threshold, Some(500_000));
        assert_eq!(config.rules[1].cooldown_seconds, 300); // default
    }

    #[test]
    fn test_unknown_condition_is_a_parse_error() {
        let toml = r#"
[[rules]]
condition = "primary_on_fire"
severity = "critical"
"#;
        let result: Result<Config, _> = toml::from_str(toml);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_channels() {
        let toml = r#"
[channels.email]
smtp_host = "smtp.internal"
smtp_port = 25
from_email = "alerts@example.com"
to_emails = ["oncall@example.com", "dba@example.com"]

[[channels.webhook]]
url = "http://hooks.internal/pg-ha"

[[channels.webhook]]
enabled = false
url = "http://hooks.internal/disabled"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let email = config.channels.email.unwrap();
        assert!(email.enabled);
        assert_eq!(email.smtp_host, "smtp.internal");
        assert_eq!(email.smtp_port, 25);
        assert_eq!(email.to_emails.len(), 2);
        assert_eq!(config.channels.webhook.len(), 2);
        assert!(config.channels.webhook[0].enabled);
        assert!(!config.channels.webhook[1].enabled);
    }

    #[test]
    fn test_default_matches_empty_parse() {
        let parsed: Config = toml::from_str("").unwrap();
        let built = Config::default();
        assert_eq!(parsed.nodes.len(), built.nodes.len());
        assert_eq!(parsed.coordinator.host, built.coordinator.host);
        assert_eq!(
            parsed.thresholds.poll_interval_seconds,
            built.thresholds.poll_interval_seconds
        );
    }

    #[test]
    fn test_parse_metrics() {
        let toml = r#"
[metrics]
enabled = true
listen_addr = "0.0.0.0:9187"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(config.metrics.enabled);
        assert_eq!(config.metrics.listen_addr, "0.0.0.0:9187");
    }
}
