mod schema;

pub use schema::*;

use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

use crate::alert::AlertCondition;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut config: Config = toml::from_str(&content)?;
    apply_env_overrides(&mut config);
    validate(&config)?;
    Ok(config)
}

/// PGAF_MONITOR_HOST overrides the coordinator host, matching the
/// convention of the Docker compose setup this monitor runs next to.
fn apply_env_overrides(config: &mut Config) {
    if let Ok(host) = std::env::var("PGAF_MONITOR_HOST") {
        if !host.is_empty() {
            config.coordinator.host = host;
        }
    }
}

/// Startup validation. A broken rule set or node list is fatal here,
/// never silently skipped at runtime.
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.nodes.is_empty() {
        return Err(ConfigError::Invalid("no nodes configured".into()));
    }

    let mut names = HashSet::new();
    for node in &config.nodes {
        if !names.insert(node.name.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "duplicate node name: {}",
                node.name
            )));
        }
    }

    let mut rule_names = HashSet::new();
    for rule in &config.rules {
        let name = rule
            .name
            .clone()
            .unwrap_or_else(|| rule.condition.name().to_string());
        if !rule_names.insert(name.clone()) {
            return Err(ConfigError::Invalid(format!("duplicate rule name: {name}")));
        }
        if rule.condition == AlertCondition::LagExceeds && rule.threshold.is_none() {
            return Err(ConfigError::Invalid(format!(
                "rule {name}: condition lag_exceeds requires a threshold"
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::Severity;

    #[test]
    fn test_validate_default_config() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_node_list() {
        let mut config = Config::default();
        config.nodes.clear();
        assert!(matches!(validate(&config), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_duplicate_node_names() {
        let mut config = Config::default();
        let dup = config.nodes[0].clone();
        config.nodes.push(dup);
        assert!(matches!(validate(&config), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_lag_rule_without_threshold() {
        let mut config = Config::default();
        config.rules.push(RuleConfig {
            name: None,
            condition: AlertCondition::LagExceeds,
            threshold: None,
            severity: Severity::Warning,
            cooldown_seconds: 300,
            enabled: true,
        });
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("lag_exceeds"));
    }

    #[test]
    fn test_validate_rejects_duplicate_rule_names() {
        let mut config = Config::default();
        for _ in 0..2 {
            config.rules.push(RuleConfig {
                name: Some("watch_writer".to_string()),
                condition: AlertCondition::NoWriter,
                threshold: None,
                severity: Severity::Critical,
                cooldown_seconds: 300,
                enabled: true,
            });
        }
        assert!(matches!(validate(&config), Err(ConfigError::Invalid(_))));
    }
}
