//! Monitor loop
//!
//! One coordinating task per cycle fans out a probe task per node, each
//! bounded by its own timeout, so cycle latency tracks the slowest probe
//! rather than the sum. A new cycle never starts before the previous one
//! has aggregated. Shutdown is graceful: the in-flight cycle finishes,
//! then the loop stops.

use std::time::Instant;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::alert::{AlertRule, RuleEvaluator};
use crate::cluster::{aggregate, now_epoch_secs, ClusterSnapshot, NodeRole};
use crate::config::{Config, RoleHint};
use crate::metrics::metrics;
use crate::notify::{dispatch, NotificationChannel};
use crate::probe::{apply_role_hints, fetch_coordinator_state, probe_node};

#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error("probe task failed: {0}")]
    Join(String),
}

pub struct Monitor {
    config: Config,
    channels: Vec<NotificationChannel>,
    evaluator: RuleEvaluator,
}

impl Monitor {
    /// Build from validated configuration. Rules come from config, or the
    /// built-in default set when none are configured.
    pub fn new(config: Config) -> Self {
        let rules = if config.rules.is_empty() {
            AlertRule::default_rules(
                config.thresholds.max_replication_lag_bytes,
                std::time::Duration::from_secs(300),
            )
        } else {
            config.rules.iter().map(AlertRule::from_config).collect()
        };

        let channels = NotificationChannel::from_config(&config.channels);

        Self {
            config,
            channels,
            evaluator: RuleEvaluator::new(rules),
        }
    }

    /// Run exactly one polling cycle and return the snapshot.
    ///
    /// Per-node failures are absorbed into their records; only a probe
    /// task dying outright surfaces as an error.
    pub async fn run_cycle(&self) -> Result<ClusterSnapshot, CycleError> {
        let timeout = self.config.thresholds.connection_timeout();

        let probes = self.config.nodes.iter().map(|node| {
            let node = node.clone();
            let auth = self.config.postgres.clone();
            tokio::spawn(async move { probe_node(&node, &auth, timeout).await })
        });
        let probe_handles: Vec<_> = probes.collect();

        let coordinator = fetch_coordinator_state(&self.config.coordinator, timeout);
        let (coordinator_state, probe_results) =
            tokio::join!(coordinator, futures::future::join_all(probe_handles));

        let mut records = Vec::with_capacity(probe_results.len());
        for result in probe_results {
            records.push(result.map_err(|e| CycleError::Join(e.to_string()))?);
        }

        match coordinator_state {
            Ok(state) => apply_role_hints(&mut records, &state),
            Err(e) => warn!(error = %e, "Coordinator state unavailable, no role hints this cycle"),
        }

        for record in &records {
            let declared = self.config.nodes.iter().find(|n| n.name == record.name);
            let drifted = matches!(
                (declared.map(|n| n.role), record.role),
                (Some(RoleHint::Writer), NodeRole::Replica)
                    | (Some(RoleHint::Replica), NodeRole::Writer)
            );
            if drifted {
                info!(
                    node = %record.name,
                    observed = ?record.role,
                    "Node role differs from its configured hint"
                );
            }
        }

        Ok(aggregate(
            records,
            self.config.thresholds.max_replication_lag_bytes,
            now_epoch_secs(),
        ))
    }

    /// Single-pass mode: one cycle, no alert evaluation
    pub async fn run_once(&self) -> Result<ClusterSnapshot, CycleError> {
        self.run_cycle().await
    }

    /// Continuous mode: poll on the configured interval until cancelled.
    ///
    /// A cycle that errors is logged and skipped; the loop always proceeds
    /// to the next tick.
    pub async fn run(&mut self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.config.thresholds.poll_interval_seconds,
            nodes = self.config.nodes.len(),
            rules = self.evaluator.rules().len(),
            "Starting cluster monitoring"
        );

        let mut ticker = tokio::time::interval(self.config.thresholds.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Monitor loop shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    match self.run_cycle().await {
                        Ok(snapshot) => self.process_snapshot(snapshot).await,
                        Err(e) => {
                            error!(error = %e, "Polling cycle failed");
                            if self.config.metrics.enabled {
                                metrics().record_cycle_error();
                            }
                        }
                    }
                }
            }
        }
    }

    /// The healthy replica an operator would promote first, ordered by
    /// configured failover priority (lower first), then by name.
    pub fn promotion_candidate(&self, snapshot: &ClusterSnapshot) -> Option<String> {
        let mut candidates: Vec<(u32, String)> = snapshot
            .nodes
            .iter()
            .filter(|n| n.is_healthy_replica())
            .map(|n| {
                let priority = self
                    .config
                    .nodes
                    .iter()
                    .find(|c| c.name == n.name)
                    .and_then(|c| c.failover_priority)
                    .unwrap_or(u32::MAX);
                (priority, n.name.clone())
            })
            .collect();
        candidates.sort();
        candidates.into_iter().next().map(|(_, name)| name)
    }

    async fn process_snapshot(&mut self, snapshot: ClusterSnapshot) {
        if self.config.metrics.enabled {
            metrics().record_snapshot(&snapshot);
        }

        let events = self.evaluator.evaluate(&snapshot, Instant::now());

        if events.is_empty() {
            info!(
                writers = snapshot.writer_count,
                replicas = snapshot.replica_count,
                unhealthy = snapshot.unhealthy_count,
                failover_ready = snapshot.failover_ready,
                "Cycle complete"
            );
            return;
        }

        let active_rules = self
            .evaluator
            .rules()
            .iter()
            .filter(|r| self.evaluator.is_active(&r.name))
            .count();
        warn!(
            alerts = events.len(),
            active_rules = active_rules,
            "Alerts triggered this cycle"
        );
        for event in &events {
            warn!(rule = %event.rule, severity = %event.severity, message = %event.message, "Alert");
            if self.config.metrics.enabled {
                metrics().record_alert(event);
            }

            let results = dispatch(event, &self.channels).await;
            if self.config.metrics.enabled {
                for result in &results {
                    metrics().record_delivery(result);
                }
            }
        }
    }
}
