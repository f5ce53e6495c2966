//! Stateful rule evaluation with cooldown suppression
//!
//! Each rule is a two-state machine (Quiet/Firing). An event is emitted
//! only on the Quiet → Firing transition, and only when the rule's
//! cooldown has elapsed since it last fired. On recovery the firing
//! timestamp is retained (carry-over policy): a renewed breach inside the
//! cooldown window of the previous firing stays suppressed, so a flapping
//! condition cannot generate an event per flap.

use std::collections::HashMap;
use std::time::Instant;

use serde::Serialize;
use tracing::debug;

use crate::cluster::ClusterSnapshot;

use super::rule::{AlertRule, Severity};

/// Values that triggered an alert, attached to the event for delivery
#[derive(Debug, Clone, Serialize)]
pub struct TriggerValues {
    pub writer_count: usize,
    pub replica_count: usize,
    pub unhealthy_count: usize,
    pub max_lag_bytes: Option<u64>,
    pub failover_ready: bool,
}

impl TriggerValues {
    fn from_snapshot(snapshot: &ClusterSnapshot) -> Self {
        Self {
            writer_count: snapshot.writer_count,
            replica_count: snapshot.replica_count,
            unhealthy_count: snapshot.unhealthy_count,
            max_lag_bytes: snapshot.max_lag_bytes,
            failover_ready: snapshot.failover_ready,
        }
    }
}

/// Emitted when a rule transitions into Firing and survives its cooldown
/// check; consumed exactly once by the dispatcher.
#[derive(Debug, Clone, Serialize)]
pub struct AlertEvent {
    pub rule: String,
    pub severity: Severity,
    pub message: String,
    pub snapshot_epoch_secs: u64,
    pub values: TriggerValues,
}

/// Per-rule runtime state; mutated only by the evaluator
#[derive(Debug, Default)]
struct RuleState {
    last_fired: Option<Instant>,
    active: bool,
}

/// Holds the configured rules and their state across cycles.
///
/// This is the only state that survives a cycle; nothing else in the
/// pipeline is mutable across cycles.
pub struct RuleEvaluator {
    rules: Vec<AlertRule>,
    states: HashMap<String, RuleState>,
}

impl RuleEvaluator {
    pub fn new(rules: Vec<AlertRule>) -> Self {
        let states = rules
            .iter()
            .map(|r| (r.name.clone(), RuleState::default()))
            .collect();
        Self { rules, states }
    }

    pub fn rules(&self) -> &[AlertRule] {
        &self.rules
    }

    /// Whether a rule's condition held in the most recent cycle
    pub fn is_active(&self, rule_name: &str) -> bool {
        self.states.get(rule_name).is_some_and(|s| s.active)
    }

    /// Evaluate every rule against a new snapshot.
    ///
    /// Called exactly once per cycle; `now` is passed in so the cooldown
    /// arithmetic is testable without sleeping.
    pub fn evaluate(&mut self, snapshot: &ClusterSnapshot, now: Instant) -> Vec<AlertEvent> {
        let mut events = Vec::new();

        for rule in &self.rules {
            if !rule.enabled {
                continue;
            }

            let holds = rule.condition.holds(snapshot, rule.threshold);
            let state = self.states.entry(rule.name.clone()).or_default();

            if !holds {
                if state.active {
                    debug!(rule = %rule.name, "Rule recovered");
                }
                // last_fired is kept so a re-breach still respects the
                // cooldown of the previous firing
                state.active = false;
                continue;
            }

            let cooled_down = match state.last_fired {
                None => true,
                Some(fired_at) => now.duration_since(fired_at) >= rule.cooldown,
            };

            if cooled_down {
                state.last_fired = Some(now);
                state.active = true;
                events.push(AlertEvent {
                    rule: rule.name.clone(),
                    severity: rule.severity,
                    message: rule.message(snapshot),
                    snapshot_epoch_secs: snapshot.taken_at_epoch_secs,
                    values: TriggerValues::from_snapshot(snapshot),
                });
            } else {
                debug!(rule = %rule.name, "Rule still firing, suppressed by cooldown");
                state.active = true;
            }
        }

        events
    }
}
