//! Alert rules and evaluation
//!
//! Rules are a closed set of named conditions loaded once at startup;
//! the evaluator owns all cross-cycle alert state.

mod evaluator;
mod rule;

pub use evaluator::{AlertEvent, RuleEvaluator, TriggerValues};
pub use rule::{AlertCondition, AlertRule, Severity};
