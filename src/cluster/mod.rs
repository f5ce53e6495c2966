//! Cluster state model
//!
//! Per-cycle node health records and the pure aggregation that folds them
//! into a point-in-time cluster snapshot.

mod aggregate;
mod snapshot;

pub use aggregate::aggregate;
pub use snapshot::{now_epoch_secs, ClusterSnapshot, NodeHealthRecord, NodeRole};
