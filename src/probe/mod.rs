//! Node and coordinator probing
//!
//! This module provides:
//! - Short-lived, timeout-bounded probe connections to individual nodes
//! - The fixed read-only status battery (liveness, recovery state, lag)
//! - The read-only coordinator state fetch and role-hint merge

mod connection;
mod coordinator;
mod prober;

pub use connection::{ConnectionError, NodeConnection};
pub use coordinator::{
    apply_role_hints, fetch_coordinator_state, CoordinatorNode, CoordinatorNodeState,
    CoordinatorState,
};
pub use prober::probe_node;
