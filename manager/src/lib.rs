//! Fleet coordinator for the signage nodes.
//!
//! The coordinator never calls a node directly; the shared filesystem is
//! the only channel. Each cycle it polls `pc_status.json` on due node
//! shares, distributes rules and the congestion signal, mirrors content
//! from the master tree and drives the power command lifecycle.

pub mod config;
pub mod distribute;
pub mod fleet;
pub mod poll;
pub mod sync;

// Re-export commonly used types
pub use config::{ConfigManager, ManagerConfig, NodeEntry};
pub use fleet::{FleetSnapshot, NodeState};
pub use poll::FleetPoller;
