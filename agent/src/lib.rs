//! Node-side agent for the signage fleet protocol.
//!
//! One agent process runs on each playback node. It derives the active
//! channel from the distributed rules, publishes status snapshots, executes
//! power commands left on the share, and samples hardware sensor exports.
//! A separate `watchdog` binary supervises the agent process itself and
//! escalates crash loops to a reboot.

pub mod command;
pub mod config_apply;
pub mod power;
pub mod sensors;
pub mod state;
pub mod status;
pub mod watchdog;
