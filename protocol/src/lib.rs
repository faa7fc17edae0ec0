//! Shared wire contracts and pure logic for the signage fleet protocol.
//!
//! Everything the manager and the node agents must agree on lives here:
//! the JSON record types exchanged through the share, the channel resolver,
//! the overwrite-with-retry file discipline, the content manifest diff and
//! the share path conventions.

pub mod error;
pub mod fsio;
pub mod manifest;
pub mod paths;
pub mod resolver;
pub mod types;

pub use error::ProtocolError;
pub use paths::SharePaths;
