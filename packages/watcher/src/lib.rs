//! XDomain Watcher
//!
//! Command-line correlator for the L1/L2 bridge: given source transaction
//! hashes, waits for the destination relays of every message they emitted.

pub mod config;

pub use config::{Config, EndpointConfig};
