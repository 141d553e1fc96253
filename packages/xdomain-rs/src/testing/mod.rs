//! Testing Utilities Module
//!
//! Helpers for end-to-end tests over the two in-memory domains.
//!
//! ## Submodules
//!
//! - `harness` - Deploy the bridge scenario, named accounts, relayers
//! - `assertions` - Common test assertions

pub mod assertions;
pub mod harness;

// Re-export commonly used items
pub use assertions::*;
pub use harness::*;
