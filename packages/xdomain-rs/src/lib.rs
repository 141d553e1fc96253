//! XDomain-RS: Cross-Domain Token Bridge Core
//!
//! Moves a fungible token between an L1 and an L2 domain and tracks each
//! transfer across the boundary:
//!
//! - **Message** - Canonical cross-domain message encoding and identity
//! - **Messenger** - Per-domain outbound records and authenticated admission
//! - **Gateway / Receiver** - Lock on L1, mint on L2, burn and release back
//! - **Watcher** - Correlate a source transaction with its destination relays
//! - **Domain** - In-memory domain runtime and the `DomainClient` query seam
//! - **Testing Module** - Scenario harness and assertions for E2E tests
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! xdomain-rs = { path = "../xdomain-rs" }
//! ```
//!
//! ## Feature Flags
//!
//! - `rpc` - JSON-RPC domain client (default)
//! - `testing` - Enable testing utilities for E2E tests (default)
//! - `full` - Enable all features

// Core modules (always available)
pub mod bounded_cache;
pub mod bridge;
pub mod domain;
pub mod error;
pub mod events;
pub mod gateway;
pub mod hash;
pub mod ledger;
pub mod message;
pub mod messenger;
pub mod receiver;
pub mod redact;
pub mod relayer;
pub mod retry;
pub mod types;
pub mod watcher;

// Testing utilities (feature-gated)
#[cfg(feature = "testing")]
pub mod testing;

// Re-export commonly used items at the crate root
pub use bridge::{BridgeDeployment, GatewayBinding, L1State, L2State, L1_DOMAIN, L2_DOMAIN};
pub use domain::{Domain, DomainClient};
pub use error::{BridgeError, BridgeResult, DomainError};
pub use events::{Log, LogFilter, TxReceipt};
pub use hash::{bytes32_to_hex, keccak256};
pub use message::{BridgeCall, Message, MessageEncoder};
pub use messenger::{DomainMessenger, MessageRecord};
pub use relayer::Relayer;
pub use types::{Address, BlockHash, DomainId, MessageHash, MessageStatus, TxHash};
pub use watcher::{
    DestinationReceipt, DomainEndpoint, PendingReceipt, WatchResult, Watcher, WatcherConfig,
};

#[cfg(feature = "rpc")]
pub use domain::rpc::RpcDomainClient;
