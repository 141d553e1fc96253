//! Error types for the cross-domain bridge core
//!
//! [`BridgeError`] is the typed failure surface of every bridge operation and
//! of the watcher. [`DomainError`] describes failures of the host domain
//! itself and separates transient unavailability (retried by the watcher's
//! poll loop) from explicit domain errors (terminal).

use std::time::Duration;
use thiserror::Error;

use crate::retry::{classify_error, ErrorClass};
use crate::types::{Address, DomainId, MessageHash, TxHash};

/// Failure reported by a host domain
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// The domain could not be reached or asked us to back off
    #[error("domain unavailable: {0}")]
    Unavailable(String),

    /// The domain answered with an explicit error
    #[error("domain rejected request: {0}")]
    Rejected(String),

    /// The domain answered with something we could not decode
    #[error("malformed domain response: {0}")]
    Malformed(String),
}

impl DomainError {
    /// Whether the watcher should keep polling through this error
    pub fn is_transient(&self) -> bool {
        matches!(self, DomainError::Unavailable(_))
    }

    /// Map an error message returned by a domain endpoint
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        match classify_error(&message) {
            ErrorClass::Transient => DomainError::Unavailable(message),
            ErrorClass::Permanent | ErrorClass::Unknown => DomainError::Rejected(message),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    // ========================================================================
    // Encoding Errors
    // ========================================================================
    #[error("Encoding error: {reason}")]
    Encoding { reason: String },

    // ========================================================================
    // Configuration-Order Errors
    // ========================================================================
    #[error("Receiver is not bound to a gateway")]
    UnboundGateway,

    #[error("Receiver already initialized with gateway {gateway}")]
    AlreadyInitialized { gateway: Address },

    // ========================================================================
    // Authorization Errors
    // ========================================================================
    #[error("Unauthorized cross-domain sender {sender}: expected {expected}")]
    UnauthorizedSender { sender: Address, expected: Address },

    #[error("Message {hash} was not emitted by the paired messenger")]
    UnverifiedMessage { hash: MessageHash },

    #[error("Message {hash} is addressed to domain {expected}, not {actual}")]
    WrongDomain {
        hash: MessageHash,
        expected: DomainId,
        actual: DomainId,
    },

    #[error("Message {hash} does not correspond to a matching burn on the remote domain")]
    UnknownMessage { hash: MessageHash },

    #[error("No entry point at {target} for message {hash}")]
    UnknownTarget { hash: MessageHash, target: Address },

    // ========================================================================
    // Delivery Errors
    // ========================================================================
    #[error("Message {hash} already consumed")]
    Replay { hash: MessageHash },

    #[error("Timed out after {timeout:?} waiting for message {hash}")]
    Timeout { hash: MessageHash, timeout: Duration },

    #[error("Destination transaction {tx} for message {hash} was invalidated by a reorg")]
    Reorg { hash: MessageHash, tx: TxHash },

    #[error("Wait for message {hash} was cancelled")]
    Cancelled { hash: MessageHash },

    // ========================================================================
    // Amount & Balance Errors
    // ========================================================================
    #[error("Invalid amount: {reason}")]
    InvalidAmount { reason: String },

    #[error("Insufficient balance: available {available}, required {required}")]
    InsufficientBalance { available: u128, required: u128 },

    #[error("Insufficient allowance: approved {approved}, required {required}")]
    InsufficientAllowance { approved: u128, required: u128 },

    // ========================================================================
    // Host Domain Errors
    // ========================================================================
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl BridgeError {
    pub fn encoding(reason: impl Into<String>) -> Self {
        BridgeError::Encoding {
            reason: reason.into(),
        }
    }

    /// Duplicate deliveries are idempotent from the caller's perspective
    pub fn is_replay(&self) -> bool {
        matches!(self, BridgeError::Replay { .. })
    }

    /// Whether a rejected relay can succeed on a later attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            BridgeError::UnboundGateway => true,
            BridgeError::Domain(e) => e.is_transient(),
            _ => false,
        }
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;
