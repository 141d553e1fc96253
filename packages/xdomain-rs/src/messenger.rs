//! Domain messenger
//!
//! Each domain has one messenger. It records every message sent from the
//! domain (status `Sent`) and is the only way a message from the paired
//! domain reaches a local contract. Admission checks, in order:
//!
//! 1. the message is addressed to this domain
//! 2. the paired messenger committed it (authenticated channel)
//! 3. it has not already been relayed
//!
//! Admission and the status transition run inside one transaction of the host
//! domain, and the host domain executes transactions one at a time, so two
//! concurrent relays of the same identity cannot both pass check 3.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{info, warn};

use crate::domain::TxContext;
use crate::error::{BridgeError, BridgeResult};
use crate::events::{FailedRelayedMessage, RelayedMessage, SentMessage};
use crate::message::{Message, MessageEncoder};
use crate::types::{Address, DomainId, MessageHash, MessageStatus, TxHash};

/// Audit record of a message seen by a messenger
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub hash: MessageHash,
    pub message: Message,
    pub status: MessageStatus,
    /// Transaction that sent the message (outbound records)
    pub source_tx: Option<TxHash>,
    /// Last transaction that relayed the message here (inbound records)
    pub relay_tx: Option<TxHash>,
}

/// What a target learns about an admitted message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayContext {
    pub hash: MessageHash,
    /// Contract that sent the message on the source domain
    pub sender: Address,
    pub source_domain: DomainId,
}

impl RelayContext {
    pub(crate) fn new(message: &Message) -> Self {
        Self {
            hash: message.hash(),
            sender: message.sender,
            source_domain: message.source_domain,
        }
    }
}

/// Result of relaying an admitted message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    Relayed,
    /// The target rejected the message; the record is `Failed` and may be
    /// relayed again
    Failed(BridgeError),
}

#[derive(Debug, Clone)]
pub struct DomainMessenger {
    address: Address,
    encoder: MessageEncoder,
    nonces: HashMap<Address, u64>,
    /// Outbound identities in emission order
    outbound: Vec<MessageHash>,
    records: HashMap<MessageHash, MessageRecord>,
}

impl DomainMessenger {
    pub fn new(address: Address, encoder: MessageEncoder) -> Self {
        Self {
            address,
            encoder,
            nonces: HashMap::new(),
            outbound: Vec::new(),
            records: HashMap::new(),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn encoder(&self) -> &MessageEncoder {
        &self.encoder
    }

    /// Nonce the next message from `sender` will carry
    pub fn nonce_of(&self, sender: &Address) -> u64 {
        self.nonces.get(sender).copied().unwrap_or(0)
    }

    pub fn status(&self, hash: &MessageHash) -> Option<MessageStatus> {
        self.records.get(hash).map(|r| r.status)
    }

    pub fn record(&self, hash: &MessageHash) -> Option<&MessageRecord> {
        self.records.get(hash)
    }

    /// Outbound records in emission order
    pub fn sent_messages(&self) -> impl Iterator<Item = &MessageRecord> {
        self.outbound.iter().filter_map(|h| self.records.get(h))
    }

    /// Encode and record an outbound message from `sender`
    pub fn send_message(
        &mut self,
        ctx: &mut TxContext<'_>,
        sender: Address,
        target: Address,
        payload: &[u8],
    ) -> BridgeResult<Message> {
        let nonce = self.nonce_of(&sender);
        let message = self.encoder.encode(sender, target, payload, nonce)?;
        let hash = message.hash();

        self.nonces.insert(sender, nonce + 1);
        self.outbound.push(hash);
        self.records.insert(
            hash,
            MessageRecord {
                hash,
                message: message.clone(),
                status: MessageStatus::Sent,
                source_tx: Some(ctx.tx_hash()),
                relay_tx: None,
            },
        );
        ctx.emit(self.address, &SentMessage::new(message.clone()));
        ctx.record_sent(hash);

        info!(
            hash = %hash,
            sender = %sender,
            target = %target,
            nonce,
            destination = %message.destination_domain,
            "Message sent"
        );
        Ok(message)
    }

    /// Check that an inbound message may be delivered
    pub fn admit(&self, ctx: &TxContext<'_>, message: &Message) -> BridgeResult<RelayContext> {
        let hash = message.hash();

        if message.destination_domain != ctx.domain() {
            warn!(
                hash = %hash,
                expected = %message.destination_domain,
                actual = %ctx.domain(),
                "Rejected message for another domain"
            );
            return Err(BridgeError::WrongDomain {
                hash,
                expected: message.destination_domain,
                actual: ctx.domain(),
            });
        }

        if !ctx.verify_inbound(message) {
            warn!(hash = %hash, sender = %message.sender, "Rejected unverified message");
            return Err(BridgeError::UnverifiedMessage { hash });
        }

        if self.status(&hash) == Some(MessageStatus::Relayed) {
            warn!(hash = %hash, "Replay rejected, message already relayed");
            return Err(BridgeError::Replay { hash });
        }

        Ok(RelayContext::new(message))
    }

    fn mark(
        &mut self,
        ctx: &TxContext<'_>,
        relay: &RelayContext,
        message: &Message,
        status: MessageStatus,
    ) {
        let record = self.records.entry(relay.hash).or_insert_with(|| MessageRecord {
            hash: relay.hash,
            message: message.clone(),
            status,
            source_tx: None,
            relay_tx: None,
        });
        record.status = status;
        record.relay_tx = Some(ctx.tx_hash());
    }

    pub(crate) fn mark_relayed(
        &mut self,
        ctx: &mut TxContext<'_>,
        relay: &RelayContext,
        message: &Message,
    ) {
        self.mark(ctx, relay, message, MessageStatus::Relayed);
        ctx.emit(
            self.address,
            &RelayedMessage {
                message_hash: relay.hash,
            },
        );
        info!(hash = %relay.hash, tx = %ctx.tx_hash(), "Message relayed");
    }

    pub(crate) fn mark_failed(
        &mut self,
        ctx: &mut TxContext<'_>,
        relay: &RelayContext,
        message: &Message,
        error: &BridgeError,
    ) {
        self.mark(ctx, relay, message, MessageStatus::Failed);
        ctx.emit(
            self.address,
            &FailedRelayedMessage {
                message_hash: relay.hash,
            },
        );
        warn!(hash = %relay.hash, tx = %ctx.tx_hash(), error = %error, "Message relay failed");
    }
}

/// Domain state that owns a messenger and routes admitted messages
pub trait MessengerHost: Clone + Send + 'static {
    fn messenger(&self) -> &DomainMessenger;

    fn messenger_mut(&mut self) -> &mut DomainMessenger;

    /// Invoke the target entry point of an admitted message
    fn dispatch(
        &mut self,
        ctx: &mut TxContext<'_>,
        relay: &RelayContext,
        message: &Message,
    ) -> BridgeResult<()>;

    /// Admit `message` and deliver it to its target
    ///
    /// Admission failures (replay, unverified, wrong domain) are returned as
    /// errors. A target failure undoes the target's effects and commits a
    /// `Failed` record instead.
    fn relay_message(
        &mut self,
        ctx: &mut TxContext<'_>,
        message: &Message,
    ) -> BridgeResult<RelayOutcome> {
        let relay = self.messenger().admit(ctx, message)?;

        let snapshot = self.clone();
        let checkpoint = ctx.checkpoint();
        match self.dispatch(ctx, &relay, message) {
            Ok(()) => {
                self.messenger_mut().mark_relayed(ctx, &relay, message);
                Ok(RelayOutcome::Relayed)
            }
            Err(err) => {
                *self = snapshot;
                ctx.rollback_to(checkpoint);
                self.messenger_mut().mark_failed(ctx, &relay, message, &err);
                Ok(RelayOutcome::Failed(err))
            }
        }
    }
}
