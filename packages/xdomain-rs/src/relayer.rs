//! Message relayer
//!
//! Polls the source domain for `SentMessage` events addressed to the
//! destination domain and submits each message to the destination messenger.
//! A `Replay` rejection means another relay got there first and counts as
//! delivered. Messages rejected only because the receiver is not bound yet,
//! or because the destination was unreachable, are retried on later ticks;
//! every other rejection is logged and dropped.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::domain::{Domain, DomainClient};
use crate::error::BridgeResult;
use crate::events::{parse_sent_message_log, LogFilter, SentMessage};
use crate::message::Message;
use crate::messenger::MessengerHost;
use crate::types::{Address, BlockHash};
use crate::watcher::DomainEndpoint;

/// Counters for one relayer tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub relayed: usize,
    pub already_relayed: usize,
    pub failed: usize,
}

pub const DEFAULT_RESCAN_BLOCKS: u64 = 64;

pub struct Relayer<S: MessengerHost> {
    source: DomainEndpoint,
    destination: Arc<Domain<S>>,
    /// Account that submits relay transactions
    relayer: Address,
    poll_interval: Duration,
    /// First source block not yet scanned
    next_block: u64,
    /// Hash of block `next_block - 1` when it was scanned
    anchor: Option<BlockHash>,
    /// Blocks rescanned below the cursor when the last scanned block was
    /// replaced
    rescan_blocks: u64,
    /// Messages awaiting a (re)submission
    pending: VecDeque<Message>,
}

impl<S: MessengerHost> Relayer<S> {
    pub fn new(
        source: DomainEndpoint,
        destination: Arc<Domain<S>>,
        relayer: Address,
        poll_interval: Duration,
    ) -> Self {
        Self {
            source,
            destination,
            relayer,
            poll_interval,
            next_block: 0,
            anchor: None,
            rescan_blocks: DEFAULT_RESCAN_BLOCKS,
            pending: VecDeque::new(),
        }
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Scan new source blocks and submit every queued message once
    pub async fn poll_once(&mut self) -> BridgeResult<RelayStats> {
        let head = self.source.client.block_number().await?;

        if let (Some(expected), Some(last)) = (self.anchor, self.next_block.checked_sub(1)) {
            if self.source.client.block_hash(last).await? != Some(expected) {
                let rewind = last.min(head + 1).saturating_sub(self.rescan_blocks);
                warn!(
                    head,
                    last_scanned = last,
                    rewind,
                    "Scanned source blocks were replaced, rescanning"
                );
                self.next_block = rewind;
                self.anchor = None;
            }
        }

        if self.next_block <= head {
            let Some(head_hash) = self.source.client.block_hash(head).await? else {
                return Ok(RelayStats::default());
            };
            let filter = LogFilter::new()
                .address(self.source.messenger)
                .event::<SentMessage>()
                .from_block(self.next_block)
                .to_block(head);
            let logs = self.source.client.logs(&filter).await?;

            let destination = self.destination.id();
            let found: Vec<_> = logs
                .iter()
                .filter(|log| !log.removed)
                .filter_map(parse_sent_message_log)
                .map(|event| event.message)
                .filter(|message| message.destination_domain == destination)
                .collect();

            debug!(
                from = self.next_block,
                to = head,
                messages = found.len(),
                "Scanned source blocks"
            );
            for message in found {
                if !self.pending.contains(&message) {
                    self.pending.push_back(message);
                }
            }
            self.next_block = head + 1;
            self.anchor = Some(head_hash);
        }

        let mut stats = RelayStats::default();
        for message in std::mem::take(&mut self.pending) {
            let hash = message.hash();
            match self.destination.relay_message(self.relayer, &message) {
                Ok(receipt) => {
                    stats.relayed += 1;
                    info!(hash = %hash, tx = %receipt.transaction_hash, "Message relayed");
                }
                Err(e) if e.is_replay() => {
                    stats.already_relayed += 1;
                    debug!(hash = %hash, "Message already relayed");
                }
                Err(e) if e.is_retryable() => {
                    stats.failed += 1;
                    warn!(hash = %hash, error = %e, "Relay failed, will retry");
                    self.pending.push_back(message);
                }
                Err(e) => {
                    stats.failed += 1;
                    warn!(hash = %hash, error = %e, "Relay rejected, dropping message");
                }
            }
        }
        Ok(stats)
    }

    /// Relay until a shutdown signal arrives or its sender is dropped
    pub async fn run(mut self, mut shutdown: mpsc::Receiver<()>) {
        info!(
            destination = %self.destination.name(),
            relayer = %self.relayer,
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Relayer started"
        );

        loop {
            match self.poll_once().await {
                Ok(stats) if stats != RelayStats::default() => {
                    debug!(?stats, "Relayer tick");
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "Relayer tick failed");
                }
            }

            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Shutdown signal received, stopping relayer");
                    return;
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }
}

impl<S: MessengerHost> std::fmt::Debug for Relayer<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relayer")
            .field("source", &self.source)
            .field("destination", &self.destination)
            .field("relayer", &self.relayer)
            .field("next_block", &self.next_block)
            .field("pending", &self.pending.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::BridgeDeployment;
    use crate::error::BridgeError;

    fn relayer_for(
        deployment: &BridgeDeployment,
    ) -> (
        Arc<Domain<crate::bridge::L1State>>,
        Arc<Domain<crate::bridge::L2State>>,
        Relayer<crate::bridge::L2State>,
    ) {
        let (l1, l2, binding) = deployment.deploy();
        let (l1, l2) = (Arc::new(l1), Arc::new(l2));
        let relayer = Relayer::new(
            DomainEndpoint::new(l1.clone(), binding.l1_messenger),
            l2.clone(),
            Address::from_label("relayer"),
            Duration::from_millis(5),
        );
        (l1, l2, relayer)
    }

    #[tokio::test]
    async fn test_relays_deposit_once() {
        let deployment = BridgeDeployment::default();
        let (l1, l2, mut relayer) = relayer_for(&deployment);
        let binding = deployment.binding();
        let alice = deployment.deployer;

        l2.init(alice, binding.gateway).unwrap();
        l1.approve(alice, binding.gateway, 10).unwrap();
        l1.deposit(alice, 10).unwrap();

        let stats = relayer.poll_once().await.unwrap();
        assert_eq!(stats.relayed, 1);
        assert_eq!(l2.balance_of(&alice), 10);

        let stats = relayer.poll_once().await.unwrap();
        assert_eq!(stats, RelayStats::default());
        assert_eq!(l2.total_supply(), 10);
    }

    #[tokio::test]
    async fn test_retries_until_receiver_bound() {
        let deployment = BridgeDeployment::default();
        let (l1, l2, mut relayer) = relayer_for(&deployment);
        let binding = deployment.binding();
        let alice = deployment.deployer;

        l1.approve(alice, binding.gateway, 10).unwrap();
        l1.deposit(alice, 10).unwrap();

        let stats = relayer.poll_once().await.unwrap();
        assert_eq!(stats.failed, 1);
        assert_eq!(relayer.pending(), 1);

        l2.init(alice, binding.gateway).unwrap();
        let stats = relayer.poll_once().await.unwrap();
        assert_eq!(stats.relayed, 1);
        assert_eq!(relayer.pending(), 0);
        assert_eq!(l2.balance_of(&alice), 10);
    }

    #[tokio::test]
    async fn test_unauthorized_sender_is_not_retried() {
        let deployment = BridgeDeployment::default();
        let (l1, l2, mut relayer) = relayer_for(&deployment);
        let binding = deployment.binding();
        let alice = deployment.deployer;

        l2.init(alice, Address::from_label("impostor")).unwrap();
        l1.approve(alice, binding.gateway, 10).unwrap();
        l1.deposit(alice, 10).unwrap();

        let stats = relayer.poll_once().await.unwrap();
        assert_eq!(stats.failed, 1);
        assert_eq!(relayer.pending(), 0);

        let head = Domain::block_number(&l2);
        for _ in 0..3 {
            let stats = relayer.poll_once().await.unwrap();
            assert_eq!(stats, RelayStats::default());
        }
        assert_eq!(Domain::block_number(&l2), head);
        assert_eq!(l2.total_supply(), 0);
    }

    #[tokio::test]
    async fn test_rescans_source_blocks_replaced_by_reorg() {
        let deployment = BridgeDeployment::default();
        let (l1, l2, mut relayer) = relayer_for(&deployment);
        let binding = deployment.binding();
        let alice = deployment.deployer;

        l2.init(alice, binding.gateway).unwrap();
        l1.approve(alice, binding.gateway, 10).unwrap();
        let orphaned = l1.deposit(alice, 10).unwrap();
        assert_eq!(relayer.poll_once().await.unwrap().relayed, 1);

        // Same height as the scanned head, different block
        l1.reorg(1).unwrap();
        let replacement = l1.deposit(alice, 4).unwrap();
        assert_eq!(replacement.block_number, orphaned.block_number);
        assert_eq!(Domain::block_number(&l1), orphaned.block_number);

        let stats = relayer.poll_once().await.unwrap();
        assert_eq!(stats.relayed, 1);
        assert_eq!(l2.total_supply(), 14);
    }

    #[tokio::test]
    async fn test_unavailable_source_is_an_error() {
        let deployment = BridgeDeployment::default();
        let (l1, _l2, mut relayer) = relayer_for(&deployment);
        l1.pause();
        let err = relayer.poll_once().await.unwrap_err();
        assert!(matches!(err, BridgeError::Domain(e) if e.is_transient()));
    }
}
