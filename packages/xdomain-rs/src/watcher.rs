//! Watcher / correlator
//!
//! Maps a source-domain transaction to the destination-domain transactions
//! that relayed its messages. Each wait is a polling state machine
//!
//! ```text
//! Idle -> Watching -> Found | TimedOut | Reorged
//! ```
//!
//! driven on the caller's task: every domain query is a suspension point, so
//! any number of waits run concurrently without blocking each other.
//! Transient domain failures are retried with backoff until the deadline;
//! explicit domain errors end the wait.
//!
//! ## Usage
//!
//! ```ignore
//! let watcher = Watcher::new(l1_endpoint, l2_endpoint, WatcherConfig::default());
//! let hashes = watcher.get_message_identities_from_source_tx(&deposit_tx).await?;
//! let receipt = watcher.await_destination_receipt(hashes[0], Duration::from_secs(60)).await?;
//! ```

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::bounded_cache::{BoundedCache, DEFAULT_CACHE_SIZE, DEFAULT_CACHE_TTL_SECS};
use crate::domain::DomainClient;
use crate::error::{BridgeError, BridgeResult, DomainError};
use crate::events::{parse_log, parse_sent_message_log, LogFilter, RelayedMessage};
use crate::message::Message;
use crate::retry::RetryConfig;
use crate::types::{Address, BlockHash, MessageHash, TxHash};

/// Watcher configuration
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Cadence of destination-domain queries
    pub poll_interval: Duration,
    /// Default maximum wait, used by [`Watcher::watch_source_tx`] callers and
    /// source-side queries
    pub timeout: Duration,
    /// Destination blocks (including the inclusion block) required before a
    /// relay is final
    pub confirmations: u64,
    /// Maximum block range per log query
    pub max_block_range: u64,
    /// How far behind the head the first scan starts
    pub lookback_blocks: u64,
    /// Blocks rescanned below the cursor when the last scanned block was
    /// replaced
    pub reorg_rescan_blocks: u64,
    /// Backoff for transient query failures
    pub retry: RetryConfig,
    pub found_cache_size: usize,
    pub found_cache_ttl: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1000),
            timeout: Duration::from_millis(120_000),
            confirmations: 1,
            max_block_range: 10_000,
            lookback_blocks: 10_000,
            reorg_rescan_blocks: 64,
            retry: RetryConfig::default(),
            found_cache_size: DEFAULT_CACHE_SIZE,
            found_cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
        }
    }
}

/// A domain as seen by the watcher
#[derive(Clone)]
pub struct DomainEndpoint {
    pub client: Arc<dyn DomainClient>,
    /// Messenger contract whose events are correlated
    pub messenger: Address,
}

impl DomainEndpoint {
    pub fn new(client: Arc<dyn DomainClient>, messenger: Address) -> Self {
        Self { client, messenger }
    }
}

impl std::fmt::Debug for DomainEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomainEndpoint")
            .field("messenger", &self.messenger)
            .finish_non_exhaustive()
    }
}

/// Destination transaction that relayed a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DestinationReceipt {
    pub message_hash: MessageHash,
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub block_hash: BlockHash,
}

/// Every destination relay for the messages of one source transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchResult {
    pub source_tx: TxHash,
    /// One entry per message, in emission order
    pub destination_txs: Vec<DestinationReceipt>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WaitState {
    Idle,
    Watching {
        /// First block not yet scanned
        next_block: u64,
        /// Hash of block `next_block - 1` when it was scanned
        anchor: Option<BlockHash>,
        /// Relay seen but not yet confirmed
        candidate: Option<DestinationReceipt>,
    },
    Found(DestinationReceipt),
    TimedOut,
    Reorged(TxHash),
}

/// Correlates source emissions with destination relays
///
/// Cloning is cheap; clones share the found-receipt cache.
#[derive(Clone)]
pub struct Watcher {
    source: DomainEndpoint,
    destination: DomainEndpoint,
    config: Arc<WatcherConfig>,
    found: Arc<Mutex<BoundedCache<MessageHash, DestinationReceipt>>>,
}

impl Watcher {
    pub fn new(source: DomainEndpoint, destination: DomainEndpoint, config: WatcherConfig) -> Self {
        let found = BoundedCache::new(config.found_cache_size, config.found_cache_ttl);
        Self {
            source,
            destination,
            config: Arc::new(config),
            found: Arc::new(Mutex::new(found)),
        }
    }

    /// Watcher for the opposite direction, with its own cache
    pub fn reverse(&self) -> Self {
        Self::new(
            self.destination.clone(),
            self.source.clone(),
            (*self.config).clone(),
        )
    }

    pub fn config(&self) -> &WatcherConfig {
        &self.config
    }

    fn cached(&self, hash: &MessageHash) -> Option<DestinationReceipt> {
        self.found
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(hash)
            .copied()
    }

    fn remember(&self, receipt: DestinationReceipt) {
        let mut found = self.found.lock().unwrap_or_else(PoisonError::into_inner);
        found.insert(receipt.message_hash, receipt);
        debug!(cached = found.len(), "Found receipt cached");
    }

    // =========================================================================
    // Source side
    // =========================================================================

    /// Messages emitted by a source transaction, in emission order
    ///
    /// Empty if the transaction emitted none or is not known to the source
    /// domain.
    pub async fn get_messages_from_source_tx(&self, tx_hash: &TxHash) -> BridgeResult<Vec<Message>> {
        let deadline = Instant::now() + self.config.timeout;
        let client = &self.source.client;
        let receipt = self
            .retrying(deadline, || client.transaction_receipt(tx_hash))
            .await?;

        let Some(receipt) = receipt else {
            debug!(tx = %tx_hash, "Source transaction not found");
            return Ok(Vec::new());
        };

        let mut logs: Vec<_> = receipt
            .logs
            .iter()
            .filter(|log| log.address == self.source.messenger)
            .collect();
        logs.sort_by_key(|log| log.log_index);

        Ok(logs
            .into_iter()
            .filter_map(parse_sent_message_log)
            .map(|event| event.message)
            .collect())
    }

    /// Identities of the messages emitted by a source transaction
    pub async fn get_message_identities_from_source_tx(
        &self,
        tx_hash: &TxHash,
    ) -> BridgeResult<Vec<MessageHash>> {
        let hashes: Vec<_> = self
            .get_messages_from_source_tx(tx_hash)
            .await?
            .iter()
            .map(Message::hash)
            .collect();
        debug!(tx = %tx_hash, count = hashes.len(), "Extracted message identities");
        Ok(hashes)
    }

    // =========================================================================
    // Destination side
    // =========================================================================

    /// Wait until a destination transaction relays `hash`
    ///
    /// Fails with [`BridgeError::Timeout`] after `timeout`, with
    /// [`BridgeError::Reorg`] if the observed relay is invalidated before it
    /// is final, or with the domain error if the destination rejects a query.
    /// Once found, the receipt is cached and returned again without polling.
    pub async fn await_destination_receipt(
        &self,
        hash: MessageHash,
        timeout: Duration,
    ) -> BridgeResult<DestinationReceipt> {
        if let Some(found) = self.cached(&hash) {
            debug!(hash = %hash, tx = %found.tx_hash, "Destination receipt cached");
            return Ok(found);
        }

        let deadline = Instant::now() + timeout;
        let mut state = WaitState::Idle;
        let mut attempt: u32 = 0;

        loop {
            state = match state {
                WaitState::Found(receipt) => {
                    self.remember(receipt);
                    info!(
                        hash = %hash,
                        tx = %receipt.tx_hash,
                        block = receipt.block_number,
                        "Destination receipt found"
                    );
                    return Ok(receipt);
                }
                WaitState::TimedOut => {
                    warn!(hash = %hash, timeout_ms = timeout.as_millis() as u64, "Wait timed out");
                    return Err(BridgeError::Timeout { hash, timeout });
                }
                WaitState::Reorged(tx) => {
                    warn!(hash = %hash, tx = %tx, "Observed relay was reorged out");
                    return Err(BridgeError::Reorg { hash, tx });
                }
                current => match timeout_at(deadline, self.step(&hash, current)).await {
                    Err(_) => WaitState::TimedOut,
                    Ok(Ok(next)) => {
                        attempt = 0;
                        let idle_tick = matches!(
                            (current, next),
                            (WaitState::Watching { .. }, WaitState::Watching { .. })
                        );
                        if idle_tick && !self.pause_until(deadline, self.config.poll_interval).await {
                            WaitState::TimedOut
                        } else {
                            next
                        }
                    }
                    Ok(Err(e)) if e.is_transient() => {
                        let backoff = self.config.retry.backoff_for_attempt(attempt);
                        attempt = attempt.saturating_add(1);
                        warn!(
                            hash = %hash,
                            error = %e,
                            attempt,
                            backoff_ms = backoff.as_millis() as u64,
                            "Destination query failed, retrying"
                        );
                        if self.pause_until(deadline, backoff).await {
                            current
                        } else {
                            WaitState::TimedOut
                        }
                    }
                    Ok(Err(e)) => return Err(e.into()),
                },
            };
        }
    }

    /// Sleep for `duration` or until `deadline`; false if the deadline passed
    async fn pause_until(&self, deadline: Instant, duration: Duration) -> bool {
        let wake = (Instant::now() + duration).min(deadline);
        sleep_until(wake).await;
        Instant::now() < deadline
    }

    async fn step(&self, hash: &MessageHash, state: WaitState) -> Result<WaitState, DomainError> {
        let client = &self.destination.client;
        let required = self.config.confirmations.max(1);

        match state {
            WaitState::Idle => {
                let head = client.block_number().await?;
                let next_block = head.saturating_sub(self.config.lookback_blocks);
                debug!(hash = %hash, head, from = next_block, "Watching destination");
                Ok(WaitState::Watching {
                    next_block,
                    anchor: None,
                    candidate: None,
                })
            }
            WaitState::Watching {
                next_block,
                anchor,
                candidate: None,
            } => {
                let head = client.block_number().await?;

                if let (Some(expected), Some(last)) = (anchor, next_block.checked_sub(1)) {
                    if client.block_hash(last).await? != Some(expected) {
                        let rewind = last
                            .min(head + 1)
                            .saturating_sub(self.config.reorg_rescan_blocks);
                        warn!(
                            hash = %hash,
                            head,
                            last_scanned = last,
                            rewind,
                            "Scanned blocks were replaced, rescanning"
                        );
                        return Ok(WaitState::Watching {
                            next_block: rewind,
                            anchor: None,
                            candidate: None,
                        });
                    }
                }

                if next_block > head {
                    return Ok(state);
                }
                // Taken before the scan so a reorg during it shows up next tick
                let Some(head_hash) = client.block_hash(head).await? else {
                    return Ok(state);
                };
                debug!(hash = %hash, from = next_block, to = head, "Scanning for relay");

                match self.find_relay(hash, next_block, head).await? {
                    Some(found) => {
                        let depth = head.saturating_sub(found.block_number) + 1;
                        if depth >= required {
                            Ok(WaitState::Found(found))
                        } else {
                            debug!(hash = %hash, tx = %found.tx_hash, depth, required, "Relay awaiting confirmations");
                            Ok(WaitState::Watching {
                                next_block: head + 1,
                                anchor: Some(head_hash),
                                candidate: Some(found),
                            })
                        }
                    }
                    None => Ok(WaitState::Watching {
                        next_block: head + 1,
                        anchor: Some(head_hash),
                        candidate: None,
                    }),
                }
            }
            WaitState::Watching {
                candidate: Some(candidate),
                ..
            } => {
                let receipt = client.transaction_receipt(&candidate.tx_hash).await?;
                match receipt {
                    Some(r) if r.status && r.block_hash == candidate.block_hash => {}
                    _ => return Ok(WaitState::Reorged(candidate.tx_hash)),
                }

                let head = client.block_number().await?;
                let depth = head.saturating_sub(candidate.block_number) + 1;
                if depth >= required {
                    Ok(WaitState::Found(candidate))
                } else {
                    debug!(hash = %hash, depth, required, "Awaiting confirmations");
                    Ok(state)
                }
            }
            terminal => Ok(terminal),
        }
    }

    /// First relay of `hash` by the destination messenger in `[from, to]`
    async fn find_relay(
        &self,
        hash: &MessageHash,
        from: u64,
        to: u64,
    ) -> Result<Option<DestinationReceipt>, DomainError> {
        let range = self.config.max_block_range.max(1);
        let mut current = from;

        // Chunk into manageable ranges
        while current <= to {
            let chunk_end = current.saturating_add(range - 1).min(to);
            let filter = LogFilter::new()
                .address(self.destination.messenger)
                .event::<RelayedMessage>()
                .topic1(hash.0)
                .from_block(current)
                .to_block(chunk_end);

            let logs = self.destination.client.logs(&filter).await?;
            let relay = logs
                .iter()
                .filter(|log| !log.removed)
                .find(|log| {
                    parse_log::<RelayedMessage>(log).is_some_and(|e| e.message_hash == *hash)
                });
            if let Some(log) = relay {
                return Ok(Some(DestinationReceipt {
                    message_hash: *hash,
                    tx_hash: log.transaction_hash,
                    block_number: log.block_number,
                    block_hash: log.block_hash,
                }));
            }
            current = chunk_end + 1;
        }
        Ok(None)
    }

    /// Run a wait on its own task; the handle can cancel it
    ///
    /// Dropping the handle also cancels the wait. Cancellation only stops
    /// polling; the message itself is unaffected.
    pub fn spawn_wait(&self, hash: MessageHash, timeout: Duration) -> PendingReceipt {
        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
        let watcher = self.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                result = watcher.await_destination_receipt(hash, timeout) => result,
                _ = cancel_rx => {
                    info!(hash = %hash, "Wait cancelled");
                    Err(BridgeError::Cancelled { hash })
                }
            }
        });
        PendingReceipt {
            hash,
            cancel: Some(cancel_tx),
            handle,
        }
    }

    /// Await every message of a source transaction concurrently
    pub async fn watch_source_tx(
        &self,
        tx_hash: &TxHash,
        timeout: Duration,
    ) -> BridgeResult<WatchResult> {
        let hashes = self.get_message_identities_from_source_tx(tx_hash).await?;
        let destination_txs = try_join_all(
            hashes
                .iter()
                .map(|hash| self.await_destination_receipt(*hash, timeout)),
        )
        .await?;

        Ok(WatchResult {
            source_tx: *tx_hash,
            destination_txs,
        })
    }

    /// Retry a source query through transient failures until `deadline`
    async fn retrying<T, F, Fut>(&self, deadline: Instant, mut query: F) -> BridgeResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, DomainError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match query().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() => {
                    let backoff = self.config.retry.backoff_for_attempt(attempt);
                    attempt = attempt.saturating_add(1);
                    warn!(error = %e, attempt, "Source query failed, retrying");
                    if !self.pause_until(deadline, backoff).await {
                        return Err(e.into());
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher")
            .field("source", &self.source)
            .field("destination", &self.destination)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Handle to a wait running on its own task
#[derive(Debug)]
pub struct PendingReceipt {
    hash: MessageHash,
    cancel: Option<oneshot::Sender<()>>,
    handle: JoinHandle<BridgeResult<DestinationReceipt>>,
}

impl PendingReceipt {
    pub fn hash(&self) -> MessageHash {
        self.hash
    }

    /// Stop polling; [`wait`](Self::wait) then returns `Cancelled`
    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub async fn wait(self) -> BridgeResult<DestinationReceipt> {
        let PendingReceipt {
            hash,
            cancel,
            handle,
        } = self;
        let result = handle.await;
        // Hold the sender until the task is done so it is not read as a cancel
        drop(cancel);
        match result {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => Err(BridgeError::Cancelled { hash }),
        }
    }
}
