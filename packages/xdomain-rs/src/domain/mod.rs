//! In-memory host domain
//!
//! A sequential ledger that produces one block per transaction. Each
//! transaction runs against a copy of the domain state and is committed only
//! if it succeeds, so a multi-step operation (lock then send) either takes
//! effect completely or not at all.
//!
//! The domain also provides the authenticated cross-domain channel: once a
//! transaction commits, the identities of the messages it sent are published
//! to the domain's [`Outbox`], and the paired domain verifies inbound messages
//! against it.

pub mod client;
#[cfg(feature = "rpc")]
pub mod rpc;

pub use client::DomainClient;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use tracing::{debug, info, warn};

use crate::error::{BridgeResult, DomainError};
use crate::events::{Event, Log, LogFilter, TxReceipt};
use crate::hash::{keccak256, u64_word};
use crate::message::Message;
use crate::messenger::{MessengerHost, RelayOutcome};
use crate::types::{Address, BlockHash, DomainId, MessageHash, MessageStatus, TxHash};

/// Number of recent blocks whose pre-state is kept for [`Domain::reorg`]
pub const MAX_REORG_DEPTH: usize = 64;

// ============================================================================
// Authenticated channel
// ============================================================================

/// Attests that a message was committed by the paired domain's messenger
pub trait CrossDomainChannel: Send + Sync {
    fn was_sent(&self, message: &Message) -> bool;
}

/// Identities of messages committed on a domain
#[derive(Debug)]
pub struct Outbox {
    domain: DomainId,
    sent: RwLock<HashSet<MessageHash>>,
}

impl Outbox {
    fn new(domain: DomainId) -> Self {
        Self {
            domain,
            sent: RwLock::new(HashSet::new()),
        }
    }

    pub fn domain(&self) -> DomainId {
        self.domain
    }

    pub fn contains(&self, hash: &MessageHash) -> bool {
        self.sent
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(hash)
    }

    pub fn len(&self) -> usize {
        self.sent.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn publish(&self, hashes: &[MessageHash]) {
        let mut sent = self.sent.write().unwrap_or_else(PoisonError::into_inner);
        sent.extend(hashes.iter().copied());
    }

    fn replace(&self, hashes: HashSet<MessageHash>) {
        *self.sent.write().unwrap_or_else(PoisonError::into_inner) = hashes;
    }
}

impl CrossDomainChannel for Outbox {
    fn was_sent(&self, message: &Message) -> bool {
        message.source_domain == self.domain && self.contains(&message.hash())
    }
}

// ============================================================================
// Transaction context
// ============================================================================

/// Position in a transaction's side effects, used to undo a nested call
#[derive(Debug, Clone, Copy)]
pub(crate) struct Checkpoint {
    logs: usize,
    sent: usize,
}

/// Execution context of one transaction
///
/// Collects the logs and sent message identities of the transaction and gives
/// the messenger access to the inbound channel.
pub struct TxContext<'a> {
    domain: DomainId,
    from: Address,
    block_number: u64,
    block_hash: BlockHash,
    tx_hash: TxHash,
    logs: Vec<Log>,
    sent: Vec<MessageHash>,
    channel: Option<&'a dyn CrossDomainChannel>,
}

impl<'a> TxContext<'a> {
    /// Context that is not part of any block
    pub(crate) fn detached(domain: DomainId, from: Address) -> Self {
        Self {
            domain,
            from,
            block_number: 0,
            block_hash: BlockHash::ZERO,
            tx_hash: TxHash::ZERO,
            logs: Vec::new(),
            sent: Vec::new(),
            channel: None,
        }
    }

    pub(crate) fn with_channel(mut self, channel: &'a dyn CrossDomainChannel) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn domain(&self) -> DomainId {
        self.domain
    }

    /// Account that submitted the transaction
    pub fn from(&self) -> Address {
        self.from
    }

    pub fn block_number(&self) -> u64 {
        self.block_number
    }

    pub fn tx_hash(&self) -> TxHash {
        self.tx_hash
    }

    pub fn logs(&self) -> &[Log] {
        &self.logs
    }

    pub fn emit<E: Event>(&mut self, address: Address, event: &E) {
        let mut log = event.to_log(address);
        log.block_number = self.block_number;
        log.block_hash = self.block_hash;
        log.transaction_hash = self.tx_hash;
        log.log_index = self.logs.len() as u64;
        self.logs.push(log);
    }

    pub(crate) fn record_sent(&mut self, hash: MessageHash) {
        self.sent.push(hash);
    }

    /// Whether the paired domain committed `message`
    pub(crate) fn verify_inbound(&self, message: &Message) -> bool {
        self.channel.is_some_and(|channel| channel.was_sent(message))
    }

    pub(crate) fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            logs: self.logs.len(),
            sent: self.sent.len(),
        }
    }

    pub(crate) fn rollback_to(&mut self, checkpoint: Checkpoint) {
        self.logs.truncate(checkpoint.logs);
        self.sent.truncate(checkpoint.sent);
    }
}

// ============================================================================
// Domain
// ============================================================================

struct Block<S> {
    receipt: TxReceipt,
    sent: Vec<MessageHash>,
    /// State before this block's transaction; dropped past MAX_REORG_DEPTH
    pre_state: Option<S>,
}

struct Chain<S> {
    state: S,
    genesis_hash: BlockHash,
    /// blocks[i] has number i + 1
    blocks: Vec<Block<S>>,
    index: HashMap<TxHash, usize>,
    /// Monotonic across reorgs so replacement transactions get fresh hashes
    tx_sequence: u64,
}

impl<S> Chain<S> {
    fn head(&self) -> u64 {
        self.blocks.len() as u64
    }

    fn head_hash(&self) -> BlockHash {
        self.blocks
            .last()
            .map(|b| b.receipt.block_hash)
            .unwrap_or(self.genesis_hash)
    }
}

/// A host domain running state `S`
pub struct Domain<S> {
    id: DomainId,
    name: String,
    chain: Mutex<Chain<S>>,
    outbox: Arc<Outbox>,
    inbound: RwLock<Option<Arc<Outbox>>>,
    available: AtomicBool,
}

impl<S: Clone + Send + 'static> Domain<S> {
    pub fn new(id: DomainId, name: impl Into<String>, genesis: S) -> Self {
        let mut seed = Vec::with_capacity(36);
        seed.extend_from_slice(b"genesis");
        seed.extend_from_slice(id.as_bytes());
        Self {
            id,
            name: name.into(),
            chain: Mutex::new(Chain {
                state: genesis,
                genesis_hash: BlockHash(keccak256(&seed)),
                blocks: Vec::new(),
                index: HashMap::new(),
                tx_sequence: 0,
            }),
            outbox: Arc::new(Outbox::new(id)),
            inbound: RwLock::new(None),
            available: AtomicBool::new(true),
        }
    }

    pub fn id(&self) -> DomainId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn outbox(&self) -> Arc<Outbox> {
        Arc::clone(&self.outbox)
    }

    /// Accept inbound messages committed on `source`
    pub fn connect_inbound<T: Clone + Send + 'static>(&self, source: &Domain<T>) {
        *self.inbound.write().unwrap_or_else(PoisonError::into_inner) = Some(source.outbox());
        debug!(domain = %self.name, source = %source.name, "Inbound channel connected");
    }

    fn lock(&self) -> MutexGuard<'_, Chain<S>> {
        self.chain.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Submit a transaction from `from` and include it in a new block
    ///
    /// The closure runs against a copy of the state; on error nothing is
    /// committed and no block is produced.
    pub fn execute<T, F>(&self, from: Address, call: F) -> BridgeResult<(TxReceipt, T)>
    where
        F: FnOnce(&mut S, &mut TxContext<'_>) -> BridgeResult<T>,
    {
        let inbound = self
            .inbound
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut guard = self.lock();
        let chain = &mut *guard;
        let number = chain.head() + 1;
        let parent = chain.head_hash();
        chain.tx_sequence += 1;

        let tx_hash = {
            let mut seed = Vec::with_capacity(4 + 32 + 32 + 20);
            seed.extend_from_slice(self.id.as_bytes());
            seed.extend_from_slice(&u64_word(chain.tx_sequence));
            seed.extend_from_slice(&u64_word(number));
            seed.extend_from_slice(from.as_bytes());
            TxHash(keccak256(&seed))
        };
        let block_hash = {
            let mut seed = Vec::with_capacity(96);
            seed.extend_from_slice(parent.as_bytes());
            seed.extend_from_slice(&u64_word(number));
            seed.extend_from_slice(tx_hash.as_bytes());
            BlockHash(keccak256(&seed))
        };

        let mut ctx = TxContext {
            domain: self.id,
            from,
            block_number: number,
            block_hash,
            tx_hash,
            logs: Vec::new(),
            sent: Vec::new(),
            channel: inbound
                .as_deref()
                .map(|outbox| outbox as &dyn CrossDomainChannel),
        };

        let mut next = chain.state.clone();
        let value = call(&mut next, &mut ctx)?;

        let TxContext { logs, sent, .. } = ctx;
        let receipt = TxReceipt {
            transaction_hash: tx_hash,
            block_number: number,
            block_hash,
            from,
            status: true,
            logs,
        };

        let pre_state = std::mem::replace(&mut chain.state, next);
        if chain.blocks.len() >= MAX_REORG_DEPTH {
            let stale = chain.blocks.len() - MAX_REORG_DEPTH;
            chain.blocks[stale].pre_state = None;
        }
        let idx = chain.blocks.len();
        chain.index.insert(tx_hash, idx);
        chain.blocks.push(Block {
            receipt: receipt.clone(),
            sent: sent.clone(),
            pre_state: Some(pre_state),
        });
        self.outbox.publish(&sent);

        debug!(
            domain = %self.name,
            block = number,
            tx = %tx_hash,
            logs = receipt.logs.len(),
            "Transaction included"
        );
        Ok((receipt, value))
    }

    /// Read the committed state
    pub fn view<T>(&self, read: impl FnOnce(&S) -> T) -> T {
        read(&self.lock().state)
    }

    pub fn block_number(&self) -> u64 {
        self.lock().head()
    }

    /// Hash of block `number`; block 0 is genesis, `None` above the head
    pub fn block_hash(&self, number: u64) -> Option<BlockHash> {
        let chain = self.lock();
        match number {
            0 => Some(chain.genesis_hash),
            n => chain
                .blocks
                .get(n as usize - 1)
                .map(|b| b.receipt.block_hash),
        }
    }

    pub fn receipt(&self, tx_hash: &TxHash) -> Option<TxReceipt> {
        let chain = self.lock();
        let idx = *chain.index.get(tx_hash)?;
        chain.blocks.get(idx).map(|b| b.receipt.clone())
    }

    /// Logs in canonical order matching `filter`
    pub fn logs(&self, filter: &LogFilter) -> Vec<Log> {
        let chain = self.lock();
        let from = filter.from_block.max(1) as usize;
        let to = filter
            .to_block
            .map_or(chain.head(), |to| to.min(chain.head())) as usize;
        if from > to {
            return Vec::new();
        }
        chain.blocks[from - 1..to]
            .iter()
            .flat_map(|b| b.receipt.logs.iter())
            .filter(|log| filter.matches(log))
            .cloned()
            .collect()
    }

    /// Drop the `depth` most recent blocks and restore the state before them
    ///
    /// Returns the hashes of the invalidated transactions, newest first.
    pub fn reorg(&self, depth: usize) -> Result<Vec<TxHash>, DomainError> {
        let mut guard = self.lock();
        let chain = &mut *guard;
        if depth == 0 {
            return Ok(Vec::new());
        }
        if depth > chain.blocks.len() {
            return Err(DomainError::Rejected(format!(
                "cannot reorg {} blocks, head is {}",
                depth,
                chain.head()
            )));
        }
        let fork = chain.blocks.len() - depth;
        let restored = chain.blocks[fork].pre_state.clone().ok_or_else(|| {
            DomainError::Rejected(format!(
                "reorg depth {} exceeds retained history of {} blocks",
                depth, MAX_REORG_DEPTH
            ))
        })?;

        let dropped: Vec<_> = chain.blocks.drain(fork..).rev().collect();
        let invalidated: Vec<TxHash> = dropped
            .iter()
            .map(|b| b.receipt.transaction_hash)
            .collect();
        for tx in &invalidated {
            chain.index.remove(tx);
        }
        chain.state = restored;

        let surviving: HashSet<MessageHash> = chain
            .blocks
            .iter()
            .flat_map(|b| b.sent.iter().copied())
            .collect();
        self.outbox.replace(surviving);

        warn!(
            domain = %self.name,
            depth,
            head = chain.head(),
            "Domain reorganized"
        );
        Ok(invalidated)
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
        info!(domain = %self.name, available, "Domain availability changed");
    }

    /// Make the query interface report the domain as unreachable
    pub fn pause(&self) {
        self.set_available(false);
    }

    pub fn resume(&self) {
        self.set_available(true);
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }
}

impl<S: MessengerHost> Domain<S> {
    /// Submit an inbound message to this domain's messenger
    ///
    /// A message its target rejects is still included (as a `Failed` record)
    /// and the target's error is returned.
    pub fn relay_message(&self, relayer: Address, message: &Message) -> BridgeResult<TxReceipt> {
        let (receipt, outcome) =
            self.execute(relayer, |state, ctx| state.relay_message(ctx, message))?;
        match outcome {
            RelayOutcome::Relayed => Ok(receipt),
            RelayOutcome::Failed(err) => Err(err),
        }
    }

    pub fn message_status(&self, hash: &MessageHash) -> Option<MessageStatus> {
        self.view(|state| state.messenger().status(hash))
    }
}

impl<S> std::fmt::Debug for Domain<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Domain")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("available", &self.available.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{parse_log, Transfer};
    use crate::ledger::TokenLedger;

    fn alice() -> Address {
        Address::from_label("alice")
    }

    fn bob() -> Address {
        Address::from_label("bob")
    }

    fn domain() -> Domain<TokenLedger> {
        let ledger = TokenLedger::new(Address::from_label("token"), "Token", "TKN")
            .with_initial_supply(alice(), 100);
        Domain::new(DomainId::from_u32(31337), "l1", ledger)
    }

    fn transfer(domain: &Domain<TokenLedger>, amount: u128) -> BridgeResult<TxReceipt> {
        domain
            .execute(alice(), |ledger, ctx| {
                ledger.transfer(ctx, alice(), bob(), amount)
            })
            .map(|(receipt, ())| receipt)
    }

    #[test]
    fn test_execute_commits_and_produces_block() {
        let domain = domain();
        let receipt = transfer(&domain, 10).unwrap();

        assert_eq!(domain.block_number(), 1);
        assert_eq!(receipt.block_number, 1);
        assert_eq!(domain.view(|l| l.balance_of(&bob())), 10);
        assert_eq!(domain.receipt(&receipt.transaction_hash), Some(receipt.clone()));

        let log = &receipt.logs[0];
        assert_eq!(log.transaction_hash, receipt.transaction_hash);
        assert_eq!(log.block_hash, receipt.block_hash);
        assert!(parse_log::<Transfer>(log).is_some());
    }

    #[test]
    fn test_failed_execute_changes_nothing() {
        let domain = domain();
        assert!(domain
            .execute(alice(), |ledger, ctx| {
                ledger.transfer(ctx, alice(), bob(), 60)?;
                // second step fails, first must not stick
                ledger.transfer(ctx, alice(), bob(), 60)
            })
            .is_err());

        assert_eq!(domain.block_number(), 0);
        assert_eq!(domain.view(|l| l.balance_of(&alice())), 100);
    }

    #[test]
    fn test_logs_filter_by_block_range() {
        let domain = domain();
        transfer(&domain, 1).unwrap();
        transfer(&domain, 2).unwrap();
        transfer(&domain, 3).unwrap();

        let all = domain.logs(&LogFilter::new().event::<Transfer>());
        assert_eq!(all.len(), 3);
        let tail = domain.logs(&LogFilter::new().from_block(2).to_block(10));
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].block_number, 2);
        assert!(domain.logs(&LogFilter::new().from_block(4)).is_empty());
    }

    #[test]
    fn test_reorg_restores_state_and_drops_receipts() {
        let domain = domain();
        let first = transfer(&domain, 10).unwrap();
        let second = transfer(&domain, 20).unwrap();

        let invalidated = domain.reorg(1).unwrap();
        assert_eq!(invalidated, vec![second.transaction_hash]);
        assert_eq!(domain.block_number(), 1);
        assert_eq!(domain.view(|l| l.balance_of(&bob())), 10);
        assert!(domain.receipt(&second.transaction_hash).is_none());
        assert!(domain.receipt(&first.transaction_hash).is_some());

        // The replacement block gets a different hash at the same height
        let replacement = transfer(&domain, 20).unwrap();
        assert_eq!(replacement.block_number, 2);
        assert_ne!(replacement.transaction_hash, second.transaction_hash);
        assert_ne!(replacement.block_hash, second.block_hash);

        assert_eq!(domain.block_hash(2), Some(replacement.block_hash));
        assert!(domain.block_hash(0).is_some());
        assert!(domain.block_hash(3).is_none());

        assert!(domain.reorg(5).is_err());
    }

    #[test]
    fn test_availability_toggle() {
        let domain = domain();
        assert!(domain.is_available());
        domain.pause();
        assert!(!domain.is_available());
        domain.resume();
        assert!(domain.is_available());
    }
}
