//! Logs, receipts and typed bridge events
//!
//! Every state change on a domain is observable as a log carrying an event
//! topic (keccak256 of the event signature), indexed topics and ABI-encoded
//! data. The watcher only ever sees a domain through these logs.
//!
//! Event signatures:
//! - `SentMessage(bytes32 indexed msgHash)` with the canonical message as data
//! - `RelayedMessage(bytes32 indexed msgHash)`
//! - `FailedRelayedMessage(bytes32 indexed msgHash)`
//! - `DepositInitiated` / `DepositFinalized` / `WithdrawalInitiated` /
//!   `WithdrawalFinalized` `(address indexed from, address indexed to, uint256 amount)`
//! - `Transfer(address indexed from, address indexed to, uint256 value)`
//! - `Approval(address indexed owner, address indexed spender, uint256 value)`

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::hash::{address_word, event_topic, read_address, read_u128, u128_word};
use crate::message::Message;
use crate::types::{hex_bytes, Address, BlockHash, MessageHash, TxHash};

pub type Topic = [u8; 32];

/// A log emitted by a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Log {
    /// Emitting contract
    pub address: Address,
    #[serde(with = "hex_topics")]
    pub topics: Vec<Topic>,
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,
    pub block_number: u64,
    pub block_hash: BlockHash,
    pub transaction_hash: TxHash,
    /// Position of the log within its block
    pub log_index: u64,
    /// Set when the log's block was removed by a reorg
    #[serde(default)]
    pub removed: bool,
}

impl Log {
    /// An unplaced log; the host domain fills in block and transaction data
    pub fn new(address: Address, topics: Vec<Topic>, data: Vec<u8>) -> Self {
        Self {
            address,
            topics,
            data,
            block_number: 0,
            block_hash: BlockHash::ZERO,
            transaction_hash: TxHash::ZERO,
            log_index: 0,
            removed: false,
        }
    }

    pub fn topic0(&self) -> Option<&Topic> {
        self.topics.first()
    }
}

/// Receipt of an included transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxReceipt {
    pub transaction_hash: TxHash,
    pub block_number: u64,
    pub block_hash: BlockHash,
    pub from: Address,
    /// false if the transaction reverted; a reverted receipt carries no logs
    pub status: bool,
    pub logs: Vec<Log>,
}

/// Log query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogFilter {
    pub address: Option<Address>,
    pub topic0: Option<Topic>,
    pub topic1: Option<Topic>,
    pub from_block: u64,
    /// Inclusive; `None` means the current head
    pub to_block: Option<u64>,
}

impl LogFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn address(mut self, address: Address) -> Self {
        self.address = Some(address);
        self
    }

    pub fn event<E: Event>(mut self) -> Self {
        self.topic0 = Some(E::topic());
        self
    }

    pub fn topic1(mut self, topic: Topic) -> Self {
        self.topic1 = Some(topic);
        self
    }

    pub fn from_block(mut self, block: u64) -> Self {
        self.from_block = block;
        self
    }

    pub fn to_block(mut self, block: u64) -> Self {
        self.to_block = Some(block);
        self
    }

    pub fn matches(&self, log: &Log) -> bool {
        if log.block_number < self.from_block {
            return false;
        }
        if matches!(self.to_block, Some(to) if log.block_number > to) {
            return false;
        }
        if matches!(self.address, Some(addr) if addr != log.address) {
            return false;
        }
        if let Some(topic) = &self.topic0 {
            if log.topics.first() != Some(topic) {
                return false;
            }
        }
        if let Some(topic) = &self.topic1 {
            if log.topics.get(1) != Some(topic) {
                return false;
            }
        }
        true
    }
}

// ============================================================================
// Typed events
// ============================================================================

/// An event with a fixed signature and ABI layout
pub trait Event: Sized {
    const SIGNATURE: &'static str;

    fn topic() -> Topic {
        event_topic(Self::SIGNATURE)
    }

    /// Indexed topics after topic0
    fn indexed(&self) -> Vec<Topic>;

    fn data(&self) -> Vec<u8>;

    /// Decode from indexed topics (after topic0) and data
    fn decode(indexed: &[Topic], data: &[u8]) -> Option<Self>;

    fn to_log(&self, address: Address) -> Log {
        let mut topics = vec![Self::topic()];
        topics.extend(self.indexed());
        Log::new(address, topics, self.data())
    }
}

/// Decode a log as `E`, or `None` if it is a different event
pub fn parse_log<E: Event>(log: &Log) -> Option<E> {
    if log.topic0() != Some(&E::topic()) {
        return None;
    }
    let event = E::decode(&log.topics[1..], &log.data);
    if event.is_none() {
        warn!(
            event = E::SIGNATURE,
            tx = %log.transaction_hash,
            log_index = log.log_index,
            "Failed to decode log with matching topic"
        );
    }
    event
}

/// A message recorded by the source messenger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentMessage {
    pub message_hash: MessageHash,
    pub message: Message,
}

impl SentMessage {
    pub fn new(message: Message) -> Self {
        Self {
            message_hash: message.hash(),
            message,
        }
    }
}

impl Event for SentMessage {
    const SIGNATURE: &'static str = "SentMessage(bytes32)";

    fn indexed(&self) -> Vec<Topic> {
        vec![self.message_hash.0]
    }

    fn data(&self) -> Vec<u8> {
        self.message.encode()
    }

    fn decode(indexed: &[Topic], data: &[u8]) -> Option<Self> {
        let message_hash = MessageHash(*indexed.first()?);
        let message = Message::decode(data).ok()?;
        // The indexed identity must be the identity of the carried message
        if message.hash() != message_hash {
            return None;
        }
        Some(Self {
            message_hash,
            message,
        })
    }
}

macro_rules! hash_event {
    ($(#[$meta:meta])* $name:ident, $sig:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        pub struct $name {
            pub message_hash: MessageHash,
        }

        impl Event for $name {
            const SIGNATURE: &'static str = $sig;

            fn indexed(&self) -> Vec<Topic> {
                vec![self.message_hash.0]
            }

            fn data(&self) -> Vec<u8> {
                Vec::new()
            }

            fn decode(indexed: &[Topic], _data: &[u8]) -> Option<Self> {
                Some(Self {
                    message_hash: MessageHash(*indexed.first()?),
                })
            }
        }
    };
}

hash_event!(
    /// A message admitted and delivered to its target
    RelayedMessage,
    "RelayedMessage(bytes32)"
);

hash_event!(
    /// A message admitted but rejected by its target; it may be relayed again
    FailedRelayedMessage,
    "FailedRelayedMessage(bytes32)"
);

macro_rules! amount_event {
    ($(#[$meta:meta])* $name:ident, $sig:literal, $a:ident, $b:ident, $amount:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        pub struct $name {
            pub $a: Address,
            pub $b: Address,
            pub $amount: u128,
        }

        impl Event for $name {
            const SIGNATURE: &'static str = $sig;

            fn indexed(&self) -> Vec<Topic> {
                vec![address_word(&self.$a), address_word(&self.$b)]
            }

            fn data(&self) -> Vec<u8> {
                u128_word(self.$amount).to_vec()
            }

            fn decode(indexed: &[Topic], data: &[u8]) -> Option<Self> {
                if indexed.len() != 2 {
                    return None;
                }
                Some(Self {
                    $a: read_address(&indexed[0])?,
                    $b: read_address(&indexed[1])?,
                    $amount: read_u128(data)?,
                })
            }
        }
    };
}

amount_event!(
    /// Tokens locked on L1 for credit on L2
    DepositInitiated,
    "DepositInitiated(address,address,uint256)",
    from,
    to,
    amount
);

amount_event!(
    /// Tokens minted on L2 for a deposit
    DepositFinalized,
    "DepositFinalized(address,address,uint256)",
    from,
    to,
    amount
);

amount_event!(
    /// Tokens burned on L2 for release on L1
    WithdrawalInitiated,
    "WithdrawalInitiated(address,address,uint256)",
    from,
    to,
    amount
);

amount_event!(
    /// Tokens released from custody on L1 for a withdrawal
    WithdrawalFinalized,
    "WithdrawalFinalized(address,address,uint256)",
    from,
    to,
    amount
);

amount_event!(
    /// Token transfer; mints come from and burns go to the zero address
    Transfer,
    "Transfer(address,address,uint256)",
    from,
    to,
    value
);

amount_event!(
    /// Token allowance change
    Approval,
    "Approval(address,address,uint256)",
    owner,
    spender,
    value
);

pub fn parse_sent_message_log(log: &Log) -> Option<SentMessage> {
    parse_log(log)
}

pub fn parse_relayed_message_log(log: &Log) -> Option<RelayedMessage> {
    parse_log(log)
}

pub fn parse_failed_relayed_message_log(log: &Log) -> Option<FailedRelayedMessage> {
    parse_log(log)
}

/// Serde helper rendering topics as 0x-prefixed hex strings
mod hex_topics {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::Topic;

    pub fn serialize<S: Serializer>(topics: &[Topic], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(topics.iter().map(|t| format!("0x{}", hex::encode(t))))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Topic>, D::Error> {
        let raw = Vec::<String>::deserialize(deserializer)?;
        raw.iter()
            .map(|s| {
                let bytes = hex::decode(s.strip_prefix("0x").unwrap_or(s))
                    .map_err(serde::de::Error::custom)?;
                <Topic>::try_from(bytes.as_slice()).map_err(serde::de::Error::custom)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageEncoder;
    use crate::types::DomainId;

    fn message() -> Message {
        MessageEncoder::new(DomainId::from_u32(31337), DomainId::from_u32(420))
            .encode(Address([1; 20]), Address([2; 20]), b"payload", 0)
            .unwrap()
    }

    #[test]
    fn test_sent_message_log() {
        let event = SentMessage::new(message());
        let log = event.to_log(Address([9; 20]));
        assert_eq!(log.topics.len(), 2);
        assert_eq!(log.topics[1], event.message_hash.0);

        let parsed = parse_sent_message_log(&log).unwrap();
        assert_eq!(parsed, event);
        // Wrong event type
        assert!(parse_relayed_message_log(&log).is_none());
    }

    #[test]
    fn test_sent_message_rejects_mismatched_identity() {
        let event = SentMessage::new(message());
        let mut log = event.to_log(Address([9; 20]));
        log.topics[1] = [0xee; 32];
        assert!(parse_sent_message_log(&log).is_none());
    }

    #[test]
    fn test_amount_event_log() {
        let event = DepositInitiated {
            from: Address([1; 20]),
            to: Address([2; 20]),
            amount: 10,
        };
        let log = event.to_log(Address([3; 20]));
        assert_eq!(parse_log::<DepositInitiated>(&log), Some(event));
        assert!(parse_log::<DepositFinalized>(&log).is_none());

        let mut truncated = log.clone();
        truncated.data.truncate(16);
        assert!(parse_log::<DepositInitiated>(&truncated).is_none());
    }

    #[test]
    fn test_transfer_topic_matches_erc20() {
        assert_eq!(
            hex::encode(Transfer::topic()),
            "ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"
        );
    }

    #[test]
    fn test_log_filter() {
        let hash = MessageHash([7; 32]);
        let mut log = RelayedMessage { message_hash: hash }.to_log(Address([5; 20]));
        log.block_number = 4;

        assert!(LogFilter::new().matches(&log));
        assert!(LogFilter::new()
            .address(Address([5; 20]))
            .event::<RelayedMessage>()
            .topic1(hash.0)
            .from_block(4)
            .to_block(4)
            .matches(&log));
        assert!(!LogFilter::new().from_block(5).matches(&log));
        assert!(!LogFilter::new().to_block(3).matches(&log));
        assert!(!LogFilter::new().address(Address([6; 20])).matches(&log));
        assert!(!LogFilter::new().event::<SentMessage>().matches(&log));
        assert!(!LogFilter::new().topic1([0; 32]).matches(&log));
    }

    #[test]
    fn test_log_serde_hex() {
        let log = RelayedMessage {
            message_hash: MessageHash([7; 32]),
        }
        .to_log(Address([5; 20]));
        let json = serde_json::to_value(&log).unwrap();
        assert_eq!(json["topics"][1], format!("0x{}", "07".repeat(32)));
        let back: Log = serde_json::from_value(json).unwrap();
        assert_eq!(back, log);
    }
}
