//! Cross-domain messages and their canonical encoding
//!
//! A message is laid out exactly like
//! `abi.encode(bytes4 source, bytes4 destination, address sender, address target, uint256 nonce, bytes payload)`
//! and identified by keccak256 of that encoding. Both domains and the watcher
//! compute identities through this one function, so an identity observed on
//! L1 matches the identity consumed on L2 byte for byte.

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, BridgeResult};
use crate::hash::{
    address_word, domain_word, keccak256, padding_for, read_address, read_domain, read_u128,
    read_u64, selector, u128_word, u64_word, WORD,
};
use crate::types::{hex_bytes, Address, DomainId, MessageHash};

/// Default upper bound on message payload size
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 4096;

/// Number of head words before the dynamic payload
const HEAD_WORDS: usize = 6;

/// A cross-domain call descriptor
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub source_domain: DomainId,
    pub destination_domain: DomainId,
    /// Contract on the source domain that sent the message
    pub sender: Address,
    /// Entry point on the destination domain
    pub target: Address,
    /// Per-sender sequence number assigned by the source messenger
    pub nonce: u64,
    #[serde(with = "hex_bytes")]
    pub payload: Vec<u8>,
}

impl Message {
    /// Canonical encoding
    pub fn encode(&self) -> Vec<u8> {
        let padded = self.payload.len() + padding_for(self.payload.len());
        let mut out = Vec::with_capacity((HEAD_WORDS + 1) * WORD + padded);
        out.extend_from_slice(&domain_word(&self.source_domain));
        out.extend_from_slice(&domain_word(&self.destination_domain));
        out.extend_from_slice(&address_word(&self.sender));
        out.extend_from_slice(&address_word(&self.target));
        out.extend_from_slice(&u64_word(self.nonce));
        out.extend_from_slice(&u64_word((HEAD_WORDS * WORD) as u64));
        out.extend_from_slice(&u64_word(self.payload.len() as u64));
        out.extend_from_slice(&self.payload);
        out.resize(out.len() + padding_for(self.payload.len()), 0);
        out
    }

    /// Message identity: keccak256 of the canonical encoding
    pub fn hash(&self) -> MessageHash {
        MessageHash(keccak256(&self.encode()))
    }

    /// Decode a canonical encoding, rejecting anything non-canonical
    pub fn decode(data: &[u8]) -> BridgeResult<Self> {
        let word = |i: usize| data.get(i * WORD..(i + 1) * WORD);

        if data.len() < (HEAD_WORDS + 1) * WORD {
            return Err(BridgeError::encoding(format!(
                "message encoding too short: {} bytes",
                data.len()
            )));
        }

        let source_domain = word(0)
            .and_then(read_domain)
            .ok_or_else(|| BridgeError::encoding("invalid source domain word"))?;
        let destination_domain = word(1)
            .and_then(read_domain)
            .ok_or_else(|| BridgeError::encoding("invalid destination domain word"))?;
        let sender = word(2)
            .and_then(read_address)
            .ok_or_else(|| BridgeError::encoding("invalid sender word"))?;
        let target = word(3)
            .and_then(read_address)
            .ok_or_else(|| BridgeError::encoding("invalid target word"))?;
        let nonce = word(4)
            .and_then(read_u64)
            .ok_or_else(|| BridgeError::encoding("invalid nonce word"))?;

        let offset = word(5).and_then(read_u64);
        if offset != Some((HEAD_WORDS * WORD) as u64) {
            return Err(BridgeError::encoding("non-canonical payload offset"));
        }

        let len = word(6)
            .and_then(read_u64)
            .and_then(|len| usize::try_from(len).ok())
            .ok_or_else(|| BridgeError::encoding("invalid payload length word"))?;
        let start = (HEAD_WORDS + 1) * WORD;
        let expected = len
            .checked_add(padding_for(len))
            .and_then(|n| n.checked_add(start))
            .ok_or_else(|| BridgeError::encoding("payload length overflow"))?;
        if data.len() != expected {
            return Err(BridgeError::encoding(format!(
                "message encoding length mismatch: expected {}, got {}",
                expected,
                data.len()
            )));
        }
        if data[start + len..].iter().any(|&b| b != 0) {
            return Err(BridgeError::encoding("non-zero payload padding"));
        }

        Ok(Message {
            source_domain,
            destination_domain,
            sender,
            target,
            nonce,
            payload: data[start..start + len].to_vec(),
        })
    }
}

/// Builds messages for one direction of one domain pair
#[derive(Debug, Clone)]
pub struct MessageEncoder {
    source_domain: DomainId,
    destination_domain: DomainId,
    max_payload_bytes: usize,
}

impl MessageEncoder {
    pub fn new(source_domain: DomainId, destination_domain: DomainId) -> Self {
        Self {
            source_domain,
            destination_domain,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
        }
    }

    pub fn with_max_payload_bytes(mut self, max_payload_bytes: usize) -> Self {
        self.max_payload_bytes = max_payload_bytes;
        self
    }

    pub fn source_domain(&self) -> DomainId {
        self.source_domain
    }

    pub fn destination_domain(&self) -> DomainId {
        self.destination_domain
    }

    pub fn max_payload_bytes(&self) -> usize {
        self.max_payload_bytes
    }

    /// Build a message. Pure: the same inputs always give the same identity.
    pub fn encode(
        &self,
        sender: Address,
        target: Address,
        payload: &[u8],
        nonce: u64,
    ) -> BridgeResult<Message> {
        if payload.len() > self.max_payload_bytes {
            return Err(BridgeError::encoding(format!(
                "payload of {} bytes exceeds maximum of {}",
                payload.len(),
                self.max_payload_bytes
            )));
        }
        if target.is_zero() {
            return Err(BridgeError::encoding("target must not be the zero address"));
        }

        Ok(Message {
            source_domain: self.source_domain,
            destination_domain: self.destination_domain,
            sender,
            target,
            nonce,
            payload: payload.to_vec(),
        })
    }
}

// ============================================================================
// Bridge entry-point calldata
// ============================================================================

pub const FINALIZE_DEPOSIT_SIGNATURE: &str = "finalizeDeposit(address,address,uint256)";
pub const FINALIZE_WITHDRAWAL_SIGNATURE: &str = "finalizeWithdrawal(address,address,uint256)";

/// Calldata carried in a bridge message payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "call", rename_all = "camelCase")]
pub enum BridgeCall {
    /// Credit `amount` to `to` on L2 for tokens `from` locked on L1
    FinalizeDeposit { from: Address, to: Address, amount: u128 },
    /// Release `amount` to `to` on L1 for tokens `from` burned on L2
    FinalizeWithdrawal { from: Address, to: Address, amount: u128 },
}

impl BridgeCall {
    const ENCODED_LEN: usize = 4 + 3 * WORD;

    pub fn encode(&self) -> Vec<u8> {
        let (sig, from, to, amount) = match self {
            BridgeCall::FinalizeDeposit { from, to, amount } => {
                (FINALIZE_DEPOSIT_SIGNATURE, from, to, amount)
            }
            BridgeCall::FinalizeWithdrawal { from, to, amount } => {
                (FINALIZE_WITHDRAWAL_SIGNATURE, from, to, amount)
            }
        };
        let mut out = Vec::with_capacity(Self::ENCODED_LEN);
        out.extend_from_slice(&selector(sig));
        out.extend_from_slice(&address_word(from));
        out.extend_from_slice(&address_word(to));
        out.extend_from_slice(&u128_word(*amount));
        out
    }

    pub fn decode(data: &[u8]) -> BridgeResult<Self> {
        if data.len() != Self::ENCODED_LEN {
            return Err(BridgeError::encoding(format!(
                "bridge calldata must be {} bytes, got {}",
                Self::ENCODED_LEN,
                data.len()
            )));
        }
        let args = &data[4..];
        let from = read_address(&args[..WORD])
            .ok_or_else(|| BridgeError::encoding("invalid `from` argument"))?;
        let to = read_address(&args[WORD..2 * WORD])
            .ok_or_else(|| BridgeError::encoding("invalid `to` argument"))?;
        let amount = read_u128(&args[2 * WORD..])
            .ok_or_else(|| BridgeError::encoding("amount does not fit in 128 bits"))?;

        let sel = &data[..4];
        if sel == selector(FINALIZE_DEPOSIT_SIGNATURE) {
            Ok(BridgeCall::FinalizeDeposit { from, to, amount })
        } else if sel == selector(FINALIZE_WITHDRAWAL_SIGNATURE) {
            Ok(BridgeCall::FinalizeWithdrawal { from, to, amount })
        } else {
            Err(BridgeError::encoding(format!(
                "unknown selector 0x{}",
                hex::encode(sel)
            )))
        }
    }

    pub fn amount(&self) -> u128 {
        match self {
            BridgeCall::FinalizeDeposit { amount, .. }
            | BridgeCall::FinalizeWithdrawal { amount, .. } => *amount,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoder() -> MessageEncoder {
        MessageEncoder::new(DomainId::from_u32(31337), DomainId::from_u32(420))
    }

    fn sample() -> Message {
        encoder()
            .encode(
                Address([0x11; 20]),
                Address([0x22; 20]),
                b"deposit payload",
                7,
            )
            .unwrap()
    }

    #[test]
    fn test_identity_is_deterministic() {
        let a = sample();
        let b = sample();
        assert_eq!(a.hash(), b.hash());

        // Re-deriving from the encoding gives the same identity
        let decoded = Message::decode(&a.encode()).unwrap();
        assert_eq!(decoded, a);
        assert_eq!(decoded.hash(), a.hash());
    }

    #[test]
    fn test_identity_covers_every_field() {
        let base = sample();
        let mut variants = Vec::new();

        let mut m = base.clone();
        m.nonce += 1;
        variants.push(m);
        let mut m = base.clone();
        m.sender = Address([0x33; 20]);
        variants.push(m);
        let mut m = base.clone();
        m.target = Address([0x33; 20]);
        variants.push(m);
        let mut m = base.clone();
        m.payload.push(0);
        variants.push(m);
        let mut m = base.clone();
        m.destination_domain = DomainId::from_u32(10);
        variants.push(m);

        for variant in variants {
            assert_ne!(variant.hash(), base.hash(), "{:?}", variant);
        }
    }

    #[test]
    fn test_encoding_layout() {
        let msg = sample();
        let encoded = msg.encode();
        // 7 words of head + length, payload padded to one word
        assert_eq!(encoded.len(), 8 * WORD);
        assert_eq!(&encoded[..4], &31337u32.to_be_bytes());
        assert_eq!(read_u64(&encoded[5 * WORD..6 * WORD]), Some(0xc0));
        assert_eq!(read_u64(&encoded[6 * WORD..7 * WORD]), Some(15));
    }

    #[test]
    fn test_payload_limit() {
        let enc = encoder().with_max_payload_bytes(8);
        assert!(enc
            .encode(Address([1; 20]), Address([2; 20]), &[0u8; 8], 0)
            .is_ok());
        let err = enc
            .encode(Address([1; 20]), Address([2; 20]), &[0u8; 9], 0)
            .unwrap_err();
        assert!(matches!(err, BridgeError::Encoding { .. }));
    }

    #[test]
    fn test_empty_payload() {
        let msg = encoder()
            .encode(Address([1; 20]), Address([2; 20]), &[], 0)
            .unwrap();
        let encoded = msg.encode();
        assert_eq!(encoded.len(), 7 * WORD);
        assert_eq!(Message::decode(&encoded).unwrap(), msg);
    }

    #[test]
    fn test_decode_rejects_non_canonical() {
        let mut encoded = sample().encode();
        // dirty padding
        let last = encoded.len() - 1;
        encoded[last] = 1;
        assert!(Message::decode(&encoded).is_err());

        let encoded = sample().encode();
        assert!(Message::decode(&encoded[..encoded.len() - 1]).is_err());
        assert!(Message::decode(&[0u8; 10]).is_err());
    }

    #[test]
    fn test_bridge_call_calldata() {
        let call = BridgeCall::FinalizeDeposit {
            from: Address([1; 20]),
            to: Address([2; 20]),
            amount: 10,
        };
        let data = call.encode();
        assert_eq!(data.len(), 100);
        assert_eq!(&data[..4], &selector(FINALIZE_DEPOSIT_SIGNATURE));
        assert_eq!(BridgeCall::decode(&data).unwrap(), call);
        assert_eq!(call.amount(), 10);

        let mut bad = data.clone();
        bad[0] ^= 0xff;
        assert!(matches!(
            BridgeCall::decode(&bad),
            Err(BridgeError::Encoding { .. })
        ));
        assert!(BridgeCall::decode(&data[..99]).is_err());
    }
}
