//! Hash and ABI-word helpers shared by the encoder, events and domains
//!
//! Everything that crosses a domain boundary is laid out as 32-byte ABI words
//! and identified by keccak-256, so an identity computed while observing one
//! domain can be matched byte-for-byte against the identity consumed on the
//! other.

use tiny_keccak::{Hasher, Keccak};

use crate::types::{Address, DomainId};

/// Size of one ABI word
pub const WORD: usize = 32;

/// Compute keccak256 hash of data
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut output = [0u8; 32];
    hasher.finalize(&mut output);
    output
}

/// Topic of an event, i.e. keccak256 of its canonical signature
///
/// `event_topic("Transfer(address,address,uint256)")`
pub fn event_topic(signature: &str) -> [u8; 32] {
    keccak256(signature.as_bytes())
}

/// First four bytes of keccak256 of a function signature
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

// ============================================================================
// ABI words
// ============================================================================

/// uint256 word from a u128 (big-endian, left-padded)
pub fn u128_word(value: u128) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[16..].copy_from_slice(&value.to_be_bytes());
    word
}

/// uint256 word from a u64 (big-endian, left-padded)
pub fn u64_word(value: u64) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[24..].copy_from_slice(&value.to_be_bytes());
    word
}

/// address word (left-padded with zeros)
pub fn address_word(address: &Address) -> [u8; 32] {
    address.as_bytes32()
}

/// bytes4 word (right-padded, as `abi.encode` lays out fixed bytes)
pub fn domain_word(domain: &DomainId) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[..4].copy_from_slice(domain.as_bytes());
    word
}

/// Read a uint256 word that must fit in u128
pub fn read_u128(word: &[u8]) -> Option<u128> {
    if word.len() != WORD || word[..16].iter().any(|&b| b != 0) {
        return None;
    }
    Some(u128::from_be_bytes(word[16..].try_into().ok()?))
}

/// Read a uint256 word that must fit in u64
pub fn read_u64(word: &[u8]) -> Option<u64> {
    if word.len() != WORD || word[..24].iter().any(|&b| b != 0) {
        return None;
    }
    Some(u64::from_be_bytes(word[24..].try_into().ok()?))
}

/// Read an address word; the 12 padding bytes must be zero
pub fn read_address(word: &[u8]) -> Option<Address> {
    if word.len() != WORD || word[..12].iter().any(|&b| b != 0) {
        return None;
    }
    let mut raw = [0u8; 20];
    raw.copy_from_slice(&word[12..]);
    Some(Address(raw))
}

/// Read a bytes4 word; the 28 padding bytes must be zero
pub fn read_domain(word: &[u8]) -> Option<DomainId> {
    if word.len() != WORD || word[4..].iter().any(|&b| b != 0) {
        return None;
    }
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&word[..4]);
    Some(DomainId(raw))
}

/// Number of zero bytes needed to pad `len` up to a word boundary
pub fn padding_for(len: usize) -> usize {
    (WORD - len % WORD) % WORD
}

// ============================================================================
// Addresses
// ============================================================================

/// Deterministic contract address for a deployment on a domain
///
/// Mirrors CREATE-style derivation: the last 20 bytes of
/// `keccak256(domain ++ deployer ++ nonce)`.
pub fn contract_address(domain: &DomainId, deployer: &Address, nonce: u64) -> Address {
    let mut data = [0u8; 4 + 20 + 8];
    data[..4].copy_from_slice(domain.as_bytes());
    data[4..24].copy_from_slice(deployer.as_bytes());
    data[24..].copy_from_slice(&nonce.to_be_bytes());
    let hash = keccak256(&data);
    let mut raw = [0u8; 20];
    raw.copy_from_slice(&hash[12..]);
    Address(raw)
}

/// Convert bytes to hex string with 0x prefix
pub fn bytes32_to_hex(bytes: &[u8; 32]) -> String {
    format!("0x{}", hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keccak256() {
        let result = keccak256(b"hello");
        assert_eq!(
            bytes32_to_hex(&result),
            "0x1c8aff950685c2ed4bc3174f3472287b56d9517b9c948127319a09a7a36deac8"
        );
    }

    #[test]
    fn test_selector_and_topic() {
        assert_eq!(selector("transfer(address,uint256)"), [0xa9, 0x05, 0x9c, 0xbb]);
        assert_eq!(
            bytes32_to_hex(&event_topic("Transfer(address,address,uint256)")),
            "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"
        );
    }

    #[test]
    fn test_words() {
        let word = u128_word(10_000_000);
        assert_eq!(read_u128(&word), Some(10_000_000));
        assert_eq!(read_u64(&u64_word(7)), Some(7));

        // Non-zero high bytes do not fit
        let mut wide = [0u8; 32];
        wide[0] = 1;
        assert_eq!(read_u128(&wide), None);
        assert_eq!(read_u128(&word[..31]), None);

        let addr = Address([0x42; 20]);
        assert_eq!(read_address(&address_word(&addr)), Some(addr));

        let domain = DomainId::from_u32(420);
        assert_eq!(read_domain(&domain_word(&domain)), Some(domain));
    }

    #[test]
    fn test_padding_for() {
        assert_eq!(padding_for(0), 0);
        assert_eq!(padding_for(1), 31);
        assert_eq!(padding_for(32), 0);
        assert_eq!(padding_for(68), 28);
    }

    #[test]
    fn test_contract_address_is_deterministic() {
        let deployer = Address([1u8; 20]);
        let l1 = DomainId::from_u32(31337);
        let a = contract_address(&l1, &deployer, 0);
        assert_eq!(a, contract_address(&l1, &deployer, 0));
        assert_ne!(a, contract_address(&l1, &deployer, 1));
        assert_ne!(a, contract_address(&DomainId::from_u32(420), &deployer, 0));
    }
}
