//! Common types for cross-domain operations
//!
//! Identifiers shared by both domains, the encoder, the messengers and the
//! watcher.

use eyre::{eyre, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::hash::{bytes32_to_hex, keccak256};

// ============================================================================
// Domain ID (4 bytes)
// ============================================================================

/// Represents a 4-byte domain (chain) ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct DomainId(pub [u8; 4]);

impl DomainId {
    /// Create from u32
    pub const fn from_u32(id: u32) -> Self {
        DomainId(id.to_be_bytes())
    }

    /// Convert to u32
    pub fn to_u32(&self) -> u32 {
        u32::from_be_bytes(self.0)
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    /// Create from hex string (with or without 0x prefix)
    pub fn from_hex(hex: &str) -> Result<Self> {
        let hex = hex.strip_prefix("0x").unwrap_or(hex);
        let bytes = hex::decode(hex)?;
        if bytes.len() != 4 {
            return Err(eyre!("DomainId must be 4 bytes, got {}", bytes.len()));
        }
        let mut result = [0u8; 4];
        result.copy_from_slice(&bytes);
        Ok(DomainId(result))
    }

    /// Convert to hex string with 0x prefix
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for DomainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_u32())
    }
}

impl From<u32> for DomainId {
    fn from(id: u32) -> Self {
        DomainId::from_u32(id)
    }
}

// ============================================================================
// Address (20 bytes)
// ============================================================================

/// Account or contract address (20 bytes)
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    /// Create from hex string (with or without 0x prefix)
    ///
    /// Accepts both 20-byte addresses (40 hex chars) and 32-byte padded addresses
    /// (64 hex chars). For 32-byte addresses, the first 12 bytes must be zeros
    /// and the last 20 bytes are extracted.
    pub fn from_hex(hex: &str) -> Result<Self> {
        let hex = hex.strip_prefix("0x").unwrap_or(hex);
        let bytes = hex::decode(hex)?;

        match bytes.len() {
            20 => {
                let mut result = [0u8; 20];
                result.copy_from_slice(&bytes);
                Ok(Address(result))
            }
            32 => {
                if bytes[..12].iter().any(|&b| b != 0) {
                    return Err(eyre!(
                        "32-byte address has non-zero padding: expected 12 leading zero bytes"
                    ));
                }
                let mut result = [0u8; 20];
                result.copy_from_slice(&bytes[12..]);
                Ok(Address(result))
            }
            len => Err(eyre!("Address must be 20 or 32 bytes, got {} bytes", len)),
        }
    }

    /// Deterministic address for a human-readable label (test accounts, fixtures)
    pub fn from_label(label: &str) -> Self {
        let hash = keccak256(label.as_bytes());
        let mut result = [0u8; 20];
        result.copy_from_slice(&hash[12..]);
        Address(result)
    }

    /// Convert to hex string with 0x prefix
    pub fn as_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Convert to bytes32 (left-padded with zeros)
    pub fn as_bytes32(&self) -> [u8; 32] {
        let mut result = [0u8; 32];
        result[12..].copy_from_slice(&self.0);
        result
    }

    /// Create from bytes32 (extract last 20 bytes)
    pub fn from_bytes32(bytes: &[u8; 32]) -> Self {
        let mut result = [0u8; 20];
        result.copy_from_slice(&bytes[12..]);
        Address(result)
    }

    /// Get raw bytes
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_hex())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.as_hex())
    }
}

impl FromStr for Address {
    type Err = eyre::Error;

    fn from_str(s: &str) -> Result<Self> {
        Address::from_hex(s.trim())
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.as_hex())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Address::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// 32-byte identifiers
// ============================================================================

macro_rules! bytes32_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        pub struct $name(pub [u8; 32]);

        impl $name {
            pub const ZERO: $name = $name([0u8; 32]);

            /// Create from hex string (with or without 0x prefix)
            pub fn from_hex(hex: &str) -> Result<Self> {
                let hex = hex.strip_prefix("0x").unwrap_or(hex);
                let bytes = hex::decode(hex)?;
                if bytes.len() != 32 {
                    return Err(eyre!(
                        "{} must be 32 bytes, got {}",
                        stringify!($name),
                        bytes.len()
                    ));
                }
                let mut result = [0u8; 32];
                result.copy_from_slice(&bytes);
                Ok($name(result))
            }

            /// Convert to hex string with 0x prefix
            pub fn to_hex(&self) -> String {
                bytes32_to_hex(&self.0)
            }

            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_hex())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.to_hex())
            }
        }

        impl FromStr for $name {
            type Err = eyre::Error;

            fn from_str(s: &str) -> Result<Self> {
                $name::from_hex(s.trim())
            }
        }

        impl From<[u8; 32]> for $name {
            fn from(bytes: [u8; 32]) -> Self {
                $name(bytes)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(
                &self,
                serializer: S,
            ) -> std::result::Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(
                deserializer: D,
            ) -> std::result::Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                $name::from_hex(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

bytes32_id!(
    /// Identity of a cross-domain message (keccak256 of its canonical encoding)
    MessageHash
);

bytes32_id!(
    /// Transaction reference on a domain
    TxHash
);

bytes32_id!(
    /// Block hash on a domain
    BlockHash
);

// ============================================================================
// Message status
// ============================================================================

/// Lifecycle status of a message record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// Recorded by the source messenger
    Sent,
    /// Admitted by the destination messenger and delivered to its target
    Relayed,
    /// Admitted, but the target rejected it; may be relayed again
    Failed,
}

impl MessageStatus {
    /// Get the status as a lowercase string
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Sent => "sent",
            MessageStatus::Relayed => "relayed",
            MessageStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Serde helper rendering byte vectors as 0x-prefixed hex
pub(crate) mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s.strip_prefix("0x").unwrap_or(&s)).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_id_conversions() {
        let id = DomainId::from_u32(31337);
        assert_eq!(id.to_u32(), 31337);
        assert_eq!(id.to_hex(), "0x00007a69");
        assert_eq!(DomainId::from_hex("0x00007a69").unwrap(), id);
        assert_eq!(id.to_string(), "31337");
        assert!(DomainId::from_hex("0x0001").is_err());
    }

    #[test]
    fn test_address_from_hex() {
        let addr = Address::from_hex("0x4200000000000000000000000000000000000007").unwrap();
        assert_eq!(addr.0[0], 0x42);
        assert_eq!(addr.0[19], 0x07);

        // Padded form
        let padded = Address::from_hex(
            "0x0000000000000000000000004200000000000000000000000000000000000007",
        )
        .unwrap();
        assert_eq!(addr, padded);

        // Non-zero padding is rejected
        assert!(Address::from_hex(
            "0x0100000000000000000000004200000000000000000000000000000000000007"
        )
        .is_err());
        assert!(Address::from_hex("0x1234").is_err());
    }

    #[test]
    fn test_address_bytes32_roundtrip() {
        let addr = Address::from_label("alice");
        assert_eq!(Address::from_bytes32(&addr.as_bytes32()), addr);
        assert_ne!(addr, Address::from_label("bob"));
    }

    #[test]
    fn test_hash_serde_as_hex() {
        let hash = MessageHash([0xab; 32]);
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"0x{}\"", "ab".repeat(32)));
        let back: MessageHash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, hash);
    }

    #[test]
    fn test_tx_hash_from_str() {
        let s = format!("0x{}", "01".repeat(32));
        let tx: TxHash = s.parse().unwrap();
        assert_eq!(tx.to_hex(), s);
        assert!("0x01".parse::<TxHash>().is_err());
    }

    #[test]
    fn test_status_strings() {
        assert_eq!(MessageStatus::Sent.as_str(), "sent");
        assert_eq!(MessageStatus::Relayed.to_string(), "relayed");
        assert_eq!(
            serde_json::to_string(&MessageStatus::Failed).unwrap(),
            "\"failed\""
        );
    }
}
