//! Common Test Assertions
//!
//! Assertion helpers for end-to-end tests of bridge operations.

use eyre::{eyre, Result};

use crate::types::{Address, MessageHash, MessageStatus};

/// Assert that two addresses are equal
pub fn assert_address_eq(actual: &Address, expected: &Address) -> Result<()> {
    if actual != expected {
        return Err(eyre!(
            "Address mismatch: expected {}, got {}",
            expected.as_hex(),
            actual.as_hex()
        ));
    }
    Ok(())
}

/// Assert that a hash matches expected
pub fn assert_hash_eq(actual: &MessageHash, expected: &MessageHash) -> Result<()> {
    if actual != expected {
        return Err(eyre!(
            "Hash mismatch: expected {}, got {}",
            expected.to_hex(),
            actual.to_hex()
        ));
    }
    Ok(())
}

/// Assert that a balance increased by exactly `expected_increase`
pub fn assert_balance_increased(
    balance_before: u128,
    balance_after: u128,
    expected_increase: u128,
) -> Result<()> {
    if balance_after < balance_before || balance_after - balance_before != expected_increase {
        return Err(eyre!(
            "Balance increase mismatch: expected {}, got {} (before: {}, after: {})",
            expected_increase,
            balance_after as i128 - balance_before as i128,
            balance_before,
            balance_after
        ));
    }
    Ok(())
}

/// Assert that a balance decreased by exactly `expected_decrease`
pub fn assert_balance_decreased(
    balance_before: u128,
    balance_after: u128,
    expected_decrease: u128,
) -> Result<()> {
    if balance_after > balance_before || balance_before - balance_after != expected_decrease {
        return Err(eyre!(
            "Balance decrease mismatch: expected {}, got {} (before: {}, after: {})",
            expected_decrease,
            balance_before as i128 - balance_after as i128,
            balance_before,
            balance_after
        ));
    }
    Ok(())
}

/// Assert that L1 custody backs the L2 supply one to one
pub fn assert_conserved(custody: u128, l2_supply: u128, in_flight_withdrawals: u128) -> Result<()> {
    if custody != l2_supply + in_flight_withdrawals {
        return Err(eyre!(
            "Supply not conserved: custody {} != L2 supply {} + in-flight withdrawals {}",
            custody,
            l2_supply,
            in_flight_withdrawals
        ));
    }
    Ok(())
}

/// Assert a messenger record's status
pub fn assert_status(actual: Option<MessageStatus>, expected: MessageStatus) -> Result<()> {
    match actual {
        Some(status) if status == expected => Ok(()),
        Some(status) => Err(eyre!("Expected status {}, got {}", expected, status)),
        None => Err(eyre!("Expected status {}, message unknown", expected)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assert_balance_increased() {
        assert!(assert_balance_increased(100, 110, 10).is_ok());
        assert!(assert_balance_increased(100, 109, 10).is_err());
        assert!(assert_balance_increased(100, 90, 10).is_err());
    }

    #[test]
    fn test_assert_balance_decreased() {
        assert!(assert_balance_decreased(100, 90, 10).is_ok());
        assert!(assert_balance_decreased(100, 95, 10).is_err());
    }

    #[test]
    fn test_assert_conserved() {
        assert!(assert_conserved(10, 7, 3).is_ok());
        assert!(assert_conserved(10, 10, 3).is_err());
    }

    #[test]
    fn test_assert_status() {
        assert!(assert_status(Some(MessageStatus::Relayed), MessageStatus::Relayed).is_ok());
        assert!(assert_status(Some(MessageStatus::Failed), MessageStatus::Relayed).is_err());
        assert!(assert_status(None, MessageStatus::Sent).is_err());
    }

    #[test]
    fn test_assert_hash_eq() {
        let a = MessageHash([1; 32]);
        assert!(assert_hash_eq(&a, &a).is_ok());
        assert!(assert_hash_eq(&a, &MessageHash([2; 32])).is_err());
    }
}
