//! Per-domain balance ledger
//!
//! A fungible-token ledger with the usual transfer / approve / allowance
//! semantics plus mint and burn for the bridged mirror on L2. Every mutation
//! takes the acting account explicitly and emits its event into the running
//! transaction.

use std::collections::HashMap;

use serde::Serialize;

use crate::domain::TxContext;
use crate::error::{BridgeError, BridgeResult};
use crate::events::{Approval, Transfer};
use crate::types::Address;

#[derive(Debug, Clone, Serialize)]
pub struct TokenLedger {
    address: Address,
    name: String,
    symbol: String,
    decimals: u8,
    total_supply: u128,
    #[serde(skip)]
    balances: HashMap<Address, u128>,
    #[serde(skip)]
    allowances: HashMap<(Address, Address), u128>,
}

impl TokenLedger {
    pub fn new(address: Address, name: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            address,
            name: name.into(),
            symbol: symbol.into(),
            decimals: 18,
            total_supply: 0,
            balances: HashMap::new(),
            allowances: HashMap::new(),
        }
    }

    /// Genesis allocation; no event is emitted
    pub fn with_initial_supply(mut self, holder: Address, amount: u128) -> Self {
        self.balances.insert(holder, amount);
        self.total_supply = amount;
        self
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    pub fn total_supply(&self) -> u128 {
        self.total_supply
    }

    pub fn balance_of(&self, account: &Address) -> u128 {
        self.balances.get(account).copied().unwrap_or(0)
    }

    pub fn allowance(&self, owner: &Address, spender: &Address) -> u128 {
        self.allowances
            .get(&(*owner, *spender))
            .copied()
            .unwrap_or(0)
    }

    pub fn transfer(
        &mut self,
        ctx: &mut TxContext<'_>,
        owner: Address,
        to: Address,
        amount: u128,
    ) -> BridgeResult<()> {
        self.move_balance(owner, to, amount)?;
        ctx.emit(
            self.address,
            &Transfer {
                from: owner,
                to,
                value: amount,
            },
        );
        Ok(())
    }

    pub fn approve(
        &mut self,
        ctx: &mut TxContext<'_>,
        owner: Address,
        spender: Address,
        amount: u128,
    ) -> BridgeResult<()> {
        if spender.is_zero() {
            return Err(BridgeError::InvalidAmount {
                reason: "cannot approve the zero address".to_string(),
            });
        }
        self.allowances.insert((owner, spender), amount);
        ctx.emit(
            self.address,
            &Approval {
                owner,
                spender,
                value: amount,
            },
        );
        Ok(())
    }

    /// Move `amount` from `owner` to `to` on behalf of `spender`
    pub fn transfer_from(
        &mut self,
        ctx: &mut TxContext<'_>,
        spender: Address,
        owner: Address,
        to: Address,
        amount: u128,
    ) -> BridgeResult<()> {
        let approved = self.allowance(&owner, &spender);
        if approved < amount {
            return Err(BridgeError::InsufficientAllowance {
                approved,
                required: amount,
            });
        }
        self.move_balance(owner, to, amount)?;
        self.allowances.insert((owner, spender), approved - amount);
        ctx.emit(
            self.address,
            &Transfer {
                from: owner,
                to,
                value: amount,
            },
        );
        Ok(())
    }

    pub fn mint(&mut self, ctx: &mut TxContext<'_>, to: Address, amount: u128) -> BridgeResult<()> {
        let supply = self
            .total_supply
            .checked_add(amount)
            .ok_or_else(|| BridgeError::InvalidAmount {
                reason: "total supply overflow".to_string(),
            })?;
        self.total_supply = supply;
        *self.balances.entry(to).or_insert(0) += amount;
        ctx.emit(
            self.address,
            &Transfer {
                from: Address::ZERO,
                to,
                value: amount,
            },
        );
        Ok(())
    }

    pub fn burn(
        &mut self,
        ctx: &mut TxContext<'_>,
        owner: Address,
        amount: u128,
    ) -> BridgeResult<()> {
        self.debit(owner, amount)?;
        self.total_supply -= amount;
        ctx.emit(
            self.address,
            &Transfer {
                from: owner,
                to: Address::ZERO,
                value: amount,
            },
        );
        Ok(())
    }

    fn move_balance(&mut self, from: Address, to: Address, amount: u128) -> BridgeResult<()> {
        self.debit(from, amount)?;
        // Cannot overflow: balances are bounded by total supply
        *self.balances.entry(to).or_insert(0) += amount;
        Ok(())
    }

    fn debit(&mut self, account: Address, amount: u128) -> BridgeResult<()> {
        let available = self.balance_of(&account);
        if available < amount {
            return Err(BridgeError::InsufficientBalance {
                available,
                required: amount,
            });
        }
        self.balances.insert(account, available - amount);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::parse_log;
    use crate::types::DomainId;

    fn alice() -> Address {
        Address::from_label("alice")
    }

    fn bob() -> Address {
        Address::from_label("bob")
    }

    fn ledger() -> TokenLedger {
        TokenLedger::new(Address::from_label("token"), "Test Token", "TST")
            .with_initial_supply(alice(), 1_000)
    }

    fn ctx(from: Address) -> TxContext<'static> {
        TxContext::detached(DomainId::from_u32(31337), from)
    }

    #[test]
    fn test_transfer() {
        let mut ledger = ledger();
        let mut ctx = ctx(alice());
        ledger.transfer(&mut ctx, alice(), bob(), 400).unwrap();

        assert_eq!(ledger.balance_of(&alice()), 600);
        assert_eq!(ledger.balance_of(&bob()), 400);
        assert_eq!(ledger.total_supply(), 1_000);

        let logs = ctx.logs();
        assert_eq!(logs.len(), 1);
        let event = parse_log::<Transfer>(&logs[0]).unwrap();
        assert_eq!(event.value, 400);
    }

    #[test]
    fn test_transfer_insufficient_balance() {
        let mut ledger = ledger();
        let mut ctx = ctx(bob());
        let err = ledger.transfer(&mut ctx, bob(), alice(), 1).unwrap_err();
        assert_eq!(
            err,
            BridgeError::InsufficientBalance {
                available: 0,
                required: 1
            }
        );
        assert!(ctx.logs().is_empty());
    }

    #[test]
    fn test_transfer_from_consumes_allowance() {
        let mut ledger = ledger();
        let spender = Address::from_label("gateway");
        let mut ctx = ctx(alice());

        ledger.approve(&mut ctx, alice(), spender, 10).unwrap();
        assert_eq!(ledger.allowance(&alice(), &spender), 10);

        let err = ledger
            .transfer_from(&mut ctx, spender, alice(), spender, 11)
            .unwrap_err();
        assert!(matches!(err, BridgeError::InsufficientAllowance { .. }));

        ledger
            .transfer_from(&mut ctx, spender, alice(), spender, 10)
            .unwrap();
        assert_eq!(ledger.allowance(&alice(), &spender), 0);
        assert_eq!(ledger.balance_of(&spender), 10);
        assert_eq!(ledger.balance_of(&alice()), 990);
    }

    #[test]
    fn test_mint_and_burn_track_supply() {
        let mut ledger = TokenLedger::new(Address::from_label("mirror"), "Mirror", "MIR");
        let mut ctx = ctx(alice());

        ledger.mint(&mut ctx, bob(), 10).unwrap();
        assert_eq!(ledger.total_supply(), 10);
        assert_eq!(ledger.balance_of(&bob()), 10);

        ledger.burn(&mut ctx, bob(), 4).unwrap();
        assert_eq!(ledger.total_supply(), 6);
        assert_eq!(ledger.balance_of(&bob()), 6);

        assert!(ledger.burn(&mut ctx, bob(), 7).is_err());
        assert_eq!(ledger.total_supply(), 6);

        let mint = parse_log::<Transfer>(&ctx.logs()[0]).unwrap();
        assert_eq!(mint.from, Address::ZERO);
        let burn = parse_log::<Transfer>(&ctx.logs()[1]).unwrap();
        assert_eq!(burn.to, Address::ZERO);
    }

    #[test]
    fn test_mint_overflow() {
        let mut ledger = TokenLedger::new(Address::from_label("mirror"), "Mirror", "MIR")
            .with_initial_supply(alice(), u128::MAX);
        let mut ctx = ctx(alice());
        assert!(matches!(
            ledger.mint(&mut ctx, bob(), 1),
            Err(BridgeError::InvalidAmount { .. })
        ));
    }
}
