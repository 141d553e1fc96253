//! Destination receiver (L2)
//!
//! The mirrored token on L2. It is bound once to the L1 gateway, mints on
//! deposits relayed from that gateway and burns on withdrawals.

use std::collections::HashSet;

use tracing::{info, warn};

use crate::domain::TxContext;
use crate::error::{BridgeError, BridgeResult};
use crate::events::{DepositFinalized, WithdrawalInitiated};
use crate::ledger::TokenLedger;
use crate::message::{BridgeCall, Message};
use crate::messenger::{DomainMessenger, RelayContext};
use crate::types::{Address, MessageHash};

#[derive(Debug, Clone)]
pub struct DestinationReceiver {
    /// Bound L1 gateway, set once by `init`
    gateway: Option<Address>,
    ledger: TokenLedger,
    /// Deposit identities already credited
    consumed: HashSet<MessageHash>,
}

impl DestinationReceiver {
    pub fn new(ledger: TokenLedger) -> Self {
        Self {
            gateway: None,
            ledger,
            consumed: HashSet::new(),
        }
    }

    pub fn address(&self) -> Address {
        self.ledger.address()
    }

    pub fn gateway(&self) -> Option<Address> {
        self.gateway
    }

    pub fn is_initialized(&self) -> bool {
        self.gateway.is_some()
    }

    pub fn ledger(&self) -> &TokenLedger {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut TokenLedger {
        &mut self.ledger
    }

    pub fn is_consumed(&self, hash: &MessageHash) -> bool {
        self.consumed.contains(hash)
    }

    /// Bind the L1 gateway
    pub fn init(&mut self, ctx: &mut TxContext<'_>, gateway: Address) -> BridgeResult<()> {
        if let Some(existing) = self.gateway {
            return Err(BridgeError::AlreadyInitialized { gateway: existing });
        }
        self.gateway = Some(gateway);
        info!(
            receiver = %self.address(),
            gateway = %gateway,
            by = %ctx.from(),
            "Receiver bound to gateway"
        );
        Ok(())
    }

    /// Mint for a deposit message admitted by the L2 messenger
    pub fn credit_from_message(
        &mut self,
        ctx: &mut TxContext<'_>,
        relay: &RelayContext,
        message: &Message,
    ) -> BridgeResult<()> {
        let hash = relay.hash;
        let gateway = self.gateway.ok_or(BridgeError::UnboundGateway)?;

        if relay.sender != gateway {
            warn!(
                hash = %hash,
                sender = %relay.sender,
                expected = %gateway,
                "Unauthorized cross-domain sender"
            );
            return Err(BridgeError::UnauthorizedSender {
                sender: relay.sender,
                expected: gateway,
            });
        }

        if self.consumed.contains(&hash) {
            warn!(hash = %hash, "Deposit already credited");
            return Err(BridgeError::Replay { hash });
        }

        let (from, to, amount) = match BridgeCall::decode(&message.payload)? {
            BridgeCall::FinalizeDeposit { from, to, amount } => (from, to, amount),
            BridgeCall::FinalizeWithdrawal { .. } => {
                return Err(BridgeError::UnknownMessage { hash });
            }
        };

        self.ledger.mint(ctx, to, amount)?;
        self.consumed.insert(hash);

        ctx.emit(self.address(), &DepositFinalized { from, to, amount });
        info!(hash = %hash, to = %to, amount, "Deposit finalized");
        Ok(())
    }

    /// Burn `amount` of `from`'s tokens and send a release for `to` to L1
    pub fn withdraw_to(
        &mut self,
        ctx: &mut TxContext<'_>,
        messenger: &mut DomainMessenger,
        from: Address,
        to: Address,
        amount: u128,
    ) -> BridgeResult<Message> {
        let gateway = self.gateway.ok_or(BridgeError::UnboundGateway)?;
        if amount == 0 {
            return Err(BridgeError::InvalidAmount {
                reason: "withdrawal amount must be greater than zero".to_string(),
            });
        }

        self.ledger.burn(ctx, from, amount)?;

        let call = BridgeCall::FinalizeWithdrawal { from, to, amount };
        let message = messenger.send_message(ctx, self.address(), gateway, &call.encode())?;

        ctx.emit(self.address(), &WithdrawalInitiated { from, to, amount });
        info!(
            hash = %message.hash(),
            from = %from,
            to = %to,
            amount,
            "Withdrawal initiated"
        );
        Ok(message)
    }
}
