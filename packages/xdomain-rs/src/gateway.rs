//! Source gateway (L1)
//!
//! Locks deposited tokens in gateway custody and asks the L1 messenger to
//! credit them on L2. Withdrawals coming back from the L2 receiver release
//! tokens from custody, at most once per message identity.

use std::collections::HashSet;

use tracing::{info, warn};

use crate::domain::TxContext;
use crate::error::{BridgeError, BridgeResult};
use crate::events::{DepositInitiated, WithdrawalFinalized};
use crate::ledger::TokenLedger;
use crate::message::{BridgeCall, Message};
use crate::messenger::{DomainMessenger, RelayContext};
use crate::types::{Address, MessageHash};

/// Gas limit requested for the L2 finalize call of a deposit
pub const DEFAULT_FINALIZE_DEPOSIT_L2_GAS: u32 = 1_200_000;

#[derive(Debug, Clone)]
pub struct SourceGateway {
    address: Address,
    /// L1 token held in custody
    token: Address,
    /// Receiver contract on L2
    l2_receiver: Address,
    /// Withdrawal identities already paid out
    consumed: HashSet<MessageHash>,
}

impl SourceGateway {
    pub fn new(address: Address, token: Address, l2_receiver: Address) -> Self {
        Self {
            address,
            token,
            l2_receiver,
            consumed: HashSet::new(),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn token(&self) -> Address {
        self.token
    }

    pub fn l2_receiver(&self) -> Address {
        self.l2_receiver
    }

    pub fn finalize_deposit_l2_gas(&self) -> u32 {
        DEFAULT_FINALIZE_DEPOSIT_L2_GAS
    }

    /// Tokens currently locked
    pub fn custody(&self, token: &TokenLedger) -> u128 {
        token.balance_of(&self.address)
    }

    pub fn is_consumed(&self, hash: &MessageHash) -> bool {
        self.consumed.contains(hash)
    }

    /// Lock `amount` of `from`'s tokens and send a credit for `to` to L2
    ///
    /// `from` must have approved at least `amount` to the gateway.
    pub fn deposit_to(
        &mut self,
        ctx: &mut TxContext<'_>,
        token: &mut TokenLedger,
        messenger: &mut DomainMessenger,
        from: Address,
        to: Address,
        amount: u128,
    ) -> BridgeResult<Message> {
        if amount == 0 {
            return Err(BridgeError::InvalidAmount {
                reason: "deposit amount must be greater than zero".to_string(),
            });
        }

        // Lock
        token.transfer_from(ctx, self.address, from, self.address, amount)?;

        // Send
        let call = BridgeCall::FinalizeDeposit { from, to, amount };
        let message = messenger.send_message(ctx, self.address, self.l2_receiver, &call.encode())?;

        ctx.emit(self.address, &DepositInitiated { from, to, amount });
        info!(
            hash = %message.hash(),
            from = %from,
            to = %to,
            amount,
            "Deposit initiated"
        );
        Ok(message)
    }

    /// Release tokens for a withdrawal message relayed from L2
    pub fn withdraw_confirm(
        &mut self,
        ctx: &mut TxContext<'_>,
        token: &mut TokenLedger,
        relay: &RelayContext,
        message: &Message,
    ) -> BridgeResult<()> {
        let hash = relay.hash;

        // Only the paired receiver burns on L2
        if relay.sender != self.l2_receiver {
            warn!(hash = %hash, sender = %relay.sender, "Withdrawal not sent by the L2 receiver");
            return Err(BridgeError::UnknownMessage { hash });
        }

        let (from, to, amount) = match BridgeCall::decode(&message.payload) {
            Ok(BridgeCall::FinalizeWithdrawal { from, to, amount }) => (from, to, amount),
            Ok(_) | Err(_) => {
                warn!(hash = %hash, "Withdrawal payload is not a finalizeWithdrawal call");
                return Err(BridgeError::UnknownMessage { hash });
            }
        };

        if self.consumed.contains(&hash) {
            warn!(hash = %hash, "Withdrawal already paid out");
            return Err(BridgeError::Replay { hash });
        }

        token.transfer(ctx, self.address, to, amount)?;
        self.consumed.insert(hash);

        ctx.emit(self.address, &WithdrawalFinalized { from, to, amount });
        info!(hash = %hash, to = %to, amount, "Withdrawal finalized");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageEncoder;
    use crate::types::DomainId;

    const L1: DomainId = DomainId::from_u32(31337);
    const L2: DomainId = DomainId::from_u32(420);

    struct Fixture {
        gateway: SourceGateway,
        token: TokenLedger,
        messenger: DomainMessenger,
    }

    fn depositor() -> Address {
        Address::from_label("depositor")
    }

    fn receiver() -> Address {
        Address::from_label("l2-receiver")
    }

    fn fixture() -> Fixture {
        let token = TokenLedger::new(Address::from_label("token"), "Token", "OPT")
            .with_initial_supply(depositor(), 10_000_000);
        Fixture {
            gateway: SourceGateway::new(Address::from_label("gateway"), token.address(), receiver()),
            token,
            messenger: DomainMessenger::new(
                Address::from_label("l1-messenger"),
                MessageEncoder::new(L1, L2),
            ),
        }
    }

    fn withdrawal(sender: Address, amount: u128) -> (RelayContext, Message) {
        let call = BridgeCall::FinalizeWithdrawal {
            from: depositor(),
            to: depositor(),
            amount,
        };
        let message = MessageEncoder::new(L2, L1)
            .encode(sender, Address::from_label("gateway"), &call.encode(), 0)
            .unwrap();
        (RelayContext::new(&message), message)
    }

    #[test]
    fn test_deposit_locks_and_sends() {
        let mut f = fixture();
        let mut ctx = TxContext::detached(L1, depositor());
        let gateway = f.gateway.address();

        f.token.approve(&mut ctx, depositor(), gateway, 10).unwrap();
        let message = f
            .gateway
            .deposit_to(&mut ctx, &mut f.token, &mut f.messenger, depositor(), depositor(), 10)
            .unwrap();

        assert_eq!(f.token.balance_of(&depositor()), 9_999_990);
        assert_eq!(f.gateway.custody(&f.token), 10);
        assert_eq!(message.target, receiver());
        assert_eq!(message.sender, gateway);
        assert_eq!(
            BridgeCall::decode(&message.payload).unwrap(),
            BridgeCall::FinalizeDeposit {
                from: depositor(),
                to: depositor(),
                amount: 10
            }
        );
        assert_eq!(f.messenger.sent_messages().count(), 1);
    }

    #[test]
    fn test_deposit_requires_allowance() {
        let mut f = fixture();
        let mut ctx = TxContext::detached(L1, depositor());
        let err = f
            .gateway
            .deposit_to(&mut ctx, &mut f.token, &mut f.messenger, depositor(), depositor(), 10)
            .unwrap_err();
        assert!(matches!(err, BridgeError::InsufficientAllowance { .. }));
        assert_eq!(f.messenger.sent_messages().count(), 0);

        let err = f
            .gateway
            .deposit_to(&mut ctx, &mut f.token, &mut f.messenger, depositor(), depositor(), 0)
            .unwrap_err();
        assert!(matches!(err, BridgeError::InvalidAmount { .. }));
    }

    #[test]
    fn test_withdraw_confirm() {
        let mut f = fixture();
        let mut ctx = TxContext::detached(L1, depositor());
        let gateway = f.gateway.address();
        f.token.approve(&mut ctx, depositor(), gateway, 10).unwrap();
        f.gateway
            .deposit_to(&mut ctx, &mut f.token, &mut f.messenger, depositor(), depositor(), 10)
            .unwrap();

        let (relay, message) = withdrawal(receiver(), 4);
        f.gateway
            .withdraw_confirm(&mut ctx, &mut f.token, &relay, &message)
            .unwrap();
        assert_eq!(f.gateway.custody(&f.token), 6);
        assert_eq!(f.token.balance_of(&depositor()), 9_999_994);
        assert!(f.gateway.is_consumed(&relay.hash));

        let err = f
            .gateway
            .withdraw_confirm(&mut ctx, &mut f.token, &relay, &message)
            .unwrap_err();
        assert!(err.is_replay());
        assert_eq!(f.gateway.custody(&f.token), 6);
    }

    #[test]
    fn test_withdraw_confirm_rejects_unknown_sender() {
        let mut f = fixture();
        let mut ctx = TxContext::detached(L1, depositor());
        let (relay, message) = withdrawal(Address::from_label("impostor"), 4);
        let err = f
            .gateway
            .withdraw_confirm(&mut ctx, &mut f.token, &relay, &message)
            .unwrap_err();
        assert!(matches!(err, BridgeError::UnknownMessage { .. }));
    }
}
