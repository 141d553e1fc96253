//! Composition of the two bridge domains
//!
//! [`L1State`] holds the canonical token, the source gateway and the L1
//! messenger; [`L2State`] holds the destination receiver (the mirrored token)
//! and the L2 messenger. Both route admitted messages to their bridge
//! contract. The inherent methods on `Domain<L1State>` and `Domain<L2State>`
//! are the transaction entry points, each taking the acting account
//! explicitly.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::{Domain, TxContext};
use crate::error::{BridgeError, BridgeResult};
use crate::events::TxReceipt;
use crate::gateway::SourceGateway;
use crate::hash::contract_address;
use crate::ledger::TokenLedger;
use crate::message::{Message, MessageEncoder, DEFAULT_MAX_PAYLOAD_BYTES};
use crate::messenger::{DomainMessenger, MessengerHost, RelayContext};
use crate::receiver::DestinationReceiver;
use crate::types::{Address, DomainId};

/// Default L1 domain id (local development chain)
pub const L1_DOMAIN: DomainId = DomainId::from_u32(31337);
/// Default L2 domain id
pub const L2_DOMAIN: DomainId = DomainId::from_u32(420);

/// Default L1 messenger address
pub const DEFAULT_L1_MESSENGER: Address = Address([
    0x64, 0x18, 0xe5, 0xda, 0x52, 0xa3, 0xd7, 0x54, 0x3d, 0x39, 0x3a, 0xdd, 0x3f, 0xa9, 0x8b,
    0x07, 0x95, 0xd2, 0x77, 0x36,
]);
/// Default L2 messenger address (predeploy)
pub const DEFAULT_L2_MESSENGER: Address = Address([
    0x42, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x07,
]);

pub const DEFAULT_TOKEN_NAME: &str = "L1/L2 Deployed Optimistic ERC20";
pub const DEFAULT_TOKEN_SYMBOL: &str = "OPT";
pub const DEFAULT_INITIAL_SUPPLY: u128 = 10_000_000;

/// Addresses that tie the two halves of the bridge together
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayBinding {
    pub l1_token: Address,
    pub gateway: Address,
    pub receiver: Address,
    pub l1_messenger: Address,
    pub l2_messenger: Address,
}

/// Deployment parameters for a bridge pair
#[derive(Debug, Clone)]
pub struct BridgeDeployment {
    pub l1_domain: DomainId,
    pub l2_domain: DomainId,
    pub l1_messenger: Address,
    pub l2_messenger: Address,
    /// Deploys every contract and receives the initial supply
    pub deployer: Address,
    pub initial_supply: u128,
    pub token_name: String,
    pub token_symbol: String,
    pub max_payload_bytes: usize,
}

impl Default for BridgeDeployment {
    fn default() -> Self {
        Self {
            l1_domain: L1_DOMAIN,
            l2_domain: L2_DOMAIN,
            l1_messenger: DEFAULT_L1_MESSENGER,
            l2_messenger: DEFAULT_L2_MESSENGER,
            deployer: Address::from_label("deployer"),
            initial_supply: DEFAULT_INITIAL_SUPPLY,
            token_name: DEFAULT_TOKEN_NAME.to_string(),
            token_symbol: DEFAULT_TOKEN_SYMBOL.to_string(),
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
        }
    }
}

impl BridgeDeployment {
    pub fn binding(&self) -> GatewayBinding {
        GatewayBinding {
            l1_token: contract_address(&self.l1_domain, &self.deployer, 0),
            gateway: contract_address(&self.l1_domain, &self.deployer, 1),
            receiver: contract_address(&self.l2_domain, &self.deployer, 0),
            l1_messenger: self.l1_messenger,
            l2_messenger: self.l2_messenger,
        }
    }

    /// Genesis both domains and connect their channels
    ///
    /// The receiver is left unbound; call [`Domain::<L2State>::init`] with the
    /// gateway address before relaying deposits.
    pub fn deploy(&self) -> (Domain<L1State>, Domain<L2State>, GatewayBinding) {
        let binding = self.binding();

        let token = TokenLedger::new(binding.l1_token, &self.token_name, &self.token_symbol)
            .with_initial_supply(self.deployer, self.initial_supply);
        let l1 = Domain::new(
            self.l1_domain,
            "l1",
            L1State {
                gateway: SourceGateway::new(binding.gateway, binding.l1_token, binding.receiver),
                token,
                messenger: DomainMessenger::new(
                    self.l1_messenger,
                    MessageEncoder::new(self.l1_domain, self.l2_domain)
                        .with_max_payload_bytes(self.max_payload_bytes),
                ),
            },
        );

        let mirror = TokenLedger::new(binding.receiver, &self.token_name, &self.token_symbol);
        let l2 = Domain::new(
            self.l2_domain,
            "l2",
            L2State {
                receiver: DestinationReceiver::new(mirror),
                messenger: DomainMessenger::new(
                    self.l2_messenger,
                    MessageEncoder::new(self.l2_domain, self.l1_domain)
                        .with_max_payload_bytes(self.max_payload_bytes),
                ),
            },
        );

        l1.connect_inbound(&l2);
        l2.connect_inbound(&l1);

        info!(
            gateway = %binding.gateway,
            receiver = %binding.receiver,
            l1_messenger = %binding.l1_messenger,
            l2_messenger = %binding.l2_messenger,
            "Bridge deployed"
        );
        (l1, l2, binding)
    }
}

// ============================================================================
// L1
// ============================================================================

#[derive(Debug, Clone)]
pub struct L1State {
    token: TokenLedger,
    gateway: SourceGateway,
    messenger: DomainMessenger,
}

impl L1State {
    pub fn token(&self) -> &TokenLedger {
        &self.token
    }

    pub fn gateway(&self) -> &SourceGateway {
        &self.gateway
    }
}

impl MessengerHost for L1State {
    fn messenger(&self) -> &DomainMessenger {
        &self.messenger
    }

    fn messenger_mut(&mut self) -> &mut DomainMessenger {
        &mut self.messenger
    }

    fn dispatch(
        &mut self,
        ctx: &mut TxContext<'_>,
        relay: &RelayContext,
        message: &Message,
    ) -> BridgeResult<()> {
        if message.target == self.gateway.address() {
            self.gateway
                .withdraw_confirm(ctx, &mut self.token, relay, message)
        } else {
            Err(BridgeError::UnknownTarget {
                hash: relay.hash,
                target: message.target,
            })
        }
    }
}

impl Domain<L1State> {
    pub fn approve(&self, owner: Address, spender: Address, amount: u128) -> BridgeResult<TxReceipt> {
        self.execute(owner, |s, ctx| s.token.approve(ctx, owner, spender, amount))
            .map(|(receipt, ())| receipt)
    }

    pub fn transfer(&self, from: Address, to: Address, amount: u128) -> BridgeResult<TxReceipt> {
        self.execute(from, |s, ctx| s.token.transfer(ctx, from, to, amount))
            .map(|(receipt, ())| receipt)
    }

    /// Deposit `amount` to the depositor's own L2 account
    pub fn deposit(&self, from: Address, amount: u128) -> BridgeResult<TxReceipt> {
        self.deposit_to(from, from, amount)
    }

    pub fn deposit_to(&self, from: Address, to: Address, amount: u128) -> BridgeResult<TxReceipt> {
        self.execute(from, |s, ctx| {
            let L1State {
                token,
                gateway,
                messenger,
            } = s;
            gateway.deposit_to(ctx, token, messenger, from, to, amount)
        })
        .map(|(receipt, _)| receipt)
    }

    pub fn balance_of(&self, account: &Address) -> u128 {
        self.view(|s| s.token.balance_of(account))
    }

    /// Tokens locked in the gateway
    pub fn custody_balance(&self) -> u128 {
        self.view(|s| s.gateway.custody(&s.token))
    }

    pub fn gateway_address(&self) -> Address {
        self.view(|s| s.gateway.address())
    }

    pub fn finalize_deposit_l2_gas(&self) -> u32 {
        self.view(|s| s.gateway.finalize_deposit_l2_gas())
    }
}

// ============================================================================
// L2
// ============================================================================

#[derive(Debug, Clone)]
pub struct L2State {
    receiver: DestinationReceiver,
    messenger: DomainMessenger,
}

impl L2State {
    pub fn receiver(&self) -> &DestinationReceiver {
        &self.receiver
    }
}

impl MessengerHost for L2State {
    fn messenger(&self) -> &DomainMessenger {
        &self.messenger
    }

    fn messenger_mut(&mut self) -> &mut DomainMessenger {
        &mut self.messenger
    }

    fn dispatch(
        &mut self,
        ctx: &mut TxContext<'_>,
        relay: &RelayContext,
        message: &Message,
    ) -> BridgeResult<()> {
        if message.target == self.receiver.address() {
            self.receiver.credit_from_message(ctx, relay, message)
        } else {
            Err(BridgeError::UnknownTarget {
                hash: relay.hash,
                target: message.target,
            })
        }
    }
}

impl Domain<L2State> {
    /// Bind the receiver to the L1 gateway
    pub fn init(&self, from: Address, gateway: Address) -> BridgeResult<TxReceipt> {
        self.execute(from, |s, ctx| s.receiver.init(ctx, gateway))
            .map(|(receipt, ())| receipt)
    }

    pub fn approve(&self, owner: Address, spender: Address, amount: u128) -> BridgeResult<TxReceipt> {
        self.execute(owner, |s, ctx| {
            s.receiver.ledger_mut().approve(ctx, owner, spender, amount)
        })
        .map(|(receipt, ())| receipt)
    }

    pub fn transfer(&self, from: Address, to: Address, amount: u128) -> BridgeResult<TxReceipt> {
        self.execute(from, |s, ctx| {
            s.receiver.ledger_mut().transfer(ctx, from, to, amount)
        })
        .map(|(receipt, ())| receipt)
    }

    /// Withdraw `amount` to the withdrawer's own L1 account
    pub fn withdraw(&self, from: Address, amount: u128) -> BridgeResult<TxReceipt> {
        self.withdraw_to(from, from, amount)
    }

    pub fn withdraw_to(&self, from: Address, to: Address, amount: u128) -> BridgeResult<TxReceipt> {
        self.execute(from, |s, ctx| {
            let L2State {
                receiver,
                messenger,
            } = s;
            receiver.withdraw_to(ctx, messenger, from, to, amount)
        })
        .map(|(receipt, _)| receipt)
    }

    pub fn balance_of(&self, account: &Address) -> u128 {
        self.view(|s| s.receiver.ledger().balance_of(account))
    }

    pub fn total_supply(&self) -> u128 {
        self.view(|s| s.receiver.ledger().total_supply())
    }

    pub fn is_initialized(&self) -> bool {
        self.view(|s| s.receiver.is_initialized())
    }

    pub fn receiver_address(&self) -> Address {
        self.view(|s| s.receiver.address())
    }
}
