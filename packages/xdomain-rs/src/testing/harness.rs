//! Bridge Scenario Harness
//!
//! Deploys the L1/L2 pair with the canonical token (10,000,000 supply held by
//! the deployer), the gateway, the bound receiver and both messengers, and
//! offers relaying either by hand or through background relayer tasks.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::info;

use crate::bridge::{BridgeDeployment, GatewayBinding, L1State, L2State};
use crate::domain::Domain;
use crate::error::BridgeResult;
use crate::events::{parse_sent_message_log, TxReceipt};
use crate::message::Message;
use crate::messenger::MessengerHost;
use crate::relayer::Relayer;
use crate::types::Address;
use crate::watcher::{DomainEndpoint, Watcher, WatcherConfig};

/// Named accounts of the scenario
#[derive(Debug, Clone, Copy)]
pub struct Accounts {
    /// Deploys the contracts and holds the initial supply
    pub deployer: Address,
    /// Second user with no initial balance
    pub recipient: Address,
    /// Submits relay transactions
    pub relayer: Address,
}

impl Default for Accounts {
    fn default() -> Self {
        Self {
            deployer: Address::from_label("deployer"),
            recipient: Address::from_label("recipient"),
            relayer: Address::from_label("relayer"),
        }
    }
}

pub struct BridgeHarness {
    pub accounts: Accounts,
    pub l1: Arc<Domain<L1State>>,
    pub l2: Arc<Domain<L2State>>,
    pub binding: GatewayBinding,
}

impl BridgeHarness {
    /// Deploy the default scenario with the receiver bound
    pub fn deploy() -> BridgeResult<Self> {
        let harness = Self::deploy_unbound();
        harness
            .l2
            .init(harness.accounts.deployer, harness.binding.gateway)?;
        Ok(harness)
    }

    /// Deploy the default scenario without binding the receiver
    pub fn deploy_unbound() -> Self {
        let accounts = Accounts::default();
        let deployment = BridgeDeployment {
            deployer: accounts.deployer,
            ..Default::default()
        };
        let (l1, l2, binding) = deployment.deploy();
        Self {
            accounts,
            l1: Arc::new(l1),
            l2: Arc::new(l2),
            binding,
        }
    }

    pub fn l1_endpoint(&self) -> DomainEndpoint {
        DomainEndpoint::new(self.l1.clone(), self.binding.l1_messenger)
    }

    pub fn l2_endpoint(&self) -> DomainEndpoint {
        DomainEndpoint::new(self.l2.clone(), self.binding.l2_messenger)
    }

    /// Watcher for deposits (L1 source, L2 destination)
    pub fn watcher(&self, config: WatcherConfig) -> Watcher {
        Watcher::new(self.l1_endpoint(), self.l2_endpoint(), config)
    }

    /// Approve the gateway and deposit `amount` from the deployer
    pub fn approve_and_deposit(&self, amount: u128) -> BridgeResult<TxReceipt> {
        let from = self.accounts.deployer;
        self.l1.approve(from, self.binding.gateway, amount)?;
        self.l1.deposit(from, amount)
    }

    /// Relay every message of an L1 transaction to L2
    pub fn relay_to_l2(&self, receipt: &TxReceipt) -> BridgeResult<Vec<TxReceipt>> {
        relay_all(&self.l2, self.accounts.relayer, receipt)
    }

    /// Relay every message of an L2 transaction to L1
    pub fn relay_to_l1(&self, receipt: &TxReceipt) -> BridgeResult<Vec<TxReceipt>> {
        relay_all(&self.l1, self.accounts.relayer, receipt)
    }

    /// Start a relayer task in each direction
    pub fn spawn_relayers(&self, poll_interval: Duration) -> RelayerHandle {
        let mut tasks = JoinSet::new();
        let mut shutdown = Vec::with_capacity(2);

        let (tx, rx) = mpsc::channel(1);
        let to_l2 = Relayer::new(
            self.l1_endpoint(),
            self.l2.clone(),
            self.accounts.relayer,
            poll_interval,
        );
        tasks.spawn(to_l2.run(rx));
        shutdown.push(tx);

        let (tx, rx) = mpsc::channel(1);
        let to_l1 = Relayer::new(
            self.l2_endpoint(),
            self.l1.clone(),
            self.accounts.relayer,
            poll_interval,
        );
        tasks.spawn(to_l1.run(rx));
        shutdown.push(tx);

        info!(poll_interval_ms = poll_interval.as_millis() as u64, "Relayers spawned");
        RelayerHandle { shutdown, tasks }
    }
}

/// Messages emitted by a transaction, in log order
pub fn sent_messages(receipt: &TxReceipt) -> Vec<Message> {
    receipt
        .logs
        .iter()
        .filter_map(parse_sent_message_log)
        .map(|event| event.message)
        .collect()
}

fn relay_all<S: MessengerHost>(
    destination: &Domain<S>,
    relayer: Address,
    receipt: &TxReceipt,
) -> BridgeResult<Vec<TxReceipt>> {
    sent_messages(receipt)
        .iter()
        .map(|message| destination.relay_message(relayer, message))
        .collect()
}

/// Running relayer tasks
pub struct RelayerHandle {
    shutdown: Vec<mpsc::Sender<()>>,
    tasks: JoinSet<()>,
}

impl RelayerHandle {
    /// Signal every relayer and wait for it to stop
    pub async fn stop(mut self) {
        for tx in &self.shutdown {
            let _ = tx.send(()).await;
        }
        while self.tasks.join_next().await.is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deploy_binds_receiver() {
        let harness = BridgeHarness::deploy().unwrap();
        assert!(harness.l2.is_initialized());
        assert_eq!(harness.l1.balance_of(&harness.accounts.deployer), 10_000_000);
        assert_eq!(harness.l1.gateway_address(), harness.binding.gateway);
    }

    #[test]
    fn test_manual_relay() {
        let harness = BridgeHarness::deploy().unwrap();
        let receipt = harness.approve_and_deposit(10).unwrap();
        assert_eq!(sent_messages(&receipt).len(), 1);

        let relays = harness.relay_to_l2(&receipt).unwrap();
        assert_eq!(relays.len(), 1);
        assert_eq!(harness.l2.balance_of(&harness.accounts.deployer), 10);
    }
}
