//! Query interface of a host domain
//!
//! The watcher and relayer only see a domain through [`DomainClient`]; the
//! in-memory [`Domain`] and the JSON-RPC client both implement it.

use std::sync::Arc;

use async_trait::async_trait;

use super::Domain;
use crate::error::DomainError;
use crate::events::{Log, LogFilter, TxReceipt};
use crate::types::{BlockHash, DomainId, TxHash};

#[async_trait]
pub trait DomainClient: Send + Sync {
    async fn chain_id(&self) -> Result<DomainId, DomainError>;

    /// Current head block number
    async fn block_number(&self) -> Result<u64, DomainError>;

    /// Hash of a canonical block, `None` if `number` is above the head
    async fn block_hash(&self, number: u64) -> Result<Option<BlockHash>, DomainError>;

    /// Receipt of an included transaction, `None` if unknown or reorged out
    async fn transaction_receipt(&self, tx_hash: &TxHash)
        -> Result<Option<TxReceipt>, DomainError>;

    /// Logs in canonical order matching `filter`
    async fn logs(&self, filter: &LogFilter) -> Result<Vec<Log>, DomainError>;
}

impl<S: Clone + Send + 'static> Domain<S> {
    fn ensure_available(&self) -> Result<(), DomainError> {
        if self.is_available() {
            Ok(())
        } else {
            Err(DomainError::Unavailable(format!(
                "domain {} is not reachable",
                self.name()
            )))
        }
    }
}

#[async_trait]
impl<S: Clone + Send + Sync + 'static> DomainClient for Domain<S> {
    async fn chain_id(&self) -> Result<DomainId, DomainError> {
        self.ensure_available()?;
        Ok(self.id())
    }

    async fn block_number(&self) -> Result<u64, DomainError> {
        self.ensure_available()?;
        Ok(Domain::block_number(self))
    }

    async fn block_hash(&self, number: u64) -> Result<Option<BlockHash>, DomainError> {
        self.ensure_available()?;
        Ok(Domain::block_hash(self, number))
    }

    async fn transaction_receipt(
        &self,
        tx_hash: &TxHash,
    ) -> Result<Option<TxReceipt>, DomainError> {
        self.ensure_available()?;
        Ok(self.receipt(tx_hash))
    }

    async fn logs(&self, filter: &LogFilter) -> Result<Vec<Log>, DomainError> {
        self.ensure_available()?;
        Ok(Domain::logs(self, filter))
    }
}

#[async_trait]
impl<T: DomainClient + ?Sized> DomainClient for Arc<T> {
    async fn chain_id(&self) -> Result<DomainId, DomainError> {
        (**self).chain_id().await
    }

    async fn block_number(&self) -> Result<u64, DomainError> {
        (**self).block_number().await
    }

    async fn block_hash(&self, number: u64) -> Result<Option<BlockHash>, DomainError> {
        (**self).block_hash(number).await
    }

    async fn transaction_receipt(
        &self,
        tx_hash: &TxHash,
    ) -> Result<Option<TxReceipt>, DomainError> {
        (**self).transaction_receipt(tx_hash).await
    }

    async fn logs(&self, filter: &LogFilter) -> Result<Vec<Log>, DomainError> {
        (**self).logs(filter).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::TokenLedger;
    use crate::types::Address;

    #[tokio::test]
    async fn test_paused_domain_is_unavailable() {
        let domain = Domain::new(
            DomainId::from_u32(420),
            "l2",
            TokenLedger::new(Address::from_label("token"), "Token", "TKN"),
        );
        assert_eq!(
            DomainClient::block_number(&domain).await.unwrap(),
            0
        );

        domain.pause();
        let err = DomainClient::block_number(&domain).await.unwrap_err();
        assert!(err.is_transient());
        assert!(domain
            .transaction_receipt(&TxHash::ZERO)
            .await
            .unwrap_err()
            .is_transient());

        domain.resume();
        assert_eq!(domain.chain_id().await.unwrap(), DomainId::from_u32(420));

        // Through a shared handle
        let shared: Arc<dyn DomainClient> = Arc::new(domain);
        assert!(shared.transaction_receipt(&TxHash::ZERO).await.unwrap().is_none());
    }
}
