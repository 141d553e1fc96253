//! JSON-RPC domain client
//!
//! Talks to an Ethereum-style node over HTTP using `eth_chainId`,
//! `eth_blockNumber`, `eth_getBlockByNumber`, `eth_getTransactionReceipt` and
//! `eth_getLogs`.
//! Connection failures, timeouts, rate limiting and 5xx responses map to
//! [`DomainError::Unavailable`] so the watcher keeps polling through them.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

use super::DomainClient;
use crate::error::DomainError;
use crate::events::{Log, LogFilter, Topic, TxReceipt};
use crate::redact::redact_url;
use crate::types::{Address, BlockHash, DomainId, TxHash};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// JSON-RPC response wrapper
#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

/// JSON-RPC error object
#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

/// Transaction receipt as returned by the node
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: String,
    block_number: Option<String>,
    block_hash: Option<String>,
    from: String,
    status: Option<String>,
    #[serde(default)]
    logs: Vec<RpcLog>,
}

/// Block header fields we read
#[derive(Debug, Deserialize)]
struct RpcBlock {
    hash: Option<String>,
}

/// Log as returned by the node
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcLog {
    address: String,
    topics: Vec<String>,
    data: String,
    block_number: Option<String>,
    block_hash: Option<String>,
    transaction_hash: Option<String>,
    log_index: Option<String>,
    #[serde(default)]
    removed: bool,
}

pub struct RpcDomainClient {
    url: Url,
    client: Client,
}

impl RpcDomainClient {
    pub fn new(url: Url) -> Result<Self, DomainError> {
        Self::with_timeout(url, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(url: Url, timeout: Duration) -> Result<Self, DomainError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DomainError::Rejected(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { url, client })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<Option<T>, DomainError> {
        let body = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        });

        let response = self
            .client
            .post(self.url.clone())
            .json(&body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(map_status(status));
        }

        let response = response
            .json::<RpcResponse<T>>()
            .await
            .map_err(|e| DomainError::Malformed(format!("{}: {}", method, e)))?;

        if let Some(error) = response.error {
            return Err(DomainError::from_message(format!(
                "RPC error: {} - {}",
                error.code, error.message
            )));
        }

        Ok(response.result)
    }
}

impl std::fmt::Debug for RpcDomainClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcDomainClient")
            .field("url", &redact_url(&self.url))
            .finish()
    }
}

#[async_trait]
impl DomainClient for RpcDomainClient {
    async fn chain_id(&self) -> Result<DomainId, DomainError> {
        let hex = self
            .call::<String>("eth_chainId", json!([]))
            .await?
            .ok_or_else(|| DomainError::Malformed("no chain id returned".to_string()))?;
        let id = parse_quantity(&hex)?;
        u32::try_from(id)
            .map(DomainId::from_u32)
            .map_err(|_| DomainError::Malformed(format!("chain id {} does not fit in 4 bytes", id)))
    }

    async fn block_number(&self) -> Result<u64, DomainError> {
        let hex = self
            .call::<String>("eth_blockNumber", json!([]))
            .await?
            .ok_or_else(|| DomainError::Malformed("no block number returned".to_string()))?;
        parse_quantity(&hex)
    }

    async fn block_hash(&self, number: u64) -> Result<Option<BlockHash>, DomainError> {
        let block = self
            .call::<RpcBlock>(
                "eth_getBlockByNumber",
                json!([format!("0x{:x}", number), false]),
            )
            .await?;
        block
            .and_then(|b| b.hash)
            .map(|hash| BlockHash::from_hex(&hash).map_err(malformed))
            .transpose()
    }

    async fn transaction_receipt(
        &self,
        tx_hash: &TxHash,
    ) -> Result<Option<TxReceipt>, DomainError> {
        let receipt = self
            .call::<RpcReceipt>("eth_getTransactionReceipt", json!([tx_hash.to_hex()]))
            .await?;
        match receipt {
            // A receipt without a block is still pending
            Some(r) if r.block_number.is_some() => convert_receipt(r).map(Some),
            _ => Ok(None),
        }
    }

    async fn logs(&self, filter: &LogFilter) -> Result<Vec<Log>, DomainError> {
        let params = filter_params(filter);
        debug!(filter = %params, "eth_getLogs");
        let logs = self
            .call::<Vec<RpcLog>>("eth_getLogs", json!([params]))
            .await?
            .unwrap_or_default();
        logs.into_iter().map(convert_log).collect()
    }
}

fn map_transport_error(e: reqwest::Error) -> DomainError {
    if e.is_connect() || e.is_timeout() || e.is_request() {
        DomainError::Unavailable(e.to_string())
    } else {
        DomainError::from_message(e.to_string())
    }
}

fn map_status(status: StatusCode) -> DomainError {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        DomainError::Unavailable(format!("HTTP {}", status))
    } else {
        DomainError::Rejected(format!("HTTP {}", status))
    }
}

fn filter_params(filter: &LogFilter) -> Value {
    let mut params = serde_json::Map::new();
    if let Some(address) = &filter.address {
        params.insert("address".into(), json!(address.as_hex()));
    }
    let topic_hex = |t: &Topic| json!(format!("0x{}", hex::encode(t)));
    let mut topics = Vec::new();
    if filter.topic0.is_some() || filter.topic1.is_some() {
        topics.push(filter.topic0.as_ref().map_or(Value::Null, topic_hex));
    }
    if let Some(topic1) = &filter.topic1 {
        topics.push(topic_hex(topic1));
    }
    if !topics.is_empty() {
        params.insert("topics".into(), Value::Array(topics));
    }
    params.insert(
        "fromBlock".into(),
        json!(format!("0x{:x}", filter.from_block)),
    );
    params.insert(
        "toBlock".into(),
        filter
            .to_block
            .map_or(json!("latest"), |to| json!(format!("0x{:x}", to))),
    );
    Value::Object(params)
}

fn parse_quantity(hex: &str) -> Result<u64, DomainError> {
    u64::from_str_radix(hex.trim_start_matches("0x"), 16)
        .map_err(|e| DomainError::Malformed(format!("invalid quantity {:?}: {}", hex, e)))
}

fn parse_bytes(hex_str: &str) -> Result<Vec<u8>, DomainError> {
    hex::decode(hex_str.trim_start_matches("0x"))
        .map_err(|e| DomainError::Malformed(format!("invalid hex data: {}", e)))
}

fn parse_topic(hex_str: &str) -> Result<Topic, DomainError> {
    let bytes = parse_bytes(hex_str)?;
    Topic::try_from(bytes.as_slice())
        .map_err(|_| DomainError::Malformed(format!("topic is not 32 bytes: {}", hex_str)))
}

fn malformed(e: eyre::Report) -> DomainError {
    DomainError::Malformed(e.to_string())
}

fn convert_log(log: RpcLog) -> Result<Log, DomainError> {
    Ok(Log {
        address: Address::from_hex(&log.address).map_err(malformed)?,
        topics: log
            .topics
            .iter()
            .map(|t| parse_topic(t))
            .collect::<Result<_, _>>()?,
        data: parse_bytes(&log.data)?,
        block_number: log
            .block_number
            .as_deref()
            .map(parse_quantity)
            .transpose()?
            .unwrap_or_default(),
        block_hash: log
            .block_hash
            .as_deref()
            .map(BlockHash::from_hex)
            .transpose()
            .map_err(malformed)?
            .unwrap_or_default(),
        transaction_hash: log
            .transaction_hash
            .as_deref()
            .map(TxHash::from_hex)
            .transpose()
            .map_err(malformed)?
            .unwrap_or_default(),
        log_index: log
            .log_index
            .as_deref()
            .map(parse_quantity)
            .transpose()?
            .unwrap_or_default(),
        removed: log.removed,
    })
}

fn convert_receipt(receipt: RpcReceipt) -> Result<TxReceipt, DomainError> {
    Ok(TxReceipt {
        transaction_hash: TxHash::from_hex(&receipt.transaction_hash).map_err(malformed)?,
        block_number: parse_quantity(receipt.block_number.as_deref().unwrap_or("0x0"))?,
        block_hash: receipt
            .block_hash
            .as_deref()
            .map(BlockHash::from_hex)
            .transpose()
            .map_err(malformed)?
            .unwrap_or_default(),
        from: Address::from_hex(&receipt.from).map_err(malformed)?,
        // Pre-byzantium receipts have no status field
        status: receipt.status.as_deref() != Some("0x0"),
        logs: receipt
            .logs
            .into_iter()
            .map(convert_log)
            .collect::<Result<_, _>>()?,
    })
}
