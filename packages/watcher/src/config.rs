use eyre::{eyre, Result, WrapErr};
use std::env;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use url::Url;

use xdomain_rs::redact::redact_url;
use xdomain_rs::retry::RetryConfig;
use xdomain_rs::{Address, WatcherConfig};

/// Main configuration for the watcher
#[derive(Debug, Clone)]
pub struct Config {
    pub l1: EndpointConfig,
    pub l2: EndpointConfig,
    pub poll_interval_ms: u64,
    pub timeout_ms: u64,
    pub confirmations: u64,
    pub found_cache_size: usize,
    pub found_cache_ttl_secs: u64,
}

/// One domain's RPC endpoint and messenger
#[derive(Clone)]
pub struct EndpointConfig {
    pub rpc_url: Url,
    pub messenger: Address,
}

/// Custom Debug that redacts the RPC URL (may embed an API key).
impl fmt::Debug for EndpointConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointConfig")
            .field("rpc_url", &redact_url(&self.rpc_url))
            .field("messenger", &self.messenger)
            .finish()
    }
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_timeout() -> u64 {
    120_000
}

fn default_confirmations() -> u64 {
    1
}

fn default_found_cache_size() -> usize {
    10_000
}

fn default_found_cache_ttl() -> u64 {
    86_400
}

impl Config {
    /// Load a .env file if present, then read from environment
    pub fn load_from_file(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            dotenvy::from_filename(path)
                .wrap_err_with(|| format!("Failed to load .env file from {}", path))?;
        }
        Self::load_from_env()
    }

    /// Load configuration from environment variables
    pub fn load_from_env() -> Result<Self> {
        let config = Config {
            l1: endpoint_from_env("L1_RPC_URL", "L1_MESSENGER_ADDRESS")?,
            l2: endpoint_from_env("L2_RPC_URL", "L2_MESSENGER_ADDRESS")?,
            poll_interval_ms: optional("POLL_INTERVAL_MS")?.unwrap_or(default_poll_interval()),
            timeout_ms: optional("TIMEOUT_MS")?.unwrap_or(default_timeout()),
            confirmations: optional("CONFIRMATIONS")?.unwrap_or(default_confirmations()),
            found_cache_size: optional("FOUND_CACHE_SIZE")?
                .unwrap_or(default_found_cache_size()),
            found_cache_ttl_secs: optional("FOUND_CACHE_TTL_SECS")?
                .unwrap_or(default_found_cache_ttl()),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(eyre!("POLL_INTERVAL_MS must be greater than zero"));
        }
        if self.timeout_ms == 0 {
            return Err(eyre!("TIMEOUT_MS must be greater than zero"));
        }
        if self.confirmations == 0 {
            return Err(eyre!("CONFIRMATIONS must be at least 1"));
        }
        if self.found_cache_size == 0 {
            return Err(eyre!("FOUND_CACHE_SIZE must be greater than zero"));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Library configuration for the watcher
    pub fn to_watcher_config(&self) -> WatcherConfig {
        WatcherConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            timeout: self.timeout(),
            confirmations: self.confirmations,
            retry: RetryConfig::default(),
            found_cache_size: self.found_cache_size,
            found_cache_ttl: Duration::from_secs(self.found_cache_ttl_secs),
            ..Default::default()
        }
    }
}

fn required(name: &str) -> Result<String> {
    env::var(name).map_err(|_| eyre!("{} environment variable is required", name))
}

fn optional<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| eyre!("{} is not valid: {}", name, e)),
        Err(_) => Ok(None),
    }
}

fn endpoint_from_env(url_var: &str, messenger_var: &str) -> Result<EndpointConfig> {
    let raw_url = required(url_var)?;
    let rpc_url = Url::parse(raw_url.trim())
        .wrap_err_with(|| format!("{} must be a valid URL", url_var))?;
    if !matches!(rpc_url.scheme(), "http" | "https") {
        return Err(eyre!("{} must use http or https", url_var));
    }

    let messenger = Address::from_hex(required(messenger_var)?.trim())
        .wrap_err_with(|| format!("{} must be a 20-byte hex address", messenger_var))?;

    Ok(EndpointConfig { rpc_url, messenger })
}
