//! # Extended Remote Procedure Call
//!
//! Bitcoin Core RPC client used as the maintainer's header source. The
//! underlying client is blocking, so every call runs on Tokio's blocking pool
//! and is retried with exponential back-off.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use bitcoincore_rpc::{bitcoin::consensus, Auth, Client, RpcApi};
use header_chain::{common::constants::HEADER_SIZE, HeaderChainError, RelayHeader};
use secrecy::{ExposeSecret, SecretString};
use tokio_retry::{
    strategy::{jitter, ExponentialBackoff},
    RetryIf,
};

use crate::{errors::RelayError, maintainer::BitcoinHeaderSource, metrics::RELAY_METRICS};

/// Trait to determine if an error is retryable.
pub trait RetryableError {
    /// Returns true if the operation should be retried for this error.
    fn is_retryable(&self) -> bool;
}

impl RetryableError for bitcoincore_rpc::Error {
    fn is_retryable(&self) -> bool {
        match self {
            bitcoincore_rpc::Error::Io(_) => true,
            // Transport failures surface as JSON-RPC errors, node side errors
            // such as an unknown block height do not.
            bitcoincore_rpc::Error::JsonRpc(error) => {
                let error_str = error.to_string().to_lowercase();
                error_str.contains("timeout")
                    || error_str.contains("timed out")
                    || error_str.contains("connection")
                    || error_str.contains("transport")
                    || error_str.contains("broken pipe")
                    || error_str.contains("warming up")
            }
            _ => false,
        }
    }
}

#[derive(Clone)]
pub struct RpcHeaderSource {
    url: String,
    client: Arc<Client>,
    retry_count: usize,
}

impl std::fmt::Debug for RpcHeaderSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcHeaderSource")
            .field("url", &self.url)
            .field("retry_count", &self.retry_count)
            .finish()
    }
}

impl RpcHeaderSource {
    /// Connects to Bitcoin RPC and checks that the node answers.
    pub async fn connect(
        url: String,
        user: &SecretString,
        password: &SecretString,
        retry_count: usize,
    ) -> Result<Self, RelayError> {
        let auth = Auth::UserPass(
            user.expose_secret().to_string(),
            password.expose_secret().to_string(),
        );
        let client = Client::new(&url, auth)?;

        let source = RpcHeaderSource {
            url,
            client: Arc::new(client),
            retry_count,
        };

        tracing::debug!("Pinging Bitcoin RPC at {} to make sure it's alive", source.url);
        source.call("ping", |client| client.ping()).await?;
        tracing::info!("Connected to Bitcoin RPC at {}", source.url);

        Ok(source)
    }

    fn retry_strategy(&self) -> impl Iterator<Item = Duration> {
        // 100ms, 200ms, 400ms, ...
        ExponentialBackoff::from_millis(2)
            .factor(50)
            .max_delay(Duration::from_secs(30))
            .map(jitter)
            .take(self.retry_count)
    }

    /// Runs `request` on the blocking pool, retrying transient failures.
    async fn call<T, F>(&self, name: &'static str, request: F) -> Result<T, RelayError>
    where
        T: Send + 'static,
        F: Fn(&Client) -> Result<T, bitcoincore_rpc::Error> + Clone + Send + 'static,
    {
        let result = RetryIf::start(
            self.retry_strategy(),
            || {
                let client = Arc::clone(&self.client);
                let request = request.clone();
                async move {
                    tokio::task::spawn_blocking(move || request(&client))
                        .await
                        .unwrap_or_else(|e| {
                            Err(bitcoincore_rpc::Error::ReturnedError(format!(
                                "RPC task failed: {e}"
                            )))
                        })
                }
            },
            |error: &bitcoincore_rpc::Error| {
                let retry = error.is_retryable();
                if retry {
                    tracing::debug!("Bitcoin RPC {name} failed, will retry: {error}");
                }
                retry
            },
        )
        .await;

        result.map_err(|e| {
            tracing::error!("Bitcoin RPC {name} failed: {e}");
            RelayError::from(e)
        })
    }
}

#[async_trait]
impl BitcoinHeaderSource for RpcHeaderSource {
    async fn latest_block_height(&self) -> Result<u64, RelayError> {
        let height = self
            .call("getblockcount", |client| client.get_block_count())
            .await?;
        RELAY_METRICS.rpc_tip_height.set(height as f64);

        Ok(height)
    }

    async fn block_header(&self, height: u64) -> Result<RelayHeader, RelayError> {
        let header = self
            .call("getblockheader", move |client| {
                let hash = client.get_block_hash(height)?;
                client.get_block_header(&hash)
            })
            .await?;

        relay_header_from_rpc(&header)
    }
}

/// The RPC client depends on its own `bitcoin` release, so headers cross over
/// through their consensus encoding.
fn relay_header_from_rpc(
    header: &bitcoincore_rpc::bitcoin::block::Header,
) -> Result<RelayHeader, RelayError> {
    let bytes: [u8; HEADER_SIZE] = consensus::serialize(header)
        .try_into()
        .map_err(|bytes: Vec<u8>| HeaderChainError::MalformedInput(bytes.len()))?;

    Ok(RelayHeader::from_bytes(&bytes))
}
