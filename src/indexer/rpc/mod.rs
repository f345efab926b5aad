pub mod registry;
pub mod traces;

use alloy_rpc_client::{ClientBuilder, RpcClient};
use alloy_transport::TransportError;
use anyhow::{anyhow, Context, Result};
use opentelemetry::KeyValue;
use serde::Deserialize;
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use tracing::debug;
use url::Url;

use crate::metrics::Metrics;
use crate::utils::hex_to_u64;
use crate::utils::retry::{retry, RetryConfig};

/// Block header fields the trace service needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub number: u64,
}

/// Node access used by the trace service.
pub trait ChainClient {
    fn get_header(&self, hash: &str) -> impl Future<Output = Result<Header>> + Send;

    /// Header taken from the full block. Older runtimes only resolve their
    /// historical types through `chain_getBlock`.
    fn get_block(&self, hash: &str) -> impl Future<Output = Result<Header>> + Send;

    /// Raw `state_traceBlock` response, classified by the caller.
    fn trace_block(
        &self,
        hash: &str,
        targets: &str,
        storage_keys: &str,
    ) -> impl Future<Output = Result<Value>> + Send;
}

#[derive(Debug, Deserialize)]
struct RpcHeader {
    number: String,
}

#[derive(Debug, Deserialize)]
struct RpcBlock {
    header: RpcHeader,
}

#[derive(Debug, Deserialize)]
struct RpcSignedBlock {
    block: RpcBlock,
}

impl RpcHeader {
    fn into_header(self) -> Result<Header> {
        let number = hex_to_u64(self.number.clone())
            .ok_or_else(|| anyhow!("Invalid block number in header: {}", self.number))?;
        Ok(Header { number })
    }
}

/// JSON-RPC client for a Substrate node with tracing enabled.
pub struct RpcChainClient {
    client: RpcClient,
    retry_config: RetryConfig,
    metrics: Option<Arc<Metrics>>,
}

impl RpcChainClient {
    pub fn new(rpc_url: Url, retry_config: RetryConfig, metrics: Option<Arc<Metrics>>) -> Self {
        Self {
            client: ClientBuilder::default().http(rpc_url),
            retry_config,
            metrics,
        }
    }

    async fn request(&self, method: &'static str, params: Value) -> Result<Value> {
        let client = &self.client;
        let metrics = self.metrics.as_deref();
        let params = &params;

        retry(
            || async move {
                let start = std::time::Instant::now();

                if let Some(metrics) = metrics {
                    metrics.rpc_requests.add(
                        1,
                        &[
                            KeyValue::new("chain", metrics.chain_name.clone()),
                            KeyValue::new("method", method),
                        ],
                    );
                }

                let result: Result<Value, TransportError> =
                    client.request(method, params.clone()).await;

                // Record metrics if enabled
                if let Some(metrics) = metrics {
                    metrics.rpc_latency.record(
                        start.elapsed().as_secs_f64(),
                        &[
                            KeyValue::new("chain", metrics.chain_name.clone()),
                            KeyValue::new("method", method),
                        ],
                    );
                    if result.is_err() {
                        metrics.rpc_errors.add(
                            1,
                            &[
                                KeyValue::new("chain", metrics.chain_name.clone()),
                                KeyValue::new("method", method),
                            ],
                        );
                    }
                }

                result
            },
            &self.retry_config,
            method,
        )
        .await
    }
}

impl ChainClient for RpcChainClient {
    async fn get_header(&self, hash: &str) -> Result<Header> {
        let value = self.request("chain_getHeader", json!([hash])).await?;
        let header: RpcHeader =
            serde_json::from_value(value).context("Unexpected chain_getHeader response")?;
        header.into_header()
    }

    async fn get_block(&self, hash: &str) -> Result<Header> {
        let value = self.request("chain_getBlock", json!([hash])).await?;
        let signed: RpcSignedBlock =
            serde_json::from_value(value).context("Unexpected chain_getBlock response")?;
        signed.block.header.into_header()
    }

    async fn trace_block(&self, hash: &str, targets: &str, storage_keys: &str) -> Result<Value> {
        debug!("Tracing block {} (targets: {}, keys: {})", hash, targets, storage_keys);
        self.request("state_traceBlock", json!([hash, targets, storage_keys]))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_header_numbers() {
        let header: RpcHeader = serde_json::from_value(json!({
            "parentHash": "0x00",
            "number": "0x1b4",
            "stateRoot": "0x00"
        }))
        .unwrap();
        assert_eq!(header.into_header().unwrap(), Header { number: 436 });

        let signed: RpcSignedBlock = serde_json::from_value(json!({
            "block": { "header": { "number": "0x10" }, "extrinsics": [] },
            "justifications": null
        }))
        .unwrap();
        assert_eq!(signed.block.header.into_header().unwrap().number, 16);

        let bad = RpcHeader { number: "latest".to_string() };
        assert!(bad.into_header().is_err());
    }
}
