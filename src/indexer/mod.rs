pub mod rpc;
pub mod transformations;

use anyhow::{Context, Result};
use opentelemetry::KeyValue;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{error, info};

use crate::indexer::rpc::registry::TypeRegistry;
use crate::indexer::rpc::traces::TraceResponseParser;
use crate::indexer::rpc::ChainClient;
use crate::indexer::transformations::Trace;
use crate::metrics::Metrics;
use crate::models::common::At;
use crate::models::datasets::operations::BlocksTraceOperations;
use crate::models::datasets::traces::{BlockTrace, BlocksTrace};

pub const DEFAULT_TARGETS: &str = "pallet,frame,state";

/// Storage key prefixes passed to `state_traceBlock` to filter events: the
/// `:extrinsic_index` well-known key and the `system::account` map prefix.
/// Operations only need storage reads and writes of these two items.
pub const DEFAULT_KEYS: &str = "3a65787472696e7369635f696e646578,26aa394eea5630e07c48ae0c9558cef7b99d880ec681799c0cf30e8886371da9";

/// Serves block traces and the balance operations derived from them.
pub struct TraceService<C, R> {
    client: C,
    registry: R,
    metrics: Option<Arc<Metrics>>,
}

impl<C, R> TraceService<C, R>
where
    C: ChainClient,
    R: TypeRegistry,
{
    pub fn new(client: C, registry: R, metrics: Option<Arc<Metrics>>) -> Self {
        Self {
            client,
            registry,
            metrics,
        }
    }

    async fn fetch_trace(&self, hash: &str) -> Result<BlockTrace> {
        let response = self
            .client
            .trace_block(hash, DEFAULT_TARGETS, DEFAULT_KEYS)
            .await
            .with_context(|| format!("Failed to trace block {hash}"))?;

        Ok(response.parse_trace_response()?.into_block_trace()?)
    }

    /// Storage traces of a block, spans sorted by id.
    pub async fn traces(&self, hash: &str) -> Result<BlocksTrace> {
        let (header, trace) = tokio::try_join!(self.client.get_header(hash), self.fetch_trace(hash))?;

        let mut spans = trace.spans;
        spans.sort_by_key(|span| span.id);

        Ok(BlocksTrace {
            at: At {
                hash: hash.to_string(),
                height: header.number.to_string(),
            },
            storage_keys: trace.storage_keys,
            tracing_targets: trace.tracing_targets,
            events: trace.events,
            spans,
        })
    }

    /// Balance changing operations of a block, and optionally the action
    /// groups they were derived from.
    pub async fn operations(&self, hash: &str, include_actions: bool) -> Result<BlocksTraceOperations> {
        let (header, trace) = tokio::try_join!(self.client.get_block(hash), self.fetch_trace(hash))?;

        // The pipeline is synchronous from here on
        let start = Instant::now();
        let derived = Trace::new(&trace, &self.registry)
            .and_then(|trace| trace.actions_and_ops())
            .inspect_err(|e| {
                error!("Failed to derive operations for block {}: {}", hash, e);
                if let Some(metrics) = &self.metrics {
                    metrics
                        .trace_failures
                        .add(1, &[KeyValue::new("chain", metrics.chain_name.clone())]);
                }
            })?;

        info!(
            "Derived {} operations for block {} (#{}) in {:?}",
            derived.operations.len(),
            hash,
            header.number,
            start.elapsed()
        );

        if let Some(metrics) = &self.metrics {
            let labels = [KeyValue::new("chain", metrics.chain_name.clone())];
            metrics.blocks_processed.add(1, &labels);
            metrics.latest_processed_block.record(header.number, &labels);
            metrics
                .latest_block_processing_time
                .record(start.elapsed().as_secs_f64(), &labels);
            metrics
                .action_groups
                .add(derived.actions.len() as u64, &labels);
            metrics
                .operations
                .add(derived.operations.len() as u64, &labels);
        }

        Ok(BlocksTraceOperations {
            at: At {
                hash: hash.to_string(),
                height: header.number.to_string(),
            },
            operations: derived.operations,
            actions: include_actions.then_some(derived.actions),
        })
    }
}
