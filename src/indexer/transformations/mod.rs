pub mod actions;
pub mod events;
pub mod operations;
pub mod spans;

use tracing::info;

use crate::indexer::rpc::registry::TypeRegistry;
use crate::indexer::transformations::actions::assemble_action_groups;
use crate::indexer::transformations::events::{classify_events, KeyNames};
use crate::indexer::transformations::operations::{derive_operations, AccountEventCorrelator};
use crate::indexer::transformations::spans::SpanTreeBuilder;
use crate::models::common::ActionsAndOperations;
use crate::models::datasets::actions::ActionEvent;
use crate::models::datasets::operations::CurrencyId;
use crate::models::datasets::traces::BlockTrace;
use crate::models::errors::TraceError;

/// Derives action groups and balance operations from one `state_traceBlock`
/// result.
///
/// Spans arrive unsorted and reference their parents by id. Events arrive in
/// execution order and reference the span they were emitted in.
pub struct Trace<'a, R: TypeRegistry + ?Sized> {
    block_trace: &'a BlockTrace,
    registry: &'a R,
    key_names: KeyNames,
}

impl<'a, R: TypeRegistry + ?Sized> Trace<'a, R> {
    pub fn new(block_trace: &'a BlockTrace, registry: &'a R) -> Result<Self, TraceError> {
        if block_trace.spans.is_empty() {
            return Err(TraceError::structural(
                "No spans found. This runtime is likely not supported with tracing.",
            ));
        }

        Ok(Self {
            block_trace,
            registry,
            key_names: KeyNames::new(registry),
        })
    }

    pub fn actions_and_ops(&self) -> Result<ActionsAndOperations, TraceError> {
        let tree = self.block_trace.spans.build_span_tree()?;
        let classified = classify_events(
            &self.block_trace.events,
            &tree,
            &self.key_names,
            self.registry,
        )?;

        let actions = assemble_action_groups(&tree, &classified)?;

        // Action groups are in span id order and their events in trace order,
        // so the concatenation is the whole block in trace order.
        let events: Vec<ActionEvent> = actions
            .iter()
            .flat_map(|group| group.events.iter().cloned())
            .collect();
        let account_events = events.account_events_by_address(self.registry)?;
        let operations = derive_operations(&account_events, &self.currency()?);

        info!(
            "Block {}: {} spans, {} events, {} action groups, {} accounts touched, {} operations",
            self.block_trace.block_hash,
            tree.spans().len(),
            self.block_trace.events.len(),
            actions.len(),
            account_events.len(),
            operations.len()
        );

        Ok(ActionsAndOperations {
            actions,
            operations,
        })
    }

    // Every balance is assumed to be in the chain's first token
    fn currency(&self) -> Result<CurrencyId, TraceError> {
        self.registry
            .token_symbols()
            .first()
            .map(|symbol| CurrencyId {
                symbol: symbol.clone(),
            })
            .ok_or_else(|| TraceError::decode("token symbol", "registry lists no chain tokens"))
    }
}
