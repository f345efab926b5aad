use alloy_primitives::{I256, U256};
use serde::Serialize;

use crate::models::common::At;
use crate::models::datasets::actions::{ActionEvent, ActionGroup, PhaseId, SpanId};
use crate::utils::serialize_decimal;

////////////////////////////////////// Decoded Data ////////////////////////////////////
// Balance fields of `system::account` entries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountData {
    #[serde(serialize_with = "serialize_decimal")]
    pub free: U256,
    #[serde(serialize_with = "serialize_decimal")]
    pub reserved: U256,
    #[serde(serialize_with = "serialize_decimal")]
    pub misc_frozen: U256,
    #[serde(serialize_with = "serialize_decimal")]
    pub fee_frozen: U256,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountEvent {
    #[serde(flatten)]
    pub event: ActionEvent,
    pub account_info: AccountData,
    pub address: String,
}

/////////////////////////////////// Transformed Data ///////////////////////////////////
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CurrencyId {
    pub symbol: String,
}

/// Storage location of a balance field, e.g. `system/Account/data/free`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageResourceId {
    pub pallet: String,
    pub item: String,
    pub field1: String,
    pub field2: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Amount {
    #[serde(serialize_with = "serialize_decimal")]
    pub value: I256,
    pub currency: CurrencyId,
}

/// A non-zero change of one balance field of one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub phase: PhaseId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<SpanId>,
    pub primary_span_id: SpanId,
    /// Index of the trace event that produced the new balance.
    pub event_index: usize,
    pub address: String,
    pub storage: StorageResourceId,
    pub amount: Amount,
}

#[derive(Debug, Clone, Serialize)]
pub struct BlocksTraceOperations {
    pub at: At,
    pub operations: Vec<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actions: Option<Vec<ActionGroup>>,
}
