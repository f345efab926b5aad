use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::common::At;

////////////////////////////////////// RPC Data ////////////////////////////////////////
// Raw `state_traceBlock` response format

/// Values the node attaches to a span or event. Storage events carry `key`,
/// `method` and `result`; anything else lands in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StringValues {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StringValues {
    /// Storage reads are tagged `Get`, writes `Put`.
    pub fn is_get(&self) -> bool {
        self.method.as_deref() == Some("Get")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceData {
    #[serde(default)]
    pub string_values: StringValues,
}

/// A span as reported by the node. Fields this crate does not read, such as
/// `wasm`, are kept in `extra` and passed through unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceSpan {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<u64>,
    #[serde(default)]
    pub data: TraceData,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TraceSpan {
    /// Parent span id. Span ids start at 1, so a `0` parent marks the root the
    /// same way a missing one does.
    pub fn parent(&self) -> Option<u64> {
        self.parent_id.filter(|id| *id != 0)
    }
}

/// A storage access or other point event. Nodes omit `name` on storage
/// events, and events outside any span carry no parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceEvent {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub parent_id: Option<u64>,
    #[serde(default)]
    pub data: TraceData,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TraceEvent {
    /// Span the event was emitted in, with `0` treated like a missing parent.
    pub fn parent(&self) -> Option<u64> {
        self.parent_id.filter(|id| *id != 0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockTrace {
    pub block_hash: String,
    pub storage_keys: String,
    pub tracing_targets: String,
    pub events: Vec<TraceEvent>,
    pub spans: Vec<TraceSpan>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceErrorResponse {
    pub error: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BlockTraceResponse {
    TraceError(TraceErrorResponse),
    BlockTrace(BlockTrace),
}

/////////////////////////////////// Transformed Data ///////////////////////////////////
// Normalized trace returned by `TraceService::traces`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlocksTrace {
    pub at: At,
    pub storage_keys: String,
    pub tracing_targets: String,
    pub events: Vec<TraceEvent>,
    pub spans: Vec<TraceSpan>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn string_values_keep_unknown_fields() {
        let data: TraceData = serde_json::from_value(json!({
            "stringValues": {
                "key": "3a65787472696e7369635f696e646578",
                "method": "Get",
                "result": "0100000000",
                "message": "storage read"
            }
        }))
        .unwrap();

        assert!(data.string_values.is_get());
        assert_eq!(data.string_values.result.as_deref(), Some("0100000000"));
        assert_eq!(data.string_values.extra["message"], json!("storage read"));

        let back = serde_json::to_value(&data).unwrap();
        assert_eq!(back["stringValues"]["message"], json!("storage read"));
    }

    #[test]
    fn zero_parent_is_root() {
        let span: TraceSpan = serde_json::from_value(json!({
            "id": 1,
            "name": "execute_block",
            "target": "frame_executive",
            "parentId": 0,
            "data": { "stringValues": {} }
        }))
        .unwrap();
        assert_eq!(span.parent(), None);

        let span: TraceSpan = serde_json::from_value(json!({
            "id": 2,
            "name": "apply_extrinsic",
            "target": "frame_executive",
            "parentId": 1
        }))
        .unwrap();
        assert_eq!(span.parent(), Some(1));
    }

    #[test]
    fn accepts_node_shaped_records() {
        let span: TraceSpan = serde_json::from_value(json!({
            "id": 3,
            "name": "transfer",
            "target": "pallet_balances",
            "parentId": 2,
            "wasm": true,
            "exited": "1234",
            "data": { "stringValues": {} }
        }))
        .unwrap();
        let back = serde_json::to_value(&span).unwrap();
        assert_eq!(back["wasm"], json!(true));
        assert_eq!(back["exited"], json!("1234"));
        assert_eq!(back["parentId"], json!(2));

        let event: TraceEvent = serde_json::from_value(json!({
            "target": "state",
            "parentId": null,
            "level": "TRACE",
            "data": { "stringValues": { "key": "3a636f6465", "method": "Get" } }
        }))
        .unwrap();
        assert_eq!(event.name, "");
        assert_eq!(event.parent(), None);
        assert_eq!(event.extra["level"], json!("TRACE"));

        let back = serde_json::to_value(&event).unwrap();
        assert!(back.get("name").is_none());
        assert_eq!(back["level"], json!("TRACE"));
    }
}
