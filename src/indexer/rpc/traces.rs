use serde_json::Value;

use crate::models::datasets::traces::{BlockTrace, BlockTraceResponse, TraceErrorResponse};
use crate::models::errors::TraceError;

pub trait TraceResponseParser {
    fn parse_trace_response(self) -> Result<BlockTraceResponse, TraceError>;
}

impl TraceResponseParser for Value {
    fn parse_trace_response(self) -> Result<BlockTraceResponse, TraceError> {
        if let Some(error) = self
            .get("traceError")
            .and_then(|e| e.get("error"))
            .and_then(Value::as_str)
        {
            return Ok(BlockTraceResponse::TraceError(TraceErrorResponse {
                error: error.to_string(),
            }));
        }

        let Some(block_trace) = self.get("blockTrace") else {
            return Err(TraceError::unexpected_shape(
                "neither `traceError` nor `blockTrace` present",
            ));
        };

        if !is_block_trace(block_trace) {
            return Err(TraceError::unexpected_shape(
                "`blockTrace` is missing string fields or event/span arrays",
            ));
        }

        serde_json::from_value::<BlockTrace>(block_trace.clone())
            .map(BlockTraceResponse::BlockTrace)
            .map_err(|e| TraceError::unexpected_shape(format!("malformed `blockTrace`: {e}")))
    }
}

fn is_block_trace(value: &Value) -> bool {
    ["blockHash", "tracingTargets", "storageKeys"]
        .iter()
        .all(|field| value.get(field).is_some_and(Value::is_string))
        && ["events", "spans"]
            .iter()
            .all(|field| value.get(field).is_some_and(Value::is_array))
}

impl BlockTraceResponse {
    /// Turn an upstream trace error into a fatal error, pass a trace through.
    pub fn into_block_trace(self) -> Result<BlockTrace, TraceError> {
        match self {
            Self::BlockTrace(trace) => Ok(trace),
            Self::TraceError(TraceErrorResponse { error }) => {
                Err(TraceError::UpstreamTraceError { message: error })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classifies_trace_errors() {
        let response = json!({ "traceError": { "error": "tracing is disabled" } })
            .parse_trace_response()
            .unwrap();
        assert_eq!(
            response.into_block_trace(),
            Err(TraceError::UpstreamTraceError {
                message: "tracing is disabled".to_string()
            })
        );
    }

    #[test]
    fn accepts_well_formed_block_trace() {
        let trace = json!({
            "blockTrace": {
                "blockHash": "0xabc",
                "storageKeys": "",
                "tracingTargets": "pallet,frame,state",
                "events": [],
                "spans": [{ "id": 1, "name": "execute_block", "target": "frame_executive" }]
            }
        })
        .parse_trace_response()
        .unwrap()
        .into_block_trace()
        .unwrap();

        assert_eq!(trace.block_hash, "0xabc");
        assert_eq!(trace.spans.len(), 1);
    }

    #[test]
    fn rejects_other_shapes() {
        for value in [
            json!({ "result": 1 }),
            json!({ "blockTrace": { "blockHash": 1, "storageKeys": "", "tracingTargets": "", "events": [], "spans": [] } }),
            json!({ "blockTrace": { "blockHash": "0x", "storageKeys": "", "tracingTargets": "", "events": {}, "spans": [] } }),
            json!({ "traceError": { "error": 5 } }),
        ] {
            assert!(matches!(
                value.parse_trace_response(),
                Err(TraceError::UnexpectedResponseShape { .. })
            ));
        }
    }
}
