use thiserror::Error;

/// Every way deriving structure from a block trace can fail. All of them are
/// fatal for the block being processed; nothing here is retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TraceError {
    #[error("Upstream trace error: {message}")]
    UpstreamTraceError { message: String },

    #[error("Unexpected response to state_traceBlock RPC: {reason}")]
    UnexpectedResponseShape { reason: String },

    #[error("{reason}")]
    StructuralInvariantViolation {
        reason: String,
        span_id: Option<u64>,
        event_index: Option<usize>,
    },

    #[error("Failed to decode {what}: {reason}")]
    DecodeError {
        what: String,
        reason: String,
        event_index: Option<usize>,
        address: Option<String>,
    },
}

impl TraceError {
    pub fn structural(reason: impl Into<String>) -> Self {
        Self::StructuralInvariantViolation {
            reason: reason.into(),
            span_id: None,
            event_index: None,
        }
    }

    pub fn decode(what: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DecodeError {
            what: what.into(),
            reason: reason.into(),
            event_index: None,
            address: None,
        }
    }

    pub fn unexpected_shape(reason: impl Into<String>) -> Self {
        Self::UnexpectedResponseShape {
            reason: reason.into(),
        }
    }

    /// Attach the id of the span the failure was observed at.
    pub fn at_span(mut self, id: u64) -> Self {
        if let Self::StructuralInvariantViolation { span_id, .. } = &mut self {
            *span_id = Some(id);
        }
        self
    }

    /// Attach the index of the trace event the failure was observed at.
    pub fn at_event(mut self, index: usize) -> Self {
        match &mut self {
            Self::StructuralInvariantViolation { event_index, .. }
            | Self::DecodeError { event_index, .. } => *event_index = Some(index),
            _ => {}
        }
        self
    }

    pub fn for_address(mut self, addr: impl Into<String>) -> Self {
        if let Self::DecodeError { address, .. } = &mut self {
            *address = Some(addr.into());
        }
        self
    }
}
