use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::fmt;

use crate::models::datasets::traces::{TraceEvent, TraceSpan};

/// What a storage key refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyInfo {
    Pallet { module: String, item: String },
    Special { special: String },
    Unresolved,
}

impl KeyInfo {
    pub fn is_pallet_item(&self, module: &str, item: &str) -> bool {
        matches!(self, Self::Pallet { module: m, item: i } if m == module && i == item)
    }

    pub fn is_special(&self, name: &str) -> bool {
        matches!(self, Self::Special { special } if special == name)
    }
}

impl Serialize for KeyInfo {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Pallet { module, item } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("module", module)?;
                map.serialize_entry("item", item)?;
                map.end()
            }
            Self::Special { special } => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("special", special)?;
                map.end()
            }
            Self::Unresolved => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("error", "key not found")?;
                map.end()
            }
        }
    }
}

/// Identity snapshot of a span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpanId {
    pub name: String,
    pub target: String,
    pub id: u64,
}

impl From<&TraceSpan> for SpanId {
    fn from(span: &TraceSpan) -> Self {
        Self {
            name: span.name.clone(),
            target: span.target.clone(),
            id: span.id,
        }
    }
}

/// Stage of block execution an action group belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    OnInitialize,
    InitialChecks,
    ApplyExtrinsic,
    OnFinalize,
    FinalChecks,
    /// A hook span name we have no variant for, kept verbatim.
    Other(String),
}

impl Phase {
    pub fn from_span_name(name: &str) -> Self {
        match name {
            "on_initialize" => Self::OnInitialize,
            "initial_checks" => Self::InitialChecks,
            "apply_extrinsic" => Self::ApplyExtrinsic,
            "on_finalize" => Self::OnFinalize,
            "final_checks" => Self::FinalChecks,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OnInitialize => f.write_str("onInitialize"),
            Self::InitialChecks => f.write_str("initialChecks"),
            Self::ApplyExtrinsic => f.write_str("applyExtrinsic"),
            Self::OnFinalize => f.write_str("onFinalize"),
            Self::FinalChecks => f.write_str("finalChecks"),
            Self::Other(name) => f.write_str(&camel_case(name)),
        }
    }
}

impl Serialize for Phase {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// `init_block` -> `initBlock`, `TotalIssuance` -> `totalIssuance`
pub(crate) fn camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let words = name
        .split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|w| !w.is_empty());
    for (i, word) in words.enumerate() {
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            if i == 0 {
                out.extend(first.to_lowercase());
            } else {
                out.extend(first.to_uppercase());
            }
            out.push_str(chars.as_str());
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseId {
    pub variant: Phase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extrinsic_index: Option<u32>,
}

/// Span with the ids of its direct children.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpanWithChildren {
    #[serde(flatten)]
    pub span: TraceSpan,
    pub children: Vec<u64>,
}

/// Trace event with its storage path, parent span and position in the trace.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedEvent {
    #[serde(flatten)]
    pub event: TraceEvent,
    pub storage_path: KeyInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<SpanId>,
    pub event_index: usize,
}

/// Parsed event tagged with the action group it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionEvent {
    #[serde(flatten)]
    pub event: ParsedEvent,
    pub phase: PhaseId,
    pub primary_span_id: SpanId,
}

/// A primary span (direct child of `execute_block`) with all of its
/// descendant spans and their storage events.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionGroup {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extrinsic_index: Option<u32>,
    pub phase: Phase,
    pub primary_span: SpanWithChildren,
    pub secondary_spans: Vec<SpanWithChildren>,
    pub events: Vec<ActionEvent>,
}
