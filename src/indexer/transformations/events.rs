use std::collections::HashMap;

use crate::indexer::rpc::registry::TypeRegistry;
use crate::indexer::transformations::spans::SpanTree;
use crate::models::datasets::actions::{KeyInfo, ParsedEvent, SpanId};
use crate::models::datasets::traces::TraceEvent;
use crate::models::errors::TraceError;

pub const EXTRINSIC_INDEX_KEY: &str = ":extrinsic_index";

/// Well-known storage keys that are not part of any pallet.
const SPECIAL_KEYS: [(&str, &str); 5] = [
    ("3a636f6465", ":code"),
    ("3a686561707061676573", ":heappages"),
    ("3a65787472696e7369635f696e646578", EXTRINSIC_INDEX_KEY),
    ("3a6368616e6765735f74726965", ":changes_trie"),
    ("3a6368696c645f73746f726167653a", ":child_storage:"),
];

/// Hex characters in a `twox128(module) ++ twox128(item)` key prefix.
const KEY_PREFIX_LEN: usize = 64;

/// Maps storage key prefixes to the item they belong to.
#[derive(Debug, Clone, Default)]
pub struct KeyNames {
    names: HashMap<String, KeyInfo>,
}

impl KeyNames {
    pub fn new<R: TypeRegistry + ?Sized>(registry: &R) -> Self {
        let mut names: HashMap<String, KeyInfo> = registry
            .storage_items()
            .iter()
            .map(|item| {
                (
                    item.key_prefix.trim_start_matches("0x").to_lowercase(),
                    KeyInfo::Pallet {
                        module: item.module.clone(),
                        item: item.item.clone(),
                    },
                )
            })
            .collect();

        for (key, special) in SPECIAL_KEYS {
            names.insert(
                key.to_string(),
                KeyInfo::Special {
                    special: special.to_string(),
                },
            );
        }

        Self { names }
    }

    /// Storage item for a full hex storage key, looked up by its first 32 bytes.
    pub fn storage_path(&self, key: Option<&str>) -> KeyInfo {
        key.map(|k| k.get(..KEY_PREFIX_LEN).unwrap_or(k))
            .and_then(|prefix| self.names.get(prefix))
            .cloned()
            .unwrap_or(KeyInfo::Unresolved)
    }
}

/// Events of a trace grouped by the span they were emitted in.
#[derive(Debug, Clone, Default)]
pub struct ClassifiedEvents {
    pub events_by_parent_id: HashMap<u64, Vec<ParsedEvent>>,
    /// Last `:extrinsic_index` read seen under each span.
    pub extrinsic_index_by_span_id: HashMap<u64, u32>,
}

/// Annotate each event with its storage path, parent span and index, in trace
/// order.
pub fn classify_events<R: TypeRegistry + ?Sized>(
    events: &[TraceEvent],
    tree: &SpanTree,
    key_names: &KeyNames,
    registry: &R,
) -> Result<ClassifiedEvents, TraceError> {
    let mut classified = ClassifiedEvents::default();

    for (event_index, event) in events.iter().enumerate() {
        let storage_path = key_names.storage_path(event.data.string_values.key.as_deref());
        let parent = event.parent();
        let parent_span_id = parent
            .and_then(|id| tree.get(id))
            .map(|p| SpanId::from(&p.span));

        let parsed = ParsedEvent {
            event: event.clone(),
            storage_path,
            parent_span_id,
            event_index,
        };

        // Reads repeat within a span; the last one wins here and agreement is
        // checked per action group.
        let index = maybe_extract_index(&parsed, registry)?;

        // Events outside any span keep their index but join no action group
        let Some(parent) = parent else {
            continue;
        };
        if let Some(index) = index {
            classified.extrinsic_index_by_span_id.insert(parent, index);
        }

        classified
            .events_by_parent_id
            .entry(parent)
            .or_default()
            .push(parsed);
    }

    Ok(classified)
}

/// Extrinsic index carried by a `Get` of `:extrinsic_index`, `None` for any
/// other event. `Put`s at that key prepare the next extrinsic and are skipped.
pub fn maybe_extract_index<R: TypeRegistry + ?Sized>(
    event: &ParsedEvent,
    registry: &R,
) -> Result<Option<u32>, TraceError> {
    let values = &event.event.data.string_values;
    if !(event.storage_path.is_special(EXTRINSIC_INDEX_KEY) && values.is_get()) {
        return Ok(None);
    }

    let Some(result) = values.result.as_deref() else {
        return Err(TraceError::decode(
            "extrinsic index",
            "expected an encoded extrinsic index for extrinsic index event",
        )
        .at_event(event.event_index));
    };

    decode_extrinsic_index(result, registry)
        .map(Some)
        .map_err(|e| e.at_event(event.event_index))
}

/// Decode the traced value of `:extrinsic_index`.
///
/// The node reports an `Option<u32>`: one leading option byte, then the
/// little-endian integer. The option byte is dropped and the remaining bytes
/// reversed so the registry reads them as a big-endian `u32`.
///
/// This has only been checked against the runtimes block tracing shipped
/// with. Do not reuse it for other optional or compact values.
pub fn decode_extrinsic_index<R: TypeRegistry + ?Sized>(
    result: &str,
    registry: &R,
) -> Result<u32, TraceError> {
    let Some(value) = result.get(2..).filter(|v| v.is_ascii()) else {
        return Err(TraceError::decode(
            "extrinsic index",
            format!("result {result:?} is not hex encoded"),
        ));
    };

    let reversed: String = value
        .as_bytes()
        .chunks(2)
        .rev()
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect();

    registry.decode_u32(&format!("0x{reversed}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::rpc::registry::ScaleRegistry;
    use crate::indexer::transformations::fixtures::{
        account_key, event, span, EXTRINSIC_INDEX_HEX, SYSTEM_ACCOUNT_PREFIX,
    };
    use crate::indexer::transformations::spans::SpanTreeBuilder;

    fn registry() -> ScaleRegistry {
        ScaleRegistry::new(vec!["DOT".to_string()], vec![])
    }

    #[test]
    fn resolves_pallet_and_special_keys() {
        let key_names = KeyNames::new(&registry());

        assert_eq!(
            key_names.storage_path(Some(&account_key(7))),
            KeyInfo::Pallet {
                module: "system".to_string(),
                item: "account".to_string(),
            }
        );
        assert_eq!(
            key_names.storage_path(Some(SYSTEM_ACCOUNT_PREFIX)),
            KeyInfo::Pallet {
                module: "system".to_string(),
                item: "account".to_string(),
            }
        );
        assert!(key_names
            .storage_path(Some(EXTRINSIC_INDEX_HEX))
            .is_special(EXTRINSIC_INDEX_KEY));
        assert_eq!(key_names.storage_path(Some("deadbeef")), KeyInfo::Unresolved);
        assert_eq!(key_names.storage_path(None), KeyInfo::Unresolved);
    }

    #[test]
    fn decodes_extrinsic_index_bytes() {
        let registry = registry();
        assert_eq!(decode_extrinsic_index("0105000000", &registry).unwrap(), 5);
        assert_eq!(decode_extrinsic_index("0103010000", &registry).unwrap(), 259);
        assert!(matches!(
            decode_extrinsic_index("01zz000000", &registry),
            Err(TraceError::DecodeError { .. })
        ));
        assert!(decode_extrinsic_index("", &registry).is_err());
    }

    #[test]
    fn classifies_events_in_order() {
        let registry = registry();
        let key_names = KeyNames::new(&registry);
        let tree = vec![
            span(1, "execute_block", "frame_executive", None),
            span(2, "apply_extrinsic", "frame_executive", Some(1)),
        ]
        .build_span_tree()
        .unwrap();

        let events = vec![
            event(2, EXTRINSIC_INDEX_HEX, "Get", Some("0102000000")),
            event(2, &account_key(1), "Get", Some("00")),
            // Writes prepare the next extrinsic and are ignored
            event(2, EXTRINSIC_INDEX_HEX, "Put", Some("0103000000")),
            event(1, "deadbeef", "Get", None),
        ];

        let classified = classify_events(&events, &tree, &key_names, &registry).unwrap();

        let under_apply = &classified.events_by_parent_id[&2];
        let indexes: Vec<usize> = under_apply.iter().map(|e| e.event_index).collect();
        assert_eq!(indexes, vec![0, 1, 2]);
        assert_eq!(
            under_apply[0].parent_span_id.as_ref().map(|s| s.name.as_str()),
            Some("apply_extrinsic")
        );
        assert_eq!(classified.events_by_parent_id[&1][0].event_index, 3);
        assert_eq!(classified.events_by_parent_id[&1][0].storage_path, KeyInfo::Unresolved);
        assert_eq!(classified.extrinsic_index_by_span_id.get(&2), Some(&2));
        assert_eq!(classified.extrinsic_index_by_span_id.get(&1), None);
    }

    #[test]
    fn extrinsic_index_read_without_result_fails() {
        let registry = registry();
        let key_names = KeyNames::new(&registry);
        let tree = vec![span(1, "execute_block", "frame_executive", None)]
            .build_span_tree()
            .unwrap();
        let events = vec![event(1, EXTRINSIC_INDEX_HEX, "Get", None)];

        let err = classify_events(&events, &tree, &key_names, &registry).unwrap_err();
        assert!(matches!(
            err,
            TraceError::DecodeError {
                event_index: Some(0),
                ..
            }
        ));
    }
}
