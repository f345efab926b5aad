use std::collections::BTreeSet;
use tracing::debug;

use crate::indexer::transformations::events::ClassifiedEvents;
use crate::indexer::transformations::spans::{SpanTree, APPLY_EXTRINSIC};
use crate::models::datasets::actions::{
    ActionEvent, ActionGroup, ParsedEvent, Phase, PhaseId, SpanId, SpanWithChildren,
};
use crate::models::errors::TraceError;

/// Build one action group per primary span, in span id order. Any failure
/// aborts the whole block.
pub fn assemble_action_groups(
    tree: &SpanTree,
    classified: &ClassifiedEvents,
) -> Result<Vec<ActionGroup>, TraceError> {
    tree.primary_spans()
        .map(|primary| assemble_action_group(primary, tree, classified))
        .collect()
}

fn assemble_action_group(
    primary: &SpanWithChildren,
    tree: &SpanTree,
    classified: &ClassifiedEvents,
) -> Result<ActionGroup, TraceError> {
    let primary_id = primary.span.id;
    let secondary_ids = tree.descendants(primary_id)?;
    let secondary_spans: Vec<SpanWithChildren> = secondary_ids
        .iter()
        .filter_map(|id| tree.get(*id).cloned())
        .collect();

    // Events of the primary and every secondary span, back in trace order.
    let mut events: Vec<&ParsedEvent> = std::iter::once(primary_id)
        .chain(secondary_ids.iter().copied())
        .filter_map(|id| classified.events_by_parent_id.get(&id))
        .flatten()
        .collect();
    events.sort_by_key(|e| e.event_index);

    let (phase, extrinsic_index) = if primary.span.name == APPLY_EXTRINSIC {
        let span_ids: Vec<u64> = secondary_ids
            .iter()
            .copied()
            .chain(std::iter::once(primary_id))
            .collect();
        let index = extract_extrinsic_index(&span_ids, classified)
            .map_err(|e| e.at_span(primary_id))?;
        (Phase::ApplyExtrinsic, Some(index))
    } else {
        // `on_initialize` spans sit below `init_block`, so the first secondary
        // span names the phase. Hooks without children (`on_finalize`) are
        // named by the primary span itself.
        let name = secondary_spans
            .first()
            .map(|s| s.span.name.as_str())
            .unwrap_or(primary.span.name.as_str());
        let phase = Phase::from_span_name(name);
        // Extrinsics are only applied directly below `execute_block`
        if phase == Phase::ApplyExtrinsic {
            return Err(TraceError::structural(
                "apply_extrinsic span found below another primary span",
            )
            .at_span(primary_id));
        }
        (phase, None)
    };

    let primary_span_id = SpanId::from(&primary.span);
    let events: Vec<ActionEvent> = events
        .into_iter()
        .map(|event| ActionEvent {
            event: event.clone(),
            phase: PhaseId {
                variant: phase.clone(),
                extrinsic_index,
            },
            primary_span_id: primary_span_id.clone(),
        })
        .collect();

    debug!(
        "Action group {} ({}): {} secondary spans, {} events",
        primary_id,
        phase,
        secondary_spans.len(),
        events.len()
    );

    Ok(ActionGroup {
        extrinsic_index,
        phase,
        primary_span: primary.clone(),
        secondary_spans,
        events,
    })
}

/// The single extrinsic index read within the given spans of an
/// `apply_extrinsic` action group.
pub fn extract_extrinsic_index(
    span_ids: &[u64],
    classified: &ClassifiedEvents,
) -> Result<u32, TraceError> {
    let indexes: BTreeSet<u32> = span_ids
        .iter()
        .filter_map(|id| classified.extrinsic_index_by_span_id.get(id).copied())
        .collect();

    let mut iter = indexes.into_iter();
    match (iter.next(), iter.next()) {
        (Some(index), None) => Ok(index),
        (None, _) => Err(TraceError::structural("Expected at least one extrinsic index")),
        (Some(_), Some(_)) => Err(TraceError::structural(
            "Expect extrinsic to only be applied at a single index.",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::rpc::registry::ScaleRegistry;
    use crate::indexer::transformations::events::{classify_events, KeyNames};
    use crate::indexer::transformations::fixtures::{account_key, event, span, EXTRINSIC_INDEX_HEX};
    use crate::indexer::transformations::spans::SpanTreeBuilder;
    use crate::models::datasets::traces::{TraceEvent, TraceSpan};

    fn assemble(spans: Vec<TraceSpan>, events: Vec<TraceEvent>) -> Result<Vec<ActionGroup>, TraceError> {
        let registry = ScaleRegistry::new(vec!["DOT".to_string()], vec![]);
        let tree = spans.build_span_tree()?;
        let classified = classify_events(&events, &tree, &KeyNames::new(&registry), &registry)?;
        assemble_action_groups(&tree, &classified)
    }

    fn extrinsic_spans() -> Vec<TraceSpan> {
        vec![
            span(1, "execute_block", "frame_executive", None),
            span(2, "apply_extrinsic", "frame_executive", Some(1)),
            span(3, "transfer", "pallet_balances", Some(2)),
            span(4, "deposit_event", "frame_system", Some(3)),
        ]
    }

    #[test]
    fn agreeing_index_reads_give_the_index() {
        let events = vec![
            event(2, EXTRINSIC_INDEX_HEX, "Get", Some("0105000000")),
            event(3, EXTRINSIC_INDEX_HEX, "Get", Some("0105000000")),
            event(4, EXTRINSIC_INDEX_HEX, "Get", Some("0105000000")),
        ];
        let groups = assemble(extrinsic_spans(), events).unwrap();

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].phase, Phase::ApplyExtrinsic);
        assert_eq!(groups[0].extrinsic_index, Some(5));
        assert!(groups[0]
            .events
            .iter()
            .all(|e| e.phase.extrinsic_index == Some(5) && e.primary_span_id.id == 2));
    }

    #[test]
    fn diverging_index_reads_fail() {
        let events = vec![
            event(2, EXTRINSIC_INDEX_HEX, "Get", Some("0105000000")),
            event(3, EXTRINSIC_INDEX_HEX, "Get", Some("0105000000")),
            event(4, EXTRINSIC_INDEX_HEX, "Get", Some("0106000000")),
        ];
        let err = assemble(extrinsic_spans(), events).unwrap_err();
        assert!(matches!(
            err,
            TraceError::StructuralInvariantViolation {
                span_id: Some(2),
                ..
            }
        ));
    }

    #[test]
    fn apply_extrinsic_without_index_read_fails() {
        let events = vec![event(3, &account_key(1), "Get", Some("00"))];
        let err = assemble(extrinsic_spans(), events).unwrap_err();
        assert!(err.to_string().contains("Expected at least one extrinsic index"));
    }

    #[test]
    fn hook_phases_come_from_span_names() {
        let spans = vec![
            span(1, "execute_block", "frame_executive", None),
            span(2, "init_block", "frame_executive", Some(1)),
            span(3, "on_initialize", "pallet_timestamp", Some(2)),
            span(4, "on_finalize", "pallet_balances", Some(1)),
            span(5, "final_checks", "frame_executive", Some(1)),
            span(6, "on_idle", "pallet_scheduler", Some(1)),
        ];
        let groups = assemble(spans, vec![]).unwrap();

        let phases: Vec<Phase> = groups.iter().map(|g| g.phase.clone()).collect();
        assert_eq!(
            phases,
            vec![
                Phase::OnInitialize,
                Phase::OnFinalize,
                Phase::FinalChecks,
                Phase::Other("on_idle".to_string()),
            ]
        );
        assert!(groups.iter().all(|g| g.extrinsic_index.is_none()));
        assert_eq!(groups[0].secondary_spans[0].span.id, 3);
    }

    #[test]
    fn nested_apply_extrinsic_is_rejected() {
        let spans = vec![
            span(1, "execute_block", "frame_executive", None),
            span(2, "init_block", "frame_executive", Some(1)),
            span(3, "apply_extrinsic", "frame_executive", Some(2)),
        ];
        let events = vec![event(3, EXTRINSIC_INDEX_HEX, "Get", Some("0101000000"))];

        let err = assemble(spans, events).unwrap_err();
        assert!(matches!(
            err,
            TraceError::StructuralInvariantViolation {
                span_id: Some(2),
                ..
            }
        ));
    }

    #[test]
    fn events_are_interleaved_in_trace_order() {
        let events = vec![
            event(3, &account_key(1), "Get", Some("00")),
            event(2, EXTRINSIC_INDEX_HEX, "Get", Some("0100000000")),
            event(4, &account_key(1), "Put", Some("00")),
            event(3, &account_key(2), "Get", Some("00")),
        ];
        let groups = assemble(extrinsic_spans(), events).unwrap();

        let order: Vec<usize> = groups[0].events.iter().map(|e| e.event.event_index).collect();
        assert_eq!(order, vec![0, 1, 2, 3]);
        assert_eq!(groups[0].extrinsic_index, Some(0));
    }
}
