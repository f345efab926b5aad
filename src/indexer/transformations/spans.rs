use std::collections::{HashMap, HashSet};

use crate::models::datasets::actions::SpanWithChildren;
use crate::models::datasets::traces::TraceSpan;
use crate::models::errors::TraceError;

/// Root span of every block execution.
pub const EXECUTE_BLOCK: (&str, &str) = ("execute_block", "frame_executive");
/// Primary span of a transaction application.
pub const APPLY_EXTRINSIC: &str = "apply_extrinsic";

/// Spans of one trace stored in id order, with children linked by id.
#[derive(Debug, Clone)]
pub struct SpanTree {
    spans: Vec<SpanWithChildren>,
    index_by_id: HashMap<u64, usize>,
    execute_block_span_id: u64,
}

pub trait SpanTreeBuilder {
    fn build_span_tree(&self) -> Result<SpanTree, TraceError>;
}

impl SpanTreeBuilder for [TraceSpan] {
    fn build_span_tree(&self) -> Result<SpanTree, TraceError> {
        // Everything downstream relies on id order: primary spans are visited
        // in this order and operations inherit it.
        let mut sorted = self.to_vec();
        sorted.sort_by_key(|span| span.id);

        let mut spans = Vec::with_capacity(sorted.len());
        let mut index_by_id = HashMap::with_capacity(sorted.len());
        let mut execute_block_span_id = None;

        for span in sorted {
            if (span.name.as_str(), span.target.as_str()) == EXECUTE_BLOCK {
                if execute_block_span_id.is_some() {
                    return Err(
                        TraceError::structural("more than one execute block span found")
                            .at_span(span.id),
                    );
                }
                execute_block_span_id = Some(span.id);
            }

            if index_by_id.insert(span.id, spans.len()).is_some() {
                return Err(TraceError::structural("duplicate span id in trace").at_span(span.id));
            }
            spans.push(SpanWithChildren {
                span,
                children: Vec::new(),
            });
        }

        let execute_block_span_id = execute_block_span_id
            .ok_or_else(|| TraceError::structural("execute_block span could not be found"))?;

        // Link every span into its parent's `children`, building a tree rooted
        // at `execute_block`.
        for i in 0..spans.len() {
            let Some(parent_id) = spans[i].span.parent() else {
                continue;
            };
            let id = spans[i].span.id;
            let parent = *index_by_id.get(&parent_id).ok_or_else(|| {
                TraceError::structural("Expected spans parent to exist in spansById").at_span(id)
            })?;
            spans[parent].children.push(id);
        }

        Ok(SpanTree {
            spans,
            index_by_id,
            execute_block_span_id,
        })
    }
}

impl SpanTree {
    pub fn execute_block_span_id(&self) -> u64 {
        self.execute_block_span_id
    }

    /// All spans, sorted by id.
    pub fn spans(&self) -> &[SpanWithChildren] {
        &self.spans
    }

    pub fn get(&self, id: u64) -> Option<&SpanWithChildren> {
        self.index_by_id.get(&id).map(|&i| &self.spans[i])
    }

    /// Direct children of the `execute_block` span, in id order.
    pub fn primary_spans(&self) -> impl Iterator<Item = &SpanWithChildren> {
        let root = self.execute_block_span_id;
        self.spans
            .iter()
            .filter(move |s| s.span.parent() == Some(root))
    }

    /// Ids of every span below `root`, sorted. Unknown ids have no descendants.
    pub fn descendants(&self, root: u64) -> Result<Vec<u64>, TraceError> {
        let Some(span) = self.get(root) else {
            return Ok(Vec::new());
        };

        let mut stack = span.children.clone();
        let mut seen = HashSet::new();
        while let Some(id) = stack.pop() {
            if id == root || !seen.insert(id) {
                return Err(TraceError::structural("cycle in span tree").at_span(id));
            }
            if let Some(child) = self.get(id) {
                stack.extend_from_slice(&child.children);
            }
        }

        let mut descendants: Vec<u64> = seen.into_iter().collect();
        descendants.sort_unstable();
        Ok(descendants)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::transformations::fixtures::span;

    fn root() -> TraceSpan {
        span(1, "execute_block", "frame_executive", None)
    }

    #[test]
    fn missing_execute_block_fails() {
        let spans = vec![span(2, "apply_extrinsic", "frame_executive", None)];
        let err = spans.build_span_tree().unwrap_err();
        assert!(err.to_string().contains("execute_block span could not be found"));
    }

    #[test]
    fn duplicate_execute_block_fails() {
        let spans = vec![root(), span(5, "execute_block", "frame_executive", None)];
        let err = spans.build_span_tree().unwrap_err();
        assert!(err.to_string().contains("more than one execute block span found"));
    }

    #[test]
    fn finds_root_in_unsorted_input() {
        let spans = vec![
            span(3, "on_initialize", "pallet_timestamp", Some(2)),
            span(2, "init_block", "frame_executive", Some(1)),
            root(),
        ];
        let tree = spans.build_span_tree().unwrap();
        assert_eq!(tree.execute_block_span_id(), 1);
        let ids: Vec<u64> = tree.spans().iter().map(|s| s.span.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn children_match_parent_ids() {
        let spans = vec![
            root(),
            span(2, "init_block", "frame_executive", Some(1)),
            span(3, "on_initialize", "pallet_a", Some(2)),
            span(4, "on_initialize", "pallet_b", Some(2)),
            span(5, "apply_extrinsic", "frame_executive", Some(1)),
            span(6, "transfer", "pallet_balances", Some(5)),
        ];
        let tree = spans.build_span_tree().unwrap();

        for node in tree.spans() {
            let mut expected: Vec<u64> = spans
                .iter()
                .filter(|s| s.parent() == Some(node.span.id))
                .map(|s| s.id)
                .collect();
            expected.sort_unstable();
            assert_eq!(node.children, expected, "children of span {}", node.span.id);
        }

        let primaries: Vec<u64> = tree.primary_spans().map(|s| s.span.id).collect();
        assert_eq!(primaries, vec![2, 5]);
    }

    #[test]
    fn dangling_parent_fails() {
        let spans = vec![root(), span(2, "apply_extrinsic", "frame_executive", Some(9))];
        let err = spans.build_span_tree().unwrap_err();
        assert_eq!(
            err,
            TraceError::StructuralInvariantViolation {
                reason: "Expected spans parent to exist in spansById".to_string(),
                span_id: Some(2),
                event_index: None,
            }
        );
    }

    #[test]
    fn descendants_of_chain() {
        // root -> A -> B -> C
        let spans = vec![
            root(),
            span(2, "a", "t", Some(1)),
            span(3, "b", "t", Some(2)),
            span(4, "c", "t", Some(3)),
        ];
        let tree = spans.build_span_tree().unwrap();
        assert_eq!(tree.descendants(1).unwrap(), vec![2, 3, 4]);
        assert_eq!(tree.descendants(2).unwrap(), vec![3, 4]);
        assert_eq!(tree.descendants(3).unwrap(), vec![4]);
        assert!(tree.descendants(4).unwrap().is_empty());
        assert!(tree.descendants(42).unwrap().is_empty());
    }

    #[test]
    fn cycles_are_fatal() {
        // 2 and 3 parent each other, detached from the root
        let spans = vec![
            root(),
            span(2, "a", "t", Some(3)),
            span(3, "b", "t", Some(2)),
        ];
        let tree = spans.build_span_tree().unwrap();
        assert!(matches!(
            tree.descendants(2),
            Err(TraceError::StructuralInvariantViolation { .. })
        ));
    }
}
