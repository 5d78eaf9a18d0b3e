//! Tree-construction invariants over generated span topologies

use proptest::prelude::*;
use tracealign::trace_model::{Span, SpanStatus, TraceData};

fn span(span_id: String, parent: Option<String>, start: u64) -> Span {
    Span {
        span_id,
        trace_id: "t".to_string(),
        parent_span_id: parent,
        name: "op".to_string(),
        start_time_ns: start,
        end_time_ns: start + 1,
        status: SpanStatus::default(),
        attributes: Default::default(),
        events: Vec::new(),
    }
}

/// Arbitrary parent topology: each span points at a lower-indexed span,
/// itself (degenerate), a missing id, or nothing.
fn topology(max_spans: usize) -> impl Strategy<Value = Vec<(usize, Option<String>)>> {
    prop::collection::vec(any::<u32>(), 1..max_spans).prop_map(|seeds| {
        seeds
            .iter()
            .enumerate()
            .map(|(i, &seed)| {
                let parent = match seed % 4 {
                    0 => None,
                    1 if i > 0 => Some(format!("s{}", seed as usize % i)),
                    2 => Some(format!("ghost{}", seed)),
                    _ => None,
                };
                (i, parent)
            })
            .collect()
    })
}

proptest! {
    #[test]
    fn every_span_is_root_or_reachable(topo in topology(24)) {
        let mut trace = TraceData::new("t");
        for (i, parent) in &topo {
            trace.insert(span(format!("s{}", i), parent.clone(), *i as u64));
        }
        let _warnings = trace.build_tree();

        let reachable = trace.reachable_from_root();
        let mut covered = reachable.clone();
        for root in &trace.secondary_roots {
            // Walk each secondary root's subtree
            let mut stack = vec![root.clone()];
            while let Some(id) = stack.pop() {
                if !covered.insert(id.clone()) {
                    continue;
                }
                if let Some(kids) = trace.children.get(&id) {
                    stack.extend(kids.iter().cloned());
                }
            }
        }
        prop_assert_eq!(covered.len(), trace.spans.len());
    }

    #[test]
    fn root_choice_is_deterministic(topo in topology(16)) {
        let build = || {
            let mut trace = TraceData::new("t");
            for (i, parent) in &topo {
                trace.insert(span(format!("s{}", i), parent.clone(), *i as u64));
            }
            trace.build_tree();
            (trace.root_span.clone(), trace.secondary_roots.clone())
        };
        prop_assert_eq!(build(), build());
    }

    #[test]
    fn children_lists_are_consistent_with_parents(topo in topology(16)) {
        let mut trace = TraceData::new("t");
        for (i, parent) in &topo {
            trace.insert(span(format!("s{}", i), parent.clone(), *i as u64));
        }
        trace.build_tree();

        for (parent_id, kids) in &trace.children {
            for kid in kids {
                let child_span = &trace.spans[kid];
                prop_assert_eq!(child_span.parent_span_id.as_ref(), Some(parent_id));
            }
        }
    }

    #[test]
    fn nonempty_trace_has_root_or_warning(topo in topology(16)) {
        let mut trace = TraceData::new("t");
        for (i, parent) in &topo {
            trace.insert(span(format!("s{}", i), parent.clone(), *i as u64));
        }
        let warnings = trace.build_tree();
        prop_assert!(
            trace.root_span.is_some() || !warnings.is_empty(),
            "trace with spans ended rootless and silent"
        );
    }
}

#[test]
fn self_parent_span_is_demoted() {
    let mut trace = TraceData::new("t");
    trace.insert(span("a".to_string(), Some("a".to_string()), 0));
    let warnings = trace.build_tree();
    assert!(warnings.iter().any(|w| w.message.contains("cycle")));
    assert_eq!(trace.root_span.as_deref(), Some("a"));
}

#[test]
fn long_chain_stays_single_root() {
    let mut trace = TraceData::new("t");
    trace.insert(span("s0".to_string(), None, 0));
    for i in 1..100 {
        trace.insert(span(format!("s{}", i), Some(format!("s{}", i - 1)), i));
    }
    let warnings = trace.build_tree();
    assert!(warnings.is_empty());
    assert_eq!(trace.root_span.as_deref(), Some("s0"));
    assert_eq!(trace.reachable_from_root().len(), 100);
}
