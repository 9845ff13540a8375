//! Per-event scheduling state tables
//!
//! Two flat tables carry all mutable per-event bookkeeping:
//!
//! - [`NodeState`]: one entry per control-flow node, indexed by
//!   [`NodeIndex`](crate::graph::NodeIndex). Holds the node's execution
//!   counter and pass/fail flag.
//! - [`AlgState`]: one entry per deduplicated algorithm, indexed by
//!   [`AlgIndex`](crate::graph::AlgIndex). Memoizes algorithm invocations
//!   shared by several leaf nodes within one event.
//!
//! Both tables are created per event by copying a template vector (plain-data
//! copy, no allocation beyond the vectors themselves) and are never shared
//! across events, so they need no synchronization during an event's own
//! execution.

use crate::graph::NodeGraph;
use serde::{Deserialize, Serialize};

/// Per-node scheduling state for one event.
///
/// `execution_counter` starts at 1 for leaves and at the child count for
/// composites; it strictly decreases through notifications and is clamped to
/// 0 by a lazy short-circuit. A node is settled once the counter reaches 0;
/// `passed` is meaningful only then (its default `true` is the identity
/// element for AND-like combinators before any child reports).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeState {
    /// Remaining child/algorithm results before this node settles
    pub execution_counter: u32,
    /// Settled decision of this node
    pub passed: bool,
}

impl NodeState {
    /// Whether this node has settled for the current event.
    pub fn settled(&self) -> bool {
        self.execution_counter == 0
    }
}

/// Per-algorithm execution state for one event.
///
/// Once `executed` is set the entry is never re-executed for that event; a
/// second leaf requiring the same algorithm observes the memoized
/// `filter_passed` without re-invoking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlgState {
    /// Whether the algorithm has been invoked this event
    pub executed: bool,
    /// Filter decision reported by the invocation
    pub filter_passed: bool,
}

/// Template node-state table, derived once from the graph and copied fresh
/// for every event.
pub fn node_state_template(graph: &NodeGraph) -> Vec<NodeState> {
    graph
        .nodes()
        .map(|node| NodeState {
            execution_counter: node.initial_counter(),
            passed: true,
        })
        .collect()
}

/// Template algorithm-state table for a table of `count` deduplicated
/// algorithms.
pub fn alg_state_template(count: usize) -> Vec<AlgState> {
    vec![AlgState::default(); count]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeDefinition;
    use crate::graph::CombinatorKind;

    #[test]
    fn test_template_counters() {
        let graph = NodeGraph::from_definitions(&[NodeDefinition {
            name: "root".to_string(),
            kind: CombinatorKind::NonlazyAnd,
            children: vec!["a".to_string(), "b".to_string()],
            ordered: false,
        }])
        .unwrap();

        let template = node_state_template(&graph);
        assert_eq!(template.len(), 3);
        assert_eq!(template[graph.root()].execution_counter, 2);
        assert!(template[graph.root()].passed);
        let a = graph.index_of("a").unwrap();
        assert_eq!(template[a].execution_counter, 1);
        assert!(!template[a].settled());
    }

    #[test]
    fn test_alg_template_defaults() {
        let template = alg_state_template(3);
        assert_eq!(template.len(), 3);
        assert!(template.iter().all(|s| !s.executed && !s.filter_passed));
    }
}
