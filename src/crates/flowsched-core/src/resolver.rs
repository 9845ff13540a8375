//! Control-flow dependency resolution
//!
//! Turns the immutable node graph plus the declared ordering constraints into
//! a single linear execution order over all leaf nodes. The order is computed
//! once at configuration time and shared read-only by every event.
//!
//! # Edge derivation
//!
//! Ordering edges come from three sources, each expanded to the transitive
//! closure of *leaf* nodes below its endpoints:
//!
//! 1. **Ordered children**: adjacent children of a composite with
//!    `ordered: true`. Applied uniformly regardless of combinator kind.
//! 2. **Explicit edges**: user-declared `[before, after]` pairs.
//! 3. **Barrier edges**: a barrier (gather) algorithm collects optional
//!    upstream inputs, and optional data dependencies are pruned from the
//!    ordinary broker edges. The resolver therefore synthesizes an edge from
//!    every control-flow node producing an input of a barrier to every node
//!    consuming the barrier's output. Omitting these would silently violate
//!    ordering.
//!
//! # Topological sort
//!
//! A greedy scan: repeatedly walk the not-yet-placed leaves and append any
//! leaf whose every incoming edge's from-set is fully contained in the
//! ordered prefix. A full pass placing nothing means the constraints contain
//! a cycle, which is a fatal configuration error; no partial order is ever
//! returned. Ties break by definition order, so the result is deterministic
//! for a fixed configuration (any linear extension would be equally valid).

use crate::algorithm::DataBroker;
use crate::config::EdgeDefinition;
use crate::error::{Result, SchedulerError};
use crate::graph::{NodeGraph, NodeIndex};
use std::collections::BTreeSet;
use std::fmt;

/// Where a derived edge came from. Diagnostic only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeOrigin {
    /// Adjacent children of an `ordered` composite
    OrderedChildren,
    /// User-declared `[before, after]` pair
    Explicit,
    /// Synthesized around a barrier algorithm
    Barrier,
}

impl fmt::Display for EdgeOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeOrigin::OrderedChildren => write!(f, "ordered-children"),
            EdgeOrigin::Explicit => write!(f, "explicit"),
            EdgeOrigin::Barrier => write!(f, "barrier"),
        }
    }
}

/// One derived ordering constraint: every leaf in `to` must execute after
/// every leaf in `from`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    /// Leaf closure of the upstream endpoint
    pub from: BTreeSet<NodeIndex>,
    /// Leaf closure of the downstream endpoint
    pub to: BTreeSet<NodeIndex>,
    /// Provenance of this edge
    pub origin: EdgeOrigin,
}

/// The resolved execution order and the edges it satisfies.
#[derive(Debug, Clone)]
pub struct ExecutionOrder {
    leaves: Vec<NodeIndex>,
    edges: Vec<Edge>,
}

impl ExecutionOrder {
    /// Leaf node indices in execution order.
    pub fn leaves(&self) -> &[NodeIndex] {
        &self.leaves
    }

    /// The derived edges the order satisfies. Diagnostic accessor.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Render the derived edges by node name, for debugging.
    pub fn describe_edges(&self, graph: &NodeGraph) -> String {
        let names = |set: &BTreeSet<NodeIndex>| {
            set.iter()
                .map(|&i| graph.node(i).name())
                .collect::<Vec<_>>()
                .join(", ")
        };
        self.edges
            .iter()
            .map(|e| format!("[{}] -> [{}]  ({})", names(&e.from), names(&e.to), e.origin))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Derive all ordering edges and topologically sort the leaves.
///
/// # Errors
///
/// Returns [`SchedulerError::Configuration`] if an explicit edge names an
/// unknown node, or the derived edges contain a cycle.
pub fn resolve(
    graph: &NodeGraph,
    explicit: &[EdgeDefinition],
    barriers: &[String],
    broker: &dyn DataBroker,
) -> Result<ExecutionOrder> {
    let edges = derive_edges(graph, explicit, barriers, broker)?;
    let leaves = topological_sort(graph, &edges)?;
    tracing::debug!(
        leaves = leaves.len(),
        edges = edges.len(),
        "control-flow order resolved"
    );
    Ok(ExecutionOrder { leaves, edges })
}

fn closure(graph: &NodeGraph, index: NodeIndex) -> BTreeSet<NodeIndex> {
    graph.leaves_below(index).into_iter().collect()
}

fn derive_edges(
    graph: &NodeGraph,
    explicit: &[EdgeDefinition],
    barriers: &[String],
    broker: &dyn DataBroker,
) -> Result<Vec<Edge>> {
    let mut edges = Vec::new();

    // 1. Adjacent children of ordered composites.
    for node in graph.nodes() {
        if let crate::graph::VNode::Composite(c) = node {
            if !c.ordered {
                continue;
            }
            for pair in c.children.windows(2) {
                edges.push(Edge {
                    from: closure(graph, pair[0]),
                    to: closure(graph, pair[1]),
                    origin: EdgeOrigin::OrderedChildren,
                });
            }
        }
    }

    // 2. Explicit user-declared edges.
    for def in explicit {
        let before = graph.index_of(&def.before).ok_or_else(|| {
            SchedulerError::Configuration(format!(
                "explicit edge endpoint '{}' does not name a known node",
                def.before
            ))
        })?;
        let after = graph.index_of(&def.after).ok_or_else(|| {
            SchedulerError::Configuration(format!(
                "explicit edge endpoint '{}' does not name a known node",
                def.after
            ))
        })?;
        edges.push(Edge {
            from: closure(graph, before),
            to: closure(graph, after),
            origin: EdgeOrigin::Explicit,
        });
    }

    // 3. Barrier edges: every producing control-flow node must precede every
    // consumer of the barrier's output.
    for barrier in barriers {
        let producers: Vec<NodeIndex> = broker
            .producers_for(barrier)
            .iter()
            .filter_map(|name| graph.index_of(name))
            .collect();
        let consumers: Vec<NodeIndex> = broker
            .consumers_of(barrier)
            .iter()
            .filter_map(|name| graph.index_of(name))
            .collect();
        for &producer in &producers {
            for &consumer in &consumers {
                edges.push(Edge {
                    from: closure(graph, producer),
                    to: closure(graph, consumer),
                    origin: EdgeOrigin::Barrier,
                });
            }
        }
    }

    edges.retain(|e| !e.from.is_empty() && !e.to.is_empty());
    Ok(edges)
}

fn topological_sort(graph: &NodeGraph, edges: &[Edge]) -> Result<Vec<NodeIndex>> {
    let mut remaining: Vec<NodeIndex> = graph.leaf_indices().collect();
    let mut placed: Vec<NodeIndex> = Vec::with_capacity(remaining.len());
    let mut placed_set: BTreeSet<NodeIndex> = BTreeSet::new();

    while !remaining.is_empty() {
        let mut placed_this_pass = false;
        remaining.retain(|&leaf| {
            let eligible = edges
                .iter()
                .filter(|e| e.to.contains(&leaf))
                .all(|e| e.from.iter().all(|f| placed_set.contains(f)));
            if eligible {
                placed.push(leaf);
                placed_set.insert(leaf);
                placed_this_pass = true;
            }
            !eligible
        });

        if !placed_this_pass {
            let names: Vec<&str> = remaining.iter().map(|&i| graph.node(i).name()).collect();
            return Err(SchedulerError::Configuration(format!(
                "cycle in control-flow edges; cannot order leaves: {}",
                names.join(", ")
            )));
        }
    }

    Ok(placed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::{FnAlgorithm, MappingBroker};
    use crate::config::NodeDefinition;
    use crate::graph::CombinatorKind;
    use std::sync::Arc;

    fn def(name: &str, kind: CombinatorKind, children: &[&str], ordered: bool) -> NodeDefinition {
        NodeDefinition {
            name: name.to_string(),
            kind,
            children: children.iter().map(|c| c.to_string()).collect(),
            ordered,
        }
    }

    fn edge(before: &str, after: &str) -> EdgeDefinition {
        EdgeDefinition {
            before: before.to_string(),
            after: after.to_string(),
        }
    }

    fn position(graph: &NodeGraph, order: &ExecutionOrder, name: &str) -> usize {
        let idx = graph.index_of(name).unwrap();
        order.leaves().iter().position(|&l| l == idx).unwrap()
    }

    #[test]
    fn test_ordered_children_edges() {
        let graph = NodeGraph::from_definitions(&[def(
            "root",
            CombinatorKind::LazyAnd,
            &["a", "b", "c"],
            true,
        )])
        .unwrap();
        let order = resolve(&graph, &[], &[], &MappingBroker::new()).unwrap();

        assert_eq!(order.edges().len(), 2);
        assert!(position(&graph, &order, "a") < position(&graph, &order, "b"));
        assert!(position(&graph, &order, "b") < position(&graph, &order, "c"));
    }

    #[test]
    fn test_unordered_composite_derives_no_edges() {
        let graph = NodeGraph::from_definitions(&[def(
            "root",
            CombinatorKind::NonlazyOr,
            &["a", "b"],
            false,
        )])
        .unwrap();
        let order = resolve(&graph, &[], &[], &MappingBroker::new()).unwrap();
        assert!(order.edges().is_empty());
        assert_eq!(order.leaves().len(), 2);
    }

    #[test]
    fn test_explicit_edge_expands_to_leaf_closures() {
        let graph = NodeGraph::from_definitions(&[
            def("root", CombinatorKind::NonlazyAnd, &["sub", "z"], false),
            def("sub", CombinatorKind::NonlazyOr, &["a", "b"], false),
        ])
        .unwrap();
        let order = resolve(&graph, &[edge("z", "sub")], &[], &MappingBroker::new()).unwrap();

        // Both leaves of "sub" come after "z".
        assert!(position(&graph, &order, "z") < position(&graph, &order, "a"));
        assert!(position(&graph, &order, "z") < position(&graph, &order, "b"));
    }

    #[test]
    fn test_barrier_edges_synthesized() {
        let graph = NodeGraph::from_definitions(&[def(
            "root",
            CombinatorKind::NonlazyOr,
            &["prod_a", "prod_b", "consumer"],
            false,
        )])
        .unwrap();
        let broker = MappingBroker::new()
            .with_algorithm(Arc::new(FnAlgorithm::fixed("gather", true)))
            .with_barrier(
                "gather",
                vec!["prod_a".to_string(), "prod_b".to_string()],
                vec!["consumer".to_string()],
            );

        let order = resolve(&graph, &[], &["gather".to_string()], &broker).unwrap();
        assert_eq!(order.edges().len(), 2);
        assert!(position(&graph, &order, "prod_a") < position(&graph, &order, "consumer"));
        assert!(position(&graph, &order, "prod_b") < position(&graph, &order, "consumer"));
    }

    #[test]
    fn test_cycle_fails_deterministically() {
        let graph = NodeGraph::from_definitions(&[def(
            "root",
            CombinatorKind::NonlazyAnd,
            &["a", "b"],
            false,
        )])
        .unwrap();
        let explicit = [edge("a", "b"), edge("b", "a")];

        for _ in 0..3 {
            let err = resolve(&graph, &explicit, &[], &MappingBroker::new()).unwrap_err();
            match err {
                SchedulerError::Configuration(msg) => assert!(msg.contains("cycle")),
                other => panic!("expected configuration error, got {other}"),
            }
        }
    }

    #[test]
    fn test_unknown_explicit_endpoint_fails() {
        let graph = NodeGraph::from_definitions(&[def(
            "root",
            CombinatorKind::LazyAnd,
            &["a"],
            false,
        )])
        .unwrap();
        let err = resolve(&graph, &[edge("a", "ghost")], &[], &MappingBroker::new()).unwrap_err();
        assert!(matches!(err, SchedulerError::Configuration(_)));
    }

    #[test]
    fn test_order_is_a_valid_linear_extension() {
        let graph = NodeGraph::from_definitions(&[
            def("root", CombinatorKind::LazyAnd, &["first", "rest"], true),
            def("rest", CombinatorKind::NonlazyOr, &["x", "y", "z"], false),
        ])
        .unwrap();
        let order = resolve(&graph, &[edge("z", "x")], &[], &MappingBroker::new()).unwrap();

        for e in order.edges() {
            for &from in &e.from {
                for &to in &e.to {
                    if from == to {
                        continue;
                    }
                    let pf = order.leaves().iter().position(|&l| l == from).unwrap();
                    let pt = order.leaves().iter().position(|&l| l == to).unwrap();
                    assert!(pf < pt, "edge violated: {from} before {to}");
                }
            }
        }
    }
}
