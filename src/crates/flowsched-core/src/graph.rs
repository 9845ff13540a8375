//! Control-flow node graph
//!
//! The graph is an arena of control-flow nodes built once at configuration
//! time and shared read-only across all events and threads. Nodes come in a
//! closed set of variants:
//!
//! - **Leaf** ([`BasicNode`]): wraps an ordered list of required algorithm
//!   invocations; the last entry is the node's own decision algorithm.
//! - **Composite** ([`CompositeNode`]): combines child results with a boolean
//!   combinator ([`CombinatorKind`]), lazily or non-lazily.
//!
//! # Structure
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                  NodeGraph                       │
//! │                                                  │
//! │   LAZY_AND(trigger)            ← unique root     │
//! │    ├── prefilter               ← leaf            │
//! │    └── NONLAZY_OR(lines)                         │
//! │         ├── line_a             ← leaf            │
//! │         └── line_b             ← leaf            │
//! │                                                  │
//! │   nodes: Vec<VNode>  (arena, dense indices)      │
//! │   parents: back-references by index, no owners   │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! Parent/child relations are plain [`NodeIndex`] values into the arena, so
//! the mutual references of a tree with upward notification never form an
//! ownership cycle. The index doubles as the node's position in the per-event
//! [`NodeState`](crate::state::NodeState) table.

use crate::config::NodeDefinition;
use crate::error::{Result, SchedulerError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Dense index of a node in the graph arena and the per-event state table.
pub type NodeIndex = usize;

/// Dense index of a deduplicated algorithm in the algorithm table.
pub type AlgIndex = usize;

/// Boolean combinator kinds for composite nodes.
///
/// Lazy combinators short-circuit: they stop requesting further children as
/// soon as the overall result is determined. Non-lazy combinators always
/// request every child and only combine results once all children have
/// settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CombinatorKind {
    /// Passes iff all children pass; fails fast on the first failing child
    LazyAnd,
    /// Passes iff any child passes; passes fast on the first passing child
    LazyOr,
    /// Passes iff all children pass; every child always runs
    NonlazyAnd,
    /// Passes iff any child passes; every child always runs
    NonlazyOr,
    /// Inverts its single child's result
    Not,
}

impl fmt::Display for CombinatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CombinatorKind::LazyAnd => "LAZY_AND",
            CombinatorKind::LazyOr => "LAZY_OR",
            CombinatorKind::NonlazyAnd => "NONLAZY_AND",
            CombinatorKind::NonlazyOr => "NONLAZY_OR",
            CombinatorKind::Not => "NOT",
        };
        write!(f, "{}", s)
    }
}

/// Leaf node: the unit of actual work.
///
/// `required` is filled in after graph construction, once the data broker has
/// resolved which algorithms this node needs (deduplicated against the global
/// algorithm table). The last entry is this node's own decision algorithm;
/// its filter decision becomes the node's `passed`.
#[derive(Debug, Clone)]
pub struct BasicNode {
    /// Unique node name
    pub name: String,
    /// Arena index of this node
    pub index: NodeIndex,
    /// Ordered required algorithm invocations, as algorithm-table indices
    pub required: Vec<AlgIndex>,
    /// Back-references to parent composites (relation only, no ownership)
    pub parents: Vec<NodeIndex>,
}

/// Composite node: combines child decisions with a boolean combinator.
#[derive(Debug, Clone)]
pub struct CompositeNode {
    /// Unique node name
    pub name: String,
    /// Arena index of this node
    pub index: NodeIndex,
    /// Combinator kind
    pub kind: CombinatorKind,
    /// Ordered child node indices
    pub children: Vec<NodeIndex>,
    /// Back-references to parent composites
    pub parents: Vec<NodeIndex>,
    /// Whether adjacent children carry implicit ordering edges
    pub ordered: bool,
}

/// Closed node variant. Combinator transition rules match exhaustively on
/// this, so adding a node kind is a compile-time-checked change.
#[derive(Debug, Clone)]
pub enum VNode {
    /// Leaf execution node
    Basic(BasicNode),
    /// Boolean combinator node
    Composite(CompositeNode),
}

impl VNode {
    /// Node name.
    pub fn name(&self) -> &str {
        match self {
            VNode::Basic(n) => &n.name,
            VNode::Composite(n) => &n.name,
        }
    }

    /// Arena index.
    pub fn index(&self) -> NodeIndex {
        match self {
            VNode::Basic(n) => n.index,
            VNode::Composite(n) => n.index,
        }
    }

    /// Parent back-references.
    pub fn parents(&self) -> &[NodeIndex] {
        match self {
            VNode::Basic(n) => &n.parents,
            VNode::Composite(n) => &n.parents,
        }
    }

    /// Whether this is a leaf execution node.
    pub fn is_leaf(&self) -> bool {
        matches!(self, VNode::Basic(_))
    }

    /// Initial execution counter for a fresh event: 1 for leaves, the child
    /// count for composites.
    pub fn initial_counter(&self) -> u32 {
        match self {
            VNode::Basic(_) => 1,
            VNode::Composite(n) => n.children.len() as u32,
        }
    }

    fn parents_mut(&mut self) -> &mut Vec<NodeIndex> {
        match self {
            VNode::Basic(n) => &mut n.parents,
            VNode::Composite(n) => &mut n.parents,
        }
    }
}

/// Immutable arena of control-flow nodes.
///
/// Built once from [`NodeDefinition`]s, then shared (behind `Arc`) across all
/// event tasks without locking. Construction fails on malformed `NOT` arity,
/// childless composites, duplicate definitions, a cyclic child relation, and
/// a missing or ambiguous root.
#[derive(Debug, Clone)]
pub struct NodeGraph {
    nodes: Vec<VNode>,
    by_name: HashMap<String, NodeIndex>,
    root: NodeIndex,
}

impl NodeGraph {
    /// Build the node graph from an ordered list of definitions.
    ///
    /// Each definition becomes a composite node; any child name without its
    /// own definition becomes an implicit leaf. Parent back-references are
    /// populated after every node exists.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Configuration`] if a composite has no
    /// children, a `NOT` node has other than exactly one child, a node name
    /// is defined twice, a node is its own descendant, or the graph has no
    /// unique root.
    pub fn from_definitions(definitions: &[NodeDefinition]) -> Result<Self> {
        let mut by_name: HashMap<String, NodeIndex> = HashMap::new();
        for (i, def) in definitions.iter().enumerate() {
            if by_name.insert(def.name.clone(), i).is_some() {
                return Err(SchedulerError::Configuration(format!(
                    "duplicate node definition '{}'",
                    def.name
                )));
            }
        }

        // Implicit leaves: child names with no definition of their own, in
        // discovery order after all composites.
        let mut nodes: Vec<VNode> = Vec::with_capacity(definitions.len());
        let mut next_index = definitions.len();
        for def in definitions {
            for child in &def.children {
                if !by_name.contains_key(child) {
                    by_name.insert(child.clone(), next_index);
                    next_index += 1;
                }
            }
        }

        for (i, def) in definitions.iter().enumerate() {
            // A childless composite starts pre-settled (counter 0) and never
            // notifies its parent, so the parent could never settle.
            if def.children.is_empty() {
                return Err(SchedulerError::Configuration(format!(
                    "composite node '{}' has no children",
                    def.name
                )));
            }
            if def.kind == CombinatorKind::Not && def.children.len() != 1 {
                return Err(SchedulerError::Configuration(format!(
                    "NOT node '{}' must have exactly one child, got {}",
                    def.name,
                    def.children.len()
                )));
            }
            let children = def
                .children
                .iter()
                .map(|name| {
                    by_name.get(name).copied().ok_or_else(|| {
                        SchedulerError::Configuration(format!(
                            "child '{}' of node '{}' cannot be resolved",
                            name, def.name
                        ))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            nodes.push(VNode::Composite(CompositeNode {
                name: def.name.clone(),
                index: i,
                kind: def.kind,
                children,
                parents: Vec::new(),
                ordered: def.ordered,
            }));
        }

        let mut leaf_names: Vec<(String, NodeIndex)> = by_name
            .iter()
            .filter(|(_, &idx)| idx >= definitions.len())
            .map(|(name, &idx)| (name.clone(), idx))
            .collect();
        leaf_names.sort_by_key(|(_, idx)| *idx);
        for (name, index) in leaf_names {
            nodes.push(VNode::Basic(BasicNode {
                name,
                index,
                required: Vec::new(),
                parents: Vec::new(),
            }));
        }

        check_acyclic(&nodes)?;

        // Wire parent back-references.
        let edges: Vec<(NodeIndex, NodeIndex)> = nodes
            .iter()
            .filter_map(|node| match node {
                VNode::Composite(c) => Some(c.children.iter().map(move |&ch| (c.index, ch))),
                VNode::Basic(_) => None,
            })
            .flatten()
            .collect();
        for (parent, child) in edges {
            nodes[child].parents_mut().push(parent);
        }

        let roots: Vec<NodeIndex> = nodes
            .iter()
            .filter(|n| n.parents().is_empty())
            .map(|n| n.index())
            .collect();
        let root = match roots.as_slice() {
            [single] => *single,
            [] => {
                return Err(SchedulerError::configuration(
                    "control-flow graph has no root node",
                ))
            }
            many => {
                let names: Vec<&str> = many.iter().map(|&i| nodes[i].name()).collect();
                return Err(SchedulerError::Configuration(format!(
                    "control-flow graph has more than one root: {}",
                    names.join(", ")
                )));
            }
        };

        Ok(Self {
            nodes,
            by_name,
            root,
        })
    }

    /// Number of nodes in the arena.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the arena is empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The unique root node index.
    pub fn root(&self) -> NodeIndex {
        self.root
    }

    /// Node by arena index.
    pub fn node(&self, index: NodeIndex) -> &VNode {
        &self.nodes[index]
    }

    pub(crate) fn node_mut(&mut self, index: NodeIndex) -> &mut VNode {
        &mut self.nodes[index]
    }

    /// Look up a node index by name.
    pub fn index_of(&self, name: &str) -> Option<NodeIndex> {
        self.by_name.get(name).copied()
    }

    /// Iterate all nodes in arena order.
    pub fn nodes(&self) -> impl Iterator<Item = &VNode> {
        self.nodes.iter()
    }

    /// Iterate indices of all leaf nodes in arena order.
    pub fn leaf_indices(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.nodes
            .iter()
            .filter(|n| n.is_leaf())
            .map(|n| n.index())
    }

    /// Transitive closure of leaf nodes reachable at or below `index`.
    ///
    /// Used by the dependency resolver to expand edge endpoints into leaf
    /// sets; the result is in depth-first child order.
    pub fn leaves_below(&self, index: NodeIndex) -> Vec<NodeIndex> {
        let mut leaves = Vec::new();
        self.collect_leaves(index, &mut leaves);
        leaves
    }

    fn collect_leaves(&self, index: NodeIndex, out: &mut Vec<NodeIndex>) {
        match &self.nodes[index] {
            VNode::Basic(n) => {
                if !out.contains(&n.index) {
                    out.push(n.index);
                }
            }
            VNode::Composite(c) => {
                for &child in &c.children {
                    self.collect_leaves(child, out);
                }
            }
        }
    }
}

/// Reject cycles in the child relation. The leaf-closure expansion and the
/// per-event requested predicate both recurse through children, so a node
/// that is its own descendant must fail at construction time.
fn check_acyclic(nodes: &[VNode]) -> Result<()> {
    // 0 = unvisited, 1 = on the current DFS path, 2 = finished.
    fn visit(nodes: &[VNode], index: NodeIndex, color: &mut [u8]) -> Result<()> {
        match color[index] {
            1 => {
                return Err(SchedulerError::Configuration(format!(
                    "node '{}' is its own descendant; the control-flow tree must be acyclic",
                    nodes[index].name()
                )))
            }
            2 => return Ok(()),
            _ => {}
        }
        color[index] = 1;
        if let VNode::Composite(c) = &nodes[index] {
            for &child in &c.children {
                visit(nodes, child, color)?;
            }
        }
        color[index] = 2;
        Ok(())
    }

    let mut color = vec![0u8; nodes.len()];
    for index in 0..nodes.len() {
        visit(nodes, index, &mut color)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeDefinition;

    fn def(name: &str, kind: CombinatorKind, children: &[&str], ordered: bool) -> NodeDefinition {
        NodeDefinition {
            name: name.to_string(),
            kind,
            children: children.iter().map(|c| c.to_string()).collect(),
            ordered,
        }
    }

    #[test]
    fn test_build_simple_tree() {
        let graph = NodeGraph::from_definitions(&[
            def("root", CombinatorKind::LazyAnd, &["a", "sub"], true),
            def("sub", CombinatorKind::NonlazyOr, &["b", "c"], false),
        ])
        .unwrap();

        assert_eq!(graph.len(), 5);
        assert_eq!(graph.node(graph.root()).name(), "root");
        assert_eq!(graph.leaf_indices().count(), 3);

        let sub = graph.index_of("sub").unwrap();
        assert_eq!(graph.node(sub).parents(), &[graph.root()]);
        let b = graph.index_of("b").unwrap();
        assert_eq!(graph.node(b).parents(), &[sub]);
    }

    #[test]
    fn test_initial_counters() {
        let graph = NodeGraph::from_definitions(&[def(
            "root",
            CombinatorKind::NonlazyAnd,
            &["a", "b", "c"],
            false,
        )])
        .unwrap();
        assert_eq!(graph.node(graph.root()).initial_counter(), 3);
        let a = graph.index_of("a").unwrap();
        assert_eq!(graph.node(a).initial_counter(), 1);
    }

    #[test]
    fn test_leaves_below() {
        let graph = NodeGraph::from_definitions(&[
            def("root", CombinatorKind::LazyAnd, &["a", "sub"], false),
            def("sub", CombinatorKind::LazyOr, &["b", "c"], false),
        ])
        .unwrap();
        let below_root: Vec<String> = graph
            .leaves_below(graph.root())
            .into_iter()
            .map(|i| graph.node(i).name().to_string())
            .collect();
        assert_eq!(below_root, vec!["a", "b", "c"]);

        let sub = graph.index_of("sub").unwrap();
        assert_eq!(graph.leaves_below(sub).len(), 2);
    }

    #[test]
    fn test_shared_child_deduplicated_in_closure() {
        let graph = NodeGraph::from_definitions(&[
            def("root", CombinatorKind::NonlazyAnd, &["x", "sub"], false),
            def("sub", CombinatorKind::LazyAnd, &["x", "y"], false),
        ])
        .unwrap();
        // "x" appears below root twice but the closure lists it once.
        assert_eq!(graph.leaves_below(graph.root()).len(), 2);
    }

    #[test]
    fn test_not_arity_enforced() {
        let err = NodeGraph::from_definitions(&[def(
            "veto",
            CombinatorKind::Not,
            &["a", "b"],
            false,
        )])
        .unwrap_err();
        assert!(matches!(err, SchedulerError::Configuration(_)));
    }

    #[test]
    fn test_composite_child_cycle_rejected() {
        // "a" is its own descendant through "b"; the graph still has a
        // unique root, so only the acyclicity check can catch this.
        let err = NodeGraph::from_definitions(&[
            def("root", CombinatorKind::NonlazyAnd, &["a", "x"], false),
            def("a", CombinatorKind::LazyAnd, &["b"], false),
            def("b", CombinatorKind::LazyAnd, &["a"], false),
        ])
        .unwrap_err();
        match err {
            SchedulerError::Configuration(msg) => assert!(msg.contains("descendant")),
            other => panic!("expected configuration error, got {other}"),
        }
    }

    #[test]
    fn test_self_referencing_node_rejected() {
        let err = NodeGraph::from_definitions(&[
            def("root", CombinatorKind::LazyAnd, &["loop", "x"], false),
            def("loop", CombinatorKind::LazyOr, &["loop"], false),
        ])
        .unwrap_err();
        assert!(matches!(err, SchedulerError::Configuration(_)));
    }

    #[test]
    fn test_multiple_roots_rejected() {
        let err = NodeGraph::from_definitions(&[
            def("r1", CombinatorKind::LazyAnd, &["a"], false),
            def("r2", CombinatorKind::LazyAnd, &["b"], false),
        ])
        .unwrap_err();
        assert!(matches!(err, SchedulerError::Configuration(_)));
    }

    #[test]
    fn test_duplicate_definition_rejected() {
        let err = NodeGraph::from_definitions(&[
            def("r", CombinatorKind::LazyAnd, &["a"], false),
            def("r", CombinatorKind::LazyOr, &["b"], false),
        ])
        .unwrap_err();
        assert!(matches!(err, SchedulerError::Configuration(_)));
    }
}
