//! Per-event decision reports and diagnostic rendering
//!
//! Downstream consumers (monitoring, decision-report writers) receive one
//! [`EventReport`] per finished event: a serializable snapshot of the
//! NodeState vector keyed by event id. For debugging, [`render_tree`]
//! produces the human-readable indented control-flow tree the driver logs at
//! a configurable frequency:
//!
//! ```text
//! LAZY_AND(trigger, counter=0, passed=true)
//!   leaf(prefilter, counter=0, passed=true)
//!   NONLAZY_OR(lines, counter=0, passed=true)
//!     leaf(line_a, counter=0, passed=false)
//!     leaf(line_b, counter=0, passed=true)
//! ```

use crate::algorithm::EventContext;
use crate::executor::EventOutcome;
use crate::graph::{NodeGraph, NodeIndex, VNode};
use crate::state::NodeState;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// Snapshot of one node's final state, keyed by name for consumers that do
/// not hold the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStateRecord {
    /// Node name
    pub name: String,
    /// Final execution counter (0 means the node settled)
    pub execution_counter: u32,
    /// Final decision flag
    pub passed: bool,
}

/// Written record of one finished event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventReport {
    /// Event id
    pub event_id: u64,
    /// Whiteboard slot the event occupied
    pub slot: usize,
    /// The root node's decision
    pub passed: bool,
    /// Whether the event was marked fatally failed
    pub failed: bool,
    /// Final per-node states in arena order
    pub node_states: Vec<NodeStateRecord>,
}

impl EventReport {
    /// Build a report from a finished event's outcome.
    pub fn new(graph: &NodeGraph, ctx: &EventContext, outcome: &EventOutcome) -> Self {
        let node_states = graph
            .nodes()
            .map(|node| {
                let state = outcome.node_states[node.index()];
                NodeStateRecord {
                    name: node.name().to_string(),
                    execution_counter: state.execution_counter,
                    passed: state.passed,
                }
            })
            .collect();
        Self {
            event_id: ctx.event_id,
            slot: ctx.slot,
            passed: outcome.passed,
            failed: outcome.failed(),
            node_states,
        }
    }
}

/// Render the control-flow tree with live counters, one node per line,
/// children indented below their parent.
pub fn render_tree(graph: &NodeGraph, states: &[NodeState]) -> String {
    let mut out = String::new();
    render_node(graph, states, graph.root(), 0, &mut out);
    out
}

fn render_node(
    graph: &NodeGraph,
    states: &[NodeState],
    index: NodeIndex,
    depth: usize,
    out: &mut String,
) {
    let state = states[index];
    let indent = "  ".repeat(depth);
    match graph.node(index) {
        VNode::Basic(n) => {
            let _ = writeln!(
                out,
                "{indent}leaf({}, counter={}, passed={})",
                n.name, state.execution_counter, state.passed
            );
        }
        VNode::Composite(c) => {
            let _ = writeln!(
                out,
                "{indent}{}({}, counter={}, passed={})",
                c.kind, c.name, state.execution_counter, state.passed
            );
            for &child in &c.children {
                render_node(graph, states, child, depth + 1, out);
            }
        }
    }
}
