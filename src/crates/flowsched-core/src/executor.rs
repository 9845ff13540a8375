//! Per-event control-flow execution
//!
//! [`EventExecutor`] drives one event through the resolved leaf order. The
//! walk is single-threaded and strictly sequential within an event; leaves
//! are visited exactly once, in the statically resolved order, with no
//! backtracking.
//!
//! # Per-leaf protocol
//!
//! ```text
//! for leaf in execution order:
//!     requested?  ──no──► skip
//!        │yes
//!        ▼
//!     run required algorithms (memoized through AlgState)
//!        │
//!        ▼
//!     settle leaf (counter → 0, passed = last algorithm's filter decision)
//!        │
//!        ▼
//!     notify parents, recursively, until a settled or terminal ancestor
//! ```
//!
//! A node is *requested* iff it is the root or any parent is still active
//! (counter ≠ 0 and itself requested). The predicate is evaluated top-down,
//! fresh, every time a leaf is visited; it is never cached, because lazy
//! ancestors can settle between visits.
//!
//! An algorithm failure marks the whole event as failed and aborts the rest
//! of that leaf's algorithm list; the leaf still settles with whatever
//! partial state was reached and propagation continues, so the decision
//! snapshot stays internally consistent.

use crate::algorithm::{AlgorithmTable, EventContext};
use crate::error::SchedulerError;
use crate::graph::{AlgIndex, CombinatorKind, NodeGraph, NodeIndex, VNode};
use crate::resolver::ExecutionOrder;
use crate::state::{alg_state_template, node_state_template, AlgState, NodeState};
use std::sync::Arc;

/// Final scheduling state of one event.
#[derive(Debug)]
pub struct EventOutcome {
    /// Per-node state snapshot at event end
    pub node_states: Vec<NodeState>,
    /// Per-algorithm state snapshot at event end
    pub alg_states: Vec<AlgState>,
    /// The root node's decision
    pub passed: bool,
    /// First failure observed, if the event was marked failed
    pub error: Option<SchedulerError>,
}

impl EventOutcome {
    /// Whether the event was marked fatally failed.
    pub fn failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Executes single events against the immutable graph, order, and algorithm
/// table.
///
/// The executor itself is stateless between events: per-event tables are
/// copied from templates at the start of [`run_event`](Self::run_event) and
/// returned in the [`EventOutcome`]. One executor is shared (behind `Arc`)
/// across all event tasks.
pub struct EventExecutor {
    graph: Arc<NodeGraph>,
    order: Arc<ExecutionOrder>,
    algorithms: Arc<AlgorithmTable>,
    always_run: Vec<AlgIndex>,
    node_template: Vec<NodeState>,
    alg_template: Vec<AlgState>,
}

impl EventExecutor {
    /// Build an executor from resolved configuration parts.
    ///
    /// `always_run` lists algorithm-table indices executed unconditionally,
    /// in order, before the control-flow walk of every event.
    pub fn new(
        graph: Arc<NodeGraph>,
        order: Arc<ExecutionOrder>,
        algorithms: Arc<AlgorithmTable>,
        always_run: Vec<AlgIndex>,
    ) -> Self {
        let node_template = node_state_template(&graph);
        let alg_template = alg_state_template(algorithms.len());
        Self {
            graph,
            order,
            algorithms,
            always_run,
            node_template,
            alg_template,
        }
    }

    /// The shared node graph.
    pub fn graph(&self) -> &Arc<NodeGraph> {
        &self.graph
    }

    /// The resolved execution order.
    pub fn order(&self) -> &Arc<ExecutionOrder> {
        &self.order
    }

    /// Run one event to completion.
    pub async fn run_event(&self, ctx: &EventContext) -> EventOutcome {
        let mut node_states = self.node_template.clone();
        let mut alg_states = self.alg_template.clone();
        let mut error = None;

        tracing::debug!(event = ctx.event_id, slot = ctx.slot, "event started");

        // Unconditional algorithms run exactly once each, independent of the
        // node graph. A failure here fails the event before the walk begins.
        for &alg in &self.always_run {
            if alg_states[alg].executed {
                continue;
            }
            if let Err(e) = self.invoke(alg, ctx, &mut alg_states).await {
                error = Some(e);
                break;
            }
        }

        if error.is_none() {
            for &leaf in self.order.leaves() {
                if !self.requested(&node_states, leaf) {
                    continue;
                }
                if let Some(e) = self
                    .run_leaf(leaf, ctx, &mut node_states, &mut alg_states)
                    .await
                {
                    error.get_or_insert(e);
                }
            }
        }

        let passed = node_states[self.graph.root()].passed;
        tracing::debug!(
            event = ctx.event_id,
            passed,
            failed = error.is_some(),
            "event finished"
        );

        EventOutcome {
            node_states,
            alg_states,
            passed,
            error,
        }
    }

    /// Whether a node is eligible to execute this event: it is the root, or
    /// reachable through a chain of still-pending ancestors.
    fn requested(&self, states: &[NodeState], index: NodeIndex) -> bool {
        let parents = self.graph.node(index).parents();
        if parents.is_empty() {
            return true;
        }
        parents
            .iter()
            .any(|&p| states[p].execution_counter != 0 && self.requested(states, p))
    }

    async fn invoke(
        &self,
        alg: AlgIndex,
        ctx: &EventContext,
        alg_states: &mut [AlgState],
    ) -> Result<(), SchedulerError> {
        let algorithm = self.algorithms.get(alg);
        match algorithm.execute(ctx).await {
            Ok(outcome) => {
                alg_states[alg] = AlgState {
                    executed: true,
                    filter_passed: outcome.filter_passed,
                };
                Ok(())
            }
            Err(e) => {
                tracing::error!(
                    event = ctx.event_id,
                    algorithm = %algorithm.name(),
                    error = %e,
                    "algorithm failed; event marked failed"
                );
                Err(SchedulerError::event_failed(
                    ctx.event_id,
                    format!("algorithm '{}' failed: {}", algorithm.name(), e),
                ))
            }
        }
    }

    /// Execute a leaf's required algorithms, settle it, and propagate.
    ///
    /// Returns the event failure if an algorithm failed; the leaf settles and
    /// propagates either way.
    async fn run_leaf(
        &self,
        leaf: NodeIndex,
        ctx: &EventContext,
        node_states: &mut [NodeState],
        alg_states: &mut [AlgState],
    ) -> Option<SchedulerError> {
        let VNode::Basic(node) = self.graph.node(leaf) else {
            return None;
        };

        let mut error = None;
        for &alg in &node.required {
            if alg_states[alg].executed {
                continue;
            }
            if let Err(e) = self.invoke(alg, ctx, alg_states).await {
                error = Some(e);
                break;
            }
        }

        // The node's own decision is the filter decision of the last required
        // algorithm; on failure this is whatever partial state was reached.
        let passed = node
            .required
            .last()
            .map(|&alg| alg_states[alg].filter_passed)
            .unwrap_or(true);
        node_states[leaf].execution_counter = 0;
        node_states[leaf].passed = passed;
        tracing::trace!(event = ctx.event_id, node = %node.name, passed, "leaf settled");

        self.notify_parents(leaf, passed, node_states);
        error
    }

    /// Propagate a settled child's decision upward.
    ///
    /// A parent processes the notification only while its own counter is
    /// non-zero; an already-settled (e.g. short-circuited) parent silently
    /// ignores it. Settling a parent recurses into its own parents, so one
    /// leaf visit can settle multiple ancestors.
    fn notify_parents(&self, child: NodeIndex, child_passed: bool, states: &mut [NodeState]) {
        for &parent in self.graph.node(child).parents() {
            if states[parent].execution_counter == 0 {
                continue;
            }
            let VNode::Composite(c) = self.graph.node(parent) else {
                continue;
            };

            let settled = match c.kind {
                CombinatorKind::LazyAnd => {
                    if !child_passed {
                        // Short-circuit: remaining children are never visited.
                        states[parent].execution_counter = 0;
                        states[parent].passed = false;
                        Some(false)
                    } else {
                        states[parent].execution_counter -= 1;
                        if states[parent].execution_counter == 0 {
                            states[parent].passed = true;
                            Some(true)
                        } else {
                            None
                        }
                    }
                }
                CombinatorKind::LazyOr => {
                    if child_passed {
                        states[parent].execution_counter = 0;
                        states[parent].passed = true;
                        Some(true)
                    } else {
                        states[parent].execution_counter -= 1;
                        if states[parent].execution_counter == 0 {
                            states[parent].passed = false;
                            Some(false)
                        } else {
                            None
                        }
                    }
                }
                CombinatorKind::NonlazyAnd => {
                    states[parent].execution_counter -= 1;
                    if states[parent].execution_counter == 0 {
                        let passed = c.children.iter().all(|&ch| states[ch].passed);
                        states[parent].passed = passed;
                        Some(passed)
                    } else {
                        None
                    }
                }
                CombinatorKind::NonlazyOr => {
                    states[parent].execution_counter -= 1;
                    if states[parent].execution_counter == 0 {
                        let passed = c.children.iter().any(|&ch| states[ch].passed);
                        states[parent].passed = passed;
                        Some(passed)
                    } else {
                        None
                    }
                }
                CombinatorKind::Not => {
                    states[parent].execution_counter -= 1;
                    let passed = !child_passed;
                    states[parent].passed = passed;
                    Some(passed)
                }
            };

            if let Some(parent_passed) = settled {
                self.notify_parents(parent, parent_passed, states);
            }
        }
    }
}
