//! Scheduler assembly
//!
//! [`Scheduler::build`] is the one-time configuration pass: it validates the
//! declarative [`SchedulerConfig`], constructs the node graph, resolves leaf
//! algorithm requirements through the [`DataBroker`], derives ordering edges
//! and the leaf execution order, and produces the shared, immutable
//! [`EventExecutor`]. Everything after `build` is read-only and freely
//! shared across event threads.
//!
//! ```text
//! SchedulerConfig ──► validate ──► NodeGraph ──► AlgorithmTable
//!        │                             │              │
//!        │          DataBroker ────────┴──────────────┤
//!        │                                            ▼
//!        └──────────────► resolver ──► ExecutionOrder │
//!                                            │        │
//!                                            ▼        ▼
//!                                         EventExecutor
//! ```
//!
//! # Examples
//!
//! ```rust,no_run
//! use flowsched_core::{
//!     FnAlgorithm, MappingBroker, Scheduler, SchedulerConfig, SequentialEventSource,
//! };
//! use std::sync::Arc;
//!
//! # async fn run() -> flowsched_core::Result<()> {
//! let config = SchedulerConfig::from_file("trigger.yaml")?;
//! let broker = MappingBroker::new()
//!     .with_algorithm(Arc::new(FnAlgorithm::fixed("prefilter", true)));
//!
//! let scheduler = Scheduler::build(config, &broker)?;
//! let summary = scheduler.run(SequentialEventSource::new(1000)).await?;
//! println!("passed {} of {}", summary.reports.iter().filter(|r| r.passed).count(),
//!          summary.events_processed);
//! # Ok(())
//! # }
//! ```

use crate::algorithm::{AlgorithmTable, DataBroker};
use crate::config::SchedulerConfig;
use crate::driver::{RunSummary, SchedulingDriver};
use crate::error::Result;
use crate::executor::EventExecutor;
use crate::graph::{AlgIndex, NodeGraph, NodeIndex, VNode};
use crate::resolver;
use crate::whiteboard::{EventSource, InMemoryWhiteboard, Whiteboard};
use std::sync::Arc;

/// A fully assembled, immutable scheduler.
pub struct Scheduler {
    config: SchedulerConfig,
    executor: Arc<EventExecutor>,
}

impl Scheduler {
    /// Run the full configuration pass.
    ///
    /// # Errors
    ///
    /// Any configuration error is fatal: invalid declarative config,
    /// malformed graph structure (NOT arity, duplicate names, no unique
    /// root), unresolvable algorithm requirements, or a cycle in the derived
    /// control-flow edges. There is no partial-success mode.
    pub fn build(config: SchedulerConfig, broker: &dyn DataBroker) -> Result<Self> {
        config.validate()?;
        let mut graph = NodeGraph::from_definitions(&config.nodes)?;
        let mut table = AlgorithmTable::new();

        // Resolve every leaf's required algorithms, deduplicating into the
        // global table so shared requirements memoize per event.
        let leaf_indices: Vec<NodeIndex> = graph.leaf_indices().collect();
        for leaf in leaf_indices {
            let name = graph.node(leaf).name().to_string();
            let required: Vec<AlgIndex> = broker
                .algorithms_for_node(&name, &config.barrier_algorithms)?
                .into_iter()
                .map(|a| table.intern(a))
                .collect();
            if required.is_empty() {
                tracing::warn!(node = %name, "leaf node resolves to no algorithms");
            }
            if let VNode::Basic(node) = graph.node_mut(leaf) {
                node.required = required;
            }
        }

        // Unconditionally-run algorithms, with their transitive requirements
        // expanded by the broker.
        let mut always_run: Vec<AlgIndex> = Vec::new();
        for name in &config.always_run {
            for algorithm in broker.algorithms_for_algorithm(name)? {
                always_run.push(table.intern(algorithm));
            }
        }

        let graph = Arc::new(graph);
        let order = Arc::new(resolver::resolve(
            &graph,
            &config.edges,
            &config.barrier_algorithms,
            broker,
        )?);

        tracing::info!(
            nodes = graph.len(),
            algorithms = table.len(),
            leaves = order.leaves().len(),
            "scheduler configured"
        );

        let executor = Arc::new(EventExecutor::new(
            graph,
            order,
            Arc::new(table),
            always_run,
        ));
        Ok(Self { config, executor })
    }

    /// The configuration this scheduler was built from.
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// The shared per-event executor.
    pub fn executor(&self) -> &Arc<EventExecutor> {
        &self.executor
    }

    /// A driver over a fresh in-memory whiteboard sized from the
    /// configuration.
    pub fn driver(&self) -> SchedulingDriver {
        let whiteboard = Arc::new(InMemoryWhiteboard::new(self.config.slot_count()));
        self.driver_with_whiteboard(whiteboard)
    }

    /// A driver over an externally provided whiteboard.
    pub fn driver_with_whiteboard(&self, whiteboard: Arc<dyn Whiteboard>) -> SchedulingDriver {
        SchedulingDriver::new(self.executor.clone(), whiteboard, &self.config)
    }

    /// Convenience: build a driver and process `source` to completion.
    pub async fn run(&self, source: impl EventSource) -> Result<RunSummary> {
        self.driver().run(source).await
    }
}
