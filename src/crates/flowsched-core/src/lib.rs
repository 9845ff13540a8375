//! # flowsched-core - Event-Level Control-Flow Scheduling
//!
//! A scheduler for trigger-style event processing: a control-flow graph of
//! boolean combinator nodes (AND/OR/NOT, lazy or non-lazy) over leaf nodes
//! wrapping external algorithm invocations, resolved once into a linear leaf
//! execution order and driven per event across a bounded tokio task pool.
//!
//! ## Overview
//!
//! `flowsched-core` provides:
//!
//! - **Declarative configuration** - node definitions, explicit ordering
//!   edges, barrier algorithms, loadable from YAML or built in code
//! - **One-time dependency resolution** - leaf-closure edge derivation and a
//!   topological sort with deterministic cycle rejection
//! - **Per-event state machines** - execution counters and pass/fail flags
//!   per node, with short-circuiting lazy combinators and upward parent
//!   notification
//! - **Algorithm memoization** - an algorithm shared by several leaves runs
//!   at most once per event
//! - **Bounded cross-event concurrency** - one task per in-flight event,
//!   limited by free whiteboard slots; strictly sequential within an event
//! - **Decision reports** - a serializable per-event snapshot of every
//!   node's final state, plus an indented diagnostic tree
//!
//! ## Architecture
//!
//! ```text
//!   SchedulerConfig ──► Scheduler::build ──► EventExecutor (immutable, Arc-shared)
//!                          │                        ▲
//!                          │  NodeGraph             │ run_event(ctx), one task
//!                          │  ExecutionOrder        │ per in-flight event
//!                          │  AlgorithmTable        │
//!                          ▼                        │
//!                    SchedulingDriver ──────────────┘
//!                          │
//!                          ▼
//!              Whiteboard slots  +  EventSource
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use flowsched_core::{
//!     CombinatorKind, FnAlgorithm, MappingBroker, NodeDefinition, Scheduler,
//!     SchedulerConfig, SequentialEventSource,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> flowsched_core::Result<()> {
//!     let config = SchedulerConfig {
//!         nodes: vec![NodeDefinition {
//!             name: "trigger".to_string(),
//!             kind: CombinatorKind::LazyAnd,
//!             children: vec!["prefilter".to_string(), "line_a".to_string()],
//!             ordered: true,
//!         }],
//!         ..SchedulerConfig::default()
//!     };
//!
//!     let broker = MappingBroker::new()
//!         .with_algorithm(Arc::new(FnAlgorithm::fixed("prefilter", true)))
//!         .with_algorithm(Arc::new(FnAlgorithm::fixed("line_a", true)));
//!
//!     let scheduler = Scheduler::build(config, &broker)?;
//!     let summary = scheduler.run(SequentialEventSource::new(10)).await?;
//!     assert_eq!(summary.events_processed, 10);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`config`] - Declarative configuration ([`SchedulerConfig`], [`NodeDefinition`])
//! - [`graph`] - Node arena and closed node variant ([`NodeGraph`], [`VNode`])
//! - [`resolver`] - Edge derivation and topological sort ([`ExecutionOrder`])
//! - [`state`] - Per-event state tables ([`NodeState`], [`AlgState`])
//! - [`algorithm`] - Collaborator contracts ([`Algorithm`], [`DataBroker`])
//! - [`executor`] - Per-event control-flow walk ([`EventExecutor`])
//! - [`driver`] - Bounded-concurrency run loop ([`SchedulingDriver`])
//! - [`whiteboard`] - Slot pool and event source seams
//! - [`report`] - Decision reports and the diagnostic tree
//! - [`error`] - Error taxonomy ([`SchedulerError`])
//!
//! ## Concurrency Model
//!
//! The node graph, derived edges, and execution order are immutable after
//! [`Scheduler::build`] and shared across all event tasks without locking.
//! Per-event `NodeState`/`AlgState` tables are copied from templates at
//! event start and never shared across events. The whiteboard slot pool and
//! the finished-event counter are the only cross-thread mutable state,
//! guarded by a mutex/notify pair in the driver.

pub mod algorithm;
pub mod config;
pub mod driver;
pub mod error;
pub mod executor;
pub mod graph;
pub mod report;
pub mod resolver;
pub mod scheduler;
pub mod state;
pub mod whiteboard;

// Re-export main types
pub use algorithm::{AlgOutcome, Algorithm, AlgorithmTable, DataBroker, EventContext, FnAlgorithm, MappingBroker};
pub use config::{EdgeDefinition, NodeDefinition, SchedulerConfig};
pub use driver::{RunSummary, SchedulingDriver};
pub use error::{Result, SchedulerError};
pub use executor::{EventExecutor, EventOutcome};
pub use graph::{AlgIndex, BasicNode, CombinatorKind, CompositeNode, NodeGraph, NodeIndex, VNode};
pub use report::{render_tree, EventReport, NodeStateRecord};
pub use resolver::{Edge, EdgeOrigin, ExecutionOrder};
pub use scheduler::Scheduler;
pub use state::{AlgState, NodeState};
pub use whiteboard::{
    EventAddress, EventSource, InMemoryWhiteboard, SequentialEventSource, Whiteboard,
};
