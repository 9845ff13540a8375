//! Algorithm invocation contract and collaborator interfaces
//!
//! The scheduler never runs physics code itself; it drives external
//! *algorithms* through a narrow contract:
//!
//! - [`Algorithm`]: one invocation per (algorithm, event) pair, returning a
//!   filter decision or an error. Implementations must be safely re-entrant
//!   across concurrent event contexts (different slots); the scheduler
//!   guarantees it never invokes the same algorithm twice for one event.
//! - [`DataBroker`]: resolves which algorithms a leaf node must run (in an
//!   order the resolver treats as significant), the transitive requirements
//!   of unconditionally-run algorithms, and the producer/consumer relations
//!   of barrier algorithms.
//!
//! [`AlgorithmTable`] deduplicates algorithms by name into a dense table so
//! per-event memoization ([`AlgState`](crate::state::AlgState)) is a flat
//! index lookup.

use crate::error::{Result, SchedulerError};
use crate::graph::AlgIndex;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Identity of the event an algorithm invocation belongs to.
///
/// Carries the event id and the whiteboard slot the event's data lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventContext {
    /// Monotonic event id assigned by the event source
    pub event_id: u64,
    /// Whiteboard slot allocated to this event
    pub slot: usize,
}

/// Result of a successful algorithm invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlgOutcome {
    /// The algorithm's filter decision for this event
    pub filter_passed: bool,
}

/// External algorithm invocation contract.
///
/// `execute` is called at most once per (algorithm, event) pair; an `Err`
/// marks the whole event as failed. Implementations may be invoked
/// concurrently for *different* events.
#[async_trait]
pub trait Algorithm: Send + Sync {
    /// Unique algorithm name, used for deduplication and diagnostics.
    fn name(&self) -> &str;

    /// Run the algorithm for one event.
    async fn execute(&self, ctx: &EventContext) -> Result<AlgOutcome>;
}

type AlgFn = Arc<dyn Fn(EventContext) -> BoxFuture<'static, Result<AlgOutcome>> + Send + Sync>;

/// [`Algorithm`] adapter wrapping a closure.
///
/// # Examples
///
/// ```rust
/// use flowsched_core::algorithm::{AlgOutcome, FnAlgorithm};
///
/// // An algorithm that always passes its filter.
/// let alg = FnAlgorithm::fixed("prefilter", true);
///
/// // Arbitrary async logic.
/// let alg = FnAlgorithm::new("tracker", |ctx| {
///     Box::pin(async move {
///         Ok(AlgOutcome { filter_passed: ctx.event_id % 2 == 0 })
///     })
/// });
/// ```
#[derive(Clone)]
pub struct FnAlgorithm {
    name: String,
    func: AlgFn,
}

impl FnAlgorithm {
    /// Wrap a closure as an algorithm.
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(EventContext) -> BoxFuture<'static, Result<AlgOutcome>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    /// An algorithm that always succeeds with a fixed filter decision.
    pub fn fixed(name: impl Into<String>, filter_passed: bool) -> Self {
        Self::new(name, move |_ctx| {
            Box::pin(async move { Ok(AlgOutcome { filter_passed }) })
        })
    }
}

impl fmt::Debug for FnAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnAlgorithm")
            .field("name", &self.name)
            .field("func", &"<function>")
            .finish()
    }
}

#[async_trait]
impl Algorithm for FnAlgorithm {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &EventContext) -> Result<AlgOutcome> {
        (self.func)(*ctx).await
    }
}

/// Resolves control-flow nodes and always-run entries to the algorithms they
/// require, and reports barrier producer/consumer relations.
///
/// The order of returned algorithm lists is significant: the last algorithm
/// for a leaf node is that node's own decision algorithm.
pub trait DataBroker: Send + Sync {
    /// Algorithms a leaf node must run, in execution order.
    ///
    /// `barriers` lists the configured barrier (gather) algorithm names, so
    /// brokers can prune optional upstream inputs from ordinary data
    /// dependencies.
    fn algorithms_for_node(
        &self,
        node_name: &str,
        barriers: &[String],
    ) -> Result<Vec<Arc<dyn Algorithm>>>;

    /// Transitive requirements of one algorithm (including itself, last), for
    /// resolving the unconditionally-run list.
    fn algorithms_for_algorithm(&self, algorithm_name: &str) -> Result<Vec<Arc<dyn Algorithm>>>;

    /// Control-flow node names that produce optional inputs gathered by a
    /// barrier algorithm.
    fn producers_for(&self, barrier_name: &str) -> Vec<String>;

    /// Control-flow node names that consume a barrier algorithm's output.
    fn consumers_of(&self, barrier_name: &str) -> Vec<String>;
}

/// A [`DataBroker`] built from explicit maps, for embedding the scheduler
/// without a full framework data broker.
///
/// Registered algorithms are looked up by name. A leaf node with no explicit
/// requirement list falls back to the single registered algorithm of the same
/// name, mirroring the common case of one decision algorithm per line.
#[derive(Default)]
pub struct MappingBroker {
    algorithms: HashMap<String, Arc<dyn Algorithm>>,
    node_requirements: HashMap<String, Vec<String>>,
    alg_requirements: HashMap<String, Vec<String>>,
    barrier_producers: HashMap<String, Vec<String>>,
    barrier_consumers: HashMap<String, Vec<String>>,
}

impl MappingBroker {
    /// Create an empty broker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an algorithm under its own name.
    pub fn with_algorithm(mut self, algorithm: Arc<dyn Algorithm>) -> Self {
        self.algorithms
            .insert(algorithm.name().to_string(), algorithm);
        self
    }

    /// Declare the ordered requirement list of a leaf node.
    pub fn with_node_requirements(
        mut self,
        node: impl Into<String>,
        algorithms: Vec<String>,
    ) -> Self {
        self.node_requirements.insert(node.into(), algorithms);
        self
    }

    /// Declare the transitive requirement list of an algorithm (for the
    /// always-run list). The algorithm itself is appended automatically.
    pub fn with_algorithm_requirements(
        mut self,
        algorithm: impl Into<String>,
        upstream: Vec<String>,
    ) -> Self {
        self.alg_requirements.insert(algorithm.into(), upstream);
        self
    }

    /// Declare a barrier algorithm's upstream producer nodes and downstream
    /// consumer nodes.
    pub fn with_barrier(
        mut self,
        barrier: impl Into<String>,
        producers: Vec<String>,
        consumers: Vec<String>,
    ) -> Self {
        let barrier = barrier.into();
        self.barrier_producers.insert(barrier.clone(), producers);
        self.barrier_consumers.insert(barrier, consumers);
        self
    }

    fn lookup(&self, name: &str) -> Result<Arc<dyn Algorithm>> {
        self.algorithms.get(name).cloned().ok_or_else(|| {
            SchedulerError::Configuration(format!("no algorithm registered under '{}'", name))
        })
    }
}

impl DataBroker for MappingBroker {
    fn algorithms_for_node(
        &self,
        node_name: &str,
        _barriers: &[String],
    ) -> Result<Vec<Arc<dyn Algorithm>>> {
        match self.node_requirements.get(node_name) {
            Some(names) => names.iter().map(|n| self.lookup(n)).collect(),
            None => Ok(vec![self.lookup(node_name)?]),
        }
    }

    fn algorithms_for_algorithm(&self, algorithm_name: &str) -> Result<Vec<Arc<dyn Algorithm>>> {
        let mut algorithms = match self.alg_requirements.get(algorithm_name) {
            Some(names) => names
                .iter()
                .map(|n| self.lookup(n))
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };
        algorithms.push(self.lookup(algorithm_name)?);
        Ok(algorithms)
    }

    fn producers_for(&self, barrier_name: &str) -> Vec<String> {
        self.barrier_producers
            .get(barrier_name)
            .cloned()
            .unwrap_or_default()
    }

    fn consumers_of(&self, barrier_name: &str) -> Vec<String> {
        self.barrier_consumers
            .get(barrier_name)
            .cloned()
            .unwrap_or_default()
    }
}

/// Dense, name-deduplicated table of all algorithms known to one scheduler.
///
/// Indices into this table double as indices into the per-event
/// [`AlgState`](crate::state::AlgState) table.
#[derive(Default)]
pub struct AlgorithmTable {
    algorithms: Vec<Arc<dyn Algorithm>>,
    by_name: HashMap<String, AlgIndex>,
}

impl AlgorithmTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern an algorithm, returning its dense index. Algorithms are
    /// deduplicated by name; re-interning a known name returns the existing
    /// index.
    pub fn intern(&mut self, algorithm: Arc<dyn Algorithm>) -> AlgIndex {
        if let Some(&index) = self.by_name.get(algorithm.name()) {
            return index;
        }
        let index = self.algorithms.len();
        self.by_name.insert(algorithm.name().to_string(), index);
        self.algorithms.push(algorithm);
        index
    }

    /// Algorithm by table index.
    pub fn get(&self, index: AlgIndex) -> &Arc<dyn Algorithm> {
        &self.algorithms[index]
    }

    /// Look up an algorithm index by name.
    pub fn index_of(&self, name: &str) -> Option<AlgIndex> {
        self.by_name.get(name).copied()
    }

    /// Number of deduplicated algorithms.
    pub fn len(&self) -> usize {
        self.algorithms.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.algorithms.is_empty()
    }
}

impl fmt::Debug for AlgorithmTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.algorithms.iter().map(|a| a.name()).collect();
        f.debug_struct("AlgorithmTable")
            .field("algorithms", &names)
            .finish()
    }
}
