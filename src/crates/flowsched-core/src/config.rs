//! Declarative scheduler configuration
//!
//! The scheduler's whole control-flow surface is configured from plain data:
//! a list of [`NodeDefinition`]s describing the composite node tree, plus the
//! barrier algorithm names, explicit ordering edges, unconditionally-run
//! algorithms, and run parameters. Configurations can be built
//! programmatically or loaded from YAML.
//!
//! # Example
//!
//! ```yaml
//! nodes:
//!   - name: trigger
//!     type: LAZY_AND
//!     children: [prefilter, lines]
//!     ordered: true
//!   - name: lines
//!     type: NONLAZY_OR
//!     children: [line_a, line_b]
//! edges:
//!   - before: line_a
//!     after: line_b
//! always_run: [odometry]
//! thread_pool_size: 4
//! ```
//!
//! Child names that are not themselves defined as nodes (`prefilter`,
//! `line_a`, `line_b` above) become leaf nodes wrapping algorithm
//! invocations.
//!
//! Validation here catches purely declarative mistakes (duplicate names,
//! `NOT` arity, unknown edge endpoints); structural errors that need the
//! built graph (no unique root, cycles) surface during graph construction
//! and dependency resolution.

use crate::error::{Result, SchedulerError};
use crate::graph::CombinatorKind;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Declarative definition of one composite control-flow node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDefinition {
    /// Unique node name
    pub name: String,

    /// Boolean combinator kind
    #[serde(rename = "type")]
    pub kind: CombinatorKind,

    /// Ordered list of child node names. Names without their own definition
    /// become leaf nodes.
    #[serde(default)]
    pub children: Vec<String>,

    /// Whether adjacent children must execute in listed order
    #[serde(default)]
    pub ordered: bool,
}

/// Explicit user-declared control-flow edge: `before` must fully execute
/// before any leaf below `after` runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeDefinition {
    /// Name of the upstream node
    pub before: String,
    /// Name of the downstream node
    pub after: String,
}

/// Complete scheduler configuration.
///
/// # Examples
///
/// ```rust
/// use flowsched_core::config::{SchedulerConfig, NodeDefinition};
/// use flowsched_core::graph::CombinatorKind;
///
/// let config = SchedulerConfig {
///     nodes: vec![NodeDefinition {
///         name: "root".to_string(),
///         kind: CombinatorKind::LazyAnd,
///         children: vec!["algA".to_string(), "algB".to_string()],
///         ordered: true,
///     }],
///     ..SchedulerConfig::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Composite node definitions, in declaration order
    pub nodes: Vec<NodeDefinition>,

    /// Names of barrier (gather) algorithms with optional upstream producers
    #[serde(default)]
    pub barrier_algorithms: Vec<String>,

    /// Explicit user-declared control-flow edges
    #[serde(default)]
    pub edges: Vec<EdgeDefinition>,

    /// Algorithm names that run unconditionally once per event, before the
    /// control-flow walk
    #[serde(default)]
    pub always_run: Vec<String>,

    /// Number of worker threads in the event task pool
    #[serde(default = "default_thread_pool_size")]
    pub thread_pool_size: usize,

    /// Number of whiteboard event slots; defaults to `thread_pool_size + 1`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slots: Option<usize>,

    /// Maximum number of events to process; `None` runs until the source is
    /// exhausted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_events: Option<u64>,

    /// Print the diagnostic state tree every N finished events; 0 disables
    #[serde(default)]
    pub print_frequency: u64,

    /// Consecutive failed events tolerated before the run shuts down
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
}

fn default_thread_pool_size() -> usize {
    1
}

fn default_max_consecutive_failures() -> u32 {
    10
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            barrier_algorithms: Vec::new(),
            edges: Vec::new(),
            always_run: Vec::new(),
            thread_pool_size: default_thread_pool_size(),
            slots: None,
            max_events: None,
            print_frequency: 0,
            max_consecutive_failures: default_max_consecutive_failures(),
        }
    }
}

impl SchedulerConfig {
    /// Load a configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse a configuration from a YAML string.
    pub fn from_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Effective whiteboard slot count.
    pub fn slot_count(&self) -> usize {
        self.slots.unwrap_or(self.thread_pool_size + 1)
    }

    /// Validate the declarative configuration.
    ///
    /// Checks duplicate node names, `NOT` arity, edge endpoint resolvability,
    /// and run parameters. Graph-level structure (unique root, cycles) is
    /// validated later by [`NodeGraph::from_definitions`](crate::graph::NodeGraph::from_definitions)
    /// and the dependency resolver.
    pub fn validate(&self) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(SchedulerError::configuration(
                "configuration defines no control-flow nodes",
            ));
        }
        if self.thread_pool_size == 0 {
            return Err(SchedulerError::configuration(
                "thread_pool_size must be at least 1",
            ));
        }
        if self.slot_count() == 0 {
            return Err(SchedulerError::configuration("slots must be at least 1"));
        }

        let mut seen = HashSet::new();
        for def in &self.nodes {
            if !seen.insert(def.name.as_str()) {
                return Err(SchedulerError::Configuration(format!(
                    "duplicate node definition '{}'",
                    def.name
                )));
            }
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
        }

        // Every name mentioned anywhere in the tree is a valid edge endpoint,
        // including implicit leaves.
        let mut known: HashSet<&str> = seen;
        for def in &self.nodes {
            for child in &def.children {
                known.insert(child.as_str());
            }
        }
        for edge in &self.edges {
            for endpoint in [&edge.before, &edge.after] {
                if !known.contains(endpoint.as_str()) {
                    return Err(SchedulerError::Configuration(format!(
                        "edge endpoint '{}' does not name a known node",
                        endpoint
                    )));
                }
            }
        }

        Ok(())
    }
}
