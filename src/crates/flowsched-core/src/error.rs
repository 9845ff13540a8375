//! Error types and error handling for scheduler operations
//!
//! This module defines all error types that can occur during configuration,
//! dependency resolution, and per-event execution. All errors implement
//! `std::error::Error` via the `thiserror` crate.
//!
//! # Error Hierarchy
//!
//! ```text
//! SchedulerError
//! ├── Configuration       - Node graph / control-flow configuration errors (fatal at startup)
//! ├── AlgorithmExecution  - A single algorithm invocation failed
//! ├── EventFailed         - An event was marked failed (isolated to that event)
//! ├── RunAborted          - Consecutive-failure threshold breached
//! ├── Yaml                - Configuration parsing errors
//! └── Io                  - File system errors while loading configuration
//! ```
//!
//! # Propagation Policy
//!
//! Configuration errors are hard failures: graph construction and dependency
//! resolution either succeed completely or abort startup. There is no partial
//! order and no recovery.
//!
//! Per-event errors are isolated. A failed algorithm marks only the current
//! event as failed; the shared node graph and other in-flight events are
//! untouched, and the failed event is never retried.
//!
//! ```rust
//! use flowsched_core::error::{Result, SchedulerError};
//!
//! fn check_children(children: &[String]) -> Result<()> {
//!     if children.is_empty() {
//!         return Err(SchedulerError::configuration("composite node has no children"));
//!     }
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// Convenience result type using [`SchedulerError`].
pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Comprehensive error type for all scheduler operations.
///
/// Uses `thiserror` for automatic `Error` trait implementation and carries
/// context (node names, algorithm names, event ids) where helpful.
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// Control-flow configuration is invalid.
    ///
    /// **Common causes**:
    /// - A `NOT` node declared with other than exactly one child
    /// - Duplicate node definitions
    /// - Zero or more than one root node
    /// - A cycle in the derived control-flow edges
    /// - An explicit edge naming an unknown node
    ///
    /// Fatal at initialization; never recovered.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An algorithm invocation failed during event execution.
    ///
    /// Caught at the leaf-execution boundary; marks the current event as
    /// failed and aborts further algorithm execution within that leaf.
    #[error("Algorithm '{algorithm}' failed: {error}")]
    AlgorithmExecution {
        /// Name of the algorithm that failed
        algorithm: String,
        /// Error message from the invocation
        error: String,
    },

    /// An event was marked fatally failed.
    ///
    /// Wraps the underlying algorithm failure with the event id for run-level
    /// bookkeeping. Failure of one event never affects other events' state.
    #[error("Event {event_id} failed: {error}")]
    EventFailed {
        /// Id of the failed event
        event_id: u64,
        /// Description of the failure
        error: String,
    },

    /// The run was shut down after too many consecutive event failures.
    #[error("Run aborted after {consecutive_failures} consecutive event failures")]
    RunAborted {
        /// Number of consecutive failures observed when the threshold tripped
        consecutive_failures: u32,
    },

    /// YAML configuration parsing error.
    ///
    /// Wraps errors from `serde_yaml::Error`.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// I/O operation failed while loading configuration.
    ///
    /// Wraps errors from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SchedulerError {
    /// Create a configuration error from anything displayable.
    pub fn configuration(msg: impl Into<String>) -> Self {
        SchedulerError::Configuration(msg.into())
    }

    /// Create an algorithm execution error with context.
    pub fn algorithm_execution(algorithm: impl Into<String>, error: impl Into<String>) -> Self {
        SchedulerError::AlgorithmExecution {
            algorithm: algorithm.into(),
            error: error.into(),
        }
    }

    /// Create an event failure error with context.
    pub fn event_failed(event_id: u64, error: impl Into<String>) -> Self {
        SchedulerError::EventFailed {
            event_id,
            error: error.into(),
        }
    }

    /// Whether this error is fatal for the whole run (as opposed to a single
    /// event).
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SchedulerError::Configuration(_)
                | SchedulerError::RunAborted { .. }
                | SchedulerError::Yaml(_)
                | SchedulerError::Io(_)
        )
    }
}
