//! Scheduling driver
//!
//! Owns the run loop: pulls event root addresses from the
//! [`EventSource`](crate::whiteboard::EventSource), bounds in-flight
//! concurrency by free whiteboard slots, dispatches one task per event onto
//! the tokio runtime, and reclaims slots on completion.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │  submission loop (single-threaded)                         │
//! │                                                            │
//! │   source.next_event() ──► allocate_slot ──► spawn task ──┐ │
//! │         ▲                     │ (none free)              │ │
//! │         │                     ▼                          │ │
//! │         │            wait on Notify (short timeout)      │ │
//! └─────────┼────────────────────────────────────────────────┼─┘
//!           │                                                ▼
//!           │                          ┌──────────────────────────────┐
//!           │                          │ event task (pool thread)     │
//!           │                          │  run_event → report →        │
//!           └── notify_waiters ◄────── │  clear_slot → free_slot →    │
//!                                      │  bump finished counter       │
//!                                      └──────────────────────────────┘
//! ```
//!
//! The very first event runs alone, before any concurrency opens up, so
//! immediate configuration failures surface early. Cross-event concurrency
//! is the only parallelism: within one event the control-flow walk is
//! strictly sequential. The slot pool and the finished-event counter are the
//! only cross-thread mutable state, guarded by a mutex with a `Notify` as
//! the wakeup half of the pair.
//!
//! A failed event fails only itself; a configurable number of *consecutive*
//! failures shuts the whole run down in an orderly way (stop accepting new
//! events, drain in-flight ones, return [`SchedulerError::RunAborted`]).

use crate::algorithm::EventContext;
use crate::config::SchedulerConfig;
use crate::error::{Result, SchedulerError};
use crate::executor::EventExecutor;
use crate::report::{render_tree, EventReport};
use crate::whiteboard::{EventSource, Whiteboard};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// How long the submission loop sleeps waiting for a slot before re-checking.
const SLOT_WAIT: Duration = Duration::from_millis(20);

/// Aggregate result of a completed run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Number of events that finished
    pub events_processed: u64,
    /// Number of events marked failed
    pub events_failed: u64,
    /// Per-event decision reports, sorted by event id
    pub reports: Vec<EventReport>,
}

#[derive(Debug, Default)]
struct RunState {
    finished: u64,
    failed: u64,
    consecutive_failures: u32,
    aborted_at: Option<u32>,
    reports: Vec<EventReport>,
}

/// Drives repeated per-event executor invocations across the task pool.
pub struct SchedulingDriver {
    executor: Arc<EventExecutor>,
    whiteboard: Arc<dyn Whiteboard>,
    max_events: Option<u64>,
    print_frequency: u64,
    max_consecutive_failures: u32,
}

impl SchedulingDriver {
    /// Create a driver over an executor and a whiteboard slot pool.
    ///
    /// In-flight concurrency is bounded by the whiteboard's capacity; the
    /// task pool itself is the ambient tokio runtime, sized by the embedder
    /// from [`SchedulerConfig::thread_pool_size`].
    pub fn new(
        executor: Arc<EventExecutor>,
        whiteboard: Arc<dyn Whiteboard>,
        config: &SchedulerConfig,
    ) -> Self {
        Self {
            executor,
            whiteboard,
            max_events: config.max_events,
            print_frequency: config.print_frequency,
            max_consecutive_failures: config.max_consecutive_failures,
        }
    }

    /// Process events from `source` until it is exhausted, the configured
    /// maximum is reached, or the consecutive-failure threshold trips.
    ///
    /// All in-flight events are drained before this returns.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::RunAborted`] after an orderly shutdown caused by
    /// too many consecutive event failures. Source exhaustion and full slot
    /// pools are normal backpressure, not errors.
    pub async fn run(&self, mut source: impl EventSource) -> Result<RunSummary> {
        let state = Arc::new(Mutex::new(RunState::default()));
        let notify = Arc::new(Notify::new());
        let mut handles = Vec::new();
        let mut submitted: u64 = 0;

        // The first event runs alone so configuration-level failures surface
        // before concurrency opens up.
        if self.max_events.map_or(true, |max| max > 0) {
            if let Some(addr) = source.next_event() {
                let slot = self.whiteboard.allocate_slot(addr.event_id).ok_or_else(|| {
                    SchedulerError::configuration("whiteboard has no free slot at startup")
                })?;
                submitted += 1;
                self.event_task(addr.event_id, slot, state.clone(), notify.clone())
                    .await;
            }
        }

        'submit: while self.max_events.map_or(true, |max| submitted < max) {
            if state.lock().aborted_at.is_some() {
                break;
            }
            let Some(addr) = source.next_event() else {
                tracing::debug!(submitted, "event source exhausted");
                break;
            };
            let slot = loop {
                if state.lock().aborted_at.is_some() {
                    break 'submit;
                }
                if let Some(slot) = self.whiteboard.allocate_slot(addr.event_id) {
                    break slot;
                }
                let _ = tokio::time::timeout(SLOT_WAIT, notify.notified()).await;
            };
            submitted += 1;
            handles.push(tokio::spawn(self.event_task(
                addr.event_id,
                slot,
                state.clone(),
                notify.clone(),
            )));
        }

        // Orderly shutdown: drain everything still in flight.
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "event task panicked");
            }
        }

        let mut st = state.lock();
        let mut reports = std::mem::take(&mut st.reports);
        reports.sort_by_key(|r| r.event_id);
        if let Some(consecutive_failures) = st.aborted_at {
            return Err(SchedulerError::RunAborted {
                consecutive_failures,
            });
        }
        Ok(RunSummary {
            events_processed: st.finished,
            events_failed: st.failed,
            reports,
        })
    }

    /// One event's full lifecycle: select slot, execute, report, reclaim.
    fn event_task(
        &self,
        event_id: u64,
        slot: usize,
        state: Arc<Mutex<RunState>>,
        notify: Arc<Notify>,
    ) -> impl Future<Output = ()> + Send + 'static {
        let executor = self.executor.clone();
        let whiteboard = self.whiteboard.clone();
        let print_frequency = self.print_frequency;
        let max_consecutive_failures = self.max_consecutive_failures;

        async move {
            whiteboard.select_slot(slot);
            let ctx = EventContext { event_id, slot };
            let outcome = executor.run_event(&ctx).await;
            let report = EventReport::new(executor.graph(), &ctx, &outcome);

            whiteboard.clear_slot(slot);
            whiteboard.free_slot(slot);

            let mut st = state.lock();
            st.finished += 1;
            if outcome.failed() {
                st.failed += 1;
                st.consecutive_failures += 1;
                if st.consecutive_failures >= max_consecutive_failures && st.aborted_at.is_none() {
                    st.aborted_at = Some(st.consecutive_failures);
                    tracing::error!(
                        consecutive_failures = st.consecutive_failures,
                        "consecutive-failure threshold breached; shutting down run"
                    );
                }
            } else {
                st.consecutive_failures = 0;
            }
            if print_frequency > 0 && st.finished % print_frequency == 0 {
                tracing::info!(
                    event = event_id,
                    finished = st.finished,
                    "control-flow state:\n{}",
                    render_tree(executor.graph(), &outcome.node_states)
                );
            }
            st.reports.push(report);
            drop(st);

            notify.notify_waiters();
        }
    }
}
