//! Integration tests for complete scheduler runs
//!
//! These tests drive full configurations through `Scheduler::build` and the
//! scheduling driver, verifying combinator semantics, ordering, memoization,
//! and the concurrency bounds end to end.

use flowsched_core::{
    AlgOutcome, CombinatorKind, EdgeDefinition, FnAlgorithm, InMemoryWhiteboard, MappingBroker,
    NodeDefinition, Scheduler, SchedulerConfig, SequentialEventSource,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn def(name: &str, kind: CombinatorKind, children: &[&str], ordered: bool) -> NodeDefinition {
    NodeDefinition {
        name: name.to_string(),
        kind,
        children: children.iter().map(|c| c.to_string()).collect(),
        ordered,
    }
}

fn record(report: &flowsched_core::EventReport, name: &str) -> (u32, bool) {
    let r = report
        .node_states
        .iter()
        .find(|r| r.name == name)
        .unwrap_or_else(|| panic!("no node named {name}"));
    (r.execution_counter, r.passed)
}

/// A nested trigger tree exercising every combinator kind in one event.
#[tokio::test]
async fn test_full_trigger_tree_decision() {
    // trigger = LAZY_AND(prefilter, lines, veto)
    //   lines = NONLAZY_OR(line_a, line_b)
    //   veto  = NOT(noise)
    let broker = MappingBroker::new()
        .with_algorithm(Arc::new(FnAlgorithm::fixed("prefilter", true)))
        .with_algorithm(Arc::new(FnAlgorithm::fixed("line_a", false)))
        .with_algorithm(Arc::new(FnAlgorithm::fixed("line_b", true)))
        .with_algorithm(Arc::new(FnAlgorithm::fixed("noise", false)));
    let config = SchedulerConfig {
        nodes: vec![
            def(
                "trigger",
                CombinatorKind::LazyAnd,
                &["prefilter", "lines", "veto"],
                true,
            ),
            def("lines", CombinatorKind::NonlazyOr, &["line_a", "line_b"], false),
            def("veto", CombinatorKind::Not, &["noise"], false),
        ],
        ..SchedulerConfig::default()
    };

    let scheduler = Scheduler::build(config, &broker).unwrap();
    let summary = scheduler.run(SequentialEventSource::new(1)).await.unwrap();
    let report = &summary.reports[0];

    // line_a fails, line_b passes: NONLAZY_OR passes; noise fails so NOT
    // passes; the whole trigger passes.
    assert!(report.passed);
    assert_eq!(record(report, "lines"), (0, true));
    assert_eq!(record(report, "veto"), (0, true));
    assert_eq!(record(report, "line_a"), (0, false));
}

#[tokio::test]
async fn test_lazy_and_ordered_scenario_through_driver() {
    // LAZY_AND over [algA, algB], algA passes, algB fails its filter. Both
    // leaves execute (the short-circuit acts on child results, not mid-leaf),
    // algA strictly before algB, and the node fails.
    let executed: Arc<AtomicUsize> = Arc::new(AtomicUsize::new(0));
    let order_seen = Arc::new(parking_lot::Mutex::new(Vec::new()));

    let make = |name: &'static str, passed: bool| {
        let executed = executed.clone();
        let order_seen = order_seen.clone();
        FnAlgorithm::new(name, move |_ctx| {
            executed.fetch_add(1, Ordering::SeqCst);
            order_seen.lock().push(name);
            Box::pin(async move { Ok(AlgOutcome { filter_passed: passed }) })
        })
    };
    let broker = MappingBroker::new()
        .with_algorithm(Arc::new(make("algA", true)))
        .with_algorithm(Arc::new(make("algB", false)));
    let config = SchedulerConfig {
        nodes: vec![def("L1", CombinatorKind::LazyAnd, &["algA", "algB"], true)],
        ..SchedulerConfig::default()
    };

    let scheduler = Scheduler::build(config, &broker).unwrap();
    let summary = scheduler.run(SequentialEventSource::new(1)).await.unwrap();

    assert!(!summary.reports[0].passed);
    assert_eq!(record(&summary.reports[0], "L1"), (0, false));
    assert_eq!(executed.load(Ordering::SeqCst), 2);
    assert_eq!(*order_seen.lock(), vec!["algA", "algB"]);
}

#[tokio::test]
async fn test_explicit_edges_and_barrier_ordering() {
    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let make = |name: &'static str| {
        let seen = seen.clone();
        FnAlgorithm::new(name, move |_ctx| {
            seen.lock().push(name);
            Box::pin(async move { Ok(AlgOutcome { filter_passed: true }) })
        })
    };
    let broker = MappingBroker::new()
        .with_algorithm(Arc::new(make("prod_a")))
        .with_algorithm(Arc::new(make("prod_b")))
        .with_algorithm(Arc::new(make("consumer")))
        .with_algorithm(Arc::new(make("late")))
        .with_barrier(
            "gather",
            vec!["prod_a".to_string(), "prod_b".to_string()],
            vec!["consumer".to_string()],
        );
    let config = SchedulerConfig {
        nodes: vec![def(
            "root",
            CombinatorKind::NonlazyAnd,
            &["consumer", "late", "prod_a", "prod_b"],
            false,
        )],
        barrier_algorithms: vec!["gather".to_string()],
        edges: vec![EdgeDefinition {
            before: "consumer".to_string(),
            after: "late".to_string(),
        }],
        ..SchedulerConfig::default()
    };

    let scheduler = Scheduler::build(config, &broker).unwrap();
    scheduler.run(SequentialEventSource::new(1)).await.unwrap();

    let seen = seen.lock();
    let pos = |name: &str| seen.iter().position(|&n| n == name).unwrap();
    assert!(pos("prod_a") < pos("consumer"));
    assert!(pos("prod_b") < pos("consumer"));
    assert!(pos("consumer") < pos("late"));
}

#[tokio::test]
async fn test_shared_algorithm_runs_once_per_event_across_many_events() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let inv = invocations.clone();
    let shared = FnAlgorithm::new("shared_reco", move |_ctx| {
        inv.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move { Ok(AlgOutcome { filter_passed: true }) })
    });
    let broker = MappingBroker::new()
        .with_algorithm(Arc::new(shared))
        .with_algorithm(Arc::new(FnAlgorithm::fixed("sel_a", true)))
        .with_algorithm(Arc::new(FnAlgorithm::fixed("sel_b", true)))
        .with_node_requirements(
            "line_a",
            vec!["shared_reco".to_string(), "sel_a".to_string()],
        )
        .with_node_requirements(
            "line_b",
            vec!["shared_reco".to_string(), "sel_b".to_string()],
        );
    let config = SchedulerConfig {
        nodes: vec![def(
            "root",
            CombinatorKind::NonlazyOr,
            &["line_a", "line_b"],
            false,
        )],
        ..SchedulerConfig::default()
    };

    let scheduler = Scheduler::build(config, &broker).unwrap();
    let events = 20;
    scheduler
        .run(SequentialEventSource::new(events))
        .await
        .unwrap();

    // Once per event, never once per leaf.
    assert_eq!(invocations.load(Ordering::SeqCst), events as usize);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_slot_pool_bounds_concurrency() {
    const SLOTS: usize = 3;
    const EVENTS: u64 = 24;

    let in_flight = Arc::new(AtomicUsize::new(0));
    let max_in_flight = Arc::new(AtomicUsize::new(0));
    let inf = in_flight.clone();
    let max = max_in_flight.clone();
    let work = FnAlgorithm::new("work", move |_ctx| {
        let inf = inf.clone();
        let max = max.clone();
        Box::pin(async move {
            let now = inf.fetch_add(1, Ordering::SeqCst) + 1;
            max.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            inf.fetch_sub(1, Ordering::SeqCst);
            Ok(AlgOutcome { filter_passed: true })
        })
    });
    let broker = MappingBroker::new().with_algorithm(Arc::new(work));
    let config = SchedulerConfig {
        nodes: vec![def("root", CombinatorKind::LazyAnd, &["work"], false)],
        thread_pool_size: 4,
        slots: Some(SLOTS),
        ..SchedulerConfig::default()
    };

    let scheduler = Scheduler::build(config, &broker).unwrap();
    let whiteboard = Arc::new(InMemoryWhiteboard::new(SLOTS));
    let summary = scheduler
        .driver_with_whiteboard(whiteboard)
        .run(SequentialEventSource::new(EVENTS))
        .await
        .unwrap();

    assert_eq!(summary.events_processed, EVENTS);
    assert!(
        max_in_flight.load(Ordering::SeqCst) <= SLOTS,
        "more concurrent events than slots"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_run_matches_sequential_snapshots() {
    // Algorithm results are a pure function of the event id, so a concurrent
    // run must produce bitwise-identical reports to a one-at-a-time run.
    let make_broker = || {
        MappingBroker::new()
            .with_algorithm(Arc::new(FnAlgorithm::new("parity", |ctx| {
                Box::pin(async move {
                    Ok(AlgOutcome {
                        filter_passed: ctx.event_id % 2 == 0,
                    })
                })
            })))
            .with_algorithm(Arc::new(FnAlgorithm::new("thirds", |ctx| {
                Box::pin(async move {
                    Ok(AlgOutcome {
                        filter_passed: ctx.event_id % 3 == 0,
                    })
                })
            })))
    };
    let nodes = vec![
        def("root", CombinatorKind::NonlazyAnd, &["parity", "sub"], false),
        def("sub", CombinatorKind::LazyOr, &["thirds"], false),
    ];

    let concurrent = Scheduler::build(
        SchedulerConfig {
            nodes: nodes.clone(),
            thread_pool_size: 4,
            slots: Some(4),
            ..SchedulerConfig::default()
        },
        &make_broker(),
    )
    .unwrap();
    let sequential = Scheduler::build(
        SchedulerConfig {
            nodes,
            slots: Some(1),
            ..SchedulerConfig::default()
        },
        &make_broker(),
    )
    .unwrap();

    let events = 30;
    let a = concurrent
        .run(SequentialEventSource::new(events))
        .await
        .unwrap();
    let b = sequential
        .run(SequentialEventSource::new(events))
        .await
        .unwrap();

    assert_eq!(a.reports.len(), b.reports.len());
    for (ra, rb) in a.reports.iter().zip(&b.reports) {
        // Slots differ between runs; the decision snapshot must not.
        assert_eq!(ra.event_id, rb.event_id);
        assert_eq!(ra.passed, rb.passed);
        assert_eq!(ra.node_states, rb.node_states);
    }
}

#[tokio::test]
async fn test_yaml_configured_run() {
    let yaml = r#"
nodes:
  - name: trigger
    type: LAZY_OR
    children: [line_a, line_b]
    ordered: true
slots: 2
"#;
    let config = SchedulerConfig::from_str(yaml).unwrap();
    let broker = MappingBroker::new()
        .with_algorithm(Arc::new(FnAlgorithm::fixed("line_a", false)))
        .with_algorithm(Arc::new(FnAlgorithm::fixed("line_b", true)));

    let scheduler = Scheduler::build(config, &broker).unwrap();
    let summary = scheduler.run(SequentialEventSource::new(4)).await.unwrap();

    assert_eq!(summary.events_processed, 4);
    assert!(summary.reports.iter().all(|r| r.passed));
}
