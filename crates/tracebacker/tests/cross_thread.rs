//! Integration tests for cross-thread stack lookup and concurrent recording

use std::sync::mpsc;
use std::sync::{Arc, Barrier};
use std::thread;
use tracebacker::{CallStackRegistry, Instrumentation, InstrumentationConfig, StatsTable, TraceLog};

#[test]
fn test_remote_thread_stack_is_visible() {
    let _ = tracing_subscriber::fmt::try_init();

    let registry = CallStackRegistry::new();
    let (ready_tx, ready_rx) = mpsc::channel();
    let (done_tx, done_rx) = mpsc::channel::<()>();

    let worker = {
        let registry = registry.clone();
        thread::spawn(move || {
            let stack = registry.register().unwrap();
            stack.push_frame("main_loop", "worker.rs", 10, 0.0);
            stack.push_frame("handle", "worker.rs", 20, 0.1);
            ready_tx.send(stack.thread()).unwrap();

            // Keep the handle alive until the main thread has looked
            done_rx.recv().unwrap();
        })
    };

    let worker_key = ready_rx.recv().unwrap();
    let remote = registry
        .get_registered_stack(worker_key)
        .expect("worker stack should be registered");

    assert!(remote.is_live());
    assert_eq!(remote.depth(), 2);
    let functions: Vec<String> = remote.snapshot().into_iter().map(|f| f.function).collect();
    assert_eq!(functions, vec!["handle", "main_loop"]);
    assert_eq!(registry.registered_threads(), vec![worker_key]);

    done_tx.send(()).unwrap();
    worker.join().unwrap();

    assert!(!remote.is_live());
    assert!(registry.get_registered_stack(worker_key).is_none());
    assert!(registry.is_empty());
}

#[test]
fn test_each_thread_owns_its_stack() {
    let registry = CallStackRegistry::new();
    let main_stack = registry.register().unwrap();
    main_stack.push_frame("main", "main.rs", 1, 0.0);

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let registry = registry.clone();
            thread::spawn(move || {
                let stack = registry.register().unwrap();
                for depth in 0..=i {
                    stack.push_frame(format!("f{}", depth), "worker.rs", depth, 0.0);
                }
                stack.get_depth()
            })
        })
        .collect();

    let depths: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(depths, vec![1, 2, 3, 4]);
    assert_eq!(main_stack.get_depth(), 1);
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_concurrent_recording_loses_no_updates() {
    const THREADS: usize = 8;
    const CALLS: usize = 1_000;

    let table = Arc::new(StatsTable::new());
    table.enable_sampling("shared", 50);
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let table = Arc::clone(&table);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for i in 0..CALLS {
                    table.record_function_call("shared", ((t * CALLS + i) % 7) as f64 * 0.001);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let expected_total: f64 = (0..THREADS * CALLS).map(|n| (n % 7) as f64 * 0.001).sum();
    let stats = table.get_stats_for("shared").unwrap();
    assert_eq!(stats.call_count, (THREADS * CALLS) as u64);
    assert!((stats.total_time - expected_total).abs() < 1e-6);
    assert_eq!(stats.min_time, 0.0);
    assert!((stats.max_time - 0.006).abs() < 1e-12);
    assert_eq!(stats.samples.unwrap().len(), 50);
}

#[test]
fn test_concurrent_spans_all_land() {
    const THREADS: usize = 4;
    const SPANS: usize = 250;

    let log = Arc::new(TraceLog::new());
    log.start();

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let log = Arc::clone(&log);
            thread::spawn(move || {
                for i in 0..SPANS {
                    let _span = log.span("worker_step", "worker.rs", i as u32);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let traces = log.get_traces();
    assert_eq!(traces.len(), THREADS * SPANS);

    let mut threads: Vec<_> = traces.iter().map(|e| e.thread_id).collect();
    threads.sort();
    threads.dedup();
    assert_eq!(threads.len(), THREADS);
    assert!(traces.iter().all(|e| e.duration >= 0.0));
}

#[test]
fn test_shared_domain_across_threads() {
    let domain = Arc::new(Instrumentation::new(
        InstrumentationConfig::new().tracing(true),
    ));

    let handles: Vec<_> = (0..3)
        .map(|_| {
            let domain = Arc::clone(&domain);
            thread::spawn(move || {
                let stack = domain.call_stacks().register().unwrap();
                for _ in 0..10 {
                    domain.instrument(&stack, "task", "tasks.rs", 5, || ());
                }
                stack.get_depth()
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), 0);
    }

    assert_eq!(domain.stats().get_stats_for("task").unwrap().call_count, 30);
    assert_eq!(domain.traces().len(), 30);
    assert!(domain.call_stacks().is_empty());
}
