//! Unit tests for the threading module
//!
//! # Test Categories
//! 1. Thread tests - spawning, joining, return values, panics
//! 2. Worker pool tests - dispatch, naming, shutdown, panicking jobs

use super::*;
use crossbeam::channel;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::time::Duration;

// ============================================================================
// Thread Tests
// ============================================================================

/// Test basic thread spawn and join
#[test]
fn test_thread_spawn_and_join() {
    let counter = Arc::new(AtomicUsize::new(0));
    let counter_clone = Arc::clone(&counter);

    let thread = Thread::spawn("test_worker", move || {
        for _ in 0..10 {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        }
    })
    .expect("Thread spawn should succeed");
    assert_eq!(thread.name(), "test_worker");

    thread.join().expect("Thread join should succeed");
    assert_eq!(counter.load(Ordering::SeqCst), 10);
}

/// Test thread spawn with return value
#[test]
fn test_thread_spawn_with_return_value() {
    let thread = Thread::spawn("compute_thread", || (1..=5).product::<i32>()).expect("Thread spawn should succeed");
    assert_eq!(thread.join().expect("Thread join should succeed"), 120);
}

/// A panicking thread reports a join failure instead of propagating the panic
#[test]
fn test_thread_panic_is_join_error() {
    let thread = Thread::spawn("doomed", || -> u32 { panic!("boom") }).expect("Thread spawn should succeed");
    match thread.join() {
        Err(ThreadError::JoinFailed(msg)) => assert!(msg.contains("doomed")),
        other => panic!("expected JoinFailed, got {:?}", other.map(|_| ())),
    }
}

/// The spawned thread carries the requested name
#[test]
fn test_thread_name_visible_inside() {
    let thread = Thread::spawn("named-thread", || thread::current().name().map(str::to_owned))
        .expect("Thread spawn should succeed");
    assert_eq!(thread.join().unwrap().as_deref(), Some("named-thread"));
}

// ============================================================================
// Worker Pool Tests
// ============================================================================

/// Every submitted job runs exactly once
#[test]
fn test_pool_runs_all_jobs() {
    let counter = Arc::new(AtomicUsize::new(0));
    let mut pool = WorkerPool::new("test-pool", 4).unwrap();
    assert_eq!(pool.size(), 4);

    for _ in 0..100 {
        let counter = Arc::clone(&counter);
        pool.execute(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    }
    pool.shutdown().unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 100);
    assert_eq!(pool.outstanding(), 0);
}

/// A zero-sized request still yields one worker
#[test]
fn test_pool_minimum_one_worker() {
    let pool = WorkerPool::new("single", 0).unwrap();
    assert_eq!(pool.size(), 1);
}

/// Jobs are spread across workers with distinct names
#[test]
fn test_pool_workers_run_concurrently() {
    let pool = WorkerPool::new("scaler", 3).unwrap();
    let barrier = Arc::new(Barrier::new(3));
    let (tx, rx) = channel::unbounded();

    for _ in 0..3 {
        let barrier = Arc::clone(&barrier);
        let tx = tx.clone();
        pool.execute(move || {
            barrier.wait();
            let _ = tx.send(thread::current().name().map(str::to_owned));
        })
        .unwrap();
    }

    let names: HashSet<Option<String>> = (0..3)
        .map(|_| rx.recv_timeout(Duration::from_secs(10)).expect("job should finish"))
        .collect();
    assert_eq!(names.len(), 3);
    assert!(names.iter().all(|n| n.as_deref().is_some_and(|n| n.starts_with("scaler-"))));
}

/// A panicking job does not take its worker down
#[test]
fn test_pool_survives_panicking_job() {
    let mut pool = WorkerPool::new("sturdy", 1).unwrap();
    let done = Arc::new(AtomicUsize::new(0));

    pool.execute(|| panic!("job failure")).unwrap();
    let done_clone = Arc::clone(&done);
    pool.execute(move || {
        done_clone.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();

    pool.shutdown().unwrap();
    assert_eq!(done.load(Ordering::SeqCst), 1);
}

/// After shutdown, execute reports the pool as closed
#[test]
fn test_pool_rejects_after_shutdown() {
    let mut pool = WorkerPool::new("closing", 2).unwrap();
    pool.shutdown().unwrap();
    assert_eq!(pool.execute(|| {}), Err(ThreadError::PoolClosed));
    assert_eq!(pool.size(), 0);
}

/// Dropping the pool drains queued work first
#[test]
fn test_pool_drop_finishes_queue() {
    let counter = Arc::new(AtomicUsize::new(0));
    {
        let pool = WorkerPool::new("draining", 1).unwrap();
        for _ in 0..20 {
            let counter = Arc::clone(&counter);
            pool.execute(move || {
                thread::sleep(Duration::from_millis(1));
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }
    }
    assert_eq!(counter.load(Ordering::SeqCst), 20);
}

#[test]
fn test_error_display() {
    assert_eq!(ThreadError::PoolClosed.to_string(), "Worker pool is shut down");
    assert_eq!(
        ThreadError::SpawnFailed("x".into()).to_string(),
        "Thread spawn failed: x"
    );
}
