//! Scheduler variants, subscribe_on / observe_on placement and the
//! trampoline's bounded stack depth.


use std::cell::Cell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;

use rivulet::prelude::*;
use rivulet::sched::{ComputePool, IoPool, NewWorker, SingleWorker, Trampoline};
use test_support::{recorder, wait_until};

fn run_on(scheduler: &dyn Scheduler) -> String {
    let (tx, rx) = mpsc::channel();
    scheduler
        .schedule(Box::new(move || {
            let name = thread::current().name().unwrap_or("<unnamed>").to_string();
            let _ = tx.send(name);
        }))
        .unwrap();
    rx.recv_timeout(Duration::from_secs(5)).unwrap()
}

#[test]
fn every_kind_runs_tasks() {
    for kind in [
        SchedulerKind::NewWorker,
        SchedulerKind::IoPool,
        SchedulerKind::ComputePool,
        SchedulerKind::SingleWorker,
        SchedulerKind::Trampoline,
    ] {
        let scheduler = kind.get();
        let name = run_on(scheduler.as_ref());
        assert!(!name.is_empty(), "{kind} ran nowhere");
    }
}

#[test]
fn new_worker_uses_a_fresh_thread_per_task() {
    let scheduler = NewWorker::new("nw-test");
    let a = run_on(&scheduler);
    let b = run_on(&scheduler);
    assert!(a.starts_with("nw-test-new-"));
    assert_ne!(a, b);
}

#[test]
fn trampoline_runs_on_the_calling_thread() {
    let here = thread::current().name().map(str::to_string);
    let there = run_on(&Trampoline::new());
    assert_eq!(Some(there), here);
}

#[test]
fn single_worker_is_strictly_fifo() {
    let worker = SingleWorker::new("fifo-test");
    let order = Arc::new(Mutex::new(Vec::new()));
    for i in 0..1_000 {
        let order = Arc::clone(&order);
        worker
            .schedule(Box::new(move || order.lock().unwrap().push(i)))
            .unwrap();
    }
    worker.shutdown();
    assert_eq!(*order.lock().unwrap(), (0..1_000).collect::<Vec<_>>());
}

#[test]
fn compute_pool_is_fixed_size() {
    let pool = ComputePool::new(3, "cp-test");
    assert_eq!(pool.threads(), 3);

    let names = Arc::new(Mutex::new(std::collections::HashSet::new()));
    let done = Arc::new(AtomicUsize::new(0));
    for _ in 0..200 {
        let names = Arc::clone(&names);
        let done = Arc::clone(&done);
        pool.schedule(Box::new(move || {
            let name = thread::current().name().unwrap_or_default().to_string();
            names.lock().unwrap().insert(name);
            done.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();
    }
    assert!(wait_until(Duration::from_secs(5), || done.load(Ordering::SeqCst) == 200));
    assert!(names.lock().unwrap().len() <= 3);
    pool.shutdown();
}

#[test]
fn io_pool_reuses_idle_workers_and_retires_them() {
    let pool = IoPool::new(Duration::from_millis(100), "io-test");
    for _ in 0..5 {
        let name = run_on(&pool);
        assert!(name.starts_with("io-test-io-"));
        // Let the worker park again before the next submission.
        assert!(wait_until(Duration::from_secs(1), || pool.idle_workers() == 1));
    }
    assert_eq!(pool.live_workers(), 1);

    assert!(wait_until(Duration::from_secs(5), || pool.live_workers() == 0));
}

#[test]
fn io_pool_grows_when_all_workers_are_busy() {
    let pool = IoPool::new(Duration::from_secs(5), "io-grow");
    let (release_tx, release_rx) = release_gate();
    for _ in 0..4 {
        let rx = release_rx.clone();
        pool.schedule(Box::new(move || {
            let _ = rx.lock().unwrap().recv_timeout(Duration::from_secs(5));
        }))
        .unwrap();
    }
    assert!(wait_until(Duration::from_secs(2), || pool.live_workers() == 4));
    for _ in 0..4 {
        release_tx.send(()).unwrap();
    }
    pool.shutdown();
}

fn release_gate() -> (mpsc::Sender<()>, Arc<Mutex<mpsc::Receiver<()>>>) {
    let (tx, rx) = mpsc::channel();
    (tx, Arc::new(Mutex::new(rx)))
}

#[test]
fn disposing_a_pending_task_prevents_it() {
    let worker = SingleWorker::new("dispose-test");
    let (gate_tx, gate_rx) = mpsc::channel::<()>();
    worker
        .schedule(Box::new(move || {
            let _ = gate_rx.recv_timeout(Duration::from_secs(5));
        }))
        .unwrap();

    let ran = Arc::new(AtomicUsize::new(0));
    let flag = Arc::clone(&ran);
    let handle = worker
        .schedule(Box::new(move || {
            flag.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();
    handle.dispose();
    gate_tx.send(()).unwrap();
    worker.shutdown();

    assert_eq!(ran.load(Ordering::SeqCst), 0);
    assert!(handle.is_disposed());
}

#[test]
fn shut_down_pools_reject_work() {
    let pool = ComputePool::new(1, "reject-test");
    pool.shutdown();
    let err = pool.schedule(Box::new(|| {})).err().expect("schedule on a shut-down pool should fail");
    assert!(matches!(err, FlowError::Rejected(_)));
}

#[test]
fn subscribe_on_a_shut_down_scheduler_reports_the_rejection_once() {
    let worker = SingleWorker::new("closed-subscribe");
    worker.shutdown();
    let worker: Arc<dyn Scheduler> = Arc::new(worker);

    let (rec, probe) = recorder::<i64>(UNBOUNDED);
    Flowable::range(0, 5).subscribe_on(worker).subscribe(rec);

    let errors = probe.errors();
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], FlowError::Rejected(_)));
    assert_eq!(
        errors[0].to_string().matches("scheduler rejected task").count(),
        1
    );
}

thread_local! {
    static DEPTH: Cell<usize> = Cell::new(0);
    static MAX_DEPTH: Cell<usize> = Cell::new(0);
}

fn nested(remaining: usize, counter: Arc<AtomicUsize>) {
    DEPTH.with(|d| d.set(d.get() + 1));
    DEPTH.with(|d| MAX_DEPTH.with(|m| m.set(m.get().max(d.get()))));
    counter.fetch_add(1, Ordering::SeqCst);
    if remaining > 0 {
        let next = Arc::clone(&counter);
        Trampoline::new()
            .schedule(Box::new(move || nested(remaining - 1, next)))
            .unwrap();
    }
    DEPTH.with(|d| d.set(d.get() - 1));
}

#[test]
fn trampoline_keeps_recursion_flat() {
    let counter = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&counter);
    Trampoline::new()
        .schedule(Box::new(move || nested(100_000, c)))
        .unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 100_001);
    assert_eq!(MAX_DEPTH.with(|m| m.get()), 1);
    assert_eq!(Trampoline::queued(), 0);
    assert!(!Trampoline::is_draining());
}

#[test]
fn subscribe_on_runs_the_producer_on_the_scheduler() {
    let producer_thread = Arc::new(Mutex::new(String::new()));
    let seen = Arc::clone(&producer_thread);
    let (rec, probe) = recorder::<u32>(UNBOUNDED);
    Flowable::create(
        move |e: Emitter<u32>| {
            *seen.lock().unwrap() = thread::current().name().unwrap_or_default().to_string();
            e.next(1);
            e.complete();
        },
        OverflowPolicy::Buffer,
    )
    .subscribe_on(SchedulerKind::IoPool)
    .subscribe(rec);

    assert!(probe.await_terminal(Duration::from_secs(5)));
    assert_eq!(probe.items(), vec![1]);
    assert!(producer_thread.lock().unwrap().contains("-io-"));
}

#[test]
fn subscribe_on_replays_demand_requested_before_the_upstream_arrived() {
    let (rec, probe) = recorder::<i64>(3);
    Flowable::range(0, 100)
        .subscribe_on(SchedulerKind::NewWorker)
        .subscribe(rec);
    assert!(probe.await_items(3, Duration::from_secs(5)));
    thread::sleep(Duration::from_millis(20));
    assert_eq!(probe.items(), vec![0, 1, 2]);
}

#[test]
fn observe_on_delivers_on_the_target_scheduler() {
    let worker: Arc<dyn Scheduler> = Arc::new(SingleWorker::new("observe-test"));
    let (rec, probe) = recorder::<i64>(UNBOUNDED);
    Flowable::range(0, 300)
        .observe_on(worker)
        .subscribe(rec);

    assert!(probe.await_terminal(Duration::from_secs(5)));
    assert_eq!(probe.items(), (0..300).collect::<Vec<_>>());
    assert!(probe
        .thread_names()
        .iter()
        .all(|n| n.starts_with("observe-test-single")));
}

#[test]
fn the_nearest_observe_on_wins_downstream() {
    let first: Arc<dyn Scheduler> = Arc::new(SingleWorker::new("hop-a"));
    let second: Arc<dyn Scheduler> = Arc::new(SingleWorker::new("hop-b"));
    let upstream_threads = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&upstream_threads);

    let (rec, probe) = recorder::<i64>(UNBOUNDED);
    Flowable::range(0, 50)
        .observe_on(first)
        .map(move |x| {
            log.lock()
                .unwrap()
                .push(thread::current().name().unwrap_or_default().to_string());
            x
        })
        .observe_on(second)
        .subscribe(rec);

    assert!(probe.await_terminal(Duration::from_secs(5)));
    assert_eq!(probe.items().len(), 50);
    assert!(upstream_threads.lock().unwrap().iter().all(|n| n.starts_with("hop-a")));
    assert!(probe.thread_names().iter().all(|n| n.starts_with("hop-b")));
}

#[test]
fn scheduler_kind_parses_and_prints() {
    for kind in [
        SchedulerKind::NewWorker,
        SchedulerKind::IoPool,
        SchedulerKind::ComputePool,
        SchedulerKind::SingleWorker,
        SchedulerKind::Trampoline,
    ] {
        let parsed: SchedulerKind = kind.to_string().parse().unwrap();
        assert_eq!(parsed, kind);
    }
    assert!("gpu".parse::<SchedulerKind>().is_err());

    let json = serde_json::to_string(&SchedulerKind::ComputePool).unwrap();
    assert_eq!(json, "\"compute_pool\"");
}
