//! Operators: map, filter, merge, concat and the layered extras.


use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rivulet::prelude::*;
use test_support::recorder;

#[test]
fn filter_rerequests_rejected_items() {
    let (rec, probe) = recorder::<i64>(0);
    Flowable::range(0, 10).filter(|x| x % 3 == 0).subscribe(rec);

    probe.request(4).unwrap();
    assert_eq!(probe.items(), vec![0, 3, 6, 9]);
    assert_eq!(probe.completions(), 1);
}

#[test]
fn filter_meets_demand_one_at_a_time() {
    let (rec, probe) = recorder::<i64>(0);
    Flowable::range(0, 100).filter(|x| x % 10 == 0).subscribe(rec);
    for expected in 1..=5 {
        probe.request(1).unwrap();
        assert_eq!(probe.items().len(), expected);
    }
    assert_eq!(probe.items(), vec![0, 10, 20, 30, 40]);
}

#[test]
fn map_transforms_one_to_one() {
    let (rec, probe) = recorder::<String>(UNBOUNDED);
    Flowable::range(1, 3).map(|x| format!("#{x}")).subscribe(rec);
    assert_eq!(probe.items(), vec!["#1", "#2", "#3"]);
    assert_eq!(probe.completions(), 1);
}

#[test]
fn map_panic_becomes_callback_error_and_cancels_upstream() {
    let cancelled = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancelled);
    let (rec, probe) = recorder::<u32>(UNBOUNDED);
    Flowable::create(
        move |e: Emitter<u32>| {
            let flag = Arc::clone(&flag);
            e.on_cancel(move || flag.store(true, Ordering::SeqCst));
            for i in 0..10 {
                e.next(i);
            }
            e.complete();
        },
        OverflowPolicy::Buffer,
    )
    .map(|x| {
        if x == 3 {
            panic!("bad item {x}");
        }
        x * 2
    })
    .subscribe(rec);

    assert_eq!(probe.items(), vec![0, 2, 4]);
    let errors = probe.errors();
    assert_eq!(errors.len(), 1);
    match &errors[0] {
        FlowError::Callback(msg) => assert!(msg.contains("bad item 3")),
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(probe.completions(), 0);
    assert!(cancelled.load(Ordering::SeqCst));
}

#[test]
fn try_map_error_ends_the_stream() {
    let (rec, probe) = recorder::<i64>(UNBOUNDED);
    Flowable::range(0, 10)
        .try_map(|x| {
            if x < 2 {
                Ok(x)
            } else {
                Err(FlowError::msg("too big"))
            }
        })
        .subscribe(rec);
    assert_eq!(probe.items(), vec![0, 1]);
    assert_eq!(probe.errors().len(), 1);
    assert_eq!(probe.completions(), 0);
}

#[test]
fn filter_panic_is_reported() {
    let (rec, probe) = recorder::<i64>(UNBOUNDED);
    Flowable::range(0, 10)
        .filter(|x| {
            assert!(*x < 5, "predicate gave up");
            true
        })
        .subscribe(rec);
    assert_eq!(probe.items(), vec![0, 1, 2, 3, 4]);
    assert!(matches!(probe.errors()[0], FlowError::Callback(_)));
}

#[test]
fn merge_interleaves_and_completes_after_all_sources() {
    let (rec, probe) = recorder::<i64>(UNBOUNDED);
    merge([
        Flowable::range(0, 50),
        Flowable::range(100, 50),
        Flowable::range(200, 50),
    ])
    .subscribe(rec);

    let mut items = probe.items();
    assert_eq!(items.len(), 150);
    items.sort();
    let mut expected: Vec<i64> = (0..50).chain(100..150).chain(200..250).collect();
    expected.sort();
    assert_eq!(items, expected);
    assert_eq!(probe.completions(), 1);
}

#[test]
fn merge_preserves_per_source_order_across_threads() {
    let (rec, probe) = recorder::<i64>(UNBOUNDED);
    Flowable::range(0, 500)
        .subscribe_on(SchedulerKind::NewWorker)
        .merge_with(Flowable::range(1_000, 500).subscribe_on(SchedulerKind::NewWorker))
        .subscribe(rec);

    assert!(probe.await_terminal(Duration::from_secs(10)));
    let items = probe.items();
    assert_eq!(items.len(), 1_000);
    let low: Vec<_> = items.iter().copied().filter(|x| *x < 1_000).collect();
    let high: Vec<_> = items.iter().copied().filter(|x| *x >= 1_000).collect();
    assert_eq!(low, (0..500).collect::<Vec<_>>());
    assert_eq!(high, (1_000..1_500).collect::<Vec<_>>());
}

#[test]
fn merge_respects_downstream_demand() {
    let (rec, probe) = recorder::<i64>(0);
    merge([Flowable::range(0, 100), Flowable::range(100, 100)]).subscribe(rec);
    assert!(probe.items().is_empty());
    probe.request(7).unwrap();
    assert_eq!(probe.items().len(), 7);
    assert_eq!(probe.completions(), 0);
}

#[test]
fn merge_error_cancels_the_other_sources() {
    let cancelled = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancelled);
    let endless = Flowable::create(
        move |e: Emitter<u32>| {
            let flag = Arc::clone(&flag);
            e.on_cancel(move || flag.store(true, Ordering::SeqCst));
            e.next(1);
        },
        OverflowPolicy::Buffer,
    );
    let failing = Flowable::error(FlowError::msg("source failed"));

    let (rec, probe) = recorder::<u32>(UNBOUNDED);
    merge([endless, failing]).subscribe(rec);

    assert_eq!(probe.errors().len(), 1);
    assert_eq!(probe.completions(), 0);
    assert!(cancelled.load(Ordering::SeqCst));
}

#[test]
fn merge_of_nothing_completes() {
    let (rec, probe) = recorder::<u8>(0);
    merge(Vec::<Flowable<u8>>::new()).subscribe(rec);
    assert_eq!(probe.completions(), 1);
}

#[test]
fn concat_is_sequential_and_carries_demand() {
    let (rec, probe) = recorder::<i64>(0);
    concat([Flowable::range(0, 2), Flowable::range(10, 5)]).subscribe(rec);

    probe.request(3).unwrap();
    assert_eq!(probe.items(), vec![0, 1, 10]);

    probe.request(UNBOUNDED).unwrap();
    assert_eq!(probe.items(), vec![0, 1, 10, 11, 12, 13, 14]);
    assert_eq!(probe.completions(), 1);
}

#[test]
fn concat_subscribes_lazily() {
    let subscribed = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&subscribed);
    let second = Flowable::create(
        move |e: Emitter<i64>| {
            counter.fetch_add(1, Ordering::SeqCst);
            e.next(99);
            e.complete();
        },
        OverflowPolicy::Buffer,
    );

    let (rec, probe) = recorder::<i64>(0);
    Flowable::range(0, 3).concat_with(second).subscribe(rec);
    probe.request(2).unwrap();
    assert_eq!(subscribed.load(Ordering::SeqCst), 0);

    probe.request(2).unwrap();
    assert_eq!(subscribed.load(Ordering::SeqCst), 1);
    assert_eq!(probe.items(), vec![0, 1, 2, 99]);
    assert_eq!(probe.completions(), 1);
}

#[test]
fn concat_stops_at_the_first_error() {
    let (rec, probe) = recorder::<i64>(UNBOUNDED);
    concat([
        Flowable::range(0, 2),
        Flowable::error(FlowError::msg("halt")),
        Flowable::range(10, 2),
    ])
    .subscribe(rec);
    assert_eq!(probe.items(), vec![0, 1]);
    assert_eq!(probe.errors().len(), 1);
    assert_eq!(probe.completions(), 0);
}

#[test]
fn concat_of_many_synchronous_sources_does_not_recurse() {
    let sources: Vec<_> = (0..20_000).map(Flowable::just).collect();
    let (rec, probe) = recorder::<i32>(UNBOUNDED);
    concat(sources).subscribe(rec);
    assert_eq!(probe.items().len(), 20_000);
    assert_eq!(probe.completions(), 1);
}

#[test]
fn distinct_suppresses_repeats_per_subscription() {
    let source = Flowable::from_iter(vec![1, 2, 1, 3, 2, 4]).distinct();
    for _ in 0..2 {
        let (rec, probe) = recorder::<i32>(UNBOUNDED);
        source.subscribe(rec);
        assert_eq!(probe.items(), vec![1, 2, 3, 4]);
    }
}

#[test]
fn take_completes_early_and_cancels_upstream() {
    let cancelled = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancelled);
    let (rec, probe) = recorder::<u32>(UNBOUNDED);
    Flowable::create(
        move |e: Emitter<u32>| {
            let flag = Arc::clone(&flag);
            e.on_cancel(move || flag.store(true, Ordering::SeqCst));
            for i in 0..100 {
                e.next(i);
            }
        },
        OverflowPolicy::Buffer,
    )
    .take(3)
    .subscribe(rec);
    assert_eq!(probe.items(), vec![0, 1, 2]);
    assert_eq!(probe.completions(), 1);
    assert!(cancelled.load(Ordering::SeqCst));
}

#[test]
fn retry_resubscribes_on_accepted_errors() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);
    let flaky = Flowable::create(
        move |e: Emitter<usize>| {
            let attempt = counter.fetch_add(1, Ordering::SeqCst);
            e.next(attempt);
            if attempt < 2 {
                e.error(FlowError::msg("transient"));
            } else {
                e.complete();
            }
        },
        OverflowPolicy::Buffer,
    );

    let (rec, probe) = recorder::<usize>(UNBOUNDED);
    flaky.retry(3, |_| true).subscribe(rec);
    assert_eq!(probe.items(), vec![0, 1, 2]);
    assert_eq!(probe.completions(), 1);
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[test]
fn retry_gives_up_when_exhausted_or_rejected() {
    let (rec, probe) = recorder::<u8>(UNBOUNDED);
    Flowable::error(FlowError::msg("always"))
        .retry(2, |_| true)
        .subscribe(rec);
    assert_eq!(probe.errors().len(), 1);

    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);
    let (rec, probe) = recorder::<u8>(UNBOUNDED);
    Flowable::create(
        move |e: Emitter<u8>| {
            counter.fetch_add(1, Ordering::SeqCst);
            e.error(FlowError::Config("fatal".into()));
        },
        OverflowPolicy::Buffer,
    )
    .retry(5, |e| !matches!(e, FlowError::Config(_)))
    .subscribe(rec);
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert_eq!(probe.errors().len(), 1);
}

#[test]
fn from_callable_runs_once_per_subscription() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let source = Flowable::from_callable(move || -> Result<usize> {
        Ok(counter.fetch_add(1, Ordering::SeqCst) + 40)
    });
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    for expected in [40, 41] {
        let (rec, probe) = recorder::<usize>(UNBOUNDED);
        source.subscribe(rec);
        assert_eq!(probe.items(), vec![expected]);
        assert_eq!(probe.completions(), 1);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn from_callable_waits_for_demand() {
    let (rec, probe) = recorder::<i32>(0);
    Flowable::from_callable(|| Ok::<_, FlowError>(7)).subscribe(rec);
    assert!(probe.items().is_empty());
    probe.request(1).unwrap();
    assert_eq!(probe.items(), vec![7]);
    assert_eq!(probe.completions(), 1);
}

#[test]
fn from_callable_failures_become_errors() {
    let (rec, probe) = recorder::<i32>(UNBOUNDED);
    Flowable::from_callable(|| Err::<i32, _>(FlowError::msg("unavailable"))).subscribe(rec);
    assert_eq!(probe.errors().len(), 1);
    assert!(probe.items().is_empty());

    let (rec, probe) = recorder::<i32>(UNBOUNDED);
    Flowable::from_callable(|| -> Result<i32> { panic!("callable blew up") }).subscribe(rec);
    let errors = probe.errors();
    assert_eq!(errors.len(), 1);
    match &errors[0] {
        FlowError::Callback(msg) => assert!(msg.contains("callable blew up")),
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(probe.completions(), 0);
}

#[test]
fn flat_map_merges_every_inner() {
    let (rec, probe) = recorder::<i64>(UNBOUNDED);
    Flowable::range(1, 3)
        .flat_map(|x| Flowable::range(x * 10, 2))
        .subscribe(rec);
    let mut items = probe.items();
    items.sort();
    assert_eq!(items, vec![10, 11, 20, 21, 30, 31]);
    assert_eq!(probe.completions(), 1);
}

#[test]
fn flat_map_respects_downstream_demand() {
    let (rec, probe) = recorder::<i64>(0);
    Flowable::range(0, 100)
        .flat_map(|x| Flowable::range(x * 1_000, 10))
        .subscribe(rec);
    assert!(probe.items().is_empty());

    probe.request(3).unwrap();
    assert_eq!(probe.items().len(), 3);
    probe.request(UNBOUNDED).unwrap();
    assert_eq!(probe.items().len(), 1_000);
    assert_eq!(probe.completions(), 1);
}

#[test]
fn flat_map_with_asynchronous_inners_keeps_inner_order() {
    let (rec, probe) = recorder::<i64>(UNBOUNDED);
    Flowable::range(0, 4)
        .flat_map(|x| Flowable::range(x * 1_000, 200).subscribe_on(SchedulerKind::NewWorker))
        .subscribe(rec);

    assert!(probe.await_terminal(Duration::from_secs(10)));
    let items = probe.items();
    assert_eq!(items.len(), 800);
    for base in [0, 1_000, 2_000, 3_000] {
        let inner: Vec<_> = items
            .iter()
            .copied()
            .filter(|x| (base..base + 1_000).contains(x))
            .collect();
        assert_eq!(inner, (base..base + 200).collect::<Vec<_>>());
    }
}

#[test]
fn flat_map_inner_error_cancels_the_outer_source() {
    let cancelled = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancelled);
    let (rec, probe) = recorder::<u32>(UNBOUNDED);
    Flowable::create(
        move |e: Emitter<u32>| {
            let flag = Arc::clone(&flag);
            e.on_cancel(move || flag.store(true, Ordering::SeqCst));
            for i in 0..10 {
                e.next(i);
            }
        },
        OverflowPolicy::Buffer,
    )
    .flat_map(|x| {
        if x == 2 {
            Flowable::error(FlowError::msg("inner failed"))
        } else {
            Flowable::just(x)
        }
    })
    .subscribe(rec);

    assert_eq!(probe.items(), vec![0, 1]);
    assert_eq!(probe.errors().len(), 1);
    assert_eq!(probe.completions(), 0);
    assert!(cancelled.load(Ordering::SeqCst));
}

#[test]
fn flat_map_panic_becomes_callback_error() {
    let (rec, probe) = recorder::<i64>(UNBOUNDED);
    Flowable::range(0, 10)
        .flat_map(|x| {
            assert!(x < 3, "no inner for {x}");
            Flowable::just(x)
        })
        .subscribe(rec);
    assert_eq!(probe.items(), vec![0, 1, 2]);
    assert!(matches!(probe.errors()[0], FlowError::Callback(_)));
    assert_eq!(probe.completions(), 0);
}

#[test]
fn zip_with_pairs_items_and_ends_with_the_shorter_source() {
    let (rec, probe) = recorder::<String>(UNBOUNDED);
    Flowable::range(0, 5)
        .zip_with(Flowable::from_iter(vec!["a", "b", "c"]), |n, s| format!("{s}{n}"))
        .subscribe(rec);
    assert_eq!(probe.items(), vec!["a0", "b1", "c2"]);
    assert_eq!(probe.completions(), 1);
}

#[test]
fn zip_with_replenishes_both_sides_on_demand() {
    let (rec, probe) = recorder::<i64>(0);
    Flowable::range(0, 1_000)
        .zip_with(Flowable::range(0, 1_000), |a, b| a + b)
        .subscribe(rec);

    probe.request(2).unwrap();
    assert_eq!(probe.items(), vec![0, 2]);
    probe.request(UNBOUNDED).unwrap();
    assert_eq!(probe.items(), (0..1_000).map(|x| x * 2).collect::<Vec<_>>());
    assert_eq!(probe.completions(), 1);
}

#[test]
fn zip_with_across_threads_keeps_pairs_aligned() {
    let (rec, probe) = recorder::<(i64, i64)>(UNBOUNDED);
    Flowable::range(0, 500)
        .subscribe_on(SchedulerKind::NewWorker)
        .zip_with(
            Flowable::range(0, 500).subscribe_on(SchedulerKind::NewWorker),
            |a, b| (a, b),
        )
        .subscribe(rec);

    assert!(probe.await_terminal(Duration::from_secs(10)));
    let pairs = probe.items();
    assert_eq!(pairs.len(), 500);
    assert!(pairs.iter().all(|(a, b)| a == b));
}

#[test]
fn zip_with_fails_when_either_side_fails() {
    let (rec, probe) = recorder::<i64>(UNBOUNDED);
    Flowable::range(0, 5)
        .zip_with(Flowable::<i64>::error(FlowError::msg("right failed")), |a, b| a + b)
        .subscribe(rec);
    assert!(probe.items().is_empty());
    assert_eq!(probe.errors().len(), 1);
    assert_eq!(probe.completions(), 0);
}
