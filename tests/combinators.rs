//! Aggregation semantics: both `all` forms under real concurrency.

mod common;

use std::time::Duration;

use deferq::{all, defer, failed, run, with, CombinedPromiseException, Exception, Promise};

#[test]
fn heterogeneous_all_concatenates_values() {
    common::context();
    let combined = all((with(1), with("a"), with(2.5)))
        .get()
        .expect("combined tuple");
    assert_eq!(combined, (1, "a", 2.5));
}

#[test]
fn heterogeneous_all_over_chained_inputs() {
    common::context();
    let first = with(10).then(|x| x + 1);
    let second = with("abc").then(str::len);
    let combined = all((first, second)).get().expect("combined");
    assert_eq!(combined, (11, 3));
}

#[test]
fn heterogeneous_all_fails_with_first_observed_exception() {
    common::context();
    let exception = all((
        with(1),
        failed::<&str>(Exception::msg("left the building")),
        with(3),
    ))
    .get()
    .expect_err("aggregate failure");
    assert_eq!(exception.to_string(), "left the building");
}

#[test]
fn zero_ary_all_resolves() {
    common::context();
    all(()).get().expect("unit");
}

#[test]
fn list_all_preserves_input_order_under_scrambled_completion() {
    common::context();
    let mut promises = Vec::new();
    let mut threads = Vec::new();
    for i in 0..6_usize {
        let deferred = defer::<usize>();
        promises.push(deferred.get_promise().expect("promise"));
        threads.push(std::thread::spawn(move || {
            // Later inputs settle earlier.
            std::thread::sleep(Duration::from_millis(5 * (6 - i as u64)));
            deferred.set_value(i * 100).expect("resolution");
        }));
    }

    let values = all(promises).get().expect("values");
    assert_eq!(values, vec![0, 100, 200, 300, 400, 500]);
    for thread in threads {
        thread.join().expect("resolver thread");
    }
}

#[test]
fn list_all_waits_for_every_input_and_reports_each_outcome() {
    common::context();
    let combined = all(vec![
        with(1),
        failed::<i32>(Exception::msg("odd one out")),
        with(3),
    ]);

    let exception = combined.get().expect_err("aggregate failure");
    let aggregated = exception
        .downcast_ref::<CombinedPromiseException<i32>>()
        .expect("combined exception");

    let expects = aggregated.expects();
    assert_eq!(expects.len(), 3);
    assert!(!expects[0].has_exception());
    assert!(expects[1].has_exception());
    assert!(!expects[2].has_exception());
    assert_eq!(
        expects[1].exception().expect("element exception").to_string(),
        "odd one out"
    );
}

#[test]
fn list_all_collects_results_from_worker_threads() {
    common::context();
    let promises: Vec<Promise<u64>> = (0..5_u64)
        .map(|i| {
            let mut thread = run(format!("squarer-{i}"), move || i * i);
            thread.promise().expect("thread promise")
        })
        .collect();

    let values = all(promises).get().expect("squares");
    assert_eq!(values, vec![0, 1, 4, 9, 16]);
}

#[test]
fn empty_list_all_resolves_immediately() {
    common::context();
    let values = all(Vec::<Promise<i32>>::new()).get().expect("empty vec");
    assert!(values.is_empty());
}

#[test]
fn aggregate_failure_can_be_recovered_downstream() {
    common::context();
    let total = all(vec![with(1), failed::<i32>(Exception::msg("partial")), with(3)])
        .fail(|exception| {
            let aggregated = exception
                .downcast_ref::<CombinedPromiseException<i32>>()
                .expect("combined exception");
            // Salvage the successes.
            aggregated
                .expects()
                .iter()
                .filter(|e| !e.has_exception())
                .count() as i32
        })
        .then(|salvaged| salvaged * 10)
        .get()
        .expect("recovered");
    assert_eq!(total, 20);
}
