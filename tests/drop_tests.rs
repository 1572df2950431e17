//! These tests ensure that futures are shared correctly between the
//! scheduler, callers, and listeners, and released when they should be.

use batchfuture::{MemoryStore, Operation, Scheduler, Value};
use std::{cell::RefCell, rc::Rc};

/// A value whose drops we can count
#[derive(Debug, Clone)]
struct Tracked {
    value: Value,
    _alive: Rc<()>,
}

#[test]
fn listeners_run_after_caller_drops_future() {
    let store = MemoryStore::new();
    let mut scheduler = Scheduler::new(store.pipeline());

    let fut = scheduler.schedule(Operation::new("PING")).unwrap();
    let seen = Rc::new(RefCell::new(None));

    // The listener captures a second handle to the future, which would be a
    // cycle if listeners weren't released after they run.
    let fut_ref = fut.clone();
    let seen_ref = Rc::clone(&seen);
    fut.when_fulfilled(move |_| *seen_ref.borrow_mut() = Some(fut_ref.is_fulfilled()));

    drop(fut);
    scheduler.commit().unwrap();

    // The listener ran, even though the caller dropped its handle.
    assert_eq!(*seen.borrow(), Some(true));
    assert_eq!(Rc::strong_count(&seen), 1);
}

#[test]
fn dropped_futures_still_receive_results() {
    let store = MemoryStore::new();
    let mut scheduler = Scheduler::new(store.pipeline());

    drop(scheduler.schedule(Operation::new("SET").args(["a", "1"])).unwrap());
    let get = scheduler.schedule(Operation::new("GET").arg("a")).unwrap();

    let results = scheduler.commit().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(get.value().unwrap(), "1");
}

#[test]
fn values_are_released_with_future() {
    let store = MemoryStore::new();
    let mut scheduler = Scheduler::new(store.pipeline());

    let alive = Rc::new(());
    let slot = Rc::new(RefCell::new(None));

    let fut = scheduler.schedule(Operation::new("ECHO").arg("x")).unwrap();
    let alive_ref = Rc::clone(&alive);
    let slot_ref = Rc::clone(&slot);
    fut.when_fulfilled(move |value| {
        *slot_ref.borrow_mut() = Some(Tracked {
            value: value.clone(),
            _alive: alive_ref,
        })
    });

    // The listener holds a reference until it runs
    assert_eq!(Rc::strong_count(&alive), 2);

    scheduler.commit().unwrap();

    // ...and then hands it off
    assert_eq!(Rc::strong_count(&alive), 2);
    let tracked = slot.borrow_mut().take().unwrap();
    assert_eq!(tracked.value, "x");
    drop(tracked);
    assert_eq!(Rc::strong_count(&alive), 1);
}

#[test]
fn unrun_listeners_are_released_on_failure() {
    let store = MemoryStore::new();
    let mut scheduler = Scheduler::new(store.pipeline());

    let alive = Rc::new(());
    let fut = scheduler.schedule(Operation::new("ECHO").arg("x")).unwrap();

    let alive_ref = Rc::clone(&alive);
    fut.transform(move |value| {
        let _keep = &alive_ref;
        Err(format!("rejecting {}", value))
    });

    let alive_ref = Rc::clone(&alive);
    fut.when_fulfilled(move |_| drop(alive_ref));
    assert_eq!(Rc::strong_count(&alive), 3);

    scheduler.commit().unwrap();

    assert!(!fut.is_fulfilled());
    assert_eq!(Rc::strong_count(&alive), 1);
}

#[test]
fn reduce_group_releases_derived_future() {
    let store = MemoryStore::new();
    let mut scheduler = Scheduler::new(store.pipeline());

    let fut0 = scheduler.schedule(Operation::new("ECHO").arg("a")).unwrap();
    let fut1 = scheduler.schedule(Operation::new("ECHO").arg("b")).unwrap();

    let seen = Rc::new(RefCell::new(None));
    let seen_ref = Rc::clone(&seen);

    // The caller never holds the derived future; it's kept alive by the
    // reduce group until it's fulfilled.
    scheduler
        .reduce(&[fut0, fut1])
        .unwrap()
        .when_fulfilled(move |value| *seen_ref.borrow_mut() = Some(value.clone()));

    scheduler.commit().unwrap();
    assert_eq!(
        *seen.borrow(),
        Some(Value::from(vec![Value::from("a"), Value::from("b")]))
    );
}

#[test]
fn uncommitted_scheduler_releases_listeners() {
    let store = MemoryStore::new();
    let mut scheduler = Scheduler::new(store.pipeline());

    let alive = Rc::new(());
    let fut = scheduler.schedule(Operation::new("PING")).unwrap();

    // The listener holds its own future, which is a cycle until the future
    // settles.
    let fut_ref = fut.clone();
    let alive_ref = Rc::clone(&alive);
    fut.when_fulfilled(move |_| drop((fut_ref, alive_ref)));
    assert_eq!(Rc::strong_count(&alive), 2);

    drop(scheduler);

    assert!(fut.is_settled());
    assert!(!fut.is_fulfilled());
    assert_eq!(Rc::strong_count(&alive), 1);
}
