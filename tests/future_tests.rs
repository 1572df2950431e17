//! These tests cover what happens to a single future when its batch is
//! committed: transforms, slot binding, and listeners.

use batchfuture::{
    BatchFuture, MemoryExecutor, MemoryStore, Operation, Pipelined, Scheduler, Slot, UsageError,
    Value,
};
use std::{cell::RefCell, rc::Rc};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .try_init();
}

type EchoScheduler = Scheduler<MemoryExecutor<Pipelined>>;

fn echo(scheduler: &mut EchoScheduler, message: &str) -> BatchFuture<Value> {
    scheduler
        .schedule(Operation::new("ECHO").arg(message))
        .unwrap()
}

fn append(suffix: &'static str) -> impl FnOnce(Value) -> Value {
    move |value| match value {
        Value::Data(s) => Value::Data(s + suffix),
        other => other,
    }
}

#[test]
fn value_before_fulfillment() {
    let store = MemoryStore::new();
    let mut scheduler = Scheduler::new(store.pipeline());
    let fut = echo(&mut scheduler, "x");

    assert!(!fut.is_fulfilled());
    assert!(!fut.is_settled());
    assert_eq!(fut.value(), Err(UsageError::NotFulfilled));
    assert_eq!(fut.raw_value(), Err(UsageError::NotFulfilled));
    assert_eq!(fut.failure(), None);

    scheduler.commit().unwrap();

    assert!(fut.is_fulfilled());
    assert!(fut.is_settled());
    assert_eq!(fut.value().unwrap(), "x");
    assert_eq!(fut.value().unwrap(), "x");
    assert_eq!(fut.raw_value().unwrap(), "x");
}

#[test]
fn transform_chain_order() {
    let store = MemoryStore::new();
    let mut scheduler = Scheduler::new(store.pipeline());

    let forward = echo(&mut scheduler, "x");
    forward.map(append("1")).map(append("2"));

    let reverse = echo(&mut scheduler, "x");
    reverse.map(append("2")).map(append("1"));

    scheduler.commit().unwrap();

    assert_eq!(forward.value().unwrap(), "x12");
    assert_eq!(reverse.value().unwrap(), "x21");
    assert_eq!(forward.raw_value().unwrap(), "x");
    assert_eq!(reverse.raw_value().unwrap(), "x");
}

#[test]
fn transforms_can_change_kind() {
    let store = MemoryStore::new();
    store.insert("n", "20");
    let mut scheduler = Scheduler::new(store.pipeline());

    let fut = scheduler.schedule(Operation::new("GET").arg("n")).unwrap();
    fut.transform(|value| value.as_int().map(Value::Int).ok_or("not a number"))
        .map(|value| match value {
            Value::Int(n) => Value::Int(n + 1),
            other => other,
        });

    scheduler.commit().unwrap();

    assert_eq!(fut.value().unwrap(), Value::Int(21));
    assert_eq!(fut.raw_value().unwrap(), "20");
}

#[test]
fn bound_slot_sees_transformed_value() {
    let store = MemoryStore::new();
    let mut scheduler = Scheduler::new(store.pipeline());
    let fut = echo(&mut scheduler, "x");

    let slot = Slot::new();
    fut.bind(&slot).unwrap().map(append("!"));
    assert!(!slot.is_set());

    scheduler.commit().unwrap();

    assert_eq!(slot.get(), Some(fut.value().unwrap()));
    assert_eq!(slot.get().unwrap(), "x!");
    assert_ne!(slot.get(), Some(fut.raw_value().unwrap()));
}

#[test]
fn rebinding_replaces_slot() {
    let store = MemoryStore::new();
    let mut scheduler = Scheduler::new(store.pipeline());
    let fut = echo(&mut scheduler, "x");

    let first = Slot::new();
    let second = Slot::new();
    fut.bind(&first).unwrap();
    fut.bind(&second).unwrap();

    scheduler.commit().unwrap();

    assert_eq!(first.get(), None);
    assert_eq!(second.get().unwrap(), "x");
}

#[test]
fn bind_after_fulfillment() {
    let store = MemoryStore::new();
    let mut scheduler = Scheduler::new(store.pipeline());
    let fut = echo(&mut scheduler, "x");
    scheduler.commit().unwrap();

    let slot = Slot::new();
    assert_eq!(fut.bind(&slot).unwrap_err(), UsageError::BindAfterSettle);
    assert!(!slot.is_set());
}

#[test]
fn transform_after_fulfillment_is_inert() {
    let store = MemoryStore::new();
    let mut scheduler = Scheduler::new(store.pipeline());
    let fut = echo(&mut scheduler, "x");
    scheduler.commit().unwrap();

    fut.map(append("?"));
    assert_eq!(fut.value().unwrap(), "x");
}

#[test]
fn listeners_see_final_value() {
    let store = MemoryStore::new();
    let mut scheduler = Scheduler::new(store.pipeline());
    let fut = echo(&mut scheduler, "x");

    let seen = Rc::new(RefCell::new(Vec::new()));

    let seen_ref = Rc::clone(&seen);
    fut.map(append("y"))
        .when_fulfilled(move |value| seen_ref.borrow_mut().push(value.clone()));

    let seen_ref = Rc::clone(&seen);
    fut.on_fulfilled(move |value| seen_ref.borrow_mut().push(value.clone()));

    assert!(seen.borrow().is_empty());
    scheduler.commit().unwrap();

    let seen = seen.borrow();
    assert_eq!(seen.len(), 2);
    assert!(seen.iter().all(|value| *value == fut.value().unwrap()));
}

#[test]
fn listener_failure_is_isolated() {
    init_tracing();

    let store = MemoryStore::new();
    let mut scheduler = Scheduler::new(store.pipeline());
    let fut = echo(&mut scheduler, "x");
    let other = echo(&mut scheduler, "y");

    let calls = Rc::new(RefCell::new(0));

    let calls_ref = Rc::clone(&calls);
    fut.when_fulfilled(move |_| -> Result<(), &'static str> {
        *calls_ref.borrow_mut() += 1;
        Err("listener exploded")
    });

    let calls_ref = Rc::clone(&calls);
    fut.when_fulfilled(move |_| -> Result<(), String> {
        *calls_ref.borrow_mut() += 1;
        Ok(())
    });

    scheduler.commit().unwrap();

    assert_eq!(*calls.borrow(), 2);
    assert!(fut.is_fulfilled());
    assert!(other.is_fulfilled());
    assert!(scheduler.committed_successfully());
}

#[test]
fn listener_added_after_fulfillment_runs_immediately() {
    let store = MemoryStore::new();
    let mut scheduler = Scheduler::new(store.pipeline());
    let fut = echo(&mut scheduler, "x");
    scheduler.commit().unwrap();

    let seen = Rc::new(RefCell::new(None));
    let seen_ref = Rc::clone(&seen);
    fut.when_fulfilled(move |value| *seen_ref.borrow_mut() = Some(value.clone()));

    assert_eq!(*seen.borrow(), Some(Value::from("x")));
}

#[test]
fn failed_transform_skips_listeners_and_slot() {
    init_tracing();

    let store = MemoryStore::new();
    let mut scheduler = Scheduler::new(store.pipeline());
    let fut = echo(&mut scheduler, "x");

    let slot = Slot::new();
    let called = Rc::new(RefCell::new(false));
    let called_ref = Rc::clone(&called);

    fut.bind(&slot)
        .unwrap()
        .map(append("1"))
        .transform(|_| Err("no good"))
        .map(append("3"))
        .when_fulfilled(move |_| *called_ref.borrow_mut() = true);

    scheduler.commit().unwrap();

    assert!(!fut.is_fulfilled());
    assert!(fut.is_settled());
    assert_eq!(fut.value(), Err(UsageError::NotFulfilled));
    assert!(!slot.is_set());
    assert!(!*called.borrow());

    // A late listener isn't called either
    let called_ref = Rc::clone(&called);
    fut.when_fulfilled(move |_| *called_ref.borrow_mut() = true);
    assert!(!*called.borrow());
}

#[test]
fn clones_share_state() {
    let store = MemoryStore::new();
    let mut scheduler = Scheduler::new(store.pipeline());
    let fut = echo(&mut scheduler, "x");
    let clone = fut.clone();

    clone.map(append("z"));
    assert!(fut.ptr_eq(&clone));
    assert_eq!(fut.parent(), scheduler.id());

    scheduler.commit().unwrap();
    assert_eq!(fut.value().unwrap(), "xz");
}
