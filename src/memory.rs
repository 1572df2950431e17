//! An in-memory key-value store, with a [`BatchExecutor`] for each of the
//! three commit strategies:
//!
//! - [`Pipelined`]: every operation is sent in a single round trip and applied
//!   in order. Invalid commands produce a [`Value::Error`] result, and don't
//!   affect the rest of the batch. Not atomic.
//! - [`Transactional`]: each operation is sent to the store (and checked) as
//!   it's scheduled, then the whole batch is applied atomically on commit. If
//!   any operation was rejected, nothing is applied.
//! - [`Queued`]: operations are queued locally, then sent and applied
//!   atomically in a single round trip on commit. Checking happens at commit.
//!
//! As in most real stores, a command that is well formed but fails at runtime
//! (like `INCR` on a non-integer) produces an error *result* under every
//! strategy; it never aborts a transaction.

use std::{
    cell::RefCell,
    collections::HashMap,
    fmt::Debug,
    marker::PhantomData,
    mem,
    num::NonZeroUsize,
    rc::Rc,
};

use thiserror::Error;
use tracing::debug;

use crate::{
    executor::{AtomicExecutor, BatchExecutor},
    operation::Operation,
    value::Value,
};

/// The shared key space. Cloning a `MemoryStore` creates another handle to
/// the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    data: Rc<RefCell<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: impl Into<String>, value: impl Into<String>) {
        self.data.borrow_mut().insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.data.borrow().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.data.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.borrow().is_empty()
    }

    /// Create an executor with the given strategy and rules.
    pub fn executor<S: CommitStrategy>(&self, rules: StoreRules) -> MemoryExecutor<S> {
        MemoryExecutor {
            store: self.clone(),
            rules,
            queue: Vec::new(),
            rejected: None,
            failure: None,
            round_trips: 0,
            strategy: PhantomData,
        }
    }

    pub fn pipeline(&self) -> MemoryExecutor<Pipelined> {
        self.executor(StoreRules::default())
    }

    pub fn transaction(&self) -> MemoryExecutor<Transactional> {
        self.executor(StoreRules::default())
    }

    pub fn queued(&self) -> MemoryExecutor<Queued> {
        self.executor(StoreRules::default())
    }
}

/// Configuration for a [`MemoryExecutor`].
#[derive(Debug, Clone, Default)]
pub struct StoreRules {
    /// If set, committing a batch with more operations than this fails with
    /// [`StoreError::BatchTooLarge`].
    pub max_operations: Option<NonZeroUsize>,
}

/// How a [`MemoryExecutor`] commits its batch.
pub trait CommitStrategy: Debug {
    const NAME: &'static str;
    const ATOMIC: bool;
    const SEND_ON_SCHEDULE: bool;
}

#[derive(Debug)]
pub enum Pipelined {}

#[derive(Debug)]
pub enum Transactional {}

#[derive(Debug)]
pub enum Queued {}

impl CommitStrategy for Pipelined {
    const NAME: &'static str = "pipeline";
    const ATOMIC: bool = false;
    const SEND_ON_SCHEDULE: bool = false;
}

impl CommitStrategy for Transactional {
    const NAME: &'static str = "transaction";
    const ATOMIC: bool = true;
    const SEND_ON_SCHEDULE: bool = true;
}

impl CommitStrategy for Queued {
    const NAME: &'static str = "queued transaction";
    const ATOMIC: bool = true;
    const SEND_ON_SCHEDULE: bool = false;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("batch of {scheduled} operations exceeds the limit of {limit}")]
    BatchTooLarge { scheduled: usize, limit: usize },

    #[error("transaction aborted: operation {index} rejected: {reason}")]
    Aborted { index: usize, reason: String },
}

/// A [`BatchExecutor`] over a [`MemoryStore`].
#[derive(Debug)]
pub struct MemoryExecutor<S> {
    store: MemoryStore,
    rules: StoreRules,
    queue: Vec<Operation>,

    // The first operation the store refused while it was being queued. Only
    // used by strategies that send operations as they're scheduled.
    rejected: Option<(usize, String)>,
    failure: Option<String>,
    round_trips: usize,
    strategy: PhantomData<S>,
}

impl<S: CommitStrategy> MemoryExecutor<S> {
    #[inline]
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// The number of operations waiting for a commit.
    #[inline]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// The number of simulated trips to the store so far.
    #[inline]
    pub fn round_trips(&self) -> usize {
        self.round_trips
    }

    /// Make the next commit fail as though the connection was lost.
    pub fn fail_next_commit(&mut self, reason: impl Into<String>) {
        self.failure = Some(reason.into());
    }
}

impl<S: CommitStrategy> BatchExecutor for MemoryExecutor<S> {
    type Value = Value;
    type Error = StoreError;

    fn schedule(&mut self, operation: Operation) {
        if S::SEND_ON_SCHEDULE {
            self.round_trips += 1;
            if self.rejected.is_none() {
                if let Err(reason) = validate(&operation) {
                    self.rejected = Some((self.queue.len(), reason));
                }
            }
        }

        self.queue.push(operation);
    }

    fn commit(&mut self) -> Result<Vec<Value>, StoreError> {
        let queue = mem::take(&mut self.queue);
        let rejected = self.rejected.take();
        self.round_trips += 1;

        debug!(strategy = S::NAME, operations = queue.len(), "executing batch");

        if let Some(reason) = self.failure.take() {
            return Err(StoreError::Connection(reason));
        }

        if let Some(limit) = self.rules.max_operations {
            if queue.len() > limit.get() {
                return Err(StoreError::BatchTooLarge {
                    scheduled: queue.len(),
                    limit: limit.get(),
                });
            }
        }

        if !S::ATOMIC {
            let mut data = self.store.data.borrow_mut();
            return Ok(queue.iter().map(|op| apply(&mut data, op)).collect());
        }

        let rejected = match S::SEND_ON_SCHEDULE {
            true => rejected,
            false => queue
                .iter()
                .enumerate()
                .find_map(|(index, op)| validate(op).err().map(|reason| (index, reason))),
        };

        if let Some((index, reason)) = rejected {
            return Err(StoreError::Aborted { index, reason });
        }

        // Apply to a copy, and swap it in once the whole batch has run.
        let mut working = self.store.data.borrow().clone();
        let results = queue.iter().map(|op| apply(&mut working, op)).collect();
        *self.store.data.borrow_mut() = working;

        Ok(results)
    }
}

impl AtomicExecutor for MemoryExecutor<Transactional> {}
impl AtomicExecutor for MemoryExecutor<Queued> {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Ping,
    Echo,
    Get,
    Set,
    Del,
    Exists,
    Incr,
    IncrBy,
    Decr,
    Append,
    Strlen,
    Mget,
}

impl Command {
    fn parse(name: &str) -> Option<Self> {
        Some(match name.to_ascii_uppercase().as_str() {
            "PING" => Command::Ping,
            "ECHO" => Command::Echo,
            "GET" => Command::Get,
            "SET" => Command::Set,
            "DEL" => Command::Del,
            "EXISTS" => Command::Exists,
            "INCR" => Command::Incr,
            "INCRBY" => Command::IncrBy,
            "DECR" => Command::Decr,
            "APPEND" => Command::Append,
            "STRLEN" => Command::Strlen,
            "MGET" => Command::Mget,
            _ => return None,
        })
    }

    /// Minimum and (optional) maximum argument count
    fn arity(self) -> (usize, Option<usize>) {
        match self {
            Command::Ping => (0, Some(1)),
            Command::Echo | Command::Get | Command::Incr | Command::Decr | Command::Strlen => {
                (1, Some(1))
            }
            Command::Set | Command::IncrBy | Command::Append => (2, Some(2)),
            Command::Del | Command::Exists | Command::Mget => (1, None),
        }
    }
}

fn validate(op: &Operation) -> Result<Command, String> {
    let command = Command::parse(op.command())
        .ok_or_else(|| format!("ERR unknown command '{}'", op.command()))?;

    let (min, max) = command.arity();
    let count = op.arguments().len();

    if count < min || max.map_or(false, |max| count > max) {
        return Err(format!(
            "ERR wrong number of arguments for '{}' command",
            op.command().to_ascii_lowercase()
        ));
    }

    Ok(command)
}

fn not_integer() -> Value {
    Value::Error("ERR value is not an integer or out of range".to_owned())
}

fn increment(data: &mut HashMap<String, String>, key: &str, by: i64) -> Value {
    let current = match data.get(key).map(|value| value.parse::<i64>()) {
        None => 0,
        Some(Ok(current)) => current,
        Some(Err(..)) => return not_integer(),
    };

    match current.checked_add(by) {
        Some(next) => {
            data.insert(key.to_owned(), next.to_string());
            Value::Int(next)
        }
        None => Value::Error("ERR increment or decrement would overflow".to_owned()),
    }
}

fn apply(data: &mut HashMap<String, String>, op: &Operation) -> Value {
    let command = match validate(op) {
        Ok(command) => command,
        Err(reason) => return Value::Error(reason),
    };

    // Argument counts were checked by validate.
    let args = op.arguments();

    match command {
        Command::Ping => match args.first() {
            None => Value::Status("PONG".to_owned()),
            Some(message) => Value::Data(message.clone()),
        },
        Command::Echo => Value::Data(args[0].clone()),
        Command::Get => Value::from(data.get(&args[0]).cloned()),
        Command::Set => {
            data.insert(args[0].clone(), args[1].clone());
            Value::Status("OK".to_owned())
        }
        Command::Del => {
            let removed = args
                .iter()
                .filter(|key| data.remove(key.as_str()).is_some())
                .count();
            Value::Int(removed as i64)
        }
        Command::Exists => {
            let found = args
                .iter()
                .filter(|key| data.contains_key(key.as_str()))
                .count();
            Value::Int(found as i64)
        }
        Command::Incr => increment(data, &args[0], 1),
        Command::Decr => increment(data, &args[0], -1),
        Command::IncrBy => match args[1].parse() {
            Ok(by) => increment(data, &args[0], by),
            Err(..) => not_integer(),
        },
        Command::Append => {
            let entry = data.entry(args[0].clone()).or_default();
            entry.push_str(&args[1]);
            Value::Int(entry.len() as i64)
        }
        Command::Strlen => Value::Int(data.get(&args[0]).map_or(0, String::len) as i64),
        Command::Mget => Value::Array(
            args.iter()
                .map(|key| Value::from(data.get(key).cloned()))
                .collect(),
        ),
    }
}
