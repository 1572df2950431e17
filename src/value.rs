//! Dynamically typed store replies.

use std::fmt::{self, Display, Formatter};

/// A single reply from a store. This is the result type of the in-memory
/// executor, and a reasonable choice for any executor over a key-value store.
///
/// Because it can hold a sequence of other values, it's the natural result
/// type for [`Scheduler::reduce`][crate::Scheduler::reduce], which requires
/// `From<Vec<V>>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Nil,
    Int(i64),
    Data(String),
    /// A simple status reply, like `OK` or `PONG`.
    Status(String),
    /// A per-command error reply. This is data, not a failure of the batch.
    Error(String),
    Array(Vec<Value>),
}

impl Value {
    #[inline]
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Data(s) | Value::Status(s) => Some(s),
            _ => None,
        }
    }

    /// Interpret this value as an integer. `Data` replies are parsed, since
    /// stores commonly return numbers as strings.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Data(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn into_array(self) -> Option<Vec<Value>> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Data(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Data(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Nil, Into::into)
    }
}

impl PartialEq<str> for Value {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == Some(other)
    }
}

impl PartialEq<&str> for Value {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == Some(*other)
    }
}

impl PartialEq<i64> for Value {
    fn eq(&self, other: &i64) -> bool {
        matches!(self, Value::Int(i) if i == other)
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => f.write_str("(nil)"),
            Value::Int(i) => write!(f, "{}", i),
            Value::Data(s) => write!(f, "{:?}", s),
            Value::Status(s) => f.write_str(s),
            Value::Error(s) => write!(f, "(error) {}", s),
            Value::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
        }
    }
}
