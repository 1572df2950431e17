use std::fmt::{self, Display, Formatter};

/// A description of a single command to run against a store: a command name
/// and its arguments. Operations are opaque to the scheduler; only the
/// [`BatchExecutor`][crate::BatchExecutor] interprets them.
///
/// ```
/// use batchfuture::Operation;
///
/// let op = Operation::new("SET").arg("key").arg("value");
/// assert_eq!(op.command(), "SET");
/// assert_eq!(op.arguments(), ["key", "value"]);
/// assert_eq!(op.to_string(), "SET key value");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Operation {
    command: String,
    args: Vec<String>,
}

impl Operation {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
        }
    }

    /// Append an argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I>(mut self, args: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[inline]
    pub fn command(&self) -> &str {
        &self.command
    }

    #[inline]
    pub fn arguments(&self) -> &[String] {
        &self.args
    }
}

impl Display for Operation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command)?;
        self.args.iter().try_for_each(|arg| write!(f, " {}", arg))
    }
}
