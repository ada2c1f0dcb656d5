// Copyright 2026 wraith Project Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{
    backtrace::Backtrace,
    fmt::{Debug, Display},
    sync::Arc,
};

/// All kinds of wraith errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A key (or a constructor argument used as a key) cannot be hashed.
    Unhashable,
    /// A value handed to the cache is already a weak handle.
    WeakValue,
    /// Arguments of the wrong shape.
    InvalidArgument,
    /// A storage slot refused a write through the plain path.
    ReadOnly,
    /// Lookup miss, either absent or resolved to a dropped value.
    ///
    /// Not a real error. Callers usually handle it with a default.
    NotFound,
    /// The peer of a stream hung up.
    StreamClosed,
    /// I/O error.
    Io,
    /// Config error.
    Config,
    /// External error, e.g. a failing constructor or compute function.
    External,
}

impl ErrorKind {
    /// Convert self into static str.
    pub fn into_static(self) -> &'static str {
        self.into()
    }

    /// Whether the error kind reports a misuse of the API at the call site.
    pub fn is_usage(self) -> bool {
        matches!(
            self,
            ErrorKind::Unhashable | ErrorKind::WeakValue | ErrorKind::InvalidArgument | ErrorKind::ReadOnly
        )
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.into_static())
    }
}

impl From<ErrorKind> for &'static str {
    fn from(v: ErrorKind) -> &'static str {
        match v {
            ErrorKind::Unhashable => "Unhashable key",
            ErrorKind::WeakValue => "Weak value",
            ErrorKind::InvalidArgument => "Invalid argument",
            ErrorKind::ReadOnly => "Read-only slot",
            ErrorKind::NotFound => "Not found",
            ErrorKind::StreamClosed => "Stream closed",
            ErrorKind::Io => "I/O error",
            ErrorKind::Config => "Config error",
            ErrorKind::External => "External error",
        }
    }
}

/// The error returned by all wraith functions.
///
/// `Display` prints a single line:
///
/// ```shell
/// Unhashable key, context: { type: Point } => key contains a mutable container
/// ```
///
/// `Debug` prints context, source and the captured backtrace on separate lines. The alternate
/// form (`{:#?}`) prints the conventional struct representation.
pub struct Error {
    kind: ErrorKind,
    message: String,

    context: Vec<(&'static str, String)>,

    source: Option<Arc<anyhow::Error>>,
    backtrace: Option<Arc<Backtrace>>,
}

impl Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if f.alternate() {
            return f
                .debug_struct("Error")
                .field("kind", &self.kind)
                .field("message", &self.message)
                .field("context", &self.context)
                .field("source", &self.source)
                .field("backtrace", &self.backtrace)
                .finish();
        }

        write!(f, "{}", self.kind)?;
        if !self.message.is_empty() {
            write!(f, " => {}", self.message)?;
        }
        writeln!(f)?;

        if !self.context.is_empty() {
            writeln!(f, "\nContext:")?;
            for (k, v) in self.context.iter() {
                writeln!(f, "  {k}: {v}")?;
            }
        }
        if let Some(source) = &self.source {
            writeln!(f, "\nSource:\n  {source:#}")?;
        }
        if let Some(backtrace) = &self.backtrace {
            writeln!(f, "\nBacktrace:\n{backtrace}")?;
        }
        Ok(())
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind)?;

        if !self.context.is_empty() {
            let context = self.context.iter().map(|(k, v)| format!("{k}: {v}")).collect::<Vec<_>>();
            write!(f, ", context: {{ {} }}", context.join(", "))?;
        }
        if !self.message.is_empty() {
            write!(f, " => {}", self.message)?;
        }
        if let Some(source) = &self.source {
            write!(f, ", source: {source}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|v| v.as_ref().as_ref())
    }
}

impl Clone for Error {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            message: self.message.clone(),
            context: self.context.clone(),
            source: self.source.clone(),
            backtrace: self.backtrace.clone(),
        }
    }
}

impl Error {
    /// Create a new error.
    ///
    /// Attach a cause with [`Error::with_source`]:
    ///
    /// ```rust
    /// # use wraith_common::error::{Error, ErrorKind};
    /// let cause = std::io::Error::other("constructor failed");
    /// Error::new(ErrorKind::External, "build instance failed").with_source(cause);
    /// ```
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        // `NotFound` is control flow on hot lookup paths, skip the backtrace.
        let backtrace = match kind {
            ErrorKind::NotFound => None,
            _ => Some(Arc::new(Backtrace::capture())),
        };
        Self {
            kind,
            message: message.into(),
            context: Vec::new(),
            source: None,
            backtrace,
        }
    }

    /// Add more context in error.
    pub fn with_context(mut self, key: &'static str, value: impl ToString) -> Self {
        self.context.push((key, value.to_string()));
        self
    }

    /// Set source for error.
    ///
    /// Panics in debug builds if the source has already been set.
    pub fn with_source(mut self, source: impl Into<anyhow::Error>) -> Self {
        debug_assert!(self.source.is_none(), "the source error has been set");
        self.source = Some(Arc::new(source.into()));
        self
    }

    /// Get the error kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Get the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the error context.
    pub fn context(&self) -> &[(&'static str, String)] {
        &self.context
    }

    /// Get the error backtrace.
    pub fn backtrace(&self) -> Option<&Backtrace> {
        self.backtrace.as_deref()
    }

    /// Get the error source.
    pub fn source(&self) -> Option<&anyhow::Error> {
        self.source.as_deref()
    }

    /// Downcast the reference of the source error to a specific error type reference.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source.as_deref().and_then(|e| e.downcast_ref::<E>())
    }

    /// Whether the error is a lookup miss.
    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }
}

/// Helper methods for Error.
impl Error {
    /// Helper for creating a [`ErrorKind::NotFound`] error.
    pub fn not_found() -> Self {
        Error::new(ErrorKind::NotFound, "")
    }

    /// Helper for creating an [`ErrorKind::Unhashable`] error for the given key rendering.
    pub fn unhashable(key: impl ToString) -> Self {
        Error::new(ErrorKind::Unhashable, "key is unhashable").with_context("key", key)
    }

    /// Helper for creating an [`ErrorKind::External`] error from a user supplied failure.
    pub fn external(message: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Error::new(ErrorKind::External, message).with_source(source)
    }

    /// Helper for creating an error from [`std::io::Error`].
    ///
    /// A broken pipe becomes [`ErrorKind::StreamClosed`] so that callers can tell a hung up peer
    /// apart from other I/O failures.
    pub fn io_error(source: std::io::Error) -> Self {
        match source.kind() {
            std::io::ErrorKind::BrokenPipe => Error::new(ErrorKind::StreamClosed, "stream closed").with_source(source),
            _ => Error::new(ErrorKind::Io, "i/o error").with_source(source),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::io_error(e)
    }
}

/// Result type for wraith.
pub type Result<T> = std::result::Result<T, Error>;
