//! Error types shared by the host evaluator, native extensions and the IO runner.

use std::sync::Arc;

use thiserror::Error;

use crate::pos::Pos;

/// Errors reported by the store backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// A build or substitution request failed.
    #[error("build of {path} failed: {message}")]
    BuildFailed { path: String, message: String },

    /// The backend could not answer a query.
    #[error("store error: {message}")]
    Other { message: String },
}

/// Failures of the native module loader.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LoaderError {
    /// The module could not be opened.
    #[error("could not open `{path}': {diagnostic}")]
    Open { path: String, diagnostic: String },

    /// The module was opened but does not export the requested symbol.
    #[error("could not load symbol `{symbol}' from `{path}': {diagnostic}")]
    Symbol {
        symbol: String,
        path: String,
        diagnostic: String,
    },
}

/// Errors raised while evaluating or running IO actions.
///
/// Errors are `Clone` so that a thunk whose evaluation failed can report the
/// same failure every time it is forced.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Generic evaluation failure raised by host code or an extension.
    #[error("{message}")]
    Eval { message: String },

    /// A forced value did not have the expected shape.
    #[error("{message}")]
    Type { message: String },

    /// A record is missing a required attribute.
    #[error("attribute `{name}' missing, at {pos}")]
    MissingAttribute { name: String, pos: Pos },

    /// Module open or symbol resolution failed.
    #[error(transparent)]
    Loader(#[from] LoaderError),

    /// A context reference is not a valid store path.
    #[error("{message}")]
    InvalidPath { path: String, message: String },

    /// Build or substitution failed in the backend.
    #[error(transparent)]
    Backend(#[from] StoreError),

    /// Replacing the process image failed.
    #[error("{message}: {source}")]
    ProcessReplacement {
        message: String,
        #[source]
        source: Arc<std::io::Error>,
    },

    /// Top-level invocation misuse.
    #[error("{0}")]
    Usage(String),

    /// Causal annotations added while the error propagated through the runner.
    ///
    /// `frames` is kept innermost first and printed outermost first. `inner`
    /// is never itself a `Trace`.
    #[error("{}", render_trace(.frames, .inner))]
    Trace {
        frames: Vec<String>,
        #[source]
        inner: Box<Error>,
    },
}

fn render_trace(frames: &[String], inner: &Error) -> String {
    let mut out = String::new();
    for frame in frames.iter().rev() {
        out.push_str(frame);
        out.push('\n');
    }
    out.push_str(&inner.to_string());
    out
}

impl Error {
    /// Create a generic evaluation error.
    pub fn eval(message: impl Into<String>) -> Self {
        Error::Eval {
            message: message.into(),
        }
    }

    /// Create a type error.
    pub fn type_error(message: impl Into<String>) -> Self {
        Error::Type {
            message: message.into(),
        }
    }

    /// Create the standard "value is X while Y was expected" type error.
    pub fn unexpected_type(actual: &str, expected: &str, pos: &Pos) -> Self {
        Error::type_error(format!(
            "value is {} while {} was expected, at {}",
            actual, expected, pos
        ))
    }

    /// Create a process replacement error from an OS error.
    pub fn process_replacement(message: impl Into<String>, source: std::io::Error) -> Self {
        Error::ProcessReplacement {
            message: message.into(),
            source: Arc::new(source),
        }
    }

    /// Wrap this error in a trace frame. The frame is printed before the
    /// wrapped message.
    pub fn with_frame(self, frame: impl Into<String>) -> Self {
        match self {
            Error::Trace { mut frames, inner } => {
                frames.push(frame.into());
                Error::Trace { frames, inner }
            }
            other => Error::Trace {
                frames: vec![frame.into()],
                inner: Box::new(other),
            },
        }
    }

    /// The error underneath all trace frames.
    pub fn root(&self) -> &Error {
        match self {
            Error::Trace { inner, .. } => inner,
            other => other,
        }
    }

    /// Trace frames from outermost to innermost.
    pub fn frames(&self) -> Vec<&str> {
        match self {
            Error::Trace { frames, .. } => frames.iter().rev().map(String::as_str).collect(),
            _ => Vec::new(),
        }
    }
}

/// Result type alias for host and runner operations.
pub type Result<T> = std::result::Result<T, Error>;
