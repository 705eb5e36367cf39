use std::fmt;
use std::time::Duration;

use crate::model::StoreSide;

/// Failure of a single store operation (count or prefix listing).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Connection, DNS, TLS or request timeout failure.
    Transport(String),
    /// The backend answered with a non-success status.
    Status { status: u16, message: String },
    /// The backend answered but the body could not be understood.
    Malformed(String),
    /// Local IO error (filesystem backend).
    Io(String),
}

impl StoreError {
    /// Whether another attempt has a reasonable chance of succeeding.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Malformed(_) | Self::Io(_) => false,
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
            Self::Status { status, message } => write!(f, "HTTP {status}: {message}"),
            Self::Malformed(msg) => write!(f, "malformed response: {msg}"),
            Self::Io(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Why a single identifier's comparison did not produce two counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompareError {
    /// One of the two count calls failed.
    Count {
        identifier: String,
        side: StoreSide,
        store: String,
        source: StoreError,
    },
    /// Both counts did not arrive before the deadline.
    Timeout { identifier: String, after: Duration },
    /// Retried count failures until the backoff policy said stop.
    RetryExhausted {
        identifier: String,
        attempts: u32,
        last: Box<CompareError>,
    },
}

impl CompareError {
    pub fn identifier(&self) -> &str {
        match self {
            Self::Count { identifier, .. }
            | Self::Timeout { identifier, .. }
            | Self::RetryExhausted { identifier, .. } => identifier,
        }
    }

    /// Count failures with a transient cause. Timeouts already spent the
    /// whole budget and are never retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Count { source, .. } if source.is_transient())
    }
}

impl fmt::Display for CompareError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count { identifier, side, store, source } => {
                write!(f, "identifier '{identifier}': count in store {side} ('{store}') failed: {source}")
            }
            Self::Timeout { identifier, after } => {
                write!(f, "identifier '{identifier}': timed out after {}s waiting for counts", after.as_secs_f64())
            }
            Self::RetryExhausted { identifier, attempts, last } => {
                write!(f, "identifier '{identifier}': gave up after {attempts} attempt(s): {last}")
            }
        }
    }
}

impl std::error::Error for CompareError {}

#[derive(Debug)]
pub enum ReconError {
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config validation error (zero concurrency, bad jitter, etc.).
    ConfigValidation(String),
    /// Identifier enumeration failed; nothing can be compared.
    Listing {
        store: String,
        root: String,
        attempts: u32,
        source: StoreError,
    },
    /// IO error (identifier file, report sink, etc.).
    Io(String),
}

impl fmt::Display for ReconError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::Listing { store, root, attempts, source } => {
                write!(f, "listing '{root}' in store '{store}' failed after {attempts} attempt(s): {source}")
            }
            Self::Io(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for ReconError {}

impl From<std::io::Error> for ReconError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}
