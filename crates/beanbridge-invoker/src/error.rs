//! Error types for invoker chains
//!
//! Provides error handling for:
//! - Bean operation failures ([`OperationFault`])
//! - Resource handle and transaction bookkeeping ([`ResourceError`], [`TransactionError`])
//! - Factory resolution and retry exhaustion ([`BeanError`])
//! - The chain-wide result type ([`InvokeError`])

use std::borrow::Cow;
use std::fmt;

/// Boxed error used as an opaque cause
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Message fragments that mark a failure as possibly transient
const TRANSIENT_MARKERS: [&str; 3] = ["timeout", "connection", "unavailable"];

fn mentions_transient(message: &str) -> bool {
    let lower = message.to_lowercase();
    TRANSIENT_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// SQLSTATE code attached to a resource failure
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SqlState(String);

impl SqlState {
    /// Wrap a raw SQLSTATE code
    #[inline]
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Raw code
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Two-character class prefix
    #[must_use]
    pub fn class(&self) -> &str {
        self.0.get(..2).unwrap_or(&self.0)
    }

    /// Whether the code belongs to a class that may succeed on retry
    ///
    /// - `08xxx`: connection exceptions
    /// - `40xxx`: transaction rollback
    /// - `HY000`: general error
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self.class(), "08" | "40") || self.0 == "HY000"
    }
}

impl fmt::Display for SqlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Failure reported by a [`ResourceHandle`](crate::ResourceHandle)
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct ResourceError {
    message: String,
    state: Option<SqlState>,
}

impl ResourceError {
    /// Create error without a SQLSTATE
    #[inline]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            state: None,
        }
    }

    /// Create error carrying a SQLSTATE
    #[inline]
    pub fn with_state(message: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            state: Some(SqlState::new(state)),
        }
    }

    /// Error message
    #[inline]
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// SQLSTATE, if the resource reported one
    #[inline]
    #[must_use]
    pub fn state(&self) -> Option<&SqlState> {
        self.state.as_ref()
    }
}

/// Step of the transaction lifecycle that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStep {
    /// Reading the current auto-commit mode
    ReadMode,
    /// Switching to manual commit
    Begin,
    /// Committing
    Commit,
    /// Rolling back
    Rollback,
    /// Restoring the original auto-commit mode
    Restore,
}

impl fmt::Display for TxStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let step = match self {
            Self::ReadMode => "reading auto-commit mode",
            Self::Begin => "starting transaction",
            Self::Commit => "commit",
            Self::Rollback => "rollback",
            Self::Restore => "restoring auto-commit mode",
        };
        f.write_str(step)
    }
}

/// Transaction bookkeeping failure
#[derive(Debug, Clone, thiserror::Error)]
#[error("{step} failed: {source}")]
pub struct TransactionError {
    step: TxStep,
    #[source]
    source: ResourceError,
}

impl TransactionError {
    /// Create error for a failed step
    #[inline]
    #[must_use]
    pub fn new(step: TxStep, source: ResourceError) -> Self {
        Self { step, source }
    }

    /// Step that failed
    #[inline]
    #[must_use]
    pub fn step(&self) -> TxStep {
        self.step
    }

    /// Underlying resource failure
    #[inline]
    #[must_use]
    pub fn resource_error(&self) -> &ResourceError {
        &self.source
    }
}

/// Failure raised by a bean operation while it was executing
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct OperationFault {
    message: String,
    state: Option<SqlState>,
    #[source]
    cause: Option<BoxError>,
}

impl OperationFault {
    /// Create fault with a message
    #[inline]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            state: None,
            cause: None,
        }
    }

    /// Create fault carrying a SQLSTATE
    #[inline]
    pub fn with_state(message: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            state: Some(SqlState::new(state)),
            cause: None,
        }
    }

    /// Create fault wrapping an arbitrary error, keeping its message
    pub fn from_error(error: impl Into<BoxError>) -> Self {
        let cause = error.into();
        Self {
            message: cause.to_string(),
            state: None,
            cause: Some(cause),
        }
    }

    /// Attach a cause
    #[inline]
    #[must_use]
    pub fn caused_by(mut self, cause: impl Into<BoxError>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    /// Fault message
    #[inline]
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// SQLSTATE, if any
    #[inline]
    #[must_use]
    pub fn state(&self) -> Option<&SqlState> {
        self.state.as_ref()
    }

    pub(crate) fn panicked(payload: &(dyn std::any::Any + Send)) -> Self {
        let detail = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Self::new(format!("operation panicked: {detail}"))
    }
}

impl From<ResourceError> for OperationFault {
    fn from(error: ResourceError) -> Self {
        Self {
            message: error.message.clone(),
            state: error.state.clone(),
            cause: Some(Box::new(error)),
        }
    }
}

/// Bean factory and retry-exhaustion errors
#[derive(Debug, thiserror::Error)]
pub enum BeanError {
    /// No bean under the name, its mapping, or its type name
    #[error("cannot create bean `{name}`")]
    NotFound { name: String },

    /// No bean under the reference name or its mapping
    #[error("reference not found: {name}")]
    ReferenceNotFound { name: String },

    /// Bean resolved but has an unexpected type
    #[error("bean `{name}` is not a `{expected}`")]
    TypeMismatch {
        name: String,
        expected: &'static str,
    },

    /// Invocation kept failing until retries ran out
    #[error("bean invocation failed after {attempts} attempt(s): {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: Box<InvokeError>,
    },

    /// Free-form error, usually produced by an error transform
    #[error("{0}")]
    Other(String),
}

impl BeanError {
    /// Wrap the last error of a retry sequence
    #[inline]
    #[must_use]
    pub fn exhausted(attempts: u32, source: InvokeError) -> Self {
        Self::Exhausted {
            attempts,
            source: Box::new(source),
        }
    }

    /// Attempt count if this is a retry-exhaustion error
    #[inline]
    #[must_use]
    pub fn attempts(&self) -> Option<u32> {
        match self {
            Self::Exhausted { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }
}

/// Error returned by every link of an invoker chain
#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
    /// Operation could not be bound to its target
    #[error("cannot bind `{target}`: {reason}")]
    Binding { target: String, reason: String },

    /// Operation failed while executing
    #[error("`{target}` failed: {fault}")]
    Invocation {
        target: String,
        #[source]
        fault: OperationFault,
    },

    /// Transaction bookkeeping failed with no prior delegate error
    #[error("transaction error: {0}")]
    Transaction(#[from] TransactionError),

    /// Retry backoff was interrupted
    #[error("retry cancelled while backing off after attempt {attempt}")]
    Cancelled { attempt: u32 },

    /// Framework-level bean error
    #[error(transparent)]
    Bean(#[from] BeanError),
}

impl InvokeError {
    /// Create binding error
    pub fn binding(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Binding {
            target: target.into(),
            reason: reason.into(),
        }
    }

    /// Create invocation error
    pub fn invocation(target: impl Into<String>, fault: impl Into<OperationFault>) -> Self {
        Self::Invocation {
            target: target.into(),
            fault: fault.into(),
        }
    }

    /// Short name of the variant, for log fields
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Binding { .. } => "binding",
            Self::Invocation { .. } => "invocation",
            Self::Transaction(_) => "transaction",
            Self::Cancelled { .. } => "cancelled",
            Self::Bean(_) => "bean",
        }
    }

    /// Whether this is already a framework [`BeanError`]
    #[inline]
    #[must_use]
    pub fn is_bean(&self) -> bool {
        matches!(self, Self::Bean(_))
    }

    /// Message used for transient-failure detection
    #[must_use]
    pub fn message(&self) -> Cow<'_, str> {
        match self {
            Self::Binding { reason, .. } => Cow::Borrowed(reason),
            Self::Invocation { fault, .. } => Cow::Borrowed(fault.message()),
            Self::Transaction(err) => Cow::Borrowed(err.resource_error().message()),
            Self::Cancelled { .. } | Self::Bean(_) => Cow::Owned(self.to_string()),
        }
    }

    /// SQLSTATE carried by the innermost failure, if any
    #[must_use]
    pub fn sql_state(&self) -> Option<&SqlState> {
        match self {
            Self::Invocation { fault, .. } => fault.state(),
            Self::Transaction(err) => err.resource_error().state(),
            Self::Bean(BeanError::Exhausted { source, .. }) => source.sql_state(),
            _ => None,
        }
    }

    /// Default transient-failure classification
    ///
    /// A SQLSTATE, when present, decides alone. Otherwise the message is
    /// searched for a transient marker. Binding and cancellation errors are
    /// never retryable. Bean errors follow the failure they wrap, so bean
    /// names never take part.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Binding { .. } | Self::Cancelled { .. } => false,
            Self::Bean(BeanError::Exhausted { source, .. }) => source.is_retryable(),
            Self::Bean(_) => false,
            _ => match self.sql_state() {
                Some(state) => state.is_transient(),
                None => mentions_transient(&self.message()),
            },
        }
    }
}
