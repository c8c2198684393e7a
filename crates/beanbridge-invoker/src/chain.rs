//! Chain composition
//!
//! A [`ChainBuilder`] collects [`Layer`]s outermost first and wraps a leaf
//! invoker in them. The usual order:
//!
//! ```text
//! Request
//!    │
//!    ▼
//! Retry        ← re-runs the whole transaction on transient failures
//!    │
//!    ▼
//! Logging      ← one entry/exit pair per attempt
//!    │
//!    ▼
//! Transaction  ← begin, commit or roll back, restore
//!    │
//!    ▼
//! Base         ← bean method
//! ```
//!
//! Putting Retry outside Transaction means each attempt gets its own
//! transaction.

use crate::cancel::CancelSignal;
use crate::error::InvokeError;
use crate::handle::ResourceHandle;
use crate::invoker::{Invoker, Request, Response, SharedInvoker};
use crate::logging::LoggingInvoker;
use crate::policy::TransactionPolicy;
use crate::retry::{ErrorTransform, RetryConfig, RetryInvoker, RetryPredicate};
use crate::transaction::{RollbackHook, TransactionInvoker};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Wraps an invoker in one decorator
pub trait Layer: Send + Sync {
    /// Wrap `inner`
    fn layer(&self, inner: SharedInvoker) -> SharedInvoker;

    /// Short name shown by [`InvokerChain::describe`]
    fn name(&self) -> &str;
}

/// Layer producing [`RetryInvoker`]s
#[derive(Clone, Default)]
pub struct RetryLayer {
    config: RetryConfig,
    transform: Option<ErrorTransform>,
    predicate: Option<RetryPredicate>,
    cancel: Option<CancelSignal>,
}

impl RetryLayer {
    /// Create layer with `max_retries` and default backoff
    #[inline]
    #[must_use]
    pub fn new(max_retries: u32) -> Self {
        Self::from_config(RetryConfig::new(max_retries))
    }

    /// Create layer from configuration
    #[must_use]
    pub fn from_config(config: RetryConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// With final-error transform
    #[must_use]
    pub fn with_transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(InvokeError) -> InvokeError + Send + Sync + 'static,
    {
        self.transform = Some(Arc::new(transform));
        self
    }

    /// With custom retry predicate
    #[must_use]
    pub fn with_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&InvokeError) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    /// With cancellation signal for backoff waits
    #[inline]
    #[must_use]
    pub fn with_cancel_signal(mut self, signal: CancelSignal) -> Self {
        self.cancel = Some(signal);
        self
    }
}

impl fmt::Debug for RetryLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryLayer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Layer for RetryLayer {
    fn layer(&self, inner: SharedInvoker) -> SharedInvoker {
        Arc::new(
            RetryInvoker::with_config(inner, self.config)
                .with_transform(self.transform.clone())
                .with_predicate(self.predicate.clone())
                .with_cancel_signal(self.cancel.clone()),
        )
    }

    fn name(&self) -> &str {
        "retry"
    }
}

/// Layer producing [`LoggingInvoker`]s
#[derive(Debug, Clone, Default)]
pub struct LoggingLayer {
    method: Option<String>,
}

impl LoggingLayer {
    /// Create layer with the default method identity
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With method identity
    #[inline]
    #[must_use]
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }
}

impl Layer for LoggingLayer {
    fn layer(&self, inner: SharedInvoker) -> SharedInvoker {
        let invoker = LoggingInvoker::new(inner);
        match &self.method {
            Some(method) => Arc::new(invoker.with_method(method.clone())),
            None => Arc::new(invoker),
        }
    }

    fn name(&self) -> &str {
        "logging"
    }
}

/// Layer producing [`TransactionInvoker`]s
#[derive(Clone, Default)]
pub struct TransactionLayer {
    policy: TransactionPolicy,
    hook: Option<Arc<dyn RollbackHook>>,
}

impl TransactionLayer {
    /// Create layer with a policy
    #[inline]
    #[must_use]
    pub fn new(policy: TransactionPolicy) -> Self {
        Self { policy, hook: None }
    }

    /// With rollback hook
    #[inline]
    #[must_use]
    pub fn with_rollback_hook(mut self, hook: Arc<dyn RollbackHook>) -> Self {
        self.hook = Some(hook);
        self
    }
}

impl fmt::Debug for TransactionLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionLayer")
            .field("policy", &self.policy)
            .field("has_rollback_hook", &self.hook.is_some())
            .finish()
    }
}

impl Layer for TransactionLayer {
    fn layer(&self, inner: SharedInvoker) -> SharedInvoker {
        let invoker = TransactionInvoker::with_policy(inner, self.policy);
        match &self.hook {
            Some(hook) => Arc::new(invoker.with_rollback_hook(Arc::clone(hook))),
            None => Arc::new(invoker),
        }
    }

    fn name(&self) -> &str {
        "transaction"
    }
}

/// Builder for invoker chains, outermost layer first
#[derive(Default)]
pub struct ChainBuilder {
    layers: Vec<Box<dyn Layer>>,
}

impl ChainBuilder {
    /// Create empty builder
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a retry layer with default backoff
    #[must_use]
    pub fn retry(self, max_retries: u32) -> Self {
        self.layer(RetryLayer::new(max_retries))
    }

    /// Add a logging layer
    #[must_use]
    pub fn logging(self, method: impl Into<String>) -> Self {
        self.layer(LoggingLayer::new().with_method(method))
    }

    /// Add a transaction layer
    #[must_use]
    pub fn transaction(self, policy: TransactionPolicy) -> Self {
        self.layer(TransactionLayer::new(policy))
    }

    /// Add any layer
    #[must_use]
    pub fn layer(mut self, layer: impl Layer + 'static) -> Self {
        self.layers.push(Box::new(layer));
        self
    }

    /// Number of layers added so far
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Check if no layer was added
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Wrap `base` in every layer
    pub fn build(self, base: impl Invoker + 'static) -> InvokerChain {
        let mut invoker: SharedInvoker = Arc::new(base);
        for layer in self.layers.iter().rev() {
            invoker = layer.layer(invoker);
        }

        let mut names: Vec<String> = self.layers.iter().map(|l| l.name().to_string()).collect();
        names.push("base".to_string());
        tracing::debug!(chain = %names.join(" -> "), "invoker chain built");

        InvokerChain { invoker, names }
    }
}

impl fmt::Debug for ChainBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.layers.iter().map(|l| l.name()).collect();
        f.debug_struct("ChainBuilder").field("layers", &names).finish()
    }
}

/// Assembled chain, itself an [`Invoker`]
#[derive(Clone)]
pub struct InvokerChain {
    invoker: SharedInvoker,
    names: Vec<String>,
}

impl InvokerChain {
    /// Layer names from outermost to the leaf, e.g. `retry -> transaction -> base`
    #[must_use]
    pub fn describe(&self) -> String {
        self.names.join(" -> ")
    }

    /// Outermost invoker
    #[inline]
    #[must_use]
    pub fn into_shared(self) -> SharedInvoker {
        self.invoker
    }
}

impl fmt::Debug for InvokerChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvokerChain")
            .field("layers", &self.names)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Invoker for InvokerChain {
    async fn invoke(
        &self,
        request: Request,
        handle: Option<&mut dyn ResourceHandle>,
    ) -> Result<Response, InvokeError> {
        self.invoker.invoke(request, handle).await
    }
}
