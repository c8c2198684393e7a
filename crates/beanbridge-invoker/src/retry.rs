//! Retry layer
//!
//! Re-invokes the delegate on transient failures with exponential backoff.
//! When retries run out, or the failure is not transient, the last error is
//! passed through an optional transform and wrapped once in
//! [`BeanError::Exhausted`] unless it already is a [`BeanError`].

use crate::cancel::CancelSignal;
use crate::error::{BeanError, InvokeError};
use crate::handle::{reborrow, ResourceHandle};
use crate::invoker::{Invoker, Request, Response};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Default delay after the first failure
pub const DEFAULT_BASE_DELAY_MS: u64 = 100;

/// Default cap on a single delay
pub const DEFAULT_MAX_DELAY_MS: u64 = 5_000;

/// Rewrites the final error of a retry sequence
pub type ErrorTransform = Arc<dyn Fn(InvokeError) -> InvokeError + Send + Sync>;

/// Decides whether a failure is worth another attempt
pub type RetryPredicate = Arc<dyn Fn(&InvokeError) -> bool + Send + Sync>;

/// Exponential backoff: `min(base * 2^(attempt-1), max)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Backoff {
    /// Delay after the first failed attempt, in milliseconds
    pub base_delay_ms: u64,
    /// Upper bound on any single delay, in milliseconds
    pub max_delay_ms: u64,
}

impl Backoff {
    /// Create backoff from durations
    #[must_use]
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base_delay_ms: u64::try_from(base.as_millis()).unwrap_or(u64::MAX),
            max_delay_ms: u64::try_from(max.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Delay after failed attempt number `attempt` (1-based)
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63);
        let millis = self
            .base_delay_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_delay_ms);
        Duration::from_millis(millis)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
        }
    }
}

/// Retry configuration
///
/// ```toml
/// max_retries = 3
/// base_delay_ms = 100
/// max_delay_ms = 5000
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt; zero means a single attempt
    pub max_retries: u32,
    /// Delay schedule between attempts
    #[serde(flatten)]
    pub backoff: Backoff,
}

impl RetryConfig {
    /// Create config with default backoff
    #[inline]
    #[must_use]
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff: Backoff::default(),
        }
    }

    /// With custom backoff
    #[inline]
    #[must_use]
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Total attempts, first one included
    #[inline]
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Invoker that retries its delegate on transient failures
pub struct RetryInvoker<I> {
    inner: I,
    config: RetryConfig,
    transform: Option<ErrorTransform>,
    predicate: Option<RetryPredicate>,
    cancel: Option<CancelSignal>,
}

impl<I: Invoker> RetryInvoker<I> {
    /// Wrap without retries (errors are still wrapped)
    #[inline]
    #[must_use]
    pub fn new(inner: I) -> Self {
        Self::with_config(inner, RetryConfig::default())
    }

    /// Wrap with `max_retries` retries and default backoff
    #[inline]
    #[must_use]
    pub fn with_retries(inner: I, max_retries: u32) -> Self {
        Self::with_config(inner, RetryConfig::new(max_retries))
    }

    /// Wrap with explicit configuration
    #[must_use]
    pub fn with_config(inner: I, config: RetryConfig) -> Self {
        Self {
            inner,
            config,
            transform: None,
            predicate: None,
            cancel: None,
        }
    }

    /// Rewrite the final error with a closure
    #[must_use]
    pub fn transform_errors<F>(self, transform: F) -> Self
    where
        F: Fn(InvokeError) -> InvokeError + Send + Sync + 'static,
    {
        self.with_transform(Some(Arc::new(transform)))
    }

    /// Set or clear the final-error transform
    #[inline]
    #[must_use]
    pub fn with_transform(mut self, transform: Option<ErrorTransform>) -> Self {
        self.transform = transform;
        self
    }

    /// Replace the default transient-failure classification with a closure
    #[must_use]
    pub fn retry_if<F>(self, predicate: F) -> Self
    where
        F: Fn(&InvokeError) -> bool + Send + Sync + 'static,
    {
        self.with_predicate(Some(Arc::new(predicate)))
    }

    /// Set or clear the retry predicate
    #[inline]
    #[must_use]
    pub fn with_predicate(mut self, predicate: Option<RetryPredicate>) -> Self {
        self.predicate = predicate;
        self
    }

    /// Abort backoff waits when `signal` fires
    #[inline]
    #[must_use]
    pub fn with_cancel_signal(mut self, signal: Option<CancelSignal>) -> Self {
        self.cancel = signal;
        self
    }

    /// Configured retry count
    #[inline]
    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }

    /// Full configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Wrapped delegate
    #[inline]
    #[must_use]
    pub fn inner(&self) -> &I {
        &self.inner
    }

    fn should_retry(&self, error: &InvokeError) -> bool {
        if matches!(error, InvokeError::Cancelled { .. }) {
            return false;
        }
        match &self.predicate {
            Some(predicate) => predicate(error),
            None => error.is_retryable(),
        }
    }

    async fn pause(&self, delay: Duration, attempt: u32) -> Result<(), InvokeError> {
        let Some(signal) = &self.cancel else {
            tokio::time::sleep(delay).await;
            return Ok(());
        };

        tokio::select! {
            biased;
            () = signal.cancelled() => {
                tracing::warn!(attempt, "retry interrupted during backoff");
                Err(InvokeError::Cancelled { attempt })
            }
            () = tokio::time::sleep(delay) => Ok(()),
        }
    }

    fn finish(&self, error: InvokeError, attempts: u32) -> InvokeError {
        if matches!(error, InvokeError::Cancelled { .. }) {
            return error;
        }
        let error = match &self.transform {
            Some(transform) => transform(error),
            None => error,
        };
        if error.is_bean() {
            error
        } else {
            BeanError::exhausted(attempts, error).into()
        }
    }
}

impl<I> fmt::Debug for RetryInvoker<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryInvoker")
            .field("config", &self.config)
            .field("has_transform", &self.transform.is_some())
            .field("has_predicate", &self.predicate.is_some())
            .field("cancellable", &self.cancel.is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<I: Invoker> Invoker for RetryInvoker<I> {
    async fn invoke(
        &self,
        request: Request,
        mut handle: Option<&mut dyn ResourceHandle>,
    ) -> Result<Response, InvokeError> {
        let max_attempts = self.config.max_attempts();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let error = match self.inner.invoke(request.clone(), reborrow(&mut handle)).await {
                Ok(response) => {
                    if attempt > 1 {
                        tracing::debug!(attempt, "bean invocation succeeded after retry");
                    }
                    return Ok(response);
                }
                Err(error) => error,
            };

            let retryable = self.should_retry(&error);
            if retryable && attempt < max_attempts {
                let delay = self.config.backoff.delay(attempt);
                tracing::warn!(
                    attempt,
                    max_attempts,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %error,
                    "bean invocation failed, retrying"
                );
                self.pause(delay, attempt).await?;
                continue;
            }

            tracing::debug!(attempt, retryable, kind = error.kind(), "bean invocation gave up");
            return Err(self.finish(error, attempt));
        }
    }
}
