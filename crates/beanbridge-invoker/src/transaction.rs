//! Transaction layer
//!
//! Wraps a delegate in begin/commit/rollback on the caller's resource
//! handle. Per call the handle moves through
//!
//! ```text
//! Idle → Started → Committed | RolledBack → Restored
//! ```
//!
//! The delegate's own error always wins over bookkeeping failures, and the
//! original auto-commit mode is put back on every path once it was read.

use crate::error::{InvokeError, TransactionError, TxStep};
use crate::handle::ResourceHandle;
use crate::invoker::{Invoker, Request, Response};
use crate::policy::TransactionPolicy;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Callback run after a rollback
///
/// Receives the handle and the delegate error, if there was one. Failures
/// are logged and never reach the caller.
#[async_trait]
pub trait RollbackHook: Send + Sync {
    /// Handle a completed rollback
    async fn on_rollback(
        &self,
        handle: &mut dyn ResourceHandle,
        error: Option<&InvokeError>,
    ) -> anyhow::Result<()>;
}

struct FnHook<F>(F);

#[async_trait]
impl<F> RollbackHook for FnHook<F>
where
    F: Fn(&mut dyn ResourceHandle, Option<&InvokeError>) -> anyhow::Result<()> + Send + Sync,
{
    async fn on_rollback(
        &self,
        handle: &mut dyn ResourceHandle,
        error: Option<&InvokeError>,
    ) -> anyhow::Result<()> {
        (self.0)(handle, error)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxPhase {
    Started,
    Committed,
    RolledBack,
    Restored,
}

impl fmt::Display for TxPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = match self {
            Self::Started => "started",
            Self::Committed => "committed",
            Self::RolledBack => "rolled_back",
            Self::Restored => "restored",
        };
        f.write_str(phase)
    }
}

/// Invoker that manages a transaction around its delegate
pub struct TransactionInvoker<I> {
    inner: I,
    policy: TransactionPolicy,
    on_rollback: Option<Arc<dyn RollbackHook>>,
}

impl<I: Invoker> TransactionInvoker<I> {
    /// Wrap with the default `CommitOnSuccess` policy
    #[inline]
    #[must_use]
    pub fn new(inner: I) -> Self {
        Self::with_policy(inner, TransactionPolicy::default())
    }

    /// Wrap with an explicit policy
    #[inline]
    #[must_use]
    pub fn with_policy(inner: I, policy: TransactionPolicy) -> Self {
        Self {
            inner,
            policy,
            on_rollback: None,
        }
    }

    /// Run a closure after every rollback
    #[must_use]
    pub fn on_rollback<F>(self, callback: F) -> Self
    where
        F: Fn(&mut dyn ResourceHandle, Option<&InvokeError>) -> anyhow::Result<()>
            + Send
            + Sync
            + 'static,
    {
        self.with_rollback_hook(Arc::new(FnHook(callback)))
    }

    /// Run a hook after every rollback
    #[inline]
    #[must_use]
    pub fn with_rollback_hook(mut self, hook: Arc<dyn RollbackHook>) -> Self {
        self.on_rollback = Some(hook);
        self
    }

    /// Configured policy
    #[inline]
    #[must_use]
    pub fn policy(&self) -> TransactionPolicy {
        self.policy
    }

    /// Wrapped delegate
    #[inline]
    #[must_use]
    pub fn inner(&self) -> &I {
        &self.inner
    }

    /// Commit or roll back according to policy
    async fn settle(
        &self,
        handle: &mut dyn ResourceHandle,
        failure: Option<&InvokeError>,
    ) -> Result<TxPhase, TransactionError> {
        let succeeded = failure.is_none();

        if self.policy.should_commit(succeeded) {
            if let Err(source) = handle.commit().await {
                let err = TransactionError::new(TxStep::Commit, source);
                tracing::error!(
                    policy = %self.policy,
                    succeeded,
                    error = %err,
                    "error handling transaction"
                );
                return Err(err);
            }
            tracing::debug!(
                policy = %self.policy,
                succeeded,
                phase = %TxPhase::Committed,
                "transaction committed"
            );
            return Ok(TxPhase::Committed);
        }

        if let Err(source) = handle.rollback().await {
            let err = TransactionError::new(TxStep::Rollback, source);
            tracing::error!(
                policy = %self.policy,
                succeeded,
                error = %err,
                "error handling transaction"
            );
            return Err(err);
        }
        tracing::debug!(
            policy = %self.policy,
            succeeded,
            phase = %TxPhase::RolledBack,
            "transaction rolled back"
        );

        if let Some(hook) = &self.on_rollback {
            if let Err(err) = hook.on_rollback(handle, failure).await {
                let detail = format!("{err:#}");
                tracing::error!(error = %detail, "error in rollback callback");
            }
        }
        Ok(TxPhase::RolledBack)
    }

    async fn restore(handle: &mut dyn ResourceHandle, auto_commit: bool) {
        match handle.set_auto_commit(auto_commit).await {
            Ok(()) => {
                tracing::trace!(
                    auto_commit,
                    phase = %TxPhase::Restored,
                    "auto-commit mode restored"
                );
            }
            Err(source) => {
                let err = TransactionError::new(TxStep::Restore, source);
                tracing::warn!(error = %err, "failed to restore auto-commit state");
            }
        }
    }
}

impl<I> fmt::Debug for TransactionInvoker<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionInvoker")
            .field("policy", &self.policy)
            .field("has_rollback_hook", &self.on_rollback.is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<I: Invoker> Invoker for TransactionInvoker<I> {
    async fn invoke(
        &self,
        request: Request,
        handle: Option<&mut dyn ResourceHandle>,
    ) -> Result<Response, InvokeError> {
        let Some(handle) = handle else {
            tracing::debug!("no resource handle provided, skipping transaction management");
            return self.inner.invoke(request, None).await;
        };

        let original = handle
            .auto_commit()
            .await
            .map_err(|source| TransactionError::new(TxStep::ReadMode, source))?;

        let outcome = match handle.set_auto_commit(false).await {
            Ok(()) => {
                tracing::debug!(
                    policy = %self.policy,
                    phase = %TxPhase::Started,
                    "transaction started"
                );
                let scoped: &mut dyn ResourceHandle = &mut *handle;
                self.inner.invoke(request, Some(scoped)).await
            }
            Err(source) => Err(TransactionError::new(TxStep::Begin, source).into()),
        };

        let settled = self.settle(&mut *handle, outcome.as_ref().err()).await;
        Self::restore(&mut *handle, original).await;

        match (outcome, settled) {
            (Ok(response), Ok(_)) => Ok(response),
            (Ok(_), Err(err)) => Err(err.into()),
            (Err(err), _) => Err(err),
        }
    }
}
