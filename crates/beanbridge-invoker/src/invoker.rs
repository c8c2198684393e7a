//! The invoker contract shared by every link of a chain

use crate::error::InvokeError;
use crate::handle::ResourceHandle;
use async_trait::async_trait;
use std::sync::Arc;

/// Request payload handed to a bean operation
pub type Request = serde_json::Value;

/// Result payload returned by a bean operation
pub type Response = serde_json::Value;

/// Type-erased invoker, shareable across tasks
pub type SharedInvoker = Arc<dyn Invoker>;

/// One link of an invoker chain
///
/// Implementations hold configuration only. Anything that changes during a
/// call (attempt counters, transaction flags) lives on the stack of
/// `invoke`, so a single chain can serve concurrent calls.
#[async_trait]
pub trait Invoker: Send + Sync {
    /// Execute the call
    ///
    /// # Arguments
    /// * `request` - payload for the target operation
    /// * `handle` - transactional resource lent for this call, if any
    async fn invoke(
        &self,
        request: Request,
        handle: Option<&mut dyn ResourceHandle>,
    ) -> Result<Response, InvokeError>;
}

#[async_trait]
impl<I: Invoker + ?Sized> Invoker for Arc<I> {
    async fn invoke(
        &self,
        request: Request,
        handle: Option<&mut dyn ResourceHandle>,
    ) -> Result<Response, InvokeError> {
        (**self).invoke(request, handle).await
    }
}

#[async_trait]
impl<I: Invoker + ?Sized> Invoker for Box<I> {
    async fn invoke(
        &self,
        request: Request,
        handle: Option<&mut dyn ResourceHandle>,
    ) -> Result<Response, InvokeError> {
        (**self).invoke(request, handle).await
    }
}
