//! Logging layer
//!
//! Emits an entry event, then a success or failure event with the elapsed
//! time. The outcome of the delegate is returned untouched.

use crate::error::InvokeError;
use crate::handle::ResourceHandle;
use crate::invoker::{Invoker, Request, Response};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Instant;
use uuid::Uuid;

/// Method identity used when none is configured
pub const UNKNOWN_METHOD: &str = "unknown";

/// Short JSON type name for log fields
#[must_use]
pub fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Invoker that logs each call to its delegate
#[derive(Debug, Clone)]
pub struct LoggingInvoker<I> {
    inner: I,
    method: String,
}

impl<I: Invoker> LoggingInvoker<I> {
    /// Wrap with the default method identity
    #[inline]
    #[must_use]
    pub fn new(inner: I) -> Self {
        Self {
            inner,
            method: UNKNOWN_METHOD.to_string(),
        }
    }

    /// With method identity shown in every event
    #[inline]
    #[must_use]
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    /// Method identity
    #[inline]
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Wrapped delegate
    #[inline]
    #[must_use]
    pub fn inner(&self) -> &I {
        &self.inner
    }
}

#[async_trait]
impl<I: Invoker> Invoker for LoggingInvoker<I> {
    async fn invoke(
        &self,
        request: Request,
        handle: Option<&mut dyn ResourceHandle>,
    ) -> Result<Response, InvokeError> {
        let invocation_id = Uuid::new_v4();
        let has_handle = handle.is_some();
        tracing::info!(
            %invocation_id,
            method = %self.method,
            request_kind = value_kind(&request),
            has_handle,
            "invoking bean method"
        );

        let started = Instant::now();
        let outcome = self.inner.invoke(request, handle).await;
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match &outcome {
            Ok(response) => tracing::info!(
                %invocation_id,
                method = %self.method,
                duration_ms,
                result_kind = value_kind(response),
                "bean method completed"
            ),
            Err(error) => tracing::error!(
                %invocation_id,
                method = %self.method,
                duration_ms,
                kind = error.kind(),
                error = %error,
                "bean method failed"
            ),
        }

        outcome
    }
}
