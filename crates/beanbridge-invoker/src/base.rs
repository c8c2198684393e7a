//! Leaf invoker: dispatch to a bound bean operation
//!
//! Binding happens once, when the invoker is built. A bean instance is
//! downcast to its concrete type and a method is looked up by name in a
//! [`MethodTable`]. Calls afterwards go straight to the stored closure.

use crate::error::{InvokeError, OperationFault};
use crate::handle::{reborrow, ResourceHandle};
use crate::invoker::{Invoker, Request, Response};
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::any::{type_name, Any};
use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Container-managed bean instance
pub type BeanRef = Arc<dyn Any + Send + Sync>;

/// Method of a bean of type `T`
pub type BeanMethod<T> = Arc<
    dyn for<'a> Fn(
            &'a T,
            Request,
            Option<&'a mut dyn ResourceHandle>,
        ) -> BoxFuture<'a, Result<Response, OperationFault>>
        + Send
        + Sync,
>;

/// Operation a [`BaseInvoker`] dispatches to
#[async_trait]
pub trait Operation: Send + Sync {
    /// Run the operation
    async fn call(
        &self,
        request: Request,
        handle: Option<&mut dyn ResourceHandle>,
    ) -> Result<Response, OperationFault>;
}

/// Named methods available on beans of type `T`
pub struct MethodTable<T> {
    methods: HashMap<String, BeanMethod<T>>,
}

impl<T: Send + Sync + 'static> MethodTable<T> {
    /// Create empty table
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            methods: HashMap::new(),
        }
    }

    /// Register a method
    ///
    /// ```rust,ignore
    /// let methods = MethodTable::<OrderService>::new()
    ///     .method("create", |bean, request, handle| {
    ///         Box::pin(async move { bean.create(request, handle).await })
    ///     });
    /// ```
    #[must_use]
    pub fn method<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: for<'a> Fn(
                &'a T,
                Request,
                Option<&'a mut dyn ResourceHandle>,
            ) -> BoxFuture<'a, Result<Response, OperationFault>>
            + Send
            + Sync
            + 'static,
    {
        self.methods.insert(name.into(), Arc::new(f));
        self
    }

    /// Look up a method
    #[inline]
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&BeanMethod<T>> {
        self.methods.get(name)
    }

    /// Check if a method exists
    #[inline]
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    /// Registered method names, sorted
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of methods
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    /// Check if table is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

impl<T: Send + Sync + 'static> Default for MethodTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + Sync + 'static> fmt::Debug for MethodTable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodTable")
            .field("bean_type", &type_name::<T>())
            .field("methods", &self.names())
            .finish()
    }
}

/// Bean instance paired with one of its methods
struct BoundMethod<T> {
    bean: Arc<T>,
    method: BeanMethod<T>,
}

#[async_trait]
impl<T: Send + Sync + 'static> Operation for BoundMethod<T> {
    async fn call(
        &self,
        request: Request,
        mut handle: Option<&mut dyn ResourceHandle>,
    ) -> Result<Response, OperationFault> {
        (self.method)(self.bean.as_ref(), request, reborrow(&mut handle)).await
    }
}

/// Leaf of every chain
///
/// Pure dispatch: no retries, no transaction awareness. Operation faults
/// and panics surface as [`InvokeError::Invocation`].
#[derive(Clone)]
pub struct BaseInvoker {
    target: String,
    operation: Arc<dyn Operation>,
}

impl BaseInvoker {
    /// Create invoker around an operation
    pub fn new(target: impl Into<String>, operation: impl Operation + 'static) -> Self {
        Self {
            target: target.into(),
            operation: Arc::new(operation),
        }
    }

    /// Create invoker around a bean and a method closure
    pub fn from_method<T, F>(target: impl Into<String>, bean: Arc<T>, method: F) -> Self
    where
        T: Send + Sync + 'static,
        F: for<'a> Fn(
                &'a T,
                Request,
                Option<&'a mut dyn ResourceHandle>,
            ) -> BoxFuture<'a, Result<Response, OperationFault>>
            + Send
            + Sync
            + 'static,
    {
        Self::new(
            target,
            BoundMethod {
                bean,
                method: Arc::new(method),
            },
        )
    }

    /// Bind a named method of a resolved bean
    ///
    /// # Errors
    /// - `InvokeError::Binding` if the bean is not a `T`
    /// - `InvokeError::Binding` if `methods` has no entry for `method`
    pub fn bind<T: Send + Sync + 'static>(
        bean_name: &str,
        bean: BeanRef,
        methods: &MethodTable<T>,
        method: &str,
    ) -> Result<Self, InvokeError> {
        let target = format!("{bean_name}::{method}");

        let bean = bean.downcast::<T>().map_err(|_| {
            InvokeError::binding(&target, format!("bean is not a `{}`", type_name::<T>()))
        })?;

        let bound = methods.get(method).cloned().ok_or_else(|| {
            InvokeError::binding(
                &target,
                format!("no method `{method}` on `{}`", type_name::<T>()),
            )
        })?;

        tracing::debug!(bean_method = %target, "bound bean method");
        Ok(Self::new(
            target,
            BoundMethod {
                bean,
                method: bound,
            },
        ))
    }

    /// Identity of the bound operation (`bean::method`)
    #[inline]
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }
}

impl fmt::Debug for BaseInvoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BaseInvoker")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Invoker for BaseInvoker {
    async fn invoke(
        &self,
        request: Request,
        handle: Option<&mut dyn ResourceHandle>,
    ) -> Result<Response, InvokeError> {
        match AssertUnwindSafe(self.operation.call(request, handle))
            .catch_unwind()
            .await
        {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(fault)) => Err(InvokeError::invocation(&self.target, fault)),
            Err(payload) => {
                let fault = OperationFault::panicked(payload.as_ref());
                tracing::error!(bean_method = %self.target, "{}", fault);
                Err(InvokeError::invocation(&self.target, fault))
            }
        }
    }
}
