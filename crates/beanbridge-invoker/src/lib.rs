//! BeanBridge Invoker - composable call interception for legacy beans
//!
//! Wraps a bean method in a chain of decorators sharing one call signature
//! `(request, resource handle) -> response`:
//! - [`BaseInvoker`] dispatches to a method bound at construction time
//! - [`TransactionInvoker`] commits or rolls back around the call
//! - [`LoggingInvoker`] records entry, duration and outcome
//! - [`RetryInvoker`] re-runs transient failures with exponential backoff
//!
//! # Example
//!
//! ```rust,ignore
//! use beanbridge_invoker::prelude::*;
//!
//! # async fn example(
//! #     bean: BeanRef,
//! #     methods: MethodTable<OrderService>,
//! #     conn: &mut dyn ResourceHandle,
//! # ) -> Result<(), InvokeError> {
//! let base = BaseInvoker::bind("orderService", bean, &methods, "create")?;
//! let chain = ChainBuilder::new()
//!     .retry(3)
//!     .logging("orderService::create")
//!     .transaction(TransactionPolicy::CommitOnSuccess)
//!     .build(base);
//!
//! let order = chain.invoke(serde_json::json!({ "sku": "A-1" }), Some(conn)).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod base;
pub mod cancel;
pub mod chain;
pub mod error;
pub mod handle;
pub mod invoker;
pub mod logging;
pub mod policy;
pub mod retry;
pub mod transaction;

// Re-exports for convenience
pub use base::{BaseInvoker, BeanMethod, BeanRef, MethodTable, Operation};
pub use cancel::CancelSignal;
pub use chain::{ChainBuilder, InvokerChain, Layer, LoggingLayer, RetryLayer, TransactionLayer};
pub use error::{
    BeanError, BoxError, InvokeError, OperationFault, ResourceError, SqlState, TransactionError,
    TxStep,
};
pub use handle::{reborrow, ResourceHandle};
pub use invoker::{Invoker, Request, Response, SharedInvoker};
pub use logging::LoggingInvoker;
pub use policy::{ParsePolicyError, TransactionPolicy};
pub use retry::{Backoff, ErrorTransform, RetryConfig, RetryInvoker, RetryPredicate};
pub use transaction::{RollbackHook, TransactionInvoker};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for building and calling invoker chains
    pub use crate::{
        BaseInvoker, BeanError, BeanRef, ChainBuilder, InvokeError, Invoker, MethodTable,
        OperationFault, Request, ResourceError, ResourceHandle, Response, RetryConfig,
        TransactionPolicy,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
