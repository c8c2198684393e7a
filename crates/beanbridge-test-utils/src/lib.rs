//! Testing utilities for BeanBridge workspace
//!
//! Shared fixtures: a recording resource handle, a scripted invoker and a
//! bean that fails a configurable number of times.

#![allow(missing_docs)]

use async_trait::async_trait;
use beanbridge_invoker::{
    InvokeError, Invoker, MethodTable, OperationFault, Request, ResourceError, ResourceHandle,
    Response, TxStep,
};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

/// Call made on a [`RecordingHandle`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleCall {
    AutoCommit,
    SetAutoCommit(bool),
    Commit,
    Rollback,
}

/// In-memory resource handle that records every call
///
/// Failures can be injected per [`TxStep`]. `set_auto_commit(false)` counts as
/// [`TxStep::Begin`] and `set_auto_commit(true)` as [`TxStep::Restore`].
#[derive(Debug)]
pub struct RecordingHandle {
    auto_commit: bool,
    calls: Vec<HandleCall>,
    failures: Vec<(TxStep, ResourceError)>,
}

impl RecordingHandle {
    /// Handle in auto-commit mode
    pub fn new() -> Self {
        Self::with_auto_commit(true)
    }

    pub fn with_auto_commit(auto_commit: bool) -> Self {
        Self {
            auto_commit,
            calls: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Fail every call belonging to `step`
    #[must_use]
    pub fn failing(mut self, step: TxStep, error: ResourceError) -> Self {
        self.failures.push((step, error));
        self
    }

    pub fn calls(&self) -> &[HandleCall] {
        &self.calls
    }

    pub fn commits(&self) -> usize {
        self.count(HandleCall::Commit)
    }

    pub fn rollbacks(&self) -> usize {
        self.count(HandleCall::Rollback)
    }

    /// Current auto-commit mode, without recording a call
    pub fn mode(&self) -> bool {
        self.auto_commit
    }

    fn count(&self, call: HandleCall) -> usize {
        self.calls.iter().filter(|c| **c == call).count()
    }

    fn check(&self, step: TxStep) -> Result<(), ResourceError> {
        match self.failures.iter().find(|(s, _)| *s == step) {
            Some((_, error)) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

impl Default for RecordingHandle {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResourceHandle for RecordingHandle {
    async fn auto_commit(&mut self) -> Result<bool, ResourceError> {
        self.calls.push(HandleCall::AutoCommit);
        self.check(TxStep::ReadMode)?;
        Ok(self.auto_commit)
    }

    async fn set_auto_commit(&mut self, enabled: bool) -> Result<(), ResourceError> {
        self.calls.push(HandleCall::SetAutoCommit(enabled));
        self.check(if enabled { TxStep::Restore } else { TxStep::Begin })?;
        self.auto_commit = enabled;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), ResourceError> {
        self.calls.push(HandleCall::Commit);
        self.check(TxStep::Commit)
    }

    async fn rollback(&mut self) -> Result<(), ResourceError> {
        self.calls.push(HandleCall::Rollback);
        self.check(TxStep::Rollback)
    }
}

/// Invoker replaying scripted failures, then echoing the request
#[derive(Debug, Default)]
pub struct ScriptedInvoker {
    script: Mutex<VecDeque<InvokeError>>,
    calls: AtomicUsize,
    with_handle: AtomicUsize,
}

impl ScriptedInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail `times` calls with an invocation error carrying `message`
    pub fn failing_times(times: usize, message: &str) -> Self {
        let invoker = Self::new();
        for _ in 0..times {
            invoker.push_failure(InvokeError::invocation(
                "scripted::call",
                OperationFault::new(message),
            ));
        }
        invoker
    }

    /// Queue one failure
    pub fn push_failure(&self, error: InvokeError) {
        self.script.lock().push_back(error);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Calls that received a resource handle
    pub fn calls_with_handle(&self) -> usize {
        self.with_handle.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Invoker for ScriptedInvoker {
    async fn invoke(
        &self,
        request: Request,
        handle: Option<&mut dyn ResourceHandle>,
    ) -> Result<Response, InvokeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if handle.is_some() {
            self.with_handle.fetch_add(1, Ordering::SeqCst);
        }
        let next = self.script.lock().pop_front();
        match next {
            Some(error) => Err(error),
            None => Ok(request),
        }
    }
}

/// Bean whose `process` method fails a fixed number of times
#[derive(Debug)]
pub struct FlakyBean {
    failures_left: AtomicU32,
    fault: fn() -> OperationFault,
    calls: AtomicU32,
}

impl FlakyBean {
    /// Fail `failures` times with a transient fault
    pub fn new(failures: u32) -> Self {
        Self::with_fault(failures, transient_fault)
    }

    pub fn with_fault(failures: u32, fault: fn() -> OperationFault) -> Self {
        Self {
            failures_left: AtomicU32::new(failures),
            fault,
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn process(&self, request: Request) -> Result<Response, OperationFault> {
        let attempt = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err((self.fault)());
        }
        Ok(json!({ "processed": request, "attempt": attempt }))
    }

    /// Method table exposing `process`
    pub fn methods() -> MethodTable<Self> {
        MethodTable::<Self>::new().method("process", |bean, request, _| {
            Box::pin(async move { bean.process(request).await })
        })
    }
}

pub fn transient_fault() -> OperationFault {
    OperationFault::new("connection timeout")
}

pub fn invalid_input_fault() -> OperationFault {
    OperationFault::new("invalid input")
}

pub fn deadlock_fault() -> OperationFault {
    OperationFault::with_state("deadlock detected", "40P01")
}

pub fn constraint_fault() -> OperationFault {
    OperationFault::with_state("duplicate key", "23505")
}

/// Install a test subscriber once; later calls are no-ops
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
        )
        .try_init();
}
