//! `simulate` subcommand: a flaky bean behind a full chain

use anyhow::Context;
use async_trait::async_trait;
use beanbridge_factory::{BeanFactory, InMemoryContainer};
use beanbridge_invoker::prelude::*;
use beanbridge_invoker::{Backoff, RetryLayer};
use serde::Serialize;
use serde_json::json;
use std::fmt::Write;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

const BEAN_NAME: &str = "inventoryService";
const LEGACY_NAME: &str = "InventoryServiceEJB";

/// Simulation parameters
#[derive(Debug, Clone)]
pub(crate) struct SimulationConfig {
    pub(crate) calls: u32,
    pub(crate) failures: u32,
    pub(crate) retry: RetryConfig,
    pub(crate) policy: TransactionPolicy,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            calls: 1,
            failures: 2,
            retry: RetryConfig::new(3),
            policy: TransactionPolicy::CommitOnSuccess,
        }
    }
}

/// Counts gathered over a simulation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub(crate) struct SimulationReport {
    pub(crate) chain: String,
    pub(crate) policy: String,
    pub(crate) calls: u32,
    pub(crate) succeeded: u32,
    pub(crate) failed: u32,
    pub(crate) invocations: u32,
    pub(crate) commits: u32,
    pub(crate) rollbacks: u32,
    pub(crate) auto_commit_restored: bool,
    pub(crate) elapsed_ms: u64,
    pub(crate) errors: Vec<String>,
}

impl SimulationReport {
    pub(crate) fn passed(&self) -> bool {
        self.failed == 0 && self.auto_commit_restored
    }

    pub(crate) fn generate_text(&self) -> String {
        let mut out = String::from("Simulation Report\n=================\n");
        let _ = writeln!(out, "Chain: {}", self.chain);
        let _ = writeln!(out, "Policy: {}", self.policy);
        let _ = writeln!(
            out,
            "Calls: {} ({} succeeded, {} failed)",
            self.calls, self.succeeded, self.failed
        );
        let _ = writeln!(out, "Bean invocations: {}", self.invocations);
        let _ = writeln!(out, "Commits: {}", self.commits);
        let _ = writeln!(out, "Rollbacks: {}", self.rollbacks);
        let _ = writeln!(out, "Auto-commit restored: {}", self.auto_commit_restored);
        let _ = writeln!(out, "Elapsed: {}ms", self.elapsed_ms);
        for error in &self.errors {
            let _ = writeln!(out, "  error: {error}");
        }
        out
    }
}

/// Connection kept in memory, counting transaction calls
#[derive(Debug)]
struct MemoryConnection {
    auto_commit: bool,
    commits: u32,
    rollbacks: u32,
}

impl MemoryConnection {
    fn new() -> Self {
        Self {
            auto_commit: true,
            commits: 0,
            rollbacks: 0,
        }
    }
}

#[async_trait]
impl ResourceHandle for MemoryConnection {
    async fn auto_commit(&mut self) -> Result<bool, ResourceError> {
        Ok(self.auto_commit)
    }

    async fn set_auto_commit(&mut self, enabled: bool) -> Result<(), ResourceError> {
        self.auto_commit = enabled;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), ResourceError> {
        self.commits += 1;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), ResourceError> {
        self.rollbacks += 1;
        Ok(())
    }
}

/// Bean failing its first `failures` invocations with a connection error
#[derive(Debug)]
struct InventoryService {
    failures_left: AtomicU32,
    invocations: AtomicU32,
}

impl InventoryService {
    fn new(failures: u32) -> Self {
        Self {
            failures_left: AtomicU32::new(failures),
            invocations: AtomicU32::new(0),
        }
    }

    async fn reserve(&self, request: Request) -> Result<Response, OperationFault> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        if self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(OperationFault::with_state("connection reset by peer", "08S01"));
        }
        Ok(json!({ "reserved": request }))
    }

    fn methods() -> MethodTable<Self> {
        MethodTable::<Self>::new().method("reserve", |bean, request, _| {
            Box::pin(async move { bean.reserve(request).await })
        })
    }
}

/// Run the simulation
///
/// # Errors
/// Fails if the bean cannot be resolved or bound.
pub(crate) async fn run_simulation(config: SimulationConfig) -> anyhow::Result<SimulationReport> {
    let container = InMemoryContainer::new();
    let bean = container.register(BEAN_NAME, InventoryService::new(config.failures));
    let factory = BeanFactory::new(Arc::new(container));
    factory.register_mapping(LEGACY_NAME, BEAN_NAME);

    let methods = InventoryService::methods();
    let base = factory
        .bind_method(LEGACY_NAME, config.policy.as_str(), &methods, "reserve")
        .context("binding simulated bean")?;

    let chain = ChainBuilder::new()
        .layer(RetryLayer::from_config(config.retry))
        .logging(base.target().to_string())
        .transaction(config.policy)
        .build(base);

    tracing::info!(
        chain = %chain.describe(),
        calls = config.calls,
        failures = config.failures,
        "starting simulation"
    );

    let mut connection = MemoryConnection::new();
    let mut report = SimulationReport {
        chain: chain.describe(),
        policy: config.policy.to_string(),
        calls: config.calls,
        ..SimulationReport::default()
    };

    let started = Instant::now();
    for call in 0..config.calls {
        let request = json!({ "sku": "A-1", "call": call });
        match chain.invoke(request, Some(&mut connection)).await {
            Ok(_) => report.succeeded += 1,
            Err(err) => {
                report.failed += 1;
                report.errors.push(err.to_string());
            }
        }
    }

    report.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    report.invocations = bean.invocations.load(Ordering::SeqCst);
    report.commits = connection.commits;
    report.rollbacks = connection.rollbacks;
    report.auto_commit_restored = connection.auto_commit;
    Ok(report)
}

/// Retry configuration with the given retry count and base delay
pub(crate) fn retry_config(max_retries: u32, base_delay_ms: u64) -> RetryConfig {
    RetryConfig::new(max_retries).with_backoff(Backoff {
        base_delay_ms,
        ..Backoff::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test(start_paused = true)]
    async fn default_simulation_recovers() {
        let report = run_simulation(SimulationConfig::default()).await.unwrap();

        assert_eq!(report.chain, "retry -> logging -> transaction -> base");
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.invocations, 3);
        assert_eq!(report.commits, 1);
        assert_eq!(report.rollbacks, 2);
        assert!(report.passed());
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_simulation_reports_failure() {
        let config = SimulationConfig {
            failures: 10,
            retry: retry_config(1, 10),
            ..SimulationConfig::default()
        };

        let report = run_simulation(config).await.unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.invocations, 2);
        assert_eq!(report.rollbacks, 2);
        assert!(report.auto_commit_restored);
        assert!(!report.passed());
        assert!(report.errors[0].contains("after 2 attempt(s)"));
    }

    #[tokio::test(start_paused = true)]
    async fn always_rollback_over_many_calls() {
        let config = SimulationConfig {
            calls: 4,
            failures: 0,
            policy: TransactionPolicy::AlwaysRollback,
            ..SimulationConfig::default()
        };

        let report = run_simulation(config).await.unwrap();

        assert_eq!(report.succeeded, 4);
        assert_eq!(report.commits, 0);
        assert_eq!(report.rollbacks, 4);
    }

    #[test]
    fn text_report_lists_errors() {
        let report = SimulationReport {
            failed: 1,
            errors: vec!["boom".to_string()],
            ..SimulationReport::default()
        };
        let text = report.generate_text();
        assert!(text.contains("error: boom"));
        assert!(text.starts_with("Simulation Report"));
    }
}
