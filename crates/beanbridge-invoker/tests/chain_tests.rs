//! End-to-end chains over a bound bean and a recording handle

use beanbridge_invoker::prelude::*;
use beanbridge_invoker::{LoggingLayer, RetryLayer, TransactionLayer};
use beanbridge_test_utils::{init_tracing, invalid_input_fault, FlakyBean, RecordingHandle};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;

fn bind(bean: &Arc<FlakyBean>) -> BaseInvoker {
    let bean_ref: BeanRef = bean.clone();
    BaseInvoker::bind("flakyBean", bean_ref, &FlakyBean::methods(), "process").unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_retry_transaction_base_transient_twice() {
    init_tracing();
    let bean = Arc::new(FlakyBean::new(2));
    let chain = ChainBuilder::new()
        .retry(3)
        .transaction(TransactionPolicy::CommitOnSuccess)
        .build(bind(&bean));
    let mut handle = RecordingHandle::new();

    let out = chain.invoke(json!("order-1"), Some(&mut handle)).await.unwrap();

    assert_eq!(out, json!({ "processed": "order-1", "attempt": 3 }));
    assert_eq!(bean.calls(), 3);
    assert_eq!(handle.commits(), 1);
    assert_eq!(handle.rollbacks(), 2);
    assert!(handle.mode());
}

#[tokio::test(start_paused = true)]
async fn test_full_chain_exhaustion() {
    init_tracing();
    let bean = Arc::new(FlakyBean::new(10));
    let chain = ChainBuilder::new()
        .layer(RetryLayer::new(2))
        .layer(LoggingLayer::new().with_method("flakyBean::process"))
        .layer(TransactionLayer::new(TransactionPolicy::CommitOnSuccess))
        .build(bind(&bean));
    let mut handle = RecordingHandle::with_auto_commit(false);

    let err = chain.invoke(json!(1), Some(&mut handle)).await.unwrap_err();

    assert_eq!(chain.describe(), "retry -> logging -> transaction -> base");
    assert_eq!(bean.calls(), 3);
    assert_eq!(handle.rollbacks(), 3);
    assert_eq!(handle.commits(), 0);
    assert!(!handle.mode());
    match err {
        InvokeError::Bean(BeanError::Exhausted { attempts, source }) => {
            assert_eq!(attempts, 3);
            assert_eq!(source.message(), "connection timeout");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_non_transient_bean_failure_single_transaction() {
    let bean = Arc::new(FlakyBean::with_fault(1, invalid_input_fault));
    let chain = ChainBuilder::new()
        .retry(3)
        .transaction(TransactionPolicy::AlwaysCommit)
        .build(bind(&bean));
    let mut handle = RecordingHandle::new();

    let err = chain.invoke(json!(1), Some(&mut handle)).await.unwrap_err();

    assert!(err.is_bean());
    assert_eq!(bean.calls(), 1);
    assert_eq!(handle.commits(), 1);
}

#[tokio::test]
async fn test_chain_without_handle() {
    let bean = Arc::new(FlakyBean::new(0));
    let chain = ChainBuilder::new()
        .logging("flakyBean::process")
        .transaction(TransactionPolicy::AlwaysRollback)
        .build(bind(&bean));

    let out = chain.invoke(json!([1, 2]), None).await.unwrap();

    assert_eq!(out["processed"], json!([1, 2]));
}

#[tokio::test]
async fn test_concurrent_calls_share_chain() {
    let bean = Arc::new(FlakyBean::new(0));
    let chain = Arc::new(
        ChainBuilder::new()
            .transaction(TransactionPolicy::CommitOnSuccess)
            .build(bind(&bean)),
    );

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let chain = Arc::clone(&chain);
            tokio::spawn(async move {
                let mut handle = RecordingHandle::new();
                chain.invoke(json!(i), Some(&mut handle)).await.map(|_| handle.commits())
            })
        })
        .collect();

    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), 1);
    }
    assert_eq!(bean.calls(), 8);
}
