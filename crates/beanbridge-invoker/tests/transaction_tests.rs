//! Transaction layer tests against a recording handle

use beanbridge_invoker::prelude::*;
use beanbridge_invoker::{TransactionInvoker, TxStep};
use beanbridge_test_utils::{HandleCall, RecordingHandle, ScriptedInvoker};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

async fn run(policy: TransactionPolicy, fail: bool, auto_commit: bool) -> (RecordingHandle, bool) {
    let delegate = if fail {
        ScriptedInvoker::failing_times(1, "invalid input")
    } else {
        ScriptedInvoker::new()
    };
    let invoker = TransactionInvoker::with_policy(delegate, policy);
    let mut handle = RecordingHandle::with_auto_commit(auto_commit);
    let ok = invoker.invoke(json!({ "n": 1 }), Some(&mut handle)).await.is_ok();
    (handle, ok)
}

#[tokio::test]
async fn test_outcome_matrix() {
    let cases = [
        (TransactionPolicy::CommitOnSuccess, false, 1, 0),
        (TransactionPolicy::CommitOnSuccess, true, 0, 1),
        (TransactionPolicy::AlwaysCommit, false, 1, 0),
        (TransactionPolicy::AlwaysCommit, true, 1, 0),
        (TransactionPolicy::AlwaysRollback, false, 0, 1),
        (TransactionPolicy::AlwaysRollback, true, 0, 1),
    ];

    for (policy, fail, commits, rollbacks) in cases {
        let (handle, ok) = run(policy, fail, true).await;
        assert_eq!(ok, !fail, "{policy} fail={fail}");
        assert_eq!(handle.commits(), commits, "{policy} fail={fail}");
        assert_eq!(handle.rollbacks(), rollbacks, "{policy} fail={fail}");
    }
}

#[tokio::test]
async fn test_auto_commit_mode_preserved() {
    for policy in TransactionPolicy::ALL {
        for fail in [false, true] {
            for original in [false, true] {
                let (handle, _) = run(policy, fail, original).await;
                assert_eq!(handle.mode(), original, "{policy} fail={fail} original={original}");
                assert_eq!(
                    handle.calls().last(),
                    Some(&HandleCall::SetAutoCommit(original)),
                    "restore must be the last call"
                );
            }
        }
    }
}

#[tokio::test]
async fn test_call_order_on_success() {
    let (handle, _) = run(TransactionPolicy::CommitOnSuccess, false, true).await;
    assert_eq!(
        handle.calls(),
        &[
            HandleCall::AutoCommit,
            HandleCall::SetAutoCommit(false),
            HandleCall::Commit,
            HandleCall::SetAutoCommit(true),
        ]
    );
}

#[tokio::test]
async fn test_no_handle_no_transaction() {
    let delegate = Arc::new(ScriptedInvoker::new());
    let invoker = TransactionInvoker::new(Arc::clone(&delegate));

    let out = invoker.invoke(json!("x"), None).await.unwrap();

    assert_eq!(out, json!("x"));
    assert_eq!(delegate.calls(), 1);
    assert_eq!(delegate.calls_with_handle(), 0);
}

#[tokio::test]
async fn test_delegate_error_passes_through_unchanged() {
    let invoker = TransactionInvoker::new(ScriptedInvoker::failing_times(1, "invalid input"));
    let mut handle = RecordingHandle::new();

    let err = invoker.invoke(json!(1), Some(&mut handle)).await.unwrap_err();

    assert!(matches!(
        err,
        InvokeError::Invocation { ref fault, .. } if fault.message() == "invalid input"
    ));
}

#[tokio::test]
async fn test_rollback_failure_does_not_mask_delegate_error() {
    let invoker = TransactionInvoker::new(ScriptedInvoker::failing_times(1, "invalid input"));
    let mut handle =
        RecordingHandle::new().failing(TxStep::Rollback, ResourceError::new("socket closed"));

    let err = invoker.invoke(json!(1), Some(&mut handle)).await.unwrap_err();

    assert_eq!(err.kind(), "invocation");
    assert!(handle.mode(), "mode restored after failed rollback");
}

#[tokio::test]
async fn test_commit_failure_surfaces_after_success() {
    let invoker = TransactionInvoker::new(ScriptedInvoker::new());
    let mut handle = RecordingHandle::new()
        .failing(TxStep::Commit, ResourceError::with_state("lost", "08003"));

    let err = invoker.invoke(json!(1), Some(&mut handle)).await.unwrap_err();

    match err {
        InvokeError::Transaction(tx) => assert_eq!(tx.step(), TxStep::Commit),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(handle.mode());
}

#[tokio::test]
async fn test_restore_failure_is_not_raised() {
    let invoker = TransactionInvoker::new(ScriptedInvoker::new());
    let mut handle =
        RecordingHandle::new().failing(TxStep::Restore, ResourceError::new("read-only"));

    let out = invoker.invoke(json!(3), Some(&mut handle)).await.unwrap();

    assert_eq!(out, json!(3));
    assert_eq!(handle.commits(), 1);
}

#[tokio::test]
async fn test_rollback_callback_counts() {
    let callbacks = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&callbacks);
    let invoker = TransactionInvoker::with_policy(
        ScriptedInvoker::failing_times(1, "invalid input"),
        TransactionPolicy::CommitOnSuccess,
    )
    .on_rollback(move |_, error| {
        assert!(error.is_some());
        seen.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    let mut handle = RecordingHandle::new();
    let _ = invoker.invoke(json!(1), Some(&mut handle)).await;
    let _ = invoker.invoke(json!(2), Some(&mut handle)).await;

    assert_eq!(handle.rollbacks(), 1);
    assert_eq!(handle.commits(), 1);
    assert_eq!(callbacks.load(Ordering::SeqCst), 1);
}
