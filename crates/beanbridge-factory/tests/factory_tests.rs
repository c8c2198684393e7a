//! Factory loading and binding tests

use beanbridge_factory::{BeanFactory, ConfigError, FactoryConfig, InMemoryContainer};
use beanbridge_invoker::prelude::*;
use beanbridge_test_utils::{FlakyBean, RecordingHandle};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::io::Write;
use std::sync::Arc;

fn write_config(suffix: &str, body: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(body.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_properties_file() {
    let file = write_config(
        ".properties",
        "bean.mapping.FlakyEJB = flakyBean\nbean.policy.default.flakyBean.timeout = 30\n",
    );

    let config = FactoryConfig::load(file.path()).unwrap();

    assert_eq!(config.mapping["FlakyEJB"], "flakyBean");
    assert_eq!(config.attribute("default", "flakyBean", "timeout"), Some("30"));
}

#[test]
fn test_load_toml_file() {
    let file = write_config(
        ".toml",
        "[mapping]\nFlakyEJB = \"flakyBean\"\n\n[policy.batch.flakyBean]\nmax_rows = 500\n",
    );

    let config = FactoryConfig::load(file.path()).unwrap();

    assert_eq!(config.attribute("batch", "flakyBean", "max_rows"), Some("500"));
}

#[test]
fn test_toml_and_properties_agree() {
    let toml = FactoryConfig::from_toml_str(
        "[mapping]\nA = \"a\"\n[policy.p.b]\nx = \"1\"\n",
    )
    .unwrap();
    let props = FactoryConfig::from_properties_str("mapping.A=a\npolicy.p.b.x=1\n").unwrap();

    assert_eq!(toml, props);
}

#[test]
fn test_load_missing_file() {
    let err = FactoryConfig::load("/nonexistent/beanbridge/factory.toml").unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_bind_legacy_name_into_chain() {
    let container = InMemoryContainer::new();
    let bean = container.register("flakyBean", FlakyBean::new(1));

    let config = FactoryConfig::from_properties_str("bean.mapping.FlakyEJB = flakyBean\n").unwrap();
    let factory = BeanFactory::with_config(Arc::new(container), &config);

    let base = factory
        .bind_method("FlakyEJB", "default", &FlakyBean::methods(), "process")
        .unwrap();
    assert_eq!(base.target(), "FlakyEJB::process");

    let chain = ChainBuilder::new()
        .retry(1)
        .transaction(TransactionPolicy::CommitOnSuccess)
        .build(base);
    let mut handle = RecordingHandle::new();

    let out = chain.invoke(json!("job"), Some(&mut handle)).await.unwrap();

    assert_eq!(out["attempt"], json!(2));
    assert_eq!(bean.calls(), 2);
    assert_eq!((handle.commits(), handle.rollbacks()), (1, 1));
}

#[test]
fn test_bind_unknown_bean_is_bean_error() {
    let factory = BeanFactory::new(Arc::new(InMemoryContainer::new()));

    let err = factory
        .bind_method("Nope", "default", &FlakyBean::methods(), "process")
        .unwrap_err();

    assert!(err.is_bean());
    assert!(!err.is_retryable());
}

#[test]
fn test_bind_unknown_method_is_binding_error() {
    let container = InMemoryContainer::new();
    container.register("flakyBean", FlakyBean::new(0));
    let factory = BeanFactory::new(Arc::new(container));

    let err = factory
        .bind_method("flakyBean", "default", &FlakyBean::methods(), "purge")
        .unwrap_err();

    assert_eq!(err.kind(), "binding");
}
