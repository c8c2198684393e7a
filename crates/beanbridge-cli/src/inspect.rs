//! `config` subcommand: load and summarize a factory configuration

use beanbridge_factory::{ConfigError, FactoryConfig};
use std::fmt::Write;
use std::path::Path;

/// Load a configuration file and render it as text or JSON
pub(crate) fn describe_config(path: &Path, json: bool) -> anyhow::Result<String> {
    let config = FactoryConfig::load(path)?;
    if json {
        return Ok(serde_json::to_string_pretty(&config)?);
    }
    Ok(summary(path, &config))
}

fn summary(path: &Path, config: &FactoryConfig) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Factory Configuration: {}", path.display());
    let _ = writeln!(out, "Mappings: {}", config.mapping.len());
    for (legacy, resolved) in &config.mapping {
        let _ = writeln!(out, "  {legacy} -> {resolved}");
    }
    let _ = writeln!(
        out,
        "Policies: {} ({} attributes)",
        config.policy.len(),
        config.attribute_count()
    );
    for (policy, beans) in &config.policy {
        let _ = writeln!(out, "  [{policy}]");
        for (bean, attributes) in beans {
            for (attribute, value) in attributes {
                let _ = writeln!(out, "    {bean}.{attribute} = {value}");
            }
        }
    }
    out
}

/// Exit code for a configuration error
pub(crate) fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<ConfigError>() {
        Some(ConfigError::Io { .. }) => 66,
        Some(_) => 65,
        None => 1,
    }
}
