//! Factory configuration
//!
//! Two formats carry the same data: legacy-to-resolved name mappings and
//! per-policy bean attributes.
//!
//! TOML:
//!
//! ```toml
//! [mapping]
//! OrderServiceEJB = "orderService"
//!
//! [policy.default.orderService]
//! timeout = "30"
//! ```
//!
//! Properties (the `bean.` prefix is optional):
//!
//! ```text
//! bean.mapping.OrderServiceEJB = orderService
//! bean.policy.default.orderService.timeout = 30
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Attributes of one bean under one policy
pub type BeanAttributes = BTreeMap<String, String>;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// TOML syntax or shape error
    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    /// Properties line that cannot be parsed
    #[error("line {line}: {reason}")]
    Malformed { line: usize, reason: String },

    /// Attribute value that is not a scalar
    #[error("attribute `{key}` must be a string, number or boolean")]
    InvalidValue { key: String },

    /// File extension not recognized
    #[error("unsupported configuration format: {}", path.display())]
    UnsupportedFormat { path: PathBuf },
}

impl ConfigError {
    /// Create malformed-line error
    pub fn malformed(line: usize, reason: impl Into<String>) -> Self {
        Self::Malformed {
            line,
            reason: reason.into(),
        }
    }
}

/// Mappings and policy attributes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FactoryConfig {
    /// Legacy bean name to resolved bean name
    pub mapping: BTreeMap<String, String>,
    /// Policy id to bean name to attributes
    pub policy: BTreeMap<String, BTreeMap<String, BeanAttributes>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    mapping: BTreeMap<String, String>,
    policy: BTreeMap<String, BTreeMap<String, BTreeMap<String, toml::Value>>>,
}

impl FactoryConfig {
    /// Create empty configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse TOML
    ///
    /// Attribute values may be strings, integers, floats or booleans; they
    /// are stored as strings.
    ///
    /// # Errors
    /// - `ConfigError::Toml` on syntax or shape errors
    /// - `ConfigError::InvalidValue` for array or table attributes
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(input)?;
        let mut config = Self {
            mapping: raw.mapping,
            policy: BTreeMap::new(),
        };

        for (policy, beans) in raw.policy {
            for (bean, attributes) in beans {
                for (attribute, value) in attributes {
                    let text = match value {
                        toml::Value::String(s) => s,
                        toml::Value::Integer(i) => i.to_string(),
                        toml::Value::Float(f) => f.to_string(),
                        toml::Value::Boolean(b) => b.to_string(),
                        _ => {
                            return Err(ConfigError::InvalidValue {
                                key: format!("policy.{policy}.{bean}.{attribute}"),
                            })
                        }
                    };
                    config.set_attribute(&policy, &bean, attribute, text);
                }
            }
        }

        Ok(config)
    }

    /// Parse properties text
    ///
    /// Blank lines and lines starting with `#` or `!` are ignored. Keys
    /// outside `mapping.*` and `policy.*` are skipped with a warning.
    ///
    /// # Errors
    /// - `ConfigError::Malformed` for lines without a separator, empty keys,
    ///   or incomplete mapping/policy keys
    pub fn from_properties_str(input: &str) -> Result<Self, ConfigError> {
        let mut config = Self::new();

        for (index, raw) in input.lines().enumerate() {
            let line_no = index + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }

            let Some(split) = line.find(['=', ':']) else {
                return Err(ConfigError::malformed(line_no, "expected `key = value`"));
            };
            let key = line[..split].trim();
            let value = line[split + 1..].trim();
            if key.is_empty() {
                return Err(ConfigError::malformed(line_no, "empty key"));
            }

            let key = key.strip_prefix("bean.").unwrap_or(key);
            if let Some(legacy) = key.strip_prefix("mapping.") {
                if legacy.is_empty() || value.is_empty() {
                    return Err(ConfigError::malformed(
                        line_no,
                        "mapping needs a legacy and a resolved name",
                    ));
                }
                config.mapping.insert(legacy.to_string(), value.to_string());
            } else if let Some(rest) = key.strip_prefix("policy.") {
                let mut parts = rest.splitn(3, '.');
                match (parts.next(), parts.next(), parts.next()) {
                    (Some(policy), Some(bean), Some(attribute))
                        if !policy.is_empty() && !bean.is_empty() && !attribute.is_empty() =>
                    {
                        config.set_attribute(policy, bean, attribute, value);
                    }
                    _ => {
                        return Err(ConfigError::malformed(
                            line_no,
                            format!("expected `policy.<id>.<bean>.<attribute>`, got `{key}`"),
                        ))
                    }
                }
            } else {
                tracing::warn!(line = line_no, key, "skipping unknown configuration key");
            }
        }

        Ok(config)
    }

    /// Load from a `.toml` or `.properties` file
    ///
    /// # Errors
    /// - `ConfigError::Io` if the file cannot be read
    /// - `ConfigError::UnsupportedFormat` for any other extension
    /// - parse errors of the chosen format
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);

        let parse: fn(&str) -> Result<Self, ConfigError> = match extension.as_deref() {
            Some("toml") => Self::from_toml_str,
            Some("properties") => Self::from_properties_str,
            _ => {
                return Err(ConfigError::UnsupportedFormat {
                    path: path.to_path_buf(),
                })
            }
        };

        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = parse(&text)?;
        tracing::info!(
            path = %path.display(),
            mappings = config.mapping.len(),
            attributes = config.attribute_count(),
            "loaded factory configuration"
        );
        Ok(config)
    }

    /// Set one attribute
    pub fn set_attribute(
        &mut self,
        policy: &str,
        bean: &str,
        attribute: impl Into<String>,
        value: impl Into<String>,
    ) {
        self.policy
            .entry(policy.to_string())
            .or_default()
            .entry(bean.to_string())
            .or_default()
            .insert(attribute.into(), value.into());
    }

    /// Look up one attribute
    #[must_use]
    pub fn attribute(&self, policy: &str, bean: &str, attribute: &str) -> Option<&str> {
        self.policy
            .get(policy)?
            .get(bean)?
            .get(attribute)
            .map(String::as_str)
    }

    /// Overlay `other` on top of this configuration
    pub fn merge(&mut self, other: Self) {
        self.mapping.extend(other.mapping);
        for (policy, beans) in other.policy {
            let target = self.policy.entry(policy).or_default();
            for (bean, attributes) in beans {
                target.entry(bean).or_default().extend(attributes);
            }
        }
    }

    /// Total attributes across all policies
    #[must_use]
    pub fn attribute_count(&self) -> usize {
        self.policy
            .values()
            .flat_map(BTreeMap::values)
            .map(BTreeMap::len)
            .sum()
    }

    /// Check if nothing is configured
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty() && self.policy.is_empty()
    }
}
