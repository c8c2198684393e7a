//! BeanBridge Factory - legacy bean name resolution
//!
//! Maps the names legacy code asks for onto beans held by a container:
//! - [`BeanContainer`] abstracts the container, [`InMemoryContainer`] is the
//!   bundled implementation
//! - [`BeanFactory`] resolves names through direct lookup, legacy mappings
//!   and type names, and serves per-policy attributes
//! - [`FactoryConfig`] loads mappings and attributes from TOML or
//!   properties files
//!
//! # Example
//!
//! ```rust,ignore
//! use beanbridge_factory::{BeanFactory, FactoryConfig, InMemoryContainer};
//!
//! let container = InMemoryContainer::new();
//! container.register("orderService", OrderService::default());
//!
//! let config = FactoryConfig::load("factory.properties")?;
//! let factory = BeanFactory::with_config(Arc::new(container), &config);
//! let invoker = factory.bind_method("OrderServiceEJB", "default", &order_methods(), "create")?;
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod config;
pub mod container;
pub mod factory;

pub use config::{BeanAttributes, ConfigError, FactoryConfig};
pub use container::{BeanContainer, InMemoryContainer};
pub use factory::BeanFactory;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
