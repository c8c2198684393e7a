//! Bean factory
//!
//! Resolves legacy bean names against a [`BeanContainer`]. Resolution tries,
//! in order:
//! 1. the name as given
//! 2. the name it is mapped to
//! 3. the name as a fully qualified type name
//!
//! Invokers never call the factory. It produces the instance a
//! [`BaseInvoker`] binds to.

use crate::config::{BeanAttributes, FactoryConfig};
use crate::container::BeanContainer;
use beanbridge_invoker::{BaseInvoker, BeanError, BeanRef, InvokeError, MethodTable};
use dashmap::DashMap;
use std::any::type_name;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Name-resolution service over a bean container
pub struct BeanFactory {
    container: Arc<dyn BeanContainer>,
    mappings: DashMap<String, String>,
    attributes: DashMap<String, BeanAttributes>,
    cache: DashMap<String, BeanRef>,
}

impl BeanFactory {
    /// Create factory without mappings or attributes
    pub fn new(container: Arc<dyn BeanContainer>) -> Self {
        Self {
            container,
            mappings: DashMap::new(),
            attributes: DashMap::new(),
            cache: DashMap::new(),
        }
    }

    /// Create factory and apply a configuration
    pub fn with_config(container: Arc<dyn BeanContainer>, config: &FactoryConfig) -> Self {
        let factory = Self::new(container);
        factory.apply_config(config);
        factory
    }

    /// Register every mapping and attribute in `config`
    pub fn apply_config(&self, config: &FactoryConfig) {
        for (legacy, resolved) in &config.mapping {
            self.register_mapping(legacy.clone(), resolved.clone());
        }
        for (policy, beans) in &config.policy {
            for (bean, attributes) in beans {
                for (attribute, value) in attributes {
                    self.set_attribute(policy, bean, attribute, value.clone());
                }
            }
        }
    }

    /// Resolve a bean for a policy
    ///
    /// Every call walks the resolution order against the current mappings
    /// and container. The latest instance is recorded under `name:policy`
    /// until [`clear_cache`](Self::clear_cache).
    ///
    /// # Errors
    /// - `BeanError::NotFound` if no resolution step finds a bean
    pub fn resolve(&self, name: &str, policy: &str) -> Result<BeanRef, BeanError> {
        tracing::debug!(bean = name, policy, "creating bean");
        let bean = self.lookup(name).or_else(|| {
            tracing::debug!(bean = name, "not a registered name or mapping, trying type name");
            self.container.bean_by_type(name)
        });

        match bean {
            Some(bean) => {
                self.cache.insert(format!("{name}:{policy}"), Arc::clone(&bean));
                Ok(bean)
            }
            None => {
                tracing::debug!(bean = name, policy, "bean not found");
                Err(BeanError::NotFound {
                    name: name.to_string(),
                })
            }
        }
    }

    /// Resolve and downcast to `T`
    ///
    /// # Errors
    /// - `BeanError::NotFound` if the bean cannot be resolved
    /// - `BeanError::TypeMismatch` if it is not a `T`
    pub fn resolve_as<T: Send + Sync + 'static>(
        &self,
        name: &str,
        policy: &str,
    ) -> Result<Arc<T>, BeanError> {
        self.resolve(name, policy)?
            .downcast::<T>()
            .map_err(|_| BeanError::TypeMismatch {
                name: name.to_string(),
                expected: type_name::<T>(),
            })
    }

    /// Look up a referenced bean by name or mapping, without the type fallback
    ///
    /// # Errors
    /// - `BeanError::ReferenceNotFound` if neither lookup finds a bean
    pub fn reference(&self, name: &str) -> Result<BeanRef, BeanError> {
        self.lookup(name).ok_or_else(|| BeanError::ReferenceNotFound {
            name: name.to_string(),
        })
    }

    /// Resolve a bean and bind one of its methods
    ///
    /// # Errors
    /// - `InvokeError::Bean` if the bean cannot be resolved
    /// - `InvokeError::Binding` if the bean type or method does not match
    pub fn bind_method<T: Send + Sync + 'static>(
        &self,
        name: &str,
        policy: &str,
        methods: &MethodTable<T>,
        method: &str,
    ) -> Result<BaseInvoker, InvokeError> {
        let bean = self.resolve(name, policy)?;
        BaseInvoker::bind(name, bean, methods, method)
    }

    /// Attribute configured for a bean under a policy
    #[must_use]
    pub fn attribute(&self, bean: &str, policy: &str, attribute: &str) -> Option<String> {
        self.attributes
            .get(policy)?
            .get(&format!("{bean}.{attribute}"))
            .cloned()
    }

    /// Set one attribute
    pub fn set_attribute(
        &self,
        policy: &str,
        bean: &str,
        attribute: &str,
        value: impl Into<String>,
    ) {
        self.attributes
            .entry(policy.to_string())
            .or_default()
            .insert(format!("{bean}.{attribute}"), value.into());
    }

    /// Every `bean.attribute -> value` pair configured under a policy
    #[must_use]
    pub fn properties(&self, policy: &str) -> BTreeMap<String, String> {
        self.attributes
            .get(policy)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// Check if a bean is registered under exactly `name`
    #[must_use]
    pub fn exists(&self, name: &str) -> bool {
        self.container.contains(name)
    }

    /// Map a legacy name to a resolved name, replacing any earlier mapping
    pub fn register_mapping(&self, legacy: impl Into<String>, resolved: impl Into<String>) {
        let legacy = legacy.into();
        let resolved = resolved.into();
        tracing::info!(legacy = %legacy, resolved = %resolved, "registered bean mapping");
        self.mappings.insert(legacy, resolved);
    }

    /// Resolved name for a legacy name
    #[must_use]
    pub fn mapping(&self, legacy: &str) -> Option<String> {
        self.mappings.get(legacy).map(|entry| entry.value().clone())
    }

    /// Drop every cached resolution
    pub fn clear_cache(&self) {
        let dropped = self.cache.len();
        self.cache.clear();
        tracing::info!(dropped, "cleared policy bean cache");
    }

    /// Number of cached resolutions
    #[must_use]
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    /// Instance last resolved for `name` under `policy`
    #[must_use]
    pub fn cached_bean(&self, name: &str, policy: &str) -> Option<BeanRef> {
        self.cache
            .get(&format!("{name}:{policy}"))
            .map(|entry| Arc::clone(entry.value()))
    }

    fn lookup(&self, name: &str) -> Option<BeanRef> {
        if let Some(bean) = self.container.bean(name) {
            return Some(bean);
        }
        let resolved = self.mapping(name)?;
        tracing::debug!(bean = name, mapped = %resolved, "trying mapped bean name");
        self.container.bean(&resolved)
    }
}

impl fmt::Debug for BeanFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeanFactory")
            .field("mappings", &self.mappings.len())
            .field("policies", &self.attributes.len())
            .field("cached", &self.cache.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{InMemoryContainer, MockBeanContainer};
    use mockall::predicate::eq;
    use pretty_assertions::assert_eq;

    #[derive(Debug)]
    struct OrderService;

    #[derive(Debug)]
    struct AuditLog;

    fn factory() -> BeanFactory {
        let container = InMemoryContainer::new();
        container.register("orderService", OrderService);
        BeanFactory::new(Arc::new(container))
    }

    #[test]
    fn resolve_direct() {
        let bean = factory().resolve("orderService", "default").unwrap();
        assert!(bean.downcast::<OrderService>().is_ok());
    }

    #[test]
    fn resolve_through_mapping() {
        let factory = factory();
        factory.register_mapping("OrderServiceEJB", "orderService");
        assert!(factory.resolve_as::<OrderService>("OrderServiceEJB", "default").is_ok());
    }

    #[test]
    fn resolve_by_type_name() {
        let factory = factory();
        let bean = factory
            .resolve_as::<OrderService>(type_name::<OrderService>(), "default")
            .unwrap();
        let direct = factory.resolve_as::<OrderService>("orderService", "x").unwrap();
        assert!(Arc::ptr_eq(&bean, &direct));
    }

    #[test]
    fn resolve_not_found() {
        let err = factory().resolve("ghost", "default").unwrap_err();
        assert!(matches!(err, BeanError::NotFound { ref name } if name == "ghost"));
        assert_eq!(err.to_string(), "cannot create bean `ghost`");
    }

    #[test]
    fn resolve_as_wrong_type() {
        let err = factory().resolve_as::<AuditLog>("orderService", "default").unwrap_err();
        assert!(matches!(err, BeanError::TypeMismatch { .. }));
    }

    #[test]
    fn mapping_to_missing_bean_falls_through() {
        let factory = factory();
        factory.register_mapping("Legacy", "nowhere");
        assert!(factory.resolve("Legacy", "default").is_err());
    }

    #[test]
    fn resolution_order_prefers_direct_name() {
        let mut container = MockBeanContainer::new();
        let direct: BeanRef = Arc::new(OrderService);
        let expected = Arc::clone(&direct);
        container
            .expect_bean()
            .with(eq("orderService"))
            .times(1)
            .returning(move |_| Some(Arc::clone(&direct)));
        container.expect_bean_by_type().never();

        let factory = BeanFactory::new(Arc::new(container));
        factory.register_mapping("orderService", "shadow");

        let bean = factory.resolve("orderService", "default").unwrap();
        assert!(Arc::ptr_eq(&bean, &expected));
    }

    #[test]
    fn cache_keyed_by_name_and_policy() {
        let mut container = MockBeanContainer::new();
        container
            .expect_bean()
            .with(eq("orderService"))
            .times(3)
            .returning(|_| Some(Arc::new(OrderService) as BeanRef));

        let factory = BeanFactory::new(Arc::new(container));
        factory.resolve("orderService", "default").unwrap();
        let again = factory.resolve("orderService", "default").unwrap();
        let batch = factory.resolve("orderService", "batch").unwrap();

        assert_eq!(factory.cached(), 2);
        let cached = factory.cached_bean("orderService", "default").unwrap();
        assert!(Arc::ptr_eq(&cached, &again));
        assert!(!Arc::ptr_eq(&cached, &batch));

        factory.clear_cache();
        assert_eq!(factory.cached(), 0);
        assert!(factory.cached_bean("orderService", "default").is_none());
    }

    #[derive(Debug)]
    struct ReplacementService;

    #[test]
    fn remap_serves_new_bean() {
        let container = InMemoryContainer::new();
        container.register("orderService", OrderService);
        container.register("replacementService", ReplacementService);
        let factory = BeanFactory::new(Arc::new(container));

        factory.register_mapping("OrderServiceEJB", "orderService");
        assert!(factory.resolve_as::<OrderService>("OrderServiceEJB", "default").is_ok());

        factory.register_mapping("OrderServiceEJB", "replacementService");
        let bean = factory.resolve("OrderServiceEJB", "default").unwrap();
        assert!(bean.downcast::<ReplacementService>().is_ok());
    }

    #[test]
    fn removed_bean_no_longer_resolves() {
        let container = Arc::new(InMemoryContainer::new());
        container.register("orderService", OrderService);
        let factory = BeanFactory::new(Arc::clone(&container) as Arc<dyn BeanContainer>);

        assert!(factory.resolve("orderService", "default").is_ok());
        container.remove("orderService");

        assert!(factory.resolve("orderService", "default").is_err());
        assert!(factory.resolve(type_name::<OrderService>(), "default").is_err());
    }

    #[test]
    fn reference_skips_type_fallback() {
        let factory = factory();
        assert!(factory.reference("orderService").is_ok());
        let err = factory.reference(type_name::<OrderService>()).unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("reference not found: {}", type_name::<OrderService>())
        );
    }

    #[test]
    fn attributes_and_properties() {
        let factory = factory();
        factory.set_attribute("default", "orderService", "timeout", "30");
        factory.set_attribute("default", "customer", "region", "eu");
        factory.set_attribute("batch", "orderService", "timeout", "600");

        let timeout = |policy: &str| factory.attribute("orderService", policy, "timeout");
        assert_eq!(timeout("default").as_deref(), Some("30"));
        assert_eq!(timeout("batch").as_deref(), Some("600"));
        assert_eq!(factory.attribute("orderService", "none", "timeout"), None);

        let props = factory.properties("default");
        assert_eq!(
            props.into_iter().collect::<Vec<_>>(),
            vec![
                ("customer.region".to_string(), "eu".to_string()),
                ("orderService.timeout".to_string(), "30".to_string()),
            ]
        );
        assert!(factory.properties("unknown").is_empty());
    }

    #[test]
    fn exists_checks_direct_name_only() {
        let factory = factory();
        factory.register_mapping("OrderServiceEJB", "orderService");
        assert!(factory.exists("orderService"));
        assert!(!factory.exists("OrderServiceEJB"));
    }

    #[test]
    fn mapping_last_writer_wins() {
        let factory = factory();
        factory.register_mapping("A", "first");
        factory.register_mapping("A", "second");
        assert_eq!(factory.mapping("A").as_deref(), Some("second"));
    }

    #[test]
    fn apply_config_registers_everything() {
        let config = FactoryConfig::from_properties_str(
            "bean.mapping.OrderServiceEJB = orderService\n\
             bean.policy.default.orderService.timeout = 30\n",
        )
        .unwrap();
        let container = InMemoryContainer::new();
        container.register("orderService", OrderService);
        let factory = BeanFactory::with_config(Arc::new(container), &config);

        assert!(factory.resolve("OrderServiceEJB", "default").is_ok());
        assert_eq!(
            factory.attribute("orderService", "default", "timeout").as_deref(),
            Some("30")
        );
    }
}
