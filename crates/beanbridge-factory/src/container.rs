//! Bean containers the factory resolves against

use beanbridge_invoker::BeanRef;
use dashmap::DashMap;
use std::any::type_name;
use std::sync::Arc;

/// Source of container-managed bean instances
#[cfg_attr(test, mockall::automock)]
pub trait BeanContainer: Send + Sync {
    /// Bean registered under `name`
    fn bean(&self, name: &str) -> Option<BeanRef>;

    /// Bean registered for the fully qualified type name
    fn bean_by_type(&self, type_name: &str) -> Option<BeanRef>;

    /// Check if a bean is registered under `name`
    fn contains(&self, name: &str) -> bool {
        self.bean(name).is_some()
    }
}

/// Concurrent in-process container
///
/// Beans are indexed by name and by [`type_name`] of their concrete type.
/// Registering a second bean of the same type replaces the type entry.
#[derive(Debug, Default)]
pub struct InMemoryContainer {
    by_name: DashMap<String, BeanRef>,
    by_type: DashMap<&'static str, BeanRef>,
}

impl InMemoryContainer {
    /// Create empty container
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a bean, returning the shared instance
    pub fn register<T: Send + Sync + 'static>(&self, name: impl Into<String>, bean: T) -> Arc<T> {
        let bean = Arc::new(bean);
        self.register_arc(name, Arc::clone(&bean));
        bean
    }

    /// Register an already shared bean
    pub fn register_arc<T: Send + Sync + 'static>(&self, name: impl Into<String>, bean: Arc<T>) {
        let name = name.into();
        let erased: BeanRef = bean;
        tracing::debug!(bean = %name, bean_type = type_name::<T>(), "registered bean");
        self.by_type.insert(type_name::<T>(), Arc::clone(&erased));
        self.by_name.insert(name, erased);
    }

    /// Remove a bean by name, along with its type entry
    pub fn remove(&self, name: &str) -> Option<BeanRef> {
        let (_, bean) = self.by_name.remove(name)?;
        self.by_type.retain(|_, indexed| !Arc::ptr_eq(indexed, &bean));
        tracing::debug!(bean = name, "removed bean");
        Some(bean)
    }

    /// Registered bean names, sorted
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.by_name.iter().map(|e| e.key().clone()).collect();
        names.sort_unstable();
        names
    }

    /// Number of named beans
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    /// Check if container is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

impl BeanContainer for InMemoryContainer {
    fn bean(&self, name: &str) -> Option<BeanRef> {
        self.by_name.get(name).map(|entry| Arc::clone(entry.value()))
    }

    fn bean_by_type(&self, type_name: &str) -> Option<BeanRef> {
        self.by_type.get(type_name).map(|entry| Arc::clone(entry.value()))
    }

    fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Pricing(u32);

    #[test]
    fn lookup_by_name_and_type() {
        let container = InMemoryContainer::new();
        container.register("pricing", Pricing(7));

        let by_name = container.bean("pricing").unwrap().downcast::<Pricing>().unwrap();
        assert_eq!(*by_name, Pricing(7));

        let by_type = container
            .bean_by_type(type_name::<Pricing>())
            .unwrap()
            .downcast::<Pricing>()
            .unwrap();
        assert!(Arc::ptr_eq(&by_name, &by_type));
    }

    #[test]
    fn missing_bean() {
        let container = InMemoryContainer::new();
        assert!(container.bean("nope").is_none());
        assert!(!container.contains("nope"));
        assert!(container.is_empty());
    }

    #[test]
    fn names_are_sorted_and_removable() {
        let container = InMemoryContainer::new();
        container.register("b", 2u8);
        container.register("a", 1u8);
        assert_eq!(container.names(), vec!["a".to_string(), "b".to_string()]);

        assert!(container.remove("a").is_some());
        assert_eq!(container.len(), 1);
    }

    #[test]
    fn removed_bean_not_found_by_type() {
        let container = InMemoryContainer::new();
        container.register("pricing", Pricing(7));

        assert!(container.remove("pricing").is_some());
        assert!(container.bean_by_type(type_name::<Pricing>()).is_none());
        assert!(container.remove("pricing").is_none());
    }

    #[test]
    fn remove_keeps_newer_type_entry() {
        let container = InMemoryContainer::new();
        container.register("old", Pricing(1));
        let newer = container.register("new", Pricing(2));

        container.remove("old");

        let by_type = container
            .bean_by_type(type_name::<Pricing>())
            .unwrap()
            .downcast::<Pricing>()
            .unwrap();
        assert!(Arc::ptr_eq(&by_type, &newer));
    }
}
