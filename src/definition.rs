//! Bean definitions and the definition registry
//!
//! A [`BeanDefinition`] is the declarative description of a managed object:
//! its name, type descriptor, scope, declared dependencies, and optional
//! lifecycle hook names. Definitions are immutable once registered.

use crate::{BeanError, Result};
use ahash::RandomState;
use dashmap::DashMap;
use std::any::{Any, TypeId};
use std::sync::Arc;

/// A type-erased bean instance shared across the container.
pub type BeanValue = Arc<dyn Any + Send + Sync>;

/// Bean scope: how instances relate to resolution calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Scope {
    /// Single instance, created on first resolution and cached
    #[default]
    Singleton,

    /// Fresh instance on every resolution, never cached
    Prototype,
}

/// Declarative description of a managed bean.
///
/// Built with [`BeanDefinition::of`] plus the `with_*` builders:
///
/// ```rust
/// use trellis_ioc::{BeanDefinition, Scope};
///
/// struct OrderService;
///
/// let def = BeanDefinition::of::<OrderService>("orderService")
///     .with_scope(Scope::Singleton)
///     .with_depends_on(["database"])
///     .with_init_method("start")
///     .with_destroy_method("stop");
///
/// assert_eq!(def.name, "orderService");
/// assert_eq!(def.depends_on, vec!["database".to_string()]);
/// ```
#[derive(Debug, Clone)]
pub struct BeanDefinition {
    /// Unique bean name
    pub name: String,
    /// TypeId of the concrete bean type
    pub type_id: TypeId,
    /// Human-readable type name
    pub type_name: &'static str,
    /// Scope of the bean
    pub scope: Scope,
    /// Names of beans that must exist before this one is constructed
    pub depends_on: Vec<String>,
    /// Name of the initializer hook, invoked after construction
    pub init_method: Option<String>,
    /// Name of the destroy hook, invoked during teardown
    pub destroy_method: Option<String>,
}

impl BeanDefinition {
    /// Create a definition for concrete type `T` under the given name.
    pub fn of<T: Any + Send + Sync>(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            scope: Scope::default(),
            depends_on: Vec::new(),
            init_method: None,
            destroy_method: None,
        }
    }

    /// Set the scope
    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// Declare dependency bean names
    pub fn with_depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = deps.into_iter().map(Into::into).collect();
        self
    }

    /// Name the initializer hook
    pub fn with_init_method(mut self, method: impl Into<String>) -> Self {
        self.init_method = Some(method.into());
        self
    }

    /// Name the destroy hook
    pub fn with_destroy_method(mut self, method: impl Into<String>) -> Self {
        self.destroy_method = Some(method.into());
        self
    }

    /// True if the bean is singleton-scoped
    #[inline]
    pub fn is_singleton(&self) -> bool {
        self.scope == Scope::Singleton
    }

    /// True if the bean is prototype-scoped
    #[inline]
    pub fn is_prototype(&self) -> bool {
        self.scope == Scope::Prototype
    }
}

/// Registry of bean definitions, indexed by name and by concrete type.
///
/// Lookups are lock-free (`DashMap`); one definition per name, enforced at
/// registration.
pub struct DefinitionRegistry {
    /// Name -> definition
    by_name: DashMap<String, Arc<BeanDefinition>, RandomState>,
    /// TypeId -> names of definitions with that concrete type
    by_type: DashMap<TypeId, Vec<String>, RandomState>,
}

impl DefinitionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            by_name: DashMap::with_hasher(RandomState::new()),
            by_type: DashMap::with_hasher(RandomState::new()),
        }
    }

    /// Register a definition. Fails with `AlreadyRegistered` if the name is
    /// taken; definitions are immutable once stored.
    pub fn register(&self, definition: BeanDefinition) -> Result<()> {
        let name = definition.name.clone();
        let type_id = definition.type_id;

        #[cfg(feature = "logging")]
        tracing::debug!(
            target: "trellis_ioc",
            bean = %name,
            bean_type = definition.type_name,
            scope = ?definition.scope,
            "Registering bean definition"
        );

        use dashmap::mapref::entry::Entry;
        match self.by_name.entry(name.clone()) {
            Entry::Occupied(_) => {
                return Err(BeanError::AlreadyRegistered { name });
            }
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(definition));
            }
        }

        self.by_type.entry(type_id).or_default().push(name);
        Ok(())
    }

    /// Look up a definition by bean name
    #[inline]
    pub fn get(&self, name: &str) -> Option<Arc<BeanDefinition>> {
        self.by_name.get(name).map(|d| Arc::clone(&d))
    }

    /// Check if a name is registered
    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Names of all definitions whose concrete type is `T`
    pub fn names_of_type<T: Any>(&self) -> Vec<String> {
        self.by_type
            .get(&TypeId::of::<T>())
            .map(|names| names.clone())
            .unwrap_or_default()
    }

    /// All registered bean names
    pub fn names(&self) -> Vec<String> {
        self.by_name.iter().map(|r| r.key().clone()).collect()
    }

    /// Number of registered definitions
    #[inline]
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    /// Check if no definitions are registered
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

impl Default for DefinitionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DefinitionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefinitionRegistry")
            .field("count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Database;
    struct UserService;

    #[test]
    fn register_and_lookup() {
        let registry = DefinitionRegistry::new();
        registry
            .register(BeanDefinition::of::<Database>("database"))
            .unwrap();

        let def = registry.get("database").unwrap();
        assert_eq!(def.name, "database");
        assert!(def.is_singleton());
        assert!(registry.contains("database"));
        assert!(!registry.contains("missing"));
    }

    #[test]
    fn duplicate_name_rejected() {
        let registry = DefinitionRegistry::new();
        registry
            .register(BeanDefinition::of::<Database>("database"))
            .unwrap();

        let err = registry
            .register(BeanDefinition::of::<UserService>("database"))
            .unwrap_err();
        assert!(matches!(err, BeanError::AlreadyRegistered { name } if name == "database"));
    }

    #[test]
    fn type_index_tracks_all_names() {
        let registry = DefinitionRegistry::new();
        registry
            .register(BeanDefinition::of::<Database>("primary"))
            .unwrap();
        registry
            .register(BeanDefinition::of::<Database>("replica"))
            .unwrap();
        registry
            .register(BeanDefinition::of::<UserService>("users"))
            .unwrap();

        let mut names = registry.names_of_type::<Database>();
        names.sort();
        assert_eq!(names, vec!["primary".to_string(), "replica".to_string()]);
        assert_eq!(registry.names_of_type::<UserService>(), vec!["users"]);
        assert!(registry.names_of_type::<String>().is_empty());
    }

    #[test]
    fn prototype_scope_flags() {
        let def = BeanDefinition::of::<Database>("db").with_scope(Scope::Prototype);
        assert!(def.is_prototype());
        assert!(!def.is_singleton());
    }
}
