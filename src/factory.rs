//! Instantiation collaborator
//!
//! The resolver never constructs beans itself; it delegates to an
//! [`Instantiator`], which is invoked exactly once per singleton creation and
//! exactly once per prototype request. How dependencies end up inside the
//! instance is the instantiator's business - by the time it runs, every
//! declared dependency has already been forced into existence.
//!
//! [`FactoryInstantiator`] is the closure-backed default: one registered
//! factory per bean name, each free to call back into the resolver to fetch
//! its dependencies.

use crate::{BeanDefinition, BeanError, BeanResolver, BeanValue, Result};
use ahash::RandomState;
use dashmap::DashMap;
use std::any::Any;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::trace;

/// Explicit constructor arguments supplied to a single `get` call.
pub type BeanArgs = [BeanValue];

/// Constructs fully wired bean instances.
///
/// Implementations may call back into the resolver for already-built
/// dependencies; re-entering resolution of the bean currently under
/// construction is rejected by the store (`CreationInProgress`).
pub trait Instantiator: Send + Sync {
    /// Construct the instance described by `definition`.
    fn instantiate(
        &self,
        resolver: &BeanResolver,
        definition: &BeanDefinition,
        args: Option<&BeanArgs>,
    ) -> Result<BeanValue>;
}

/// Factory closure for one bean name.
type FactoryFn =
    Box<dyn Fn(&BeanResolver, Option<&BeanArgs>) -> Result<BeanValue> + Send + Sync>;

/// Closure-registry [`Instantiator`].
///
/// # Examples
///
/// ```rust
/// use trellis_ioc::{BeanDefinition, BeanResolver, FactoryInstantiator};
/// use std::sync::Arc;
///
/// struct Database { url: String }
/// struct UserService { db: Arc<Database> }
///
/// let factories = FactoryInstantiator::new();
/// factories.provide("database", |_, _| {
///     Ok(Database { url: "postgres://localhost".into() })
/// });
/// factories.provide("userService", |resolver, _| {
///     let db = resolver.get_typed::<Database>("database")?;
///     Ok(UserService { db })
/// });
///
/// let resolver = BeanResolver::new(Arc::new(factories));
/// resolver.register(BeanDefinition::of::<Database>("database")).unwrap();
/// resolver.register(
///     BeanDefinition::of::<UserService>("userService").with_depends_on(["database"]),
/// ).unwrap();
///
/// let users = resolver.get_typed::<UserService>("userService").unwrap();
/// assert_eq!(users.db.url, "postgres://localhost");
/// ```
pub struct FactoryInstantiator {
    factories: DashMap<String, FactoryFn, RandomState>,
}

impl FactoryInstantiator {
    /// Create an empty factory registry
    pub fn new() -> Self {
        Self {
            factories: DashMap::with_hasher(RandomState::new()),
        }
    }

    /// Register the factory for a bean name.
    ///
    /// The closure receives the resolver (for dependency lookups) and any
    /// explicit arguments passed to `get_with_args`.
    pub fn provide<T, F>(&self, name: impl Into<String>, factory: F)
    where
        T: Any + Send + Sync,
        F: Fn(&BeanResolver, Option<&BeanArgs>) -> Result<T> + Send + Sync + 'static,
    {
        self.factories.insert(
            name.into(),
            Box::new(move |resolver, args| {
                factory(resolver, args).map(|v| Arc::new(v) as BeanValue)
            }),
        );
    }

    /// Register a factory that ignores the resolver and arguments.
    pub fn provide_value<T, F>(&self, name: impl Into<String>, factory: F)
    where
        T: Any + Send + Sync,
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.provide(name, move |_, _| Ok(factory()));
    }

    /// Check if a factory is registered for the name
    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }
}

impl Default for FactoryInstantiator {
    fn default() -> Self {
        Self::new()
    }
}

impl Instantiator for FactoryInstantiator {
    fn instantiate(
        &self,
        resolver: &BeanResolver,
        definition: &BeanDefinition,
        args: Option<&BeanArgs>,
    ) -> Result<BeanValue> {
        #[cfg(feature = "logging")]
        trace!(
            target: "trellis_ioc",
            bean = %definition.name,
            bean_type = definition.type_name,
            "Constructing bean instance"
        );

        let factory = self.factories.get(&definition.name).ok_or_else(|| {
            BeanError::creation_failed(&definition.name, "no factory registered")
        })?;
        (*factory)(resolver, args)
            .map_err(|e| match e {
                // Resolution errors surfaced by dependency lookups keep their kind
                err @ (BeanError::CircularDependency { .. }
                | BeanError::CreationInProgress { .. }
                | BeanError::NoSuchBean { .. }) => err,
                err => BeanError::creation_failed(&definition.name, err.to_string()),
            })
    }
}

impl std::fmt::Debug for FactoryInstantiator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FactoryInstantiator")
            .field("count", &self.factories.len())
            .finish()
    }
}
