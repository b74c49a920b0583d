//! Bean resolution and lifecycle orchestration
//!
//! [`BeanResolver`] is the dependency-resolution engine: given a bean name it
//! produces a ready-to-use instance, recursively forcing declared
//! dependencies into existence, detecting cycles, enforcing scope, and
//! running lifecycle hooks through the configured [`HookInvoker`].
//!
//! Construction itself is delegated to the [`Instantiator`] collaborator,
//! invoked exactly once per singleton creation and once per prototype
//! request.

use crate::factory::{BeanArgs, Instantiator};
use crate::hooks::HookInvoker;
use crate::singleton::{CreationTicket, SingletonStore};
use crate::{BeanDefinition, BeanError, BeanValue, DefinitionRegistry, Result, Scope};
use std::any::Any;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::{debug, info, trace, warn};

/// The bean container: definition registry, singleton store, and the
/// resolution engine tying them together.
///
/// Resolvers can be chained: a child delegates to its parent for names it
/// does not register locally, and scope queries walk the same chain.
///
/// # Examples
///
/// ```rust
/// use trellis_ioc::{BeanDefinition, BeanResolver, FactoryInstantiator, Scope};
/// use std::sync::Arc;
///
/// struct Config { url: String }
///
/// let factories = FactoryInstantiator::new();
/// factories.provide_value("config", || Config { url: "localhost".into() });
///
/// let resolver = BeanResolver::new(Arc::new(factories));
/// resolver.register(BeanDefinition::of::<Config>("config")).unwrap();
///
/// let a = resolver.get_typed::<Config>("config").unwrap();
/// let b = resolver.get_typed::<Config>("config").unwrap();
/// assert!(Arc::ptr_eq(&a, &b)); // singletons are cached
/// ```
pub struct BeanResolver {
    definitions: DefinitionRegistry,
    singletons: SingletonStore,
    instantiator: Arc<dyn Instantiator>,
    hooks: Option<Arc<dyn HookInvoker>>,
    parent: Option<Arc<BeanResolver>>,
}

impl BeanResolver {
    /// Create a resolver without lifecycle hook support.
    ///
    /// Definitions that name an init or destroy hook will fail at creation /
    /// destruction time: a declared hook with no way to run it is fatal, not
    /// silently skipped.
    pub fn new(instantiator: Arc<dyn Instantiator>) -> Self {
        Self {
            definitions: DefinitionRegistry::new(),
            singletons: SingletonStore::new(),
            instantiator,
            hooks: None,
            parent: None,
        }
    }

    /// Create a lifecycle-aware resolver: named init hooks run after
    /// construction, named destroy hooks run during [`destroy_all`].
    ///
    /// [`destroy_all`]: BeanResolver::destroy_all
    pub fn with_lifecycle(
        instantiator: Arc<dyn Instantiator>,
        hooks: Arc<dyn HookInvoker>,
    ) -> Self {
        Self {
            hooks: Some(hooks),
            ..Self::new(instantiator)
        }
    }

    /// Attach a parent resolver. Names not registered locally are resolved
    /// through the parent.
    pub fn with_parent(mut self, parent: Arc<BeanResolver>) -> Self {
        self.parent = Some(parent);
        self
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Register a bean definition. One definition per name; duplicates fail
    /// with `AlreadyRegistered`.
    pub fn register(&self, definition: BeanDefinition) -> Result<()> {
        self.definitions.register(definition)
    }

    /// All locally registered bean names
    pub fn bean_names(&self) -> Vec<String> {
        self.definitions.names()
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    /// Resolve the bean for `name`, creating it if necessary.
    pub fn get(&self, name: &str) -> Result<BeanValue> {
        self.do_get(name, None, &mut Vec::new())
    }

    /// Resolve with explicit constructor arguments.
    ///
    /// Arguments only influence construction that actually runs: a singleton
    /// that is already `Ready` is returned as-is and the arguments are
    /// ignored.
    pub fn get_with_args(&self, name: &str, args: &BeanArgs) -> Result<BeanValue> {
        self.do_get(name, Some(args), &mut Vec::new())
    }

    /// Resolve the bean for `name` and downcast it to `T`.
    pub fn get_typed<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>> {
        self.get(name)?
            .downcast::<T>()
            .map_err(|_| BeanError::type_mismatch::<T>(name))
    }

    /// Resolve the unique bean whose concrete type is `T`.
    ///
    /// Fails with `AmbiguousBean` if more than one definition matches and
    /// `NoSuchBean` if none does.
    pub fn get_by_type<T: Any + Send + Sync>(&self) -> Result<Arc<T>> {
        let names = self.definitions.names_of_type::<T>();
        match names.len() {
            0 => Err(BeanError::no_such_bean(std::any::type_name::<T>())),
            1 => self.get_typed::<T>(&names[0]),
            _ => Err(BeanError::ambiguous::<T>(names)),
        }
    }

    /// The central resolution routine.
    ///
    /// `chain` is the stack of names currently being resolved above this
    /// call; it is how "resolving `d` would require resolving `name` again"
    /// is detected before any construction side effect happens.
    fn do_get(
        &self,
        name: &str,
        args: Option<&BeanArgs>,
        chain: &mut Vec<String>,
    ) -> Result<BeanValue> {
        // Cache hit: a ready singleton is returned immediately unless the
        // caller supplied explicit constructor arguments.
        if args.is_none() {
            if let Some(instance) = self.singletons.get(name) {
                #[cfg(feature = "logging")]
                trace!(
                    target: "trellis_ioc",
                    bean = name,
                    "Returning cached singleton instance"
                );
                return Ok(instance);
            }
        }

        // Re-entrant resolution of a name mid-construction or mid-teardown.
        // Distinct from a dependency cycle: this is detected from store
        // state, not from the resolution chain.
        if self.singletons.in_transition(name) {
            return Err(BeanError::in_progress(name));
        }

        let Some(definition) = self.definitions.get(name) else {
            // Fall back to the delegation chain before giving up.
            if let Some(parent) = &self.parent {
                if parent.contains(name) {
                    #[cfg(feature = "logging")]
                    trace!(
                        target: "trellis_ioc",
                        bean = name,
                        "Delegating resolution to parent resolver"
                    );
                    return match args {
                        Some(args) => parent.get_with_args(name, args),
                        None => parent.get(name),
                    };
                }
            }
            return Err(BeanError::no_such_bean(name));
        };

        // Force every declared dependency into existence before this bean's
        // construction runs. Results are discarded here; wiring the values
        // into the instance is the instantiator's job.
        for dep in &definition.depends_on {
            if dep == name || chain.iter().any(|ancestor| ancestor == dep) {
                let mut cycle: Vec<&str> = chain.iter().map(String::as_str).collect();
                cycle.push(name);
                return Err(BeanError::circular(&cycle, dep));
            }
            chain.push(name.to_string());
            let resolved = self.do_get(dep, None, chain);
            chain.pop();
            resolved?;
        }

        match definition.scope {
            Scope::Singleton => match self.singletons.begin_creation(name)? {
                CreationTicket::AlreadyReady(instance) => Ok(instance),
                CreationTicket::Started => {
                    #[cfg(feature = "logging")]
                    info!(
                        target: "trellis_ioc",
                        bean = name,
                        bean_type = definition.type_name,
                        "Creating shared instance of singleton bean"
                    );
                    match self.create_bean(&definition, args) {
                        Ok(instance) => {
                            self.singletons.complete_creation(name, Arc::clone(&instance));
                            Ok(instance)
                        }
                        Err(e) => {
                            // Mandatory cleanup: no dangling Creating entry
                            // may survive a failed construction.
                            self.singletons.fail_creation(name);
                            Err(e)
                        }
                    }
                }
            },
            Scope::Prototype => {
                #[cfg(feature = "logging")]
                debug!(
                    target: "trellis_ioc",
                    bean = name,
                    "Creating new instance of prototype bean"
                );
                self.create_bean(&definition, args)
            }
        }
    }

    /// Construct the instance and run its declared init hook.
    fn create_bean(
        &self,
        definition: &BeanDefinition,
        args: Option<&BeanArgs>,
    ) -> Result<BeanValue> {
        let instance = self.instantiator.instantiate(self, definition, args)?;

        if let Some(init) = &definition.init_method {
            let Some(hooks) = &self.hooks else {
                return Err(BeanError::initialization(
                    &definition.name,
                    format!("init hook '{init}' declared but no hook invoker is configured"),
                ));
            };
            hooks
                .invoke(&instance, definition, init)
                .map_err(|e| BeanError::initialization(&definition.name, e.reason()))?;
        }

        Ok(instance)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// True if the name is locally registered (definition or live singleton)
    /// or resolvable through the delegation chain.
    pub fn contains(&self, name: &str) -> bool {
        if self.singletons.contains(name) || self.definitions.contains(name) {
            return true;
        }
        self.parent
            .as_ref()
            .is_some_and(|parent| parent.contains(name))
    }

    /// True if `name` is singleton-scoped. Fails with `NoSuchBean` if the
    /// name is unknown anywhere in the delegation chain.
    pub fn is_singleton(&self, name: &str) -> Result<bool> {
        self.scope_of(name).map(|scope| scope == Scope::Singleton)
    }

    /// True if `name` is prototype-scoped. Fails with `NoSuchBean` if the
    /// name is unknown anywhere in the delegation chain.
    pub fn is_prototype(&self, name: &str) -> Result<bool> {
        self.scope_of(name).map(|scope| scope == Scope::Prototype)
    }

    fn scope_of(&self, name: &str) -> Result<Scope> {
        if let Some(definition) = self.definitions.get(name) {
            return Ok(definition.scope);
        }
        match &self.parent {
            Some(parent) => parent.scope_of(name),
            None => Err(BeanError::no_such_bean(name)),
        }
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Tear down every singleton in the local store.
    ///
    /// Each singleton's destroy hook (if declared) runs exactly once, and
    /// the entry is removed even when its hook fails. Every singleton is
    /// attempted; the first hook failure is returned after the sweep and
    /// later ones are logged.
    pub fn destroy_all(&self) -> Result<()> {
        #[cfg(feature = "logging")]
        info!(
            target: "trellis_ioc",
            count = self.singletons.len(),
            "Destroying all singletons"
        );

        let mut first_error = None;
        for name in self.singletons.ready_names() {
            if let Err(e) = self.destroy_singleton(&name) {
                #[cfg(feature = "logging")]
                warn!(
                    target: "trellis_ioc",
                    bean = %name,
                    error = %e,
                    "Destroy hook failed; singleton removed anyway"
                );
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn destroy_singleton(&self, name: &str) -> Result<()> {
        let Some(instance) = self.singletons.begin_destruction(name) else {
            return Ok(());
        };

        let mut hook_result = Ok(());
        if let Some(definition) = self.definitions.get(name) {
            if let Some(destroy) = &definition.destroy_method {
                hook_result = match &self.hooks {
                    Some(hooks) => hooks
                        .invoke(&instance, &definition, destroy)
                        .map_err(|e| BeanError::destruction(name, e.reason())),
                    None => Err(BeanError::destruction(
                        name,
                        format!("destroy hook '{destroy}' declared but no hook invoker is configured"),
                    )),
                };
            }
        }

        // The entry is removed no matter what the hook did.
        self.singletons.complete_destruction(name);
        hook_result
    }

    /// Number of live singletons
    #[inline]
    pub fn singleton_count(&self) -> usize {
        self.singletons.len()
    }
}

impl std::fmt::Debug for BeanResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BeanResolver")
            .field("definitions", &self.definitions.len())
            .field("singletons", &self.singletons.len())
            .field("lifecycle_aware", &self.hooks.is_some())
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}
