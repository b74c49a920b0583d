//! Lifecycle hook invocation
//!
//! Definitions name their initializer/destroy hooks as strings; a
//! [`HookInvoker`] turns those names into calls on the concrete instance.
//! The default [`HookRegistry`] resolves a callable handle per
//! `(concrete type, hook name)` pair once at setup, so resolution never
//! re-interprets strings on the hot path.
//!
//! A named hook that cannot be found is fatal, never silently skipped.

use crate::{BeanDefinition, BeanValue};
use ahash::RandomState;
use dashmap::DashMap;
use std::any::{Any, TypeId};

/// Result of a user hook body.
pub type HookResult = std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Failure surfaced by a hook invoker.
///
/// The resolver wraps these uniformly into `Initialization` / `Destruction`
/// errors depending on which lifecycle phase was running.
#[derive(Debug)]
pub enum HookError {
    /// No hook with the requested name exists for the bean's concrete type
    Missing { hook: String },
    /// The hook ran and raised
    Failed { hook: String, reason: String },
}

impl HookError {
    /// Human-readable reason, used in the wrapping lifecycle error
    pub fn reason(&self) -> String {
        match self {
            HookError::Missing { hook } => format!("no hook named '{hook}'"),
            HookError::Failed { hook, reason } => format!("hook '{hook}' failed: {reason}"),
        }
    }
}

/// Invokes a named lifecycle hook on a bean instance.
pub trait HookInvoker: Send + Sync {
    /// Invoke `hook` on `bean`, whose concrete type is described by
    /// `definition`.
    fn invoke(
        &self,
        bean: &BeanValue,
        definition: &BeanDefinition,
        hook: &str,
    ) -> std::result::Result<(), HookError>;
}

/// Callable handle bound to a concrete type at registration.
type HookFn = Box<dyn Fn(&BeanValue) -> HookResult + Send + Sync>;

/// Default [`HookInvoker`]: a registry of callables keyed by
/// `(TypeId, hook name)`.
///
/// # Examples
///
/// ```rust
/// use trellis_ioc::HookRegistry;
/// use std::sync::atomic::{AtomicBool, Ordering};
///
/// struct Pool {
///     warmed: AtomicBool,
/// }
///
/// let hooks = HookRegistry::new();
/// hooks.register::<Pool, _>("warm_up", |pool| {
///     pool.warmed.store(true, Ordering::SeqCst);
///     Ok(())
/// });
/// ```
pub struct HookRegistry {
    hooks: DashMap<(TypeId, String), HookFn, RandomState>,
}

impl HookRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            hooks: DashMap::with_hasher(RandomState::new()),
        }
    }

    /// Register the hook named `hook` for concrete type `T`.
    ///
    /// The callable is resolved against the type here, once; invocations
    /// later are a map lookup plus a checked downcast.
    pub fn register<T, F>(&self, hook: impl Into<String>, f: F)
    where
        T: Any + Send + Sync,
        F: Fn(&T) -> HookResult + Send + Sync + 'static,
    {
        self.hooks.insert(
            (TypeId::of::<T>(), hook.into()),
            Box::new(move |bean: &BeanValue| {
                let typed = bean
                    .downcast_ref::<T>()
                    .ok_or_else(|| format!("instance is not a {}", std::any::type_name::<T>()))?;
                f(typed)
            }),
        );
    }

    /// Check if a hook is registered for `T`
    pub fn contains<T: Any>(&self, hook: &str) -> bool {
        self.hooks
            .contains_key(&(TypeId::of::<T>(), hook.to_string()))
    }

    /// Number of registered hooks
    #[inline]
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Check if no hooks are registered
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HookInvoker for HookRegistry {
    fn invoke(
        &self,
        bean: &BeanValue,
        definition: &BeanDefinition,
        hook: &str,
    ) -> std::result::Result<(), HookError> {
        let key = (definition.type_id, hook.to_string());
        let handle = self.hooks.get(&key).ok_or_else(|| HookError::Missing {
            hook: hook.to_string(),
        })?;

        #[cfg(feature = "logging")]
        tracing::trace!(
            target: "trellis_ioc",
            bean = %definition.name,
            hook = hook,
            "Invoking lifecycle hook"
        );

        (*handle)(bean).map_err(|e| HookError::Failed {
            hook: hook.to_string(),
            reason: e.to_string(),
        })
    }
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRegistry")
            .field("count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct Service {
        starts: AtomicU32,
    }

    fn service_bean() -> BeanValue {
        Arc::new(Service {
            starts: AtomicU32::new(0),
        })
    }

    #[test]
    fn invokes_registered_hook() {
        let hooks = HookRegistry::new();
        hooks.register::<Service, _>("start", |s| {
            s.starts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let bean = service_bean();
        let def = BeanDefinition::of::<Service>("svc");
        hooks.invoke(&bean, &def, "start").unwrap();

        let svc = bean.downcast_ref::<Service>().unwrap();
        assert_eq!(svc.starts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn missing_hook_is_fatal() {
        let hooks = HookRegistry::new();
        let bean = service_bean();
        let def = BeanDefinition::of::<Service>("svc");

        let err = hooks.invoke(&bean, &def, "start").unwrap_err();
        assert!(matches!(err, HookError::Missing { hook } if hook == "start"));
    }

    #[test]
    fn hook_failure_carries_reason() {
        let hooks = HookRegistry::new();
        hooks.register::<Service, _>("start", |_| Err("port in use".into()));

        let bean = service_bean();
        let def = BeanDefinition::of::<Service>("svc");
        let err = hooks.invoke(&bean, &def, "start").unwrap_err();
        assert!(err.reason().contains("port in use"));
    }

    #[test]
    fn wrong_type_is_reported() {
        let hooks = HookRegistry::new();
        hooks.register::<Service, _>("start", |_| Ok(()));

        // Definition claims Service but the instance is a u32
        let bean: BeanValue = Arc::new(5u32);
        let def = BeanDefinition::of::<Service>("svc");
        let err = hooks.invoke(&bean, &def, "start").unwrap_err();
        assert!(matches!(err, HookError::Failed { .. }));
    }
}
