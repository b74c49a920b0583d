//! # Trellis IoC - Inversion-of-Control Bean Container for Rust
//!
//! A lock-free bean container with lifecycle management and a method
//! interception pipeline for cross-cutting advice.
//!
//! ## Features
//!
//! - ⚡ **Lock-free** - Uses `DashMap` for concurrent access without blocking
//! - 🫘 **Declarative beans** - Name, scope, dependencies, and lifecycle hooks per definition
//! - 🔄 **Singleton & prototype scopes** - Cached shared instances or a fresh one per request
//! - 🕸️ **Cycle detection** - Circular dependency chains are rejected before any side effect
//! - 🪝 **Lifecycle hooks** - Named init/destroy callbacks resolved once at setup
//! - 🎯 **Advice pipeline** - Before / around / after-returning / after-throwing interception
//! - 🌳 **Resolver chains** - Child resolvers delegate unknown names to a parent
//! - 📊 **Observable** - Optional tracing integration with JSON or pretty output
//!
//! ## Quick Start
//!
//! ```rust
//! use trellis_ioc::{BeanDefinition, BeanResolver, FactoryInstantiator, Scope};
//! use std::sync::Arc;
//!
//! struct Database {
//!     url: String,
//! }
//!
//! struct UserService {
//!     db: Arc<Database>,
//! }
//!
//! // Factories construct beans; the resolver decides when they run
//! let factories = FactoryInstantiator::new();
//! factories.provide_value("database", || Database {
//!     url: "postgres://localhost".into(),
//! });
//! factories.provide("userService", |resolver, _| {
//!     Ok(UserService {
//!         db: resolver.get_typed::<Database>("database")?,
//!     })
//! });
//!
//! let resolver = BeanResolver::new(Arc::new(factories));
//! resolver.register(BeanDefinition::of::<Database>("database")).unwrap();
//! resolver.register(
//!     BeanDefinition::of::<UserService>("userService").with_depends_on(["database"]),
//! ).unwrap();
//!
//! // Resolve - singletons are created once and cached
//! let users = resolver.get_typed::<UserService>("userService").unwrap();
//! assert_eq!(users.db.url, "postgres://localhost");
//! ```
//!
//! ## Method Interception
//!
//! ```rust
//! use trellis_ioc::{
//!     Advice, AdviceRegistry, Advisor, InvocationPipeline, MethodTable, Pointcut, ProxyTarget,
//! };
//! use std::sync::Arc;
//!
//! struct Greeter;
//!
//! let methods = MethodTable::new();
//! methods.register::<Greeter, _>("greet", |_, _| Ok(Some(Arc::new("hello".to_string()))));
//!
//! let mut advisors = AdviceRegistry::new();
//! advisors.register(Advisor::new(
//!     0,
//!     Pointcut::pattern("gre*"),
//!     Advice::before(|ctx| {
//!         println!("calling {}", ctx.method);
//!         Ok(())
//!     }),
//! ));
//!
//! let pipeline = InvocationPipeline::new(
//!     ProxyTarget::Shared(Arc::new(Greeter)),
//!     Arc::new(advisors),
//!     Arc::new(methods),
//! );
//! let outcome = pipeline.invoke("greet", &[]).unwrap();
//! assert_eq!(
//!     outcome.value().unwrap().downcast_ref::<String>().unwrap(),
//!     "hello"
//! );
//! ```
//!
//! ## Concurrency
//!
//! - **Lock-free maps**: `DashMap` with `AHash` keeps unrelated bean names off
//!   a shared lock
//! - **At-most-one construction**: the singleton store's per-name state
//!   transition is atomic; an overlapping resolver of the same name fails
//!   fast with `CreationInProgress` instead of blocking
//! - **Read-only advice**: advisor registration happens at setup, so
//!   invocation-time selection never takes a lock

mod advice;
mod definition;
mod error;
mod factory;
mod hooks;
mod invocation;
#[cfg(feature = "logging")]
pub mod logging;
mod resolver;
mod singleton;

pub use advice::*;
pub use definition::*;
pub use error::*;
pub use factory::*;
pub use hooks::*;
pub use invocation::*;
pub use resolver::*;
pub use singleton::{CreationTicket, LifecycleState, SingletonStore};

// Re-export tracing macros for convenience when logging feature is enabled
#[cfg(feature = "logging")]
pub use tracing::{debug, error, info, trace, warn};

// Re-export for convenience
pub use std::sync::Arc;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        Advice, AdviceRegistry, Advisor, BeanDefinition, BeanError, BeanResolver, BeanValue,
        Dispatch, FactoryInstantiator, HookRegistry, InvocationPipeline, MethodTable, Pointcut,
        ProxyTarget, Result, Scope,
    };
    pub use std::sync::Arc;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Ledger {
        entries: std::sync::Mutex<Vec<String>>,
    }

    struct AuditService {
        ledger: Arc<Ledger>,
    }

    #[test]
    fn container_and_pipeline_end_to_end() {
        let factories = FactoryInstantiator::new();
        factories.provide_value("ledger", || Ledger {
            entries: std::sync::Mutex::new(Vec::new()),
        });
        factories.provide("audit", |resolver, _| {
            Ok(AuditService {
                ledger: resolver.get_typed::<Ledger>("ledger")?,
            })
        });

        let resolver = BeanResolver::new(Arc::new(factories));
        resolver.register(BeanDefinition::of::<Ledger>("ledger")).unwrap();
        resolver
            .register(BeanDefinition::of::<AuditService>("audit").with_depends_on(["ledger"]))
            .unwrap();

        let audit = resolver.get_typed::<AuditService>("audit").unwrap();

        let methods = MethodTable::new();
        methods.register::<AuditService, _>("record", |service, args| {
            let entry = args
                .first()
                .and_then(|a| a.downcast_ref::<String>())
                .ok_or_else(|| method_error("record requires an entry"))?;
            service.ledger.entries.lock().unwrap().push(entry.clone());
            Ok(None)
        });

        let mut advisors = AdviceRegistry::new();
        advisors.register(Advisor::new(
            0,
            Pointcut::method("record"),
            Advice::before(|ctx| {
                if ctx.args.is_empty() {
                    Err(method_error("record called without arguments"))
                } else {
                    Ok(())
                }
            }),
        ));

        let pipeline = InvocationPipeline::new(
            ProxyTarget::Shared(audit.clone() as BeanValue),
            Arc::new(advisors),
            Arc::new(methods),
        );

        let args: Vec<BeanValue> = vec![Arc::new("payment received".to_string())];
        pipeline.invoke("record", &args).unwrap();
        assert_eq!(
            *audit.ledger.entries.lock().unwrap(),
            vec!["payment received".to_string()]
        );

        // The before-advice rejects a malformed call before the method runs
        assert!(pipeline.invoke("record", &[]).is_err());
        assert_eq!(audit.ledger.entries.lock().unwrap().len(), 1);
    }

    #[test]
    fn prototype_bean_behind_an_unshared_proxy() {
        static BUILT: AtomicU32 = AtomicU32::new(0);

        struct Worker {
            id: u32,
        }

        let factories = FactoryInstantiator::new();
        factories.provide_value("worker", || Worker {
            id: BUILT.fetch_add(1, Ordering::SeqCst),
        });

        let resolver = Arc::new(BeanResolver::new(Arc::new(factories)));
        resolver
            .register(BeanDefinition::of::<Worker>("worker").with_scope(Scope::Prototype))
            .unwrap();

        let methods = MethodTable::new();
        methods.register::<Worker, _>("id", |worker, _| Ok(Some(Arc::new(worker.id))));

        let pipeline = InvocationPipeline::new(
            ProxyTarget::Unshared(Arc::new(PrototypeTargetSource::new(
                Arc::clone(&resolver),
                "worker",
            ))),
            Arc::new(AdviceRegistry::new()),
            Arc::new(methods),
        );

        // Every call through the proxy hits a fresh prototype instance
        let first = pipeline.invoke("id", &[]).unwrap();
        let second = pipeline.invoke("id", &[]).unwrap();
        assert_ne!(
            first.value().and_then(|v| v.downcast_ref::<u32>()),
            second.value().and_then(|v| v.downcast_ref::<u32>())
        );
        assert_eq!(BUILT.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn lifecycle_and_absorption_work_together() {
        struct Connection {
            open: std::sync::atomic::AtomicBool,
        }

        let factories = FactoryInstantiator::new();
        factories.provide_value("conn", || Connection {
            open: std::sync::atomic::AtomicBool::new(false),
        });

        let hooks = HookRegistry::new();
        hooks.register::<Connection, _>("connect", |conn| {
            conn.open.store(true, Ordering::SeqCst);
            Ok(())
        });
        hooks.register::<Connection, _>("disconnect", |conn| {
            conn.open.store(false, Ordering::SeqCst);
            Ok(())
        });

        let resolver = BeanResolver::with_lifecycle(Arc::new(factories), Arc::new(hooks));
        resolver
            .register(
                BeanDefinition::of::<Connection>("conn")
                    .with_init_method("connect")
                    .with_destroy_method("disconnect"),
            )
            .unwrap();

        let conn = resolver.get_typed::<Connection>("conn").unwrap();
        assert!(conn.open.load(Ordering::SeqCst));

        let methods = MethodTable::new();
        methods.register::<Connection, _>("query", |conn, _| {
            if conn.open.load(Ordering::SeqCst) {
                Ok(Some(Arc::new("row".to_string())))
            } else {
                Err(method_error("connection closed"))
            }
        });

        let mut advisors = AdviceRegistry::new();
        advisors.register(Advisor::new(
            0,
            Pointcut::All,
            Advice::after_throwing(|_, _| {}),
        ));

        let pipeline = InvocationPipeline::new(
            ProxyTarget::Shared(conn.clone() as BeanValue),
            Arc::new(advisors),
            Arc::new(methods),
        );

        assert!(!pipeline.invoke("query", &[]).unwrap().is_absorbed());

        resolver.destroy_all().unwrap();
        assert!(!conn.open.load(Ordering::SeqCst));

        // The failure after teardown is absorbed, not propagated
        assert!(pipeline.invoke("query", &[]).unwrap().is_absorbed());
    }
}
