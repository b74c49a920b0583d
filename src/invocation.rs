//! The advice-invocation pipeline
//!
//! [`InvocationPipeline`] is the decision logic behind a proxy: given a
//! method name and arguments it resolves the real target, selects the
//! matching advisors, and runs the call in the mandated order - befores,
//! then the (single) around or the direct call, then after-returning
//! observers on success or after-throwing observers on failure.
//!
//! Failure handling is an explicit tagged outcome, [`Dispatch`]: a call
//! either `Returned` a value or was `Absorbed` by a matching after-throwing
//! advice. An unmatched failure is re-raised verbatim as the `Err` arm; the
//! pipeline never substitutes its own error for the method's.

use crate::advice::{AdviceRegistry, BeforeAdvice};
use crate::{BeanResolver, BeanValue};
use ahash::RandomState;
use dashmap::DashMap;
use std::any::{Any, TypeId};
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::{debug, trace};

/// Error raised by an intercepted method, a before-advice, or target
/// resolution. Shared so after-throwing observers and the caller can both
/// see the same failure.
pub type MethodError = Arc<dyn std::error::Error + Send + Sync>;

/// Build a [`MethodError`] from a message.
pub fn method_error(message: impl Into<String>) -> MethodError {
    Arc::from(Box::<dyn std::error::Error + Send + Sync>::from(message.into()))
}

/// Methods that bypass advice entirely and go straight to the target.
///
/// Object-identity operations must reflect the real object, not advice side
/// effects.
const RESERVED_METHODS: [&str; 3] = ["to_string", "eq", "hash"];

// =============================================================================
// Invocation context and the proceed handle
// =============================================================================

/// One intercepted call: the resolved target, the method name, and the
/// arguments. Lives only for the duration of that call.
#[derive(Clone)]
pub struct InvocationContext {
    pub target: BeanValue,
    pub method: String,
    pub args: Vec<BeanValue>,
}

impl std::fmt::Debug for InvocationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvocationContext")
            .field("method", &self.method)
            .field("args", &self.args.len())
            .finish()
    }
}

/// The "proceed to the real method" handle passed to an around-advice.
///
/// Carries the before-advices selected for this call: they run when the
/// around decides to proceed, so an around that short-circuits also skips
/// them. `proceed` consumes the invocation - the real method runs at most
/// once per call.
pub struct MethodInvocation {
    context: InvocationContext,
    befores: Vec<Arc<dyn BeforeAdvice>>,
    invoker: Arc<dyn TargetInvoker>,
}

impl MethodInvocation {
    /// The call being intercepted
    #[inline]
    pub fn context(&self) -> &InvocationContext {
        &self.context
    }

    /// Run the before-advices and then the real method.
    ///
    /// A before-advice failure aborts the call; the real method never runs.
    pub fn proceed(self) -> Result<Option<BeanValue>, MethodError> {
        for before in &self.befores {
            before.before(&self.context)?;
        }
        self.invoker
            .call(&self.context.target, &self.context.method, &self.context.args)
    }
}

impl std::fmt::Debug for MethodInvocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodInvocation")
            .field("method", &self.context.method)
            .field("befores", &self.befores.len())
            .finish()
    }
}

// =============================================================================
// Target resolution
// =============================================================================

/// Produces the real target for one call.
///
/// Used by unshared proxies: the proxy holds no persistent target reference
/// and fetches a fresh instance per invocation.
pub trait TargetSource: Send + Sync {
    fn target(&self) -> Result<BeanValue, MethodError>;
}

/// What a proxy points at.
pub enum ProxyTarget {
    /// A persistent reference; every call hits the same instance
    Shared(BeanValue),
    /// No persistent reference; the source is consulted per call
    Unshared(Arc<dyn TargetSource>),
}

impl ProxyTarget {
    /// Resolve the target for the current call.
    pub fn resolve(&self) -> Result<BeanValue, MethodError> {
        match self {
            ProxyTarget::Shared(instance) => Ok(Arc::clone(instance)),
            ProxyTarget::Unshared(source) => source.target(),
        }
    }
}

impl std::fmt::Debug for ProxyTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProxyTarget::Shared(_) => write!(f, "ProxyTarget::Shared"),
            ProxyTarget::Unshared(_) => write!(f, "ProxyTarget::Unshared"),
        }
    }
}

/// [`TargetSource`] that resolves a prototype bean per call.
///
/// This is how a prototype-scoped bean gets per-call instances behind one
/// shared proxy.
pub struct PrototypeTargetSource {
    resolver: Arc<BeanResolver>,
    name: String,
}

impl PrototypeTargetSource {
    pub fn new(resolver: Arc<BeanResolver>, name: impl Into<String>) -> Self {
        Self {
            resolver,
            name: name.into(),
        }
    }
}

impl TargetSource for PrototypeTargetSource {
    fn target(&self) -> Result<BeanValue, MethodError> {
        self.resolver
            .get(&self.name)
            .map_err(|e| Arc::new(e) as MethodError)
    }
}

// =============================================================================
// Target invocation
// =============================================================================

/// Calls a named method on a resolved target.
pub trait TargetInvoker: Send + Sync {
    fn call(
        &self,
        target: &BeanValue,
        method: &str,
        args: &[BeanValue],
    ) -> Result<Option<BeanValue>, MethodError>;
}

/// Callable handle bound to a concrete type at registration.
type MethodFn =
    Box<dyn Fn(&BeanValue, &[BeanValue]) -> Result<Option<BeanValue>, MethodError> + Send + Sync>;

/// Default [`TargetInvoker`]: callable handles keyed by
/// `(concrete type, method name)`, resolved once at setup rather than
/// re-interpreted per call.
///
/// # Examples
///
/// ```rust
/// use trellis_ioc::MethodTable;
/// use std::sync::Arc;
///
/// struct Greeter { salutation: String }
///
/// let methods = MethodTable::new();
/// methods.register::<Greeter, _>("greet", |greeter, args| {
///     let who = args
///         .first()
///         .and_then(|a| a.downcast_ref::<String>())
///         .map(String::as_str)
///         .unwrap_or("world");
///     Ok(Some(Arc::new(format!("{} {who}", greeter.salutation))))
/// });
/// ```
pub struct MethodTable {
    methods: DashMap<(TypeId, String), MethodFn, RandomState>,
}

impl MethodTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self {
            methods: DashMap::with_hasher(RandomState::new()),
        }
    }

    /// Register the method named `method` for concrete type `T`.
    pub fn register<T, F>(&self, method: impl Into<String>, f: F)
    where
        T: Any + Send + Sync,
        F: Fn(&T, &[BeanValue]) -> Result<Option<BeanValue>, MethodError> + Send + Sync + 'static,
    {
        self.methods.insert(
            (TypeId::of::<T>(), method.into()),
            Box::new(move |target: &BeanValue, args: &[BeanValue]| {
                let typed = target.downcast_ref::<T>().ok_or_else(|| {
                    method_error(format!(
                        "target is not a {}",
                        std::any::type_name::<T>()
                    ))
                })?;
                f(typed, args)
            }),
        );
    }

    /// Number of registered methods
    #[inline]
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    /// Check if no methods are registered
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

impl Default for MethodTable {
    fn default() -> Self {
        Self::new()
    }
}

impl TargetInvoker for MethodTable {
    fn call(
        &self,
        target: &BeanValue,
        method: &str,
        args: &[BeanValue],
    ) -> Result<Option<BeanValue>, MethodError> {
        let key = ((**target).type_id(), method.to_string());
        let handle = self
            .methods
            .get(&key)
            .ok_or_else(|| method_error(format!("no method '{method}' on target type")))?;
        (*handle)(target, args)
    }
}

impl std::fmt::Debug for MethodTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodTable")
            .field("count", &self.len())
            .finish()
    }
}

// =============================================================================
// The pipeline
// =============================================================================

/// Outcome of one pipelined call.
///
/// `Absorbed` is how "an after-throwing advice handled the failure" is made
/// distinguishable from a method that legitimately returned nothing.
#[derive(Clone)]
pub enum Dispatch {
    /// The method (or a short-circuiting around-advice) produced a value
    Returned(Option<BeanValue>),
    /// The method failed and a matching after-throwing advice absorbed it
    Absorbed(MethodError),
}

impl std::fmt::Debug for Dispatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dispatch::Returned(Some(_)) => write!(f, "Returned(value)"),
            Dispatch::Returned(None) => write!(f, "Returned(empty)"),
            Dispatch::Absorbed(error) => write!(f, "Absorbed({error})"),
        }
    }
}

impl Dispatch {
    /// The returned value, if any. Empty for `Absorbed`.
    pub fn value(&self) -> Option<&BeanValue> {
        match self {
            Dispatch::Returned(value) => value.as_ref(),
            Dispatch::Absorbed(_) => None,
        }
    }

    /// True if a failure was absorbed rather than returned
    #[inline]
    pub fn is_absorbed(&self) -> bool {
        matches!(self, Dispatch::Absorbed(_))
    }
}

/// The interception engine behind a proxy.
///
/// Holds what the proxy-creation layer hands over: the target (or an
/// unshared-instance source), the advisor registry, and the invoker that
/// reaches the real methods.
///
/// # Examples
///
/// ```rust
/// use trellis_ioc::{
///     Advice, AdviceRegistry, Advisor, InvocationPipeline, MethodTable, Pointcut, ProxyTarget,
/// };
/// use std::sync::Arc;
///
/// struct Counter;
///
/// let methods = MethodTable::new();
/// methods.register::<Counter, _>("ping", |_, _| Ok(Some(Arc::new("pong".to_string()))));
///
/// let mut advisors = AdviceRegistry::new();
/// advisors.register(Advisor::new(0, Pointcut::All, Advice::before(|_| Ok(()))));
///
/// let pipeline = InvocationPipeline::new(
///     ProxyTarget::Shared(Arc::new(Counter)),
///     Arc::new(advisors),
///     Arc::new(methods),
/// );
/// let outcome = pipeline.invoke("ping", &[]).unwrap();
/// assert_eq!(
///     outcome.value().unwrap().downcast_ref::<String>().unwrap(),
///     "pong"
/// );
/// ```
pub struct InvocationPipeline {
    target: ProxyTarget,
    advisors: Arc<AdviceRegistry>,
    invoker: Arc<dyn TargetInvoker>,
}

impl InvocationPipeline {
    pub fn new(
        target: ProxyTarget,
        advisors: Arc<AdviceRegistry>,
        invoker: Arc<dyn TargetInvoker>,
    ) -> Self {
        Self {
            target,
            advisors,
            invoker,
        }
    }

    /// Run one intercepted call through the pipeline.
    ///
    /// `Err` is an unabsorbed failure, re-raised verbatim. `Ok` is either
    /// the method's result or an `Absorbed` marker.
    pub fn invoke(&self, method: &str, args: &[BeanValue]) -> Result<Dispatch, MethodError> {
        let target = self.target.resolve()?;

        // Identity operations must reflect the real object
        if RESERVED_METHODS.contains(&method) {
            return self
                .invoker
                .call(&target, method, args)
                .map(Dispatch::Returned);
        }

        #[cfg(feature = "logging")]
        trace!(
            target: "trellis_ioc",
            method = method,
            "Dispatching intercepted call"
        );

        let context = InvocationContext {
            target,
            method: method.to_string(),
            args: args.to_vec(),
        };
        let invocation = MethodInvocation {
            context: context.clone(),
            befores: self.advisors.befores_for(method),
            invoker: Arc::clone(&self.invoker),
        };

        // A single around-advice wraps the call; without one the befores and
        // the real method run directly.
        let outcome = match self.advisors.around_for(method) {
            Some(around) => around.around(invocation),
            None => invocation.proceed(),
        };

        match outcome {
            Ok(value) => {
                for observer in self.advisors.after_returnings_for(method) {
                    observer.after_returning(&context, value.as_ref());
                }
                Ok(Dispatch::Returned(value))
            }
            Err(error) => {
                let handlers = self.advisors.after_throwings_for(method);
                if handlers.is_empty() {
                    return Err(error);
                }
                for handler in &handlers {
                    handler.after_throwing(&context, &error);
                }

                #[cfg(feature = "logging")]
                debug!(
                    target: "trellis_ioc",
                    method = method,
                    error = %error,
                    "Failure absorbed by after-throwing advice"
                );

                Ok(Dispatch::Absorbed(error))
            }
        }
    }
}

impl std::fmt::Debug for InvocationPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvocationPipeline")
            .field("target", &self.target)
            .field("advisors", &self.advisors.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advice::{Advice, Advisor, Pointcut};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    struct Account {
        balance: u32,
    }

    fn account_methods() -> MethodTable {
        let methods = MethodTable::new();
        methods.register::<Account, _>("balance", |account, _| {
            Ok(Some(Arc::new(account.balance)))
        });
        methods.register::<Account, _>("overdraw", |_, _| {
            Err(method_error("insufficient funds"))
        });
        methods.register::<Account, _>("to_string", |account, _| {
            Ok(Some(Arc::new(format!("Account({})", account.balance))))
        });
        methods
    }

    fn pipeline_with(advisors: AdviceRegistry) -> InvocationPipeline {
        InvocationPipeline::new(
            ProxyTarget::Shared(Arc::new(Account { balance: 100 })),
            Arc::new(advisors),
            Arc::new(account_methods()),
        )
    }

    #[test]
    fn before_then_method_then_after_returning() {
        let steps: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

        let mut advisors = AdviceRegistry::new();
        let log = Arc::clone(&steps);
        advisors.register(Advisor::new(
            0,
            Pointcut::method("balance"),
            Advice::before(move |_| {
                log.lock().unwrap().push("before");
                Ok(())
            }),
        ));
        let log = Arc::clone(&steps);
        advisors.register(Advisor::new(
            1,
            Pointcut::method("balance"),
            Advice::after_returning(move |_, result| {
                assert_eq!(
                    result.and_then(|v| v.downcast_ref::<u32>()).copied(),
                    Some(100)
                );
                log.lock().unwrap().push("after");
            }),
        ));

        let outcome = pipeline_with(advisors).invoke("balance", &[]).unwrap();
        assert_eq!(
            outcome.value().and_then(|v| v.downcast_ref::<u32>()).copied(),
            Some(100)
        );
        assert_eq!(*steps.lock().unwrap(), vec!["before", "after"]);
    }

    #[test]
    fn after_throwing_absorbs_the_failure() {
        let seen = Arc::new(Mutex::new(None));

        let mut advisors = AdviceRegistry::new();
        advisors.register(Advisor::new(
            0,
            Pointcut::All,
            Advice::around(|invocation| invocation.proceed()),
        ));
        let sink = Arc::clone(&seen);
        advisors.register(Advisor::new(
            1,
            Pointcut::All,
            Advice::after_throwing(move |ctx, error| {
                *sink.lock().unwrap() = Some((ctx.method.clone(), error.to_string()));
            }),
        ));

        // The failure does not escape; the outcome is tagged Absorbed
        let outcome = pipeline_with(advisors).invoke("overdraw", &[]).unwrap();
        assert!(outcome.is_absorbed());
        assert!(outcome.value().is_none());

        let seen = seen.lock().unwrap().clone().unwrap();
        assert_eq!(seen.0, "overdraw");
        assert!(seen.1.contains("insufficient funds"));
    }

    #[test]
    fn unmatched_failure_is_reraised_verbatim() {
        let advisors = AdviceRegistry::new();
        let err = pipeline_with(advisors).invoke("overdraw", &[]).unwrap_err();
        assert_eq!(err.to_string(), "insufficient funds");
    }

    #[test]
    fn around_can_short_circuit() {
        let mut advisors = AdviceRegistry::new();
        advisors.register(Advisor::new(
            0,
            Pointcut::method("balance"),
            Advice::around(|_| Ok(Some(Arc::new(0u32)))),
        ));
        // A before that would panic if the call proceeded
        advisors.register(Advisor::new(
            1,
            Pointcut::method("balance"),
            Advice::before(|_| panic!("short-circuited call must skip befores")),
        ));

        let outcome = pipeline_with(advisors).invoke("balance", &[]).unwrap();
        assert_eq!(
            outcome.value().and_then(|v| v.downcast_ref::<u32>()).copied(),
            Some(0)
        );
    }

    #[test]
    fn first_matching_around_wraps_only() {
        static FIRST: AtomicU32 = AtomicU32::new(0);
        static SECOND: AtomicU32 = AtomicU32::new(0);

        let mut advisors = AdviceRegistry::new();
        advisors.register(Advisor::new(
            0,
            Pointcut::All,
            Advice::around(|invocation| {
                FIRST.fetch_add(1, Ordering::SeqCst);
                invocation.proceed()
            }),
        ));
        advisors.register(Advisor::new(
            1,
            Pointcut::All,
            Advice::around(|invocation| {
                SECOND.fetch_add(1, Ordering::SeqCst);
                invocation.proceed()
            }),
        ));

        pipeline_with(advisors).invoke("balance", &[]).unwrap();
        assert_eq!(FIRST.load(Ordering::SeqCst), 1);
        assert_eq!(SECOND.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn before_failure_aborts_the_call() {
        static CALLS: AtomicU32 = AtomicU32::new(0);

        let methods = MethodTable::new();
        methods.register::<Account, _>("balance", |account, _| {
            CALLS.fetch_add(1, Ordering::SeqCst);
            Ok(Some(Arc::new(account.balance)))
        });

        let mut advisors = AdviceRegistry::new();
        advisors.register(Advisor::new(
            0,
            Pointcut::All,
            Advice::before(|ctx| Err(method_error(format!("{} denied", ctx.method)))),
        ));

        let pipeline = InvocationPipeline::new(
            ProxyTarget::Shared(Arc::new(Account { balance: 1 })),
            Arc::new(advisors),
            Arc::new(methods),
        );

        let err = pipeline.invoke("balance", &[]).unwrap_err();
        assert!(err.to_string().contains("balance denied"));
        assert_eq!(CALLS.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn reserved_methods_bypass_advice() {
        let mut advisors = AdviceRegistry::new();
        advisors.register(Advisor::new(
            0,
            Pointcut::All,
            Advice::before(|_| panic!("identity operations must not be advised")),
        ));

        let outcome = pipeline_with(advisors).invoke("to_string", &[]).unwrap();
        assert_eq!(
            outcome
                .value()
                .and_then(|v| v.downcast_ref::<String>())
                .map(String::as_str),
            Some("Account(100)")
        );
    }

    #[test]
    fn unshared_target_is_fetched_per_call() {
        struct CountingSource {
            fetches: AtomicU32,
        }

        impl TargetSource for CountingSource {
            fn target(&self) -> Result<BeanValue, MethodError> {
                let n = self.fetches.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(Account { balance: n }))
            }
        }

        let source = Arc::new(CountingSource {
            fetches: AtomicU32::new(0),
        });
        let pipeline = InvocationPipeline::new(
            ProxyTarget::Unshared(Arc::clone(&source) as Arc<dyn TargetSource>),
            Arc::new(AdviceRegistry::new()),
            Arc::new(account_methods()),
        );

        let first = pipeline.invoke("balance", &[]).unwrap();
        let second = pipeline.invoke("balance", &[]).unwrap();
        assert_eq!(
            first.value().and_then(|v| v.downcast_ref::<u32>()).copied(),
            Some(0)
        );
        assert_eq!(
            second.value().and_then(|v| v.downcast_ref::<u32>()).copied(),
            Some(1)
        );
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn missing_method_names_the_method() {
        let pipeline = pipeline_with(AdviceRegistry::new());
        let err = pipeline.invoke("transfer", &[]).unwrap_err();
        assert!(err.to_string().contains("transfer"));
    }
}
