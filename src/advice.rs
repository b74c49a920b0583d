//! Advisors: method-matching pointcuts paired with advice
//!
//! An [`Advisor`] binds a [`Pointcut`] (which methods) to an [`Advice`]
//! (what to do around them) at a caller-supplied priority. The
//! [`AdviceRegistry`] keeps advisors ordered by that priority, with
//! insertion order breaking ties, and hands the invocation pipeline the
//! per-kind selections it needs for one method call.
//!
//! Registration is a setup-time activity; once invocation traffic starts
//! the registry is read-only, so selection never takes a lock.

use crate::invocation::{InvocationContext, MethodError, MethodInvocation};
use crate::BeanValue;
use regex::Regex;
use std::sync::Arc;

// =============================================================================
// Pointcuts
// =============================================================================

/// Predicate over method names deciding where an advice applies.
///
/// Wildcard patterns are compiled to a regex once at construction, never
/// per call.
///
/// # Examples
///
/// ```rust
/// use trellis_ioc::Pointcut;
///
/// let getters = Pointcut::pattern("get_*");
/// assert!(getters.matches("get_user"));
/// assert!(!getters.matches("save_user"));
///
/// let writes = Pointcut::method("save").or(Pointcut::method("delete"));
/// assert!(writes.matches("delete"));
/// ```
#[derive(Clone)]
pub enum Pointcut {
    /// Matches every method
    All,
    /// Exact method name
    Method(String),
    /// Wildcard pattern; `*` matches any run of characters
    Pattern {
        source: String,
        regex: Option<Regex>,
    },
    /// Arbitrary predicate
    Custom(Arc<dyn Fn(&str) -> bool + Send + Sync>),
    /// Both sides must match
    And(Box<Pointcut>, Box<Pointcut>),
    /// Either side may match
    Or(Box<Pointcut>, Box<Pointcut>),
    /// Inverts the inner pointcut
    Not(Box<Pointcut>),
}

impl Pointcut {
    /// Exact-name pointcut
    pub fn method(name: impl Into<String>) -> Self {
        Pointcut::Method(name.into())
    }

    /// Wildcard pointcut; literal segments are matched verbatim, `*` spans
    /// any run of characters.
    pub fn pattern(pattern: impl Into<String>) -> Self {
        let source = pattern.into();
        let escaped = source
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        let regex = Regex::new(&format!("^{escaped}$")).ok();
        Pointcut::Pattern { source, regex }
    }

    /// Predicate pointcut
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        Pointcut::Custom(Arc::new(f))
    }

    /// Check whether this pointcut selects `method`.
    pub fn matches(&self, method: &str) -> bool {
        match self {
            Pointcut::All => true,
            Pointcut::Method(name) => name == method,
            Pointcut::Pattern { regex, .. } => {
                regex.as_ref().is_some_and(|r| r.is_match(method))
            }
            Pointcut::Custom(f) => f(method),
            Pointcut::And(left, right) => left.matches(method) && right.matches(method),
            Pointcut::Or(left, right) => left.matches(method) || right.matches(method),
            Pointcut::Not(inner) => !inner.matches(method),
        }
    }

    /// Combine with AND
    pub fn and(self, other: Pointcut) -> Self {
        Pointcut::And(Box::new(self), Box::new(other))
    }

    /// Combine with OR
    pub fn or(self, other: Pointcut) -> Self {
        Pointcut::Or(Box::new(self), Box::new(other))
    }

    /// Invert
    pub fn not(self) -> Self {
        Pointcut::Not(Box::new(self))
    }
}

impl std::fmt::Debug for Pointcut {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Pointcut::All => write!(f, "All"),
            Pointcut::Method(name) => write!(f, "Method({name})"),
            Pointcut::Pattern { source, .. } => write!(f, "Pattern({source})"),
            Pointcut::Custom(_) => write!(f, "Custom(..)"),
            Pointcut::And(l, r) => write!(f, "And({l:?}, {r:?})"),
            Pointcut::Or(l, r) => write!(f, "Or({l:?}, {r:?})"),
            Pointcut::Not(inner) => write!(f, "Not({inner:?})"),
        }
    }
}

// =============================================================================
// Advice kinds
// =============================================================================

/// Runs before the intercepted method. A failure here aborts the call; the
/// real method never runs.
pub trait BeforeAdvice: Send + Sync {
    fn before(&self, context: &InvocationContext) -> Result<(), MethodError>;
}

impl<F> BeforeAdvice for F
where
    F: Fn(&InvocationContext) -> Result<(), MethodError> + Send + Sync,
{
    fn before(&self, context: &InvocationContext) -> Result<(), MethodError> {
        self(context)
    }
}

/// Wraps the intercepted method. The advice decides whether and when the
/// call proceeds by driving [`MethodInvocation::proceed`]; it may
/// short-circuit entirely by returning without proceeding.
pub trait AroundAdvice: Send + Sync {
    fn around(&self, invocation: MethodInvocation) -> Result<Option<BeanValue>, MethodError>;
}

impl<F> AroundAdvice for F
where
    F: Fn(MethodInvocation) -> Result<Option<BeanValue>, MethodError> + Send + Sync,
{
    fn around(&self, invocation: MethodInvocation) -> Result<Option<BeanValue>, MethodError> {
        self(invocation)
    }
}

/// Observes a successful return. The result is read-only; after-returning
/// advice cannot substitute a different value.
pub trait AfterReturningAdvice: Send + Sync {
    fn after_returning(&self, context: &InvocationContext, result: Option<&BeanValue>);
}

impl<F> AfterReturningAdvice for F
where
    F: Fn(&InvocationContext, Option<&BeanValue>) + Send + Sync,
{
    fn after_returning(&self, context: &InvocationContext, result: Option<&BeanValue>) {
        self(context, result)
    }
}

/// Observes a failure. If any after-throwing advice matched the method, the
/// failure is absorbed and the call returns empty instead of propagating.
pub trait AfterThrowingAdvice: Send + Sync {
    fn after_throwing(&self, context: &InvocationContext, error: &MethodError);
}

impl<F> AfterThrowingAdvice for F
where
    F: Fn(&InvocationContext, &MethodError) + Send + Sync,
{
    fn after_throwing(&self, context: &InvocationContext, error: &MethodError) {
        self(context, error)
    }
}

/// One advice of any of the four kinds.
#[derive(Clone)]
pub enum Advice {
    Before(Arc<dyn BeforeAdvice>),
    Around(Arc<dyn AroundAdvice>),
    AfterReturning(Arc<dyn AfterReturningAdvice>),
    AfterThrowing(Arc<dyn AfterThrowingAdvice>),
}

impl Advice {
    /// Before-advice from a closure
    pub fn before<F>(f: F) -> Self
    where
        F: Fn(&InvocationContext) -> Result<(), MethodError> + Send + Sync + 'static,
    {
        Advice::Before(Arc::new(f))
    }

    /// Around-advice from a closure
    pub fn around<F>(f: F) -> Self
    where
        F: Fn(MethodInvocation) -> Result<Option<BeanValue>, MethodError>
            + Send
            + Sync
            + 'static,
    {
        Advice::Around(Arc::new(f))
    }

    /// After-returning-advice from a closure
    pub fn after_returning<F>(f: F) -> Self
    where
        F: Fn(&InvocationContext, Option<&BeanValue>) + Send + Sync + 'static,
    {
        Advice::AfterReturning(Arc::new(f))
    }

    /// After-throwing-advice from a closure
    pub fn after_throwing<F>(f: F) -> Self
    where
        F: Fn(&InvocationContext, &MethodError) + Send + Sync + 'static,
    {
        Advice::AfterThrowing(Arc::new(f))
    }

    fn kind(&self) -> &'static str {
        match self {
            Advice::Before(_) => "before",
            Advice::Around(_) => "around",
            Advice::AfterReturning(_) => "after-returning",
            Advice::AfterThrowing(_) => "after-throwing",
        }
    }
}

impl std::fmt::Debug for Advice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Advice::{}", self.kind())
    }
}

// =============================================================================
// Advisors and the registry
// =============================================================================

/// A pointcut, an advice, and a priority.
///
/// Lower `order` runs earlier; advisors sharing an `order` keep their
/// registration order.
#[derive(Clone, Debug)]
pub struct Advisor {
    pub order: i32,
    pub pointcut: Pointcut,
    pub advice: Advice,
}

impl Advisor {
    pub fn new(order: i32, pointcut: Pointcut, advice: Advice) -> Self {
        Self {
            order,
            pointcut,
            advice,
        }
    }
}

/// Priority-ordered advisor collection.
///
/// Register during setup, then share behind an `Arc` with the invocation
/// pipeline; selection walks an immutable sorted slice.
///
/// # Examples
///
/// ```rust
/// use trellis_ioc::{Advice, AdviceRegistry, Advisor, Pointcut};
///
/// let mut registry = AdviceRegistry::new();
/// registry.register(Advisor::new(
///     10,
///     Pointcut::pattern("save_*"),
///     Advice::before(|ctx| {
///         println!("about to run {}", ctx.method);
///         Ok(())
///     }),
/// ));
/// assert_eq!(registry.len(), 1);
/// ```
#[derive(Default, Debug)]
pub struct AdviceRegistry {
    /// Kept sorted by `order`; ties preserve insertion order
    advisors: Vec<Advisor>,
}

impl AdviceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            advisors: Vec::new(),
        }
    }

    /// Add an advisor at its priority slot.
    pub fn register(&mut self, advisor: Advisor) {
        let at = self
            .advisors
            .partition_point(|existing| existing.order <= advisor.order);
        self.advisors.insert(at, advisor);
    }

    /// Advisors whose pointcut selects `method`, in priority order
    pub fn matching<'a>(&'a self, method: &'a str) -> impl Iterator<Item = &'a Advisor> {
        self.advisors
            .iter()
            .filter(move |a| a.pointcut.matches(method))
    }

    /// Matching before-advices, in priority order
    pub fn befores_for(&self, method: &str) -> Vec<Arc<dyn BeforeAdvice>> {
        self.matching(method)
            .filter_map(|a| match &a.advice {
                Advice::Before(advice) => Some(Arc::clone(advice)),
                _ => None,
            })
            .collect()
    }

    /// The first matching around-advice, if any.
    ///
    /// Around-advices do not chain: one interceptor wraps the whole call and
    /// later matches are ignored.
    pub fn around_for(&self, method: &str) -> Option<Arc<dyn AroundAdvice>> {
        self.matching(method).find_map(|a| match &a.advice {
            Advice::Around(advice) => Some(Arc::clone(advice)),
            _ => None,
        })
    }

    /// Matching after-returning-advices, in priority order
    pub fn after_returnings_for(&self, method: &str) -> Vec<Arc<dyn AfterReturningAdvice>> {
        self.matching(method)
            .filter_map(|a| match &a.advice {
                Advice::AfterReturning(advice) => Some(Arc::clone(advice)),
                _ => None,
            })
            .collect()
    }

    /// Matching after-throwing-advices, in priority order
    pub fn after_throwings_for(&self, method: &str) -> Vec<Arc<dyn AfterThrowingAdvice>> {
        self.matching(method)
            .filter_map(|a| match &a.advice {
                Advice::AfterThrowing(advice) => Some(Arc::clone(advice)),
                _ => None,
            })
            .collect()
    }

    /// Number of registered advisors
    #[inline]
    pub fn len(&self) -> usize {
        self.advisors.len()
    }

    /// Check if no advisors are registered
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.advisors.is_empty()
    }
}
