//! Error types for bean resolution and lifecycle management

use thiserror::Error;

/// Errors that can occur while resolving, creating, or destroying beans.
///
/// Every variant names the offending bean (or type) so failures can be
/// traced back to a definition without extra context.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BeanError {
    /// No definition exists for the requested name anywhere in the
    /// delegation chain
    #[error("no such bean named '{name}'")]
    NoSuchBean { name: String },

    /// A type query matched more than one definition
    #[error("more than one bean of type {type_name}: {candidates:?}")]
    AmbiguousBean {
        type_name: &'static str,
        candidates: Vec<String>,
    },

    /// The dependency chain revisits an ancestor
    #[error("circular dependency detected: {chain}")]
    CircularDependency { chain: String },

    /// Re-entrant resolution of a name that is mid-construction or
    /// mid-destruction
    #[error("bean '{name}' is currently being created or destroyed")]
    CreationInProgress { name: String },

    /// Scope value outside {singleton, prototype}.
    ///
    /// Never produced by the resolver itself (the `Scope` enum is closed);
    /// reserved for definition sources that translate scope names from
    /// external configuration.
    #[error("unsupported scope for bean '{name}'")]
    UnsupportedScope { name: String },

    /// The instantiation collaborator failed
    #[error("failed to create bean '{name}': {reason}")]
    CreationFailed { name: String, reason: String },

    /// Initializer hook lookup or invocation failed
    #[error("failed to initialize bean '{name}': {reason}")]
    Initialization { name: String, reason: String },

    /// Destroy hook lookup or invocation failed
    #[error("failed to destroy bean '{name}': {reason}")]
    Destruction { name: String, reason: String },

    /// A definition is already registered under this name
    #[error("bean '{name}' is already registered")]
    AlreadyRegistered { name: String },

    /// The resolved bean does not have the requested type
    #[error("bean '{name}' is not of type {type_name}")]
    TypeMismatch {
        name: String,
        type_name: &'static str,
    },

    /// Generic container error for wrapped collaborator failures
    #[error("container error: {0}")]
    Other(String),
}

impl BeanError {
    /// Create a NoSuchBean error
    #[inline]
    pub fn no_such_bean(name: impl Into<String>) -> Self {
        Self::NoSuchBean { name: name.into() }
    }

    /// Create an AmbiguousBean error for a type
    #[inline]
    pub fn ambiguous<T: 'static>(candidates: Vec<String>) -> Self {
        Self::AmbiguousBean {
            type_name: std::any::type_name::<T>(),
            candidates,
        }
    }

    /// Create a CircularDependency error from the active resolution chain
    #[inline]
    pub fn circular(chain: &[&str], name: &str) -> Self {
        let mut rendered = chain.join(" -> ");
        if !rendered.is_empty() {
            rendered.push_str(" -> ");
        }
        rendered.push_str(name);
        Self::CircularDependency { chain: rendered }
    }

    /// Create a CreationInProgress error
    #[inline]
    pub fn in_progress(name: impl Into<String>) -> Self {
        Self::CreationInProgress { name: name.into() }
    }

    /// Create a CreationFailed error
    #[inline]
    pub fn creation_failed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CreationFailed {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create an Initialization error
    #[inline]
    pub fn initialization(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Initialization {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a Destruction error
    #[inline]
    pub fn destruction(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Destruction {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a TypeMismatch error
    #[inline]
    pub fn type_mismatch<T: 'static>(name: impl Into<String>) -> Self {
        Self::TypeMismatch {
            name: name.into(),
            type_name: std::any::type_name::<T>(),
        }
    }
}

/// Result type alias for container operations
pub type Result<T> = std::result::Result<T, BeanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_bean() {
        let err = BeanError::no_such_bean("orders");
        assert_eq!(err.to_string(), "no such bean named 'orders'");

        let err = BeanError::creation_failed("orders", "boom");
        assert!(err.to_string().contains("orders"));
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn circular_renders_full_chain() {
        let err = BeanError::circular(&["a", "b"], "a");
        assert_eq!(
            err.to_string(),
            "circular dependency detected: a -> b -> a"
        );
    }

    #[test]
    fn circular_with_empty_chain() {
        let err = BeanError::circular(&[], "a");
        assert_eq!(err.to_string(), "circular dependency detected: a");
    }
}
