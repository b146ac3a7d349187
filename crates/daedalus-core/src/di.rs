//! Service resolution.
//!
//! Parameters and properties bound from services, and filter factories that
//! need collaborators, resolve them through the request's [`ServiceProvider`].
//! Services are keyed by type name so that metadata, which only knows a type
//! by name, can request them.
//!
//! # Example
//!
//! ```rust
//! use daedalus_core::di::{Container, ServiceProvider};
//! use std::sync::Arc;
//!
//! struct Clock {
//!     offset: i64,
//! }
//!
//! let mut container = Container::new();
//! container.register(Arc::new(Clock { offset: 2 }));
//!
//! let clock: Arc<Clock> = container.resolve().unwrap();
//! assert_eq!(clock.offset, 2);
//! assert!(container.get_service(std::any::type_name::<Clock>()).is_some());
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Key under which a service of type `T` is registered.
#[must_use]
pub fn service_type_name<T: ?Sized + 'static>() -> &'static str {
    std::any::type_name::<T>()
}

/// Resolves services by type name.
pub trait ServiceProvider: Send + Sync + fmt::Debug {
    /// Returns the service registered under `type_name`.
    fn get_service(&self, type_name: &str) -> Option<Arc<dyn Any + Send + Sync>>;
}

/// Error when a dependency cannot be resolved.
#[derive(Debug, Clone, Error)]
#[error("Failed to resolve {type_name}: {reason}")]
pub struct InjectionError {
    /// The type name that could not be resolved.
    pub type_name: String,
    /// The reason for the failure.
    pub reason: String,
}

impl InjectionError {
    /// Creates an error for a missing service.
    pub fn not_registered(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            reason: "service not registered".to_string(),
        }
    }
}

/// A service container.
///
/// Registered once at startup, then shared read-only across requests.
#[derive(Default)]
pub struct Container {
    services: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl Container {
    /// Creates a new empty container.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a service under the type name of `T`.
    pub fn register<T: Send + Sync + 'static>(&mut self, service: Arc<T>) {
        self.services
            .insert(service_type_name::<T>().to_string(), service);
    }

    /// Registers a service under an explicit name.
    pub fn register_named<T: Send + Sync + 'static>(&mut self, name: impl Into<String>, service: Arc<T>) {
        self.services.insert(name.into(), service);
    }

    /// Resolves a service registered under the type name of `T`.
    #[must_use]
    pub fn resolve<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.services
            .get(service_type_name::<T>())
            .and_then(|s| Arc::clone(s).downcast::<T>().ok())
    }

    /// Resolves a service or returns an error.
    pub fn resolve_required<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, InjectionError> {
        self.resolve()
            .ok_or_else(|| InjectionError::not_registered(service_type_name::<T>()))
    }

    /// Checks if a service is registered.
    #[must_use]
    pub fn contains<T: Send + Sync + 'static>(&self) -> bool {
        self.services.contains_key(service_type_name::<T>())
    }

    /// Returns the number of registered services.
    #[must_use]
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Returns `true` if no services are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl ServiceProvider for Container {
    fn get_service(&self, type_name: &str) -> Option<Arc<dyn Any + Send + Sync>> {
        self.services.get(type_name).cloned()
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("service_count", &self.services.len())
            .finish()
    }
}

/// Resolves a typed service from any provider.
pub fn resolve<T: Send + Sync + 'static>(provider: &dyn ServiceProvider) -> Option<Arc<T>> {
    provider
        .get_service(service_type_name::<T>())
        .and_then(|s| s.downcast::<T>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Repository {
        name: &'static str,
    }

    #[test]
    fn test_register_and_resolve() {
        let mut container = Container::new();
        container.register(Arc::new(Repository { name: "users" }));
        assert!(container.contains::<Repository>());
        assert_eq!(container.resolve::<Repository>().map(|r| r.name), Some("users"));
        assert_eq!(container.len(), 1);
    }

    #[test]
    fn test_resolve_required_error() {
        let container = Container::new();
        let err = container.resolve_required::<Repository>().unwrap_err();
        assert!(err.type_name.ends_with("Repository"));
        assert!(err.to_string().contains("not registered"));
    }

    #[test]
    fn test_provider_lookup_by_name() {
        let mut container = Container::new();
        container.register_named("repo", Arc::new(Repository { name: "orders" }));
        let provider: &dyn ServiceProvider = &container;
        assert!(provider.get_service("repo").is_some());
        assert!(resolve::<Repository>(provider).is_none());
    }
}
