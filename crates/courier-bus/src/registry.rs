//! # Service Registry
//!
//! Hard-unique listening-service names per connection context. The
//! registry is owned by whoever owns the [`Connection`]; two independent
//! contexts in one process get two independent registries.
//!
//! [`Connection`]: courier_transport::Connection

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::warn;

use crate::error::ServiceError;

/// Registered services by name. Entries are type-erased so services over
/// different event sets share one namespace.
#[derive(Clone, Default)]
pub struct ServiceRegistry {
    inner: Arc<Mutex<HashMap<String, Arc<dyn Any + Send + Sync>>>>,
}

impl ServiceRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a service with this name is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.inner
            .lock()
            .is_ok_and(|services| services.contains_key(name))
    }

    /// Number of registered services.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().map_or(0, |services| services.len())
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fetch the type-erased service registered under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Any + Send + Sync>> {
        self.inner
            .lock()
            .ok()
            .and_then(|services| services.get(name).cloned())
    }

    /// Register a new service. Uniqueness is hard: an occupied name is an
    /// error, never a merge.
    pub(crate) fn insert_new(
        &self,
        name: &str,
        service: Arc<dyn Any + Send + Sync>,
    ) -> Result<(), ServiceError> {
        let Ok(mut services) = self.inner.lock() else {
            warn!("service registry lock poisoned");
            return Err(ServiceError::DuplicateName {
                name: name.to_string(),
            });
        };
        if services.contains_key(name) {
            return Err(ServiceError::DuplicateName {
                name: name.to_string(),
            });
        }
        services.insert(name.to_string(), service);
        Ok(())
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("len", &self.len())
            .finish()
    }
}
