//! Typed service lookup shared by pipelines, handlers and transport clients.
//!
//! ## Example
//!
//! ```ignore
//! let services = Services::new()
//!     .with(CounterStore::new())
//!     .with(reqwest::Client::new());
//!
//! let store = services.require::<CounterStore>()?;
//! ```

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::MessagingError;

/// A cheap-to-clone map from type to shared instance.
#[derive(Clone, Default)]
pub struct Services {
    entries: Arc<HashMap<TypeId, (&'static str, Arc<dyn Any + Send + Sync>)>>,
}

impl Services {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service instance, replacing any previous instance of `T`.
    pub fn with<T: Any + Send + Sync>(self, service: T) -> Self {
        self.with_shared(Arc::new(service))
    }

    /// Register an already shared service instance.
    pub fn with_shared<T: Any + Send + Sync>(mut self, service: Arc<T>) -> Self {
        let service: Arc<dyn Any + Send + Sync> = service;
        Arc::make_mut(&mut self.entries).insert(TypeId::of::<T>(), (type_name::<T>(), service));
        self
    }

    /// Look up a service.
    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.entries
            .get(&TypeId::of::<T>())
            .and_then(|(_, service)| service.clone().downcast::<T>().ok())
    }

    /// Look up a service, failing with [`MessagingError::ServiceNotFound`] if missing.
    pub fn require<T: Any + Send + Sync>(&self) -> Result<Arc<T>, MessagingError> {
        self.get::<T>()
            .ok_or_else(|| MessagingError::ServiceNotFound(type_name::<T>().to_string()))
    }

    pub fn contains<T: Any + Send + Sync>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<T>())
    }
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.values().map(|(name, _)| name))
            .finish()
    }
}
