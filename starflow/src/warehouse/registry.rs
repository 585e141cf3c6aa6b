//! Named warehouse connections.

use super::Warehouse;
use crate::errors::StarflowError;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;

/// Resolves connection ids (e.g. `"redshift"`) to live warehouse handles.
#[derive(Default, Clone)]
pub struct ConnectionRegistry {
    connections: Arc<DashMap<String, Arc<dyn Warehouse>>>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection under the given id, replacing any previous one.
    pub fn register(&self, id: impl Into<String>, warehouse: Arc<dyn Warehouse>) {
        let id = id.into();
        tracing::debug!(connection_id = %id, "Registered warehouse connection");
        self.connections.insert(id, warehouse);
    }

    /// Builder-style registration.
    #[must_use]
    pub fn with_connection(self, id: impl Into<String>, warehouse: Arc<dyn Warehouse>) -> Self {
        self.register(id, warehouse);
        self
    }

    /// Looks up a connection.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when no connection is registered under `id`.
    pub fn get(&self, id: &str) -> Result<Arc<dyn Warehouse>, StarflowError> {
        self.connections
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| StarflowError::config(format!("Unknown warehouse connection id '{id}'")))
    }

    /// Returns true if a connection is registered under `id`.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.connections.contains_key(id)
    }

    /// Returns the registered connection ids, sorted.
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.connections.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }
}

impl fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("connections", &self.ids())
            .finish()
    }
}
