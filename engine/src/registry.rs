//! Ordered registry of entity types.

use crate::entity::EntitySync;
use crate::error::RegistryError;
use std::fmt;
use std::sync::Arc;

/// Every entity type a pass covers, in the order they are reported.
///
/// The order is for readability only: entity types are independent and may
/// be synced concurrently.
#[derive(Clone, Default)]
pub struct Registry {
    entries: Vec<Arc<dyn EntitySync>>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity type. Names must be non-empty and unique.
    pub fn register(&mut self, entity: impl EntitySync + 'static) -> Result<(), RegistryError> {
        self.register_shared(Arc::new(entity))
    }

    pub fn register_shared(&mut self, entity: Arc<dyn EntitySync>) -> Result<(), RegistryError> {
        let name = entity.name();
        if name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if self.get(name).is_some() {
            return Err(RegistryError::DuplicateEntityType(name.to_string()));
        }
        self.entries.push(entity);
        Ok(())
    }

    /// Builder-style [`Registry::register`].
    pub fn with(mut self, entity: impl EntitySync + 'static) -> Result<Self, RegistryError> {
        self.register(entity)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn EntitySync>> {
        self.entries.iter().find(|e| e.name() == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn EntitySync>> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
