use std::collections::HashMap;
use std::sync::Arc;

use hecs::{Entity, World};
use log::{debug, warn};
use serde_json::Value;

use crate::entity::EntityError;
use crate::resources::BatchHandle;

/// Creates the component named by an entity document's `components` block.
pub trait ComponentSystem: Send + Sync {
    /// The key of the component block in entity documents, e.g. `"model"`.
    fn name(&self) -> &str;

    /// Adds the component to `entity`. Resources the component depends on should be requested
    /// with `batch` as their parent, so the entity is only resolved once they are loaded.
    fn create_component(
        &self,
        world: &mut World,
        entity: Entity,
        data: &Value,
        batch: Option<BatchHandle>,
    ) -> Result<(), EntityError>;
}

#[derive(Default)]
pub struct ComponentSystemRegistry {
    systems: HashMap<String, Arc<dyn ComponentSystem>>,
}

impl ComponentSystemRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, system: Arc<dyn ComponentSystem>) {
        let name = system.name().to_string();
        if self.systems.insert(name.clone(), system).is_some() {
            warn!("Replaced the component system for {}", name);
        } else {
            debug!("Registered component system {}", name);
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn ComponentSystem>> {
        self.systems.get(name)
    }

    pub fn len(&self) -> usize {
        self.systems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }

    /// Creates a single component. Unknown component names are reported as
    /// [`EntityError::UnknownComponentKind`].
    pub fn create_component(
        &self,
        world: &mut World,
        entity: Entity,
        name: &str,
        data: &Value,
        batch: Option<BatchHandle>,
    ) -> Result<(), EntityError> {
        let system = self
            .get(name)
            .ok_or_else(|| EntityError::UnknownComponentKind(name.to_string()))?;
        system.create_component(world, entity, data, batch)
    }
}
