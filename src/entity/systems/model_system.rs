use std::sync::{Arc, Weak};

use hecs::{Entity, World};
use log::{trace, warn};
use serde::Deserialize;
use serde_json::Value;

use crate::entity::EntityError;
use crate::entity::components::model::Model;
use crate::entity::scene_graph::SceneGraph;
use crate::entity::systems::component_system::ComponentSystem;
use crate::resources::blob_handler::{BLOB_KIND, Blob};
use crate::resources::{
    BatchCallbacks, BatchHandle, DEFAULT_PRIORITY, RequestOptions, ResourceLoader, ResourceRequest,
};

pub const MODEL_COMPONENT: &str = "model";

#[derive(Deserialize)]
struct ModelData {
    asset: String,
    #[serde(default = "default_cast_shadows")]
    cast_shadows: bool,
}

fn default_cast_shadows() -> bool {
    true
}

/// Adds [`Model`] components and loads the referenced asset as a [`Blob`].
pub struct ModelComponentSystem {
    scene: Arc<SceneGraph>,
    loader: Weak<ResourceLoader>,
}

impl ModelComponentSystem {
    pub fn new(scene: Arc<SceneGraph>, loader: Weak<ResourceLoader>) -> Self {
        Self { scene, loader }
    }
}

impl ComponentSystem for ModelComponentSystem {
    fn name(&self) -> &str {
        MODEL_COMPONENT
    }

    fn create_component(
        &self,
        world: &mut World,
        entity: Entity,
        data: &Value,
        batch: Option<BatchHandle>,
    ) -> Result<(), EntityError> {
        let data = ModelData::deserialize(data).map_err(|err| EntityError::InvalidComponentData {
            component: MODEL_COMPONENT.to_string(),
            reason: err.to_string(),
        })?;

        world.insert_one(
            entity,
            Model {
                asset: data.asset.clone(),
                cast_shadows: data.cast_shadows,
                data: None,
            },
        )?;

        let Some(loader) = self.loader.upgrade() else {
            warn!("Loader is gone, not loading model {}", data.asset);
            return Ok(());
        };

        // The world is locked by our caller, so the asset is only patched in from the callback.
        let scene = self.scene.clone();
        let asset = data.asset.clone();
        let failed_asset = data.asset.clone();
        loader.request(
            ResourceRequest::new(BLOB_KIND, &data.asset),
            DEFAULT_PRIORITY,
            BatchCallbacks::new()
                .on_success(move |resources| {
                    let Some(blob) = resources.get(&asset).and_then(|resource| resource.downcast::<Blob>()) else {
                        warn!("Model asset {} is not a blob", asset);
                        return;
                    };

                    let world = scene.world().read().expect("World Lock poisoned");
                    if let Ok(mut model) = world.get::<&mut Model>(entity) {
                        trace!("Model {} loaded ({} bytes)", asset, blob.0.len());
                        model.data = Some(blob);
                    }
                })
                .on_error(move |errors| warn!("Failed to load model {}: {}", failed_asset, errors)),
            RequestOptions::with_parent(batch),
        )?;
        Ok(())
    }
}
