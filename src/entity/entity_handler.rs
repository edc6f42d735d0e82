use std::sync::{Arc, Mutex, OnceLock, Weak};

use dashmap::DashMap;
use glam::Mat4;
use hecs::Entity;
use itertools::Itertools;
use log::{debug, trace, warn};
use scene_files::DocumentError;
use scene_files::entity::reader::EntityReader;
use scene_files::entity::types::EntityDocument;

use crate::entity::EntityError;
use crate::entity::components::scene::{Children, Guid, Labels, LocalTransform, Name, Parent, PendingHierarchy, Revision};
use crate::entity::scene_graph::SceneGraph;
use crate::entity::systems::component_system::ComponentSystemRegistry;
use crate::io::common::source::DataSource;
use crate::resources::{
    BatchCallbacks, BatchHandle, FetchError, HandlerOptions, LoadResponder, PostOpenResponder, RequestOptions, Resource,
    ResourceHandler, ResourceLoader, ResourceRequest,
};

pub const ENTITY_KIND: &str = "entity";

/// A request for the entity document `guid`, resolving to the spawned [`Entity`].
pub fn entity_request(guid: impl Into<String>) -> ResourceRequest {
    ResourceRequest::new(ENTITY_KIND, guid)
}

/// Entity documents that are available locally, checked before the data source.
#[derive(Default)]
pub struct EntityCache {
    entries: DashMap<String, Vec<u8>>,
}

impl EntityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, identifier: impl Into<String>, data: impl Into<Vec<u8>>) {
        self.entries.insert(identifier.into(), data.into());
    }

    /// Serializes the document and caches it under its resource id.
    pub fn insert_document(&self, document: &EntityDocument) -> Result<(), DocumentError> {
        let data = EntityReader::write_document(document)?;
        self.insert(document.resource_id.clone(), data);
        Ok(())
    }

    pub fn get(&self, identifier: &str) -> Option<Vec<u8>> {
        self.entries.get(identifier).map(|entry| entry.value().clone())
    }

    pub fn remove(&self, identifier: &str) -> Option<Vec<u8>> {
        self.entries.remove(identifier).map(|(_, data)| data)
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.entries.contains_key(identifier)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Resource ids of the entities whose children a batch loads, root first.
type Lineages = DashMap<BatchHandle, Vec<String>>;

/// Forgets the lineage of a children batch once the batch drops its callbacks.
struct LineageEntry {
    lineages: Arc<Lineages>,
    handle: OnceLock<BatchHandle>,
}

impl Drop for LineageEntry {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.get() {
            self.lineages.remove(handle);
        }
    }
}

/// Loads scene graph nodes. Every node is spawned into the [`SceneGraph`] when it's opened, its
/// children are requested as a child batch and linked once all of them are resolved.
pub struct EntityResourceHandler {
    scene: Arc<SceneGraph>,
    systems: Arc<ComponentSystemRegistry>,
    cache: Arc<EntityCache>,
    source: Option<Arc<dyn DataSource>>,
    loader: OnceLock<Weak<ResourceLoader>>,
    lineages: Arc<Lineages>,
}

impl EntityResourceHandler {
    pub fn new(
        scene: Arc<SceneGraph>,
        systems: Arc<ComponentSystemRegistry>,
        cache: Arc<EntityCache>,
        source: Option<Arc<dyn DataSource>>,
    ) -> Self {
        Self {
            scene,
            systems,
            cache,
            source,
            loader: OnceLock::new(),
            lineages: Arc::new(Lineages::new()),
        }
    }

    pub fn cache(&self) -> &Arc<EntityCache> {
        &self.cache
    }

    fn spawn(&self, document: EntityDocument, options: &HandlerOptions) -> Entity {
        let mut world = self.scene.world().write().expect("World Lock poisoned");
        let entity = world.spawn((
            Guid(document.resource_id.clone()),
            Name(document.name),
            LocalTransform(Mat4::from_cols_array(&document.transform)),
            Labels(document.labels),
            Revision {
                rev: document.rev,
                version: document.version,
                template: document.template,
            },
            PendingHierarchy {
                parent: document.parent,
                children: document.children,
            },
            Children::default(),
        ));

        for (name, data) in &document.components {
            match self
                .systems
                .create_component(&mut world, entity, name, data, options.batch)
            {
                Ok(()) => trace!("Created {} component for {}", name, document.resource_id),
                Err(err @ EntityError::UnknownComponentKind(_)) => {
                    warn!("Skipping component of {}: {}", document.resource_id, err)
                }
                Err(err) => warn!(
                    "Failed to create the {} component of {}: {}",
                    name, document.resource_id, err
                ),
            }
        }
        entity
    }
}

impl ResourceHandler for EntityResourceHandler {
    fn attach(&self, loader: Weak<ResourceLoader>) {
        if self.loader.set(loader).is_err() {
            warn!("EntityResourceHandler is already attached to a loader");
        }
    }

    fn load(&self, identifier: &str, responder: LoadResponder, _options: &HandlerOptions) {
        if let Some(data) = self.cache.get(identifier) {
            trace!("Serving entity {} from the cache", identifier);
            responder.success(data);
            return;
        }

        match &self.source {
            Some(source) => source.fetch(identifier, responder),
            None => responder.error(FetchError::new(format!(
                "Entity {} is not cached and there is no data source",
                identifier
            ))),
        }
    }

    fn open(&self, data: Vec<u8>, options: &HandlerOptions) -> Result<Resource, FetchError> {
        let document =
            EntityReader::parse_slice(&data).map_err(|err| FetchError::new(format!("Invalid entity document: {}", err)))?;

        debug!(
            "Opening entity {} ({} children)",
            document.resource_id,
            document.children.len()
        );
        Ok(Resource::new(self.spawn(document, options)))
    }

    fn post_open(&self, resource: Resource, responder: PostOpenResponder, options: &HandlerOptions) {
        let Some(entity) = resource.downcast_ref::<Entity>().copied() else {
            let errors = FetchError::new(format!("{} did not open into an entity", responder.identifier()));
            responder.error(errors);
            return;
        };

        let children = self.scene.pending_children_of(entity).unwrap_or_default();
        if children.is_empty() {
            let _ = self
                .scene
                .world()
                .write()
                .expect("World Lock poisoned")
                .remove_one::<PendingHierarchy>(entity);
            responder.success(resource);
            return;
        }

        let Some(loader) = self.loader.get().and_then(Weak::upgrade) else {
            responder.error(FetchError::new("The entity handler is not attached to a loader"));
            return;
        };

        let identifier = responder.identifier().to_string();
        let mut lineage = options
            .batch
            .and_then(|batch| self.lineages.get(&batch).map(|entry| entry.value().clone()))
            .unwrap_or_default();
        lineage.push(identifier.clone());

        // The ancestor is still opening, its children batch could never complete.
        if let Some(ancestor) = children.iter().find(|child| lineage.contains(*child)) {
            warn!("{} lists its ancestor {} as a child", identifier, ancestor);
            responder.error(FetchError::new(format!(
                "Cyclic hierarchy: {} lists its ancestor {} as a child",
                identifier, ancestor
            )));
            return;
        }

        // Whichever callback fires first answers, an unanswered responder fails the request once
        // the child batch is gone.
        let responder = Arc::new(Mutex::new(Some(responder)));
        let entry = Arc::new(LineageEntry {
            lineages: self.lineages.clone(),
            handle: OnceLock::new(),
        });
        let scene = self.scene.clone();
        let declared = children.clone();
        let callbacks = BatchCallbacks::new()
            .on_success({
                let responder = responder.clone();
                let entry = entry.clone();
                move |resources| {
                    let resolved = declared
                        .iter()
                        .filter_map(|guid| resources.get(guid).map(|child| (guid, child)))
                        .filter_map(|(guid, child)| child.downcast_ref::<Entity>().map(|child| (guid, *child)))
                        .collect_vec();

                    {
                        let mut world = scene.world().write().expect("World Lock poisoned");
                        let mut linked = Vec::with_capacity(resolved.len());
                        for (guid, child) in resolved {
                            if world.insert_one(child, Parent(entity)).is_ok() {
                                linked.push(child);
                            } else {
                                warn!("{} was despawned before it could be linked to {}", guid, identifier);
                            }
                        }

                        if world.insert_one(entity, Children(linked)).is_err() {
                            warn!("{} was despawned before its children were linked", identifier);
                        }
                        let _ = world.remove_one::<PendingHierarchy>(entity);
                    }

                    if let Some(responder) = responder.lock().expect("Responder Lock").take() {
                        responder.success(resource);
                    }
                    drop(entry);
                }
            })
            .on_error({
                let responder = responder.clone();
                let entry = entry.clone();
                move |errors| {
                    let _entry = &entry;
                    if let Some(responder) = responder.lock().expect("Responder Lock").take() {
                        responder.error(errors.clone());
                    }
                }
            });

        let requests = children.into_iter().map(entity_request).collect_vec();
        match loader.request(
            requests,
            options.priority,
            callbacks,
            RequestOptions::with_parent(options.batch),
        ) {
            Ok(handle) => {
                self.lineages.insert(handle, lineage);
                let _ = entry.handle.set(handle);
            }
            Err(err) => {
                if let Some(responder) = responder.lock().expect("Responder Lock").take() {
                    responder.error(FetchError::new(err.to_string()));
                }
            }
        }
    }
}
