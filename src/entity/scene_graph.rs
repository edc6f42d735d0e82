use std::sync::RwLock;

use glam::Vec3;
use hecs::{Entity, World};
use itertools::Itertools;

use crate::entity::components::scene::{Children, Guid, Labels, LocalTransform, Name, Parent, PendingHierarchy};

/// The world that loaded scene nodes are spawned into.
#[derive(Default)]
pub struct SceneGraph {
    world: RwLock<World>,
}

impl SceneGraph {
    pub fn new() -> Self {
        SceneGraph::default()
    }

    pub fn world(&self) -> &RwLock<World> {
        &self.world
    }

    pub fn find_by_guid(&self, guid: &str) -> Option<Entity> {
        let world = self.world.read().expect("World Lock poisoned");
        world
            .query::<&Guid>()
            .iter()
            .find(|(_, entity_guid)| entity_guid.0 == guid)
            .map(|(entity, _)| entity)
    }

    pub fn children_of(&self, entity: Entity) -> Vec<Entity> {
        let world = self.world.read().expect("World Lock poisoned");
        world
            .get::<&Children>(entity)
            .map(|children| children.0.clone())
            .unwrap_or_default()
    }

    pub fn parent_of(&self, entity: Entity) -> Option<Entity> {
        let world = self.world.read().expect("World Lock poisoned");
        world.get::<&Parent>(entity).ok().map(|parent| parent.0)
    }

    /// Child ids of a node whose children have not been resolved yet.
    pub fn pending_children_of(&self, entity: Entity) -> Option<Vec<String>> {
        let world = self.world.read().expect("World Lock poisoned");
        world
            .get::<&PendingHierarchy>(entity)
            .ok()
            .map(|pending| pending.children.clone())
    }

    pub fn name_of(&self, entity: Entity) -> Option<String> {
        let world = self.world.read().expect("World Lock poisoned");
        world.get::<&Name>(entity).ok().map(|name| name.0.clone())
    }

    pub fn guid_of(&self, entity: Entity) -> Option<String> {
        let world = self.world.read().expect("World Lock poisoned");
        world.get::<&Guid>(entity).ok().map(|guid| guid.0.clone())
    }

    /// One line per node, children indented below their parent.
    pub fn describe(&self, root: Entity) -> Vec<String> {
        let world = self.world.read().expect("World Lock poisoned");
        let mut lines = vec![];
        Self::describe_node(&world, root, 0, &mut lines);
        lines
    }

    fn describe_node(world: &World, entity: Entity, depth: usize, lines: &mut Vec<String>) {
        let name = world
            .get::<&Name>(entity)
            .map(|name| name.0.clone())
            .unwrap_or_default();
        let guid = world
            .get::<&Guid>(entity)
            .map(|guid| guid.0.clone())
            .unwrap_or_default();
        let translation = world
            .get::<&LocalTransform>(entity)
            .map(|transform| transform.0.w_axis.truncate())
            .unwrap_or(Vec3::ZERO);
        let labels = world
            .get::<&Labels>(entity)
            .map(|labels| labels.0.iter().join(", "))
            .unwrap_or_default();

        lines.push(format!(
            "{}{} ({}) @ {} [{}]",
            "  ".repeat(depth),
            name,
            guid,
            translation,
            labels
        ));

        let children = world
            .get::<&Children>(entity)
            .map(|children| children.0.clone())
            .unwrap_or_default();
        for child in children {
            Self::describe_node(world, child, depth + 1, lines);
        }
    }
}
