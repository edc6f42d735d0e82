use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Column-major 4x4 identity, the transform of every entity that does not declare one.
pub const IDENTITY_TRANSFORM: [f32; 16] = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];

fn identity_transform() -> [f32; 16] {
    IDENTITY_TRANSFORM
}

/// The serialized form of a single scene graph node.
///
/// Children and the parent are only referenced by their resource id, they are separate documents
/// that need to be resolved on their own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDocument {
    pub resource_id: String,
    #[serde(default)]
    pub name: String,
    /// Local transform, column-major.
    #[serde(default = "identity_transform")]
    pub transform: [f32; 16],
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub children: Vec<String>,
    /// Component name -> opaque component data, interpreted by the component system of that name.
    #[serde(default)]
    pub components: Map<String, Value>,
    #[serde(rename = "_rev", default)]
    pub rev: Option<String>,
    #[serde(default)]
    pub version: Option<u64>,
    #[serde(default)]
    pub template: Option<String>,
}

impl EntityDocument {
    pub fn new(resource_id: impl Into<String>) -> Self {
        Self {
            resource_id: resource_id.into(),
            name: String::new(),
            transform: IDENTITY_TRANSFORM,
            labels: vec![],
            parent: None,
            children: vec![],
            components: Map::new(),
            rev: None,
            version: None,
            template: None,
        }
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }
}
