use glam::Mat4;
use hecs::Entity;

/// The resource id the node was loaded from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Guid(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Name(pub String);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalTransform(pub Mat4);

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Labels(pub Vec<String>);

impl Labels {
    pub fn has(&self, label: &str) -> bool {
        self.0.iter().any(|l| l == label)
    }
}

/// Bookkeeping of the document the node was created from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Revision {
    pub rev: Option<String>,
    pub version: Option<u64>,
    pub template: Option<String>,
}

/// Raw hierarchy references of a freshly opened node. Removed once the children are patched.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PendingHierarchy {
    pub parent: Option<String>,
    pub children: Vec<String>,
}

/// Resolved children, in the order the document declares them.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Children(pub Vec<Entity>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Parent(pub Entity);
