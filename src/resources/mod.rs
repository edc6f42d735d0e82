//! Asynchronous resource loading.
//!
//! A [`loader::ResourceLoader`] owns every in-flight request. Callers hand it one or more
//! [`ResourceRequest`]s and receive a [`BatchHandle`] right away, the actual work happens through
//! the [`handler::ResourceHandler`] registered for the request's [`ResourceKind`]:
//!
//! 1. `load` fetches the raw bytes (possibly on another thread or a tokio task),
//! 2. `open` turns them into the runtime [`Resource`] synchronously,
//! 3. `post_open` may request further resources (e.g. the children of a scene node) before the
//!    resource counts as resolved.
//!
//! Requests for the same identifier are merged, so every resource is fetched at most once while
//! it is in flight, and every batch that asked for it receives the same [`Resource`] instance.
//! Batches can be nested: a batch created with a parent keeps the parent from completing until the
//! child has completed, which is how a scene graph is loaded recursively.
//!
//! Handlers never talk to batches directly. They answer through responders that post events to
//! the loader, which are folded into the batch state by [`loader::ResourceLoader::update`].

use std::any::Any;
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;

pub mod batch;
pub mod blob_handler;
pub mod error;
pub mod handler;
pub mod loader;

pub use batch::{BatchCallbacks, ResourceMap};
pub use error::{FetchError, LoaderError};
pub use handler::{HandlerOptions, LoadResponder, PostOpenResponder, ResourceHandler};
pub use loader::{LoaderConfig, RequestOptions, ResourceLoader};

/// Lower values are dispatched first.
pub const DEFAULT_PRIORITY: u32 = 1;

/// Identifies a [`RequestBatch`](batch::RequestBatch). Handles are increasing and never reused.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BatchHandle(pub(crate) u64);

impl BatchHandle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl Display for BatchHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The type tag that selects the handler of a request, e.g. `"entity"`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ResourceKind(String);

impl ResourceKind {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    /// Kinds need a name, anonymous kinds cannot be told apart in the handler registry.
    pub fn is_identifiable(&self) -> bool {
        !self.0.trim().is_empty()
    }
}

impl Display for ResourceKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceKind {
    fn from(value: &str) -> Self {
        ResourceKind::new(value)
    }
}

/// A request for a single resource, located by a unique identifier (usually an URL, a path or a
/// GUID). The identifier is the deduplication key across all batches.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceRequest {
    kind: ResourceKind,
    identifier: String,
}

impl ResourceRequest {
    pub fn new(kind: impl Into<ResourceKind>, identifier: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            identifier: identifier.into(),
        }
    }

    pub fn kind(&self) -> &ResourceKind {
        &self.kind
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }
}

impl From<ResourceRequest> for Vec<ResourceRequest> {
    fn from(value: ResourceRequest) -> Self {
        vec![value]
    }
}

/// A loaded runtime object, as produced by [`ResourceHandler::open`]. Cloning is cheap and all
/// clones refer to the same object.
#[derive(Clone)]
pub struct Resource(Arc<dyn Any + Send + Sync>);

impl Resource {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.0.clone().downcast::<T>().ok()
    }

    pub fn is<T: Any>(&self) -> bool {
        self.0.is::<T>()
    }

    pub fn ptr_eq(&self, other: &Resource) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Debug for Resource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resource").finish_non_exhaustive()
    }
}
