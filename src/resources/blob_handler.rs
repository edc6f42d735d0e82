use std::sync::Arc;

use crate::io::common::source::DataSource;
use crate::resources::{FetchError, HandlerOptions, LoadResponder, Resource, ResourceHandler};

pub const BLOB_KIND: &str = "blob";

/// Serves the raw bytes of a [`DataSource`] as [`Blob`] resources, e.g. model or script files
/// referenced by components.
pub struct BlobResourceHandler {
    source: Arc<dyn DataSource>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob(pub Vec<u8>);

impl BlobResourceHandler {
    pub fn new(source: Arc<dyn DataSource>) -> Self {
        Self { source }
    }
}

impl ResourceHandler for BlobResourceHandler {
    fn load(&self, identifier: &str, responder: LoadResponder, _options: &HandlerOptions) {
        self.source.fetch(identifier, responder);
    }

    fn open(&self, data: Vec<u8>, _options: &HandlerOptions) -> Result<Resource, FetchError> {
        Ok(Resource::new(Blob(data)))
    }
}
