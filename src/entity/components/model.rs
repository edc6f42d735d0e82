use crate::resources::blob_handler::Blob;
use std::sync::Arc;

/// A reference to model data, filled once the referenced asset is loaded.
#[derive(Debug, Clone)]
pub struct Model {
    pub asset: String,
    pub cast_shadows: bool,
    pub data: Option<Arc<Blob>>,
}
