use thiserror::Error;

use crate::resources::LoaderError;

pub mod components;
pub mod entity_handler;
pub mod scene_graph;
pub mod systems;

#[derive(Error, Debug)]
pub enum EntityError {
    /// Not fatal, the component is skipped.
    #[error("{0} Component does not exist")]
    UnknownComponentKind(String),

    #[error("Invalid data for the {component} component: {reason}")]
    InvalidComponentData { component: String, reason: String },

    #[error(transparent)]
    Document(#[from] scene_files::DocumentError),

    #[error(transparent)]
    NoSuchEntity(#[from] hecs::NoSuchEntity),

    #[error(transparent)]
    Loader(#[from] LoaderError),
}
