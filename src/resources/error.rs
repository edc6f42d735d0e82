use thiserror::Error;

use crate::resources::{BatchHandle, ResourceKind};

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("Invalid loader configuration: {reason}")]
    Configuration { reason: String },

    #[error("Cannot find batch with handle '{0}'")]
    NotFound(BatchHandle),

    #[error("No handler is registered for resource kind '{0}'")]
    UnknownKind(ResourceKind),

    #[error("Opening a {kind} resource failed: {errors}")]
    Open { kind: ResourceKind, errors: FetchError },
}

/// The errors of a failed load, in the order they were reported.
///
/// Fetch errors are never returned from [`ResourceLoader::request`](crate::resources::ResourceLoader::request),
/// they are delivered to the error callback of every batch that owns the failing request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}", .errors.join("; "))]
pub struct FetchError {
    errors: Vec<String>,
}

impl FetchError {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            errors: vec![error.into()],
        }
    }

    pub fn from_errors(errors: Vec<String>) -> Self {
        Self { errors }
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn push(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }
}

impl From<std::io::Error> for FetchError {
    fn from(value: std::io::Error) -> Self {
        FetchError::new(value.to_string())
    }
}
