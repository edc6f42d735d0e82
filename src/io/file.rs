use std::path::{Component, Path, PathBuf};

use log::{trace, warn};
use tokio::runtime::Handle;

use crate::io::common::source::DataSource;
use crate::resources::{FetchError, LoadResponder};

/// A [`DataSource`] that reads `<root>/<identifier>[.<extension>]` on a tokio runtime.
pub struct FileSource {
    root: PathBuf,
    extension: Option<String>,
    runtime: Handle,
}

impl FileSource {
    pub fn new(root: impl Into<PathBuf>, runtime: Handle) -> Self {
        Self {
            root: root.into(),
            extension: None,
            runtime,
        }
    }

    /// Appends `.extension` to every identifier, e.g. to map GUIDs to `<guid>.json`.
    pub fn with_extension(mut self, extension: &str) -> Self {
        self.extension = Some(extension.to_string());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves the identifier below the root. Identifiers that would escape it are rejected.
    pub fn path_for(&self, identifier: &str) -> Option<PathBuf> {
        let relative = Path::new(identifier);
        if identifier.is_empty()
            || !relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)))
        {
            return None;
        }

        let path = self.root.join(relative);
        Some(match &self.extension {
            Some(extension) => {
                let mut file_name = path.as_os_str().to_os_string();
                file_name.push(".");
                file_name.push(extension);
                PathBuf::from(file_name)
            }
            None => path,
        })
    }
}

impl DataSource for FileSource {
    fn fetch(&self, identifier: &str, responder: LoadResponder) {
        let Some(path) = self.path_for(identifier) else {
            warn!("Refusing to load {} outside of {}", identifier, self.root.display());
            responder.error(FetchError::new(format!("Invalid identifier {}", identifier)));
            return;
        };

        self.runtime.spawn(async move {
            match tokio::fs::read(&path).await {
                Ok(buf) => {
                    trace!("Read {} ({} bytes)", path.display(), buf.len());
                    responder.success(buf);
                }
                Err(err) => responder.error(FetchError::new(format!("{}: {}", path.display(), err))),
            }
        });
    }
}
