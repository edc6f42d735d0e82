use dashmap::DashMap;
use log::trace;

use crate::io::common::source::DataSource;
use crate::resources::{FetchError, LoadResponder};

/// A [`DataSource`] backed by a map, answering synchronously.
#[derive(Default)]
pub struct MemorySource {
    entries: DashMap<String, Vec<u8>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, identifier: impl Into<String>, data: impl Into<Vec<u8>>) {
        self.entries.insert(identifier.into(), data.into());
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

impl DataSource for MemorySource {
    fn fetch(&self, identifier: &str, responder: LoadResponder) {
        // Clone and release the shard lock before answering.
        let data = self.entries.get(identifier).map(|entry| entry.value().clone());
        match data {
            Some(data) => {
                trace!("Serving {} ({} bytes) from memory", identifier, data.len());
                responder.success(data);
            }
            None => responder.error(FetchError::new(format!("{} not found", identifier))),
        }
    }
}
