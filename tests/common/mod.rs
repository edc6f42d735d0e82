#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use sceneloader::resources::{
    BatchCallbacks, FetchError, HandlerOptions, LoadResponder, LoaderConfig, Resource, ResourceHandler, ResourceKind,
    ResourceLoader, ResourceMap,
};

pub const TEST_KIND: &str = "test";

/// Holds every responder until the test answers it, recording the order of the loads.
#[derive(Default)]
pub struct ManualHandler {
    loads: Mutex<Vec<(String, HandlerOptions)>>,
    held: Mutex<HashMap<String, LoadResponder>>,
}

impl ManualHandler {
    pub fn loads(&self) -> Vec<String> {
        self.loads
            .lock()
            .unwrap()
            .iter()
            .map(|(identifier, _)| identifier.clone())
            .collect()
    }

    pub fn options_of(&self, identifier: &str) -> Option<HandlerOptions> {
        self.loads
            .lock()
            .unwrap()
            .iter()
            .find(|(id, _)| id == identifier)
            .map(|(_, options)| *options)
    }

    pub fn held(&self) -> usize {
        self.held.lock().unwrap().len()
    }

    /// Answers with the identifier as data, so the resource is the identifier string.
    pub fn succeed(&self, identifier: &str) {
        let responder = self.take(identifier);
        responder.success(identifier.as_bytes().to_vec());
    }

    pub fn fail(&self, identifier: &str, error: &str) {
        let responder = self.take(identifier);
        responder.error(FetchError::new(error));
    }

    pub fn progress(&self, identifier: &str, percent: f32) {
        let held = self.held.lock().unwrap();
        held.get(identifier)
            .unwrap_or_else(|| panic!("{} is not loading", identifier))
            .progress(percent);
    }

    fn take(&self, identifier: &str) -> LoadResponder {
        self.held
            .lock()
            .unwrap()
            .remove(identifier)
            .unwrap_or_else(|| panic!("{} is not loading", identifier))
    }
}

impl ResourceHandler for ManualHandler {
    fn load(&self, identifier: &str, responder: LoadResponder, options: &HandlerOptions) {
        self.loads
            .lock()
            .unwrap()
            .push((identifier.to_string(), *options));
        self.held
            .lock()
            .unwrap()
            .insert(identifier.to_string(), responder);
    }

    fn open(&self, data: Vec<u8>, _options: &HandlerOptions) -> Result<Resource, FetchError> {
        String::from_utf8(data)
            .map(Resource::new)
            .map_err(|err| FetchError::new(err.to_string()))
    }
}

/// Collects everything the callbacks of a batch report.
#[derive(Default, Clone)]
pub struct Recorder {
    successes: Arc<Mutex<Vec<ResourceMap>>>,
    errors: Arc<Mutex<Vec<FetchError>>>,
    progress: Arc<Mutex<Vec<f32>>>,
}

impl Recorder {
    pub fn callbacks(&self) -> BatchCallbacks {
        let successes = self.successes.clone();
        let errors = self.errors.clone();
        let progress = self.progress.clone();
        BatchCallbacks::new()
            .on_success(move |resources| successes.lock().unwrap().push(resources))
            .on_error(move |err| errors.lock().unwrap().push(err.clone()))
            .on_progress(move |percent| progress.lock().unwrap().push(percent))
    }

    pub fn success_count(&self) -> usize {
        self.successes.lock().unwrap().len()
    }

    pub fn resources(&self) -> Option<ResourceMap> {
        self.successes.lock().unwrap().first().cloned()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors
            .lock()
            .unwrap()
            .iter()
            .map(|err| err.to_string())
            .collect()
    }

    pub fn progress(&self) -> Vec<f32> {
        self.progress.lock().unwrap().clone()
    }
}

pub fn manual_loader(max_concurrent_requests: usize) -> (Arc<ResourceLoader>, Arc<ManualHandler>) {
    let loader = ResourceLoader::new(LoaderConfig {
        max_concurrent_requests,
        ..LoaderConfig::default()
    });
    let handler = Arc::new(ManualHandler::default());
    loader
        .register_handler(ResourceKind::new(TEST_KIND), handler.clone())
        .unwrap();
    (loader, handler)
}
