use std::sync::Weak;
use std::sync::mpsc::Sender;

use log::{trace, warn};

use crate::resources::loader::{LoaderEvent, ResourceLoader};
use crate::resources::{BatchHandle, FetchError, Resource};

/// Passed to every handler step of a request.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct HandlerOptions {
    /// The effective priority of the request, to be used for any sub-requests.
    pub priority: u32,
    /// The first batch that is still waiting for the request. Sub-requests that use it as their
    /// parent keep that batch from completing before they do.
    pub batch: Option<BatchHandle>,
}

/// The per-kind strategy to fetch raw data and turn it into a runtime [`Resource`].
pub trait ResourceHandler: Send + Sync {
    /// Called once when the handler is registered.
    fn attach(&self, _loader: Weak<ResourceLoader>) {}

    /// Fetch the raw data for `identifier` and answer the responder exactly once. This may happen
    /// before returning, or later from any thread.
    fn load(&self, identifier: &str, responder: LoadResponder, options: &HandlerOptions);

    /// Convert the fetched data into the runtime resource. Must not block on I/O.
    fn open(&self, data: Vec<u8>, options: &HandlerOptions) -> Result<Resource, FetchError>;

    /// Optional second phase for resources that depend on other resources. The request only
    /// resolves once the responder has been answered.
    fn post_open(&self, resource: Resource, responder: PostOpenResponder, _options: &HandlerOptions) {
        responder.success(resource);
    }
}

#[derive(Copy, Clone, Debug)]
enum Phase {
    Load,
    PostOpen,
}

/// Shared plumbing of both responders. If it's dropped without an answer, the request is failed
/// instead of leaving its batches waiting forever.
struct Responder {
    identifier: String,
    token: u64,
    sender: Sender<LoaderEvent>,
    phase: Phase,
    answered: bool,
}

impl Responder {
    fn send(&mut self, event: LoaderEvent) {
        self.answered = true;
        if self.sender.send(event).is_err() {
            trace!("Loader is gone, dropping the response for {}", self.identifier);
        }
    }

    fn progress(&self, percent: f32) {
        let _ = self.sender.send(LoaderEvent::Progress {
            identifier: self.identifier.clone(),
            token: self.token,
            percent,
        });
    }

    fn failure_event(&self, errors: FetchError) -> LoaderEvent {
        match self.phase {
            Phase::Load => LoaderEvent::Loaded {
                identifier: self.identifier.clone(),
                token: self.token,
                result: Err(errors),
            },
            Phase::PostOpen => LoaderEvent::Resolved {
                identifier: self.identifier.clone(),
                token: self.token,
                result: Err(errors),
            },
        }
    }
}

impl Drop for Responder {
    fn drop(&mut self) {
        if self.answered {
            return;
        }

        warn!(
            "Responder for {} ({:?}) dropped without an answer",
            self.identifier, self.phase
        );
        let event = self.failure_event(FetchError::new(format!(
            "{} was dropped without a response",
            self.identifier
        )));
        self.send(event);
    }
}

/// Answers the `load` step of a request.
pub struct LoadResponder {
    inner: Responder,
}

impl LoadResponder {
    pub(crate) fn new(identifier: &str, token: u64, sender: Sender<LoaderEvent>) -> Self {
        Self {
            inner: Responder {
                identifier: identifier.to_string(),
                token,
                sender,
                phase: Phase::Load,
                answered: false,
            },
        }
    }

    pub fn identifier(&self) -> &str {
        &self.inner.identifier
    }

    pub fn success(mut self, data: Vec<u8>) {
        let event = LoaderEvent::Loaded {
            identifier: self.inner.identifier.clone(),
            token: self.inner.token,
            result: Ok(data),
        };
        self.inner.send(event);
    }

    pub fn error(mut self, errors: FetchError) {
        let event = self.inner.failure_event(errors);
        self.inner.send(event);
    }

    /// Reports the download progress (0-100) to every batch waiting for this request.
    pub fn progress(&self, percent: f32) {
        self.inner.progress(percent);
    }
}

/// Answers the `post_open` step of a request.
pub struct PostOpenResponder {
    inner: Responder,
}

impl PostOpenResponder {
    pub(crate) fn new(identifier: &str, token: u64, sender: Sender<LoaderEvent>) -> Self {
        Self {
            inner: Responder {
                identifier: identifier.to_string(),
                token,
                sender,
                phase: Phase::PostOpen,
                answered: false,
            },
        }
    }

    pub fn identifier(&self) -> &str {
        &self.inner.identifier
    }

    pub fn success(mut self, resource: Resource) {
        let event = LoaderEvent::Resolved {
            identifier: self.inner.identifier.clone(),
            token: self.inner.token,
            result: Ok(resource),
        };
        self.inner.send(event);
    }

    pub fn error(mut self, errors: FetchError) {
        let event = self.inner.failure_event(errors);
        self.inner.send(event);
    }

    pub fn progress(&self, percent: f32) {
        self.inner.progress(percent);
    }
}
