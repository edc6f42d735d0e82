use std::collections::{HashMap, HashSet};
use std::sync::mpsc::{Receiver, Sender, TryRecvError, channel};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, TryLockError, Weak};
use std::time::Duration;

use itertools::Itertools;
use log::{debug, error, trace, warn};

use crate::resources::batch::{BatchArena, BatchCallbacks, Notification, RequestBatch};
use crate::resources::handler::{HandlerOptions, LoadResponder, PostOpenResponder, ResourceHandler};
use crate::resources::{BatchHandle, FetchError, LoaderError, Resource, ResourceKind, ResourceRequest};

pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 32;

#[derive(Clone, Debug)]
pub struct LoaderConfig {
    /// Upper bound of requests that are in their `load` step at the same time.
    pub max_concurrent_requests: usize,
    /// Batches that are still incomplete after this long are failed and dropped.
    /// `None` keeps them around until they complete or are cancelled.
    pub batch_timeout: Option<Duration>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
            batch_timeout: None,
        }
    }
}

#[derive(Copy, Clone, Debug, Default)]
pub struct RequestOptions {
    /// The new batch becomes a child of this batch and inherits its priority.
    pub parent: Option<BatchHandle>,
}

impl RequestOptions {
    pub fn with_parent(parent: Option<BatchHandle>) -> Self {
        Self { parent }
    }
}

/// Posted by the responders, consumed by [`ResourceLoader::update`].
/// `token` is the sequence number of the request the event belongs to.
#[derive(Debug)]
pub(crate) enum LoaderEvent {
    Loaded {
        identifier: String,
        token: u64,
        result: Result<Vec<u8>, FetchError>,
    },
    Resolved {
        identifier: String,
        token: u64,
        result: Result<Resource, FetchError>,
    },
    Progress {
        identifier: String,
        token: u64,
        percent: f32,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum RequestState {
    Pending,
    Loading,
    /// Loaded, waiting for `post_open` to answer.
    Opening,
}

struct RequestRecord {
    kind: ResourceKind,
    priority: u32,
    sequence: u64,
    batches: Vec<BatchHandle>,
    state: RequestState,
}

/// Everything to call a handler's `load` step outside of the state lock.
struct Dispatch {
    identifier: String,
    kind: ResourceKind,
    token: u64,
    options: HandlerOptions,
}

struct LoaderState {
    requests: HashMap<String, RequestRecord>,
    /// Identifiers of pending requests, sorted by (priority, sequence).
    pending: Vec<String>,
    loading: HashSet<String>,
    batches: BatchArena,
    next_sequence: u64,
    next_batch: u64,
}

impl LoaderState {
    fn new() -> Self {
        Self {
            requests: HashMap::new(),
            pending: vec![],
            loading: HashSet::new(),
            batches: BatchArena::default(),
            next_sequence: 1,
            next_batch: 1,
        }
    }

    fn enqueue(&mut self, request: &ResourceRequest, batch: BatchHandle, priority: u32) {
        if let Some(existing) = self.requests.get_mut(request.identifier()) {
            // Already requested: this batch gets the same resource, it's never fetched twice.
            if existing.kind != *request.kind() {
                warn!(
                    "{} was requested as {} but is already in flight as {}",
                    request.identifier(),
                    request.kind(),
                    existing.kind
                );
            }
            existing.batches.push(batch);
            existing.priority = existing.priority.min(priority);
            trace!(
                "Merged {} into existing request {} ({:?})",
                request.identifier(),
                existing.sequence,
                existing.state
            );
            return;
        }

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.requests.insert(
            request.identifier().to_string(),
            RequestRecord {
                kind: request.kind().clone(),
                priority,
                sequence,
                batches: vec![batch],
                state: RequestState::Pending,
            },
        );
        self.pending.push(request.identifier().to_string());
    }

    fn sort_pending(&mut self) {
        let requests = &self.requests;
        self.pending.sort_by_key(|identifier| {
            requests
                .get(identifier)
                .map(|record| (record.priority, record.sequence))
                .unwrap_or((u32::MAX, u64::MAX))
        });
    }

    fn options_for(&self, record: &RequestRecord) -> HandlerOptions {
        HandlerOptions {
            priority: record.priority,
            batch: record
                .batches
                .iter()
                .copied()
                .find(|batch| self.batches.get_active(*batch).is_some()),
        }
    }

    fn pop_pending(&mut self, max_concurrent: usize) -> Option<Dispatch> {
        while self.loading.len() < max_concurrent && !self.pending.is_empty() {
            let identifier = self.pending.remove(0);
            let Some(record) = self.requests.get(&identifier) else {
                continue;
            };

            let options = self.options_for(record);
            let dispatch = Dispatch {
                kind: record.kind.clone(),
                token: record.sequence,
                options,
                identifier: identifier.clone(),
            };

            if let Some(record) = self.requests.get_mut(&identifier) {
                record.state = RequestState::Loading;
            }
            self.loading.insert(identifier);
            return Some(dispatch);
        }
        None
    }

    /// Finds the record an event belongs to, ignoring events of requests that no longer exist or
    /// were replaced by a newer request for the same identifier.
    fn record_for(&self, identifier: &str, token: u64, state: RequestState) -> Option<&RequestRecord> {
        self.requests
            .get(identifier)
            .filter(|record| record.sequence == token && record.state == state)
    }

    /// Drops the request and reports the errors to every batch that owns it.
    fn fail(&mut self, identifier: &str, errors: &FetchError, notifications: &mut Vec<Notification>) {
        self.loading.remove(identifier);
        let Some(record) = self.requests.remove(identifier) else {
            return;
        };

        for batch in record.batches.iter().unique() {
            if let Some(batch) = self.batches.get_active(*batch) {
                notifications.extend(batch.error_notification(errors));
            }
        }
    }

    /// Detaches the batch from all of its requests and removes it. Pending requests that are not
    /// wanted by any other batch are dropped, already running ones are left alone.
    fn remove_batch(&mut self, handle: BatchHandle, notifications: &mut Vec<Notification>) -> Option<RequestBatch> {
        let batch = self.batches.detach(handle, notifications)?;

        for identifier in batch.requests() {
            let Some(record) = self.requests.get_mut(identifier) else {
                continue;
            };

            record.batches.retain(|owner| *owner != handle);
            if record.batches.is_empty() && record.state == RequestState::Pending {
                trace!("Dropping pending request {}", identifier);
                self.requests.remove(identifier);
                self.pending.retain(|pending| pending != identifier);
            }
        }

        Some(batch)
    }
}

/// Coordinates all asynchronous resource fetches.
///
/// `request`, `cancel` and handler registration may be called from any thread. The completion
/// events are processed by [`ResourceLoader::update`], which has to be called regularly, e.g. once
/// per frame. Callbacks run from within `update`, except for the success of an empty batch and the
/// parent completion caused by `cancel`, which fire before those calls return.
pub struct ResourceLoader {
    config: LoaderConfig,
    handlers: RwLock<HashMap<ResourceKind, Arc<dyn ResourceHandler>>>,
    state: Mutex<LoaderState>,
    sender: Sender<LoaderEvent>,
    receiver: Mutex<Receiver<LoaderEvent>>,
    weak_self: Weak<ResourceLoader>,
}

impl ResourceLoader {
    pub fn new(config: LoaderConfig) -> Arc<Self> {
        let mut config = config;
        if config.max_concurrent_requests == 0 {
            warn!("max_concurrent_requests of 0 would never load anything, using 1");
            config.max_concurrent_requests = 1;
        }

        let (sender, receiver) = channel();
        Arc::new_cyclic(|weak| Self {
            config,
            handlers: RwLock::new(HashMap::new()),
            state: Mutex::new(LoaderState::new()),
            sender,
            receiver: Mutex::new(receiver),
            weak_self: weak.clone(),
        })
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Registers the handler for all requests of `kind`, replacing any previous one.
    pub fn register_handler(&self, kind: ResourceKind, handler: Arc<dyn ResourceHandler>) -> Result<(), LoaderError> {
        if !kind.is_identifiable() {
            return Err(LoaderError::Configuration {
                reason: "resource kinds must not be anonymous".to_string(),
            });
        }

        handler.attach(self.weak_self.clone());
        let previous = self
            .handlers
            .write()
            .expect("Handler registry poisoned")
            .insert(kind.clone(), handler);

        if previous.is_some() {
            warn!("Replaced the handler for {}", kind);
        } else {
            debug!("Registered handler for {}", kind);
        }
        Ok(())
    }

    fn handler(&self, kind: &ResourceKind) -> Option<Arc<dyn ResourceHandler>> {
        self.handlers
            .read()
            .expect("Handler registry poisoned")
            .get(kind)
            .cloned()
    }

    fn lock_state(&self) -> MutexGuard<'_, LoaderState> {
        self.state.lock().expect("Loader state poisoned")
    }

    /// Requests a batch of resources. Returns immediately, the callbacks fire from within
    /// [`ResourceLoader::update`] once the resources are ready.
    ///
    /// Identifiers that are already requested by another batch are not fetched again, this batch
    /// will receive the same resource.
    pub fn request(
        &self,
        requests: impl Into<Vec<ResourceRequest>>,
        priority: u32,
        callbacks: BatchCallbacks,
        options: RequestOptions,
    ) -> Result<BatchHandle, LoaderError> {
        let requests = requests
            .into()
            .into_iter()
            .unique_by(|request| request.identifier().to_string())
            .collect_vec();

        {
            let handlers = self.handlers.read().expect("Handler registry poisoned");
            if let Some(request) = requests
                .iter()
                .find(|request| !handlers.contains_key(request.kind()))
            {
                return Err(LoaderError::UnknownKind(request.kind().clone()));
            }
        }

        let mut notifications = vec![];
        let handle = {
            let mut state = self.lock_state();

            let priority = match options.parent {
                Some(parent) => {
                    state
                        .batches
                        .get_active(parent)
                        .ok_or(LoaderError::NotFound(parent))?
                        .priority()
                }
                None => priority,
            };

            let handle = BatchHandle(state.next_batch);
            state.next_batch += 1;

            let identifiers = requests
                .iter()
                .map(|request| request.identifier().to_string())
                .collect_vec();
            debug!(
                "Batch {} requests {} resource(s) at priority {}",
                handle,
                identifiers.len(),
                priority
            );

            state.batches.insert(RequestBatch::new(
                handle,
                identifiers,
                priority,
                callbacks,
                options.parent,
            ));

            for request in &requests {
                state.enqueue(request, handle, priority);
            }
            state.sort_pending();

            if requests.is_empty() {
                state.batches.update(handle, &mut notifications);
                state.batches.prune_completed();
            }
            handle
        };

        notifications.into_iter().for_each(Notification::fire);
        self.dispatch();
        Ok(handle)
    }

    /// Cancels a batch. Its pending requests are removed unless another batch waits for them,
    /// requests that are already loading keep running but won't reach this batch's callbacks.
    /// Child batches are not cancelled.
    pub fn cancel(&self, handle: BatchHandle) -> bool {
        let mut notifications = vec![];
        let removed = {
            let mut state = self.lock_state();
            let removed = state.remove_batch(handle, &mut notifications).is_some();
            state.batches.prune_completed();
            removed
        };

        if removed {
            debug!("Cancelled batch {}", handle);
        } else {
            warn!("Cannot cancel unknown batch {}", handle);
        }

        notifications.into_iter().for_each(Notification::fire);
        removed
    }

    /// Converts already available data without fetching it, using the handler of `kind`.
    pub fn open(&self, kind: &ResourceKind, data: Vec<u8>, options: &HandlerOptions) -> Result<Resource, LoaderError> {
        let handler = self
            .handler(kind)
            .ok_or_else(|| LoaderError::UnknownKind(kind.clone()))?;

        handler
            .open(data, options)
            .map_err(|errors| LoaderError::Open {
                kind: kind.clone(),
                errors,
            })
    }

    /// Dispatches pending requests and processes all completion events that are available,
    /// including the ones caused by processing. Returns the number of processed events.
    ///
    /// Calls from within a callback (or concurrent calls) return 0 right away, the running
    /// update continues to process.
    pub fn update(&self) -> usize {
        profiling::scope!("ResourceLoader::update");

        let receiver = match self.receiver.try_lock() {
            Ok(receiver) => receiver,
            Err(TryLockError::WouldBlock) => return 0,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };

        self.expire_batches();

        let mut processed = 0;
        loop {
            self.dispatch();
            match receiver.try_recv() {
                Ok(event) => {
                    self.handle_event(event);
                    processed += 1;
                }
                Err(TryRecvError::Empty) => break,
                // We hold a sender ourselves.
                Err(TryRecvError::Disconnected) => unreachable!("Loader event channel closed"),
            }
        }
        processed
    }

    /// Starts as many pending requests as the concurrency limit allows, highest priority first.
    fn dispatch(&self) -> usize {
        let mut dispatched = 0;
        loop {
            let Some(job) = self
                .lock_state()
                .pop_pending(self.config.max_concurrent_requests)
            else {
                break;
            };

            trace!("Loading {} ({})", job.identifier, job.kind);
            let responder = LoadResponder::new(&job.identifier, job.token, self.sender.clone());
            match self.handler(&job.kind) {
                Some(handler) => handler.load(&job.identifier, responder, &job.options),
                None => responder.error(FetchError::new(format!(
                    "No handler for {} anymore",
                    job.kind
                ))),
            }
            dispatched += 1;
        }
        dispatched
    }

    fn handle_event(&self, event: LoaderEvent) {
        match event {
            LoaderEvent::Loaded {
                identifier,
                token,
                result,
            } => self.on_loaded(identifier, token, result),
            LoaderEvent::Resolved {
                identifier,
                token,
                result,
            } => self.on_resolved(identifier, token, result),
            LoaderEvent::Progress {
                identifier,
                token,
                percent,
            } => self.on_progress(&identifier, token, percent),
        }
    }

    fn on_loaded(&self, identifier: String, token: u64, result: Result<Vec<u8>, FetchError>) {
        let mut notifications = vec![];
        let opening = {
            let mut state = self.lock_state();
            let Some(record) = state.record_for(&identifier, token, RequestState::Loading) else {
                trace!("Ignoring stale load result for {}", identifier);
                return;
            };

            match result {
                Err(errors) => {
                    error!("Loading {} failed: {}", identifier, errors);
                    state.fail(&identifier, &errors, &mut notifications);
                    None
                }
                Ok(_) if record.batches.is_empty() => {
                    debug!("Nobody is waiting for {} anymore, discarding it", identifier);
                    state.loading.remove(&identifier);
                    state.requests.remove(&identifier);
                    None
                }
                Ok(data) => {
                    let options = state.options_for(record);
                    let kind = record.kind.clone();
                    state.loading.remove(&identifier);
                    if let Some(record) = state.requests.get_mut(&identifier) {
                        record.state = RequestState::Opening;
                    }
                    Some((kind, data, options))
                }
            }
        };

        notifications.into_iter().for_each(Notification::fire);

        let Some((kind, data, options)) = opening else {
            return;
        };

        let Some(handler) = self.handler(&kind) else {
            self.fail_opening(&identifier, FetchError::new(format!("No handler for {}", kind)));
            return;
        };

        match handler.open(data, &options) {
            Ok(resource) => {
                let responder = PostOpenResponder::new(&identifier, token, self.sender.clone());
                handler.post_open(resource, responder, &options);
            }
            Err(errors) => {
                error!("Opening {} failed: {}", identifier, errors);
                self.fail_opening(&identifier, errors);
            }
        }
    }

    fn fail_opening(&self, identifier: &str, errors: FetchError) {
        let mut notifications = vec![];
        self.lock_state()
            .fail(identifier, &errors, &mut notifications);
        notifications.into_iter().for_each(Notification::fire);
    }

    fn on_resolved(&self, identifier: String, token: u64, result: Result<Resource, FetchError>) {
        let mut notifications = vec![];
        {
            let mut state = self.lock_state();
            if state
                .record_for(&identifier, token, RequestState::Opening)
                .is_none()
            {
                trace!("Ignoring stale resolve for {}", identifier);
                return;
            }

            match result {
                Err(errors) => {
                    error!("Resolving {} failed: {}", identifier, errors);
                    state.fail(&identifier, &errors, &mut notifications);
                }
                Ok(resource) => {
                    let Some(record) = state.requests.remove(&identifier) else {
                        return;
                    };

                    trace!("Resolved {}", identifier);
                    for batch in record.batches.iter().unique() {
                        state
                            .batches
                            .add_resource(*batch, &identifier, resource.clone(), &mut notifications);
                    }
                    state.batches.prune_completed();
                }
            }
        }

        notifications.into_iter().for_each(Notification::fire);
    }

    fn on_progress(&self, identifier: &str, token: u64, percent: f32) {
        let notifications = {
            let state = self.lock_state();
            let Some(record) = state
                .requests
                .get(identifier)
                .filter(|record| record.sequence == token)
            else {
                return;
            };

            record
                .batches
                .iter()
                .unique()
                .filter_map(|batch| state.batches.get_active(*batch))
                .filter_map(|batch| batch.progress_notification(percent))
                .collect_vec()
        };

        notifications.into_iter().for_each(Notification::fire);
    }

    /// Fails every batch that has been incomplete for longer than the configured timeout.
    fn expire_batches(&self) {
        let Some(timeout) = self.config.batch_timeout else {
            return;
        };

        let mut notifications = vec![];
        {
            let mut state = self.lock_state();
            let expired = state
                .batches
                .active_handles()
                .filter(|handle| {
                    state
                        .batches
                        .get(*handle)
                        .is_some_and(|batch| batch.created().elapsed() > timeout)
                })
                .sorted()
                .collect_vec();

            for handle in expired {
                // May have been removed as part of an earlier expiry.
                let Some(batch) = state.remove_batch(handle, &mut notifications) else {
                    continue;
                };

                warn!("Batch {} timed out after {:?}", handle, timeout);
                let errors = FetchError::new(format!("Batch {} timed out after {:?}", handle, timeout));
                notifications.extend(batch.error_notification(&errors));
            }
            state.batches.prune_completed();
        }

        notifications.into_iter().for_each(Notification::fire);
    }

    pub fn pending_count(&self) -> usize {
        self.lock_state().pending.len()
    }

    pub fn loading_count(&self) -> usize {
        self.lock_state().loading.len()
    }

    /// Batches that are tracked by the loader, including completed children of open batches.
    pub fn batch_count(&self) -> usize {
        self.lock_state().batches.len()
    }

    /// Whether the batch still waits for resources. Completed and cancelled batches are not active.
    pub fn is_active(&self, handle: BatchHandle) -> bool {
        self.lock_state().batches.get_active(handle).is_some()
    }

    /// Progress (0-100) of the batch including all of its descendants, as long as it's tracked.
    pub fn progress(&self, handle: BatchHandle) -> Option<f32> {
        let state = self.lock_state();
        state
            .batches
            .get(handle)
            .map(|_| state.batches.progress(handle))
    }

    /// The identifier of the next request to be dispatched, if any.
    pub fn next_pending(&self) -> Option<String> {
        self.lock_state().pending.first().cloned()
    }
}
