use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use itertools::Itertools;
use log::{debug, trace};

use crate::resources::{BatchHandle, FetchError, Resource};

/// Resources of a completed batch, keyed by request identifier.
pub type ResourceMap = HashMap<String, Resource>;

pub type SuccessCallback = Box<dyn FnOnce(ResourceMap) + Send>;
pub type ErrorCallback = Arc<dyn Fn(&FetchError) + Send + Sync>;
pub type ProgressCallback = Arc<dyn Fn(f32) + Send + Sync>;

/// The callbacks of a single [`ResourceLoader::request`](crate::resources::ResourceLoader::request).
///
/// `success` fires exactly once, after every request of the batch and of all of its child batches
/// has resolved. `error` fires for every failed request, `progress` after every resolved resource
/// with the percentage of the whole batch tree.
#[derive(Default)]
pub struct BatchCallbacks {
    success: Option<SuccessCallback>,
    error: Option<ErrorCallback>,
    progress: Option<ProgressCallback>,
}

impl BatchCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_success(mut self, callback: impl FnOnce(ResourceMap) + Send + 'static) -> Self {
        self.success = Some(Box::new(callback));
        self
    }

    pub fn on_error(mut self, callback: impl Fn(&FetchError) + Send + Sync + 'static) -> Self {
        self.error = Some(Arc::new(callback));
        self
    }

    pub fn on_progress(mut self, callback: impl Fn(f32) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(callback));
        self
    }
}

/// A callback invocation that has been decided while holding the loader state, but is only
/// executed after the lock has been released, so callbacks can call back into the loader.
pub(crate) enum Notification {
    Success(SuccessCallback, ResourceMap),
    Error(ErrorCallback, FetchError),
    Progress(ProgressCallback, f32),
}

impl Notification {
    pub(crate) fn fire(self) {
        match self {
            Notification::Success(callback, resources) => callback(resources),
            Notification::Error(callback, errors) => callback(&errors),
            Notification::Progress(callback, percent) => callback(percent),
        }
    }
}

/// A group of requests that is processed together.
pub struct RequestBatch {
    handle: BatchHandle,
    requests: Vec<String>,
    priority: u32,
    callbacks: BatchCallbacks,
    resources: ResourceMap,
    count: usize,
    completed: bool,
    parent: Option<BatchHandle>,
    children: Vec<BatchHandle>,
    created: Instant,
}

impl RequestBatch {
    pub(crate) fn new(
        handle: BatchHandle,
        requests: Vec<String>,
        priority: u32,
        callbacks: BatchCallbacks,
        parent: Option<BatchHandle>,
    ) -> Self {
        Self {
            handle,
            requests,
            priority,
            callbacks,
            resources: ResourceMap::new(),
            count: 0,
            completed: false,
            parent,
            children: vec![],
            created: Instant::now(),
        }
    }

    pub fn handle(&self) -> BatchHandle {
        self.handle
    }

    pub fn requests(&self) -> &[String] {
        &self.requests
    }

    pub fn priority(&self) -> u32 {
        self.priority
    }

    pub fn parent(&self) -> Option<BatchHandle> {
        self.parent
    }

    pub fn children(&self) -> &[BatchHandle] {
        &self.children
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn created(&self) -> Instant {
        self.created
    }

    pub(crate) fn error_notification(&self, errors: &FetchError) -> Option<Notification> {
        self.callbacks
            .error
            .as_ref()
            .map(|callback| Notification::Error(callback.clone(), errors.clone()))
    }

    pub(crate) fn progress_notification(&self, percent: f32) -> Option<Notification> {
        self.callbacks
            .progress
            .as_ref()
            .map(|callback| Notification::Progress(callback.clone(), percent))
    }
}

/// Owns all batches of a loader. Batches refer to their parent and children by handle.
#[derive(Default)]
pub(crate) struct BatchArena {
    batches: HashMap<BatchHandle, RequestBatch>,
}

impl BatchArena {
    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn get(&self, handle: BatchHandle) -> Option<&RequestBatch> {
        self.batches.get(&handle)
    }

    /// A batch that can still receive resources or gain children.
    pub fn get_active(&self, handle: BatchHandle) -> Option<&RequestBatch> {
        self.batches.get(&handle).filter(|batch| !batch.completed)
    }

    pub fn active_handles(&self) -> impl Iterator<Item = BatchHandle> + '_ {
        self.batches
            .values()
            .filter(|batch| !batch.completed)
            .map(|batch| batch.handle)
    }

    /// Inserts the batch and links it to its parent, if it has one.
    pub fn insert(&mut self, batch: RequestBatch) {
        if let Some(parent) = batch.parent.and_then(|parent| self.batches.get_mut(&parent)) {
            parent.children.push(batch.handle);
        }
        self.batches.insert(batch.handle, batch);
    }

    /// True iff every request of the batch produced a resource and every child batch is complete.
    pub fn is_complete(&self, handle: BatchHandle) -> bool {
        let Some(batch) = self.batches.get(&handle) else {
            return false;
        };

        batch.children.iter().all(|child| self.is_complete(*child)) && batch.count == batch.requests.len()
    }

    /// Resolved and total request counts of the batch and all of its descendants.
    pub fn counts(&self, handle: BatchHandle) -> (usize, usize) {
        let Some(batch) = self.batches.get(&handle) else {
            return (0, 0);
        };

        batch
            .children
            .iter()
            .map(|child| self.counts(*child))
            .fold((batch.count, batch.requests.len()), |acc, (count, total)| {
                (acc.0 + count, acc.1 + total)
            })
    }

    /// Percentage (0-100) of the whole batch tree. An empty tree counts as done.
    pub fn progress(&self, handle: BatchHandle) -> f32 {
        let (count, total) = self.counts(handle);
        if total == 0 {
            100.0
        } else {
            100.0 * count as f32 / total as f32
        }
    }

    /// Records a resolved resource and re-evaluates completion. Returns true if the batch is
    /// complete now.
    pub fn add_resource(
        &mut self,
        handle: BatchHandle,
        identifier: &str,
        resource: Resource,
        notifications: &mut Vec<Notification>,
    ) -> bool {
        let Some(batch) = self.batches.get_mut(&handle) else {
            return false;
        };

        if batch.completed {
            return true;
        }

        batch.resources.insert(identifier.to_string(), resource);
        batch.count += 1;
        self.update(handle, notifications)
    }

    /// Reports progress and, if the batch is complete, fires success and lets the parent re-check
    /// its own completion. Otherwise the open ancestors report their grown subtree progress.
    pub fn update(&mut self, handle: BatchHandle, notifications: &mut Vec<Notification>) -> bool {
        let progress = self.progress(handle);
        let complete = self.is_complete(handle);

        let Some(batch) = self.batches.get_mut(&handle) else {
            return false;
        };

        if batch.completed {
            return true;
        }

        notifications.extend(batch.progress_notification(progress));

        if !complete {
            let parent = batch.parent;
            self.report_ancestors(parent, notifications);
            return false;
        }

        debug!("Batch {} is complete", handle);
        batch.completed = true;
        let resources = std::mem::take(&mut batch.resources);
        if let Some(success) = batch.callbacks.success.take() {
            notifications.push(Notification::Success(success, resources));
        }

        if let Some(parent) = batch.parent
            && self.get_active(parent).is_some()
        {
            self.update(parent, notifications);
        }

        true
    }

    /// An incomplete batch keeps all of its ancestors incomplete, so they only report progress.
    fn report_ancestors(&self, mut parent: Option<BatchHandle>, notifications: &mut Vec<Notification>) {
        while let Some(handle) = parent {
            let Some(batch) = self.get_active(handle) else {
                return;
            };

            notifications.extend(batch.progress_notification(self.progress(handle)));
            parent = batch.parent;
        }
    }

    /// Removes the batch without completing it. Its children become root batches and its parent
    /// re-checks completion, since it no longer waits for this batch.
    pub fn detach(&mut self, handle: BatchHandle, notifications: &mut Vec<Notification>) -> Option<RequestBatch> {
        let batch = self.batches.remove(&handle)?;

        for child in &batch.children {
            if let Some(child) = self.batches.get_mut(child) {
                child.parent = None;
            }
        }

        if let Some(parent) = batch.parent
            && let Some(parent_batch) = self.batches.get_mut(&parent)
        {
            parent_batch.children.retain(|child| *child != handle);
            if !parent_batch.completed {
                self.update(parent, notifications);
            }
        }

        Some(batch)
    }

    /// Drops completed root batches together with their (completed) descendants.
    pub fn prune_completed(&mut self) -> usize {
        let roots = self
            .batches
            .values()
            .filter(|batch| batch.completed && batch.parent.is_none_or(|parent| !self.batches.contains_key(&parent)))
            .map(|batch| batch.handle)
            .collect_vec();

        let mut removed = 0;
        let mut stack = roots;
        while let Some(handle) = stack.pop() {
            if let Some(batch) = self.batches.remove(&handle) {
                trace!("Removing completed batch {}", handle);
                stack.extend(batch.children);
                removed += 1;
            }
        }
        removed
    }
}
