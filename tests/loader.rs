mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{ManualHandler, Recorder, TEST_KIND, manual_loader};
use sceneloader::resources::{
    BatchCallbacks, HandlerOptions, LoaderConfig, LoaderError, RequestOptions, ResourceKind, ResourceLoader,
    ResourceRequest,
};

fn request(id: &str) -> ResourceRequest {
    ResourceRequest::new(TEST_KIND, id)
}

fn requests(ids: &[&str]) -> Vec<ResourceRequest> {
    ids.iter().map(|id| request(id)).collect()
}

/// Resolves `id` and pumps the loader.
fn resolve(loader: &ResourceLoader, handler: &ManualHandler, id: &str) {
    handler.succeed(id);
    loader.update();
}

#[test]
fn dispatches_by_priority_then_submission_order() {
    let (loader, handler) = manual_loader(1);

    // Occupies the only slot, so everything below queues up.
    loader
        .request(request("blocker"), 5, BatchCallbacks::new(), RequestOptions::default())
        .unwrap();
    for (id, priority) in [("a", 2), ("b", 1), ("c", 2), ("d", 1)] {
        loader
            .request(request(id), priority, BatchCallbacks::new(), RequestOptions::default())
            .unwrap();
    }
    assert_eq!(loader.pending_count(), 4);
    assert_eq!(loader.next_pending().as_deref(), Some("b"));

    for id in ["blocker", "b", "d", "a"] {
        resolve(&loader, &handler, id);
    }

    assert_eq!(handler.loads(), vec!["blocker", "b", "d", "a", "c"]);
}

#[test]
fn concurrency_limit_of_one_processes_by_priority() {
    let (loader, handler) = manual_loader(1);
    let order = Arc::new(Mutex::new(vec![]));

    loader
        .request(request("busy"), 1, BatchCallbacks::new(), RequestOptions::default())
        .unwrap();
    for (id, priority) in [("r3", 3), ("r1", 1), ("r2", 2)] {
        let order = order.clone();
        loader
            .request(
                request(id),
                priority,
                BatchCallbacks::new().on_success(move |_| order.lock().unwrap().push(priority)),
                RequestOptions::default(),
            )
            .unwrap();
    }

    resolve(&loader, &handler, "busy");
    while loader.loading_count() > 0 {
        assert_eq!(handler.held(), 1);
        let current = handler.loads().last().cloned().unwrap();
        resolve(&loader, &handler, &current);
    }

    assert_eq!(*order.lock().unwrap(), vec![1, 2, 3]);
}

#[test]
fn shared_requests_are_loaded_once() {
    let (loader, handler) = manual_loader(8);
    let first = Recorder::default();
    let second = Recorder::default();

    loader
        .request(request("shared"), 1, first.callbacks(), RequestOptions::default())
        .unwrap();
    loader
        .request(requests(&["shared", "shared"]), 1, second.callbacks(), RequestOptions::default())
        .unwrap();
    assert_eq!(handler.loads(), vec!["shared"]);

    resolve(&loader, &handler, "shared");

    let first = first.resources().unwrap();
    let second = second.resources().unwrap();
    assert!(first["shared"].ptr_eq(&second["shared"]));
    assert_eq!(
        first["shared"].downcast_ref::<String>().map(String::as_str),
        Some("shared")
    );
    assert_eq!(loader.batch_count(), 0);
}

#[test]
fn merged_request_takes_the_higher_priority() {
    let (loader, handler) = manual_loader(1);

    loader
        .request(request("blocker"), 1, BatchCallbacks::new(), RequestOptions::default())
        .unwrap();
    loader
        .request(request("a"), 3, BatchCallbacks::new(), RequestOptions::default())
        .unwrap();
    loader
        .request(request("b"), 2, BatchCallbacks::new(), RequestOptions::default())
        .unwrap();
    loader
        .request(request("a"), 1, BatchCallbacks::new(), RequestOptions::default())
        .unwrap();

    resolve(&loader, &handler, "blocker");
    assert_eq!(handler.loads(), vec!["blocker", "a"]);
    assert_eq!(handler.options_of("a").map(|options| options.priority), Some(1));
}

#[test]
fn success_fires_exactly_once() {
    let (loader, handler) = manual_loader(8);
    let recorder = Recorder::default();
    loader
        .request(requests(&["a", "b", "c"]), 1, recorder.callbacks(), RequestOptions::default())
        .unwrap();

    resolve(&loader, &handler, "a");
    resolve(&loader, &handler, "b");
    assert_eq!(recorder.success_count(), 0);

    resolve(&loader, &handler, "c");
    loader.update();
    assert_eq!(recorder.success_count(), 1);
    assert_eq!(recorder.resources().unwrap().len(), 3);
}

#[test]
fn progress_is_reported_per_resource() {
    let (loader, handler) = manual_loader(8);
    let recorder = Recorder::default();
    loader
        .request(requests(&["a", "b", "c", "d"]), 1, recorder.callbacks(), RequestOptions::default())
        .unwrap();

    for id in ["a", "b", "c", "d"] {
        resolve(&loader, &handler, id);
    }

    assert_eq!(recorder.progress(), vec![25.0, 50.0, 75.0, 100.0]);
}

#[test]
fn progress_covers_child_batches() {
    let (loader, handler) = manual_loader(8);
    let parent = loader
        .request(request("p"), 1, BatchCallbacks::new(), RequestOptions::default())
        .unwrap();
    let child = loader
        .request(
            requests(&["x", "y"]),
            1,
            BatchCallbacks::new(),
            RequestOptions::with_parent(Some(parent)),
        )
        .unwrap();

    assert_eq!(loader.progress(parent), Some(0.0));
    resolve(&loader, &handler, "x");
    assert_eq!(loader.progress(child), Some(50.0));
    assert_eq!(loader.progress(parent), Some(100.0 / 3.0));

    resolve(&loader, &handler, "p");
    assert_eq!(loader.progress(parent), Some(200.0 / 3.0));
    assert!(loader.is_active(parent));

    resolve(&loader, &handler, "y");
    assert!(!loader.is_active(parent));
    assert_eq!(loader.batch_count(), 0);
}

#[test]
fn parent_completes_after_its_children() {
    let (loader, handler) = manual_loader(8);
    let order = Arc::new(Mutex::new(vec![]));

    let parent_order = order.clone();
    let parent = loader
        .request(
            request("p"),
            1,
            BatchCallbacks::new().on_success(move |resources| {
                assert_eq!(resources.len(), 1);
                parent_order.lock().unwrap().push("parent");
            }),
            RequestOptions::default(),
        )
        .unwrap();
    let child_order = order.clone();
    loader
        .request(
            request("c"),
            1,
            BatchCallbacks::new().on_success(move |_| child_order.lock().unwrap().push("child")),
            RequestOptions::with_parent(Some(parent)),
        )
        .unwrap();

    resolve(&loader, &handler, "p");
    assert!(order.lock().unwrap().is_empty());

    resolve(&loader, &handler, "c");
    assert_eq!(*order.lock().unwrap(), vec!["child", "parent"]);
}

#[test]
fn child_batches_inherit_the_parent_priority() {
    let (loader, handler) = manual_loader(8);
    let parent = loader
        .request(request("p"), 7, BatchCallbacks::new(), RequestOptions::default())
        .unwrap();
    let child = loader
        .request(request("c"), 1, BatchCallbacks::new(), RequestOptions::with_parent(Some(parent)))
        .unwrap();

    assert_eq!(
        handler.options_of("c"),
        Some(HandlerOptions {
            priority: 7,
            batch: Some(child),
        })
    );
}

#[test]
fn empty_batches_complete_immediately() {
    let (loader, _handler) = manual_loader(8);
    let recorder = Recorder::default();

    let handle = loader
        .request(Vec::<ResourceRequest>::new(), 1, recorder.callbacks(), RequestOptions::default())
        .unwrap();

    assert_eq!(recorder.success_count(), 1);
    assert!(recorder.resources().unwrap().is_empty());
    assert!(!loader.is_active(handle));
}

#[test]
fn unknown_kinds_and_parents_are_rejected() {
    let (loader, _handler) = manual_loader(8);

    let result = loader.request(
        ResourceRequest::new("texture", "t"),
        1,
        BatchCallbacks::new(),
        RequestOptions::default(),
    );
    assert!(matches!(result, Err(LoaderError::UnknownKind(kind)) if kind == ResourceKind::new("texture")));

    let done = loader
        .request(Vec::<ResourceRequest>::new(), 1, BatchCallbacks::new(), RequestOptions::default())
        .unwrap();
    let result = loader.request(
        request("a"),
        1,
        BatchCallbacks::new(),
        RequestOptions::with_parent(Some(done)),
    );
    assert!(matches!(result, Err(LoaderError::NotFound(handle)) if handle == done));
    assert_eq!(loader.pending_count(), 0);
}

#[test]
fn cancelled_pending_requests_are_dropped() {
    let (loader, handler) = manual_loader(1);
    loader
        .request(request("blocker"), 1, BatchCallbacks::new(), RequestOptions::default())
        .unwrap();
    let recorder = Recorder::default();
    let handle = loader
        .request(requests(&["a", "b"]), 1, recorder.callbacks(), RequestOptions::default())
        .unwrap();
    assert_eq!(loader.pending_count(), 2);

    assert!(loader.cancel(handle));
    assert_eq!(loader.pending_count(), 0);
    assert!(!loader.cancel(handle));

    resolve(&loader, &handler, "blocker");
    assert_eq!(handler.loads(), vec!["blocker"]);
    assert_eq!(recorder.success_count(), 0);
}

#[test]
fn cancel_keeps_pending_requests_of_other_batches() {
    let (loader, handler) = manual_loader(1);
    loader
        .request(request("blocker"), 1, BatchCallbacks::new(), RequestOptions::default())
        .unwrap();
    let cancelled = Recorder::default();
    let other = Recorder::default();
    let handle = loader
        .request(requests(&["shared", "own"]), 1, cancelled.callbacks(), RequestOptions::default())
        .unwrap();
    loader
        .request(request("shared"), 1, other.callbacks(), RequestOptions::default())
        .unwrap();
    assert_eq!(loader.pending_count(), 2);

    assert!(loader.cancel(handle));
    assert_eq!(loader.pending_count(), 1);
    assert_eq!(loader.next_pending().as_deref(), Some("shared"));

    resolve(&loader, &handler, "blocker");
    resolve(&loader, &handler, "shared");

    assert_eq!(handler.loads(), vec!["blocker", "shared"]);
    assert_eq!(cancelled.success_count(), 0);
    assert_eq!(other.success_count(), 1);
}

#[test]
fn cancelled_batches_miss_running_loads() {
    let (loader, handler) = manual_loader(8);
    let cancelled = Recorder::default();
    let other = Recorder::default();

    let handle = loader
        .request(request("r"), 1, cancelled.callbacks(), RequestOptions::default())
        .unwrap();
    loader
        .request(request("r"), 1, other.callbacks(), RequestOptions::default())
        .unwrap();

    assert!(loader.cancel(handle));
    assert_eq!(loader.loading_count(), 1);
    resolve(&loader, &handler, "r");

    assert_eq!(cancelled.success_count(), 0);
    assert_eq!(other.success_count(), 1);
}

#[test]
fn cancelling_a_child_unblocks_the_parent() {
    let (loader, handler) = manual_loader(8);
    let recorder = Recorder::default();
    let parent = loader
        .request(request("p"), 1, recorder.callbacks(), RequestOptions::default())
        .unwrap();
    let child = loader
        .request(request("c"), 1, BatchCallbacks::new(), RequestOptions::with_parent(Some(parent)))
        .unwrap();

    resolve(&loader, &handler, "p");
    assert_eq!(recorder.success_count(), 0);

    assert!(loader.cancel(child));
    assert_eq!(recorder.success_count(), 1);
}

#[test]
fn failures_reach_every_owner_without_retry() {
    let (loader, handler) = manual_loader(8);
    let first = Recorder::default();
    let second = Recorder::default();

    let handle = loader
        .request(requests(&["bad", "good"]), 1, first.callbacks(), RequestOptions::default())
        .unwrap();
    loader
        .request(request("bad"), 1, second.callbacks(), RequestOptions::default())
        .unwrap();

    handler.fail("bad", "404");
    loader.update();
    resolve(&loader, &handler, "good");

    assert_eq!(first.errors(), vec!["404"]);
    assert_eq!(second.errors(), vec!["404"]);
    assert_eq!(first.progress(), vec![50.0]);
    assert_eq!(first.success_count(), 0);
    assert!(loader.is_active(handle));
    assert_eq!(handler.loads(), vec!["bad", "good"]);
}

#[test]
fn load_progress_is_forwarded() {
    let (loader, handler) = manual_loader(8);
    let recorder = Recorder::default();
    loader
        .request(request("big"), 1, recorder.callbacks(), RequestOptions::default())
        .unwrap();

    handler.progress("big", 40.0);
    loader.update();

    assert_eq!(recorder.progress(), vec![40.0]);
}

#[test]
fn incomplete_batches_time_out() {
    let loader = ResourceLoader::new(LoaderConfig {
        max_concurrent_requests: 8,
        batch_timeout: Some(Duration::from_millis(10)),
    });
    let handler = Arc::new(ManualHandler::default());
    loader
        .register_handler(ResourceKind::new(TEST_KIND), handler.clone())
        .unwrap();

    let recorder = Recorder::default();
    let handle = loader
        .request(request("slow"), 1, recorder.callbacks(), RequestOptions::default())
        .unwrap();

    std::thread::sleep(Duration::from_millis(30));
    loader.update();

    assert_eq!(recorder.errors().len(), 1);
    assert!(recorder.errors()[0].contains("timed out"));
    assert!(!loader.is_active(handle));
    assert_eq!(loader.batch_count(), 0);

    // The late answer is discarded.
    resolve(&loader, &handler, "slow");
    assert_eq!(recorder.success_count(), 0);
    assert_eq!(loader.loading_count(), 0);
}

#[test]
fn callbacks_may_call_back_into_the_loader() {
    let (loader, handler) = manual_loader(8);
    let follow_up = Recorder::default();

    let nested_loader = loader.clone();
    let nested_recorder = follow_up.clone();
    loader
        .request(
            request("first"),
            1,
            BatchCallbacks::new().on_success(move |_| {
                assert_eq!(nested_loader.update(), 0);
                nested_loader
                    .request(request("second"), 1, nested_recorder.callbacks(), RequestOptions::default())
                    .unwrap();
            }),
            RequestOptions::default(),
        )
        .unwrap();

    resolve(&loader, &handler, "first");
    assert_eq!(handler.loads(), vec!["first", "second"]);

    resolve(&loader, &handler, "second");
    assert_eq!(follow_up.success_count(), 1);
}

#[test]
fn open_is_a_passthrough() {
    let (loader, _handler) = manual_loader(8);
    let options = HandlerOptions {
        priority: 1,
        batch: None,
    };

    let resource = loader
        .open(&ResourceKind::new(TEST_KIND), b"inline".to_vec(), &options)
        .unwrap();
    assert_eq!(resource.downcast_ref::<String>().map(String::as_str), Some("inline"));

    let result = loader.open(&ResourceKind::new(TEST_KIND), vec![0xff, 0xfe], &options);
    assert!(matches!(result, Err(LoaderError::Open { .. })));
}
