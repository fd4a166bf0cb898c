use crate::mock::MockFetcher;
use crate::unit_tests::{drain_tasks, Recorder};
use crate::{
    ChangeNotifier, FetchError, ListenerId, ObservableValue, RefetchPolicy, Resource,
    ResourceError, ResourceState,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[tokio::test]
async fn test_starts_unresolved() {
    let resource: Resource<i32> = Resource::from_fetcher(|| async { 1 });
    assert_eq!(resource.state(), ResourceState::Unresolved);
    assert!(!resource.is_resolved());
    assert_eq!(resource.value(), Ok(None));
    assert_eq!(resource.error(), None);
}

#[tokio::test]
async fn test_resolve_twice_is_invalid() -> Result<(), ResourceError> {
    let resource: Resource<i32> = Resource::from_fetcher(|| async { 1 });
    resource.resolve()?;
    let second = resource.resolve();
    assert!(matches!(second, Err(ResourceError::InvalidState(_))));
    assert_eq!(resource.settled().await, ResourceState::ready(1));
    Ok(())
}

#[tokio::test]
async fn test_fetch_success() -> Result<(), ResourceError> {
    let resource: Resource<i32> = Resource::from_fetcher(|| async { Ok::<_, String>(42) });
    let recorder = Recorder::attach(&resource);

    resource.resolve()?;
    assert!(resource.is_loading());

    assert_eq!(resource.settled().await, ResourceState::ready(42));
    assert_eq!(
        recorder.states(),
        vec![ResourceState::Loading, ResourceState::ready(42)]
    );
    assert!(resource.is_ready());
    assert_eq!(resource.value(), Ok(Some(42)));
    assert_eq!(resource.as_ready().map(|ready| ready.refreshing), Some(false));
    Ok(())
}

#[tokio::test]
async fn test_fetch_failure_is_captured() -> Result<(), ResourceError> {
    let resource: Resource<i32> = Resource::from_fetcher(|| async { Err::<i32, _>("boom") });

    resource.resolve()?;
    let state = resource.settled().await;

    assert_eq!(state, ResourceState::fail_with_message("boom"));
    assert!(resource.has_error());
    assert_eq!(resource.value(), Err(FetchError::Error("boom".to_string())));
    assert_eq!(resource.error(), Some(FetchError::error("boom")));
    assert_eq!(resource.as_error().and_then(|error| error.trace), None);
    Ok(())
}

#[tokio::test]
async fn test_fetch_none_is_captured() -> Result<(), ResourceError> {
    let resource: Resource<i32> = Resource::from_fetcher(|| async { None::<i32> });
    resource.resolve()?;
    assert_eq!(resource.settled().await, ResourceState::fail(FetchError::None));
    Ok(())
}

#[tokio::test]
async fn test_refetch_keeps_stale_value_while_refreshing() -> Result<(), ResourceError> {
    let mock = MockFetcher::new();
    mock.push_ok(1).push_ok(2);
    let resource: Resource<i32> = Resource::from_fetcher(mock.fetcher());
    let recorder = Recorder::attach(&resource);

    resource.resolve()?;
    assert_eq!(resource.settled().await, ResourceState::ready(1));

    resource.refetch()?;
    assert_eq!(resource.state(), ResourceState::refreshing(1));
    assert!(resource.is_refreshing());
    assert!(!resource.is_loading());

    assert_eq!(resource.settled().await, ResourceState::ready(2));
    assert_eq!(
        recorder.states(),
        vec![
            ResourceState::Loading,
            ResourceState::ready(1),
            ResourceState::refreshing(1),
            ResourceState::ready(2),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_refetch_after_error_goes_through_loading() -> Result<(), ResourceError> {
    let mock = MockFetcher::new();
    mock.push_err("offline").push_ok(9);
    let resource: Resource<i32> = Resource::from_fetcher(mock.fetcher());

    resource.resolve()?;
    assert!(resource.settled().await.has_error());

    resource.refetch()?;
    assert_eq!(resource.state(), ResourceState::Loading);
    assert_eq!(resource.settled().await, ResourceState::ready(9));
    Ok(())
}

#[tokio::test]
async fn test_refetch_error_discards_value() -> Result<(), ResourceError> {
    let mock = MockFetcher::new();
    mock.push_ok(1).push_err("gone");
    let resource: Resource<i32> = Resource::from_fetcher(mock.fetcher());

    resource.resolve()?;
    resource.settled().await;
    resource.refetch()?;
    assert_eq!(resource.settled().await, ResourceState::fail_with_message("gone"));
    assert_eq!(resource.value(), Err(FetchError::error("gone")));
    Ok(())
}

#[tokio::test]
async fn test_refetch_before_resolve_does_not_corrupt_state() -> Result<(), ResourceError> {
    let mock = MockFetcher::returning(3);
    let resource: Resource<i32> = Resource::from_fetcher(mock.fetcher());

    resource.refetch()?;
    assert_eq!(resource.state(), ResourceState::Loading);
    assert_eq!(resource.settled().await, ResourceState::ready(3));

    let late_resolve = resource.resolve();
    assert!(matches!(late_resolve, Err(ResourceError::InvalidState(_))));
    assert!(!resource.is_resolved());
    assert_eq!(resource.state(), ResourceState::ready(3));
    drain_tasks().await;
    assert_eq!(mock.calls(), 1);
    Ok(())
}

#[tokio::test]
async fn test_source_change_triggers_one_refetch_each() -> Result<(), ResourceError> {
    let mock = MockFetcher::returning(0);
    let source = ObservableValue::new("user-1".to_string());
    let resource: Resource<i32> = Resource::builder()
        .fetcher(mock.fetcher())
        .source(source.clone())
        .build()?;

    resource.resolve()?;
    resource.settled().await;
    assert_eq!(mock.calls(), 1);
    assert_eq!(source.listener_count(), 1);

    source.set("user-2".to_string());
    assert_eq!(mock.calls(), 2);
    assert!(resource.is_refreshing());
    source.set("user-3".to_string());
    assert_eq!(mock.calls(), 3);

    assert_eq!(resource.settled().await, ResourceState::ready(0));
    Ok(())
}

#[tokio::test]
async fn test_source_is_ignored_until_resolved() -> Result<(), ResourceError> {
    let mock = MockFetcher::returning(0);
    let source = ObservableValue::new(0u8);
    let resource: Resource<i32> = Resource::builder()
        .fetcher(mock.fetcher())
        .source(source.clone())
        .build()?;

    source.set(1);
    assert_eq!(mock.calls(), 0);
    assert_eq!(source.listener_count(), 0);
    assert_eq!(resource.state(), ResourceState::Unresolved);
    Ok(())
}

#[tokio::test]
async fn test_dispose_stops_source_refetches() -> Result<(), ResourceError> {
    let mock = MockFetcher::returning(1);
    let source = ObservableValue::new(0u8);
    let resource: Resource<i32> = Resource::builder()
        .fetcher(mock.fetcher())
        .source(source.clone())
        .build()?;
    let notified = Arc::new(AtomicUsize::new(0));
    let n = notified.clone();

    resource.resolve()?;
    resource.settled().await;
    resource.add_listener(move |_| {
        n.fetch_add(1, Ordering::SeqCst);
    });

    resource.dispose();
    assert_eq!(source.listener_count(), 0);
    assert_eq!(resource.listener_count(), 0);

    source.set(1);
    drain_tasks().await;
    assert_eq!(mock.calls(), 1);
    assert_eq!(notified.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn test_dispose_before_fetch_settles_drops_result() -> Result<(), ResourceError> {
    let mock = MockFetcher::returning(5).gated();
    let resource: Resource<i32> = Resource::from_fetcher(mock.fetcher());
    let recorder = Recorder::attach(&resource);

    resource.resolve()?;
    drain_tasks().await;
    resource.dispose();

    assert!(mock.release(0));
    drain_tasks().await;
    assert_eq!(resource.state(), ResourceState::Loading);
    assert_eq!(recorder.states(), vec![ResourceState::Loading]);
    Ok(())
}

/// A source that counts how often dependents unregister from it.
#[derive(Clone, Default)]
struct CountingSource {
    value: ObservableValue<u32>,
    removals: Arc<AtomicUsize>,
}

impl ChangeNotifier for CountingSource {
    fn add_change_listener(&self, listener: Arc<dyn Fn() + Send + Sync>) -> ListenerId {
        self.value.add_change_listener(listener)
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        self.removals.fetch_add(1, Ordering::SeqCst);
        self.value.remove_listener(id)
    }

    fn on_dispose(&self, callback: Box<dyn FnOnce() + Send>) {
        self.value.on_dispose(callback)
    }
}

#[tokio::test]
async fn test_source_dispose_detaches_resource() -> Result<(), ResourceError> {
    let mock = MockFetcher::returning(1);
    let source = CountingSource::default();
    let resource: Resource<i32> = Resource::builder()
        .fetcher(mock.fetcher())
        .source(source.clone())
        .build()?;

    resource.resolve()?;
    resource.settled().await;
    assert_eq!(source.value.listener_count(), 1);

    source.value.dispose();
    assert_eq!(source.removals.load(Ordering::SeqCst), 1);
    assert_eq!(source.value.listener_count(), 0);

    // Already detached, so disposing the resource leaves the source alone.
    resource.dispose();
    assert_eq!(source.removals.load(Ordering::SeqCst), 1);
    assert_eq!(mock.calls(), 1);
    Ok(())
}

#[tokio::test]
async fn test_resolve_with_disposed_source_detaches_at_once() -> Result<(), ResourceError> {
    let source = CountingSource::default();
    source.value.dispose();
    let resource: Resource<i32> = Resource::builder()
        .fetcher(|| async { 2 })
        .source(source.clone())
        .build()?;

    resource.resolve()?;
    assert_eq!(source.removals.load(Ordering::SeqCst), 1);
    assert_eq!(resource.settled().await, ResourceState::ready(2));
    Ok(())
}

#[tokio::test]
async fn test_settled_does_not_wait_on_unresolved() {
    let resource: Resource<i32> = Resource::from_fetcher(|| async { 1 });
    assert_eq!(resource.settled().await, ResourceState::Unresolved);
}

#[tokio::test]
async fn test_settled_ends_when_disposed() -> Result<(), ResourceError> {
    let mock = MockFetcher::returning(5).gated();
    let resource: Resource<i32> = Resource::from_fetcher(mock.fetcher());
    resource.resolve()?;

    let disposer = resource.clone();
    let (state, ()) = tokio::join!(resource.settled(), async move {
        drain_tasks().await;
        disposer.dispose();
    });
    assert_eq!(state, ResourceState::Loading);
    assert_eq!(resource.settled().await, ResourceState::Loading);
    Ok(())
}

#[tokio::test]
async fn test_operations_after_dispose() {
    let resource: Resource<i32> = Resource::from_fetcher(|| async { 1 });
    let disposed = Arc::new(AtomicUsize::new(0));
    let d = disposed.clone();
    resource.on_dispose(move || {
        d.fetch_add(1, Ordering::SeqCst);
    });

    resource.dispose();
    resource.dispose();

    assert!(resource.is_disposed());
    assert_eq!(disposed.load(Ordering::SeqCst), 1);
    assert_eq!(resource.resolve(), Err(ResourceError::Disposed));
    assert_eq!(resource.refetch(), Err(ResourceError::Disposed));
}

#[tokio::test]
async fn test_latest_refetch_wins() -> Result<(), ResourceError> {
    let mock = MockFetcher::new().gated();
    mock.push_ok(1).push_ok(2).push_ok(3);
    let resource: Resource<i32> = Resource::from_fetcher(mock.fetcher());

    resource.resolve()?;
    mock.release(0);
    assert_eq!(resource.settled().await, ResourceState::ready(1));

    resource.refetch()?;
    resource.refetch()?;
    assert_eq!(resource.state(), ResourceState::refreshing(1));

    mock.release(2);
    drain_tasks().await;
    assert_eq!(resource.state(), ResourceState::ready(3));

    // The older fetch settles last and must not overwrite the newer result.
    mock.release(1);
    drain_tasks().await;
    assert_eq!(resource.state(), ResourceState::ready(3));
    Ok(())
}

#[tokio::test]
async fn test_last_settled_policy_keeps_the_race() -> Result<(), ResourceError> {
    let mock = MockFetcher::new().gated();
    mock.push_ok(1).push_ok(2).push_ok(3);
    let resource: Resource<i32> = Resource::builder()
        .fetcher(mock.fetcher())
        .refetch_policy(RefetchPolicy::LastSettled)
        .build()?;

    resource.resolve()?;
    mock.release(0);
    resource.settled().await;

    resource.refetch()?;
    resource.refetch()?;
    mock.release(2);
    drain_tasks().await;
    assert_eq!(resource.state(), ResourceState::ready(3));

    mock.release(1);
    drain_tasks().await;
    assert_eq!(resource.state(), ResourceState::ready(2));
    Ok(())
}

#[tokio::test]
async fn test_capture_traces() -> Result<(), ResourceError> {
    let resource: Resource<i32> = Resource::builder()
        .fetcher(|| async { Err::<i32, _>("boom") })
        .capture_traces(true)
        .label("traced")
        .build()?;
    assert_eq!(resource.config().label, "traced");

    resource.resolve()?;
    let state = resource.settled().await;
    let error = state.as_error().cloned().unwrap();
    assert_eq!(error.error, FetchError::error("boom"));
    assert!(error.trace.is_some());
    Ok(())
}

#[tokio::test]
async fn test_builder_requires_exactly_one_driver() {
    let neither = Resource::<i32>::builder().build();
    assert!(matches!(neither, Err(ResourceError::Configuration(_))));

    let (_controller, stream) = crate::mock::push_stream::<i32>();
    let both = Resource::<i32>::builder()
        .fetcher(|| async { 1 })
        .stream(stream)
        .build();
    assert!(matches!(both, Err(ResourceError::Configuration(_))));

    let (_controller, stream) = crate::mock::push_stream::<i32>();
    let stream_with_source = Resource::<i32>::builder()
        .stream(stream)
        .source(ObservableValue::new(0))
        .build();
    assert!(stream_with_source.unwrap_err().is_configuration());
}

#[test]
fn test_resolve_without_runtime() {
    let resource: Resource<i32> = Resource::from_fetcher(|| async { 1 });
    assert_eq!(resource.resolve(), Err(ResourceError::NoRuntime));
    assert!(!resource.is_resolved());
    assert_eq!(resource.state(), ResourceState::Unresolved);
}

#[test]
fn test_explicit_runtime() -> Result<(), ResourceError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    let resource: Resource<i32> = Resource::builder()
        .fetcher(|| async { 8 })
        .runtime(runtime.handle().clone())
        .build()?;

    resource.resolve()?;
    assert_eq!(resource.state(), ResourceState::Loading);
    assert_eq!(runtime.block_on(resource.settled()), ResourceState::ready(8));
    Ok(())
}

#[tokio::test]
async fn test_resource_drives_another_resource() -> Result<(), ResourceError> {
    let upstream: Resource<i32> = Resource::from_fetcher(|| async { 1 });
    let downstream_fetches = MockFetcher::returning("profile".to_string());
    let downstream: Resource<String> = Resource::builder()
        .fetcher(downstream_fetches.fetcher())
        .source(upstream.clone())
        .build()?;

    downstream.resolve()?;
    downstream.settled().await;
    assert_eq!(downstream_fetches.calls(), 1);

    // Loading and Ready of the upstream resource are two changes.
    upstream.resolve()?;
    upstream.settled().await;
    assert_eq!(downstream_fetches.calls(), 3);
    Ok(())
}
