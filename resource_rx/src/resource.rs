use crate::stream_ext::next_item;
use crate::{
    ChangeNotifier, ErrorState, FetchError, FetchOutcome, ListenerId, ObservableValue,
    ReadyState, RefetchPolicy, ResourceConfig, ResourceError, ResourceState, ResourceStreamExt,
    Subscription, Trace,
};
use futures_core::stream::Stream;
use futures_signals::signal::{MutableSignalCloned, SignalStream};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

type BoxFetch<T> = Pin<Box<dyn Future<Output = ResourceState<T>> + Send>>;
type Fetcher<T> = Arc<dyn Fn() -> BoxFetch<T> + Send + Sync>;
type BoxStateStream<T> = Pin<Box<dyn Stream<Item = ResourceState<T>> + Send>>;

enum Driver<T> {
    Fetcher(Fetcher<T>),
    /// Taken out when the resource is resolved.
    Stream(Mutex<Option<BoxStateStream<T>>>),
}

struct ResourceInner<T> {
    state: ObservableValue<ResourceState<T>>,
    driver: Driver<T>,
    source: Option<Arc<dyn ChangeNotifier>>,
    source_subscription: Mutex<Subscription>,
    stream_subscription: Mutex<Subscription>,
    resolved: AtomicBool,
    disposed: AtomicBool,
    /// Cancelled on dispose, ending pending `settled` waits.
    disposal: CancellationToken,
    /// Generation of the latest started fetch. Held while a fetch is started
    /// or a result is checked and stored, so both happen in one step.
    generation: Mutex<u64>,
    config: ResourceConfig,
    runtime: Option<Handle>,
}

fn lock<U>(mutex: &Mutex<U>) -> MutexGuard<'_, U> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// An observable [`ResourceState`] driven by either a fetch function or a
/// push stream.
///
/// A resource starts `Unresolved` and does nothing until [`resolve`] is
/// called. Fetch-driven resources can be refreshed with [`refetch`], either
/// directly or by every change of a source observable; stream-driven
/// resources publish one state per stream item.
///
/// Drivers run as tokio tasks. All state changes are published synchronously
/// to listeners registered with [`add_listener`].
///
/// [`resolve`]: Self::resolve
/// [`refetch`]: Self::refetch
/// [`add_listener`]: Self::add_listener
pub struct Resource<T> {
    inner: Arc<ResourceInner<T>>,
}

impl<T> Clone for Resource<T> {
    fn clone(&self) -> Self {
        Resource {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Resource<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn builder() -> ResourceBuilder<T> {
        ResourceBuilder::new()
    }

    /// See [`ResourceBuilder::fetcher`] for what the fetcher may do.
    pub fn from_fetcher<F, Fut, R>(fetcher: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: FetchOutcome<T> + 'static,
    {
        Self::from_parts(
            Driver::Fetcher(box_fetcher(fetcher)),
            None,
            ResourceConfig::default(),
            None,
        )
    }

    pub fn from_stream<S, R>(stream: S) -> Self
    where
        S: Stream<Item = R> + Send + 'static,
        R: FetchOutcome<T> + 'static,
    {
        Self::from_parts(
            Driver::Stream(Mutex::new(Some(box_stream(stream)))),
            None,
            ResourceConfig::default(),
            None,
        )
    }

    fn from_parts(
        driver: Driver<T>,
        source: Option<Arc<dyn ChangeNotifier>>,
        config: ResourceConfig,
        runtime: Option<Handle>,
    ) -> Self {
        Resource {
            inner: Arc::new(ResourceInner {
                state: ObservableValue::new(ResourceState::Unresolved),
                driver,
                source,
                source_subscription: Mutex::new(Subscription::empty()),
                stream_subscription: Mutex::new(Subscription::empty()),
                resolved: AtomicBool::new(false),
                disposed: AtomicBool::new(false),
                disposal: CancellationToken::new(),
                generation: Mutex::new(0),
                config,
                runtime,
            }),
        }
    }

    pub fn config(&self) -> &ResourceConfig {
        &self.inner.config
    }

    fn label(&self) -> &str {
        &self.inner.config.label
    }

    fn runtime(&self) -> Result<Handle, ResourceError> {
        match &self.inner.runtime {
            Some(handle) => Ok(handle.clone()),
            None => Handle::try_current().map_err(|_| ResourceError::NoRuntime),
        }
    }

    /// Starts the driver. Publishes `Loading` synchronously; the first `Ready`
    /// or `Error` arrives once the fetch settles or the stream first yields.
    ///
    /// For a fetch-driven resource with a source, every later change of the
    /// source triggers a [`refetch`](Self::refetch).
    ///
    /// Only valid while the resource is `Unresolved`, so it may be called
    /// once and not after a [`refetch`](Self::refetch) has already left that
    /// state. Otherwise it fails with [`ResourceError::InvalidState`] and
    /// leaves the resource untouched.
    pub fn resolve(&self) -> Result<(), ResourceError> {
        if self.is_disposed() {
            return Err(ResourceError::Disposed);
        }
        let runtime = self.runtime()?;
        if !self.with_state(ResourceState::is_unresolved) {
            return Err(ResourceError::InvalidState(
                "resolve() requires an unresolved resource",
            ));
        }
        if self.inner.resolved.swap(true, Ordering::AcqRel) {
            return Err(ResourceError::InvalidState(
                "resolve() may only be called once",
            ));
        }
        debug!(resource = %self.label(), "resolving");

        match &self.inner.driver {
            Driver::Fetcher(fetcher) => {
                self.start_fetch(&runtime, fetcher);
                if let Some(source) = &self.inner.source {
                    self.watch_source(source.clone());
                }
            }
            Driver::Stream(stream) => {
                let stream = lock(stream).take().ok_or(ResourceError::InvalidState(
                    "driving stream was already consumed",
                ))?;
                self.commit(ResourceState::Loading);
                self.subscribe_stream(&runtime, stream);
            }
        }
        Ok(())
    }

    /// Fetches again. A `Ready` resource keeps its value visible with
    /// `refreshing: true` until the fetch settles; any other state is
    /// replaced by `Loading`.
    ///
    /// Stream-driven resources cannot be refetched.
    pub fn refetch(&self) -> Result<(), ResourceError> {
        let Driver::Fetcher(fetcher) = &self.inner.driver else {
            return Err(ResourceError::InvalidState(
                "refetch() requires a fetcher, stream-driven resources cannot be refetched",
            ));
        };
        if self.is_disposed() {
            return Err(ResourceError::Disposed);
        }
        let runtime = self.runtime()?;
        debug!(resource = %self.label(), "refetching");
        self.start_fetch(&runtime, fetcher);
        Ok(())
    }

    /// Stops the driver and releases every listener. Pending fetches keep
    /// running but their results are dropped. Repeated calls do nothing.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!(resource = %self.label(), "disposing");
        self.inner.disposal.cancel();
        let stream_subscription = std::mem::take(&mut *lock(&self.inner.stream_subscription));
        stream_subscription.cancel();
        let source_subscription = std::mem::take(&mut *lock(&self.inner.source_subscription));
        source_subscription.cancel();
        self.inner.state.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    pub fn is_resolved(&self) -> bool {
        self.inner.resolved.load(Ordering::Acquire)
    }

    /// Stamps a new generation, publishes the interim state and calls the
    /// fetcher in one step, so fetchers run in generation order.
    fn start_fetch(&self, runtime: &Handle, fetcher: &Fetcher<T>) {
        let (generation, fetch) = {
            let mut latest = lock(&self.inner.generation);
            *latest += 1;
            self.store(self.inner.state.with(ResourceState::to_refreshing));
            (*latest, fetcher())
        };
        self.inner.state.deliver();

        let resource = Arc::downgrade(&self.inner);
        runtime.spawn(async move {
            let outcome = fetch.await;
            match upgrade(&resource) {
                Some(resource) => resource.settle(generation, outcome),
                None => trace!(generation, "resource dropped before fetch settled"),
            }
        });
    }

    fn settle(&self, generation: u64, outcome: ResourceState<T>) {
        let outcome = self.annotate(outcome);
        {
            let latest = lock(&self.inner.generation);
            if self.inner.config.refetch_policy == RefetchPolicy::LatestWins
                && *latest != generation
            {
                debug!(
                    resource = %self.label(),
                    generation,
                    latest = *latest,
                    "discarding stale fetch result"
                );
                return;
            }
            self.store(outcome);
        }
        self.inner.state.deliver();
    }

    fn watch_source(&self, source: Arc<dyn ChangeNotifier>) {
        let resource = Arc::downgrade(&self.inner);
        let label = self.label().to_string();
        let id = source.add_change_listener(Arc::new(move || {
            let Some(resource) = upgrade(&resource) else {
                return;
            };
            if let Err(error) = resource.refetch() {
                warn!(resource = %label, %error, "source change could not start a refetch");
            }
        }));
        debug!(resource = %self.label(), ?id, "watching source");
        let watched = source.clone();
        *lock(&self.inner.source_subscription) = Subscription::new(move || {
            watched.remove_listener(id);
        });

        let resource = Arc::downgrade(&self.inner);
        source.on_dispose(Box::new(move || {
            let Some(resource) = upgrade(&resource) else {
                return;
            };
            debug!(resource = %resource.label(), "source disposed, detaching");
            let subscription = std::mem::take(&mut *lock(&resource.inner.source_subscription));
            subscription.cancel();
        }));
    }

    fn subscribe_stream(&self, runtime: &Handle, mut stream: BoxStateStream<T>) {
        let token = CancellationToken::new();
        let task_token = token.clone();
        let resource = Arc::downgrade(&self.inner);
        let label = self.label().to_string();
        let task = runtime.spawn(async move {
            loop {
                let next = tokio::select! {
                    biased;
                    _ = task_token.cancelled() => break,
                    next = next_item(&mut stream) => next,
                };
                let Some(state) = next else {
                    debug!(resource = %label, "driving stream ended");
                    break;
                };
                if task_token.is_cancelled() {
                    break;
                }
                let Some(resource) = upgrade(&resource) else {
                    break;
                };
                resource.commit(resource.annotate(state));
            }
        });
        *lock(&self.inner.stream_subscription) = Subscription::new(move || {
            token.cancel();
            task.abort();
        });
    }

    fn annotate(&self, state: ResourceState<T>) -> ResourceState<T> {
        match state {
            ResourceState::Error(ErrorState { error, trace: None })
                if self.inner.config.capture_traces =>
            {
                ResourceState::fail_with_trace(error, Trace::capture())
            }
            other => other,
        }
    }

    fn commit(&self, next: ResourceState<T>) {
        self.store(next);
        self.inner.state.deliver();
    }

    /// The single writer of the resource state. Writes after dispose are
    /// dropped. Listeners hear stored states on the next `deliver`.
    fn store(&self, next: ResourceState<T>) {
        if self.is_disposed() {
            debug!(resource = %self.label(), to = next.tag(), "dropping state write after dispose");
            return;
        }
        let from = self.inner.state.with(ResourceState::tag);
        debug!(resource = %self.label(), from, to = next.tag(), "state transition");
        self.inner.state.store(next);
    }

    /// Resolves to the first state that is `Ready` without a refetch in
    /// flight, or `Error`.
    ///
    /// Returns the current state without waiting while the resource is
    /// `Unresolved` or disposed, and returns the state at disposal if the
    /// resource is disposed while waiting. Callers that need a final state
    /// check [`ResourceState::is_settled`] on the result.
    pub async fn settled(&self) -> ResourceState<T> {
        if self.is_disposed() || self.with_state(ResourceState::is_unresolved) {
            return self.state();
        }
        let mut states = Box::pin(self.to_stream().until(ResourceState::is_settled));
        let mut last = self.state();
        loop {
            tokio::select! {
                biased;
                next = next_item(&mut states) => match next {
                    Some(state) => last = state,
                    None => return last,
                },
                _ = self.inner.disposal.cancelled() => return self.state(),
            }
        }
    }

    pub fn state(&self) -> ResourceState<T> {
        self.inner.state.get()
    }

    pub fn with_state<R>(&self, f: impl FnOnce(&ResourceState<T>) -> R) -> R {
        self.inner.state.with(f)
    }

    pub fn is_loading(&self) -> bool {
        self.with_state(ResourceState::is_loading)
    }

    pub fn is_refreshing(&self) -> bool {
        self.with_state(ResourceState::is_refreshing)
    }

    pub fn is_ready(&self) -> bool {
        self.with_state(ResourceState::is_ready)
    }

    pub fn has_error(&self) -> bool {
        self.with_state(ResourceState::has_error)
    }

    pub fn as_ready(&self) -> Option<ReadyState<T>> {
        self.with_state(|state| state.as_ready().cloned())
    }

    pub fn as_error(&self) -> Option<ErrorState> {
        self.with_state(|state| state.as_error().cloned())
    }

    /// The current value; the stored error if the resource failed.
    pub fn value(&self) -> Result<Option<T>, FetchError> {
        self.with_state(ResourceState::value)
    }

    pub fn error(&self) -> Option<FetchError> {
        self.with_state(ResourceState::error)
    }

    pub fn add_listener(
        &self,
        listener: impl Fn(&ResourceState<T>) + Send + Sync + 'static,
    ) -> ListenerId {
        self.inner.state.add_listener(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.state.remove_listener(id)
    }

    pub fn subscribe(
        &self,
        listener: impl Fn(&ResourceState<T>) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.state.subscribe(listener)
    }

    pub fn listener_count(&self) -> usize {
        self.inner.state.listener_count()
    }

    pub fn on_dispose(&self, callback: impl FnOnce() + Send + 'static) {
        self.inner.state.on_dispose(callback)
    }

    pub fn to_signal(&self) -> MutableSignalCloned<ResourceState<T>> {
        self.inner.state.to_signal()
    }

    pub fn to_stream(&self) -> SignalStream<MutableSignalCloned<ResourceState<T>>> {
        self.inner.state.to_stream()
    }
}

fn upgrade<T>(resource: &Weak<ResourceInner<T>>) -> Option<Resource<T>> {
    resource.upgrade().map(|inner| Resource { inner })
}

fn box_fetcher<T, F, Fut, R>(fetcher: F) -> Fetcher<T>
where
    T: 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: FetchOutcome<T> + 'static,
{
    Arc::new(move || {
        let fetch = fetcher();
        Box::pin(async move { <R as FetchOutcome<T>>::into_state(fetch.await) }) as BoxFetch<T>
    })
}

fn box_stream<T, S, R>(stream: S) -> BoxStateStream<T>
where
    T: 'static,
    S: Stream<Item = R> + Send + 'static,
    R: FetchOutcome<T> + 'static,
{
    Box::pin(stream.into_states::<T>())
}

impl<T> ChangeNotifier for Resource<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn add_change_listener(&self, listener: Arc<dyn Fn() + Send + Sync>) -> ListenerId {
        self.add_listener(move |_| listener())
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        Resource::remove_listener(self, id)
    }

    fn on_dispose(&self, callback: Box<dyn FnOnce() + Send>) {
        Resource::on_dispose(self, callback)
    }
}

impl<T> fmt::Debug for Resource<T>
where
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let driver = match self.inner.driver {
            Driver::Fetcher(_) => "fetcher",
            Driver::Stream(_) => "stream",
        };
        f.debug_struct("Resource")
            .field("label", &self.inner.config.label)
            .field("driver", &driver)
            .field("state", &self.inner.state)
            .finish_non_exhaustive()
    }
}

/// Configures a [`Resource`]. Exactly one of [`fetcher`](Self::fetcher) or
/// [`stream`](Self::stream) must be supplied.
pub struct ResourceBuilder<T> {
    fetcher: Option<Fetcher<T>>,
    stream: Option<BoxStateStream<T>>,
    source: Option<Arc<dyn ChangeNotifier>>,
    config: ResourceConfig,
    runtime: Option<Handle>,
}

impl<T> Default for ResourceBuilder<T> {
    fn default() -> Self {
        ResourceBuilder {
            fetcher: None,
            stream: None,
            source: None,
            config: ResourceConfig::default(),
            runtime: None,
        }
    }
}

impl<T> ResourceBuilder<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// The fetcher is called synchronously while the fetch is being ordered
    /// against other fetches of this resource. It must not call `refetch` or
    /// `resolve` on the same resource before returning its future.
    pub fn fetcher<F, Fut, R>(mut self, fetcher: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: FetchOutcome<T> + 'static,
    {
        self.fetcher = Some(box_fetcher(fetcher));
        self
    }

    pub fn stream<S, R>(mut self, stream: S) -> Self
    where
        S: Stream<Item = R> + Send + 'static,
        R: FetchOutcome<T> + 'static,
    {
        self.stream = Some(box_stream(stream));
        self
    }

    /// Refetch on every change of `source`. Only valid with a fetcher.
    pub fn source(mut self, source: impl ChangeNotifier + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.config.label = label.into();
        self
    }

    pub fn refetch_policy(mut self, refetch_policy: RefetchPolicy) -> Self {
        self.config.refetch_policy = refetch_policy;
        self
    }

    pub fn capture_traces(mut self, capture_traces: bool) -> Self {
        self.config.capture_traces = capture_traces;
        self
    }

    pub fn config(mut self, config: ResourceConfig) -> Self {
        self.config = config;
        self
    }

    /// Spawn drivers on this runtime instead of the one current at `resolve`.
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn build(self) -> Result<Resource<T>, ResourceError> {
        let driver = match (self.fetcher, self.stream) {
            (Some(fetcher), None) => Driver::Fetcher(fetcher),
            (None, Some(stream)) => {
                if self.source.is_some() {
                    return Err(ResourceError::Configuration(
                        "a source observable requires a fetcher",
                    ));
                }
                Driver::Stream(Mutex::new(Some(stream)))
            }
            (None, None) => {
                return Err(ResourceError::Configuration(
                    "either a fetcher or a stream is required",
                ))
            }
            (Some(_), Some(_)) => {
                return Err(ResourceError::Configuration(
                    "a fetcher and a stream are mutually exclusive",
                ))
            }
        };
        Ok(Resource::from_parts(
            driver,
            self.source,
            self.config,
            self.runtime,
        ))
    }
}
