//! Test doubles for resource drivers.
//!
//! [`MockFetcher`] serves scripted outcomes and can hold every call until the
//! test releases it, which makes settlement order deterministic.
//! [`push_stream`] returns a push source and its controller.

use futures_core::stream::Stream;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;

type MockOutcome<T> = Result<T, String>;
type MockFetch<T> = Pin<Box<dyn Future<Output = MockOutcome<T>> + Send>>;

struct MockFetcherInner<T> {
    /// Served front to back, one per call.
    outcomes: VecDeque<MockOutcome<T>>,
    /// Served once `outcomes` is exhausted.
    fallback: Option<MockOutcome<T>>,
    calls: usize,
    gated: bool,
    /// One gate per call, by call index. Taken when released.
    gates: Vec<Option<oneshot::Sender<()>>>,
}

/// A scripted fetcher.
pub struct MockFetcher<T> {
    inner: Arc<Mutex<MockFetcherInner<T>>>,
}

impl<T> Clone for MockFetcher<T> {
    fn clone(&self) -> Self {
        MockFetcher {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Default for MockFetcher<T>
where
    T: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> MockFetcher<T>
where
    T: Clone + Send + 'static,
{
    pub fn new() -> Self {
        MockFetcher {
            inner: Arc::new(Mutex::new(MockFetcherInner {
                outcomes: VecDeque::new(),
                fallback: None,
                calls: 0,
                gated: false,
                gates: Vec::new(),
            })),
        }
    }

    /// A fetcher that always succeeds with `value`.
    pub fn returning(value: T) -> Self {
        let mock = Self::new();
        mock.lock().fallback = Some(Ok(value));
        mock
    }

    /// A fetcher that always fails with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        let mock = Self::new();
        mock.lock().fallback = Some(Err(message.into()));
        mock
    }

    fn lock(&self) -> MutexGuard<'_, MockFetcherInner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hold every call until it is released with [`release`](Self::release).
    pub fn gated(self) -> Self {
        self.lock().gated = true;
        self
    }

    pub fn push_ok(&self, value: T) -> &Self {
        self.lock().outcomes.push_back(Ok(value));
        self
    }

    pub fn push_err(&self, message: impl Into<String>) -> &Self {
        self.lock().outcomes.push_back(Err(message.into()));
        self
    }

    pub fn calls(&self) -> usize {
        self.lock().calls
    }

    /// Lets the `call`-th fetch (zero based) settle. Returns false if there is
    /// no such pending call.
    pub fn release(&self, call: usize) -> bool {
        let gate = self.lock().gates.get_mut(call).and_then(Option::take);
        match gate {
            Some(gate) => gate.send(()).is_ok(),
            None => false,
        }
    }

    /// Lets every pending fetch settle and stops gating new ones.
    pub fn release_all(&self) {
        let gates: Vec<_> = {
            let mut inner = self.lock();
            inner.gated = false;
            inner.gates.iter_mut().filter_map(Option::take).collect()
        };
        for gate in gates {
            let _ = gate.send(());
        }
    }

    fn call(&self) -> MockFetch<T> {
        let (outcome, gate) = {
            let mut inner = self.lock();
            inner.calls += 1;
            let outcome = inner
                .outcomes
                .pop_front()
                .or_else(|| inner.fallback.clone())
                .unwrap_or_else(|| Err("no mocked outcome".to_string()));
            let gate = if inner.gated {
                let (tx, rx) = oneshot::channel();
                inner.gates.push(Some(tx));
                Some(rx)
            } else {
                inner.gates.push(None);
                None
            };
            (outcome, gate)
        };
        Box::pin(async move {
            if let Some(gate) = gate {
                if gate.await.is_err() {
                    return Err("mock fetch gate dropped".to_string());
                }
            }
            outcome
        })
    }

    /// The fetch function to hand to a resource.
    pub fn fetcher(&self) -> impl Fn() -> MockFetch<T> + Send + Sync + 'static {
        let mock = self.clone();
        move || mock.call()
    }
}

/// Creates a push source and the controller that feeds it.
pub fn push_stream<T>() -> (PushController<T>, PushStream<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (PushController { tx }, PushStream { rx })
}

/// Feeds a [`PushStream`]. Dropping every controller ends the stream.
pub struct PushController<T> {
    tx: UnboundedSender<MockOutcome<T>>,
}

impl<T> Clone for PushController<T> {
    fn clone(&self) -> Self {
        PushController {
            tx: self.tx.clone(),
        }
    }
}

impl<T> PushController<T> {
    /// Returns false once the stream has been dropped.
    pub fn emit(&self, value: T) -> bool {
        self.tx.send(Ok(value)).is_ok()
    }

    pub fn fail(&self, message: impl Into<String>) -> bool {
        self.tx.send(Err(message.into())).is_ok()
    }

    /// Whether the stream is still held by a consumer.
    pub fn is_attached(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// A stream of values and out-of-band errors that does not end on error.
pub struct PushStream<T> {
    rx: UnboundedReceiver<MockOutcome<T>>,
}

impl<T> Stream for PushStream<T> {
    type Item = MockOutcome<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
