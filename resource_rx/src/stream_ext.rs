use crate::{FetchOutcome, ResourceState};
use futures_core::stream::Stream;
use pin_project::pin_project;
use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Stream adapters used to drive and observe resources.
pub trait ResourceStreamExt: Stream {
    /// Maps every item of a driving stream to the state it produces: values
    /// become `Ready`, failures become `Error`.
    fn into_states<T>(self) -> IntoStates<Self, T>
    where
        Self::Item: FetchOutcome<T>,
        Self: Sized,
    {
        IntoStates {
            stream: self,
            _value: PhantomData,
        }
    }

    /// Yields items up to and including the first one matching `last`, then ends.
    ///
    /// ```
    /// use futures_signals::signal::Mutable;
    /// use resource_rx::{ResourceState, ResourceStreamExt};
    /// use futures_signals::signal::SignalExt;
    ///
    /// let state = Mutable::new(ResourceState::<u32>::Loading);
    /// let _settled = state
    ///     .signal_cloned()
    ///     .to_stream()
    ///     .until(|state| state.is_settled());
    /// ```
    fn until<F>(self, last: F) -> Until<Self, F>
    where
        F: FnMut(&Self::Item) -> bool,
        Self: Sized,
    {
        Until {
            stream: self,
            done: false,
            last,
        }
    }
}

impl<S: ?Sized> ResourceStreamExt for S where S: Stream {}

#[pin_project]
#[derive(Debug)]
#[must_use = "Streams do nothing unless polled"]
pub struct IntoStates<S, T> {
    #[pin]
    stream: S,
    _value: PhantomData<fn() -> T>,
}

impl<S, T> Stream for IntoStates<S, T>
where
    S: Stream,
    S::Item: FetchOutcome<T>,
{
    type Item = ResourceState<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.project()
            .stream
            .poll_next(cx)
            .map(|item| item.map(<S::Item as FetchOutcome<T>>::into_state))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.stream.size_hint()
    }
}

#[pin_project(project = UntilProj)]
#[derive(Debug)]
#[must_use = "Streams do nothing unless polled"]
pub struct Until<S, F> {
    #[pin]
    stream: S,
    done: bool,
    last: F,
}

impl<S, F> Stream for Until<S, F>
where
    S: Stream,
    F: FnMut(&S::Item) -> bool,
{
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let UntilProj { stream, done, last } = self.project();
        if *done {
            return Poll::Ready(None);
        }
        let item = match stream.poll_next(cx) {
            Poll::Pending => return Poll::Pending,
            Poll::Ready(item) => item,
        };
        match &item {
            Some(value) => *done = last(value),
            None => *done = true,
        }
        Poll::Ready(item)
    }
}

/// Awaits the next item of a pinned stream.
pub(crate) async fn next_item<S>(stream: &mut Pin<Box<S>>) -> Option<S::Item>
where
    S: Stream + ?Sized,
{
    std::future::poll_fn(|cx| stream.as_mut().poll_next(cx)).await
}
