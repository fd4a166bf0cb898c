use crate::{ErrorState, FetchError, ReadyState, ResourceError, ResourceState, Trace};

type Handler<'a, R> = Box<dyn FnOnce() -> R + 'a>;

impl<T> ResourceState<T> {
    /// Exhaustive projection over unwrapped payload fields.
    ///
    /// There is deliberately no `Unresolved` handler: projecting a resource
    /// that was never resolved fails with [`ResourceError::Projection`].
    pub fn on<R>(
        &self,
        ready: impl FnOnce(&T, bool) -> R,
        error: impl FnOnce(&FetchError, Option<&Trace>) -> R,
        loading: impl FnOnce() -> R,
    ) -> Result<R, ResourceError> {
        match self {
            ResourceState::Unresolved => Err(ResourceError::Projection),
            ResourceState::Loading => Ok(loading()),
            ResourceState::Ready(state) => Ok(ready(&state.value, state.refreshing)),
            ResourceState::Error(state) => Ok(error(&state.error, state.trace.as_ref())),
        }
    }

    /// Exhaustive projection over whole variant payloads.
    pub fn map<R>(
        &self,
        ready: impl FnOnce(&ReadyState<T>) -> R,
        error: impl FnOnce(&ErrorState) -> R,
        loading: impl FnOnce() -> R,
    ) -> Result<R, ResourceError> {
        match self {
            ResourceState::Unresolved => Err(ResourceError::Projection),
            ResourceState::Loading => Ok(loading()),
            ResourceState::Ready(state) => Ok(ready(state)),
            ResourceState::Error(state) => Ok(error(state)),
        }
    }

    /// Partial projection over payload fields. Unhandled phases fall through
    /// to the closure given to [`PartialOn::or_else`].
    pub fn maybe_on<'a, R>(&'a self) -> PartialOn<'a, T, R> {
        PartialOn {
            state: self,
            unresolved: None,
            loading: None,
            ready: None,
            error: None,
        }
    }

    /// Partial projection over whole variant payloads.
    pub fn maybe_map<'a, R>(&'a self) -> PartialMap<'a, T, R> {
        PartialMap {
            state: self,
            unresolved: None,
            loading: None,
            ready: None,
            error: None,
        }
    }
}

#[must_use = "a partial projection does nothing until `or_else` is called"]
pub struct PartialOn<'a, T, R> {
    state: &'a ResourceState<T>,
    unresolved: Option<Handler<'a, R>>,
    loading: Option<Handler<'a, R>>,
    ready: Option<Box<dyn FnOnce(&'a T, bool) -> R + 'a>>,
    error: Option<Box<dyn FnOnce(&'a FetchError, Option<&'a Trace>) -> R + 'a>>,
}

impl<'a, T, R> PartialOn<'a, T, R> {
    pub fn unresolved(mut self, handler: impl FnOnce() -> R + 'a) -> Self {
        self.unresolved = Some(Box::new(handler));
        self
    }

    pub fn loading(mut self, handler: impl FnOnce() -> R + 'a) -> Self {
        self.loading = Some(Box::new(handler));
        self
    }

    pub fn ready(mut self, handler: impl FnOnce(&'a T, bool) -> R + 'a) -> Self {
        self.ready = Some(Box::new(handler));
        self
    }

    pub fn error(
        mut self,
        handler: impl FnOnce(&'a FetchError, Option<&'a Trace>) -> R + 'a,
    ) -> Self {
        self.error = Some(Box::new(handler));
        self
    }

    pub fn or_else(self, fallback: impl FnOnce() -> R) -> R {
        match (self.state, self) {
            (ResourceState::Unresolved, PartialOn { unresolved: Some(f), .. }) => f(),
            (ResourceState::Loading, PartialOn { loading: Some(f), .. }) => f(),
            (ResourceState::Ready(state), PartialOn { ready: Some(f), .. }) => {
                f(&state.value, state.refreshing)
            }
            (ResourceState::Error(state), PartialOn { error: Some(f), .. }) => {
                f(&state.error, state.trace.as_ref())
            }
            _ => fallback(),
        }
    }
}

#[must_use = "a partial projection does nothing until `or_else` is called"]
pub struct PartialMap<'a, T, R> {
    state: &'a ResourceState<T>,
    unresolved: Option<Handler<'a, R>>,
    loading: Option<Handler<'a, R>>,
    ready: Option<Box<dyn FnOnce(&'a ReadyState<T>) -> R + 'a>>,
    error: Option<Box<dyn FnOnce(&'a ErrorState) -> R + 'a>>,
}

impl<'a, T, R> PartialMap<'a, T, R> {
    pub fn unresolved(mut self, handler: impl FnOnce() -> R + 'a) -> Self {
        self.unresolved = Some(Box::new(handler));
        self
    }

    pub fn loading(mut self, handler: impl FnOnce() -> R + 'a) -> Self {
        self.loading = Some(Box::new(handler));
        self
    }

    pub fn ready(mut self, handler: impl FnOnce(&'a ReadyState<T>) -> R + 'a) -> Self {
        self.ready = Some(Box::new(handler));
        self
    }

    pub fn error(mut self, handler: impl FnOnce(&'a ErrorState) -> R + 'a) -> Self {
        self.error = Some(Box::new(handler));
        self
    }

    pub fn or_else(self, fallback: impl FnOnce() -> R) -> R {
        match (self.state, self) {
            (ResourceState::Unresolved, PartialMap { unresolved: Some(f), .. }) => f(),
            (ResourceState::Loading, PartialMap { loading: Some(f), .. }) => f(),
            (ResourceState::Ready(state), PartialMap { ready: Some(f), .. }) => f(state),
            (ResourceState::Error(state), PartialMap { error: Some(f), .. }) => f(state),
            _ => fallback(),
        }
    }
}
