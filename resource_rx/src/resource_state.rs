use crate::FetchError;
use std::backtrace::Backtrace;
use std::fmt;
use std::sync::Arc;

/// A rendered stack trace attached to an [`ErrorState`].
///
/// Stored as text so that states stay `Clone` and compare structurally.
#[derive(Clone, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Trace(Arc<str>);

impl Trace {
    pub fn new(trace: impl Into<Arc<str>>) -> Self {
        Trace(trace.into())
    }

    /// Captures the current call stack regardless of `RUST_BACKTRACE`.
    pub fn capture() -> Self {
        Trace(Backtrace::force_capture().to_string().into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Full traces drown test output.
        match self.0.lines().next() {
            Some(first) => write!(f, "Trace({first} ..)"),
            None => f.write_str("Trace(<empty>)"),
        }
    }
}

impl fmt::Display for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Payload of the `Ready` phase.
#[derive(Debug, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReadyState<T> {
    pub value: T,
    /// A refetch is in flight and `value` is stale.
    pub refreshing: bool,
}

/// Payload of the `Error` phase.
#[derive(Debug, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ErrorState {
    pub error: FetchError,
    pub trace: Option<Trace>,
}

impl ErrorState {
    pub fn new(error: FetchError) -> Self {
        ErrorState { error, trace: None }
    }

    pub fn with_trace(self, trace: Trace) -> Self {
        ErrorState {
            trace: Some(trace),
            ..self
        }
    }
}

/// The lifecycle of one asynchronous data source.
///
/// A resource starts `Unresolved`, moves to `Loading` when resolved, and from
/// then on alternates between `Ready` and `Error`. `Unresolved` is never
/// re-entered. Equality is structural, so consumers can diff successive states.
#[derive(Debug, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ResourceState<T> {
    Unresolved,
    Loading,
    Ready(ReadyState<T>),
    Error(ErrorState),
}

impl<T> ResourceState<T> {
    pub fn ready(value: T) -> Self {
        ResourceState::Ready(ReadyState {
            value,
            refreshing: false,
        })
    }

    pub fn refreshing(value: T) -> Self {
        ResourceState::Ready(ReadyState {
            value,
            refreshing: true,
        })
    }

    pub fn fail(error: FetchError) -> Self {
        ResourceState::Error(ErrorState::new(error))
    }

    pub fn fail_with_message(message: impl Into<String>) -> Self {
        ResourceState::fail(FetchError::Error(message.into()))
    }

    pub fn fail_with_trace(error: FetchError, trace: Trace) -> Self {
        ResourceState::Error(ErrorState::new(error).with_trace(trace))
    }

    pub fn is_unresolved(&self) -> bool {
        matches!(self, ResourceState::Unresolved)
    }

    /// True only for the bare `Loading` phase; see [`is_refreshing`](Self::is_refreshing)
    /// for a refetch that keeps stale data visible.
    pub fn is_loading(&self) -> bool {
        matches!(self, ResourceState::Loading)
    }

    pub fn is_refreshing(&self) -> bool {
        matches!(
            self,
            ResourceState::Ready(ReadyState {
                refreshing: true,
                ..
            })
        )
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, ResourceState::Ready(_))
    }

    pub fn has_error(&self) -> bool {
        matches!(self, ResourceState::Error(_))
    }

    /// Ready with no refetch in flight, or failed.
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            ResourceState::Ready(ReadyState {
                refreshing: false,
                ..
            }) | ResourceState::Error(_)
        )
    }

    pub fn as_ready(&self) -> Option<&ReadyState<T>> {
        match self {
            ResourceState::Ready(ready) => Some(ready),
            _ => None,
        }
    }

    pub fn as_error(&self) -> Option<&ErrorState> {
        match self {
            ResourceState::Error(error) => Some(error),
            _ => None,
        }
    }

    pub fn value_ref(&self) -> Result<Option<&T>, FetchError> {
        match self {
            ResourceState::Ready(ready) => Ok(Some(&ready.value)),
            ResourceState::Error(error) => Err(error.error.clone()),
            ResourceState::Unresolved | ResourceState::Loading => Ok(None),
        }
    }

    /// Unsafe accessor: the stored error comes back as `Err`, a missing value
    /// as `Ok(None)`.
    pub fn value(&self) -> Result<Option<T>, FetchError>
    where
        T: Clone,
    {
        self.value_ref().map(|value| value.cloned())
    }

    pub fn error(&self) -> Option<FetchError> {
        self.as_error().map(|error| error.error.clone())
    }

    /// Short phase name, used in log fields.
    pub fn tag(&self) -> &'static str {
        match self {
            ResourceState::Unresolved => "unresolved",
            ResourceState::Loading => "loading",
            ResourceState::Ready(ReadyState {
                refreshing: true, ..
            }) => "refreshing",
            ResourceState::Ready(_) => "ready",
            ResourceState::Error(_) => "error",
        }
    }

    /// The state a refetch publishes before its fetch settles: the same value
    /// flagged as refreshing when ready, otherwise `Loading`.
    pub(crate) fn to_refreshing(&self) -> Self
    where
        T: Clone,
    {
        match self {
            ResourceState::Ready(ready) => ResourceState::refreshing(ready.value.clone()),
            _ => ResourceState::Loading,
        }
    }
}

impl<T> Default for ResourceState<T> {
    fn default() -> Self {
        ResourceState::Unresolved
    }
}

impl<T: Clone> From<&ResourceState<T>> for Option<T> {
    fn from(state: &ResourceState<T>) -> Self {
        state.as_ready().map(|ready| ready.value.clone())
    }
}
