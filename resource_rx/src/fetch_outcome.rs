use crate::{FetchError, ResourceState};

/// What a fetcher future resolves to, or what a driving stream yields.
///
/// Plain values become `Ready`, `Err` becomes `Error` with the error's
/// message, and `None` becomes `Error(FetchError::None)`.
pub trait FetchOutcome<T> {
    fn into_state(self) -> ResourceState<T>;
}

impl<T> FetchOutcome<T> for T {
    fn into_state(self) -> ResourceState<T> {
        ResourceState::ready(self)
    }
}

impl<T, E> FetchOutcome<T> for Result<T, E>
where
    E: ToString,
{
    fn into_state(self) -> ResourceState<T> {
        match self {
            Ok(value) => ResourceState::ready(value),
            Err(error) => ResourceState::fail(FetchError::Error(error.to_string())),
        }
    }
}

impl<T> FetchOutcome<T> for Option<T> {
    fn into_state(self) -> ResourceState<T> {
        match self {
            Some(value) => ResourceState::ready(value),
            None => ResourceState::fail(FetchError::None),
        }
    }
}
