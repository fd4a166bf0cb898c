use thiserror::Error;

/// A data-layer failure captured into a resource's `Error` state.
///
/// Fetchers and streams never surface these as `Err` from `resolve` or
/// `refetch`; they only come back out through [`ResourceState::value`]
/// or an exhaustive projection.
///
/// [`ResourceState::value`]: crate::ResourceState::value
#[derive(Error, Debug, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FetchError {
    /// The driver failed with an error describing what went wrong.
    #[error("{0}")]
    Error(String),

    /// The driver produced `None` where a value was expected.
    #[error("Operation returned None!")]
    None,
}

impl FetchError {
    pub fn error(message: impl Into<String>) -> Self {
        FetchError::Error(message.into())
    }

    /// Returns true if the driver produced `None`.
    pub fn is_none(&self) -> bool {
        matches!(self, FetchError::None)
    }

    /// Returns true if this is a general error with a message.
    pub fn is_error(&self) -> bool {
        matches!(self, FetchError::Error(_))
    }

    pub fn message(&self) -> String {
        self.to_string()
    }
}

/// Caller errors: operations invoked in the wrong order or on the wrong kind
/// of resource. These are returned immediately and never captured into state.
#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum ResourceError {
    /// The builder did not receive exactly one driver.
    #[error("invalid resource configuration: {0}")]
    Configuration(&'static str),

    /// The operation is not allowed in the resource's current lifecycle phase.
    #[error("invalid resource state: {0}")]
    InvalidState(&'static str),

    /// An exhaustive projection hit the `Unresolved` state.
    #[error("cannot project an unresolved resource")]
    Projection,

    #[error("resource has been disposed")]
    Disposed,

    /// No tokio runtime was configured or current when the driver had to be spawned.
    #[error("no tokio runtime available to drive the resource")]
    NoRuntime,
}

impl ResourceError {
    pub fn is_configuration(&self) -> bool {
        matches!(self, ResourceError::Configuration(_))
    }

    pub fn is_invalid_state(&self) -> bool {
        matches!(self, ResourceError::InvalidState(_))
    }

    pub fn is_projection(&self) -> bool {
        matches!(self, ResourceError::Projection)
    }

    pub fn is_disposed(&self) -> bool {
        matches!(self, ResourceError::Disposed)
    }
}
