/// How settlements of overlapping fetches are committed.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RefetchPolicy {
    /// Each fetch is stamped with a generation; only the most recently
    /// started fetch may commit its result.
    #[default]
    LatestWins,
    /// No fencing: whichever fetch settles last overwrites the state, even
    /// if it was started first.
    LastSettled,
}

#[derive(Debug, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ResourceConfig {
    /// Name attached to every log event of the resource.
    pub label: String,
    pub refetch_policy: RefetchPolicy,
    /// Attach a captured stack trace to every recorded `Error` state.
    pub capture_traces: bool,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        ResourceConfig {
            label: "resource".to_string(),
            refetch_policy: RefetchPolicy::default(),
            capture_traces: false,
        }
    }
}

impl ResourceConfig {
    pub fn with_label(self, label: impl Into<String>) -> Self {
        ResourceConfig {
            label: label.into(),
            ..self
        }
    }

    pub fn with_refetch_policy(self, refetch_policy: RefetchPolicy) -> Self {
        ResourceConfig {
            refetch_policy,
            ..self
        }
    }

    pub fn with_capture_traces(self, capture_traces: bool) -> Self {
        ResourceConfig {
            capture_traces,
            ..self
        }
    }
}
