//! Reactive async resources.
//!
//! A [`Resource`] wraps a fetch function or a push stream and exposes its
//! lifecycle as an observable [`ResourceState`]:
//! `Unresolved -> Loading -> Ready | Error`, with stale-while-refreshing
//! refetches. Listeners registered on the resource are notified
//! synchronously on every transition.
//!
//! ```no_run
//! use resource_rx::{Resource, ResourceState};
//!
//! # async fn run() -> Result<(), resource_rx::ResourceError> {
//! let user: Resource<String> = Resource::from_fetcher(|| async { Ok::<_, String>("ada".to_string()) });
//! user.resolve()?;
//! assert_eq!(user.settled().await, ResourceState::ready("ada".to_string()));
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod fetch_outcome;
mod observable;
mod projection;
mod resource;
mod resource_state;
mod stream_ext;
mod subscription;
pub mod mock;

pub use config::*;
pub use error::*;
pub use fetch_outcome::*;
pub use observable::*;
pub use projection::*;
pub use resource::*;
pub use resource_state::*;
pub use stream_ext::*;
pub use subscription::*;

#[cfg(test)]
mod unit_tests;
