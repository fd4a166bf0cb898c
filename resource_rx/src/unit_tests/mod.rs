use crate::{Resource, ResourceState};
use std::sync::{Arc, Mutex};

mod resource_test;

/// Every state a resource publishes, in order, as seen by a listener.
#[derive(Clone)]
pub struct Recorder<T> {
    states: Arc<Mutex<Vec<ResourceState<T>>>>,
}

impl<T> Recorder<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn attach(resource: &Resource<T>) -> Self {
        let recorder = Recorder {
            states: Arc::new(Mutex::new(Vec::new())),
        };
        let states = recorder.states.clone();
        resource.add_listener(move |state| states.lock().unwrap().push(state.clone()));
        recorder
    }

    pub fn states(&self) -> Vec<ResourceState<T>> {
        self.states.lock().unwrap().clone()
    }
}

/// Lets spawned drivers run on the current-thread test runtime.
pub async fn drain_tasks() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}
