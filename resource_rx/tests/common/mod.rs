use resource_rx::{Resource, ResourceState};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone, Debug, PartialEq)]
pub struct Profile {
    pub user: String,
    pub revision: u32,
}

/// A fake remote store with latency, counting every request.
#[derive(Clone, Default)]
pub struct ProfileService {
    requests: Arc<Mutex<u32>>,
}

impl ProfileService {
    pub async fn load(&self, user: String) -> Result<Profile, String> {
        let revision = {
            let mut requests = self.requests.lock().unwrap();
            *requests += 1;
            *requests
        };
        tokio::time::sleep(Duration::from_millis(1)).await;
        if user.is_empty() {
            return Err("no user selected".to_string());
        }
        Ok(Profile { user, revision })
    }

    pub fn requests(&self) -> u32 {
        *self.requests.lock().unwrap()
    }
}

pub fn record<T>(resource: &Resource<T>) -> Arc<Mutex<Vec<ResourceState<T>>>>
where
    T: Clone + Send + Sync + 'static,
{
    let states = Arc::new(Mutex::new(Vec::new()));
    let sink = states.clone();
    resource.add_listener(move |state| sink.lock().unwrap().push(state.clone()));
    states
}
