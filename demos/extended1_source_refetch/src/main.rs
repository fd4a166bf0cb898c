use resource_rx::{ObservableValue, RefetchPolicy, Resource, ResourceError};
use std::time::Duration;
use tracing::info;

mod tracing_setup;

async fn search(query: String) -> Result<Vec<String>, String> {
    // Shorter queries take longer, so older requests settle last.
    let latency = 400u64.saturating_sub(query.len() as u64 * 100);
    tokio::time::sleep(Duration::from_millis(latency)).await;
    if query.contains('!') {
        return Err(format!("invalid query {query:?}"));
    }
    Ok((1..=3).map(|n| format!("{query}-{n}")).collect())
}

#[tokio::main]
async fn main() -> Result<(), ResourceError> {
    tracing_setup::tracing_init();

    let query = ObservableValue::new("r".to_string());
    let fetch_query = query.clone();
    let results: Resource<Vec<String>> = Resource::builder()
        .fetcher(move || search(fetch_query.get()))
        .source(query.clone())
        .refetch_policy(RefetchPolicy::LatestWins)
        .label("search")
        .build()?;

    results.resolve()?;
    info!(results = ?results.settled().await.value(), "initial");

    // Typing: every keystroke refetches, only the last answer is kept.
    for typed in ["ru", "rus", "rust"] {
        query.set(typed.to_string());
    }
    info!(results = ?results.settled().await.value(), "after typing");

    query.set("rust!".to_string());
    let failed = results.settled().await;
    info!(error = ?failed.error(), "after invalid query");

    results.dispose();
    query.set("ignored".to_string());
    info!(listeners = query.listener_count(), "disposed");
    Ok(())
}
