use resource_rx::{Resource, ResourceError, ResourceState};
use std::time::Duration;
use tracing::info;

mod tracing_setup;

#[tokio::main]
async fn main() -> Result<(), ResourceError> {
    tracing_setup::tracing_init();

    let weather: Resource<String> = Resource::builder()
        .fetcher(|| async {
            tokio::time::sleep(Duration::from_millis(300)).await;
            Ok::<_, String>("sunny, 21°C".to_string())
        })
        .label("weather")
        .build()?;

    let _subscription = weather.subscribe(|state| info!("weather state: {state:?}"));

    weather.resolve()?;
    let report = weather.settled().await.on(
        |forecast, _| format!("forecast: {forecast}"),
        |error, _| format!("forecast unavailable: {error}"),
        || "still loading".to_string(),
    )?;
    info!("{report}");

    weather.refetch()?;
    info!(refreshing = weather.is_refreshing(), "refetch started, stale value kept");
    if let ResourceState::Ready(ready) = weather.settled().await {
        info!(value = %ready.value, "refreshed");
    }

    weather.dispose();
    Ok(())
}
