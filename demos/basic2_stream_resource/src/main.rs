use futures_signals::signal::SignalExt;
use resource_rx::mock::push_stream;
use resource_rx::{Resource, ResourceError};
use std::time::Duration;
use tracing::info;

mod tracing_setup;

#[tokio::main]
async fn main() -> Result<(), ResourceError> {
    tracing_setup::tracing_init();

    let (ticker, prices) = push_stream::<f64>();
    let price: Resource<f64> = Resource::builder()
        .stream(prices)
        .label("price")
        .build()?;
    price.resolve()?;

    tokio::spawn(async move {
        for tick in 0..6u32 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let delivered = if tick == 3 {
                ticker.fail("feed interrupted")
            } else {
                ticker.emit(100.0 + f64::from(tick) * 0.5)
            };
            if !delivered {
                info!("price resource is gone, stopping ticker");
                return;
            }
        }
    });

    let watcher = price.clone();
    let view = price
        .to_signal()
        .stop_if(|state| state.value().ok().flatten().is_some_and(|p| p >= 102.0))
        .for_each(move |state| {
            let line = state
                .maybe_on()
                .ready(|price, _| format!("price {price:.2}"))
                .error(|error, _| format!("price unavailable ({error})"))
                .or_else(|| "waiting for first tick".to_string());
            info!(loading = watcher.is_loading(), "{line}");
            async {}
        });
    view.await;

    price.dispose();
    Ok(())
}
