use narrateforge::config::Config;
use narrateforge::error::PipelineError;
use narrateforge::runtime::{build_aggregate_store, build_broker, init_tracing};
use narrateforge::tracker::EventTracker;

#[tokio::main]
async fn main() -> Result<(), PipelineError> {
    init_tracing("narrateforge");

    let config = Config::load()?;
    let store = build_aggregate_store(&config)?;
    let broker = build_broker(&config).await?;

    let tracker = EventTracker::new(store, broker);
    tracker.run().await?;
    Ok(())
}
