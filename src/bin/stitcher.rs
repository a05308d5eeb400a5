use narrateforge::audio::ByteConcatenator;
use narrateforge::config::Config;
use narrateforge::error::PipelineError;
use narrateforge::runtime::{build_broker, build_object_store, init_tracing};
use narrateforge::stitcher::Stitcher;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), PipelineError> {
    init_tracing("narrateforge");

    let config = Config::load()?;
    let object_store = build_object_store(&config).await?;
    let broker = build_broker(&config).await?;
    let concatenator = Arc::new(ByteConcatenator);

    let stitcher = Stitcher::new(object_store, broker, concatenator, config.retry_max_attempts);
    stitcher.run().await?;
    Ok(())
}
