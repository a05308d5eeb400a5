use narrateforge::config::Config;
use narrateforge::error::PipelineError;
use narrateforge::runtime::{build_broker, build_object_store, init_tracing};
use narrateforge::splitter::Splitter;

#[tokio::main]
async fn main() -> Result<(), PipelineError> {
    init_tracing("narrateforge");

    let config = Config::load()?;
    let object_store = build_object_store(&config).await?;
    let broker = build_broker(&config).await?;

    let splitter = Splitter::new(object_store, broker, config.retry_max_attempts);
    splitter.run().await?;
    Ok(())
}
