use narrateforge::chunker::Chunker;
use narrateforge::config::Config;
use narrateforge::error::PipelineError;
use narrateforge::runtime::{build_broker, build_object_store, init_tracing};

#[tokio::main]
async fn main() -> Result<(), PipelineError> {
    init_tracing("narrateforge");

    let config = Config::load()?;
    let object_store = build_object_store(&config).await?;
    let broker = build_broker(&config).await?;

    let chunker = Chunker::new(object_store, broker, config.retry_max_attempts);
    chunker.run().await?;
    Ok(())
}
