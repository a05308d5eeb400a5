use narrateforge::config::Config;
use narrateforge::error::PipelineError;
use narrateforge::runtime::{build_broker, build_object_store, init_tracing};
use narrateforge::synthesizer::Synthesizer;
use narrateforge::tts::HttpTtsClient;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), PipelineError> {
    init_tracing("narrateforge");

    let config = Config::load()?;
    let object_store = build_object_store(&config).await?;
    let broker = build_broker(&config).await?;
    let tts = Arc::new(HttpTtsClient::new(config.tts_endpoint.clone(), config.tts_api_key.clone()));

    let synthesizer = Synthesizer::new(object_store, broker, tts, config.retry_max_attempts);
    synthesizer.run().await?;
    Ok(())
}
