use narrateforge::config::Config;
use narrateforge::gateway::{router, GatewayState};
use narrateforge::runtime::{build_aggregate_store, build_broker, build_object_store, init_tracing};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing("narrateforge");

    let config = Config::load()?;
    let object_store = build_object_store(&config).await?;
    let broker = build_broker(&config).await?;
    let aggregate_store = build_aggregate_store(&config)?;

    let state = GatewayState {
        object_store,
        broker,
        aggregate_store,
        max_upload_bytes: config.max_upload_bytes,
    };

    let app = router(state);

    let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
    tracing::info!("gateway listening on http://0.0.0.0:8080");
    axum::serve(listener, app).await?;

    Ok(())
}
