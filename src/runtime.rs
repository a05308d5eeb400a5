//! Shared startup plumbing for the worker binaries: logging init and
//! collaborator construction from `Config`, factored out so each
//! `bin/*.rs` stays a thin entry point.

use crate::aggregate_store::{AggregateStore, RedisAggregateStore};
use crate::broker::{AmqpBroker, MessageBroker};
use crate::config::Config;
use crate::error::PipelineError;
use crate::object_store::{ObjectStore, S3ObjectStore};
use std::sync::Arc;

pub fn init_tracing(crate_name: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
                .parse_lossy(format!("{crate_name}=info,aws_config=warn,aws_smithy=warn,aws_sdk_s3=warn,hyper=warn")),
        )
        .init();
}

pub async fn build_object_store(config: &Config) -> Result<Arc<dyn ObjectStore>, PipelineError> {
    config.s3.validate()?;
    let store = S3ObjectStore::new(config.s3.clone()).await?;
    Ok(Arc::new(store))
}

pub async fn build_broker(config: &Config) -> Result<Arc<dyn MessageBroker>, PipelineError> {
    let broker = AmqpBroker::connect(&config.amqp_url).await?;
    Ok(Arc::new(broker))
}

pub fn build_aggregate_store(config: &Config) -> Result<Arc<dyn AggregateStore>, PipelineError> {
    let store = RedisAggregateStore::new(&config.redis_url)?;
    Ok(Arc::new(store))
}
