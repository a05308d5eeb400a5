//! Per-collaborator error enums, composed into one crate-wide error at the
//! worker level via `#[from]`, one enum per module rather than a single
//! catch-all.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("unknown status string: {0}")]
    UnknownStatus(String),
}

#[derive(Error, Debug)]
pub enum ObjectStoreError {
    #[error("S3 error: {0}")]
    S3(#[from] aws_sdk_s3::Error),
    #[error("S3 SDK error: {0}")]
    SdkError(String),
    #[error("byte stream error: {0}")]
    ByteStream(#[from] aws_sdk_s3::primitives::ByteStreamError),
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum AggregateStoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("pool error: {0}")]
    Pool(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
}

#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("amqp error: {0}")]
    Amqp(#[from] lapin::Error),
    #[error("message decode error: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("malformed message: {0}")]
    Malformed(String),
}

#[derive(Error, Debug)]
pub enum EpubError {
    #[error("epub parse error: {0}")]
    Parse(String),
}

#[derive(Error, Debug)]
pub enum TtsError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("tts backend error: {status}: {message}")]
    Backend { status: u16, message: String },
    #[error("empty input text")]
    EmptyInput,
}

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no fragments to stitch")]
    NoFragments,
}

/// Composed error for worker binaries; each collaborator error converts in
/// via `#[from]` so call sites use plain `?`.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("object store: {0}")]
    ObjectStore(#[from] ObjectStoreError),
    #[error("aggregate store: {0}")]
    AggregateStore(#[from] AggregateStoreError),
    #[error("broker: {0}")]
    Broker(#[from] BrokerError),
    #[error("epub: {0}")]
    Epub(#[from] EpubError),
    #[error("tts: {0}")]
    Tts(#[from] TtsError),
    #[error("audio: {0}")]
    Audio(#[from] AudioError),
    #[error("model: {0}")]
    Model(#[from] ModelError),
    #[error("config: {0}")]
    Config(#[from] crate::config::ConfigError),
}
