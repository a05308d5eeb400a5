//! Process-wide configuration, assembled once at startup into an explicit
//! value rather than module-scope singletons. `.env` loading in debug
//! builds via `dotenvy`, otherwise the process environment is assumed to
//! already carry these variables (this is a headless service, not the
//! desktop app this crate's layout is descended from, so there is no
//! keyring-backed production path).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(String),
    #[error("invalid value for {name}: {value}")]
    InvalidValue { name: String, value: String },
}

#[derive(Clone, Debug)]
pub struct Config {
    pub amqp_url: String,
    pub redis_url: String,
    pub s3: crate::object_store::S3Config,
    pub tts_endpoint: String,
    pub tts_api_key: String,
    pub max_upload_bytes: u64,
    pub retry_max_attempts: u32,
}

const DEFAULT_MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;
const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 5;

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        if dotenvy::dotenv().is_ok() {
            tracing::info!("loaded .env file");
        }

        let amqp_url = require_var("NARRATEFORGE_AMQP_URL")?;
        let redis_url = require_var("NARRATEFORGE_REDIS_URL")?;

        let s3 = crate::object_store::S3Config {
            bucket_name: require_var("NARRATEFORGE_S3_BUCKET")?,
            region: require_var("NARRATEFORGE_S3_REGION")?,
            access_key_id: require_var("NARRATEFORGE_S3_ACCESS_KEY")?,
            secret_access_key: require_var("NARRATEFORGE_S3_SECRET_KEY")?,
            endpoint_url: std::env::var("NARRATEFORGE_S3_ENDPOINT").ok(),
        };

        let tts_endpoint = require_var("NARRATEFORGE_TTS_ENDPOINT")?;
        let tts_api_key = require_var("NARRATEFORGE_TTS_API_KEY")?;

        let max_upload_bytes = optional_var("NARRATEFORGE_MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?;
        let retry_max_attempts =
            optional_var("NARRATEFORGE_RETRY_MAX_ATTEMPTS", DEFAULT_RETRY_MAX_ATTEMPTS)?;

        Ok(Self {
            amqp_url,
            redis_url,
            s3,
            tts_endpoint,
            tts_api_key,
            max_upload_bytes,
            retry_max_attempts,
        })
    }
}

fn require_var(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingVar(name.to_string()))
}

fn optional_var<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| ConfigError::InvalidValue { name: name.to_string(), value: raw }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_var_falls_back_to_default_when_unset() {
        std::env::remove_var("NARRATEFORGE_TEST_ONLY_VAR");
        let value: u64 = optional_var("NARRATEFORGE_TEST_ONLY_VAR", 42).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn optional_var_rejects_unparseable_values() {
        std::env::set_var("NARRATEFORGE_TEST_BAD_VAR", "not-a-number");
        let result: Result<u64, ConfigError> = optional_var("NARRATEFORGE_TEST_BAD_VAR", 1);
        assert!(result.is_err());
        std::env::remove_var("NARRATEFORGE_TEST_BAD_VAR");
    }
}
