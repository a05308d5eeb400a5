//! Text-to-speech backend abstraction. Grounded on the same reqwest +
//! thiserror + serde client shape used elsewhere in this codebase for
//! external HTTP collaborators, generalized from a single named provider
//! to a narrow trait so the synthesizer never depends on a concrete vendor.

use crate::error::TtsError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioEncoding {
    Mp3,
}

#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    pub text: String,
    pub voice: String,
    pub encoding: AudioEncoding,
}

impl SynthesisRequest {
    /// The default voice/encoding pair the pipeline synthesizes with.
    pub fn new(text: String) -> Self {
        Self {
            text,
            voice: "en-US-Standard-C".to_string(),
            encoding: AudioEncoding::Mp3,
        }
    }
}

#[async_trait]
pub trait TtsClient: Send + Sync {
    async fn synthesize(&self, request: SynthesisRequest) -> Result<Vec<u8>, TtsError>;
}

#[derive(Debug, Serialize)]
struct SynthesizeBody<'a> {
    text: &'a str,
    voice: &'a str,
    encoding: &'a str,
}

#[derive(Debug, Deserialize)]
struct SynthesizeResponse {
    #[serde(with = "base64_bytes")]
    audio_content: Vec<u8>,
}

mod base64_bytes {
    use base64::Engine;
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(&s)
            .map_err(serde::de::Error::custom)
    }
}

/// HTTP-backed TTS client for a Google-Cloud-TTS-shaped REST API: POST the
/// text with a voice/encoding selector, receive base64-encoded audio.
pub struct HttpTtsClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpTtsClient {
    pub fn new(endpoint: String, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            api_key,
        }
    }
}

#[async_trait]
impl TtsClient for HttpTtsClient {
    async fn synthesize(&self, request: SynthesisRequest) -> Result<Vec<u8>, TtsError> {
        if request.text.trim().is_empty() {
            return Err(TtsError::EmptyInput);
        }

        let encoding = match request.encoding {
            AudioEncoding::Mp3 => "MP3",
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&SynthesizeBody {
                text: &request.text,
                voice: &request.voice,
                encoding,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(TtsError::Backend { status, message });
        }

        let body: SynthesizeResponse = response.json().await?;
        Ok(body.audio_content)
    }
}

/// Deterministic in-memory TTS stand-in used by tests: returns the input
/// text's bytes so synthesis output is a pure function of its input.
pub struct EchoTtsClient;

#[async_trait]
impl TtsClient for EchoTtsClient {
    async fn synthesize(&self, request: SynthesisRequest) -> Result<Vec<u8>, TtsError> {
        if request.text.trim().is_empty() {
            return Err(TtsError::EmptyInput);
        }
        Ok(request.text.into_bytes())
    }
}
