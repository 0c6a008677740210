//! HTTP speech synthesis
//!
//! Talks to an OpenAI-compatible `/audio/speech` endpoint and plays the
//! returned MP3 locally. The API key comes from the credential store
//! (`CHORUS_OPENAI_API_KEY` with the default store); endpoints that need
//! no key simply work without one.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::SecretString;
use serde_json::json;
use tracing::debug;

use crate::config::TtsConfig;
use crate::credentials::{reveal, CredentialStore};
use crate::event::SpeechRequest;
use crate::{Error, Result};

use super::{player, AudioBackend};

/// OpenAI-compatible speech synthesis engine
pub struct HttpTtsEngine {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<SecretString>,
}

impl HttpTtsEngine {
    /// Build the engine from the TTS configuration.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` when the HTTP client cannot be constructed.
    pub fn new(config: &TtsConfig, credentials: Arc<dyn CredentialStore>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Config(format!("http client: {e}")))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key: credentials.secret("openai", "api_key"),
        })
    }

    async fn synthesize(&self, request: &SpeechRequest) -> Result<Vec<u8>> {
        let body = json!({
            "model": self.model,
            "voice": request.voice.voice,
            "input": request.text,
            "speed": request.voice.rate,
            "response_format": "mp3",
        });

        let mut http = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            http = http.bearer_auth(reveal(key));
        }

        let response = http.send().await?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!(
                "speech endpoint returned {status}: {detail}"
            )));
        }

        let audio = response.bytes().await?;
        debug!(bytes = audio.len(), "speech synthesized");
        Ok(audio.to_vec())
    }
}

#[async_trait]
impl AudioBackend for HttpTtsEngine {
    async fn speak(&self, request: &SpeechRequest) -> Result<()> {
        let audio = self.synthesize(request).await?;
        player::play_mp3(audio, request.voice.volume).await
    }
}
