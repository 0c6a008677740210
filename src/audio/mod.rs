//! Speech synthesis and playback
//!
//! The delivery queue speaks through an `AudioBackend`: either an
//! OpenAI-compatible HTTP endpoint whose MP3 output is played locally, or
//! an external synthesizer command that handles its own audio. Both are
//! synchronous from the queue's point of view — `speak` returns only when
//! the utterance has finished.

pub mod command;
pub mod http_tts;
pub mod player;

pub use command::CommandEngine;
pub use http_tts::HttpTtsEngine;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{TtsConfig, TtsEngine};
use crate::credentials::CredentialStore;
use crate::event::SpeechRequest;
use crate::Result;

/// A synthesize-and-play backend
#[async_trait]
pub trait AudioBackend: Send + Sync {
    /// Speak one request to completion.
    ///
    /// # Errors
    ///
    /// Returns an error when synthesis or playback fails; the delivery
    /// queue logs it and moves on to the next item.
    async fn speak(&self, request: &SpeechRequest) -> Result<()>;
}

/// Build the backend selected by the TTS configuration.
///
/// # Errors
///
/// Returns `Error::Config` when the configured engine cannot be
/// constructed.
pub fn create_backend(
    config: &TtsConfig,
    credentials: Arc<dyn CredentialStore>,
) -> Result<Box<dyn AudioBackend>> {
    match config.engine {
        TtsEngine::Http => Ok(Box::new(HttpTtsEngine::new(config, credentials)?)),
        TtsEngine::Command => Ok(Box::new(CommandEngine::new(config)?)),
    }
}
