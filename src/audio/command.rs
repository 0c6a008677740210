//! External synthesizer command engine
//!
//! Runs a configured program per utterance (espeak-ng, `say`, piper, ...),
//! substituting `{text}` in the argument template. The command owns its own
//! audio output; `speak` returns when the process exits.

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::config::TtsConfig;
use crate::event::SpeechRequest;
use crate::{Error, Result};

use super::AudioBackend;

/// Placeholder substituted with the utterance text
const TEXT_PLACEHOLDER: &str = "{text}";
const VOICE_PLACEHOLDER: &str = "{voice}";

/// Subprocess-per-utterance speech engine
pub struct CommandEngine {
    template: Vec<String>,
}

impl CommandEngine {
    /// Build the engine from the TTS configuration.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` when the command template is empty.
    pub fn new(config: &TtsConfig) -> Result<Self> {
        if config.command.is_empty() {
            return Err(Error::Config(
                "tts.command must name a program".to_string(),
            ));
        }
        Ok(Self {
            template: config.command.clone(),
        })
    }

    fn build_argv(&self, request: &SpeechRequest) -> Vec<String> {
        let mut argv: Vec<String> = self
            .template
            .iter()
            .map(|arg| {
                arg.replace(TEXT_PLACEHOLDER, &request.text)
                    .replace(VOICE_PLACEHOLDER, &request.voice.voice)
            })
            .collect();

        // A template without the placeholder gets the text appended
        if !self.template.iter().any(|a| a.contains(TEXT_PLACEHOLDER)) {
            argv.push(request.text.clone());
        }
        argv
    }
}

#[async_trait]
impl AudioBackend for CommandEngine {
    async fn speak(&self, request: &SpeechRequest) -> Result<()> {
        let argv = self.build_argv(request);
        debug!(program = %argv[0], "running synthesizer command");

        let status = Command::new(&argv[0])
            .args(&argv[1..])
            .status()
            .await
            .map_err(|e| Error::Tts(format!("spawn {}: {e}", argv[0])))?;

        if !status.success() {
            return Err(Error::Tts(format!(
                "{} exited with {status}",
                argv[0]
            )));
        }
        Ok(())
    }
}
