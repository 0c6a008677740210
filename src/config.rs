//! TOML configuration for the Chorus gateway
//!
//! Supports `~/.config/chorus/config.toml` as a persistent config source.
//! All fields are optional in the file — it is a partial overlay on top of
//! defaults. The resolved `Config` is an immutable snapshot for the run's
//! lifetime; reconfiguration requires a restart.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{Error, Result};

/// Default connector queue capacity (events buffered per source)
pub const DEFAULT_SOURCE_QUEUE_CAPACITY: usize = 256;

/// Default delivery queue capacity (utterances waiting to be spoken)
pub const DEFAULT_SPEECH_QUEUE_CAPACITY: usize = 50;

/// Resolved gateway configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Per-platform connection settings
    pub platforms: PlatformsConfig,

    /// Message filter policy
    pub filters: FilterPolicy,

    /// TTS engine and voice settings
    pub tts: TtsConfig,

    /// Prefix spoken text with the platform name
    pub announce_platform: bool,

    /// Prefix spoken text with "{username} says"
    pub announce_username: bool,

    /// Delivery queue capacity (overflow drops the oldest item)
    pub speech_queue_capacity: usize,

    /// Per-connector pending-event queue capacity
    pub source_queue_capacity: usize,

    /// Interval between live-status polls for the wait-for-live gate
    pub live_poll_interval: Duration,
}

/// Per-platform connection settings
#[derive(Debug, Clone, Default)]
pub struct PlatformsConfig {
    pub youtube: YouTubeConfig,
    pub kick: KickConfig,
    pub tiktok: TikTokConfig,
}

/// YouTube Live settings
#[derive(Debug, Clone, Default)]
pub struct YouTubeConfig {
    /// Enable the YouTube connector
    pub enabled: bool,

    /// Live stream video id or watch URL
    pub video_id: String,

    /// Channel handle (@name) or channel URL for live auto-detection,
    /// used when no video id is configured
    pub channel: String,
}

/// Kick.com settings
#[derive(Debug, Clone, Default)]
pub struct KickConfig {
    /// Enable the Kick connector
    pub enabled: bool,

    /// Kick channel name (slug)
    pub channel: String,

    /// Chatroom id, bypasses the API lookup when set
    pub chatroom_id: Option<u64>,
}

/// TikTok Live settings
#[derive(Debug, Clone, Default)]
pub struct TikTokConfig {
    /// Enable the TikTok connector
    pub enabled: bool,

    /// TikTok username, with or without the leading @
    pub username: String,
}

/// Message filter policy.
///
/// Loaded once at pipeline start; immutable for the run. The filter chain
/// only decides pass/drop — it never rewrites events.
#[derive(Debug, Clone)]
pub struct FilterPolicy {
    /// Minimum message length (inclusive)
    pub min_length: usize,

    /// Maximum message length (inclusive)
    pub max_length: usize,

    /// Drop messages starting with the command prefix
    pub ignore_commands: bool,

    /// Command prefix checked when `ignore_commands` is set
    pub command_prefix: String,

    /// Drop messages containing a URL-like substring
    pub ignore_links: bool,

    /// Usernames whose messages are dropped (case-insensitive)
    pub blocked_users: Vec<String>,

    /// Words whose presence drops a message (case-insensitive substring)
    pub blocked_words: Vec<String>,
}

impl Default for FilterPolicy {
    fn default() -> Self {
        Self {
            min_length: 1,
            max_length: 500,
            ignore_commands: true,
            command_prefix: "!".to_string(),
            ignore_links: true,
            blocked_users: Vec::new(),
            blocked_words: Vec::new(),
        }
    }
}

impl FilterPolicy {
    /// Validate policy values.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for malformed values. This is the only error
    /// class that prevents pipeline startup.
    pub fn validate(&self) -> Result<()> {
        if self.min_length > self.max_length {
            return Err(Error::Config(format!(
                "filters.min_length ({}) exceeds filters.max_length ({})",
                self.min_length, self.max_length
            )));
        }
        if self.ignore_commands && self.command_prefix.is_empty() {
            return Err(Error::Config(
                "filters.command_prefix must not be empty when ignore_commands is set".to_string(),
            ));
        }
        Ok(())
    }
}

/// TTS engine selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtsEngine {
    /// OpenAI-compatible HTTP speech endpoint + local playback
    Http,
    /// External synthesizer command (espeak-ng, say, ...)
    Command,
}

/// TTS engine and voice settings
#[derive(Debug, Clone)]
pub struct TtsConfig {
    /// Engine backing the delivery queue
    pub engine: TtsEngine,

    /// Voice identifier (engine-specific)
    pub voice: String,

    /// Speech rate multiplier (0.25 to 4.0)
    pub rate: f32,

    /// Output volume (0.0 to 1.0)
    pub volume: f32,

    /// Speech endpoint base URL for the HTTP engine
    pub endpoint: String,

    /// Synthesis model for the HTTP engine
    pub model: String,

    /// Command template for the command engine; `{text}` is substituted
    pub command: Vec<String>,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            engine: TtsEngine::Command,
            voice: String::new(),
            rate: 1.0,
            volume: 1.0,
            endpoint: "https://api.openai.com/v1/audio/speech".to_string(),
            model: "tts-1".to_string(),
            command: vec!["espeak-ng".to_string(), "{text}".to_string()],
        }
    }
}

impl TtsConfig {
    /// Validate TTS parameter ranges.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for out-of-range values.
    pub fn validate(&self) -> Result<()> {
        if !(0.25..=4.0).contains(&self.rate) {
            return Err(Error::Config(format!(
                "tts.rate must be within 0.25..=4.0 (got {})",
                self.rate
            )));
        }
        if !(0.0..=1.0).contains(&self.volume) {
            return Err(Error::Config(format!(
                "tts.volume must be within 0.0..=1.0 (got {})",
                self.volume
            )));
        }
        if self.engine == TtsEngine::Command && self.command.is_empty() {
            return Err(Error::Config(
                "tts.command must name a program when engine = \"command\"".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            platforms: PlatformsConfig::default(),
            filters: FilterPolicy::default(),
            tts: TtsConfig::default(),
            announce_platform: true,
            announce_username: true,
            speech_queue_capacity: DEFAULT_SPEECH_QUEUE_CAPACITY,
            source_queue_capacity: DEFAULT_SOURCE_QUEUE_CAPACITY,
            live_poll_interval: Duration::from_secs(30),
        }
    }
}

impl Config {
    /// Load configuration, overlaying the TOML file (if any) on defaults.
    ///
    /// `path` overrides the standard location when given.
    ///
    /// # Errors
    ///
    /// Returns error if an explicitly given path cannot be read, if the
    /// file cannot be parsed, or if validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(p) => {
                let raw = std::fs::read_to_string(p)?;
                toml::from_str::<ConfigFile>(&raw)?
            }
            None => match default_config_path() {
                Some(p) if p.exists() => {
                    let raw = std::fs::read_to_string(&p)?;
                    toml::from_str::<ConfigFile>(&raw)?
                }
                _ => ConfigFile::default(),
            },
        };

        let config = Self::from_file(file);
        config.validate()?;
        Ok(config)
    }

    /// Validate the whole snapshot (fail-fast, before any connector starts).
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for any malformed value.
    pub fn validate(&self) -> Result<()> {
        self.filters.validate()?;
        self.tts.validate()?;
        if self.speech_queue_capacity == 0 {
            return Err(Error::Config(
                "speech_queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.source_queue_capacity == 0 {
            return Err(Error::Config(
                "source_queue_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn from_file(file: ConfigFile) -> Self {
        let defaults = Self::default();
        let fd = FilterPolicy::default();
        let td = TtsConfig::default();

        Self {
            platforms: PlatformsConfig {
                youtube: YouTubeConfig {
                    enabled: file.youtube.enabled.unwrap_or(false),
                    video_id: file.youtube.video_id.unwrap_or_default(),
                    channel: file.youtube.channel.unwrap_or_default(),
                },
                kick: KickConfig {
                    enabled: file.kick.enabled.unwrap_or(false),
                    channel: file.kick.channel.unwrap_or_default(),
                    chatroom_id: file.kick.chatroom_id,
                },
                tiktok: TikTokConfig {
                    enabled: file.tiktok.enabled.unwrap_or(false),
                    username: file.tiktok.username.unwrap_or_default(),
                },
            },
            filters: FilterPolicy {
                min_length: file.filters.min_length.unwrap_or(fd.min_length),
                max_length: file.filters.max_length.unwrap_or(fd.max_length),
                ignore_commands: file.filters.ignore_commands.unwrap_or(fd.ignore_commands),
                command_prefix: file.filters.command_prefix.unwrap_or(fd.command_prefix),
                ignore_links: file.filters.ignore_links.unwrap_or(fd.ignore_links),
                blocked_users: file.filters.blocked_users.unwrap_or_default(),
                blocked_words: file.filters.blocked_words.unwrap_or_default(),
            },
            tts: TtsConfig {
                engine: match file.tts.engine.as_deref() {
                    Some("http") => TtsEngine::Http,
                    _ => TtsEngine::Command,
                },
                voice: file.tts.voice.unwrap_or(td.voice),
                rate: file.tts.rate.unwrap_or(td.rate),
                volume: file.tts.volume.unwrap_or(td.volume),
                endpoint: file.tts.endpoint.unwrap_or(td.endpoint),
                model: file.tts.model.unwrap_or(td.model),
                command: file.tts.command.unwrap_or(td.command),
            },
            announce_platform: file
                .announce_platform
                .unwrap_or(defaults.announce_platform),
            announce_username: file
                .announce_username
                .unwrap_or(defaults.announce_username),
            speech_queue_capacity: file
                .speech_queue_capacity
                .unwrap_or(defaults.speech_queue_capacity),
            source_queue_capacity: file
                .source_queue_capacity
                .unwrap_or(defaults.source_queue_capacity),
            live_poll_interval: file
                .live_poll_interval_secs
                .map_or(defaults.live_poll_interval, Duration::from_secs),
        }
    }
}

/// Standard config file location (`~/.config/chorus/config.toml`)
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "omni", "chorus")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Write a commented default config file to the given path.
///
/// # Errors
///
/// Returns error if the file cannot be written.
pub fn write_default_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, DEFAULT_CONFIG_TOML)?;
    Ok(())
}

const DEFAULT_CONFIG_TOML: &str = r#"# Chorus gateway configuration
# All fields are optional; omitted values fall back to defaults.

[youtube]
enabled = false
# Live video id or watch URL; leave empty to auto-detect from the channel
video_id = ""
# Channel handle for auto-detection, e.g. "@somechannel"
channel = ""

[kick]
enabled = false
channel = ""
# chatroom_id = 123456   # bypasses the API lookup

[tiktok]
enabled = false
username = ""

[filters]
min_length = 1
max_length = 500
ignore_commands = true
command_prefix = "!"
ignore_links = true
blocked_users = []
blocked_words = []

[tts]
# "command" (external synthesizer) or "http" (OpenAI-compatible endpoint)
engine = "command"
voice = ""
rate = 1.0
volume = 1.0
command = ["espeak-ng", "{text}"]
# endpoint = "https://api.openai.com/v1/audio/speech"
# model = "tts-1"

announce_platform = true
announce_username = true
speech_queue_capacity = 50
"#;

// -- TOML file schema (all-optional overlay) ----------------------------------

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    youtube: YouTubeFile,
    #[serde(default)]
    kick: KickFile,
    #[serde(default)]
    tiktok: TikTokFile,
    #[serde(default)]
    filters: FiltersFile,
    #[serde(default)]
    tts: TtsFile,
    announce_platform: Option<bool>,
    announce_username: Option<bool>,
    speech_queue_capacity: Option<usize>,
    source_queue_capacity: Option<usize>,
    live_poll_interval_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct YouTubeFile {
    enabled: Option<bool>,
    video_id: Option<String>,
    channel: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct KickFile {
    enabled: Option<bool>,
    channel: Option<String>,
    chatroom_id: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct TikTokFile {
    enabled: Option<bool>,
    username: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FiltersFile {
    min_length: Option<usize>,
    max_length: Option<usize>,
    ignore_commands: Option<bool>,
    command_prefix: Option<String>,
    ignore_links: Option<bool>,
    blocked_users: Option<Vec<String>>,
    blocked_words: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct TtsFile {
    engine: Option<String>,
    voice: Option<String>,
    rate: Option<f32>,
    volume: Option<f32>,
    endpoint: Option<String>,
    model: Option<String>,
    command: Option<Vec<String>>,
}
