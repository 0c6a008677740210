//! Normalized chat event types flowing through the pipeline

use std::fmt;
use std::time::Instant;

/// A chat source platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    /// YouTube Live (polling connector)
    YouTube,
    /// Kick.com (Pusher websocket connector)
    Kick,
    /// TikTok Live (webcast websocket connector)
    TikTok,
}

impl Platform {
    /// Spoken/display name of the platform
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::YouTube => "YouTube",
            Self::Kick => "Kick",
            Self::TikTok => "TikTok",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The normalized unit flowing through the pipeline.
///
/// Immutable once constructed; the filter chain decides pass/drop but
/// never rewrites fields.
#[derive(Debug, Clone)]
pub struct ChatEvent {
    /// Source platform
    pub platform: Platform,

    /// Display name as received from the platform
    pub username: String,

    /// Raw message body (unescaped, unfiltered)
    pub text: String,

    /// Monotonic timestamp assigned by the connector on receipt
    pub received_at: Instant,

    /// Platform-native message identifier.
    ///
    /// Used only for connector-local dedup; not meaningful downstream.
    pub raw_id: String,
}

impl ChatEvent {
    /// Create a new event stamped with the current monotonic time
    #[must_use]
    pub fn new(
        platform: Platform,
        username: impl Into<String>,
        text: impl Into<String>,
        raw_id: impl Into<String>,
    ) -> Self {
        Self {
            platform,
            username: username.into(),
            text: text.into(),
            received_at: Instant::now(),
            raw_id: raw_id.into(),
        }
    }
}

/// Voice parameters for a speech request
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceProfile {
    /// Voice identifier (engine-specific, e.g. "alloy" or an SAPI name)
    pub voice: String,

    /// Speech rate multiplier (1.0 = normal)
    pub rate: f32,

    /// Output volume (0.0 to 1.0)
    pub volume: f32,
}

impl Default for VoiceProfile {
    fn default() -> Self {
        Self {
            voice: String::new(),
            rate: 1.0,
            volume: 1.0,
        }
    }
}

/// A synthesized-speech request, consumed exactly once by the audio backend
#[derive(Debug, Clone)]
pub struct SpeechRequest {
    /// Text to speak
    pub text: String,

    /// Voice parameters
    pub voice: VoiceProfile,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_names() {
        assert_eq!(Platform::YouTube.to_string(), "YouTube");
        assert_eq!(Platform::Kick.to_string(), "Kick");
        assert_eq!(Platform::TikTok.to_string(), "TikTok");
    }

    #[test]
    fn event_carries_fields() {
        let ev = ChatEvent::new(Platform::Kick, "bob", "hello", "id-1");
        assert_eq!(ev.platform, Platform::Kick);
        assert_eq!(ev.username, "bob");
        assert_eq!(ev.text, "hello");
        assert_eq!(ev.raw_id, "id-1");
    }
}
