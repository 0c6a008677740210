//! Chorus - multi-source live chat aggregation and TTS delivery
//!
//! This library provides the core functionality for the Chorus gateway:
//! - Platform chat connectors (YouTube Live, Kick, TikTok Live)
//! - Fair event aggregation with per-source ordering
//! - A configurable filter chain
//! - Serialized text-to-speech delivery
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    Connectors                        │
//! │   YouTube (poll)  │  Kick (ws)  │  TikTok (ws)      │
//! └────────────────────┬────────────────────────────────┘
//!                      │  per-source bounded queues
//! ┌────────────────────▼────────────────────────────────┐
//! │                   Aggregator                         │
//! │        round-robin merge, per-source FIFO            │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │   Filter chain → Speech queue → Audio backend        │
//! │   length/command/link/blocklists │ one utterance     │
//! │                                  │ at a time         │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod aggregator;
pub mod audio;
pub mod config;
pub mod connectors;
pub mod credentials;
pub mod error;
pub mod event;
pub mod filter;
pub mod live;
pub mod pipeline;
pub mod speech;

pub use config::Config;
pub use error::{Error, Result};
pub use event::{ChatEvent, Platform};
pub use pipeline::{Pipeline, ShutdownKind};
