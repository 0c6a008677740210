//! End-to-end pipeline tests with scripted connectors and a recording
//! audio backend.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use chorus::audio::AudioBackend;
use chorus::config::Config;
use chorus::connectors::{ConnectionState, Connector, ConnectorCtx, DedupWindow};
use chorus::credentials::EnvCredentials;
use chorus::event::SpeechRequest;
use chorus::{ChatEvent, Pipeline, Platform, Result, ShutdownKind};

/// Records every spoken utterance in order
struct RecordingBackend {
    spoken: Mutex<Vec<String>>,
}

impl RecordingBackend {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            spoken: Mutex::new(Vec::new()),
        })
    }

    fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }
}

#[async_trait]
impl AudioBackend for RecordingBackend {
    async fn speak(&self, request: &SpeechRequest) -> Result<()> {
        self.spoken.lock().unwrap().push(request.text.clone());
        Ok(())
    }
}

/// Emits a fixed script of (username, text, raw_id) lines, then idles
struct ScriptedConnector {
    platform: Platform,
    lines: Vec<(String, String, String)>,
}

impl ScriptedConnector {
    fn new(platform: Platform, lines: &[(&str, &str, &str)]) -> Box<Self> {
        Box::new(Self {
            platform,
            lines: lines
                .iter()
                .map(|(u, t, i)| (u.to_string(), t.to_string(), i.to_string()))
                .collect(),
        })
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn run(self: Box<Self>, mut ctx: ConnectorCtx) {
        let _ = ctx.state.send(ConnectionState::Live);
        for (user, text, id) in &self.lines {
            ctx.sink
                .push(ChatEvent::new(self.platform, user.clone(), text.clone(), id.clone()));
        }
        let _ = ctx.shutdown.changed().await;
        let _ = ctx.state.send(ConnectionState::Stopped);
    }
}

/// Delivers its script twice with overlapping ids, the way a platform
/// replays recent history after a reconnect; a dedup window gates the sink
struct ReplayingConnector {
    platform: Platform,
    lines: Vec<(String, String, String)>,
}

#[async_trait]
impl Connector for ReplayingConnector {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn run(self: Box<Self>, mut ctx: ConnectorCtx) {
        let mut dedup = DedupWindow::default();
        let _ = ctx.state.send(ConnectionState::Live);
        for _ in 0..2 {
            for (user, text, id) in &self.lines {
                if !dedup.is_duplicate(id) {
                    ctx.sink.push(ChatEvent::new(
                        self.platform,
                        user.clone(),
                        text.clone(),
                        id.clone(),
                    ));
                }
            }
        }
        let _ = ctx.shutdown.changed().await;
        let _ = ctx.state.send(ConnectionState::Stopped);
    }
}

fn bare_config() -> Config {
    let mut config = Config::default();
    // Keep spoken text equal to the message text for exact assertions
    config.announce_platform = false;
    config.announce_username = false;
    config
}

async fn run_until_quiet(
    pipeline: Pipeline,
    backend: &Arc<RecordingBackend>,
    expected: usize,
) -> ShutdownKind {
    let (tx, rx) = watch::channel(false);
    let run = tokio::spawn(pipeline.run(rx, None));

    // Wait for the expected utterances (bounded), then shut down
    for _ in 0..100 {
        if backend.spoken().len() >= expected {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    tx.send_replace(true);

    tokio::time::timeout(Duration::from_secs(10), run)
        .await
        .expect("pipeline did not stop")
        .expect("pipeline task panicked")
        .expect("pipeline returned error")
}

#[tokio::test]
async fn filtered_events_reach_delivery_in_order() {
    let backend = RecordingBackend::new();
    let mut pipeline = Pipeline::new(
        bare_config(),
        Arc::new(EnvCredentials),
        backend.clone(),
    )
    .unwrap();

    // Command and link messages are dropped by the default policy
    pipeline.add_connector(ScriptedConnector::new(
        Platform::Kick,
        &[
            ("bob", "hello", "1"),
            ("sam", "!skip", "2"),
            ("eve", "http://x.com", "3"),
            ("tom", "hi", "4"),
        ],
    ));

    let kind = run_until_quiet(pipeline, &backend, 2).await;
    assert_eq!(kind, ShutdownKind::Clean);
    assert_eq!(backend.spoken(), vec!["hello", "hi"]);
}

#[tokio::test]
async fn per_source_order_survives_interleaving() {
    let backend = RecordingBackend::new();
    let mut pipeline = Pipeline::new(
        bare_config(),
        Arc::new(EnvCredentials),
        backend.clone(),
    )
    .unwrap();

    pipeline.add_connector(ScriptedConnector::new(
        Platform::Kick,
        &[("a", "k0", "k0"), ("a", "k1", "k1"), ("a", "k2", "k2")],
    ));
    pipeline.add_connector(ScriptedConnector::new(
        Platform::YouTube,
        &[("b", "y0", "y0"), ("b", "y1", "y1"), ("b", "y2", "y2")],
    ));

    run_until_quiet(pipeline, &backend, 6).await;

    let spoken = backend.spoken();
    assert_eq!(spoken.len(), 6);
    let kick: Vec<&String> = spoken.iter().filter(|t| t.starts_with('k')).collect();
    let youtube: Vec<&String> = spoken.iter().filter(|t| t.starts_with('y')).collect();
    assert_eq!(kick, ["k0", "k1", "k2"]);
    assert_eq!(youtube, ["y0", "y1", "y2"]);
}

#[tokio::test]
async fn reconnect_replay_is_deduplicated() {
    let backend = RecordingBackend::new();
    let mut pipeline = Pipeline::new(
        bare_config(),
        Arc::new(EnvCredentials),
        backend.clone(),
    )
    .unwrap();

    pipeline.add_connector(Box::new(ReplayingConnector {
        platform: Platform::TikTok,
        lines: vec![
            ("bob".to_string(), "first".to_string(), "m1".to_string()),
            ("bob".to_string(), "second".to_string(), "m2".to_string()),
        ],
    }));

    run_until_quiet(pipeline, &backend, 2).await;
    assert_eq!(backend.spoken(), vec!["first", "second"]);
}

#[tokio::test]
async fn announcements_wrap_spoken_text() {
    let backend = RecordingBackend::new();
    let mut config = Config::default();
    config.announce_platform = true;
    config.announce_username = true;
    let mut pipeline =
        Pipeline::new(config, Arc::new(EnvCredentials), backend.clone()).unwrap();

    pipeline.add_connector(ScriptedConnector::new(
        Platform::Kick,
        &[("stream_fan_99", "hello", "1")],
    ));

    run_until_quiet(pipeline, &backend, 1).await;
    assert_eq!(backend.spoken(), vec!["Kick, stream fan says, hello"]);
}
