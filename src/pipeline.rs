//! Pipeline wiring
//!
//! Connects config → connectors → aggregator → filter chain → delivery
//! queue into one running process. Construction is fail-fast on invalid
//! configuration; everything after that degrades instead of crashing — a
//! platform that cannot start is a warning, not an abort.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::aggregator::Aggregator;
use crate::audio::AudioBackend;
use crate::config::Config;
use crate::connectors::{
    Connector, ConnectorHandle, KickConnector, RetryPolicy, TikTokConnector, YouTubeConnector,
    STOP_GRACE_PERIOD,
};
use crate::credentials::CredentialStore;
use crate::event::VoiceProfile;
use crate::filter::{FilterChain, Verdict};
use crate::live::{wait_until_live, LiveChecker};
use crate::speech::{enqueue_event, run_delivery, SpeechQueue};
use crate::Result;

/// How the pipeline came down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownKind {
    /// Every task stopped within its grace period
    Clean,
    /// At least one task had to be hard-aborted
    Forced,
}

/// The assembled gateway, ready to run
pub struct Pipeline {
    config: Config,
    credentials: Arc<dyn CredentialStore>,
    backend: Arc<dyn AudioBackend>,
    filter: FilterChain,
    connectors: Vec<Box<dyn Connector>>,
}

impl Pipeline {
    /// Assemble the pipeline: validate the configuration, compile the
    /// filter chain, and build connectors for the enabled platforms.
    ///
    /// A platform whose connector cannot be built (missing identifiers)
    /// is skipped with a warning. Zero connectors is not an error — the
    /// pipeline runs degraded.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for invalid configuration; this is the only
    /// fatal class.
    pub fn new(
        config: Config,
        credentials: Arc<dyn CredentialStore>,
        backend: Arc<dyn AudioBackend>,
    ) -> Result<Self> {
        config.validate()?;
        let filter = FilterChain::new(config.filters.clone())?;

        let mut pipeline = Self {
            config,
            credentials,
            backend,
            filter,
            connectors: Vec::new(),
        };
        pipeline.build_platform_connectors();
        Ok(pipeline)
    }

    /// Add a connector (used for platforms outside the built-in set and by
    /// the integration tests)
    pub fn add_connector(&mut self, connector: Box<dyn Connector>) {
        self.connectors.push(connector);
    }

    /// Number of connectors that will be spawned
    #[must_use]
    pub fn connector_count(&self) -> usize {
        self.connectors.len()
    }

    fn build_platform_connectors(&mut self) {
        let policy = RetryPolicy::default();
        let platforms = self.config.platforms.clone();

        if platforms.youtube.enabled {
            match YouTubeConnector::new(platforms.youtube, policy.clone()) {
                Ok(c) => self.connectors.push(Box::new(c)),
                Err(e) => warn!(error = %e, "skipping youtube connector"),
            }
        }
        if platforms.kick.enabled {
            match KickConnector::new(
                platforms.kick,
                policy.clone(),
                Arc::clone(&self.credentials),
            ) {
                Ok(c) => self.connectors.push(Box::new(c)),
                Err(e) => warn!(error = %e, "skipping kick connector"),
            }
        }
        if platforms.tiktok.enabled {
            match TikTokConnector::new(platforms.tiktok, policy) {
                Ok(c) => self.connectors.push(Box::new(c)),
                Err(e) => warn!(error = %e, "skipping tiktok connector"),
            }
        }
    }

    /// Run until shutdown.
    ///
    /// With `live_gate` set, the pipeline first polls the named Twitch
    /// channel and only starts once it is live. Shutdown lets the in-flight
    /// utterance finish and gives every connector a bounded grace period.
    pub async fn run(
        mut self,
        mut shutdown: watch::Receiver<bool>,
        live_gate: Option<String>,
    ) -> Result<ShutdownKind> {
        if let Some(channel) = live_gate {
            let checker = LiveChecker::new(Arc::clone(&self.credentials))?;
            let went_live = wait_until_live(
                &checker,
                &channel,
                self.config.live_poll_interval,
                shutdown.clone(),
            )
            .await;
            if !went_live {
                return Ok(ShutdownKind::Clean);
            }
            // Give the stream a moment to settle before connecting
            tokio::select! {
                _ = shutdown.changed() => return Ok(ShutdownKind::Clean),
                () = tokio::time::sleep(crate::live::STABILIZATION_DELAY) => {}
            }
        }

        if self.connectors.is_empty() {
            warn!("no connectors available, pipeline running degraded");
        }

        let mut aggregator = Aggregator::new();
        let mut handles: Vec<ConnectorHandle> = Vec::new();
        for connector in self.connectors.drain(..) {
            let sink = aggregator.register(connector.platform(), self.config.source_queue_capacity);
            info!(platform = %connector.platform(), "starting connector");
            handles.push(ConnectorHandle::spawn(connector, sink));
        }

        let queue = SpeechQueue::new(self.config.speech_queue_capacity);
        let (worker_tx, worker_rx) = watch::channel(false);
        let worker = tokio::spawn(run_delivery(
            queue.clone(),
            Arc::clone(&self.backend),
            worker_rx,
        ));

        let voice = VoiceProfile {
            voice: self.config.tts.voice.clone(),
            rate: self.config.tts.rate,
            volume: self.config.tts.volume,
        };

        {
            // Fires once if every connector reaches a terminal state while
            // the pipeline is still up (retry budgets exhausted, say)
            let all_stopped =
                futures::future::join_all(handles.iter().map(ConnectorHandle::wait_stopped));
            tokio::pin!(all_stopped);
            let mut degraded_reported = handles.is_empty();

            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = &mut all_stopped, if !degraded_reported => {
                        warn!("all connectors stopped, pipeline running degraded");
                        degraded_reported = true;
                    }
                    event = aggregator.next() => {
                        match self.filter.evaluate(&event) {
                            Verdict::Pass => enqueue_event(
                                &queue,
                                &event,
                                &voice,
                                self.config.announce_platform,
                                self.config.announce_username,
                            ),
                            Verdict::Drop(reason) => {
                                debug!(platform = %event.platform, ?reason, "event dropped");
                            }
                        }
                    }
                }
            }
        }

        info!("shutting down");
        let mut kind = ShutdownKind::Clean;
        for handle in &mut handles {
            if !handle.stop(STOP_GRACE_PERIOD).await {
                kind = ShutdownKind::Forced;
            }
        }

        worker_tx.send_replace(true);
        let worker_abort = worker.abort_handle();
        if tokio::time::timeout(STOP_GRACE_PERIOD + Duration::from_secs(30), worker)
            .await
            .is_err()
        {
            warn!("delivery worker unresponsive, aborting");
            worker_abort.abort();
            kind = ShutdownKind::Forced;
        }

        let stats = self.filter.stats();
        info!(
            passed = stats.passed.load(std::sync::atomic::Ordering::Relaxed),
            filtered = stats.total_dropped(),
            overflow_events = aggregator.dropped(),
            overflow_utterances = queue.dropped(),
            "pipeline stopped"
        );
        Ok(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::EnvCredentials;
    use crate::event::SpeechRequest;
    use async_trait::async_trait;

    struct SilentBackend;

    #[async_trait]
    impl AudioBackend for SilentBackend {
        async fn speak(&self, _request: &SpeechRequest) -> Result<()> {
            Ok(())
        }
    }

    fn pipeline(config: Config) -> Result<Pipeline> {
        Pipeline::new(config, Arc::new(EnvCredentials), Arc::new(SilentBackend))
    }

    #[test]
    fn invalid_config_is_fatal_at_construction() {
        let mut config = Config::default();
        config.filters.min_length = 10;
        config.filters.max_length = 1;
        assert!(pipeline(config).is_err());
    }

    #[test]
    fn disabled_platforms_build_no_connectors() {
        let p = pipeline(Config::default()).unwrap();
        assert_eq!(p.connector_count(), 0);
    }

    #[test]
    fn misconfigured_platform_is_skipped_not_fatal() {
        let mut config = Config::default();
        // Enabled but with no identifiers to connect to
        config.platforms.youtube.enabled = true;
        let p = pipeline(config).unwrap();
        assert_eq!(p.connector_count(), 0);
    }

    #[test]
    fn configured_platforms_build_connectors() {
        let mut config = Config::default();
        config.platforms.kick.enabled = true;
        config.platforms.kick.channel = "somestreamer".to_string();
        config.platforms.youtube.enabled = true;
        config.platforms.youtube.video_id = "dQw4w9WgXcQ".to_string();
        let p = pipeline(config).unwrap();
        assert_eq!(p.connector_count(), 2);
    }

    #[tokio::test]
    async fn pipeline_outlives_connectors_that_stop_on_their_own() {
        use crate::connectors::{ConnectionState, Connector, ConnectorCtx};
        use crate::event::Platform;

        /// Exhausts itself immediately, as if every retry had failed
        struct ShortLivedConnector;

        #[async_trait]
        impl Connector for ShortLivedConnector {
            fn platform(&self) -> Platform {
                Platform::Kick
            }

            async fn run(self: Box<Self>, ctx: ConnectorCtx) {
                let _ = ctx.state.send(ConnectionState::Stopped);
            }
        }

        let mut p = pipeline(Config::default()).unwrap();
        p.add_connector(Box::new(ShortLivedConnector));
        let (tx, rx) = watch::channel(false);

        let run = tokio::spawn(p.run(rx, None));
        // The last connector going terminal must not bring the event loop down
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!run.is_finished());
        tx.send_replace(true);

        let kind = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("pipeline did not stop")
            .unwrap()
            .unwrap();
        assert_eq!(kind, ShutdownKind::Clean);
    }

    #[tokio::test]
    async fn degraded_pipeline_stops_cleanly() {
        let p = pipeline(Config::default()).unwrap();
        let (tx, rx) = watch::channel(false);

        let run = tokio::spawn(p.run(rx, None));
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send_replace(true);

        let kind = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("pipeline did not stop")
            .unwrap()
            .unwrap();
        assert_eq!(kind, ShutdownKind::Clean);
    }
}
