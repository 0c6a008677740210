//! Live-status gate
//!
//! Optionally holds the whole pipeline back until a Twitch channel goes
//! live, so the reader starts speaking when the stream starts. Uses the
//! Helix API when credentials are available and falls back to scraping the
//! channel page otherwise. A failed check counts as "not live" — the gate
//! never aborts on a network blip.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::credentials::{reveal, CredentialStore};
use crate::{Error, Result};

const HELIX_STREAMS_URL: &str = "https://api.twitch.tv/helix/streams";

/// Pause after the live signal before starting the pipeline, giving the
/// stream a moment to settle
pub const STABILIZATION_DELAY: Duration = Duration::from_secs(5);

const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/120.0.0.0 Safari/537.36";

/// Twitch live-status checker
pub struct LiveChecker {
    client: reqwest::Client,
    credentials: Arc<dyn CredentialStore>,
}

impl LiveChecker {
    /// Build a checker using the given credential source.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` when the HTTP client cannot be constructed.
    pub fn new(credentials: Arc<dyn CredentialStore>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Config(format!("http client: {e}")))?;
        Ok(Self {
            client,
            credentials,
        })
    }

    /// Check whether the channel is currently live.
    ///
    /// # Errors
    ///
    /// Returns `Error::LiveCheck` when neither the API nor the page yields
    /// an answer; callers treat that as "not live".
    pub async fn is_live(&self, channel: &str) -> Result<bool> {
        let client_id = self.credentials.secret("twitch", "client_id");
        let token = self.credentials.secret("twitch", "token");

        if let (Some(client_id), Some(token)) = (client_id, token) {
            match self.check_helix(channel, reveal(&client_id), reveal(&token)).await {
                Ok(live) => return Ok(live),
                Err(e) => debug!(error = %e, "helix check failed, trying page scrape"),
            }
        }

        self.check_page(channel).await
    }

    /// Helix reports a stream object only while the channel is live
    async fn check_helix(&self, channel: &str, client_id: &str, token: &str) -> Result<bool> {
        let response: Value = self
            .client
            .get(HELIX_STREAMS_URL)
            .query(&[("user_login", channel)])
            .header("Client-Id", client_id)
            .bearer_auth(token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let live = response
            .get("data")
            .and_then(Value::as_array)
            .is_some_and(|streams| !streams.is_empty());
        Ok(live)
    }

    /// The channel page embeds a VideoObject with `isLiveBroadcast` while
    /// the stream is up
    async fn check_page(&self, channel: &str) -> Result<bool> {
        let url = format!("https://www.twitch.tv/{channel}");
        let html = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| Error::LiveCheck(format!("channel page: {e}")))?
            .text()
            .await?;

        Ok(page_reports_live(&html))
    }
}

fn page_reports_live(html: &str) -> bool {
    html.contains(r#""isLiveBroadcast":true"#)
}

/// Poll until the channel goes live or shutdown is requested.
///
/// Returns `true` when the channel went live, `false` on shutdown. Check
/// failures are logged and treated as "not live".
pub async fn wait_until_live(
    checker: &LiveChecker,
    channel: &str,
    poll_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> bool {
    info!(channel, "waiting for channel to go live");
    loop {
        match checker.is_live(channel).await {
            Ok(true) => {
                info!(channel, "channel is live");
                return true;
            }
            Ok(false) => debug!(channel, "not live yet"),
            Err(e) => warn!(error = %e, "live check failed"),
        }

        tokio::select! {
            _ = shutdown.changed() => return false,
            () = tokio::time::sleep(poll_interval) => {}
        }
    }
}
