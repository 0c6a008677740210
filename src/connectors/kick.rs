//! Kick.com chat connector
//!
//! Kick chat rides on Pusher: discover the channel's chatroom id through
//! the REST API (or a page scrape when the API is fronted by a bot check),
//! open the public Pusher websocket, and subscribe to the chatroom channel.
//! Chat messages arrive as `App\Events\ChatMessageEvent` frames whose
//! `data` field is itself a JSON-encoded string.

use std::sync::Arc;
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use regex::Regex;
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::aggregator::SourceSink;
use crate::config::KickConfig;
use crate::credentials::{reveal, CredentialStore};
use crate::event::{ChatEvent, Platform};
use crate::{Error, Result};

use super::supervisor::{FailureKind, RetryDecision, Supervisor};
use super::{connect_ws, Connector, ConnectorCtx, DedupWindow, RetryPolicy, CONNECT_TIMEOUT};

/// Kick's public Pusher application endpoint
const PUSHER_URL: &str = "wss://ws-us2.pusher.com/app/32cbd69e4b950bf97679\
?protocol=7&client=js&version=8.4.0-rc2&flash=false";

const CHANNELS_API_V2: &str = "https://kick.com/api/v2/channels/";
const CHANNELS_API_V1: &str = "https://kick.com/api/v1/channels/";

const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/120.0.0.0 Safari/537.36";

const CHAT_MESSAGE_EVENT: &str = r"App\Events\ChatMessageEvent";

/// Keepalive ping cadence while the socket is idle
const PING_INTERVAL: Duration = Duration::from_secs(60);

/// Bound on the wait for `pusher:connection_established`
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Pusher chat client for one Kick channel
pub struct KickConnector {
    config: KickConfig,
    policy: RetryPolicy,
    client: reqwest::Client,
    credentials: Arc<dyn CredentialStore>,
}

impl KickConnector {
    /// Build a connector for the configured channel.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` when no channel is configured or the HTTP
    /// client cannot be constructed.
    pub fn new(
        config: KickConfig,
        policy: RetryPolicy,
        credentials: Arc<dyn CredentialStore>,
    ) -> Result<Self> {
        if config.channel.trim().is_empty() && config.chatroom_id.is_none() {
            return Err(Error::Config(
                "kick connector needs a channel name or chatroom_id".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| Error::Config(format!("http client: {e}")))?;
        Ok(Self {
            config,
            policy,
            client,
            credentials,
        })
    }

    /// Resolve the chatroom id: explicit config, v2 API, v1 API, then the
    /// channel page as a last resort
    async fn resolve_chatroom_id(&self) -> Result<u64> {
        if let Some(id) = self.config.chatroom_id {
            return Ok(id);
        }

        let channel = self.config.channel.trim();
        let mut auth_failure = None;
        for api in [CHANNELS_API_V2, CHANNELS_API_V1] {
            match self.fetch_chatroom_id(&format!("{api}{channel}")).await {
                Ok(id) => return Ok(id),
                Err(e) => {
                    debug!(error = %e, %api, "chatroom lookup failed");
                    if matches!(e, Error::Auth(_)) {
                        auth_failure = Some(e);
                    }
                }
            }
        }

        // API fronted by a bot check; the channel page embeds the same id.
        // A 403 on the API still surfaces as an auth failure if the page
        // does not pan out either, so it burns the auth budget, not the
        // transient one.
        match self.scrape_chatroom_id(channel).await {
            Ok(id) => Ok(id),
            Err(e) => Err(auth_failure.unwrap_or(e)),
        }
    }

    async fn scrape_chatroom_id(&self, channel: &str) -> Result<u64> {
        let html = self
            .client
            .get(format!("https://kick.com/{channel}"))
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        extract_chatroom_id_from_page(&html).ok_or_else(|| {
            Error::Connector(format!("could not resolve chatroom id for kick channel {channel}"))
        })
    }

    async fn fetch_chatroom_id(&self, url: &str) -> Result<u64> {
        let mut request = self.client.get(url);
        if let Some(cookie) = self.credentials.secret("kick", "session_cookie") {
            request = request.header(reqwest::header::COOKIE, reveal(&cookie));
        }

        let response = request.send().await?;
        if response.status() == reqwest::StatusCode::FORBIDDEN {
            return Err(Error::Auth(
                "kick API refused the request (set CHORUS_KICK_SESSION_COOKIE)".to_string(),
            ));
        }
        let body: Value = response.error_for_status()?.json().await?;
        body.pointer("/chatroom/id")
            .and_then(Value::as_u64)
            .ok_or_else(|| Error::Connector("channel response carries no chatroom id".to_string()))
    }

    /// One websocket session: subscribe, then read until the socket drops
    /// or shutdown is requested. Only returns `Ok` on requested shutdown.
    async fn run_session(
        &self,
        chatroom_id: u64,
        ctx: &mut ConnectorCtx,
        supervisor: &mut Supervisor,
        dedup: &mut DedupWindow,
    ) -> Result<()> {
        let mut ws = connect_ws(PUSHER_URL, CONNECT_TIMEOUT).await?;

        // Pusher greets with connection_established before accepting
        // subscriptions
        tokio::time::timeout(HANDSHAKE_TIMEOUT, async {
            while let Some(frame) = ws.next().await {
                let frame = frame.map_err(|e| Error::WebSocket(e.to_string()))?;
                if let Message::Text(text) = frame {
                    let event = serde_json::from_str::<Value>(&text)
                        .ok()
                        .and_then(|v| {
                            v.get("event").and_then(Value::as_str).map(String::from)
                        });
                    if event.as_deref() == Some("pusher:connection_established") {
                        return Ok(());
                    }
                }
            }
            Err(Error::WebSocket(
                "kick socket closed during handshake".to_string(),
            ))
        })
        .await
        .map_err(|_| Error::WebSocket("pusher handshake timed out".to_string()))??;

        let subscribe = json!({
            "event": "pusher:subscribe",
            "data": {
                "auth": "",
                "channel": format!("chatrooms.{chatroom_id}.v2"),
            }
        });
        ws.send(Message::Text(subscribe.to_string()))
            .await
            .map_err(|e| Error::WebSocket(e.to_string()))?;

        info!(chatroom_id, "kick chatroom subscribed");
        supervisor.live();

        let sink = ctx.sink.clone();
        let mut ping = tokio::time::interval(PING_INTERVAL);
        ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ping.tick().await; // first tick fires immediately

        loop {
            tokio::select! {
                _ = ctx.shutdown.changed() => {
                    let _ = ws.send(Message::Close(None)).await;
                    return Ok(());
                }
                _ = ping.tick() => {
                    let frame = json!({"event": "pusher:ping", "data": {}});
                    ws.send(Message::Text(frame.to_string()))
                        .await
                        .map_err(|e| Error::WebSocket(e.to_string()))?;
                }
                frame = ws.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            if let Some(reply) = self.handle_frame(&text, &sink, dedup) {
                                ws.send(Message::Text(reply))
                                    .await
                                    .map_err(|e| Error::WebSocket(e.to_string()))?;
                            }
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            ws.send(Message::Pong(payload))
                                .await
                                .map_err(|e| Error::WebSocket(e.to_string()))?;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            return Err(Error::WebSocket("kick socket closed".to_string()));
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            return Err(Error::WebSocket(e.to_string()));
                        }
                    }
                }
            }
        }
    }

    /// Dispatch one Pusher text frame; returns a reply frame when one is due
    fn handle_frame(
        &self,
        raw: &str,
        sink: &SourceSink,
        dedup: &mut DedupWindow,
    ) -> Option<String> {
        let frame: Value = match serde_json::from_str(raw) {
            Ok(v) => v,
            Err(e) => {
                debug!(error = %e, "unparseable pusher frame");
                return None;
            }
        };

        match frame.get("event").and_then(Value::as_str) {
            Some("pusher:ping") => {
                Some(json!({"event": "pusher:pong", "data": {}}).to_string())
            }
            Some(CHAT_MESSAGE_EVENT) => {
                let Some(msg) = frame
                    .get("data")
                    .and_then(Value::as_str)
                    .and_then(parse_chat_message)
                else {
                    return None;
                };
                if !dedup.is_duplicate(&msg.id) {
                    sink.push(ChatEvent::new(Platform::Kick, msg.username, msg.text, msg.id));
                }
                None
            }
            _ => None,
        }
    }
}

#[async_trait]
impl Connector for KickConnector {
    fn platform(&self) -> Platform {
        Platform::Kick
    }

    async fn run(self: Box<Self>, mut ctx: ConnectorCtx) {
        let mut supervisor = Supervisor::new(self.policy.clone(), ctx.state.clone());
        let mut dedup = DedupWindow::default();

        while !ctx.shutdown_requested() {
            supervisor.connecting();
            let session = match self.resolve_chatroom_id().await {
                Ok(id) => self.run_session(id, &mut ctx, &mut supervisor, &mut dedup).await,
                Err(e) => Err(e),
            };

            match session {
                Ok(()) => break,
                Err(e) => {
                    warn!(error = %e, "kick session failed");
                    match supervisor.failure(classify(&e)) {
                        RetryDecision::RetryAfter(delay) => {
                            if ctx.sleep_cancellable(delay).await {
                                break;
                            }
                        }
                        RetryDecision::GiveUp => return,
                    }
                }
            }
        }

        supervisor.stopped();
    }
}

/// Map a session error onto the supervisor's failure budgets
fn classify(error: &Error) -> FailureKind {
    if matches!(error, Error::Auth(_)) {
        FailureKind::Auth
    } else {
        FailureKind::Transient
    }
}

// -- frame parsing ------------------------------------------------------------

struct ParsedMessage {
    id: String,
    username: String,
    text: String,
}

/// Parse the double-encoded `data` payload of a chat message event
fn parse_chat_message(data: &str) -> Option<ParsedMessage> {
    let payload: Value = serde_json::from_str(data).ok()?;
    let id = payload.get("id").and_then(Value::as_str)?.to_string();
    let text = payload.get("content").and_then(Value::as_str)?.to_string();
    let username = payload
        .pointer("/sender/username")
        .and_then(Value::as_str)
        .unwrap_or("someone")
        .to_string();
    if text.trim().is_empty() {
        return None;
    }
    Some(ParsedMessage { id, username, text })
}

fn extract_chatroom_id_from_page(html: &str) -> Option<u64> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let pattern = RE.get_or_init(|| {
        Regex::new(r#""chatroom":\s*\{\s*"id":\s*(\d+)"#).expect("static pattern")
    });
    pattern
        .captures(html)
        .and_then(|c| c[1].parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    // -- chat message parsing -------------------------------------------------

    #[test]
    fn parses_chat_message_payload() {
        let data = r#"{"id":"abc-123","content":"hello chat","sender":{"id":9,"username":"bob"}}"#;
        let msg = parse_chat_message(data).unwrap();
        assert_eq!(msg.id, "abc-123");
        assert_eq!(msg.username, "bob");
        assert_eq!(msg.text, "hello chat");
    }

    #[test]
    fn empty_content_is_skipped() {
        let data = r#"{"id":"abc","content":"   ","sender":{"username":"bob"}}"#;
        assert!(parse_chat_message(data).is_none());
    }

    #[test]
    fn malformed_payload_is_skipped() {
        assert!(parse_chat_message("not json").is_none());
        assert!(parse_chat_message(r#"{"content":"no id"}"#).is_none());
    }

    // -- page scraping --------------------------------------------------------

    #[test]
    fn scrapes_chatroom_id_from_channel_page() {
        let html = r#"<script>window.__DATA = {"chatroom":{"id":123456,"chatable_type":"App"}}</script>"#;
        assert_eq!(extract_chatroom_id_from_page(html), Some(123_456));
    }

    #[test]
    fn page_without_chatroom_yields_none() {
        assert_eq!(extract_chatroom_id_from_page("<html></html>"), None);
    }

    // -- failure classification -----------------------------------------------

    #[test]
    fn forbidden_discovery_counts_against_the_auth_budget() {
        // The shape fetch_chatroom_id produces on a 403
        let refused = Error::Auth(
            "kick API refused the request (set CHORUS_KICK_SESSION_COOKIE)".to_string(),
        );
        assert_eq!(classify(&refused), FailureKind::Auth);
    }

    #[test]
    fn other_session_errors_stay_transient() {
        for error in [
            Error::WebSocket("kick socket closed".to_string()),
            Error::Connector("could not resolve chatroom id for kick channel x".to_string()),
        ] {
            assert_eq!(classify(&error), FailureKind::Transient, "error: {error}");
        }
    }

    // -- frame event names ----------------------------------------------------

    #[test]
    fn chat_event_name_matches_pusher_wire_format() {
        // The wire frame carries escaped backslashes; after JSON decoding
        // the event name is the plain namespaced class path
        let raw = r#"{"event":"App\\Events\\ChatMessageEvent","data":"{}"}"#;
        let frame: Value = serde_json::from_str(raw).unwrap();
        assert_eq!(
            frame.get("event").and_then(Value::as_str),
            Some(CHAT_MESSAGE_EVENT)
        );
    }
}
