//! TikTok Live chat connector
//!
//! The live page embeds the stream's numeric room id; the webcast
//! websocket then pushes room events for that id. Only `WebcastChatMessage`
//! frames become chat events; gifts, likes, and member joins are ignored.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use regex::Regex;
use serde_json::Value;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::config::TikTokConfig;
use crate::event::{ChatEvent, Platform};
use crate::{Error, Result};

use super::supervisor::{FailureKind, RetryDecision, Supervisor};
use super::{connect_ws, Connector, ConnectorCtx, DedupWindow, RetryPolicy, CONNECT_TIMEOUT};

const WEBCAST_WS_URL: &str = "wss://webcast.tiktok.com/webcast/im/ws/";

const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/120.0.0.0 Safari/537.36";

/// Room chat client for one TikTok user's live stream
pub struct TikTokConnector {
    config: TikTokConfig,
    policy: RetryPolicy,
    client: reqwest::Client,
}

impl TikTokConnector {
    /// Build a connector for the configured user.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` when no username is configured or the HTTP
    /// client cannot be constructed.
    pub fn new(config: TikTokConfig, policy: RetryPolicy) -> Result<Self> {
        if config.username.trim().is_empty() {
            return Err(Error::Config(
                "tiktok connector needs a username".to_string(),
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
        })
    }

    /// Scrape the numeric room id from the user's live page
    async fn resolve_room_id(&self) -> Result<String> {
        let username = self.config.username.trim().trim_start_matches('@');
        let url = format!("https://www.tiktok.com/@{username}/live");

        debug!(%url, "resolving tiktok room id");
        let html = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let room_id = extract_room_id(&html).ok_or_else(|| {
            Error::Connector(format!("no live room found for tiktok user @{username}"))
        })?;
        if page_reports_offline(&html) {
            return Err(Error::Connector(format!(
                "tiktok user @{username} is not live"
            )));
        }
        Ok(room_id)
    }

    /// One websocket session; only returns `Ok` on requested shutdown
    async fn run_session(
        &self,
        room_id: &str,
        ctx: &mut ConnectorCtx,
        supervisor: &mut Supervisor,
        dedup: &mut DedupWindow,
    ) -> Result<()> {
        let url = format!(
            "{WEBCAST_WS_URL}?aid=1988&room_id={room_id}&version_code=180800&device_platform=web"
        );
        let mut ws = connect_ws(&url, CONNECT_TIMEOUT).await?;

        info!(room_id, "tiktok room connected");
        supervisor.live();
        let sink = ctx.sink.clone();

        loop {
            tokio::select! {
                _ = ctx.shutdown.changed() => {
                    let _ = ws.send(Message::Close(None)).await;
                    return Ok(());
                }
                frame = ws.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            if let Some(msg) = parse_chat_frame(&text) {
                                let fresh = match &msg.id {
                                    Some(id) => !dedup.is_duplicate(id),
                                    // No server id; forward without dedup
                                    None => true,
                                };
                                if fresh {
                                    let id = msg.id.unwrap_or_default();
                                    sink.push(ChatEvent::new(
                                        Platform::TikTok,
                                        msg.username,
                                        msg.text,
                                        id,
                                    ));
                                }
                            }
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            ws.send(Message::Pong(payload))
                                .await
                                .map_err(|e| Error::WebSocket(e.to_string()))?;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            return Err(Error::WebSocket("tiktok socket closed".to_string()));
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
}

#[async_trait]
impl Connector for TikTokConnector {
    fn platform(&self) -> Platform {
        Platform::TikTok
    }

    async fn run(self: Box<Self>, mut ctx: ConnectorCtx) {
        let mut supervisor = Supervisor::new(self.policy.clone(), ctx.state.clone());
        let mut dedup = DedupWindow::default();

        while !ctx.shutdown_requested() {
            supervisor.connecting();
            let session = match self.resolve_room_id().await {
                Ok(id) => {
                    self.run_session(&id, &mut ctx, &mut supervisor, &mut dedup)
                        .await
                }
                Err(e) => Err(e),
            };

            match session {
                Ok(()) => break,
                Err(e) => {
                    warn!(error = %e, "tiktok session failed");
                    match supervisor.failure(FailureKind::Transient) {
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

// -- page / frame parsing -----------------------------------------------------

struct ParsedMessage {
    id: Option<String>,
    username: String,
    text: String,
}

fn extract_room_id(html: &str) -> Option<String> {
    static JSON_KEY: OnceLock<Regex> = OnceLock::new();
    let json_key = JSON_KEY.get_or_init(|| {
        Regex::new(r#""roomId":"(\d+)""#).expect("static pattern")
    });
    if let Some(c) = json_key.captures(html) {
        return Some(c[1].to_string());
    }

    static QUERY_PARAM: OnceLock<Regex> = OnceLock::new();
    let query_param = QUERY_PARAM.get_or_init(|| {
        Regex::new(r"room_id=(\d+)").expect("static pattern")
    });
    query_param.captures(html).map(|c| c[1].to_string())
}

fn page_reports_offline(html: &str) -> bool {
    // Room status 4 means the stream has ended
    html.contains(r#""status":4"#)
}

/// Parse a webcast chat frame; non-chat room events yield `None`
fn parse_chat_frame(raw: &str) -> Option<ParsedMessage> {
    let frame: Value = serde_json::from_str(raw).ok()?;
    if frame.get("type").and_then(Value::as_str) != Some("WebcastChatMessage") {
        return None;
    }

    let text = frame.get("comment").and_then(Value::as_str)?.to_string();
    if text.trim().is_empty() {
        return None;
    }

    let user = frame.get("user");
    let username = user
        .and_then(|u| u.get("nickname"))
        .and_then(Value::as_str)
        .or_else(|| {
            user.and_then(|u| u.get("unique_id"))
                .and_then(Value::as_str)
        })
        .unwrap_or("someone")
        .to_string();

    let id = frame
        .get("msgId")
        .and_then(Value::as_str)
        .map(String::from);

    Some(ParsedMessage { id, username, text })
}

#[cfg(test)]
mod tests {
    use super::*;

    // -- room id extraction ---------------------------------------------------

    #[test]
    fn extracts_room_id_from_embedded_json() {
        let html = r#"{"liveRoom":{"roomId":"7301234567890123456","title":"hi"}}"#;
        assert_eq!(
            extract_room_id(html),
            Some("7301234567890123456".to_string())
        );
    }

    #[test]
    fn extracts_room_id_from_query_param_fallback() {
        let html = r#"<a href="/share?room_id=42424242">share</a>"#;
        assert_eq!(extract_room_id(html), Some("42424242".to_string()));
    }

    #[test]
    fn page_without_room_yields_none() {
        assert_eq!(extract_room_id("<html>no stream</html>"), None);
    }

    #[test]
    fn ended_stream_is_reported_offline() {
        assert!(page_reports_offline(r#"{"liveRoom":{"status":4}}"#));
        assert!(!page_reports_offline(r#"{"liveRoom":{"status":2}}"#));
    }

    // -- frame parsing --------------------------------------------------------

    #[test]
    fn parses_chat_message_frame() {
        let raw = r#"{"type":"WebcastChatMessage","msgId":"m-1","comment":"hello","user":{"nickname":"bob","unique_id":"bob123"}}"#;
        let msg = parse_chat_frame(raw).unwrap();
        assert_eq!(msg.id.as_deref(), Some("m-1"));
        assert_eq!(msg.username, "bob");
        assert_eq!(msg.text, "hello");
    }

    #[test]
    fn falls_back_to_unique_id_when_nickname_missing() {
        let raw = r#"{"type":"WebcastChatMessage","comment":"hi","user":{"unique_id":"bob123"}}"#;
        let msg = parse_chat_frame(raw).unwrap();
        assert_eq!(msg.username, "bob123");
        assert!(msg.id.is_none());
    }

    #[test]
    fn non_chat_room_events_are_ignored() {
        for raw in [
            r#"{"type":"WebcastGiftMessage","comment":"rose"}"#,
            r#"{"type":"WebcastLikeMessage"}"#,
            r#"{"type":"WebcastMemberMessage","user":{"nickname":"sam"}}"#,
        ] {
            assert!(parse_chat_frame(raw).is_none(), "frame: {raw}");
        }
    }

    #[test]
    fn empty_comment_is_skipped() {
        let raw = r#"{"type":"WebcastChatMessage","comment":"  ","user":{"nickname":"bob"}}"#;
        assert!(parse_chat_frame(raw).is_none());
    }
}
