//! YouTube Live chat connector
//!
//! YouTube live chat is read by polling the InnerTube `get_live_chat`
//! endpoint: fetch the watch page once to scrape the API key and the
//! live-chat continuation token, then poll with that token, rotating to
//! the fresh continuation each response hands back. No credential is
//! required; the watch page serves both bootstrap values to anonymous
//! clients.

use std::sync::OnceLock;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::YouTubeConfig;
use crate::event::{ChatEvent, Platform};
use crate::{Error, Result};

use super::supervisor::{FailureKind, RetryDecision, Supervisor};
use super::{Connector, ConnectorCtx, DedupWindow, RetryPolicy};

const WATCH_URL: &str = "https://www.youtube.com/watch?v=";
const INNERTUBE_URL: &str = "https://www.youtube.com/youtubei/v1/live_chat/get_live_chat";
const CLIENT_VERSION: &str = "2.20240101.00.00";

const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/120.0.0.0 Safari/537.36";

/// Default delay between polls when the response carries no timeout hint
const DEFAULT_POLL_DELAY: Duration = Duration::from_secs(2);

/// Bounds on the server-suggested poll delay
const MIN_POLL_DELAY: Duration = Duration::from_millis(500);
const MAX_POLL_DELAY: Duration = Duration::from_secs(10);

/// Live chat poller for one YouTube stream
#[derive(Debug)]
pub struct YouTubeConnector {
    config: YouTubeConfig,
    policy: RetryPolicy,
    client: reqwest::Client,
}

/// Bootstrap state scraped from the watch page
struct PollSession {
    api_key: String,
    continuation: String,
    /// Epoch microseconds at session open; earlier messages are replayed
    /// history and get skipped
    started_usec: u64,
}

impl YouTubeConnector {
    /// Build a connector for the configured stream.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` when neither a video id nor a channel is
    /// configured, or when the HTTP client cannot be constructed.
    pub fn new(config: YouTubeConfig, policy: RetryPolicy) -> Result<Self> {
        if config.video_id.trim().is_empty() && config.channel.trim().is_empty() {
            return Err(Error::Config(
                "youtube connector needs video_id or channel".to_string(),
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

    /// Resolve the stream's video id: explicit config first, channel
    /// `/live` page second.
    async fn resolve_video_id(&self) -> Result<String> {
        if let Some(id) = extract_video_id(&self.config.video_id) {
            return Ok(id);
        }

        let handle = self.config.channel.trim();
        let url = if handle.starts_with("http") {
            format!("{}/live", handle.trim_end_matches('/'))
        } else {
            let handle = handle.strip_prefix('@').unwrap_or(handle);
            format!("https://www.youtube.com/@{handle}/live")
        };

        debug!(%url, "resolving live video id from channel");
        let html = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        extract_live_video_id(&html).ok_or_else(|| {
            Error::Connector(format!(
                "no live stream found for youtube channel {handle}"
            ))
        })
    }

    /// Scrape the API key and the live-chat continuation from a watch page
    async fn open_session(&self, video_id: &str) -> Result<PollSession> {
        let url = format!("{WATCH_URL}{video_id}");
        let html = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let api_key = extract_api_key(&html)
            .ok_or_else(|| Error::Connector("watch page carries no API key".to_string()))?;
        let continuation = extract_initial_continuation(&html).ok_or_else(|| {
            Error::Connector("watch page carries no live chat continuation".to_string())
        })?;

        let started_usec = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_micros()).unwrap_or(u64::MAX))
            .unwrap_or(0);

        Ok(PollSession {
            api_key,
            continuation,
            started_usec,
        })
    }

    /// One `get_live_chat` round trip; rotates the session's continuation
    async fn poll(&self, session: &mut PollSession) -> Result<(Vec<ParsedMessage>, Duration)> {
        let url = format!("{INNERTUBE_URL}?key={}", session.api_key);
        let body = json!({
            "context": {
                "client": {
                    "clientName": "WEB",
                    "clientVersion": CLIENT_VERSION,
                }
            },
            "continuation": session.continuation,
        });

        let response: Value = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let parsed = parse_chat_response(&response);
        let Some(continuation) = parsed.continuation else {
            // The stream ended or the chat was disabled; both are terminal
            // for this session and trigger a fresh bootstrap.
            return Err(Error::Connector(
                "live chat response carries no continuation".to_string(),
            ));
        };
        session.continuation = continuation;

        let delay = parsed
            .timeout_ms
            .map_or(DEFAULT_POLL_DELAY, Duration::from_millis)
            .clamp(MIN_POLL_DELAY, MAX_POLL_DELAY);

        Ok((parsed.messages, delay))
    }
}

#[async_trait]
impl Connector for YouTubeConnector {
    fn platform(&self) -> Platform {
        Platform::YouTube
    }

    async fn run(self: Box<Self>, mut ctx: ConnectorCtx) {
        let mut supervisor = Supervisor::new(self.policy.clone(), ctx.state.clone());
        let mut dedup = DedupWindow::default();
        let mut session: Option<PollSession> = None;

        while !ctx.shutdown_requested() {
            if session.is_none() {
                supervisor.connecting();
                let opened = match self.resolve_video_id().await {
                    Ok(id) => self.open_session(&id).await,
                    Err(e) => Err(e),
                };
                match opened {
                    Ok(s) => {
                        info!("youtube live chat session opened");
                        supervisor.live();
                        session = Some(s);
                    }
                    Err(e) => {
                        warn!(error = %e, "youtube session bootstrap failed");
                        match supervisor.failure(classify(&e)) {
                            RetryDecision::RetryAfter(delay) => {
                                if ctx.sleep_cancellable(delay).await {
                                    break;
                                }
                                continue;
                            }
                            RetryDecision::GiveUp => return,
                        }
                    }
                }
            }
            let Some(current) = session.as_mut() else {
                continue;
            };
            let started = current.started_usec;

            match self.poll(current).await {
                Ok((messages, delay)) => {
                    for msg in messages {
                        // Replayed pre-session history and reconnect
                        // redeliveries both get skipped
                        if msg.timestamp_usec < started {
                            continue;
                        }
                        if dedup.is_duplicate(&msg.id) {
                            continue;
                        }
                        ctx.sink.push(ChatEvent::new(
                            Platform::YouTube,
                            msg.author,
                            msg.text,
                            msg.id,
                        ));
                    }
                    if ctx.sleep_cancellable(delay).await {
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "youtube poll failed");
                    session = None;
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

fn classify(error: &Error) -> FailureKind {
    if let Error::Http(e) = error {
        if let Some(status) = e.status() {
            if status == reqwest::StatusCode::UNAUTHORIZED
                || status == reqwest::StatusCode::FORBIDDEN
            {
                return FailureKind::Auth;
            }
        }
    }
    FailureKind::Transient
}

// -- watch page / response parsing --------------------------------------------

struct ParsedMessage {
    id: String,
    author: String,
    text: String,
    timestamp_usec: u64,
}

struct ParsedResponse {
    messages: Vec<ParsedMessage>,
    continuation: Option<String>,
    timeout_ms: Option<u64>,
}

/// Normalize a video id from a raw id, watch URL, share URL, or live URL
fn extract_video_id(input: &str) -> Option<String> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    static ID: OnceLock<Regex> = OnceLock::new();
    let id_pattern = ID.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9_-]{11}$").expect("static pattern")
    });
    if id_pattern.is_match(input) {
        return Some(input.to_string());
    }

    static URL: OnceLock<Regex> = OnceLock::new();
    let url_pattern = URL.get_or_init(|| {
        Regex::new(r"(?:v=|youtu\.be/|/live/|/shorts/)([A-Za-z0-9_-]{11})")
            .expect("static pattern")
    });
    url_pattern
        .captures(input)
        .map(|c| c[1].to_string())
}

/// Pull the live video id out of a channel `/live` page
fn extract_live_video_id(html: &str) -> Option<String> {
    static CANONICAL: OnceLock<Regex> = OnceLock::new();
    let canonical = CANONICAL.get_or_init(|| {
        Regex::new(r#"<link rel="canonical" href="https://www\.youtube\.com/watch\?v=([A-Za-z0-9_-]{11})""#)
            .expect("static pattern")
    });
    if let Some(c) = canonical.captures(html) {
        return Some(c[1].to_string());
    }

    static VIDEO_ID: OnceLock<Regex> = OnceLock::new();
    let video_id = VIDEO_ID.get_or_init(|| {
        Regex::new(r#""videoId":"([A-Za-z0-9_-]{11})""#).expect("static pattern")
    });
    video_id.captures(html).map(|c| c[1].to_string())
}

fn extract_api_key(html: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let pattern = RE.get_or_init(|| {
        Regex::new(r#""INNERTUBE_API_KEY":"([^"]+)""#).expect("static pattern")
    });
    pattern.captures(html).map(|c| c[1].to_string())
}

/// The first continuation token after the live chat renderer marker is the
/// chat poll token; earlier tokens on the page belong to other surfaces.
fn extract_initial_continuation(html: &str) -> Option<String> {
    let idx = html.find("\"liveChatRenderer\"")?;
    static RE: OnceLock<Regex> = OnceLock::new();
    let pattern = RE.get_or_init(|| {
        Regex::new(r#""continuation":"([^"]+)""#).expect("static pattern")
    });
    pattern.captures(&html[idx..]).map(|c| c[1].to_string())
}

fn parse_chat_response(response: &Value) -> ParsedResponse {
    let chat = response.pointer("/continuationContents/liveChatContinuation");

    let mut continuation = None;
    let mut timeout_ms = None;
    if let Some(entries) = chat
        .and_then(|c| c.get("continuations"))
        .and_then(Value::as_array)
    {
        for entry in entries {
            for key in [
                "invalidationContinuationData",
                "timedContinuationData",
                "reloadContinuationData",
            ] {
                if let Some(data) = entry.get(key) {
                    continuation = data
                        .get("continuation")
                        .and_then(Value::as_str)
                        .map(String::from);
                    timeout_ms = data.get("timeoutMs").and_then(Value::as_u64);
                }
            }
            if continuation.is_some() {
                break;
            }
        }
    }

    let mut messages = Vec::new();
    if let Some(actions) = chat.and_then(|c| c.get("actions")).and_then(Value::as_array) {
        for action in actions {
            let Some(item) = action.pointer("/addChatItemAction/item") else {
                continue;
            };
            // Paid messages share the text renderer's shape
            let renderer = item
                .get("liveChatTextMessageRenderer")
                .or_else(|| item.get("liveChatPaidMessageRenderer"));
            if let Some(msg) = renderer.and_then(parse_message_renderer) {
                messages.push(msg);
            }
        }
    }

    ParsedResponse {
        messages,
        continuation,
        timeout_ms,
    }
}

fn parse_message_renderer(renderer: &Value) -> Option<ParsedMessage> {
    let id = renderer.get("id").and_then(Value::as_str)?.to_string();
    let author = renderer
        .pointer("/authorName/simpleText")
        .and_then(Value::as_str)
        .unwrap_or("someone")
        .to_string();
    let timestamp_usec = renderer
        .get("timestampUsec")
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);

    let runs = renderer.pointer("/message/runs").and_then(Value::as_array)?;
    let mut text = String::new();
    for run in runs {
        if let Some(t) = run.get("text").and_then(Value::as_str) {
            text.push_str(t);
        } else if let Some(shortcut) = run
            .pointer("/emoji/shortcuts/0")
            .and_then(Value::as_str)
        {
            text.push_str(shortcut);
        }
    }
    if text.trim().is_empty() {
        return None;
    }

    Some(ParsedMessage {
        id,
        author,
        text,
        timestamp_usec,
    })
}
