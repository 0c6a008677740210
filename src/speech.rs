//! Serialized speech delivery
//!
//! Filtered events become utterances in a bounded FIFO drained by exactly
//! one worker, so speech never overlaps and arrival order is preserved.
//! Overflow during a long utterance drops the oldest waiting item: stale
//! chat is worth less than fresh chat.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use regex::Regex;
use tokio::sync::{watch, Notify};
use tracing::{debug, info, warn};

use crate::audio::AudioBackend;
use crate::event::{ChatEvent, SpeechRequest, VoiceProfile};

/// Render an event as spoken text.
///
/// Usernames get decorative digits, underscores, and dashes collapsed to
/// spaces so the synthesizer doesn't spell them out; a username that is
/// nothing but decoration becomes "someone".
#[must_use]
pub fn format_utterance(event: &ChatEvent, announce_platform: bool, announce_username: bool) -> String {
    let mut spoken = String::new();
    if announce_platform {
        spoken.push_str(event.platform.name());
        spoken.push_str(", ");
    }
    if announce_username {
        spoken.push_str(&speakable_username(&event.username));
        spoken.push_str(" says, ");
    }
    spoken.push_str(&event.text);
    spoken
}

fn speakable_username(username: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let decoration = RE.get_or_init(|| Regex::new(r"[_\-\d]+").expect("static pattern"));
    let cleaned = decoration.replace_all(username, " ");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        "someone".to_string()
    } else {
        cleaned.to_string()
    }
}

struct Inner {
    pending: Mutex<VecDeque<SpeechRequest>>,
    capacity: usize,
    notify: Notify,
    dropped: AtomicU64,
}

/// Bounded utterance queue feeding the delivery worker
#[derive(Clone)]
pub struct SpeechQueue {
    inner: Arc<Inner>,
}

impl SpeechQueue {
    /// Create a queue holding at most `capacity` waiting utterances
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                pending: Mutex::new(VecDeque::with_capacity(capacity)),
                capacity,
                notify: Notify::new(),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    /// Enqueue an utterance, evicting the oldest waiting one when full
    pub fn push(&self, request: SpeechRequest) {
        {
            let mut pending = self.inner.pending.lock().expect("speech queue poisoned");
            if pending.len() >= self.inner.capacity {
                pending.pop_front();
                let dropped = self.inner.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(dropped, "speech queue full, dropped oldest utterance");
            }
            pending.push_back(request);
        }
        self.inner.notify.notify_one();
    }

    fn try_pop(&self) -> Option<SpeechRequest> {
        self.inner
            .pending
            .lock()
            .expect("speech queue poisoned")
            .pop_front()
    }

    /// Wait for and dequeue the next utterance
    pub async fn next(&self) -> SpeechRequest {
        loop {
            let notified = self.inner.notify.notified();
            if let Some(request) = self.try_pop() {
                return request;
            }
            notified.await;
        }
    }

    /// Number of waiting utterances
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.pending.lock().expect("speech queue poisoned").len()
    }

    /// Whether the queue has no waiting utterances
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total utterances dropped to overflow
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }
}

/// Drive the single delivery worker until shutdown.
///
/// Exactly one utterance is in flight at a time. A failed utterance is
/// logged and skipped; it never takes the worker down. On shutdown the
/// in-flight utterance finishes, waiting items are discarded.
pub async fn run_delivery(
    queue: SpeechQueue,
    backend: Arc<dyn AudioBackend>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let request = tokio::select! {
            _ = shutdown.changed() => break,
            request = queue.next() => request,
        };

        // Deliberately not cancellable: a started utterance finishes
        if let Err(e) = backend.speak(&request).await {
            warn!(error = %e, "utterance failed, skipping");
        }

        if *shutdown.borrow() {
            break;
        }
    }

    let discarded = queue.len();
    if discarded > 0 {
        info!(discarded, "delivery stopped with utterances waiting");
    }
}

/// Convenience: format an event and enqueue it
pub fn enqueue_event(
    queue: &SpeechQueue,
    event: &ChatEvent,
    voice: &VoiceProfile,
    announce_platform: bool,
    announce_username: bool,
) {
    queue.push(SpeechRequest {
        text: format_utterance(event, announce_platform, announce_username),
        voice: voice.clone(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Platform;
    use async_trait::async_trait;
    use std::time::Duration;

    fn event(platform: Platform, username: &str, text: &str) -> ChatEvent {
        ChatEvent::new(platform, username, text, "id")
    }

    fn request(text: &str) -> SpeechRequest {
        SpeechRequest {
            text: text.to_string(),
            voice: VoiceProfile::default(),
        }
    }

    // -- formatting -----------------------------------------------------------

    #[test]
    fn full_announcement() {
        let ev = event(Platform::Kick, "bob", "hello there");
        assert_eq!(
            format_utterance(&ev, true, true),
            "Kick, bob says, hello there"
        );
    }

    #[test]
    fn text_only_when_announcements_disabled() {
        let ev = event(Platform::YouTube, "bob", "hello");
        assert_eq!(format_utterance(&ev, false, false), "hello");
    }

    #[test]
    fn username_decoration_collapses_to_spaces() {
        let ev = event(Platform::TikTok, "xx_gamer_42", "hi");
        assert_eq!(format_utterance(&ev, false, true), "xx gamer says, hi");
    }

    #[test]
    fn all_decoration_username_becomes_someone() {
        let ev = event(Platform::Kick, "_-123-_", "hi");
        assert_eq!(format_utterance(&ev, false, true), "someone says, hi");
    }

    // -- queue ----------------------------------------------------------------

    #[test]
    fn fifo_order() {
        let queue = SpeechQueue::new(10);
        queue.push(request("one"));
        queue.push(request("two"));
        assert_eq!(queue.try_pop().unwrap().text, "one");
        assert_eq!(queue.try_pop().unwrap().text, "two");
    }

    #[test]
    fn overflow_drops_oldest() {
        let queue = SpeechQueue::new(2);
        queue.push(request("one"));
        queue.push(request("two"));
        queue.push(request("three"));

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.dropped(), 1);
        assert_eq!(queue.try_pop().unwrap().text, "two");
        assert_eq!(queue.try_pop().unwrap().text, "three");
    }

    // -- worker ---------------------------------------------------------------

    struct Recording {
        spoken: Mutex<Vec<String>>,
        delay: Duration,
    }

    #[async_trait]
    impl AudioBackend for Recording {
        async fn speak(&self, request: &SpeechRequest) -> crate::Result<()> {
            tokio::time::sleep(self.delay).await;
            self.spoken.lock().unwrap().push(request.text.clone());
            Ok(())
        }
    }

    struct AlwaysFails;

    #[async_trait]
    impl AudioBackend for AlwaysFails {
        async fn speak(&self, _request: &SpeechRequest) -> crate::Result<()> {
            Err(crate::Error::Tts("synth down".to_string()))
        }
    }

    #[tokio::test]
    async fn worker_speaks_in_order_and_stops_on_shutdown() {
        let queue = SpeechQueue::new(10);
        let backend = Arc::new(Recording {
            spoken: Mutex::new(Vec::new()),
            delay: Duration::from_millis(1),
        });
        let (tx, rx) = watch::channel(false);

        queue.push(request("one"));
        queue.push(request("two"));

        let worker = tokio::spawn(run_delivery(queue.clone(), backend.clone(), rx));
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send_replace(true);
        tokio::time::timeout(Duration::from_secs(1), worker)
            .await
            .expect("worker did not stop")
            .unwrap();

        assert_eq!(*backend.spoken.lock().unwrap(), vec!["one", "two"]);
    }

    #[tokio::test]
    async fn failed_utterance_does_not_stop_the_worker() {
        let queue = SpeechQueue::new(10);
        let (tx, rx) = watch::channel(false);

        queue.push(request("doomed"));
        queue.push(request("also doomed"));

        let worker = tokio::spawn(run_delivery(queue.clone(), Arc::new(AlwaysFails), rx));
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Both items were consumed despite the failures
        assert!(queue.is_empty());
        tx.send_replace(true);
        tokio::time::timeout(Duration::from_secs(1), worker)
            .await
            .expect("worker did not stop")
            .unwrap();
    }
}
