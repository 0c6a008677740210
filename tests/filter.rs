//! Filter chain behavior through the public API.

use chorus::config::FilterPolicy;
use chorus::filter::{DropReason, FilterChain, Verdict};
use chorus::{ChatEvent, Platform};

fn event(platform: Platform, username: &str, text: &str) -> ChatEvent {
    ChatEvent::new(platform, username, text, "id")
}

#[test]
fn default_policy_passes_ordinary_chat() {
    let chain = FilterChain::new(FilterPolicy::default()).unwrap();
    for text in ["hello", "gg", "what a play!!", "großartig 🎉"] {
        assert_eq!(
            chain.evaluate(&event(Platform::Kick, "viewer", text)),
            Verdict::Pass,
            "text: {text}"
        );
    }
}

#[test]
fn combined_policy_drops_for_the_first_matching_reason() {
    let chain = FilterChain::new(FilterPolicy {
        min_length: 2,
        max_length: 40,
        blocked_users: vec!["Troll".to_string()],
        blocked_words: vec!["spoiler".to_string()],
        ..FilterPolicy::default()
    })
    .unwrap();

    let cases = [
        ("bob", "k", Verdict::Drop(DropReason::Length)),
        ("bob", "!points", Verdict::Drop(DropReason::Command)),
        ("bob", "see www.example.com", Verdict::Drop(DropReason::Link)),
        ("troll", "innocent text", Verdict::Drop(DropReason::BlockedUser)),
        ("bob", "huge SPOILER ahead", Verdict::Drop(DropReason::BlockedWord)),
        ("bob", "totally fine", Verdict::Pass),
    ];
    for (user, text, expected) in cases {
        assert_eq!(
            chain.evaluate(&event(Platform::YouTube, user, text)),
            expected,
            "user: {user}, text: {text}"
        );
    }
}

#[test]
fn filtering_is_platform_agnostic() {
    let chain = FilterChain::new(FilterPolicy::default()).unwrap();
    for platform in [Platform::YouTube, Platform::Kick, Platform::TikTok] {
        assert_eq!(
            chain.evaluate(&event(platform, "sam", "!cmd")),
            Verdict::Drop(DropReason::Command)
        );
    }
}

#[test]
fn counters_aggregate_across_a_session() {
    let chain = FilterChain::new(FilterPolicy::default()).unwrap();
    chain.evaluate(&event(Platform::Kick, "a", "hello"));
    chain.evaluate(&event(Platform::Kick, "b", "hi"));
    chain.evaluate(&event(Platform::Kick, "c", "!drop"));
    chain.evaluate(&event(Platform::Kick, "d", "https://x.com"));
    chain.evaluate(&event(Platform::Kick, "e", ""));

    let stats = chain.stats();
    assert_eq!(
        stats.passed.load(std::sync::atomic::Ordering::Relaxed),
        2
    );
    assert_eq!(stats.total_dropped(), 3);
}
