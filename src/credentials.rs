//! Credential collaborator
//!
//! Supplies secrets (API client ids, auth tokens, session cookies) on demand
//! by platform name. The gateway never persists secrets itself; the default
//! implementation reads them from the environment.

use secrecy::{ExposeSecret, SecretString};

/// Read-only secret source keyed by platform and secret name
pub trait CredentialStore: Send + Sync {
    /// Look up a secret for a platform, e.g. `("twitch", "client_id")`.
    ///
    /// Returns `None` when the secret is not configured; callers decide
    /// whether that is acceptable (most platform reads are anonymous).
    fn secret(&self, platform: &str, name: &str) -> Option<SecretString>;
}

/// Environment-backed credential store.
///
/// Secrets resolve as `CHORUS_{PLATFORM}_{NAME}` (upper-cased), e.g.
/// `CHORUS_TWITCH_CLIENT_ID` or `CHORUS_KICK_SESSION_COOKIE`.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvCredentials;

impl CredentialStore for EnvCredentials {
    fn secret(&self, platform: &str, name: &str) -> Option<SecretString> {
        let var = format!(
            "CHORUS_{}_{}",
            platform.to_uppercase(),
            name.to_uppercase()
        );
        std::env::var(var).ok().map(SecretString::from)
    }
}

/// Expose a secret as a plain string for header construction.
///
/// Confined here so call sites don't import `secrecy` traits directly.
#[must_use]
pub fn reveal(secret: &SecretString) -> &str {
    secret.expose_secret()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_lookup_uses_upcased_key() {
        std::env::set_var("CHORUS_TESTPLAT_TOKEN", "s3cret");
        let store = EnvCredentials;
        let secret = store.secret("testplat", "token").expect("secret set");
        assert_eq!(reveal(&secret), "s3cret");
        std::env::remove_var("CHORUS_TESTPLAT_TOKEN");
    }

    #[test]
    fn missing_secret_is_none() {
        let store = EnvCredentials;
        assert!(store.secret("nosuch", "thing").is_none());
    }
}
