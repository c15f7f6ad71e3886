//! Anti-replay tokens for activation requests.

use std::sync::Arc;

use crate::settings::{SettingsStore, keys};

/// Action name every activation and deactivation token is issued for.
pub const VALIDATE_ACTION: &str = "validate";

/// Proves that a request came from an authorized interactive session.
pub trait NonceVerifier: Send + Sync {
    fn verify(&self, token: &str, action: &str) -> bool;
}

/// Single-use tokens kept in the settings store, one per action.
///
/// Issuing a new token replaces the previous one for that action, and a
/// successful [`verify`](NonceVerifier::verify) consumes it.
pub struct OneTimeTokens {
    settings: Arc<dyn SettingsStore>,
}

impl OneTimeTokens {
    pub fn new(settings: Arc<dyn SettingsStore>) -> Self {
        Self { settings }
    }

    pub fn issue(&self, action: &str) -> String {
        let token = uuid::Uuid::new_v4().simple().to_string();
        self.settings.set(&storage_key(action), &token);
        token
    }
}

impl NonceVerifier for OneTimeTokens {
    fn verify(&self, token: &str, action: &str) -> bool {
        !token.is_empty() && self.settings.remove_if_eq(&storage_key(action), token)
    }
}

impl std::fmt::Debug for OneTimeTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OneTimeTokens").finish_non_exhaustive()
    }
}

fn storage_key(action: &str) -> String {
    format!("{}{}", keys::NONCE_PREFIX, action)
}
