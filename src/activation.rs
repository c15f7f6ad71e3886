//! Activation state machine: `NotActivated -> Activated -> NotActivated`.
//!
//! Every transition is one remote call, never retried and never cached. The
//! persisted flag only changes after the server has answered; an unreachable
//! server never clears it.

use std::sync::Arc;

use crate::error::{ActivationError, ActivationResult, ConfigError, FetchError};
use crate::nonce::{NonceVerifier, VALIDATE_ACTION};
use crate::remote::RemoteClient;
use crate::state::LicenceState;
use crate::types::{ActionResponse, ActivationStatus, LicenceKey};

/// What [`ActivationController::reconcile_on_invalid`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// Not activated, or still valid.
    NotNeeded,
    /// The slot was released on the server and the local flag cleared.
    Deactivated,
    /// Only the local flag was cleared: the key is empty or the server
    /// refused the deactivation.
    ClearedLocally,
    /// The server could not be reached. The flag is kept and the next
    /// check tries again.
    Deferred,
}

pub struct ActivationController<R> {
    state: Arc<LicenceState<R>>,
    nonces: Arc<dyn NonceVerifier>,
}

impl<R: RemoteClient> ActivationController<R> {
    pub fn new(state: Arc<LicenceState<R>>, nonces: Arc<dyn NonceVerifier>) -> Self {
        Self { state, nonces }
    }

    pub fn status(&self) -> ActivationStatus {
        self.state.activation_status()
    }

    /// Claim an activation slot for this instance.
    ///
    /// Returns `AlreadyActive` straight away when the flag is already set, so
    /// repeating a request never reaches the server twice.
    pub async fn request_activate(&self, token: &str) -> ActivationResult<()> {
        if self.status().is_activated() {
            tracing::debug!("Activation requested but licence is already active");
            return Err(ActivationError::AlreadyActive);
        }
        let key = self.require_key()?;
        if !self.nonces.verify(token, VALIDATE_ACTION) {
            tracing::warn!("Activation request with invalid token");
            return Err(ActivationError::InvalidToken);
        }

        let url = self.state.config().activate_url(key.as_str());
        self.call(&url, "activation").await?;

        self.state.set_activation_status(ActivationStatus::Activated);
        self.state.invalidate_remote();
        tracing::info!("Licence activated");
        Ok(())
    }

    /// Release this instance's activation slot.
    pub async fn request_deactivate(&self, token: &str) -> ActivationResult<()> {
        if !self.status().is_activated() {
            tracing::debug!("Deactivation requested but licence is not active");
            return Err(ActivationError::NotActive);
        }
        let key = self.require_key()?;
        if !self.nonces.verify(token, VALIDATE_ACTION) {
            tracing::warn!("Deactivation request with invalid token");
            return Err(ActivationError::InvalidToken);
        }

        self.deactivate_remote(&key).await?;

        self.state.set_activation_status(ActivationStatus::NotActivated);
        self.state.invalidate_remote();
        tracing::info!("Licence deactivated");
        Ok(())
    }

    /// Repair an activation that outlived its licence.
    ///
    /// Acts only on a definitive answer: an empty key, or the server saying
    /// the licence is invalid. Then one deactivate call releases the slot
    /// (skipped for an empty key). The flag is cleared once the server has
    /// answered, or when there is no key to deactivate. If the server cannot
    /// be reached at either step the flag stays and the result is
    /// [`Reconciliation::Deferred`]. Call before presenting licence status.
    pub async fn reconcile_on_invalid(&self) -> Reconciliation {
        if !self.status().is_activated() {
            return Reconciliation::NotNeeded;
        }

        let key = self.state.key();
        if key.is_empty() {
            tracing::warn!("Licence key removed while activated, clearing activation");
            self.state.set_activation_status(ActivationStatus::NotActivated);
            return Reconciliation::ClearedLocally;
        }

        match self.state.validity().await {
            Ok(true) => return Reconciliation::NotNeeded,
            Ok(false) => {}
            Err(e) => {
                tracing::warn!("Licence check unavailable, keeping activation: {}", e);
                return Reconciliation::Deferred;
            }
        }

        tracing::warn!("Licence invalid while activated, releasing activation");
        let outcome = match self.deactivate_remote(&key).await {
            Ok(()) => Reconciliation::Deactivated,
            Err(ActivationError::Fetch(e)) => {
                tracing::warn!("Could not reach the server to release activation: {}", e);
                return Reconciliation::Deferred;
            }
            Err(e) => {
                tracing::warn!("Server refused to release activation: {}", e);
                Reconciliation::ClearedLocally
            }
        };

        self.state.set_activation_status(ActivationStatus::NotActivated);
        self.state.invalidate_remote();
        outcome
    }

    async fn deactivate_remote(&self, key: &LicenceKey) -> ActivationResult<()> {
        let url = self.state.config().deactivate_url(key.as_str());
        self.call(&url, "deactivation").await
    }

    async fn call(&self, url: &url::Url, what: &str) -> ActivationResult<()> {
        let body = self
            .state
            .remote()
            .fetch(url)
            .await
            .map_err(remote_error)?;
        let response = ActionResponse::from_response(body)?;

        if !response.success {
            let message = response
                .message
                .unwrap_or_else(|| format!("{} refused", what));
            tracing::warn!("Licensing server refused {}: {}", what, message);
            return Err(ActivationError::RemoteRejected(message));
        }
        Ok(())
    }

    fn require_key(&self) -> ActivationResult<LicenceKey> {
        let key = self.state.key();
        if key.is_empty() {
            return Err(ConfigError::MissingKey.into());
        }
        Ok(key)
    }
}

/// Client errors mean the server looked at the request and said no; anything
/// else means it could not be reached.
fn remote_error(e: FetchError) -> ActivationError {
    match e {
        FetchError::HttpStatus(code) if (400..500).contains(&code) => {
            ActivationError::RemoteRejected(format!("HTTP {}", code))
        }
        other => ActivationError::Fetch(other),
    }
}

impl<R> std::fmt::Debug for ActivationController<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivationController")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
