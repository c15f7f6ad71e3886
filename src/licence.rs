//! Licence client wiring state, activation and updates together.

use std::sync::Arc;

use crate::activation::{ActivationController, Reconciliation};
use crate::cache::TtlCache;
use crate::config::LicenceConfig;
use crate::error::{ActivationResult, FetchResult};
use crate::nonce::{NonceVerifier, OneTimeTokens};
use crate::remote::{HttpRemoteClient, RemoteClient};
use crate::settings::{MemorySettings, SettingsStore};
use crate::state::LicenceState;
use crate::types::{Notice, PluginUpdate, Standing, UpdateManifest};
use crate::update::UpdateChecker;

/// Collaborators injected into [`Licence`]. Anything left `None` gets an
/// in-memory default.
#[derive(Clone, Default)]
pub struct LicenceOptions {
    /// Host settings (default: MemorySettings)
    pub settings: Option<Arc<dyn SettingsStore>>,
    /// Shared cache (default: a fresh TtlCache)
    pub cache: Option<Arc<TtlCache>>,
    /// Token verifier (default: OneTimeTokens over `settings`)
    pub nonces: Option<Arc<dyn NonceVerifier>>,
}

impl std::fmt::Debug for LicenceOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LicenceOptions")
            .field("settings", &self.settings.as_ref().map(|_| "<settings>"))
            .field("cache", &self.cache)
            .field("nonces", &self.nonces.as_ref().map(|_| "<nonces>"))
            .finish()
    }
}

/// Licence client.
///
/// The methods fall into trigger entry points (`periodic_check`, `activate`,
/// `deactivate`, `settings_saved`, `plugin_update`) and read-only queries for
/// a presentation layer (`is_valid`, `is_activated`, `notices`,
/// `pending_update`).
///
/// # Example
/// ```rust,ignore
/// let licence = Licence::new(LicenceConfig::from_env()?, LicenceOptions::default())?;
///
/// for notice in licence.periodic_check().await {
///     println!("{}", notice.message());
/// }
/// ```
pub struct Licence<R = HttpRemoteClient> {
    state: Arc<LicenceState<R>>,
    activation: ActivationController<R>,
    updates: UpdateChecker<R>,
}

impl Licence<HttpRemoteClient> {
    pub fn new(config: LicenceConfig, options: LicenceOptions) -> FetchResult<Self> {
        let remote = HttpRemoteClient::new(config.timeout)?;
        Ok(Self::with_remote(config, remote, options))
    }
}

impl<R: RemoteClient> Licence<R> {
    pub fn with_remote(config: LicenceConfig, remote: R, options: LicenceOptions) -> Self {
        let settings: Arc<dyn SettingsStore> = options
            .settings
            .unwrap_or_else(|| Arc::new(MemorySettings::new()));
        let cache = options.cache.unwrap_or_default();
        let nonces: Arc<dyn NonceVerifier> = options
            .nonces
            .unwrap_or_else(|| Arc::new(OneTimeTokens::new(settings.clone())));

        let state = Arc::new(LicenceState::load(
            Arc::new(config),
            remote,
            cache,
            settings,
        ));

        Self {
            activation: ActivationController::new(state.clone(), nonces),
            updates: UpdateChecker::new(state.clone()),
            state,
        }
    }

    pub fn state(&self) -> &LicenceState<R> {
        &self.state
    }

    pub fn activation(&self) -> &ActivationController<R> {
        &self.activation
    }

    pub fn updates(&self) -> &UpdateChecker<R> {
        &self.updates
    }

    // ==================== Triggers ====================

    /// Run on each admin-context load: check validity, repair a stale
    /// activation, then report what the site owner should be told.
    pub async fn periodic_check(&self) -> Vec<Notice> {
        let reconciliation = self.activation.reconcile_on_invalid().await;
        if reconciliation != Reconciliation::NotNeeded {
            tracing::info!("Activation reconciled: {:?}", reconciliation);
        }
        self.notices().await
    }

    pub async fn activate(&self, token: &str) -> ActivationResult<()> {
        self.activation.request_activate(token).await
    }

    pub async fn deactivate(&self, token: &str) -> ActivationResult<()> {
        self.activation.request_deactivate(token).await
    }

    /// The host saved its settings page; re-read the key and re-check it.
    pub async fn settings_saved(&self) -> bool {
        self.state.on_settings_saved().await
    }

    pub async fn plugin_update(
        &self,
        current_version: &str,
        host_version: &str,
    ) -> Option<PluginUpdate> {
        self.updates
            .plugin_update(current_version, host_version)
            .await
    }

    // ==================== Queries ====================

    pub async fn is_valid(&self) -> bool {
        self.state.check_validity().await
    }

    pub fn is_activated(&self) -> bool {
        self.state.activation_status().is_activated()
    }

    pub async fn pending_update(
        &self,
        current_version: &str,
        host_version: &str,
    ) -> Option<UpdateManifest> {
        self.updates
            .check_for_update(current_version, host_version)
            .await
    }

    pub async fn notices(&self) -> Vec<Notice> {
        let mut notices = Vec::new();
        match self.state.standing().await {
            Standing::Empty => notices.push(Notice::EmptyKey),
            Standing::Invalid => notices.push(Notice::InvalidKey),
            Standing::Valid => {}
        }
        if !self.is_activated() {
            notices.push(Notice::ActivationNeeded);
        }
        notices
    }
}

impl<R> std::fmt::Debug for Licence<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Licence")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
