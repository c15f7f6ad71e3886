//! Update availability for activated licences.

use std::sync::Arc;

use crate::error::FetchError;
use crate::remote::RemoteClient;
use crate::state::{LicenceState, cache_keys};
use crate::types::{PluginUpdate, UpdateManifest};
use crate::version;

pub struct UpdateChecker<R> {
    state: Arc<LicenceState<R>>,
}

impl<R: RemoteClient> UpdateChecker<R> {
    pub fn new(state: Arc<LicenceState<R>>) -> Self {
        Self { state }
    }

    /// The remote manifest, cached for the manifest TTL.
    pub async fn manifest(&self) -> Result<UpdateManifest, FetchError> {
        let config = self.state.config();
        let url = config.manifest_url();

        self.state
            .cache()
            .get_or_compute(
                &format!("{}{}", cache_keys::UPGRADE_PREFIX, config.plugin_slug),
                config.ttl.manifest,
                || async {
                    let body = self.state.remote().fetch(&url).await?;
                    Ok::<UpdateManifest, FetchError>(serde_json::from_value(body)?)
                },
            )
            .await
    }

    /// The manifest when it offers a newer version that supports this host.
    ///
    /// Updates are a benefit of an activated licence: without activation this
    /// returns `None` without fetching anything. Fetch failures also read as
    /// "no update".
    pub async fn check_for_update(
        &self,
        current_version: &str,
        host_version: &str,
    ) -> Option<UpdateManifest> {
        if !self.state.activation_status().is_activated() {
            return None;
        }

        let manifest = match self.manifest().await {
            Ok(manifest) => manifest,
            Err(e) => {
                tracing::debug!("Update manifest unavailable: {}", e);
                return None;
            }
        };

        let newer = version::is_older(current_version, &manifest.version);
        let supported = version::is_older(&manifest.min_host_version, host_version);
        if newer && supported {
            tracing::info!(
                "Update available: {} -> {}",
                current_version,
                manifest.version
            );
            Some(manifest)
        } else {
            tracing::debug!(
                "No update: current {} remote {} requires {} host {}",
                current_version,
                manifest.version,
                manifest.min_host_version,
                host_version
            );
            None
        }
    }

    /// [`check_for_update`](Self::check_for_update) shaped as the host's
    /// update-listing entry.
    pub async fn plugin_update(
        &self,
        current_version: &str,
        host_version: &str,
    ) -> Option<PluginUpdate> {
        let manifest = self.check_for_update(current_version, host_version).await?;
        let config = self.state.config();

        Some(PluginUpdate {
            slug: config.plugin_slug.clone(),
            plugin: config.plugin_file.clone(),
            new_version: manifest.version,
            tested: manifest.tested_host_version,
            package: manifest.download_url,
        })
    }
}

impl<R> std::fmt::Debug for UpdateChecker<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateChecker").finish_non_exhaustive()
    }
}
