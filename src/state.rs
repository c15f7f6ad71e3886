//! Licence state: the key, the remote licence record and the derived
//! validity, all read through the shared [`TtlCache`].
//!
//! Nothing here mutates a licence locally. Every value is recomputed from the
//! licensing service when its cache entry expires, and dropped wholesale on
//! invalidation.

use std::sync::{Arc, Mutex, PoisonError};

use crate::cache::TtlCache;
use crate::config::LicenceConfig;
use crate::error::{FetchError, FetchResult};
use crate::remote::RemoteClient;
use crate::settings::{ACTIVATED_FLAG, SettingsStore, keys};
use crate::types::{
    ActivationCounts, ActivationStatus, LicenceKey, LicenceRecord, ProductData, Standing,
};

/// Cache keys
pub mod cache_keys {
    pub const KEY: &str = "licence_key";
    /// Followed by the licence key.
    pub const ORDER_ID_PREFIX: &str = "order_id:";
    /// Followed by the licence key.
    pub const PRODUCT_ID_PREFIX: &str = "product_id:";
    /// Followed by the licence key.
    pub const LICENCE_PREFIX: &str = "licence:";
    /// Followed by the licence key.
    pub const ACTIVATIONS_PREFIX: &str = "activations:";
    /// Followed by the licence key.
    pub const VALID_PREFIX: &str = "valid:";
    /// Followed by the product id.
    pub const PRODUCT_PREFIX: &str = "product:";
    /// Followed by the plugin slug.
    pub const UPGRADE_PREFIX: &str = "upgrade:";
}

pub struct LicenceState<R> {
    config: Arc<LicenceConfig>,
    remote: R,
    cache: Arc<TtlCache>,
    settings: Arc<dyn SettingsStore>,
    last_validity: Mutex<Option<bool>>,
}

impl<R: RemoteClient> LicenceState<R> {
    /// Assemble the state. Performs no I/O; every value is fetched lazily.
    pub fn load(
        config: Arc<LicenceConfig>,
        remote: R,
        cache: Arc<TtlCache>,
        settings: Arc<dyn SettingsStore>,
    ) -> Self {
        Self {
            config,
            remote,
            cache,
            settings,
            last_validity: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &LicenceConfig {
        &self.config
    }

    pub fn cache(&self) -> &TtlCache {
        &self.cache
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn settings(&self) -> &dyn SettingsStore {
        self.settings.as_ref()
    }

    // ==================== Key ====================

    /// The licence key from the first non-empty configured settings source.
    ///
    /// A found key is cached for the key TTL. An empty result is not cached,
    /// so a key entered later is seen on the next call.
    pub fn key(&self) -> LicenceKey {
        if let Some(key) = self.cache.get::<LicenceKey>(cache_keys::KEY) {
            return key;
        }

        let key = self
            .config
            .key_sources
            .iter()
            .filter_map(|source| self.settings.get(source))
            .map(LicenceKey::new)
            .find(|key| !key.is_empty())
            .unwrap_or_default();

        if !key.is_empty() {
            self.cache
                .insert(cache_keys::KEY, key.clone(), self.config.ttl.key);
        }
        key
    }

    // ==================== Remote licence data ====================

    /// The licence record from `/licenses/{key}`.
    pub async fn licence_data(&self) -> FetchResult<LicenceRecord> {
        let key = self.require_key()?;
        let url = self.config.licence_url(key.as_str());

        self.cache
            .get_or_compute(
                &format!("{}{}", cache_keys::LICENCE_PREFIX, key.as_str()),
                self.config.ttl.licence,
                || async {
                    let body = self.remote.fetch(&url).await?;
                    LicenceRecord::from_response(&key, body)
                },
            )
            .await
    }

    /// Activation slot usage from `/licenses/validate/{key}`.
    pub async fn activation_counts(&self) -> FetchResult<ActivationCounts> {
        let key = self.require_key()?;
        let url = self.config.validate_url(key.as_str());

        self.cache
            .get_or_compute(
                &format!("{}{}", cache_keys::ACTIVATIONS_PREFIX, key.as_str()),
                self.config.ttl.licence,
                || async {
                    let body = self.remote.fetch(&url).await?;
                    ActivationCounts::from_response(body)
                },
            )
            .await
    }

    /// Whether the licence still has an activation slot to offer. Fails
    /// closed.
    pub async fn is_allowed_to_activate(&self) -> bool {
        match self.activation_counts().await {
            Ok(counts) => counts.allows_activation(),
            Err(e) => {
                tracing::debug!("Activation count unavailable: {}", e);
                false
            }
        }
    }

    /// Whether the licence is valid: the server knows the key and it has not
    /// exceeded its activation ceiling.
    ///
    /// Never fails. A remote failure reads as invalid and is not cached, so
    /// the next call asks again; a definitive answer is cached for the
    /// validity TTL.
    pub async fn check_validity(&self) -> bool {
        self.validity().await.unwrap_or_else(|e| {
            tracing::warn!("Licence check failed, treating key as invalid: {}", e);
            false
        })
    }

    /// The server's definitive answer on validity, or the fetch error that
    /// prevented one. An empty key is definitively invalid.
    pub async fn validity(&self) -> FetchResult<bool> {
        let key = self.key();
        if key.is_empty() {
            self.observe_validity(false);
            return Ok(false);
        }

        let result = self
            .cache
            .get_or_compute(
                &format!("{}{}", cache_keys::VALID_PREFIX, key.as_str()),
                self.config.ttl.validity,
                || async {
                    let record = self.licence_data().await?;
                    if !record.valid {
                        return Ok(false);
                    }
                    let counts = self.activation_counts().await?;
                    Ok::<_, FetchError>(counts.allows_activation())
                },
            )
            .await;

        self.observe_validity(matches!(result, Ok(true)));
        result
    }

    /// Validity seen by the most recent [`check_validity`](Self::check_validity)
    /// call in this process, if any.
    pub fn last_validity(&self) -> Option<bool> {
        *self
            .last_validity
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub async fn standing(&self) -> Standing {
        if self.key().is_empty() {
            return Standing::Empty;
        }
        if self.check_validity().await {
            Standing::Valid
        } else {
            Standing::Invalid
        }
    }

    pub async fn product_id(&self) -> Option<String> {
        self.licence_id(cache_keys::PRODUCT_ID_PREFIX, |record| record.product_id)
            .await
    }

    pub async fn order_id(&self) -> Option<String> {
        self.licence_id(cache_keys::ORDER_ID_PREFIX, |record| record.order_id)
            .await
    }

    /// An id from the licence record, cached per key for the ids TTL.
    async fn licence_id<F>(&self, prefix: &str, pick: F) -> Option<String>
    where
        F: FnOnce(LicenceRecord) -> Option<String>,
    {
        let key = self.key();
        if key.is_empty() {
            return None;
        }

        self.cache
            .get_or_compute(
                &format!("{}{}", prefix, key.as_str()),
                self.config.ttl.ids,
                || async {
                    let record = self.licence_data().await?;
                    pick(record).ok_or_else(|| {
                        FetchError::Decode(format!("licence record has no {}", prefix))
                    })
                },
            )
            .await
            .ok()
    }

    /// Commerce product record from `/wc/v3/products/{id}`.
    ///
    /// Without an explicit id, the configured product id is used, then the
    /// one on the licence record.
    pub async fn product_data(&self, product_id: Option<&str>) -> FetchResult<ProductData> {
        let product_id = match product_id {
            Some(id) => id.to_string(),
            None => match &self.config.product_id {
                Some(id) => id.clone(),
                None => self
                    .product_id()
                    .await
                    .ok_or_else(|| FetchError::Decode("no product id".to_string()))?,
            },
        };
        let url = self.config.product_url(&product_id);

        self.cache
            .get_or_compute(
                &format!("{}{}", cache_keys::PRODUCT_PREFIX, product_id),
                self.config.ttl.product,
                || async {
                    let body = self.remote.fetch(&url).await?;
                    Ok::<ProductData, FetchError>(serde_json::from_value(body)?)
                },
            )
            .await
    }

    /// Latest released version according to the product's first tag.
    pub async fn latest_version(&self) -> Option<String> {
        match self.product_data(None).await {
            Ok(product) => product.latest_version().map(String::from),
            Err(e) => {
                tracing::debug!("Product data unavailable: {}", e);
                None
            }
        }
    }

    // ==================== Activation flag ====================

    pub fn activation_status(&self) -> ActivationStatus {
        ActivationStatus::from_flag(self.settings.get(keys::ACTIVATED).as_deref())
    }

    pub(crate) fn set_activation_status(&self, status: ActivationStatus) {
        match status {
            ActivationStatus::Activated => self.settings.set(keys::ACTIVATED, ACTIVATED_FLAG),
            ActivationStatus::NotActivated => self.settings.remove(keys::ACTIVATED),
        }
    }

    // ==================== Invalidation ====================

    /// Drop every cached value derived from the licence endpoints. Used after
    /// calls that change the server-side activation count.
    pub fn invalidate_remote(&self) {
        for prefix in [
            cache_keys::LICENCE_PREFIX,
            cache_keys::ACTIVATIONS_PREFIX,
            cache_keys::VALID_PREFIX,
        ] {
            self.cache.invalidate_prefix(prefix);
        }
    }

    /// Hook for the host's settings page: forget the cached key and licence
    /// data, then check the (possibly new) key again.
    pub async fn on_settings_saved(&self) -> bool {
        self.cache.invalidate(cache_keys::KEY);
        self.cache.invalidate_prefix(cache_keys::ORDER_ID_PREFIX);
        self.cache.invalidate_prefix(cache_keys::PRODUCT_ID_PREFIX);
        self.invalidate_remote();
        self.check_validity().await
    }

    fn require_key(&self) -> FetchResult<LicenceKey> {
        let key = self.key();
        if key.is_empty() {
            return Err(FetchError::Decode("empty licence key".to_string()));
        }
        Ok(key)
    }

    fn observe_validity(&self, valid: bool) {
        let previous = self
            .last_validity
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(valid);

        match previous {
            Some(true) if !valid => tracing::warn!("Licence is no longer valid"),
            Some(false) | None if valid => tracing::info!("Licence is valid"),
            _ => {}
        }
    }
}

impl<R> std::fmt::Debug for LicenceState<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LicenceState")
            .field("host", &self.config.host.as_str())
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}
