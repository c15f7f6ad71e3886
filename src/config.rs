use std::env;
use std::time::Duration;

use url::Url;

use crate::error::ConfigError;

pub const DEFAULT_HOST: &str = "https://thivinfo.com";
pub const DEFAULT_PLUGIN_SLUG: &str = "openagenda-wp-pro";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Settings names consulted, in order, when resolving the licence key.
pub const DEFAULT_KEY_SOURCES: &[&str] = &["api_key", "openagenda4wp_api"];

/// How long each remote-derived value stays cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheTtls {
    pub key: Duration,
    pub licence: Duration,
    pub validity: Duration,
    pub ids: Duration,
    pub product: Duration,
    pub manifest: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            key: DAY * 10,
            licence: DAY,
            validity: DAY,
            ids: DAY * 10,
            product: DAY,
            manifest: Duration::from_secs(12 * 60 * 60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LicenceConfig {
    /// Licensing host, e.g. `https://thivinfo.com`.
    pub host: Url,
    pub consumer_key: String,
    pub consumer_secret: String,
    /// Commerce product id used for product lookups when the licence record
    /// has not been fetched yet.
    pub product_id: Option<String>,
    pub plugin_slug: String,
    /// Base name of the update manifest (`{host}/{plugin_name}.json`).
    pub plugin_name: String,
    /// Plugin file as the host identifies it in its update listing.
    pub plugin_file: String,
    pub plugin_version: String,
    pub timeout: Duration,
    pub key_sources: Vec<String>,
    pub ttl: CacheTtls,
}

impl LicenceConfig {
    pub fn new(
        host: &str,
        consumer_key: impl Into<String>,
        consumer_secret: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            host: parse_host(host)?,
            consumer_key: consumer_key.into(),
            consumer_secret: consumer_secret.into(),
            product_id: None,
            plugin_slug: DEFAULT_PLUGIN_SLUG.to_string(),
            plugin_name: DEFAULT_PLUGIN_SLUG.to_string(),
            plugin_file: format!("{0}/{0}.php", DEFAULT_PLUGIN_SLUG),
            plugin_version: "0.0.0".to_string(),
            timeout: DEFAULT_TIMEOUT,
            key_sources: DEFAULT_KEY_SOURCES.iter().map(|s| s.to_string()).collect(),
            ttl: CacheTtls::default(),
        })
    }

    /// Load from the process environment, reading `.env` first if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup. `from_env` is this over
    /// `std::env`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let host = var("LICENCE_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string());
        let consumer_key =
            var("LICENCE_CONSUMER_KEY").ok_or(ConfigError::MissingVar("LICENCE_CONSUMER_KEY"))?;
        let consumer_secret = var("LICENCE_CONSUMER_SECRET")
            .ok_or(ConfigError::MissingVar("LICENCE_CONSUMER_SECRET"))?;

        let mut config = Self::new(&host, consumer_key, consumer_secret)?;
        config.product_id = var("LICENCE_PRODUCT_ID");

        if let Some(slug) = var("LICENCE_PLUGIN_SLUG") {
            config.plugin_name = slug.clone();
            config.plugin_file = format!("{0}/{0}.php", slug);
            config.plugin_slug = slug;
        }
        if let Some(name) = var("LICENCE_PLUGIN_NAME") {
            config.plugin_name = name;
        }
        if let Some(file) = var("LICENCE_PLUGIN_FILE") {
            config.plugin_file = file;
        }
        if let Some(version) = var("LICENCE_PLUGIN_VERSION") {
            config.plugin_version = version;
        }
        if let Some(sources) = var("LICENCE_KEY_SOURCES") {
            config.key_sources = sources
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }

        if let Some(secs) = var("LICENCE_TIMEOUT_SECS") {
            config.timeout = parse_secs("LICENCE_TIMEOUT_SECS", &secs)?;
        }
        if let Some(secs) = var("LICENCE_VALIDITY_TTL_SECS") {
            let ttl = parse_secs("LICENCE_VALIDITY_TTL_SECS", &secs)?;
            config.ttl.licence = ttl;
            config.ttl.validity = ttl;
        }
        if let Some(secs) = var("LICENCE_MANIFEST_TTL_SECS") {
            config.ttl.manifest = parse_secs("LICENCE_MANIFEST_TTL_SECS", &secs)?;
        }

        Ok(config)
    }

    pub fn licence_url(&self, key: &str) -> Url {
        self.api_url(&["lmfwc", "v2", "licenses", key])
    }

    pub fn validate_url(&self, key: &str) -> Url {
        self.api_url(&["lmfwc", "v2", "licenses", "validate", key])
    }

    pub fn activate_url(&self, key: &str) -> Url {
        self.api_url(&["lmfwc", "v2", "licenses", "activate", key])
    }

    pub fn deactivate_url(&self, key: &str) -> Url {
        self.api_url(&["lmfwc", "v2", "licenses", "deactivate", key])
    }

    pub fn product_url(&self, product_id: &str) -> Url {
        self.api_url(&["wc", "v3", "products", product_id])
    }

    /// The update manifest is public; no credentials are attached.
    pub fn manifest_url(&self) -> Url {
        let mut url = self.host.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .push(&format!("{}.json", self.plugin_name));
        }
        url
    }

    fn api_url(&self, path: &[&str]) -> Url {
        let mut url = self.host.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("wp-json").extend(path);
        }
        url.query_pairs_mut()
            .append_pair("consumer_key", &self.consumer_key)
            .append_pair("consumer_secret", &self.consumer_secret);
        url
    }
}

fn parse_host(host: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(host).map_err(|e| ConfigError::InvalidUrl(format!("{}: {}", host, e)))?;
    if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidUrl(host.to_string()));
    }
    Ok(url)
}

fn parse_secs(name: &'static str, value: &str) -> Result<Duration, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|_| ConfigError::InvalidNumber(name, value.to_string()))
}
