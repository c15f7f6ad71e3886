//! Test utilities and fixtures for licence client integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::{Value, json};
use url::Url;

pub use openwp_licence::settings::keys;
pub use openwp_licence::*;

pub const HOST: &str = "https://licences.test";
pub const KEY: &str = "OAWP-1234-5678";

/// In-process `RemoteClient` answering by URL path and counting calls.
#[derive(Default)]
pub struct MockRemote {
    routes: Mutex<HashMap<String, FetchResult<Value>>>,
    calls: Mutex<Vec<String>>,
}

impl MockRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Answer every GET to `path` with `result` until replaced.
    pub fn respond(&self, path: &str, result: FetchResult<Value>) {
        self.routes
            .lock()
            .unwrap()
            .insert(path.to_string(), result);
    }

    pub fn calls_to(&self, path: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.as_str() == path)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl RemoteClient for MockRemote {
    async fn fetch(&self, url: &Url) -> FetchResult<Value> {
        let path = url.path().to_string();
        self.calls.lock().unwrap().push(path.clone());
        let routes = self.routes.lock().unwrap();
        routes
            .get(&path)
            .cloned()
            .unwrap_or(Err(FetchError::HttpStatus(404)))
    }
}

// ============ Paths ============

pub fn licence_path(key: &str) -> String {
    format!("/wp-json/lmfwc/v2/licenses/{}", key)
}

pub fn validate_path(key: &str) -> String {
    format!("/wp-json/lmfwc/v2/licenses/validate/{}", key)
}

pub fn activate_path(key: &str) -> String {
    format!("/wp-json/lmfwc/v2/licenses/activate/{}", key)
}

pub fn deactivate_path(key: &str) -> String {
    format!("/wp-json/lmfwc/v2/licenses/deactivate/{}", key)
}

pub fn product_path(id: &str) -> String {
    format!("/wp-json/wc/v3/products/{}", id)
}

pub const MANIFEST_PATH: &str = "/openagenda-wp-pro.json";

// ============ Bodies ============

pub fn licence_body(success: bool) -> Value {
    json!({
        "success": success,
        "data": {
            "licenseKey": KEY,
            "orderId": 1001,
            "productId": 77,
            "timesActivated": 1,
            "timesActivatedMax": 3
        }
    })
}

pub fn validate_body(times: u32, max: u32) -> Value {
    json!({
        "success": true,
        "data": {
            "timesActivated": times,
            "timesActivatedMax": max,
            "remainingActivations": max.saturating_sub(times)
        }
    })
}

pub fn action_body(success: bool) -> Value {
    if success {
        json!({ "success": true, "data": { "licenseKey": KEY } })
    } else {
        json!({ "success": false, "message": "License Key reached maximum activation count." })
    }
}

pub fn manifest_body(version: &str, requires: &str) -> Value {
    json!({
        "name": "OpenAgenda WP Pro",
        "version": version,
        "requires": requires,
        "tested": "6.4",
        "download_url": "https://licences.test/downloads/openagenda-wp-pro.zip"
    })
}

// ============ Harness ============

pub struct Harness {
    pub remote: Arc<MockRemote>,
    pub settings: Arc<MemorySettings>,
    pub tokens: Arc<OneTimeTokens>,
    pub licence: Licence<Arc<MockRemote>>,
}

impl Harness {
    pub fn token(&self) -> String {
        self.tokens.issue(VALIDATE_ACTION)
    }

    pub fn mark_activated(&self) {
        self.settings.set(keys::ACTIVATED, "1");
    }

    pub fn is_flag_set(&self) -> bool {
        self.settings.get(keys::ACTIVATED).is_some()
    }

    /// Remote answers for a valid licence using `times` of `max` slots.
    pub fn serve_valid_licence(&self, times: u32, max: u32) {
        self.remote.respond(&licence_path(KEY), Ok(licence_body(true)));
        self.remote.respond(&validate_path(KEY), Ok(validate_body(times, max)));
    }
}

pub fn test_config() -> LicenceConfig {
    LicenceConfig::new(HOST, "ck_test", "cs_test").expect("test config")
}

/// Licence client over a mock remote, with `key` stored under `api_key`.
pub fn harness(key: Option<&str>) -> Harness {
    harness_with_config(key, test_config())
}

pub fn harness_with_config(key: Option<&str>, config: LicenceConfig) -> Harness {
    let remote = MockRemote::new();
    let settings = Arc::new(MemorySettings::new());
    if let Some(key) = key {
        settings.set("api_key", key);
    }
    let tokens = Arc::new(OneTimeTokens::new(settings.clone()));

    let licence = Licence::with_remote(
        config,
        remote.clone(),
        LicenceOptions {
            settings: Some(settings.clone() as Arc<dyn SettingsStore>),
            nonces: Some(tokens.clone() as Arc<dyn NonceVerifier>),
            ..Default::default()
        },
    );

    Harness {
        remote,
        settings,
        tokens,
        licence,
    }
}
