//! Type definitions shared by the licence components

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{FetchError, FetchResult};

/// A licence key as entered by the site owner. Empty is a valid state.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct LicenceKey(String);

impl LicenceKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into().trim().to_string())
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for LicenceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            return write!(f, "LicenceKey(<empty>)");
        }
        let tail: String = self
            .0
            .chars()
            .rev()
            .take(4)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        write!(f, "LicenceKey(…{})", tail)
    }
}

/// Whether this instance holds one of the licence's activation slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationStatus {
    NotActivated,
    Activated,
}

impl ActivationStatus {
    /// Interpret the persisted flag; only `"1"` means activated.
    pub fn from_flag(flag: Option<&str>) -> Self {
        match flag {
            Some(crate::settings::ACTIVATED_FLAG) => Self::Activated,
            _ => Self::NotActivated,
        }
    }

    pub fn is_activated(&self) -> bool {
        matches!(self, Self::Activated)
    }
}

/// Licence as reported by `/licenses/{key}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicenceRecord {
    pub key: LicenceKey,
    pub product_id: Option<String>,
    pub order_id: Option<String>,
    pub times_activated: u32,
    /// `None` when the licence has no activation ceiling.
    pub times_activated_max: Option<u32>,
    /// The server's `success` flag for the lookup.
    pub valid: bool,
}

impl LicenceRecord {
    pub(crate) fn from_response(key: &LicenceKey, body: Value) -> FetchResult<Self> {
        let envelope: ApiEnvelope<LicenceData> = serde_json::from_value(body)?;
        let data = envelope.data.unwrap_or_default();

        Ok(Self {
            key: key.clone(),
            product_id: data.product_id,
            order_id: data.order_id,
            times_activated: data.times_activated.unwrap_or(0),
            times_activated_max: data.times_activated_max,
            valid: envelope.success,
        })
    }
}

/// Activation slot usage as reported by `/licenses/validate/{key}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivationCounts {
    pub times_activated: u32,
    pub times_activated_max: Option<u32>,
}

impl ActivationCounts {
    pub(crate) fn from_response(body: Value) -> FetchResult<Self> {
        let envelope: ApiEnvelope<LicenceData> = serde_json::from_value(body)?;
        let data = envelope
            .data
            .ok_or_else(|| FetchError::Decode("validate response has no data".to_string()))?;

        Ok(Self {
            times_activated: data.times_activated.unwrap_or(0),
            times_activated_max: data.times_activated_max,
        })
    }

    /// Activation is allowed while the used count has not passed the
    /// ceiling. Being exactly at the ceiling still counts as allowed.
    pub fn allows_activation(&self) -> bool {
        match self.times_activated_max {
            Some(max) => self.times_activated <= max,
            None => true,
        }
    }
}

/// Outcome of an activate/deactivate call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ActionResponse {
    pub success: bool,
    pub message: Option<String>,
}

impl ActionResponse {
    pub(crate) fn from_response(body: Value) -> FetchResult<Self> {
        let envelope: ApiEnvelope<Value> = serde_json::from_value(body)?;
        Ok(Self {
            success: envelope.success,
            message: envelope.message,
        })
    }
}

/// Where the licence currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Standing {
    /// No key has been entered.
    Empty,
    Invalid,
    Valid,
}

/// Conditions a presentation layer may want to show to the site owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Notice {
    InvalidKey,
    EmptyKey,
    ActivationNeeded,
}

impl Notice {
    pub fn message(&self) -> &'static str {
        match self {
            Notice::InvalidKey => "The API key seems invalid, please check again",
            Notice::EmptyKey => "The API key field seems empty, please check again",
            Notice::ActivationNeeded => "Please activate your licence key",
        }
    }
}

/// Remote description of the latest package release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateManifest {
    pub version: String,
    /// Minimum host version the release supports.
    #[serde(rename = "requires", default)]
    pub min_host_version: String,
    pub download_url: String,
    /// Highest host version the release was tested against.
    #[serde(rename = "tested", default)]
    pub tested_host_version: Option<String>,
}

/// Entry handed to the host's plugin update listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginUpdate {
    pub slug: String,
    pub plugin: String,
    pub new_version: String,
    pub tested: Option<String>,
    pub package: String,
}

/// Commerce product record; only the tags are interpreted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProductData {
    #[serde(default, deserialize_with = "id_string")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub tags: Vec<ProductTag>,
}

impl ProductData {
    /// The first product tag carries the latest released version.
    pub fn latest_version(&self) -> Option<&str> {
        self.tags.first().map(|t| t.name.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProductTag {
    pub name: String,
}

/// LMFWC response wrapper: `{ success, data, message }`.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiEnvelope<T> {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub data: Option<T>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LicenceData {
    #[serde(default, deserialize_with = "id_string")]
    pub product_id: Option<String>,
    #[serde(default, deserialize_with = "id_string")]
    pub order_id: Option<String>,
    #[serde(default)]
    pub times_activated: Option<u32>,
    #[serde(default)]
    pub times_activated_max: Option<u32>,
}

/// Ids arrive as numbers or strings depending on the endpoint.
fn id_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s),
        _ => None,
    })
}
