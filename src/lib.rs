//! # OpenWP licence client
//!
//! Licence validation, activation and self-update checks for packages sold
//! through a License Manager for WooCommerce store.
//!
//! The client holds a licence key, asks the licensing service whether it is
//! valid and how many activation slots it uses, gates updates on this
//! instance being activated, and reads the update manifest.
//!
//! ## Caching
//!
//! Every remote-derived value goes through one injected [`TtlCache`]:
//!
//! - licence record, activation counts and validity: 1 day
//! - key, order id and product id: 10 days
//! - update manifest: 12 hours
//!
//! Failed fetches are never cached. Validity checks fail closed.
//!
//! ## Collaborators
//!
//! The host supplies settings ([`SettingsStore`]) and request-token checks
//! ([`NonceVerifier`]). Rendering, hook registration and the host's settings
//! format stay outside this crate.

pub mod activation;
pub mod cache;
pub mod config;
pub mod error;
pub mod licence;
pub mod nonce;
pub mod remote;
pub mod settings;
pub mod state;
pub mod types;
pub mod update;
pub mod version;

pub use activation::{ActivationController, Reconciliation};
pub use cache::TtlCache;
pub use config::{CacheTtls, LicenceConfig};
pub use error::{ActivationError, ActivationResult, ConfigError, FetchError, FetchResult};
pub use licence::{Licence, LicenceOptions};
pub use nonce::{NonceVerifier, OneTimeTokens, VALIDATE_ACTION};
pub use remote::{HttpRemoteClient, RemoteClient};
pub use settings::{FileSettings, MemorySettings, SettingsStore};
pub use state::LicenceState;
pub use types::{
    ActivationCounts, ActivationStatus, LicenceKey, LicenceRecord, Notice, PluginUpdate,
    ProductData, Standing, UpdateManifest,
};
pub use update::UpdateChecker;
