//! Settings adapters: the durable key/value store owned by the host.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{PoisonError, RwLock};

/// Setting names
pub mod keys {
    /// `"1"` when the licence has been activated on this instance.
    pub const ACTIVATED: &str = "thfo_key_validated";
    /// Prefix for one-time request tokens, followed by the action name.
    pub const NONCE_PREFIX: &str = "nonce:";
}

/// Value stored under [`keys::ACTIVATED`] for an activated licence.
pub const ACTIVATED_FLAG: &str = "1";

/// Settings adapter trait for host-provided storage
pub trait SettingsStore: Send + Sync {
    /// Get a value by name
    fn get(&self, name: &str) -> Option<String>;

    /// Set a value by name
    fn set(&self, name: &str, value: &str);

    /// Remove a value by name
    fn remove(&self, name: &str);

    /// Remove `name` only if it currently holds `value`, as one step.
    /// Returns whether it was removed.
    fn remove_if_eq(&self, name: &str, value: &str) -> bool;
}

/// In-memory settings, lost when dropped.
#[derive(Debug, Default)]
pub struct MemorySettings {
    values: RwLock<HashMap<String, String>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build pre-populated settings, mostly for tests and embedding hosts.
    pub fn with_values<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: RwLock::new(
                values
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }
}

impl SettingsStore for MemorySettings {
    fn get(&self, name: &str) -> Option<String> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    fn set(&self, name: &str, value: &str) {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), value.to_string());
    }

    fn remove(&self, name: &str) {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
    }

    fn remove_if_eq(&self, name: &str, value: &str) -> bool {
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        remove_matching(&mut values, name, value)
    }
}

fn remove_matching(values: &mut HashMap<String, String>, name: &str, value: &str) -> bool {
    if values.get(name).is_some_and(|current| current == value) {
        values.remove(name);
        true
    } else {
        false
    }
}

/// File-based settings adapter
///
/// Stores settings in `licence.json` within the specified directory.
pub struct FileSettings {
    path: std::path::PathBuf,
    cache: RwLock<HashMap<String, String>>,
}

impl FileSettings {
    /// Open file settings in the given directory.
    ///
    /// Returns `None` if the directory doesn't exist. A missing or corrupt
    /// `licence.json` starts out empty.
    pub fn new(settings_dir: &Path) -> Option<Self> {
        if !settings_dir.is_dir() {
            return None;
        }

        let path = settings_dir.join("licence.json");

        let cache = match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("Ignoring unreadable settings file {}: {}", path.display(), e);
                HashMap::new()
            }),
            Err(_) => HashMap::new(),
        };

        Some(Self {
            path,
            cache: RwLock::new(cache),
        })
    }

    fn save(&self) {
        let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
        match serde_json::to_string_pretty(&*cache) {
            Ok(contents) => {
                if let Err(e) = std::fs::write(&self.path, contents) {
                    tracing::error!("Failed to write {}: {}", self.path.display(), e);
                }
            }
            Err(e) => tracing::error!("Failed to serialize settings: {}", e),
        }
    }
}

impl SettingsStore for FileSettings {
    fn get(&self, name: &str) -> Option<String> {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    fn set(&self, name: &str, value: &str) {
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), value.to_string());
        self.save();
    }

    fn remove(&self, name: &str) {
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
        self.save();
    }

    fn remove_if_eq(&self, name: &str, value: &str) -> bool {
        let removed = {
            let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
            remove_matching(&mut cache, name, value)
        };
        if removed {
            self.save();
        }
        removed
    }
}

impl std::fmt::Debug for FileSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSettings")
            .field("path", &self.path)
            .finish()
    }
}
