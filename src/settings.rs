//! Key-value settings store with change notifications
//!
//! Values are either explicitly set (loaded from JSON, `set_value`, or an
//! active override) or fall back to a registered default. Only explicitly set
//! keys count as overridden, which is what lets an explicit `false` beat an
//! environment variable while a missing key does not.

use parking_lot::RwLock;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use crate::error::DatabaseError;
use crate::signals::{SettingReceiver, Signal};

/// A setting value
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Null,
    Boolean(bool),
    Number(f64),
    String(String),
    List(Vec<ConfigValue>),
    Map(BTreeMap<String, ConfigValue>),
}

impl ConfigValue {
    /// Truthiness of the value
    ///
    /// Null, zero and empty strings, lists or maps are false.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Boolean(b) => *b,
            Self::Number(n) => *n != 0.0,
            Self::String(s) => !s.is_empty(),
            Self::List(items) => !items.is_empty(),
            Self::Map(m) => !m.is_empty(),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, ConfigValue>> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }
}

impl From<bool> for ConfigValue {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<f64> for ConfigValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<&str> for ConfigValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

#[derive(Default)]
struct SettingsInner {
    values: RwLock<HashMap<String, ConfigValue>>,
    defaults: RwLock<HashMap<String, ConfigValue>>,
    changed: Signal<SettingReceiver>,
}

/// Shared settings handle; clones see the same values and receivers
#[derive(Clone, Default)]
pub struct Settings {
    inner: Arc<SettingsInner>,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load explicit values from a JSON object
    ///
    /// # Examples
    /// ```
    /// # use sql_read_only::settings::{ConfigValue, Settings};
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let settings = Settings::from_json_str(r#"{"DJANGO_READ_ONLY": true}"#)?;
    /// assert!(settings.is_overridden("DJANGO_READ_ONLY"));
    /// assert_eq!(settings.get_value("DJANGO_READ_ONLY"), Some(ConfigValue::Boolean(true)));
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_json_str(json: &str) -> Result<Self, DatabaseError> {
        let values: HashMap<String, ConfigValue> = serde_json::from_str(json)?;
        let settings = Self::new();
        *settings.inner.values.write() = values;
        Ok(settings)
    }

    /// Load explicit values from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, DatabaseError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let settings = Self::from_json_str(&json).map_err(|e| {
            DatabaseError::ConfigError(format!("{}: {}", path.display(), e))
        })?;
        log::info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Register the value returned when `key` is not explicitly set
    ///
    /// Defaults never count as overridden and do not notify receivers.
    pub fn set_default(&self, key: &str, value: impl Into<ConfigValue>) {
        self.inner
            .defaults
            .write()
            .insert(key.to_string(), value.into());
    }

    /// Current value: the explicit one, else the default
    pub fn get_value(&self, key: &str) -> Option<ConfigValue> {
        if let Some(value) = self.inner.values.read().get(key) {
            return Some(value.clone());
        }
        self.inner.defaults.read().get(key).cloned()
    }

    /// True when `key` has been explicitly set
    pub fn is_overridden(&self, key: &str) -> bool {
        self.inner.values.read().contains_key(key)
    }

    /// Explicitly set `key`, then notify receivers
    pub fn set_value(&self, key: &str, value: impl Into<ConfigValue>) {
        self.inner
            .values
            .write()
            .insert(key.to_string(), value.into());
        self.notify(key);
    }

    /// Drop the explicit value for `key`, then notify receivers
    pub fn unset(&self, key: &str) {
        let removed = self.inner.values.write().remove(key);
        if removed.is_some() {
            self.notify(key);
        }
    }

    /// Temporarily set `key`; the previous state comes back when the guard drops
    pub fn override_value(&self, key: &str, value: impl Into<ConfigValue>) -> SettingsOverride {
        let previous = self.inner.values.read().get(key).cloned();
        self.set_value(key, value);
        SettingsOverride {
            settings: self.clone(),
            key: key.to_string(),
            previous,
        }
    }

    /// The "setting changed" signal
    pub fn changed(&self) -> &Signal<SettingReceiver> {
        &self.inner.changed
    }

    fn notify(&self, key: &str) {
        log::debug!("Setting '{}' changed", key);
        for receiver in self.inner.changed.receivers() {
            receiver(self, key);
        }
    }
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<String> = self.inner.values.read().keys().cloned().collect();
        keys.sort();
        f.debug_struct("Settings")
            .field("overridden", &keys)
            .field("receivers", &self.inner.changed.len())
            .finish()
    }
}

/// Guard returned by [`Settings::override_value`]
#[must_use = "the override is undone as soon as the guard is dropped"]
pub struct SettingsOverride {
    settings: Settings,
    key: String,
    previous: Option<ConfigValue>,
}

impl Drop for SettingsOverride {
    fn drop(&mut self) {
        match self.previous.take() {
            Some(value) => self.settings.set_value(&self.key, value),
            None => self.settings.unset(&self.key),
        }
    }
}
