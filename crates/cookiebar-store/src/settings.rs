//! Settings store: the plugin settings record kept in a single options row.

use serde_json::Value;
use tracing::{info, warn};

use crate::schema::SETTINGS_OPTION;
use crate::sqlite::SqliteStore;
use cookiebar_core::settings::SettingsForm;
use cookiebar_core::{PluginSettings, Result};

impl SqliteStore {
    /// Load the settings record, defaulting every missing key.
    pub fn load_settings(&self) -> PluginSettings {
        match self.get_option::<PluginSettings>(SETTINGS_OPTION) {
            Ok(Some(settings)) => settings,
            Ok(None) => PluginSettings::default(),
            Err(e) => {
                warn!("Failed to load settings, using defaults: {}", e);
                PluginSettings::default()
            }
        }
    }

    /// Persist the whole settings record after validating it.
    pub fn save_settings(&self, settings: &PluginSettings) -> Result<()> {
        settings.validate()?;
        self.update_option(SETTINGS_OPTION, settings)
    }

    /// Write the default record if none exists yet. Returns true if it wrote.
    pub fn seed_default_settings(&self) -> Result<bool> {
        if self.get_option::<Value>(SETTINGS_OPTION)?.is_some() {
            return Ok(false);
        }
        self.update_option(SETTINGS_OPTION, &PluginSettings::default())?;
        info!("Seeded default settings");
        Ok(true)
    }

    /// Read one setting, or `default` when the key is unknown.
    pub fn get_setting(&self, key: &str, default: Value) -> Value {
        self.load_settings().get_value(key).unwrap_or(default)
    }

    /// Write one setting. Unknown keys and invalid values are rejected.
    pub fn set_setting(&self, key: &str, value: Value) -> bool {
        let mut settings = self.load_settings();
        if let Err(e) = settings.set_value(key, value) {
            warn!("Rejected setting '{}': {}", key, e);
            return false;
        }
        match self.save_settings(&settings) {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to save setting '{}': {}", key, e);
                false
            }
        }
    }

    /// Merge an admin form group into the stored record.
    pub fn apply_settings_form<F: SettingsForm>(&self, form: F) -> Result<PluginSettings> {
        let next = form.apply(&self.load_settings())?;
        self.save_settings(&next)?;
        Ok(next)
    }
}
