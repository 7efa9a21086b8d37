// Gemstream Engine — Configuration
//
// Loaded from a TOML file (explicit path or the per-user config dir),
// then overridden by the GEMINI_API_KEY environment variable.
//
// Example config.toml:
//   api_key = "..."
//   model = "gemini-1.5-flash"
//   port = 3939
//   harassment_threshold = "BLOCK_ONLY_HIGH"

use crate::atoms::constants::{
    API_KEY_ENV, DEFAULT_BIND_ADDRESS, DEFAULT_MODEL, DEFAULT_PAGE_TITLE, DEFAULT_PORT,
    MAX_UPLOAD_BYTES,
};
use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::types::{GenerationSettings, HarmBlockThreshold, HarmCategory, SafetySetting};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Static API key handed to the generation service on every call.
    pub api_key: String,
    pub model: String,
    /// Override for the service endpoint (tests, proxies).
    pub base_url: Option<String>,
    /// Address to bind — "127.0.0.1" (local only) or "0.0.0.0" (LAN)
    pub bind_address: String,
    pub port: u16,
    /// Title shown on the page
    pub page_title: String,
    pub harassment_threshold: HarmBlockThreshold,
    /// Uploads above this size are reported as read failures.
    pub max_upload_bytes: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            api_key: String::new(),
            model: DEFAULT_MODEL.into(),
            base_url: None,
            bind_address: DEFAULT_BIND_ADDRESS.into(),
            port: DEFAULT_PORT,
            page_title: DEFAULT_PAGE_TITLE.into(),
            harassment_threshold: HarmBlockThreshold::BlockOnlyHigh,
            max_upload_bytes: MAX_UPLOAD_BYTES,
        }
    }
}

impl AppConfig {
    /// `~/.config/gemstream/config.toml` (platform equivalent).
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("gemstream").join("config.toml"))
    }

    /// Load from `path`, or the default location when `None`. A missing
    /// file yields defaults; a malformed one is an error.
    pub fn load(path: Option<&Path>) -> EngineResult<Self> {
        let path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => Self::default_path(),
        };

        let mut config = match path {
            Some(p) if p.exists() => {
                let raw = std::fs::read_to_string(&p)
                    .map_err(|e| EngineError::Config(format!("Read {}: {e}", p.display())))?;
                info!("[config] Loaded {}", p.display());
                Self::from_toml(&raw)?
            }
            Some(p) => {
                debug!("[config] {} not found, using defaults", p.display());
                AppConfig::default()
            }
            None => AppConfig::default(),
        };

        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                config.api_key = key.trim().to_string();
            }
        }
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> EngineResult<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.api_key.trim().is_empty() {
            return Err(EngineError::Config(format!(
                "API key is required (set api_key in config.toml or {API_KEY_ENV})"
            )));
        }
        if self.model.trim().is_empty() {
            return Err(EngineError::Config("model must not be empty".into()));
        }
        if self.max_upload_bytes == 0 {
            return Err(EngineError::Config("max_upload_bytes must be positive".into()));
        }
        Ok(())
    }

    pub fn generation_settings(&self) -> GenerationSettings {
        GenerationSettings {
            model: self.model.clone(),
            safety_settings: vec![SafetySetting {
                category: HarmCategory::HarmCategoryHarassment,
                threshold: self.harassment_threshold,
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg = AppConfig::from_toml("api_key = \"k\"\nport = 8080\n").unwrap();
        assert_eq!(cfg.api_key, "k");
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.model, DEFAULT_MODEL);
        assert_eq!(cfg.bind_address, "127.0.0.1");
        assert_eq!(cfg.max_upload_bytes, MAX_UPLOAD_BYTES);
    }

    #[test]
    fn zero_upload_limit_fails_validation() {
        let cfg = AppConfig { api_key: "k".into(), max_upload_bytes: 0, ..AppConfig::default() };
        assert!(matches!(cfg.validate(), Err(EngineError::Config(_))));
    }

    #[test]
    fn threshold_parses_api_name() {
        let cfg = AppConfig::from_toml("harassment_threshold = \"BLOCK_NONE\"").unwrap();
        let threshold = cfg.generation_settings().safety_settings[0].threshold;
        assert_eq!(threshold, HarmBlockThreshold::BlockNone);
    }

    #[test]
    fn malformed_toml_is_an_error() {
        let parsed = AppConfig::from_toml("port = \"nope\"");
        assert!(matches!(parsed, Err(EngineError::ConfigParse(_))));
    }

    #[test]
    fn empty_key_fails_validation() {
        let cfg = AppConfig::default();
        assert!(matches!(cfg.validate(), Err(EngineError::Config(_))));
        let cfg = AppConfig { api_key: "k".into(), ..AppConfig::default() };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn default_settings_block_only_high_harassment() {
        let settings = AppConfig::default().generation_settings();
        assert_eq!(settings, GenerationSettings::default());
    }
}
