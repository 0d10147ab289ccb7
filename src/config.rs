//! Configuration management for labscribe
//!
//! Stores settings in ~/.config/labscribe/config.json. The API key itself is
//! never persisted; it is resolved from the environment on first use.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variables checked for the API key, in order. First non-empty wins.
pub const API_KEY_ENV_VARS: [&str; 5] = [
    "GEMINI_API_KEY",
    "GOOGLE_GENAI_API_KEY",
    "GOOGLE_API_KEY",
    "GENAI_API_KEY",
    "NEXT_PUBLIC_GEMINI_API_KEY",
];

pub const DEFAULT_API_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Static candidates tried in order when discovery finds nothing.
pub const DEFAULT_FALLBACK_MODELS: [&str; 5] = [
    "gemini-1.5-flash",
    "gemini-1.5-flash-latest",
    "gemini-1.5-pro",
    "gemini-1.5-pro-latest",
    "gemini-1.5-flash-8b",
];

/// Discovery ranks model names containing earlier tokens first.
pub const DEFAULT_PREFERRED_MODEL_TOKENS: [&str; 2] = ["flash", "pro"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(
        "Missing API key. Set GEMINI_API_KEY (or GOOGLE_GENAI_API_KEY / GOOGLE_API_KEY / GENAI_API_KEY / NEXT_PUBLIC_GEMINI_API_KEY) in the environment or a .env file."
    )]
    MissingApiKey,
    #[error("Invalid API base URL: {0}")]
    InvalidBaseUrl(String),
    #[error("Failed to create HTTP client: {0}")]
    HttpClient(String),
    #[error("Could not determine config directory")]
    NoConfigDir,
    #[error("Failed to write config: {0}")]
    Write(String),
}

/// Credential for the generation API. Debug output never shows the key.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// Resolve the API key from the process environment.
pub fn resolve_api_key() -> Result<ApiKey, ConfigError> {
    resolve_api_key_with(|name| std::env::var(name).ok())
}

/// Resolve the API key through an arbitrary lookup, checking [`API_KEY_ENV_VARS`] in order.
pub fn resolve_api_key_with<F>(lookup: F) -> Result<ApiKey, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    API_KEY_ENV_VARS
        .iter()
        .filter_map(|name| lookup(name))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
        .map(ApiKey)
        .ok_or(ConfigError::MissingApiKey)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root of the generative-language API (no version segment)
    pub api_base_url: String,
    /// Deadline for each generation call
    pub request_timeout_secs: u64,
    /// Deadline for each model-listing call
    pub discovery_timeout_secs: u64,
    pub fallback_models: Vec<String>,
    pub preferred_model_tokens: Vec<String>,
    /// Try the next candidate when a response can't be parsed (off by default)
    pub retry_on_parse_failure: bool,
    pub bind_address: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout_secs: 60,
            discovery_timeout_secs: 10,
            fallback_models: DEFAULT_FALLBACK_MODELS
                .iter()
                .map(|m| m.to_string())
                .collect(),
            preferred_model_tokens: DEFAULT_PREFERRED_MODEL_TOKENS
                .iter()
                .map(|t| t.to_string())
                .collect(),
            retry_on_parse_failure: false,
            bind_address: "127.0.0.1:3000".to_string(),
        }
    }
}

impl Config {
    fn sanitize(&mut self) {
        self.api_base_url = self.api_base_url.trim().trim_end_matches('/').to_string();
        if self.api_base_url.is_empty() {
            self.api_base_url = DEFAULT_API_BASE_URL.to_string();
        }
        self.request_timeout_secs = self.request_timeout_secs.max(1);
        self.discovery_timeout_secs = self.discovery_timeout_secs.max(1);
        self.fallback_models.retain(|m| !m.trim().is_empty());
        self.preferred_model_tokens.retain(|t| !t.trim().is_empty());
    }

    /// Get the config directory path
    fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("labscribe"))
    }

    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("config.json"))
    }

    /// Load config from disk (or defaults), then apply environment overrides
    pub fn load() -> Self {
        let mut config = match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        };
        config.apply_env_overrides(|name| std::env::var(name).ok());
        config
    }

    /// Load config from a specific file, or return default
    pub fn load_from(path: &Path) -> Self {
        if let Ok(content) = fs::read_to_string(path) {
            match serde_json::from_str::<Config>(&content) {
                Ok(mut config) => {
                    config.sanitize();
                    return config;
                }
                Err(err) => {
                    preserve_corrupt_config(path, &content);
                    tracing::warn!(
                        path = %path.display(),
                        error = %err,
                        "Config file was corrupted. A backup was saved and defaults were loaded."
                    );
                }
            }
        }
        Self::default()
    }

    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("LABSCRIBE_API_BASE_URL").filter(|v| !v.trim().is_empty()) {
            self.api_base_url = url;
        }
        if let Some(bind) = lookup("LABSCRIBE_BIND").filter(|v| !v.trim().is_empty()) {
            self.bind_address = bind;
        }
        self.sanitize();
    }

    /// Save config to the default location, returning the path written
    pub fn save(&self) -> Result<PathBuf, ConfigError> {
        let path = Self::config_path().ok_or(ConfigError::NoConfigDir)?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let mut sanitized = self.clone();
        sanitized.sanitize();

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .map_err(|e| ConfigError::Write(format!("create {}: {}", dir.display(), e)))?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Err(e) = fs::set_permissions(dir, fs::Permissions::from_mode(0o700)) {
                    tracing::warn!(error = %e, "Failed to set config directory permissions");
                }
            }
        }

        let content = serde_json::to_string_pretty(&sanitized)
            .map_err(|e| ConfigError::Write(e.to_string()))?;

        #[cfg(unix)]
        {
            write_config_atomic(path, &content).map_err(ConfigError::Write)?;
        }

        #[cfg(not(unix))]
        {
            fs::write(path, content).map_err(|e| ConfigError::Write(e.to_string()))?;
        }

        Ok(())
    }

    /// Get the config file location for display
    pub fn config_location() -> String {
        Self::config_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "~/.config/labscribe/config.json".to_string())
    }
}

fn preserve_corrupt_config(path: &Path, content: &str) {
    let corrupt_path = path.with_extension("json.corrupt");
    if fs::rename(path, &corrupt_path).is_err() {
        let _ = fs::write(&corrupt_path, content);
    }
}

#[cfg(unix)]
fn write_config_atomic(path: &Path, content: &str) -> Result<(), String> {
    use std::fs::OpenOptions;
    use std::os::unix::fs::PermissionsExt;

    let tmp_path = path.with_extension("tmp");
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&tmp_path)
        .map_err(|e| e.to_string())?;

    if let Err(e) = file.set_permissions(fs::Permissions::from_mode(0o600)) {
        tracing::warn!(error = %e, "Failed to set temp config file permissions");
    }

    file.write_all(content.as_bytes())
        .map_err(|e| e.to_string())?;

    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err.to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_api_key_first_non_empty_wins() {
        let lookup = lookup_from(&[
            ("GEMINI_API_KEY", ""),
            ("GOOGLE_GENAI_API_KEY", "  "),
            ("GOOGLE_API_KEY", "google-key"),
            ("GENAI_API_KEY", "genai-key"),
        ]);
        let key = resolve_api_key_with(lookup).unwrap();
        assert_eq!(key.expose(), "google-key");
    }

    #[test]
    fn test_api_key_prefers_gemini_variable() {
        let lookup = lookup_from(&[
            ("GEMINI_API_KEY", "gemini-key"),
            ("NEXT_PUBLIC_GEMINI_API_KEY", "public-key"),
        ]);
        assert_eq!(resolve_api_key_with(lookup).unwrap().expose(), "gemini-key");
    }

    #[test]
    fn test_missing_api_key_is_configuration_error() {
        let err = resolve_api_key_with(|_| None).unwrap_err();
        assert!(matches!(err, ConfigError::MissingApiKey));
        assert!(err.to_string().contains("GEMINI_API_KEY"));
    }

    #[test]
    fn test_api_key_debug_is_redacted() {
        let key = ApiKey::new("AIzaSecret");
        assert_eq!(format!("{:?}", key), "ApiKey(***)");
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.fallback_models.len(), DEFAULT_FALLBACK_MODELS.len());
        assert_eq!(config.fallback_models[0], "gemini-1.5-flash");
        assert!(!config.retry_on_parse_failure);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"request_timeout_secs": 5, "api_base_url": "http://localhost:9/"}"#)
            .unwrap();

        let config = Config::load_from(&path);
        assert_eq!(config.request_timeout_secs, 5);
        assert_eq!(config.api_base_url, "http://localhost:9");
        assert_eq!(config.discovery_timeout_secs, 10);
    }

    #[test]
    fn test_corrupt_config_is_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{not json").unwrap();

        let config = Config::load_from(&path);
        assert_eq!(config, Config::default());
        assert!(dir.path().join("config.json.corrupt").exists());
    }

    #[test]
    fn test_config_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = Config {
            retry_on_parse_failure: true,
            fallback_models: vec!["gemini-2.0-flash".to_string()],
            ..Config::default()
        };
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path);
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env_overrides(lookup_from(&[
            ("LABSCRIBE_API_BASE_URL", "http://127.0.0.1:8080/"),
            ("LABSCRIBE_BIND", "0.0.0.0:8000"),
        ]));
        assert_eq!(config.api_base_url, "http://127.0.0.1:8080");
        assert_eq!(config.bind_address, "0.0.0.0:8000");
    }
}
