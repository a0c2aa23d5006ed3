use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use super::cli::CliConfig;
use super::constants::{
    APP_DOT_FOLDER, CONFIG_FILE_NAME, DEFAULT_AUTOPLAY_INTERVAL_MS, DEFAULT_AUTOSAVE_DEBOUNCE_MS,
    DEFAULT_ERASURE_RATE, DEFAULT_HISTORY_SCOPE, DEFAULT_LANGUAGE, DEFAULT_PAYLOAD,
    MAX_ERASURE_RATE,
};
use super::secret::Secret;

// =============================================================================
// File configuration
// =============================================================================

#[derive(Debug, Default, Clone, Deserialize)]
pub struct BackendFileConfig {
    pub url: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct PlaybackFileConfig {
    pub autoplay_interval_ms: Option<u64>,
    pub autosave_debounce_ms: Option<u64>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct HistoryFileConfig {
    pub scope: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct SessionFileConfig {
    pub payload: Option<String>,
    pub language: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct ErasureFileConfig {
    pub rate: Option<u32>,
}

/// File-based configuration (JSON)
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub backend: Option<BackendFileConfig>,
    pub playback: Option<PlaybackFileConfig>,
    pub history: Option<HistoryFileConfig>,
    pub session: Option<SessionFileConfig>,
    pub erasure: Option<ErasureFileConfig>,
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

impl FileConfig {
    /// Load configuration from a JSON file
    fn load_from_file(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "Loading config file");
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        tracing::trace!(config = ?config, "Parsed config file");
        Ok(config)
    }

    /// Warn about unknown fields in the config
    fn warn_unknown_fields(&self) {
        if let serde_json::Value::Object(map) = &self.extra
            && !map.is_empty()
        {
            let keys_str: String = map
                .keys()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            tracing::warn!(
                fields = %keys_str,
                "Unknown fields in config file (possible typos)"
            );
        }
    }

    /// Merge another FileConfig into this one (other takes precedence)
    fn merge(&mut self, other: FileConfig) {
        if let Some(backend) = other.backend {
            let current = self.backend.get_or_insert_with(BackendFileConfig::default);
            if backend.url.is_some() {
                tracing::trace!(url = ?backend.url, "Merging backend.url");
                current.url = backend.url;
            }
            if backend.timeout_secs.is_some() {
                current.timeout_secs = backend.timeout_secs;
            }
        }

        if let Some(playback) = other.playback {
            let current = self.playback.get_or_insert_with(PlaybackFileConfig::default);
            if playback.autoplay_interval_ms.is_some() {
                current.autoplay_interval_ms = playback.autoplay_interval_ms;
            }
            if playback.autosave_debounce_ms.is_some() {
                current.autosave_debounce_ms = playback.autosave_debounce_ms;
            }
        }

        if let Some(history) = other.history
            && history.scope.is_some()
        {
            self.history.get_or_insert_with(HistoryFileConfig::default).scope = history.scope;
        }

        if let Some(session) = other.session {
            let current = self.session.get_or_insert_with(SessionFileConfig::default);
            if session.payload.is_some() {
                current.payload = session.payload;
            }
            if session.language.is_some() {
                current.language = session.language;
            }
        }

        if let Some(erasure) = other.erasure
            && erasure.rate.is_some()
        {
            self.erasure.get_or_insert_with(ErasureFileConfig::default).rate = erasure.rate;
        }
    }
}

// =============================================================================
// Resolved configuration
// =============================================================================

#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub url: String,
    pub timeout: Duration,
    pub api_key: Option<Secret>,
}

#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    pub autoplay_interval: Duration,
    pub autosave_debounce: Duration,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub payload: String,
    pub language: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub backend: BackendConfig,
    pub playback: PlaybackConfig,
    pub history_scope: String,
    pub session: SessionConfig,
    pub erasure_rate: u32,
}

impl AppConfig {
    /// Load configuration from all sources
    ///
    /// Priority (lowest to highest):
    /// 1. Defaults
    /// 2. Profile directory config (~/.agentmark/agentmark.json)
    /// 3. Local directory config OR CLI-specified config path
    /// 4. CLI arguments (which include env var fallbacks via clap)
    pub fn load(cli: &CliConfig) -> Result<Self> {
        tracing::debug!("Loading application configuration");

        let mut file_config = FileConfig::default();
        let mut found_configs: Vec<String> = Vec::new();

        if let Some(profile_path) = get_profile_config_path()
            && profile_path.exists()
        {
            let profile_config = FileConfig::load_from_file(&profile_path)?;
            profile_config.warn_unknown_fields();
            file_config.merge(profile_config);
            found_configs.push(profile_path.display().to_string());
        }

        let overlay_path = if let Some(ref path) = cli.config {
            let expanded = expand_path(&path.to_string_lossy());
            if !expanded.exists() {
                anyhow::bail!("Config file not found: {}", expanded.display());
            }
            Some(expanded)
        } else {
            let local = PathBuf::from(CONFIG_FILE_NAME);
            if local.exists() { Some(local) } else { None }
        };

        if let Some(path) = overlay_path {
            let overlay_config = FileConfig::load_from_file(&path)?;
            overlay_config.warn_unknown_fields();
            file_config.merge(overlay_config);
            found_configs.push(path.display().to_string());
        }

        tracing::debug!(configs = ?found_configs, "Config files loaded");

        let config = Self::resolve(cli, file_config)?;
        tracing::debug!(
            backend = %config.backend.url,
            scope = %config.history_scope,
            api_key = config.backend.api_key.is_some(),
            "Configuration resolved"
        );
        Ok(config)
    }

    /// Layer defaults, merged file config and CLI/env overrides
    fn resolve(cli: &CliConfig, file_config: FileConfig) -> Result<Self> {
        let file_backend = file_config.backend.unwrap_or_default();
        let file_playback = file_config.playback.unwrap_or_default();
        let file_history = file_config.history.unwrap_or_default();
        let file_session = file_config.session.unwrap_or_default();
        let file_erasure = file_config.erasure.unwrap_or_default();

        let url = cli
            .backend_url
            .clone()
            .or(file_backend.url)
            .unwrap_or_else(|| agentmark::http::DEFAULT_BASE_URL.to_string());

        let timeout_secs = cli
            .timeout_secs
            .or(file_backend.timeout_secs)
            .unwrap_or(agentmark::http::DEFAULT_TIMEOUT_SECS);
        if timeout_secs == 0 {
            anyhow::bail!("backend.timeout_secs must be greater than 0");
        }

        let autoplay_interval_ms = cli
            .autoplay_interval_ms
            .or(file_playback.autoplay_interval_ms)
            .unwrap_or(DEFAULT_AUTOPLAY_INTERVAL_MS);
        if autoplay_interval_ms == 0 {
            anyhow::bail!("playback.autoplay_interval_ms must be greater than 0");
        }

        let autosave_debounce_ms = file_playback
            .autosave_debounce_ms
            .unwrap_or(DEFAULT_AUTOSAVE_DEBOUNCE_MS);

        let erasure_rate = cli
            .erasure_rate
            .or(file_erasure.rate)
            .unwrap_or(DEFAULT_ERASURE_RATE);
        if erasure_rate > MAX_ERASURE_RATE {
            anyhow::bail!(
                "erasure rate must be between 0 and {}, got {}",
                MAX_ERASURE_RATE,
                erasure_rate
            );
        }

        let payload = cli
            .payload
            .clone()
            .or(file_session.payload)
            .unwrap_or_else(|| DEFAULT_PAYLOAD.to_string());

        Ok(Self {
            backend: BackendConfig {
                url,
                timeout: Duration::from_secs(timeout_secs),
                api_key: cli.api_key.clone().and_then(Secret::non_empty),
            },
            playback: PlaybackConfig {
                autoplay_interval: Duration::from_millis(autoplay_interval_ms),
                autosave_debounce: Duration::from_millis(autosave_debounce_ms),
            },
            history_scope: file_history
                .scope
                .unwrap_or_else(|| DEFAULT_HISTORY_SCOPE.to_string()),
            session: SessionConfig {
                payload,
                language: file_session
                    .language
                    .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
            },
            erasure_rate,
        })
    }
}

/// Expand a leading `~/` to the home directory
fn expand_path(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    PathBuf::from(path)
}

fn get_profile_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(APP_DOT_FOLDER).join(CONFIG_FILE_NAME))
}
