//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (WEBPAPER_*)
//! 2. TOML config file (if WEBPAPER_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Desktop browser UA; several publishers refuse obvious bot agents.
/// Mozilla's Readability.js, pinned.
const DEFAULT_READABILITY_SCRIPT_URL: &str = "https://unpkg.com/@mozilla/readability@0.5.0/Readability.js";

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_10_1) AppleWebKit/537.36 \
                                  (KHTML, like Gecko) Chrome/39.0.2171.95 Safari/537.36";

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (WEBPAPER_*)
/// 2. TOML config file (if WEBPAPER_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// User-Agent string for plain HTTP requests and content-type probes.
    ///
    /// Set via WEBPAPER_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// HTTP request timeout in milliseconds.
    ///
    /// Set via WEBPAPER_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum bytes to fetch per request.
    ///
    /// Set via WEBPAPER_MAX_BYTES environment variable.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Attempts for plain fetches and content-type probes.
    ///
    /// Set via WEBPAPER_MAX_RETRIES environment variable.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base backoff between attempts in milliseconds, doubled per attempt.
    ///
    /// Set via WEBPAPER_RETRY_BACKOFF_MS environment variable.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Whether the scripted headless browser may be used for fetching.
    ///
    /// Set via WEBPAPER_BROWSER_ENABLED environment variable.
    #[serde(default = "default_true")]
    pub browser_enabled: bool,

    /// Explicit Chrome/Chromium executable; auto-detected when unset.
    ///
    /// Set via WEBPAPER_CHROME_EXECUTABLE environment variable.
    #[serde(default)]
    pub chrome_executable: Option<PathBuf>,

    /// Local copy of Readability.js for in-browser extraction. Takes
    /// precedence over `readability_script_url`.
    ///
    /// Set via WEBPAPER_READABILITY_SCRIPT environment variable.
    #[serde(default)]
    pub readability_script: Option<PathBuf>,

    /// Where the browser loads Readability.js from when no local copy is set.
    #[serde(default = "default_readability_script_url")]
    pub readability_script_url: String,

    /// Pixels scrolled per iteration of the lazy-content loop.
    #[serde(default = "default_scroll_step_px")]
    pub scroll_step_px: u32,

    /// Pause after each scroll in milliseconds.
    #[serde(default = "default_scroll_pause_ms")]
    pub scroll_pause_ms: u64,

    /// Upper bound on scroll iterations.
    #[serde(default = "default_max_scroll_attempts")]
    pub max_scroll_attempts: u32,

    /// Enables the text-substitution repair of lazy-loaded images.
    ///
    /// Set via WEBPAPER_EXPERIMENTAL environment variable.
    #[serde(default)]
    pub experimental: bool,

    /// Persist intermediate markup snapshots into `debug_dir`.
    ///
    /// Set via WEBPAPER_DEBUG environment variable.
    #[serde(default)]
    pub debug: bool,

    /// Directory for debug snapshots.
    #[serde(default = "default_debug_dir")]
    pub debug_dir: PathBuf,

    /// Stylesheet file replacing the default stylesheet.
    #[serde(default)]
    pub css_path: Option<PathBuf>,

    /// Newline-separated font stylesheet URLs replacing the default list.
    #[serde(default)]
    pub font_urls_path: Option<PathBuf>,

    /// Emit JSON log lines instead of the human-readable format.
    #[serde(default)]
    pub log_json: bool,
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_max_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_max_retries() -> u32 {
    5
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_true() -> bool {
    true
}

fn default_readability_script_url() -> String {
    DEFAULT_READABILITY_SCRIPT_URL.into()
}

fn default_scroll_step_px() -> u32 {
    300
}

fn default_scroll_pause_ms() -> u64 {
    1_000
}

fn default_max_scroll_attempts() -> u32 {
    20
}

fn default_debug_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            max_bytes: default_max_bytes(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            browser_enabled: true,
            chrome_executable: None,
            readability_script: None,
            readability_script_url: default_readability_script_url(),
            scroll_step_px: default_scroll_step_px(),
            scroll_pause_ms: default_scroll_pause_ms(),
            max_scroll_attempts: default_max_scroll_attempts(),
            experimental: false,
            debug: false,
            debug_dir: default_debug_dir(),
            css_path: None,
            font_urls_path: None,
            log_json: false,
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Base retry backoff as Duration.
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `WEBPAPER_`
    /// 2. TOML file from `WEBPAPER_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("WEBPAPER_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("WEBPAPER_")
                .ignore(&["config_file"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
