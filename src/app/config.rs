use anyhow::{Context, Result};
use directories::ProjectDirs;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::constants::{
    CONFIG_ENV_PREFIX, DEFAULT_API_BASE_URL, DEFAULT_ASSISTANT_ENV, DEFAULT_CREDENTIAL_ENV,
    DEFAULT_POLL_INTERVAL_MS,
};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Remote service settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Reply retrieval settings
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Terminal output settings
    #[serde(default)]
    pub ui: UiConfig,
}

/// Remote service configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the session API
    pub base_url: String,
    /// Environment variable holding the access credential
    pub credential_env: String,
    /// Environment variable holding the assistant id
    pub assistant_env: String,
    /// Assistant id; takes precedence over `assistant_env`
    pub assistant_id: Option<String>,
    /// Per-request timeout for non-streaming calls
    pub request_timeout_secs: Option<u64>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_string(),
            credential_env: DEFAULT_CREDENTIAL_ENV.to_string(),
            assistant_env: DEFAULT_ASSISTANT_ENV.to_string(),
            assistant_id: None,
            request_timeout_secs: None,
        }
    }
}

/// Order in which the service returns a session's messages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedOrder {
    #[default]
    NewestFirst,
    OldestFirst,
}

/// Reply retrieval configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Try the event stream before falling back to polling
    pub prefer_streaming: bool,
    /// Delay between run status checks
    pub poll_interval_ms: u64,
    /// Assumed order of the authoritative message feed
    pub feed_order: FeedOrder,
    /// Give up on a send after this many seconds
    pub send_timeout_secs: Option<u64>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            prefer_streaming: true,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            feed_order: FeedOrder::NewestFirst,
            send_timeout_secs: None,
        }
    }
}

/// Terminal output configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// Prefix messages with their timestamp
    pub show_timestamps: bool,
}

/// Load configuration from multiple sources
pub fn load_config() -> Result<Config> {
    let global_config = get_config_dir()?.join("config.toml");
    let local_config = PathBuf::from(".threadline/config.toml");
    load_config_from(&[global_config, local_config])
}

/// Merge defaults, the given TOML files (later wins) and `THREADLINE_*` env vars
pub fn load_config_from(files: &[PathBuf]) -> Result<Config> {
    let mut figment = Figment::from(Serialized::defaults(Config::default()));

    for file in files {
        if file.exists() {
            figment = figment.merge(Toml::file(file));
        }
    }

    // e.g. THREADLINE_API__BASE_URL, THREADLINE_RETRIEVAL__PREFER_STREAMING
    figment = figment.merge(
        Env::prefixed(CONFIG_ENV_PREFIX)
            .ignore(&["API_KEY", "ASSISTANT_ID"])
            .split("__"),
    );

    figment.extract().context("Failed to load configuration")
}

/// Load a single explicit config file on top of defaults
pub fn load_config_file(path: &Path) -> Result<Config> {
    let toml_str = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;
    toml::from_str(&toml_str).with_context(|| format!("Invalid config in {}", path.display()))
}

/// Get the configuration directory
pub fn get_config_dir() -> Result<PathBuf> {
    if let Some(proj_dirs) = ProjectDirs::from("", "", "threadline") {
        let config_dir = proj_dirs.config_dir();
        std::fs::create_dir_all(config_dir)?;
        Ok(config_dir.to_path_buf())
    } else {
        // Fallback to home directory
        let home = std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .context("Could not determine home directory")?;
        let config_dir = PathBuf::from(home).join(".config").join("threadline");
        std::fs::create_dir_all(&config_dir)?;
        Ok(config_dir)
    }
}

/// Save configuration to file
pub fn save_config(config: &Config, path: Option<PathBuf>) -> Result<()> {
    let path = if let Some(p) = path {
        p
    } else {
        get_config_dir()?.join("config.toml")
    };

    let toml_string = toml::to_string_pretty(config)?;
    std::fs::write(&path, toml_string)
        .with_context(|| format!("Failed to write config to {}", path.display()))?;

    Ok(())
}

/// Create a default configuration file if it doesn't exist
pub fn init_config() -> Result<()> {
    let config_dir = get_config_dir()?;
    let config_file = config_dir.join("config.toml");

    if !config_file.exists() {
        save_config(&Config::default(), Some(config_file.clone()))?;
        println!("Created default configuration at: {}", config_file.display());
    }

    // Create example local config
    let local_example = PathBuf::from(".threadline/config.toml.example");
    if !local_example.exists() {
        if let Some(parent) = local_example.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let example_config = r#"# threadline project configuration
# This file overrides global settings for this directory

[api]
base_url = "http://localhost:8787/v1"
# assistant_id = "asst_..."

[retrieval]
prefer_streaming = true
poll_interval_ms = 1000
feed_order = "newest_first"
# send_timeout_secs = 120
"#;
        std::fs::write(&local_example, example_config)?;
        println!("Created example configuration at: {}", local_example.display());
    }

    Ok(())
}
