use anyhow::{bail, Context, Result};
use mapcompose::RenderConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Environment variable consulted when no API key is configured
pub const API_KEY_ENV: &str = "ORS_API_KEY";

/// Application settings, loaded from a JSON file
///
/// Every field has a default, so a config file only needs the values it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// OpenRouteService API key
    pub api_key: Option<String>,
    /// Base URL of the OpenRouteService API
    pub openroute_url: String,
    /// Tile URL template with `{z}`, `{x}` and `{y}` placeholders
    pub tile_url: String,
    /// User-Agent sent with every request
    pub user_agent: String,
    pub timeout_secs: u64,
    pub cache_dir: String,
    /// Zoom level used when the command line does not give one
    pub zoom: u32,
    pub render: RenderConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            openroute_url: "https://api.openrouteservice.org".to_string(),
            tile_url: "https://tile.openstreetmap.org/{z}/{x}/{y}.png".to_string(),
            user_agent: concat!("routemap/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout_secs: 30,
            cache_dir: ".cache".to_string(),
            zoom: 16,
            render: RenderConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load the config from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// The configured API key, falling back to the environment
    pub fn resolve_api_key(&self) -> Result<String> {
        Self::pick_api_key(self.api_key.as_deref(), std::env::var(API_KEY_ENV).ok())
    }

    fn pick_api_key(configured: Option<&str>, from_env: Option<String>) -> Result<String> {
        let key = configured
            .map(str::to_string)
            .or(from_env)
            .filter(|key| !key.trim().is_empty());
        match key {
            Some(key) => Ok(key),
            None => bail!("No OpenRouteService API key; set api_key in the config or {}", API_KEY_ENV),
        }
    }
}
