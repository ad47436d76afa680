use anyhow::{Context, Result};
use image::DynamicImage;
use log::{debug, info};
use mapcompose::{BoxError, TileIndex, TileSource};
use reqwest::blocking::Client;
use std::time::Duration;

use crate::cache::Cache;
use crate::config::AppConfig;

/// Build the HTTP client shared by the tile source and the routing client
pub fn http_client(config: &AppConfig) -> Result<Client> {
    Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .context("Failed to build HTTP client")
}

/// Tile source backed by a slippy-map tile server
pub struct HttpTileSource {
    client: Client,
    url_template: String,
    cache: Option<Cache>,
}

impl HttpTileSource {
    pub fn new(client: Client, url_template: impl Into<String>, cache: Option<Cache>) -> Self {
        Self {
            client,
            url_template: url_template.into(),
            cache,
        }
    }

    /// URL of a tile, filled in from the template
    pub fn tile_url(&self, index: TileIndex, zoom: u32) -> String {
        self.url_template
            .replace("{z}", &zoom.to_string())
            .replace("{x}", &index.x.to_string())
            .replace("{y}", &index.y.to_string())
    }

    /// Fetch the encoded tile, from the cache when possible
    fn tile_bytes(&self, url: &str) -> Result<Vec<u8>> {
        if let Some(cache) = &self.cache {
            if let Some(data) = cache.read(url)? {
                debug!("Using cached tile for {}", url);
                return Ok(data);
            }
        }

        info!("Downloading tile {}", url);
        let response = self.client.get(url)
            .send()
            .with_context(|| format!("Failed to send request to {}", url))?;

        if !response.status().is_success() {
            anyhow::bail!("Failed to download {}: HTTP {}", url, response.status());
        }
        let data = response.bytes()
            .context("Failed to read response bytes")?;
        if data.is_empty() {
            anyhow::bail!("Empty tile returned by {}", url);
        }

        if let Some(cache) = &self.cache {
            cache.save_to_cache(url, &data)
                .context("Failed to save tile to cache")?;
        }
        Ok(data.to_vec())
    }

    fn load_tile(&self, index: TileIndex, zoom: u32) -> Result<DynamicImage> {
        let url = self.tile_url(index, zoom);
        let data = self.tile_bytes(&url)?;
        image::load_from_memory(&data)
            .with_context(|| format!("Failed to decode tile from {}", url))
    }
}

impl TileSource for HttpTileSource {
    fn fetch_tile(&self, index: TileIndex, zoom: u32) -> Result<DynamicImage, BoxError> {
        self.load_tile(index, zoom).map_err(|e| e.into())
    }
}
