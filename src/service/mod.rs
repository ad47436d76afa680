use anyhow::{Context, Result};
use image::{ImageFormat, RgbaImage};
use log::info;
use mapcompose::{GeoCoordinate, MapRenderer, MapRequest, Marker, MarkerStyle};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cache::Cache;
use crate::config::AppConfig;
use crate::download::{http_client, HttpTileSource};
use crate::openroute::{DirectionsProvider, Geocoder, OpenRouteClient};

/// Style of the markers placed at both ends of a route
const ENDPOINT_MARKER: MarkerStyle = MarkerStyle::PinRed32;

/// Turns a pair of addresses into a saved route map
pub struct MapService {
    geocoder: Box<dyn Geocoder>,
    directions: Box<dyn DirectionsProvider>,
    renderer: MapRenderer,
    zoom: u32,
}

impl MapService {
    pub fn new(
        geocoder: Box<dyn Geocoder>,
        directions: Box<dyn DirectionsProvider>,
        renderer: MapRenderer,
        zoom: u32,
    ) -> Self {
        Self { geocoder, directions, renderer, zoom }
    }

    /// Wire up the OpenRouteService client and the tile server from the config
    pub fn from_config(config: &AppConfig, cache: Option<Cache>) -> Result<Self> {
        let client = http_client(config)?;
        let tiles = HttpTileSource::new(client.clone(), config.tile_url.clone(), cache);
        let renderer = MapRenderer::new(config.render.clone(), Arc::new(tiles))
            .context("Failed to create map renderer")?;

        let api_key = config.resolve_api_key()?;
        let openroute = OpenRouteClient::new(client, config.openroute_url.clone(), api_key);

        Ok(Self::new(Box::new(openroute.clone()), Box::new(openroute), renderer, config.zoom))
    }

    pub fn with_zoom(mut self, zoom: u32) -> Self {
        self.zoom = zoom;
        self
    }

    pub fn zoom(&self) -> u32 {
        self.zoom
    }

    /// Geocode both addresses and render the route between them
    pub fn render_between(&self, from: &str, to: &str) -> Result<RgbaImage> {
        let start = self.geocoder.geocode(from)?;
        let end = self.geocoder.geocode(to)?;
        self.render_coords(start, end)
    }

    /// Render the route between two known coordinates
    pub fn render_coords(&self, start: GeoCoordinate, end: GeoCoordinate) -> Result<RgbaImage> {
        let waypoints = self.directions.directions(start, end)?;
        let request = MapRequest::new(start, end, self.zoom)
            .with_waypoints(waypoints)
            .with_marker(Marker::new(start, ENDPOINT_MARKER))
            .with_marker(Marker::new(end, ENDPOINT_MARKER));

        let image = self.renderer.generate_map_image(&request)
            .with_context(|| format!("Failed to render map from {} to {}", start, end))?;
        Ok(image)
    }

    /// Render the route between two addresses and save it in `output_dir`
    ///
    /// The file is named `file_name`, or `<from>-<to>.png` when none is given.
    pub fn get_map<P: AsRef<Path>>(
        &self,
        from: &str,
        to: &str,
        output_dir: P,
        file_name: Option<&str>,
    ) -> Result<PathBuf> {
        let image = self.render_between(from, to)?;
        let file_name = match file_name {
            Some(name) => name.to_string(),
            None => file_name_for(from, to),
        };
        let path = output_dir.as_ref().join(file_name);
        save_png(&image, &path)?;
        Ok(path)
    }
}

/// Output file name for a route; characters unsafe in paths become `_`
pub fn file_name_for(from: &str, to: &str) -> String {
    let clean = |name: &str| -> String {
        name.trim()
            .chars()
            .map(|c| if c.is_alphanumeric() || " ,.-_".contains(c) { c } else { '_' })
            .collect()
    };
    format!("{}-{}.png", clean(from), clean(to))
}

/// Write an image as PNG, creating parent directories as needed
pub fn save_png(image: &RgbaImage, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    image.save_with_format(path, ImageFormat::Png)
        .with_context(|| format!("Failed to save map to {}", path.display()))?;
    info!("Saved {}x{} map to {}", image.width(), image.height(), path.display());
    Ok(())
}
