use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use mapcompose::GeoCoordinate;
use std::path::PathBuf;

mod cache;
mod config;
mod download;
mod openroute;
mod service;

use cache::Cache;
use config::AppConfig;
use service::{save_png, MapService};

#[derive(Parser)]
#[command(author, version, about = "Render route maps from OpenStreetMap tiles", long_about = None)]
struct Cli {
    /// Path to a JSON config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to the cache directory (overrides the config file)
    #[arg(short, long)]
    cache_dir: Option<String>,

    /// Path to the output directory
    #[arg(short, long, default_value = "output")]
    output_dir: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Geocode two addresses and render the route between them
    Render {
        /// Start address
        #[arg(short, long)]
        from: String,

        /// Destination address
        #[arg(short, long)]
        to: String,

        /// Zoom level (overrides the config file)
        #[arg(short, long)]
        zoom: Option<u32>,

        /// Output filename, defaults to "<from>-<to>.png"
        #[arg(long)]
        output: Option<String>,

        /// Keep whole tiles instead of cropping to the route
        #[arg(long)]
        no_crop: bool,
    },

    /// Render the route between two "lon,lat" coordinates
    RenderCoords {
        /// Start coordinate as lon,lat
        #[arg(long, value_parser = parse_coordinate, allow_hyphen_values = true)]
        start: GeoCoordinate,

        /// End coordinate as lon,lat
        #[arg(long, value_parser = parse_coordinate, allow_hyphen_values = true)]
        end: GeoCoordinate,

        /// Zoom level (overrides the config file)
        #[arg(short, long)]
        zoom: Option<u32>,

        /// Output filename
        #[arg(long, default_value = "route.png")]
        output: String,

        /// Keep whole tiles instead of cropping to the route
        #[arg(long)]
        no_crop: bool,
    },

    /// Clear the tile cache
    ClearCache,
}

fn parse_coordinate(value: &str) -> Result<GeoCoordinate, String> {
    let (lon, lat) = value.split_once(',')
        .ok_or_else(|| format!("expected lon,lat but got {:?}", value))?;
    let lon: f64 = lon.trim().parse()
        .map_err(|e| format!("invalid longitude {:?}: {}", lon, e))?;
    let lat: f64 = lat.trim().parse()
        .map_err(|e| format!("invalid latitude {:?}: {}", lat, e))?;
    if !lon.is_finite() || !lat.is_finite() {
        return Err(format!("coordinate {:?} is not finite", value));
    }
    Ok(GeoCoordinate::new(lon, lat))
}

fn build_service(config: &AppConfig, cache: Cache, zoom: Option<u32>) -> Result<MapService> {
    let service = MapService::from_config(config, Some(cache))?;
    Ok(match zoom {
        Some(zoom) => service.with_zoom(zoom),
        None => service,
    })
}

fn main() -> Result<()> {
    // Initialize logger, defaulting to info
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Parse command line arguments
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    if let Some(cache_dir) = &cli.cache_dir {
        config.cache_dir = cache_dir.clone();
    }

    // Create cache directory
    let cache = Cache::new(&config.cache_dir)
        .context("Failed to create cache")?;

    let output_dir = PathBuf::from(&cli.output_dir);

    // Process command
    match cli.command {
        Commands::Render { from, to, zoom, output, no_crop } => {
            config.render.crop &= !no_crop;
            let service = build_service(&config, cache, zoom)?;

            info!("Rendering route from {:?} to {:?} at zoom {}", from, to, service.zoom());
            let path = service.get_map(&from, &to, &output_dir, output.as_deref())?;
            info!("Done, map written to {}", path.display());
        },

        Commands::RenderCoords { start, end, zoom, output, no_crop } => {
            config.render.crop &= !no_crop;
            let service = build_service(&config, cache, zoom)?;

            info!("Rendering route from {} to {} at zoom {}", start, end, service.zoom());
            let image = service.render_coords(start, end)?;
            save_png(&image, &output_dir.join(output))?;
            info!("Done");
        },

        Commands::ClearCache => {
            info!("Clearing cache");
            cache.clear()
                .context("Failed to clear cache")?;
            info!("Cache cleared");
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_coordinate() {
        assert_eq!(parse_coordinate("16.3738,48.2082").unwrap(), GeoCoordinate::new(16.3738, 48.2082));
        assert_eq!(parse_coordinate("-74.006, 40.7128").unwrap(), GeoCoordinate::new(-74.006, 40.7128));
        assert!(parse_coordinate("16.3738").is_err());
        assert!(parse_coordinate("east,48").is_err());
        assert!(parse_coordinate("NaN,48").is_err());
    }

    #[test]
    fn test_cli_parses_render_coords() {
        let cli = Cli::try_parse_from([
            "routemap", "render-coords", "--start", "-0.1276,51.5072", "--end", "-0.1,51.52", "--zoom", "15",
        ])
        .unwrap();
        match cli.command {
            Commands::RenderCoords { start, end, zoom, output, no_crop } => {
                assert_eq!(start, GeoCoordinate::new(-0.1276, 51.5072));
                assert_eq!(end, GeoCoordinate::new(-0.1, 51.52));
                assert_eq!(zoom, Some(15));
                assert_eq!(output, "route.png");
                assert!(!no_crop);
            }
            _ => panic!("expected render-coords"),
        }
    }
}
