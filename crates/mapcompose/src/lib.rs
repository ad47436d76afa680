//! Tile-grid compositing and Web-Mercator projection for static route maps.
//!
//! A request flows through the pieces in this order: [`BoundingBox`] from the
//! two route endpoints, [`TileGrid`] planning, tile fetching through a
//! [`TileSource`], compositing onto a [`Canvas`] (tiles, route, markers) and
//! finally [`crop`] down to the bounding box. [`MapRenderer`] drives the whole
//! pipeline.

use thiserror::Error;

pub mod bounds;
pub mod canvas;
pub mod crop;
pub mod grid;
pub mod marker;
pub mod projection;
pub mod render;
pub mod source;

pub use bounds::BoundingBox;
pub use canvas::{Canvas, RouteStyle};
pub use crop::{crop, crop_rect, CropRect};
pub use grid::TileGrid;
pub use marker::{Marker, MarkerIcon, MarkerIconSet, MarkerStyle};
pub use projection::{lon_lat_to_pixel, lon_lat_to_tile, GeoCoordinate, PixelPoint, Projector, TileIndex};
pub use render::{MapRenderer, MapRequest, RenderConfig};
pub use source::{BoxError, TileSource};

/// Edge length of a standard slippy tile in pixels.
pub const TILE_SIZE: u32 = 256;

#[derive(Error, Debug)]
pub enum MapError {
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Failed to fetch tile {index} at zoom {zoom}")]
    TileFetchFailure {
        index: TileIndex,
        zoom: u32,
        #[source]
        source: BoxError,
    },

    #[error("Tile {index} at zoom {zoom} is {width}x{height}, expected {expected}x{expected}")]
    InvalidTileRaster {
        index: TileIndex,
        zoom: u32,
        width: u32,
        height: u32,
        expected: u32,
    },

    #[error("Tile grid of {tiles_x}x{tiles_y} tiles exceeds the maximum span of {max_span}")]
    OversizedGrid { tiles_x: u32, tiles_y: u32, max_span: u32 },

    #[error("Projection out of range: {0}")]
    ProjectionOutOfRange(String),

    #[error("Canvas is missing {missing} of {total} tiles")]
    IncompleteCanvas { missing: usize, total: usize },

    #[error("Failed to build tile fetch pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Compositing stopped while tiles were still being fetched")]
    Aborted,
}

pub type StatusOr<T> = Result<T, MapError>;
