use std::f64::consts::{FRAC_PI_4, PI};
use std::fmt;

use crate::{MapError, StatusOr, TILE_SIZE};

/// Highest zoom level the projector accepts.
pub const MAX_ZOOM: u32 = 22;

/// Latitude at which the Web-Mercator square ends. Anything further north or
/// south is clamped to this value.
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

/// A longitude/latitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoCoordinate {
    pub lon: f64,
    pub lat: f64,
}

impl GeoCoordinate {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }
}

impl fmt::Display for GeoCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.lon, self.lat)
    }
}

/// Slippy tile position at an implicit zoom level. X grows eastward, Y southward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileIndex {
    pub x: u32,
    pub y: u32,
}

impl TileIndex {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for TileIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x={} y={}", self.x, self.y)
    }
}

/// A sub-pixel position, either in world pixel space or relative to a canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelPoint {
    pub x: f64,
    pub y: f64,
}

impl PixelPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Translate this point into a space whose origin is `origin`.
    pub fn relative_to(self, origin: PixelPoint) -> PixelPoint {
        PixelPoint {
            x: self.x - origin.x,
            y: self.y - origin.y,
        }
    }
}

/// Web-Mercator projection at one zoom level and tile size.
///
/// Tile indices are always derived from the pixel position, so
/// `tile_of(c) == tile_containing(pixel_of(c))` holds for every valid input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Projector {
    zoom: u32,
    tile_size: u32,
}

impl Projector {
    pub fn new(zoom: u32, tile_size: u32) -> StatusOr<Self> {
        if zoom > MAX_ZOOM {
            return Err(MapError::ProjectionOutOfRange(format!(
                "zoom {} is above the maximum of {}",
                zoom, MAX_ZOOM
            )));
        }
        if tile_size == 0 {
            return Err(MapError::ProjectionOutOfRange("tile size must be positive".to_string()));
        }
        Ok(Self { zoom, tile_size })
    }

    pub fn zoom(&self) -> u32 {
        self.zoom
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    /// Number of tiles along each axis of the world.
    pub fn tiles_per_axis(&self) -> u32 {
        1u32 << self.zoom
    }

    /// Edge length of the whole world in pixels.
    pub fn world_size(&self) -> f64 {
        self.tile_size as f64 * self.tiles_per_axis() as f64
    }

    /// Project a coordinate into world pixel space.
    pub fn pixel_of(&self, coord: GeoCoordinate) -> StatusOr<PixelPoint> {
        validate_coordinate(coord)?;

        let world = self.world_size();
        let lat_rad = coord.lat.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();

        let x = (coord.lon + 180.0) / 360.0 * world;
        let y = (1.0 - (FRAC_PI_4 + lat_rad / 2.0).tan().ln() / PI) / 2.0 * world;

        Ok(PixelPoint {
            x: clamp_to_world(x, world),
            y: clamp_to_world(y, world),
        })
    }

    /// Slippy tile containing the coordinate.
    pub fn tile_of(&self, coord: GeoCoordinate) -> StatusOr<TileIndex> {
        let pixel = self.pixel_of(coord)?;
        Ok(self.tile_containing(pixel))
    }

    /// Tile containing a world pixel position.
    pub fn tile_containing(&self, pixel: PixelPoint) -> TileIndex {
        let size = self.tile_size as f64;
        let last = self.tiles_per_axis() - 1;
        TileIndex {
            x: ((pixel.x / size).floor().max(0.0) as u32).min(last),
            y: ((pixel.y / size).floor().max(0.0) as u32).min(last),
        }
    }

    /// World pixel position of a tile's top-left corner.
    pub fn tile_origin(&self, index: TileIndex) -> PixelPoint {
        let size = self.tile_size as f64;
        PixelPoint {
            x: index.x as f64 * size,
            y: index.y as f64 * size,
        }
    }

    /// Inverse projection from world pixel space back to a coordinate.
    pub fn coordinate_of(&self, pixel: PixelPoint) -> StatusOr<GeoCoordinate> {
        let world = self.world_size();
        let in_world = |v: f64| v.is_finite() && (0.0..=world).contains(&v);
        if !in_world(pixel.x) || !in_world(pixel.y) {
            return Err(MapError::ProjectionOutOfRange(format!(
                "pixel ({}, {}) lies outside the {}px world at zoom {}",
                pixel.x, pixel.y, world, self.zoom
            )));
        }

        let lon = pixel.x / world * 360.0 - 180.0;
        let n = PI - 2.0 * PI * pixel.y / world;
        let lat = n.sinh().atan().to_degrees();
        Ok(GeoCoordinate { lon, lat })
    }
}

fn validate_coordinate(coord: GeoCoordinate) -> StatusOr<()> {
    if !coord.lon.is_finite() || !coord.lat.is_finite() {
        return Err(MapError::ProjectionOutOfRange(format!(
            "coordinate ({}, {}) is not finite",
            coord.lon, coord.lat
        )));
    }
    if coord.lon.abs() > 180.0 || coord.lat.abs() > 90.0 {
        return Err(MapError::ProjectionOutOfRange(format!(
            "coordinate ({}, {}) is outside lon [-180, 180] / lat [-90, 90]",
            coord.lon, coord.lat
        )));
    }
    Ok(())
}

/// Keeps positions on the east and south world edges inside the last tile.
/// The margin scales with the world so it never drops below one float step.
fn clamp_to_world(value: f64, world: f64) -> f64 {
    value.clamp(0.0, world * (1.0 - f64::EPSILON))
}

/// Slippy tile for a coordinate using the standard 256px tile size.
pub fn lon_lat_to_tile(lon: f64, lat: f64, zoom: u32) -> StatusOr<TileIndex> {
    Projector::new(zoom, TILE_SIZE)?.tile_of(GeoCoordinate::new(lon, lat))
}

/// World pixel position for a coordinate using the standard 256px tile size.
pub fn lon_lat_to_pixel(lon: f64, lat: f64, zoom: u32) -> StatusOr<PixelPoint> {
    Projector::new(zoom, TILE_SIZE)?.pixel_of(GeoCoordinate::new(lon, lat))
}
