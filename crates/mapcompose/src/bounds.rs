use crate::projection::GeoCoordinate;

/// Geographic bounds of a route, normalized so that `min <= max` on both axes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    /// Smallest box containing both endpoints, whatever order they come in.
    pub fn from_endpoints(a: GeoCoordinate, b: GeoCoordinate) -> Self {
        Self {
            min_lon: a.lon.min(b.lon),
            min_lat: a.lat.min(b.lat),
            max_lon: a.lon.max(b.lon),
            max_lat: a.lat.max(b.lat),
        }
    }

    /// Top-left corner on a north-up map.
    pub fn north_west(&self) -> GeoCoordinate {
        GeoCoordinate::new(self.min_lon, self.max_lat)
    }

    /// Bottom-right corner on a north-up map.
    pub fn south_east(&self) -> GeoCoordinate {
        GeoCoordinate::new(self.max_lon, self.min_lat)
    }

    pub fn width(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    pub fn height(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    /// True when both endpoints coincide on at least one axis.
    pub fn is_degenerate(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }
}
