use image::DynamicImage;

use crate::projection::TileIndex;

/// Error type returned by external collaborators.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Supplies raw tile rasters.
///
/// Fetches are issued concurrently from a worker pool, so implementations must
/// be thread-safe. Timeouts and retries are the implementation's business.
pub trait TileSource: Send + Sync {
    fn fetch_tile(&self, index: TileIndex, zoom: u32) -> Result<DynamicImage, BoxError>;
}
