use log::debug;

use crate::bounds::BoundingBox;
use crate::projection::{PixelPoint, Projector, TileIndex};
use crate::{MapError, StatusOr};

/// Rectangular block of slippy tiles covering a bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGrid {
    pub top_left: TileIndex,
    pub bottom_right: TileIndex,
    pub tiles_x: u32,
    pub tiles_y: u32,
}

impl TileGrid {
    /// Plan the tiles needed to cover `bbox`.
    ///
    /// The north-west corner gives the top-left tile and the south-east corner
    /// the bottom-right one, since tile Y grows southward. Grids wider or
    /// taller than `max_span` tiles are rejected.
    pub fn plan(bbox: &BoundingBox, projector: &Projector, max_span: u32) -> StatusOr<Self> {
        let top_left = projector.tile_of(bbox.north_west())?;
        let bottom_right = projector.tile_of(bbox.south_east())?;
        let grid = Self::from_corners(top_left, bottom_right)?;

        debug!(
            "Planned {}x{} tiles from {} to {} at zoom {}",
            grid.tiles_x,
            grid.tiles_y,
            top_left,
            bottom_right,
            projector.zoom()
        );

        let canvas_fits = grid.tiles_x.checked_mul(projector.tile_size()).is_some()
            && grid.tiles_y.checked_mul(projector.tile_size()).is_some();
        if grid.tiles_x > max_span || grid.tiles_y > max_span || !canvas_fits {
            return Err(MapError::OversizedGrid {
                tiles_x: grid.tiles_x,
                tiles_y: grid.tiles_y,
                max_span,
            });
        }

        Ok(grid)
    }

    pub fn from_corners(top_left: TileIndex, bottom_right: TileIndex) -> StatusOr<Self> {
        if bottom_right.x < top_left.x || bottom_right.y < top_left.y {
            return Err(MapError::InvalidGeometry(format!(
                "tile grid from {} to {} has no extent",
                top_left, bottom_right
            )));
        }
        Ok(Self {
            top_left,
            bottom_right,
            tiles_x: bottom_right.x - top_left.x + 1,
            tiles_y: bottom_right.y - top_left.y + 1,
        })
    }

    pub fn tile_count(&self) -> usize {
        self.tiles_x as usize * self.tiles_y as usize
    }

    pub fn contains(&self, index: TileIndex) -> bool {
        (self.top_left.x..=self.bottom_right.x).contains(&index.x)
            && (self.top_left.y..=self.bottom_right.y).contains(&index.y)
    }

    /// Column and row of `index` inside the grid.
    pub fn offset_of(&self, index: TileIndex) -> Option<(u32, u32)> {
        self.contains(index)
            .then(|| (index.x - self.top_left.x, index.y - self.top_left.y))
    }

    /// All tiles of the grid in row-major order.
    pub fn indices(&self) -> impl Iterator<Item = TileIndex> {
        let top_left = self.top_left;
        let (tiles_x, tiles_y) = (self.tiles_x, self.tiles_y);
        (0..tiles_y).flat_map(move |row| {
            (0..tiles_x).map(move |col| TileIndex::new(top_left.x + col, top_left.y + row))
        })
    }

    /// World pixel position of the canvas's top-left corner.
    pub fn pixel_origin(&self, tile_size: u32) -> PixelPoint {
        PixelPoint::new(
            self.top_left.x as f64 * tile_size as f64,
            self.top_left.y as f64 * tile_size as f64,
        )
    }

    /// Width and height of the stitched canvas in pixels.
    pub fn canvas_size(&self, tile_size: u32) -> (u32, u32) {
        (
            self.tiles_x.saturating_mul(tile_size),
            self.tiles_y.saturating_mul(tile_size),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::GeoCoordinate;
    use crate::TILE_SIZE;

    fn vienna() -> GeoCoordinate {
        GeoCoordinate::new(16.3738, 48.2082)
    }

    fn plan(a: GeoCoordinate, b: GeoCoordinate, zoom: u32, max_span: u32) -> StatusOr<TileGrid> {
        let projector = Projector::new(zoom, TILE_SIZE).unwrap();
        TileGrid::plan(&BoundingBox::from_endpoints(a, b), &projector, max_span)
    }

    #[test]
    fn test_short_hop_east_of_vienna() {
        let east = GeoCoordinate::new(16.3838, 48.2082);

        let grid = plan(vienna(), east, 14, 64).unwrap();
        assert_eq!(grid.top_left, TileIndex::new(8937, 5681));
        assert_eq!((grid.tiles_x, grid.tiles_y), (1, 1));

        let grid = plan(vienna(), east, 16, 64).unwrap();
        assert_eq!(grid.top_left, TileIndex::new(35748, 22724));
        assert_eq!(grid.bottom_right, TileIndex::new(35750, 22724));
        assert_eq!((grid.tiles_x, grid.tiles_y), (3, 1));
    }

    #[test]
    fn test_one_degree_box() {
        let far = GeoCoordinate::new(17.3738, 49.2082);

        let grid = plan(vienna(), far, 10, 64).unwrap();
        assert_eq!((grid.tiles_x, grid.tiles_y), (4, 6));

        let grid = plan(vienna(), far, 12, 64).unwrap();
        assert_eq!(grid.top_left, TileIndex::new(2234, 1403));
        assert_eq!(grid.bottom_right, TileIndex::new(2245, 1420));
        assert_eq!((grid.tiles_x, grid.tiles_y), (12, 18));
        assert_eq!(grid.canvas_size(TILE_SIZE), (12 * 256, 18 * 256));
    }

    #[test]
    fn test_oversized_grid_is_rejected() {
        let far = GeoCoordinate::new(17.3738, 49.2082);
        match plan(vienna(), far, 14, 64) {
            Err(MapError::OversizedGrid { tiles_x, tiles_y, max_span }) => {
                assert_eq!((tiles_x, tiles_y, max_span), (46, 70, 64));
            }
            other => panic!("expected OversizedGrid, got {other:?}"),
        }
        assert!(plan(vienna(), far, 14, 128).is_ok());
    }

    #[test]
    fn test_indices_are_row_major() {
        let grid = TileGrid::from_corners(TileIndex::new(10, 20), TileIndex::new(11, 21)).unwrap();
        let indices: Vec<_> = grid.indices().collect();
        assert_eq!(
            indices,
            vec![
                TileIndex::new(10, 20),
                TileIndex::new(11, 20),
                TileIndex::new(10, 21),
                TileIndex::new(11, 21),
            ]
        );
        assert_eq!(grid.tile_count(), 4);
        assert_eq!(grid.offset_of(TileIndex::new(11, 21)), Some((1, 1)));
        assert_eq!(grid.offset_of(TileIndex::new(12, 21)), None);
        assert_eq!(grid.pixel_origin(TILE_SIZE), PixelPoint::new(2560.0, 5120.0));
    }

    #[test]
    fn test_inverted_corners_have_no_extent() {
        let result = TileGrid::from_corners(TileIndex::new(5, 5), TileIndex::new(4, 5));
        assert!(matches!(result, Err(MapError::InvalidGeometry(_))));
    }
}
