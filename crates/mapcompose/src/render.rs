use std::panic;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;

use image::{Rgba, RgbaImage};
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::bounds::BoundingBox;
use crate::canvas::{Canvas, RouteStyle};
use crate::crop::{crop, crop_rect};
use crate::grid::TileGrid;
use crate::marker::{Marker, MarkerIconSet};
use crate::projection::{GeoCoordinate, Projector, TileIndex};
use crate::source::TileSource;
use crate::{MapError, StatusOr, TILE_SIZE};

/// Rendering settings shared by every request of a renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Edge length of the tiles served by the tile source.
    pub tile_size: u32,
    /// Largest number of tiles allowed along either grid axis.
    pub max_grid_span: u32,
    /// Concurrent tile fetches. Zero lets rayon pick.
    pub fetch_workers: usize,
    /// RGBA color of the route line.
    pub route_color: [u8; 4],
    /// Route line width in pixels.
    pub route_width: f32,
    /// Crop the stitched canvas down to the route's bounding box.
    pub crop: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            tile_size: TILE_SIZE,
            max_grid_span: 64,
            fetch_workers: 4,
            route_color: [255, 0, 0, 255],
            route_width: 10.0,
            crop: true,
        }
    }
}

impl RenderConfig {
    pub fn route_style(&self) -> RouteStyle {
        RouteStyle {
            color: Rgba(self.route_color),
            width: self.route_width,
        }
    }
}

/// Everything needed to draw one route map.
#[derive(Debug, Clone, PartialEq)]
pub struct MapRequest {
    pub start: GeoCoordinate,
    pub end: GeoCoordinate,
    pub waypoints: Vec<GeoCoordinate>,
    pub zoom: u32,
    pub markers: Vec<Marker>,
}

impl MapRequest {
    pub fn new(start: GeoCoordinate, end: GeoCoordinate, zoom: u32) -> Self {
        Self {
            start,
            end,
            waypoints: Vec::new(),
            zoom,
            markers: Vec::new(),
        }
    }

    pub fn with_waypoints(mut self, waypoints: Vec<GeoCoordinate>) -> Self {
        self.waypoints = waypoints;
        self
    }

    pub fn with_marker(mut self, marker: Marker) -> Self {
        self.markers.push(marker);
        self
    }
}

type FetchedTile = (TileIndex, RgbaImage);

/// Drives a request through planning, fetching, compositing and cropping.
pub struct MapRenderer {
    config: RenderConfig,
    source: Arc<dyn TileSource>,
    icons: MarkerIconSet,
    pool: rayon::ThreadPool,
}

impl MapRenderer {
    pub fn new(config: RenderConfig, source: Arc<dyn TileSource>) -> StatusOr<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.fetch_workers)
            .thread_name(|i| format!("tile-fetch-{}", i))
            .build()?;
        Ok(Self {
            config,
            source,
            icons: MarkerIconSet::default(),
            pool,
        })
    }

    pub fn with_icons(mut self, icons: MarkerIconSet) -> Self {
        self.icons = icons;
        self
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn icons(&self) -> &MarkerIconSet {
        &self.icons
    }

    /// Render the route map described by `request`.
    ///
    /// Any failure aborts the whole request; a partial map is never returned.
    pub fn generate_map_image(&self, request: &MapRequest) -> StatusOr<RgbaImage> {
        let projector = Projector::new(request.zoom, self.config.tile_size)?;
        let bbox = BoundingBox::from_endpoints(request.start, request.end);
        let grid = TileGrid::plan(&bbox, &projector, self.config.max_grid_span)?;

        // Reject empty crops before any tile is fetched.
        if self.config.crop {
            crop_rect(&grid, &bbox, &projector)?;
        }

        info!(
            "Rendering {}x{} tiles at zoom {} for {} waypoints and {} markers",
            grid.tiles_x,
            grid.tiles_y,
            request.zoom,
            request.waypoints.len(),
            request.markers.len()
        );

        let mut canvas = Canvas::new(grid, projector);
        self.composite_tiles(&mut canvas)?;

        let segments = canvas.draw_route(&request.waypoints, &self.config.route_style())?;
        debug!("Drew {} route segments", segments);

        for marker in &request.markers {
            if !canvas.draw_marker(marker.position, self.icons.get(marker.style))? {
                warn!("Marker at {} falls outside the map and was skipped", marker.position);
            }
        }

        if self.config.crop {
            crop(&canvas, &bbox)
        } else {
            Ok(canvas.into_image())
        }
    }

    /// Fetch every grid tile on the pool and place them from this thread.
    fn composite_tiles(&self, canvas: &mut Canvas) -> StatusOr<()> {
        let indices: Vec<TileIndex> = canvas.grid().indices().collect();
        let zoom = canvas.projector().zoom();
        let (sender, receiver) = mpsc::channel();

        thread::scope(|scope| {
            let fetcher = scope.spawn(|| self.fetch_tiles(&indices, zoom, sender));
            let placed = place_fetched_tiles(canvas, receiver);
            let fetched = fetcher.join().unwrap_or_else(|payload| panic::resume_unwind(payload));
            placed.and(fetched)
        })?;

        if !canvas.is_complete() {
            return Err(MapError::IncompleteCanvas {
                missing: canvas.missing_tiles(),
                total: canvas.grid().tile_count(),
            });
        }
        Ok(())
    }

    /// Fetch tiles concurrently. The first failure stops the remaining fetches.
    fn fetch_tiles(&self, indices: &[TileIndex], zoom: u32, sender: Sender<FetchedTile>) -> StatusOr<()> {
        self.pool.install(|| {
            indices.par_iter().try_for_each_with(sender, |sender, &index| {
                let raster = self.fetch_tile(index, zoom)?;
                sender.send((index, raster)).map_err(|_| MapError::Aborted)
            })
        })
    }

    fn fetch_tile(&self, index: TileIndex, zoom: u32) -> StatusOr<RgbaImage> {
        let raster = self.source.fetch_tile(index, zoom).map_err(|source| {
            warn!("Tile {} at zoom {} failed: {}", index, zoom, source);
            MapError::TileFetchFailure { index, zoom, source }
        })?;

        let expected = self.config.tile_size;
        if raster.width() != expected || raster.height() != expected {
            return Err(MapError::InvalidTileRaster {
                index,
                zoom,
                width: raster.width(),
                height: raster.height(),
                expected,
            });
        }

        debug!("Fetched tile {} at zoom {}", index, zoom);
        Ok(raster.into_rgba8())
    }
}

fn place_fetched_tiles(canvas: &mut Canvas, receiver: Receiver<FetchedTile>) -> StatusOr<()> {
    for (index, raster) in receiver {
        canvas.place_tile(index, &raster)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marker::{MarkerIcon, MarkerStyle};
    use crate::source::BoxError;
    use image::DynamicImage;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const WATER: Rgba<u8> = Rgba([170, 211, 223, 255]);

    /// Serves one flat color for every tile and counts requests.
    struct SolidTiles {
        color: Rgba<u8>,
        size: u32,
        fetched: AtomicUsize,
    }

    impl SolidTiles {
        fn new(color: Rgba<u8>) -> Self {
            Self { color, size: TILE_SIZE, fetched: AtomicUsize::new(0) }
        }
    }

    impl TileSource for SolidTiles {
        fn fetch_tile(&self, _index: TileIndex, _zoom: u32) -> Result<DynamicImage, BoxError> {
            self.fetched.fetch_add(1, Ordering::SeqCst);
            Ok(DynamicImage::ImageRgba8(RgbaImage::from_pixel(self.size, self.size, self.color)))
        }
    }

    /// Colors each tile by its grid position and records every request.
    struct IndexedTiles {
        requests: Mutex<Vec<(TileIndex, u32)>>,
    }

    fn color_for(index: TileIndex) -> Rgba<u8> {
        Rgba([(index.x % 251) as u8, (index.y % 251) as u8, 7, 255])
    }

    impl TileSource for IndexedTiles {
        fn fetch_tile(&self, index: TileIndex, zoom: u32) -> Result<DynamicImage, BoxError> {
            self.requests.lock().unwrap().push((index, zoom));
            Ok(DynamicImage::ImageRgba8(RgbaImage::from_pixel(TILE_SIZE, TILE_SIZE, color_for(index))))
        }
    }

    /// Fails for exactly one tile.
    struct BrokenTile {
        broken: TileIndex,
    }

    impl TileSource for BrokenTile {
        fn fetch_tile(&self, index: TileIndex, _zoom: u32) -> Result<DynamicImage, BoxError> {
            if index == self.broken {
                return Err("HTTP 503".into());
            }
            Ok(DynamicImage::ImageRgba8(RgbaImage::from_pixel(TILE_SIZE, TILE_SIZE, WATER)))
        }
    }

    /// Fails the first request and serves slow tiles afterwards.
    struct FailsFirst {
        calls: AtomicUsize,
    }

    impl TileSource for FailsFirst {
        fn fetch_tile(&self, _index: TileIndex, _zoom: u32) -> Result<DynamicImage, BoxError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err("connection reset".into());
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
            Ok(DynamicImage::ImageRgba8(RgbaImage::from_pixel(TILE_SIZE, TILE_SIZE, WATER)))
        }
    }

    fn start() -> GeoCoordinate {
        GeoCoordinate::new(16.3738, 48.2082)
    }

    fn end() -> GeoCoordinate {
        GeoCoordinate::new(16.4, 48.22)
    }

    fn vienna_request() -> MapRequest {
        MapRequest::new(start(), end(), 14)
            .with_waypoints(vec![start(), end()])
            .with_marker(Marker::new(start(), MarkerStyle::PinRed32))
            .with_marker(Marker::new(end(), MarkerStyle::MarkerRed32))
    }

    fn renderer(config: RenderConfig, source: Arc<dyn TileSource>) -> MapRenderer {
        MapRenderer::new(config, source).unwrap()
    }

    #[test]
    fn test_end_to_end_vienna_route() {
        let source = Arc::new(SolidTiles::new(WATER));
        let renderer = renderer(RenderConfig::default(), source.clone());
        let request = vienna_request();

        let image = renderer.generate_map_image(&request).unwrap();

        let projector = Projector::new(14, TILE_SIZE).unwrap();
        let bbox = BoundingBox::from_endpoints(start(), end());
        let grid = TileGrid::plan(&bbox, &projector, 64).unwrap();
        let rect = crop_rect(&grid, &bbox, &projector).unwrap();
        assert_eq!(image.dimensions(), (rect.width, rect.height));
        assert_eq!(image.dimensions(), (306, 208));
        assert_eq!(source.fetched.load(Ordering::SeqCst), 4);

        let start_px = projector.pixel_of(start()).unwrap().relative_to(grid.pixel_origin(TILE_SIZE));
        let x = start_px.x.floor() as u32 - rect.x;
        let y = start_px.y.floor() as u32 - rect.y;
        assert_eq!((x, y), (0, 207));
        let anchor = renderer.icons().get(MarkerStyle::PinRed32).anchor_color();
        assert_eq!(*image.get_pixel(x, y), anchor);

        // Far from the diagonal route line and both markers.
        assert_eq!(*image.get_pixel(300, 200), WATER);
        // On the route line halfway between the endpoints.
        assert_eq!(*image.get_pixel(153, 104), Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn test_uncropped_canvas_keeps_whole_tiles() {
        let source = Arc::new(IndexedTiles { requests: Mutex::new(Vec::new()) });
        let config = RenderConfig { crop: false, fetch_workers: 3, ..RenderConfig::default() };
        let renderer = renderer(config, source.clone());

        let image = renderer
            .generate_map_image(&MapRequest::new(start(), end(), 14))
            .unwrap();
        assert_eq!(image.dimensions(), (512, 512));

        let mut requests = source.requests.lock().unwrap().clone();
        requests.sort();
        assert_eq!(
            requests,
            vec![
                (TileIndex::new(8937, 5680), 14),
                (TileIndex::new(8937, 5681), 14),
                (TileIndex::new(8938, 5680), 14),
                (TileIndex::new(8938, 5681), 14),
            ]
        );
        for (col, row) in [(0u32, 0u32), (1, 0), (0, 1), (1, 1)] {
            let index = TileIndex::new(8937 + col, 5680 + row);
            assert_eq!(*image.get_pixel(col * 256 + 128, row * 256 + 128), color_for(index));
        }
    }

    #[test]
    fn test_identical_endpoints_fail_before_fetching() {
        let source = Arc::new(SolidTiles::new(WATER));
        let renderer = renderer(RenderConfig::default(), source.clone());
        let request = MapRequest::new(start(), start(), 14).with_waypoints(vec![start(), start()]);

        let result = renderer.generate_map_image(&request);
        assert!(matches!(result, Err(MapError::InvalidGeometry(_))));
        assert_eq!(source.fetched.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_single_tile_failure_fails_request() {
        let broken = TileIndex::new(8938, 5681);
        let renderer = renderer(RenderConfig::default(), Arc::new(BrokenTile { broken }));

        match renderer.generate_map_image(&vienna_request()) {
            Err(MapError::TileFetchFailure { index, zoom, source }) => {
                assert_eq!(index, broken);
                assert_eq!(zoom, 14);
                assert_eq!(source.to_string(), "HTTP 503");
            }
            other => panic!("expected TileFetchFailure, got {:?}", other.map(|image| image.dimensions())),
        }
    }

    #[test]
    fn test_first_failure_stops_remaining_fetches() {
        let source = Arc::new(FailsFirst { calls: AtomicUsize::new(0) });
        let config = RenderConfig { fetch_workers: 2, ..RenderConfig::default() };
        let renderer = renderer(config, source.clone());
        let far = GeoCoordinate::new(17.3738, 49.2082);

        let projector = Projector::new(12, TILE_SIZE).unwrap();
        let grid = TileGrid::plan(&BoundingBox::from_endpoints(start(), far), &projector, 64).unwrap();
        assert_eq!(grid.tile_count(), 216);

        let result = renderer.generate_map_image(&MapRequest::new(start(), far, 12));
        assert!(matches!(result, Err(MapError::TileFetchFailure { .. })));
        let calls = source.calls.load(Ordering::SeqCst);
        assert!(calls < grid.tile_count() / 2, "{} of {} tiles fetched", calls, grid.tile_count());
    }

    #[test]
    fn test_wrong_tile_size_is_rejected() {
        let source = Arc::new(SolidTiles { color: WATER, size: 512, fetched: AtomicUsize::new(0) });
        let renderer = renderer(RenderConfig::default(), source);
        assert!(matches!(
            renderer.generate_map_image(&vienna_request()),
            Err(MapError::InvalidTileRaster { width: 512, height: 512, expected: 256, .. })
        ));
    }

    #[test]
    fn test_oversized_grid_fails_before_fetching() {
        let source = Arc::new(SolidTiles::new(WATER));
        let renderer = renderer(RenderConfig::default(), source.clone());
        let request = MapRequest::new(start(), GeoCoordinate::new(17.3738, 49.2082), 14);

        assert!(matches!(renderer.generate_map_image(&request), Err(MapError::OversizedGrid { .. })));
        assert_eq!(source.fetched.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_out_of_range_waypoint_is_reported() {
        let renderer = renderer(RenderConfig::default(), Arc::new(SolidTiles::new(WATER)));
        let request = MapRequest::new(start(), end(), 14).with_waypoints(vec![start(), GeoCoordinate::new(16.39, 95.0)]);
        assert!(matches!(
            renderer.generate_map_image(&request),
            Err(MapError::ProjectionOutOfRange(_))
        ));
    }

    #[test]
    fn test_custom_icons_are_used() {
        let blue = Rgba([0, 0, 255, 255]);
        let icon = MarkerIcon::new(RgbaImage::from_pixel(3, 3, blue), (1, 1)).unwrap();
        let icons = MarkerIconSet::default().with_icon(MarkerStyle::PinRed16, icon);
        let renderer = renderer(RenderConfig::default(), Arc::new(SolidTiles::new(WATER))).with_icons(icons);

        let request = MapRequest::new(start(), end(), 14).with_marker(Marker::new(start(), MarkerStyle::PinRed16));
        let image = renderer.generate_map_image(&request).unwrap();
        assert_eq!(*image.get_pixel(0, 207), blue);
        assert_eq!(*image.get_pixel(1, 206), blue);
        assert_eq!(*image.get_pixel(5, 200), WATER);
    }
}
