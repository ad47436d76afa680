use image::{imageops, Pixel, Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut};
use log::debug;

use crate::grid::TileGrid;
use crate::marker::MarkerIcon;
use crate::projection::{GeoCoordinate, PixelPoint, Projector, TileIndex};
use crate::{MapError, StatusOr};

/// Stroke used for the route polyline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteStyle {
    pub color: Rgba<u8>,
    pub width: f32,
}

impl Default for RouteStyle {
    fn default() -> Self {
        Self {
            color: Rgba([255, 0, 0, 255]),
            width: 10.0,
        }
    }
}

/// The stitched raster of one map request.
///
/// Pixel (0, 0) is the top-left corner of the grid's top-left tile. Overlays
/// can only be drawn once every tile of the grid has been placed.
pub struct Canvas {
    grid: TileGrid,
    projector: Projector,
    origin: PixelPoint,
    image: RgbaImage,
    placed: Vec<bool>,
    placed_count: usize,
}

impl Canvas {
    /// A fully transparent canvas covering `grid`.
    pub fn new(grid: TileGrid, projector: Projector) -> Self {
        let (width, height) = grid.canvas_size(projector.tile_size());
        Self {
            grid,
            projector,
            origin: grid.pixel_origin(projector.tile_size()),
            image: RgbaImage::new(width, height),
            placed: vec![false; grid.tile_count()],
            placed_count: 0,
        }
    }

    pub fn grid(&self) -> &TileGrid {
        &self.grid
    }

    pub fn projector(&self) -> &Projector {
        &self.projector
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    /// World pixel position of canvas pixel (0, 0).
    pub fn pixel_origin(&self) -> PixelPoint {
        self.origin
    }

    /// Project a coordinate into canvas pixel space.
    pub fn to_canvas_space(&self, coord: GeoCoordinate) -> StatusOr<PixelPoint> {
        Ok(self.projector.pixel_of(coord)?.relative_to(self.origin))
    }

    /// Whether a canvas-space point falls on a canvas pixel.
    pub fn contains(&self, point: PixelPoint) -> bool {
        point.x >= 0.0
            && point.x < self.width() as f64
            && point.y >= 0.0
            && point.y < self.height() as f64
    }

    /// Copy a tile raster into its slot. Placing the same tile again overwrites it.
    pub fn place_tile(&mut self, index: TileIndex, raster: &RgbaImage) -> StatusOr<()> {
        let tile_size = self.projector.tile_size();
        if raster.dimensions() != (tile_size, tile_size) {
            return Err(MapError::InvalidTileRaster {
                index,
                zoom: self.projector.zoom(),
                width: raster.width(),
                height: raster.height(),
                expected: tile_size,
            });
        }
        let (col, row) = self.grid.offset_of(index).ok_or_else(|| {
            MapError::InvalidGeometry(format!(
                "tile {} is outside the grid {} .. {}",
                index, self.grid.top_left, self.grid.bottom_right
            ))
        })?;

        imageops::replace(
            &mut self.image,
            raster,
            (col * tile_size) as i64,
            (row * tile_size) as i64,
        );

        let slot = (row * self.grid.tiles_x + col) as usize;
        if !self.placed[slot] {
            self.placed[slot] = true;
            self.placed_count += 1;
        }
        Ok(())
    }

    pub fn missing_tiles(&self) -> usize {
        self.placed.len() - self.placed_count
    }

    pub fn is_complete(&self) -> bool {
        self.missing_tiles() == 0
    }

    fn ensure_complete(&self) -> StatusOr<()> {
        if self.is_complete() {
            Ok(())
        } else {
            Err(MapError::IncompleteCanvas {
                missing: self.missing_tiles(),
                total: self.placed.len(),
            })
        }
    }

    /// Draw the route as straight segments between consecutive waypoints.
    ///
    /// Segments with an endpoint outside the canvas are skipped. Returns the
    /// number of segments drawn.
    pub fn draw_route(&mut self, waypoints: &[GeoCoordinate], style: &RouteStyle) -> StatusOr<usize> {
        self.ensure_complete()?;

        let points = waypoints
            .iter()
            .map(|&coord| self.to_canvas_space(coord))
            .collect::<StatusOr<Vec<_>>>()?;

        let mut drawn = 0;
        for pair in points.windows(2) {
            let (start, end) = (pair[0], pair[1]);
            if !self.contains(start) || !self.contains(end) {
                debug!(
                    "Skipping route segment ({:.1}, {:.1}) -> ({:.1}, {:.1}) outside the canvas",
                    start.x, start.y, end.x, end.y
                );
                continue;
            }
            draw_thick_line_segment_mut(
                &mut self.image,
                (start.x as f32, start.y as f32),
                (end.x as f32, end.y as f32),
                style.color,
                style.width,
            );
            drawn += 1;
        }
        Ok(drawn)
    }

    /// Draw `icon` with its anchor on `coord`. Returns false if the anchor is off the canvas.
    pub fn draw_marker(&mut self, coord: GeoCoordinate, icon: &MarkerIcon) -> StatusOr<bool> {
        self.ensure_complete()?;
        let point = self.to_canvas_space(coord)?;
        Ok(self.draw_icon_at(point, icon))
    }

    /// Draw `icon` with its anchor on a canvas-space point.
    pub fn draw_icon_at(&mut self, point: PixelPoint, icon: &MarkerIcon) -> bool {
        if !self.contains(point) {
            debug!("Skipping marker at ({:.1}, {:.1}) outside the canvas", point.x, point.y);
            return false;
        }
        let (anchor_x, anchor_y) = icon.anchor();
        let left = point.x.floor() as i64 - anchor_x as i64;
        let top = point.y.floor() as i64 - anchor_y as i64;
        blit_icon(&mut self.image, icon.image(), left, top);
        true
    }
}

/// Paint `icon` at (`left`, `top`), clipped to the canvas. Opaque pixels are
/// copied, translucent ones blended over what is already there.
fn blit_icon(image: &mut RgbaImage, icon: &RgbaImage, left: i64, top: i64) {
    let (width, height) = (image.width() as i64, image.height() as i64);
    for (ix, iy, pixel) in icon.enumerate_pixels() {
        let x = left + ix as i64;
        let y = top + iy as i64;
        if x < 0 || y < 0 || x >= width || y >= height {
            continue;
        }
        match pixel[3] {
            0 => {}
            255 => image.put_pixel(x as u32, y as u32, *pixel),
            _ => image.get_pixel_mut(x as u32, y as u32).blend(pixel),
        }
    }
}

/// Helper function to draw a thick line by drawing circles along the path
fn draw_thick_line_segment_mut(
    image: &mut RgbaImage,
    start: (f32, f32),
    end: (f32, f32),
    color: Rgba<u8>,
    width: f32,
) {
    if width <= 1.0 {
        draw_line_segment_mut(image, start, end, color);
        return;
    }

    let radius = (width / 2.0).max(1.0) as i32;
    let dx = end.0 - start.0;
    let dy = end.1 - start.1;
    let length = (dx * dx + dy * dy).sqrt();

    if length < 0.001 {
        draw_filled_circle_mut(image, (start.0 as i32, start.1 as i32), radius, color);
        return;
    }

    // Step below the radius so consecutive circles overlap.
    let step_size = (radius as f32 * 0.5).max(0.5);
    let num_steps = (length / step_size).ceil() as i32;
    let step_x = dx * step_size / length;
    let step_y = dy * step_size / length;

    for i in 0..=num_steps {
        let t = i as f32;
        let x = start.0 + t * step_x;
        let y = start.1 + t * step_y;
        draw_filled_circle_mut(image, (x as i32, y as i32), radius, color);
    }
    draw_filled_circle_mut(image, (start.0 as i32, start.1 as i32), radius, color);
    draw_filled_circle_mut(image, (end.0 as i32, end.1 as i32), radius, color);
}
