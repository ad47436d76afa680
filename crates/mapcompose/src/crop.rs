use image::{imageops, RgbaImage};
use log::debug;

use crate::bounds::BoundingBox;
use crate::canvas::Canvas;
use crate::grid::TileGrid;
use crate::projection::Projector;
use crate::{MapError, StatusOr};

/// Pixel rectangle of the canvas that the bounding box covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Compute the crop rectangle for `bbox` on the canvas of `grid`.
///
/// The bbox corners are projected to canvas space. A span of zero or less on
/// either axis is invalid geometry. Otherwise the rectangle covers every
/// canvas pixel the bbox touches, `[floor(top_left), ceil(bottom_right))`.
pub fn crop_rect(grid: &TileGrid, bbox: &BoundingBox, projector: &Projector) -> StatusOr<CropRect> {
    let origin = grid.pixel_origin(projector.tile_size());
    let top_left = projector.pixel_of(bbox.north_west())?.relative_to(origin);
    let bottom_right = projector.pixel_of(bbox.south_east())?.relative_to(origin);

    let span_x = bottom_right.x - top_left.x;
    let span_y = bottom_right.y - top_left.y;
    if !(span_x > 0.0 && span_y > 0.0) {
        return Err(MapError::InvalidGeometry(format!(
            "crop area of {:.3}x{:.3} px at zoom {} is empty",
            span_x,
            span_y,
            projector.zoom()
        )));
    }

    let left = top_left.x.floor();
    let top = top_left.y.floor();
    let right = bottom_right.x.ceil();
    let bottom = bottom_right.y.ceil();

    let (canvas_width, canvas_height) = grid.canvas_size(projector.tile_size());
    if left < 0.0 || top < 0.0 || right > canvas_width as f64 || bottom > canvas_height as f64 {
        return Err(MapError::InvalidGeometry(format!(
            "crop area ({}, {}) .. ({}, {}) exceeds the {}x{} canvas",
            left, top, right, bottom, canvas_width, canvas_height
        )));
    }

    let rect = CropRect {
        x: left as u32,
        y: top as u32,
        width: (right - left) as u32,
        height: (bottom - top) as u32,
    };
    debug!("Crop rectangle {:?} for spans {:.2}x{:.2}", rect, span_x, span_y);
    Ok(rect)
}

/// Copy the bbox area out of the canvas. The canvas itself is left untouched.
pub fn crop(canvas: &Canvas, bbox: &BoundingBox) -> StatusOr<RgbaImage> {
    let rect = crop_rect(canvas.grid(), bbox, canvas.projector())?;
    Ok(imageops::crop_imm(canvas.image(), rect.x, rect.y, rect.width, rect.height).to_image())
}
