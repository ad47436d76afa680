use std::collections::HashMap;

use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut, draw_polygon_mut};
use imageproc::point::Point;

use crate::projection::GeoCoordinate;
use crate::{MapError, StatusOr};

const MARKER_RED: Rgba<u8> = Rgba([214, 39, 40, 255]);
const MARKER_WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Icon styles a marker can be drawn with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerStyle {
    PinRed16,
    PinRed32,
    MarkerRed16,
    MarkerRed32,
}

impl MarkerStyle {
    pub fn all() -> [MarkerStyle; 4] {
        [
            MarkerStyle::PinRed16,
            MarkerStyle::PinRed32,
            MarkerStyle::MarkerRed16,
            MarkerStyle::MarkerRed32,
        ]
    }

    /// Edge length of the square icon in pixels.
    pub fn size(&self) -> u32 {
        match self {
            MarkerStyle::PinRed16 | MarkerStyle::MarkerRed16 => 16,
            MarkerStyle::PinRed32 | MarkerStyle::MarkerRed32 => 32,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            MarkerStyle::PinRed16 => "pin-red_16px",
            MarkerStyle::PinRed32 => "pin-red_32px",
            MarkerStyle::MarkerRed16 => "marker-red_16px",
            MarkerStyle::MarkerRed32 => "marker-red_32px",
        }
    }
}

/// A marker to draw at a geographic position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Marker {
    pub position: GeoCoordinate,
    pub style: MarkerStyle,
}

impl Marker {
    pub fn new(position: GeoCoordinate, style: MarkerStyle) -> Self {
        Self { position, style }
    }
}

/// Icon raster plus the pixel that sits exactly on the marked position.
#[derive(Debug, Clone)]
pub struct MarkerIcon {
    image: RgbaImage,
    anchor: (u32, u32),
}

impl MarkerIcon {
    pub fn new(image: RgbaImage, anchor: (u32, u32)) -> StatusOr<Self> {
        if anchor.0 >= image.width() || anchor.1 >= image.height() {
            return Err(MapError::InvalidGeometry(format!(
                "icon anchor ({}, {}) lies outside the {}x{} icon",
                anchor.0,
                anchor.1,
                image.width(),
                image.height()
            )));
        }
        Ok(Self { image, anchor })
    }

    /// Procedurally drawn icon for a built-in style, anchored at the bottom tip.
    pub fn render(style: MarkerStyle) -> Self {
        let size = style.size();
        let mut image = RgbaImage::new(size, size);
        let center_x = (size / 2) as i32;
        let tip = (center_x as u32, size - 1);

        match style {
            MarkerStyle::PinRed16 | MarkerStyle::PinRed32 => {
                let radius = (size / 4) as i32;
                let head = (center_x, radius + 1);
                draw_line_segment_mut(
                    &mut image,
                    (head.0 as f32, head.1 as f32),
                    (tip.0 as f32, tip.1 as f32),
                    MARKER_RED,
                );
                draw_filled_circle_mut(&mut image, head, radius, MARKER_RED);
                draw_filled_circle_mut(&mut image, (head.0 - radius / 3, head.1 - radius / 3), (radius / 3).max(1), MARKER_WHITE);
            }
            MarkerStyle::MarkerRed16 | MarkerStyle::MarkerRed32 => {
                let radius = (size * 3 / 8) as i32 - 1;
                let head = (center_x, radius + 1);
                let shoulder = (radius as f32 * 0.7) as i32;
                draw_polygon_mut(
                    &mut image,
                    &[
                        Point::new(head.0 - shoulder, head.1 + shoulder),
                        Point::new(head.0 + shoulder, head.1 + shoulder),
                        Point::new(tip.0 as i32, tip.1 as i32),
                    ],
                    MARKER_RED,
                );
                draw_filled_circle_mut(&mut image, head, radius, MARKER_RED);
                draw_filled_circle_mut(&mut image, head, (radius / 3).max(1), MARKER_WHITE);
            }
        }

        image.put_pixel(tip.0, tip.1, MARKER_RED);
        Self { image, anchor: tip }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn anchor(&self) -> (u32, u32) {
        self.anchor
    }

    /// Color of the anchor pixel.
    pub fn anchor_color(&self) -> Rgba<u8> {
        *self.image.get_pixel(self.anchor.0, self.anchor.1)
    }
}

/// Icons keyed by style. Starts with the built-in icons; callers may swap in their own.
#[derive(Debug, Clone)]
pub struct MarkerIconSet {
    icons: HashMap<MarkerStyle, MarkerIcon>,
}

impl Default for MarkerIconSet {
    fn default() -> Self {
        let icons = MarkerStyle::all()
            .into_iter()
            .map(|style| (style, MarkerIcon::render(style)))
            .collect();
        Self { icons }
    }
}

impl MarkerIconSet {
    pub fn with_icon(mut self, style: MarkerStyle, icon: MarkerIcon) -> Self {
        self.icons.insert(style, icon);
        self
    }

    pub fn get(&self, style: MarkerStyle) -> &MarkerIcon {
        // Every style is inserted by Default and never removed.
        &self.icons[&style]
    }
}
