//! Affine placement of a raster on the ground.
//!
//! Only north-up, non-rotated grids are supported. `pixel_height` keeps the
//! GDAL sign convention (negative for north-up), so every extent computation
//! negates it.
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Fractional pixel offsets closer than this to a whole pixel are treated as
/// lying exactly on the pixel edge before flooring.
const EDGE_TOLERANCE: f64 = 1e-6;

/// Floor toward negative infinity, snapping values that sit on a pixel edge
/// up to floating-point noise.
pub(crate) fn floor_to_pixel(v: f64) -> f64 {
    let nearest = v.round();
    if (v - nearest).abs() < EDGE_TOLERANCE {
        nearest
    } else {
        v.floor()
    }
}

/// Truncate toward zero with the same edge snapping as [`floor_to_pixel`].
pub(crate) fn trunc_to_pixel(v: f64) -> f64 {
    let nearest = v.round();
    if (v - nearest).abs() < EDGE_TOLERANCE {
        nearest
    } else {
        v.trunc()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoGrid {
    /// X coordinate of the top-left corner
    pub origin_x: f64,
    /// Y coordinate of the top-left corner
    pub origin_y: f64,
    /// Pixel width, always positive
    pub pixel_width: f64,
    /// Pixel height, negative for north-up rasters
    pub pixel_height: f64,
    pub cols: usize,
    pub rows: usize,
}

impl GeoGrid {
    pub fn new(
        origin_x: f64,
        origin_y: f64,
        pixel_width: f64,
        pixel_height: f64,
        cols: usize,
        rows: usize,
    ) -> Result<Self> {
        if pixel_width <= 0.0 || !pixel_width.is_finite() {
            return Err(Error::geometry(format!(
                "pixel width must be positive, got {}",
                pixel_width
            )));
        }
        if pixel_height == 0.0 || !pixel_height.is_finite() {
            return Err(Error::geometry(format!(
                "pixel height must be non-zero, got {}",
                pixel_height
            )));
        }
        Ok(Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
            cols,
            rows,
        })
    }

    /// Build from GDAL geotransform coefficients
    /// `[origin_x, pixel_width, rot_x, origin_y, rot_y, pixel_height]`.
    pub fn from_gdal(gt: [f64; 6], cols: usize, rows: usize) -> Result<Self> {
        if gt[2] != 0.0 || gt[4] != 0.0 {
            return Err(Error::geometry(format!(
                "rotated geotransforms are not supported: {:?}",
                gt
            )));
        }
        Self::new(gt[0], gt[3], gt[1], gt[5], cols, rows)
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.origin_x,
            self.pixel_width,
            0.0,
            self.origin_y,
            0.0,
            self.pixel_height,
        ]
    }

    /// Geographic coordinate of the top-left corner of pixel (col, row)
    pub fn pixel_to_geo(&self, col: isize, row: isize) -> (f64, f64) {
        let x = self.origin_x + col as f64 * self.pixel_width;
        let y = self.origin_y + row as f64 * self.pixel_height;
        (x, y)
    }

    /// Pixel containing the geographic point. A point on a pixel edge belongs
    /// to the pixel below-right of it.
    pub fn geo_to_pixel(&self, x: f64, y: f64) -> (isize, isize) {
        let col = floor_to_pixel((x - self.origin_x) / self.pixel_width);
        let row = floor_to_pixel((y - self.origin_y) / self.pixel_height);
        (col as isize, row as isize)
    }

    /// Ground extent as `(x_min, x_max, y_min, y_max)`
    pub fn extent(&self) -> (f64, f64, f64, f64) {
        let width = self.pixel_width * self.cols as f64;
        // pixel_height is negative for north-up, so the raster extends downwards
        let height = self.pixel_height * self.rows as f64 * -1.0;
        let (y_a, y_b) = (self.origin_y, self.origin_y - height);
        (
            self.origin_x,
            self.origin_x + width,
            y_a.min(y_b),
            y_a.max(y_b),
        )
    }

    /// Absolute ground resolution `(x_res, y_res)`
    pub fn resolution(&self) -> (f64, f64) {
        (self.pixel_width, self.pixel_height.abs())
    }

    pub fn same_resolution(&self, other: &GeoGrid) -> bool {
        let (ax, ay) = self.resolution();
        let (bx, by) = other.resolution();
        let tol = EDGE_TOLERANCE * ax.max(bx);
        (ax - bx).abs() <= tol && (ay - by).abs() <= tol
    }

    pub fn contains_pixel(&self, col: isize, row: isize) -> bool {
        col >= 0 && row >= 0 && (col as usize) < self.cols && (row as usize) < self.rows
    }

    pub fn pixel_count(&self) -> usize {
        self.cols * self.rows
    }
}

/// A geographic point. Every accepted representation is resolved into
/// coordinates when the point is built.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub x: f64,
    pub y: f64,
}

impl GeoPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl From<(f64, f64)> for GeoPoint {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

impl From<geo::Coord<f64>> for GeoPoint {
    fn from(c: geo::Coord<f64>) -> Self {
        Self { x: c.x, y: c.y }
    }
}

impl From<geo::Point<f64>> for GeoPoint {
    fn from(p: geo::Point<f64>) -> Self {
        Self { x: p.x(), y: p.y() }
    }
}

impl FromStr for GeoPoint {
    type Err = Error;

    /// Parse a well-known-text point, e.g. `POINT (500010 4500020)`.
    /// A third (Z) ordinate is accepted and ignored.
    fn from_str(s: &str) -> Result<Self> {
        let malformed = || Error::geometry(format!("malformed WKT point: {}", s));
        let trimmed = s.trim();
        let head = trimmed.get(..5).ok_or_else(malformed)?;
        if !head.eq_ignore_ascii_case("POINT") {
            return Err(malformed());
        }
        let body = trimmed[5..].trim_start();
        let body = body
            .strip_prefix('Z')
            .or_else(|| body.strip_prefix('z'))
            .unwrap_or(body)
            .trim();
        let inner = body
            .strip_prefix('(')
            .and_then(|b| b.strip_suffix(')'))
            .ok_or_else(malformed)?;
        let mut ords = inner.split_whitespace().map(str::parse::<f64>);
        let x = ords.next().ok_or_else(malformed)?.map_err(|_| malformed())?;
        let y = ords.next().ok_or_else(malformed)?.map_err(|_| malformed())?;
        Ok(Self { x, y })
    }
}
