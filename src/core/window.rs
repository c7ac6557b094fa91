//! Pixel windows: the rectangle of one raster that a geographic polygon covers.
//!
//! [`window_for_polygon`] is the single alignment primitive; every pixel copy
//! between differently placed rasters goes through it.
use tracing::debug;

use crate::core::footprint::{Footprint, grid_footprint};
use crate::core::grid::{GeoGrid, GeoPoint};
use crate::core::raster::{Pixel, Raster};
use crate::error::{Error, Result};

/// Half-open pixel ranges `x_min..x_max` (columns) and `y_min..y_max` (rows)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub x_min: usize,
    pub x_max: usize,
    pub y_min: usize,
    pub y_max: usize,
}

impl Window {
    pub fn new(x_min: usize, x_max: usize, y_min: usize, y_max: usize) -> Self {
        Self {
            x_min,
            x_max,
            y_min,
            y_max,
        }
    }

    /// Window covering a whole grid
    pub fn full(grid: &GeoGrid) -> Self {
        Self::new(0, grid.cols, 0, grid.rows)
    }

    pub fn width(&self) -> usize {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> usize {
        self.y_max - self.y_min
    }

    /// `(rows, cols)`, matching ndarray's axis order
    pub fn shape(&self) -> (usize, usize) {
        (self.height(), self.width())
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }
}

fn clamp_index(v: isize, upper: usize) -> usize {
    v.clamp(0, upper as isize) as usize
}

/// Window of `grid` covering its overlap with `polygon`
pub fn grid_window(grid: &GeoGrid, polygon: &Footprint) -> Result<Window> {
    let overlap = grid_footprint(grid).intersection(polygon);
    if overlap.is_empty() {
        return Err(Error::geometry(format!(
            "polygon {:?} does not overlap raster extent {:?}",
            polygon.envelope(),
            grid.extent()
        )));
    }
    let (x_min_geo, x_max_geo, y_min_geo, y_max_geo) = overlap
        .envelope()
        .ok_or_else(|| Error::geometry("overlap has no envelope"))?;
    let (mut x_min, mut y_min) = grid.geo_to_pixel(x_min_geo, y_min_geo);
    let (mut x_max, mut y_max) = grid.geo_to_pixel(x_max_geo, y_max_geo);
    // A negative pixel height maps the geographic y_min to the larger row index
    if x_min > x_max {
        std::mem::swap(&mut x_min, &mut x_max);
    }
    if y_min > y_max {
        std::mem::swap(&mut y_min, &mut y_max);
    }
    let window = Window::new(
        clamp_index(x_min, grid.cols),
        clamp_index(x_max, grid.cols),
        clamp_index(y_min, grid.rows),
        clamp_index(y_max, grid.rows),
    );
    debug!("Window {:?} for envelope {:?}", window, overlap.envelope());
    Ok(window)
}

pub fn window_for_polygon<T: Pixel>(raster: &Raster<T>, polygon: &Footprint) -> Result<Window> {
    grid_window(raster.grid(), polygon)
}

/// Pixel containing `point`; with `oob_fail` a point outside the raster is an error
pub fn point_to_pixel<T: Pixel>(
    raster: &Raster<T>,
    point: impl Into<GeoPoint>,
    oob_fail: bool,
) -> Result<(isize, isize)> {
    let point = point.into();
    let (col, row) = raster.grid().geo_to_pixel(point.x, point.y);
    if oob_fail && !raster.grid().contains_pixel(col, row) {
        return Err(Error::geometry(format!(
            "point ({}, {}) falls outside the raster at pixel ({}, {})",
            point.x, point.y, col, row
        )));
    }
    Ok((col, row))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raster(origin_x: f64, origin_y: f64, cols: usize, rows: usize) -> Raster<u8> {
        let grid = GeoGrid::new(origin_x, origin_y, 10.0, -10.0, cols, rows).unwrap();
        Raster::new(1, grid, "")
    }

    #[test]
    fn test_window_of_own_footprint_is_full_raster() {
        let r = raster(0.0, 100.0, 10, 10);
        let w = window_for_polygon(&r, &crate::core::footprint::raster_footprint(&r)).unwrap();
        assert_eq!(w, Window::new(0, 10, 0, 10));
    }

    #[test]
    fn test_window_inverts_north_up_axis() {
        let r = raster(0.0, 100.0, 10, 10);
        // rows 2..5, cols 3..7
        let poly = Footprint::rectangle(30.0, 70.0, 50.0, 80.0);
        let w = window_for_polygon(&r, &poly).unwrap();
        assert_eq!(w, Window::new(3, 7, 2, 5));
        assert_eq!(w.shape(), (3, 4));
    }

    #[test]
    fn test_window_is_clamped_to_raster() {
        let r = raster(0.0, 100.0, 10, 10);
        let poly = Footprint::rectangle(-500.0, 55.0, 45.0, 500.0);
        let w = window_for_polygon(&r, &poly).unwrap();
        assert_eq!(w, Window::new(0, 5, 0, 5));
    }

    #[test]
    fn test_window_monotone_for_contained_polygons() {
        let r = raster(1000.0, 2000.0, 25, 17);
        for i in 0..12 {
            let x0 = 1000.0 + i as f64 * 13.0;
            let y1 = 2000.0 - i as f64 * 7.0;
            let poly = Footprint::rectangle(x0, x0 + 61.0, y1 - 43.0, y1);
            let w = window_for_polygon(&r, &poly).unwrap();
            assert!(w.x_min <= w.x_max && w.x_max <= r.cols());
            assert!(w.y_min <= w.y_max && w.y_max <= r.rows());
        }
    }

    #[test]
    fn test_disjoint_polygon_is_geometry_error() {
        let r = raster(0.0, 100.0, 10, 10);
        let poly = Footprint::rectangle(200.0, 300.0, 0.0, 100.0);
        assert!(matches!(window_for_polygon(&r, &poly), Err(Error::Geometry(_))));
    }

    #[test]
    fn test_point_to_pixel_bounds() {
        let r = raster(0.0, 100.0, 10, 10);
        assert_eq!(point_to_pixel(&r, (15.0, 85.0), true).unwrap(), (1, 1));
        let point = "POINT (15 85)".parse::<GeoPoint>().unwrap();
        assert_eq!(point_to_pixel(&r, point, true).unwrap(), (1, 1));
        assert_eq!(point_to_pixel(&r, (-5.0, 85.0), false).unwrap(), (-1, 1));
        assert!(point_to_pixel(&r, (-5.0, 85.0), true).is_err());
        assert!(point_to_pixel(&r, (100.0, 50.0), true).is_err());
    }
}
