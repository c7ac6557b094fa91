//! Allocation of new rasters sized to a polygon, and in-memory clipping.
use tracing::info;

use crate::core::footprint::Footprint;
use crate::core::grid::{GeoGrid, trunc_to_pixel};
use crate::core::raster::{Pixel, Raster};
use crate::core::window::window_for_polygon;
use crate::error::{Error, Result};

/// Allocate a default-filled raster whose origin is the polygon envelope's
/// top-left corner. `pixel_height` is the positive ground resolution; it is
/// stored negated in the new grid. Sizes truncate toward zero.
pub fn allocate_for_polygon<T: Pixel>(
    polygon: &Footprint,
    pixel_width: f64,
    pixel_height: f64,
    bands: usize,
    crs: &str,
) -> Result<Raster<T>> {
    if pixel_width <= 0.0 || pixel_height <= 0.0 {
        return Err(Error::geometry(format!(
            "resolution must be positive, got {}x{}",
            pixel_width, pixel_height
        )));
    }
    if polygon.is_empty() {
        return Err(Error::geometry("cannot allocate a raster for an empty polygon"));
    }
    let (x_min, x_max, y_min, y_max) = polygon
        .envelope()
        .ok_or_else(|| Error::geometry("polygon has no envelope"))?;
    let cols = trunc_to_pixel((x_max - x_min) / pixel_width) as usize;
    let rows = trunc_to_pixel((y_max - y_min) / pixel_height) as usize;
    if cols == 0 || rows == 0 {
        return Err(Error::geometry(format!(
            "polygon envelope {}x{} is smaller than one {}x{} pixel",
            x_max - x_min,
            y_max - y_min,
            pixel_width,
            pixel_height
        )));
    }
    let grid = GeoGrid::new(x_min, y_max, pixel_width, -pixel_height, cols, rows)?;
    info!(
        "Allocated {}x{}x{} {} raster at ({}, {})",
        bands,
        rows,
        cols,
        T::PIXEL_TYPE,
        x_min,
        y_max
    );
    Ok(Raster::new(bands, grid, crs))
}

/// Copy the part of `raster` covered by `polygon` into a new raster
pub fn clip_to_polygon<T: Pixel>(raster: &Raster<T>, polygon: &Footprint) -> Result<Raster<T>> {
    let window = window_for_polygon(raster, polygon)?;
    if window.is_empty() {
        return Err(Error::geometry("clip polygon covers less than one pixel"));
    }
    let src = raster.grid();
    let (origin_x, origin_y) = src.pixel_to_geo(window.x_min as isize, window.y_min as isize);
    let grid = GeoGrid::new(
        origin_x,
        origin_y,
        src.pixel_width,
        src.pixel_height,
        window.width(),
        window.height(),
    )?;
    let data = raster.window_view(&window).to_owned();
    Ok(Raster::from_array(data, grid, raster.crs())?.with_nodata(raster.nodata()))
}
