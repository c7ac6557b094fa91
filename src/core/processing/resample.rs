//! Nearest-neighbour resampling of in-memory rasters onto another grid.
use ndarray::Array3;
use tracing::debug;

use crate::core::grid::{GeoGrid, trunc_to_pixel};
use crate::core::raster::{Pixel, Raster};
use crate::error::{Error, Result};

/// Resample `raster` onto `grid`. Each destination pixel takes the source
/// pixel under its centre; pixels with no source coverage get `fill`.
pub fn align_to<T: Pixel>(raster: &Raster<T>, grid: &GeoGrid, fill: T) -> Result<Raster<T>> {
    let src = raster.grid();
    let view = raster.view();
    let bands = raster.bands();
    let mut data = Array3::from_elem((bands, grid.rows, grid.cols), fill);
    for row in 0..grid.rows {
        let y = grid.origin_y + (row as f64 + 0.5) * grid.pixel_height;
        for col in 0..grid.cols {
            let x = grid.origin_x + (col as f64 + 0.5) * grid.pixel_width;
            let (src_col, src_row) = src.geo_to_pixel(x, y);
            if !src.contains_pixel(src_col, src_row) {
                continue;
            }
            let (src_col, src_row) = (src_col as usize, src_row as usize);
            for band in 0..bands {
                data[[band, row, col]] = view[[band, src_row, src_col]];
            }
        }
    }
    debug!(
        "Aligned {}x{} raster onto {}x{} grid",
        src.cols, src.rows, grid.cols, grid.rows
    );
    Ok(Raster::from_array(data, *grid, raster.crs())?.with_nodata(raster.nodata()))
}

/// Resample to a new ground resolution over the same extent. `pixel_width`
/// and `pixel_height` are positive; the axis orientation of the source is kept.
pub fn resample_nearest<T: Pixel>(
    raster: &Raster<T>,
    pixel_width: f64,
    pixel_height: f64,
) -> Result<Raster<T>> {
    if pixel_width <= 0.0 || pixel_height <= 0.0 {
        return Err(Error::geometry(format!(
            "resample resolution must be positive, got {}x{}",
            pixel_width, pixel_height
        )));
    }
    let src = raster.grid();
    let (x_min, x_max, y_min, y_max) = src.extent();
    let cols = trunc_to_pixel((x_max - x_min) / pixel_width) as usize;
    let rows = trunc_to_pixel((y_max - y_min) / pixel_height) as usize;
    if cols == 0 || rows == 0 {
        return Err(Error::geometry(format!(
            "resolution {}x{} is coarser than the raster extent",
            pixel_width, pixel_height
        )));
    }
    let signed_height = pixel_height.copysign(src.pixel_height);
    let grid = GeoGrid::new(src.origin_x, src.origin_y, pixel_width, signed_height, cols, rows)?;
    align_to(raster, &grid, T::default())
}
