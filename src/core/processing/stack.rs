//! Band stacking over the intersection of several rasters.
use ndarray::Axis;
use tracing::info;

use crate::core::allocate::{allocate_for_polygon, clip_to_polygon};
use crate::core::footprint::{Footprint, combined_footprint};
use crate::core::processing::{overlap_error, paired_windows};
use crate::core::raster::{Pixel, Raster};
use crate::error::{Error, Result};
use crate::types::GeometryMode;

/// Fail unless every tile identifier is the same
pub fn check_tile_identity<S: AsRef<str>>(tiles: &[S]) -> Result<()> {
    let Some((first, rest)) = tiles.split_first() else {
        return Ok(());
    };
    let first: &str = first.as_ref();
    for tile in rest {
        let tile: &str = tile.as_ref();
        if tile != first {
            return Err(Error::alignment(format!("tile mismatch: {} vs {}", first, tile)));
        }
    }
    Ok(())
}

/// Concatenate the bands of `rasters`, in input order, on a grid covering
/// their common intersection at the first raster's resolution.
pub fn stack<T: Pixel>(rasters: &[&Raster<T>]) -> Result<Raster<T>> {
    if rasters.len() < 2 {
        return Err(Error::alignment(format!(
            "stacking needs at least two rasters, got {}",
            rasters.len()
        )));
    }
    let polygon = combined_footprint(rasters, GeometryMode::Intersect).map_err(overlap_error)?;
    let first = rasters[0];
    let (x_res, y_res) = first.grid().resolution();
    let total_bands: usize = rasters.iter().map(|r| r.bands()).sum();
    let mut out: Raster<T> =
        allocate_for_polygon(&polygon, x_res, y_res, total_bands, first.crs())?;
    out.set_nodata(first.nodata());

    let mut band_offset = 0;
    for &raster in rasters {
        let (src_window, dst_window) = paired_windows(raster, &out, &polygon)?;
        let src = raster.window_view(&src_window);
        let mut dst = out.window_view_mut(&dst_window);
        for band in 0..raster.bands() {
            dst.index_axis_mut(Axis(0), band_offset + band)
                .assign(&src.index_axis(Axis(0), band));
        }
        band_offset += raster.bands();
    }
    info!(
        "Stacked {} rasters into {} bands, {}x{}",
        rasters.len(),
        total_bands,
        out.cols(),
        out.rows()
    );
    Ok(out)
}

/// Clip both rasters to `aoi`, then stack `old` before `new`
pub fn stack_and_trim<T: Pixel>(
    old: &Raster<T>,
    new: &Raster<T>,
    aoi: &Footprint,
) -> Result<Raster<T>> {
    let old_clipped = clip_to_polygon(old, aoi)?;
    let new_clipped = clip_to_polygon(new, aoi)?;
    stack(&[&old_clipped, &new_clipped])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::footprint::{raster_footprint, raster_intersection};
    use crate::core::grid::GeoGrid;

    fn raster(origin_x: f64, bands: usize, value: i32) -> Raster<i32> {
        let grid = GeoGrid::new(origin_x, 100.0, 10.0, -10.0, 10, 10).unwrap();
        Raster::filled(bands, grid, "EPSG:32630", value)
    }

    #[test]
    fn test_stack_band_count_and_footprint() {
        let a = raster(0.0, 2, 1);
        let b = raster(40.0, 3, 2);
        let s = stack(&[&a, &b]).unwrap();
        assert_eq!(s.bands(), 5);
        assert_eq!(
            raster_footprint(&s).envelope(),
            raster_intersection(&a, &b).unwrap().envelope()
        );
    }

    #[test]
    fn test_stack_keeps_bands_disjoint() {
        let a = raster(0.0, 2, 1);
        let b = raster(40.0, 2, 2);
        let s = stack(&[&a, &b]).unwrap();
        for band in 0..2 {
            assert!(s.band(band).iter().all(|&v| v == 1));
        }
        for band in 2..4 {
            assert!(s.band(band).iter().all(|&v| v == 2));
        }
    }

    #[test]
    fn test_stack_requires_two_inputs() {
        let a = raster(0.0, 1, 1);
        assert!(matches!(stack(&[&a]), Err(Error::Alignment(_))));
    }

    #[test]
    fn test_stack_without_overlap_is_alignment_error() {
        let a = raster(0.0, 1, 1);
        let b = raster(500.0, 1, 1);
        assert!(matches!(stack(&[&a, &b]), Err(Error::Alignment(_))));
    }

    #[test]
    fn test_tile_identity_mismatch() {
        assert!(check_tile_identity(&["T30UXB", "T30UXB"]).is_ok());
        assert!(matches!(
            check_tile_identity(&["T30UXB", "T31UCT"]),
            Err(Error::Alignment(_))
        ));
    }

    #[test]
    fn test_stack_and_trim_clips_to_aoi() {
        let a = raster(0.0, 1, 1);
        let b = raster(0.0, 1, 2);
        let aoi = Footprint::rectangle(20.0, 60.0, 30.0, 80.0);
        let s = stack_and_trim(&a, &b, &aoi).unwrap();
        assert_eq!((s.bands(), s.rows(), s.cols()), (2, 5, 4));
        assert_eq!(s.grid().origin_x, 20.0);
        assert_eq!(s.grid().origin_y, 80.0);
    }
}
