//! Last-source-wins mosaicking over the union of several rasters.
use ndarray::Zip;
use tracing::info;

use crate::core::allocate::allocate_for_polygon;
use crate::core::footprint::{Footprint, combine, raster_footprint};
use crate::core::processing::{overlap_error, paired_windows};
use crate::core::raster::{Pixel, Raster, is_nodata};
use crate::error::{Error, Result};
use crate::types::GeometryMode;

/// Union footprint of `footprints`, failing when any input after the first
/// shares no area with the inputs before it.
pub(crate) fn overlapping_union(footprints: &[Footprint]) -> Result<Footprint> {
    let (first, rest) = footprints
        .split_first()
        .ok_or_else(|| Error::alignment("no input rasters"))?;
    let mut running = first.clone();
    for (i, fp) in rest.iter().enumerate() {
        if !running.intersects(fp) {
            return Err(Error::alignment(format!(
                "input {} does not overlap any earlier input",
                i + 1
            )));
        }
        running = combine(&[running, fp.clone()], GeometryMode::Union).map_err(overlap_error)?;
    }
    Ok(running)
}

/// Merge `rasters` in order onto a grid covering their union. A pixel equal
/// to `nodata` never overwrites the destination; `None` falls back to the
/// first raster's declared nodata. Pixels no source covers are left at nodata.
pub fn mosaic<T: Pixel>(rasters: &[&Raster<T>], nodata: Option<f64>) -> Result<Raster<T>> {
    let footprints: Vec<Footprint> = rasters.iter().map(|r| raster_footprint(*r)).collect();
    let polygon = overlapping_union(&footprints)?;
    let first = rasters[0];
    let nodata = nodata.or(first.nodata());
    let (x_res, y_res) = first.grid().resolution();
    let mut out: Raster<T> =
        allocate_for_polygon(&polygon, x_res, y_res, first.bands(), first.crs())?;
    if let Some(nd) = nodata {
        out.view_mut().fill(T::from_f64(nd));
    }
    out.set_nodata(nodata);

    for (&raster, footprint) in rasters.iter().zip(&footprints) {
        if raster.bands() != out.bands() {
            return Err(Error::alignment(format!(
                "band count {} differs from first input's {}",
                raster.bands(),
                out.bands()
            )));
        }
        let (src_window, dst_window) = paired_windows(raster, &out, footprint)?;
        let src = raster.window_view(&src_window);
        let mut dst = out.window_view_mut(&dst_window);
        match nodata {
            Some(nd) => {
                Zip::from(&mut dst).and(&src).for_each(|d, &s| {
                    if !is_nodata(s.to_f64(), nd) {
                        *d = s;
                    }
                });
            }
            None => dst.assign(&src),
        }
    }
    info!(
        "Mosaicked {} rasters into {}x{} ({} bands)",
        rasters.len(),
        out.cols(),
        out.rows(),
        out.bands()
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::grid::GeoGrid;
    use ndarray::Array3;

    fn raster(origin_x: f64, fill: i32) -> Raster<i32> {
        let grid = GeoGrid::new(origin_x, 100.0, 10.0, -10.0, 10, 10).unwrap();
        Raster::filled(2, grid, "", fill)
    }

    #[test]
    fn test_mosaic_of_identical_copies_is_identity() {
        let grid = GeoGrid::new(0.0, 100.0, 10.0, -10.0, 8, 6).unwrap();
        let data = Array3::from_shape_fn((3, 6, 8), |(b, y, x)| (b * 1000 + y * 10 + x) as u16 + 1);
        let r = Raster::from_array(data, grid, "").unwrap();
        let m = mosaic(&[&r, &r], None).unwrap();
        assert_eq!(m.grid(), r.grid());
        assert_eq!(m.view(), r.view());
    }

    #[test]
    fn test_later_source_wins_in_overlap() {
        let a = raster(0.0, 1);
        let b = raster(50.0, 2);
        let m = mosaic(&[&a, &b], Some(0.0)).unwrap();
        assert_eq!(m.cols(), 15);
        assert_eq!(m.band(0)[[3, 2]], 1);
        assert_eq!(m.band(0)[[3, 7]], 2);
        assert_eq!(m.band(1)[[3, 14]], 2);
    }

    #[test]
    fn test_nodata_pixels_do_not_overwrite() {
        let a = raster(0.0, 1);
        let mut b = raster(0.0, 2);
        b.band_mut(0)[[4, 4]] = 0;
        let m = mosaic(&[&a, &b], Some(0.0)).unwrap();
        assert_eq!(m.band(0)[[4, 4]], 1);
        assert_eq!(m.band(0)[[4, 5]], 2);
    }

    #[test]
    fn test_nan_nodata_pixels_do_not_overwrite() {
        let grid = GeoGrid::new(0.0, 20.0, 10.0, -10.0, 2, 2).unwrap();
        let a = Raster::filled(1, grid, "", 1.0f32);
        let mut b = Raster::filled(1, grid, "", 2.0f32);
        b.band_mut(0)[[0, 0]] = f32::NAN;
        let m = mosaic(&[&a, &b], Some(f64::NAN)).unwrap();
        assert_eq!(m.band(0)[[0, 0]], 1.0);
        assert_eq!(m.band(0)[[1, 1]], 2.0);
    }

    #[test]
    fn test_disjoint_inputs_are_alignment_error() {
        let a = raster(0.0, 1);
        let b = raster(1000.0, 2);
        assert!(matches!(mosaic(&[&a, &b], None), Err(Error::Alignment(_))));
        assert!(matches!(mosaic::<i32>(&[], None), Err(Error::Alignment(_))));
    }
}
