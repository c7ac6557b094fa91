//! Cloud-free compositing: the most recent clear observation of each pixel.
use ndarray::{Axis, Zip};
use tracing::{debug, info};

use crate::core::allocate::allocate_for_polygon;
use crate::core::footprint::{Footprint, raster_footprint};
use crate::core::processing::mosaic::overlapping_union;
use crate::core::processing::paired_windows;
use crate::core::processing::resample::align_to;
use crate::core::raster::{Mask, Pixel, Raster};
use crate::error::{Error, Result};

/// Composite `sources`, ordered oldest first. Each image pixel is copied only
/// where its companion mask is 1, so later clear pixels replace earlier ones.
///
/// Masks on a different grid than their image are first aligned to it by
/// nearest-neighbour resampling; image pixels outside the mask count as
/// masked. Pixels no source observes hold the first image's nodata value.
/// Returns the composite and the union of all masks on its grid.
pub fn masked_composite<T: Pixel>(sources: &[(&Raster<T>, &Mask)]) -> Result<(Raster<T>, Mask)> {
    let footprints: Vec<Footprint> = sources
        .iter()
        .map(|(image, _)| raster_footprint(*image))
        .collect();
    let polygon = overlapping_union(&footprints)?;
    let first = sources[0].0;
    let (x_res, y_res) = first.grid().resolution();
    let mut out: Raster<T> =
        allocate_for_polygon(&polygon, x_res, y_res, first.bands(), first.crs())?;
    if let Some(nd) = first.nodata() {
        out.view_mut().fill(T::from_f64(nd));
    }
    out.set_nodata(first.nodata());
    let mut out_mask: Mask = Raster::new(1, *out.grid(), first.crs());

    for (i, ((image, mask), footprint)) in sources.iter().zip(&footprints).enumerate() {
        if image.bands() != out.bands() {
            return Err(Error::alignment(format!(
                "image {} has {} bands, composite has {}",
                i,
                image.bands(),
                out.bands()
            )));
        }
        let aligned;
        let mask: &Mask = if mask.grid() == image.grid() {
            mask
        } else {
            debug!("Aligning mask {} onto its image grid", i);
            aligned = align_to(*mask, image.grid(), 0)?;
            &aligned
        };
        let (src_window, dst_window) = paired_windows(*image, &out, footprint)?;
        let src = image.window_view(&src_window);
        let valid = mask.window_view(&src_window);
        let valid = valid.index_axis(Axis(0), 0);
        let mut dst = out.window_view_mut(&dst_window);
        for (mut dst_band, src_band) in dst.axis_iter_mut(Axis(0)).zip(src.axis_iter(Axis(0))) {
            Zip::from(&mut dst_band)
                .and(&src_band)
                .and(&valid)
                .for_each(|d, &s, &m| {
                    if m == 1 {
                        *d = s;
                    }
                });
        }
        let mut agg = out_mask.window_view_mut(&dst_window);
        let mut agg = agg.index_axis_mut(Axis(0), 0);
        Zip::from(&mut agg).and(&valid).for_each(|a, &m| {
            if m == 1 {
                *a = 1;
            }
        });
        info!("Composited source {} of {}", i + 1, sources.len());
    }
    Ok((out, out_mask))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::grid::GeoGrid;

    fn grid() -> GeoGrid {
        GeoGrid::new(0.0, 40.0, 10.0, -10.0, 4, 4).unwrap()
    }

    fn pair(value: i16, clear: &[(usize, usize)]) -> (Raster<i16>, Mask) {
        let image = Raster::filled(2, grid(), "", value);
        let mut mask: Mask = Raster::new(1, grid(), "");
        for &(y, x) in clear {
            mask.band_mut(0)[[y, x]] = 1;
        }
        (image, mask)
    }

    #[test]
    fn test_newest_clear_observation_wins() {
        let (old, old_mask) = pair(10, &[(0, 0), (1, 1), (2, 2)]);
        let (new, new_mask) = pair(20, &[(1, 1), (3, 3)]);
        let (c, m) = masked_composite(&[(&old, &old_mask), (&new, &new_mask)]).unwrap();
        assert_eq!(c.band(0)[[0, 0]], 10);
        assert_eq!(c.band(1)[[1, 1]], 20);
        assert_eq!(c.band(0)[[2, 2]], 10);
        assert_eq!(c.band(0)[[3, 3]], 20);
        assert_eq!(c.band(0)[[0, 3]], 0);
        let expected = [(0, 0), (1, 1), (2, 2), (3, 3)];
        for ((y, x), &v) in m.band(0).indexed_iter() {
            assert_eq!(v == 1, expected.contains(&(y, x)));
        }
    }

    #[test]
    fn test_unobserved_pixels_hold_nodata() {
        let (image, mask) = pair(7, &[(1, 2)]);
        let image = image.with_nodata(Some(-9999.0));
        let (c, m) = masked_composite(&[(&image, &mask)]).unwrap();
        assert_eq!(c.nodata(), Some(-9999.0));
        assert_eq!(c.band(0)[[1, 2]], 7);
        assert_eq!(c.band(1)[[0, 0]], -9999);
        assert_eq!(m.band(0)[[0, 0]], 0);

        let (blank, _) = pair(7, &[]);
        let blank = blank.with_nodata(Some(-9999.0));
        let (_, empty_mask) = pair(0, &[]);
        let (c, m) = masked_composite(&[(&blank, &empty_mask)]).unwrap();
        assert!(c.view().iter().all(|&v| v == -9999));
        assert!(m.view().iter().all(|&v| v == 0));
    }

    #[test]
    fn test_coarse_mask_is_aligned_to_image() {
        let (old, _) = pair(5, &[]);
        let coarse_grid = GeoGrid::new(0.0, 40.0, 20.0, -20.0, 2, 2).unwrap();
        let mut coarse: Mask = Raster::new(1, coarse_grid, "");
        coarse.band_mut(0)[[0, 0]] = 1;
        let (c, m) = masked_composite(&[(&old, &coarse)]).unwrap();
        assert_eq!(c.band(0)[[1, 1]], 5);
        assert_eq!(c.band(0)[[2, 2]], 0);
        assert_eq!(m.band(0).iter().filter(|&&v| v == 1).count(), 4);
    }
}
