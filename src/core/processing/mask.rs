//! Validity masks: building them from quality layers and classifier output,
//! combining several of them, and applying one to an image.
use ndarray::{Axis, Zip};
use tracing::info;

use crate::core::allocate::allocate_for_polygon;
use crate::core::footprint::{combined_footprint, raster_footprint};
use crate::core::processing::paired_windows;
use crate::core::processing::resample::resample_nearest;
use crate::core::raster::{Mask, Pixel, Raster};
use crate::error::{Error, Result};
use crate::types::{GeometryMode, MaskOp};

fn threshold_band<T: Pixel>(raster: &Raster<T>, valid: impl Fn(f64) -> bool) -> Result<Mask> {
    if raster.bands() == 0 {
        return Err(Error::Processing("cannot build a mask from a zero-band raster".into()));
    }
    let band = raster.band(0).mapv(|v| valid(v.to_f64()) as u8);
    Mask::from_band(band, *raster.grid(), raster.crs())
}

/// Valid where the cloud confidence is strictly below `threshold`. With a
/// `target_resolution` the mask is then resampled to that square pixel size.
pub fn mask_from_confidence<T: Pixel>(
    confidence: &Raster<T>,
    threshold: f64,
    target_resolution: Option<f64>,
) -> Result<Mask> {
    let mask = threshold_band(confidence, |v| v < threshold)?;
    let mask = match target_resolution {
        Some(res) => resample_nearest(&mask, res, res)?,
        None => mask,
    };
    info!(
        "Confidence mask (threshold {}): {}x{}",
        threshold,
        mask.cols(),
        mask.rows()
    );
    Ok(mask)
}

/// Valid where the class map equals `clear_class`
pub fn mask_from_model_output<T: Pixel>(classified: &Raster<T>, clear_class: f64) -> Result<Mask> {
    threshold_band(classified, |v| v == clear_class)
}

/// Fold `op` across `masks` aligned on their intersection or union.
///
/// The destination starts at [`MaskOp::initial_value`]. In intersect mode
/// every mask is read through its window on the common polygon; in union
/// mode each mask covers its own footprint of the destination.
pub fn combine_masks(masks: &[&Mask], op: MaskOp, mode: GeometryMode) -> Result<Mask> {
    let polygon = combined_footprint(masks, mode)?;
    let first = masks[0];
    let (x_res, y_res) = first.grid().resolution();
    let mut out: Mask = allocate_for_polygon(&polygon, x_res, y_res, 1, first.crs())?;
    out.view_mut().fill(op.initial_value());

    for &mask in masks {
        let region = match mode {
            GeometryMode::Intersect => polygon.clone(),
            GeometryMode::Union => raster_footprint(mask),
        };
        let (src_window, dst_window) = paired_windows(mask, &out, &region)?;
        let src = mask.window_view(&src_window);
        let mut dst = out.window_view_mut(&dst_window);
        Zip::from(&mut dst)
            .and(&src)
            .for_each(|acc, &v| *acc = op.apply(*acc, v));
    }
    info!(
        "Combined {} masks with {} ({}): {}x{}",
        masks.len(),
        op,
        mode,
        out.cols(),
        out.rows()
    );
    Ok(out)
}

/// Set every band of `raster` to `fill` where `mask` is 0. The mask must
/// share the raster's grid.
pub fn apply_mask<T: Pixel>(raster: &mut Raster<T>, mask: &Mask, fill: T) -> Result<()> {
    if mask.grid() != raster.grid() {
        return Err(Error::alignment(format!(
            "mask grid {:?} does not match image grid {:?}",
            mask.grid(),
            raster.grid()
        )));
    }
    let valid = mask.band(0);
    for mut band in raster.view_mut().axis_iter_mut(Axis(0)) {
        Zip::from(&mut band).and(&valid).for_each(|v, &m| {
            if m == 0 {
                *v = fill;
            }
        });
    }
    Ok(())
}
