//! Pixel-merge policies, mask algebra and chunked classification, all built
//! on [`window_for_polygon`](crate::core::window::window_for_polygon).
pub mod classify;
pub mod composite;
pub mod mask;
pub mod morphology;
pub mod mosaic;
pub mod resample;
pub mod stack;

use tracing::debug;

use crate::core::footprint::Footprint;
use crate::core::raster::{Pixel, Raster};
use crate::core::window::{Window, window_for_polygon};
use crate::error::{Error, Result};

/// Windows of `src` and `dst` that cover `region`, trimmed to a common shape.
///
/// The two windows may differ by a pixel where the region edge falls inside
/// a pixel of one raster only; the copy then covers the shared top-left part.
pub(crate) fn paired_windows<S: Pixel, D: Pixel>(
    src: &Raster<S>,
    dst: &Raster<D>,
    region: &Footprint,
) -> Result<(Window, Window)> {
    if !src.grid().same_resolution(dst.grid()) {
        return Err(Error::alignment(format!(
            "resolution {:?} does not match destination resolution {:?}",
            src.grid().resolution(),
            dst.grid().resolution()
        )));
    }
    let src_window = window_for_polygon(src, region)?;
    let dst_window = window_for_polygon(dst, region)?;
    let rows = src_window.height().min(dst_window.height());
    let cols = src_window.width().min(dst_window.width());
    if src_window.shape() != dst_window.shape() {
        debug!(
            "Trimming windows {:?} / {:?} to {}x{}",
            src_window, dst_window, cols, rows
        );
    }
    let trim = |w: Window| Window::new(w.x_min, w.x_min + cols, w.y_min, w.y_min + rows);
    Ok((trim(src_window), trim(dst_window)))
}

/// Multi-raster policies treat a lack of overlap as misaligned input
pub(crate) fn overlap_error(err: Error) -> Error {
    match err {
        Error::Geometry(msg) => Error::Alignment(msg),
        other => other,
    }
}
