//! Memory-bounded, chunked classification of raster pixels.
//!
//! Pixels are visited in row-major order. Only pixels with no band equal to
//! the nodata value ("good" pixels) reach the model; their flat indices are
//! collected once, split into contiguous chunks, and the predictions are
//! scattered back through the same indices. Every other output position keeps
//! the nodata value.
use ndarray::{Array1, Array2, Array3, Axis};
use tracing::{debug, info};

use crate::core::model::{Classifier, InferenceConfig};
use crate::core::raster::{Pixel, Raster, is_nodata};
use crate::error::{Error, Result};

/// Share of the available memory a chunk may occupy
pub const MEMORY_SAFETY_FACTOR: f64 = 0.8;

/// Class map, plus per-class probabilities when requested
#[derive(Debug, Clone)]
pub struct Classification {
    pub classes: Raster<u8>,
    pub probabilities: Option<Raster<f32>>,
}

/// Flat `row * cols + col` indices of pixels where no band equals `nodata`
pub fn good_pixel_indices<T: Pixel>(raster: &Raster<T>, nodata: f64) -> Vec<usize> {
    let view = raster.view();
    let (bands, rows, cols) = view.dim();
    let mut good = Vec::with_capacity(rows * cols);
    for row in 0..rows {
        for col in 0..cols {
            if (0..bands).all(|b| !is_nodata(view[[b, row, col]].to_f64(), nodata)) {
                good.push(row * cols + col);
            }
        }
    }
    good
}

/// `(offset, len)` of each chunk: equal sizes, the last absorbing the remainder
pub fn chunk_ranges(n_samples: usize, chunk_count: usize) -> Vec<(usize, usize)> {
    let size = n_samples / chunk_count;
    let resid = n_samples - size * chunk_count;
    (0..chunk_count)
        .map(|id| {
            let len = if id + 1 == chunk_count { size + resid } else { size };
            (id * size, len)
        })
        .collect()
}

fn memory_limit() -> u64 {
    let mut sys = sysinfo::System::new();
    sys.refresh_memory();
    (sys.available_memory() as f64 * MEMORY_SAFETY_FACTOR) as u64
}

/// Smallest divisor `n` of the pixel count whose chunk of `pixels / n`
/// pixels fits under `mem_limit` bytes. Without a limit, the available
/// memory discounted by [`MEMORY_SAFETY_FACTOR`] is used.
pub fn autochunk<T: Pixel>(raster: &Raster<T>, mem_limit: Option<u64>) -> Result<usize> {
    let pixels = raster.grid().pixel_count();
    if pixels == 0 {
        return Ok(1);
    }
    let bytes_per_pixel = raster.bytes_per_pixel() as u64;
    let limit = mem_limit.unwrap_or_else(memory_limit);
    for n in 1..=pixels {
        if pixels % n != 0 {
            continue;
        }
        if ((pixels / n) as u64) * bytes_per_pixel < limit {
            debug!("Autochunk: {} chunks under {} bytes", n, limit);
            return Ok(n);
        }
    }
    Err(Error::config(
        "mem_limit",
        format!("{} bytes cannot hold a single {}-byte pixel", limit, bytes_per_pixel),
    ))
}

/// Classify every good pixel of `raster` with `model`.
///
/// `chunk_count: None` sizes chunks with [`autochunk`]. The class map is
/// single-band; probabilities have one band per model class. Both carry
/// `nodata` (saturated to the output type) where any input band was nodata.
pub fn classify<T: Pixel, M: Classifier + ?Sized>(
    raster: &Raster<T>,
    model: &M,
    chunk_count: Option<usize>,
    nodata: f64,
    probabilities: bool,
    config: &InferenceConfig,
) -> Result<Classification> {
    let bands = raster.bands();
    if bands != model.n_features() {
        return Err(Error::ModelMismatch {
            expected: model.n_features(),
            actual: bands,
        });
    }
    let chunk_count = match chunk_count {
        Some(0) => return Err(Error::config("chunk_count", 0)),
        Some(n) => n,
        None => {
            info!("No chunk count given, attempting autochunk");
            autochunk(raster, None)?
        }
    };
    let (rows, cols) = (raster.rows(), raster.cols());
    let n_pixels = rows * cols;
    let n_classes = model.n_classes();

    let good = good_pixel_indices(raster, nodata);
    info!("All samples: {}, good samples: {}", n_pixels, good.len());

    let class_nodata = u8::from_f64(nodata);
    let prob_nodata = f32::from_f64(nodata);
    let mut class_out = Array1::<u8>::from_elem(n_pixels, class_nodata);
    let mut prob_out = if probabilities {
        Some(Array2::<f32>::from_elem((n_classes, n_pixels), prob_nodata))
    } else {
        None
    };

    let view = raster.view();
    let ranges = chunk_ranges(good.len(), chunk_count);
    config.run(|| -> Result<()> {
        for (id, &(offset, len)) in ranges.iter().enumerate() {
            info!("Classifying chunk {} of {} (size {})", id + 1, chunk_count, len);
            if len == 0 {
                continue;
            }
            let indices = &good[offset..offset + len];
            let samples = Array2::from_shape_fn((len, bands), |(i, b)| {
                let flat = indices[i];
                view[[b, flat / cols, flat % cols]].to_f64()
            });
            let labels = match prob_out.as_mut() {
                Some(probs) => {
                    let (labels, chunk_probs) = model.predict_with_proba(samples.view(), config)?;
                    for (row, &flat) in chunk_probs.axis_iter(Axis(0)).zip(indices) {
                        for (class, &p) in row.iter().enumerate() {
                            probs[[class, flat]] = p;
                        }
                    }
                    labels
                }
                None => model.predict(samples.view(), config)?,
            };
            for (&flat, &label) in indices.iter().zip(labels.iter()) {
                class_out[flat] = label;
            }
        }
        Ok(())
    })??;

    let grid = *raster.grid();
    let classes = Raster::from_array(class_out.into_shape((1, rows, cols))?, grid, raster.crs())?
        .with_nodata(Some(nodata));
    let probabilities = match prob_out {
        Some(p) => {
            let p: Array3<f32> = p.into_shape((n_classes, rows, cols))?;
            Some(Raster::from_array(p, grid, raster.crs())?.with_nodata(Some(nodata)))
        }
        None => None,
    };
    Ok(Classification {
        classes,
        probabilities,
    })
}

/// Single-band map of each pixel's highest class probability. Pixels whose
/// first band holds the raster's nodata value stay nodata.
pub fn flatten_probability(probabilities: &Raster<f32>) -> Result<Raster<f32>> {
    let nodata = probabilities.nodata();
    let view = probabilities.view();
    let (_, rows, cols) = view.dim();
    let flat = Array2::from_shape_fn((rows, cols), |(y, x)| {
        let first = view[[0, y, x]];
        if nodata.is_some_and(|nd| is_nodata(first as f64, nd)) {
            return first;
        }
        view.slice(ndarray::s![.., y, x])
            .iter()
            .copied()
            .fold(f32::NEG_INFINITY, f32::max)
    });
    Ok(Raster::from_band(flat, *probabilities.grid(), probabilities.crs())?.with_nodata(nodata))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::grid::GeoGrid;
    use crate::core::model::TreeEnsemble;
    use crate::core::model::tests::threshold_model;
    use ndarray::{ArrayView2, array};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn image(cols: usize, rows: usize) -> Raster<i16> {
        let grid = GeoGrid::new(0.0, 100.0, 10.0, -10.0, cols, rows).unwrap();
        let data = Array3::from_shape_fn((2, rows, cols), |(b, y, x)| {
            ((y * cols + x) % 21) as i16 + 1 + b as i16
        });
        Raster::from_array(data, grid, "").unwrap()
    }

    #[test]
    fn test_chunk_ranges_cover_all_samples() {
        assert_eq!(chunk_ranges(10, 3), vec![(0, 3), (3, 3), (6, 4)]);
        assert_eq!(chunk_ranges(2, 4), vec![(0, 0), (0, 0), (0, 0), (0, 2)]);
        assert_eq!(chunk_ranges(0, 1), vec![(0, 0)]);
    }

    #[test]
    fn test_good_indices_skip_any_nodata_band() {
        let mut r = image(3, 2);
        r.band_mut(1)[[0, 2]] = 0;
        r.band_mut(0)[[1, 0]] = 0;
        assert_eq!(good_pixel_indices(&r, 0.0), vec![0, 1, 4, 5]);
    }

    #[test]
    fn test_chunk_count_does_not_change_labels() {
        let model = threshold_model(2);
        let cfg = InferenceConfig::default();
        for (cols, rows) in [(7, 6), (9, 5)] {
            let r = image(cols, rows);
            let one = classify(&r, &model, Some(1), 0.0, true, &cfg).unwrap();
            let seven = classify(&r, &model, Some(7), 0.0, true, &cfg).unwrap();
            assert_eq!(one.classes, seven.classes);
            assert_eq!(one.probabilities, seven.probabilities);
        }
    }

    #[test]
    fn test_nodata_positions_are_preserved() {
        let model = threshold_model(2);
        let mut r = image(4, 3);
        r.band_mut(0)[[1, 2]] = 0;
        r.band_mut(1)[[2, 3]] = 0;
        let out = classify(&r, &model, Some(3), 0.0, true, &InferenceConfig::default()).unwrap();
        for ((y, x), &label) in out.classes.band(0).indexed_iter() {
            if (y, x) == (1, 2) || (y, x) == (2, 3) {
                assert_eq!(label, 0);
            } else {
                assert!(label == 1 || label == 2);
            }
        }
        let probs = out.probabilities.unwrap();
        assert_eq!(probs.bands(), 2);
        assert_eq!(probs.band(1)[[1, 2]], 0.0);
    }

    /// Forwards to a model and counts its probability passes
    struct CountingModel {
        inner: TreeEnsemble,
        proba_calls: AtomicUsize,
    }

    impl Classifier for CountingModel {
        fn n_features(&self) -> usize {
            self.inner.n_features()
        }

        fn classes(&self) -> &[u8] {
            self.inner.classes()
        }

        fn predict(
            &self,
            samples: ArrayView2<'_, f64>,
            config: &InferenceConfig,
        ) -> Result<Array1<u8>> {
            Ok(self.predict_with_proba(samples, config)?.0)
        }

        fn predict_proba(
            &self,
            samples: ArrayView2<'_, f64>,
            config: &InferenceConfig,
        ) -> Result<Array2<f32>> {
            self.proba_calls.fetch_add(1, Ordering::SeqCst);
            self.inner.predict_proba(samples, config)
        }
    }

    #[test]
    fn test_probabilities_take_one_pass_per_chunk() {
        let model = CountingModel {
            inner: threshold_model(2),
            proba_calls: AtomicUsize::new(0),
        };
        let cfg = InferenceConfig { threads: 2 };
        let out = classify(&image(4, 3), &model, Some(3), 0.0, true, &cfg).unwrap();
        assert!(out.probabilities.is_some());
        assert_eq!(model.proba_calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_band_count_mismatch() {
        let model = threshold_model(3);
        let err = classify(&image(2, 2), &model, Some(1), 0.0, false, &InferenceConfig::default())
            .unwrap_err();
        assert!(matches!(err, Error::ModelMismatch { expected: 3, actual: 2 }));
    }

    #[test]
    fn test_zero_chunks_is_config_error() {
        let model = threshold_model(2);
        let err = classify(&image(2, 2), &model, Some(0), 0.0, false, &InferenceConfig::default())
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_autochunk_picks_first_fitting_divisor() {
        // 12 pixels of 2 x i16 = 4 bytes each
        let r = image(4, 3);
        assert_eq!(autochunk(&r, Some(1_000)).unwrap(), 1);
        assert_eq!(autochunk(&r, Some(48)).unwrap(), 2);
        assert_eq!(autochunk(&r, Some(20)).unwrap(), 3);
        assert!(autochunk(&r, Some(4)).is_err());
    }

    #[test]
    fn test_flatten_probability_takes_max() {
        let grid = GeoGrid::new(0.0, 10.0, 10.0, -10.0, 2, 1).unwrap();
        let data = array![[[0.2f32, -1.0]], [[0.7, -1.0]], [[0.1, -1.0]]];
        let p = Raster::from_array(data, grid, "").unwrap().with_nodata(Some(-1.0));
        let flat = flatten_probability(&p).unwrap();
        assert_eq!(flat.band(0), array![[0.7f32, -1.0]]);
    }
}
