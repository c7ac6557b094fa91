//! Binary erosion of masks with a disk-shaped structuring element.
//!
//! The disk is decomposed into one horizontal span per row offset, and each
//! mask row gets a prefix count of its invalid pixels, so testing a span is
//! constant time and erosion costs O(pixels * radius).
use ndarray::{Array2, Axis, Zip};
use tracing::info;

use crate::core::raster::Mask;
use crate::error::Result;

/// Offsets `(dy, dx)` within Euclidean distance `radius` of the centre
pub fn disk_offsets(radius: usize) -> Vec<(isize, isize)> {
    disk_spans(radius)
        .into_iter()
        .flat_map(|(dy, half)| (-half..=half).map(move |dx| (dy, dx)))
        .collect()
}

/// `(dy, half_width)` for every row of the disk: row `dy` covers
/// `-half_width..=half_width`
pub fn disk_spans(radius: usize) -> Vec<(isize, isize)> {
    let r = radius as isize;
    (-r..=r)
        .map(|dy| {
            let mut half = 0;
            while (half + 1) * (half + 1) + dy * dy <= r * r {
                half += 1;
            }
            (dy, half)
        })
        .collect()
}

/// Per-row running count of invalid (0) pixels; column `c + 1` counts
/// columns `0..=c`.
fn invalid_prefix(band: ndarray::ArrayView2<'_, u8>) -> Array2<u32> {
    let (rows, cols) = band.dim();
    let mut prefix = Array2::<u32>::zeros((rows, cols + 1));
    Zip::from(prefix.rows_mut())
        .and(band.rows())
        .par_for_each(|mut counts, row| {
            let mut acc = 0;
            for (c, &v) in row.iter().enumerate() {
                acc += (v == 0) as u32;
                counts[c + 1] = acc;
            }
        });
    prefix
}

/// Shrink the valid (1) region of `mask` by `radius` pixels: a pixel stays
/// valid only if every pixel of the disk around it is valid. Pixels beyond
/// the raster edge count as valid.
pub fn buffer_mask(mask: &Mask, radius: usize) -> Result<Mask> {
    let spans = disk_spans(radius);
    let band = mask.band(0);
    let (rows, cols) = band.dim();
    let prefix = invalid_prefix(band.view());
    let mut eroded = Array2::<u8>::zeros((rows, cols));
    Zip::indexed(&mut eroded).par_for_each(|(row, col), out| {
        let keep = spans.iter().all(|&(dy, half)| {
            let y = row as isize + dy;
            if y < 0 || y >= rows as isize {
                return true;
            }
            let x0 = (col as isize - half).max(0) as usize;
            let x1 = ((col as isize + half) as usize).min(cols - 1);
            let y = y as usize;
            prefix[[y, x1 + 1]] == prefix[[y, x0]]
        });
        *out = keep as u8;
    });
    info!("Buffered mask by {} px ({} disk rows)", radius, spans.len());
    let out = Mask::from_array(eroded.insert_axis(Axis(0)), *mask.grid(), mask.crs())?;
    Ok(out.with_nodata(mask.nodata()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::grid::GeoGrid;
    use crate::core::raster::Raster;

    fn ones(size: usize) -> Mask {
        let grid = GeoGrid::new(0.0, size as f64, 1.0, -1.0, size, size).unwrap();
        Raster::filled(1, grid, "", 1)
    }

    #[test]
    fn test_disk_offsets() {
        assert_eq!(disk_offsets(0), vec![(0, 0)]);
        assert_eq!(disk_offsets(1).len(), 5);
        assert_eq!(disk_offsets(2).len(), 13);
    }

    #[test]
    fn test_zero_radius_is_identity() {
        let mut m = ones(5);
        m.band_mut(0)[[2, 3]] = 0;
        assert_eq!(buffer_mask(&m, 0).unwrap(), m);
    }

    #[test]
    fn test_invalid_pixel_grows_by_radius() {
        let mut m = ones(7);
        m.band_mut(0)[[3, 3]] = 0;
        let b = buffer_mask(&m, 1).unwrap();
        let band = b.band(0);
        for (y, x) in [(3, 3), (2, 3), (4, 3), (3, 2), (3, 4)] {
            assert_eq!(band[[y, x]], 0);
        }
        assert_eq!(band[[2, 2]], 1);
        assert_eq!(band.iter().filter(|&&v| v == 0).count(), 5);
    }

    #[test]
    fn test_disk_spans_match_offsets() {
        assert_eq!(disk_spans(2), vec![(-2, 0), (-1, 1), (0, 2), (1, 1), (2, 0)]);
        let brute: Vec<(isize, isize)> = (-3..=3isize)
            .flat_map(|dy| (-3..=3isize).map(move |dx| (dy, dx)))
            .filter(|(dy, dx)| dy * dy + dx * dx <= 9)
            .collect();
        assert_eq!(disk_offsets(3), brute);
    }

    #[test]
    fn test_span_erosion_matches_pointwise_disk() {
        let grid = GeoGrid::new(0.0, 20.0, 1.0, -1.0, 23, 20).unwrap();
        let mut m: Mask = Raster::filled(1, grid, "", 1);
        for ((y, x), v) in m.band_mut(0).indexed_iter_mut() {
            if (y * 7 + x * 13) % 31 == 0 {
                *v = 0;
            }
        }
        for radius in [1, 2, 4] {
            let offsets = disk_offsets(radius);
            let fast = buffer_mask(&m, radius).unwrap();
            let band = m.band(0);
            for ((y, x), &v) in fast.band(0).indexed_iter() {
                let expected = offsets.iter().all(|&(dy, dx)| {
                    let (yy, xx) = (y as isize + dy, x as isize + dx);
                    yy < 0
                        || xx < 0
                        || yy >= 20
                        || xx >= 23
                        || band[[yy as usize, xx as usize]] != 0
                });
                assert_eq!(v, expected as u8, "radius {} at ({}, {})", radius, y, x);
            }
        }
    }

    #[test]
    fn test_edges_are_not_eroded() {
        let b = buffer_mask(&ones(4), 2).unwrap();
        assert!(b.band(0).iter().all(|&v| v == 1));
    }
}
