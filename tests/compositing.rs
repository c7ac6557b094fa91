use eostack::{
    ErrorKind, GeoGrid, GeometryMode, Mask, MaskOp, Raster, combine_masks, masked_composite, mosaic,
};
use ndarray::{Array2, Array3};

fn grid(cols: usize, rows: usize) -> GeoGrid {
    GeoGrid::new(0.0, 100.0, 10.0, -10.0, cols, rows).unwrap()
}

fn mask_of(values: &[u8], cols: usize) -> Mask {
    let band = Array2::from_shape_vec((values.len() / cols, cols), values.to_vec()).unwrap();
    Mask::from_band(band, grid(cols, values.len() / cols), "EPSG:32630").unwrap()
}

#[test]
fn test_mosaic_of_identical_copies_is_identity() {
    let data = Array3::from_shape_fn((3, 6, 7), |(b, r, c)| (b * 100 + r * 10 + c) as i32 + 1);
    let raster = Raster::from_array(data, grid(7, 6), "EPSG:32630").unwrap();
    let mosaicked = mosaic(&[&raster, &raster.clone()], None).unwrap();
    assert_eq!(mosaicked.view(), raster.view());
}

#[test]
fn test_mask_algebra_laws() {
    let m = mask_of(&[1, 0, 1, 1, 0, 0, 1, 0, 1], 3);
    let ones = mask_of(&[1; 9], 3);
    let zeros = mask_of(&[0; 9], 3);

    let and_self = combine_masks(&[&m, &m], MaskOp::And, GeometryMode::Intersect).unwrap();
    assert_eq!(and_self.view(), m.view());

    let or_ones = combine_masks(&[&m, &ones], MaskOp::Or, GeometryMode::Intersect).unwrap();
    assert_eq!(or_ones.view(), ones.view());

    let nor_zeros = combine_masks(&[&zeros, &zeros], MaskOp::Nor, GeometryMode::Intersect).unwrap();
    assert_eq!(nor_zeros.view(), ones.view());
}

#[test]
fn test_three_masks_and_intersect() {
    let a = mask_of(&[1, 1, 0], 3);
    let b = mask_of(&[1, 0, 0], 3);
    let c = mask_of(&[1, 1, 1], 3);
    let combined = combine_masks(&[&a, &b, &c], MaskOp::And, GeometryMode::Intersect).unwrap();
    assert_eq!(combined.band(0).iter().copied().collect::<Vec<u8>>(), vec![1, 0, 0]);
}

#[test]
fn test_composite_keeps_newest_clear_pixel() {
    let older = Raster::filled(1, grid(3, 1), "EPSG:32630", 10i16);
    let newer = Raster::filled(1, grid(3, 1), "EPSG:32630", 20i16);
    let older_mask = mask_of(&[1, 1, 0], 3);
    let newer_mask = mask_of(&[0, 1, 0], 3);

    let (composite, mask) =
        masked_composite(&[(&older, &older_mask), (&newer, &newer_mask)]).unwrap();
    assert_eq!(composite.band(0)[[0, 0]], 10);
    assert_eq!(composite.band(0)[[0, 1]], 20);
    assert_eq!(mask.band(0).iter().copied().collect::<Vec<u8>>(), vec![1, 1, 0]);
}

#[test]
fn test_masks_without_overlap_are_geometry_errors() {
    let a = mask_of(&[1, 1, 1, 1], 2);
    let far = Mask::from_band(
        Array2::from_elem((2, 2), 1u8),
        GeoGrid::new(1000.0, 100.0, 10.0, -10.0, 2, 2).unwrap(),
        "EPSG:32630",
    )
    .unwrap();
    let err = combine_masks(&[&a, &far], MaskOp::And, GeometryMode::Intersect).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Geometry);
}

fn offset_grid(origin_x: f64, origin_y: f64) -> GeoGrid {
    GeoGrid::new(origin_x, origin_y, 10.0, -10.0, 4, 4).unwrap()
}

#[test]
fn test_composite_of_offset_grids() {
    // south-east neighbour shifted by two pixels on both axes
    let older =
        Raster::filled(1, offset_grid(0.0, 100.0), "EPSG:32630", 10i16).with_nodata(Some(-1.0));
    let newer = Raster::filled(1, offset_grid(20.0, 80.0), "EPSG:32630", 20i16);
    let older_mask = Mask::filled(1, offset_grid(0.0, 100.0), "EPSG:32630", 1);
    let mut newer_mask = Mask::filled(1, offset_grid(20.0, 80.0), "EPSG:32630", 1);
    newer_mask.band_mut(0)[[1, 1]] = 0;

    let (composite, mask) =
        masked_composite(&[(&older, &older_mask), (&newer, &newer_mask)]).unwrap();
    assert_eq!((composite.cols(), composite.rows()), (6, 6));
    assert_eq!(composite.grid().pixel_to_geo(0, 0), (0.0, 100.0));
    let band = composite.band(0);
    assert_eq!(band[[0, 0]], 10);
    assert_eq!(band[[2, 2]], 20);
    // newer is masked at its (1, 1), which is composite (3, 3)
    assert_eq!(band[[3, 3]], 10);
    assert_eq!(band[[5, 5]], 20);
    assert_eq!(band[[5, 0]], -1);
    assert_eq!(band[[0, 5]], -1);
    assert_eq!(mask.band(0)[[3, 3]], 1);
    assert_eq!(mask.band(0)[[5, 0]], 0);
    assert_eq!(mask.band(0).iter().filter(|&&v| v == 1).count(), 28);
}

#[test]
fn test_union_combine_of_offset_masks() {
    let a = Mask::filled(1, offset_grid(0.0, 100.0), "EPSG:32630", 1);
    let b = Mask::filled(1, offset_grid(20.0, 80.0), "EPSG:32630", 1);
    let combined = combine_masks(&[&a, &b], MaskOp::Or, GeometryMode::Union).unwrap();
    assert_eq!((combined.cols(), combined.rows()), (6, 6));
    let band = combined.band(0);
    for (y, x) in [(0, 0), (3, 3), (2, 5), (5, 5)] {
        assert_eq!(band[[y, x]], 1, "({}, {})", y, x);
    }
    for (y, x) in [(5, 0), (0, 5), (4, 1)] {
        assert_eq!(band[[y, x]], 0, "({}, {})", y, x);
    }
    assert_eq!(band.iter().filter(|&&v| v == 1).count(), 28);

    let intersect = combine_masks(&[&a, &b], MaskOp::And, GeometryMode::Intersect).unwrap();
    assert_eq!((intersect.cols(), intersect.rows()), (2, 2));
    assert_eq!(intersect.grid().pixel_to_geo(0, 0), (20.0, 80.0));
}
