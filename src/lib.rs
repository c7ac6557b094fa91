#![doc = r#"
eostack: raster alignment, compositing and chunked classification for multi-band
satellite imagery.

This crate aligns rasters with differing extents onto a common pixel grid, combines
them (band stacking, mosaicking, cloud-free compositing), derives and combines binary
validity masks, and runs a pretrained pixel classifier in memory-bounded chunks. It
powers the eostack CLI and can be embedded in your own Rust applications.

Stability
---------
The public library API is experimental in initial releases and may evolve as the
crate stabilizes. Breaking changes can occur.

Requirements
------------
- GDAL development headers and runtime available on your system.
- `gdalwarp` on `PATH` for [`resample_file_in_place`].
- Rust 2024 edition toolchain.

Quick start: in-memory stacking
-------------------------------
```rust
use eostack::{GeoGrid, Raster, stack};

fn main() -> eostack::Result<()> {
    let a = Raster::filled(2, GeoGrid::new(0.0, 100.0, 10.0, -10.0, 10, 10)?, "EPSG:32630", 1i32);
    let b = Raster::filled(2, GeoGrid::new(40.0, 100.0, 10.0, -10.0, 10, 10)?, "EPSG:32630", 2i32);

    let stacked = stack(&[&a, &b])?;
    assert_eq!(stacked.bands(), 4);
    assert_eq!(stacked.cols(), 6);
    Ok(())
}
```

Classify an image on disk
-------------------------
```rust,no_run
use std::path::Path;
use eostack::{classify_image, ClassifyParams};

fn main() -> eostack::Result<()> {
    let params = ClassifyParams {
        chunks: None, // size chunks from available memory
        ..ClassifyParams::default()
    };
    classify_image(
        Path::new("/data/T15PXT_20180301T162211_20180311T162211.tif"),
        Path::new("/models/change.json"),
        Path::new("/out/change_class.tif"),
        Some(Path::new("/out/change_prob.tif")),
        &params,
    )
}
```

Batch helpers
-------------
```rust,no_run
use std::path::Path;
use eostack::{aggregate_and_mask_10m_bands, ClassifyParams, CompositeParams, MaskParams};

fn main() -> eostack::Result<()> {
    let report = aggregate_and_mask_10m_bands(
        Path::new("/data/l2"),
        Path::new("/data/merged"),
        None, // confidence-layer masks only
        &CompositeParams::default(),
        &MaskParams::default(),
        &ClassifyParams::default(),
        true, // continue_on_error
    )?;

    println!("processed={} skipped={} errors={}", report.processed, report.skipped, report.errors);
    Ok(())
}
```

Error handling
--------------
All public functions return `eostack::Result<T>`. [`Error::kind`] classifies a failure,
and [`Error::is_continuable`] tells batch drivers whether the next item may still
succeed.

```rust,no_run
use std::path::Path;
use eostack::{combine_mask_files, Error, GeometryMode, MaskOp};

fn main() {
    let masks = [Path::new("/data/a.msk"), Path::new("/data/b.msk")];
    let out = Path::new("/out/ab.msk");
    match combine_mask_files(&masks, out, MaskOp::And, GeometryMode::Intersect) {
        Ok(()) => {}
        Err(Error::Geometry(e)) => eprintln!("masks do not overlap: {e}"),
        Err(Error::IncompleteData { what, location }) => {
            eprintln!("{what} missing from {location}")
        }
        Err(other) => eprintln!("Other error: {other}"),
    }
}
```

Logging
-------
Library code emits `tracing` events and never installs a subscriber; install one in
your application (the CLI does so with `--log`).

Useful modules
--------------
- [`api`]: file-level entry points and batch drivers.
- [`core`]: grids, footprints, windows, compositing policies, masks and classification.
- [`io`]: GDAL raster/vector backend, Sentinel-2 SAFE discovery, naming conventions.
- [`types`]: policy enums (`GeometryMode`, `MaskOp`) and storage enums.
- [`error`]: crate-level `Error` and `Result`.
"#]

// Core modules (public)
pub mod api;
pub mod core;
pub mod error;
pub mod io;
pub mod types;

// Curated public API surface
// Types
pub use crate::core::footprint::Footprint;
pub use crate::core::grid::{GeoGrid, GeoPoint};
pub use crate::core::model::{Classifier, DecisionTree, InferenceConfig, TreeEnsemble, TreeNode};
pub use crate::core::params::{ClassifyParams, CompositeParams, MaskParams, load_params};
pub use crate::core::raster::{Mask, Pixel, Raster};
pub use crate::core::window::Window;
pub use error::{Error, ErrorKind, Result};
pub use types::{GeometryMode, MaskOp, OutputFormat, PixelType};

// Engine operations
pub use crate::core::allocate::{allocate_for_polygon, clip_to_polygon};
pub use crate::core::footprint::{
    check_overlap, combine, combined_footprint, raster_footprint, raster_intersection,
};
pub use crate::core::processing::classify::{
    Classification, autochunk, classify, flatten_probability,
};
pub use crate::core::processing::composite::masked_composite;
pub use crate::core::processing::mask::{
    apply_mask, combine_masks, mask_from_confidence, mask_from_model_output,
};
pub use crate::core::processing::morphology::buffer_mask;
pub use crate::core::processing::mosaic::mosaic;
pub use crate::core::processing::resample::{align_to, resample_nearest};
pub use crate::core::processing::stack::{check_tile_identity, stack, stack_and_trim};
pub use crate::core::window::{point_to_pixel, window_for_polygon};

// Storage backend
pub use io::gdal::{GdalError, RasterInfo, raster_info, read_raster, write_raster};
pub use io::vector::{read_polygon, write_polygon};

// High-level API re-exports
pub use api::{
    BatchReport, aggregate_and_mask_10m_bands, aoi_intersection, buffer_mask_in_place,
    change_from_composite, classify_directory, classify_image, clip_raster, combine_mask_files,
    composite_directory, composite_images_with_mask, create_mask_from_confidence_layer,
    create_mask_from_model, create_new_stacks, flatten_probability_image, iterate_safe_products,
    mosaic_images, resample_file_in_place, stack_and_trim_images, stack_images,
    stack_old_and_new_images, stack_sentinel2_bands, write_aoi_intersection,
};
