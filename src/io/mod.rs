//! Storage layer: GDAL-backed raster and vector access, Sentinel-2 SAFE
//! discovery, and the file naming conventions the batch drivers rely on.
pub mod gdal;
pub use gdal::{
    GdalError, RasterInfo, raster_info, read_raster, resample_file_in_place, write_raster,
};

pub mod naming;
pub use naming::{mask_path, sort_by_timestamp};

pub mod sentinel2;

pub mod vector;
pub use vector::{read_polygon, write_polygon};
