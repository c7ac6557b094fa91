//! Core engine: grid geometry, footprints and windows, raster allocation,
//! the compositing and mask policies, and chunked classification. Everything
//! here works on in-memory rasters; file handling lives in `io` and `api`.
pub mod allocate;
pub mod footprint;
pub mod grid;
pub mod model;
pub mod params;
pub mod processing;
pub mod raster;
pub mod window;
