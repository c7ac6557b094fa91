use std::path::Path;
use std::process::Command;

use gdal::raster::{Buffer, GdalDataType, GdalType};
use gdal::spatial_ref::SpatialRef;
use gdal::{Dataset, DriverManager, errors::GdalError as GdalCrateError};
use ndarray::Array3;
use thiserror::Error;
use tracing::{debug, info};

use crate::core::grid::GeoGrid;
use crate::core::raster::{Pixel, Raster};
use crate::types::{OutputFormat, PixelType};

/// Errors raised by the GDAL storage backend
#[derive(Debug, Error)]
pub enum GdalError {
    #[error("GDAL error: {0}")]
    Gdal(#[from] GdalCrateError),
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("Dimension mismatch: expected {0}x{1}, got {2}x{3}")]
    DimensionMismatch(usize, usize, usize, usize),
    #[error("gdalwarp failed: {0}")]
    Warp(String),
}

impl From<GdalCrateError> for crate::error::Error {
    fn from(e: GdalCrateError) -> Self {
        crate::error::Error::Gdal(GdalError::Gdal(e))
    }
}

/// Header information of a raster dataset, read without touching pixel data
#[derive(Debug, Clone)]
pub struct RasterInfo {
    pub size_x: usize,
    pub size_y: usize,
    pub bands: usize,
    /// Affine geotransform coefficients
    /// `[origin_x, pixel_width, rot_x, origin_y, rot_y, pixel_height]`
    pub geotransform: [f64; 6],
    /// Projection in WKT format, or an EPSG code when the WKT carries one
    pub projection: String,
    /// Nodata value of band 1
    pub nodata: Option<f64>,
    /// Storage type of band 1, if it is one the engine handles
    pub pixel_type: Option<PixelType>,
}

// Helper to extract EPSG code from WKT authority tag
fn parse_epsg(wkt: &str) -> Option<String> {
    const KEY: &str = "AUTHORITY[\"EPSG\",\"";
    if let Some(idx) = wkt.rfind(KEY) {
        let start = idx + KEY.len();
        if let Some(end) = wkt[start..].find('"') {
            let code = &wkt[start..start + end];
            return Some(format!("EPSG:{}", code));
        }
    }
    None
}

fn pixel_type_of(t: GdalDataType) -> Option<PixelType> {
    match t {
        GdalDataType::UInt8 => Some(PixelType::U8),
        GdalDataType::UInt16 => Some(PixelType::U16),
        GdalDataType::Int16 => Some(PixelType::I16),
        GdalDataType::UInt32 => Some(PixelType::U32),
        GdalDataType::Int32 => Some(PixelType::I32),
        GdalDataType::Float32 => Some(PixelType::F32),
        GdalDataType::Float64 => Some(PixelType::F64),
        _ => None,
    }
}

fn dataset_info(dataset: &Dataset) -> Result<RasterInfo, GdalError> {
    let (size_x, size_y) = dataset.raster_size();
    let bands = dataset.raster_count() as usize;
    if bands == 0 {
        return Err(GdalError::UnsupportedFormat("No raster bands found".into()));
    }
    let geotransform = dataset.geo_transform()?;
    let proj = dataset.projection();
    let projection = if proj.starts_with("EPSG:") {
        proj
    } else if let Some(code) = parse_epsg(&proj) {
        code
    } else {
        proj
    };
    let band = dataset.rasterband(1)?;
    Ok(RasterInfo {
        size_x: size_x as usize,
        size_y: size_y as usize,
        bands,
        geotransform,
        projection,
        nodata: band.no_data_value(),
        pixel_type: pixel_type_of(band.band_type()),
    })
}

/// Open a dataset and read its header
pub fn raster_info(path: &Path) -> crate::Result<RasterInfo> {
    let dataset = Dataset::open(path)?;
    Ok(dataset_info(&dataset)?)
}

/// Read every band of a GDAL-supported raster as `T`
pub fn read_raster<T: Pixel + GdalType>(path: &Path) -> crate::Result<Raster<T>> {
    let dataset = Dataset::open(path)?;
    let info = dataset_info(&dataset)?;
    let (cols, rows) = (info.size_x, info.size_y);
    let mut data = Vec::with_capacity(info.bands * rows * cols);
    for idx in 1..=info.bands {
        let band = dataset.rasterband(idx)?;
        let buf = band.read_as::<T>((0, 0), (cols, rows), (cols, rows), None)?;
        data.extend_from_slice(buf.data());
    }
    let array = Array3::from_shape_vec((info.bands, rows, cols), data)
        .map_err(|_| GdalError::DimensionMismatch(cols, rows, cols, rows))?;
    let grid = GeoGrid::from_gdal(info.geotransform, cols, rows)?;
    debug!(
        "Read {:?}: {} bands, {}x{}, {}",
        path, info.bands, cols, rows, info.projection
    );
    Ok(Raster::from_array(array, grid, info.projection)?.with_nodata(info.nodata))
}

/// Create `path` with the raster's size, placement, projection and nodata,
/// and write all bands.
pub fn write_raster<T: Pixel + GdalType>(
    raster: &Raster<T>,
    path: &Path,
    format: OutputFormat,
) -> crate::Result<()> {
    let driver = DriverManager::get_driver_by_name(format.driver_name())?;
    let (cols, rows) = (raster.cols(), raster.rows());
    let mut ds = driver.create_with_band_type::<T, _>(path, cols, rows, raster.bands())?;
    ds.set_geo_transform(&raster.grid().to_gdal())?;
    if !raster.crs().is_empty() {
        let srs = SpatialRef::from_definition(raster.crs())?;
        ds.set_spatial_ref(&srs)?;
    }
    for idx in 0..raster.bands() {
        let mut band = ds.rasterband(idx + 1)?;
        if let Some(nd) = raster.nodata() {
            band.set_no_data_value(Some(nd))?;
        }
        let values: Vec<T> = raster.band(idx).iter().copied().collect();
        let mut buf = Buffer::new((cols, rows), values);
        band.write((0, 0), (cols, rows), &mut buf)?;
    }
    info!(
        "Wrote {:?} ({} {}, {} bands, {}x{})",
        path,
        format,
        T::PIXEL_TYPE,
        raster.bands(),
        cols,
        rows
    );
    Ok(())
}

/// Resample `path` to `resolution` with gdalwarp (nearest neighbour),
/// replacing the file. The warped copy lives in a temporary directory that
/// is removed on every exit path.
pub fn resample_file_in_place(path: &Path, resolution: f64) -> crate::Result<()> {
    let tmp_dir = tempfile::TempDir::new()?;
    let file_name = path
        .file_name()
        .ok_or_else(|| GdalError::UnsupportedFormat(format!("{:?} has no file name", path)))?;
    let tmp_out = tmp_dir.path().join(file_name);
    let res = resolution.to_string();
    info!("Resampling {:?} to {} m", path, resolution);
    let output = Command::new("gdalwarp")
        .args(["-overwrite", "-r", "near", "-tr", res.as_str(), res.as_str()])
        .arg(path)
        .arg(&tmp_out)
        .output()
        .map_err(|e| GdalError::Warp(format!("gdalwarp exec error: {}", e)))?;
    if !output.status.success() {
        return Err(GdalError::Warp(String::from_utf8_lossy(&output.stderr).into_owned()).into());
    }
    std::fs::copy(&tmp_out, path)?;
    Ok(())
}
