//! Area-of-interest polygons from vector files (shapefile, GeoJSON, ...).
use std::path::Path;

use gdal::spatial_ref::SpatialRef;
use gdal::vector::{LayerAccess, LayerOptions, OGRwkbGeometryType, ToGdal};
use gdal::{Dataset, DriverManager};
use tracing::{debug, info};

use crate::core::footprint::Footprint;
use crate::error::{Error, Result};

fn to_footprint(geometry: geo::Geometry<f64>, path: &Path) -> Result<Footprint> {
    match geometry {
        geo::Geometry::Polygon(p) => Ok(Footprint::from_polygon(p)),
        geo::Geometry::MultiPolygon(mp) => Ok(Footprint::from_multi_polygon(mp)),
        other => Err(Error::geometry(format!(
            "{:?} holds a non-polygon geometry ({:?})",
            path,
            geometry_name(&other)
        ))),
    }
}

fn geometry_name(geometry: &geo::Geometry<f64>) -> &'static str {
    match geometry {
        geo::Geometry::Point(_) => "point",
        geo::Geometry::Line(_) | geo::Geometry::LineString(_) => "line",
        geo::Geometry::MultiPoint(_) => "multipoint",
        geo::Geometry::MultiLineString(_) => "multiline",
        _ => "collection",
    }
}

/// The polygon of the first feature in the first layer of `path`
pub fn read_polygon(path: &Path) -> Result<Footprint> {
    let dataset = Dataset::open(path)?;
    let mut layer = dataset.layer(0)?;
    let geometry = layer
        .features()
        .find_map(|feature| feature.geometry().map(geo::Geometry::<f64>::try_from))
        .ok_or_else(|| Error::geometry(format!("{:?} has no feature geometry", path)))??;
    let footprint = to_footprint(geometry, path)?;
    if footprint.is_empty() {
        return Err(Error::geometry(format!("{:?} holds an empty polygon", path)));
    }
    debug!("AOI {:?}: envelope {:?}", path, footprint.envelope());
    Ok(footprint)
}

/// Write `footprint` as a single-feature polygon layer. `driver` is an OGR
/// driver name such as `"ESRI Shapefile"` or `"GeoJSON"`.
pub fn write_polygon(footprint: &Footprint, crs: &str, path: &Path, driver: &str) -> Result<()> {
    let driver = DriverManager::get_driver_by_name(driver)?;
    let mut dataset = driver.create_vector_only(path)?;
    let srs = if crs.is_empty() {
        None
    } else {
        Some(SpatialRef::from_definition(crs)?)
    };
    let mut layer = dataset.create_layer(LayerOptions {
        name: "footprint",
        srs: srs.as_ref(),
        ty: OGRwkbGeometryType::wkbMultiPolygon,
        ..Default::default()
    })?;
    layer.create_feature(footprint.as_multi_polygon().to_gdal()?)?;
    info!("Wrote footprint {:?} ({} m2)", path, footprint.area());
    Ok(())
}
