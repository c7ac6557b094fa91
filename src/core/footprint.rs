//! Raster footprints and the boolean geometry used to combine them.
//!
//! Overlay results are snapped back onto the vertex coordinates of their
//! operands and simplified, so the rectilinear footprints produced from
//! raster grids stay exactly rectilinear through any number of operations.
use geo::{Area, BooleanOps, BoundingRect, Coord, LineString, MultiPolygon, Polygon, Simplify};
use tracing::debug;

use crate::core::grid::GeoGrid;
use crate::core::raster::{Pixel, Raster};
use crate::error::{Error, Result};
use crate::types::GeometryMode;

/// Relative distance under which an overlay vertex is moved onto an operand vertex
const SNAP_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq)]
pub struct Footprint {
    shape: MultiPolygon<f64>,
}

impl Footprint {
    /// Axis-aligned rectangle as a closed ring, starting at the top-left corner
    pub fn rectangle(x_min: f64, x_max: f64, y_min: f64, y_max: f64) -> Self {
        let ring = LineString::from(vec![
            (x_min, y_max),
            (x_max, y_max),
            (x_max, y_min),
            (x_min, y_min),
            (x_min, y_max),
        ]);
        Self::from_polygon(Polygon::new(ring, vec![]))
    }

    pub fn from_polygon(polygon: Polygon<f64>) -> Self {
        Self {
            shape: MultiPolygon::new(vec![polygon]),
        }
    }

    pub fn from_multi_polygon(shape: MultiPolygon<f64>) -> Self {
        Self { shape }
    }

    pub fn as_multi_polygon(&self) -> &MultiPolygon<f64> {
        &self.shape
    }

    pub fn area(&self) -> f64 {
        self.shape.unsigned_area()
    }

    /// True when the footprint covers no area at all
    pub fn is_empty(&self) -> bool {
        self.shape.0.is_empty() || self.area() <= 0.0
    }

    /// Bounding envelope as `(x_min, x_max, y_min, y_max)`
    pub fn envelope(&self) -> Option<(f64, f64, f64, f64)> {
        self.shape.bounding_rect().map(|r| {
            let (min, max) = (r.min(), r.max());
            (min.x, max.x, min.y, max.y)
        })
    }

    pub fn intersection(&self, other: &Footprint) -> Footprint {
        let raw = self.shape.intersection(&other.shape);
        Footprint::cleaned(raw, &[self, other])
    }

    pub fn union(&self, other: &Footprint) -> Footprint {
        let raw = self.shape.union(&other.shape);
        Footprint::cleaned(raw, &[self, other])
    }

    pub fn intersects(&self, other: &Footprint) -> bool {
        !self.intersection(other).is_empty()
    }

    fn vertex_axes(&self, xs: &mut Vec<f64>, ys: &mut Vec<f64>) {
        for polygon in &self.shape.0 {
            let rings = std::iter::once(polygon.exterior()).chain(polygon.interiors());
            for ring in rings {
                for c in ring.coords() {
                    xs.push(c.x);
                    ys.push(c.y);
                }
            }
        }
    }

    /// Snap overlay output onto the operands' coordinates, then drop collinear
    /// vertices and zero-area parts.
    fn cleaned(raw: MultiPolygon<f64>, operands: &[&Footprint]) -> Footprint {
        let (mut xs, mut ys) = (Vec::new(), Vec::new());
        for op in operands {
            op.vertex_axes(&mut xs, &mut ys);
        }
        let snap_coord = |c: Coord<f64>| Coord {
            x: snap(c.x, &xs),
            y: snap(c.y, &ys),
        };
        let snap_ring = |ring: &LineString<f64>| {
            LineString::new(ring.coords().map(|c| snap_coord(*c)).collect())
        };
        let snapped: Vec<Polygon<f64>> = raw
            .0
            .iter()
            .map(|p| {
                Polygon::new(
                    snap_ring(p.exterior()),
                    p.interiors().iter().map(&snap_ring).collect(),
                )
            })
            .collect();
        let simplified = MultiPolygon::new(snapped).simplify(&0.0);
        let kept: Vec<Polygon<f64>> = simplified
            .0
            .into_iter()
            .filter(|p| p.unsigned_area() > 0.0)
            .collect();
        Footprint {
            shape: MultiPolygon::new(kept),
        }
    }
}

fn snap(v: f64, candidates: &[f64]) -> f64 {
    let tol = SNAP_TOLERANCE * v.abs().max(1.0);
    candidates
        .iter()
        .copied()
        .find(|c| (c - v).abs() <= tol)
        .unwrap_or(v)
}

/// The rectangle covered by a grid
pub fn grid_footprint(grid: &GeoGrid) -> Footprint {
    let (x_min, x_max, y_min, y_max) = grid.extent();
    Footprint::rectangle(x_min, x_max, y_min, y_max)
}

pub fn raster_footprint<T: Pixel>(raster: &Raster<T>) -> Footprint {
    grid_footprint(raster.grid())
}

/// Fold intersection or union across `polygons`
pub fn combine(polygons: &[Footprint], mode: GeometryMode) -> Result<Footprint> {
    let (first, rest) = polygons
        .split_first()
        .ok_or_else(|| Error::geometry("cannot combine an empty list of polygons"))?;
    if first.is_empty() {
        return Err(Error::geometry("cannot combine an empty polygon"));
    }
    let mut running = first.clone();
    for (i, polygon) in rest.iter().enumerate() {
        running = match mode {
            GeometryMode::Intersect => running.intersection(polygon),
            GeometryMode::Union => running.union(polygon),
        };
        if running.is_empty() {
            return Err(Error::geometry(format!(
                "{} of polygons 0..={} is empty; inputs do not overlap",
                mode,
                i + 1
            )));
        }
    }
    debug!("Combined {} polygons ({}): {:?}", polygons.len(), mode, running.envelope());
    Ok(running)
}

/// Combined footprint of several rasters
pub fn combined_footprint<T: Pixel>(
    rasters: &[&Raster<T>],
    mode: GeometryMode,
) -> Result<Footprint> {
    let footprints: Vec<Footprint> = rasters.iter().map(|r| raster_footprint(*r)).collect();
    combine(&footprints, mode)
}

pub fn raster_intersection<A: Pixel, B: Pixel>(a: &Raster<A>, b: &Raster<B>) -> Result<Footprint> {
    combine(&[raster_footprint(a), raster_footprint(b)], GeometryMode::Intersect)
}

/// True when the raster covers some area of `aoi`
pub fn check_overlap<T: Pixel>(raster: &Raster<T>, aoi: &Footprint) -> bool {
    raster_footprint(raster).intersects(aoi)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(x_min: f64, x_max: f64, y_min: f64, y_max: f64) -> Footprint {
        Footprint::rectangle(x_min, x_max, y_min, y_max)
    }

    #[test]
    fn test_grid_footprint_is_closed_ring_from_top_left() {
        let grid = GeoGrid::new(100.0, 200.0, 10.0, -10.0, 3, 2).unwrap();
        let fp = grid_footprint(&grid);
        let ring: Vec<(f64, f64)> = fp.as_multi_polygon().0[0]
            .exterior()
            .coords()
            .map(|c| (c.x, c.y))
            .collect();
        assert_eq!(
            ring,
            vec![(100.0, 200.0), (130.0, 200.0), (130.0, 180.0), (100.0, 180.0), (100.0, 200.0)]
        );
        assert_eq!(fp.area(), 600.0);
    }

    #[test]
    fn test_intersection_envelope_is_exact() {
        let a = rect(0.0, 100.0, 0.0, 100.0);
        let b = rect(40.0, 140.0, 0.0, 100.0);
        let i = combine(&[a, b], GeometryMode::Intersect).unwrap();
        assert_eq!(i.envelope(), Some((40.0, 100.0, 0.0, 100.0)));
        assert_eq!(i.area(), 6000.0);
    }

    #[test]
    fn test_union_envelope_covers_all_inputs() {
        let polys = vec![
            rect(0.0, 10.0, 0.0, 10.0),
            rect(5.0, 20.0, 5.0, 30.0),
            rect(-3.0, 1.0, -2.0, 1.0),
        ];
        let u = combine(&polys, GeometryMode::Union).unwrap();
        assert_eq!(u.envelope(), Some((-3.0, 20.0, -2.0, 30.0)));
    }

    #[test]
    fn test_combine_is_order_independent() {
        let a = rect(0.0, 50.0, 0.0, 50.0);
        let b = rect(10.0, 70.0, 20.0, 60.0);
        let c = rect(5.0, 45.0, -10.0, 55.0);
        for mode in [GeometryMode::Intersect, GeometryMode::Union] {
            let abc = combine(&[a.clone(), b.clone(), c.clone()], mode).unwrap();
            let cba = combine(&[c.clone(), b.clone(), a.clone()], mode).unwrap();
            assert_eq!(abc.envelope(), cba.envelope());
            assert!((abc.area() - cba.area()).abs() < 1e-6);
        }
    }

    #[test]
    fn test_no_overlap_is_geometry_error() {
        let a = rect(0.0, 10.0, 0.0, 10.0);
        let b = rect(20.0, 30.0, 0.0, 10.0);
        assert!(matches!(
            combine(&[a.clone(), b], GeometryMode::Intersect),
            Err(Error::Geometry(_))
        ));
        // touching edges share no area
        let c = rect(10.0, 20.0, 0.0, 10.0);
        assert!(!a.intersects(&c));
    }

    #[test]
    fn test_empty_list_is_geometry_error() {
        assert!(matches!(
            combine(&[], GeometryMode::Union),
            Err(Error::Geometry(_))
        ));
    }
}
