//! In-memory multi-band raster: a (band, row, col) pixel buffer placed on a
//! [`GeoGrid`].
//!
//! Buffer access goes through ndarray views borrowed from the raster, so a
//! writable view is exclusive for as long as it lives and cannot coexist with
//! any other view of the same raster.
use std::fmt::Debug;

use ndarray::{Array2, Array3, ArrayView2, ArrayView3, ArrayViewMut2, ArrayViewMut3, Axis, s};
use num_traits::NumCast;

use crate::core::grid::GeoGrid;
use crate::core::window::Window;
use crate::error::{Error, Result};
use crate::types::PixelType;

/// Types a raster buffer can hold
pub trait Pixel:
    Copy + Clone + Debug + PartialEq + PartialOrd + Default + NumCast + Send + Sync + 'static
{
    const PIXEL_TYPE: PixelType;

    fn to_f64(self) -> f64 {
        <f64 as NumCast>::from(self).unwrap_or(f64::NAN)
    }

    /// Saturating conversion; NaN becomes zero for integer types
    fn from_f64(v: f64) -> Self;
}

/// Whether `v` is the nodata value; a NaN nodata matches NaN pixels
pub fn is_nodata(v: f64, nodata: f64) -> bool {
    v == nodata || (nodata.is_nan() && v.is_nan())
}

macro_rules! impl_pixel {
    ($t:ty, $pt:expr) => {
        impl Pixel for $t {
            const PIXEL_TYPE: PixelType = $pt;

            fn from_f64(v: f64) -> Self {
                v as $t
            }
        }
    };
}

impl_pixel!(u8, PixelType::U8);
impl_pixel!(u16, PixelType::U16);
impl_pixel!(i16, PixelType::I16);
impl_pixel!(u32, PixelType::U32);
impl_pixel!(i32, PixelType::I32);
impl_pixel!(f32, PixelType::F32);
impl_pixel!(f64, PixelType::F64);

#[derive(Debug, Clone, PartialEq)]
pub struct Raster<T: Pixel> {
    data: Array3<T>,
    grid: GeoGrid,
    crs: String,
    nodata: Option<f64>,
}

/// A single-band byte raster: 1 marks a usable pixel, 0 an excluded one
pub type Mask = Raster<u8>;

impl<T: Pixel> Raster<T> {
    /// Allocate a raster filled with `T::default()`
    pub fn new(bands: usize, grid: GeoGrid, crs: impl Into<String>) -> Self {
        Self::filled(bands, grid, crs, T::default())
    }

    pub fn filled(bands: usize, grid: GeoGrid, crs: impl Into<String>, value: T) -> Self {
        Self {
            data: Array3::from_elem((bands, grid.rows, grid.cols), value),
            grid,
            crs: crs.into(),
            nodata: None,
        }
    }

    pub fn from_array(data: Array3<T>, grid: GeoGrid, crs: impl Into<String>) -> Result<Self> {
        let (_, rows, cols) = data.dim();
        if rows != grid.rows || cols != grid.cols {
            return Err(Error::Processing(format!(
                "buffer is {}x{} but grid is {}x{}",
                cols, rows, grid.cols, grid.rows
            )));
        }
        Ok(Self {
            data,
            grid,
            crs: crs.into(),
            nodata: None,
        })
    }

    pub fn from_band(band: Array2<T>, grid: GeoGrid, crs: impl Into<String>) -> Result<Self> {
        Self::from_array(band.insert_axis(Axis(0)), grid, crs)
    }

    pub fn with_nodata(mut self, nodata: Option<f64>) -> Self {
        self.nodata = nodata;
        self
    }

    pub fn bands(&self) -> usize {
        self.data.dim().0
    }

    pub fn rows(&self) -> usize {
        self.grid.rows
    }

    pub fn cols(&self) -> usize {
        self.grid.cols
    }

    pub fn grid(&self) -> &GeoGrid {
        &self.grid
    }

    pub fn crs(&self) -> &str {
        &self.crs
    }

    pub fn nodata(&self) -> Option<f64> {
        self.nodata
    }

    pub fn set_nodata(&mut self, nodata: Option<f64>) {
        self.nodata = nodata;
    }

    pub fn pixel_type(&self) -> PixelType {
        T::PIXEL_TYPE
    }

    /// Bytes occupied by one pixel across all bands
    pub fn bytes_per_pixel(&self) -> usize {
        std::mem::size_of::<T>() * self.bands()
    }

    pub fn view(&self) -> ArrayView3<'_, T> {
        self.data.view()
    }

    pub fn view_mut(&mut self) -> ArrayViewMut3<'_, T> {
        self.data.view_mut()
    }

    pub fn band(&self, band: usize) -> ArrayView2<'_, T> {
        self.data.index_axis(Axis(0), band)
    }

    pub fn band_mut(&mut self, band: usize) -> ArrayViewMut2<'_, T> {
        self.data.index_axis_mut(Axis(0), band)
    }

    /// All bands restricted to `window`
    pub fn window_view(&self, window: &Window) -> ArrayView3<'_, T> {
        self.data.slice(s![
            ..,
            window.y_min..window.y_max,
            window.x_min..window.x_max
        ])
    }

    pub fn window_view_mut(&mut self, window: &Window) -> ArrayViewMut3<'_, T> {
        self.data.slice_mut(s![
            ..,
            window.y_min..window.y_max,
            window.x_min..window.x_max
        ])
    }

    pub fn into_array(self) -> Array3<T> {
        self.data
    }

    /// Convert every pixel to another pixel type, saturating where needed
    pub fn cast<U: Pixel>(&self) -> Raster<U> {
        Raster {
            data: self.data.mapv(|v| U::from_f64(v.to_f64())),
            grid: self.grid,
            crs: self.crs.clone(),
            nodata: self.nodata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn grid(cols: usize, rows: usize) -> GeoGrid {
        GeoGrid::new(0.0, 100.0, 10.0, -10.0, cols, rows).unwrap()
    }

    #[test]
    fn test_new_raster_is_default_filled() {
        let r: Raster<i32> = Raster::new(3, grid(4, 2), "EPSG:32630");
        assert_eq!(r.view().dim(), (3, 2, 4));
        assert!(r.view().iter().all(|&v| v == 0));
        assert_eq!(r.bytes_per_pixel(), 12);
        assert_eq!(r.pixel_type(), PixelType::I32);
    }

    #[test]
    fn test_from_array_checks_grid_shape() {
        let data = Array3::<u8>::zeros((1, 3, 3));
        assert!(Raster::from_array(data.clone(), grid(3, 3), "").is_ok());
        assert!(Raster::from_array(data, grid(4, 3), "").is_err());
    }

    #[test]
    fn test_window_view_mut_writes_through() {
        let mut r: Raster<u16> = Raster::new(2, grid(4, 4), "");
        let w = Window::new(1, 3, 2, 4);
        r.window_view_mut(&w).fill(7);
        assert_eq!(r.band(1)[[2, 1]], 7);
        assert_eq!(r.band(1)[[1, 1]], 0);
        assert_eq!(r.band(0)[[3, 2]], 7);
        assert_eq!(r.window_view(&w).dim(), (2, 2, 2));
    }

    #[test]
    fn test_cast_saturates() {
        let r = Raster::from_band(array![[-5.0f64, 300.0], [12.7, f64::NAN]], grid(2, 2), "")
            .unwrap();
        let c: Raster<u8> = r.cast();
        assert_eq!(c.band(0), array![[0u8, 255], [12, 0]]);
    }
}
