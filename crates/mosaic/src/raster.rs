//! In-memory georeferenced rasters.

use imagery_common::{BoundingBox, Crs};

use crate::error::{MosaicError, MosaicResult};

/// Value used for empty pixels when a raster does not declare one.
pub const DEFAULT_NODATA: f64 = 0.0;

/// Sample type of the encoded raster. Samples are held as `f32` in memory
/// and converted back on write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleType {
    U8,
    U16,
    F32,
}

/// North-up affine transform: top-left corner and pixel size.
///
/// `pixel_height` is positive; rows run southward from `origin_y`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixel_width: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// Transform mapping a `width` x `height` grid exactly onto `bounds`.
    pub fn from_bounds(bounds: &BoundingBox, width: usize, height: usize) -> Self {
        Self {
            origin_x: bounds.min_x,
            origin_y: bounds.max_y,
            pixel_width: bounds.width() / width as f64,
            pixel_height: bounds.height() / height as f64,
        }
    }
}

/// A pixel-interleaved raster.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    pub width: usize,
    pub height: usize,
    pub bands: usize,
    pub sample_type: SampleType,
    /// Row-major, band-interleaved samples (`width * height * bands`).
    pub data: Vec<f32>,
    pub nodata: Option<f64>,
    pub transform: GeoTransform,
    pub crs: Crs,
}

impl Raster {
    /// Build a raster, checking the buffer length.
    pub fn new(
        width: usize,
        height: usize,
        bands: usize,
        sample_type: SampleType,
        data: Vec<f32>,
        transform: GeoTransform,
        crs: Crs,
    ) -> MosaicResult<Self> {
        if width == 0 || height == 0 || bands == 0 {
            return Err(MosaicError::UnsupportedLayout(format!(
                "{}x{}x{} raster",
                width, height, bands
            )));
        }
        if data.len() != width * height * bands {
            return Err(MosaicError::UnsupportedLayout(format!(
                "expected {} samples, got {}",
                width * height * bands,
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            bands,
            sample_type,
            data,
            nodata: None,
            transform,
            crs,
        })
    }

    /// A raster where every sample is `nodata`.
    pub fn filled(
        width: usize,
        height: usize,
        bands: usize,
        sample_type: SampleType,
        nodata: f64,
        transform: GeoTransform,
        crs: Crs,
    ) -> Self {
        Self {
            width,
            height,
            bands,
            sample_type,
            data: vec![nodata as f32; width * height * bands],
            nodata: Some(nodata),
            transform,
            crs,
        }
    }

    pub fn with_nodata(mut self, nodata: f64) -> Self {
        self.nodata = Some(nodata);
        self
    }

    /// Effective no-data value.
    pub fn nodata_value(&self) -> f32 {
        self.nodata.unwrap_or(DEFAULT_NODATA) as f32
    }

    /// Georeferenced extent.
    pub fn bounds(&self) -> BoundingBox {
        let t = &self.transform;
        BoundingBox::new(
            t.origin_x,
            t.origin_y - self.height as f64 * t.pixel_height,
            t.origin_x + self.width as f64 * t.pixel_width,
            t.origin_y,
            self.crs,
        )
    }

    /// Samples of one pixel.
    pub fn pixel(&self, col: usize, row: usize) -> &[f32] {
        let start = (row * self.width + col) * self.bands;
        &self.data[start..start + self.bands]
    }

    /// A pixel is empty when every band holds the no-data value.
    pub fn is_nodata(&self, samples: &[f32]) -> bool {
        let nodata = self.nodata_value();
        samples.iter().all(|v| *v == nodata || (v.is_nan() && nodata.is_nan()))
    }

    pub fn is_all_nodata(&self) -> bool {
        self.data.chunks_exact(self.bands).all(|px| self.is_nodata(px))
    }

    /// Number of non-empty pixels.
    pub fn valid_pixel_count(&self) -> usize {
        self.data
            .chunks_exact(self.bands)
            .filter(|px| !self.is_nodata(px))
            .count()
    }
}
