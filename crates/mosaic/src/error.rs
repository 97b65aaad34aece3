//! Error types for raster I/O and merging.

use thiserror::Error;

/// Result type alias using MosaicError.
pub type MosaicResult<T> = Result<T, MosaicError>;

#[derive(Debug, Error)]
pub enum MosaicError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    /// Required georeferencing tags are missing or malformed.
    #[error("Invalid GeoTIFF: {0}")]
    InvalidGeoTiff(String),

    #[error("Unsupported raster layout: {0}")]
    UnsupportedLayout(String),

    /// Rasters cannot be merged together.
    #[error("Incompatible rasters: {0}")]
    Incompatible(String),

    #[error("Nothing to merge")]
    Empty,
}
