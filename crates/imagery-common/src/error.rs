//! Error types for planning and executing tiled imagery downloads.

use std::fmt;
use std::path::PathBuf;

use chrono::NaiveDate;
use thiserror::Error;

/// Result type alias using ImageryError.
pub type ImageryResult<T> = Result<T, ImageryError>;

/// Raster axis that caused a planning failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Both,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::X => write!(f, "x"),
            Axis::Y => write!(f, "y"),
            Axis::Both => write!(f, "x and y"),
        }
    }
}

/// Primary error type for tiled imagery downloads.
#[derive(Debug, Error)]
pub enum ImageryError {
    // === Input Errors ===
    #[error("Invalid bounding box: {0}")]
    InvalidBbox(String),

    #[error("Invalid time specification: {0}")]
    InvalidTime(String),

    #[error("Unknown data collection: {0}")]
    UnknownCollection(String),

    #[error("Compression mode not supported: {0}")]
    InvalidCompression(String),

    #[error("Invalid resolution: {0}")]
    InvalidResolution(String),

    #[error("Invalid evaluation script: {0}")]
    InvalidEvalscript(String),

    // === Planning Errors ===
    #[error("Projection error: {0}")]
    Projection(String),

    #[error(
        "Calculated resolution above {limit} m forced by {axis} dimension(s). \
         Consider narrowing down the study area."
    )]
    ResolutionUnreachable { axis: Axis, limit: u32 },

    #[error("More than {limit} split boxes needed along {axis}")]
    SplitBoundsExceeded { axis: Axis, limit: u32 },

    // === Execution Errors ===
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Request timeout after {0} s")]
    Timeout(u64),

    #[error("Cannot resolve artifact {}: {reason}", path.display())]
    UnresolvableArtifact { path: PathBuf, reason: String },

    #[error("Merge failed for {date}: {reason}")]
    MergeFailed { date: NaiveDate, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ImageryError {
    /// Planning and input errors abort the query before any request is sent.
    /// Everything else is isolated to one unit or one date group.
    pub fn is_planning_error(&self) -> bool {
        matches!(
            self,
            ImageryError::InvalidBbox(_)
                | ImageryError::InvalidTime(_)
                | ImageryError::UnknownCollection(_)
                | ImageryError::InvalidCompression(_)
                | ImageryError::InvalidResolution(_)
                | ImageryError::InvalidEvalscript(_)
                | ImageryError::Projection(_)
                | ImageryError::ResolutionUnreachable { .. }
                | ImageryError::SplitBoundsExceeded { .. }
        )
    }
}

impl From<serde_json::Error> for ImageryError {
    fn from(err: serde_json::Error) -> Self {
        ImageryError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("JSON error: {}", err),
        ))
    }
}

impl From<crate::bbox::BboxParseError> for ImageryError {
    fn from(err: crate::bbox::BboxParseError) -> Self {
        ImageryError::InvalidBbox(err.to_string())
    }
}
