//! Output raster compression modes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ImageryError;

/// Compression applied when writing merged rasters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RasterCompression {
    Deflate,
    Lzw,
    Packbits,
}

impl RasterCompression {
    /// Parse an optional codec name; `None` means uncompressed.
    pub fn parse_optional(name: Option<&str>) -> Result<Option<Self>, ImageryError> {
        name.map(str::parse).transpose()
    }
}

impl FromStr for RasterCompression {
    type Err = ImageryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "DEFLATE" => Ok(RasterCompression::Deflate),
            "LZW" => Ok(RasterCompression::Lzw),
            "PACKBITS" => Ok(RasterCompression::Packbits),
            _ => Err(ImageryError::InvalidCompression(s.to_string())),
        }
    }
}

impl fmt::Display for RasterCompression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RasterCompression::Deflate => "DEFLATE",
            RasterCompression::Lzw => "LZW",
            RasterCompression::Packbits => "PACKBITS",
        };
        f.write_str(name)
    }
}
