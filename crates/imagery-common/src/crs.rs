//! Coordinate Reference System identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const OGC_CRS84_URL: &str = "http://www.opengis.net/def/crs/OGC/1.3/CRS84";
const OGC_EPSG_URL_PREFIX: &str = "http://www.opengis.net/def/crs/EPSG/0/";

/// A coordinate reference system, identified by its EPSG code.
///
/// The planner only needs to tell geographic boxes (degrees) from metric
/// UTM boxes (meters); anything else is carried as a raw EPSG code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Crs {
    /// WGS84 Geographic (lon/lat in degrees)
    Wgs84,
    /// WGS84 / UTM zone (meters)
    Utm { zone: u8, north: bool },
    /// Any other EPSG code
    Epsg(u16),
}

impl Crs {
    /// Build a CRS from a numeric EPSG code.
    pub fn from_epsg(code: u16) -> Self {
        match code {
            4326 => Crs::Wgs84,
            32601..=32660 => Crs::Utm {
                zone: (code - 32600) as u8,
                north: true,
            },
            32701..=32760 => Crs::Utm {
                zone: (code - 32700) as u8,
                north: false,
            },
            other => Crs::Epsg(other),
        }
    }

    /// Numeric EPSG code.
    pub fn epsg(&self) -> u16 {
        match self {
            Crs::Wgs84 => 4326,
            Crs::Utm { zone, north: true } => 32600 + *zone as u16,
            Crs::Utm { zone, north: false } => 32700 + *zone as u16,
            Crs::Epsg(code) => *code,
        }
    }

    /// UTM zone containing the given geographic point.
    pub fn utm_for(lon: f64, lat: f64) -> Self {
        let zone = (((lon + 180.0) / 6.0).floor() as i32 + 1).clamp(1, 60) as u8;
        Crs::Utm {
            zone,
            north: lat >= 0.0,
        }
    }

    /// Check if this is a geographic (lat/lon) CRS.
    pub fn is_geographic(&self) -> bool {
        match self {
            Crs::Wgs84 => true,
            Crs::Utm { .. } => false,
            Crs::Epsg(code) => (4000..5000).contains(code),
        }
    }

    /// CRS URL used in imagery service request payloads.
    pub fn ogc_url(&self) -> String {
        match self {
            Crs::Wgs84 => OGC_CRS84_URL.to_string(),
            other => format!("{}{}", OGC_EPSG_URL_PREFIX, other.epsg()),
        }
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg())
    }
}

impl FromStr for Crs {
    type Err = CrsParseError;

    /// Accepts `EPSG:32622`, `epsg:4326`, `CRS:84`, a bare code, or an OGC CRS URL.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("CRS:84") || trimmed == OGC_CRS84_URL {
            return Ok(Crs::Wgs84);
        }

        let code = if let Some(rest) = trimmed.strip_prefix(OGC_EPSG_URL_PREFIX) {
            rest
        } else if trimmed.len() > 5 && trimmed[..5].eq_ignore_ascii_case("EPSG:") {
            &trimmed[5..]
        } else {
            trimmed
        };

        code.parse::<u16>()
            .map(Crs::from_epsg)
            .map_err(|_| CrsParseError::UnsupportedCrs(s.to_string()))
    }
}

impl TryFrom<String> for Crs {
    type Error = CrsParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Crs> for String {
    fn from(crs: Crs) -> Self {
        crs.to_string()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CrsParseError {
    #[error("Unsupported CRS: {0}")]
    UnsupportedCrs(String),
}
