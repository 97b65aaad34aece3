//! Data collections known to the imagery service.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ImageryError;

const SERVICES_URL: &str = "https://services.sentinel-hub.com";
const SERVICES_USWEST_URL: &str = "https://services-uswest2.sentinel-hub.com";
const CREODIAS_URL: &str = "https://creodias.sentinel-hub.com";

/// Native resolution used when the satellite family is not in the table.
pub const FALLBACK_RESOLUTION: u32 = 1000;

/// A data collection: source identifier, service data type and deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "String")]
pub struct DataCollection {
    name: &'static str,
    api_type: &'static str,
    service_url: &'static str,
}

const COLLECTIONS: &[DataCollection] = &[
    DataCollection::define("SENTINEL2_L1C", "sentinel-2-l1c", SERVICES_URL),
    DataCollection::define("SENTINEL2_L2A", "sentinel-2-l2a", SERVICES_URL),
    DataCollection::define("SENTINEL1_IW", "sentinel-1-grd", SERVICES_URL),
    DataCollection::define("SENTINEL3_OLCI", "sentinel-3-olci", CREODIAS_URL),
    DataCollection::define("SENTINEL3_SLSTR", "sentinel-3-slstr", CREODIAS_URL),
    DataCollection::define("LANDSAT_OT_L1", "landsat-ot-l1", SERVICES_USWEST_URL),
    DataCollection::define("LANDSAT_OT_L2", "landsat-ot-l2", SERVICES_USWEST_URL),
    DataCollection::define("MODIS", "modis", SERVICES_USWEST_URL),
    DataCollection::define("DEM", "dem", SERVICES_URL),
];

impl DataCollection {
    const fn define(name: &'static str, api_type: &'static str, service_url: &'static str) -> Self {
        Self {
            name,
            api_type,
            service_url,
        }
    }

    /// All collections in the table.
    pub fn all() -> &'static [DataCollection] {
        COLLECTIONS
    }

    /// Look up a collection by name (case-insensitive).
    pub fn from_name(name: &str) -> Result<Self, ImageryError> {
        COLLECTIONS
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name.trim()))
            .copied()
            .ok_or_else(|| ImageryError::UnknownCollection(name.to_string()))
    }

    /// Identifier used in output file names, e.g. `SENTINEL2_L2A`.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Data type in service request payloads, e.g. `sentinel-2-l2a`.
    pub fn api_type(&self) -> &'static str {
        self.api_type
    }

    /// Base URL of the deployment serving this collection.
    pub fn service_url(&self) -> &'static str {
        self.service_url
    }

    /// Satellite family: the name up to the first underscore.
    pub fn satellite(&self) -> &'static str {
        self.name.split('_').next().unwrap_or(self.name)
    }

    /// Finest ground sampling distance (meters) of the family, if known.
    pub fn known_native_resolution(&self) -> Option<u32> {
        match self.satellite() {
            "SENTINEL1" => Some(5),
            "SENTINEL2" => Some(10),
            "SENTINEL3" => Some(300),
            "LANDSAT" => Some(15),
            _ => None,
        }
    }

    /// Native resolution, falling back to 1 km for unknown families.
    pub fn native_resolution(&self) -> u32 {
        self.known_native_resolution().unwrap_or(FALLBACK_RESOLUTION)
    }
}

impl fmt::Display for DataCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl FromStr for DataCollection {
    type Err = ImageryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s)
    }
}

impl TryFrom<String> for DataCollection {
    type Error = ImageryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_name(&value)
    }
}

// Equivalent to `#[serde(try_from = "String")]`; written by hand because the
// derive ties `'de` to the `&'static str` fields.
impl<'de> Deserialize<'de> for DataCollection {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Self::try_from(value).map_err(serde::de::Error::custom)
    }
}

impl From<DataCollection> for String {
    fn from(collection: DataCollection) -> Self {
        collection.name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_name() {
        let s2 = DataCollection::from_name("sentinel2_l2a").unwrap();
        assert_eq!(s2.name(), "SENTINEL2_L2A");
        assert_eq!(s2.api_type(), "sentinel-2-l2a");
        assert_eq!(s2.satellite(), "SENTINEL2");
    }

    #[test]
    fn test_unknown_collection() {
        assert!(matches!(
            DataCollection::from_name("HIMAWARI"),
            Err(ImageryError::UnknownCollection(_))
        ));
    }

    #[test]
    fn test_native_resolution_by_family() {
        let expected = [
            ("SENTINEL1_IW", 5),
            ("SENTINEL2_L1C", 10),
            ("SENTINEL3_OLCI", 300),
            ("LANDSAT_OT_L2", 15),
            ("MODIS", FALLBACK_RESOLUTION),
            ("DEM", FALLBACK_RESOLUTION),
        ];
        for (name, resolution) in expected {
            let collection = DataCollection::from_name(name).unwrap();
            assert_eq!(collection.native_resolution(), resolution, "{}", name);
        }
        assert!(DataCollection::from_name("MODIS")
            .unwrap()
            .known_native_resolution()
            .is_none());
    }
}
