//! Named study areas stored as GeoJSON files.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;

use imagery_common::BoundingBox;

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    properties: Properties,
    geometry: Geometry,
}

#[derive(Debug, Deserialize)]
struct Properties {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    /// Polygon rings; only the exterior ring is used.
    coordinates: Vec<Vec<[f64; 2]>>,
}

/// An area found in the geometry directory.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedArea {
    pub name: String,
    pub bbox: BoundingBox,
    pub source: PathBuf,
}

/// Name and bounding box of the first feature of a GeoJSON document.
fn parse_area(content: &str) -> Result<(String, BoundingBox)> {
    let collection: FeatureCollection = serde_json::from_str(content).context("Invalid GeoJSON")?;
    let feature = collection.features.first().context("GeoJSON has no features")?;
    let ring = feature
        .geometry
        .coordinates
        .first()
        .filter(|ring| !ring.is_empty())
        .context("Feature has no exterior ring")?;

    let mut bounds = [f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY];
    for [x, y] in ring.iter().filter(|[x, y]| x.is_finite() && y.is_finite()) {
        bounds[0] = bounds[0].min(*x);
        bounds[1] = bounds[1].min(*y);
        bounds[2] = bounds[2].max(*x);
        bounds[3] = bounds[3].max(*y);
    }

    let bbox = BoundingBox::geographic(bounds[0], bounds[1], bounds[2], bounds[3])
        .with_context(|| format!("Area {} has a degenerate footprint", feature.properties.name))?;
    Ok((feature.properties.name.clone(), bbox))
}

/// Find the area called `name` among the `*.geojson` files of `dir`.
pub fn lookup_area(dir: &Path, name: &str) -> Result<NamedArea> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read geometry directory: {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().and_then(|e| e.to_str()) == Some("geojson"))
        .collect();
    files.sort();

    for path in files {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        match parse_area(&content) {
            Ok((area_name, bbox)) if area_name == name => {
                debug!(area = %name, path = %path.display(), bbox = %bbox, "Area found");
                return Ok(NamedArea {
                    name: area_name,
                    bbox,
                    source: path,
                });
            }
            Ok(_) => {}
            Err(e) => debug!(path = %path.display(), error = %e, "Skipping unreadable area file"),
        }
    }

    anyhow::bail!("Area {} not found in {}", name, dir.display())
}
