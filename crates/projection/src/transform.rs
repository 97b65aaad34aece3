//! Point and bounding box transforms between EPSG-coded systems.

use imagery_common::{BoundingBox, Crs, ImageryError, ImageryResult};
use proj4rs::proj::Proj;
use proj4rs::transform::transform;
use tracing::debug;

/// PROJ4 definition for a CRS.
///
/// Looked up in the crs-definitions database; UTM zones and WGS84 have a
/// built-in fallback so they never depend on the database contents.
pub fn proj_string(crs: Crs) -> ImageryResult<String> {
    if let Some(def) = crs_definitions::from_code(crs.epsg()) {
        return Ok(def.proj4.to_string());
    }

    match crs {
        Crs::Wgs84 => Ok("+proj=longlat +datum=WGS84 +no_defs".to_string()),
        Crs::Utm { zone, north } => Ok(format!(
            "+proj=utm +zone={}{} +datum=WGS84 +units=m +no_defs",
            zone,
            if north { "" } else { " +south" }
        )),
        Crs::Epsg(code) => Err(ImageryError::Projection(format!(
            "EPSG:{} is not in the crs-definitions database",
            code
        ))),
    }
}

fn is_longlat(definition: &str) -> bool {
    definition.contains("+proj=longlat") || definition.contains("+proj=latlong")
}

/// Project a single point from `source` to `target`.
///
/// Geographic coordinates are in degrees on both sides.
pub fn project_point(source: Crs, target: Crs, x: f64, y: f64) -> ImageryResult<(f64, f64)> {
    // No-op if same CRS
    if source == target {
        return Ok((x, y));
    }

    let source_def = proj_string(source)?;
    let target_def = proj_string(target)?;

    let source_proj = Proj::from_proj_string(&source_def)
        .map_err(|e| ImageryError::Projection(format!("invalid source {}: {:?}", source, e)))?;
    let target_proj = Proj::from_proj_string(&target_def)
        .map_err(|e| ImageryError::Projection(format!("invalid target {}: {:?}", target, e)))?;

    // proj4rs uses radians for geographic coordinates
    let mut point = if is_longlat(&source_def) {
        (x.to_radians(), y.to_radians(), 0.0)
    } else {
        (x, y, 0.0)
    };

    transform(&source_proj, &target_proj, &mut point).map_err(|e| {
        ImageryError::Projection(format!("{} -> {} failed: {:?}", source, target, e))
    })?;

    let (out_x, out_y) = if is_longlat(&target_def) {
        (point.0.to_degrees(), point.1.to_degrees())
    } else {
        (point.0, point.1)
    };

    if !out_x.is_finite() || !out_y.is_finite() {
        return Err(ImageryError::Projection(format!(
            "({}, {}) has no finite image from {} to {}",
            x, y, source, target
        )));
    }

    Ok((out_x, out_y))
}

/// Project a bounding box into `target` by transforming its lower-left and
/// upper-right corners.
///
/// The input is never modified. Projecting a box that is already in
/// `target` returns an identical copy, so the operation is idempotent.
pub fn project_bbox(bbox: &BoundingBox, target: Crs) -> ImageryResult<BoundingBox> {
    if bbox.crs == target {
        return Ok(*bbox);
    }

    let (x0, y0) = project_point(bbox.crs, target, bbox.min_x, bbox.min_y)?;
    let (x1, y1) = project_point(bbox.crs, target, bbox.max_x, bbox.max_y)?;

    let projected = BoundingBox::new(x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1), target);
    debug!(from = %bbox, to = %projected, "Projected bounding box");

    projected
        .validated()
        .map_err(|e| ImageryError::Projection(e.to_string()))
}
