//! UTM zone selection and metric extents.

use imagery_common::{BoundingBox, Crs, ImageryResult};

use crate::transform::{project_bbox, project_point};

/// UTM zone for a bounding box, chosen from its center point.
pub fn utm_crs_for(bbox: &BoundingBox) -> ImageryResult<Crs> {
    if let Crs::Utm { .. } = bbox.crs {
        return Ok(bbox.crs);
    }

    let (cx, cy) = bbox.center();
    let (lon, lat) = project_point(bbox.crs, Crs::Wgs84, cx, cy)?;
    Ok(Crs::utm_for(lon, lat))
}

/// Project a box into its locally appropriate UTM zone.
pub fn to_utm_bbox(bbox: &BoundingBox) -> ImageryResult<BoundingBox> {
    let target = utm_crs_for(bbox)?;
    project_bbox(bbox, target)
}

/// Planar extents of a projected box.
///
/// `dx` is always the east-west width and `dy` the north-south height.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct Extents {
    pub dx: f64,
    pub dy: f64,
}

impl Extents {
    pub fn new(dx: f64, dy: f64) -> Self {
        Self { dx, dy }
    }

    /// Width and height of a box, in its own units.
    pub fn of(bbox: &BoundingBox) -> Self {
        Self {
            dx: (bbox.max_x - bbox.min_x).abs(),
            dy: (bbox.max_y - bbox.min_y).abs(),
        }
    }

    /// The same extents with axes swapped.
    pub fn transposed(&self) -> Self {
        Self {
            dx: self.dy,
            dy: self.dx,
        }
    }

    /// Rendered raster size at `resolution`, rounded to whole pixels (at least 1).
    pub fn pixel_dimensions(&self, resolution: f64) -> (u32, u32) {
        let width = (self.dx / resolution).round().max(1.0) as u32;
        let height = (self.dy / resolution).round().max(1.0) as u32;
        (width, height)
    }
}
