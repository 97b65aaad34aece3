//! Coordinate reference system transformations.
//!
//! Point and box transforms are delegated to `proj4rs` with definitions from
//! the `crs-definitions` database; this crate only adds the box semantics the
//! planner needs (corner projection, UTM zone choice, metric extents).

pub mod transform;
pub mod utm;

pub use transform::{project_bbox, project_point};
pub use utm::{to_utm_bbox, utm_crs_for, Extents};
