//! Split a projected footprint into cells that render under the pixel cap.

use serde::{Deserialize, Serialize};

use imagery_common::{Axis, BoundingBox, ImageryError, ImageryResult};
use projection::Extents;
use tracing::info;

/// Upper bound (exclusive) of the split count scan along each axis.
pub const MAX_SPLIT_COUNT: u32 = 100;

/// Number of cells along each axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridShape {
    pub nx: u32,
    pub ny: u32,
}

impl GridShape {
    /// The single-cell grid of a direct download.
    pub const SINGLE: GridShape = GridShape { nx: 1, ny: 1 };

    pub fn count(&self) -> usize {
        self.nx as usize * self.ny as usize
    }
}

/// One cell of the tiling grid.
///
/// `id` is assigned once, when the grid is built, and is the only key
/// used to correlate a rendered raster with its cell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitBox {
    pub id: usize,
    pub geometry: BoundingBox,
}

/// Smallest split count along one axis such that each cell renders within `cap`.
fn min_splits(extent: f64, resolution: f64, cap: u32, axis: Axis) -> ImageryResult<u32> {
    (2..MAX_SPLIT_COUNT)
        .find(|n| (extent / *n as f64) / resolution <= cap as f64)
        .ok_or(ImageryError::SplitBoundsExceeded {
            axis,
            limit: MAX_SPLIT_COUNT,
        })
}

/// Minimal grid for the given extents. The two axes are chosen independently.
pub fn optimal_grid(extents: Extents, resolution: u32, cap: u32) -> ImageryResult<GridShape> {
    let resolution = resolution as f64;
    let nx = min_splits(extents.dx, resolution, cap, Axis::X);
    let ny = min_splits(extents.dy, resolution, cap, Axis::Y);

    match (nx, ny) {
        (Ok(nx), Ok(ny)) => Ok(GridShape { nx, ny }),
        (Err(_), Err(_)) => Err(ImageryError::SplitBoundsExceeded {
            axis: Axis::Both,
            limit: MAX_SPLIT_COUNT,
        }),
        (Err(e), _) | (_, Err(e)) => Err(e),
    }
}

/// Cell edges along one axis. The last edge is `max` exactly so that the
/// cells cover the whole interval without floating point drift.
fn edges(min: f64, max: f64, n: u32) -> Vec<f64> {
    let extent = max - min;
    let mut edges: Vec<f64> = (0..n)
        .map(|i| min + extent * i as f64 / n as f64)
        .collect();
    edges.push(max);
    edges
}

/// Partition a box into an `nx` x `ny` grid of axis-aligned cells.
///
/// Ids are zero-based, row-major, starting with the northernmost row and
/// going west to east within a row, the same order as raster pixels.
/// Adjacent cells share their edge coordinates bit for bit.
pub fn split_bbox(bbox: &BoundingBox, shape: GridShape) -> Vec<SplitBox> {
    let xs = edges(bbox.min_x, bbox.max_x, shape.nx);
    let ys = edges(bbox.min_y, bbox.max_y, shape.ny);

    let mut boxes = Vec::with_capacity(shape.count());
    for row in 0..shape.ny as usize {
        // Row 0 is the top (max_y) row
        let top = ys[shape.ny as usize - row];
        let bottom = ys[shape.ny as usize - row - 1];
        for col in 0..shape.nx as usize {
            boxes.push(SplitBox {
                id: boxes.len(),
                geometry: BoundingBox::new(xs[col], bottom, xs[col + 1], top, bbox.crs),
            });
        }
    }
    boxes
}

/// Split a projected footprint so that every cell renders within `cap`
/// pixels per axis at `resolution`.
pub fn split(projected: &BoundingBox, resolution: u32, cap: u32) -> ImageryResult<(GridShape, Vec<SplitBox>)> {
    let shape = optimal_grid(Extents::of(projected), resolution, cap)?;
    info!(nx = shape.nx, ny = shape.ny, "Bounding box split into grid");
    Ok((shape, split_bbox(projected, shape)))
}

/// The single cell of a direct download: the original geographic box.
pub fn direct_box(original: &BoundingBox) -> Vec<SplitBox> {
    vec![SplitBox {
        id: 0,
        geometry: *original,
    }]
}
