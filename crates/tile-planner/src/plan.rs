//! Query planning: wires the projector, resolution planner, splitter and
//! dispatcher into one immutable [`PlanningResult`].

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{info, warn};

use imagery_common::{
    collection::FALLBACK_RESOLUTION, BoundingBox, DataCollection, ImageryResult, RasterCompression,
    TimeInterval,
};
use projection::{to_utm_bbox, Extents};

use crate::dispatch::{build_units, choose_axis, DispatchThresholds, DownloadUnit, ParallelAxis};
use crate::resolution::{
    plan_resolution, Advisory, DownloadStrategy, ResolutionRequest, MAX_TILE_PIXELS,
};
use crate::splitter::{direct_box, split, GridShape, SplitBox};

/// One download query as configured by the user.
///
/// Read-only once built; planning returns a corrected copy in
/// [`PlanningResult::query`] instead of mutating it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    /// Footprint in geographic coordinates.
    pub bbox: BoundingBox,
    pub area_name: Option<String>,
    pub time_interval: TimeInterval,
    pub collection: DataCollection,
    /// Requested ground resolution in meters.
    pub resolution: Option<u32>,
    pub strategy: DownloadStrategy,
    /// Worker pool size override.
    pub workers: Option<usize>,
    pub sequential: bool,
    pub store_dir: PathBuf,
    pub evalscript: Option<String>,
    pub compression: Option<RasterCompression>,
    /// Delete per-box rasters once merged.
    pub remove_split_boxes: bool,
}

impl Query {
    /// Query with split-and-merge at default resolution.
    pub fn new(bbox: BoundingBox, time_interval: TimeInterval, collection: DataCollection) -> Self {
        Self {
            bbox,
            area_name: None,
            time_interval,
            collection,
            resolution: None,
            strategy: DownloadStrategy::SplitAndMerge,
            workers: None,
            sequential: false,
            store_dir: PathBuf::from("."),
            evalscript: None,
            compression: None,
            remove_split_boxes: true,
        }
    }

    /// Acquisition dates of the query relative to `today`.
    pub fn expand_dates(&self, today: NaiveDate) -> ImageryResult<Vec<NaiveDate>> {
        self.time_interval.acquisition_dates(today)
    }
}

/// Service limits and scheduling thresholds used by the planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannerConfig {
    pub max_tile_pixels: u32,
    pub thresholds: DispatchThresholds,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_tile_pixels: MAX_TILE_PIXELS,
            thresholds: DispatchThresholds::default(),
        }
    }
}

/// Everything later stages need, computed once per query.
#[derive(Debug, Clone, Serialize)]
pub struct PlanningResult {
    /// The query with resolution and strategy set to their final values.
    pub query: Query,
    /// Footprint in its local UTM zone.
    pub projected_bbox: BoundingBox,
    pub extents: Extents,
    pub native_resolution: u32,
    pub max_resolution: u32,
    pub resolution: u32,
    pub strategy: DownloadStrategy,
    pub grid: GridShape,
    pub split_boxes: Vec<SplitBox>,
    pub dates: Vec<NaiveDate>,
    pub units: Vec<DownloadUnit>,
    pub axis: ParallelAxis,
    pub advisories: Vec<Advisory>,
}

impl PlanningResult {
    /// Whether outputs are named and merged per split box.
    pub fn is_split(&self) -> bool {
        self.strategy == DownloadStrategy::SplitAndMerge
    }
}

/// Plan a query over the given acquisition dates.
///
/// Any error returned here is fatal to the query; nothing has been
/// requested from the service yet.
pub fn plan(query: &Query, dates: &[NaiveDate], config: &PlannerConfig) -> ImageryResult<PlanningResult> {
    let bbox = query.bbox.validated()?;
    let projected_bbox = to_utm_bbox(&bbox)?;
    let extents = Extents::of(&projected_bbox);

    let mut advisories = Vec::new();
    let native_resolution = match query.collection.known_native_resolution() {
        Some(native) => native,
        None => {
            let advisory = Advisory::UnknownSensorResolution {
                fallback: FALLBACK_RESOLUTION,
            };
            warn!(collection = %query.collection, advisory = %advisory, "Resolution corrected");
            advisories.push(advisory);
            FALLBACK_RESOLUTION
        }
    };

    let decision = plan_resolution(&ResolutionRequest {
        native: native_resolution,
        requested: query.resolution,
        strategy: query.strategy,
        extents,
        max_tile_pixels: config.max_tile_pixels,
    })?;
    advisories.extend(decision.advisories.iter().cloned());

    let (grid, split_boxes) = match decision.strategy {
        DownloadStrategy::SplitAndMerge => {
            split(&projected_bbox, decision.resolution, config.max_tile_pixels)?
        }
        DownloadStrategy::Direct => (GridShape::SINGLE, direct_box(&bbox)),
    };

    let units = build_units(dates, &split_boxes, decision.resolution)?;
    let axis = if query.sequential {
        ParallelAxis::Sequential
    } else {
        choose_axis(dates.len(), split_boxes.len(), decision.strategy, &config.thresholds)
    };

    info!(
        collection = %query.collection,
        crs = %projected_bbox.crs,
        strategy = %decision.strategy,
        resolution = decision.resolution,
        max_resolution = decision.max_resolution,
        boxes = split_boxes.len(),
        dates = dates.len(),
        axis = %axis,
        "Query planned"
    );

    let mut corrected = query.clone();
    corrected.resolution = Some(decision.resolution);
    corrected.strategy = decision.strategy;

    Ok(PlanningResult {
        query: corrected,
        projected_bbox,
        extents,
        native_resolution,
        max_resolution: decision.max_resolution,
        resolution: decision.resolution,
        strategy: decision.strategy,
        grid,
        split_boxes,
        dates: dates.to_vec(),
        units,
        axis,
        advisories,
    })
}
