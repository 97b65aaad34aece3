//! Download units and the choice of parallel axis.
//!
//! The axis only affects scheduling. Every lane layout covers the same
//! date x box cross product, so sequential and parallel runs request
//! exactly the same units.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use imagery_common::ImageryResult;
use projection::{to_utm_bbox, Extents};

use crate::resolution::DownloadStrategy;
use crate::splitter::SplitBox;

/// Tunable thresholds of the parallel axis heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchThresholds {
    /// Parallelize on dates when there are more dates than this.
    pub date_axis_min: usize,
}

impl Default for DispatchThresholds {
    fn default() -> Self {
        Self { date_axis_min: 5 }
    }
}

/// Axis of the date x box cross product distributed over workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParallelAxis {
    /// One lane per date; each lane walks all boxes.
    Dates,
    /// One lane per box; each lane walks all dates.
    SplitBoxes,
    /// A single lane.
    Sequential,
}

impl fmt::Display for ParallelAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParallelAxis::Dates => write!(f, "dates"),
            ParallelAxis::SplitBoxes => write!(f, "split boxes"),
            ParallelAxis::Sequential => write!(f, "sequential"),
        }
    }
}

/// One (date, split box) request with its rendered raster size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DownloadUnit {
    pub date: NaiveDate,
    pub split_box: SplitBox,
    pub width: u32,
    pub height: u32,
}

impl DownloadUnit {
    /// Correlation key of the unit's output.
    pub fn key(&self) -> (NaiveDate, usize) {
        (self.date, self.split_box.id)
    }
}

/// Pick the parallel axis for a batch.
pub fn choose_axis(
    n_dates: usize,
    n_boxes: usize,
    strategy: DownloadStrategy,
    thresholds: &DispatchThresholds,
) -> ParallelAxis {
    if n_dates <= 1 && n_boxes <= 1 {
        ParallelAxis::Sequential
    } else if n_dates > thresholds.date_axis_min || strategy == DownloadStrategy::Direct {
        ParallelAxis::Dates
    } else if n_boxes > 1 {
        ParallelAxis::SplitBoxes
    } else {
        ParallelAxis::Dates
    }
}

/// Metric extents of a box, projecting geographic boxes to UTM first.
fn metric_extents(split_box: &SplitBox) -> ImageryResult<Extents> {
    if split_box.geometry.crs.is_geographic() {
        Ok(Extents::of(&to_utm_bbox(&split_box.geometry)?))
    } else {
        Ok(Extents::of(&split_box.geometry))
    }
}

/// Date-major cross product of dates and boxes.
pub fn build_units(
    dates: &[NaiveDate],
    boxes: &[SplitBox],
    resolution: u32,
) -> ImageryResult<Vec<DownloadUnit>> {
    let sizes = boxes
        .iter()
        .map(|b| metric_extents(b).map(|e| e.pixel_dimensions(resolution as f64)))
        .collect::<ImageryResult<Vec<_>>>()?;

    let mut units = Vec::with_capacity(dates.len() * boxes.len());
    for date in dates {
        for (split_box, (width, height)) in boxes.iter().zip(&sizes) {
            units.push(DownloadUnit {
                date: *date,
                split_box: *split_box,
                width: *width,
                height: *height,
            });
        }
    }
    Ok(units)
}

/// Group units into lanes along `axis`.
///
/// Lanes keep the relative order of `units`; empty input gives no lanes.
pub fn partition_lanes(units: &[DownloadUnit], axis: ParallelAxis) -> Vec<Vec<DownloadUnit>> {
    if units.is_empty() {
        return Vec::new();
    }

    match axis {
        ParallelAxis::Sequential => vec![units.to_vec()],
        ParallelAxis::Dates => group_by(units, |u| u.date),
        ParallelAxis::SplitBoxes => {
            let mut lanes = group_by(units, |u| u.split_box.id);
            for lane in &mut lanes {
                lane.sort_by_key(|u| u.date);
            }
            lanes
        }
    }
}

fn group_by<K, F>(units: &[DownloadUnit], key: F) -> Vec<Vec<DownloadUnit>>
where
    K: Ord,
    F: Fn(&DownloadUnit) -> K,
{
    let mut lanes: std::collections::BTreeMap<K, Vec<DownloadUnit>> = Default::default();
    for unit in units {
        lanes.entry(key(unit)).or_default().push(*unit);
    }
    lanes.into_values().collect()
}
