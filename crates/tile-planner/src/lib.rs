//! Planning for tiled imagery downloads.
//!
//! The imagery service renders at most [`MAX_TILE_PIXELS`] pixels along
//! each axis. Given a query footprint and a ground resolution, this crate
//! decides the effective resolution and download strategy, splits the
//! footprint into cells that each render under the cap, and lays out the
//! date x cell download units plus the axis the executor should
//! parallelize on.
//!
//! Data flow: [`resolution`] -> [`splitter`] -> [`dispatch`], wired
//! together by [`plan::plan`].

pub mod dispatch;
pub mod plan;
pub mod resolution;
pub mod splitter;

pub use dispatch::{DispatchThresholds, DownloadUnit, ParallelAxis};
pub use plan::{PlannerConfig, PlanningResult, Query};
pub use resolution::{Advisory, DownloadStrategy, ResolutionDecision, MAX_TILE_PIXELS};
pub use splitter::{GridShape, SplitBox};
