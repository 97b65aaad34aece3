//! Effective resolution and download strategy.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use imagery_common::{Axis, ImageryError, ImageryResult};
use projection::Extents;
use tracing::{info, warn};

/// Maximum raster width/height (pixels) the imagery service renders per request.
pub const MAX_TILE_PIXELS: u32 = 2500;

/// Upper bound (exclusive, meters) of the candidate resolution scan.
pub const MAX_CANDIDATE_RESOLUTION: u32 = 10_000;

/// How a query footprint is downloaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DownloadStrategy {
    /// One request per date covering the whole footprint.
    Direct,
    /// One request per date and split box, merged back per date.
    SplitAndMerge,
}

impl DownloadStrategy {
    /// Short code used in mosaic names and logs.
    pub fn code(&self) -> &'static str {
        match self {
            DownloadStrategy::Direct => "D",
            DownloadStrategy::SplitAndMerge => "SM",
        }
    }
}

impl fmt::Display for DownloadStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownloadStrategy::Direct => write!(f, "direct"),
            DownloadStrategy::SplitAndMerge => write!(f, "split-and-merge"),
        }
    }
}

impl FromStr for DownloadStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "d" | "direct" => Ok(DownloadStrategy::Direct),
            "sm" | "split-and-merge" | "split_and_merge" | "splitandmerge" => {
                Ok(DownloadStrategy::SplitAndMerge)
            }
            other => Err(format!("unknown download strategy: {}", other)),
        }
    }
}

/// Informational notices produced while correcting a resolution request.
///
/// Advisories never fail a query; they are logged and kept on the plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Advisory {
    /// The sensor family has no known native resolution; a fallback is used.
    UnknownSensorResolution { fallback: u32 },
    /// Direct download cannot render this fine; raised to the direct maximum.
    ClampedToDirectMaximum { requested: u32, max_resolution: u32 },
    /// Finer than the sensor delivers; raised to native resolution.
    ClampedToNative { requested: u32, native: u32 },
    /// The footprint fits one request at this resolution; no split needed.
    DemotedToDirect { resolution: u32, max_resolution: u32 },
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Advisory::UnknownSensorResolution { fallback } => write!(
                f,
                "sensor resolution not tabulated, starting from {} m",
                fallback
            ),
            Advisory::ClampedToDirectMaximum {
                requested,
                max_resolution,
            } => write!(
                f,
                "{} m is too fine for a direct download, using {} m (split-and-merge reaches full resolution)",
                requested, max_resolution
            ),
            Advisory::ClampedToNative { requested, native } => write!(
                f,
                "{} m is finer than the native {} m, using native resolution",
                requested, native
            ),
            Advisory::DemotedToDirect {
                resolution,
                max_resolution,
            } => write!(
                f,
                "split-and-merge not needed at {} m (direct reaches {} m), switching to direct",
                resolution, max_resolution
            ),
        }
    }
}

/// Inputs of the resolution planner.
#[derive(Debug, Clone, Copy)]
pub struct ResolutionRequest {
    /// Native ground sampling distance of the data source (meters).
    pub native: u32,
    /// User-requested resolution, if any.
    pub requested: Option<u32>,
    pub strategy: DownloadStrategy,
    /// Projected extents of the whole footprint.
    pub extents: Extents,
    pub max_tile_pixels: u32,
}

/// Final strategy and resolution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolutionDecision {
    pub strategy: DownloadStrategy,
    pub resolution: u32,
    /// Finest resolution a direct download can render for this footprint.
    pub max_resolution: u32,
    pub advisories: Vec<Advisory>,
}

/// Finest resolution at which the whole footprint renders in a single request.
///
/// Candidates are scanned upward from `native` in one-meter steps. A
/// candidate is feasible when the truncated pixel width and height are both
/// strictly below `cap`. The second feasible candidate is returned so the
/// request keeps a margin under the cap.
pub fn max_resolution_for_direct(native: u32, extents: Extents, cap: u32) -> ImageryResult<u32> {
    let cap = cap as u64;
    let mut first_x: Option<u32> = None;
    let mut first_y: Option<u32> = None;
    let mut feasible = 0;

    for candidate in native.max(1)..MAX_CANDIDATE_RESOLUTION {
        let pixels_x = (extents.dx / candidate as f64) as u64;
        let pixels_y = (extents.dy / candidate as f64) as u64;

        if pixels_x < cap && first_x.is_none() {
            first_x = Some(candidate);
        }
        if pixels_y < cap && first_y.is_none() {
            first_y = Some(candidate);
        }

        if pixels_x < cap && pixels_y < cap {
            feasible += 1;
            if feasible == 2 {
                return Ok(candidate);
            }
        }
    }

    let axis = match (first_x, first_y) {
        (None, Some(_)) => Axis::X,
        (Some(_), None) => Axis::Y,
        (Some(x), Some(y)) if x > y => Axis::X,
        (Some(x), Some(y)) if y > x => Axis::Y,
        _ => Axis::Both,
    };

    Err(ImageryError::ResolutionUnreachable {
        axis,
        limit: MAX_CANDIDATE_RESOLUTION,
    })
}

/// Apply the correction rules, in order:
///
/// 1. No resolution given: direct uses the direct maximum, split-and-merge
///    uses the native resolution.
/// 2. Direct finer than the direct maximum is raised to the maximum.
/// 3. Anything finer than native is raised to native.
/// 4. Split-and-merge at or above the direct maximum is demoted to direct,
///    since one request already covers the footprint.
///
/// Running the planner again on its own output yields the same decision.
pub fn plan_resolution(request: &ResolutionRequest) -> ImageryResult<ResolutionDecision> {
    if request.requested == Some(0) {
        return Err(ImageryError::InvalidResolution(
            "resolution must be a positive number of meters".to_string(),
        ));
    }

    let max_resolution =
        max_resolution_for_direct(request.native, request.extents, request.max_tile_pixels)?;

    let mut advisories = Vec::new();
    let mut strategy = request.strategy;

    // Provisional value until every rule has run
    let mut resolution = request.requested.unwrap_or(match strategy {
        DownloadStrategy::Direct => max_resolution,
        DownloadStrategy::SplitAndMerge => request.native,
    });

    if strategy == DownloadStrategy::Direct && resolution < max_resolution {
        advisories.push(Advisory::ClampedToDirectMaximum {
            requested: resolution,
            max_resolution,
        });
        resolution = max_resolution;
    }

    if resolution < request.native {
        advisories.push(Advisory::ClampedToNative {
            requested: resolution,
            native: request.native,
        });
        resolution = request.native;
    }

    if strategy == DownloadStrategy::SplitAndMerge && resolution >= max_resolution {
        advisories.push(Advisory::DemotedToDirect {
            resolution,
            max_resolution,
        });
        strategy = DownloadStrategy::Direct;
    }

    for advisory in &advisories {
        match advisory {
            Advisory::DemotedToDirect { .. } => info!(advisory = %advisory, "Strategy corrected"),
            _ => warn!(advisory = %advisory, "Resolution corrected"),
        }
    }

    Ok(ResolutionDecision {
        strategy,
        resolution,
        max_resolution,
        advisories,
    })
}
