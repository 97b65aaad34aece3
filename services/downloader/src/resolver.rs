//! Output resolver: moves raw responses to their canonical names.
//!
//! The (date, split box) of a response is recovered from the request
//! record stored next to it, never from the order in which responses
//! arrived.

use std::collections::HashSet;
use std::path::Path;

use chrono::NaiveDate;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use imagery_common::{ImageryResult, RenamedFile};
use tile_planner::{PlanningResult, SplitBox};

use crate::artifact::RawArtifact;

/// Coordinates of a recorded footprint and its split box must agree this closely.
const GEOMETRY_TOLERANCE: f64 = 1e-6;

/// Renamed files and the artifacts that could not be resolved.
#[derive(Debug, Default)]
pub struct ResolveOutcome {
    pub renamed: Vec<RenamedFile>,
    pub failures: Vec<imagery_common::ImageryError>,
}

/// Complete scratch directories directly under `store`.
pub fn discover_artifacts(store: &Path) -> Vec<RawArtifact> {
    let mut artifacts: Vec<RawArtifact> = scratch_dirs(store)
        .into_iter()
        .map(|dir| RawArtifact { dir })
        .filter(RawArtifact::is_complete)
        .collect();
    artifacts.sort();
    artifacts
}

fn scratch_dirs(store: &Path) -> Vec<std::path::PathBuf> {
    WalkDir::new(store)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_dir())
        .filter(|entry| is_scratch_name(&entry.file_name().to_string_lossy()))
        .map(|entry| entry.into_path())
        .collect()
}

/// Scratch directories are named by a hex SHA-256.
fn is_scratch_name(name: &str) -> bool {
    name.len() == 64 && name.chars().all(|c| c.is_ascii_hexdigit())
}

/// Remove scratch directories left incomplete by an interrupted run.
pub fn purge_incomplete(store: &Path) -> usize {
    let mut removed = 0;
    for dir in scratch_dirs(store) {
        let artifact = RawArtifact { dir };
        if artifact.is_complete() {
            continue;
        }
        match std::fs::remove_dir_all(&artifact.dir) {
            Ok(()) => removed += 1,
            Err(e) => warn!(dir = %artifact.dir.display(), error = %e, "Failed to remove scratch directory"),
        }
    }
    if removed > 0 {
        debug!(removed, "Purged incomplete scratch directories");
    }
    removed
}

/// Resolve artifacts against a plan and move them into `out_dir`.
///
/// Each artifact is matched by the footprint in its request record; an
/// artifact whose record is unreadable, or whose footprint or date is not
/// part of the plan, fails on its own without affecting the others.
pub fn resolve_artifacts<'a>(
    artifacts: impl IntoIterator<Item = &'a RawArtifact>,
    plan: &PlanningResult,
    out_dir: &Path,
) -> ResolveOutcome {
    let mut outcome = ResolveOutcome::default();
    let mut seen: HashSet<(NaiveDate, usize)> = HashSet::new();

    for artifact in artifacts {
        match resolve_one(artifact, plan, out_dir, &mut seen) {
            Ok(file) => outcome.renamed.push(file),
            Err(e) => {
                warn!(error = %e, "Artifact not resolved");
                outcome.failures.push(e);
            }
        }
    }

    outcome
        .renamed
        .sort_by(|a, b| (a.acquisition_date, a.split_box_id).cmp(&(b.acquisition_date, b.split_box_id)));
    info!(
        renamed = outcome.renamed.len(),
        unresolved = outcome.failures.len(),
        "Artifacts resolved"
    );
    outcome
}

fn resolve_one(
    artifact: &RawArtifact,
    plan: &PlanningResult,
    out_dir: &Path,
    seen: &mut HashSet<(NaiveDate, usize)>,
) -> ImageryResult<RenamedFile> {
    let descriptor = artifact.descriptor()?;

    let split_box = match_split_box(&plan.split_boxes, &descriptor.geometry)
        .ok_or_else(|| artifact.unresolvable(format!("footprint {} matches no split box", descriptor.geometry)))?;
    if !plan.dates.contains(&descriptor.date) {
        return Err(artifact.unresolvable(format!("date {} was not requested", descriptor.date)));
    }
    if !seen.insert((descriptor.date, split_box.id)) {
        return Err(artifact.unresolvable(format!(
            "duplicate response for {} box {}",
            descriptor.date, split_box.id
        )));
    }

    let split_box_id = plan.is_split().then_some(split_box.id);
    let source = plan.query.collection.name();
    let target = out_dir.join(RenamedFile::canonical_name(descriptor.date, split_box_id, source));

    std::fs::create_dir_all(out_dir)?;
    move_file(&artifact.response_path(), &target)?;
    if let Err(e) = std::fs::remove_dir_all(&artifact.dir) {
        warn!(dir = %artifact.dir.display(), error = %e, "Failed to remove scratch directory");
    }

    debug!(date = %descriptor.date, box_id = split_box.id, path = %target.display(), "Renamed");
    Ok(RenamedFile {
        path: target,
        acquisition_date: descriptor.date,
        split_box_id,
        data_source: source.to_string(),
    })
}

/// The split box whose geometry equals `geometry`.
pub fn match_split_box<'a>(boxes: &'a [SplitBox], geometry: &imagery_common::BoundingBox) -> Option<&'a SplitBox> {
    boxes
        .iter()
        .find(|b| b.geometry.approx_eq(geometry, GEOMETRY_TOLERANCE))
}

/// Rename, falling back to copy and delete across filesystems.
fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    if std::fs::rename(from, to).is_err() {
        std::fs::copy(from, to)?;
        std::fs::remove_file(from)?;
    }
    Ok(())
}
