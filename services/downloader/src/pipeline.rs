//! Execution of a planned query: fetch, resolve, merge, report.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{error, info, instrument, warn};

use imagery_common::{ImageryError, ImageryResult, RenamedFile};
use mosaic::{merge_by_date, MergeOptions};
use tile_planner::{dispatch::partition_lanes, PlanningResult};

use crate::client::ImageryClient;
use crate::executor::{ExecutorConfig, FetchExecutor};
use crate::manifest::{EmptyUnit, FailureRecord, MosaicRecord, RunManifest, Stage};
use crate::resolver::{purge_incomplete, resolve_artifacts};

/// Runs planned queries against one imagery client.
pub struct Pipeline {
    client: Arc<dyn ImageryClient>,
    executor: ExecutorConfig,
}

impl Pipeline {
    /// `executor.store_dir` is replaced by each query's store directory.
    pub fn new(client: Arc<dyn ImageryClient>, executor: ExecutorConfig) -> Self {
        Self { client, executor }
    }

    /// Execute a plan and write its manifest into the store directory.
    ///
    /// Unit, artifact and date failures are recorded in the returned
    /// manifest; only failing to write the manifest is an error.
    #[instrument(skip_all, fields(strategy = %plan.strategy, resolution = plan.resolution, units = plan.units.len()))]
    pub async fn run(&self, plan: &PlanningResult, evalscript: &str) -> ImageryResult<RunManifest> {
        let query = &plan.query;
        let store_dir = query.store_dir.clone();
        std::fs::create_dir_all(&store_dir)?;

        let mut manifest = RunManifest::start(query.collection.name(), plan.strategy, plan.resolution);

        // Fetch
        let mut config = self.executor.clone();
        config.store_dir = store_dir.clone();
        if let Some(workers) = query.workers {
            config.workers = workers.max(1);
        }
        let executor = FetchExecutor::new(self.client.clone(), config);
        let lanes = partition_lanes(&plan.units, plan.axis);
        let results = executor.execute(lanes, query.collection, evalscript).await;

        manifest.empty = results
            .empty
            .iter()
            .map(|(date, box_id)| EmptyUnit {
                date: *date,
                box_id: *box_id,
            })
            .collect();
        for failure in &results.failures {
            manifest.failures.push(FailureRecord::new(
                Stage::Fetch,
                Some(failure.date),
                Some(failure.box_id),
                &failure.error,
            ));
        }

        // Resolve
        let keys_by_dir: HashMap<PathBuf, (NaiveDate, usize)> = results
            .artifacts
            .iter()
            .map(|(key, artifact)| (artifact.dir.clone(), *key))
            .collect();
        let resolved = resolve_artifacts(results.artifacts.values(), plan, &store_dir);
        for failure in &resolved.failures {
            let key = match failure {
                ImageryError::UnresolvableArtifact { path, .. } => keys_by_dir.get(path).copied(),
                _ => None,
            };
            manifest.failures.push(FailureRecord::new(
                Stage::Resolve,
                key.map(|k| k.0),
                key.map(|k| k.1),
                failure,
            ));
        }
        purge_incomplete(&store_dir);

        // Merge
        if plan.is_split() {
            let options = MergeOptions {
                compression: query.compression,
                remove_tiles: query.remove_split_boxes,
            };
            let outcomes = merge_in_background(resolved.renamed.clone(), store_dir.clone(), options).await?;
            for outcome in outcomes {
                match outcome {
                    Ok(mosaic) => manifest.mosaics.push(MosaicRecord {
                        date: mosaic.date,
                        path: mosaic.path,
                        tiles: mosaic.tiles,
                    }),
                    Err(e) => {
                        error!(error = %e, "Merge failed");
                        let date = match &e {
                            ImageryError::MergeFailed { date, .. } => Some(*date),
                            _ => None,
                        };
                        manifest.failures.push(FailureRecord::new(Stage::Merge, date, None, &e));
                    }
                }
            }
        }
        // Merged tiles may have been removed
        manifest.files = resolved
            .renamed
            .into_iter()
            .filter(|file| file.path.exists())
            .collect();

        manifest.finish();
        let path = manifest.write(&store_dir)?;
        if manifest.is_clean() {
            info!(manifest = %path.display(), files = manifest.files.len(), mosaics = manifest.mosaics.len(), "Run complete");
        } else {
            warn!(
                manifest = %path.display(),
                failures = manifest.failures.len(),
                "Run complete with failures"
            );
        }
        Ok(manifest)
    }
}

/// Merge on the blocking pool; compositing itself is parallel.
async fn merge_in_background(
    files: Vec<RenamedFile>,
    out_dir: PathBuf,
    options: MergeOptions,
) -> ImageryResult<Vec<mosaic::merge::DateMergeOutcome>> {
    tokio::task::spawn_blocking(move || merge_by_date(&files, &out_dir, &options))
        .await
        .map_err(|e| ImageryError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))
}
