//! Fetch executor: runs download units through the imagery client.
//!
//! Lanes from the dispatcher run concurrently on a bounded pool; units
//! within a lane run one after the other with a pause between requests.
//! A failing unit is recorded and skipped, never fatal to the batch.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use tracing::{debug, info, instrument, warn};

use imagery_common::{DataCollection, ImageryError, ImageryResult};
use tile_planner::DownloadUnit;

use crate::artifact::RawArtifact;
use crate::client::{ImageryClient, ProcessRequest};

/// Workers kept free for the rest of the system.
const RESERVED_CORES: usize = 2;

/// Pool size from available parallelism, never below one.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .saturating_sub(RESERVED_CORES)
        .max(1)
}

/// Executor settings.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub store_dir: PathBuf,
    pub workers: usize,
    /// Ceiling on one request, retries included.
    pub request_timeout: Duration,
    /// Pause between consecutive requests of one lane.
    pub sleep_between_requests: Duration,
    /// Request units again even if their scratch directory is complete.
    pub overwrite: bool,
}

impl ExecutorConfig {
    pub fn new(store_dir: impl Into<PathBuf>) -> Self {
        Self {
            store_dir: store_dir.into(),
            workers: default_workers(),
            request_timeout: Duration::from_secs(300),
            sleep_between_requests: Duration::from_secs(20),
            overwrite: false,
        }
    }
}

/// What happened to one unit.
#[derive(Debug)]
pub enum UnitOutcome {
    Fetched(RawArtifact),
    /// A complete scratch directory was already there.
    Reused(RawArtifact),
    /// The service returned a raster without any valid pixel.
    Empty,
    Failed(ImageryError),
}

/// A unit that produced no artifact because of an error.
#[derive(Debug)]
pub struct UnitFailure {
    pub date: NaiveDate,
    pub box_id: usize,
    pub error: ImageryError,
}

/// Outcome of a batch, keyed by `(date, split box id)`.
#[derive(Debug, Default)]
pub struct FetchResults {
    pub artifacts: BTreeMap<(NaiveDate, usize), RawArtifact>,
    pub empty: Vec<(NaiveDate, usize)>,
    pub failures: Vec<UnitFailure>,
    /// Artifacts found complete from an earlier run.
    pub reused: usize,
}

impl FetchResults {
    fn record(&mut self, unit: &DownloadUnit, outcome: UnitOutcome) {
        match outcome {
            UnitOutcome::Fetched(artifact) => {
                self.artifacts.insert(unit.key(), artifact);
            }
            UnitOutcome::Reused(artifact) => {
                self.reused += 1;
                self.artifacts.insert(unit.key(), artifact);
            }
            UnitOutcome::Empty => self.empty.push(unit.key()),
            UnitOutcome::Failed(error) => self.failures.push(UnitFailure {
                date: unit.date,
                box_id: unit.split_box.id,
                error,
            }),
        }
    }
}

/// Runs lanes of units against an [`ImageryClient`].
pub struct FetchExecutor {
    client: Arc<dyn ImageryClient>,
    config: ExecutorConfig,
}

impl FetchExecutor {
    pub fn new(client: Arc<dyn ImageryClient>, config: ExecutorConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Run every lane and collect the outcome of every unit.
    pub async fn execute(
        &self,
        lanes: Vec<Vec<DownloadUnit>>,
        collection: DataCollection,
        evalscript: &str,
    ) -> FetchResults {
        let workers = self.config.workers.max(1);
        let total: usize = lanes.iter().map(Vec::len).sum();
        info!(lanes = lanes.len(), units = total, workers, "Starting downloads");

        let lane_results: Vec<Vec<(DownloadUnit, UnitOutcome)>> = stream::iter(lanes)
            .map(|lane| self.run_lane(lane, collection, evalscript))
            .buffer_unordered(workers)
            .collect()
            .await;

        // Merge per-lane results; completion order does not matter
        let mut results = FetchResults::default();
        for (unit, outcome) in lane_results.into_iter().flatten() {
            results.record(&unit, outcome);
        }

        info!(
            artifacts = results.artifacts.len(),
            reused = results.reused,
            empty = results.empty.len(),
            failed = results.failures.len(),
            "Downloads finished"
        );
        results
    }

    #[instrument(skip_all, fields(units = lane.len()))]
    async fn run_lane(
        &self,
        lane: Vec<DownloadUnit>,
        collection: DataCollection,
        evalscript: &str,
    ) -> Vec<(DownloadUnit, UnitOutcome)> {
        let mut outcomes = Vec::with_capacity(lane.len());
        let mut requested_before = false;

        for unit in lane {
            let request = ProcessRequest::for_unit(&unit, collection, evalscript);
            let artifact = match RawArtifact::for_request(&self.config.store_dir, &request) {
                Ok(artifact) => artifact,
                Err(e) => {
                    outcomes.push((unit, UnitOutcome::Failed(e)));
                    continue;
                }
            };

            if !self.config.overwrite && artifact.is_complete() {
                debug!(date = %unit.date, box_id = unit.split_box.id, "Reusing complete artifact");
                outcomes.push((unit, UnitOutcome::Reused(artifact)));
                continue;
            }

            if requested_before && !self.config.sleep_between_requests.is_zero() {
                tokio::time::sleep(self.config.sleep_between_requests).await;
            }
            requested_before = true;

            let outcome = match self.fetch(&request, artifact).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(date = %unit.date, box_id = unit.split_box.id, error = %e, "Download failed");
                    UnitOutcome::Failed(e)
                }
            };
            if matches!(outcome, UnitOutcome::Empty) {
                info!(date = %unit.date, box_id = unit.split_box.id, "No valid pixels, skipping");
            }
            outcomes.push((unit, outcome));
        }

        outcomes
    }

    async fn fetch(&self, request: &ProcessRequest, artifact: RawArtifact) -> ImageryResult<UnitOutcome> {
        let timeout = self.config.request_timeout;
        let bytes = tokio::time::timeout(timeout, self.client.submit(request))
            .await
            .map_err(|_| ImageryError::Timeout(timeout.as_secs()))??;

        if is_empty_response(bytes.clone()).await? {
            return Ok(UnitOutcome::Empty);
        }

        artifact.write(&self.client.endpoint(), request, &bytes).await?;
        Ok(UnitOutcome::Fetched(artifact))
    }
}

/// Whether a response raster holds nothing but no-data.
async fn is_empty_response(bytes: Bytes) -> ImageryResult<bool> {
    tokio::task::spawn_blocking(move || {
        mosaic::decode_geotiff(&bytes)
            .map(|raster| raster.is_all_nodata())
            .map_err(|e| ImageryError::ServiceUnavailable(format!("unreadable response: {}", e)))
    })
    .await
    .map_err(|e| ImageryError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))?
}
