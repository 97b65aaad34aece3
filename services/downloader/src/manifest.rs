//! Run manifest: what a run produced and what it could not.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use imagery_common::{ImageryError, ImageryResult, RenamedFile};
use tile_planner::DownloadStrategy;

pub const MANIFEST_FILE: &str = "manifest.json";

/// Pipeline stage a failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Fetch,
    Resolve,
    Merge,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub stage: Stage,
    pub date: Option<NaiveDate>,
    pub box_id: Option<usize>,
    pub reason: String,
}

impl FailureRecord {
    pub fn new(stage: Stage, date: Option<NaiveDate>, box_id: Option<usize>, error: &ImageryError) -> Self {
        Self {
            stage,
            date,
            box_id,
            reason: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MosaicRecord {
    pub date: NaiveDate,
    pub path: PathBuf,
    pub tiles: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmptyUnit {
    pub date: NaiveDate,
    pub box_id: usize,
}

/// Summary written as `manifest.json` in the store directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub collection: String,
    pub strategy: DownloadStrategy,
    pub resolution: u32,
    /// Renamed files still on disk; tiles removed after merging are not listed.
    pub files: Vec<RenamedFile>,
    pub mosaics: Vec<MosaicRecord>,
    pub empty: Vec<EmptyUnit>,
    pub failures: Vec<FailureRecord>,
}

impl RunManifest {
    pub fn start(collection: &str, strategy: DownloadStrategy, resolution: u32) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            collection: collection.to_string(),
            strategy,
            resolution,
            files: Vec::new(),
            mosaics: Vec::new(),
            empty: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn failures_in(&self, stage: Stage) -> impl Iterator<Item = &FailureRecord> {
        self.failures.iter().filter(move |f| f.stage == stage)
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Write to `{dir}/manifest.json`.
    pub fn write(&self, dir: &Path) -> ImageryResult<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(MANIFEST_FILE);
        std::fs::write(&path, serde_json::to_vec_pretty(self)?)?;
        Ok(path)
    }

    pub fn read(path: &Path) -> ImageryResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}
