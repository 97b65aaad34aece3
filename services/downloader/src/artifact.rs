//! Scratch layout of raw service responses.
//!
//! Every request gets its own directory under the store, named after the
//! SHA-256 of its payload, holding the response raster and a record of
//! the request. Both files are written under a `.partial` name first, so
//! a directory only counts as complete once both final names exist.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::debug;

use imagery_common::{BoundingBox, ImageryError, ImageryResult};

use crate::client::ProcessRequest;

pub const RESPONSE_FILE: &str = "response.tiff";
pub const REQUEST_FILE: &str = "request.json";

/// `request.json` contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestRecord {
    pub request: RecordedRequest,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedRequest {
    pub url: String,
    pub payload: ProcessRequest,
}

/// Scratch directory of one request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RawArtifact {
    pub dir: PathBuf,
}

impl RawArtifact {
    /// Directory for `request` under `store`.
    pub fn for_request(store: &Path, request: &ProcessRequest) -> ImageryResult<Self> {
        let payload = serde_json::to_vec(request)?;
        let digest = Sha256::digest(&payload);
        Ok(Self {
            dir: store.join(hex::encode(digest)),
        })
    }

    pub fn response_path(&self) -> PathBuf {
        self.dir.join(RESPONSE_FILE)
    }

    pub fn record_path(&self) -> PathBuf {
        self.dir.join(REQUEST_FILE)
    }

    /// Both the response and its record are in place.
    pub fn is_complete(&self) -> bool {
        self.response_path().is_file() && self.record_path().is_file()
    }

    /// Write the response and the request record.
    pub async fn write(&self, url: &str, request: &ProcessRequest, response: &[u8]) -> ImageryResult<()> {
        fs::create_dir_all(&self.dir).await?;

        let record = RequestRecord {
            request: RecordedRequest {
                url: url.to_string(),
                payload: request.clone(),
            },
            timestamp: Utc::now(),
        };
        let record_json = serde_json::to_vec_pretty(&record)?;

        write_atomic(&self.response_path(), response).await?;
        write_atomic(&self.record_path(), &record_json).await?;

        debug!(dir = %self.dir.display(), bytes = response.len(), "Artifact written");
        Ok(())
    }

    /// Parse the request record into a descriptor.
    pub fn descriptor(&self) -> ImageryResult<ArtifactDescriptor> {
        let content = std::fs::read_to_string(self.record_path()).map_err(|e| self.unresolvable(e.to_string()))?;
        ArtifactDescriptor::from_record_json(&content).map_err(|reason| self.unresolvable(reason))
    }

    pub fn unresolvable(&self, reason: impl Into<String>) -> ImageryError {
        ImageryError::UnresolvableArtifact {
            path: self.dir.clone(),
            reason: reason.into(),
        }
    }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> ImageryResult<()> {
    let mut partial = path.as_os_str().to_owned();
    partial.push(".partial");
    let partial = PathBuf::from(partial);

    fs::write(&partial, bytes).await?;
    fs::rename(&partial, path).await?;
    Ok(())
}

/// Acquisition date and footprint a raw response was requested for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArtifactDescriptor {
    pub date: NaiveDate,
    pub geometry: BoundingBox,
}

impl ArtifactDescriptor {
    pub fn from_record_json(content: &str) -> Result<Self, String> {
        let record: RequestRecord =
            serde_json::from_str(content).map_err(|e| format!("invalid request record: {}", e))?;
        let payload = &record.request.payload;

        let date = payload
            .time_from()
            .ok_or("request record has no time range")?
            .date_naive();
        let geometry = payload
            .geometry()
            .ok_or_else(|| format!("unsupported CRS {}", payload.input.bounds.properties.crs))?;

        Ok(Self { date, geometry })
    }
}
