//! Imagery service client.
//!
//! [`ImageryClient`] is the seam between the executor and the remote
//! service; [`SentinelHubClient`] implements it over the Process API.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use imagery_common::{time::day_bounds, BoundingBox, DataCollection, ImageryError, ImageryResult};
use tile_planner::DownloadUnit;

use crate::auth::TokenProvider;

pub const PROCESS_PATH: &str = "/api/v1/process";

// ============================================================================
// Request payload
// ============================================================================

/// Process API request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessRequest {
    pub input: RequestInput,
    pub output: RequestOutput,
    pub evalscript: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestInput {
    pub bounds: RequestBounds,
    pub data: Vec<DataSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestBounds {
    pub bbox: [f64; 4],
    pub properties: BoundsProperties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundsProperties {
    /// OGC CRS URL.
    pub crs: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSpec {
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(rename = "dataFilter")]
    pub data_filter: DataFilter,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing: Option<Processing>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFilter {
    #[serde(rename = "timeRange")]
    pub time_range: TimeRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Processing {
    pub orthorectify: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestOutput {
    pub width: u32,
    pub height: u32,
    pub responses: Vec<OutputResponse>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputResponse {
    pub identifier: String,
    pub format: OutputFormat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputFormat {
    #[serde(rename = "type")]
    pub mime_type: String,
}

impl ProcessRequest {
    /// Request for one download unit: its box over its whole acquisition day.
    pub fn for_unit(unit: &DownloadUnit, collection: DataCollection, evalscript: &str) -> Self {
        let (from, to) = day_bounds(unit.date);
        let geometry = &unit.split_box.geometry;
        Self {
            input: RequestInput {
                bounds: RequestBounds {
                    bbox: geometry.to_array(),
                    properties: BoundsProperties {
                        crs: geometry.crs.ogc_url(),
                    },
                },
                data: vec![DataSpec {
                    data_type: collection.api_type().to_string(),
                    data_filter: DataFilter {
                        time_range: TimeRange { from, to },
                    },
                    processing: Some(Processing { orthorectify: true }),
                }],
            },
            output: RequestOutput {
                width: unit.width,
                height: unit.height,
                responses: vec![OutputResponse {
                    identifier: "default".to_string(),
                    format: OutputFormat {
                        mime_type: "image/tiff".to_string(),
                    },
                }],
            },
            evalscript: evalscript.to_string(),
        }
    }

    /// Requested footprint, or `None` if the CRS URL is not understood.
    pub fn geometry(&self) -> Option<BoundingBox> {
        let crs = self.input.bounds.properties.crs.parse().ok()?;
        let [min_x, min_y, max_x, max_y] = self.input.bounds.bbox;
        Some(BoundingBox::new(min_x, min_y, max_x, max_y, crs))
    }

    /// Start of the requested time range.
    pub fn time_from(&self) -> Option<DateTime<Utc>> {
        self.input.data.first().map(|d| d.data_filter.time_range.from)
    }
}

// ============================================================================
// Client
// ============================================================================

/// Remote service rendering one raster per request.
#[async_trait]
pub trait ImageryClient: Send + Sync {
    /// URL recorded next to every response.
    fn endpoint(&self) -> String;

    /// Submit a request and return the raw GeoTIFF bytes.
    async fn submit(&self, request: &ProcessRequest) -> ImageryResult<Bytes>;
}

/// Retry behavior for transient failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Doubles after each attempt.
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(120),
        }
    }
}

enum AttemptError {
    Transient(String),
    Permanent(String),
}

/// Sentinel Hub Process API client.
pub struct SentinelHubClient {
    http: Client,
    base_url: String,
    tokens: TokenProvider,
    retry: RetryPolicy,
}

impl SentinelHubClient {
    pub fn new(http: Client, base_url: impl Into<String>, tokens: TokenProvider, retry: RetryPolicy) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tokens,
            retry,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Authorized JSON POST against the service.
    pub(crate) async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> ImageryResult<reqwest::Response> {
        let token = self
            .tokens
            .token()
            .await
            .map_err(|e| ImageryError::ServiceUnavailable(format!("{:#}", e)))?;
        self.http
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(|e| ImageryError::ServiceUnavailable(e.to_string()))
    }

    async fn attempt(&self, request: &ProcessRequest) -> Result<Bytes, AttemptError> {
        let response = self
            .post_json(PROCESS_PATH, request)
            .await
            .map_err(|e| AttemptError::Transient(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return response
                .bytes()
                .await
                .map_err(|e| AttemptError::Transient(e.to_string()));
        }

        let body = response.text().await.unwrap_or_default();
        let message = format!("HTTP {}: {}", status, body.trim());
        if is_retryable(status) {
            Err(AttemptError::Transient(message))
        } else {
            Err(AttemptError::Permanent(message))
        }
    }
}

/// Rate limiting and server errors are worth retrying; other client errors are not.
fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

#[async_trait]
impl ImageryClient for SentinelHubClient {
    fn endpoint(&self) -> String {
        format!("{}{}", self.base_url, PROCESS_PATH)
    }

    #[instrument(skip(self, request), fields(width = request.output.width, height = request.output.height))]
    async fn submit(&self, request: &ProcessRequest) -> ImageryResult<Bytes> {
        let mut retry_count = 0;
        let mut delay = self.retry.initial_delay;

        loop {
            match self.attempt(request).await {
                Ok(bytes) => {
                    debug!(bytes = bytes.len(), "Response received");
                    return Ok(bytes);
                }
                Err(AttemptError::Permanent(message)) => {
                    return Err(ImageryError::ServiceUnavailable(message));
                }
                Err(AttemptError::Transient(message)) => {
                    retry_count += 1;
                    if retry_count > self.retry.max_retries {
                        return Err(ImageryError::ServiceUnavailable(format!(
                            "failed after {} retries: {}",
                            self.retry.max_retries, message
                        )));
                    }

                    warn!(
                        error = %message,
                        retry = retry_count,
                        max_retries = self.retry.max_retries,
                        delay_secs = delay.as_secs(),
                        "Request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay = std::cmp::min(delay * 2, self.retry.max_delay);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use imagery_common::Crs;
    use tile_planner::SplitBox;

    fn unit() -> DownloadUnit {
        DownloadUnit {
            date: NaiveDate::from_ymd_opt(2019, 8, 2).unwrap(),
            split_box: SplitBox {
                id: 3,
                geometry: BoundingBox::new(500_000.0, 7_677_000.0, 501_390.0, 7_678_170.0, Crs::from_epsg(32622)),
            },
            width: 139,
            height: 117,
        }
    }

    #[test]
    fn test_request_json_shape() {
        let collection = DataCollection::from_name("SENTINEL2_L2A").unwrap();
        let request = ProcessRequest::for_unit(&unit(), collection, "//VERSION=3");
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["input"]["bounds"]["bbox"][2], 501_390.0);
        assert_eq!(
            json["input"]["bounds"]["properties"]["crs"],
            "http://www.opengis.net/def/crs/EPSG/0/32622"
        );
        assert_eq!(json["input"]["data"][0]["type"], "sentinel-2-l2a");
        assert_eq!(json["input"]["data"][0]["dataFilter"]["timeRange"]["from"], "2019-08-02T00:00:00Z");
        assert_eq!(json["input"]["data"][0]["dataFilter"]["timeRange"]["to"], "2019-08-02T23:59:59Z");
        assert_eq!(json["input"]["data"][0]["processing"]["orthorectify"], true);
        assert_eq!(json["output"]["width"], 139);
        assert_eq!(json["output"]["responses"][0]["identifier"], "default");
        assert_eq!(json["output"]["responses"][0]["format"]["type"], "image/tiff");
        assert_eq!(json["evalscript"], "//VERSION=3");
    }

    #[test]
    fn test_geometry_round_trips_through_payload() {
        let collection = DataCollection::from_name("SENTINEL2_L2A").unwrap();
        let request = ProcessRequest::for_unit(&unit(), collection, "x");
        assert_eq!(request.geometry(), Some(unit().split_box.geometry));
        assert_eq!(request.time_from().unwrap().date_naive(), unit().date);
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable(StatusCode::SERVICE_UNAVAILABLE));
        assert!(is_retryable(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(!is_retryable(StatusCode::BAD_REQUEST));
        assert!(!is_retryable(StatusCode::UNAUTHORIZED));
    }
}
