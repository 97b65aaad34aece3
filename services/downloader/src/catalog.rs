//! Catalog search: narrow the requested dates to days with acquisitions.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use imagery_common::{
    time::{day_bounds, distinct_dates, join_timestamps},
    BoundingBox, DataCollection, ImageryError, ImageryResult,
};

use crate::client::SentinelHubClient;

pub const CATALOG_SEARCH_PATH: &str = "/api/v1/catalog/1.0.0/search";

/// Acquisitions closer than this belong to the same pass.
const JOIN_TOLERANCE_HOURS: i64 = 1;

const PAGE_LIMIT: u32 = 100;

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    bbox: [f64; 4],
    datetime: String,
    collections: [&'a str; 1],
    limit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    next: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    features: Vec<Feature>,
    #[serde(default)]
    context: Option<SearchContext>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    properties: FeatureProperties,
}

#[derive(Debug, Deserialize)]
struct FeatureProperties {
    datetime: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct SearchContext {
    next: Option<u64>,
}

/// Reduce acquisition timestamps to the requested days that have one.
///
/// Timestamps of one pass are joined first so a pass crossing midnight
/// counts for the day it started.
pub fn available_dates(timestamps: Vec<DateTime<Utc>>, requested: &[NaiveDate]) -> Vec<NaiveDate> {
    let joined = join_timestamps(timestamps, Duration::hours(JOIN_TOLERANCE_HOURS));
    distinct_dates(&joined)
        .into_iter()
        .filter(|d| requested.contains(d))
        .collect()
}

/// Search the catalog for acquisitions over `bbox` on the requested days.
pub async fn search_dates(
    client: &SentinelHubClient,
    bbox: &BoundingBox,
    collection: DataCollection,
    requested: &[NaiveDate],
) -> ImageryResult<Vec<NaiveDate>> {
    let (Some(first), Some(last)) = (requested.iter().min(), requested.iter().max()) else {
        return Ok(Vec::new());
    };
    let (from, _) = day_bounds(*first);
    let (_, to) = day_bounds(*last);
    let datetime = format!(
        "{}/{}",
        from.format("%Y-%m-%dT%H:%M:%SZ"),
        to.format("%Y-%m-%dT%H:%M:%SZ")
    );

    let mut timestamps = Vec::new();
    let mut next = None;
    loop {
        let body = SearchRequest {
            bbox: bbox.to_array(),
            datetime: datetime.clone(),
            collections: [collection.api_type()],
            limit: PAGE_LIMIT,
            next,
        };
        let response = client
            .post_json(CATALOG_SEARCH_PATH, &body)
            .await?
            .error_for_status()
            .map_err(|e| ImageryError::ServiceUnavailable(e.to_string()))?;
        let page: SearchResponse = response
            .json()
            .await
            .map_err(|e| ImageryError::ServiceUnavailable(format!("invalid catalog response: {}", e)))?;

        debug!(features = page.features.len(), "Catalog page received");
        timestamps.extend(page.features.into_iter().map(|f| f.properties.datetime));

        next = page.context.and_then(|c| c.next);
        if next.is_none() {
            break;
        }
    }

    let dates = available_dates(timestamps, requested);
    info!(
        requested = requested.len(),
        available = dates.len(),
        collection = %collection,
        "Catalog search complete"
    );
    Ok(dates)
}
