//! Common test utilities for downloader tests
//!
//! Provides an in-process imagery client that renders a synthetic GeoTIFF
//! for whatever box it is asked for, plus helpers to plan queries over
//! the Greenland test box.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::NaiveDate;

use imagery_common::{BoundingBox, DataCollection, ImageryError, ImageryResult, TimeInterval};
use mosaic::{encode_geotiff, GeoTransform, Raster, SampleType};
use tile_planner::{plan::plan, DispatchThresholds, DownloadStrategy, PlannerConfig, PlanningResult, Query};
use tilefetch::{ExecutorConfig, ImageryClient, ProcessRequest};

pub const ENDPOINT: &str = "https://fake.example/api/v1/process";
pub const EVALSCRIPT: &str = test_utils::evalscript::TRUE_COLOR;

/// Pixel value rendered for a date; never the no-data value.
pub fn value_for(date: NaiveDate) -> f32 {
    10.0 + chrono::Datelike::day(&date) as f32
}

/// GeoTIFF covering the requested box at the requested size.
pub fn render(request: &ProcessRequest, value: f32) -> Vec<u8> {
    render_bands(request, value, 3)
}

/// Like [`render`] with an arbitrary number of bands.
pub fn render_bands(request: &ProcessRequest, value: f32, bands: usize) -> Vec<u8> {
    let geometry = request.geometry().expect("request CRS");
    let width = request.output.width as usize;
    let height = request.output.height as usize;
    let raster = Raster::new(
        width,
        height,
        bands,
        SampleType::U8,
        test_utils::create_constant_grid(width, height, bands, value),
        GeoTransform::from_bounds(&geometry, width, height),
        geometry.crs,
    )
    .unwrap()
    .with_nodata(0.0);
    encode_geotiff(&raster, None).unwrap()
}

fn request_date(request: &ProcessRequest) -> NaiveDate {
    request.time_from().expect("time range").date_naive()
}

/// Imagery client that never touches the network.
#[derive(Default)]
pub struct FakeClient {
    calls: AtomicUsize,
    failing: Vec<(NaiveDate, BoundingBox)>,
    slow: Vec<(NaiveDate, BoundingBox)>,
    empty_dates: Vec<NaiveDate>,
    delay: Duration,
    bands: Option<usize>,
}

impl FakeClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer the unit for `date` over `geometry` with a service error.
    pub fn failing(mut self, date: NaiveDate, geometry: BoundingBox) -> Self {
        self.failing.push((date, geometry));
        self
    }

    /// Delay the answer for one unit by `delay`.
    pub fn slow(mut self, date: NaiveDate, geometry: BoundingBox, delay: Duration) -> Self {
        self.slow.push((date, geometry));
        self.delay = delay;
        self
    }

    /// Answer every unit of `date` with an all no-data raster.
    pub fn empty_on(mut self, date: NaiveDate) -> Self {
        self.empty_dates.push(date);
        self
    }

    /// Answer with `bands`-band rasters instead of RGB.
    pub fn with_bands(mut self, bands: usize) -> Self {
        self.bands = Some(bands);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn matches(list: &[(NaiveDate, BoundingBox)], date: NaiveDate, geometry: &BoundingBox) -> bool {
        list.iter()
            .any(|(d, g)| *d == date && g.approx_eq(geometry, 1e-6))
    }
}

#[async_trait]
impl ImageryClient for FakeClient {
    fn endpoint(&self) -> String {
        ENDPOINT.to_string()
    }

    async fn submit(&self, request: &ProcessRequest) -> ImageryResult<Bytes> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let date = request_date(request);
        let geometry = request.geometry().expect("request CRS");

        if Self::matches(&self.slow, date, &geometry) {
            tokio::time::sleep(self.delay).await;
        }
        if Self::matches(&self.failing, date, &geometry) {
            return Err(ImageryError::ServiceUnavailable("HTTP 503 Service Unavailable".into()));
        }

        let value = if self.empty_dates.contains(&date) {
            0.0
        } else {
            value_for(date)
        };
        Ok(Bytes::from(render_bands(request, value, self.bands.unwrap_or(3))))
    }
}

pub fn three_days() -> Vec<NaiveDate> {
    test_utils::dates::THREE_DAYS
        .iter()
        .map(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").unwrap())
        .collect()
}

/// Query over the Greenland test box for the three test dates.
pub fn greenland_query(store: &Path, strategy: DownloadStrategy) -> Query {
    let (min_x, min_y, max_x, max_y) = test_utils::bbox::GREENLAND_TEST;
    let mut query = Query::new(
        BoundingBox::geographic(min_x, min_y, max_x, max_y).unwrap(),
        TimeInterval::from_date_strings(&test_utils::dates::THREE_DAYS).unwrap(),
        DataCollection::from_name(test_utils::collections::SENTINEL2_L2A).unwrap(),
    );
    query.strategy = strategy;
    query.store_dir = store.to_path_buf();
    query
}

/// Plan `query` over its dates with a custom pixel cap.
pub fn plan_with_cap(query: &Query, max_tile_pixels: u32) -> PlanningResult {
    let config = PlannerConfig {
        max_tile_pixels,
        thresholds: DispatchThresholds::default(),
    };
    plan(query, &three_days(), &config).unwrap()
}

/// Executor settings for tests: no pauses, short timeout.
pub fn fast_executor(store: &Path) -> ExecutorConfig {
    ExecutorConfig {
        workers: 4,
        request_timeout: Duration::from_secs(10),
        sleep_between_requests: Duration::ZERO,
        ..ExecutorConfig::new(store)
    }
}
