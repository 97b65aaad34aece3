//! Artifact resolution and resumption.

mod common;

use std::sync::Arc;

use chrono::Datelike;
use common::{fast_executor, greenland_query, plan_with_cap, render, value_for, FakeClient, ENDPOINT, EVALSCRIPT};
use imagery_common::{BoundingBox, ImageryError};
use test_utils::temp_store_dir;
use tile_planner::{DownloadStrategy, DownloadUnit};
use tilefetch::{
    resolver::{discover_artifacts, resolve_artifacts},
    Pipeline, ProcessRequest, RawArtifact, Stage,
};

fn request_for(unit: &DownloadUnit) -> ProcessRequest {
    ProcessRequest::for_unit(unit, unit_collection(), EVALSCRIPT)
}

fn unit_collection() -> imagery_common::DataCollection {
    imagery_common::DataCollection::from_name("SENTINEL2_L2A").unwrap()
}

async fn write_artifact(store: &std::path::Path, unit: &DownloadUnit) -> RawArtifact {
    let request = request_for(unit);
    let artifact = RawArtifact::for_request(store, &request).unwrap();
    artifact
        .write(ENDPOINT, &request, &render(&request, value_for(unit.date)))
        .await
        .unwrap();
    artifact
}

// ============================================================================
// Resolution by content
// ============================================================================

#[tokio::test]
async fn test_resolution_ignores_arrival_order() {
    let store = temp_store_dir();
    let plan = plan_with_cap(&greenland_query(store.path(), DownloadStrategy::SplitAndMerge), 100);

    let mut artifacts = Vec::new();
    for unit in plan.units.iter().rev() {
        artifacts.push(write_artifact(store.path(), unit).await);
    }
    // Directory listing order is unrelated to unit order
    let discovered = discover_artifacts(store.path());
    assert_eq!(discovered.len(), plan.units.len());

    let outcome = resolve_artifacts(&discovered, &plan, store.path());
    assert!(outcome.failures.is_empty());
    assert_eq!(outcome.renamed.len(), plan.units.len());

    for file in &outcome.renamed {
        let raster = mosaic::read_geotiff(&file.path).unwrap();
        let split_box = &plan.split_boxes[file.split_box_id.unwrap()];
        assert!(raster.bounds().approx_eq(&split_box.geometry, 1e-3));
        assert_eq!(raster.pixel(0, 0)[0], 10.0 + file.acquisition_date.day() as f32);
    }
}

#[tokio::test]
async fn test_foreign_footprint_is_unresolvable() {
    let store = temp_store_dir();
    let plan = plan_with_cap(&greenland_query(store.path(), DownloadStrategy::SplitAndMerge), 2500);

    let good = write_artifact(store.path(), &plan.units[0]).await;

    let mut stray = plan.units[1];
    let g = stray.split_box.geometry;
    stray.split_box.geometry = BoundingBox::new(g.min_x + 500.0, g.min_y, g.max_x + 500.0, g.max_y, g.crs);
    let bad = write_artifact(store.path(), &stray).await;

    let outcome = resolve_artifacts([&good, &bad], &plan, store.path());
    assert_eq!(outcome.renamed.len(), 1);
    assert_eq!(outcome.failures.len(), 1);
    match &outcome.failures[0] {
        ImageryError::UnresolvableArtifact { path, reason } => {
            assert_eq!(path, &bad.dir);
            assert!(reason.contains("matches no split box"));
        }
        other => panic!("expected unresolvable artifact, got {:?}", other),
    }
    // The unresolved response is left for inspection
    assert!(bad.is_complete());
    assert!(!good.dir.exists());
}

#[tokio::test]
async fn test_corrupt_record_is_unresolvable() {
    let store = temp_store_dir();
    let plan = plan_with_cap(&greenland_query(store.path(), DownloadStrategy::SplitAndMerge), 2500);

    let artifact = write_artifact(store.path(), &plan.units[0]).await;
    std::fs::write(artifact.record_path(), b"{\"request\": 42}").unwrap();

    let outcome = resolve_artifacts([&artifact], &plan, store.path());
    assert!(outcome.renamed.is_empty());
    assert!(matches!(
        outcome.failures[0],
        ImageryError::UnresolvableArtifact { .. }
    ));
}

#[tokio::test]
async fn test_date_outside_the_plan_is_unresolvable() {
    let store = temp_store_dir();
    let plan = plan_with_cap(&greenland_query(store.path(), DownloadStrategy::SplitAndMerge), 2500);

    let mut late = plan.units[0];
    late.date = late.date + chrono::Duration::days(30);
    let artifact = write_artifact(store.path(), &late).await;

    let outcome = resolve_artifacts([&artifact], &plan, store.path());
    assert_eq!(outcome.failures.len(), 1);
}

// ============================================================================
// Resume
// ============================================================================

#[tokio::test]
async fn test_complete_artifacts_are_not_requested_again() {
    let store = temp_store_dir();
    let plan = plan_with_cap(&greenland_query(store.path(), DownloadStrategy::SplitAndMerge), 2500);

    // Left behind by an interrupted run
    write_artifact(store.path(), &plan.units[0]).await;
    write_artifact(store.path(), &plan.units[5]).await;

    let client = Arc::new(FakeClient::new());
    let manifest = Pipeline::new(client.clone(), fast_executor(store.path()))
        .run(&plan, EVALSCRIPT)
        .await
        .unwrap();

    assert_eq!(client.calls(), plan.units.len() - 2);
    assert!(manifest.is_clean());
    assert_eq!(manifest.mosaics.len(), 3);
}

#[tokio::test]
async fn test_overwrite_requests_everything() {
    let store = temp_store_dir();
    let plan = plan_with_cap(&greenland_query(store.path(), DownloadStrategy::SplitAndMerge), 2500);
    write_artifact(store.path(), &plan.units[0]).await;

    let client = Arc::new(FakeClient::new());
    let mut executor = fast_executor(store.path());
    executor.overwrite = true;
    Pipeline::new(client.clone(), executor).run(&plan, EVALSCRIPT).await.unwrap();

    assert_eq!(client.calls(), plan.units.len());
}

#[tokio::test]
async fn test_partial_artifact_is_requested_again() {
    let store = temp_store_dir();
    let plan = plan_with_cap(&greenland_query(store.path(), DownloadStrategy::SplitAndMerge), 2500);

    // Interrupted before the record was written
    let request = request_for(&plan.units[0]);
    let artifact = RawArtifact::for_request(store.path(), &request).unwrap();
    std::fs::create_dir_all(&artifact.dir).unwrap();
    std::fs::write(artifact.response_path(), b"truncated").unwrap();

    let client = Arc::new(FakeClient::new());
    let manifest = Pipeline::new(client.clone(), fast_executor(store.path()))
        .run(&plan, EVALSCRIPT)
        .await
        .unwrap();

    assert_eq!(client.calls(), plan.units.len());
    assert_eq!(manifest.failures_in(Stage::Resolve).count(), 0);
}
