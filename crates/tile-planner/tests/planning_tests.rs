//! Planning properties over realistic query boxes.

use chrono::NaiveDate;
use imagery_common::{BoundingBox, DataCollection, TimeInterval};
use projection::Extents;
use test_utils::{assert_approx_eq, fixtures};
use tile_planner::plan::plan;
use tile_planner::resolution::max_resolution_for_direct;
use tile_planner::splitter::optimal_grid;
use tile_planner::{DownloadStrategy, GridShape, ParallelAxis, PlannerConfig, PlanningResult, Query};

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
}

fn query(bbox: (f64, f64, f64, f64), dates: &[&str]) -> Query {
    Query::new(
        BoundingBox::geographic(bbox.0, bbox.1, bbox.2, bbox.3).unwrap(),
        TimeInterval::from_date_strings(dates).unwrap(),
        DataCollection::from_name(fixtures::collections::SENTINEL2_L2A).unwrap(),
    )
}

fn run(query: &Query, config: &PlannerConfig) -> PlanningResult {
    let dates = query.expand_dates(today()).unwrap();
    plan(query, &dates, config).unwrap()
}

fn with_cap(max_tile_pixels: u32) -> PlannerConfig {
    PlannerConfig {
        max_tile_pixels,
        ..PlannerConfig::default()
    }
}

const BOXES: [(f64, f64, f64, f64); 3] = [
    fixtures::bbox::GREENLAND_TEST,
    fixtures::bbox::ZURICH,
    fixtures::bbox::CAPE_TOWN,
];

const CAPS: [u32; 4] = [2500, 500, 100, 37];

// ============================================================================
// Greenland test box
// ============================================================================

#[test]
fn test_greenland_direct_maximum_is_eleven() {
    let result = run(
        &query(fixtures::bbox::GREENLAND_TEST, &[fixtures::dates::SINGLE_DAY]),
        &PlannerConfig::default(),
    );
    assert_eq!(result.projected_bbox.crs.epsg(), 32622);
    assert_eq!(result.max_resolution, 11);
}

#[test]
fn test_greenland_split_and_merge_default_resolution() {
    let result = run(
        &query(fixtures::bbox::GREENLAND_TEST, &[fixtures::dates::SINGLE_DAY]),
        &PlannerConfig::default(),
    );
    assert_eq!(result.strategy, DownloadStrategy::SplitAndMerge);
    assert_eq!(result.resolution, 10);
    assert!(result.grid.count() > 1);
    assert_eq!(result.grid, GridShape { nx: 2, ny: 2 });
    assert_eq!(result.split_boxes.len(), 4);
    assert!(result.advisories.is_empty());
}

#[test]
fn test_greenland_direct_is_single_geographic_box() {
    let mut q = query(fixtures::bbox::GREENLAND_TEST, &fixtures::dates::THREE_DAYS);
    q.strategy = DownloadStrategy::Direct;
    let result = run(&q, &PlannerConfig::default());

    assert_eq!(result.grid, GridShape::SINGLE);
    assert_eq!(result.split_boxes.len(), 1);
    assert_eq!(result.split_boxes[0].id, 0);
    assert_eq!(result.split_boxes[0].geometry, q.bbox);
    assert!(result.split_boxes[0].geometry.crs.is_geographic());
    assert_eq!(result.resolution, 11);
    assert_eq!(result.axis, ParallelAxis::Dates);
    assert_eq!(result.units.len(), 3);
}

// ============================================================================
// Dates
// ============================================================================

#[test]
fn test_date_list_and_single_date() {
    let three = run(
        &query(fixtures::bbox::GREENLAND_TEST, &fixtures::dates::THREE_DAYS),
        &PlannerConfig::default(),
    );
    assert_eq!(three.dates.len(), 3);
    assert!(three.dates.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(three.units.len(), 3 * three.split_boxes.len());

    let single = run(
        &query(fixtures::bbox::GREENLAND_TEST, &[fixtures::dates::SINGLE_DAY]),
        &PlannerConfig::default(),
    );
    assert_eq!(single.dates.len(), 1);
}

#[test]
fn test_few_dates_many_boxes_parallelize_on_boxes() {
    let result = run(
        &query(fixtures::bbox::GREENLAND_TEST, &fixtures::dates::THREE_DAYS),
        &PlannerConfig::default(),
    );
    assert_eq!(result.axis, ParallelAxis::SplitBoxes);

    let result = run(
        &query(fixtures::bbox::GREENLAND_TEST, &fixtures::dates::AUGUST_RANGE),
        &PlannerConfig::default(),
    );
    assert_eq!(result.dates.len(), 10);
    assert_eq!(result.axis, ParallelAxis::Dates);
}

// ============================================================================
// Splitting properties
// ============================================================================

#[test]
fn test_cells_tile_the_projected_box_exactly() {
    for bbox in BOXES {
        for cap in CAPS {
            let result = run(&query(bbox, &[fixtures::dates::SINGLE_DAY]), &with_cap(cap));
            if result.strategy != DownloadStrategy::SplitAndMerge {
                continue;
            }
            let outer = result.projected_bbox;
            let cells: Vec<BoundingBox> = result.split_boxes.iter().map(|b| b.geometry).collect();
            assert_eq!(cells.len(), result.grid.count());

            let union = cells.iter().skip(1).fold(cells[0], |acc, c| acc.union(c));
            assert_eq!(union.to_array(), outer.to_array(), "cap {}", cap);

            let area: f64 = cells.iter().map(|c| c.width() * c.height()).sum();
            assert_approx_eq!(area, outer.width() * outer.height(), outer.width() * outer.height() * 1e-9);

            for (i, a) in cells.iter().enumerate() {
                for b in &cells[i + 1..] {
                    assert!(!a.intersects(b), "cells overlap: {} and {}", a, b);
                }
            }
        }
    }
}

#[test]
fn test_every_cell_renders_within_cap() {
    for bbox in BOXES {
        for cap in CAPS {
            let result = run(&query(bbox, &[fixtures::dates::SINGLE_DAY]), &with_cap(cap));
            let resolution = result.resolution as f64;
            for split_box in &result.split_boxes {
                if split_box.geometry.crs.is_geographic() {
                    continue;
                }
                let cell = Extents::of(&split_box.geometry);
                assert!(cell.dx / resolution <= cap as f64);
                assert!(cell.dy / resolution <= cap as f64);
            }
            for unit in &result.units {
                assert!(unit.width <= cap && unit.height <= cap);
            }
        }
    }
}

#[test]
fn test_split_ids_are_stable_and_unique() {
    let result = run(&query(fixtures::bbox::ZURICH, &[fixtures::dates::SINGLE_DAY]), &with_cap(100));
    let ids: Vec<usize> = result.split_boxes.iter().map(|b| b.id).collect();
    assert_eq!(ids, (0..result.grid.count()).collect::<Vec<_>>());
    // Row 0 is the northern edge
    assert_eq!(result.split_boxes[0].geometry.max_y, result.projected_bbox.max_y);
}

// ============================================================================
// Fixed point
// ============================================================================

#[test]
fn test_replanning_output_is_a_fixed_point() {
    let requests = [None, Some(3), Some(10), Some(11), Some(30), Some(120)];
    let strategies = [DownloadStrategy::Direct, DownloadStrategy::SplitAndMerge];

    for bbox in BOXES {
        for requested in requests {
            for strategy in strategies {
                let mut q = query(bbox, &[fixtures::dates::SINGLE_DAY]);
                q.resolution = requested;
                q.strategy = strategy;

                let first = run(&q, &PlannerConfig::default());
                let second = run(&first.query, &PlannerConfig::default());

                assert_eq!(first.resolution, second.resolution, "{:?} {:?}", requested, strategy);
                assert_eq!(first.strategy, second.strategy, "{:?} {:?}", requested, strategy);
                assert_eq!(first.grid, second.grid);
                assert!(second.advisories.is_empty(), "{:?}", second.advisories);
            }
        }
    }
}

// ============================================================================
// Axis symmetry
// ============================================================================

#[test]
fn test_transposed_extents_give_transposed_plan() {
    for bbox in BOXES {
        let result = run(&query(bbox, &[fixtures::dates::SINGLE_DAY]), &PlannerConfig::default());
        let extents = result.extents;
        let transposed = extents.transposed();

        for cap in CAPS {
            let grid = optimal_grid(extents, 10, cap).unwrap();
            let flipped = optimal_grid(transposed, 10, cap).unwrap();
            assert_eq!((grid.nx, grid.ny), (flipped.ny, flipped.nx));

            assert_eq!(
                max_resolution_for_direct(10, extents, cap).unwrap(),
                max_resolution_for_direct(10, transposed, cap).unwrap()
            );
        }

        let (w, h) = extents.pixel_dimensions(10.0);
        assert_eq!(transposed.pixel_dimensions(10.0), (h, w));
    }
}

#[test]
fn test_plan_serializes_to_json() {
    let result = run(
        &query(fixtures::bbox::GREENLAND_TEST, &[fixtures::dates::SINGLE_DAY]),
        &PlannerConfig::default(),
    );
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["strategy"], "split-and-merge");
    assert_eq!(json["resolution"], 10);
    assert_eq!(json["grid"]["nx"], 2);
    assert_eq!(json["split_boxes"].as_array().unwrap().len(), 4);
    assert_eq!(json["axis"], "split_boxes");
}
