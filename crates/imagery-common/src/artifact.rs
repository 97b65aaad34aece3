//! Canonical output files.

use std::path::PathBuf;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A raster moved out of its scratch directory under its canonical name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenamedFile {
    pub path: PathBuf,
    pub acquisition_date: NaiveDate,
    /// `None` for direct downloads (single box).
    pub split_box_id: Option<usize>,
    pub data_source: String,
}

impl RenamedFile {
    /// Canonical file name for one download unit.
    ///
    /// `{date}_{source}.tif` for direct downloads, `{date}_{id}_{source}.tif`
    /// for split boxes.
    pub fn canonical_name(date: NaiveDate, split_box_id: Option<usize>, source: &str) -> String {
        match split_box_id {
            Some(id) => format!("{}_{}_{}.tif", date.format("%Y-%m-%d"), id, source),
            None => format!("{}_{}.tif", date.format("%Y-%m-%d"), source),
        }
    }

    /// File name of the mosaic merged from all split boxes of one date.
    pub fn mosaic_name(date: NaiveDate, source: &str) -> String {
        format!("{}_{}_SM_mosaic.tif", date.format("%Y-%m-%d"), source)
    }
}
