//! Mosaicking of split-box tiles.
//!
//! Tiles are composited in order: the first non-empty value for a pixel
//! wins, and no-data pixels are transparent. The output covers the union
//! of the input extents at the resolution of the first tile.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use rayon::prelude::*;
use tracing::{debug, info, instrument, warn};

use imagery_common::{ImageryError, ImageryResult, RasterCompression, RenamedFile};

use crate::error::{MosaicError, MosaicResult};
use crate::geotiff::{read_geotiff, write_geotiff};
use crate::raster::{GeoTransform, Raster};

/// Relative pixel size difference tolerated between merged tiles.
const RESOLUTION_TOLERANCE: f64 = 0.05;

/// Merge rasters into one covering the union of their extents.
pub fn merge_rasters(rasters: &[Raster]) -> MosaicResult<Raster> {
    let first = rasters.first().ok_or(MosaicError::Empty)?;
    for raster in &rasters[1..] {
        check_compatible(first, raster)?;
    }

    let union = rasters
        .iter()
        .skip(1)
        .fold(first.bounds(), |acc, r| acc.union(&r.bounds()));

    let pixel_width = first.transform.pixel_width;
    let pixel_height = first.transform.pixel_height;
    let width = ((union.width() / pixel_width).round() as usize).max(1);
    let height = ((union.height() / pixel_height).round() as usize).max(1);
    let transform = GeoTransform {
        origin_x: union.min_x,
        origin_y: union.max_y,
        pixel_width,
        pixel_height,
    };

    let mut output = Raster::filled(
        width,
        height,
        first.bands,
        first.sample_type,
        first.nodata.unwrap_or(crate::raster::DEFAULT_NODATA),
        transform,
        first.crs,
    );

    // Placement of every tile in output pixel coordinates
    let offsets: Vec<(i64, i64)> = rasters
        .iter()
        .map(|r| {
            let col = ((r.transform.origin_x - transform.origin_x) / pixel_width).round() as i64;
            let row = ((transform.origin_y - r.transform.origin_y) / pixel_height).round() as i64;
            (col, row)
        })
        .collect();

    let bands = output.bands;
    let out_nodata = output.nodata_value();
    let row_len = width * bands;

    output
        .data
        .par_chunks_mut(row_len)
        .enumerate()
        .for_each(|(row, out_row)| {
            for (raster, (col_off, row_off)) in rasters.iter().zip(&offsets) {
                let src_row = row as i64 - row_off;
                if src_row < 0 || src_row >= raster.height as i64 {
                    continue;
                }
                for src_col in 0..raster.width {
                    let dst_col = src_col as i64 + col_off;
                    if dst_col < 0 || dst_col >= width as i64 {
                        continue;
                    }
                    let src = raster.pixel(src_col, src_row as usize);
                    if raster.is_nodata(src) {
                        continue;
                    }
                    let start = dst_col as usize * bands;
                    let dst = &mut out_row[start..start + bands];
                    if dst.iter().all(|v| *v == out_nodata) {
                        dst.copy_from_slice(src);
                    }
                }
            }
        });

    Ok(output)
}

fn check_compatible(first: &Raster, other: &Raster) -> MosaicResult<()> {
    if first.crs != other.crs {
        return Err(MosaicError::Incompatible(format!(
            "CRS {} and {}",
            first.crs, other.crs
        )));
    }
    if first.bands != other.bands {
        return Err(MosaicError::Incompatible(format!(
            "{} and {} bands",
            first.bands, other.bands
        )));
    }
    let rel = |a: f64, b: f64| ((a - b) / a).abs();
    if rel(first.transform.pixel_width, other.transform.pixel_width) > RESOLUTION_TOLERANCE
        || rel(first.transform.pixel_height, other.transform.pixel_height) > RESOLUTION_TOLERANCE
    {
        return Err(MosaicError::Incompatible(format!(
            "pixel size {}x{} and {}x{}",
            first.transform.pixel_width,
            first.transform.pixel_height,
            other.transform.pixel_width,
            other.transform.pixel_height
        )));
    }
    Ok(())
}

/// Read, merge and write a set of GeoTIFF tiles.
pub fn merge_files(
    inputs: &[PathBuf],
    output: &Path,
    compression: Option<RasterCompression>,
) -> MosaicResult<Raster> {
    let rasters = inputs
        .iter()
        .map(|path| read_geotiff(path))
        .collect::<MosaicResult<Vec<_>>>()?;
    let merged = merge_rasters(&rasters)?;
    write_geotiff(output, &merged, compression)?;
    Ok(merged)
}

/// Options of the per-date merge stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeOptions {
    pub compression: Option<RasterCompression>,
    /// Delete the per-box tiles after a successful merge.
    pub remove_tiles: bool,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            compression: None,
            remove_tiles: true,
        }
    }
}

/// Final raster of one acquisition date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateMosaic {
    pub date: NaiveDate,
    pub path: PathBuf,
    /// Number of tiles the raster was built from.
    pub tiles: usize,
}

/// Outcome of merging one date group.
pub type DateMergeOutcome = ImageryResult<DateMosaic>;

/// Group files by acquisition date and merge each group into `out_dir`.
///
/// A group of one file is already final and is left untouched. A failed
/// merge is reported for its date only; other dates are still merged.
pub fn merge_by_date(files: &[RenamedFile], out_dir: &Path, options: &MergeOptions) -> Vec<DateMergeOutcome> {
    let mut groups: BTreeMap<NaiveDate, Vec<&RenamedFile>> = BTreeMap::new();
    for file in files {
        groups.entry(file.acquisition_date).or_default().push(file);
    }

    groups
        .into_iter()
        .map(|(date, mut group)| {
            group.sort_by_key(|f| f.split_box_id);
            merge_group(date, &group, out_dir, options)
        })
        .collect()
}

#[instrument(skip(group, out_dir, options), fields(tiles = group.len()))]
fn merge_group(
    date: NaiveDate,
    group: &[&RenamedFile],
    out_dir: &Path,
    options: &MergeOptions,
) -> DateMergeOutcome {
    if let [single] = group {
        debug!(path = %single.path.display(), "Single tile, nothing to merge");
        return Ok(DateMosaic {
            date,
            path: single.path.clone(),
            tiles: 1,
        });
    }

    let source = group.first().map(|f| f.data_source.as_str()).unwrap_or_default();
    let output = out_dir.join(RenamedFile::mosaic_name(date, source));
    let inputs: Vec<PathBuf> = group.iter().map(|f| f.path.clone()).collect();

    let merged = merge_files(&inputs, &output, options.compression).map_err(|e| {
        // Do not leave a truncated mosaic behind
        let _ = std::fs::remove_file(&output);
        ImageryError::MergeFailed {
            date,
            reason: e.to_string(),
        }
    })?;

    info!(
        path = %output.display(),
        width = merged.width,
        height = merged.height,
        "Mosaic written"
    );

    if options.remove_tiles {
        for input in &inputs {
            if let Err(e) = std::fs::remove_file(input) {
                warn!(path = %input.display(), error = %e, "Failed to remove merged tile");
            }
        }
    }

    Ok(DateMosaic {
        date,
        path: output,
        tiles: group.len(),
    })
}
