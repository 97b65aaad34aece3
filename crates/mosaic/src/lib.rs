//! Raster I/O and mosaicking for split-and-merge downloads.
//!
//! Rasters returned by the imagery service are GeoTIFFs; [`geotiff`] reads
//! and writes them, [`merge`] composites the tiles of one acquisition date
//! back into a single raster covering the original footprint.

pub mod error;
pub mod geotiff;
pub mod merge;
pub mod raster;

pub use error::{MosaicError, MosaicResult};
pub use geotiff::{decode_geotiff, encode_geotiff, read_geotiff, write_geotiff};
pub use merge::{merge_by_date, merge_files, merge_rasters, DateMosaic, MergeOptions};
pub use raster::{GeoTransform, Raster, SampleType};
