//! Common types shared by the tile planner, the mosaic merger and the downloader.

pub mod artifact;
pub mod bbox;
pub mod collection;
pub mod compression;
pub mod crs;
pub mod error;
pub mod time;

pub use artifact::RenamedFile;
pub use bbox::BoundingBox;
pub use collection::DataCollection;
pub use compression::RasterCompression;
pub use crs::Crs;
pub use error::{Axis, ImageryError, ImageryResult};
pub use time::TimeInterval;
