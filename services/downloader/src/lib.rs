//! Tiled satellite imagery downloader.
//!
//! Runs a planned query against the imagery service: every (date, split
//! box) unit is fetched into its own scratch directory, resolved to a
//! canonical file name from its request record, and the tiles of each
//! date are merged back into one raster. The outcome of every unit ends
//! up in a run manifest.

pub mod area;
pub mod artifact;
pub mod auth;
pub mod catalog;
pub mod client;
pub mod config;
pub mod evalscript;
pub mod executor;
pub mod manifest;
pub mod pipeline;
pub mod resolver;

pub use artifact::{ArtifactDescriptor, RawArtifact};
pub use auth::{Credentials, TokenProvider};
pub use client::{ImageryClient, ProcessRequest, RetryPolicy, SentinelHubClient};
pub use config::Config;
pub use executor::{default_workers, ExecutorConfig, FetchExecutor, FetchResults};
pub use manifest::{RunManifest, Stage};
pub use pipeline::Pipeline;
