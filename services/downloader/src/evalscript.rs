//! Evaluation script resolution.
//!
//! A script is given inline, as an `http(s)` URL to fetch, or as `@path`
//! to a local file. Without one, Sentinel-1 and Sentinel-2 fall back to a
//! published default script.

use std::path::PathBuf;

use reqwest::{Client, Url};
use tracing::{debug, info};

use imagery_common::{DataCollection, ImageryError, ImageryResult};

const CUSTOM_SCRIPTS_URL: &str = "https://custom-scripts.sentinel-hub.com/custom-scripts";

/// Where the evaluation script comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvalscriptSource {
    Inline(String),
    Url(Url),
    File(PathBuf),
}

impl EvalscriptSource {
    /// Classify a command-line argument.
    pub fn parse(arg: &str) -> Self {
        if let Some(path) = arg.strip_prefix('@') {
            return EvalscriptSource::File(PathBuf::from(path));
        }
        match Url::parse(arg.trim()) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => EvalscriptSource::Url(url),
            _ => EvalscriptSource::Inline(arg.to_string()),
        }
    }

    /// Published default script of the collection's satellite family.
    pub fn default_for(collection: DataCollection) -> ImageryResult<Self> {
        let script = match collection.satellite() {
            "SENTINEL2" => "sentinel-2/true_color/script.js",
            "SENTINEL1" => "sentinel-1/sar_rvi_temporal_analysis/script.js",
            other => {
                return Err(ImageryError::InvalidEvalscript(format!(
                    "no default script for {}, pass one explicitly",
                    other
                )))
            }
        };
        let url = Url::parse(&format!("{}/{}", CUSTOM_SCRIPTS_URL, script))
            .map_err(|e| ImageryError::InvalidEvalscript(e.to_string()))?;
        Ok(EvalscriptSource::Url(url))
    }

    /// Produce the script text.
    pub async fn load(&self, http: &Client) -> ImageryResult<String> {
        let script = match self {
            EvalscriptSource::Inline(text) => text.clone(),
            EvalscriptSource::File(path) => {
                debug!(path = %path.display(), "Reading evaluation script");
                tokio::fs::read_to_string(path).await?
            }
            EvalscriptSource::Url(url) => {
                info!(url = %url, "Fetching evaluation script");
                http.get(url.clone())
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())
                    .map_err(|e| ImageryError::ServiceUnavailable(e.to_string()))?
                    .text()
                    .await
                    .map_err(|e| ImageryError::ServiceUnavailable(e.to_string()))?
            }
        };

        if script.trim().is_empty() {
            return Err(ImageryError::InvalidEvalscript("script is empty".to_string()));
        }
        Ok(script)
    }
}

/// Resolve the script for a query: the given argument, or the collection default.
pub async fn resolve_evalscript(
    arg: Option<&str>,
    collection: DataCollection,
    http: &Client,
) -> ImageryResult<String> {
    let source = match arg {
        Some(arg) => EvalscriptSource::parse(arg),
        None => EvalscriptSource::default_for(collection)?,
    };
    source.load(http).await
}
