//! Service configuration.
//!
//! Loaded from an optional YAML file. Values may reference environment
//! variables as `${VAR}` or `${VAR:-default}`; missing keys fall back to
//! the defaults below.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use imagery_common::{ImageryResult, RasterCompression};
use tile_planner::{DispatchThresholds, PlannerConfig, MAX_TILE_PIXELS};

pub const DEFAULT_BASE_URL: &str = "https://services.sentinel-hub.com";
pub const DEFAULT_TOKEN_URL: &str =
    "https://services.sentinel-hub.com/auth/realms/main/protocol/openid-connect/token";

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub planner: PlannerSettings,
    pub output: OutputConfig,
}

/// Imagery service endpoints and request pacing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Overrides the deployment of the requested collection when set.
    pub base_url: Option<String>,
    pub token_url: String,
    pub request_timeout_secs: u64,
    pub sleep_between_requests_secs: u64,
    pub max_retries: u32,
    pub initial_retry_delay_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            token_url: DEFAULT_TOKEN_URL.to_string(),
            request_timeout_secs: 300,
            sleep_between_requests_secs: 20,
            max_retries: 3,
            initial_retry_delay_secs: 2,
        }
    }
}

/// Planner limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerSettings {
    pub max_tile_pixels: u32,
    /// Parallelize on dates above this many dates.
    pub date_axis_threshold: usize,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            max_tile_pixels: MAX_TILE_PIXELS,
            date_axis_threshold: DispatchThresholds::default().date_axis_min,
        }
    }
}

/// Output handling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub compression: Option<String>,
    pub remove_split_boxes: bool,
    /// Request units again even if a complete scratch directory exists.
    pub overwrite: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            compression: None,
            remove_split_boxes: true,
            overwrite: false,
        }
    }
}

impl Config {
    /// Load from `path`, or defaults when no file is given or it does not exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            debug!("No configuration file given, using defaults");
            return Ok(Self::default());
        };

        if !path.exists() {
            warn!(path = %path.display(), "Configuration file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config = Self::from_yaml_str(&content)
            .with_context(|| format!("Failed to load config file: {}", path.display()))?;

        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Parse YAML after environment substitution, then validate.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content)?;
        // An empty document deserializes to null
        let config: Config = if expanded.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(&expanded).context("Failed to parse YAML")?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.service.request_timeout_secs > 0,
            "service.request_timeout_secs must be greater than 0"
        );
        anyhow::ensure!(
            !self.service.token_url.is_empty(),
            "service.token_url cannot be empty"
        );
        anyhow::ensure!(
            self.planner.max_tile_pixels >= 1,
            "planner.max_tile_pixels must be at least 1"
        );
        if let Some(url) = &self.service.base_url {
            anyhow::ensure!(
                url.starts_with("http://") || url.starts_with("https://"),
                "service.base_url must be an http(s) URL: {}",
                url
            );
        }
        self.compression()
            .map_err(|e| anyhow::anyhow!("output.compression: {}", e))?;
        Ok(())
    }

    pub fn planner_config(&self) -> PlannerConfig {
        PlannerConfig {
            max_tile_pixels: self.planner.max_tile_pixels,
            thresholds: DispatchThresholds {
                date_axis_min: self.planner.date_axis_threshold,
            },
        }
    }

    pub fn compression(&self) -> ImageryResult<Option<RasterCompression>> {
        RasterCompression::parse_optional(self.output.compression.as_deref())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.service.request_timeout_secs)
    }

    pub fn sleep_between_requests(&self) -> Duration {
        Duration::from_secs(self.service.sleep_between_requests_secs)
    }

    pub fn initial_retry_delay(&self) -> Duration {
        Duration::from_secs(self.service.initial_retry_delay_secs)
    }
}

// ============================================================================
// Environment variable substitution
// ============================================================================

/// Expand `${VAR}` and `${VAR:-default}` references.
fn expand_env_vars(content: &str) -> Result<String> {
    let mut result = String::with_capacity(content.len());
    let mut chars = content.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();

            let mut var_expr = String::new();
            let mut depth = 1;
            while depth > 0 {
                match chars.next() {
                    Some('{') => {
                        depth += 1;
                        var_expr.push('{');
                    }
                    Some('}') => {
                        depth -= 1;
                        if depth > 0 {
                            var_expr.push('}');
                        }
                    }
                    Some(c) => var_expr.push(c),
                    None => anyhow::bail!("Unclosed variable substitution: ${{{}", var_expr),
                }
            }

            result.push_str(&resolve_var_expr(&var_expr)?);
        } else {
            result.push(ch);
        }
    }

    Ok(result)
}

fn resolve_var_expr(expr: &str) -> Result<String> {
    if let Some((name, default)) = expr.split_once(":-") {
        match std::env::var(name.trim()) {
            Ok(val) if !val.is_empty() => Ok(val),
            _ => Ok(default.to_string()),
        }
    } else {
        std::env::var(expr.trim()).with_context(|| format!("Environment variable {} not set", expr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.service.request_timeout_secs, 300);
        assert_eq!(config.service.sleep_between_requests_secs, 20);
        assert_eq!(config.service.max_retries, 3);
        assert_eq!(config.planner.max_tile_pixels, 2500);
        assert_eq!(config.planner.date_axis_threshold, 5);
        assert!(config.output.remove_split_boxes);
        assert!(!config.output.overwrite);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = Config::from_yaml_str(
            "service:\n  sleep_between_requests_secs: 0\noutput:\n  compression: lzw\n",
        )
        .unwrap();
        assert_eq!(config.service.sleep_between_requests_secs, 0);
        assert_eq!(config.service.request_timeout_secs, 300);
        assert_eq!(config.compression().unwrap(), Some(RasterCompression::Lzw));
        assert_eq!(config.planner_config(), PlannerConfig::default());
    }

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(Config::from_yaml_str("").unwrap(), Config::default());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(Config::from_yaml_str("service:\n  request_timeout_secs: 0\n").is_err());
        assert!(Config::from_yaml_str("planner:\n  max_tile_pixels: 0\n").is_err());
        assert!(Config::from_yaml_str("output:\n  compression: jpeg\n").is_err());
        assert!(Config::from_yaml_str("service:\n  base_url: ftp://example.com\n").is_err());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = Config::load(Some(Path::new("/nonexistent/tilefetch.yaml"))).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_expand_env_vars_simple() {
        std::env::set_var("TILEFETCH_TEST_URL", "https://example.com");
        let result = expand_env_vars("base_url: ${TILEFETCH_TEST_URL}/api").unwrap();
        assert_eq!(result, "base_url: https://example.com/api");
    }

    #[test]
    fn test_expand_env_vars_with_default() {
        std::env::remove_var("TILEFETCH_UNSET_TIMEOUT");
        let config =
            Config::from_yaml_str("service:\n  request_timeout_secs: ${TILEFETCH_UNSET_TIMEOUT:-60}\n")
                .unwrap();
        assert_eq!(config.request_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_expand_env_vars_missing_required() {
        std::env::remove_var("TILEFETCH_REQUIRED_VAR");
        assert!(expand_env_vars("${TILEFETCH_REQUIRED_VAR}").is_err());
        assert!(expand_env_vars("${UNCLOSED").is_err());
    }

    #[test]
    fn test_resolve_var_expr_override_default() {
        std::env::set_var("TILEFETCH_SET_VAR", "custom");
        assert_eq!(resolve_var_expr("TILEFETCH_SET_VAR:-default").unwrap(), "custom");
    }
}
