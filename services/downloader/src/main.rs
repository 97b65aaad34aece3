//! tilefetch: download satellite imagery over an area and a date range.
//!
//! Large footprints are split into cells that the service can render at
//! the requested resolution, downloaded in parallel and merged back into
//! one raster per acquisition date.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{ArgGroup, Parser};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use imagery_common::{BoundingBox, Crs, DataCollection, RasterCompression, TimeInterval};
use tile_planner::{plan::plan, DownloadStrategy, Query};
use tilefetch::{
    area::lookup_area, catalog::search_dates, evalscript::resolve_evalscript, Config, Credentials,
    ExecutorConfig, Pipeline, RetryPolicy, SentinelHubClient, TokenProvider,
};

#[derive(Parser, Debug)]
#[command(name = "tilefetch")]
#[command(about = "Download satellite imagery, splitting large areas into tiles and merging them back")]
#[command(group(ArgGroup::new("footprint").required(true).args(["bbox", "area"])))]
#[command(group(ArgGroup::new("when").required(true).args(["days", "date"])))]
struct Args {
    /// Footprint as min_lon,min_lat,max_lon,max_lat
    #[arg(long, allow_hyphen_values = true)]
    bbox: Option<String>,

    /// Named area looked up in the geometry directory
    #[arg(long)]
    area: Option<String>,

    /// Directory of GeoJSON area files
    #[arg(long, env = "TILEFETCH_GEOMETRY_DIR", default_value = "data")]
    geometry_dir: PathBuf,

    /// Number of days back from today
    #[arg(long, allow_hyphen_values = true)]
    days: Option<i64>,

    /// Acquisition date (YYYY-MM-DD); two dates form an inclusive range
    #[arg(long)]
    date: Vec<String>,

    /// Data collection
    #[arg(long, default_value = "SENTINEL2_L2A")]
    collection: DataCollection,

    /// Evaluation script: inline text, http(s) URL, or @file
    #[arg(long)]
    evalscript: Option<String>,

    /// Ground resolution in meters
    #[arg(long)]
    resolution: Option<u32>,

    /// Download strategy (direct / D, split-and-merge / SM)
    #[arg(long, default_value = "SM")]
    strategy: DownloadStrategy,

    /// Worker pool size
    #[arg(long)]
    workers: Option<usize>,

    /// Download one unit at a time
    #[arg(long)]
    sequential: bool,

    /// Output directory (default: ~/Downloads/tilefetch[/AREA])
    #[arg(long, env = "TILEFETCH_STORE_DIR")]
    store_dir: Option<PathBuf>,

    /// Keep per-box rasters after merging
    #[arg(long)]
    keep_split_boxes: bool,

    /// Compression of merged rasters (DEFLATE, LZW, PACKBITS)
    #[arg(long)]
    compression: Option<String>,

    /// Two-line file with client id and secret
    #[arg(long, env = "TILEFETCH_CREDENTIALS")]
    credentials: Option<PathBuf>,

    /// YAML configuration file
    #[arg(long, env = "TILEFETCH_CONFIG")]
    config: Option<PathBuf>,

    /// Only download dates with catalogued acquisitions
    #[arg(long)]
    catalog_search: bool,

    /// Print the plan as JSON and exit
    #[arg(long)]
    plan_only: bool,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Log as JSON lines
    #[arg(long)]
    log_json: bool,

    /// Shorthand for --log-level debug
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(args: &Args) -> Result<()> {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        match args.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    };

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true);

    if args.log_json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

/// Default store: `~/Downloads/tilefetch`, plus the area name when known.
fn default_store_dir(area: Option<&str>) -> PathBuf {
    let home = std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let root = home.join("Downloads").join("tilefetch");
    match area {
        Some(name) => root.join(name),
        None => root,
    }
}

fn build_client(config: &Config, collection: DataCollection, credentials_path: Option<&Path>) -> Result<SentinelHubClient> {
    let path = credentials_path.context("--credentials (or TILEFETCH_CREDENTIALS) is required to contact the service")?;
    let credentials = Credentials::from_file(path)?;

    let http = reqwest::Client::builder()
        .timeout(config.request_timeout())
        .connect_timeout(Duration::from_secs(30))
        .tcp_nodelay(true)
        .build()
        .context("Failed to create HTTP client")?;

    let base_url = config
        .service
        .base_url
        .clone()
        .unwrap_or_else(|| collection.service_url().to_string());
    let tokens = TokenProvider::new(http.clone(), config.service.token_url.clone(), credentials);
    let retry = RetryPolicy {
        max_retries: config.service.max_retries,
        initial_delay: config.initial_retry_delay(),
        ..RetryPolicy::default()
    };
    Ok(SentinelHubClient::new(http, base_url, tokens, retry))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_tracing(&args)?;

    let config = Config::load(args.config.as_deref())?;

    // Footprint
    let (bbox, area_name) = match (&args.bbox, &args.area) {
        (Some(bbox), _) => (BoundingBox::from_list_string(bbox, Crs::Wgs84)?, None),
        (None, Some(name)) => {
            let area = lookup_area(&args.geometry_dir, name)?;
            (area.bbox, Some(area.name))
        }
        (None, None) => anyhow::bail!("either --bbox or --area is required"),
    };

    // Dates
    let interval = match args.days {
        Some(days) => TimeInterval::DaysBack(days),
        None => TimeInterval::from_date_strings(&args.date)?,
    };

    let compression = match &args.compression {
        Some(name) => Some(name.parse::<RasterCompression>()?),
        None => config.compression()?,
    };

    let mut query = Query::new(bbox, interval, args.collection);
    query.store_dir = args
        .store_dir
        .clone()
        .unwrap_or_else(|| default_store_dir(area_name.as_deref()));
    query.area_name = area_name;
    query.resolution = args.resolution;
    query.strategy = args.strategy;
    query.workers = args.workers;
    query.sequential = args.sequential;
    query.evalscript = args.evalscript.clone();
    query.compression = compression;
    query.remove_split_boxes = config.output.remove_split_boxes && !args.keep_split_boxes;

    let mut dates = query.expand_dates(Utc::now().date_naive())?;
    info!(
        bbox = %query.bbox,
        collection = %query.collection,
        dates = dates.len(),
        "Query received"
    );

    let client = if args.plan_only {
        None
    } else {
        Some(build_client(&config, query.collection, args.credentials.as_deref())?)
    };

    if args.catalog_search {
        match &client {
            Some(client) => {
                dates = search_dates(client, &query.bbox, query.collection, &dates).await?;
            }
            None => warn!("Catalog search skipped in plan-only mode"),
        }
    }

    let plan = plan(&query, &dates, &config.planner_config())?;

    let Some(client) = client else {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    };

    let http = reqwest::Client::new();
    let evalscript = resolve_evalscript(query.evalscript.as_deref(), query.collection, &http).await?;

    let executor = ExecutorConfig {
        request_timeout: config.request_timeout(),
        sleep_between_requests: config.sleep_between_requests(),
        overwrite: config.output.overwrite,
        ..ExecutorConfig::new(&query.store_dir)
    };
    let pipeline = Pipeline::new(Arc::new(client), executor);
    let manifest = pipeline.run(&plan, &evalscript).await?;

    info!(
        run_id = %manifest.run_id,
        files = manifest.files.len(),
        mosaics = manifest.mosaics.len(),
        empty = manifest.empty.len(),
        failures = manifest.failures.len(),
        "Done"
    );
    Ok(())
}
