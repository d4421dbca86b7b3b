//! Landwatch - satellite change detection CLI
//!
//! The `landwatch` command runs the change-detection job pipeline against
//! in-process collaborators.
//!
//! ## Commands
//!
//! - `simulate`: run jobs over synthetic imagery with the worker pool
//! - `config`: print the effective pipeline configuration

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use landwatch_core::{
    JobOutcome, JobPipeline, JobReport, PipelineConfig, PipelineContext, SyntheticImagerySource,
    WorkerPool, ZoneIndexHandle, METRICS,
};
use landwatch_geo::{BBox, FeatureCollection, Geometry, MultiPolygon, Polygon};
use landwatch_state::fakes::{
    MemoryJobQueue, MemoryJobStore, MemoryStorageSink, MemoryZoneRepository,
};
use landwatch_state::{
    AoiId, AreaOfInterest, FsStorageSink, Job, JobId, JobQueue, Priority, ProtectedZone,
    QueueStats, StorageSink,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};

/// Side of a simulated AOI in degrees (64 pixels of 0.0001 degrees)
const AOI_SIZE_DEG: f64 = 0.0064;
/// Gap between neighbouring simulated AOIs in degrees
const AOI_SPACING_DEG: f64 = 0.01;

#[derive(Parser)]
#[command(name = "landwatch")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Satellite change detection job pipeline", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines and reports
    #[arg(long, global = true)]
    json: bool,

    /// Pipeline configuration file (TOML)
    #[arg(long, global = true, env = "LANDWATCH_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run change-detection jobs over synthetic imagery
    Simulate {
        /// Number of jobs (one AOI each)
        #[arg(short, long, default_value = "4")]
        jobs: usize,

        /// Worker count (default: from configuration)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Seed for the synthetic imagery
        #[arg(short, long, default_value = "7")]
        seed: u64,

        /// How many of the jobs go to the high-priority lane
        #[arg(long, default_value = "0")]
        high_priority: usize,

        /// Protected zones as a GeoJSON FeatureCollection
        /// (default: generated zones over every other AOI)
        #[arg(long)]
        zones: Option<PathBuf>,

        /// Write artifacts to this directory instead of memory
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Print the effective pipeline configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    landwatch_core::init_tracing(cli.json, level);

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Simulate {
            jobs,
            workers,
            seed,
            high_priority,
            zones,
            out,
        } => {
            let options = SimulateOptions {
                jobs,
                workers,
                seed,
                high_priority,
                zones,
                out,
            };
            cmd_simulate(config, &options, cli.json).await
        }
        Commands::Config => cmd_config(&config, cli.json),
    }
}

/// Configuration file if given, defaults otherwise.
fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => Ok(PipelineConfig::default()),
    }
}

/// Print the effective configuration
fn cmd_config(config: &PipelineConfig, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(config)?);
    } else {
        print!("{}", config.to_toml_string()?);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// simulate
// ---------------------------------------------------------------------------

struct SimulateOptions {
    jobs: usize,
    workers: Option<usize>,
    seed: u64,
    high_priority: usize,
    zones: Option<PathBuf>,
    out: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct SimulationOutput {
    reports: Vec<JobReport>,
    failures: Vec<(JobId, String)>,
    completed: usize,
    failed: usize,
    cancelled: usize,
    detections: usize,
    flagged: usize,
    degraded: usize,
}

impl SimulationOutput {
    fn new(reports: Vec<JobReport>, failures: Vec<(JobId, String)>) -> Self {
        let count = |outcome: JobOutcome| reports.iter().filter(|r| r.outcome == outcome).count();
        Self {
            completed: count(JobOutcome::Completed),
            failed: count(JobOutcome::Failed),
            cancelled: count(JobOutcome::Cancelled),
            detections: reports.iter().map(|r| r.detection_count).sum(),
            flagged: reports.iter().map(|r| r.flagged_count).sum(),
            degraded: reports.iter().filter(|r| r.degraded).count(),
            reports,
            failures,
        }
    }
}

/// AOI `index` of the simulated strip along the equator.
fn simulated_aoi(index: usize) -> AreaOfInterest {
    let min_x = 30.0 + index as f64 * AOI_SPACING_DEG;
    let bbox = BBox::new(min_x, -2.0, min_x + AOI_SIZE_DEG, -2.0 + AOI_SIZE_DEG);
    AreaOfInterest {
        id: AoiId(format!("aoi-{index:03}")),
        name: format!("site {index}"),
        geometry: Geometry::Polygon(Polygon::rectangle(&bbox)),
        owner: "simulator".into(),
    }
}

/// One zone over the western half of every other AOI.
fn generated_zones(aois: &[AreaOfInterest]) -> Vec<ProtectedZone> {
    aois.iter()
        .enumerate()
        .filter(|(i, _)| i % 2 == 0)
        .filter_map(|(i, aoi)| {
            let b = aoi.geometry.bbox()?;
            let west = BBox::new(b.min_x, b.min_y, (b.min_x + b.max_x) / 2.0, b.max_y);
            let zone_type = if i % 4 == 0 { "FOREST" } else { "WATER_BODY" };
            Some(ProtectedZone::new(
                format!("zone-{i:03}"),
                format!("{} buffer", aoi.name),
                zone_type,
                Polygon::rectangle(&west),
            ))
        })
        .collect()
}

/// Read protected zones from a GeoJSON FeatureCollection.
///
/// `name`, `zone_type` and `active` are read from the feature properties.
fn load_zones(path: &Path) -> Result<Vec<ProtectedZone>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read zones from {}", path.display()))?;
    let collection: FeatureCollection = serde_json::from_str(&text)
        .with_context(|| format!("{} is not a GeoJSON FeatureCollection", path.display()))?;

    let zones = collection
        .features
        .into_iter()
        .enumerate()
        .map(|(i, feature)| {
            let id = feature.id.clone().unwrap_or_else(|| format!("zone-{i}"));
            let name = feature.property_str("name").unwrap_or(&id).to_string();
            let zone_type = feature.property_str("zone_type").unwrap_or("PROTECTED").to_string();
            let active = feature
                .properties
                .get("active")
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(true);
            let geometry = match feature.geometry {
                Geometry::Polygon(p) => MultiPolygon::from(p),
                Geometry::MultiPolygon(m) => m,
            };
            let mut zone = ProtectedZone::new(id, name, zone_type, geometry);
            zone.active = active;
            zone
        })
        .collect();
    Ok(zones)
}

fn date(y: i32, m: u32, d: u32) -> Result<NaiveDate> {
    NaiveDate::from_ymd_opt(y, m, d).with_context(|| format!("invalid date {y}-{m}-{d}"))
}

/// Build in-memory collaborators, enqueue the jobs and drain the queue.
async fn run_simulation(
    mut config: PipelineConfig,
    options: &SimulateOptions,
) -> Result<(SimulationOutput, QueueStats)> {
    if let Some(workers) = options.workers {
        config.worker.workers = workers;
    }
    config.validate().context("Invalid configuration")?;

    let store = Arc::new(MemoryJobStore::new());
    let queue = Arc::new(MemoryJobQueue::new());
    let sink: Arc<dyn StorageSink> = match &options.out {
        Some(dir) => Arc::new(
            FsStorageSink::new(dir)
                .with_context(|| format!("Failed to open artifact directory {}", dir.display()))?,
        ),
        None => Arc::new(MemoryStorageSink::new()),
    };

    let aois: Vec<AreaOfInterest> = (0..options.jobs).map(simulated_aoi).collect();
    let zones = match &options.zones {
        Some(path) => load_zones(path)?,
        None => generated_zones(&aois),
    };
    let repo = MemoryZoneRepository::new(zones);
    let index = Arc::new(ZoneIndexHandle::default());
    let zone_count = index
        .refresh(&repo)
        .await
        .context("Failed to load protected zones")?;

    let imagery = SyntheticImagerySource::new(options.seed)
        .with_construction_period(date(2024, 2, 1)?, 240);
    let worker_config = config.worker.clone();
    let ctx = PipelineContext::new(
        config,
        store.clone(),
        sink,
        queue.clone(),
        Arc::new(imagery),
        index,
    );
    let pipeline = JobPipeline::new(ctx);

    let (from, to) = (date(2024, 1, 10)?, date(2024, 12, 10)?);
    for (i, aoi) in aois.into_iter().enumerate() {
        let priority = if i < options.high_priority {
            Priority::High
        } else {
            Priority::Normal
        };
        let job = Job::new(aoi.id.clone(), from, to)
            .with_id(JobId(format!("job-{i:03}")))
            .with_priority(priority);
        let job_id = job.id.clone();
        store.insert_aoi(aoi);
        store.insert_job(job);
        queue
            .enqueue(job_id, priority)
            .await
            .context("Failed to enqueue job")?;
    }
    info!(
        jobs = options.jobs,
        zones = zone_count,
        workers = worker_config.workers,
        "simulation queued"
    );

    let pool = WorkerPool::new(pipeline, queue.clone(), worker_config);
    let summary = pool.drain().await;
    let stats = queue.stats().await.context("Failed to read queue stats")?;
    Ok((SimulationOutput::new(summary.reports, summary.failures), stats))
}

/// Run a simulation and print one line per job
async fn cmd_simulate(
    config: PipelineConfig,
    options: &SimulateOptions,
    json: bool,
) -> Result<()> {
    let (output, stats) = run_simulation(config, options).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    for report in &output.reports {
        let mut line = format!(
            "  {} {:<9} {:>3}%  detections {} (flagged {})",
            report.job_id,
            report.status.as_str(),
            report.progress,
            report.detection_count,
            report.flagged_count
        );
        if report.degraded {
            line.push_str("  [fallback]");
        }
        if let Some(error) = &report.error {
            line.push_str(&format!("  error: {error}"));
        }
        println!("{line}");
    }
    for (job_id, error) in &output.failures {
        println!("  {job_id} aborted: {error}");
    }

    println!();
    println!(
        "Jobs: {} completed, {} failed, {} cancelled ({} acknowledged by the queue)",
        output.completed, output.failed, output.cancelled, stats.completed
    );
    println!(
        "Detections: {} ({} flagged), degraded runs: {}",
        output.detections, output.flagged, output.degraded
    );
    println!(
        "Totals since start: {} jobs completed, {} detections",
        METRICS.jobs_completed(),
        METRICS.detections()
    );
    Ok(())
}
