//! site-shadow CLI - sun position and shadow studies for a site

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use site_shadow::{
    assess_accuracy, build_grid, compute_instant_shadows, get_solar_times, get_sun_path,
    get_sun_position, validate_result, AnalysisConfig, HeightGrid, ShadowAnalysisResult,
    SunHoursTask, ValidationReport,
};

#[derive(Parser)]
#[command(name = "site-shadow")]
#[command(author, version, about = "Sun position and shadow studies", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sun altitude and azimuth at an instant
    Sun {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lng: f64,
        /// RFC 3339 instant (default: now)
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
    /// Sunrise, solar noon and sunset for a date
    Times {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lng: f64,
        #[arg(long)]
        date: NaiveDate,
        /// IANA time zone for display, e.g. America/New_York
        #[arg(long)]
        tz: Option<String>,
    },
    /// Shadows for a single sun position
    Instant {
        #[arg(short, long)]
        config: PathBuf,
        /// RFC 3339 instant (default: config time, else solar noon)
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
    /// Direct-sun hours across the analysis date
    Daily {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Shadow-edge accuracy estimate for DEM metadata
    Accuracy {
        #[arg(long)]
        cell_size: f64,
        #[arg(long)]
        dem_resolution: f64,
        #[arg(long)]
        dem_vertical_error: f64,
    },
}

#[derive(Serialize)]
struct AnalysisOutput<'a> {
    result: &'a ShadowAnalysisResult,
    validation: &'a ValidationReport,
}

#[derive(Serialize)]
struct LocalTimesOutput {
    sunrise: Option<String>,
    solar_noon: String,
    sunset: Option<String>,
    daylight_hours: f64,
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Warning: failed to install log subscriber: {}", e);
    }
}

fn setup_thread_pool(cpu_cores: usize) {
    info!("Setting up Rayon thread pool with {} cores", cpu_cores);
    if let Err(e) = rayon::ThreadPoolBuilder::new()
        .num_threads(cpu_cores)
        .build_global()
    {
        tracing::warn!("Failed to configure Rayon thread pool: {}", e);
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn load_site(path: &Path) -> Result<(AnalysisConfig, HeightGrid)> {
    let config = AnalysisConfig::from_file(path)
        .with_context(|| format!("Failed to load config {}", path.display()))?;
    setup_thread_pool(config.get_cpu_cores());

    let buildings = config.to_buildings().context("Invalid building footprint")?;
    let start = Instant::now();
    let grid = build_grid(&config.terrain, &buildings, config.bounds, config.cell_size)
        .context("Failed to build height grid")?;
    info!(
        "Height grid {}x{} at {} m with {} buildings ({:.2?})",
        grid.columns(),
        grid.rows(),
        grid.cell_size(),
        grid.building_count(),
        start.elapsed()
    );
    Ok((config, grid))
}

async fn run_daily(config: &AnalysisConfig, grid: HeightGrid) -> Result<ShadowAnalysisResult> {
    let date = config.analysis_date();
    let path = get_sun_path(
        config.site.latitude,
        config.site.longitude,
        date,
        config.step_minutes,
    )?;
    info!(
        "Sun path for {}: {} daylight samples over {:.2} h of daylight",
        date,
        path.len(),
        path.daylight_hours()
    );

    let task = SunHoursTask::spawn(&path, Arc::new(grid), config.step_minutes)?;

    let mut progress = task.progress();
    let total = progress.borrow().total_steps.unwrap_or(0);
    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?,
    );

    let cancel = task.cancel_token();
    let watcher = tokio::spawn({
        let pb = pb.clone();
        async move {
            while progress.changed().await.is_ok() {
                let update = progress.borrow_and_update().clone();
                pb.set_position(update.current_step_number.unwrap_or(0) as u64);
            }
        }
    });
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let result = task.join().await;
    ctrl_c.abort();
    // The sender is dropped with the finished task, ending the watcher loop.
    let _ = watcher.await;
    pb.finish_with_message("Sun-hours calculation complete");

    Ok(result?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Commands::Sun { lat, lng, at } => {
            let position = get_sun_position(lat, lng, at.unwrap_or_else(Utc::now));
            print_json(&position)?;
        }
        Commands::Times { lat, lng, date, tz } => {
            let times = get_solar_times(lat, lng, date);
            match tz {
                None => print_json(&times)?,
                Some(name) => {
                    let tz: Tz = name
                        .parse()
                        .map_err(|e| anyhow::anyhow!("Unknown time zone {}: {}", name, e))?;
                    let local = times.localized(tz);
                    print_json(&LocalTimesOutput {
                        sunrise: local.sunrise.map(|t| t.to_rfc3339()),
                        solar_noon: local.solar_noon.to_rfc3339(),
                        sunset: local.sunset.map(|t| t.to_rfc3339()),
                        daylight_hours: local.daylight_hours,
                    })?;
                }
            }
        }
        Commands::Instant { config, at } => {
            let (config, grid) = load_site(&config)?;
            let site = config.site;
            let instant = match at.or(config.time) {
                Some(t) => t,
                None => get_solar_times(site.latitude, site.longitude, config.analysis_date()).solar_noon,
            };
            let sun = get_sun_position(site.latitude, site.longitude, instant);
            info!(
                "Sun at {}: altitude {:.2}°, azimuth {:.2}°",
                instant, sun.altitude_degrees, sun.azimuth_degrees
            );

            let result = compute_instant_shadows(&sun, &grid)?;
            if let Some(pct) = result.display_percent_shaded() {
                info!("{:.1}% of the site is shaded", pct);
            }
            let validation = validate_result(&result, &config.dem);
            print_json(&AnalysisOutput {
                result: &result,
                validation: &validation,
            })?;
        }
        Commands::Daily { config } => {
            let (config, grid) = load_site(&config)?;
            let start = Instant::now();
            let result = run_daily(&config, grid).await?;
            if let Some(daily) = &result.stats.daily {
                info!(
                    "Mean {:.2} sun hours of {:.2} sampled daylight hours ({:.2?})",
                    daily.mean_sun_hours,
                    daily.sampled_daylight_hours,
                    start.elapsed()
                );
            }
            let validation = validate_result(&result, &config.dem);
            print_json(&AnalysisOutput {
                result: &result,
                validation: &validation,
            })?;
        }
        Commands::Accuracy {
            cell_size,
            dem_resolution,
            dem_vertical_error,
        } => {
            if cell_size <= 0.0 || dem_resolution < 0.0 || dem_vertical_error < 0.0 {
                bail!("cell size must be positive and DEM metadata non-negative");
            }
            print_json(&assess_accuracy(cell_size, dem_vertical_error, dem_resolution))?;
        }
    }

    Ok(())
}
