//! Talweg CLI - drainage routing on DEMs

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use talweg_algorithms::hydrology::{
    fill_sinks_with_progress, flow_direction, flow_distance_with_progress,
    flow_length_with_progress, melton_ruggedness_with_progress, FillSinksParams,
    FlowDistanceGrids, FlowDistanceParams, FlowLengthParams, FlowRouting, MfdParams,
};
use talweg_core::io::{read_geotiff, write_geotiff};
use talweg_core::{Progress, Raster, RasterElement};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "talweg")]
#[command(author, version, about = "Drainage routing on digital elevation models", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Cancel a tool that runs longer than this many seconds
    #[arg(long, global = true, value_name = "SECS")]
    time_limit: Option<f64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show information about a raster file
    Info {
        /// Input raster file
        input: PathBuf,
    },
    /// Hydrology tools
    Hydrology {
        #[command(subcommand)]
        algorithm: HydrologyCommands,
    },
}

// ─── Hydrology subcommands ──────────────────────────────────────────────

#[derive(Subcommand)]
enum HydrologyCommands {
    /// Fill sinks by raising pits above their lowest neighbor
    FillSinks {
        /// Input DEM file
        input: PathBuf,
        /// Output file (filled DEM)
        output: PathBuf,
        /// Also write the fill depth grid
        #[arg(long)]
        sinks: Option<PathBuf>,
        /// Height added above the lowest neighbor
        #[arg(long)]
        epsilon: Option<f64>,
        /// Parameters as JSON
        #[arg(long)]
        params: Option<PathBuf>,
    },
    /// D8 flow direction from DEM
    FlowDirection {
        /// Input DEM file
        input: PathBuf,
        /// Output file (0 = E, counter-clockwise to 7 = SE; -1 = no outflow)
        output: PathBuf,
    },
    /// Average flow path length from ridges or seed cells
    FlowLength {
        /// Input DEM file
        input: PathBuf,
        /// Output file (map units)
        output: PathBuf,
        /// Seed grid: paths start at valid, non-zero cells
        #[arg(long)]
        seeds: Option<PathBuf>,
        /// Only trace paths that start at a seed
        #[arg(long)]
        seeds_only: bool,
        #[command(flatten)]
        routing: RoutingArgs,
        /// Parameters as JSON
        #[arg(long)]
        params: Option<PathBuf>,
    },
    /// Overland flow distance to a channel network
    FlowDistance {
        /// Input DEM file
        input: PathBuf,
        /// Output file (distance along the surface)
        output: PathBuf,
        /// Channel grid: every valid cell is a channel cell
        #[arg(long)]
        channels: PathBuf,
        /// Treat the channel grid as a 0/1 mask: only non-zero cells count
        #[arg(long)]
        nonzero_channels: bool,
        /// Preferred routes: flow goes to valid route cells when it can
        #[arg(long)]
        route: Option<PathBuf>,
        /// Field ids; boundary crossings are counted into --passes (D8 only)
        #[arg(long)]
        fields: Option<PathBuf>,
        /// Also write the horizontal distance
        #[arg(long)]
        horizontal: Option<PathBuf>,
        /// Also write the vertical distance
        #[arg(long)]
        vertical: Option<PathBuf>,
        /// Also write the overland travel time in hours
        #[arg(long)]
        time: Option<PathBuf>,
        /// Also write the sediment delivery ratio
        #[arg(long)]
        sdr: Option<PathBuf>,
        /// Also write the number of field boundaries crossed
        #[arg(long)]
        passes: Option<PathBuf>,
        #[command(flatten)]
        travel: TravelArgs,
        #[command(flatten)]
        routing: RoutingArgs,
        /// Parameters as JSON
        #[arg(long)]
        params: Option<PathBuf>,
    },
    /// Melton ruggedness number
    Melton {
        /// Input DEM file
        input: PathBuf,
        /// Output file (ruggedness)
        output: PathBuf,
        /// Also write the upslope area (map units squared)
        #[arg(long)]
        area: Option<PathBuf>,
        /// Also write the highest upslope elevation
        #[arg(long)]
        max_height: Option<PathBuf>,
    },
}

#[derive(Args)]
struct RoutingArgs {
    /// Routing method
    #[arg(long, value_enum)]
    method: Option<Method>,
    /// MFD convergence exponent
    #[arg(long)]
    convergence: Option<f64>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Method {
    D8,
    Mfd,
}

impl RoutingArgs {
    /// Override `base` with whatever was given on the command line
    fn apply(&self, base: FlowRouting) -> FlowRouting {
        let base_convergence = match base {
            FlowRouting::Mfd { convergence } => Some(convergence),
            FlowRouting::D8 => None,
        };
        let method = self.method.unwrap_or(match base {
            FlowRouting::D8 if self.convergence.is_some() => Method::Mfd,
            FlowRouting::D8 => Method::D8,
            FlowRouting::Mfd { .. } => Method::Mfd,
        });
        match method {
            Method::D8 => FlowRouting::D8,
            Method::Mfd => FlowRouting::Mfd {
                convergence: self
                    .convergence
                    .or(base_convergence)
                    .unwrap_or(MfdParams::default().convergence),
            },
        }
    }
}

#[derive(Args)]
struct TravelArgs {
    /// Manning-Strickler coefficient
    #[arg(long)]
    manning_k: Option<f64>,
    /// Manning-Strickler coefficient per cell; no-data falls back to --manning-k
    #[arg(long)]
    manning_k_grid: Option<PathBuf>,
    /// Flow depth in metres
    #[arg(long)]
    flow_depth: Option<f64>,
    /// Flow depth per cell; no-data falls back to --flow-depth
    #[arg(long)]
    flow_depth_grid: Option<PathBuf>,
    /// Sediment delivery decay per hour of travel
    #[arg(long)]
    beta: Option<f64>,
}

impl TravelArgs {
    /// Override the travel time constants of `base`
    fn apply(&self, base: FlowDistanceParams) -> FlowDistanceParams {
        FlowDistanceParams {
            manning_k: self.manning_k.unwrap_or(base.manning_k),
            flow_depth: self.flow_depth.unwrap_or(base.flow_depth),
            beta: self.beta.unwrap_or(base.beta),
            ..base
        }
    }
}

// ─── Progress ───────────────────────────────────────────────────────────

/// Progress bar that also enforces `--time-limit`
struct BarProgress {
    bar: ProgressBar,
    deadline: Option<Instant>,
}

impl BarProgress {
    fn new(msg: &str, time_limit: Option<f64>) -> Self {
        let bar = ProgressBar::new(0);
        if let Ok(style) =
            ProgressStyle::with_template("{msg} [{bar:40.cyan/blue}] {percent}% ({eta})")
        {
            bar.set_style(style.progress_chars("=> "));
        }
        bar.set_message(msg.to_string());
        let deadline = time_limit
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            .and_then(|limit| Instant::now().checked_add(limit));
        Self { bar, deadline }
    }

    fn finish(self) {
        self.bar.finish_and_clear();
    }
}

impl Progress for BarProgress {
    fn update(&mut self, done: usize, total: usize) -> bool {
        if self.bar.length() != Some(total as u64) {
            self.bar.set_length(total as u64);
        }
        self.bar.set_position(done as u64);
        self.deadline.map_or(true, |deadline| Instant::now() < deadline)
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn read_raster(path: &Path) -> Result<Raster<f64>> {
    let pb = spinner("Reading raster...");
    let raster: Raster<f64> = read_geotiff(path)
        .with_context(|| format!("Failed to read raster {}", path.display()))?;
    pb.finish_and_clear();
    info!("Input: {} x {}", raster.cols(), raster.rows());
    Ok(raster)
}

fn write_result<T: RasterElement>(raster: &Raster<T>, path: &Path) -> Result<()> {
    let pb = spinner("Writing output...");
    write_geotiff(raster, path)
        .with_context(|| format!("Failed to write output {}", path.display()))?;
    pb.finish_and_clear();
    Ok(())
}

fn write_optional<T: RasterElement>(
    raster: Option<&Raster<T>>,
    path: Option<&Path>,
) -> Result<()> {
    match (raster, path) {
        (Some(raster), Some(path)) => {
            write_result(raster, path)?;
            println!("  also saved: {}", path.display());
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Tool parameters from a JSON file, or the defaults
fn load_params<T: DeserializeOwned + Default>(path: Option<&Path>) -> Result<T> {
    let Some(path) = path else {
        return Ok(T::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read parameters {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("Invalid parameters in {}", path.display()))
}

/// Run a tool; a cancelled run is reported and yields `None`
fn run<T>(
    name: &str,
    time_limit: Option<f64>,
    tool: impl FnOnce(&mut BarProgress) -> talweg_core::Result<T>,
) -> Result<Option<T>> {
    let mut progress = BarProgress::new(name, time_limit);
    let start = Instant::now();
    let result = tool(&mut progress);
    progress.finish();

    match result {
        Ok(value) => {
            debug!("{} finished in {:.2?}", name, start.elapsed());
            Ok(Some(value))
        }
        Err(e) if e.is_cancelled() => {
            warn!("{} cancelled after {:.2?}: time limit reached", name, start.elapsed());
            Ok(None)
        }
        Err(e) => Err(e).with_context(|| format!("{name} failed")),
    }
}

fn done(name: &str, path: &Path, elapsed: Duration) {
    println!("{} saved to: {}", name, path.display());
    println!("  Processing time: {:.2?}", elapsed);
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;
    let limit = cli.time_limit;

    match cli.command {
        // ── Info ─────────────────────────────────────────────────────
        Commands::Info { input } => {
            let raster = read_raster(&input)?;
            let (rows, cols) = raster.shape();
            let bounds = raster.bounds();
            let stats = raster.statistics();

            println!("File: {}", input.display());
            println!("Dimensions: {} x {} ({} cells)", cols, rows, raster.len());
            println!("Cell size: {}", raster.cell_size());
            println!(
                "Bounds: ({:.6}, {:.6}) - ({:.6}, {:.6})",
                bounds.0, bounds.1, bounds.2, bounds.3
            );
            if let Some(nodata) = raster.nodata() {
                println!("NoData: {}", nodata);
            }
            println!("\nStatistics:");
            if let Some(min) = stats.min {
                println!("  Min: {:.4}", min);
            }
            if let Some(max) = stats.max {
                println!("  Max: {:.4}", max);
            }
            if let Some(mean) = stats.mean {
                println!("  Mean: {:.4}", mean);
            }
            println!(
                "  Valid cells: {} ({:.1}%)",
                stats.valid_count,
                100.0 * stats.valid_count as f64 / raster.len() as f64
            );
        }

        // ── Hydrology ────────────────────────────────────────────────
        Commands::Hydrology { algorithm } => match algorithm {
            HydrologyCommands::FillSinks {
                input,
                output,
                sinks,
                epsilon,
                params,
            } => {
                let mut params: FillSinksParams = load_params(params.as_deref())?;
                if let Some(epsilon) = epsilon {
                    params.epsilon = epsilon;
                }
                let dem = read_raster(&input)?;
                let start = Instant::now();
                let Some(result) = run("Fill sinks", limit, |p| {
                    fill_sinks_with_progress(&dem, params, p)
                })?
                else {
                    return Ok(());
                };
                let elapsed = start.elapsed();
                write_result(&result.filled, &output)?;
                done("Fill sinks", &output, elapsed);
                write_optional(Some(&result.sinks), sinks.as_deref())?;
            }

            HydrologyCommands::FlowDirection { input, output } => {
                let dem = read_raster(&input)?;
                let start = Instant::now();
                let result =
                    flow_direction(&dem).context("Failed to calculate flow direction")?;
                let elapsed = start.elapsed();
                write_result(&result, &output)?;
                done("Flow direction", &output, elapsed);
            }

            HydrologyCommands::FlowLength {
                input,
                output,
                seeds,
                seeds_only,
                routing,
                params,
            } => {
                let mut params: FlowLengthParams = load_params(params.as_deref())?;
                params.routing = routing.apply(params.routing);
                params.seeds_only |= seeds_only;
                if params.seeds_only && seeds.is_none() {
                    anyhow::bail!("--seeds-only requires a --seeds grid");
                }

                let dem = read_raster(&input)?;
                let seeds = seeds.as_deref().map(read_raster).transpose()?;
                let start = Instant::now();
                let Some(result) = run("Flow length", limit, |p| {
                    flow_length_with_progress(&dem, seeds.as_ref(), params, p)
                })?
                else {
                    return Ok(());
                };
                let elapsed = start.elapsed();
                write_result(&result, &output)?;
                done("Flow length", &output, elapsed);
            }

            HydrologyCommands::FlowDistance {
                input,
                output,
                channels,
                nonzero_channels,
                route,
                fields,
                horizontal,
                vertical,
                time,
                sdr,
                passes,
                travel,
                routing,
                params,
            } => {
                let mut params: FlowDistanceParams = load_params(params.as_deref())?;
                params.routing = routing.apply(params.routing);
                params = travel.apply(params);
                params.nonzero_channels |= nonzero_channels;
                params.travel_time |= time.is_some() || sdr.is_some();
                if passes.is_some() && fields.is_none() {
                    anyhow::bail!("--passes requires a --fields grid");
                }

                let dem = read_raster(&input)?;
                let channels = read_raster(&channels)?;
                let read = |path: Option<PathBuf>| path.as_deref().map(read_raster).transpose();
                let route = read(route)?;
                let fields = read(fields)?;
                let manning_k = read(travel.manning_k_grid)?;
                let flow_depth = read(travel.flow_depth_grid)?;
                let grids = FlowDistanceGrids {
                    route: route.as_ref(),
                    fields: fields.as_ref(),
                    manning_k: manning_k.as_ref(),
                    flow_depth: flow_depth.as_ref(),
                };

                let start = Instant::now();
                let Some(result) = run("Flow distance", limit, |p| {
                    flow_distance_with_progress(&dem, &channels, grids, params, p)
                })?
                else {
                    return Ok(());
                };
                let elapsed = start.elapsed();
                write_result(&result.distance, &output)?;
                done("Flow distance", &output, elapsed);
                write_optional(Some(&result.horizontal), horizontal.as_deref())?;
                write_optional(Some(&result.vertical), vertical.as_deref())?;
                write_optional(result.time.as_ref(), time.as_deref())?;
                write_optional(result.sdr.as_ref(), sdr.as_deref())?;
                write_optional(result.passes.as_ref(), passes.as_deref())?;
            }

            HydrologyCommands::Melton {
                input,
                output,
                area,
                max_height,
            } => {
                let dem = read_raster(&input)?;
                let start = Instant::now();
                let Some(result) = run("Melton ruggedness", limit, |p| {
                    melton_ruggedness_with_progress(&dem, p)
                })?
                else {
                    return Ok(());
                };
                let elapsed = start.elapsed();
                write_result(&result.ruggedness, &output)?;
                done("Melton ruggedness", &output, elapsed);
                write_optional(Some(&result.area), area.as_deref())?;
                write_optional(Some(&result.max_height), max_height.as_deref())?;
            }
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn routing_args(method: Option<Method>, convergence: Option<f64>) -> RoutingArgs {
        RoutingArgs {
            method,
            convergence,
        }
    }

    #[test]
    fn test_cli_parses_flow_length() {
        let cli = Cli::try_parse_from([
            "talweg",
            "--time-limit",
            "5",
            "hydrology",
            "flow-length",
            "dem.tif",
            "len.tif",
            "--method",
            "mfd",
            "--convergence",
            "2.5",
        ])
        .unwrap();
        assert_eq!(cli.time_limit, Some(5.0));
        match cli.command {
            Commands::Hydrology {
                algorithm: HydrologyCommands::FlowLength { routing, .. },
            } => {
                assert_eq!(
                    routing.apply(FlowRouting::D8),
                    FlowRouting::Mfd { convergence: 2.5 }
                );
            }
            _ => panic!("wrong subcommand"),
        }
    }

    #[test]
    fn test_routing_flags_override_params() {
        let from_file = FlowRouting::Mfd { convergence: 3.0 };
        assert_eq!(routing_args(None, None).apply(from_file), from_file);
        assert_eq!(
            routing_args(Some(Method::D8), None).apply(from_file),
            FlowRouting::D8
        );
        assert_eq!(
            routing_args(None, Some(1.5)).apply(FlowRouting::D8),
            FlowRouting::Mfd { convergence: 1.5 }
        );
        assert_eq!(
            routing_args(Some(Method::Mfd), None).apply(FlowRouting::D8),
            FlowRouting::mfd()
        );
    }

    #[test]
    fn test_load_params_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("params.json");
        std::fs::write(&path, r#"{"routing":{"method":"mfd","convergence":4.0}}"#).unwrap();

        let params: FlowLengthParams = load_params(Some(path.as_path())).unwrap();
        assert_eq!(params.routing, FlowRouting::Mfd { convergence: 4.0 });
        assert!(!params.seeds_only);

        let defaults: FillSinksParams = load_params(None).unwrap();
        assert_eq!(defaults.epsilon, 0.01);
    }

    #[test]
    fn test_cli_parses_flow_distance_extras() {
        let cli = Cli::try_parse_from([
            "talweg",
            "hydrology",
            "flow-distance",
            "dem.tif",
            "dist.tif",
            "--channels",
            "chnl.tif",
            "--nonzero-channels",
            "--route",
            "route.tif",
            "--fields",
            "fields.tif",
            "--passes",
            "passes.tif",
            "--sdr",
            "sdr.tif",
            "--manning-k",
            "35",
            "--beta",
            "0.5",
        ])
        .unwrap();
        match cli.command {
            Commands::Hydrology {
                algorithm:
                    HydrologyCommands::FlowDistance {
                        nonzero_channels,
                        route,
                        passes,
                        time,
                        travel,
                        ..
                    },
            } => {
                assert!(nonzero_channels);
                assert_eq!(route, Some(PathBuf::from("route.tif")));
                assert_eq!(passes, Some(PathBuf::from("passes.tif")));
                assert!(time.is_none());

                let params = travel.apply(FlowDistanceParams::default());
                assert_eq!(params.manning_k, 35.0);
                assert_eq!(params.flow_depth, 0.05);
                assert_eq!(params.beta, 0.5);
            }
            _ => panic!("expected flow-distance"),
        }
    }

    #[test]
    fn test_time_limit_cancels() {
        let mut progress = BarProgress::new("test", Some(0.0));
        assert!(!progress.update(1, 10));
        let mut unlimited = BarProgress::new("test", None);
        assert!(unlimited.update(1, 10));
    }
}
