use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use bus_punctuality::io::{load_live_dump, load_route_data};
use bus_punctuality::{
    Analyzer, BadStop, HistogramBin, LongestRoute, PipelineStats, PunctualityReport, SpeedGridCell,
    StopPunctuality, VehicleDistance,
};
use clap::Parser;
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(
    name = "bus-punctuality",
    author,
    version,
    about = "Measure bus punctuality, speed and distance for one hour of live GPS data",
    long_about = "Reconciles a live GPS dump with the network's routes and timetable.\n\n\
                  Every aggregate is computed for the target hour: speed samples and the \
                  speed grid, punctuality against the timetable, per-stop lateness and the \
                  longest vehicle tracks. The result is written as one JSON report."
)]
struct Args {
    /// Network JSON with stops, route variants and timetable
    #[arg(short, long)]
    routes: PathBuf,

    /// Live GPS dump JSON
    #[arg(short, long)]
    pings: PathBuf,

    /// Target hour (0-23)
    #[arg(long)]
    hour: u32,

    /// Minutes late before a departure counts against its stop
    #[arg(short, long, default_value = "3")]
    tolerance: i64,

    /// Number of longest vehicle tracks to report
    #[arg(short = 'k', long, default_value = "5")]
    top_k: usize,

    /// Leave vehicles with implausibly fast segments out of the longest tracks
    #[arg(long)]
    exclude_measurement_errors: bool,

    /// Output JSON file (stdout if omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Verbose output (show debug messages)
    #[arg(short, long)]
    verbose: bool,
}

const SPEED_DELIMITERS: [f64; 7] = [0.0, 10.0, 20.0, 30.0, 40.0, 50.0, 60.0];
const PUNCTUALITY_DELIMITERS: [i64; 4] = [1, 3, 5, 10];
const FAST_PLACE_MIN_SAMPLES: usize = 10;
const FAST_PLACE_MIN_RATIO: f64 = 0.5;
const BAD_STOP_MIN_RECORDS: usize = 3;
const BAD_STOP_MIN_RATIO: f64 = 0.5;

#[derive(Serialize)]
struct Report<'a> {
    hour: u32,
    malformed_pings: usize,
    speed_samples: usize,
    speed_histogram: Vec<HistogramBin>,
    fast_places: Vec<&'a SpeedGridCell>,
    punctuality: &'a PunctualityReport,
    pipeline: Option<&'a PipelineStats>,
    boundary_inaccuracy_percentage: f64,
    punctuality_histogram: Vec<HistogramBin>,
    stop_punctuality: &'a [StopPunctuality],
    bad_stops: Vec<BadStop>,
    vehicle_distances: &'a [VehicleDistance],
    longest_routes: &'a [LongestRoute],
}

fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(if args.verbose { "debug" } else { "info" }),
    )
    .format_timestamp(None)
    .init();

    if args.hour > 23 {
        bail!("Hour must be between 0 and 23, got {}", args.hour);
    }

    log::info!("Routes: {}", args.routes.display());
    log::info!("Pings: {}", args.pings.display());

    let routes = File::open(&args.routes)
        .with_context(|| format!("Failed to open {}", args.routes.display()))?;
    let data = load_route_data(BufReader::new(routes)).context("Failed to load route data")?;

    let pings = File::open(&args.pings)
        .with_context(|| format!("Failed to open {}", args.pings.display()))?;
    let dump = load_live_dump(BufReader::new(pings)).context("Failed to load live dump")?;

    let mut analyzer = Analyzer::new(args.hour)?;
    analyzer.create_places_speed_data(&dump.pings);
    analyzer
        .create_stop_punctuality_data(&dump.pings, &data, args.tolerance)
        .context("Punctuality analysis failed")?;
    analyzer.create_vehicle_distances(&dump.pings);
    analyzer.create_longest_routes(&dump.pings, args.top_k, args.exclude_measurement_errors);

    let results = analyzer.results();
    let report = Report {
        hour: args.hour,
        malformed_pings: dump.malformed,
        speed_samples: results.speed_data()?.len(),
        speed_histogram: results.speed_histogram(&SPEED_DELIMITERS)?,
        fast_places: results.fast_places(FAST_PLACE_MIN_SAMPLES, FAST_PLACE_MIN_RATIO)?,
        punctuality: results.punctuality_data()?,
        pipeline: results.pipeline_stats(),
        boundary_inaccuracy_percentage: results.boundary_inaccuracy_percentage()?,
        punctuality_histogram: results.punctuality_histogram(&PUNCTUALITY_DELIMITERS)?,
        stop_punctuality: results.stop_punctuality_data()?,
        bad_stops: results.bad_stops(BAD_STOP_MIN_RECORDS, BAD_STOP_MIN_RATIO)?,
        vehicle_distances: results.vehicle_distances()?,
        longest_routes: results.longest_routes()?,
    };

    log::info!(
        "{} punctuality records, {:.1}% boundary inaccuracies, {} bad stops",
        report.punctuality.records.len(),
        report.boundary_inaccuracy_percentage,
        report.bad_stops.len()
    );

    match &args.output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, &report)?;
            writer.flush()?;
            log::info!("Report written to {}", path.display());
        }
        None => {
            let stdout = io::stdout();
            let mut writer = stdout.lock();
            serde_json::to_writer_pretty(&mut writer, &report)?;
            writeln!(writer)?;
        }
    }

    Ok(())
}
