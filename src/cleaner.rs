//! Ping cleaning: keep pings that plausibly come from a moving vehicle on a
//! known line during the target hour.

use chrono::Timelike;
use log::{debug, info};

use crate::geo_utils::haversine_distance;
use crate::pings::group_runs;
use crate::{AnalysisConfig, CanonicalRoutes, GpsPoint, LivePing, VehicleRun};

/// Keep pings of known lines sampled during `hour`.
pub fn filter_known_lines_in_hour(
    pings: &[LivePing],
    routes: &CanonicalRoutes,
    hour: u32,
) -> Vec<LivePing> {
    pings
        .iter()
        .filter(|p| routes.contains_key(&p.line) && p.time.hour() == hour)
        .cloned()
        .collect()
}

/// Whether any two points are farther apart than `threshold_km`.
///
/// Pairwise, stopping at the first qualifying pair.
pub fn has_moved(points: &[GpsPoint], threshold_km: f64) -> bool {
    points.iter().enumerate().any(|(i, p1)| {
        points[i + 1..]
            .iter()
            .any(|p2| haversine_distance(p1, p2) > threshold_km)
    })
}

/// Drop runs of vehicles that never moved more than `threshold_km`.
pub fn retain_moving(runs: Vec<VehicleRun>, threshold_km: f64) -> Vec<VehicleRun> {
    runs.into_iter()
        .filter(|run| {
            let points: Vec<GpsPoint> = run.pings.iter().map(|p| p.position).collect();
            let moved = has_moved(&points, threshold_km);
            if !moved {
                debug!(
                    "[Cleaner] Vehicle {} on line {} never moved, dropping {} pings",
                    run.vehicle,
                    run.line,
                    run.pings.len()
                );
            }
            moved
        })
        .collect()
}

/// Both cleaning filters, producing time-ordered runs per (line, vehicle).
pub fn clean_pings(
    pings: &[LivePing],
    routes: &CanonicalRoutes,
    hour: u32,
    config: &AnalysisConfig,
) -> Vec<VehicleRun> {
    let in_hour = filter_known_lines_in_hour(pings, routes, hour);
    let kept = in_hour.len();

    let runs = group_runs(in_hour);
    let total_runs = runs.len();
    let runs = retain_moving(runs, config.movement_threshold_km);

    info!(
        "[Cleaner] {} of {} pings on known lines at hour {}, {} of {} vehicle runs moving",
        kept,
        pings.len(),
        hour,
        runs.len(),
        total_runs
    );

    runs
}
