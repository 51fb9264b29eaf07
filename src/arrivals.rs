//! Observed arrivals: each vehicle's closest approach to each stop of its route.

use std::collections::BTreeMap;
use std::time::Instant;

use log::{debug, info};
use serde::Serialize;

use crate::error::Result;
use crate::geo_utils::haversine_distance;
use crate::{
    CanonicalRoutes, ClassifiedPing, ClockTime, GpsPoint, LineId, RouteData, StopId, VehicleRun,
};

/// Minute-rounded arrival times per line and stop.
///
/// A stop gets one arrival per vehicle and direction that passed within the
/// arrival radius. Lines are present exactly when they had classified pings,
/// even if no stop collected an arrival.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ArrivalObservations {
    lines: BTreeMap<LineId, BTreeMap<StopId, Vec<ClockTime>>>,
}

impl ArrivalObservations {
    /// Lines that were evaluated.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.keys().map(String::as_str)
    }

    pub fn contains_line(&self, line: &str) -> bool {
        self.lines.contains_key(line)
    }

    /// Arrivals observed at `stop` on `line`, if any.
    pub fn arrivals(&self, line: &str, stop: &str) -> Option<&[ClockTime]> {
        self.lines
            .get(line)
            .and_then(|stops| stops.get(stop))
            .map(Vec::as_slice)
    }

    /// Total number of recorded arrivals.
    pub fn len(&self) -> usize {
        self.lines.values().flat_map(|stops| stops.values()).map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Closest sample of a time-ordered ping sequence to a stop; the earliest wins ties.
fn closest_approach<'a>(
    pings: impl Iterator<Item = &'a ClassifiedPing>,
    stop: &GpsPoint,
) -> Option<(f64, &'a ClassifiedPing)> {
    let mut best: Option<(f64, &ClassifiedPing)> = None;
    for ping in pings {
        let d = haversine_distance(&ping.ping.position, stop);
        if best.map_or(true, |(min, _)| d < min) {
            best = Some((d, ping));
        }
    }
    best
}

/// Estimate when each vehicle passed each stop of its line.
///
/// For every stop of a line's canonical routes and every route containing it,
/// each vehicle's pings travelling that route are scanned for the single
/// closest sample. Its time, rounded to the minute, is an arrival when the
/// sample lies within `radius_km` of the stop.
pub fn estimate_arrivals(
    runs: &[VehicleRun<ClassifiedPing>],
    routes: &CanonicalRoutes,
    data: &RouteData,
    radius_km: f64,
) -> Result<ArrivalObservations> {
    let start = Instant::now();

    let mut by_line: BTreeMap<&str, Vec<&VehicleRun<ClassifiedPing>>> = BTreeMap::new();
    for run in runs.iter().filter(|r| !r.pings.is_empty()) {
        by_line.entry(run.line.as_str()).or_default().push(run);
    }

    let mut lines = BTreeMap::new();
    for (line, mut line_runs) in by_line {
        line_runs.sort_by(|a, b| a.vehicle.cmp(&b.vehicle));
        let mut stops: BTreeMap<StopId, Vec<ClockTime>> = BTreeMap::new();

        if let Some(canonical) = routes.get(line) {
            for stop in canonical.stops() {
                let position = data.stop_position(line, stop)?;

                for (route_index, route) in canonical.variants().enumerate() {
                    if !route.iter().any(|s| s == stop) {
                        continue;
                    }
                    for run in &line_runs {
                        let travelling = run
                            .pings
                            .iter()
                            .filter(|p| p.direction.route_index() == route_index);
                        if let Some((d, ping)) = closest_approach(travelling, &position) {
                            if d < radius_km {
                                stops
                                    .entry(stop.to_string())
                                    .or_default()
                                    .push(ClockTime::rounded(&ping.ping.time));
                            }
                        }
                    }
                }
            }
        }

        debug!("[Arrivals] Line {}: arrivals at {} stops", line, stops.len());
        lines.insert(line.to_string(), stops);
    }

    let observations = ArrivalObservations { lines };
    info!(
        "[Arrivals] {} arrivals on {} lines in {}ms",
        observations.len(),
        observations.lines.len(),
        start.elapsed().as_millis()
    );

    Ok(observations)
}
