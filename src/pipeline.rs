//! The punctuality pipeline, end to end.
//!
//! Stages run strictly in order over one closed batch of pings:
//! route reconciliation, ping cleaning, stop matching, direction
//! classification, arrival estimation and departure matching.

use std::time::Instant;

use log::info;
use serde::Serialize;

use crate::cleaner::clean_pings;
use crate::direction::classify_runs;
use crate::error::Result;
use crate::stop_matcher::{build_route_stops, match_runs};
use crate::{
    estimate_arrivals, match_departures, reconcile_routes, AnalysisConfig, ArrivalObservations,
    CanonicalRoutes, ClassifiedPing, LivePing, PunctualityReport, RouteData, VehicleRun,
};

/// How many records survived each stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub input_pings: usize,
    /// Vehicle runs on known lines in the target hour that moved
    pub moving_runs: usize,
    /// Runs that stayed on their route across enough distinct stops
    pub matched_runs: usize,
    /// Runs with at least one sample of known direction
    pub classified_runs: usize,
    pub classified_pings: usize,
    pub arrivals: usize,
}

/// Everything one punctuality run derives from its inputs.
#[derive(Debug, Clone, Serialize)]
pub struct PunctualityRun {
    pub canonical_routes: CanonicalRoutes,
    pub runs: Vec<VehicleRun<ClassifiedPing>>,
    pub arrivals: ArrivalObservations,
    pub report: PunctualityReport,
    pub stats: PipelineStats,
}

/// Run the whole punctuality pipeline for one target hour.
///
/// # Example
/// ```
/// use std::collections::BTreeMap;
/// use bus_punctuality::{run_punctuality_pipeline, AnalysisConfig, RouteData};
///
/// let data = RouteData::new(BTreeMap::new(), BTreeMap::new(), BTreeMap::new()).unwrap();
/// let run = run_punctuality_pipeline(&[], &data, 8, &AnalysisConfig::default()).unwrap();
/// assert_eq!(run.report.boundary_inaccuracy_count, 0);
/// assert!(run.canonical_routes.is_empty());
/// ```
pub fn run_punctuality_pipeline(
    pings: &[LivePing],
    data: &RouteData,
    hour: u32,
    config: &AnalysisConfig,
) -> Result<PunctualityRun> {
    let start = Instant::now();
    info!(
        "[Punctuality] Analysing {} pings for hour {}",
        pings.len(),
        hour
    );

    let canonical_routes = reconcile_routes(data.line_routes());
    // Every route index is complete before any ping is matched
    let route_stops = build_route_stops(&canonical_routes, data)?;

    let moving = clean_pings(pings, &canonical_routes, hour, config);
    let moving_runs = moving.len();

    let matched = match_runs(&moving, &route_stops, config);
    let matched_runs = matched.len();

    let runs = classify_runs(matched, config.direction_edge_margin);

    let arrivals = estimate_arrivals(&runs, &canonical_routes, data, config.arrival_radius_km)?;
    let report = match_departures(&arrivals, data.timetable(), hour);

    let stats = PipelineStats {
        input_pings: pings.len(),
        moving_runs,
        matched_runs,
        classified_runs: runs.len(),
        classified_pings: runs.iter().map(|r| r.pings.len()).sum(),
        arrivals: arrivals.len(),
    };

    info!(
        "[Punctuality] Pipeline finished in {}ms: {} records, {:.1}% boundary inaccuracies",
        start.elapsed().as_millis(),
        report.records.len(),
        report.boundary_inaccuracy_percentage()
    );

    Ok(PunctualityRun {
        canonical_routes,
        runs,
        arrivals,
        report,
        stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ClockTime, LineRoutes, Punctuality, StopInfo, StopTable, Timetable};
    use chrono::{Duration, NaiveDateTime};

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn clock(s: &str) -> ClockTime {
        s.parse().unwrap()
    }

    /// One line with five stops about 1.1 km apart heading north.
    fn network(departures: &[&str]) -> RouteData {
        let ids: Vec<String> = (1..=5).map(|i| format!("100{i}01")).collect();

        let mut stops = StopTable::new();
        for (i, id) in ids.iter().enumerate() {
            stops.insert(id.clone(), StopInfo::new(format!("Stop {i}"), 52.20 + i as f64 * 0.01, 21.0));
        }

        let mut line_routes = LineRoutes::new();
        line_routes.insert("180".to_string(), vec![ids.clone()]);

        let mut timetable = Timetable::new();
        let line = timetable.entry("180".to_string()).or_default();
        for (id, departure) in ids.iter().zip(departures) {
            line.insert(id.clone(), vec![clock(departure), clock("11:12")]);
        }

        RouteData::new(stops, line_routes, timetable).unwrap()
    }

    /// Ten pings heading north along the route, three minutes apart from 10:10.
    fn northbound(vehicle: &str) -> Vec<LivePing> {
        let start = at("2024-01-29 10:10:00");
        (0..10)
            .map(|k| {
                LivePing::new(
                    "180",
                    vehicle,
                    21.0,
                    52.20 + k as f64 * 0.0045,
                    start + Duration::minutes(3 * k),
                )
            })
            .collect()
    }

    #[test]
    fn test_single_vehicle_end_to_end() {
        let data = network(&["10:12", "10:15", "10:20", "10:30", "10:33"]);
        let run = run_punctuality_pipeline(&northbound("7"), &data, 10, &AnalysisConfig::default()).unwrap();

        assert_eq!(run.stats.input_pings, 10);
        assert_eq!(run.stats.moving_runs, 1);
        assert_eq!(run.stats.matched_runs, 1);
        assert_eq!(run.stats.classified_runs, 1);
        // The first and last samples sit at the termini and stay unlabelled
        assert_eq!(run.stats.classified_pings, 8);
        assert!(run.runs[0].pings.iter().all(|p| p.direction == crate::Direction::Forward));

        assert_eq!(run.report.boundary_inaccuracy_count, 0);
        assert_eq!(run.report.records.len(), 5);
        let differences: Vec<i64> = run.report.records.iter().map(|r| r.difference_minutes).collect();
        assert_eq!(differences, vec![1, 1, 2, 1, 1]);
        assert!(run.report.records.iter().all(|r| r.punctuality == Punctuality::Late));
    }

    #[test]
    fn test_other_hour_and_unknown_lines_are_ignored() {
        let data = network(&["10:12", "10:15", "10:20", "10:30", "10:33"]);
        let mut pings = northbound("7");
        for p in &mut pings {
            p.line = "999".to_string();
        }

        let run = run_punctuality_pipeline(&pings, &data, 10, &AnalysisConfig::default()).unwrap();
        assert_eq!(run.stats.moving_runs, 0);
        assert!(run.report.records.is_empty());
        // Line 180 had no classified pings, so its departures are not evaluated
        assert_eq!(run.report.boundary_inaccuracy_count, 0);

        let run = run_punctuality_pipeline(&northbound("7"), &data, 11, &AnalysisConfig::default()).unwrap();
        assert_eq!(run.stats.moving_runs, 0);
    }
}
