//! Nearest-stop matching along a line's forward route.
//!
//! Each line's forward route is loaded into an R-tree once. A ping looks up the
//! stops inside a bounding box slightly larger than the off-route threshold and
//! keeps the closest one by haversine distance. Any stop within the threshold
//! is inside the box, so the result is identical to scanning every stop of the
//! route; pings with no stop in range are off-route and dropped anyway.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use log::{debug, info};
use rstar::{RTree, RTreeObject, AABB};

use crate::error::Result;
use crate::geo_utils::{haversine_distance, km_to_degrees};
use crate::{
    AnalysisConfig, CanonicalRoutes, GpsPoint, LineId, LivePing, MatchedPing, RouteData,
    VehicleRun,
};

// =============================================================================
// R-tree Indexed Stop
// =============================================================================

/// A route stop with its position along the route
#[derive(Debug, Clone, Copy)]
struct IndexedStop {
    idx: usize,
    lat: f64,
    lng: f64,
}

impl RTreeObject for IndexedStop {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.lat, self.lng])
    }
}

/// Stop positions of one forward route plus their spatial index.
#[derive(Debug, Clone)]
pub struct RouteStops {
    points: Vec<GpsPoint>,
    tree: RTree<IndexedStop>,
}

impl RouteStops {
    /// Index the stops of `route`, resolving positions through the stop table.
    pub fn new(line: &str, route: &[String], data: &RouteData) -> Result<Self> {
        let points = route
            .iter()
            .map(|stop| data.stop_position(line, stop))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::from_points(points))
    }

    pub fn from_points(points: Vec<GpsPoint>) -> Self {
        let indexed: Vec<IndexedStop> = points
            .iter()
            .enumerate()
            .map(|(i, p)| IndexedStop { idx: i, lat: p.latitude, lng: p.longitude })
            .collect();
        Self { points, tree: RTree::bulk_load(indexed) }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Nearest stop within `radius_km`, as `(route index, distance km)`.
    ///
    /// Ties go to the lowest route index.
    pub fn nearest_within(&self, position: &GpsPoint, radius_km: f64) -> Option<(usize, f64)> {
        let (lat_deg, lng_deg) = km_to_degrees(radius_km, position.latitude);
        let envelope = AABB::from_corners(
            [position.latitude - lat_deg, position.longitude - lng_deg],
            [position.latitude + lat_deg, position.longitude + lng_deg],
        );

        self.tree
            .locate_in_envelope_intersecting(&envelope)
            .map(|stop| (stop.idx, haversine_distance(position, &self.points[stop.idx])))
            .filter(|&(_, d)| d <= radius_km)
            .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)))
    }

    /// Nearest stop by scanning the whole route; the first index wins ties.
    pub fn nearest(&self, position: &GpsPoint) -> Option<(usize, f64)> {
        let mut best: Option<(usize, f64)> = None;
        for (i, stop) in self.points.iter().enumerate() {
            let d = haversine_distance(position, stop);
            if best.map_or(true, |(_, min)| d < min) {
                best = Some((i, d));
            }
        }
        best
    }
}

/// Index the forward route of every canonical line.
pub fn build_route_stops(
    routes: &CanonicalRoutes,
    data: &RouteData,
) -> Result<BTreeMap<LineId, RouteStops>> {
    let start = Instant::now();
    let mut indexed = BTreeMap::new();
    for (line, route) in routes {
        indexed.insert(line.clone(), RouteStops::new(line, &route.forward, data)?);
    }
    debug!(
        "[StopMatcher] Indexed forward routes of {} lines in {:?}",
        indexed.len(),
        start.elapsed()
    );
    Ok(indexed)
}

/// Attach the nearest forward-route stop to each ping of a run.
///
/// Pings farther than `max_stop_distance_km` from every stop are dropped, and
/// the whole run is dropped if the remaining pings touch fewer than
/// `min_distinct_stops` distinct stops. The run must be time-ordered; the
/// output keeps that order.
pub fn match_stops(
    run: &VehicleRun,
    stops: &RouteStops,
    config: &AnalysisConfig,
) -> Option<VehicleRun<MatchedPing>> {
    if stops.is_empty() {
        return None;
    }

    let matched: Vec<MatchedPing> = run
        .pings
        .iter()
        .filter_map(|ping: &LivePing| {
            stops
                .nearest_within(&ping.position, config.max_stop_distance_km)
                .map(|(closest_stop, distance_km)| MatchedPing {
                    ping: ping.clone(),
                    closest_stop,
                    distance_km,
                })
        })
        .collect();

    let distinct: BTreeSet<usize> = matched.iter().map(|m| m.closest_stop).collect();
    if distinct.len() < config.min_distinct_stops {
        debug!(
            "[StopMatcher] Vehicle {} on line {} touched {} distinct stops, dropping",
            run.vehicle,
            run.line,
            distinct.len()
        );
        return None;
    }

    Some(run.with_pings(matched))
}

/// Match every run against its line's forward route.
pub fn match_runs(
    runs: &[VehicleRun],
    route_stops: &BTreeMap<LineId, RouteStops>,
    config: &AnalysisConfig,
) -> Vec<VehicleRun<MatchedPing>> {
    let start = Instant::now();

    #[cfg(feature = "parallel")]
    let matched: Vec<VehicleRun<MatchedPing>> = {
        use rayon::prelude::*;
        runs.par_iter()
            .filter_map(|run| {
                route_stops
                    .get(&run.line)
                    .and_then(|stops| match_stops(run, stops, config))
            })
            .collect()
    };

    #[cfg(not(feature = "parallel"))]
    let matched: Vec<VehicleRun<MatchedPing>> = runs
        .iter()
        .filter_map(|run| {
            route_stops
                .get(&run.line)
                .and_then(|stops| match_stops(run, stops, config))
        })
        .collect();

    info!(
        "[StopMatcher] {} of {} runs matched to their routes in {}ms",
        matched.len(),
        runs.len(),
        start.elapsed().as_millis()
    );

    matched
}
