//! Live position samples and the records the pipeline derives from them.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::{GpsPoint, LineId, VehicleId};

/// One GPS sample reported by a vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LivePing {
    pub line: LineId,
    pub vehicle: VehicleId,
    pub position: GpsPoint,
    /// When the vehicle recorded the position
    pub time: NaiveDateTime,
    /// When the position was fetched from the feed, if known
    pub request_time: Option<NaiveDateTime>,
}

impl LivePing {
    pub fn new(
        line: impl Into<LineId>,
        vehicle: impl Into<VehicleId>,
        lon: f64,
        lat: f64,
        time: NaiveDateTime,
    ) -> Self {
        Self {
            line: line.into(),
            vehicle: vehicle.into(),
            position: GpsPoint::new(lat, lon),
            time,
            request_time: None,
        }
    }

    pub fn with_request_time(mut self, request_time: NaiveDateTime) -> Self {
        self.request_time = Some(request_time);
        self
    }
}

/// Which canonical route of its line a vehicle is travelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Along the forward (longest) route, stop indices increasing. Label 0.
    Forward,
    /// Along the reverse route, stop indices of the forward route decreasing. Label 1.
    Backward,
}

impl Direction {
    /// Index of the canonical route this direction travels.
    pub fn route_index(self) -> usize {
        match self {
            Direction::Forward => 0,
            Direction::Backward => 1,
        }
    }
}

/// A ping annotated with its nearest stop on the line's forward route.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchedPing {
    pub ping: LivePing,
    /// Index into the forward canonical route
    pub closest_stop: usize,
    pub distance_km: f64,
}

/// A matched ping whose direction of travel could be resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifiedPing {
    pub ping: LivePing,
    pub closest_stop: usize,
    pub distance_km: f64,
    pub direction: Direction,
}

/// All pings of one vehicle serving one line, ordered by sample time.
///
/// Every stage that consumes a run relies on that ordering; runs are sorted
/// once when [`group_runs`] builds them and never reordered afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleRun<P = LivePing> {
    pub line: LineId,
    pub vehicle: VehicleId,
    pub pings: Vec<P>,
}

impl<P> VehicleRun<P> {
    /// Same run, different ping records.
    pub fn with_pings<Q>(&self, pings: Vec<Q>) -> VehicleRun<Q> {
        VehicleRun {
            line: self.line.clone(),
            vehicle: self.vehicle.clone(),
            pings,
        }
    }
}

/// Group pings by (line, vehicle), sorting each group by sample time.
///
/// Runs come out ordered by line, then vehicle.
pub fn group_runs(pings: Vec<LivePing>) -> Vec<VehicleRun> {
    let mut groups: BTreeMap<(LineId, VehicleId), Vec<LivePing>> = BTreeMap::new();
    for ping in pings {
        groups
            .entry((ping.line.clone(), ping.vehicle.clone()))
            .or_default()
            .push(ping);
    }

    groups
        .into_iter()
        .map(|((line, vehicle), mut pings)| {
            pings.sort_by_key(|p| p.time);
            VehicleRun { line, vehicle, pings }
        })
        .collect()
}
