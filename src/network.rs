//! Static network description: stops, recorded route variants and timetables.
//!
//! These tables are produced by an external timetable parser and are read-only
//! for the whole analysis.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, Result};
use crate::{ClockTime, GpsPoint};

pub type StopId = String;
pub type LineId = String;
pub type VehicleId = String;

/// Ordered stop IDs of one recorded physical path of a line.
pub type RouteVariant = Vec<StopId>;

/// All recorded route variants per line. Variants may overlap.
pub type LineRoutes = BTreeMap<LineId, Vec<RouteVariant>>;

/// Scheduled departures per line and stop.
pub type Timetable = BTreeMap<LineId, BTreeMap<StopId, Vec<ClockTime>>>;

pub type StopTable = BTreeMap<StopId, StopInfo>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopInfo {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

impl StopInfo {
    pub fn new(name: impl Into<String>, lat: f64, lon: f64) -> Self {
        Self { name: name.into(), lat, lon }
    }

    pub fn position(&self) -> GpsPoint {
        GpsPoint::new(self.lat, self.lon)
    }
}

/// Stops, route variants and timetable of one network.
///
/// Every stop named by a route variant is guaranteed to be in the stop table.
#[derive(Debug, Clone, Serialize)]
pub struct RouteData {
    stops: StopTable,
    line_routes: LineRoutes,
    timetable: Timetable,
}

impl RouteData {
    /// Assemble the network, rejecting route variants that name unknown stops.
    pub fn new(stops: StopTable, line_routes: LineRoutes, timetable: Timetable) -> Result<Self> {
        for (line, variants) in &line_routes {
            for stop in variants.iter().flatten() {
                if !stops.contains_key(stop) {
                    return Err(AnalysisError::UnknownStop {
                        line: line.clone(),
                        stop: stop.clone(),
                    });
                }
            }
        }
        Ok(Self { stops, line_routes, timetable })
    }

    pub fn stops(&self) -> &StopTable {
        &self.stops
    }

    pub fn line_routes(&self) -> &LineRoutes {
        &self.line_routes
    }

    pub fn timetable(&self) -> &Timetable {
        &self.timetable
    }

    pub fn stop(&self, id: &str) -> Option<&StopInfo> {
        self.stops.get(id)
    }

    /// Position of a stop referenced by `line`.
    pub(crate) fn stop_position(&self, line: &str, stop: &str) -> Result<GpsPoint> {
        self.stops
            .get(stop)
            .map(StopInfo::position)
            .ok_or_else(|| AnalysisError::UnknownStop {
                line: line.to_string(),
                stop: stop.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stops() -> StopTable {
        let mut stops = StopTable::new();
        stops.insert("100101".to_string(), StopInfo::new("Centrum", 52.23, 21.01));
        stops.insert("100201".to_string(), StopInfo::new("Dworzec", 52.22, 21.00));
        stops
    }

    #[test]
    fn test_route_data_accepts_known_stops() {
        let mut routes = LineRoutes::new();
        routes.insert("180".to_string(), vec![vec!["100101".to_string(), "100201".to_string()]]);
        let data = RouteData::new(stops(), routes, Timetable::new()).unwrap();

        assert_eq!(data.line_routes().len(), 1);
        assert_eq!(data.stop("100101").unwrap().name, "Centrum");
        assert_eq!(data.stop_position("180", "100201").unwrap(), GpsPoint::new(52.22, 21.00));
    }

    #[test]
    fn test_route_data_rejects_unknown_stop() {
        let mut routes = LineRoutes::new();
        routes.insert("180".to_string(), vec![vec!["100101".to_string(), "999901".to_string()]]);
        let err = RouteData::new(stops(), routes, Timetable::new()).unwrap_err();

        match err {
            AnalysisError::UnknownStop { line, stop } => {
                assert_eq!(line, "180");
                assert_eq!(stop, "999901");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
