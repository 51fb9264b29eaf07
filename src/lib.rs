//! # Bus Punctuality
//!
//! Reconciles a city bus timetable with a batch of live GPS pings and measures
//! how punctual, how fast and how far buses actually travelled in one hour.
//!
//! This library provides:
//! - Route reconciliation: the canonical forward route of each line and its reverse
//! - The punctuality pipeline: ping cleaning, stop matching, direction
//!   classification, arrival estimation and timetable matching
//! - Speed samples, a coarse spatial speed grid and per-vehicle distances
//!
//! ## Features
//!
//! - **`parallel`** - Run the per-vehicle stages with rayon
//! - **`cli`** - Build the `bus-punctuality` command-line front end
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use std::collections::BTreeMap;
//! use bus_punctuality::{Analyzer, LivePing, RouteData, StopInfo};
//!
//! let mut stops = BTreeMap::new();
//! for (i, id) in ["100101", "100201", "100301"].iter().enumerate() {
//!     let stop = StopInfo::new(format!("Stop {i}"), 52.20 + i as f64 * 0.01, 21.00);
//!     stops.insert(id.to_string(), stop);
//! }
//! let mut routes = BTreeMap::new();
//! routes.insert("180".to_string(), vec![vec![
//!     "100101".to_string(), "100201".to_string(), "100301".to_string(),
//! ]]);
//! let data = RouteData::new(stops, routes, BTreeMap::new()).unwrap();
//!
//! let pings: Vec<LivePing> = Vec::new();
//! let mut analyzer = Analyzer::new(10).unwrap();
//! analyzer.create_punctuality_data(&pings, &data).unwrap();
//!
//! let report = analyzer.results().punctuality_data().unwrap();
//! assert!(report.records.is_empty());
//! ```

use serde::{Deserialize, Serialize};

pub mod geo_utils;

mod error;
pub use error::{Aggregate, AnalysisError, Result};

mod clock;
pub use clock::ClockTime;

pub mod network;
pub use network::{
    LineId, LineRoutes, RouteData, RouteVariant, StopId, StopInfo, StopTable, Timetable,
    VehicleId,
};

pub mod pings;
pub use pings::{ClassifiedPing, Direction, LivePing, MatchedPing, VehicleRun};

// Reconciliation pipeline, in stage order
pub mod routes;
pub use routes::{CanonicalRoute, CanonicalRoutes, reconcile_routes};

pub mod cleaner;
pub mod stop_matcher;
pub mod direction;

pub mod arrivals;
pub use arrivals::{ArrivalObservations, estimate_arrivals};

pub mod punctuality;
pub use punctuality::{
    BadStop, Punctuality, PunctualityRecord, PunctualityReport, StopPunctuality,
    match_departures,
};

pub mod pipeline;
pub use pipeline::{PipelineStats, PunctualityRun, run_punctuality_pipeline};

// Auxiliary aggregates
pub mod speed;
pub use speed::{SpeedSample, speed_samples};

pub mod speed_grid;
pub use speed_grid::{SpeedGrid, SpeedGridCell, generate_speed_grid};

pub mod longest;
pub use longest::{LongestRoute, TrajectoryPoint, VehicleDistance, longest_routes, vehicle_distances};

mod analyzer;
pub use analyzer::{Analyzer, Results};

pub mod io;

// ============================================================================
// Core Types
// ============================================================================

/// A GPS coordinate with latitude and longitude.
///
/// # Example
/// ```
/// use bus_punctuality::GpsPoint;
/// let point = GpsPoint::new(52.2297, 21.0122); // Warsaw
/// assert!(point.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsPoint {
    /// Create a new GPS point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// Thresholds used by the analysis pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// A vehicle run is kept only if two of its pings are farther apart than this.
    /// Filters out vehicles that only report GPS jitter while standing still.
    /// Default: 1.0 km
    pub movement_threshold_km: f64,

    /// Pings farther than this from every stop of the forward route are off-route.
    /// Default: 1.0 km
    pub max_stop_distance_km: f64,

    /// Minimum number of distinct stops a run must touch to infer its direction.
    /// Default: 3
    pub min_distinct_stops: usize,

    /// Number of samples at either end of a run within which a stop-index extremum
    /// is treated as a terminus rather than a turnaround.
    /// Default: 3
    pub direction_edge_margin: usize,

    /// A vehicle's closest approach to a stop counts as an arrival only within this distance.
    /// Default: 1.0 km
    pub arrival_radius_km: f64,

    /// Speed samples above this count as fast in the speed grid.
    /// Default: 50.0 km/h
    pub fast_speed_kmh: f64,

    /// Decimal places coordinates are rounded to for the speed grid.
    /// Default: 2 (cells of roughly 1.1 km)
    pub grid_decimals: u32,

    /// Any segment faster than this marks the vehicle's track as a measurement error.
    /// Default: 100.0 km/h
    pub measurement_error_speed_kmh: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            movement_threshold_km: 1.0,
            max_stop_distance_km: 1.0,
            min_distinct_stops: 3,
            direction_edge_margin: 3,
            arrival_radius_km: 1.0,
            fast_speed_kmh: 50.0,
            grid_decimals: 2,
            measurement_error_speed_kmh: 100.0,
        }
    }
}

/// One bar of a histogram handed to the rendering layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistogramBin {
    pub label: String,
    pub count: usize,
}

impl HistogramBin {
    fn new(label: impl Into<String>, count: usize) -> Self {
        Self { label: label.into(), count }
    }
}

/// Check that histogram delimiters are non-empty and strictly ascending.
fn check_delimiters<T: PartialOrd>(delimiters: &[T]) -> Result<()> {
    if delimiters.is_empty() || delimiters.windows(2).any(|w| !(w[0] < w[1])) {
        return Err(AnalysisError::InvalidDelimiters);
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
