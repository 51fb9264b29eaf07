use std::fmt;

use thiserror::Error;

/// Aggregates kept in [`crate::Results`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Aggregate {
    SpeedData,
    PlacesSpeedData,
    PunctualityData,
    StopPunctualityData,
    VehicleDistances,
    LongestRoutes,
}

impl fmt::Display for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Aggregate::SpeedData => "speed data",
            Aggregate::PlacesSpeedData => "places speed data",
            Aggregate::PunctualityData => "punctuality data",
            Aggregate::StopPunctualityData => "stop punctuality data",
            Aggregate::VehicleDistances => "vehicle distance data",
            Aggregate::LongestRoutes => "longest routes",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Target hour {0} is outside 0-23")]
    InvalidHour(u32),

    #[error("{0} not created")]
    MissingAggregate(Aggregate),

    #[error("No such Stop {stop:?} in the stop table (used by Line {line:?})")]
    UnknownStop { line: String, stop: String },

    #[error("Invalid clock time {0:?}, expected H:MM")]
    InvalidClockTime(String),

    #[error("Histogram delimiters must be non-empty and ascending")]
    InvalidDelimiters,

    #[error("Malformed input: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = AnalysisError> = std::result::Result<T, E>;
