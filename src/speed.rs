//! Speed samples between consecutive pings of each vehicle.

use std::collections::BTreeMap;
use std::time::Instant;

use chrono::{NaiveDateTime, Timelike};
use log::info;
use serde::Serialize;

use crate::error::Result;
use crate::geo_utils::{distances, speeds};
use crate::{check_delimiters, GpsPoint, HistogramBin, LineId, LivePing, VehicleId};

const SECONDS_PER_HOUR: f64 = 3600.0;

/// Average speed over the segment ending at `position`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpeedSample {
    pub vehicle: VehicleId,
    /// Line reported by the later ping of the segment
    pub line: LineId,
    pub position: GpsPoint,
    pub time: NaiveDateTime,
    pub speed_kmh: f64,
}

/// Group the pings sampled during `hour` by vehicle, ordered by time.
///
/// Vehicles are keyed by number alone; a vehicle switching lines stays one track.
pub(crate) fn vehicle_tracks(pings: &[LivePing], hour: u32) -> BTreeMap<&str, Vec<&LivePing>> {
    let mut tracks: BTreeMap<&str, Vec<&LivePing>> = BTreeMap::new();
    for ping in pings.iter().filter(|p| p.time.hour() == hour) {
        tracks.entry(ping.vehicle.as_str()).or_default().push(ping);
    }
    for track in tracks.values_mut() {
        track.sort_by_key(|p| p.time);
    }
    tracks
}

/// Elapsed hours between two samples.
pub(crate) fn elapsed_hours(from: &LivePing, to: &LivePing) -> f64 {
    (to.time - from.time).num_milliseconds() as f64 / 1000.0 / SECONDS_PER_HOUR
}

/// One speed sample per pair of consecutive pings of each vehicle in `hour`.
///
/// Pairs sampled at the same instant carry no speed and are skipped. Samples
/// come out grouped by vehicle, then in time order.
///
/// # Example
/// ```
/// use chrono::NaiveDateTime;
/// use bus_punctuality::{speed_samples, LivePing};
///
/// let t = |s: &str| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap();
/// let pings = vec![
///     LivePing::new("180", "7", 21.0, 52.20, t("2024-01-29 10:00:00")),
///     LivePing::new("180", "7", 21.0, 52.21, t("2024-01-29 10:02:00")),
/// ];
/// let samples = speed_samples(&pings, 10);
/// assert_eq!(samples.len(), 1);
/// assert!((samples[0].speed_kmh - 33.4).abs() < 0.1);
/// ```
pub fn speed_samples(pings: &[LivePing], hour: u32) -> Vec<SpeedSample> {
    let start = Instant::now();
    let tracks = vehicle_tracks(pings, hour);

    let mut samples = Vec::new();
    for (vehicle, track) in &tracks {
        let segments: Vec<(&LivePing, &LivePing, f64)> = track
            .windows(2)
            .map(|pair| (pair[0], pair[1], elapsed_hours(pair[0], pair[1])))
            .filter(|&(_, _, hours)| hours > 0.0)
            .collect();

        let from: Vec<GpsPoint> = segments.iter().map(|s| s.0.position).collect();
        let to: Vec<GpsPoint> = segments.iter().map(|s| s.1.position).collect();
        let hours: Vec<f64> = segments.iter().map(|s| s.2).collect();
        let segment_speeds = speeds(&distances(&from, &to), &hours);

        for ((_, ping, _), speed_kmh) in segments.iter().zip(segment_speeds) {
            samples.push(SpeedSample {
                vehicle: vehicle.to_string(),
                line: ping.line.clone(),
                position: ping.position,
                time: ping.time,
                speed_kmh,
            });
        }
    }

    info!(
        "[Speed] {} speed samples from {} vehicles in {}ms",
        samples.len(),
        tracks.len(),
        start.elapsed().as_millis()
    );

    samples
}

/// Histogram of sample speeds over ascending delimiters, in km/h.
///
/// Bins are `[d_i, d_i+1)` labelled `"d_i-d_i+1"`, plus an open `"d_n+"` bin.
/// Speeds below the first delimiter are not counted.
pub fn speed_histogram(samples: &[SpeedSample], delimiters: &[f64]) -> Result<Vec<HistogramBin>> {
    check_delimiters(delimiters)?;
    let count = |lo: f64, hi: f64| {
        samples
            .iter()
            .filter(|s| s.speed_kmh >= lo && s.speed_kmh < hi)
            .count()
    };

    let mut bins: Vec<HistogramBin> = delimiters
        .windows(2)
        .map(|w| HistogramBin::new(format!("{}-{}", w[0], w[1]), count(w[0], w[1])))
        .collect();
    let last = delimiters[delimiters.len() - 1];
    bins.push(HistogramBin::new(format!("{last}+"), count(last, f64::INFINITY)));

    Ok(bins)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
        (a - b).abs() <= epsilon
    }

    fn sample(speed_kmh: f64) -> SpeedSample {
        SpeedSample {
            vehicle: "7".to_string(),
            line: "180".to_string(),
            position: GpsPoint::new(52.2, 21.0),
            time: at("2024-01-29 10:00:00"),
            speed_kmh,
        }
    }

    #[test]
    fn test_speed_samples_per_vehicle() {
        let pings = vec![
            LivePing::new("180", "7", 21.0, 52.21, at("2024-01-29 10:02:00")),
            LivePing::new("180", "7", 21.0, 52.20, at("2024-01-29 10:00:00")),
            // Same vehicle number on another line continues the same track
            LivePing::new("523", "7", 21.0, 52.21, at("2024-01-29 10:04:00")),
            LivePing::new("180", "8", 21.0, 52.20, at("2024-01-29 10:00:00")),
            LivePing::new("180", "8", 21.0, 52.30, at("2024-01-29 11:00:00")),
        ];

        let samples = speed_samples(&pings, 10);
        assert_eq!(samples.len(), 2);

        assert_eq!(samples[0].vehicle, "7");
        assert_eq!(samples[0].time, at("2024-01-29 10:02:00"));
        assert!(approx_eq(samples[0].speed_kmh, 33.37, 0.05));

        assert_eq!(samples[1].line, "523");
        assert!(approx_eq(samples[1].speed_kmh, 0.0, 1e-9));
    }

    #[test]
    fn test_zero_elapsed_pairs_are_skipped() {
        let pings = vec![
            LivePing::new("180", "7", 21.0, 52.20, at("2024-01-29 10:00:00")),
            LivePing::new("180", "7", 21.0, 52.21, at("2024-01-29 10:00:00")),
        ];
        assert!(speed_samples(&pings, 10).is_empty());
    }

    #[test]
    fn test_speed_histogram() {
        let samples: Vec<SpeedSample> = [5.0, 10.0, 19.9, 20.0, 45.0, 80.0].iter().map(|&s| sample(s)).collect();
        let bins = speed_histogram(&samples, &[10.0, 20.0, 50.0]).unwrap();

        let labels: Vec<&str> = bins.iter().map(|b| b.label.as_str()).collect();
        assert_eq!(labels, vec!["10-20", "20-50", "50+"]);
        let counts: Vec<usize> = bins.iter().map(|b| b.count).collect();
        assert_eq!(counts, vec![2, 2, 1]);

        assert!(speed_histogram(&samples, &[20.0, 10.0]).is_err());
    }
}
