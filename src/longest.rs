//! Distance travelled per vehicle and the longest tracks of the hour.

use std::time::Instant;

use chrono::NaiveDateTime;
use log::{debug, info};
use serde::Serialize;

use crate::geo_utils::{haversine_distance, speed};
use crate::speed::{elapsed_hours, vehicle_tracks};
use crate::{GpsPoint, LivePing, VehicleId};

/// One point of a vehicle's track.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrajectoryPoint {
    pub position: GpsPoint,
    pub time: NaiveDateTime,
}

/// Total distance a vehicle covered during the target hour.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleDistance {
    pub vehicle: VehicleId,
    /// Sum of the distances between consecutive pings
    pub total_km: f64,
    /// Fastest segment with a non-zero duration, 0 for single-ping tracks
    pub max_speed_kmh: f64,
    /// Some segment was implausibly fast
    pub measurement_error: bool,
}

/// A vehicle's full track, for the longest-routes map.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LongestRoute {
    pub vehicle: VehicleId,
    pub total_km: f64,
    pub trajectory: Vec<TrajectoryPoint>,
}

/// Summed consecutive-ping distance per vehicle over `hour`, ordered by vehicle.
///
/// A track is flagged as a measurement error when any segment is faster than
/// `error_speed_kmh`, or covers distance in no time at all.
pub fn vehicle_distances(pings: &[LivePing], hour: u32, error_speed_kmh: f64) -> Vec<VehicleDistance> {
    let start = Instant::now();

    let distances: Vec<VehicleDistance> = vehicle_tracks(pings, hour)
        .into_iter()
        .map(|(vehicle, track)| {
            let mut total_km = 0.0;
            let mut max_speed_kmh: f64 = 0.0;
            let mut measurement_error = false;

            for pair in track.windows(2) {
                let d = haversine_distance(&pair[0].position, &pair[1].position);
                let hours = elapsed_hours(pair[0], pair[1]);
                total_km += d;

                if hours > 0.0 {
                    let v = speed(d, hours);
                    max_speed_kmh = max_speed_kmh.max(v);
                    measurement_error |= v > error_speed_kmh;
                } else if d > 0.0 {
                    measurement_error = true;
                }
            }

            if measurement_error {
                debug!("[Distance] Vehicle {} has an implausible segment", vehicle);
            }

            VehicleDistance {
                vehicle: vehicle.to_string(),
                total_km,
                max_speed_kmh,
                measurement_error,
            }
        })
        .collect();

    info!(
        "[Distance] Measured {} vehicles in {}ms",
        distances.len(),
        start.elapsed().as_millis()
    );

    distances
}

/// The `k` vehicles that covered the most distance in `hour`, with their tracks.
///
/// Longest first; equal distances are ordered by vehicle number. With
/// `exclude_measurement_errors`, flagged vehicles are left out before ranking.
pub fn longest_routes(
    pings: &[LivePing],
    hour: u32,
    k: usize,
    exclude_measurement_errors: bool,
    error_speed_kmh: f64,
) -> Vec<LongestRoute> {
    let mut ranked: Vec<VehicleDistance> = vehicle_distances(pings, hour, error_speed_kmh)
        .into_iter()
        .filter(|d| !(exclude_measurement_errors && d.measurement_error))
        .collect();
    ranked.sort_by(|a, b| {
        b.total_km
            .total_cmp(&a.total_km)
            .then_with(|| a.vehicle.cmp(&b.vehicle))
    });
    ranked.truncate(k);

    let tracks = vehicle_tracks(pings, hour);
    ranked
        .into_iter()
        .map(|d| {
            let trajectory = tracks
                .get(d.vehicle.as_str())
                .map(|track| {
                    track
                        .iter()
                        .map(|p| TrajectoryPoint { position: p.position, time: p.time })
                        .collect()
                })
                .unwrap_or_default();
            LongestRoute {
                vehicle: d.vehicle,
                total_km: d.total_km,
                trajectory,
            }
        })
        .collect()
}
