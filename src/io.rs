//! JSON loaders for the static network and the live position dump.
//!
//! The network document bundles the stop table, route variants and timetable
//! produced by the timetable parser:
//!
//! ```json
//! {
//!   "stops": { "100101": { "name": "Centrum", "lat": 52.23, "lon": 21.01 } },
//!   "routes": { "180": [["100101", "100201"]] },
//!   "timetable": { "180": { "100101": ["5:12", "24:05"] } }
//! }
//! ```
//!
//! The live dump is the acquisition tool's append-only array of API responses,
//! each stamped with the time it was requested.

use std::io::Read;

use chrono::NaiveDateTime;
use log::{info, warn};
use serde::Deserialize;

use crate::error::Result;
use crate::{LineRoutes, LivePing, RouteData, StopTable, Timetable};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Deserialize)]
struct RawRouteData {
    stops: StopTable,
    routes: LineRoutes,
    #[serde(default)]
    timetable: Timetable,
}

/// Load and validate a network document.
///
/// # Example
/// ```
/// let json = r#"{
///     "stops": {"100101": {"name": "Centrum", "lat": 52.23, "lon": 21.01}},
///     "routes": {"180": [["100101"]]},
///     "timetable": {"180": {"100101": ["10:05", "24:10"]}}
/// }"#;
/// let data = bus_punctuality::io::load_route_data(json.as_bytes()).unwrap();
/// let departures = &data.timetable()["180"]["100101"];
/// assert_eq!(departures[1].to_string(), "00:10");
/// ```
pub fn load_route_data<R: Read>(reader: R) -> Result<RouteData> {
    let raw: RawRouteData = serde_json::from_reader(reader)?;
    let data = RouteData::new(raw.stops, raw.routes, raw.timetable)?;
    info!(
        "[Load] {} stops, {} lines with routes, {} lines with timetables",
        data.stops().len(),
        data.line_routes().len(),
        data.timetable().len()
    );
    Ok(data)
}

#[derive(Deserialize)]
struct RawResponse {
    request_time: Option<String>,
    result: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
struct RawPing {
    #[serde(rename = "Lines", alias = "Line")]
    line: String,
    #[serde(rename = "VehicleNumber")]
    vehicle: String,
    #[serde(rename = "Lon")]
    lon: f64,
    #[serde(rename = "Lat")]
    lat: f64,
    #[serde(rename = "Time")]
    time: String,
}

/// Pings read from a live dump.
#[derive(Debug, Clone, Default)]
pub struct LiveDump {
    pub pings: Vec<LivePing>,
    /// Rows dropped for missing fields, an unparseable sample time or
    /// coordinates off the globe
    pub malformed: usize,
}

/// Load a live dump, dropping malformed rows.
///
/// A row is malformed when a field is missing or mistyped, its sample time
/// cannot be parsed, or its position is not a valid coordinate. Each one is
/// logged and counted; the rest of the dump still loads. An unparseable
/// request time only loses the request time.
pub fn load_live_dump<R: Read>(reader: R) -> Result<LiveDump> {
    let responses: Vec<RawResponse> = serde_json::from_reader(reader)?;
    let mut dump = LiveDump::default();

    for response in responses {
        let request_time = response.request_time.as_deref().and_then(|s| {
            let parsed = NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).ok();
            if parsed.is_none() {
                warn!("[Load] Unparseable request time {:?}", s);
            }
            parsed
        });

        for row in response.result {
            let raw: RawPing = match serde_json::from_value(row) {
                Ok(raw) => raw,
                Err(e) => {
                    warn!("[Load] Dropping malformed row: {}", e);
                    dump.malformed += 1;
                    continue;
                }
            };

            let time = match NaiveDateTime::parse_from_str(&raw.time, TIMESTAMP_FORMAT) {
                Ok(time) => time,
                Err(e) => {
                    warn!(
                        "[Load] Dropping ping of vehicle {} with time {:?}: {}",
                        raw.vehicle, raw.time, e
                    );
                    dump.malformed += 1;
                    continue;
                }
            };

            let ping = LivePing::new(raw.line, raw.vehicle, raw.lon, raw.lat, time);
            if !ping.position.is_valid() {
                warn!(
                    "[Load] Dropping ping of vehicle {} at invalid position ({}, {})",
                    ping.vehicle, ping.position.latitude, ping.position.longitude
                );
                dump.malformed += 1;
                continue;
            }

            dump.pings.push(match request_time {
                Some(requested) => ping.with_request_time(requested),
                None => ping,
            });
        }
    }

    info!(
        "[Load] {} pings loaded, {} malformed rows dropped",
        dump.pings.len(),
        dump.malformed
    );
    Ok(dump)
}
