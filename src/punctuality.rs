//! Matching scheduled departures against observed arrivals.
//!
//! Trips carry no identifiers, so each scheduled departure of the target hour
//! is paired with the observed arrival closest to it on the clock. A pairing
//! that reaches past the start or end of the hour may belong to a departure
//! outside the observed window; such departures are counted as boundary
//! inaccuracies instead of producing a record, as are departures at stops
//! that observed no arrival at all.

use std::collections::BTreeMap;
use std::time::Instant;

use log::{debug, info};
use serde::Serialize;

use crate::error::Result;
use crate::{
    check_delimiters, ArrivalObservations, ClockTime, GpsPoint, HistogramBin, LineId, StopId,
    StopTable, Timetable,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Punctuality {
    Early,
    Late,
    OnTime,
}

impl Punctuality {
    fn from_difference(minutes: i64) -> Self {
        match minutes {
            d if d < 0 => Punctuality::Early,
            d if d > 0 => Punctuality::Late,
            _ => Punctuality::OnTime,
        }
    }
}

/// One scheduled departure matched to an observed arrival.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PunctualityRecord {
    pub line: LineId,
    pub stop: StopId,
    /// Scheduled departure
    pub departure: ClockTime,
    /// Matched observed arrival
    pub closest: ClockTime,
    /// `closest - departure`; negative when early
    pub difference_minutes: i64,
    pub punctuality: Punctuality,
}

impl PunctualityRecord {
    /// Magnitude of the deviation in minutes.
    pub fn abs_difference(&self) -> i64 {
        self.difference_minutes.abs()
    }
}

/// Punctuality per stop, over all lines serving it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StopPunctuality {
    pub stop: StopId,
    pub total: usize,
    /// Records late by more than the tolerance
    pub late: usize,
}

impl StopPunctuality {
    pub fn late_ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.late as f64 / self.total as f64
        }
    }
}

/// A stop with a high share of late departures.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BadStop {
    pub stop: StopId,
    pub name: String,
    pub position: GpsPoint,
    pub total: usize,
    pub late: usize,
}

/// Records of one target hour plus the departures that could not be matched.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PunctualityReport {
    pub records: Vec<PunctualityRecord>,
    /// Departures discarded because no arrival was observed or the closest one
    /// reached outside the target hour
    pub boundary_inaccuracy_count: usize,
}

impl PunctualityReport {
    /// Share of evaluated departures discarded as boundary inaccuracies, in percent.
    ///
    /// 0 when nothing was evaluated.
    pub fn boundary_inaccuracy_percentage(&self) -> f64 {
        let evaluated = self.records.len() + self.boundary_inaccuracy_count;
        if evaluated == 0 {
            return 0.0;
        }
        self.boundary_inaccuracy_count as f64 / evaluated as f64 * 100.0
    }

    /// Histogram of deviations over ascending delimiters `d_0 < ... < d_n`, in minutes.
    ///
    /// Bins run from most early to most late: early by `d_n` or more, early
    /// within each `[d_i, d_i+1)` (descending), within `d_0` either way, late
    /// within each `[d_i, d_i+1)`, late by `d_n` or more.
    ///
    /// # Example
    /// ```
    /// use bus_punctuality::PunctualityReport;
    ///
    /// let report = PunctualityReport::default();
    /// let bins = report.histogram(&[1, 3, 5]).unwrap();
    /// let labels: Vec<&str> = bins.iter().map(|b| b.label.as_str()).collect();
    /// assert_eq!(labels, vec![
    ///     ">5 min early", "3-5 min early", "1-3 min early",
    ///     "within 1 min",
    ///     "1-3 min late", "3-5 min late", ">5 min late",
    /// ]);
    /// ```
    pub fn histogram(&self, delimiters: &[i64]) -> Result<Vec<HistogramBin>> {
        check_delimiters(delimiters)?;
        let first = delimiters[0];
        let last = delimiters[delimiters.len() - 1];

        let count = |kind: Punctuality, lo: i64, hi: i64| {
            self.records
                .iter()
                .filter(|r| r.punctuality == kind && r.abs_difference() >= lo && r.abs_difference() < hi)
                .count()
        };

        let mut bins = vec![HistogramBin::new(
            format!(">{last} min early"),
            count(Punctuality::Early, last, i64::MAX),
        )];
        for w in delimiters.windows(2).rev() {
            bins.push(HistogramBin::new(
                format!("{}-{} min early", w[0], w[1]),
                count(Punctuality::Early, w[0], w[1]),
            ));
        }
        let within = self
            .records
            .iter()
            .filter(|r| r.abs_difference() < first)
            .count()
            + count(Punctuality::OnTime, first, i64::MAX);
        bins.push(HistogramBin::new(format!("within {first} min"), within));
        for w in delimiters.windows(2) {
            bins.push(HistogramBin::new(
                format!("{}-{} min late", w[0], w[1]),
                count(Punctuality::Late, w[0], w[1]),
            ));
        }
        bins.push(HistogramBin::new(
            format!(">{last} min late"),
            count(Punctuality::Late, last, i64::MAX),
        ));

        Ok(bins)
    }

    /// Records and late records per stop, ordered by stop ID.
    ///
    /// A record is late when it is `Late` by more than `tolerance` minutes.
    pub fn stop_summary(&self, tolerance: i64) -> Vec<StopPunctuality> {
        let mut by_stop: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
        for record in &self.records {
            let entry = by_stop.entry(record.stop.as_str()).or_default();
            entry.0 += 1;
            if record.punctuality == Punctuality::Late && record.abs_difference() > tolerance {
                entry.1 += 1;
            }
        }

        by_stop
            .into_iter()
            .map(|(stop, (total, late))| StopPunctuality { stop: stop.to_string(), total, late })
            .collect()
    }
}

/// Stops with more than `min_records` records whose late ratio exceeds `min_ratio`.
///
/// Stops missing from the stop table are skipped.
pub fn bad_stops(
    summary: &[StopPunctuality],
    stops: &StopTable,
    min_records: usize,
    min_ratio: f64,
) -> Vec<BadStop> {
    summary
        .iter()
        .filter(|s| s.total > min_records && s.late_ratio() > min_ratio)
        .filter_map(|s| {
            stops.get(&s.stop).map(|info| BadStop {
                stop: s.stop.clone(),
                name: info.name.clone(),
                position: info.position(),
                total: s.total,
                late: s.late,
            })
        })
        .collect()
}

/// Observed arrival closest to `departure`; the first wins ties.
fn closest_arrival(arrivals: &[ClockTime], departure: ClockTime) -> Option<ClockTime> {
    let mut best: Option<(i64, ClockTime)> = None;
    for &arrival in arrivals {
        let gap = departure.minutes_until(arrival).abs();
        if best.map_or(true, |(min, _)| gap < min) {
            best = Some((gap, arrival));
        }
    }
    best.map(|(_, arrival)| arrival)
}

/// A deviation reaching past either end of the departure's hour.
fn is_boundary_artifact(difference_minutes: i64, departure: ClockTime) -> bool {
    let minute = departure.minute() as i64;
    let magnitude = difference_minutes.abs();
    magnitude > minute || magnitude > 60 - minute
}

/// Match the timetable's departures in `hour` against observed arrivals.
///
/// Only lines present in `observations` are evaluated.
pub fn match_departures(
    observations: &ArrivalObservations,
    timetable: &Timetable,
    hour: u32,
) -> PunctualityReport {
    let start = Instant::now();
    let mut report = PunctualityReport::default();

    for line in observations.lines() {
        let Some(stops) = timetable.get(line) else {
            debug!("[Punctuality] Line {} has no timetable", line);
            continue;
        };

        for (stop, departures) in stops {
            for &departure in departures.iter().filter(|d| d.hour() == hour) {
                let Some(closest) = observations
                    .arrivals(line, stop)
                    .and_then(|arrivals| closest_arrival(arrivals, departure))
                else {
                    report.boundary_inaccuracy_count += 1;
                    continue;
                };

                let difference_minutes = departure.minutes_until(closest);
                if is_boundary_artifact(difference_minutes, departure) {
                    report.boundary_inaccuracy_count += 1;
                    continue;
                }

                report.records.push(PunctualityRecord {
                    line: line.to_string(),
                    stop: stop.clone(),
                    departure,
                    closest,
                    difference_minutes,
                    punctuality: Punctuality::from_difference(difference_minutes),
                });
            }
        }
    }

    info!(
        "[Punctuality] {} departures matched, {} boundary inaccuracies in {}ms",
        report.records.len(),
        report.boundary_inaccuracy_count,
        start.elapsed().as_millis()
    );

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        CanonicalRoute, CanonicalRoutes, ClassifiedPing, Direction, LivePing, RouteData, StopInfo,
        VehicleRun,
    };
    use chrono::NaiveDateTime;

    fn clock(s: &str) -> ClockTime {
        s.parse().unwrap()
    }

    fn record(stop: &str, difference_minutes: i64) -> PunctualityRecord {
        PunctualityRecord {
            line: "180".to_string(),
            stop: stop.to_string(),
            departure: clock("10:30"),
            closest: clock("10:30"),
            difference_minutes,
            punctuality: Punctuality::from_difference(difference_minutes),
        }
    }

    /// Observations with one vehicle per `(stop, arrival)` passing exactly at the stop.
    fn observed(arrivals: &[(&str, &str)]) -> (ArrivalObservations, Timetable) {
        let mut stops = StopTable::new();
        let mut pings = Vec::new();
        for (i, (stop, time)) in arrivals.iter().enumerate() {
            let lat = 52.20 + i as f64 * 0.05;
            stops.insert(stop.to_string(), StopInfo::new(*stop, lat, 21.0));
            let t = NaiveDateTime::parse_from_str(&format!("2024-01-29 {time}:00"), "%Y-%m-%d %H:%M:%S").unwrap();
            pings.push(ClassifiedPing {
                ping: LivePing::new("180", "7", 21.0, lat, t),
                closest_stop: i,
                distance_km: 0.0,
                direction: Direction::Forward,
            });
        }
        let forward: Vec<String> = stops.keys().cloned().collect();
        let mut line_routes = crate::LineRoutes::new();
        line_routes.insert("180".to_string(), vec![forward.clone()]);
        let data = RouteData::new(stops, line_routes, Timetable::new()).unwrap();
        let mut routes = CanonicalRoutes::new();
        routes.insert("180".to_string(), CanonicalRoute { forward, backward: None });

        let run = VehicleRun { line: "180".to_string(), vehicle: "7".to_string(), pings };
        let obs = crate::estimate_arrivals(&[run], &routes, &data, 1.0).unwrap();
        (obs, Timetable::new())
    }

    fn schedule(timetable: &mut Timetable, line: &str, stop: &str, departures: &[&str]) {
        timetable
            .entry(line.to_string())
            .or_default()
            .insert(stop.to_string(), departures.iter().map(|d| clock(d)).collect());
    }

    #[test]
    fn test_far_arrival_is_boundary() {
        let (obs, mut timetable) = observed(&[("100101", "10:50")]);
        schedule(&mut timetable, "180", "100101", &["10:05"]);

        let report = match_departures(&obs, &timetable, 10);
        assert!(report.records.is_empty());
        assert_eq!(report.boundary_inaccuracy_count, 1);
        assert_eq!(report.boundary_inaccuracy_percentage(), 100.0);
    }

    #[test]
    fn test_late_by_two_minutes() {
        let (obs, mut timetable) = observed(&[("100101", "10:32")]);
        schedule(&mut timetable, "180", "100101", &["10:30"]);

        let report = match_departures(&obs, &timetable, 10);
        assert_eq!(report.boundary_inaccuracy_count, 0);
        assert_eq!(report.records.len(), 1);
        let r = &report.records[0];
        assert_eq!(r.punctuality, Punctuality::Late);
        assert_eq!(r.difference_minutes, 2);
        assert_eq!(r.closest, clock("10:32"));
    }

    #[test]
    fn test_other_hours_and_missing_stops() {
        let (obs, mut timetable) = observed(&[("100101", "10:20")]);
        schedule(&mut timetable, "180", "100101", &["9:20", "10:18", "11:20"]);
        schedule(&mut timetable, "180", "100201", &["10:30"]);
        // Not observed at all, so never evaluated
        schedule(&mut timetable, "999", "100101", &["10:30"]);

        let report = match_departures(&obs, &timetable, 10);
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].difference_minutes, 2);
        assert_eq!(report.boundary_inaccuracy_count, 1);
        assert_eq!(report.boundary_inaccuracy_percentage(), 50.0);
    }

    #[test]
    fn test_closest_arrival_first_on_ties() {
        let arrivals = [clock("10:28"), clock("10:32"), clock("10:29")];
        assert_eq!(closest_arrival(&arrivals, clock("10:30")), Some(clock("10:29")));
        let tied = [clock("10:32"), clock("10:28")];
        assert_eq!(closest_arrival(&tied, clock("10:30")), Some(clock("10:32")));
        assert_eq!(closest_arrival(&[], clock("10:30")), None);
    }

    #[test]
    fn test_boundary_artifact() {
        assert!(is_boundary_artifact(45, clock("10:05")));
        assert!(is_boundary_artifact(-6, clock("10:05")));
        assert!(!is_boundary_artifact(-5, clock("10:05")));
        assert!(is_boundary_artifact(3, clock("10:58")));
        assert!(!is_boundary_artifact(0, clock("10:00")));
        assert!(is_boundary_artifact(1, clock("10:00")));
    }

    #[test]
    fn test_histogram() {
        let report = PunctualityReport {
            records: vec![
                record("a", -7),
                record("a", -4),
                record("a", -1),
                record("a", 0),
                record("b", 1),
                record("b", 2),
                record("b", 5),
                record("b", 12),
            ],
            boundary_inaccuracy_count: 0,
        };

        let counts: Vec<usize> = report.histogram(&[2, 5]).unwrap().iter().map(|b| b.count).collect();
        // >5 early, 2-5 early, within 2, 2-5 late, >5 late
        assert_eq!(counts, vec![1, 1, 3, 1, 2]);
        assert!(report.histogram(&[]).is_err());
    }

    #[test]
    fn test_stop_summary_and_bad_stops() {
        let report = PunctualityReport {
            records: vec![record("100101", 5), record("100101", 1), record("100101", 4), record("100201", -6)],
            boundary_inaccuracy_count: 0,
        };

        let summary = report.stop_summary(3);
        assert_eq!(
            summary,
            vec![
                StopPunctuality { stop: "100101".to_string(), total: 3, late: 2 },
                StopPunctuality { stop: "100201".to_string(), total: 1, late: 0 },
            ]
        );

        let mut stops = StopTable::new();
        stops.insert("100101".to_string(), StopInfo::new("Centrum", 52.23, 21.01));
        let bad = bad_stops(&summary, &stops, 2, 0.5);
        assert_eq!(bad.len(), 1);
        assert_eq!(bad[0].name, "Centrum");
        assert!(bad_stops(&summary, &stops, 3, 0.5).is_empty());
    }
}
