//! Stateful front end that computes aggregates on demand and caches them.

use log::info;
use serde::Serialize;

use crate::error::{Aggregate, AnalysisError, Result};
use crate::punctuality::bad_stops;
use crate::speed::speed_histogram;
use crate::speed_grid::{generate_speed_grid, SpeedGrid, SpeedGridCell};
use crate::{
    longest_routes, run_punctuality_pipeline, speed_samples, vehicle_distances, AnalysisConfig,
    BadStop, HistogramBin, LivePing, LongestRoute, PipelineStats, PunctualityReport, RouteData,
    SpeedSample, StopPunctuality, StopTable, VehicleDistance,
};

/// Aggregates computed so far.
///
/// Each accessor fails with [`AnalysisError::MissingAggregate`] until the
/// matching `create_*` operation of [`Analyzer`] has run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Results {
    speed_data: Option<Vec<SpeedSample>>,
    places_speed_data: Option<SpeedGrid>,
    punctuality_data: Option<PunctualityReport>,
    pipeline_stats: Option<PipelineStats>,
    stop_punctuality_data: Option<Vec<StopPunctuality>>,
    stop_info: Option<StopTable>,
    vehicle_distances: Option<Vec<VehicleDistance>>,
    longest_routes: Option<Vec<LongestRoute>>,
}

fn require<T>(value: Option<T>, aggregate: Aggregate) -> Result<T> {
    value.ok_or(AnalysisError::MissingAggregate(aggregate))
}

impl Results {
    pub fn speed_data(&self) -> Result<&[SpeedSample]> {
        require(self.speed_data.as_deref(), Aggregate::SpeedData)
    }

    pub fn places_speed_data(&self) -> Result<&SpeedGrid> {
        require(self.places_speed_data.as_ref(), Aggregate::PlacesSpeedData)
    }

    pub fn punctuality_data(&self) -> Result<&PunctualityReport> {
        require(self.punctuality_data.as_ref(), Aggregate::PunctualityData)
    }

    pub fn boundary_inaccuracy_count(&self) -> Result<usize> {
        Ok(self.punctuality_data()?.boundary_inaccuracy_count)
    }

    /// Stage counts of the last punctuality run.
    pub fn pipeline_stats(&self) -> Option<&PipelineStats> {
        self.pipeline_stats.as_ref()
    }

    pub fn stop_punctuality_data(&self) -> Result<&[StopPunctuality]> {
        require(self.stop_punctuality_data.as_deref(), Aggregate::StopPunctualityData)
    }

    pub fn vehicle_distances(&self) -> Result<&[VehicleDistance]> {
        require(self.vehicle_distances.as_deref(), Aggregate::VehicleDistances)
    }

    pub fn longest_routes(&self) -> Result<&[LongestRoute]> {
        require(self.longest_routes.as_deref(), Aggregate::LongestRoutes)
    }

    /// Histogram of sample speeds; see [`speed_histogram`].
    pub fn speed_histogram(&self, delimiters: &[f64]) -> Result<Vec<HistogramBin>> {
        speed_histogram(self.speed_data()?, delimiters)
    }

    /// Grid cells with more than `min_samples` samples and a fast ratio above `min_ratio`.
    pub fn fast_places(&self, min_samples: usize, min_ratio: f64) -> Result<Vec<&SpeedGridCell>> {
        Ok(self.places_speed_data()?.fast_cells(min_samples, min_ratio))
    }

    pub fn boundary_inaccuracy_percentage(&self) -> Result<f64> {
        Ok(self.punctuality_data()?.boundary_inaccuracy_percentage())
    }

    /// Histogram of punctuality records; see [`PunctualityReport::histogram`].
    pub fn punctuality_histogram(&self, delimiters: &[i64]) -> Result<Vec<HistogramBin>> {
        self.punctuality_data()?.histogram(delimiters)
    }

    /// Stops with more than `min_records` records and a late ratio above `min_ratio`.
    pub fn bad_stops(&self, min_records: usize, min_ratio: f64) -> Result<Vec<BadStop>> {
        let summary = self.stop_punctuality_data()?;
        let stops = require(self.stop_info.as_ref(), Aggregate::StopPunctualityData)?;
        Ok(bad_stops(summary, stops, min_records, min_ratio))
    }
}

/// Analysis of one target hour.
///
/// # Example
/// ```
/// use bus_punctuality::{Aggregate, AnalysisError, Analyzer};
///
/// let analyzer = Analyzer::new(8).unwrap();
/// assert!(matches!(
///     analyzer.results().speed_data(),
///     Err(AnalysisError::MissingAggregate(Aggregate::SpeedData))
/// ));
/// assert!(Analyzer::new(24).is_err());
/// ```
#[derive(Debug, Clone)]
pub struct Analyzer {
    hour: u32,
    config: AnalysisConfig,
    results: Results,
}

impl Analyzer {
    /// Analyse `hour` (0-23) with the default thresholds.
    pub fn new(hour: u32) -> Result<Self> {
        Self::with_config(hour, AnalysisConfig::default())
    }

    pub fn with_config(hour: u32, config: AnalysisConfig) -> Result<Self> {
        if hour > 23 {
            return Err(AnalysisError::InvalidHour(hour));
        }
        Ok(Self { hour, config, results: Results::default() })
    }

    pub fn hour(&self) -> u32 {
        self.hour
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn results(&self) -> &Results {
        &self.results
    }

    pub fn into_results(self) -> Results {
        self.results
    }

    /// Speed samples of the target hour. No-op if already computed.
    pub fn create_speed_data(&mut self, pings: &[LivePing]) {
        if self.results.speed_data.is_none() {
            self.results.speed_data = Some(speed_samples(pings, self.hour));
        }
    }

    /// Speed grid, computing the speed samples first if needed. No-op if already computed.
    pub fn create_places_speed_data(&mut self, pings: &[LivePing]) {
        if self.results.places_speed_data.is_some() {
            return;
        }
        self.create_speed_data(pings);
        let samples = self.results.speed_data.as_deref().unwrap_or_default();
        self.results.places_speed_data = Some(generate_speed_grid(
            samples,
            self.config.grid_decimals,
            self.config.fast_speed_kmh,
        ));
    }

    /// Punctuality records and boundary count. No-op if already computed.
    pub fn create_punctuality_data(&mut self, pings: &[LivePing], data: &RouteData) -> Result<()> {
        if self.results.punctuality_data.is_some() {
            return Ok(());
        }
        let run = run_punctuality_pipeline(pings, data, self.hour, &self.config)?;
        self.results.punctuality_data = Some(run.report);
        self.results.pipeline_stats = Some(run.stats);
        Ok(())
    }

    /// Per-stop punctuality with the given lateness tolerance in minutes.
    ///
    /// Computes the punctuality data first if needed. Recomputed on every call.
    pub fn create_stop_punctuality_data(
        &mut self,
        pings: &[LivePing],
        data: &RouteData,
        tolerance: i64,
    ) -> Result<()> {
        self.create_punctuality_data(pings, data)?;
        let summary = self.results.punctuality_data()?.stop_summary(tolerance);
        info!(
            "[Punctuality] {} stops summarised with a {} minute tolerance",
            summary.len(),
            tolerance
        );
        self.results.stop_punctuality_data = Some(summary);
        self.results.stop_info = Some(data.stops().clone());
        Ok(())
    }

    /// Distance per vehicle. No-op if already computed.
    pub fn create_vehicle_distances(&mut self, pings: &[LivePing]) {
        if self.results.vehicle_distances.is_none() {
            self.results.vehicle_distances = Some(vehicle_distances(
                pings,
                self.hour,
                self.config.measurement_error_speed_kmh,
            ));
        }
    }

    /// The `k` longest vehicle tracks. Recomputed on every call.
    pub fn create_longest_routes(
        &mut self,
        pings: &[LivePing],
        k: usize,
        exclude_measurement_errors: bool,
    ) {
        self.results.longest_routes = Some(longest_routes(
            pings,
            self.hour,
            k,
            exclude_measurement_errors,
            self.config.measurement_error_speed_kmh,
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LineRoutes, StopInfo, Timetable};
    use chrono::NaiveDateTime;

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn pings() -> Vec<LivePing> {
        vec![
            LivePing::new("180", "7", 21.0, 52.20, at("2024-01-29 10:00:00")),
            LivePing::new("180", "7", 21.0, 52.21, at("2024-01-29 10:00:30")),
            LivePing::new("180", "7", 21.0, 52.22, at("2024-01-29 10:05:00")),
        ]
    }

    fn data() -> RouteData {
        let mut stops = StopTable::new();
        stops.insert("100101".to_string(), StopInfo::new("A", 52.20, 21.0));
        RouteData::new(stops, LineRoutes::new(), Timetable::new()).unwrap()
    }

    #[test]
    fn test_invalid_hour() {
        assert!(matches!(Analyzer::new(24), Err(AnalysisError::InvalidHour(24))));
        assert_eq!(Analyzer::new(23).unwrap().hour(), 23);
    }

    #[test]
    fn test_missing_aggregates_are_errors() {
        let analyzer = Analyzer::new(10).unwrap();
        let results = analyzer.results();

        let err = results.places_speed_data().unwrap_err();
        assert_eq!(err.to_string(), "places speed data not created");
        assert!(results.fast_places(1, 0.5).is_err());
        assert!(results.speed_histogram(&[10.0]).is_err());
        assert!(results.boundary_inaccuracy_percentage().is_err());
        assert!(results.punctuality_histogram(&[1]).is_err());
        assert!(results.bad_stops(1, 0.5).is_err());
        assert!(matches!(
            results.longest_routes(),
            Err(AnalysisError::MissingAggregate(Aggregate::LongestRoutes))
        ));
    }

    #[test]
    fn test_places_compute_speed_data_first() {
        let mut analyzer = Analyzer::new(10).unwrap();
        analyzer.create_places_speed_data(&pings());

        assert_eq!(analyzer.results().speed_data().unwrap().len(), 2);
        let grid = analyzer.results().places_speed_data().unwrap();
        assert_eq!(grid.total_samples, 2);
        // 1.1 km in half a minute is fast
        assert_eq!(analyzer.results().fast_places(0, 0.4).unwrap().len(), 1);
    }

    #[test]
    fn test_create_is_a_noop_once_computed() {
        let mut analyzer = Analyzer::new(10).unwrap();
        analyzer.create_speed_data(&pings());
        analyzer.create_speed_data(&[]);
        assert_eq!(analyzer.results().speed_data().unwrap().len(), 2);

        analyzer.create_vehicle_distances(&pings());
        analyzer.create_vehicle_distances(&[]);
        assert_eq!(analyzer.results().vehicle_distances().unwrap().len(), 1);
    }

    #[test]
    fn test_stop_punctuality_computes_punctuality_first() {
        let mut analyzer = Analyzer::new(10).unwrap();
        analyzer.create_stop_punctuality_data(&pings(), &data(), 2).unwrap();

        let results = analyzer.results();
        assert!(results.punctuality_data().unwrap().records.is_empty());
        assert_eq!(results.boundary_inaccuracy_count().unwrap(), 0);
        assert!(results.stop_punctuality_data().unwrap().is_empty());
        assert!(results.bad_stops(0, 0.0).unwrap().is_empty());
        assert_eq!(results.pipeline_stats().unwrap().input_pings, 3);
    }

    #[test]
    fn test_longest_routes() {
        let mut analyzer = Analyzer::new(10).unwrap();
        analyzer.create_longest_routes(&pings(), 5, false);
        assert_eq!(analyzer.results().longest_routes().unwrap().len(), 1);

        // 1.1 km in half a minute exceeds 100 km/h
        analyzer.create_longest_routes(&pings(), 5, true);
        assert!(analyzer.results().longest_routes().unwrap().is_empty());
    }
}
