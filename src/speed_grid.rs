//! Spatial speed grid.
//!
//! Speed samples are bucketed into a sparse grid of cells by rounding their
//! coordinates to a fixed number of decimal places (2 decimals is roughly a
//! 1.1 km by 0.7 km cell in Warsaw). Each cell counts its samples and how many
//! of them were fast, which is what the fast-places map is drawn from.

use std::collections::HashMap;

use log::info;
use serde::Serialize;

use crate::SpeedSample;

/// A single cell of the speed grid
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpeedGridCell {
    /// Rounded cell coordinates
    pub lat: f64,
    pub lon: f64,
    /// Number of speed samples in the cell
    pub total: usize,
    /// Samples above the fast-speed threshold
    pub fast: usize,
}

impl SpeedGridCell {
    pub fn fast_ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.fast as f64 / self.total as f64
        }
    }
}

/// Complete speed grid
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpeedGrid {
    /// Non-empty cells only, ordered by longitude then latitude
    pub cells: Vec<SpeedGridCell>,
    /// Decimal places coordinates were rounded to
    pub decimals: u32,
    /// Threshold a sample had to exceed to count as fast
    pub fast_speed_kmh: f64,
    pub total_samples: usize,
    /// Largest sample count of any cell
    pub max_total: usize,
}

impl SpeedGrid {
    /// Cells with more than `min_samples` samples whose fast ratio exceeds `min_ratio`.
    pub fn fast_cells(&self, min_samples: usize, min_ratio: f64) -> Vec<&SpeedGridCell> {
        self.cells
            .iter()
            .filter(|c| c.total > min_samples && c.fast_ratio() > min_ratio)
            .collect()
    }

    /// The cell containing a location, if any sample fell into it.
    pub fn query_cell(&self, lat: f64, lon: f64) -> Option<&SpeedGridCell> {
        let scale = 10f64.powi(self.decimals as i32);
        let (col, row) = (to_grid_coord(lon, scale), to_grid_coord(lat, scale));
        self.cells
            .iter()
            .find(|c| to_grid_coord(c.lon, scale) == col && to_grid_coord(c.lat, scale) == row)
    }
}

// Internal cell data during construction
#[derive(Debug, Default)]
struct CellBuilder {
    total: usize,
    fast: usize,
}

/// Grid coordinate: (longitude, latitude) in units of the rounding step
type CellCoord = (i64, i64);

/// Round a coordinate to the grid, halves to even.
fn to_grid_coord(value: f64, scale: f64) -> i64 {
    (value * scale).round_ties_even() as i64
}

/// Speed grid builder
struct GridBuilder {
    decimals: u32,
    scale: f64,
    fast_speed_kmh: f64,
    cells: HashMap<CellCoord, CellBuilder>,
}

impl GridBuilder {
    fn new(decimals: u32, fast_speed_kmh: f64) -> Self {
        Self {
            decimals,
            scale: 10f64.powi(decimals as i32),
            fast_speed_kmh,
            cells: HashMap::new(),
        }
    }

    fn add_sample(&mut self, sample: &SpeedSample) {
        let coord = (
            to_grid_coord(sample.position.longitude, self.scale),
            to_grid_coord(sample.position.latitude, self.scale),
        );
        let cell = self.cells.entry(coord).or_default();
        cell.total += 1;
        if sample.speed_kmh > self.fast_speed_kmh {
            cell.fast += 1;
        }
    }

    fn build(self) -> SpeedGrid {
        let mut coords: Vec<(&CellCoord, &CellBuilder)> = self.cells.iter().collect();
        coords.sort_by_key(|(coord, _)| **coord);

        let cells: Vec<SpeedGridCell> = coords
            .into_iter()
            .map(|(&(col, row), builder)| SpeedGridCell {
                lat: row as f64 / self.scale,
                lon: col as f64 / self.scale,
                total: builder.total,
                fast: builder.fast,
            })
            .collect();

        SpeedGrid {
            total_samples: cells.iter().map(|c| c.total).sum(),
            max_total: cells.iter().map(|c| c.total).max().unwrap_or(0),
            cells,
            decimals: self.decimals,
            fast_speed_kmh: self.fast_speed_kmh,
        }
    }
}

/// Bucket speed samples into a grid rounded to `decimals` places.
///
/// # Example
/// ```
/// use chrono::NaiveDateTime;
/// use bus_punctuality::{generate_speed_grid, GpsPoint, SpeedSample};
///
/// let time = NaiveDateTime::parse_from_str("2024-01-29 10:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
/// let sample = |lat: f64, speed_kmh: f64| SpeedSample {
///     vehicle: "7".to_string(),
///     line: "180".to_string(),
///     position: GpsPoint::new(lat, 21.001),
///     time,
///     speed_kmh,
/// };
///
/// let grid = generate_speed_grid(&[sample(52.201, 60.0), sample(52.203, 20.0)], 2, 50.0);
/// assert_eq!(grid.cells.len(), 1);
/// assert_eq!((grid.cells[0].total, grid.cells[0].fast), (2, 1));
/// ```
pub fn generate_speed_grid(samples: &[SpeedSample], decimals: u32, fast_speed_kmh: f64) -> SpeedGrid {
    let mut grid = GridBuilder::new(decimals, fast_speed_kmh);
    for sample in samples {
        grid.add_sample(sample);
    }
    let grid = grid.build();

    info!(
        "[SpeedGrid] {} samples in {} cells",
        grid.total_samples,
        grid.cells.len()
    );

    grid
}
