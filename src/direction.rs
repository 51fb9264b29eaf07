//! Direction classification of a vehicle run from its nearest-stop indices.
//!
//! A run that only climbs through the forward route's stop indices is travelling
//! forward, one that only descends is travelling backward. Runs that turn around
//! show an extremum away from both ends of the run; samples on either side of a
//! turnaround get opposite labels and samples at the turnaround itself are left
//! unlabelled.

use log::info;

use crate::{ClassifiedPing, Direction, MatchedPing, VehicleRun};

/// First and last positions holding a value.
#[derive(Debug, Clone, Copy)]
struct Extremum {
    value: usize,
    first: usize,
    last: usize,
}

impl Extremum {
    fn find(indices: &[usize], value: usize) -> Self {
        let first = indices.iter().position(|&x| x == value).unwrap_or(0);
        let last = indices.iter().rposition(|&x| x == value).unwrap_or(0);
        Self { value, first, last }
    }

    /// Neither occurrence falls within `margin` samples of an end of the run.
    fn is_interior(&self, len: usize, margin: usize) -> bool {
        self.first >= margin && self.last + margin < len
    }
}

/// Label each position of a time-ordered sequence of nearest-stop indices.
///
/// `None` marks samples whose direction cannot be inferred.
///
/// # Example
/// ```
/// use bus_punctuality::direction::classify_directions;
/// use bus_punctuality::Direction;
///
/// let labels = classify_directions(&[0, 1, 2, 3, 4, 5, 6], 3);
/// assert!(labels.iter().all(|l| *l == Some(Direction::Forward)));
/// ```
pub fn classify_directions(indices: &[usize], edge_margin: usize) -> Vec<Option<Direction>> {
    let len = indices.len();
    let (Some(&min), Some(&max)) = (indices.iter().min(), indices.iter().max()) else {
        return Vec::new();
    };

    let lo = Extremum::find(indices, min);
    let hi = Extremum::find(indices, max);
    let unknown = || vec![None; len];

    match (lo.is_interior(len, edge_margin), hi.is_interior(len, edge_margin)) {
        (true, true) => unknown(),
        // Descends into a valley, then climbs back out
        (true, false) => {
            if indices[lo.first..=lo.last].iter().max() == Some(&hi.value) {
                return unknown();
            }
            (0..len)
                .map(|i| {
                    if i <= lo.first {
                        Some(Direction::Backward)
                    } else if i >= lo.last {
                        Some(Direction::Forward)
                    } else {
                        None
                    }
                })
                .collect()
        }
        // Climbs to a peak, then descends
        (false, true) => {
            if indices[hi.first..=hi.last].iter().min() == Some(&lo.value) {
                return unknown();
            }
            (0..len)
                .map(|i| {
                    if i <= hi.first {
                        Some(Direction::Forward)
                    } else if i >= hi.last {
                        Some(Direction::Backward)
                    } else {
                        None
                    }
                })
                .collect()
        }
        (false, false) => {
            let (label, from, to) = if lo.first < edge_margin {
                (Direction::Forward, lo.last, hi.first)
            } else {
                (Direction::Backward, hi.last, lo.first)
            };
            (0..len)
                .map(|i| (from <= i && i <= to).then_some(label))
                .collect()
        }
    }
}

/// Label a matched run and drop the samples whose direction is unknown.
///
/// The run must be time-ordered.
pub fn assign_directions(run: VehicleRun<MatchedPing>, edge_margin: usize) -> VehicleRun<ClassifiedPing> {
    let indices: Vec<usize> = run.pings.iter().map(|m| m.closest_stop).collect();
    let labels = classify_directions(&indices, edge_margin);

    let VehicleRun { line, vehicle, pings } = run;
    let pings = pings
        .into_iter()
        .zip(labels)
        .filter_map(|(m, label)| {
            label.map(|direction| ClassifiedPing {
                ping: m.ping,
                closest_stop: m.closest_stop,
                distance_km: m.distance_km,
                direction,
            })
        })
        .collect();

    VehicleRun { line, vehicle, pings }
}

/// Classify every run, dropping runs left without any labelled sample.
pub fn classify_runs(
    runs: Vec<VehicleRun<MatchedPing>>,
    edge_margin: usize,
) -> Vec<VehicleRun<ClassifiedPing>> {
    let total = runs.len();

    #[cfg(feature = "parallel")]
    let classified: Vec<VehicleRun<ClassifiedPing>> = {
        use rayon::prelude::*;
        runs.into_par_iter()
            .map(|run| assign_directions(run, edge_margin))
            .filter(|run| !run.pings.is_empty())
            .collect()
    };

    #[cfg(not(feature = "parallel"))]
    let classified: Vec<VehicleRun<ClassifiedPing>> = runs
        .into_iter()
        .map(|run| assign_directions(run, edge_margin))
        .filter(|run| !run.pings.is_empty())
        .collect();

    info!(
        "[Direction] {} of {} runs have a known direction",
        classified.len(),
        total
    );

    classified
}
