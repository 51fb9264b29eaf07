//! # Route Reconciliation
//!
//! A line is recorded as a handful of route variants: both directions, short
//! turns, branches and loops. The rest of the pipeline needs at most two of
//! them, so each line is reduced to a canonical route:
//!
//! 1. The **forward** route is the variant with the most stops.
//! 2. A variant runs in **reverse** when the stop groups it shares with the
//!    forward route appear mostly in the opposite order.
//! 3. The **backward** route is the longest reverse variant, if there is one.
//!
//! ## Stop groups
//!
//! Stop IDs share a 4-character group code between the platforms of one
//! interchange (`"1001"` in `"100101"` and `"100102"`). Opposite directions stop
//! at different platforms of the same group, so variants are compared by group.
//!
//! Lines without a reverse variant get only a forward route; return traffic on
//! such lines is later classified as unknown and dropped.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::hash::Hash;

use log::{debug, info, warn};
use serde::Serialize;

use crate::{LineId, LineRoutes, RouteVariant};

/// The one or two route variants representing a line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanonicalRoute {
    /// Longest recorded variant, route index 0
    pub forward: RouteVariant,
    /// Longest variant running opposite to `forward`, route index 1
    pub backward: Option<RouteVariant>,
}

impl CanonicalRoute {
    /// Routes in index order: forward, then backward if present.
    pub fn variants(&self) -> impl Iterator<Item = &RouteVariant> {
        std::iter::once(&self.forward).chain(self.backward.as_ref())
    }

    /// Route travelled by direction label `index`.
    pub fn variant(&self, index: usize) -> Option<&RouteVariant> {
        match index {
            0 => Some(&self.forward),
            1 => self.backward.as_ref(),
            _ => None,
        }
    }

    /// Every stop served by either direction.
    pub fn stops(&self) -> BTreeSet<&str> {
        self.variants().flatten().map(String::as_str).collect()
    }
}

pub type CanonicalRoutes = BTreeMap<LineId, CanonicalRoute>;

/// Pick the canonical forward and backward route of every line.
///
/// # Example
/// ```
/// use bus_punctuality::{LineRoutes, reconcile_routes};
///
/// let to_route = |stops: &[&str]| stops.iter().map(|s| s.to_string()).collect::<Vec<_>>();
/// let mut routes = LineRoutes::new();
/// routes.insert("1".to_string(), vec![
///     to_route(&["1", "2", "3", "4"]),
///     to_route(&["1", "3", "4"]),
///     to_route(&["3", "2", "1"]),
///     to_route(&["2", "1"]),
/// ]);
///
/// let canonical = reconcile_routes(&routes);
/// assert_eq!(canonical["1"].forward, to_route(&["1", "2", "3", "4"]));
/// assert_eq!(canonical["1"].backward, Some(to_route(&["3", "2", "1"])));
/// ```
pub fn reconcile_routes(line_routes: &LineRoutes) -> CanonicalRoutes {
    let mut canonical = CanonicalRoutes::new();

    for (line, variants) in line_routes {
        let Some(forward) = longest(variants.iter()) else {
            warn!("[Routes] Line {} has no recorded route variants, skipping", line);
            continue;
        };

        let backward = longest(variants.iter().filter(|v| is_reverse_of(v, forward)));
        debug!(
            "[Routes] Line {}: forward route of {} stops, backward route of {} stops",
            line,
            forward.len(),
            backward.map_or(0, |b| b.len())
        );

        canonical.insert(
            line.clone(),
            CanonicalRoute {
                forward: forward.clone(),
                backward: backward.cloned(),
            },
        );
    }

    let with_reverse = canonical.values().filter(|r| r.backward.is_some()).count();
    info!(
        "[Routes] Reconciled {} lines, {} with a reverse route",
        canonical.len(),
        with_reverse
    );

    canonical
}

/// First variant with the most stops.
fn longest<'a>(variants: impl Iterator<Item = &'a RouteVariant>) -> Option<&'a RouteVariant> {
    variants.fold(None, |best, v| match best {
        Some(b) if b.len() >= v.len() => Some(b),
        _ => Some(v),
    })
}

/// Does `candidate` run against `forward`?
///
/// Both are reduced to the stop groups they share; the candidate is a reverse
/// variant when fewer than half of all group pairs keep the forward order.
pub fn is_reverse_of(candidate: &[String], forward: &[String]) -> bool {
    let candidate_groups: Vec<&str> = candidate.iter().map(|s| stop_group(s)).collect();
    let reversed_groups: Vec<&str> = forward.iter().rev().map(|s| stop_group(s)).collect();

    let (candidate_groups, reversed_groups) = common_sublists(&candidate_groups, &reversed_groups);

    let n = candidate_groups.len();
    let pairs = n * n.saturating_sub(1);
    // inversions < n(n-1)/4, kept in integers
    4 * inversions(&candidate_groups, &reversed_groups) < pairs
}

/// The 4-character group code of a stop ID.
pub fn stop_group(stop: &str) -> &str {
    match stop.char_indices().nth(4) {
        Some((end, _)) => &stop[..end],
        None => stop,
    }
}

/// Reduce two sequences to the elements they share.
///
/// Order is preserved and repeated elements keep only their first occurrence.
///
/// # Example
/// ```
/// use bus_punctuality::routes::common_sublists;
///
/// let (a, b) = common_sublists(&[1, 2, 12, 4, 5], &[5, 4, -3, 2, 1]);
/// assert_eq!(a, vec![1, 2, 4, 5]);
/// assert_eq!(b, vec![5, 4, 2, 1]);
/// ```
pub fn common_sublists<T: Eq + Hash + Clone>(a: &[T], b: &[T]) -> (Vec<T>, Vec<T>) {
    let in_a: HashSet<&T> = a.iter().collect();
    let in_b: HashSet<&T> = b.iter().collect();

    (keep_shared(a, &in_b), keep_shared(b, &in_a))
}

fn keep_shared<T: Eq + Hash + Clone>(items: &[T], other: &HashSet<&T>) -> Vec<T> {
    let mut seen: HashSet<&T> = HashSet::new();
    items
        .iter()
        .filter(|x| other.contains(*x) && seen.insert(*x))
        .cloned()
        .collect()
}

/// Count pairs `i < j` of `perm2` whose elements appear in the opposite order in `perm1`.
///
/// Both sequences are expected to be arrangements of the same distinct elements;
/// pairs involving an element missing from `perm1` are not counted.
pub fn inversions<T: Eq + Hash>(perm1: &[T], perm2: &[T]) -> usize {
    let mut position: HashMap<&T, usize> = HashMap::with_capacity(perm1.len());
    for (i, x) in perm1.iter().enumerate() {
        position.entry(x).or_insert(i);
    }

    let mapped: Vec<Option<usize>> = perm2.iter().map(|x| position.get(x).copied()).collect();

    let mut count = 0;
    for i in 0..mapped.len() {
        for j in (i + 1)..mapped.len() {
            if let (Some(pi), Some(pj)) = (mapped[i], mapped[j]) {
                if pi > pj {
                    count += 1;
                }
            }
        }
    }
    count
}
