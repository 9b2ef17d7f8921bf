//! Renumbering of templates after clustering.
//!
//! Every ordering mode yields a [`Permutation`] that is applied to the
//! template set and the labeling together, so the partition itself is left
//! unchanged.

use std::cmp::Ordering;
use std::f64::consts::PI;

use microseg_core::config::OrderingMode;
use microseg_core::labeling::Labeling;
use microseg_core::map::{norm, polarized_correlation, DataType, MapSet, Polarity, EPSILON};
use microseg_core::sample::SampleData;

/// Resolution at which two ordering keys are considered equal.
const KEY_TOLERANCE: f64 = 1e-9;

/// A reordering of `n` clusters.
///
/// `order[new] = old`: position `new` of the reordered set holds the old
/// cluster `order[new]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permutation {
    order: Vec<usize>,
}

impl Permutation {
    /// The permutation leaving `n` clusters in place.
    #[must_use]
    pub fn identity(n: usize) -> Self {
        Self {
            order: (0..n).collect(),
        }
    }

    /// Builds a permutation from the old index held at every new position.
    ///
    /// Returns `None` unless `order` holds each of `0..order.len()` exactly
    /// once.
    #[must_use]
    pub fn from_order(order: Vec<usize>) -> Option<Self> {
        let mut seen = vec![false; order.len()];
        for &old in &order {
            if old >= seen.len() || seen[old] {
                return None;
            }
            seen[old] = true;
        }
        Some(Self { order })
    }

    /// Number of clusters permuted.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns true for the permutation of zero clusters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Old index held at every new position.
    #[must_use]
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// Returns true if no cluster moves.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.order.iter().enumerate().all(|(new, &old)| new == old)
    }

    /// The permutation undoing this one.
    #[must_use]
    pub fn inverse(&self) -> Self {
        let mut order = vec![0; self.order.len()];
        for (new, &old) in self.order.iter().enumerate() {
            order[old] = new;
        }
        Self { order }
    }

    /// Reorders `templates` and renumbers `labeling` accordingly.
    pub fn apply(&self, templates: &mut MapSet, labeling: &mut Labeling) {
        if self.is_identity() {
            return;
        }
        *templates = templates.select(&self.order);
        let mut mapping = vec![None; self.order.len()];
        for (new, &old) in self.order.iter().enumerate() {
            mapping[old] = Some(new);
        }
        labeling.remap(&mapping);
    }
}

/// Computes the permutation requested by `mode` for a packed partition.
pub fn order_templates(
    mode: &OrderingMode,
    data: &SampleData,
    templates: &MapSet,
    labeling: &Labeling,
) -> Permutation {
    let n = templates.len();
    match mode {
        OrderingMode::None => Permutation::identity(n),
        OrderingMode::Temporal => temporal_order(labeling, n),
        OrderingMode::Topographic { coordinates } => {
            let keys: Vec<f64> = templates
                .iter()
                .map(|t| topographic_key(t, coordinates, data.data_type(), data.polarity()))
                .collect();
            sort_by_keys(&keys, None)
        }
        OrderingMode::Anatomical { coordinates } => {
            let (spread, center_y): (Vec<f64>, Vec<f64>) = templates
                .iter()
                .map(|t| anatomical_keys(t, coordinates, data.data_type()))
                .unzip();
            sort_by_keys(&spread, Some(&center_y))
        }
        OrderingMode::Reference { templates: reference } => {
            reference_order(templates, reference, data.data_type(), data.polarity())
        }
    }
}

/// Clusters by first appearance; clusters without samples go last.
fn temporal_order(labeling: &Labeling, n: usize) -> Permutation {
    let mut first = vec![usize::MAX; n];
    for i in 0..labeling.len() {
        if let Some(c) = labeling.get(i) {
            if c < n && first[c] == usize::MAX {
                first[c] = i;
            }
        }
    }
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by_key(|&c| (first[c], c));
    Permutation { order }
}

/// Ascending keys, secondary keys breaking near-ties, then the old index.
///
/// Keys are snapped to a grid of `KEY_TOLERANCE` so that near-equal keys
/// compare equal while the comparison stays a total order.
fn sort_by_keys(keys: &[f64], secondary: Option<&[f64]>) -> Permutation {
    let mut order: Vec<usize> = (0..keys.len()).collect();
    order.sort_by_key(|&c| {
        (
            quantize(keys[c]),
            secondary.map_or(0, |s| quantize(s[c])),
            c,
        )
    });
    Permutation { order }
}

#[allow(clippy::cast_possible_truncation)]
fn quantize(key: f64) -> i64 {
    if key.is_finite() {
        (key / KEY_TOLERANCE).round() as i64
    } else {
        i64::MAX
    }
}

/// Per-point signed values: electrode values, or the norm of each
/// 3-component point signed by its largest absolute coordinate.
fn point_values(template: &[f64], data_type: DataType) -> Vec<f64> {
    match data_type {
        DataType::Vector => template
            .chunks(3)
            .map(|p| {
                let dominant = p
                    .iter()
                    .copied()
                    .max_by(|a, b| a.abs().total_cmp(&b.abs()))
                    .unwrap_or(0.0);
                norm(p).copysign(dominant)
            })
            .collect(),
        DataType::Scalar | DataType::Positive => template.to_vec(),
    }
}

/// Angle in the x/y plane of the axis running from the most negative to the
/// most positive point, folded to `[0, π)` when polarity is free.
fn topographic_key(
    template: &[f64],
    coordinates: &[[f64; 3]],
    data_type: DataType,
    polarity: Polarity,
) -> f64 {
    let values = point_values(template, data_type);
    let extreme = |cmp: fn(&f64, &f64) -> Ordering| {
        values
            .iter()
            .enumerate()
            .max_by(|a, b| cmp(a.1, b.1))
            .map_or(0, |(i, _)| i)
    };
    let positive = extreme(|a, b| a.total_cmp(b));
    let negative = extreme(|a, b| b.total_cmp(a));
    let (Some(p), Some(q)) = (coordinates.get(positive), coordinates.get(negative)) else {
        return 0.0;
    };
    let (dx, dy) = (p[0] - q[0], p[1] - q[1]);
    if dx.hypot(dy) < EPSILON {
        return 0.0;
    }
    let angle = dy.atan2(dx);
    match data_type.effective_polarity(polarity) {
        Polarity::Evaluate => angle.rem_euclid(PI),
        Polarity::Direct => angle.rem_euclid(2.0 * PI),
    }
}

/// Spatial spread of the template energy around its center of mass, and the
/// anterior-posterior (y) coordinate of that center.
fn anatomical_keys(template: &[f64], coordinates: &[[f64; 3]], data_type: DataType) -> (f64, f64) {
    let energy: Vec<f64> = match data_type {
        DataType::Vector => template.chunks(3).map(|p| p.iter().map(|v| v * v).sum()).collect(),
        DataType::Scalar | DataType::Positive => template.iter().map(|v| v * v).collect(),
    };
    let total: f64 = energy.iter().sum();
    if total < EPSILON {
        return (0.0, 0.0);
    }
    let mut center = [0.0; 3];
    for (e, x) in energy.iter().zip(coordinates) {
        for d in 0..3 {
            center[d] += e * x[d] / total;
        }
    }
    let spread = energy
        .iter()
        .zip(coordinates)
        .map(|(e, x)| {
            let d2: f64 = (0..3).map(|d| (x[d] - center[d]).powi(2)).sum();
            e * d2
        })
        .sum::<f64>()
        / total;
    (spread.sqrt(), center[1])
}

/// Greedy best-correlation matching against `reference`.
///
/// The most correlated (template, reference) pair is matched first, then the
/// next among the unmatched, and so on. Matched templates take the order of
/// their reference; unmatched ones follow in their current order.
fn reference_order(
    templates: &MapSet,
    reference: &MapSet,
    data_type: DataType,
    polarity: Polarity,
) -> Permutation {
    let n = templates.len();
    let m = reference.len();
    let mut pairs: Vec<(usize, usize, f64)> = Vec::with_capacity(n * m);
    for (i, t) in templates.iter().enumerate() {
        for (j, r) in reference.iter().enumerate() {
            let (corr, _) = polarized_correlation(t, r, data_type, polarity);
            pairs.push((i, j, corr));
        }
    }
    pairs.sort_by(|a, b| b.2.total_cmp(&a.2).then(a.0.cmp(&b.0)).then(a.1.cmp(&b.1)));

    let mut matched: Vec<Option<usize>> = vec![None; n];
    let mut taken = vec![false; m];
    for (i, j, _) in pairs {
        if matched[i].is_none() && !taken[j] {
            matched[i] = Some(j);
            taken[j] = true;
        }
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by_key(|&i| (matched[i].unwrap_or(usize::MAX), i));
    Permutation { order }
}
