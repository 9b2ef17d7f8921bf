//! Temporal smoothing of the labels.
//!
//! Each sample is relabeled with the cluster minimizing a cost that trades
//! the residual (unexplained) power of the sample against the number of
//! neighbours, within a half-window, already carrying that label. The pass
//! is repeated until the residual variance settles. Templates are left
//! untouched.
#![allow(clippy::cast_precision_loss)]

use microseg_core::config::SmoothingConfig;
use microseg_core::labeling::{pack_labels, Labeling};
use microseg_core::map::{dot, MapSet, Polarity, Sign, EPSILON};
use microseg_core::sample::SampleData;

/// Relative change of the residual variance at which iteration stops.
const CONVERGENCE: f64 = 1e-6;

/// Cost of giving a sample a given label during smoothing.
pub trait SmoothingCost: Sync {
    /// Lower is better.
    ///
    /// * `residual` - power of the sample left unexplained by the template
    /// * `variance` - current mean residual variance per degree of freedom
    /// * `dof` - degrees of freedom of one map
    /// * `neighbours` - samples within the half-window carrying the label
    fn cost(&self, residual: f64, variance: f64, dof: f64, neighbours: usize) -> f64;
}

/// Besag-style penalty: normalized residual minus a bonus per neighbour.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BesagCost {
    /// Weight of one agreeing neighbour.
    pub factor: f64,
}

impl SmoothingCost for BesagCost {
    fn cost(&self, residual: f64, variance: f64, dof: f64, neighbours: usize) -> f64 {
        residual / (2.0 * variance * dof) - self.factor * neighbours as f64
    }
}

/// Smooths `labeling` with the Besag cost of `config`.
///
/// `floor` is the correlation a sample must keep with its new template; it
/// is the low-correlation rejection threshold when that stage is enabled.
pub fn smooth_labeling(
    data: &SampleData,
    config: &SmoothingConfig,
    floor: Option<f64>,
    templates: &mut MapSet,
    labeling: &mut Labeling,
) -> usize {
    let cost = BesagCost {
        factor: config.besag_factor,
    };
    smooth_labeling_with(data, config, &cost, floor, templates, labeling)
}

/// Smooths `labeling` with any cost function.
pub fn smooth_labeling_with<C: SmoothingCost + ?Sized>(
    data: &SampleData,
    config: &SmoothingConfig,
    cost: &C,
    floor: Option<f64>,
    templates: &mut MapSet,
    labeling: &mut Labeling,
) -> usize {
    let k = templates.len();
    if k == 0 || labeling.num_defined() == 0 {
        return pack_labels(templates, labeling);
    }
    let dof = data.data_type().degrees_of_freedom(data.dim()) as f64;

    // Signed correlation of every sample with every template.
    let corr: Vec<Vec<f64>> = (0..data.len())
        .map(|i| templates.iter().map(|t| dot(data.map(i), t)).collect())
        .collect();
    let fit = |i: usize, c: usize| -> (f64, Sign) {
        let r = corr[i][c];
        match data.polarity() {
            Polarity::Evaluate => (r.abs(), Sign::of(r)),
            Polarity::Direct => (r, Sign::Positive),
        }
    };
    // An anti-correlated template explains nothing under direct polarity.
    let residual = |i: usize, c: usize| {
        let r = fit(i, c).0.max(0.0);
        data.weight(i) * (1.0 - r * r).max(0.0)
    };

    let mut variance = residual_variance(labeling, dof, &residual);
    let epochs: Vec<_> = labeling.epochs().collect();
    let half = config.half_window;

    for iteration in 0..config.max_iterations.max(1) {
        let previous = labeling.clone();
        let variance_term = variance.max(EPSILON);
        let mut changed = 0usize;

        for range in &epochs {
            let mut counts = vec![0usize; k];
            // Window [lo, hi) over `previous`, excluding the centre sample.
            let mut lo = range.start;
            let mut hi = range.start;
            for t in range.clone() {
                let want_hi = (t + half + 1).min(range.end);
                while hi < want_hi {
                    if let Some(c) = previous.get(hi) {
                        counts[c] += 1;
                    }
                    hi += 1;
                }
                let want_lo = t.saturating_sub(half).max(range.start);
                while lo < want_lo {
                    if let Some(c) = previous.get(lo) {
                        counts[c] -= 1;
                    }
                    lo += 1;
                }

                let Some(current) = previous.get(t) else {
                    continue;
                };

                let mut best = (current, f64::INFINITY);
                for c in 0..k {
                    if let Some(min_r) = floor {
                        if c != current && fit(t, c).0 < min_r {
                            continue;
                        }
                    }
                    let neighbours = counts[c] - usize::from(c == current);
                    let value = cost.cost(residual(t, c), variance_term, dof, neighbours);
                    if value < best.1 {
                        best = (c, value);
                    }
                }
                let (label, _) = best;
                if label != current {
                    changed += 1;
                }
                labeling.set(t, label, fit(t, label).1);
            }
        }

        let updated = residual_variance(labeling, dof, &residual);
        let settled = (variance - updated).abs() <= CONVERGENCE * updated.max(EPSILON);
        log::trace!("smoothing pass {iteration}: {changed} changes, variance {updated:.6}");
        variance = updated;
        if changed == 0 || settled {
            break;
        }
    }

    pack_labels(templates, labeling)
}

fn residual_variance(labeling: &Labeling, dof: f64, residual: &impl Fn(usize, usize) -> f64) -> f64 {
    let mut sum = 0.0;
    let mut n = 0usize;
    for i in 0..labeling.len() {
        if let Some(c) = labeling.get(i) {
            sum += residual(i, c);
            n += 1;
        }
    }
    if n == 0 {
        0.0
    } else {
        sum / (n as f64 * dof)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::postprocess::tests::{fixture, labels};

    struct NoPenalty;

    impl SmoothingCost for NoPenalty {
        fn cost(&self, residual: f64, _variance: f64, _dof: f64, _neighbours: usize) -> f64 {
            residual
        }
    }

    #[test]
    fn test_smoothing_absorbs_isolated_sample() {
        // Sample 6 carries a different map but sits inside a run of cluster 1.
        let (data, mut templates, mut labeling) = fixture(&[0, 0, 1, 1, 1, 1, 2, 1]);
        let config = SmoothingConfig {
            half_window: 3,
            besag_factor: 1000.0,
            max_iterations: 10,
        };
        let before = labeling.non_empty_clusters();
        let n = smooth_labeling(&data, &config, None, &mut templates, &mut labeling);
        assert!(n <= before);
        assert!(labeling.get(7).is_some());
        assert_eq!(labeling.get(6), labeling.get(7));
    }

    #[test]
    fn test_floor_blocks_poor_relabeling() {
        let (data, mut templates, mut labeling) = fixture(&[0, 0, 1, 1, 1, 1, 2, 1]);
        let config = SmoothingConfig {
            half_window: 3,
            besag_factor: 1000.0,
            max_iterations: 10,
        };
        smooth_labeling(&data, &config, Some(0.9), &mut templates, &mut labeling);
        assert_ne!(labeling.get(6), labeling.get(7));
    }

    #[test]
    fn test_pluggable_cost_keeps_best_fit() {
        let (data, mut templates, mut labeling) = fixture(&[0, 0, 1, 1, 0, 0, 2, 1]);
        let config = SmoothingConfig::default();
        let original = labels(&labeling);
        smooth_labeling_with(&data, &config, &NoPenalty, None, &mut templates, &mut labeling);
        assert_eq!(labels(&labeling), original);
    }

    #[test]
    fn test_undefined_samples_stay_undefined() {
        let (data, mut templates, mut labeling) = fixture(&[0, 0, -1, 1, 1, 1, -1, 1]);
        smooth_labeling(&data, &SmoothingConfig::default(), None, &mut templates, &mut labeling);
        assert!(labeling.is_undefined(2));
        assert!(labeling.is_undefined(6));
    }

    #[test]
    fn test_direct_polarity_keeps_inverted_sample_apart() {
        use crate::centroid::CentroidBuilder;
        use microseg_core::map::DataType;

        let a = [1.0, -1.0, 0.5, -0.5];
        let rows: Vec<Vec<f64>> = (0..7)
            .map(|i| {
                let f = if i == 3 { 1.0 } else { -1.0 };
                a.iter().map(|v| f * v).collect()
            })
            .collect();
        let raw = MapSet::from_rows(&rows).unwrap();
        let data = SampleData::new(&raw, DataType::Scalar, Polarity::Direct, &[], false).unwrap();
        let mut labeling = Labeling::new(7);
        for i in 0..7 {
            labeling.set(i, usize::from(i != 3), Sign::Positive);
        }
        let mut templates = CentroidBuilder::default().templates(&data, &labeling, 2);
        let config = SmoothingConfig {
            half_window: 3,
            besag_factor: 0.01,
            max_iterations: 10,
        };

        let n = smooth_labeling(&data, &config, None, &mut templates, &mut labeling);
        assert_eq!(n, 2);
        assert_eq!(labels(&labeling), vec![1, 1, 1, 0, 1, 1, 1]);
    }
}
