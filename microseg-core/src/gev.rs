//! Global Explained Variance.
#![allow(clippy::must_use_candidate)]

use crate::labeling::Labeling;
use crate::map::{dot, MapSet, EPSILON};
use crate::sample::SampleData;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Explained variance of a segmentation, with its per-cluster shares.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ExplainedVariance {
    /// Fraction of the labeled signal power explained by the templates.
    pub total: f64,
    /// Contribution of each cluster; the shares sum to `total`.
    pub per_cluster: Vec<f64>,
}

/// Computes the GEV of `labeling` against normalized `templates`.
///
/// Each labeled sample contributes its squared norm times its squared
/// correlation with its template; the sum is divided by the total squared
/// norm of the labeled samples. Undefined samples count nowhere.
pub fn explained_variance(
    data: &SampleData,
    templates: &MapSet,
    labeling: &Labeling,
) -> ExplainedVariance {
    let mut per_cluster = vec![0.0; templates.len()];
    let mut denominator = 0.0;

    for i in 0..data.len() {
        let Some(c) = labeling.get(i) else {
            continue;
        };
        if c >= templates.len() {
            continue;
        }
        let w = data.weight(i);
        let r = dot(data.map(i), templates.map(c));
        per_cluster[c] += w * r * r;
        denominator += w;
    }

    if denominator < EPSILON {
        return ExplainedVariance {
            total: 0.0,
            per_cluster: vec![0.0; templates.len()],
        };
    }

    per_cluster.iter_mut().for_each(|v| *v /= denominator);
    let total = per_cluster.iter().sum::<f64>().clamp(0.0, 1.0);
    ExplainedVariance { total, per_cluster }
}

/// Total GEV only.
pub fn global_explained_variance(
    data: &SampleData,
    templates: &MapSet,
    labeling: &Labeling,
) -> f64 {
    explained_variance(data, templates, labeling).total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::{DataType, Polarity, Sign};
    use approx::assert_relative_eq;

    fn fixture() -> (SampleData, MapSet, Labeling) {
        let raw = MapSet::from_rows(&[
            vec![1.0, -1.0, 0.0],
            vec![2.0, -2.0, 0.0],
            vec![0.0, 1.0, -1.0],
            vec![1.0, 0.0, -1.0],
        ])
        .unwrap();
        let data = SampleData::new(&raw, DataType::Scalar, Polarity::Evaluate, &[], false).unwrap();
        let mut templates = MapSet::from_rows(&[vec![1.0, -1.0, 0.0], vec![0.0, 1.0, -1.0]])
            .unwrap();
        templates.normalize(DataType::Scalar);
        let mut labeling = Labeling::new(4);
        labeling.set(0, 0, Sign::Positive);
        labeling.set(1, 0, Sign::Positive);
        labeling.set(2, 1, Sign::Positive);
        labeling.set(3, 1, Sign::Positive);
        (data, templates, labeling)
    }

    #[test]
    fn test_gev_bounds_and_shares() {
        let (data, templates, labeling) = fixture();
        let gev = explained_variance(&data, &templates, &labeling);
        assert!(gev.total > 0.0 && gev.total <= 1.0);
        assert_relative_eq!(gev.per_cluster.iter().sum::<f64>(), gev.total, epsilon = 1e-12);
    }

    #[test]
    fn test_perfect_fit_and_undefined_samples() {
        let (data, templates, mut labeling) = fixture();
        labeling.unset(3);
        let gev = global_explained_variance(&data, &templates, &labeling);
        assert_relative_eq!(gev, 1.0, epsilon = 1e-12);

        labeling.clear();
        assert_eq!(global_explained_variance(&data, &templates, &labeling), 0.0);
    }
}
