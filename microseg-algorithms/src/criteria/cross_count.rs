//! Criteria computed across neighbouring cluster counts.
#![allow(clippy::cast_precision_loss)]

use microseg_core::config::CriteriaConfig;
use microseg_core::criterion::CriterionId;
use microseg_core::map::EPSILON;

use super::{CriteriaValues, CRITERION_MARGIN, KL_FILTER_SIZE};

/// Base criteria of one swept count, plus what the cross-count criteria need.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CountCriteria {
    /// Non-empty clusters of the partition.
    pub clusters: usize,
    /// Pooled within-cluster squared distance, `None` with no labeled sample.
    pub within: Option<f64>,
    /// Criteria vector.
    pub values: CriteriaValues,
}

/// Fills derivative and Krzanowski-Lai criteria of every row.
///
/// `rows[j]` must hold the partition of cluster count `counts[j]`, with
/// counts consecutive and ascending. `dof` is the degrees of freedom of one
/// map, the dimension used by Krzanowski-Lai.
pub fn complete_sweep(rows: &mut [CountCriteria], counts: &[usize], dof: usize, config: &CriteriaConfig) {
    debug_assert_eq!(rows.len(), counts.len());

    for id in CriterionId::ALL {
        let Some(base) = id.derived_from() else {
            continue;
        };
        if !config.is_needed(id) {
            continue;
        }
        let series: Vec<Option<f64>> = rows.iter().map(|r| r.values.oriented(base)).collect();
        for (j, row) in rows.iter_mut().enumerate() {
            let value = if !id.is_applicable(row.clusters) {
                None
            } else if id == CriterionId::GammaDeriv {
                first_derivative(&series, j)
            } else {
                robust_second_derivative(&series, j)
            };
            row.values.set(id, value);
        }
    }

    let within: Vec<Option<f64>> = rows.iter().map(|r| r.within).collect();
    if config.is_needed(CriterionId::KrzanowskiLai) {
        let diffs = kl_differences(&within, counts, dof);
        for (j, row) in rows.iter_mut().enumerate() {
            let value = (CriterionId::KrzanowskiLai.is_applicable(row.clusters)
                && counts[j] >= 2)
                .then(|| krzanowski_lai(&diffs, j))
                .flatten();
            row.values.set(CriterionId::KrzanowskiLai, value);
        }
    }
    if config.is_needed(CriterionId::KrzanowskiLaiC) {
        let smoothed = moving_average(&within, KL_FILTER_SIZE);
        let diffs = kl_differences(&smoothed, counts, dof);
        for (j, row) in rows.iter_mut().enumerate() {
            let value = (CriterionId::KrzanowskiLaiC.is_applicable(row.clusters)
                && counts[j] > 2)
                .then(|| krzanowski_lai_c(&diffs, j))
                .flatten();
            row.values.set(CriterionId::KrzanowskiLaiC, value);
        }
    }
}

/// `f(k) - f(k-1)`.
fn first_derivative(series: &[Option<f64>], j: usize) -> Option<f64> {
    Some(series[j]? - series[j.checked_sub(1)?]?)
}

/// Median over `h = 1..=CRITERION_MARGIN` of the positive part of
/// `f(k) - (f(k-h) + f(k+h)) / 2`, over the steps whose neighbours exist.
fn robust_second_derivative(series: &[Option<f64>], j: usize) -> Option<f64> {
    let center = series[j]?;
    let mut steps: Vec<f64> = (1..=CRITERION_MARGIN)
        .filter_map(|h| {
            let before = series[j.checked_sub(h)?]?;
            let after = (*series.get(j + h)?)?;
            Some((center - (before + after) / 2.0).max(0.0))
        })
        .collect();
    median(&mut steps)
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        0.5 * (values[mid - 1] + values[mid])
    } else {
        values[mid]
    })
}

/// `DIFF(k) = (k-1)^(2/p) W(k-1) - k^(2/p) W(k)` for every row.
fn kl_differences(within: &[Option<f64>], counts: &[usize], dof: usize) -> Vec<Option<f64>> {
    let exponent = 2.0 / dof.max(1) as f64;
    (0..within.len())
        .map(|j| {
            let previous = within[j.checked_sub(1)?]?;
            let current = within[j]?;
            let k = counts[j] as f64;
            Some((k - 1.0).powf(exponent) * previous - k.powf(exponent) * current)
        })
        .collect()
}

/// `|DIFF(k) / DIFF(k+1)|`.
fn krzanowski_lai(diffs: &[Option<f64>], j: usize) -> Option<f64> {
    let here = diffs[j]?;
    let next = (*diffs.get(j + 1)?)?;
    (next.abs() > EPSILON).then(|| (here / next).abs())
}

/// `DIFF(k) / DIFF(k+1)` on smoothed W, defined only when W keeps
/// decreasing on both sides.
fn krzanowski_lai_c(diffs: &[Option<f64>], j: usize) -> Option<f64> {
    let here = diffs[j]?;
    let next = (*diffs.get(j + 1)?)?;
    (here > 0.0 && next > EPSILON).then(|| here / next)
}

/// Centered moving average over the available values within `half` rows.
fn moving_average(series: &[Option<f64>], half: usize) -> Vec<Option<f64>> {
    (0..series.len())
        .map(|j| {
            series[j]?;
            let lo = j.saturating_sub(half);
            let hi = (j + half + 1).min(series.len());
            let window: Vec<f64> = series[lo..hi].iter().filter_map(|v| *v).collect();
            Some(window.iter().sum::<f64>() / window.len() as f64)
        })
        .collect()
}
