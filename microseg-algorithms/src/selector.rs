//! Meta-criterion: picks the optimal cluster count from criteria rows.
#![allow(clippy::cast_precision_loss)]

use microseg_core::config::CriteriaConfig;
use microseg_core::criterion::CriterionId;

use crate::criteria::CriteriaValues;

/// Outcome of the meta-criterion over the requested counts.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    /// Index of the selected row.
    pub row: usize,
    /// Combined score of every row, `0.0` for excluded rows.
    pub scores: Vec<f64>,
}

/// Combines the rank and arg-max subsets into one score per row and picks
/// the best row.
///
/// Rows must be in ascending count order; ties go to the smallest count.
/// Rows where no selected criterion is available are excluded. When every
/// row is excluded the first one is selected.
#[must_use]
pub fn select_optimal(rows: &[&CriteriaValues], config: &CriteriaConfig) -> Selection {
    let n = rows.len();
    let mut rank_sum = vec![0.0; n];
    let mut rank_count = vec![0usize; n];
    for &id in &config.rank_subset {
        let ranks = normalized_ranks(rows, id);
        for (j, rank) in ranks.into_iter().enumerate() {
            if let Some(r) = rank {
                rank_sum[j] += r;
                rank_count[j] += 1;
            }
        }
    }

    let mut votes = vec![0usize; n];
    for &id in &config.argmax_subset {
        if let Some(j) = arg_max(rows, id) {
            votes[j] += 1;
        }
    }

    let voters = config.argmax_subset.len().max(1) as f64;
    let scores: Vec<Option<f64>> = (0..n)
        .map(|j| {
            let votes_available = config
                .argmax_subset
                .iter()
                .any(|&id| rows[j].is_available(id));
            if rank_count[j] == 0 && !votes_available {
                return None;
            }
            let mean_rank = if rank_count[j] == 0 {
                0.0
            } else {
                rank_sum[j] / rank_count[j] as f64
            };
            Some((mean_rank + votes[j] as f64 / voters) / 2.0)
        })
        .collect();

    let mut best: Option<(usize, f64)> = None;
    for (j, score) in scores.iter().enumerate() {
        if let Some(s) = *score {
            if best.map_or(true, |(_, b)| s > b) {
                best = Some((j, s));
            }
        }
    }

    Selection {
        row: best.map_or(0, |(j, _)| j),
        scores: scores.into_iter().map(|s| s.unwrap_or(0.0)).collect(),
    }
}

/// Rank of every available value in `[0, 1]`, best = 1, ties averaged.
///
/// A criterion available on a single row ranks it 1.
fn normalized_ranks(rows: &[&CriteriaValues], id: CriterionId) -> Vec<Option<f64>> {
    let values: Vec<(usize, f64)> = rows
        .iter()
        .enumerate()
        .filter_map(|(j, r)| r.oriented(id).map(|v| (j, v)))
        .collect();
    let mut ranks = vec![None; rows.len()];
    let m = values.len();
    if m == 0 {
        return ranks;
    }
    if m == 1 {
        ranks[values[0].0] = Some(1.0);
        return ranks;
    }

    let mut order: Vec<usize> = (0..m).collect();
    order.sort_by(|&a, &b| values[a].1.total_cmp(&values[b].1));
    let mut i = 0;
    while i < m {
        let mut j = i + 1;
        while j < m && values[order[j]].1 == values[order[i]].1 {
            j += 1;
        }
        let rank = (i + j - 1) as f64 / 2.0 / (m - 1) as f64;
        for &o in &order[i..j] {
            ranks[values[o].0] = Some(rank);
        }
        i = j;
    }
    ranks
}

/// Row where `id` is best; ties go to the earliest row.
fn arg_max(rows: &[&CriteriaValues], id: CriterionId) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (j, row) in rows.iter().enumerate() {
        if let Some(v) = row.oriented(id) {
            if best.map_or(true, |(_, b)| v > b) {
                best = Some((j, v));
            }
        }
    }
    best.map(|(j, _)| j)
}
