//! Pooled pair distances shared by the pair-based criteria.
#![allow(clippy::cast_precision_loss)]

use rayon::prelude::*;
use microseg_core::labeling::Labeling;
use microseg_core::map::{dot, polarize, EPSILON};
use microseg_core::sample::SampleData;

/// Quantile of the pooled distances used by the robust Dunn index.
const ROBUST_QUANTILE: f64 = 0.1;

/// Pair distances between an evenly strided subset of labeled samples.
///
/// Built once per cluster count, then queried by every pair-based
/// criterion.
#[derive(Debug, Clone)]
pub struct PairwiseSums {
    clusters: Vec<usize>,
    num_clusters: usize,
    distances: Vec<f64>,
    within: Vec<f64>,
    between: Vec<f64>,
    sum_within: f64,
    sum_between: f64,
}

impl PairwiseSums {
    /// Samples at most `max_samples` labeled samples and computes their
    /// pair distances.
    ///
    /// Distances are Euclidean between normalized maps, with the sign made
    /// free when polarity is evaluated: `d² = scale · 2 (1 − r)`.
    pub fn new(data: &SampleData, labeling: &Labeling, num_clusters: usize, max_samples: usize) -> Self {
        let labeled: Vec<usize> = (0..labeling.len())
            .filter(|&i| labeling.get(i).is_some_and(|c| c < num_clusters))
            .collect();
        let stride = labeled.len().div_ceil(max_samples.max(1)).max(1);
        let picked: Vec<usize> = labeled.into_iter().step_by(stride).collect();
        let clusters: Vec<usize> = picked
            .iter()
            .map(|&i| labeling.get(i).unwrap_or_default())
            .collect();

        let m = picked.len();
        let scale = data.data_type().distance_scale();
        let polarity = data.polarity();
        let mut distances = vec![0.0; m * m];
        distances
            .par_chunks_mut(m.max(1))
            .enumerate()
            .for_each(|(a, row)| {
                for (b, d) in row.iter_mut().enumerate() {
                    if a != b {
                        let (r, _) = polarize(dot(data.map(picked[a]), data.map(picked[b])), polarity);
                        *d = (scale * 2.0 * (1.0 - r)).max(0.0).sqrt();
                    }
                }
            });

        let mut within = Vec::new();
        let mut between = Vec::new();
        for a in 0..m {
            for b in a + 1..m {
                let d = distances[a * m + b];
                if clusters[a] == clusters[b] {
                    within.push(d);
                } else {
                    between.push(d);
                }
            }
        }
        within.par_sort_unstable_by(f64::total_cmp);
        between.par_sort_unstable_by(f64::total_cmp);
        let sum_within = within.iter().sum();
        let sum_between = between.iter().sum();

        Self {
            clusters,
            num_clusters,
            distances,
            within,
            between,
            sum_within,
            sum_between,
        }
    }

    /// Number of sampled points.
    pub fn samples(&self) -> usize {
        self.clusters.len()
    }

    fn has_both(&self) -> bool {
        !self.within.is_empty() && !self.between.is_empty()
    }

    fn distance(&self, a: usize, b: usize) -> f64 {
        self.distances[a * self.samples() + b]
    }

    /// Hubert's C-Index, or `None` without any within pair.
    pub fn c_index(&self) -> Option<f64> {
        if !self.has_both() {
            return None;
        }
        let nw = self.within.len();
        let mut all: Vec<f64> = Vec::with_capacity(nw + self.between.len());
        all.extend_from_slice(&self.within);
        all.extend_from_slice(&self.between);
        all.par_sort_unstable_by(f64::total_cmp);
        let smallest: f64 = all[..nw].iter().sum();
        let largest: f64 = all[all.len() - nw..].iter().sum();
        let range = largest - smallest;
        (range > EPSILON).then(|| ((self.sum_within - smallest) / range).clamp(0.0, 1.0))
    }

    /// Mean within distance over mean between distance.
    pub fn mcclain(&self) -> Option<f64> {
        if !self.has_both() {
            return None;
        }
        let mean_within = self.sum_within / self.within.len() as f64;
        let mean_between = self.sum_between / self.between.len() as f64;
        (mean_between > EPSILON).then(|| mean_within / mean_between)
    }

    /// Correlation between the distance and the "different clusters" flag.
    pub fn point_biserial(&self) -> Option<f64> {
        if !self.has_both() {
            return None;
        }
        let nw = self.within.len() as f64;
        let nb = self.between.len() as f64;
        let nt = nw + nb;
        let mean = (self.sum_within + self.sum_between) / nt;
        let var = self
            .within
            .iter()
            .chain(&self.between)
            .map(|d| (d - mean) * (d - mean))
            .sum::<f64>()
            / nt;
        let sd = var.sqrt();
        if sd < EPSILON {
            return None;
        }
        let diff = self.sum_between / nb - self.sum_within / nw;
        Some(diff * (nw * nb).sqrt() / nt / sd)
    }

    /// Concordant and discordant (within, between) pair comparisons.
    ///
    /// A comparison is concordant when the within distance is the smaller
    /// one; equal distances count as neither.
    pub fn concordance(&self) -> (f64, f64) {
        let nb = self.between.len();
        self.within
            .par_iter()
            .map(|&w| {
                let below = self.between.partition_point(|&b| b < w);
                let above = nb - self.between.partition_point(|&b| b <= w);
                (above as f64, below as f64)
            })
            .reduce(|| (0.0, 0.0), |a, b| (a.0 + b.0, a.1 + b.1))
    }

    /// Baker-Hubert Gamma.
    pub fn gamma(&self) -> Option<f64> {
        if !self.has_both() {
            return None;
        }
        let (plus, minus) = self.concordance();
        let total = plus + minus;
        (total > 0.0).then(|| (plus - minus) / total)
    }

    /// G(+): share of discordant comparisons among all pairs of pairs.
    pub fn g_plus(&self) -> Option<f64> {
        if !self.has_both() {
            return None;
        }
        let (_, minus) = self.concordance();
        let nt = (self.within.len() + self.between.len()) as f64;
        Some(2.0 * minus / (nt * (nt - 1.0)))
    }

    /// Kendall's Tau between distances and the cluster indicator.
    pub fn tau(&self) -> Option<f64> {
        if !self.has_both() {
            return None;
        }
        let (plus, minus) = self.concordance();
        let nw = self.within.len() as f64;
        let nb = self.between.len() as f64;
        let nt = nw + nb;
        let comparisons = nt * (nt - 1.0) / 2.0;
        let ties = nw * (nw - 1.0) / 2.0 + nb * (nb - 1.0) / 2.0;
        let denom = ((comparisons - ties) * comparisons).sqrt();
        (denom > EPSILON).then(|| (plus - minus) / denom)
    }

    /// Smallest between distance over largest within distance.
    pub fn dunn(&self) -> Option<f64> {
        let (&min_between, &max_within) = (self.between.first()?, self.within.last()?);
        (max_within > EPSILON).then(|| min_between / max_within)
    }

    /// Dunn index on low/high quantiles instead of the extremes.
    pub fn dunn_robust(&self) -> Option<f64> {
        if !self.has_both() {
            return None;
        }
        let low = quantile(&self.between, ROBUST_QUANTILE);
        let high = quantile(&self.within, 1.0 - ROBUST_QUANTILE);
        (high > EPSILON).then(|| low / high)
    }

    /// Mean silhouette width of the sampled points.
    ///
    /// Points alone in their cluster score 0.
    pub fn silhouettes(&self) -> Option<f64> {
        let m = self.samples();
        let k = self.num_clusters;
        if m < 2 || !self.has_both() {
            return None;
        }
        let mut sizes = vec![0usize; k];
        for &c in &self.clusters {
            sizes[c] += 1;
        }
        let total: f64 = (0..m)
            .into_par_iter()
            .map(|a| {
                let own = self.clusters[a];
                if sizes[own] < 2 {
                    return 0.0;
                }
                let mut sums = vec![0.0; k];
                for b in 0..m {
                    if a != b {
                        sums[self.clusters[b]] += self.distance(a, b);
                    }
                }
                let within = sums[own] / (sizes[own] - 1) as f64;
                let nearest = (0..k)
                    .filter(|&c| c != own && sizes[c] > 0)
                    .map(|c| sums[c] / sizes[c] as f64)
                    .fold(f64::INFINITY, f64::min);
                let spread = within.max(nearest);
                if !nearest.is_finite() || spread < EPSILON {
                    0.0
                } else {
                    (nearest - within) / spread
                }
            })
            .sum();
        Some(total / m as f64)
    }
}

/// Linear-interpolated quantile of sorted values.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let pos = q.clamp(0.0, 1.0) * (n - 1) as f64;
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let lo = pos.floor() as usize;
            let hi = (lo + 1).min(n - 1);
            let frac = pos - lo as f64;
            sorted[lo] * (1.0 - frac) + sorted[hi] * frac
        }
    }
}
