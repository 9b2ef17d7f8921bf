//! Template (centroid) computation.
#![allow(clippy::cast_precision_loss, clippy::must_use_candidate)]

use rayon::prelude::*;
use microseg_core::labeling::Labeling;
use microseg_core::map::{dot, normalize_in_place, rank_in_place, MapSet, Polarity, Sign};
use microseg_core::sample::SampleData;
use microseg_core::CentroidType;

/// Medoid search looks at no more than this many members per cluster.
const MAX_MEDOID_MEMBERS: usize = 512;

/// Computes templates from labeled samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CentroidBuilder {
    kind: CentroidType,
    rank: bool,
}

impl CentroidBuilder {
    /// Creates a builder for the given centroid type.
    ///
    /// When `rank` is set, every mean or median is rank-transformed before it
    /// is normalized.
    pub fn new(kind: CentroidType, rank: bool) -> Self {
        Self { kind, rank }
    }

    /// Centroid type in use.
    pub fn kind(&self) -> CentroidType {
        self.kind
    }

    /// Normalized template of the given `(sample, sign)` members.
    ///
    /// An empty member list yields an all-zero template.
    pub fn compute(&self, data: &SampleData, members: &[(usize, Sign)]) -> Vec<f64> {
        let dim = data.dim();
        if members.is_empty() {
            return vec![0.0; dim];
        }
        let mut centroid = match self.kind {
            CentroidType::Mean => {
                let mut sum = vec![0.0; dim];
                for &(i, sign) in members {
                    let f = sign.factor();
                    sum.iter_mut()
                        .zip(data.map(i))
                        .for_each(|(s, v)| *s += f * v);
                }
                sum
            }
            CentroidType::Median => median(data, members),
            CentroidType::Medoid => return medoid(data, members),
        };
        self.finish(data, &mut centroid);
        centroid
    }

    /// Rank-transforms (if requested) and normalizes a raw centroid in place.
    pub fn finish(&self, data: &SampleData, centroid: &mut [f64]) {
        if self.rank {
            rank_in_place(centroid, data.data_type());
        }
        normalize_in_place(centroid, data.data_type());
    }

    /// Recomputes one template per cluster from the labeling.
    ///
    /// Clusters are processed in parallel; each writes its own slot.
    pub fn templates(&self, data: &SampleData, labeling: &Labeling, num_clusters: usize) -> MapSet {
        let members = signed_members(labeling, num_clusters);
        let centroids: Vec<Vec<f64>> = members
            .par_iter()
            .map(|m| self.compute(data, m))
            .collect();
        let mut templates = MapSet::with_capacity(data.dim(), num_clusters);
        for c in &centroids {
            templates.push(c);
        }
        templates
    }
}

/// `(sample, sign)` members of each of the first `num_clusters` clusters.
pub fn signed_members(labeling: &Labeling, num_clusters: usize) -> Vec<Vec<(usize, Sign)>> {
    let mut members = vec![Vec::new(); num_clusters];
    for i in 0..labeling.len() {
        if let Some(c) = labeling.get(i) {
            if c < num_clusters {
                members[c].push((i, labeling.sign(i)));
            }
        }
    }
    members
}

/// Re-derives every defined sample's sign from its current template.
pub fn refresh_signs(data: &SampleData, templates: &MapSet, labeling: &mut Labeling) {
    if data.polarity() == Polarity::Direct {
        labeling.sign.fill(Sign::Positive);
        return;
    }
    for i in 0..labeling.len() {
        if let Some(c) = labeling.get(i) {
            let r = dot(data.map(i), templates.map(c));
            labeling.sign[i] = Sign::of(r);
        }
    }
}

fn median(data: &SampleData, members: &[(usize, Sign)]) -> Vec<f64> {
    let dim = data.dim();
    let mut column = Vec::with_capacity(members.len());
    (0..dim)
        .map(|d| {
            column.clear();
            column.extend(members.iter().map(|&(i, s)| s.factor() * data.map(i)[d]));
            column.sort_by(f64::total_cmp);
            let mid = column.len() / 2;
            if column.len() % 2 == 0 {
                0.5 * (column[mid - 1] + column[mid])
            } else {
                column[mid]
            }
        })
        .collect()
}

fn medoid(data: &SampleData, members: &[(usize, Sign)]) -> Vec<f64> {
    let stride = members.len().div_ceil(MAX_MEDOID_MEMBERS).max(1);
    let pool: Vec<(usize, Sign)> = members.iter().copied().step_by(stride).collect();

    let best = pool
        .par_iter()
        .map(|&(i, si)| {
            let score: f64 = pool
                .iter()
                .map(|&(j, sj)| si.factor() * sj.factor() * dot(data.map(i), data.map(j)))
                .sum();
            (i, si, score)
        })
        .reduce_with(|a, b| {
            if b.2 > a.2 || (b.2 == a.2 && b.0 < a.0) {
                b
            } else {
                a
            }
        });

    match best {
        Some((i, sign, _)) => data.map(i).iter().map(|v| sign.factor() * v).collect(),
        None => vec![0.0; data.dim()],
    }
}
