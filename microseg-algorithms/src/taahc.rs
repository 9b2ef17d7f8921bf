//! T-AAHC: Topographic Atomize and Agglomerate Hierarchical Clustering.
//!
//! Deterministic bottom-up clustering. Every sample starts as its own
//! cluster (or, for long inputs, the samples are coarsened once onto evenly
//! spaced seeds). The pair of clusters whose merge loses the least explained
//! variance is then merged, repeatedly, until the requested count is reached.
//!
//! The merge state lives in a [`TaahcState`] owned by the caller, so a
//! descending sweep over cluster counts only pays for the additional merges
//! between two consecutive counts.
#![allow(clippy::cast_precision_loss, clippy::must_use_candidate)]

use rayon::prelude::*;
use microseg_core::config::{MergeTieBreak, TaahcConfig};
use microseg_core::gev::global_explained_variance;
use microseg_core::labeling::Labeling;
use microseg_core::map::{dot, MapSet, Polarity, Sign};
use microseg_core::sample::SampleData;
use microseg_core::CentroidType;

use crate::centroid::CentroidBuilder;
use crate::partition::Partition;

/// Relative difference under which two merge costs are considered equal.
const TIE_TOLERANCE: f64 = 1e-12;

/// Cap on centroid recomputations while member signs settle.
const SIGN_PASSES: usize = 4;

/// Incremental state for algorithms reused across a sweep.
pub trait ClusteringState {
    /// Forget everything; the next call starts from scratch.
    fn reset(&mut self);
}

#[derive(Debug, Clone)]
struct Cluster {
    /// `(sample, sign relative to the centroid)`.
    members: Vec<(usize, Sign)>,
    /// Running sum of sign-corrected member maps.
    sum: Vec<f64>,
    /// Normalized template.
    centroid: Vec<f64>,
    /// Explained power: `Σ w_i (x_i · centroid)²`.
    fit: f64,
}

/// Merge state carried across a descending sweep.
#[derive(Debug, Clone, Default)]
pub struct TaahcState {
    /// Slots in creation order; merged-away slots become `None`.
    clusters: Vec<Option<Cluster>>,
    /// Centroid correlation between slots, polarity applied.
    similarity: Vec<Vec<f64>>,
    active: usize,
    initial: usize,
}

impl ClusteringState for TaahcState {
    fn reset(&mut self) {
        self.clusters.clear();
        self.similarity.clear();
        self.active = 0;
        self.initial = 0;
    }
}

impl TaahcState {
    /// Number of clusters currently held.
    pub fn active_clusters(&self) -> usize {
        self.active
    }

    /// Returns true before the first clustering call or after a reset.
    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }
}

/// Candidate merge of two slots.
#[derive(Debug, Clone, Copy)]
struct Merge {
    a: usize,
    b: usize,
    sign: Sign,
    loss: f64,
    size: usize,
}

/// T-AAHC clustering.
#[derive(Debug, Clone)]
pub struct TaahcClustering {
    config: TaahcConfig,
    builder: CentroidBuilder,
}

impl TaahcClustering {
    /// Create with custom configuration.
    pub fn new(config: TaahcConfig, builder: CentroidBuilder) -> Self {
        Self { config, builder }
    }

    /// Creates an empty state.
    pub fn create_state(&self) -> TaahcState {
        TaahcState::default()
    }

    /// Clusters `data` into `k` clusters, continuing from `state`.
    ///
    /// If the state already holds fewer than `k` clusters it is rebuilt from
    /// scratch; the achieved count is lower than `k` only when the data hold
    /// fewer distinct starting clusters.
    pub fn segment(&self, data: &SampleData, k: usize, state: &mut TaahcState) -> Partition {
        // A state already merged below `k` cannot be split again.
        if state.is_empty() || (state.active < k && state.active < state.initial) {
            self.initialize(data, state);
        }
        let target = k.max(1);
        while state.active > target {
            let Some(merge) = self.best_merge(data, state) else {
                break;
            };
            self.apply_merge(data, state, merge);
        }
        self.partition(data, k, state)
    }

    fn initialize(&self, data: &SampleData, state: &mut TaahcState) {
        state.reset();
        let n = data.len();
        let cap = self.config.max_initial_clusters.max(1);

        let groups: Vec<Vec<(usize, Sign)>> = if n <= cap {
            (0..n).map(|i| vec![(i, Sign::Positive)]).collect()
        } else {
            coarsen(data, cap)
        };

        state.clusters = groups
            .into_par_iter()
            .filter(|g| !g.is_empty())
            .map(|members| self.build_cluster(data, members))
            .map(Some)
            .collect();
        state.active = state.clusters.len();
        state.initial = state.active;

        let slots = state.clusters.len();
        let similarity = {
            let view: &TaahcState = state;
            (0..slots)
                .into_par_iter()
                .map(|a| {
                    (0..slots)
                        .map(|b| self.similarity(data, view, a, b).0)
                        .collect()
                })
                .collect()
        };
        state.similarity = similarity;
    }

    fn build_cluster(&self, data: &SampleData, members: Vec<(usize, Sign)>) -> Cluster {
        let sum = signed_sum(data, &members);
        self.settle(data, members, sum)
    }

    /// Computes the centroid and aligns every member's sign with it.
    ///
    /// A sign flip changes the running sum, so the centroid is recomputed
    /// until the signs hold or `SIGN_PASSES` is reached.
    fn settle(
        &self,
        data: &SampleData,
        mut members: Vec<(usize, Sign)>,
        mut sum: Vec<f64>,
    ) -> Cluster {
        let mut centroid = self.centroid_of(data, &members, &sum);
        for _ in 0..SIGN_PASSES {
            if !realign_signs(data, &mut members, &centroid) {
                break;
            }
            sum = signed_sum(data, &members);
            centroid = self.centroid_of(data, &members, &sum);
        }
        realign_signs(data, &mut members, &centroid);
        let fit = fit(data, &members, &centroid);
        Cluster {
            members,
            sum,
            centroid,
            fit,
        }
    }

    /// Mean centroids come straight from the running sum; the other types
    /// are recomputed from the members of the cluster.
    fn centroid_of(&self, data: &SampleData, members: &[(usize, Sign)], sum: &[f64]) -> Vec<f64> {
        match self.builder.kind() {
            CentroidType::Mean => {
                let mut c = sum.to_vec();
                self.builder.finish(data, &mut c);
                c
            }
            CentroidType::Median | CentroidType::Medoid => self.builder.compute(data, members),
        }
    }

    fn similarity(&self, data: &SampleData, state: &TaahcState, a: usize, b: usize) -> (f64, Sign) {
        if a == b {
            return (f64::NEG_INFINITY, Sign::Positive);
        }
        match (&state.clusters[a], &state.clusters[b]) {
            (Some(ca), Some(cb)) => {
                let r = dot(&ca.centroid, &cb.centroid);
                match data.polarity() {
                    Polarity::Evaluate => (r.abs(), Sign::of(r)),
                    Polarity::Direct => (r, Sign::Positive),
                }
            }
            _ => (f64::NEG_INFINITY, Sign::Positive),
        }
    }

    /// Cheapest merge among each cluster's most similar partners.
    fn best_merge(&self, data: &SampleData, state: &TaahcState) -> Option<Merge> {
        let m = self.config.merge_candidates.max(1);
        let slots = state.clusters.len();

        let mut pairs: Vec<(usize, usize)> = (0..slots)
            .into_par_iter()
            .filter(|&a| state.clusters[a].is_some())
            .flat_map_iter(|a| {
                let row = &state.similarity[a];
                let mut partners: Vec<usize> = (0..slots)
                    .filter(|&b| b != a && state.clusters[b].is_some())
                    .collect();
                let closer = |x: &usize, y: &usize| row[*y].total_cmp(&row[*x]).then(x.cmp(y));
                if partners.len() > m {
                    partners.select_nth_unstable_by(m - 1, closer);
                    partners.truncate(m);
                }
                partners.into_iter().map(move |b| (a.min(b), a.max(b)))
            })
            .collect();
        pairs.sort_unstable();
        pairs.dedup();

        let candidates: Vec<Merge> = pairs
            .par_iter()
            .map(|&(a, b)| self.evaluate_merge(data, state, a, b))
            .collect();

        let tie_break = self.config.tie_break;
        candidates.into_iter().reduce(|best, c| {
            let scale = best.loss.abs().max(c.loss.abs()).max(1.0);
            if (c.loss - best.loss).abs() <= TIE_TOLERANCE * scale {
                match tie_break {
                    MergeTieBreak::LowestIndex => best,
                    MergeTieBreak::SmallestCluster => {
                        if c.size < best.size {
                            c
                        } else {
                            best
                        }
                    }
                }
            } else if c.loss < best.loss {
                c
            } else {
                best
            }
        })
    }

    fn evaluate_merge(&self, data: &SampleData, state: &TaahcState, a: usize, b: usize) -> Merge {
        let (_, sign) = self.similarity(data, state, a, b);
        let (Some(ca), Some(cb)) = (&state.clusters[a], &state.clusters[b]) else {
            return Merge {
                a,
                b,
                sign,
                loss: f64::INFINITY,
                size: usize::MAX,
            };
        };
        let members = merged_members(ca, cb, sign);
        let sum = merged_sum(ca, cb, sign);
        let centroid = self.centroid_of(data, &members, &sum);
        let merged_fit = fit(data, &members, &centroid);
        Merge {
            a,
            b,
            sign,
            loss: ca.fit + cb.fit - merged_fit,
            size: members.len(),
        }
    }

    fn apply_merge(&self, data: &SampleData, state: &mut TaahcState, merge: Merge) {
        if state.clusters[merge.a].is_none() || state.clusters[merge.b].is_none() {
            return;
        }
        let (Some(ca), Some(cb)) = (
            state.clusters[merge.a].take(),
            state.clusters[merge.b].take(),
        ) else {
            return;
        };
        let members = merged_members(&ca, &cb, merge.sign);
        let sum = merged_sum(&ca, &cb, merge.sign);
        state.clusters[merge.a] = Some(self.settle(data, members, sum));
        state.active -= 1;

        let slots = state.clusters.len();
        let view: &TaahcState = state;
        let row: Vec<f64> = (0..slots)
            .map(|s| self.similarity(data, view, merge.a, s).0)
            .collect();
        for s in 0..slots {
            state.similarity[s][merge.a] = row[s];
            state.similarity[s][merge.b] = f64::NEG_INFINITY;
        }
        state.similarity[merge.a] = row;
        state.similarity[merge.b].fill(f64::NEG_INFINITY);
    }

    fn partition(&self, data: &SampleData, k: usize, state: &TaahcState) -> Partition {
        let mut labeling = Labeling::with_epochs(data.epoch_lengths());
        let mut templates = MapSet::with_capacity(data.dim(), state.active);
        for cluster in state.clusters.iter().flatten() {
            let index = templates.len();
            for &(i, sign) in &cluster.members {
                labeling.set(i, index, sign);
            }
            templates.push(&cluster.centroid);
        }
        let gev = global_explained_variance(data, &templates, &labeling);
        Partition {
            requested: k,
            templates,
            labeling,
            gev,
        }
    }
}

/// Assigns every sample to the best of `cap` evenly spaced seed samples.
fn coarsen(data: &SampleData, cap: usize) -> Vec<Vec<(usize, Sign)>> {
    let n = data.len();
    let seeds: Vec<usize> = (0..cap).map(|s| s * n / cap).collect();
    let seed_maps = data.maps().select(&seeds);
    let choice: Vec<(usize, Sign)> = (0..n)
        .into_par_iter()
        .map(|i| {
            data.best_template(i, &seed_maps)
                .map_or((0, Sign::Positive), |(k, _, s)| (k, s))
        })
        .collect();
    let mut groups = vec![Vec::new(); cap];
    for (i, (k, s)) in choice.into_iter().enumerate() {
        groups[k].push((i, s));
    }
    groups
}

fn signed_sum(data: &SampleData, members: &[(usize, Sign)]) -> Vec<f64> {
    let mut sum = vec![0.0; data.dim()];
    for &(i, s) in members {
        let f = s.factor();
        sum.iter_mut()
            .zip(data.map(i))
            .for_each(|(acc, v)| *acc += f * v);
    }
    sum
}

/// Re-derives member signs from `centroid`; returns whether any changed.
fn realign_signs(data: &SampleData, members: &mut [(usize, Sign)], centroid: &[f64]) -> bool {
    let mut changed = false;
    for (i, sign) in members.iter_mut() {
        let (_, aligned) = data.correlation(*i, centroid);
        if aligned != *sign {
            *sign = aligned;
            changed = true;
        }
    }
    changed
}

fn fit(data: &SampleData, members: &[(usize, Sign)], centroid: &[f64]) -> f64 {
    members
        .iter()
        .map(|&(i, _)| {
            let r = dot(data.map(i), centroid);
            data.weight(i) * r * r
        })
        .sum()
}

fn merged_members(a: &Cluster, b: &Cluster, sign: Sign) -> Vec<(usize, Sign)> {
    let mut members = Vec::with_capacity(a.members.len() + b.members.len());
    members.extend_from_slice(&a.members);
    members.extend(b.members.iter().map(|&(i, s)| (i, s.combine(sign))));
    members
}

fn merged_sum(a: &Cluster, b: &Cluster, sign: Sign) -> Vec<f64> {
    let f = sign.factor();
    a.sum.iter().zip(&b.sum).map(|(x, y)| x + f * y).collect()
}
