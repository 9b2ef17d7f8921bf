//! Cluster-validity criteria.
//!
//! Base criteria are computed from one partition. Derivatives and the
//! Krzanowski-Lai family need the partitions of neighbouring cluster counts
//! and are filled in afterwards by [`complete_sweep`].
#![allow(clippy::cast_precision_loss)]

mod cross_count;
mod pairwise;

pub use cross_count::{complete_sweep, CountCriteria};
pub use pairwise::PairwiseSums;

use microseg_core::config::CriteriaConfig;
use microseg_core::criterion::CriterionId;
use microseg_core::labeling::Labeling;
use microseg_core::map::{dot, normalize_in_place, polarize, MapSet, Polarity, Sign, EPSILON};
use microseg_core::sample::SampleData;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Half-width of the moving average applied to W before Krzanowski-Lai C.
pub const KL_FILTER_SIZE: usize = 1;

/// Neighbouring counts on each side used by the robust derivatives.
pub const CRITERION_MARGIN: usize = 2;

/// Criteria computed from pooled pair distances.
const PAIR_BASED: [CriterionId; 9] = [
    CriterionId::CIndex,
    CriterionId::Dunn,
    CriterionId::DunnRobust,
    CriterionId::Gamma,
    CriterionId::GPlus,
    CriterionId::Tau,
    CriterionId::McClain,
    CriterionId::PointBiserial,
    CriterionId::Silhouettes,
];

/// One value per catalog criterion, with availability flags.
///
/// Unavailable entries hold `0.0`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CriteriaValues {
    values: Vec<f64>,
    available: Vec<bool>,
}

impl Default for CriteriaValues {
    fn default() -> Self {
        Self {
            values: vec![0.0; CriterionId::COUNT],
            available: vec![false; CriterionId::COUNT],
        }
    }
}

impl CriteriaValues {
    /// Value of `id`, `0.0` when unavailable.
    #[must_use]
    pub fn get(&self, id: CriterionId) -> f64 {
        self.values[id.index()]
    }

    /// Value of `id` if it was computed.
    #[must_use]
    pub fn value(&self, id: CriterionId) -> Option<f64> {
        self.available[id.index()].then(|| self.values[id.index()])
    }

    /// Whether `id` was computed.
    #[must_use]
    pub fn is_available(&self, id: CriterionId) -> bool {
        self.available[id.index()]
    }

    /// Stores a value; `None` and non-finite values leave the entry unavailable.
    pub fn set(&mut self, id: CriterionId, value: Option<f64>) {
        match value.filter(|v| v.is_finite()) {
            Some(v) => {
                self.values[id.index()] = v;
                self.available[id.index()] = true;
            }
            None => {
                self.values[id.index()] = 0.0;
                self.available[id.index()] = false;
            }
        }
    }

    /// The full vector, in catalog order.
    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    /// Value oriented so that higher is better.
    #[must_use]
    pub fn oriented(&self, id: CriterionId) -> Option<f64> {
        use microseg_core::criterion::Direction;
        self.value(id).map(|v| match id.direction() {
            Direction::Maximize => v,
            Direction::Minimize => -v,
        })
    }
}

/// Per-partition statistics shared by the centroid-based criteria.
#[derive(Debug, Clone)]
struct CentroidSums {
    /// Labeled samples per cluster.
    sizes: Vec<usize>,
    /// Mean member-to-template distance per cluster.
    scatter: Vec<f64>,
    /// Pooled within-cluster squared distance (W).
    within: f64,
    /// Between-cluster squared distance to the global centroid (B).
    between: f64,
    /// Unexplained power summed over labeled samples.
    residual: f64,
    labeled: usize,
}

impl CentroidSums {
    fn new(data: &SampleData, templates: &MapSet, labeling: &Labeling) -> Self {
        let k = templates.len();
        let scale = data.data_type().distance_scale();
        let mut sizes = vec![0usize; k];
        let mut scatter = vec![0.0; k];
        let mut within = 0.0;
        let mut residual = 0.0;
        for i in 0..labeling.len() {
            let Some(c) = labeling.get(i).filter(|&c| c < k) else {
                continue;
            };
            let r = dot(data.map(i), templates.map(c));
            let (rp, _) = polarize(r, data.polarity());
            let d2 = (scale * 2.0 * (1.0 - rp)).max(0.0);
            sizes[c] += 1;
            scatter[c] += d2.sqrt();
            within += d2;
            residual += data.weight(i) * (1.0 - rp.max(0.0).powi(2)).max(0.0);
        }
        for (s, &n) in scatter.iter_mut().zip(&sizes) {
            if n > 0 {
                *s /= n as f64;
            }
        }

        let between = match global_centroid(data, templates, &sizes) {
            Some(g) => templates
                .iter()
                .zip(&sizes)
                .map(|(t, &n)| {
                    let (r, _) = polarize(dot(t, &g), data.polarity());
                    n as f64 * (scale * 2.0 * (1.0 - r)).max(0.0)
                })
                .sum(),
            None => 0.0,
        };

        Self {
            labeled: sizes.iter().sum(),
            sizes,
            scatter,
            within,
            between,
            residual,
        }
    }

    fn clusters(&self) -> usize {
        self.sizes.iter().filter(|&&n| n > 0).count()
    }
}

/// Size-weighted mean of the templates, each aligned to template 0 when
/// polarity is free.
fn global_centroid(data: &SampleData, templates: &MapSet, sizes: &[usize]) -> Option<Vec<f64>> {
    let first = templates.iter().next()?;
    let mut g = vec![0.0; templates.dim()];
    for (t, &n) in templates.iter().zip(sizes) {
        let sign = match data.polarity() {
            Polarity::Evaluate => Sign::of(dot(t, first)),
            Polarity::Direct => Sign::Positive,
        };
        let f = n as f64 * sign.factor();
        g.iter_mut().zip(t).for_each(|(gv, tv)| *gv += f * tv);
    }
    normalize_in_place(&mut g, data.data_type());
    Some(g)
}

/// Polarity-aware distance between two normalized templates.
fn template_distance(data: &SampleData, a: &[f64], b: &[f64]) -> f64 {
    let (r, _) = polarize(dot(a, b), data.polarity());
    (data.data_type().distance_scale() * 2.0 * (1.0 - r)).max(0.0).sqrt()
}

fn calinski_harabasz(sums: &CentroidSums) -> Option<f64> {
    let k = sums.clusters();
    if k < 2 || sums.labeled <= k || sums.within < EPSILON {
        return None;
    }
    Some((sums.between / (k - 1) as f64) / (sums.within / (sums.labeled - k) as f64))
}

fn davies_bouldin(data: &SampleData, templates: &MapSet, sums: &CentroidSums) -> Option<f64> {
    let alive: Vec<usize> = (0..templates.len()).filter(|&c| sums.sizes[c] > 0).collect();
    if alive.len() < 2 {
        return None;
    }
    let total: f64 = alive
        .iter()
        .map(|&a| {
            alive
                .iter()
                .filter(|&&b| b != a)
                .map(|&b| {
                    let separation = template_distance(data, templates.map(a), templates.map(b));
                    (sums.scatter[a] + sums.scatter[b]) / separation.max(EPSILON)
                })
                .fold(0.0, f64::max)
        })
        .sum();
    Some(total / alive.len() as f64)
}

/// Pascual-Marqui cross-validation of the residual variance.
fn cross_validation(data: &SampleData, sums: &CentroidSums) -> Option<f64> {
    let k = sums.clusters() as f64;
    let dof = data.data_type().degrees_of_freedom(data.dim()) as f64;
    if sums.labeled == 0 || dof <= k {
        return None;
    }
    let variance = sums.residual / (sums.labeled as f64 * dof);
    Some(variance * (dof / (dof - k)).powi(2))
}

/// Ratkowski-Lance: mean over dimensions of `sqrt(BGSS / TSS)`, over `sqrt(k)`.
fn ratkowski(data: &SampleData, templates: &MapSet, labeling: &Labeling) -> Option<f64> {
    let k = templates.len();
    let dim = data.dim();
    let mut sizes = vec![0usize; k];
    let mut means = vec![0.0; k * dim];
    let mut grand = vec![0.0; dim];
    let mut n = 0usize;
    for i in 0..labeling.len() {
        let Some(c) = labeling.get(i).filter(|&c| c < k) else {
            continue;
        };
        let f = labeling.sign(i).factor();
        for (d, v) in data.map(i).iter().enumerate() {
            means[c * dim + d] += f * v;
            grand[d] += f * v;
        }
        sizes[c] += 1;
        n += 1;
    }
    let clusters = sizes.iter().filter(|&&s| s > 0).count();
    if clusters < 2 {
        return None;
    }
    grand.iter_mut().for_each(|g| *g /= n as f64);
    for (c, &s) in sizes.iter().enumerate() {
        if s > 0 {
            means[c * dim..(c + 1) * dim]
                .iter_mut()
                .for_each(|m| *m /= s as f64);
        }
    }

    let mut total = vec![0.0; dim];
    for i in 0..labeling.len() {
        if labeling.get(i).is_some_and(|c| c < k) {
            let f = labeling.sign(i).factor();
            for (d, v) in data.map(i).iter().enumerate() {
                total[d] += (f * v - grand[d]).powi(2);
            }
        }
    }
    let mut ratio_sum = 0.0;
    let mut dims = 0usize;
    for d in 0..dim {
        if total[d] < EPSILON {
            continue;
        }
        let bgss: f64 = (0..k)
            .map(|c| sizes[c] as f64 * (means[c * dim + d] - grand[d]).powi(2))
            .sum();
        ratio_sum += (bgss / total[d]).sqrt();
        dims += 1;
    }
    (dims > 0).then(|| ratio_sum / dims as f64 / (clusters as f64).sqrt())
}

/// Computes every base criterion `config` needs for one partition.
///
/// Values of derivative and Krzanowski-Lai criteria are left unavailable;
/// the returned [`CountCriteria`] also carries W for them.
pub fn base_criteria(
    data: &SampleData,
    templates: &MapSet,
    labeling: &Labeling,
    config: &CriteriaConfig,
) -> CountCriteria {
    let sums = CentroidSums::new(data, templates, labeling);
    let clusters = sums.clusters();
    let mut values = CriteriaValues::default();
    let needed = |id: CriterionId| config.is_needed(id) && id.is_applicable(clusters);

    if needed(CriterionId::CalinskiHarabasz) {
        values.set(CriterionId::CalinskiHarabasz, calinski_harabasz(&sums));
    }
    if needed(CriterionId::DaviesBouldin) {
        values.set(CriterionId::DaviesBouldin, davies_bouldin(data, templates, &sums));
    }
    if needed(CriterionId::CrossValidation) {
        values.set(CriterionId::CrossValidation, cross_validation(data, &sums));
    }
    if needed(CriterionId::Ratkowski) {
        values.set(CriterionId::Ratkowski, ratkowski(data, templates, labeling));
    }
    if needed(CriterionId::TraceW) {
        values.set(CriterionId::TraceW, Some(sums.within));
    }

    if PAIR_BASED.into_iter().any(|id| needed(id)) {
        let pairs = PairwiseSums::new(data, labeling, templates.len(), config.max_samples);
        for id in PAIR_BASED.into_iter().filter(|&id| needed(id)) {
            let value = match id {
                CriterionId::CIndex => pairs.c_index(),
                CriterionId::Dunn => pairs.dunn(),
                CriterionId::DunnRobust => pairs.dunn_robust(),
                CriterionId::Gamma => pairs.gamma(),
                CriterionId::GPlus => pairs.g_plus(),
                CriterionId::Tau => pairs.tau(),
                CriterionId::McClain => pairs.mcclain(),
                CriterionId::PointBiserial => pairs.point_biserial(),
                CriterionId::Silhouettes => pairs.silhouettes(),
                _ => None,
            };
            values.set(id, value);
        }
    }

    CountCriteria {
        clusters,
        within: (sums.labeled > 0).then_some(sums.within),
        values,
    }
}
