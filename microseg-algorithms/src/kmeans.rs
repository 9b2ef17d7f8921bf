//! Randomized K-Means over normalized maps.
//!
//! Every restart draws `k` distinct seed maps, then alternates polarity-aware
//! assignment and template recomputation until the labels stop changing.
//! The restart with the highest GEV wins.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use microseg_core::config::KMeansConfig;
use microseg_core::gev::global_explained_variance;
use microseg_core::labeling::{pack_labels, Labeling};
use microseg_core::sample::SampleData;

use crate::centroid::CentroidBuilder;
use crate::partition::{assign_labels, Partition};

/// K-Means clustering with random restarts.
#[derive(Debug, Clone)]
pub struct KMeansClustering {
    config: KMeansConfig,
    builder: CentroidBuilder,
}

impl KMeansClustering {
    /// Create with custom configuration.
    #[must_use]
    pub fn new(config: KMeansConfig, builder: CentroidBuilder) -> Self {
        Self { config, builder }
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &KMeansConfig {
        &self.config
    }

    /// Best of `num_random_trials` restarts for `k` clusters.
    ///
    /// One seed per restart is drawn from `rng` up front, so the result only
    /// depends on the state of `rng` and not on thread scheduling.
    pub fn segment<R: Rng + ?Sized>(&self, data: &SampleData, k: usize, rng: &mut R) -> Partition {
        let trials = self.run_trials(data, k, rng);
        let mut best: Option<Partition> = None;
        for trial in trials {
            if best.as_ref().map_or(true, |b| trial.gev > b.gev) {
                best = Some(trial);
            }
        }
        best.unwrap_or_else(|| Partition {
            requested: k,
            templates: microseg_core::MapSet::new(data.dim()),
            labeling: Labeling::with_epochs(data.epoch_lengths()),
            gev: 0.0,
        })
    }

    /// Runs every restart and returns them all, in seed order.
    pub fn run_trials<R: Rng + ?Sized>(
        &self,
        data: &SampleData,
        k: usize,
        rng: &mut R,
    ) -> Vec<Partition> {
        let seeds: Vec<u64> = (0..self.config.num_random_trials)
            .map(|_| rng.gen())
            .collect();
        seeds
            .par_iter()
            .map(|&seed| self.run_trial(data, k, seed))
            .collect()
    }

    /// A single restart seeded with `seed`.
    #[must_use]
    pub fn run_trial(&self, data: &SampleData, k: usize, seed: u64) -> Partition {
        let n = data.len();
        let k = k.min(n);
        let mut labeling = Labeling::with_epochs(data.epoch_lengths());
        if k == 0 {
            return Partition {
                requested: k,
                templates: microseg_core::MapSet::new(data.dim()),
                labeling,
                gev: 0.0,
            };
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let seeds = rand::seq::index::sample(&mut rng, n, k).into_vec();
        let mut templates = data.maps().select(&seeds);

        for iteration in 0..self.config.max_iterations.max(1) {
            let changed = assign_labels(data, &templates, &mut labeling);
            if changed == 0 && iteration > 0 {
                break;
            }
            templates = self.builder.templates(data, &labeling, templates.len());
        }

        pack_labels(&mut templates, &mut labeling);
        let gev = global_explained_variance(data, &templates, &labeling);
        Partition {
            requested: k,
            templates,
            labeling,
            gev,
        }
    }
}
