//! Sweep over cluster counts: clustering, post-processing, ordering, GEV,
//! criteria and selection of the optimal count.
#![allow(clippy::module_name_repetitions)]

use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use microseg_core::config::{ClusteringMethod, SegmentationConfig};
use microseg_core::error::{Error, Result};
use microseg_core::gev::{explained_variance, ExplainedVariance};
use microseg_core::labeling::Labeling;
use microseg_core::map::MapSet;
use microseg_core::sample::SampleData;

use crate::centroid::CentroidBuilder;
use crate::criteria::{base_criteria, complete_sweep, CountCriteria, CriteriaValues};
use crate::criteria::{CRITERION_MARGIN, KL_FILTER_SIZE};
use crate::kmeans::KMeansClustering;
use crate::ordering::order_templates;
use crate::partition::Partition;
use crate::postprocess::PipelinePlan;
use crate::selector::select_optimal;
use crate::taahc::{ClusteringState, TaahcClustering};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Progress reporting and cancellation, consulted between cluster counts.
///
/// K-Means sweeps process counts in parallel, so implementations are shared
/// across threads.
pub trait Progress: Sync {
    /// Called after each swept count.
    fn advance(&self, _completed: usize, _total: usize) {}

    /// Returning true stops the sweep; no partial result is returned.
    fn should_abort(&self) -> bool {
        false
    }
}

/// Progress sink that never aborts.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl Progress for NoProgress {}

/// Result for one requested cluster count.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ClusterCountResult {
    /// Cluster count asked for.
    pub requested: usize,
    /// Templates left after post-processing; may be below `requested`.
    pub achieved: usize,
    /// Normalized templates, in output order.
    pub templates: MapSet,
    /// Per-sample cluster and sign.
    pub labeling: Labeling,
    /// Global explained variance.
    pub gev: f64,
    /// Share of the GEV explained by each template.
    pub gev_per_cluster: Vec<f64>,
    /// Criteria vector, zero where not applicable.
    pub criteria: CriteriaValues,
    /// Combined meta-criterion score.
    pub meta_score: f64,
}

/// Rows for the requested counts and the selected optimum.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SegmentationOutput {
    /// One row per requested count, ascending.
    pub results: Vec<ClusterCountResult>,
    /// Selected cluster count.
    pub optimal_clusters: usize,
    /// Row of the selected count in `results`.
    pub optimal_row: usize,
}

impl SegmentationOutput {
    /// Row of the selected count.
    #[must_use]
    pub fn optimal(&self) -> &ClusterCountResult {
        &self.results[self.optimal_row]
    }

    /// Row for a requested count, if it was computed.
    #[must_use]
    pub fn for_clusters(&self, requested: usize) -> Option<&ClusterCountResult> {
        self.results.iter().find(|r| r.requested == requested)
    }
}

/// Partition of one swept count after post-processing and ordering.
struct SweepEntry {
    requested: usize,
    partition: Partition,
    gev: ExplainedVariance,
    criteria: CountCriteria,
}

/// Segments `raw` for every count of the configured range.
///
/// `epoch_lengths` splits the samples into consecutive epochs (empty for a
/// single epoch). Randomness only comes from `rng`; `progress` is consulted
/// between counts.
///
/// # Errors
///
/// Returns an error for empty input, an unusable cluster range, epochs or
/// reference data that do not match the samples, or when `progress` aborts.
pub fn segment_microstates<R: Rng + ?Sized, P: Progress + ?Sized>(
    raw: &MapSet,
    epoch_lengths: &[usize],
    config: &SegmentationConfig,
    rng: &mut R,
    progress: &P,
) -> Result<SegmentationOutput> {
    config.validate(raw.len(), raw.dim())?;
    let data = SampleData::new(
        raw,
        config.data_type,
        config.polarity,
        epoch_lengths,
        config.rank_data,
    )?;
    let segmenter = Segmenter::new(&data, config);
    segmenter.run(rng, progress)
}

/// Everything shared by the counts of one sweep.
struct Segmenter<'a> {
    data: &'a SampleData,
    config: &'a SegmentationConfig,
    builder: CentroidBuilder,
    plan: PipelinePlan,
}

impl<'a> Segmenter<'a> {
    fn new(data: &'a SampleData, config: &'a SegmentationConfig) -> Self {
        Self {
            data,
            config,
            builder: CentroidBuilder::new(config.centroid, config.rank_data),
            plan: PipelinePlan::new(&config.post),
        }
    }

    fn single_count(&self) -> bool {
        self.config.min_clusters == self.config.max_clusters
    }

    /// Counts actually clustered, and the requested ones among them.
    fn ranges(&self) -> Result<(RangeInclusive<usize>, RangeInclusive<usize>)> {
        let n = self.data.len();
        let (min, max) = (self.config.min_clusters, self.config.max_clusters);
        let empty = Error::EmptySweep {
            min,
            max,
            samples: n,
        };
        if self.single_count() {
            return if min < n {
                Ok((min..=min, min..=min))
            } else {
                Err(empty)
            };
        }

        let margin = KL_FILTER_SIZE + CRITERION_MARGIN;
        let lo = min.saturating_sub(margin).max(1);
        let hi = (max + margin).min(n.saturating_sub(1));
        let requested = min.max(lo)..=max.min(hi);
        if lo > hi || requested.is_empty() {
            return Err(empty);
        }
        Ok((lo..=hi, requested))
    }

    fn run<R: Rng + ?Sized, P: Progress + ?Sized>(
        &self,
        rng: &mut R,
        progress: &P,
    ) -> Result<SegmentationOutput> {
        let (swept, requested) = self.ranges()?;
        log::debug!(
            "{} sweep over {:?} (requested {:?}) on {} samples",
            self.config.method.name(),
            swept,
            requested,
            self.data.len()
        );

        let mut entries = match &self.config.method {
            ClusteringMethod::KMeans(kmeans) => {
                let algo = KMeansClustering::new(kmeans.clone(), self.builder);
                self.sweep_kmeans(&algo, swept.clone(), rng, progress)?
            }
            ClusteringMethod::Taahc(taahc) => {
                let algo = TaahcClustering::new(taahc.clone(), self.builder);
                self.sweep_taahc(&algo, swept.clone(), progress)?
            }
        };
        entries.sort_by_key(|e| e.requested);

        let with_criteria = !self.single_count();
        if with_criteria {
            let counts: Vec<usize> = entries.iter().map(|e| e.requested).collect();
            let mut rows: Vec<CountCriteria> =
                entries.iter_mut().map(|e| std::mem::take(&mut e.criteria)).collect();
            let dof = self.data.data_type().degrees_of_freedom(self.data.dim());
            complete_sweep(&mut rows, &counts, dof, &self.config.criteria);
            for (entry, row) in entries.iter_mut().zip(rows) {
                entry.criteria = row;
            }
        }

        let mut results: Vec<ClusterCountResult> = entries
            .into_iter()
            .filter(|e| requested.contains(&e.requested))
            .map(Self::result)
            .collect();

        let optimal_row = if with_criteria {
            let rows: Vec<&CriteriaValues> = results.iter().map(|r| &r.criteria).collect();
            let selection = select_optimal(&rows, &self.config.criteria);
            for (result, score) in results.iter_mut().zip(&selection.scores) {
                result.meta_score = *score;
            }
            selection.row
        } else {
            0
        };

        let optimal_clusters = results
            .get(optimal_row)
            .map_or(*requested.start(), |r| r.requested);
        log::info!(
            "optimal segmentation: {optimal_clusters} clusters (gev {:.4})",
            results.get(optimal_row).map_or(0.0, |r| r.gev)
        );
        Ok(SegmentationOutput {
            results,
            optimal_clusters,
            optimal_row,
        })
    }

    /// Counts are independent: one seed per count is drawn up front, then
    /// the counts run in parallel.
    fn sweep_kmeans<R: Rng + ?Sized, P: Progress + ?Sized>(
        &self,
        algo: &KMeansClustering,
        swept: RangeInclusive<usize>,
        rng: &mut R,
        progress: &P,
    ) -> Result<Vec<SweepEntry>> {
        let jobs: Vec<(usize, u64)> = swept.map(|k| (k, rng.gen())).collect();
        let total = jobs.len();
        let completed = AtomicUsize::new(0);
        let aborted = AtomicBool::new(false);

        let entries: Vec<Option<SweepEntry>> = jobs
            .par_iter()
            .map(|&(k, seed)| {
                if aborted.load(Ordering::Relaxed) || progress.should_abort() {
                    aborted.store(true, Ordering::Relaxed);
                    return None;
                }
                let mut count_rng = StdRng::seed_from_u64(seed);
                let partition = algo.segment(self.data, k, &mut count_rng);
                let entry = self.finish(k, partition);
                let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                progress.advance(done, total);
                Some(entry)
            })
            .collect();

        if aborted.load(Ordering::Relaxed) {
            return Err(Error::Aborted {
                completed: completed.load(Ordering::Relaxed),
                total,
            });
        }
        Ok(entries.into_iter().flatten().collect())
    }

    /// Counts are visited in descending order through one merge state.
    fn sweep_taahc<P: Progress + ?Sized>(
        &self,
        algo: &TaahcClustering,
        swept: RangeInclusive<usize>,
        progress: &P,
    ) -> Result<Vec<SweepEntry>> {
        let total = swept.clone().count();
        let mut state = algo.create_state();
        state.reset();
        let mut entries = Vec::with_capacity(total);
        for k in swept.rev() {
            if progress.should_abort() {
                return Err(Error::Aborted {
                    completed: entries.len(),
                    total,
                });
            }
            let partition = algo.segment(self.data, k, &mut state);
            entries.push(self.finish(k, partition));
            progress.advance(entries.len(), total);
        }
        Ok(entries)
    }

    /// Post-processing, ordering, GEV and base criteria of one count.
    fn finish(&self, requested: usize, mut partition: Partition) -> SweepEntry {
        let Partition {
            templates,
            labeling,
            ..
        } = &mut partition;
        self.plan.run(self.data, &self.builder, templates, labeling);
        let permutation = order_templates(&self.config.ordering, self.data, templates, labeling);
        permutation.apply(templates, labeling);
        let gev = explained_variance(self.data, &partition.templates, &partition.labeling);
        partition.gev = gev.total;

        let achieved = partition.achieved();
        if achieved < requested {
            log::warn!("{requested} clusters requested, {achieved} achieved");
        }
        log::debug!(
            "k = {requested}: {achieved} templates, gev {:.4}",
            partition.gev
        );

        let criteria = if self.single_count() {
            CountCriteria::default()
        } else {
            base_criteria(
                self.data,
                &partition.templates,
                &partition.labeling,
                &self.config.criteria,
            )
        };
        SweepEntry {
            requested,
            partition,
            gev,
            criteria,
        }
    }

    fn result(entry: SweepEntry) -> ClusterCountResult {
        let SweepEntry {
            requested,
            partition,
            gev,
            criteria,
        } = entry;
        ClusterCountResult {
            requested,
            achieved: partition.achieved(),
            templates: partition.templates,
            labeling: partition.labeling,
            gev: gev.total,
            gev_per_cluster: gev.per_cluster,
            criteria: criteria.values,
            meta_score: 0.0,
        }
    }
}
