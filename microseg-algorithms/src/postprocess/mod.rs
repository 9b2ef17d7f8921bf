//! Temporal post-processing of a partition.
//!
//! Every transform edits `(templates, labeling)` in place, tolerates
//! undefined samples and leaves the labels packed. [`PipelinePlan`] turns the
//! post-processing flags into the fixed, enumerable sequence of stages that
//! is run after clustering.

mod merge;
mod reject;
mod sequentialize;
mod small_segments;
mod smoothing;

pub use merge::merge_correlated;
pub use reject::reject_low_correlation;
pub use sequentialize::sequentialize;
pub use small_segments::reject_small_segments;
pub use smoothing::{smooth_labeling, smooth_labeling_with, BesagCost, SmoothingCost};

use microseg_core::config::{PostProcessingConfig, SmallSegmentPolicy, SmoothingConfig};
use microseg_core::labeling::{pack_labels, Labeling};
use microseg_core::map::MapSet;
use microseg_core::sample::SampleData;

use crate::centroid::CentroidBuilder;

/// One step of the post-processing pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    /// One cluster per contiguous run.
    Sequentialize,
    /// Merge templates correlated above `threshold`.
    MergeCorrelated {
        /// Lowest correlation that still merges.
        threshold: f64,
    },
    /// Unlabel samples correlated below `threshold`.
    RejectLowCorrelation {
        /// Lowest correlation a sample may keep its label with.
        threshold: f64,
    },
    /// Besag smoothing, restricted to templates reaching `floor`.
    Smoothing {
        /// Window, strength and iteration cap.
        config: SmoothingConfig,
        /// Correlation floor of the candidate templates.
        floor: Option<f64>,
    },
    /// Remove runs of at most `size` samples.
    RejectSmallSegments {
        /// Longest run that is removed.
        size: usize,
        /// What happens to the removed samples.
        policy: SmallSegmentPolicy,
        /// Correlation floor of reassigned samples.
        floor: Option<f64>,
    },
    /// Drop empty clusters.
    Pack,
}

impl Stage {
    /// Short name used in logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Sequentialize => "sequentialize",
            Stage::MergeCorrelated { .. } => "merge-correlated",
            Stage::RejectLowCorrelation { .. } => "reject-low-correlation",
            Stage::Smoothing { .. } => "smoothing",
            Stage::RejectSmallSegments { .. } => "reject-small-segments",
            Stage::Pack => "pack",
        }
    }

    /// Applies the stage; returns the number of clusters left.
    pub fn apply(
        &self,
        data: &SampleData,
        builder: &CentroidBuilder,
        templates: &mut MapSet,
        labeling: &mut Labeling,
    ) -> usize {
        match self {
            Stage::Sequentialize => sequentialize(data, builder, templates, labeling),
            Stage::MergeCorrelated { threshold } => {
                merge_correlated(data, builder, *threshold, templates, labeling)
            }
            Stage::RejectLowCorrelation { threshold } => {
                reject_low_correlation(data, builder, *threshold, templates, labeling)
            }
            Stage::Smoothing { config, floor } => {
                smooth_labeling(data, config, *floor, templates, labeling)
            }
            Stage::RejectSmallSegments {
                size,
                policy,
                floor,
            } => reject_small_segments(data, *size, *policy, *floor, templates, labeling),
            Stage::Pack => pack_labels(templates, labeling),
        }
    }
}

/// Position in the fixed stage order.
///
/// The plan walks these phases once; each phase emits at most one stage,
/// guarded by the configuration flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Sequentialize,
    Merge,
    RejectLow,
    Resequentialize,
    Smooth,
    Pack,
    RejectSmallWithFloor,
    RejectSmallWithoutFloor,
    FinalSequentialize,
    FinalPack,
    Done,
}

impl Phase {
    fn next(self) -> Phase {
        match self {
            Phase::Sequentialize => Phase::Merge,
            Phase::Merge => Phase::RejectLow,
            Phase::RejectLow => Phase::Resequentialize,
            Phase::Resequentialize => Phase::Smooth,
            Phase::Smooth => Phase::Pack,
            Phase::Pack => Phase::RejectSmallWithFloor,
            Phase::RejectSmallWithFloor => Phase::RejectSmallWithoutFloor,
            Phase::RejectSmallWithoutFloor => Phase::FinalSequentialize,
            Phase::FinalSequentialize => Phase::FinalPack,
            Phase::FinalPack | Phase::Done => Phase::Done,
        }
    }

    fn stage(self, config: &PostProcessingConfig) -> Option<Stage> {
        let resequentialize = config.sequentialize && config.merge_correlation.is_none();
        let floor = config.reject_low_correlation;
        match self {
            Phase::Sequentialize => config.sequentialize.then_some(Stage::Sequentialize),
            Phase::Merge => config
                .merge_correlation
                .map(|threshold| Stage::MergeCorrelated { threshold }),
            Phase::RejectLow => floor.map(|threshold| Stage::RejectLowCorrelation { threshold }),
            Phase::Resequentialize | Phase::FinalSequentialize => {
                resequentialize.then_some(Stage::Sequentialize)
            }
            Phase::Smooth => config.smoothing.clone().map(|config| Stage::Smoothing {
                config,
                floor,
            }),
            Phase::Pack | Phase::FinalPack => Some(Stage::Pack),
            Phase::RejectSmallWithFloor => {
                config
                    .reject_small_segments
                    .map(|size| Stage::RejectSmallSegments {
                        size,
                        policy: config.small_segment_policy,
                        floor,
                    })
            }
            Phase::RejectSmallWithoutFloor => match (config.reject_small_segments, floor) {
                (Some(size), Some(_)) => Some(Stage::RejectSmallSegments {
                    size,
                    policy: config.small_segment_policy,
                    floor: None,
                }),
                _ => None,
            },
            Phase::Done => None,
        }
    }
}

/// Ordered list of post-processing stages derived from the configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelinePlan {
    stages: Vec<Stage>,
}

impl PipelinePlan {
    /// Builds the plan for `config`.
    #[must_use]
    pub fn new(config: &PostProcessingConfig) -> Self {
        let mut stages = Vec::new();
        let mut phase = Phase::Sequentialize;
        while phase != Phase::Done {
            if let Some(stage) = phase.stage(config) {
                stages.push(stage);
            }
            phase = phase.next();
        }
        Self { stages }
    }

    /// Stages in execution order.
    #[must_use]
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Runs every stage in order; returns the number of clusters left.
    pub fn run(
        &self,
        data: &SampleData,
        builder: &CentroidBuilder,
        templates: &mut MapSet,
        labeling: &mut Labeling,
    ) -> usize {
        let mut achieved = templates.len();
        for stage in &self.stages {
            let before = achieved;
            achieved = stage.apply(data, builder, templates, labeling);
            log::debug!("{}: {before} -> {achieved} clusters", stage.name());
        }
        achieved
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::centroid::refresh_signs;
    use microseg_core::map::{DataType, Polarity};

    /// Eight 4-channel samples built from three topographies:
    /// `A` at 0, 1, 4, 5; `B` at 2, 3, 7; `C` at 6.
    pub(crate) fn fixture(indices: &[i32]) -> (SampleData, MapSet, Labeling) {
        let a = [1.0, -1.0, 0.0, 0.0];
        let b = [0.0, 1.0, -1.0, 0.0];
        let c = [0.0, 0.0, 1.0, -1.0];
        let scaled = |m: &[f64; 4], f: f64| m.iter().map(|v| v * f).collect::<Vec<f64>>();
        let mut a_perturbed = scaled(&a, 0.8);
        a_perturbed[3] += 1e-3;
        let rows = vec![
            scaled(&a, 1.0),
            scaled(&a, 1.1),
            scaled(&b, 1.0),
            scaled(&b, 0.9),
            a_perturbed,
            scaled(&a, 1.0),
            scaled(&c, 1.0),
            scaled(&b, 1.0),
        ];
        let raw = MapSet::from_rows(&rows).unwrap();
        let data = SampleData::new(&raw, DataType::Scalar, Polarity::Evaluate, &[], false).unwrap();

        let mut labeling = Labeling::new(indices.len());
        labeling.index.copy_from_slice(indices);
        let clusters = indices.iter().copied().max().map_or(0, |m| (m + 1).max(0)) as usize;
        let templates = CentroidBuilder::default().templates(&data, &labeling, clusters);
        refresh_signs(&data, &templates, &mut labeling);
        (data, templates, labeling)
    }

    pub(crate) fn labels(labeling: &Labeling) -> Vec<i32> {
        labeling.index.clone()
    }

    fn assert_valid(templates: &MapSet, labeling: &Labeling, achieved: usize) {
        assert_eq!(templates.len(), achieved);
        let counts = labeling.member_counts(achieved);
        assert!(counts.iter().all(|&n| n > 0), "empty cluster in {counts:?}");
        assert!(labeling
            .index
            .iter()
            .all(|&c| c == microseg_core::UNDEFINED || (c >= 0 && (c as usize) < achieved)));
    }

    fn all_configs() -> Vec<PostProcessingConfig> {
        let mut configs = Vec::new();
        for mask in 0..32u32 {
            let mut config = PostProcessingConfig::default();
            config.sequentialize = mask & 1 != 0;
            if mask & 2 != 0 {
                config.merge_correlation = Some(0.9);
            }
            if mask & 4 != 0 {
                config.reject_low_correlation = Some(0.5);
            }
            if mask & 8 != 0 {
                config.smoothing = Some(SmoothingConfig::default());
            }
            if mask & 16 != 0 {
                config.reject_small_segments = Some(1);
            }
            configs.push(config);
        }
        configs
    }

    #[test]
    fn test_default_plan_only_packs() {
        let plan = PipelinePlan::new(&PostProcessingConfig::default());
        assert_eq!(plan.stages(), &[Stage::Pack, Stage::Pack]);
    }

    #[test]
    fn test_full_plan_order() {
        let config = PostProcessingConfig::default()
            .with_sequentialize(true)
            .with_reject_low_correlation(0.5)
            .with_smoothing(SmoothingConfig::default())
            .with_reject_small_segments(2, SmallSegmentPolicy::Reassign);
        let names: Vec<_> = PipelinePlan::new(&config)
            .stages()
            .iter()
            .map(Stage::name)
            .collect();
        assert_eq!(
            names,
            vec![
                "sequentialize",
                "reject-low-correlation",
                "sequentialize",
                "smoothing",
                "pack",
                "reject-small-segments",
                "reject-small-segments",
                "sequentialize",
                "pack",
            ]
        );
    }

    #[test]
    fn test_merge_suppresses_resequentialize() {
        let config = PostProcessingConfig::default()
            .with_sequentialize(true)
            .with_merge_correlation(0.9);
        let stages = PipelinePlan::new(&config);
        let count = stages
            .stages()
            .iter()
            .filter(|s| **s == Stage::Sequentialize)
            .count();
        assert_eq!(count, 1);
        assert_eq!(stages.stages()[1], Stage::MergeCorrelated { threshold: 0.9 });
    }

    #[test]
    fn test_second_small_segment_pass_drops_floor() {
        let config = PostProcessingConfig::default()
            .with_reject_low_correlation(0.6)
            .with_reject_small_segments(3, SmallSegmentPolicy::Unlabel);
        let small: Vec<_> = PipelinePlan::new(&config)
            .stages()
            .iter()
            .filter_map(|s| match s {
                Stage::RejectSmallSegments { floor, .. } => Some(*floor),
                _ => None,
            })
            .collect();
        assert_eq!(small, vec![Some(0.6), None]);
    }

    #[test]
    fn test_every_plan_keeps_labels_valid() {
        for config in all_configs() {
            let (data, mut templates, mut labeling) = fixture(&[0, 0, 1, 1, 0, 0, 2, 1]);
            let builder = CentroidBuilder::default();
            let achieved = PipelinePlan::new(&config).run(&data, &builder, &mut templates, &mut labeling);
            assert_valid(&templates, &labeling, achieved);
        }
    }
}
