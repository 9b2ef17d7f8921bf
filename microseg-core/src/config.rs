//! Configuration records for the segmentation engine.
//!
//! All records are plain data with `Default` values and `with_*` builders.
//! The caller hands the engine a fully resolved [`SegmentationConfig`].
#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

use crate::criterion::CriterionId;
use crate::error::{Error, Result};
use crate::map::{DataType, MapSet, Polarity};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How a cluster's template is computed from its members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum CentroidType {
    /// Normalized mean of the sign-corrected members.
    #[default]
    Mean,
    /// Component-wise median of the sign-corrected members.
    Median,
    /// The member most correlated with all other members.
    Medoid,
}

/// K-Means parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct KMeansConfig {
    /// Independent random restarts; the best one by GEV is kept.
    pub num_random_trials: usize,
    /// Iteration cap of a single restart.
    pub max_iterations: usize,
}

impl Default for KMeansConfig {
    fn default() -> Self {
        Self {
            num_random_trials: 50,
            max_iterations: 100,
        }
    }
}

impl KMeansConfig {
    /// Sets the number of random restarts.
    pub fn with_random_trials(mut self, trials: usize) -> Self {
        self.num_random_trials = trials;
        self
    }

    /// Sets the iteration cap.
    pub fn with_max_iterations(mut self, iterations: usize) -> Self {
        self.max_iterations = iterations;
        self
    }
}

/// Which merge wins when two candidate merges cost the same.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum MergeTieBreak {
    /// The pair with the lowest cluster indices.
    #[default]
    LowestIndex,
    /// The pair with the fewest samples in total.
    SmallestCluster,
}

/// T-AAHC parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TaahcConfig {
    /// Cap on the number of starting clusters; larger inputs are coarsened once.
    pub max_initial_clusters: usize,
    /// Most correlated partners examined per cluster at each merge.
    pub merge_candidates: usize,
    /// Tie-break rule between equally costly merges.
    pub tie_break: MergeTieBreak,
}

impl Default for TaahcConfig {
    fn default() -> Self {
        Self {
            max_initial_clusters: 400,
            merge_candidates: 3,
            tie_break: MergeTieBreak::LowestIndex,
        }
    }
}

/// Clustering algorithm and its parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "method", rename_all = "snake_case"))]
pub enum ClusteringMethod {
    KMeans(KMeansConfig),
    Taahc(TaahcConfig),
}

impl Default for ClusteringMethod {
    fn default() -> Self {
        ClusteringMethod::KMeans(KMeansConfig::default())
    }
}

impl ClusteringMethod {
    /// Short algorithm name.
    pub fn name(&self) -> &'static str {
        match self {
            ClusteringMethod::KMeans(_) => "K-Means",
            ClusteringMethod::Taahc(_) => "T-AAHC",
        }
    }
}

/// Temporal smoothing parameters.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SmoothingConfig {
    /// Samples on each side of the current one counted as its neighbourhood.
    pub half_window: usize,
    /// Strength of the neighbourhood term (Besag factor).
    pub besag_factor: f64,
    /// Iteration cap of the relabeling loop.
    pub max_iterations: usize,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            half_window: 3,
            besag_factor: 10.0,
            max_iterations: 100,
        }
    }
}

/// What happens to samples of a run that is too short.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum SmallSegmentPolicy {
    /// Give each sample the better-correlated label of the neighbouring runs.
    #[default]
    Reassign,
    /// Mark the run undefined.
    Unlabel,
}

/// Temporal post-processing toggles and thresholds.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PostProcessingConfig {
    /// Split clusters into one cluster per contiguous run.
    pub sequentialize: bool,
    /// Merge templates correlated above this value.
    pub merge_correlation: Option<f64>,
    /// Unlabel samples correlated below this value with their template.
    pub reject_low_correlation: Option<f64>,
    /// Temporal smoothing of the labels.
    pub smoothing: Option<SmoothingConfig>,
    /// Remove runs of at most this many samples.
    pub reject_small_segments: Option<usize>,
    /// Policy for removed runs.
    pub small_segment_policy: SmallSegmentPolicy,
}

impl PostProcessingConfig {
    /// Enables sequentialization.
    pub fn with_sequentialize(mut self, enabled: bool) -> Self {
        self.sequentialize = enabled;
        self
    }

    /// Enables merging of correlated templates.
    pub fn with_merge_correlation(mut self, threshold: f64) -> Self {
        self.merge_correlation = Some(threshold);
        self
    }

    /// Enables rejection of poorly correlated samples.
    pub fn with_reject_low_correlation(mut self, threshold: f64) -> Self {
        self.reject_low_correlation = Some(threshold);
        self
    }

    /// Enables temporal smoothing.
    pub fn with_smoothing(mut self, smoothing: SmoothingConfig) -> Self {
        self.smoothing = Some(smoothing);
        self
    }

    /// Enables rejection of short runs.
    pub fn with_reject_small_segments(mut self, size: usize, policy: SmallSegmentPolicy) -> Self {
        self.reject_small_segments = Some(size);
        self.small_segment_policy = policy;
        self
    }
}

/// Final renumbering of the templates.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "mode", rename_all = "snake_case"))]
pub enum OrderingMode {
    /// Keep the clustering order.
    None,
    /// By first appearance in time.
    #[default]
    Temporal,
    /// By orientation of the map axis; one coordinate per electrode.
    Topographic { coordinates: Vec<[f64; 3]> },
    /// By spatial spread of the map energy; one coordinate per solution point.
    Anatomical { coordinates: Vec<[f64; 3]> },
    /// By best match to caller templates.
    Reference { templates: MapSet },
}

/// Criteria feeding the meta-criterion.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CriteriaConfig {
    /// Criteria whose normalized ranks are averaged.
    pub rank_subset: Vec<CriterionId>,
    /// Criteria voting for the count where they peak; must be odd-sized.
    pub argmax_subset: Vec<CriterionId>,
    /// Labeled samples used by pair-based criteria, evenly strided.
    pub max_samples: usize,
}

impl Default for CriteriaConfig {
    fn default() -> Self {
        Self {
            rank_subset: vec![
                CriterionId::CalinskiHarabaszDerivRobust,
                CriterionId::CIndexDerivRobust,
                CriterionId::DaviesBouldin,
                CriterionId::DunnRobust,
                CriterionId::Gamma,
                CriterionId::KrzanowskiLaiC,
                CriterionId::PointBiserialDerivRobust,
                CriterionId::SilhouettesDerivRobust,
            ],
            argmax_subset: vec![
                CriterionId::CalinskiHarabaszDerivRobust,
                CriterionId::DaviesBouldinDerivRobust,
                CriterionId::KrzanowskiLaiC,
                CriterionId::PointBiserialDerivRobust,
                CriterionId::SilhouettesDerivRobust,
            ],
            max_samples: 1000,
        }
    }
}

impl CriteriaConfig {
    /// Whether a criterion is used by either subset.
    pub fn is_selected(&self, id: CriterionId) -> bool {
        self.rank_subset.contains(&id) || self.argmax_subset.contains(&id)
    }

    /// Whether `id` is selected directly, or feeds a selected derivative.
    pub fn is_needed(&self, id: CriterionId) -> bool {
        self.is_selected(id)
            || CriterionId::ALL
                .into_iter()
                .any(|d| d.derived_from() == Some(id) && self.is_selected(d))
    }
}

/// Complete, pre-validated engine configuration.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SegmentationConfig {
    pub data_type: DataType,
    pub polarity: Polarity,
    pub min_clusters: usize,
    pub max_clusters: usize,
    pub method: ClusteringMethod,
    pub centroid: CentroidType,
    /// Rank-transform data maps and templates before correlation.
    pub rank_data: bool,
    pub post: PostProcessingConfig,
    pub ordering: OrderingMode,
    pub criteria: CriteriaConfig,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            data_type: DataType::Scalar,
            polarity: Polarity::Evaluate,
            min_clusters: 1,
            max_clusters: 12,
            method: ClusteringMethod::default(),
            centroid: CentroidType::Mean,
            rank_data: false,
            post: PostProcessingConfig::default(),
            ordering: OrderingMode::Temporal,
            criteria: CriteriaConfig::default(),
        }
    }
}

impl SegmentationConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the requested cluster range.
    pub fn with_clusters(mut self, min: usize, max: usize) -> Self {
        self.min_clusters = min;
        self.max_clusters = max;
        self
    }

    /// Sets the data type.
    pub fn with_data_type(mut self, data_type: DataType) -> Self {
        self.data_type = data_type;
        self
    }

    /// Sets the polarity rule.
    pub fn with_polarity(mut self, polarity: Polarity) -> Self {
        self.polarity = polarity;
        self
    }

    /// Sets the clustering method.
    pub fn with_method(mut self, method: ClusteringMethod) -> Self {
        self.method = method;
        self
    }

    /// Sets the centroid type.
    pub fn with_centroid(mut self, centroid: CentroidType) -> Self {
        self.centroid = centroid;
        self
    }

    /// Enables rank transform of the data.
    pub fn with_rank_data(mut self, rank: bool) -> Self {
        self.rank_data = rank;
        self
    }

    /// Sets the post-processing pipeline.
    pub fn with_post_processing(mut self, post: PostProcessingConfig) -> Self {
        self.post = post;
        self
    }

    /// Sets the ordering mode.
    pub fn with_ordering(mut self, ordering: OrderingMode) -> Self {
        self.ordering = ordering;
        self
    }

    /// Sets the criteria subsets.
    pub fn with_criteria(mut self, criteria: CriteriaConfig) -> Self {
        self.criteria = criteria;
        self
    }

    /// Checks the parts of the configuration that depend on the data shape.
    pub fn validate(&self, samples: usize, dim: usize) -> Result<()> {
        if samples == 0 {
            return Err(Error::EmptyInput);
        }
        if self.min_clusters == 0 || self.min_clusters > self.max_clusters {
            return Err(Error::InvalidClusterRange {
                min: self.min_clusters,
                max: self.max_clusters,
            });
        }
        if self.criteria.argmax_subset.len() % 2 == 0 && !self.criteria.argmax_subset.is_empty() {
            return Err(Error::InvalidConfig(format!(
                "arg-max subset must hold an odd number of criteria, got {}",
                self.criteria.argmax_subset.len()
            )));
        }
        match &self.method {
            ClusteringMethod::KMeans(k) if k.num_random_trials == 0 => {
                return Err(Error::InvalidConfig(
                    "K-Means needs at least one random trial".into(),
                ));
            }
            ClusteringMethod::Taahc(t) if t.merge_candidates == 0 => {
                return Err(Error::InvalidConfig(
                    "T-AAHC needs at least one merge candidate".into(),
                ));
            }
            _ => {}
        }
        let points = match self.data_type {
            DataType::Vector => dim / 3,
            DataType::Scalar | DataType::Positive => dim,
        };
        match &self.ordering {
            OrderingMode::Topographic { coordinates } => {
                check_coordinates(coordinates, points, "topography")?;
            }
            OrderingMode::Anatomical { coordinates } => {
                check_coordinates(coordinates, points, "anatomy")?;
            }
            OrderingMode::Reference { templates } if templates.dim() != dim => {
                return Err(Error::DimensionMismatch {
                    expected: dim,
                    actual: templates.dim(),
                    context: "reference templates",
                });
            }
            _ => {}
        }
        Ok(())
    }
}

fn check_coordinates(coordinates: &[[f64; 3]], points: usize, mode: &'static str) -> Result<()> {
    if coordinates.is_empty() {
        return Err(Error::MissingCoordinates(mode));
    }
    if coordinates.len() != points {
        return Err(Error::DimensionMismatch {
            expected: points,
            actual: coordinates.len(),
            context: "coordinates",
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segmentation_config_builder() {
        let config = SegmentationConfig::new()
            .with_clusters(2, 6)
            .with_polarity(Polarity::Direct)
            .with_method(ClusteringMethod::KMeans(
                KMeansConfig::default().with_random_trials(10),
            ))
            .with_post_processing(
                PostProcessingConfig::default()
                    .with_sequentialize(true)
                    .with_reject_small_segments(3, SmallSegmentPolicy::Unlabel),
            );

        assert_eq!(config.min_clusters, 2);
        assert_eq!(config.max_clusters, 6);
        assert_eq!(config.polarity, Polarity::Direct);
        assert!(config.post.sequentialize);
        assert_eq!(config.post.reject_small_segments, Some(3));
        assert_eq!(
            config.method,
            ClusteringMethod::KMeans(KMeansConfig {
                num_random_trials: 10,
                max_iterations: 100
            })
        );
    }

    #[test]
    fn test_validate_rejects_bad_ranges() {
        let config = SegmentationConfig::new().with_clusters(5, 2);
        assert_eq!(
            config.validate(10, 4),
            Err(Error::InvalidClusterRange { min: 5, max: 2 })
        );
        let config = SegmentationConfig::new().with_clusters(0, 2);
        assert!(config.validate(10, 4).is_err());
        assert_eq!(
            SegmentationConfig::new().validate(0, 4),
            Err(Error::EmptyInput)
        );
    }

    #[test]
    fn test_validate_ordering_requirements() {
        let config = SegmentationConfig::new()
            .with_ordering(OrderingMode::Topographic {
                coordinates: Vec::new(),
            });
        assert_eq!(
            config.validate(10, 4),
            Err(Error::MissingCoordinates("topography"))
        );

        let config = SegmentationConfig::new().with_ordering(OrderingMode::Reference {
            templates: MapSet::zeros(2, 3),
        });
        assert!(matches!(
            config.validate(10, 4),
            Err(Error::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_criteria_needed_through_derivatives() {
        let criteria = CriteriaConfig {
            rank_subset: vec![CriterionId::SilhouettesDerivRobust],
            argmax_subset: vec![CriterionId::Dunn],
            max_samples: 100,
        };
        assert!(criteria.is_needed(CriterionId::Silhouettes));
        assert!(criteria.is_needed(CriterionId::Dunn));
        assert!(!criteria.is_needed(CriterionId::Gamma));
    }
}
