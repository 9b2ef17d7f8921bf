//! microseg-algorithms: Clustering and scoring of microstate segmentations.
//!
//! This crate provides the segmentation engine:
//! - **K-Means** - randomized restarts, best by explained variance
//! - **T-AAHC** - deterministic agglomeration with an incremental state
//! - **Post-processing** - sequentialize, merge, reject, smooth, in a fixed plan
//! - **Criteria** - validity criteria and the meta-criterion selector
//!
#![warn(missing_docs)]

pub mod centroid;
pub mod criteria;
mod kmeans;
pub mod ordering;
mod partition;
pub mod postprocess;
mod segmentation;
pub mod selector;
mod taahc;

pub use centroid::CentroidBuilder;
pub use criteria::{CriteriaValues, CRITERION_MARGIN, KL_FILTER_SIZE};
pub use kmeans::KMeansClustering;
pub use ordering::{order_templates, Permutation};
pub use partition::{assign_labels, Partition};
pub use postprocess::{PipelinePlan, Stage};
pub use segmentation::{
    segment_microstates, ClusterCountResult, NoProgress, Progress, SegmentationOutput,
};
pub use selector::{select_optimal, Selection};
pub use taahc::{ClusteringState, TaahcClustering, TaahcState};

// Re-export the core configuration records
pub use microseg_core::config::{
    ClusteringMethod, CriteriaConfig, KMeansConfig, PostProcessingConfig, SegmentationConfig,
    TaahcConfig,
};
