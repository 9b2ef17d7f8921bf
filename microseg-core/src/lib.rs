//! microseg-core: Core types for microstate segmentation.
//!
//! This crate provides the data model shared by the segmentation engine:
//! maps and map sets with polarity-aware correlation, per-sample labelings,
//! global explained variance, the criteria catalog and the configuration
//! records.
//!

pub mod config;
pub mod criterion;
pub mod error;
pub mod gev;
pub mod labeling;
pub mod map;
pub mod sample;

pub use config::{
    CentroidType, ClusteringMethod, CriteriaConfig, KMeansConfig, MergeTieBreak, OrderingMode,
    PostProcessingConfig, SegmentationConfig, SmallSegmentPolicy, SmoothingConfig, TaahcConfig,
};
pub use criterion::{CriterionId, Direction};
pub use error::{Error, Result};
pub use gev::{explained_variance, global_explained_variance, ExplainedVariance};
pub use labeling::{pack_labels, Labeling, Segment, UNDEFINED};
pub use map::{correlation, polarized_correlation, DataType, Map, MapSet, Polarity, Sign, EPSILON};
pub use sample::SampleData;
