#![allow(clippy::uninlined_format_args, clippy::cast_precision_loss)]
use approx::assert_relative_eq;
use microseg_algorithms::{
    segment_microstates, CentroidBuilder, ClusteringMethod, KMeansClustering, KMeansConfig,
    NoProgress, PostProcessingConfig, Progress, SegmentationConfig, TaahcConfig,
};
use microseg_core::config::SmallSegmentPolicy;
use microseg_core::{CriterionId, DataType, Error, MapSet, Polarity, SampleData, Sign};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const BASES: [[f64; 8]; 3] = [
    [1.0, 0.8, 0.2, -0.2, -0.8, -1.0, 0.0, 0.0],
    [0.0, -1.0, 1.0, -1.0, 1.0, 0.0, 0.0, 0.0],
    [-0.5, 0.0, 0.0, 0.5, 0.0, 0.0, 1.0, -1.0],
];

/// 100 samples in runs of 10, cycling over three topographies with noise.
fn generate_maps(seed: u64) -> MapSet {
    let mut rng = StdRng::seed_from_u64(seed);
    let rows: Vec<Vec<f64>> = (0..100)
        .map(|i| {
            let base = &BASES[(i / 10) % 3];
            let gain = rng.gen_range(0.5..2.0);
            base.iter()
                .map(|v| gain * (v + rng.gen_range(-0.05..0.05)))
                .collect()
        })
        .collect();
    MapSet::from_rows(&rows).unwrap()
}

fn taahc() -> ClusteringMethod {
    ClusteringMethod::Taahc(TaahcConfig::default())
}

fn kmeans(trials: usize) -> ClusteringMethod {
    ClusteringMethod::KMeans(KMeansConfig::default().with_random_trials(trials))
}

#[test]
fn test_single_count_kmeans() {
    let maps = generate_maps(1);
    let config = SegmentationConfig::new()
        .with_clusters(3, 3)
        .with_method(kmeans(10));
    let mut rng = StdRng::seed_from_u64(42);
    let output = segment_microstates(&maps, &[], &config, &mut rng, &NoProgress).unwrap();

    assert_eq!(output.results.len(), 1);
    assert_eq!(output.optimal_clusters, 3);
    let row = output.optimal();
    assert!(row.achieved <= 3);
    assert!((0.0..=1.0).contains(&row.gev), "gev = {}", row.gev);
    for i in 0..maps.len() {
        let label = row.labeling.get(i).expect("every sample labeled");
        assert!(label < row.achieved);
    }
    assert!(row.criteria.as_slice().iter().all(|&v| v == 0.0));
}

#[test]
fn test_sweep_reports_each_requested_count() {
    let maps = generate_maps(2);
    let config = SegmentationConfig::new()
        .with_clusters(2, 6)
        .with_method(taahc());
    let mut rng = StdRng::seed_from_u64(0);
    let output = segment_microstates(&maps, &[], &config, &mut rng, &NoProgress).unwrap();

    let counts: Vec<usize> = output.results.iter().map(|r| r.requested).collect();
    assert_eq!(counts, vec![2, 3, 4, 5, 6]);
    assert!((2..=6).contains(&output.optimal_clusters));
    assert_eq!(
        output.results[output.optimal_row].requested,
        output.optimal_clusters
    );
    for row in &output.results {
        assert_eq!(row.criteria.as_slice().len(), CriterionId::COUNT);
        assert!((0.0..=1.0).contains(&row.meta_score));
        assert_eq!(row.gev_per_cluster.len(), row.achieved);
    }
    // More clusters never explain less on the same merge path
    assert!(output.results[4].gev + 1e-9 >= output.results[0].gev);
}

#[test]
fn test_kmeans_keeps_best_restart() {
    let maps = generate_maps(3);
    let data = SampleData::new(&maps, Default::default(), Default::default(), &[], false).unwrap();
    let algo = KMeansClustering::new(
        KMeansConfig::default().with_random_trials(8),
        CentroidBuilder::default(),
    );

    let best = algo.segment(&data, 3, &mut StdRng::seed_from_u64(9));
    let trials = algo.run_trials(&data, 3, &mut StdRng::seed_from_u64(9));
    assert_eq!(trials.len(), 8);
    for trial in &trials {
        assert!(best.gev + 1e-12 >= trial.gev);
    }
}

#[test]
fn test_epochs_are_kept_in_labeling() {
    let maps = generate_maps(4);
    let config = SegmentationConfig::new()
        .with_clusters(3, 3)
        .with_method(taahc())
        .with_post_processing(PostProcessingConfig::default().with_sequentialize(true));
    let output = segment_microstates(
        &maps,
        &[45, 55],
        &config,
        &mut StdRng::seed_from_u64(0),
        &NoProgress,
    )
    .unwrap();

    let row = output.optimal();
    assert_eq!(row.labeling.epoch_lengths(), &[45, 55]);
    for segment in row.labeling.segments() {
        let epoch_end = if segment.epoch == 0 { 45 } else { 100 };
        assert!(segment.end() <= epoch_end);
    }
}

#[test]
fn test_epoch_mismatch_is_rejected() {
    let maps = generate_maps(4);
    let config = SegmentationConfig::new().with_clusters(2, 2).with_method(taahc());
    let result = segment_microstates(
        &maps,
        &[40, 40],
        &config,
        &mut StdRng::seed_from_u64(0),
        &NoProgress,
    );
    assert!(matches!(result, Err(Error::EpochMismatch { .. })));
}

/// 20 samples of one map, a single sample of another, 20 of the first.
fn isolated_sample() -> MapSet {
    let rows: Vec<Vec<f64>> = (0..41)
        .map(|i| {
            if i == 20 {
                vec![0.0, 0.0, 1.0, -1.0]
            } else {
                vec![1.0, -1.0, 0.01 * (i % 3) as f64, 0.0]
            }
        })
        .collect();
    MapSet::from_rows(&rows).unwrap()
}

#[test]
fn test_small_segment_reassigned_to_neighbours() {
    let maps = isolated_sample();
    let config = SegmentationConfig::new()
        .with_clusters(2, 2)
        .with_method(taahc())
        .with_post_processing(
            PostProcessingConfig::default()
                .with_reject_small_segments(1, SmallSegmentPolicy::Reassign),
        );
    let output = segment_microstates(
        &maps,
        &[],
        &config,
        &mut StdRng::seed_from_u64(0),
        &NoProgress,
    )
    .unwrap();

    let row = output.optimal();
    assert!(row.achieved <= 2);
    assert!(row.labeling.get(20).is_some());
    assert_eq!(row.labeling.get(20), row.labeling.get(19));
}

#[test]
fn test_small_segment_unlabeled() {
    let maps = isolated_sample();
    let config = SegmentationConfig::new()
        .with_clusters(2, 2)
        .with_method(taahc())
        .with_post_processing(
            PostProcessingConfig::default()
                .with_reject_small_segments(1, SmallSegmentPolicy::Unlabel),
        );
    let output = segment_microstates(
        &maps,
        &[],
        &config,
        &mut StdRng::seed_from_u64(0),
        &NoProgress,
    )
    .unwrap();

    let row = output.optimal();
    assert!(row.achieved <= 2);
    assert_eq!(row.labeling.get(20), None);
    assert!(row.labeling.get(19).is_some());
}

/// Ten samples of A, ten of -A, ten of B.
fn inverted_blocks() -> MapSet {
    let a = [1.0, -1.0, 0.5, -0.5];
    let b = [0.0, 0.5, -1.0, 0.5];
    let rows: Vec<Vec<f64>> = (0..30)
        .map(|i| {
            let jitter = 0.01 * (i % 4) as f64;
            match i / 10 {
                0 => a.iter().map(|v| v + jitter).collect(),
                1 => a.iter().map(|v| -v + jitter).collect(),
                _ => b.iter().map(|v| v + jitter).collect(),
            }
        })
        .collect();
    MapSet::from_rows(&rows).unwrap()
}

#[test]
fn test_polarity_evaluate_joins_inverted_maps() {
    let maps = inverted_blocks();
    let config = SegmentationConfig::new()
        .with_clusters(2, 2)
        .with_method(taahc());
    let output = segment_microstates(
        &maps,
        &[],
        &config,
        &mut StdRng::seed_from_u64(0),
        &NoProgress,
    )
    .unwrap();

    let labeling = &output.optimal().labeling;
    assert_eq!(labeling.get(0), labeling.get(10));
    assert_ne!(labeling.get(0), labeling.get(20));
    assert_ne!(labeling.sign(0), labeling.sign(10));
}

#[test]
fn test_polarity_direct_separates_inverted_maps() {
    let maps = inverted_blocks();
    let config = SegmentationConfig::new()
        .with_clusters(3, 3)
        .with_polarity(Polarity::Direct)
        .with_method(taahc());
    let output = segment_microstates(
        &maps,
        &[],
        &config,
        &mut StdRng::seed_from_u64(0),
        &NoProgress,
    )
    .unwrap();

    let labeling = &output.optimal().labeling;
    assert_ne!(labeling.get(0), labeling.get(10));
    assert_eq!(labeling.sign(0), Sign::Positive);
    assert_eq!(labeling.sign(10), Sign::Positive);
}

struct AlwaysAbort;

impl Progress for AlwaysAbort {
    fn should_abort(&self) -> bool {
        true
    }
}

#[test]
fn test_abort_returns_no_partial_result() {
    let maps = generate_maps(5);
    for method in [kmeans(2), taahc()] {
        let config = SegmentationConfig::new()
            .with_clusters(2, 4)
            .with_method(method);
        let result = segment_microstates(
            &maps,
            &[],
            &config,
            &mut StdRng::seed_from_u64(0),
            &AlwaysAbort,
        );
        assert!(matches!(
            result,
            Err(Error::Aborted { completed: 0, .. })
        ));
    }
}

#[test]
fn test_same_seed_same_result() {
    let maps = generate_maps(6);
    let config = SegmentationConfig::new()
        .with_clusters(2, 4)
        .with_method(kmeans(5));
    let first = segment_microstates(
        &maps,
        &[],
        &config,
        &mut StdRng::seed_from_u64(11),
        &NoProgress,
    )
    .unwrap();
    let second = segment_microstates(
        &maps,
        &[],
        &config,
        &mut StdRng::seed_from_u64(11),
        &NoProgress,
    )
    .unwrap();
    assert_eq!(first, second);
}

/// Three orthogonal vector fields over three solution points.
fn vector_blocks() -> MapSet {
    let bases = [
        [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
        [0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
        [0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0],
    ];
    let rows: Vec<Vec<f64>> = (0..30)
        .map(|i| {
            let gain = 1.0 + 0.1 * (i % 4) as f64;
            bases[i / 10].iter().map(|v| gain * v).collect()
        })
        .collect();
    MapSet::from_rows(&rows).unwrap()
}

#[test]
fn test_vector_data_sweep() {
    let maps = vector_blocks();
    let config = SegmentationConfig::new()
        .with_clusters(2, 4)
        .with_data_type(DataType::Vector)
        .with_method(taahc());
    let output = segment_microstates(
        &maps,
        &[],
        &config,
        &mut StdRng::seed_from_u64(0),
        &NoProgress,
    )
    .unwrap();

    assert_eq!(output.results.len(), 3);
    let row = output.for_clusters(3).unwrap();
    assert_relative_eq!(row.gev, 1.0, epsilon = 1e-9);
    for block in 0..3 {
        let label = row.labeling.get(block * 10);
        assert!((block * 10..block * 10 + 10).all(|i| row.labeling.get(i) == label));
    }
    assert_ne!(row.labeling.get(0), row.labeling.get(10));
    assert_ne!(row.labeling.get(10), row.labeling.get(20));
    assert!(row.criteria.is_available(CriterionId::CrossValidation));
}

#[test]
fn test_vector_data_needs_whole_points() {
    let rows: Vec<Vec<f64>> = (0..10).map(|i| vec![1.0 + i as f64; 8]).collect();
    let maps = MapSet::from_rows(&rows).unwrap();
    let config = SegmentationConfig::new()
        .with_clusters(2, 2)
        .with_data_type(DataType::Vector)
        .with_method(taahc());
    let result = segment_microstates(
        &maps,
        &[],
        &config,
        &mut StdRng::seed_from_u64(0),
        &NoProgress,
    );
    assert!(matches!(result, Err(Error::DimensionMismatch { .. })));
}

/// Ten samples per base, each a different monotone power of it.
fn warped_blocks() -> MapSet {
    let bases = [
        [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0],
        [8.0, 6.0, 4.0, 2.0, 1.0, 3.0, 5.0, 7.0],
        [4.0, 8.0, 1.0, 5.0, 2.0, 7.0, 3.0, 6.0],
    ];
    let rows: Vec<Vec<f64>> = (0..30)
        .map(|i| {
            let power = 1.0 + 0.5 * (i % 5) as f64;
            bases[i / 10].iter().map(|v: &f64| v.powf(power)).collect()
        })
        .collect();
    MapSet::from_rows(&rows).unwrap()
}

#[test]
fn test_rank_data_ignores_monotone_warping() {
    let maps = warped_blocks();
    let base = SegmentationConfig::new()
        .with_clusters(3, 3)
        .with_method(taahc());

    let ranked = segment_microstates(
        &maps,
        &[],
        &base.clone().with_rank_data(true),
        &mut StdRng::seed_from_u64(0),
        &NoProgress,
    )
    .unwrap();
    let row = ranked.optimal();
    assert_relative_eq!(row.gev, 1.0, epsilon = 1e-9);
    for block in 0..3 {
        let label = row.labeling.get(block * 10);
        assert!((block * 10..block * 10 + 10).all(|i| row.labeling.get(i) == label));
    }

    let raw = segment_microstates(
        &maps,
        &[],
        &base,
        &mut StdRng::seed_from_u64(0),
        &NoProgress,
    )
    .unwrap();
    assert!(raw.optimal().gev < 1.0 - 1e-6);
}

#[test]
fn test_positive_data_keeps_direct_polarity() {
    let rows: Vec<Vec<f64>> = (0..20)
        .map(|i| {
            if i < 10 {
                vec![1.0, 0.2, 0.0, 2.0]
            } else {
                vec![0.0, 2.0, 1.0, 0.1]
            }
        })
        .collect();
    let maps = MapSet::from_rows(&rows).unwrap();
    let config = SegmentationConfig::new()
        .with_clusters(2, 2)
        .with_data_type(DataType::Positive)
        .with_polarity(Polarity::Evaluate)
        .with_method(taahc());
    let output = segment_microstates(
        &maps,
        &[],
        &config,
        &mut StdRng::seed_from_u64(0),
        &NoProgress,
    )
    .unwrap();
    let labeling = &output.optimal().labeling;
    assert!((0..20).all(|i| labeling.sign(i) == Sign::Positive));
    assert_ne!(labeling.get(0), labeling.get(10));
}
