//! microseg CLI - Command-line interface for microstate segmentation.
//!
//! Reads a JSON sample matrix, runs the segmentation sweep and writes the
//! result table as JSON.
#![allow(
    clippy::uninlined_format_args,
    clippy::cast_precision_loss,
    clippy::too_many_lines
)]

use clap::{Parser, Subcommand, ValueEnum};

use microseg_algorithms::{
    segment_microstates, ClusteringMethod, KMeansConfig, Progress, SegmentationConfig,
    SegmentationOutput, TaahcConfig,
};
use microseg_core::config::SmallSegmentPolicy;
use microseg_core::map::{DataType, MapSet, Polarity};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Segmentation error: {0}")]
    Core(#[from] microseg_core::Error),
}

/// Clustering algorithm selection.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Algorithm {
    /// Randomized K-Means with restarts
    Kmeans,
    /// Topographic Atomize and Agglomerate Hierarchical Clustering
    Taahc,
}

/// Data type of the input maps.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum InputType {
    /// Signed, average-referenced values
    Scalar,
    /// Non-negative values
    Positive,
    /// Three components per solution point
    Vector,
}

impl From<InputType> for DataType {
    fn from(value: InputType) -> Self {
        match value {
            InputType::Scalar => DataType::Scalar,
            InputType::Positive => DataType::Positive,
            InputType::Vector => DataType::Vector,
        }
    }
}

/// Microstate segmentation of spatial map sequences.
#[derive(Parser)]
#[command(name = "microseg")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Segment a JSON sample matrix
    Segment {
        /// Input JSON file: a matrix, or {"samples": [...], "epochs": [...]}
        input: PathBuf,

        /// Output JSON file
        #[arg(short, long)]
        output: PathBuf,

        /// JSON configuration file; flags below override it
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Clustering algorithm to use
        #[arg(short, long, value_enum)]
        algorithm: Option<Algorithm>,

        /// Data type of the maps
        #[arg(long, value_enum)]
        data_type: Option<InputType>,

        /// Keep the map polarity fixed
        #[arg(long)]
        direct_polarity: bool,

        /// Smallest cluster count
        #[arg(long)]
        min_clusters: Option<usize>,

        /// Largest cluster count
        #[arg(long)]
        max_clusters: Option<usize>,

        /// K-Means random restarts
        #[arg(long)]
        trials: Option<usize>,

        /// Reject runs of at most this many samples
        #[arg(long)]
        reject_small: Option<usize>,

        /// Seed of the random source
        #[arg(long, default_value = "0")]
        seed: u64,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Show information about an input file
    Info {
        /// Input JSON file
        input: PathBuf,
    },

    /// Benchmark both clustering algorithms
    Benchmark {
        /// Input JSON file
        input: PathBuf,

        /// Cluster count
        #[arg(short, long, default_value = "4")]
        clusters: usize,

        /// Number of iterations
        #[arg(short, long, default_value = "3")]
        iterations: usize,
    },
}

/// Accepted input layouts.
#[derive(Deserialize)]
#[serde(untagged)]
enum InputFile {
    Matrix(Vec<Vec<f64>>),
    Document {
        samples: Vec<Vec<f64>>,
        #[serde(default)]
        epochs: Vec<usize>,
    },
}

/// Samples and epoch lengths read from disk.
struct Input {
    maps: MapSet,
    epochs: Vec<usize>,
}

fn read_input(path: &Path) -> Result<Input> {
    let reader = BufReader::new(File::open(path)?);
    let (samples, epochs) = match serde_json::from_reader(reader)? {
        InputFile::Matrix(samples) => (samples, Vec::new()),
        InputFile::Document { samples, epochs } => (samples, epochs),
    };
    let maps = MapSet::from_rows(&samples)?;
    Ok(Input { maps, epochs })
}

fn read_config(path: Option<&Path>) -> Result<SegmentationConfig> {
    match path {
        Some(path) => {
            let reader = BufReader::new(File::open(path)?);
            Ok(serde_json::from_reader(reader)?)
        }
        None => Ok(SegmentationConfig::default()),
    }
}

fn write_output(path: &Path, output: &SegmentationOutput) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, output)?;
    writer.flush()?;
    Ok(())
}

/// Prints the sweep progress on stderr.
struct StderrProgress {
    verbose: bool,
}

impl Progress for StderrProgress {
    fn advance(&self, completed: usize, total: usize) {
        if self.verbose {
            eprintln!("  {}/{} cluster counts done", completed, total);
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Segment {
            input,
            output,
            config,
            algorithm,
            data_type,
            direct_polarity,
            min_clusters,
            max_clusters,
            trials,
            reject_small,
            seed,
            verbose,
        } => {
            let mut config = read_config(config.as_deref())?;
            match algorithm {
                Some(Algorithm::Kmeans) => {
                    config.method = ClusteringMethod::KMeans(KMeansConfig::default());
                }
                Some(Algorithm::Taahc) => {
                    config.method = ClusteringMethod::Taahc(TaahcConfig::default());
                }
                None => {}
            }
            if let (Some(trials), ClusteringMethod::KMeans(kmeans)) = (trials, &mut config.method) {
                kmeans.num_random_trials = trials;
            }
            if let Some(data_type) = data_type {
                config.data_type = data_type.into();
            }
            if direct_polarity {
                config.polarity = Polarity::Direct;
            }
            if let Some(min) = min_clusters {
                config.min_clusters = min;
            }
            if let Some(max) = max_clusters {
                config.max_clusters = max;
            }
            if let Some(size) = reject_small {
                config.post.reject_small_segments = Some(size);
                config.post.small_segment_policy = SmallSegmentPolicy::Reassign;
            }

            let data = read_input(&input)?;
            if verbose {
                eprintln!("Segmenting {} samples of dimension {}", data.maps.len(), data.maps.dim());
                eprintln!("Algorithm: {}", config.method.name());
                eprintln!("Clusters: {}..={}", config.min_clusters, config.max_clusters);
            }

            let start = Instant::now();
            let mut rng = StdRng::seed_from_u64(seed);
            let result = segment_microstates(
                &data.maps,
                &data.epochs,
                &config,
                &mut rng,
                &StderrProgress { verbose },
            )?;
            let elapsed = start.elapsed();

            write_output(&output, &result)?;
            log::info!("wrote {} rows to {}", result.results.len(), output.display());

            println!("Segmented in {:.2}s", elapsed.as_secs_f64());
            println!(
                "{:<10} | {:<10} | {:<10} | {:<10}",
                "Clusters", "Achieved", "GEV", "Score"
            );
            println!("{:-<49}", "");
            for row in &result.results {
                println!(
                    "{:<10} | {:<10} | {:<10.4} | {:<10.4}",
                    row.requested, row.achieved, row.gev, row.meta_score
                );
            }
            println!("Optimal clusters: {}", result.optimal_clusters);
        }

        Commands::Info { input } => {
            let data = read_input(&input)?;
            println!("File: {}", input.display());
            println!("Samples: {}", data.maps.len());
            println!("Dimension: {}", data.maps.dim());
            if data.epochs.is_empty() {
                println!("Epochs: 1");
            } else {
                println!("Epochs: {} ({:?})", data.epochs.len(), data.epochs);
            }
            let norms = data.maps.norms();
            if let (Some(min), Some(max)) = (
                norms.iter().copied().reduce(f64::min),
                norms.iter().copied().reduce(f64::max),
            ) {
                println!("Map norm range: {:.4} - {:.4}", min, max);
            }
        }

        Commands::Benchmark {
            input,
            clusters,
            iterations,
        } => {
            let data = read_input(&input)?;
            println!(
                "Benchmarking with {} samples, {} clusters, {} iterations",
                data.maps.len(),
                clusters,
                iterations
            );
            println!(
                "{:<10} | {:<15} | {:<15} | {:<15}",
                "Algorithm", "Mean Time (ms)", "Min Time (ms)", "Max Time (ms)"
            );
            println!("{:-<65}", "");

            let methods = [
                ClusteringMethod::KMeans(KMeansConfig::default()),
                ClusteringMethod::Taahc(TaahcConfig::default()),
            ];
            for method in methods {
                let config = SegmentationConfig::default()
                    .with_clusters(clusters, clusters)
                    .with_method(method.clone());
                let mut times = Vec::with_capacity(iterations);
                for iteration in 0..iterations {
                    let start = Instant::now();
                    let mut rng = StdRng::seed_from_u64(iteration as u64);
                    segment_microstates(
                        &data.maps,
                        &data.epochs,
                        &config,
                        &mut rng,
                        &StderrProgress { verbose: false },
                    )?;
                    times.push(start.elapsed().as_secs_f64() * 1000.0);
                }

                let min_time = times.iter().fold(f64::INFINITY, |a, &b| a.min(b));
                let max_time = times.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
                let mean_time = times.iter().sum::<f64>() / times.len().max(1) as f64;

                println!(
                    "{:<10} | {:<15.2} | {:<15.2} | {:<15.2}",
                    method.name(),
                    mean_time,
                    min_time,
                    max_time
                );
            }
        }
    }

    Ok(())
}
