//! Input samples prepared for clustering.
#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

use crate::error::{Error, Result};
use crate::map::{centered_power, dot, DataType, MapSet, Polarity, Sign};

/// The data map set as seen by the clustering algorithms.
///
/// Maps are normalized (centered for scalar data, unit norm) so that the
/// correlation of two maps is their dot product. The squared norm of every
/// original map is kept as its weight in explained variance.
#[derive(Debug, Clone)]
pub struct SampleData {
    maps: MapSet,
    weights: Vec<f64>,
    data_type: DataType,
    polarity: Polarity,
    epochs: Vec<usize>,
}

impl SampleData {
    /// Prepares raw maps for clustering.
    ///
    /// `epoch_lengths` lists the length of every concatenated input file; an
    /// empty slice means a single epoch spanning all samples. When `rank` is
    /// set each map is rank-transformed before normalization.
    pub fn new(
        raw: &MapSet,
        data_type: DataType,
        polarity: Polarity,
        epoch_lengths: &[usize],
        rank: bool,
    ) -> Result<Self> {
        if raw.is_empty() {
            return Err(Error::EmptyInput);
        }
        if data_type == DataType::Vector && raw.dim() % 3 != 0 {
            return Err(Error::DimensionMismatch {
                expected: raw.dim().next_multiple_of(3),
                actual: raw.dim(),
                context: "vector data",
            });
        }

        let epochs = if epoch_lengths.is_empty() {
            vec![raw.len()]
        } else {
            let total: usize = epoch_lengths.iter().sum();
            if total != raw.len() || epoch_lengths.contains(&0) {
                return Err(Error::EpochMismatch {
                    epochs: total,
                    samples: raw.len(),
                });
            }
            epoch_lengths.to_vec()
        };

        let weights = raw.iter().map(|m| centered_power(m, data_type)).collect();
        let mut maps = raw.clone();
        if rank {
            maps.rank(data_type);
        }
        maps.normalize(data_type);

        Ok(Self {
            maps,
            weights,
            data_type,
            polarity: data_type.effective_polarity(polarity),
            epochs,
        })
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.maps.len()
    }

    /// Returns true if there are no samples.
    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    /// Dimension of every map.
    pub fn dim(&self) -> usize {
        self.maps.dim()
    }

    /// Normalized maps.
    pub fn maps(&self) -> &MapSet {
        &self.maps
    }

    /// Normalized map `i`.
    pub fn map(&self, i: usize) -> &[f64] {
        self.maps.map(i)
    }

    /// Squared norm of original map `i`.
    pub fn weight(&self, i: usize) -> f64 {
        self.weights[i]
    }

    /// All squared norms.
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Data type of the maps.
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Polarity rule in force for these data.
    pub fn polarity(&self) -> Polarity {
        self.polarity
    }

    /// Lengths of the concatenated epochs.
    pub fn epoch_lengths(&self) -> &[usize] {
        &self.epochs
    }

    /// Polarity-aware correlation of sample `i` with a normalized template.
    pub fn correlation(&self, i: usize, template: &[f64]) -> (f64, Sign) {
        let r = dot(self.map(i), template);
        match self.polarity {
            Polarity::Evaluate => (r.abs(), Sign::of(r)),
            Polarity::Direct => (r, Sign::Positive),
        }
    }

    /// Best template for sample `i` among `templates`.
    ///
    /// Returns `(index, correlation, sign)`; ties keep the lowest index.
    pub fn best_template(&self, i: usize, templates: &MapSet) -> Option<(usize, f64, Sign)> {
        let mut best: Option<(usize, f64, Sign)> = None;
        for (k, template) in templates.iter().enumerate() {
            let (r, sign) = self.correlation(i, template);
            if best.map_or(true, |(_, b, _)| r > b) {
                best = Some((k, r, sign));
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_sample_data_weights_and_normalization() {
        let raw = MapSet::from_rows(&[vec![1.0, -1.0, 0.0], vec![2.0, 0.0, -2.0]]).unwrap();
        let data = SampleData::new(&raw, DataType::Scalar, Polarity::Evaluate, &[], false).unwrap();
        assert_eq!(data.len(), 2);
        assert_relative_eq!(data.weight(0), 2.0);
        assert_relative_eq!(data.weight(1), 8.0);
        assert_relative_eq!(crate::map::norm(data.map(1)), 1.0, epsilon = 1e-12);
        assert_eq!(data.epoch_lengths(), &[2]);
    }

    #[test]
    fn test_sample_data_rejects_bad_epochs() {
        let raw = MapSet::from_rows(&[vec![1.0, -1.0], vec![2.0, -2.0]]).unwrap();
        let err = SampleData::new(&raw, DataType::Scalar, Polarity::Direct, &[1, 2], false);
        assert_eq!(
            err.unwrap_err(),
            Error::EpochMismatch {
                epochs: 3,
                samples: 2
            }
        );
        let empty = MapSet::new(2);
        assert_eq!(
            SampleData::new(&empty, DataType::Scalar, Polarity::Direct, &[], false).unwrap_err(),
            Error::EmptyInput
        );
    }

    #[test]
    fn test_best_template_uses_polarity() {
        let raw = MapSet::from_rows(&[vec![1.0, -1.0]]).unwrap();
        let templates = MapSet::from_rows(&[vec![0.0, 0.0], vec![-0.5f64.sqrt(), 0.5f64.sqrt()]])
            .unwrap();
        let data = SampleData::new(&raw, DataType::Scalar, Polarity::Evaluate, &[], false).unwrap();
        let (k, r, sign) = data.best_template(0, &templates).unwrap();
        assert_eq!(k, 1);
        assert_relative_eq!(r, 1.0, epsilon = 1e-12);
        assert_eq!(sign, Sign::Negative);
    }

    #[test]
    fn test_vector_data_needs_whole_points() {
        let raw = MapSet::from_rows(&[vec![1.0, 0.0, 0.0, 0.0, 2.0, 0.0]]).unwrap();
        let data = SampleData::new(&raw, DataType::Vector, Polarity::Evaluate, &[], false).unwrap();
        // No centering: the norm is taken on the raw components.
        assert_relative_eq!(data.weight(0), 5.0);
        assert_eq!(data.polarity(), Polarity::Evaluate);

        let raw = MapSet::from_rows(&[vec![1.0, 0.0, 0.0, 0.0]]).unwrap();
        assert!(matches!(
            SampleData::new(&raw, DataType::Vector, Polarity::Evaluate, &[], false),
            Err(Error::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_positive_data_forces_direct_polarity() {
        let raw = MapSet::from_rows(&[vec![1.0, 2.0, 3.0]]).unwrap();
        let data = SampleData::new(&raw, DataType::Positive, Polarity::Evaluate, &[], false).unwrap();
        assert_eq!(data.polarity(), Polarity::Direct);
    }

    #[test]
    fn test_rank_transform_is_scale_free() {
        let raw = MapSet::from_rows(&[vec![1.0, 4.0, 9.0, 16.0], vec![1.0, 2.0, 3.0, 4.0]]).unwrap();
        let data = SampleData::new(&raw, DataType::Scalar, Polarity::Direct, &[], true).unwrap();
        for (a, b) in data.map(0).iter().zip(data.map(1)) {
            assert_relative_eq!(*a, *b, epsilon = 1e-12);
        }
        // Weights keep the raw power.
        assert!(data.weight(0) > data.weight(1));
    }
}
