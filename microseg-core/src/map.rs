//! Spatial maps, map sets and polarity-aware correlation.
//!
//! A map is one spatial sample: a vector over electrodes, or over solution
//! points with three components each. A [`MapSet`] stores `N` maps of the
//! same dimension contiguously, one row per map.
#![allow(
    clippy::cast_precision_loss,
    clippy::must_use_candidate,
    clippy::missing_errors_doc
)]

use crate::error::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Smallest norm or denominator considered non-zero.
pub const EPSILON: f64 = 1e-12;

/// Kind of values carried by the maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum DataType {
    /// Signed, average-referenced values (EEG). Correlation is centered.
    #[default]
    Scalar,
    /// Non-negative values. Polarity is never inverted.
    Positive,
    /// Three components per solution point.
    Vector,
}

impl DataType {
    /// Whether maps are centered (average reference) before correlation.
    pub fn is_centered(self) -> bool {
        matches!(self, DataType::Scalar)
    }

    /// Factor applied to squared distances relative to scalar data.
    pub fn distance_scale(self) -> f64 {
        match self {
            DataType::Vector => 3.0,
            DataType::Scalar | DataType::Positive => 1.0,
        }
    }

    /// Degrees of freedom of a single map of dimension `dim`.
    pub fn degrees_of_freedom(self, dim: usize) -> usize {
        match self {
            DataType::Scalar => dim.saturating_sub(1).max(1),
            DataType::Positive | DataType::Vector => dim.max(1),
        }
    }

    /// The polarity actually usable with this data type.
    pub fn effective_polarity(self, polarity: Polarity) -> Polarity {
        match self {
            DataType::Positive => Polarity::Direct,
            DataType::Scalar | DataType::Vector => polarity,
        }
    }
}

/// Whether map polarity is significant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Polarity {
    /// Sign is fixed: a map and its inverse are different topographies.
    Direct,
    /// Sign is free: each assignment picks the sign maximizing correlation.
    #[default]
    Evaluate,
}

/// Sign of a sample relative to its assigned template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Sign {
    #[default]
    Positive,
    Negative,
}

impl Sign {
    /// Sign of a real value, zero counting as positive.
    pub fn of(value: f64) -> Self {
        if value < 0.0 {
            Sign::Negative
        } else {
            Sign::Positive
        }
    }

    /// `1.0` or `-1.0`.
    pub fn factor(self) -> f64 {
        match self {
            Sign::Positive => 1.0,
            Sign::Negative => -1.0,
        }
    }

    /// Product of two signs.
    #[must_use]
    pub fn combine(self, other: Sign) -> Sign {
        if self == other {
            Sign::Positive
        } else {
            Sign::Negative
        }
    }
}

/// Dot product of two equally sized slices.
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Euclidean norm.
pub fn norm(a: &[f64]) -> f64 {
    dot(a, a).sqrt()
}

fn mean(a: &[f64]) -> f64 {
    if a.is_empty() {
        0.0
    } else {
        a.iter().sum::<f64>() / a.len() as f64
    }
}

/// Signed correlation between two maps.
///
/// Scalar data use the centered (Pearson) form, the other types the
/// uncentered cosine. Returns `0.0` when either map has zero norm.
pub fn correlation(a: &[f64], b: &[f64], data_type: DataType) -> f64 {
    let (ma, mb) = if data_type.is_centered() {
        (mean(a), mean(b))
    } else {
        (0.0, 0.0)
    };
    let mut ab = 0.0;
    let mut aa = 0.0;
    let mut bb = 0.0;
    for (x, y) in a.iter().zip(b) {
        let x = x - ma;
        let y = y - mb;
        ab += x * y;
        aa += x * x;
        bb += y * y;
    }
    let denom = (aa * bb).sqrt();
    if denom < EPSILON {
        0.0
    } else {
        (ab / denom).clamp(-1.0, 1.0)
    }
}

/// Applies the polarity rule to a signed correlation.
///
/// With [`Polarity::Evaluate`] the absolute value is returned together with
/// the sign that produced it; with [`Polarity::Direct`] the value is returned
/// unchanged with a positive sign.
pub fn polarize(corr: f64, polarity: Polarity) -> (f64, Sign) {
    match polarity {
        Polarity::Evaluate => (corr.abs(), Sign::of(corr)),
        Polarity::Direct => (corr, Sign::Positive),
    }
}

/// Polarity-aware correlation between two maps.
pub fn polarized_correlation(
    a: &[f64],
    b: &[f64],
    data_type: DataType,
    polarity: Polarity,
) -> (f64, Sign) {
    polarize(
        correlation(a, b, data_type),
        data_type.effective_polarity(polarity),
    )
}

/// Centers (scalar data) and scales a map to unit norm in place.
///
/// A map with zero norm becomes all zeros.
pub fn normalize_in_place(values: &mut [f64], data_type: DataType) {
    if data_type.is_centered() {
        let m = mean(values);
        values.iter_mut().for_each(|v| *v -= m);
    }
    let n = norm(values);
    if n < EPSILON {
        values.iter_mut().for_each(|v| *v = 0.0);
    } else {
        values.iter_mut().for_each(|v| *v /= n);
    }
}

/// Squared norm after centering (scalar data), i.e. `D · GFP²`.
pub fn centered_power(values: &[f64], data_type: DataType) -> f64 {
    if data_type.is_centered() {
        let m = mean(values);
        values.iter().map(|v| (v - m) * (v - m)).sum()
    } else {
        dot(values, values)
    }
}

/// Replaces values by their fractional ranks in `(0, 1]`, ties averaged.
///
/// Vector data rank the norm of each 3-component point and rescale the point
/// to that rank, keeping its orientation.
pub fn rank_in_place(values: &mut [f64], data_type: DataType) {
    match data_type {
        DataType::Vector => {
            let magnitudes: Vec<f64> = values.chunks(3).map(norm).collect();
            let ranks = fractional_ranks(&magnitudes);
            for (point, rank) in values.chunks_mut(3).zip(ranks) {
                let n = norm(point);
                if n >= EPSILON {
                    point.iter_mut().for_each(|v| *v *= rank / n);
                }
            }
        }
        DataType::Scalar | DataType::Positive => {
            let ranks = fractional_ranks(values);
            values.copy_from_slice(&ranks);
        }
    }
}

fn fractional_ranks(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
    let mut ranks = vec![0.0; n];
    let mut i = 0;
    while i < n {
        let mut j = i + 1;
        while j < n && values[order[j]] == values[order[i]] {
            j += 1;
        }
        // Ranks are 1-based, ties share the average rank of the run.
        let rank = (i + j + 1) as f64 / 2.0 / n as f64;
        for &idx in &order[i..j] {
            ranks[idx] = rank;
        }
        i = j;
    }
    ranks
}

/// A single owned map.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Map {
    values: Vec<f64>,
}

impl Map {
    /// Wraps a vector of values.
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }

    /// All-zero map of the given dimension.
    pub fn zeros(dim: usize) -> Self {
        Self {
            values: vec![0.0; dim],
        }
    }

    /// Number of components.
    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Component values.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Mutable component values.
    pub fn values_mut(&mut self) -> &mut [f64] {
        &mut self.values
    }

    /// Euclidean norm.
    pub fn norm(&self) -> f64 {
        norm(&self.values)
    }

    /// Centers (scalar data) and scales to unit norm.
    pub fn normalize(&mut self, data_type: DataType) {
        normalize_in_place(&mut self.values, data_type);
    }

    /// Consumes the map, returning its values.
    pub fn into_values(self) -> Vec<f64> {
        self.values
    }
}

impl From<Vec<f64>> for Map {
    fn from(values: Vec<f64>) -> Self {
        Self::new(values)
    }
}

impl AsRef<[f64]> for Map {
    fn as_ref(&self) -> &[f64] {
        &self.values
    }
}

/// An ordered collection of maps sharing one dimension.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MapSet {
    dim: usize,
    values: Vec<f64>,
}

impl MapSet {
    /// Creates an empty set of maps of dimension `dim`.
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            values: Vec::new(),
        }
    }

    /// Creates an empty set with room for `capacity` maps.
    pub fn with_capacity(dim: usize, capacity: usize) -> Self {
        Self {
            dim,
            values: Vec::with_capacity(dim * capacity),
        }
    }

    /// `len` all-zero maps.
    pub fn zeros(len: usize, dim: usize) -> Self {
        Self {
            dim,
            values: vec![0.0; len * dim],
        }
    }

    /// Builds a set from row-major values.
    pub fn from_flat(dim: usize, values: Vec<f64>) -> Result<Self> {
        if dim == 0 || values.len() % dim != 0 {
            return Err(Error::DimensionMismatch {
                expected: dim,
                actual: values.len(),
                context: "flat map values",
            });
        }
        Ok(Self { dim, values })
    }

    /// Builds a set from one vector per map.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        let dim = rows.first().map_or(0, Vec::len);
        let mut set = Self::with_capacity(dim, rows.len());
        for row in rows {
            if row.len() != dim {
                return Err(Error::DimensionMismatch {
                    expected: dim,
                    actual: row.len(),
                    context: "map rows",
                });
            }
            set.values.extend_from_slice(row);
        }
        Ok(set)
    }

    /// Number of maps.
    pub fn len(&self) -> usize {
        if self.dim == 0 {
            0
        } else {
            self.values.len() / self.dim
        }
    }

    /// Returns true if the set holds no maps.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Dimension of every map.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Borrow map `i`.
    pub fn map(&self, i: usize) -> &[f64] {
        &self.values[i * self.dim..(i + 1) * self.dim]
    }

    /// Mutably borrow map `i`.
    pub fn map_mut(&mut self, i: usize) -> &mut [f64] {
        let dim = self.dim;
        &mut self.values[i * dim..(i + 1) * dim]
    }

    /// Appends a map.
    pub fn push(&mut self, map: &[f64]) {
        debug_assert_eq!(map.len(), self.dim);
        self.values.extend_from_slice(map);
    }

    /// Iterates over the maps in order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &[f64]> + '_ {
        self.values.chunks_exact(self.dim.max(1))
    }

    /// All values, row-major.
    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    /// Norm of every map.
    pub fn norms(&self) -> Vec<f64> {
        self.iter().map(norm).collect()
    }

    /// Normalizes every map in place.
    pub fn normalize(&mut self, data_type: DataType) {
        let dim = self.dim.max(1);
        self.values
            .chunks_exact_mut(dim)
            .for_each(|m| normalize_in_place(m, data_type));
    }

    /// Rank-transforms every map in place.
    pub fn rank(&mut self, data_type: DataType) {
        let dim = self.dim.max(1);
        self.values
            .chunks_exact_mut(dim)
            .for_each(|m| rank_in_place(m, data_type));
    }

    /// New set made of the given maps, in the given order.
    #[must_use]
    pub fn select(&self, indices: &[usize]) -> Self {
        let mut set = Self::with_capacity(self.dim, indices.len());
        for &i in indices {
            set.push(self.map(i));
        }
        set
    }

    /// Keeps the first `len` maps.
    pub fn truncate(&mut self, len: usize) {
        self.values.truncate(len * self.dim);
    }

    /// Inverts the sign of map `i`.
    pub fn invert(&mut self, i: usize) {
        self.map_mut(i).iter_mut().for_each(|v| *v = -*v);
    }
}
