//! Per-sample cluster assignments.
//!
//! A [`Labeling`] stores, for every time sample, a cluster index (or
//! [`UNDEFINED`]) and the sign of the sample relative to its template, in
//! parallel vectors. Samples may come from several concatenated epochs; runs
//! of equal labels never cross an epoch boundary.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::must_use_candidate
)]

use std::ops::Range;

use crate::map::{MapSet, Sign};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Cluster index of a sample that belongs to no cluster.
pub const UNDEFINED: i32 = -1;

/// A maximal run of consecutive samples sharing one label within an epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// First sample of the run.
    pub start: usize,
    /// Number of samples.
    pub len: usize,
    /// Cluster of the run, `None` for undefined samples.
    pub cluster: Option<usize>,
    /// Epoch the run belongs to.
    pub epoch: usize,
}

impl Segment {
    /// One past the last sample.
    pub fn end(&self) -> usize {
        self.start + self.len
    }
}

/// Cluster index and sign for every sample.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Labeling {
    /// Cluster index per sample, [`UNDEFINED`] when unassigned.
    pub index: Vec<i32>,
    /// Sign of each sample relative to its template.
    pub sign: Vec<Sign>,
    epochs: Vec<usize>,
}

impl Labeling {
    /// Creates an all-undefined labeling spanning one epoch.
    pub fn new(len: usize) -> Self {
        Self::with_epochs(&[len])
    }

    /// Creates an all-undefined labeling over consecutive epochs.
    pub fn with_epochs(epoch_lengths: &[usize]) -> Self {
        let len = epoch_lengths.iter().sum();
        Self {
            index: vec![UNDEFINED; len],
            sign: vec![Sign::Positive; len],
            epochs: epoch_lengths.iter().copied().filter(|&l| l > 0).collect(),
        }
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Returns true if the labeling covers no samples.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Cluster of sample `i`.
    pub fn get(&self, i: usize) -> Option<usize> {
        let c = self.index[i];
        (c >= 0).then_some(c as usize)
    }

    /// Sign of sample `i`.
    pub fn sign(&self, i: usize) -> Sign {
        self.sign[i]
    }

    /// Assigns sample `i`.
    pub fn set(&mut self, i: usize, cluster: usize, sign: Sign) {
        self.index[i] = cluster as i32;
        self.sign[i] = sign;
    }

    /// Marks sample `i` as undefined.
    pub fn unset(&mut self, i: usize) {
        self.index[i] = UNDEFINED;
        self.sign[i] = Sign::Positive;
    }

    /// Returns true if sample `i` has no cluster.
    pub fn is_undefined(&self, i: usize) -> bool {
        self.index[i] < 0
    }

    /// Marks every sample undefined.
    pub fn clear(&mut self) {
        self.index.fill(UNDEFINED);
        self.sign.fill(Sign::Positive);
    }

    /// Lengths of the epochs.
    pub fn epoch_lengths(&self) -> &[usize] {
        &self.epochs
    }

    /// Sample ranges of the epochs.
    pub fn epochs(&self) -> impl Iterator<Item = Range<usize>> + '_ {
        self.epochs.iter().scan(0, |start, &len| {
            let range = *start..*start + len;
            *start += len;
            Some(range)
        })
    }

    /// Highest assigned cluster index plus one.
    pub fn cluster_count(&self) -> usize {
        self.index
            .iter()
            .copied()
            .max()
            .map_or(0, |m| (m + 1).max(0) as usize)
    }

    /// Number of samples assigned to a cluster.
    pub fn num_defined(&self) -> usize {
        self.index.iter().filter(|&&c| c >= 0).count()
    }

    /// Number of samples in each of the first `num_clusters` clusters.
    pub fn member_counts(&self, num_clusters: usize) -> Vec<usize> {
        let mut counts = vec![0; num_clusters];
        for &c in &self.index {
            if c >= 0 && (c as usize) < num_clusters {
                counts[c as usize] += 1;
            }
        }
        counts
    }

    /// Number of clusters with at least one sample.
    pub fn non_empty_clusters(&self) -> usize {
        self.member_counts(self.cluster_count())
            .iter()
            .filter(|&&n| n > 0)
            .count()
    }

    /// Sample indices per cluster, for the first `num_clusters` clusters.
    pub fn members(&self, num_clusters: usize) -> Vec<Vec<usize>> {
        let mut members = vec![Vec::new(); num_clusters];
        for (i, &c) in self.index.iter().enumerate() {
            if c >= 0 && (c as usize) < num_clusters {
                members[c as usize].push(i);
            }
        }
        members
    }

    /// Number of samples of `cluster` with the given sign.
    pub fn count_with_sign(&self, cluster: usize, sign: Sign) -> usize {
        self.index
            .iter()
            .zip(&self.sign)
            .filter(|&(&c, &s)| c == cluster as i32 && s == sign)
            .count()
    }

    /// Runs of equal labels, epoch by epoch, undefined runs included.
    pub fn segments(&self) -> Vec<Segment> {
        let mut segments = Vec::new();
        for (epoch, range) in self.epochs().enumerate() {
            let mut start = range.start;
            for i in range.start + 1..=range.end {
                if i == range.end || self.index[i] != self.index[start] {
                    segments.push(Segment {
                        start,
                        len: i - start,
                        cluster: self.get(start),
                        epoch,
                    });
                    start = i;
                }
            }
        }
        segments
    }

    /// Renumbers clusters through `mapping` (old index to new index).
    ///
    /// Samples whose cluster maps to `None` become undefined.
    pub fn remap(&mut self, mapping: &[Option<usize>]) {
        for (c, s) in self.index.iter_mut().zip(self.sign.iter_mut()) {
            if *c >= 0 {
                match mapping.get(*c as usize).copied().flatten() {
                    Some(new) => *c = new as i32,
                    None => {
                        *c = UNDEFINED;
                        *s = Sign::Positive;
                    }
                }
            }
        }
    }
}

/// Drops clusters without samples and renumbers the rest from zero.
///
/// Surviving clusters keep their relative order; the template of every dropped
/// cluster is removed. Labels pointing past the template set are undefined
/// afterwards. Returns the new number of clusters.
pub fn pack_labels(templates: &mut MapSet, labeling: &mut Labeling) -> usize {
    let num_clusters = templates.len();
    let counts = labeling.member_counts(num_clusters);

    let mut mapping = vec![None; labeling.cluster_count().max(num_clusters)];
    let mut kept = Vec::with_capacity(num_clusters);
    for (old, &count) in counts.iter().enumerate() {
        if count > 0 {
            mapping[old] = Some(kept.len());
            kept.push(old);
        }
    }

    if kept.len() != num_clusters {
        *templates = templates.select(&kept);
    }
    labeling.remap(&mapping);
    kept.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labeling_from(indices: &[i32]) -> Labeling {
        let mut labeling = Labeling::new(indices.len());
        labeling.index.copy_from_slice(indices);
        labeling
    }

    #[test]
    fn test_labeling_operations() {
        let mut labeling = Labeling::new(4);
        assert!(labeling.get(0).is_none());
        labeling.set(0, 2, Sign::Negative);
        labeling.set(1, 0, Sign::Positive);
        assert_eq!(labeling.get(0), Some(2));
        assert_eq!(labeling.sign(0), Sign::Negative);
        assert_eq!(labeling.cluster_count(), 3);
        assert_eq!(labeling.non_empty_clusters(), 2);
        assert_eq!(labeling.num_defined(), 2);
        assert_eq!(labeling.count_with_sign(2, Sign::Negative), 1);

        labeling.unset(0);
        assert!(labeling.is_undefined(0));
        assert_eq!(labeling.sign(0), Sign::Positive);
    }

    #[test]
    fn test_segments_respect_epochs() {
        let mut labeling = Labeling::with_epochs(&[3, 3]);
        labeling.index.copy_from_slice(&[0, 0, 1, 1, 1, -1]);
        let segments = labeling.segments();
        let summary: Vec<_> = segments
            .iter()
            .map(|s| (s.start, s.len, s.cluster, s.epoch))
            .collect();
        assert_eq!(
            summary,
            vec![
                (0, 2, Some(0), 0),
                (2, 1, Some(1), 0),
                (3, 2, Some(1), 1),
                (5, 1, None, 1),
            ]
        );
    }

    #[test]
    fn test_pack_labels_preserves_order_and_is_idempotent() {
        let mut templates =
            MapSet::from_rows(&[vec![0.0], vec![1.0], vec![2.0], vec![3.0]]).unwrap();
        let mut labeling = labeling_from(&[3, 3, -1, 1, 1]);

        let n = pack_labels(&mut templates, &mut labeling);
        assert_eq!(n, 2);
        assert_eq!(labeling.index, vec![1, 1, -1, 0, 0]);
        assert_eq!(templates.map(0), &[1.0]);
        assert_eq!(templates.map(1), &[3.0]);

        let (t1, l1) = (templates.clone(), labeling.clone());
        let n2 = pack_labels(&mut templates, &mut labeling);
        assert_eq!(n2, n);
        assert_eq!(templates, t1);
        assert_eq!(labeling, l1);
    }
}
