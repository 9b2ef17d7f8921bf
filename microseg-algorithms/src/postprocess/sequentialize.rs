//! Splits clusters into one cluster per contiguous run.

use microseg_core::labeling::{pack_labels, Labeling};
use microseg_core::map::MapSet;
use microseg_core::sample::SampleData;

use crate::centroid::{refresh_signs, CentroidBuilder};

/// Gives every contiguous run of a cluster (within an epoch) its own cluster.
///
/// Templates are recomputed from scratch. The new count is never lower than
/// the number of non-empty clusters before the call.
pub fn sequentialize(
    data: &SampleData,
    builder: &CentroidBuilder,
    templates: &mut MapSet,
    labeling: &mut Labeling,
) -> usize {
    let mut next = 0;
    for segment in labeling.segments() {
        if segment.cluster.is_none() {
            continue;
        }
        for i in segment.start..segment.end() {
            let sign = labeling.sign(i);
            labeling.set(i, next, sign);
        }
        next += 1;
    }

    *templates = builder.templates(data, labeling, next);
    refresh_signs(data, templates, labeling);
    pack_labels(templates, labeling)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::postprocess::tests::{fixture, labels};

    #[test]
    fn test_sequentialize_splits_runs() {
        let (data, mut templates, mut labeling) = fixture(&[0, 0, 1, 1, 0, 0, -1, 1]);
        let before = labeling.non_empty_clusters();
        let n = sequentialize(&data, &CentroidBuilder::default(), &mut templates, &mut labeling);
        assert_eq!(n, 4);
        assert!(n >= before);
        assert_eq!(labels(&labeling), vec![0, 0, 1, 1, 2, 2, -1, 3]);
        assert_eq!(templates.len(), 4);
    }

    #[test]
    fn test_sequentialize_respects_epochs() {
        let (data, mut templates, mut labeling) = fixture(&[0, 0, 0, 0, 0, 0, 0, 0]);
        let mut split = Labeling::with_epochs(&[4, 4]);
        split.index.copy_from_slice(&labeling.index);
        labeling = split;
        let n = sequentialize(&data, &CentroidBuilder::default(), &mut templates, &mut labeling);
        assert_eq!(n, 2);
        assert_eq!(labels(&labeling), vec![0, 0, 0, 0, 1, 1, 1, 1]);
    }
}
