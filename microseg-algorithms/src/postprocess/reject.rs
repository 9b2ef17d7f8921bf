//! Rejection of samples that fit their template poorly.

use microseg_core::labeling::{pack_labels, Labeling};
use microseg_core::map::MapSet;
use microseg_core::sample::SampleData;

use crate::centroid::{refresh_signs, CentroidBuilder};

/// Marks undefined every sample whose best-sign correlation with its
/// template is below `threshold`, then recomputes the templates from the
/// surviving samples.
///
/// Only labels change; clusters left without samples are packed away.
pub fn reject_low_correlation(
    data: &SampleData,
    builder: &CentroidBuilder,
    threshold: f64,
    templates: &mut MapSet,
    labeling: &mut Labeling,
) -> usize {
    let mut rejected = 0usize;
    for i in 0..labeling.len() {
        let Some(c) = labeling.get(i) else {
            continue;
        };
        let (r, _) = data.correlation(i, templates.map(c));
        if r < threshold {
            labeling.unset(i);
            rejected += 1;
        }
    }
    log::trace!("rejected {rejected} samples below correlation {threshold}");

    *templates = builder.templates(data, labeling, templates.len());
    refresh_signs(data, templates, labeling);
    pack_labels(templates, labeling)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::postprocess::tests::{fixture, labels};

    #[test]
    fn test_reject_marks_outliers_undefined() {
        // Sample 6 holds a third topography but is labeled with cluster 1.
        let (data, mut templates, mut labeling) = fixture(&[0, 0, 1, 1, 0, 0, 1, 1]);
        let n = reject_low_correlation(
            &data,
            &CentroidBuilder::default(),
            0.7,
            &mut templates,
            &mut labeling,
        );
        assert_eq!(n, 2);
        assert_eq!(labels(&labeling), vec![0, 0, 1, 1, 0, 0, -1, 1]);
    }

    #[test]
    fn test_reject_keeps_undefined_samples() {
        let (data, mut templates, mut labeling) = fixture(&[0, 0, -1, -1, 0, 0, -1, -1]);
        let n = reject_low_correlation(
            &data,
            &CentroidBuilder::default(),
            0.5,
            &mut templates,
            &mut labeling,
        );
        assert_eq!(n, 1);
        assert_eq!(labels(&labeling), vec![0, 0, -1, -1, 0, 0, -1, -1]);
    }
}
