//! Merges templates that are too similar to be told apart.

use microseg_core::labeling::{pack_labels, Labeling};
use microseg_core::map::{dot, MapSet, Polarity, Sign};
use microseg_core::sample::SampleData;

use crate::centroid::{refresh_signs, signed_members, CentroidBuilder};

/// Repeatedly merges the most correlated pair of templates while their
/// correlation exceeds `threshold`.
///
/// The merged cluster keeps the lower index and its template is recomputed
/// from its members. Returns the packed cluster count.
pub fn merge_correlated(
    data: &SampleData,
    builder: &CentroidBuilder,
    threshold: f64,
    templates: &mut MapSet,
    labeling: &mut Labeling,
) -> usize {
    let n = templates.len();
    let mut alive = vec![true; n];

    loop {
        let mut best: Option<(usize, usize, f64, Sign)> = None;
        for a in 0..n {
            if !alive[a] {
                continue;
            }
            for b in a + 1..n {
                if !alive[b] {
                    continue;
                }
                let r = dot(templates.map(a), templates.map(b));
                let (r, sign) = match data.polarity() {
                    Polarity::Evaluate => (r.abs(), Sign::of(r)),
                    Polarity::Direct => (r, Sign::Positive),
                };
                if r > threshold && best.map_or(true, |(_, _, rb, _)| r > rb) {
                    best = Some((a, b, r, sign));
                }
            }
        }
        let Some((a, b, r, sign)) = best else {
            break;
        };
        log::trace!("merging template {b} into {a} (r = {r:.4})");

        for i in 0..labeling.len() {
            if labeling.get(i) == Some(b) {
                let s = labeling.sign(i).combine(sign);
                labeling.set(i, a, s);
            }
        }
        alive[b] = false;
        templates.map_mut(b).fill(0.0);

        let members = signed_members(labeling, a + 1).swap_remove(a);
        let centroid = builder.compute(data, &members);
        templates.map_mut(a).copy_from_slice(&centroid);
    }

    refresh_signs(data, templates, labeling);
    pack_labels(templates, labeling)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::postprocess::tests::{fixture, labels};

    #[test]
    fn test_merge_joins_similar_templates() {
        // Clusters 0 and 2 both hold the same topography.
        let (data, mut templates, mut labeling) = fixture(&[0, 0, 1, 1, 2, 2, 3, 1]);
        let n = merge_correlated(
            &data,
            &CentroidBuilder::default(),
            0.95,
            &mut templates,
            &mut labeling,
        );
        assert_eq!(n, 3);
        assert_eq!(labels(&labeling), vec![0, 0, 1, 1, 0, 0, 2, 1]);
    }

    #[test]
    fn test_merge_never_increases_count() {
        let (data, mut templates, mut labeling) = fixture(&[0, 0, 1, 1, 0, 0, 2, 1]);
        let n = merge_correlated(
            &data,
            &CentroidBuilder::default(),
            0.999_999,
            &mut templates,
            &mut labeling,
        );
        assert_eq!(n, 3);
    }
}
