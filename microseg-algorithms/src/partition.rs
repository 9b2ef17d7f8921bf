//! Output of one clustering call.

use rayon::prelude::*;
use microseg_core::labeling::Labeling;
use microseg_core::map::{MapSet, Sign};
use microseg_core::sample::SampleData;

/// Templates and labels for one requested cluster count.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    /// Cluster count asked of the algorithm.
    pub requested: usize,
    /// Templates, one per non-empty cluster.
    pub templates: MapSet,
    /// Per-sample assignments.
    pub labeling: Labeling,
    /// Global explained variance of the partition.
    pub gev: f64,
}

impl Partition {
    /// Number of templates actually produced.
    #[must_use]
    pub fn achieved(&self) -> usize {
        self.templates.len()
    }
}

/// Assigns every sample to its most correlated template.
///
/// Ties keep the lowest template index. Returns the number of samples whose
/// cluster changed.
pub fn assign_labels(data: &SampleData, templates: &MapSet, labeling: &mut Labeling) -> usize {
    let best: Vec<Option<(usize, Sign)>> = (0..data.len())
        .into_par_iter()
        .map(|i| data.best_template(i, templates).map(|(k, _, s)| (k, s)))
        .collect();

    let mut changed = 0;
    for (i, choice) in best.into_iter().enumerate() {
        match choice {
            Some((k, sign)) => {
                if labeling.get(i) != Some(k) {
                    changed += 1;
                }
                labeling.set(i, k, sign);
            }
            None => {
                if !labeling.is_undefined(i) {
                    changed += 1;
                }
                labeling.unset(i);
            }
        }
    }
    changed
}
