//! Removal of short runs of a single label.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use microseg_core::config::SmallSegmentPolicy;
use microseg_core::labeling::{pack_labels, Labeling};
use microseg_core::map::MapSet;
use microseg_core::sample::SampleData;

/// Removes every defined run of at most `size` samples.
///
/// With [`SmallSegmentPolicy::Reassign`] the shortest eligible run is split
/// between its left and right neighbouring labels at the point maximizing
/// the summed correlation, until no eligible run is left. When `floor` is
/// set, a split is only allowed if every reassigned sample reaches it with
/// its new template. Runs touching undefined samples or an epoch boundary
/// on both sides cannot be reassigned and are kept.
///
/// With [`SmallSegmentPolicy::Unlabel`] short runs simply become undefined.
///
/// Templates are not recomputed. Returns the number of clusters left.
pub fn reject_small_segments(
    data: &SampleData,
    size: usize,
    policy: SmallSegmentPolicy,
    floor: Option<f64>,
    templates: &mut MapSet,
    labeling: &mut Labeling,
) -> usize {
    if size == 0 || templates.is_empty() {
        return pack_labels(templates, labeling);
    }

    match policy {
        SmallSegmentPolicy::Unlabel => {
            let mut removed = 0usize;
            for segment in labeling.segments() {
                if segment.cluster.is_some() && segment.len <= size {
                    for i in segment.start..segment.end() {
                        labeling.unset(i);
                    }
                    removed += 1;
                }
            }
            log::trace!("unlabeled {removed} runs of at most {size} samples");
        }
        SmallSegmentPolicy::Reassign => {
            let merged = reassign_short_runs(data, size, floor, templates, labeling);
            log::trace!("reassigned {merged} runs of at most {size} samples");
        }
    }

    pack_labels(templates, labeling)
}

/// A run of the labeling, linked to the runs before and after it.
#[derive(Debug, Clone)]
struct Run {
    start: usize,
    len: usize,
    cluster: Option<usize>,
    epoch: usize,
    prev: Option<usize>,
    next: Option<usize>,
    alive: bool,
    /// Bumped on every change; older heap entries are stale.
    version: u32,
}

impl Run {
    fn end(&self) -> usize {
        self.start + self.len
    }
}

/// Runs in time order, updated in place as short runs are absorbed.
struct RunList {
    runs: Vec<Run>,
    /// Candidates keyed by `(len, start)`: shortest first, earlier wins ties.
    queue: BinaryHeap<Reverse<(usize, usize, usize, u32)>>,
    size: usize,
}

impl RunList {
    fn new(labeling: &Labeling, size: usize) -> Self {
        let segments = labeling.segments();
        let last = segments.len().saturating_sub(1);
        let runs = segments
            .iter()
            .enumerate()
            .map(|(s, seg)| Run {
                start: seg.start,
                len: seg.len,
                cluster: seg.cluster,
                epoch: seg.epoch,
                prev: s.checked_sub(1),
                next: (s < last).then_some(s + 1),
                alive: true,
                version: 0,
            })
            .collect();
        let mut list = Self {
            runs,
            queue: BinaryHeap::new(),
            size,
        };
        for s in 0..list.runs.len() {
            list.enqueue(s);
        }
        list
    }

    /// Queues run `s` again if it is a short defined run.
    fn enqueue(&mut self, s: usize) {
        let run = &mut self.runs[s];
        run.version += 1;
        if run.alive && run.cluster.is_some() && run.len <= self.size {
            self.queue
                .push(Reverse((run.len, run.start, s, run.version)));
        }
    }

    fn pop(&mut self) -> Option<usize> {
        while let Some(Reverse((_, _, s, version))) = self.queue.pop() {
            let run = &self.runs[s];
            if run.alive && run.version == version {
                return Some(s);
            }
        }
        None
    }

    /// Cluster of the run at `other`, if it is a defined run of the same epoch.
    fn neighbour(&self, of: usize, other: Option<usize>) -> Option<usize> {
        let other = &self.runs[other?];
        if other.epoch == self.runs[of].epoch {
            other.cluster
        } else {
            None
        }
    }

    /// Hands the samples of run `s` to its neighbours as `split` says, and
    /// joins the neighbours when they end up with the same label.
    fn absorb(&mut self, s: usize, split: &Split) {
        let (prev, next) = (self.runs[s].prev, self.runs[s].next);
        self.runs[s].alive = false;

        if let Some(l) = prev {
            if split.left.is_some() {
                self.runs[l].len += split.at - split.start;
            }
            self.runs[l].next = next;
        }
        if let Some(r) = next {
            if split.right.is_some() {
                self.runs[r].len += split.end - split.at;
                self.runs[r].start = split.at;
            }
            self.runs[r].prev = prev;
        }

        if let (Some(l), Some(r)) = (prev, next) {
            if split.left.is_some() && split.left == split.right {
                let (len, after) = (self.runs[r].len, self.runs[r].next);
                self.runs[l].len += len;
                self.runs[l].next = after;
                if let Some(a) = after {
                    self.runs[a].prev = Some(l);
                }
                self.runs[r].alive = false;
            }
        }

        for t in [prev, next].into_iter().flatten() {
            self.enqueue(t);
        }
    }
}

/// Absorbs short runs into their neighbours until none can be absorbed.
///
/// A run whose split is infeasible only becomes feasible when one of its
/// neighbours changes, so it is queued again at that point.
fn reassign_short_runs(
    data: &SampleData,
    size: usize,
    floor: Option<f64>,
    templates: &MapSet,
    labeling: &mut Labeling,
) -> usize {
    let mut runs = RunList::new(labeling, size);
    let mut merged = 0usize;
    while let Some(s) = runs.pop() {
        let run = &runs.runs[s];
        let left = runs.neighbour(s, run.prev);
        let right = runs.neighbour(s, run.next);
        let Some(split) = best_split(data, floor, templates, run.start, run.end(), left, right)
        else {
            continue;
        };
        split.apply(data, templates, labeling);
        runs.absorb(s, &split);
        merged += 1;
    }
    merged
}

/// Reassignment of one short run: `[start, at)` goes left, `[at, end)` right.
#[derive(Debug, Clone, Copy)]
struct Split {
    start: usize,
    at: usize,
    end: usize,
    left: Option<usize>,
    right: Option<usize>,
}

impl Split {
    fn apply(&self, data: &SampleData, templates: &MapSet, labeling: &mut Labeling) {
        for i in self.start..self.end {
            let target = if i < self.at { self.left } else { self.right };
            if let Some(c) = target {
                let (_, sign) = data.correlation(i, templates.map(c));
                labeling.set(i, c, sign);
            }
        }
    }
}

fn best_split(
    data: &SampleData,
    floor: Option<f64>,
    templates: &MapSet,
    start: usize,
    end: usize,
    left: Option<usize>,
    right: Option<usize>,
) -> Option<Split> {
    let fit = |i: usize, c: Option<usize>| -> Option<f64> {
        let (r, _) = data.correlation(i, templates.map(c?));
        match floor {
            Some(min) if r < min => None,
            _ => Some(r),
        }
    };

    if left.is_none() && right.is_none() {
        return None;
    }

    // `at == start` hands everything right, `at == end` everything left.
    let mut best: Option<(usize, f64)> = None;
    for at in start..=end {
        let mut total = 0.0;
        let mut feasible = true;
        for i in start..end {
            let target = if i < at { left } else { right };
            match fit(i, target) {
                Some(r) => total += r,
                None => {
                    feasible = false;
                    break;
                }
            }
        }
        if feasible && best.map_or(true, |(_, b)| total > b) {
            best = Some((at, total));
        }
    }

    best.map(|(at, _)| Split {
        start,
        at,
        end,
        left,
        right,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::postprocess::tests::{fixture, labels};

    #[test]
    fn test_unlabel_short_runs() {
        let (data, mut templates, mut labeling) = fixture(&[0, 0, 1, 1, 0, 0, 2, 1]);
        let n = reject_small_segments(
            &data,
            1,
            SmallSegmentPolicy::Unlabel,
            None,
            &mut templates,
            &mut labeling,
        );
        assert_eq!(labels(&labeling), vec![0, 0, 1, 1, 0, 0, -1, -1]);
        assert_eq!(n, 2);
        assert_eq!(templates.len(), 2);
    }

    #[test]
    fn test_reassign_absorbs_short_runs() {
        let (data, mut templates, mut labeling) = fixture(&[0, 0, 1, 1, 0, 0, 2, 1]);
        reject_small_segments(
            &data,
            1,
            SmallSegmentPolicy::Reassign,
            None,
            &mut templates,
            &mut labeling,
        );
        let segments = labeling.segments();
        assert!(segments.iter().all(|s| s.len > 1));
        assert_eq!(labeling.num_defined(), 8);
    }

    #[test]
    fn test_reassign_respects_floor() {
        let (data, mut templates, mut labeling) = fixture(&[0, 0, 1, 1, 0, 0, 2, 1]);
        reject_small_segments(
            &data,
            1,
            SmallSegmentPolicy::Reassign,
            Some(0.99),
            &mut templates,
            &mut labeling,
        );
        // Sample 6 (third map) fits neither neighbour; sample 7 then keeps
        // a run of its own.
        assert_ne!(labeling.get(6), labeling.get(5));
        assert_ne!(labeling.get(6), labeling.get(7));
    }

    #[test]
    fn test_isolated_run_is_kept() {
        let (data, mut templates, mut labeling) = fixture(&[-1, 0, -1, 1, 1, 1, 1, 1]);
        reject_small_segments(
            &data,
            1,
            SmallSegmentPolicy::Reassign,
            None,
            &mut templates,
            &mut labeling,
        );
        assert_eq!(labels(&labeling), vec![-1, 0, -1, 1, 1, 1, 1, 1]);
    }

    #[test]
    fn test_reassign_joins_equal_neighbours() {
        let (data, mut templates, mut labeling) = fixture(&[0, 0, 0, 1, 0, 0, 1, 1]);
        reject_small_segments(
            &data,
            1,
            SmallSegmentPolicy::Reassign,
            None,
            &mut templates,
            &mut labeling,
        );
        assert_eq!(labels(&labeling), vec![0, 0, 0, 0, 0, 0, 1, 1]);
        assert_eq!(labeling.segments().len(), 2);
    }

    #[test]
    fn test_reassign_long_recording() {
        use crate::centroid::CentroidBuilder;
        use microseg_core::map::{DataType, Polarity, Sign};

        let bases = [
            [1.0, -1.0, 0.0, 0.0],
            [0.0, 1.0, -1.0, 0.0],
            [0.0, 0.0, 1.0, -1.0],
        ];
        let lengths = [1, 2, 5, 1, 3, 7, 2, 1, 4, 6];
        let mut clusters = Vec::new();
        let mut run = 0usize;
        while clusters.len() < 30_000 {
            let len = lengths[run % lengths.len()];
            clusters.extend(std::iter::repeat(run % 3).take(len));
            run += 1;
        }
        let rows: Vec<Vec<f64>> = clusters.iter().map(|&c| bases[c].to_vec()).collect();
        let raw = MapSet::from_rows(&rows).unwrap();
        let epochs = [12_000, rows.len() - 12_000];
        let data =
            SampleData::new(&raw, DataType::Scalar, Polarity::Evaluate, &epochs, false).unwrap();
        let mut labeling = Labeling::with_epochs(&epochs);
        for (i, &c) in clusters.iter().enumerate() {
            labeling.set(i, c, Sign::Positive);
        }
        let mut templates = CentroidBuilder::default().templates(&data, &labeling, 3);

        let n = reject_small_segments(
            &data,
            3,
            SmallSegmentPolicy::Reassign,
            None,
            &mut templates,
            &mut labeling,
        );
        assert!(n <= 3);
        assert_eq!(labeling.num_defined(), rows.len());
        let segments = labeling.segments();
        for (s, segment) in segments.iter().enumerate() {
            let alone = segments
                .get(s.wrapping_sub(1))
                .map_or(true, |p| p.epoch != segment.epoch)
                && segments
                    .get(s + 1)
                    .map_or(true, |q| q.epoch != segment.epoch);
            assert!(segment.len > 3 || alone, "short run left at {}", segment.start);
        }
    }
}
