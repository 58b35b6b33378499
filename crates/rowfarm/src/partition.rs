//! Contiguous row partitioning
//!
//! # Strategy
//!
//! ```text
//! rows:     [0 ........................................ R)
//! portion = R / parts
//!
//! part 0:   [0, portion)
//! part 1:   [portion, 2 * portion)
//! ...
//! last:     [(parts - 1) * portion, R)   <- absorbs R mod parts
//! ```
//!
//! The split depends only on `R` and `parts`, never on timing, so every rank
//! can compute the same plan independently.

use std::fmt;
use std::ops::Range;

use clap::ValueEnum;

use crate::error::PartitionError;
use crate::transport::Rank;
use crate::MASTER_RANK;

/// Half-open row interval `[low, high)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RowRange {
    pub low: usize,
    pub high: usize,
}

impl RowRange {
    pub fn new(low: usize, high: usize) -> Self {
        debug_assert!(low <= high, "inverted range [{}, {})", low, high);
        RowRange { low, high }
    }

    /// Number of rows covered.
    pub fn len(&self) -> usize {
        self.high - self.low
    }

    pub fn is_empty(&self) -> bool {
        self.high == self.low
    }

    /// Element span of these rows in a row-major buffer with `cols` columns.
    pub fn elements(&self, cols: usize) -> Range<usize> {
        self.low * cols..self.high * cols
    }
}

impl fmt::Display for RowRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.low, self.high)
    }
}

/// Split `total_rows` into `parts` contiguous ranges.
///
/// Part `k` starts at `k * portion` where `portion = total_rows / parts`;
/// the last part always ends at `total_rows` and so takes the remainder.
///
/// # Errors
///
/// [`PartitionError::NoParticipants`] when `parts == 0`.
pub fn compute_ranges(
    total_rows: usize,
    parts: usize,
) -> Result<Vec<RowRange>, PartitionError> {
    if parts == 0 {
        return Err(PartitionError::NoParticipants { total_rows });
    }

    let portion = total_rows / parts;

    let ranges = (0..parts)
        .map(|k| {
            let low = k * portion;
            let high = if k == parts - 1 { total_rows } else { low + portion };
            RowRange::new(low, high)
        })
        .collect();

    Ok(ranges)
}

/// Whether the master keeps a share of the rows for itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum SharePolicy {
    /// Master computes range 0 of a split over every rank
    #[default]
    Reserved,
    /// Master only coordinates; the workers split all rows among themselves
    DispatchOnly,
}

impl fmt::Display for SharePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SharePolicy::Reserved => write!(f, "reserved"),
            SharePolicy::DispatchOnly => write!(f, "dispatch-only"),
        }
    }
}

/// Row ownership for one run: the master's own share plus one range per worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    size: usize,
    master_share: Option<RowRange>,
    /// Index `i` belongs to worker rank `i + 1`.
    workers: Vec<RowRange>,
}

impl Plan {
    /// Build the plan for `size` ranks (master included).
    pub fn new(
        total_rows: usize,
        size: usize,
        policy: SharePolicy,
    ) -> Result<Self, PartitionError> {
        if size == 0 {
            return Err(PartitionError::EmptyTopology);
        }

        // No workers: the master does everything, whatever the policy.
        if size == 1 {
            return Ok(Plan {
                size,
                master_share: Some(RowRange::new(0, total_rows)),
                workers: vec![],
            });
        }

        let (master_share, workers) = match policy {
            SharePolicy::Reserved => {
                let mut ranges = compute_ranges(total_rows, size)?;
                let own = ranges.remove(0);
                (Some(own), ranges)
            }
            SharePolicy::DispatchOnly => (None, compute_ranges(total_rows, size - 1)?),
        };

        Ok(Plan {
            size,
            master_share,
            workers,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn master_share(&self) -> Option<RowRange> {
        self.master_share
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// `(rank, range)` for every worker, in increasing rank order.
    pub fn assignments(&self) -> impl Iterator<Item = (Rank, RowRange)> + '_ {
        self.workers
            .iter()
            .enumerate()
            .map(|(i, &range)| (i + 1, range))
    }

    /// Rows owned by `rank`, if any.
    pub fn range_for(&self, rank: Rank) -> Option<RowRange> {
        if rank == MASTER_RANK {
            self.master_share
        } else {
            self.workers.get(rank - 1).copied()
        }
    }

    /// Bytes and message count `rank` will put on the wire with the tagged layout.
    ///
    /// The master sends three messages per worker; a worker sends three back.
    pub fn send_volume(&self, rank: Rank, cols: usize) -> (usize, usize) {
        const BOUND_BYTES: usize = std::mem::size_of::<u64>();
        const VALUE_BYTES: usize = std::mem::size_of::<f64>();

        let block = |range: RowRange| 2 * BOUND_BYTES + range.len() * cols * VALUE_BYTES;

        if rank == MASTER_RANK {
            let bytes = self.workers.iter().map(|&r| block(r)).sum();
            (bytes, 3 * self.workers.len())
        } else {
            match self.range_for(rank) {
                Some(range) => (block(range), 3),
                None => (0, 0),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn assert_exact_cover(ranges: &[RowRange], total_rows: usize) {
        let mut next = 0;
        for range in ranges {
            assert_eq!(range.low, next, "gap or overlap before {}", range);
            assert!(range.low <= range.high);
            next = range.high;
        }
        assert_eq!(next, total_rows);
    }

    #[test]
    fn test_single_part_takes_everything() {
        let ranges = compute_ranges(8192, 1).unwrap();
        assert_eq!(ranges, vec![RowRange::new(0, 8192)]);
    }

    #[test]
    fn test_remainder_goes_to_last_part() {
        let ranges = compute_ranges(8192, 7).unwrap();
        assert_eq!(ranges.len(), 7);

        for (k, range) in ranges.iter().take(6).enumerate() {
            assert_eq!(*range, RowRange::new(k * 1170, (k + 1) * 1170));
        }
        assert_eq!(ranges[5], RowRange::new(5850, 7020));
        assert_eq!(ranges[6], RowRange::new(7020, 8192));
        assert_eq!(ranges[6].len(), 1172);
    }

    #[test]
    fn test_uneven_small_split() {
        let ranges = compute_ranges(10, 3).unwrap();
        assert_eq!(
            ranges,
            vec![RowRange::new(0, 3), RowRange::new(3, 6), RowRange::new(6, 10)]
        );
        assert!(ranges[2].len() > ranges[0].len());
        assert_exact_cover(&ranges, 10);
    }

    #[test]
    fn test_zero_parts_is_an_error() {
        assert_eq!(
            compute_ranges(10, 0),
            Err(PartitionError::NoParticipants { total_rows: 10 })
        );
    }

    #[test]
    fn test_fewer_rows_than_parts() {
        let ranges = compute_ranges(2, 5).unwrap();
        assert!(ranges[..4].iter().all(RowRange::is_empty));
        assert_eq!(ranges[4], RowRange::new(0, 2));
        assert_exact_cover(&ranges, 2);
    }

    #[test]
    fn test_random_splits_cover_exactly_once() {
        let mut rng = rand::thread_rng();
        for _ in 0..500 {
            let total_rows = rng.gen_range(0..5000);
            let parts = rng.gen_range(1..64);
            let ranges = compute_ranges(total_rows, parts).unwrap();
            assert_eq!(ranges.len(), parts);
            assert_exact_cover(&ranges, total_rows);
        }
    }

    #[test]
    fn test_plan_single_rank_does_all_rows() {
        for policy in [SharePolicy::Reserved, SharePolicy::DispatchOnly] {
            let plan = Plan::new(8192, 1, policy).unwrap();
            assert_eq!(plan.master_share(), Some(RowRange::new(0, 8192)));
            assert_eq!(plan.worker_count(), 0);
        }
    }

    #[test]
    fn test_plan_reserved_share() {
        let plan = Plan::new(10, 3, SharePolicy::Reserved).unwrap();
        assert_eq!(plan.master_share(), Some(RowRange::new(0, 3)));
        let assignments: Vec<_> = plan.assignments().collect();
        assert_eq!(
            assignments,
            vec![(1, RowRange::new(3, 6)), (2, RowRange::new(6, 10))]
        );
    }

    #[test]
    fn test_plan_dispatch_only_matches_worker_split() {
        let plan = Plan::new(8192, 8, SharePolicy::DispatchOnly).unwrap();
        assert_eq!(plan.master_share(), None);
        assert_eq!(plan.range_for(1), Some(RowRange::new(0, 1170)));
        assert_eq!(plan.range_for(7), Some(RowRange::new(7020, 8192)));
        assert_eq!(plan.range_for(8), None);
    }

    #[test]
    fn test_plan_rejects_empty_topology() {
        assert_eq!(
            Plan::new(10, 0, SharePolicy::Reserved),
            Err(PartitionError::EmptyTopology)
        );
    }

    #[test]
    fn test_plan_covers_rows_for_any_size() {
        for size in 1..20 {
            for policy in [SharePolicy::Reserved, SharePolicy::DispatchOnly] {
                let plan = Plan::new(1000, size, policy).unwrap();
                let mut ranges: Vec<RowRange> = plan.master_share().into_iter().collect();
                ranges.extend(plan.assignments().map(|(_, r)| r));
                assert_exact_cover(&ranges, 1000);
            }
        }
    }

    #[test]
    fn test_send_volume() {
        let plan = Plan::new(10, 3, SharePolicy::Reserved).unwrap();
        // worker 1 holds 3 rows of 4 columns
        assert_eq!(plan.send_volume(1, 4), (16 + 3 * 4 * 8, 3));
        assert_eq!(plan.send_volume(0, 4), (32 + 7 * 4 * 8, 6));
    }
}
