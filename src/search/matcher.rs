//! The matching primitive: given a job, a pattern and a tolerance, report
//! every offset where the pattern fits.

use crate::error::MatchError;
use crate::model::{Job, Offset, Pattern};
use rayon::prelude::*;

/// Number of candidate offsets along one axis, or None if the pattern is larger than the job
pub fn candidate_span(job_dim: usize, pattern_dim: usize) -> Option<usize> {
    job_dim.checked_sub(pattern_dim).map(|d| d + 1)
}

/// Result of one (job, pattern) match.
///
/// `positions` holds a row/column pair per candidate slot (zero where the
/// slot did not match); `hits` flags the slots that did, so a genuine match at
/// (0,0) is distinguishable from an empty slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchBuffer {
    span: usize,
    positions: Vec<u32>,
    hits: Vec<bool>,
    found: bool,
}

impl MatchBuffer {
    /// Empty buffer for `span * span` candidate slots
    pub fn new(span: usize) -> Self {
        let count = span * span;
        Self {
            span,
            positions: vec![0; 2 * count],
            hits: vec![false; count],
            found: false,
        }
    }

    /// Buffer with the given slots marked as hits.
    ///
    /// # Panics
    ///
    /// Panics if any slot is out of range, as [`MatchBuffer::mark`] does.
    pub fn from_hits(span: usize, slots: impl IntoIterator<Item = usize>) -> Self {
        let mut buffer = Self::new(span);
        for slot in slots {
            buffer.mark(slot);
        }
        buffer
    }

    /// Record a match at candidate slot `slot` (row-major).
    ///
    /// # Panics
    ///
    /// Panics if `slot >= self.candidate_count()`.
    pub fn mark(&mut self, slot: usize) {
        let at = self.offset_of(slot);
        self.positions[2 * slot] = at.row as u32;
        self.positions[2 * slot + 1] = at.col as u32;
        self.hits[slot] = true;
        self.found = true;
    }

    pub fn offset_of(&self, slot: usize) -> Offset {
        Offset::new(slot / self.span, slot % self.span)
    }

    pub fn candidate_count(&self) -> usize {
        self.hits.len()
    }

    pub fn found(&self) -> bool {
        self.found
    }

    /// Flat row/column pairs, two per candidate slot
    pub fn positions(&self) -> &[u32] {
        &self.positions
    }

    /// Matching offsets in slot order
    pub fn hits(&self) -> impl Iterator<Item = Offset> + '_ {
        self.hits
            .iter()
            .enumerate()
            .filter(|(_, hit)| **hit)
            .map(|(slot, _)| {
                Offset::new(
                    self.positions[2 * slot] as usize,
                    self.positions[2 * slot + 1] as usize,
                )
            })
    }
}

/// Contract for the external matching primitive.
///
/// Implementations must be deterministic for identical inputs. The caller
/// guarantees the pattern fits inside the job.
pub trait Matcher: Send + Sync {
    fn find(&self, job: &Job, pattern: &Pattern, tolerance: f64) -> Result<MatchBuffer, MatchError>;
}

/// CPU implementation of the matching primitive.
///
/// The score of a placement is the mean relative difference
/// `|p - o| / |p|` over the pattern cells, where `p` is the job cell and `o`
/// the pattern cell (`|o|` when `p` is zero). A placement matches when its
/// score is at most the tolerance.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReferenceMatcher;

impl ReferenceMatcher {
    pub fn placement_score(job: &Job, pattern: &Pattern, at: Offset) -> f64 {
        let dim = pattern.dim();
        let mut total = 0.0;
        for r in 0..dim {
            for c in 0..dim {
                let p = job.grid.get(at.row + r, at.col + c) as f64;
                let o = pattern.grid.get(r, c) as f64;
                total += if p == 0.0 {
                    o.abs()
                } else {
                    ((p - o) / p).abs()
                };
            }
        }
        total / (dim * dim) as f64
    }
}

impl Matcher for ReferenceMatcher {
    fn find(&self, job: &Job, pattern: &Pattern, tolerance: f64) -> Result<MatchBuffer, MatchError> {
        let span = candidate_span(job.dim(), pattern.dim()).ok_or(MatchError::DoesNotFit {
            job: job.id,
            job_dim: job.dim(),
            pattern: pattern.id,
            pattern_dim: pattern.dim(),
        })?;

        let slots: Vec<usize> = (0..span * span)
            .into_par_iter()
            .filter(|&slot| {
                let at = Offset::new(slot / span, slot % span);
                Self::placement_score(job, pattern, at) <= tolerance
            })
            .collect();

        Ok(MatchBuffer::from_hits(span, slots))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Grid;

    fn job_with(rows: &[&[i32]]) -> Job {
        Job::new(1, Grid::from_rows(rows).unwrap())
    }

    #[test]
    fn test_candidate_span() {
        assert_eq!(candidate_span(4, 2), Some(3));
        assert_eq!(candidate_span(4, 4), Some(1));
        assert_eq!(candidate_span(2, 3), None);
    }

    #[test]
    fn test_match_buffer_flags_origin_hit() {
        let buffer = MatchBuffer::from_hits(3, [0, 5]);
        assert!(buffer.found());
        assert_eq!(buffer.candidate_count(), 9);
        assert_eq!(&buffer.positions()[..2], &[0, 0]);
        assert_eq!(&buffer.positions()[10..12], &[1, 2]);
        let hits: Vec<_> = buffer.hits().collect();
        assert_eq!(hits, vec![Offset::new(0, 0), Offset::new(1, 2)]);
    }

    #[test]
    #[should_panic]
    fn test_mark_out_of_range_slot_panics() {
        MatchBuffer::new(2).mark(4);
    }

    #[test]
    fn test_empty_buffer_has_no_hits() {
        let buffer = MatchBuffer::new(2);
        assert!(!buffer.found());
        assert_eq!(buffer.hits().count(), 0);
        assert!(buffer.positions().iter().all(|&v| v == 0));
    }

    #[test]
    fn test_exact_copy_matches_at_zero_tolerance() {
        let job = job_with(&[&[1, 2, 3], &[4, 5, 6], &[7, 8, 9]]);
        let pattern = Pattern::new(5, Grid::from_rows(&[&[5, 6], &[8, 9]]).unwrap());

        let buffer = ReferenceMatcher.find(&job, &pattern, 0.0).unwrap();
        assert_eq!(buffer.hits().collect::<Vec<_>>(), vec![Offset::new(1, 1)]);
    }

    #[test]
    fn test_tolerance_admits_near_matches() {
        let job = job_with(&[&[10, 10], &[10, 10]]);
        let pattern = Pattern::new(1, Grid::from_rows(&[&[11, 9], &[10, 10]]).unwrap());

        // Mean relative difference is (0.1 + 0.1) / 4 = 0.05
        assert!(!ReferenceMatcher.find(&job, &pattern, 0.04).unwrap().found());
        assert!(ReferenceMatcher.find(&job, &pattern, 0.05).unwrap().found());
    }

    #[test]
    fn test_zero_cells_use_absolute_difference() {
        let job = job_with(&[&[0, 0], &[0, 0]]);
        let zeros = Pattern::new(1, Grid::from_rows(&[&[0]]).unwrap());
        let ones = Pattern::new(2, Grid::from_rows(&[&[1]]).unwrap());

        assert_eq!(ReferenceMatcher.find(&job, &zeros, 0.0).unwrap().hits().count(), 4);
        assert!(!ReferenceMatcher.find(&job, &ones, 0.5).unwrap().found());
    }

    #[test]
    fn test_oversized_pattern_is_an_error() {
        let job = job_with(&[&[1]]);
        let pattern = Pattern::new(3, Grid::from_rows(&[&[1, 1], &[1, 1]]).unwrap());
        assert!(matches!(
            ReferenceMatcher.find(&job, &pattern, 1.0),
            Err(MatchError::DoesNotFit { pattern: 3, .. })
        ));
    }
}
