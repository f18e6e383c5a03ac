//! Fan-out/fan-in search of one job against the whole pattern set.
//!
//! Every pattern is matched as its own rayon task. The report is only
//! touched after all tasks have joined, by a single merging pass in pattern
//! order, so concurrent tasks never write to it and entry order is stable.

use crate::error::{ClusterError, MatchError};
use crate::model::{Job, Pattern};
use crate::search::matcher::{MatchBuffer, Matcher, candidate_span};
use rayon::prelude::*;
use std::sync::Arc;

/// What one search added to a job
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchStats {
    /// Patterns that contributed at least one entry
    pub patterns_found: u32,
    /// Position entries appended to the report
    pub entries: usize,
    /// Patterns larger than the job, never handed to the matcher
    pub skipped: usize,
}

/// Runs pattern searches on a dedicated thread pool
pub struct SearchOrchestrator {
    pool: rayon::ThreadPool,
    matcher: Arc<dyn Matcher>,
}

impl SearchOrchestrator {
    /// `threads == 0` lets rayon pick one thread per core
    pub fn new(threads: usize, matcher: Arc<dyn Matcher>) -> Result<Self, ClusterError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("search-{}", i))
            .build()?;
        Ok(Self { pool, matcher })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Search `job` for every pattern and fold the hits into its report
    pub fn search(
        &self,
        job: &mut Job,
        patterns: &[Pattern],
        tolerance: f64,
    ) -> Result<SearchStats, MatchError> {
        let _span = tracing::debug_span!("search", job = job.id).entered();

        // Fan out; collect() is the join barrier
        let view: &Job = job;
        let outcomes: Vec<Option<MatchBuffer>> = self.pool.install(|| {
            patterns
                .par_iter()
                .map(|pattern| self.match_one(view, pattern, tolerance))
                .collect::<Result<Vec<_>, MatchError>>()
        })?;

        // Fan in: one writer, pattern order then slot order
        let mut stats = SearchStats::default();
        for (pattern, outcome) in patterns.iter().zip(outcomes) {
            let Some(buffer) = outcome else {
                stats.skipped += 1;
                continue;
            };

            let before = stats.entries;
            for at in buffer.hits() {
                job.push_entry(pattern.id, at);
                stats.entries += 1;
            }
            if stats.entries > before {
                stats.patterns_found += 1;
                job.found += 1;
            }
        }

        tracing::debug!(
            job = job.id,
            found = stats.patterns_found,
            entries = stats.entries,
            "search complete"
        );
        Ok(stats)
    }

    fn match_one(
        &self,
        job: &Job,
        pattern: &Pattern,
        tolerance: f64,
    ) -> Result<Option<MatchBuffer>, MatchError> {
        if candidate_span(job.dim(), pattern.dim()).is_none() {
            tracing::debug!(
                job = job.id,
                pattern = pattern.id,
                "pattern larger than job, skipping"
            );
            return Ok(None);
        }
        self.matcher.find(job, pattern, tolerance).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Grid, Offset};
    use crate::search::ReferenceMatcher;

    fn orchestrator() -> SearchOrchestrator {
        SearchOrchestrator::new(4, Arc::new(ReferenceMatcher)).unwrap()
    }

    fn pattern(id: i32, rows: &[&[i32]]) -> Pattern {
        Pattern::new(id, Grid::from_rows(rows).unwrap())
    }

    /// 4x4 job of distinct values with patterns embedded at (0,0) and (2,2)
    fn scenario() -> (Job, Vec<Pattern>) {
        let mut grid = Grid::new(4, (100..116).collect()).unwrap();
        let a = pattern(1, &[&[1, 2], &[3, 4]]);
        let b = pattern(2, &[&[5, 6], &[7, 8]]);
        let absent = pattern(3, &[&[9, 9], &[9, 9]]);
        grid.embed(&a.grid, Offset::new(0, 0));
        grid.embed(&b.grid, Offset::new(2, 2));
        (Job::new(1, grid), vec![a, b, absent])
    }

    #[test]
    fn test_two_of_three_patterns_found() {
        let (mut job, patterns) = scenario();
        let stats = orchestrator().search(&mut job, &patterns, 0.0).unwrap();

        assert_eq!(job.found, 2);
        assert_eq!(stats.entries, 2);
        assert_eq!(
            job.report,
            "Job 1: found Objects: 1 Position (0,0); 2 Position (2,2); "
        );
        assert!(!job.report.contains("3 Position"));
    }

    #[test]
    fn test_found_counts_patterns_not_entries() {
        let job_grid = Grid::new(3, vec![7; 9]).unwrap();
        let mut job = Job::new(4, job_grid);
        let patterns = vec![pattern(8, &[&[7, 7], &[7, 7]])];

        let stats = orchestrator().search(&mut job, &patterns, 0.0).unwrap();
        assert_eq!(stats.entries, 4);
        assert_eq!(job.found, 1);
        assert!(job.report.ends_with(
            "8 Position (0,0); 8 Position (0,1); 8 Position (1,0); 8 Position (1,1); "
        ));
    }

    #[test]
    fn test_oversized_pattern_is_skipped() {
        let mut job = Job::new(2, Grid::new(1, vec![1]).unwrap());
        let patterns = vec![pattern(1, &[&[1, 1], &[1, 1]]), pattern(2, &[&[1]])];

        let stats = orchestrator().search(&mut job, &patterns, 0.0).unwrap();
        assert_eq!(stats.skipped, 1);
        assert_eq!(job.found, 1);
        assert_eq!(job.report, "Job 2: found Objects: 2 Position (0,0); ");
    }

    #[test]
    fn test_grid_is_untouched() {
        let (mut job, patterns) = scenario();
        let before = job.grid.clone();
        orchestrator().search(&mut job, &patterns, 0.5).unwrap();
        assert_eq!(job.grid, before);
    }

    #[test]
    fn test_report_is_independent_of_thread_count() {
        let (job, patterns) = scenario();
        let reports: Vec<_> = [1, 2, 8]
            .into_iter()
            .map(|threads| {
                let mut job = job.clone();
                SearchOrchestrator::new(threads, Arc::new(ReferenceMatcher))
                    .unwrap()
                    .search(&mut job, &patterns, 0.0)
                    .unwrap();
                (job.found, job.report)
            })
            .collect();
        assert!(reports.windows(2).all(|w| w[0] == w[1]));
    }

    struct FailingMatcher;

    impl Matcher for FailingMatcher {
        fn find(&self, _: &Job, _: &Pattern, _: f64) -> Result<MatchBuffer, MatchError> {
            Err(MatchError::Kernel("device lost".to_string()))
        }
    }

    #[test]
    fn test_matcher_failure_propagates() {
        let (mut job, patterns) = scenario();
        let orchestrator = SearchOrchestrator::new(2, Arc::new(FailingMatcher)).unwrap();
        let err = orchestrator.search(&mut job, &patterns, 0.0).unwrap_err();
        assert!(matches!(err, MatchError::Kernel(_)));
        assert_eq!(job.found, 0);
    }
}
