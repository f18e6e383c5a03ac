//! Loader for the textual batch file.
//!
//! The file is a stream of whitespace-separated numbers:
//!
//! ```text
//! tolerance
//! job_count
//!   id dim cell... (dim * dim cells, once per job)
//! pattern_count
//!   id dim cell... (dim * dim cells, once per pattern)
//! ```

use crate::error::InputError;
use crate::model::{Batch, Grid, Job, Pattern};
use std::fs;
use std::path::Path;
use std::str::{FromStr, SplitWhitespace};

/// Counts come from the file, so never reserve more than this up front
const PREALLOC_LIMIT: usize = 4096;

/// Read and validate a batch file
pub fn load(path: &Path) -> Result<Batch, InputError> {
    let text = fs::read_to_string(path).map_err(|source| InputError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let batch = parse(&text)?;
    tracing::info!(
        path = %path.display(),
        jobs = batch.jobs.len(),
        patterns = batch.patterns.len(),
        tolerance = batch.tolerance,
        "loaded batch"
    );
    Ok(batch)
}

/// Parse a batch from its textual form
pub fn parse(text: &str) -> Result<Batch, InputError> {
    let mut tokens = Tokens {
        inner: text.split_whitespace(),
    };

    let tolerance: f64 = tokens.next("tolerance")?;
    if !tolerance.is_finite() {
        return Err(InputError::Invalid {
            what: "tolerance".to_string(),
            token: tolerance.to_string(),
        });
    }

    let job_count = tokens.count("job count")?;
    let mut jobs = Vec::with_capacity(job_count.min(PREALLOC_LIMIT));
    for i in 0..job_count {
        let (id, grid) = tokens.grid(&format!("job {}", i))?;
        jobs.push(Job::new(id, grid));
    }

    let pattern_count = tokens.count("pattern count")?;
    let mut patterns = Vec::with_capacity(pattern_count.min(PREALLOC_LIMIT));
    for i in 0..pattern_count {
        let (id, grid) = tokens.grid(&format!("pattern {}", i))?;
        patterns.push(Pattern::new(id, grid));
    }

    if tokens.inner.next().is_some() {
        tracing::warn!("ignoring trailing input after the last pattern");
    }

    Ok(Batch {
        tolerance,
        jobs,
        patterns,
    })
}

struct Tokens<'a> {
    inner: SplitWhitespace<'a>,
}

impl Tokens<'_> {
    fn next<T: FromStr>(&mut self, what: &str) -> Result<T, InputError> {
        let token = self.inner.next().ok_or_else(|| InputError::Missing {
            what: what.to_string(),
        })?;
        token.parse().map_err(|_| InputError::Invalid {
            what: what.to_string(),
            token: token.to_string(),
        })
    }

    /// A non-negative count
    fn count(&mut self, what: &str) -> Result<usize, InputError> {
        let value: i64 = self.next(what)?;
        usize::try_from(value).map_err(|_| InputError::NotPositive {
            what: what.to_string(),
            value,
        })
    }

    /// `id dim cells...`
    fn grid(&mut self, what: &str) -> Result<(i32, Grid), InputError> {
        let id: i32 = self.next(&format!("{} id", what))?;
        let dim_what = format!("{} dim", what);
        let dim: i64 = self.next(&dim_what)?;
        if dim <= 0 {
            return Err(InputError::NotPositive {
                what: dim_what,
                value: dim,
            });
        }
        let dim = dim as usize;

        let len = dim.checked_mul(dim).ok_or_else(|| InputError::Invalid {
            what: dim_what.clone(),
            token: dim.to_string(),
        })?;
        let cells_what = format!("{} cells", what);
        let cells = (0..len)
            .map(|_| self.next::<i32>(&cells_what))
            .collect::<Result<Vec<_>, _>>()?;

        let grid = Grid::new(dim, cells).ok_or_else(|| InputError::Invalid {
            what: dim_what,
            token: dim.to_string(),
        })?;
        Ok((id, grid))
    }
}
