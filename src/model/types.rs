use std::fmt::Write as _;

/// Participant rank; rank 0 is always the coordinator
pub type Rank = usize;

/// Rank of the coordinator process
pub const COORDINATOR: Rank = 0;

/// Square matrix of cell values stored row-major
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    dim: usize,
    cells: Vec<i32>,
}

impl Grid {
    /// Build a grid, returning None unless `cells.len() == dim * dim` and `dim > 0`
    pub fn new(dim: usize, cells: Vec<i32>) -> Option<Self> {
        if dim == 0 || dim.checked_mul(dim)? != cells.len() {
            return None;
        }
        Some(Self { dim, cells })
    }

    /// Build a grid from nested rows (test and fixture helper)
    pub fn from_rows(rows: &[&[i32]]) -> Option<Self> {
        let dim = rows.len();
        if rows.iter().any(|r| r.len() != dim) {
            return None;
        }
        Self::new(dim, rows.iter().flat_map(|r| r.iter().copied()).collect())
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn cells(&self) -> &[i32] {
        &self.cells
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> i32 {
        self.cells[row * self.dim + col]
    }

    /// Whether `other` placed at `at` lies entirely inside this grid
    pub fn fits(&self, other: &Grid, at: Offset) -> bool {
        at.row + other.dim <= self.dim && at.col + other.dim <= self.dim
    }

    /// Copy `other` into this grid with its top-left corner at `at`.
    ///
    /// # Panics
    ///
    /// Panics if `other` placed at `at` does not fit inside this grid.
    pub fn embed(&mut self, other: &Grid, at: Offset) {
        assert!(
            self.fits(other, at),
            "{}x{} grid at ({},{}) does not fit in a {}x{} grid",
            other.dim, other.dim, at.row, at.col, self.dim, self.dim
        );
        for r in 0..other.dim {
            for c in 0..other.dim {
                self.cells[(at.row + r) * self.dim + at.col + c] = other.get(r, c);
            }
        }
    }
}

/// Candidate placement of a pattern's top-left corner inside a job grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Offset {
    pub row: usize,
    pub col: usize,
}

impl Offset {
    pub const fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

/// One image to be searched, plus the report it accumulates
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: i32,
    pub grid: Grid,
    /// Number of distinct patterns found
    pub found: u32,
    pub report: String,
}

impl Job {
    pub fn new(id: i32, grid: Grid) -> Self {
        Self {
            id,
            grid,
            found: 0,
            report: report_prefix(id),
        }
    }

    pub fn dim(&self) -> usize {
        self.grid.dim()
    }

    /// Append one position entry for `pattern_id`
    pub fn push_entry(&mut self, pattern_id: i32, at: Offset) {
        // Writing into a String cannot fail
        let _ = write!(self.report, "{} Position ({},{}); ", pattern_id, at.row, at.col);
    }
}

/// Report text a fresh job starts with
pub fn report_prefix(id: i32) -> String {
    format!("Job {}: found Objects: ", id)
}

/// One template to search for; immutable once built
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    pub id: i32,
    pub grid: Grid,
}

impl Pattern {
    pub fn new(id: i32, grid: Grid) -> Self {
        Self { id, grid }
    }

    pub fn dim(&self) -> usize {
        self.grid.dim()
    }
}

/// Parameters every participant must agree on before any job is dispatched
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunConfig {
    pub tolerance: f64,
    pub job_count: usize,
    pub pattern_count: usize,
}

/// Everything the input loader produces
#[derive(Debug, Clone)]
pub struct Batch {
    pub tolerance: f64,
    pub jobs: Vec<Job>,
    pub patterns: Vec<Pattern>,
}

impl Batch {
    pub fn run_config(&self) -> RunConfig {
        RunConfig {
            tolerance: self.tolerance,
            job_count: self.jobs.len(),
            pattern_count: self.patterns.len(),
        }
    }
}
