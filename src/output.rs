//! Report file writer and terminal summary

use crate::cluster::RunOutcome;
use crate::model::Job;
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// Jobs with at most this many distinct patterns get the fallback line
pub const MIN_REPORTED: u32 = 2;

/// Whether a job's own report text is written out
pub fn is_reported(job: &Job) -> bool {
    job.found > MIN_REPORTED
}

/// Write the report for every job, in input order, to `writer`
pub fn format_report<W: Write>(writer: &mut W, jobs: &[Job]) -> io::Result<()> {
    for job in jobs {
        if is_reported(job) {
            write!(writer, "{}\r\n", job.report)?;
        } else {
            write!(
                writer,
                "Job {}: No three different Objects were found\r\n",
                job.id
            )?;
        }
    }
    Ok(())
}

/// Create (or truncate) `path` and write the report into it
pub fn write_report(path: &Path, jobs: &[Job]) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    format_report(&mut writer, jobs)?;
    writer.flush()?;
    tracing::info!(path = %path.display(), jobs = jobs.len(), "report written");
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    pub id: i32,
    pub found: u32,
    pub reported: bool,
}

/// Machine-readable account of a run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub tolerance: f64,
    pub workers: usize,
    pub mode: String,
    pub elapsed_ms: u64,
    pub peak_in_progress: usize,
    /// Jobs completed per worker; index 0 is rank 1
    pub per_worker: Vec<usize>,
    pub jobs: Vec<JobSummary>,
}

impl RunSummary {
    pub fn new(outcome: &RunOutcome, tolerance: f64, mode: impl Into<String>) -> Self {
        let coordinator = &outcome.coordinator;
        Self {
            tolerance,
            workers: coordinator.per_worker.len(),
            mode: mode.into(),
            elapsed_ms: outcome.elapsed.as_millis() as u64,
            peak_in_progress: coordinator.peak_in_progress,
            per_worker: coordinator.per_worker.clone(),
            jobs: coordinator
                .jobs
                .iter()
                .map(|job| JobSummary {
                    id: job.id,
                    found: job.found,
                    reported: is_reported(job),
                })
                .collect(),
        }
    }

    pub fn reported(&self) -> usize {
        self.jobs.iter().filter(|j| j.reported).count()
    }
}

/// Write the summary as pretty JSON
pub fn write_summary_json(path: &Path, summary: &RunSummary) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, summary)?;
    writeln!(writer)?;
    writer.flush()
}

/// Print a short coloured summary to stderr
pub fn print_summary(summary: &RunSummary, report_path: &Path, color: bool) -> io::Result<()> {
    let choice = if color {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    };
    let mut out = StandardStream::stderr(choice);

    out.set_color(ColorSpec::new().set_fg(Some(Color::Green)).set_bold(true))?;
    write!(out, "Done")?;
    out.reset()?;
    writeln!(
        out,
        " in {:.3}s ({} jobs, {} workers, {})",
        summary.elapsed_ms as f64 / 1000.0,
        summary.jobs.len(),
        summary.workers,
        summary.mode
    )?;

    write!(out, "  reported: ")?;
    out.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)))?;
    write!(out, "{}", summary.reported())?;
    out.reset()?;
    writeln!(out, " of {}", summary.jobs.len())?;

    for (i, count) in summary.per_worker.iter().enumerate() {
        write!(out, "  rank ")?;
        out.set_color(ColorSpec::new().set_fg(Some(Color::Magenta)))?;
        write!(out, "{}", i + 1)?;
        out.reset()?;
        writeln!(out, ": {} jobs", count)?;
    }

    write!(out, "  report: ")?;
    out.set_color(ColorSpec::new().set_fg(Some(Color::Magenta)))?;
    writeln!(out, "{}", report_path.display())?;
    out.reset()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::CoordinatorOutcome;
    use crate::model::{Grid, Offset};
    use std::time::Duration;

    fn job(id: i32, entries: &[(i32, usize, usize)]) -> Job {
        let mut job = Job::new(id, Grid::new(1, vec![0]).unwrap());
        for &(pid, row, col) in entries {
            job.push_entry(pid, Offset::new(row, col));
            job.found += 1;
        }
        job
    }

    fn render(jobs: &[Job]) -> String {
        let mut buf = Vec::new();
        format_report(&mut buf, jobs).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_fallback_line_at_two_or_fewer() {
        let text = render(&[job(4, &[(1, 0, 0), (2, 2, 2)])]);
        assert_eq!(text, "Job 4: No three different Objects were found\r\n");
    }

    #[test]
    fn test_report_line_above_two() {
        let text = render(&[job(9, &[(1, 0, 0), (2, 1, 3), (5, 2, 2)])]);
        assert_eq!(
            text,
            "Job 9: found Objects: 1 Position (0,0); 2 Position (1,3); 5 Position (2,2); \r\n"
        );
    }

    #[test]
    fn test_jobs_written_in_order() {
        let text = render(&[job(2, &[]), job(1, &[])]);
        let lines: Vec<&str> = text.split("\r\n").collect();
        assert!(lines[0].starts_with("Job 2:"));
        assert!(lines[1].starts_with("Job 1:"));
        assert_eq!(lines[2], "");
    }

    #[test]
    fn test_summary_json() {
        let outcome = RunOutcome {
            coordinator: CoordinatorOutcome {
                jobs: vec![job(1, &[(1, 0, 0), (2, 0, 0), (3, 0, 0)]), job(2, &[])],
                dispatches: Vec::new(),
                returns: vec![2, 1],
                per_worker: vec![1, 1],
                peak_in_progress: 2,
            },
            elapsed: Duration::from_millis(1500),
        };
        let summary = RunSummary::new(&outcome, 0.25, "threads");
        assert_eq!(summary.reported(), 1);
        assert_eq!(summary.workers, 2);

        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["elapsed_ms"], 1500);
        assert_eq!(value["jobs"][0]["found"], 3);
        assert_eq!(value["jobs"][1]["reported"], false);
    }
}
