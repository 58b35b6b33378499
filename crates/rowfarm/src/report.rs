//! Run reports: timing, per-rank ranges and a checksum of the output.

use std::f64::consts::PI;
use std::fmt;
use std::time::Duration;

use crate::estimate::{PiOutcome, Seeding};
use crate::master::MasterOutcome;
use crate::matrix::Matrix;
use crate::partition::RowRange;
use crate::transform::Transform;
use crate::transport::Rank;
use crate::MASTER_RANK;

const RULE_HEAVY: &str = "═══════════════════════════════════════════════════════════";
const RULE_LIGHT: &str = "───────────────────────────────────────────────────────────";

/// Result of one run, handed to a [`Reporter`] once at the end.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub label: String,
    pub rows: usize,
    pub cols: usize,
    /// Ranks or threads that took part
    pub nodes: usize,
    pub transform: Transform,
    pub elapsed: Duration,
    /// Rows computed by each rank; empty for single-process runs
    pub assignments: Vec<(Rank, RowRange)>,
    pub checksum: f64,
}

impl RunReport {
    /// Report a run that did not go through the master/worker protocol.
    pub fn local(
        label: &str,
        output: &Matrix,
        nodes: usize,
        transform: Transform,
        elapsed: Duration,
    ) -> Self {
        RunReport {
            label: label.to_string(),
            rows: output.rows(),
            cols: output.cols(),
            nodes,
            transform,
            elapsed,
            assignments: vec![],
            checksum: output.checksum(),
        }
    }

    pub fn from_outcome(label: &str, outcome: &MasterOutcome, transform: Transform) -> Self {
        let plan = &outcome.plan;
        let assignments = plan
            .master_share()
            .map(|range| (MASTER_RANK, range))
            .into_iter()
            .chain(plan.assignments())
            .collect();

        RunReport {
            label: label.to_string(),
            rows: outcome.output.rows(),
            cols: outcome.output.cols(),
            nodes: plan.size(),
            transform,
            elapsed: outcome.elapsed,
            assignments,
            checksum: outcome.output.checksum(),
        }
    }

    pub fn time_ms(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1000.0
    }
}

/// Result of a π estimate.
#[derive(Debug, Clone, PartialEq)]
pub struct EstimateReport {
    pub label: String,
    pub samples: u64,
    pub hits: u64,
    pub nodes: usize,
    pub seeding: Seeding,
    pub estimate: f64,
    pub elapsed: Duration,
    /// Hits per rank; empty for single-process runs
    pub counts: Vec<(Rank, u64)>,
}

impl EstimateReport {
    pub fn from_outcome(label: &str, outcome: &PiOutcome, seeding: Seeding) -> Self {
        EstimateReport {
            label: label.to_string(),
            samples: outcome.samples,
            hits: outcome.hits,
            nodes: outcome.size(),
            seeding,
            estimate: outcome.estimate,
            elapsed: outcome.elapsed,
            counts: outcome.counts.clone(),
        }
    }

    pub fn time_ms(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1000.0
    }

    pub fn error(&self) -> f64 {
        (self.estimate - PI).abs()
    }
}

/// Receives the report at the end of a run.
pub trait Reporter {
    fn report(&mut self, report: &RunReport);

    fn report_estimate(&mut self, report: &EstimateReport);
}

/// Prints to stdout, either as a banner or as one CSV line.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleReporter {
    pub csv: bool,
    pub verbose: bool,
}

impl ConsoleReporter {
    pub fn new(csv: bool, verbose: bool) -> Self {
        ConsoleReporter { csv, verbose }
    }

    /// Formatter for `report` in this reporter's style.
    pub fn display<'a, R>(&'a self, report: &'a R) -> Rendered<'a, R> {
        Rendered {
            reporter: self,
            report,
        }
    }

    pub fn render<R>(&self, report: &R) -> String
    where
        for<'a> Rendered<'a, R>: fmt::Display,
    {
        self.display(report).to_string()
    }

    fn write_csv(&self, f: &mut fmt::Formatter<'_>, report: &RunReport) -> fmt::Result {
        // CSV format: rows,cols,nodes,time_ms,checksum
        writeln!(
            f,
            "{},{},{},{:.3},{}",
            report.rows,
            report.cols,
            report.nodes,
            report.time_ms(),
            report.checksum
        )
    }

    fn write_banner(&self, f: &mut fmt::Formatter<'_>, report: &RunReport) -> fmt::Result {
        writeln!(f, "{}", RULE_HEAVY)?;
        writeln!(f, "           {}", report.label.to_uppercase())?;
        writeln!(f, "{}", RULE_HEAVY)?;
        writeln!(f, "Configuration:")?;
        writeln!(f, "  Matrix: {} x {}", report.rows, report.cols)?;
        writeln!(f, "  Transform: {}", report.transform)?;
        writeln!(f, "  Nodes: {}", report.nodes)?;
        writeln!(f, "{}", RULE_LIGHT)?;
        writeln!(f, "Results:")?;
        writeln!(f, "  Checksum:            {:>16.6}", report.checksum)?;
        writeln!(f, "  Execution time:      {:>16.3} ms", report.time_ms())?;
        writeln!(f, "  Execution time:      {:>16.6} s", report.elapsed.as_secs_f64())?;

        if self.verbose && !report.assignments.is_empty() {
            writeln!(f, "{}", RULE_LIGHT)?;
            writeln!(f, "Per-node breakdown:")?;
            for (rank, range) in &report.assignments {
                let label = if *rank == MASTER_RANK { "Master" } else { "Worker" };
                writeln!(
                    f,
                    "  {} {}: rows [{:>6}, {:>6}) -> {} rows",
                    label,
                    rank,
                    range.low,
                    range.high,
                    range.len()
                )?;
            }
        }

        writeln!(f, "{}", RULE_HEAVY)
    }

    fn write_estimate_csv(
        &self,
        f: &mut fmt::Formatter<'_>,
        report: &EstimateReport,
    ) -> fmt::Result {
        // CSV format: samples,nodes,time_ms,estimate
        writeln!(
            f,
            "{},{},{:.3},{:.10}",
            report.samples,
            report.nodes,
            report.time_ms(),
            report.estimate
        )
    }

    fn write_estimate_banner(
        &self,
        f: &mut fmt::Formatter<'_>,
        report: &EstimateReport,
    ) -> fmt::Result {
        writeln!(f, "{}", RULE_HEAVY)?;
        writeln!(f, "           {}", report.label.to_uppercase())?;
        writeln!(f, "{}", RULE_HEAVY)?;
        writeln!(f, "Configuration:")?;
        writeln!(f, "  Samples: {}", report.samples)?;
        writeln!(f, "  Seeding: {}", report.seeding)?;
        writeln!(f, "  Nodes: {}", report.nodes)?;
        writeln!(f, "{}", RULE_LIGHT)?;
        writeln!(f, "Results:")?;
        writeln!(f, "  Pi:                  {:>16.6}", report.estimate)?;
        writeln!(f, "  Error:               {:>16.6}", report.error())?;
        writeln!(f, "  Execution time:      {:>16.3} ms", report.time_ms())?;
        writeln!(f, "  Execution time:      {:>16.6} s", report.elapsed.as_secs_f64())?;

        if self.verbose && !report.counts.is_empty() {
            writeln!(f, "{}", RULE_LIGHT)?;
            writeln!(f, "Per-node breakdown:")?;
            for (rank, hits) in &report.counts {
                let label = if *rank == MASTER_RANK { "Master" } else { "Worker" };
                writeln!(f, "  {} {}: {} hits", label, rank, hits)?;
            }
        }

        writeln!(f, "{}", RULE_HEAVY)
    }
}

/// A report formatted by a [`ConsoleReporter`].
pub struct Rendered<'a, R> {
    reporter: &'a ConsoleReporter,
    report: &'a R,
}

impl fmt::Display for Rendered<'_, RunReport> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.reporter.csv {
            self.reporter.write_csv(f, self.report)
        } else {
            self.reporter.write_banner(f, self.report)
        }
    }
}

impl fmt::Display for Rendered<'_, EstimateReport> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.reporter.csv {
            self.reporter.write_estimate_csv(f, self.report)
        } else {
            self.reporter.write_estimate_banner(f, self.report)
        }
    }
}

impl Reporter for ConsoleReporter {
    fn report(&mut self, report: &RunReport) {
        print!("{}", self.display(report));
    }

    fn report_estimate(&mut self, report: &EstimateReport) {
        print!("{}", self.display(report));
    }
}

/// Input and output dumped cell by cell, `%8.2f` style.
pub struct MatrixDump<'a> {
    pub input: &'a Matrix,
    pub output: &'a Matrix,
}

impl fmt::Display for MatrixDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for matrix in [self.input, self.output] {
            for i in 0..matrix.rows() {
                writeln!(f)?;
                for j in 0..matrix.cols() {
                    write!(f, "{:8.2}  ", matrix.get(i, j))?;
                }
            }
            write!(f, "\n\n\n")?;
        }
        Ok(())
    }
}

pub fn render_matrices(input: &Matrix, output: &Matrix) -> String {
    MatrixDump { input, output }.to_string()
}

pub fn print_matrices(input: &Matrix, output: &Matrix) {
    print!("{}", MatrixDump { input, output });
}
