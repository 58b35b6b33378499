//! Distributed Matrix Transform using MPI
//!
//! Applies an elementwise transform to every cell of a large matrix, with
//! rows spread across processes that talk only through messages.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        MPI Cluster                              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │   ┌─────────────┐     ┌─────────────┐     ┌─────────────┐      │
//! │   │   Rank 0    │     │   Rank 1    │     │   Rank 2    │      │
//! │   │  (Master)   │     │  (Worker)   │     │  (Worker)   │      │
//! │   │             │     │             │     │             │      │
//! │   │ [0, 2730)   │     │[2730, 5460) │     │[5460, 8192) │      │
//! │   └──────┬──────┘     └──────▲──────┘     └──────▲──────┘      │
//! │          │   low, high, rows │                   │              │
//! │          └───────────────────┴───────────────────┘              │
//! │                              │                                  │
//! │                  gather by rank: low, high, rows                │
//! │                              │                                  │
//! │                              ▼                                  │
//! │                     ┌─────────────┐                             │
//! │                     │   Output    │                             │
//! │                     └─────────────┘                             │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```bash
//! # With MPI (requires mpirun and the `mpi` feature)
//! mpirun -np 8 ./matrix-mpi --rows 8192 --cols 8192
//!
//! # TCP fallback: one master and two workers
//! ./matrix-mpi --tcp --workers 2 &
//! ./matrix-mpi --worker &
//! ./matrix-mpi --worker
//!
//! # Every rank as a thread of one process
//! ./matrix-mpi --local 4
//!
//! # Without MPI (single process fallback)
//! ./matrix-mpi
//! ```

use std::process;
use std::time::Duration;

use clap::Parser;
use rowfarm::orchestrator::{run_local, run_tcp_master, run_tcp_worker};
use rowfarm::report::print_matrices;
use rowfarm::transport::tcp::DEFAULT_MASTER_ADDR;
use rowfarm::{
    ConsoleReporter, Generator, JobConfig, Layout, MasterOutcome, Reporter, RunReport,
    SharePolicy, Transform, WorkerSummary,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Distributed matrix transform using MPI or TCP fallback
#[derive(Parser, Debug, Clone)]
#[command(name = "matrix-mpi")]
#[command(about = "Transform a matrix across distributed ranks", long_about = None)]
struct Args {
    /// Number of rows
    #[arg(short, long, env = "ROWFARM_ROWS", default_value_t = 8192)]
    rows: usize,

    /// Number of columns (a TCP worker takes it from the master)
    #[arg(short, long, env = "ROWFARM_COLS", default_value_t = 8192)]
    cols: usize,

    /// Input generator
    #[arg(short, long, value_enum, env = "ROWFARM_GENERATOR", default_value_t = Generator::Product)]
    generator: Generator,

    /// Elementwise transform
    #[arg(short, long, value_enum, env = "ROWFARM_TRANSFORM", default_value_t = Transform::Sqrt)]
    transform: Transform,

    /// Whether the master computes a share of the rows itself
    #[arg(long, value_enum, env = "ROWFARM_SHARE", default_value_t = SharePolicy::Reserved)]
    share: SharePolicy,

    /// Output in CSV format
    #[arg(long, default_value_t = false)]
    csv: bool,

    /// Verbose output
    #[arg(short, long, default_value_t = false)]
    verbose: bool,

    /// Print input and output matrices (warning: can be very long)
    #[arg(long, default_value_t = false)]
    print: bool,

    /// Check the result against a sequential pass on the master
    #[arg(long, default_value_t = false)]
    verify: bool,

    /// Use TCP fallback instead of MPI
    #[arg(long, default_value_t = false)]
    tcp: bool,

    /// TCP master address (for TCP mode)
    #[arg(long, env = "ROWFARM_MASTER_ADDR", default_value = DEFAULT_MASTER_ADDR)]
    master_addr: String,

    /// Number of workers (for TCP master mode)
    #[arg(long, default_value_t = 2)]
    workers: usize,

    /// Run as TCP worker
    #[arg(long, default_value_t = false)]
    worker: bool,

    /// Connection attempts before a TCP worker gives up
    #[arg(long, default_value_t = 50)]
    connect_retries: u32,

    /// Delay between connection attempts, in milliseconds
    #[arg(long, default_value_t = 100)]
    retry_delay_ms: u64,

    /// Run this many ranks as threads of one process
    #[arg(long)]
    local: Option<usize>,
}

impl Args {
    fn job(&self) -> JobConfig {
        JobConfig {
            rows: self.rows,
            cols: self.cols,
            share: self.share,
            generator: self.generator,
            transform: self.transform,
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn fail(role: &str, error: impl std::fmt::Display) -> ! {
    eprintln!("{} error: {}", role, error);
    process::exit(1);
}

fn worker_done(summary: &WorkerSummary) -> String {
    format!(
        "Rows {} done in {:.3} ms, result sent to master",
        summary.range,
        summary.compute_time.as_secs_f64() * 1000.0
    )
}

/// Verify, report and optionally dump the master's result.
fn finish(outcome: &MasterOutcome, args: &Args, label: &str) {
    if args.verify {
        if let Err(e) = outcome.verify(args.transform.function()) {
            fail("Verification", e);
        }
        info!("output matches the sequential reference");
    }

    let report = RunReport::from_outcome(label, outcome, args.transform);
    ConsoleReporter::new(args.csv, args.verbose).report(&report);

    if args.print {
        print_matrices(&outcome.input, &outcome.output);
    }
}

fn main() {
    let args = Args::parse();
    init_tracing(args.verbose);
    let job = args.job();

    // Determine mode
    if args.worker {
        // TCP worker mode
        if !args.csv {
            println!("Connecting to master at {}...", args.master_addr);
        }
        let delay = Duration::from_millis(args.retry_delay_ms);
        let addr = args.master_addr.as_str();
        match run_tcp_worker(addr, args.connect_retries, delay, args.transform) {
            Ok(summary) => {
                if !args.csv {
                    println!("{}", worker_done(&summary));
                }
            }
            Err(e) => fail("Worker", e),
        }
        return;
    }

    if args.tcp {
        // TCP master mode
        if !args.csv {
            println!("Master listening on {}", args.master_addr);
            println!("Waiting for {} workers to connect...", args.workers);
        }
        match run_tcp_master(args.master_addr.as_str(), args.workers, &job) {
            Ok(outcome) => finish(&outcome, &args, "distributed matrix transform (tcp)"),
            Err(e) => fail("Master", e),
        }
        return;
    }

    if let Some(size) = args.local {
        match run_local(size, &job, Layout::Structured) {
            Ok(outcome) => finish(&outcome, &args, "distributed matrix transform (local)"),
            Err(e) => fail("Master", e),
        }
        return;
    }

    // Try MPI first
    #[cfg(feature = "mpi")]
    {
        use rowfarm::{Error, TransportError};

        match rowfarm::orchestrator::run_mpi(&job) {
            Ok(Some(outcome)) => {
                // Only rank 0 reports
                finish(&outcome, &args, "distributed matrix transform (mpi)");
                return;
            }
            Ok(None) => return,
            Err(Error::Transport(TransportError::Bootstrap(e))) => {
                eprintln!("MPI error: {}, falling back to single node", e);
            }
            Err(e) => fail("MPI", e),
        }
    }

    // Fallback to single node
    if !args.csv {
        println!("Running in single-node mode (MPI not available)");
        println!("Use --tcp flag for TCP-based distribution");
        println!();
    }

    match run_local(1, &job, Layout::Structured) {
        Ok(outcome) => finish(&outcome, &args, "matrix transform (single node)"),
        Err(e) => fail("Master", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_job() {
        let args = Args::parse_from(["matrix-mpi"]);
        assert_eq!(args.job(), JobConfig::default());
        assert_eq!(args.master_addr, DEFAULT_MASTER_ADDR);
        assert_eq!(args.local, None);
    }

    #[test]
    fn test_dispatch_only_option() {
        let args =
            Args::parse_from(["matrix-mpi", "--share", "dispatch-only", "-r", "10", "-c", "4"]);
        let job = args.job();
        assert_eq!(job.share, SharePolicy::DispatchOnly);
        assert_eq!((job.rows, job.cols), (10, 4));
    }

    #[test]
    fn test_worker_done_line() {
        let summary = WorkerSummary {
            range: rowfarm::RowRange::new(3, 6),
            compute_time: Duration::from_micros(1500),
        };
        assert_eq!(
            worker_done(&summary),
            "Rows [3, 6) done in 1.500 ms, result sent to master"
        );
    }

    #[test]
    fn test_local_single_node() {
        let args = Args::parse_from(["matrix-mpi", "-r", "4", "-c", "4", "--local", "2"]);
        let outcome = run_local(args.local.unwrap(), &args.job(), Layout::Structured).unwrap();
        outcome.verify(args.transform.function()).unwrap();

        let report = RunReport::from_outcome("test", &outcome, args.transform);
        assert_eq!(report.nodes, 2);
        assert_eq!(report.assignments.len(), 2);
    }
}
