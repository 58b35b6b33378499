//! Distributed Monte Carlo Estimate of Pi
//!
//! Every rank samples its share of the points. Workers send their hit count
//! to rank 0 without blocking, and rank 0 adds the counts up in rank order.
//!
//! # Usage
//!
//! ```bash
//! # With MPI (requires mpirun and the `mpi` feature)
//! mpirun -np 8 ./pi-mpi --samples 100000000
//!
//! # Every rank as a thread of one process
//! ./pi-mpi --local 4
//!
//! # Every rank seeded alike, as in the classic C version
//! ./pi-mpi --local 4 --seeding fixed
//! ```

use std::process;

use clap::Parser;
use rowfarm::estimate::{DEFAULT_SAMPLES, DEFAULT_SEED};
use rowfarm::orchestrator::run_pi_local;
use rowfarm::report::EstimateReport;
use rowfarm::{ConsoleReporter, PiJob, PiOutcome, Reporter, Seeding};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Distributed Monte Carlo estimate of pi
#[derive(Parser, Debug, Clone)]
#[command(name = "pi-mpi")]
#[command(about = "Estimate pi across distributed ranks", long_about = None)]
struct Args {
    /// Number of points to draw across all ranks
    #[arg(short = 'n', long, env = "ROWFARM_SAMPLES", default_value_t = DEFAULT_SAMPLES)]
    samples: u64,

    /// Base generator seed
    #[arg(short, long, env = "ROWFARM_SEED", default_value_t = DEFAULT_SEED)]
    seed: u64,

    /// How each rank derives its seed from the base seed
    #[arg(long, value_enum, env = "ROWFARM_SEEDING", default_value_t = Seeding::PerRank)]
    seeding: Seeding,

    /// Output in CSV format
    #[arg(long, default_value_t = false)]
    csv: bool,

    /// Verbose output
    #[arg(short, long, default_value_t = false)]
    verbose: bool,

    /// Run this many ranks as threads of one process
    #[arg(long)]
    local: Option<usize>,
}

impl Args {
    fn job(&self) -> PiJob {
        PiJob {
            samples: self.samples,
            seed: self.seed,
            seeding: self.seeding,
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

fn finish(outcome: &PiOutcome, args: &Args, label: &str) {
    info!(hits = outcome.hits, error = outcome.error(), "estimate ready");
    let report = EstimateReport::from_outcome(label, outcome, args.seeding);
    ConsoleReporter::new(args.csv, args.verbose).report_estimate(&report);
}

fn main() {
    let args = Args::parse();
    init_tracing(args.verbose);
    let job = args.job();

    if let Some(size) = args.local {
        match run_pi_local(size, &job) {
            Ok(outcome) => finish(&outcome, &args, "monte carlo pi (local)"),
            Err(e) => fail("Master", e),
        }
        return;
    }

    // Try MPI first
    #[cfg(feature = "mpi")]
    {
        use rowfarm::{Error, TransportError};

        match rowfarm::orchestrator::run_pi_mpi(&job) {
            Ok(Some(outcome)) => {
                // Only rank 0 reports
                finish(&outcome, &args, "monte carlo pi (mpi)");
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
        println!("Use --local N to run N ranks in this process");
        println!();
    }

    match run_pi_local(1, &job) {
        Ok(outcome) => finish(&outcome, &args, "monte carlo pi (single node)"),
        Err(e) => fail("Master", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_job() {
        let args = Args::parse_from(["pi-mpi"]);
        assert_eq!(args.job(), PiJob::default());
        assert_eq!(args.local, None);
    }

    #[test]
    fn test_fixed_seeding_option() {
        let args = Args::parse_from(["pi-mpi", "--seeding", "fixed", "-n", "600", "--local", "3"]);
        let job = args.job();
        assert_eq!(job.seeding, Seeding::Fixed);

        let outcome = run_pi_local(args.local.unwrap(), &job).unwrap();
        assert_eq!(outcome.counts[1].1, outcome.counts[2].1);
        assert_eq!(outcome.counts[0].1, outcome.counts[1].1);

        let report = EstimateReport::from_outcome("test", &outcome, job.seeding);
        assert_eq!(report.nodes, 3);
        assert_eq!(report.samples, 600);
    }
}
