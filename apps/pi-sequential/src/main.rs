//! Sequential Monte Carlo Estimate of Pi
//!
//! Draws points uniformly in the unit square and counts those inside the
//! quarter circle, on a single thread. Baseline for the distributed version.

use std::time::Instant;

use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rowfarm::estimate::{count_hits, estimate, DEFAULT_SAMPLES, DEFAULT_SEED};
use rowfarm::report::EstimateReport;
use rowfarm::{ConsoleReporter, Reporter, Seeding};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Sequential Monte Carlo estimate of pi
#[derive(Parser, Debug)]
#[command(name = "pi-sequential")]
#[command(about = "Estimate pi by sampling the unit square", long_about = None)]
struct Args {
    /// Number of points to draw
    #[arg(short = 'n', long, env = "ROWFARM_SAMPLES", default_value_t = DEFAULT_SAMPLES)]
    samples: u64,

    /// Generator seed
    #[arg(short, long, env = "ROWFARM_SEED", default_value_t = DEFAULT_SEED)]
    seed: u64,

    /// Verbose output
    #[arg(short, long, default_value_t = false)]
    verbose: bool,

    /// Output results in CSV format for benchmarking
    #[arg(long, default_value_t = false)]
    csv: bool,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let args = Args::parse();
    init_tracing(args.verbose);

    if !args.csv {
        println!("═══════════════════════════════════════════════════════════");
        println!("       SEQUENTIAL MONTE CARLO PI");
        println!("═══════════════════════════════════════════════════════════");
        println!("Configuration:");
        println!("  Samples: {}", args.samples);
        println!("  Seed: {}", args.seed);
        println!("  Mode: Sequential (single-threaded)");
        println!("═══════════════════════════════════════════════════════════");
        println!("\nSampling...\n");
    }

    let start_time = Instant::now();
    let mut rng = StdRng::seed_from_u64(args.seed);
    let hits = count_hits(args.samples, &mut rng);
    let pi = match estimate(hits, args.samples) {
        Ok(pi) => pi,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    let elapsed = start_time.elapsed();
    debug!(hits, samples = args.samples, "sampling done");

    let report = EstimateReport {
        label: "results".to_string(),
        samples: args.samples,
        hits,
        nodes: 1,
        seeding: Seeding::Fixed,
        estimate: pi,
        elapsed,
        counts: vec![],
    };
    ConsoleReporter::new(args.csv, args.verbose).report_estimate(&report);
}
