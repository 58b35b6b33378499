//! Multithreaded Matrix Transform
//!
//! Shared-memory baseline for the distributed version: the same transform,
//! with rows spread over a rayon thread pool instead of over processes.
//!
//! # Parallelization Strategy
//!
//! 1. Generate the input matrix on the main thread
//! 2. Split the output into rows; rayon hands rows to idle threads
//! 3. Each row is transformed independently (no synchronization needed)

use std::time::Instant;

use clap::Parser;
use rayon::ThreadPoolBuilder;
use rowfarm::report::print_matrices;
use rowfarm::{ConsoleReporter, Generator, Matrix, Reporter, RunReport, Transform};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Multithreaded elementwise matrix transform
#[derive(Parser, Debug)]
#[command(name = "matrix-multithread")]
#[command(about = "Transform every cell of a matrix using multiple threads", long_about = None)]
struct Args {
    /// Number of rows
    #[arg(short, long, env = "ROWFARM_ROWS", default_value_t = 8192)]
    rows: usize,

    /// Number of columns
    #[arg(short, long, env = "ROWFARM_COLS", default_value_t = 8192)]
    cols: usize,

    /// Number of threads to use
    #[arg(short = 'j', long, env = "ROWFARM_THREADS", default_value_t = 4)]
    threads: usize,

    /// Input generator
    #[arg(short, long, value_enum, env = "ROWFARM_GENERATOR", default_value_t = Generator::Product)]
    generator: Generator,

    /// Elementwise transform
    #[arg(short, long, value_enum, env = "ROWFARM_TRANSFORM", default_value_t = Transform::Sqrt)]
    transform: Transform,

    /// Print input and output matrices (warning: can be very long)
    #[arg(long, default_value_t = false)]
    print: bool,

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

    // Validate thread count
    let num_threads = if args.threads == 0 { 1 } else { args.threads };

    if !args.csv {
        println!("═══════════════════════════════════════════════════════════");
        println!("       MULTITHREADED MATRIX TRANSFORM");
        println!("═══════════════════════════════════════════════════════════");
        println!("Configuration:");
        println!("  Matrix: {} x {}", args.rows, args.cols);
        println!("  Input: value(i, j) = {}", args.generator);
        println!("  Transform: {}", args.transform);
        println!("  Threads: {}", num_threads);
        println!("  Mode: Parallel (rayon thread pool)");
        println!("═══════════════════════════════════════════════════════════");
        println!("\nTransforming...\n");
    }

    let pool = match ThreadPoolBuilder::new().num_threads(num_threads).build() {
        Ok(pool) => pool,
        Err(e) => {
            eprintln!("Thread pool error: {}", e);
            std::process::exit(1);
        }
    };

    let generator = args.generator;
    let input = Matrix::from_fn(args.rows, args.cols, |i, j| generator.value(i, j));
    debug!(rows = args.rows, cols = args.cols, threads = num_threads, "input generated");

    let transform = args.transform.function();
    let start_time = Instant::now();
    let output = pool.install(|| input.par_map(transform));
    let elapsed = start_time.elapsed();

    let report = RunReport::local("results", &output, num_threads, args.transform, elapsed);
    ConsoleReporter::new(args.csv, args.verbose).report(&report);

    if args.print {
        print_matrices(&input, &output);
    }
}
