//! Sequential Matrix Transform
//!
//! Generates the input matrix and applies the transform to every cell in a
//! single thread. Used as the baseline, and as the reference result, for the
//! multithreaded and distributed versions.

use std::time::Instant;

use clap::Parser;
use rowfarm::report::print_matrices;
use rowfarm::{ConsoleReporter, Generator, Matrix, Reporter, RunReport, Transform};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Sequential elementwise matrix transform
#[derive(Parser, Debug)]
#[command(name = "matrix-sequential")]
#[command(about = "Transform every cell of a matrix sequentially", long_about = None)]
struct Args {
    /// Number of rows
    #[arg(short, long, env = "ROWFARM_ROWS", default_value_t = 8192)]
    rows: usize,

    /// Number of columns
    #[arg(short, long, env = "ROWFARM_COLS", default_value_t = 8192)]
    cols: usize,

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

    if !args.csv {
        println!("═══════════════════════════════════════════════════════════");
        println!("       SEQUENTIAL MATRIX TRANSFORM");
        println!("═══════════════════════════════════════════════════════════");
        println!("Configuration:");
        println!("  Matrix: {} x {}", args.rows, args.cols);
        println!("  Input: value(i, j) = {}", args.generator);
        println!("  Transform: {}", args.transform);
        println!("  Mode: Sequential (single-threaded)");
        println!("═══════════════════════════════════════════════════════════");
        println!("\nTransforming...\n");
    }

    let generator = args.generator;
    let input = Matrix::from_fn(args.rows, args.cols, |i, j| generator.value(i, j));
    debug!(rows = args.rows, cols = args.cols, "input generated");

    // Timing covers the transform only, like the distributed runs.
    let start_time = Instant::now();
    let output = input.map(args.transform.function());
    let elapsed = start_time.elapsed();

    let report = RunReport::local("results", &output, 1, args.transform, elapsed);
    ConsoleReporter::new(args.csv, args.verbose).report(&report);

    if args.print {
        print_matrices(&input, &output);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_constants() {
        let args = Args::parse_from(["matrix-sequential"]);
        assert_eq!((args.rows, args.cols), (8192, 8192));
        assert_eq!(args.transform, Transform::Sqrt);
        assert_eq!(args.generator, Generator::Product);
    }

    #[test]
    fn test_small_sqrt() {
        let input = Matrix::from_fn(4, 4, |i, j| Generator::Product.value(i, j));
        let output = input.map(Transform::Sqrt.function());
        assert_eq!(output.get(3, 3), 3.0);
        assert_eq!(output.get(2, 2), 2.0);
        assert_eq!(output.get(1, 3), 3f64.sqrt());
    }

    #[test]
    fn test_parse_options() {
        let args =
            Args::parse_from(["matrix-sequential", "-r", "10", "-c", "3", "-t", "cbrt", "--csv"]);
        assert_eq!((args.rows, args.cols), (10, 3));
        assert_eq!(args.transform, Transform::Cbrt);
        assert!(args.csv);
    }
}
