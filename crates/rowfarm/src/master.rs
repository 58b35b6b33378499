//! Master role
//!
//! ```text
//! Initializing ──► Dispatching ──► ComputingOwnShare ──► Gathering ──► Done
//! ```
//!
//! Dispatch never waits on a worker: every task is handed to the transport
//! up front. Gathering walks the workers in rank order, so a slow worker holds
//! up collection from every later rank even if those already finished.

use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::matrix::Matrix;
use crate::orchestrator::JobConfig;
use crate::partition::Plan;
use crate::protocol::{recv_result, send_task, Task};
use crate::transform::apply_rows;
use crate::transport::{SendRequest, Transport};

/// Everything the master holds once a run is over.
#[derive(Debug, Clone)]
pub struct MasterOutcome {
    pub input: Matrix,
    pub output: Matrix,
    /// Distribute, compute and gather; input generation is excluded.
    pub elapsed: Duration,
    pub plan: Plan,
}

impl MasterOutcome {
    /// Compare the gathered output with a sequential pass over the input.
    pub fn verify(&self, transform: impl Fn(f64) -> f64) -> Result<()> {
        let reference = self.input.map(transform);
        match reference.first_difference(&self.output) {
            None => Ok(()),
            Some((row, col)) => Err(Error::Verification { row, col }),
        }
    }
}

/// Run the master side of the protocol over `transport`.
pub fn run_master<T, G, F>(
    transport: &T,
    job: &JobConfig,
    generator: G,
    transform: F,
) -> Result<MasterOutcome>
where
    T: Transport + ?Sized,
    G: Fn(usize, usize) -> f64,
    F: Fn(f64) -> f64,
{
    let (rows, cols) = (job.rows, job.cols);

    debug!(rows, cols, "initializing");
    let input = Matrix::from_fn(rows, cols, generator);
    let mut output = Matrix::zeros(rows, cols);
    let plan = Plan::new(rows, transport.size(), job.share)?;

    let start = Instant::now();

    let mut requests: Vec<SendRequest> = Vec::with_capacity(3 * plan.worker_count());
    for (rank, range) in plan.assignments() {
        debug!(rank, %range, "dispatching");
        let task = Task {
            range,
            input: input.row_slice(range)?.to_vec(),
        };
        requests.extend(send_task(transport, rank, task)?);
    }

    if let Some(range) = plan.master_share() {
        debug!(%range, "computing own share");
        apply_rows(input.row_slice(range)?, output.row_slice_mut(range)?, &transform);
    }

    for (rank, expected) in plan.assignments() {
        let result = recv_result(transport, rank, cols)?;
        if result.range != expected {
            return Err(Error::RangeMismatch {
                rank,
                expected,
                received: result.range,
            });
        }
        output.write_rows(result.range, &result.output)?;
        debug!(rank, range = %result.range, "gathered");
    }

    SendRequest::wait_all(requests)?;
    let elapsed = start.elapsed();

    info!(
        rows,
        cols,
        ranks = plan.size(),
        elapsed_ms = elapsed.as_secs_f64() * 1000.0,
        "run complete"
    );

    Ok(MasterOutcome {
        input,
        output,
        elapsed,
        plan,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::{RowRange, SharePolicy};
    use crate::protocol::{recv_task, send_result, TaskResult, WORKER_TO_MASTER_TAG};
    use crate::transform::{Generator, Transform};
    use crate::transport::{Layout, LocalTransport, Payload};
    use std::thread;

    fn job(rows: usize, cols: usize) -> JobConfig {
        JobConfig {
            rows,
            cols,
            share: SharePolicy::Reserved,
            generator: Generator::Product,
            transform: Transform::Sqrt,
        }
    }

    #[test]
    fn test_master_alone_computes_everything() {
        let mesh = LocalTransport::mesh(1, Layout::Structured);
        let outcome = run_master(&mesh[0], &job(4, 4), |i, j| (i * j) as f64, f64::sqrt).unwrap();

        let reference = outcome.input.map(f64::sqrt);
        assert_eq!(outcome.output, reference);
        outcome.verify(f64::sqrt).unwrap();
        assert!(matches!(
            outcome.verify(f64::cbrt),
            Err(Error::Verification { row: 1, col: 2 })
        ));
        assert_eq!(outcome.plan.master_share(), Some(RowRange::new(0, 4)));
    }

    #[test]
    fn test_master_rejects_foreign_range() {
        let mut mesh = LocalTransport::mesh(2, Layout::Structured);
        let worker = mesh.pop().unwrap();
        let master = mesh.pop().unwrap();

        // A misbehaving worker that answers for the wrong rows.
        let handle = thread::spawn(move || {
            let task = recv_task(&worker, 0, 3).unwrap();
            let requests = send_result(
                &worker,
                0,
                TaskResult {
                    range: RowRange::new(0, task.range.len()),
                    output: task.input,
                },
            )
            .unwrap();
            SendRequest::wait_all(requests).unwrap();
        });

        let err = run_master(&master, &job(4, 3), |i, j| (i * j) as f64, f64::sqrt).unwrap_err();
        handle.join().unwrap();

        assert!(matches!(
            err,
            Error::RangeMismatch {
                rank: 1,
                expected: RowRange { low: 2, high: 4 },
                ..
            }
        ));
    }

    #[test]
    fn test_master_rejects_short_result() {
        let mut mesh = LocalTransport::mesh(2, Layout::Structured);
        let worker = mesh.pop().unwrap();
        let master = mesh.pop().unwrap();

        let handle = thread::spawn(move || {
            let task = recv_task(&worker, 0, 2).unwrap();
            let _ = worker
                .send_async(
                    0,
                    WORKER_TO_MASTER_TAG,
                    Payload::Block {
                        range: task.range,
                        values: vec![1.0],
                    },
                )
                .unwrap();
        });

        let err = run_master(&master, &job(4, 2), |i, j| (i * j) as f64, f64::sqrt).unwrap_err();
        handle.join().unwrap();
        assert!(matches!(err, Error::SliceLength { actual: 1, .. }));
    }
}
