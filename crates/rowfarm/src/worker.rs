//! Worker role: receive one task, transform it, send it back.
//!
//! ```text
//! AwaitingTask ──► Computing ──► SendingResult ──► Idle
//! ```
//!
//! A worker handles exactly one task per run.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::Result;
use crate::partition::RowRange;
use crate::protocol::{recv_task, send_result, TaskResult};
use crate::transform::apply_in_place;
use crate::transport::{SendRequest, Transport};
use crate::MASTER_RANK;

/// What one worker did, for logging and tests.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerSummary {
    pub range: RowRange,
    pub compute_time: Duration,
}

/// Run the worker side of the protocol over `transport`.
///
/// Returns once the result has left this rank; the master sends no acknowledgment.
pub fn run_worker<T, F>(transport: &T, cols: usize, transform: F) -> Result<WorkerSummary>
where
    T: Transport + ?Sized,
    F: Fn(f64) -> f64,
{
    let rank = transport.rank();

    debug!(rank, "awaiting task");
    let task = recv_task(transport, MASTER_RANK, cols)?;
    let range = task.range;

    debug!(rank, %range, "computing");
    let start = Instant::now();
    let mut values = task.input;
    apply_in_place(&mut values, transform);
    let compute_time = start.elapsed();

    debug!(rank, %range, ?compute_time, "sending result");
    let requests = send_result(
        transport,
        MASTER_RANK,
        TaskResult {
            range,
            output: values,
        },
    )?;
    SendRequest::wait_all(requests)?;

    Ok(WorkerSummary {
        range,
        compute_time,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{recv_result, send_task, Task};
    use crate::transport::{Layout, LocalTransport};

    #[test]
    fn test_worker_transforms_its_slice() {
        let mesh = LocalTransport::mesh(2, Layout::Tagged);
        let input: Vec<f64> = (0..6).map(|x| (x * x) as f64).collect();

        let requests = send_task(
            &mesh[0],
            1,
            Task {
                range: RowRange::new(3, 5),
                input,
            },
        )
        .unwrap();
        SendRequest::wait_all(requests).unwrap();

        let summary = run_worker(&mesh[1], 3, f64::sqrt).unwrap();
        assert_eq!(summary.range, RowRange::new(3, 5));

        let result = recv_result(&mesh[0], 1, 3).unwrap();
        assert_eq!(result.range, RowRange::new(3, 5));
        assert_eq!(result.output, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_worker_with_empty_range() {
        let mesh = LocalTransport::mesh(2, Layout::Structured);
        SendRequest::wait_all(
            send_task(
                &mesh[0],
                1,
                Task {
                    range: RowRange::new(4, 4),
                    input: vec![],
                },
            )
            .unwrap(),
        )
        .unwrap();

        run_worker(&mesh[1], 8, f64::sqrt).unwrap();
        let result = recv_result(&mesh[0], 1, 8).unwrap();
        assert!(result.output.is_empty());
    }
}
