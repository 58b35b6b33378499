//! Task and result messages
//!
//! ```text
//! Tagged layout (MPI):
//!   master -> worker   tag 1: low    tag 2: high    tag 3: input rows
//!   worker -> master   tag 4: low    tag 5: high    tag 6: output rows
//!
//! Structured layout (TCP, local):
//!   master -> worker   tag 1: block { low, high, input rows }
//!   worker -> master   tag 4: block { low, high, output rows }
//! ```
//!
//! With the tagged layout the receiver must ask for low, high and rows in that
//! order; tags carry no ordering between each other.

use crate::error::{Error, Result, TransportError};
use crate::partition::RowRange;
use crate::transport::{Layout, Payload, PayloadKind, Rank, SendRequest, Tag, Transport};

pub const MASTER_TO_WORKER_TAG: Tag = 1;
pub const WORKER_TO_MASTER_TAG: Tag = 4;

/// Rows a worker must transform, and their input values.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub range: RowRange,
    pub input: Vec<f64>,
}

/// Rows a worker transformed, and their output values.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskResult {
    pub range: RowRange,
    pub output: Vec<f64>,
}

fn send_block<T: Transport + ?Sized>(
    transport: &T,
    dest: Rank,
    base_tag: Tag,
    range: RowRange,
    values: Vec<f64>,
) -> Result<Vec<SendRequest>> {
    let requests = match transport.layout() {
        Layout::Tagged => vec![
            transport.send_async(dest, base_tag, Payload::Bound(range.low as u64))?,
            transport.send_async(dest, base_tag + 1, Payload::Bound(range.high as u64))?,
            transport.send_async(dest, base_tag + 2, Payload::Rows(values))?,
        ],
        Layout::Structured => {
            vec![transport.send_async(dest, base_tag, Payload::Block { range, values })?]
        }
    };
    Ok(requests)
}

pub(crate) fn recv_bound<T>(transport: &T, source: Rank, tag: Tag) -> Result<u64>
where
    T: Transport + ?Sized,
{
    match transport.recv_blocking(source, tag, PayloadKind::Bound)? {
        Payload::Bound(value) => Ok(value),
        other => Err(unexpected(source, tag, PayloadKind::Bound, &other)),
    }
}

fn unexpected(source: Rank, tag: Tag, expected: PayloadKind, found: &Payload) -> Error {
    TransportError::Mismatch {
        peer: source,
        tag,
        expected,
        found: found.kind(),
    }
    .into()
}

fn to_index(value: u64) -> Result<usize> {
    usize::try_from(value).map_err(|_| {
        TransportError::Malformed(format!("row index {} overflows usize", value)).into()
    })
}

fn recv_block<T: Transport + ?Sized>(
    transport: &T,
    source: Rank,
    base_tag: Tag,
    cols: usize,
) -> Result<(RowRange, Vec<f64>)> {
    let (range, values) = match transport.layout() {
        Layout::Tagged => {
            let low = recv_bound(transport, source, base_tag)?;
            let high = recv_bound(transport, source, base_tag + 1)?;
            if low > high {
                return Err(Error::InvertedBounds { low, high });
            }
            let range = RowRange::new(to_index(low)?, to_index(high)?);

            let tag = base_tag + 2;
            match transport.recv_blocking(source, tag, PayloadKind::Rows)? {
                Payload::Rows(values) => (range, values),
                other => return Err(unexpected(source, tag, PayloadKind::Rows, &other)),
            }
        }
        Layout::Structured => {
            match transport.recv_blocking(source, base_tag, PayloadKind::Block)? {
                Payload::Block { range, values } => (range, values),
                other => return Err(unexpected(source, base_tag, PayloadKind::Block, &other)),
            }
        }
    };

    let expected = range.len().checked_mul(cols).ok_or_else(|| {
        TransportError::Malformed(format!("rows {} of width {} overflow", range, cols))
    })?;
    if values.len() != expected {
        return Err(Error::SliceLength {
            range,
            expected,
            actual: values.len(),
        });
    }

    Ok((range, values))
}

/// Hand `task` to worker `dest` without waiting for it.
pub fn send_task<T: Transport + ?Sized>(
    transport: &T,
    dest: Rank,
    task: Task,
) -> Result<Vec<SendRequest>> {
    send_block(transport, dest, MASTER_TO_WORKER_TAG, task.range, task.input)
}

/// Block until the master's task arrives.
pub fn recv_task<T: Transport + ?Sized>(transport: &T, master: Rank, cols: usize) -> Result<Task> {
    let (range, input) = recv_block(transport, master, MASTER_TO_WORKER_TAG, cols)?;
    Ok(Task { range, input })
}

pub fn send_result<T: Transport + ?Sized>(
    transport: &T,
    master: Rank,
    result: TaskResult,
) -> Result<Vec<SendRequest>> {
    send_block(transport, master, WORKER_TO_MASTER_TAG, result.range, result.output)
}

/// Block until worker `source` returns its result.
pub fn recv_result<T: Transport + ?Sized>(
    transport: &T,
    source: Rank,
    cols: usize,
) -> Result<TaskResult> {
    let (range, output) = recv_block(transport, source, WORKER_TO_MASTER_TAG, cols)?;
    Ok(TaskResult { range, output })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::LocalTransport;

    fn task() -> Task {
        Task {
            range: RowRange::new(2, 4),
            input: vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
        }
    }

    #[test]
    fn test_task_over_both_layouts() {
        for layout in [Layout::Tagged, Layout::Structured] {
            let mesh = LocalTransport::mesh(2, layout);
            let requests = send_task(&mesh[0], 1, task()).unwrap();
            let expected_messages = if layout == Layout::Tagged { 3 } else { 1 };
            assert_eq!(requests.len(), expected_messages);
            SendRequest::wait_all(requests).unwrap();

            assert_eq!(recv_task(&mesh[1], 0, 3).unwrap(), task());
        }
    }

    #[test]
    fn test_result_goes_to_master() {
        let mesh = LocalTransport::mesh(3, Layout::Tagged);
        let result = TaskResult {
            range: RowRange::new(5, 6),
            output: vec![0.25, 0.5],
        };
        SendRequest::wait_all(send_result(&mesh[2], 0, result.clone()).unwrap()).unwrap();
        assert_eq!(recv_result(&mesh[0], 2, 2).unwrap(), result);
    }

    #[test]
    fn test_wrong_slice_length_is_rejected() {
        let mesh = LocalTransport::mesh(2, Layout::Structured);
        SendRequest::wait_all(send_task(&mesh[0], 1, task()).unwrap()).unwrap();

        // two rows of four columns would be eight values
        let err = recv_task(&mesh[1], 0, 4).unwrap_err();
        assert!(matches!(
            err,
            Error::SliceLength {
                expected: 8,
                actual: 6,
                ..
            }
        ));
    }

    #[test]
    fn test_oversized_block_is_rejected() {
        let mesh = LocalTransport::mesh(2, Layout::Structured);
        let block = Payload::Block {
            range: RowRange::new(0, usize::MAX),
            values: vec![],
        };
        let _ = mesh[0].send_async(1, MASTER_TO_WORKER_TAG, block).unwrap();

        let err = recv_task(&mesh[1], 0, 2).unwrap_err();
        assert!(matches!(err, Error::Transport(TransportError::Malformed(_))));
    }

    #[test]
    fn test_inverted_bounds_are_rejected() {
        let mesh = LocalTransport::mesh(2, Layout::Tagged);
        let t = &mesh[0];
        let _ = t.send_async(1, MASTER_TO_WORKER_TAG, Payload::Bound(5)).unwrap();
        let _ = t.send_async(1, MASTER_TO_WORKER_TAG + 1, Payload::Bound(3)).unwrap();

        let err = recv_task(&mesh[1], 0, 1).unwrap_err();
        assert!(matches!(err, Error::InvertedBounds { low: 5, high: 3 }));
    }

    #[test]
    fn test_out_of_order_kinds_surface_as_mismatch() {
        let mesh = LocalTransport::mesh(2, Layout::Tagged);
        let t = &mesh[0];
        // rows sent where the low bound belongs
        let _ = t.send_async(1, MASTER_TO_WORKER_TAG, Payload::Rows(vec![1.0])).unwrap();

        let err = recv_task(&mesh[1], 0, 1).unwrap_err();
        assert!(matches!(
            err,
            Error::Transport(TransportError::Mismatch {
                expected: PayloadKind::Bound,
                ..
            })
        ));
    }
}
