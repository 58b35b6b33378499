//! Point-to-point message passing between ranks
//!
//! A [`Transport`] moves owned [`Payload`]s between two ranks on a numbered
//! [`Tag`]. Sends hand the payload over and return at once with a
//! [`SendRequest`]; receives block until a matching message arrives.
//!
//! Messages between the same (sender, receiver, tag) arrive in send order.
//! Nothing is ordered across tags, so a receiver asks for tags in the order
//! the sender used them. A receive with no matching sender blocks forever:
//! there is no timeout.

use std::collections::VecDeque;
use std::fmt;
use std::sync::mpsc;

use crate::error::TransportError;
use crate::partition::RowRange;

pub mod local;
#[cfg(feature = "mpi")]
pub mod mpi_comm;
pub mod tcp;

pub use local::LocalTransport;
#[cfg(feature = "mpi")]
pub use mpi_comm::MpiTransport;
pub use tcp::TcpTransport;

pub type Rank = usize;
pub type Tag = u32;

/// Message body.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// A single row index
    Bound(u64),
    /// Row values
    Rows(Vec<f64>),
    /// Bounds and values in one record
    Block { range: RowRange, values: Vec<f64> },
}

impl Payload {
    pub fn kind(&self) -> PayloadKind {
        match self {
            Payload::Bound(_) => PayloadKind::Bound,
            Payload::Rows(_) => PayloadKind::Rows,
            Payload::Block { .. } => PayloadKind::Block,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Bound,
    Rows,
    Block,
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadKind::Bound => write!(f, "bound"),
            PayloadKind::Rows => write!(f, "rows"),
            PayloadKind::Block => write!(f, "block"),
        }
    }
}

/// How a task or result is split into messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// Low bound, high bound and rows on tags `t`, `t + 1`, `t + 2`
    Tagged,
    /// One [`Payload::Block`] on tag `t`
    Structured,
}

/// Completion handle for [`Transport::send_async`].
///
/// The transport owns the payload until the request completes. Dropping a
/// request does not cancel the send.
#[must_use = "wait on the request before relying on delivery"]
#[derive(Debug)]
pub struct SendRequest {
    peer: Rank,
    pending: Option<mpsc::Receiver<Result<(), TransportError>>>,
}

impl SendRequest {
    /// A send that finished before `send_async` returned.
    pub fn complete(peer: Rank) -> Self {
        SendRequest {
            peer,
            pending: None,
        }
    }

    pub(crate) fn pending(peer: Rank, done: mpsc::Receiver<Result<(), TransportError>>) -> Self {
        SendRequest {
            peer,
            pending: Some(done),
        }
    }

    /// Block until the transport is finished with the payload.
    pub fn wait(self) -> Result<(), TransportError> {
        match self.pending {
            None => Ok(()),
            Some(done) => done
                .recv()
                .map_err(|_| TransportError::Disconnected { peer: self.peer })?,
        }
    }

    pub fn wait_all(
        requests: impl IntoIterator<Item = SendRequest>,
    ) -> Result<(), TransportError> {
        for request in requests {
            request.wait()?;
        }
        Ok(())
    }
}

pub trait Transport {
    /// Rank of this endpoint.
    fn rank(&self) -> Rank;

    /// Number of ranks in the topology.
    fn size(&self) -> usize;

    /// Message layout the protocol should use over this transport.
    fn layout(&self) -> Layout {
        Layout::Structured
    }

    /// Start sending `payload` to `dest` and return without waiting for the peer.
    fn send_async(
        &self,
        dest: Rank,
        tag: Tag,
        payload: Payload,
    ) -> Result<SendRequest, TransportError>;

    /// Block until a message from `source` on `tag` arrives.
    ///
    /// Fails with [`TransportError::Mismatch`] when that message is not a `kind`.
    fn recv_blocking(
        &self,
        source: Rank,
        tag: Tag,
        kind: PayloadKind,
    ) -> Result<Payload, TransportError>;
}

/// A message parked at the receiver.
#[derive(Debug)]
pub(crate) struct Envelope {
    pub source: Rank,
    pub tag: Tag,
    pub payload: Payload,
}

/// Messages read ahead of the tag a receiver asked for.
#[derive(Debug, Default)]
pub(crate) struct Parked {
    queue: VecDeque<Envelope>,
}

impl Parked {
    pub fn park(&mut self, envelope: Envelope) {
        self.queue.push_back(envelope);
    }

    /// Remove the oldest parked message for `(source, tag)`.
    pub fn take(&mut self, source: Rank, tag: Tag) -> Option<Payload> {
        let idx = self
            .queue
            .iter()
            .position(|e| e.source == source && e.tag == tag)?;
        self.queue.remove(idx).map(|e| e.payload)
    }
}

/// Check a received payload against the kind the caller expects.
pub(crate) fn expect_kind(
    payload: Payload,
    source: Rank,
    tag: Tag,
    expected: PayloadKind,
) -> Result<Payload, TransportError> {
    let found = payload.kind();
    if found != expected {
        return Err(TransportError::Mismatch {
            peer: source,
            tag,
            expected,
            found,
        });
    }
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parked_keeps_per_tag_order() {
        let mut parked = Parked::default();
        for (tag, v) in [(1, 10), (2, 20), (1, 11)] {
            parked.park(Envelope {
                source: 0,
                tag,
                payload: Payload::Bound(v),
            });
        }

        assert_eq!(parked.take(0, 1), Some(Payload::Bound(10)));
        assert_eq!(parked.take(0, 1), Some(Payload::Bound(11)));
        assert_eq!(parked.take(1, 2), None);
        assert_eq!(parked.take(0, 2), Some(Payload::Bound(20)));
        assert_eq!(parked.take(0, 2), None);
    }

    #[test]
    fn test_completed_request() {
        assert!(SendRequest::complete(3).wait().is_ok());
    }

    #[test]
    fn test_dropped_completion_reports_disconnect() {
        let (tx, rx) = mpsc::channel();
        drop(tx);
        let err = SendRequest::pending(2, rx).wait().unwrap_err();
        assert!(matches!(err, TransportError::Disconnected { peer: 2 }));
    }

    #[test]
    fn test_expect_kind() {
        assert!(expect_kind(Payload::Bound(1), 0, 1, PayloadKind::Bound).is_ok());
        let err = expect_kind(Payload::Rows(vec![]), 0, 1, PayloadKind::Bound).unwrap_err();
        assert!(matches!(
            err,
            TransportError::Mismatch {
                expected: PayloadKind::Bound,
                found: PayloadKind::Rows,
                ..
            }
        ));
    }
}
