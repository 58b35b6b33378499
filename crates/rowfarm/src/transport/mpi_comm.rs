//! MPI transport, available with the `mpi` feature.
//!
//! Sends use `MPI_Bsend`: the payload is copied into a buffer attached to the
//! process and the call returns without waiting for the receiver. The buffer
//! must be large enough for everything a rank sends before it is detached,
//! so callers size it with [`MpiTransport::reserve_send_buffer`] from the
//! run's [`Plan`](crate::partition::Plan). Dropping the transport detaches the
//! buffer, which waits for every buffered message to leave.
//!
//! MPI has no variable-length record type here, so tasks and results travel
//! with the tagged layout: low, high and rows as three messages.

use mpi::environment::Universe;
use mpi::topology::SimpleCommunicator;
use mpi::traits::*;
use tracing::{debug, trace};

use super::{Layout, Payload, PayloadKind, Rank, SendRequest, Tag, Transport};
use crate::error::TransportError;

/// Per-message bookkeeping `MPI_Bsend` keeps inside the attached buffer.
/// Implementations use well under this.
const BSEND_OVERHEAD: usize = 1024;

pub struct MpiTransport {
    // Must drop before `universe`, which finalizes MPI.
    world: SimpleCommunicator,
    universe: Universe,
    rank: Rank,
    size: usize,
}

impl MpiTransport {
    /// Initialize MPI and wrap the world communicator.
    pub fn initialize() -> Result<Self, TransportError> {
        let universe = mpi::initialize()
            .ok_or_else(|| TransportError::Bootstrap("MPI was already initialized".to_string()))?;
        let world = universe.world();
        let rank = world.rank() as Rank;
        let size = world.size() as usize;

        Ok(MpiTransport {
            world,
            universe,
            rank,
            size,
        })
    }

    /// Attach a buffered-send area large enough for `bytes` of payload in `messages` sends.
    pub fn reserve_send_buffer(&mut self, bytes: usize, messages: usize) {
        if messages == 0 {
            return;
        }
        let size = bytes + messages * BSEND_OVERHEAD;
        debug!(rank = self.rank, size, "attaching send buffer");
        self.universe.set_buffer_size(size);
    }

    fn check_peer(&self, rank: Rank) -> Result<mpi::Rank, TransportError> {
        if rank >= self.size || rank == self.rank {
            return Err(TransportError::UnknownPeer {
                rank,
                from: self.rank,
            });
        }
        Ok(rank as mpi::Rank)
    }
}

impl Transport for MpiTransport {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn layout(&self) -> Layout {
        Layout::Tagged
    }

    fn send_async(
        &self,
        dest: Rank,
        tag: Tag,
        payload: Payload,
    ) -> Result<SendRequest, TransportError> {
        let process = self.world.process_at_rank(self.check_peer(dest)?);
        let mpi_tag = tag as mpi::Tag;

        trace!(from = self.rank, to = dest, tag, kind = %payload.kind(), "bsend");

        match payload {
            Payload::Bound(value) => process.buffered_send_with_tag(&value, mpi_tag),
            Payload::Rows(values) => process.buffered_send_with_tag(&values[..], mpi_tag),
            Payload::Block { .. } => {
                return Err(TransportError::Unsupported(
                    "structured blocks over MPI; use the tagged layout",
                ))
            }
        }

        // The payload now lives in the attached buffer.
        Ok(SendRequest::complete(dest))
    }

    fn recv_blocking(
        &self,
        source: Rank,
        tag: Tag,
        kind: PayloadKind,
    ) -> Result<Payload, TransportError> {
        let process = self.world.process_at_rank(self.check_peer(source)?);
        let mpi_tag = tag as mpi::Tag;

        let payload = match kind {
            PayloadKind::Bound => {
                let (value, _status) = process.receive_with_tag::<u64>(mpi_tag);
                Payload::Bound(value)
            }
            PayloadKind::Rows => {
                let (values, _status) = process.receive_vec_with_tag::<f64>(mpi_tag);
                Payload::Rows(values)
            }
            PayloadKind::Block => {
                return Err(TransportError::Unsupported(
                    "structured blocks over MPI; use the tagged layout",
                ))
            }
        };

        trace!(at = self.rank, from = source, tag, "recv");
        Ok(payload)
    }
}
