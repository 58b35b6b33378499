//! In-process transport: one endpoint per rank, wired by channels.
//!
//! Every rank owns an unbounded inbox. A send moves the payload into the
//! destination's inbox and completes immediately; a receive drains the inbox
//! until the requested `(source, tag)` shows up, parking anything else.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Mutex;

use tracing::trace;

use super::{
    expect_kind, Envelope, Layout, Parked, Payload, PayloadKind, Rank, SendRequest, Tag,
    Transport,
};
use crate::error::TransportError;

struct Inbox {
    receiver: Receiver<Envelope>,
    parked: Parked,
}

pub struct LocalTransport {
    rank: Rank,
    layout: Layout,
    peers: Vec<Sender<Envelope>>,
    inbox: Mutex<Inbox>,
}

impl LocalTransport {
    /// Create `size` connected endpoints; endpoint `k` has rank `k`.
    pub fn mesh(size: usize, layout: Layout) -> Vec<LocalTransport> {
        let (senders, receivers): (Vec<_>, Vec<_>) = (0..size).map(|_| mpsc::channel()).unzip();

        receivers
            .into_iter()
            .enumerate()
            .map(|(rank, receiver)| LocalTransport {
                rank,
                layout,
                peers: senders.clone(),
                inbox: Mutex::new(Inbox {
                    receiver,
                    parked: Parked::default(),
                }),
            })
            .collect()
    }
}

impl Transport for LocalTransport {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn size(&self) -> usize {
        self.peers.len()
    }

    fn layout(&self) -> Layout {
        self.layout
    }

    fn send_async(
        &self,
        dest: Rank,
        tag: Tag,
        payload: Payload,
    ) -> Result<SendRequest, TransportError> {
        let peer = self.peers.get(dest).ok_or(TransportError::UnknownPeer {
            rank: dest,
            from: self.rank,
        })?;

        trace!(from = self.rank, to = dest, tag, kind = %payload.kind(), "send");

        peer.send(Envelope {
            source: self.rank,
            tag,
            payload,
        })
        .map_err(|_| TransportError::Disconnected { peer: dest })?;

        Ok(SendRequest::complete(dest))
    }

    fn recv_blocking(
        &self,
        source: Rank,
        tag: Tag,
        kind: PayloadKind,
    ) -> Result<Payload, TransportError> {
        if source >= self.peers.len() {
            return Err(TransportError::UnknownPeer {
                rank: source,
                from: self.rank,
            });
        }

        let mut inbox = self
            .inbox
            .lock()
            .map_err(|_| TransportError::Disconnected { peer: self.rank })?;

        if let Some(payload) = inbox.parked.take(source, tag) {
            return expect_kind(payload, source, tag, kind);
        }

        loop {
            // Every endpoint keeps a sender to its own inbox, so this only
            // fails once the whole mesh is gone.
            let envelope = inbox
                .receiver
                .recv()
                .map_err(|_| TransportError::Disconnected { peer: source })?;

            if envelope.source == source && envelope.tag == tag {
                trace!(at = self.rank, from = source, tag, "recv");
                return expect_kind(envelope.payload, source, tag, kind);
            }
            inbox.parked.park(envelope);
        }
    }
}
