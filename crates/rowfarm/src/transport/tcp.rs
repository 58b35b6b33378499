//! TCP transport (fallback when MPI is not available)
//!
//! # Topology
//!
//! ```text
//!             ┌──────────────┐
//!             │   Rank 0     │  listens, accepts workers in order
//!             │  (Master)    │  and assigns ranks 1, 2, ...
//!             └──┬───────┬───┘
//!                │       │
//!        ┌───────┘       └───────┐
//!  ┌─────▼──────┐          ┌─────▼──────┐
//!  │   Rank 1   │          │   Rank 2   │
//!  │  (Worker)  │          │  (Worker)  │
//!  └────────────┘          └────────────┘
//! ```
//!
//! Workers only talk to the master.
//!
//! # Wire format
//!
//! Handshake, master to worker: `"RFRM" | rank u64 | size u64 | cols u64`.
//! The worker takes its rank, the topology size and the matrix width from it.
//!
//! Frames, both directions, little-endian:
//!
//! ```text
//! len u64 | tag u32 | kind u8 | body
//!
//! kind 1 (bound): value u64
//! kind 2 (rows):  count u64 | count * f64
//! kind 3 (block): low u64 | high u64 | count u64 | count * f64
//! ```
//!
//! `len` counts the bytes after itself and may not exceed [`MAX_FRAME_LEN`].
//!
//! Each peer gets a writer thread so `send_async` never blocks on the socket.
//! Receives read the peer's stream on the calling thread and park frames
//! carrying other tags until someone asks for them.

use std::io::{self, BufReader, BufWriter, Read, Write};
use std::net::{TcpListener, TcpStream, ToSocketAddrs};
use std::sync::mpsc::{self, Sender};
use std::sync::Mutex;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, trace, warn};

use super::{
    expect_kind, Envelope, Parked, Payload, PayloadKind, Rank, SendRequest, Tag, Transport,
};
use crate::error::TransportError;
use crate::partition::RowRange;
use crate::MASTER_RANK;

pub const DEFAULT_MASTER_ADDR: &str = "127.0.0.1:7878";

/// Largest frame body a peer may announce: 16 times a full 8192 x 8192 matrix.
pub const MAX_FRAME_LEN: u64 = 1 << 33;

const HANDSHAKE_MAGIC: &[u8; 4] = b"RFRM";
const HANDSHAKE_LEN: usize = 4 + 3 * 8;

const KIND_BOUND: u8 = 1;
const KIND_ROWS: u8 = 2;
const KIND_BLOCK: u8 = 3;

fn push_values(data: &mut Vec<u8>, values: &[f64]) {
    data.extend(&(values.len() as u64).to_le_bytes());
    for &v in values {
        data.extend(&v.to_le_bytes());
    }
}

/// Serialize one frame, length prefix included.
pub(crate) fn encode_frame(tag: Tag, payload: &Payload) -> Vec<u8> {
    let mut data = Vec::new();
    data.extend(&[0u8; 8]);
    data.extend(&tag.to_le_bytes());

    match payload {
        Payload::Bound(value) => {
            data.push(KIND_BOUND);
            data.extend(&value.to_le_bytes());
        }
        Payload::Rows(values) => {
            data.push(KIND_ROWS);
            push_values(&mut data, values);
        }
        Payload::Block { range, values } => {
            data.push(KIND_BLOCK);
            data.extend(&(range.low as u64).to_le_bytes());
            data.extend(&(range.high as u64).to_le_bytes());
            push_values(&mut data, values);
        }
    }

    let len = (data.len() - 8) as u64;
    data[..8].copy_from_slice(&len.to_le_bytes());
    data
}

struct FrameCursor<'a> {
    bytes: &'a [u8],
}

impl<'a> FrameCursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], TransportError> {
        if self.bytes.len() < n {
            return Err(TransportError::Malformed(format!(
                "needed {} more bytes, {} left",
                n,
                self.bytes.len()
            )));
        }
        let (head, tail) = self.bytes.split_at(n);
        self.bytes = tail;
        Ok(head)
    }

    fn u8(&mut self) -> Result<u8, TransportError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, TransportError> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(buf))
    }

    fn u64(&mut self) -> Result<u64, TransportError> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(buf))
    }

    fn index(&mut self) -> Result<usize, TransportError> {
        let value = self.u64()?;
        usize::try_from(value)
            .map_err(|_| TransportError::Malformed(format!("index {} overflows usize", value)))
    }

    fn values(&mut self) -> Result<Vec<f64>, TransportError> {
        let count = self.index()?;
        let byte_len = count
            .checked_mul(8)
            .ok_or_else(|| TransportError::Malformed(format!("value count {} overflows", count)))?;
        let raw = self.take(byte_len)?;

        Ok(raw
            .chunks_exact(8)
            .map(|chunk| {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(chunk);
                f64::from_le_bytes(buf)
            })
            .collect())
    }
}

/// Parse a frame body (everything after the length prefix).
pub(crate) fn decode_frame(frame: &[u8]) -> Result<(Tag, Payload), TransportError> {
    let mut cursor = FrameCursor { bytes: frame };
    let tag = cursor.u32()?;

    let payload = match cursor.u8()? {
        KIND_BOUND => Payload::Bound(cursor.u64()?),
        KIND_ROWS => Payload::Rows(cursor.values()?),
        KIND_BLOCK => {
            let low = cursor.index()?;
            let high = cursor.index()?;
            if low > high {
                return Err(TransportError::Malformed(format!(
                    "block bounds inverted: {} > {}",
                    low, high
                )));
            }
            Payload::Block {
                range: RowRange::new(low, high),
                values: cursor.values()?,
            }
        }
        other => {
            return Err(TransportError::Malformed(format!(
                "unknown payload kind {}",
                other
            )))
        }
    };

    if !cursor.bytes.is_empty() {
        return Err(TransportError::Malformed(format!(
            "{} trailing bytes",
            cursor.bytes.len()
        )));
    }

    Ok((tag, payload))
}

fn read_frame(reader: &mut impl Read) -> Result<(Tag, Payload), TransportError> {
    let mut len_buf = [0u8; 8];
    reader.read_exact(&mut len_buf)?;
    let len = u64::from_le_bytes(len_buf);
    if len > MAX_FRAME_LEN {
        return Err(TransportError::Malformed(format!(
            "frame length {} exceeds {}",
            len, MAX_FRAME_LEN
        )));
    }

    // Grow with the bytes that actually arrive rather than trusting `len`.
    let mut frame = Vec::new();
    Read::by_ref(reader).take(len).read_to_end(&mut frame)?;
    if (frame.len() as u64) < len {
        return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
    }
    decode_frame(&frame)
}

/// What a worker learns from the master when it joins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Session {
    rank: Rank,
    size: usize,
    cols: usize,
}

fn write_handshake(stream: &mut TcpStream, session: Session) -> io::Result<()> {
    let mut data = Vec::with_capacity(HANDSHAKE_LEN);
    data.extend(HANDSHAKE_MAGIC);
    data.extend(&(session.rank as u64).to_le_bytes());
    data.extend(&(session.size as u64).to_le_bytes());
    data.extend(&(session.cols as u64).to_le_bytes());
    stream.write_all(&data)?;
    stream.flush()
}

fn read_handshake(stream: &mut TcpStream) -> Result<Session, TransportError> {
    let mut data = [0u8; HANDSHAKE_LEN];
    stream.read_exact(&mut data)?;

    if &data[..4] != HANDSHAKE_MAGIC {
        return Err(TransportError::Handshake("peer is not a rowfarm master".to_string()));
    }

    let mut cursor = FrameCursor { bytes: &data[4..] };
    let session = Session {
        rank: cursor.index()?,
        size: cursor.index()?,
        cols: cursor.index()?,
    };

    if session.rank == MASTER_RANK || session.rank >= session.size {
        return Err(TransportError::Handshake(format!(
            "assigned rank {} is invalid for size {}",
            session.rank, session.size
        )));
    }

    Ok(session)
}

struct Outgoing {
    frame: Vec<u8>,
    done: Sender<Result<(), TransportError>>,
}

struct PeerReader {
    stream: BufReader<TcpStream>,
    parked: Parked,
}

struct PeerLink {
    outgoing: Option<Sender<Outgoing>>,
    writer: Option<JoinHandle<()>>,
    reader: Mutex<PeerReader>,
}

impl PeerLink {
    fn new(peer: Rank, stream: TcpStream) -> Result<Self, TransportError> {
        stream.set_nodelay(true)?;
        let write_half = stream.try_clone()?;

        let (tx, rx) = mpsc::channel::<Outgoing>();
        let writer = thread::Builder::new()
            .name(format!("rowfarm-tx-{}", peer))
            .spawn(move || {
                let mut stream = BufWriter::new(write_half);
                for out in rx {
                    let result = stream
                        .write_all(&out.frame)
                        .and_then(|_| stream.flush())
                        .map_err(TransportError::from);
                    // The requester may have dropped its handle.
                    let _ = out.done.send(result);
                }
            })?;

        Ok(PeerLink {
            outgoing: Some(tx),
            writer: Some(writer),
            reader: Mutex::new(PeerReader {
                stream: BufReader::new(stream),
                parked: Parked::default(),
            }),
        })
    }
}

pub struct TcpTransport {
    rank: Rank,
    size: usize,
    /// Matrix width announced by the master.
    cols: usize,
    /// Indexed by rank; `None` where there is no direct link.
    peers: Vec<Option<PeerLink>>,
}

impl TcpTransport {
    /// Bind `addr` and accept `workers` connections as the master.
    pub fn listen(
        addr: impl ToSocketAddrs,
        workers: usize,
        cols: usize,
    ) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)?;
        info!(addr = %listener.local_addr()?, workers, "master listening");
        Self::accept_workers(&listener, workers, cols)
    }

    /// Accept `workers` connections on an already bound listener.
    ///
    /// The i-th accepted connection becomes rank `i + 1` and is told the
    /// matrix width `cols`.
    pub fn accept_workers(
        listener: &TcpListener,
        workers: usize,
        cols: usize,
    ) -> Result<Self, TransportError> {
        let size = workers + 1;
        let mut peers = Vec::with_capacity(size);
        peers.push(None);

        for i in 0..workers {
            let rank = i + 1;
            let (mut stream, addr) = listener.accept()?;
            write_handshake(&mut stream, Session { rank, size, cols })?;
            info!(rank, %addr, "worker connected");
            peers.push(Some(PeerLink::new(rank, stream)?));
        }

        Ok(TcpTransport {
            rank: MASTER_RANK,
            size,
            cols,
            peers,
        })
    }

    /// Connect to the master as a worker, retrying while it is not up yet.
    pub fn connect(
        addr: impl ToSocketAddrs,
        retries: u32,
        delay: Duration,
    ) -> Result<Self, TransportError> {
        let mut attempt = 0;
        let mut stream = loop {
            match TcpStream::connect(&addr) {
                Ok(stream) => break stream,
                Err(e) if attempt < retries => {
                    attempt += 1;
                    debug!(attempt, error = %e, "master not reachable yet");
                    thread::sleep(delay);
                }
                Err(e) => return Err(e.into()),
            }
        };

        let Session { rank, size, cols } = read_handshake(&mut stream)?;
        info!(rank, size, cols, "joined topology");

        let mut peers: Vec<Option<PeerLink>> = (0..size).map(|_| None).collect();
        peers[MASTER_RANK] = Some(PeerLink::new(MASTER_RANK, stream)?);

        Ok(TcpTransport {
            rank,
            size,
            cols,
            peers,
        })
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    fn link(&self, rank: Rank) -> Result<&PeerLink, TransportError> {
        self.peers
            .get(rank)
            .and_then(Option::as_ref)
            .ok_or(TransportError::UnknownPeer {
                rank,
                from: self.rank,
            })
    }
}

impl Transport for TcpTransport {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn send_async(
        &self,
        dest: Rank,
        tag: Tag,
        payload: Payload,
    ) -> Result<SendRequest, TransportError> {
        let link = self.link(dest)?;
        let outgoing = link
            .outgoing
            .as_ref()
            .ok_or(TransportError::Disconnected { peer: dest })?;

        trace!(from = self.rank, to = dest, tag, kind = %payload.kind(), "send");

        let (done_tx, done_rx) = mpsc::channel();
        outgoing
            .send(Outgoing {
                frame: encode_frame(tag, &payload),
                done: done_tx,
            })
            .map_err(|_| TransportError::Disconnected { peer: dest })?;

        Ok(SendRequest::pending(dest, done_rx))
    }

    fn recv_blocking(
        &self,
        source: Rank,
        tag: Tag,
        kind: PayloadKind,
    ) -> Result<Payload, TransportError> {
        let link = self.link(source)?;
        let mut reader = link
            .reader
            .lock()
            .map_err(|_| TransportError::Disconnected { peer: source })?;

        if let Some(payload) = reader.parked.take(source, tag) {
            return expect_kind(payload, source, tag, kind);
        }

        loop {
            let (frame_tag, payload) = read_frame(&mut reader.stream).map_err(|e| match e {
                TransportError::Io(ref err) if err.kind() == io::ErrorKind::UnexpectedEof => {
                    TransportError::Disconnected { peer: source }
                }
                other => other,
            })?;

            if frame_tag == tag {
                trace!(at = self.rank, from = source, tag, "recv");
                return expect_kind(payload, source, tag, kind);
            }

            reader.parked.park(Envelope {
                source,
                tag: frame_tag,
                payload,
            });
        }
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        // Closing the queues lets each writer drain what is left, then exit.
        for link in self.peers.iter_mut().flatten() {
            link.outgoing.take();
            if let Some(writer) = link.writer.take() {
                if writer.join().is_err() {
                    warn!(rank = self.rank, "writer thread panicked");
                }
            }
        }
    }
}
