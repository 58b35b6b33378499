use thiserror::Error;

use crate::partition::RowRange;
use crate::transport::{PayloadKind, Rank, Tag};

/// Failure to split the rows among participants.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PartitionError {
    #[error("cannot split {total_rows} rows among zero participants")]
    NoParticipants { total_rows: usize },
    #[error("topology has no ranks")]
    EmptyTopology,
}

/// Failures raised by a transport while moving payloads between ranks.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("rank {rank} is not reachable from rank {from}")]
    UnknownPeer { rank: Rank, from: Rank },
    #[error("peer {peer} disconnected")]
    Disconnected { peer: Rank },
    #[error("expected {expected} from rank {peer} on tag {tag}, got {found}")]
    Mismatch {
        peer: Rank,
        tag: Tag,
        expected: PayloadKind,
        found: PayloadKind,
    },
    #[error("malformed frame: {0}")]
    Malformed(String),
    #[error("handshake failed: {0}")]
    Handshake(String),
    #[error("unsupported by this transport: {0}")]
    Unsupported(&'static str),
    #[error("bootstrap failed: {0}")]
    Bootstrap(String),
}

/// Unified error type for rowfarm.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Partition(#[from] PartitionError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("rows {range} fall outside a {rows}-row matrix")]
    OutOfBounds { range: RowRange, rows: usize },
    #[error("slice for rows {range} holds {actual} values, expected {expected}")]
    SliceLength {
        range: RowRange,
        expected: usize,
        actual: usize,
    },
    #[error("invalid bounds received: low {low} > high {high}")]
    InvertedBounds { low: u64, high: u64 },
    #[error("rank {rank} returned rows {received}, but was assigned {expected}")]
    RangeMismatch {
        rank: Rank,
        expected: RowRange,
        received: RowRange,
    },
    #[error("rank {0} is not assigned any rows")]
    Unassigned(Rank),
    #[error("result differs from the sequential reference at ({row}, {col})")]
    Verification { row: usize, col: usize },
    #[error("cannot estimate from zero samples")]
    NoSamples,
    #[error("rank thread panicked: {0}")]
    Panicked(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
