//! Row farming over message passing
//!
//! This crate distributes an element-wise transform of a dense matrix across
//! a fixed set of ranks. Rank 0 is the master: it owns the full input and
//! output matrices, splits the rows into contiguous ranges, hands one range
//! to every worker, computes its own share and gathers the results back in
//! rank order.
//!
//! # Protocol
//!
//! ```text
//!   Master (rank 0)                         Worker (rank k)
//!   ───────────────                         ───────────────
//!   generate input
//!   plan ranges
//!   send_async(low, high, rows) ──────────► recv_blocking(low, high, rows)
//!   compute own share                        apply transform
//!   recv_blocking(low, high, rows) ◄──────── send_async(low, high, rows)
//!   merge at range
//! ```
//!
//! Messages travel over a [`Transport`](transport::Transport): an in-process
//! channel mesh, a TCP star, or MPI (cargo feature `mpi`).
//!
//! The same transports also carry a Monte Carlo estimate of π, see
//! [`estimate`].

pub mod error;
pub mod estimate;
pub mod master;
pub mod matrix;
pub mod orchestrator;
pub mod partition;
pub mod protocol;
pub mod report;
pub mod transform;
pub mod transport;
pub mod worker;

pub use error::{Error, PartitionError, TransportError};
pub use estimate::{PiJob, PiOutcome, Seeding};
pub use master::{run_master, MasterOutcome};
pub use matrix::Matrix;
pub use orchestrator::{JobConfig, Role};
pub use partition::{compute_ranges, Plan, RowRange, SharePolicy};
pub use report::{ConsoleReporter, Reporter, RunReport};
pub use transform::{Generator, Transform};
pub use transport::{Layout, Payload, PayloadKind, Rank, SendRequest, Tag, Transport};
pub use worker::{run_worker, WorkerSummary};

/// Rank of the coordinating process.
pub const MASTER_RANK: Rank = 0;
