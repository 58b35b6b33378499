//! Bootstrap, role dispatch and teardown for each kind of transport.

use std::fmt;
use std::net::ToSocketAddrs;
use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::error::{Error, PartitionError, Result, TransportError};
use crate::estimate::{run_pi, PiJob, PiOutcome};
use crate::master::{run_master, MasterOutcome};
use crate::partition::SharePolicy;
use crate::transform::{Generator, Transform};
use crate::transport::{Layout, LocalTransport, Rank, TcpTransport, Transport};
use crate::worker::{run_worker, WorkerSummary};
use crate::MASTER_RANK;

/// Fixed for the lifetime of a process, derived from its rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Master,
    Worker,
}

impl Role {
    pub fn from_rank(rank: Rank) -> Self {
        if rank == MASTER_RANK {
            Role::Master
        } else {
            Role::Worker
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Master => write!(f, "Master"),
            Role::Worker => write!(f, "Worker"),
        }
    }
}

/// What to compute. Every rank must agree on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobConfig {
    pub rows: usize,
    pub cols: usize,
    pub share: SharePolicy,
    pub generator: Generator,
    pub transform: Transform,
}

impl Default for JobConfig {
    fn default() -> Self {
        JobConfig {
            rows: 8192,
            cols: 8192,
            share: SharePolicy::default(),
            generator: Generator::default(),
            transform: Transform::default(),
        }
    }
}

/// Play this rank's role. Only the master returns an outcome.
pub fn run<T>(transport: &T, job: &JobConfig) -> Result<Option<MasterOutcome>>
where
    T: Transport + ?Sized,
{
    let role = Role::from_rank(transport.rank());
    debug!(rank = transport.rank(), size = transport.size(), %role, "starting");

    match role {
        Role::Master => {
            let generator = job.generator;
            let transform = job.transform.function();
            run_master(transport, job, |i, j| generator.value(i, j), transform).map(Some)
        }
        Role::Worker => {
            run_worker(transport, job.cols, job.transform.function())?;
            Ok(None)
        }
    }
}

/// Run every rank as a thread of this process over an in-process mesh.
///
/// The master runs on the calling thread. If it fails, the workers are left
/// detached: some may still be blocked on a task that will never come.
pub fn run_local(size: usize, job: &JobConfig, layout: Layout) -> Result<MasterOutcome> {
    let job = *job;
    on_local_mesh(size, layout, move |transport| run(transport, &job))
}

/// [`run_local`] for the π estimate.
pub fn run_pi_local(size: usize, job: &PiJob) -> Result<PiOutcome> {
    let job = *job;
    on_local_mesh(size, Layout::Structured, move |transport| run_pi(transport, &job))
}

fn on_local_mesh<O, F>(size: usize, layout: Layout, play: F) -> Result<O>
where
    O: Send + 'static,
    F: Fn(&LocalTransport) -> Result<Option<O>> + Clone + Send + 'static,
{
    if size == 0 {
        return Err(PartitionError::EmptyTopology.into());
    }

    let mut mesh = LocalTransport::mesh(size, layout).into_iter();
    let master = mesh.next().ok_or(PartitionError::EmptyTopology)?;

    let mut workers = Vec::with_capacity(size - 1);
    for transport in mesh {
        let play = play.clone();
        let rank = transport.rank();
        let handle = thread::Builder::new()
            .name(format!("rowfarm-rank-{}", rank))
            .spawn(move || play(&transport))
            .map_err(TransportError::from)?;
        workers.push((rank, handle));
    }

    let outcome = play(&master)?.ok_or(Error::Unassigned(MASTER_RANK))?;

    for (rank, handle) in workers {
        handle
            .join()
            .map_err(|_| Error::Panicked(format!("rank {}", rank)))??;
    }

    Ok(outcome)
}

/// Master side of a TCP run: wait for `workers` connections, then run.
///
/// Workers learn the matrix width from the handshake.
pub fn run_tcp_master(
    addr: impl ToSocketAddrs,
    workers: usize,
    job: &JobConfig,
) -> Result<MasterOutcome> {
    let transport = TcpTransport::listen(addr, workers, job.cols)?;
    let generator = job.generator;
    run_master(&transport, job, |i, j| generator.value(i, j), job.transform.function())
}

/// Worker side of a TCP run, using the width the master announced.
pub fn run_tcp_worker(
    addr: impl ToSocketAddrs,
    retries: u32,
    delay: Duration,
    transform: Transform,
) -> Result<WorkerSummary> {
    let transport = TcpTransport::connect(addr, retries, delay)?;
    run_worker(&transport, transport.cols(), transform.function())
}

/// Initialize MPI, size the buffered-send area from the plan, and run.
///
/// MPI is finalized before this returns.
#[cfg(feature = "mpi")]
pub fn run_mpi(job: &JobConfig) -> Result<Option<MasterOutcome>> {
    use crate::partition::Plan;
    use crate::transport::MpiTransport;

    let mut transport = MpiTransport::initialize()?;
    let plan = Plan::new(job.rows, transport.size(), job.share)?;
    let (bytes, messages) = plan.send_volume(transport.rank(), job.cols);
    transport.reserve_send_buffer(bytes, messages);

    run(&transport, job)
}

/// Estimate π over MPI. Each worker reserves room for its one count.
#[cfg(feature = "mpi")]
pub fn run_pi_mpi(job: &PiJob) -> Result<Option<PiOutcome>> {
    use crate::transport::MpiTransport;

    let mut transport = MpiTransport::initialize()?;
    if transport.rank() != MASTER_RANK {
        transport.reserve_send_buffer(std::mem::size_of::<u64>(), 1);
    }

    run_pi(&transport, job)
}
