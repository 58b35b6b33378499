//! Monte Carlo estimate of π over the same transports.
//!
//! Every rank draws points uniformly in the unit square and counts those
//! that land inside the quarter circle. Workers send their count to the
//! master without waiting for it, and the master adds the counts up in rank
//! order:
//!
//! ```text
//!   π ≈ 4 · hits / samples
//! ```
//!
//! Each worker draws `samples / size` points. The master draws the same plus
//! the remainder, so exactly `samples` points go into the estimate.

use std::f64::consts::PI;
use std::fmt;
use std::time::{Duration, Instant};

use clap::ValueEnum;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::error::{Error, PartitionError, Result};
use crate::orchestrator::Role;
use crate::protocol::recv_bound;
use crate::transport::{Payload, Rank, Tag, Transport};
use crate::MASTER_RANK;

/// Tag of the worker-to-master count message.
pub const COUNT_TAG: Tag = 1;

pub const DEFAULT_SAMPLES: u64 = 100_000_000;
pub const DEFAULT_SEED: u64 = 4;

/// How each rank derives its generator seed from the base seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Seeding {
    /// Base seed plus rank: every rank draws a different stream
    #[default]
    PerRank,
    /// Every rank uses the base seed and draws the same stream
    Fixed,
}

impl Seeding {
    pub fn seed_for(self, base: u64, rank: Rank) -> u64 {
        match self {
            Seeding::PerRank => base.wrapping_add(rank as u64),
            Seeding::Fixed => base,
        }
    }
}

impl fmt::Display for Seeding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Seeding::PerRank => write!(f, "per-rank"),
            Seeding::Fixed => write!(f, "fixed"),
        }
    }
}

/// What to estimate with. Every rank must agree on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PiJob {
    /// Points drawn across all ranks
    pub samples: u64,
    pub seed: u64,
    pub seeding: Seeding,
}

impl Default for PiJob {
    fn default() -> Self {
        PiJob {
            samples: DEFAULT_SAMPLES,
            seed: DEFAULT_SEED,
            seeding: Seeding::default(),
        }
    }
}

impl PiJob {
    /// Points drawn by `rank` out of `size`.
    pub fn share(&self, rank: Rank, size: usize) -> u64 {
        if size == 0 {
            return 0;
        }
        let size = size as u64;
        let base = self.samples / size;
        if rank == MASTER_RANK {
            base + self.samples % size
        } else {
            base
        }
    }

    pub fn seed_for(&self, rank: Rank) -> u64 {
        self.seeding.seed_for(self.seed, rank)
    }

    /// Draw this rank's share and count the hits.
    pub fn draw(&self, rank: Rank, size: usize) -> u64 {
        let mut rng = StdRng::seed_from_u64(self.seed_for(rank));
        count_hits(self.share(rank, size), &mut rng)
    }
}

/// Count how many of `samples` points in the unit square fall inside the unit circle.
pub fn count_hits<R: Rng>(samples: u64, rng: &mut R) -> u64 {
    let mut hits = 0;
    for _ in 0..samples {
        let x: f64 = rng.gen();
        let y: f64 = rng.gen();
        if (x * x + y * y).sqrt() <= 1.0 {
            hits += 1;
        }
    }
    hits
}

pub fn estimate(hits: u64, samples: u64) -> Result<f64> {
    if samples == 0 {
        return Err(Error::NoSamples);
    }
    Ok(4.0 * hits as f64 / samples as f64)
}

/// Master-side view of a finished estimate.
#[derive(Debug, Clone, PartialEq)]
pub struct PiOutcome {
    pub hits: u64,
    pub samples: u64,
    /// Hits per rank, master first
    pub counts: Vec<(Rank, u64)>,
    pub estimate: f64,
    /// From the start of the master's draw to the last count received
    pub elapsed: Duration,
}

impl PiOutcome {
    pub fn size(&self) -> usize {
        self.counts.len()
    }

    /// Distance from the true value.
    pub fn error(&self) -> f64 {
        (self.estimate - PI).abs()
    }
}

/// Draw the master's share, then gather every worker's count in rank order.
pub fn run_pi_master<T: Transport + ?Sized>(transport: &T, job: &PiJob) -> Result<PiOutcome> {
    let size = transport.size();
    if size == 0 {
        return Err(PartitionError::EmptyTopology.into());
    }
    if job.samples == 0 {
        return Err(Error::NoSamples);
    }

    let start = Instant::now();
    let own = job.draw(MASTER_RANK, size);
    debug!(rank = MASTER_RANK, hits = own, "own share drawn");

    let mut counts = Vec::with_capacity(size);
    counts.push((MASTER_RANK, own));
    for rank in (0..size).filter(|&rank| rank != MASTER_RANK) {
        let hits = recv_bound(transport, rank, COUNT_TAG)?;
        debug!(rank, hits, "count received");
        counts.push((rank, hits));
    }

    let hits = counts.iter().map(|(_, hits)| hits).sum();
    let estimate = estimate(hits, job.samples)?;
    let elapsed = start.elapsed();

    Ok(PiOutcome {
        hits,
        samples: job.samples,
        counts,
        estimate,
        elapsed,
    })
}

/// Draw this worker's share and send the count to the master.
pub fn run_pi_worker<T: Transport + ?Sized>(transport: &T, job: &PiJob) -> Result<u64> {
    let rank = transport.rank();
    let hits = job.draw(rank, transport.size());

    debug!(rank, hits, "sending count");
    transport
        .send_async(MASTER_RANK, COUNT_TAG, Payload::Bound(hits))?
        .wait()?;
    Ok(hits)
}

/// Play this rank's part in the estimate. Only the master returns an outcome.
pub fn run_pi<T: Transport + ?Sized>(transport: &T, job: &PiJob) -> Result<Option<PiOutcome>> {
    match Role::from_rank(transport.rank()) {
        Role::Master => run_pi_master(transport, job).map(Some),
        Role::Worker => {
            run_pi_worker(transport, job)?;
            Ok(None)
        }
    }
}
