use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::Duration;

use rowfarm::orchestrator::{run_local, run_pi_local, run_tcp_worker};
use rowfarm::transport::TcpTransport;
use rowfarm::{
    run_master, Error, Generator, JobConfig, Layout, Matrix, PiJob, RowRange, Seeding,
    SharePolicy, Transform, TransportError,
};

fn job(rows: usize, cols: usize, share: SharePolicy) -> JobConfig {
    JobConfig {
        rows,
        cols,
        share,
        generator: Generator::Product,
        transform: Transform::Sqrt,
    }
}

fn reference(job: &JobConfig) -> Matrix {
    let input = Matrix::from_fn(job.rows, job.cols, |i, j| job.generator.value(i, j));
    input.map(job.transform.function())
}

#[test]
fn four_by_four_sqrt_matches_reference() {
    let job = job(4, 4, SharePolicy::Reserved);
    let expected = reference(&job);

    for size in [1, 2, 3] {
        let outcome = run_local(size, &job, Layout::Structured).unwrap();
        assert_eq!(outcome.output.first_difference(&expected), None, "size {}", size);
        for i in 0..4 {
            for j in 0..4 {
                assert_eq!(outcome.output.get(i, j), ((i * j) as f64).sqrt());
            }
        }
    }
}

#[test]
fn every_topology_and_layout_is_bit_identical() {
    for share in [SharePolicy::Reserved, SharePolicy::DispatchOnly] {
        for layout in [Layout::Tagged, Layout::Structured] {
            for size in 1..=9 {
                let job = job(97, 13, share);
                let outcome = run_local(size, &job, layout).unwrap();
                assert_eq!(
                    outcome.output.first_difference(&reference(&job)),
                    None,
                    "share {:?} layout {:?} size {}",
                    share,
                    layout,
                    size
                );
            }
        }
    }
}

#[test]
fn remainder_rows_land_on_the_last_worker() {
    // 10 rows over 3 workers, master only coordinating
    let job = job(10, 2, SharePolicy::DispatchOnly);
    let outcome = run_local(4, &job, Layout::Tagged).unwrap();

    let ranges: Vec<_> = outcome.plan.assignments().collect();
    assert_eq!(
        ranges,
        vec![
            (1, RowRange::new(0, 3)),
            (2, RowRange::new(3, 6)),
            (3, RowRange::new(6, 10)),
        ]
    );
    outcome.verify(f64::sqrt).unwrap();
}

#[test]
fn more_ranks_than_rows() {
    let job = job(3, 5, SharePolicy::Reserved);
    let outcome = run_local(6, &job, Layout::Structured).unwrap();
    assert_eq!(outcome.output.first_difference(&reference(&job)), None);
}

#[test]
fn tcp_master_with_two_workers() {
    let job = job(33, 7, SharePolicy::Reserved);
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    // Workers take the width from the master, not from their own config.
    let workers: Vec<_> = (0..2)
        .map(|_| {
            thread::spawn(move || {
                run_tcp_worker(addr, 50, Duration::from_millis(20), Transform::Sqrt).unwrap()
            })
        })
        .collect();

    let transport = TcpTransport::accept_workers(&listener, 2, job.cols).unwrap();
    let outcome = run_master(
        &transport,
        &job,
        |i, j| job.generator.value(i, j),
        job.transform.function(),
    )
    .unwrap();

    let mut ranges: Vec<_> = workers.into_iter().map(|w| w.join().unwrap().range).collect();
    ranges.sort_by_key(|r| r.low);
    assert_eq!(ranges, vec![RowRange::new(11, 22), RowRange::new(22, 33)]);

    assert_eq!(outcome.output.first_difference(&reference(&job)), None);
}

#[test]
fn tcp_master_rejects_garbage_length_prefix() {
    let job = job(8, 3, SharePolicy::Reserved);
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    // Reads its handshake like a worker, then announces an impossible frame.
    let peer = thread::spawn(move || {
        let mut stream = TcpStream::connect(addr).unwrap();
        let mut handshake = [0u8; 28];
        stream.read_exact(&mut handshake).unwrap();
        stream.write_all(&u64::MAX.to_le_bytes()).unwrap();
        stream
    });

    let transport = TcpTransport::accept_workers(&listener, 1, job.cols).unwrap();
    let err = run_master(
        &transport,
        &job,
        |i, j| job.generator.value(i, j),
        job.transform.function(),
    )
    .unwrap_err();

    assert!(matches!(err, Error::Transport(TransportError::Malformed(_))));
    drop(peer.join().unwrap());
}

#[test]
fn pi_estimate_sums_every_rank_in_order() {
    let job = PiJob {
        samples: 120_000,
        seed: 4,
        seeding: Seeding::PerRank,
    };

    let single = run_pi_local(1, &job).unwrap();
    let spread = run_pi_local(4, &job).unwrap();

    let ranks: Vec<usize> = spread.counts.iter().map(|(rank, _)| *rank).collect();
    assert_eq!(ranks, vec![0, 1, 2, 3]);
    assert_eq!(spread.hits, spread.counts.iter().map(|(_, hits)| hits).sum::<u64>());
    assert_eq!(spread.estimate, 4.0 * spread.hits as f64 / 120_000.0);

    // Different streams, same quantity being estimated.
    assert!(single.error() < 0.05, "single rank: {}", single.estimate);
    assert!(spread.error() < 0.05, "four ranks: {}", spread.estimate);
}
