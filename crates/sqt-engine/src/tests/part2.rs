use std::sync::Arc;
use std::thread;

use num_complex::Complex64;
use sqt_core::decompose::EvenDecomposition;

use crate::queue::JobQueue;
use crate::reduce;
use crate::transport::{Communicator, LocalComm, MemComm};

fn c(re: f64, im: f64) -> Complex64 {
    Complex64::new(re, im)
}

#[test]
fn mem_comm_all_gather_orders_by_rank() {
    let comms = MemComm::group(3);
    let handles: Vec<_> = comms
        .into_iter()
        .map(|comm| {
            thread::spawn(move || {
                let local = [c(comm.rank() as f64, 0.0), c(0.0, comm.rank() as f64)];
                comm.all_gather(&local).unwrap()
            })
        })
        .collect();
    for handle in handles {
        let gathered = handle.join().unwrap();
        assert_eq!(gathered.len(), 6);
        for rank in 0..3 {
            assert_eq!(gathered[2 * rank], c(rank as f64, 0.0));
            assert_eq!(gathered[2 * rank + 1], c(0.0, rank as f64));
        }
    }
}

#[test]
fn mem_comm_reduce_sum_only_at_root() {
    let comms = MemComm::group(4);
    let handles: Vec<_> = comms
        .into_iter()
        .map(|comm| {
            thread::spawn(move || {
                let local = [c(1.0, comm.rank() as f64)];
                (comm.rank(), comm.reduce_sum(&local, 0).unwrap())
            })
        })
        .collect();
    for handle in handles {
        let (rank, reduced) = handle.join().unwrap();
        match (rank, reduced) {
            (0, Some(sum)) => {
                assert_eq!(sum.len(), 1);
                assert!((sum[0].re - 4.0).abs() < 1e-14);
                assert!((sum[0].im - 6.0).abs() < 1e-14);
            }
            (0, None) => panic!("root missing reduction"),
            (_, None) => {}
            (rank, Some(_)) => panic!("rank {} received the root reduction", rank),
        }
    }
}

#[test]
fn mem_comm_all_reduce_max_and_broadcast() {
    let comms = MemComm::group(3);
    let handles: Vec<_> = comms
        .into_iter()
        .map(|comm| {
            thread::spawn(move || {
                let max = comm.all_reduce_max(comm.rank() * 10).unwrap();
                let mut payload = if comm.rank() == 1 {
                    vec![3.5, -1.0]
                } else {
                    Vec::new()
                };
                comm.broadcast(&mut payload, 1).unwrap();
                (max, payload)
            })
        })
        .collect();
    for handle in handles {
        let (max, payload) = handle.join().unwrap();
        assert_eq!(max, 20);
        assert_eq!(payload, vec![3.5, -1.0]);
    }
}

#[test]
fn mem_comm_supports_consecutive_rounds() {
    let comms = MemComm::group(2);
    let handles: Vec<_> = comms
        .into_iter()
        .map(|comm| {
            thread::spawn(move || {
                let mut totals = Vec::new();
                for round in 0..50usize {
                    let local = [c((round + comm.rank()) as f64, 0.0)];
                    let gathered = comm.all_gather(&local).unwrap();
                    totals.push(gathered.iter().map(|v| v.re).sum::<f64>());
                }
                totals
            })
        })
        .collect();
    for handle in handles {
        let totals = handle.join().unwrap();
        for (round, total) in totals.iter().enumerate() {
            assert!((total - (2 * round + 1) as f64).abs() < 1e-12);
        }
    }
}

#[test]
fn local_comm_is_identity() {
    let comm = LocalComm;
    let local = [c(1.0, 2.0)];
    assert_eq!(comm.all_gather(&local).unwrap(), local.to_vec());
    assert_eq!(comm.gather(&local, 0).unwrap().unwrap(), local.to_vec());
    assert_eq!(comm.reduce_sum(&local, 0).unwrap().unwrap(), local.to_vec());
    assert_eq!(comm.all_reduce_max(7).unwrap(), 7);
}

#[test]
fn gather_frames_reconstructs_ordering_for_any_partition_size() {
    // permutation invariance: the de-interleaved global vector matches the
    // frame-indexed original no matter how many ranks share the frames
    let n_frames = 11;
    let original: Vec<Complex64> = (0..n_frames).map(|i| c(i as f64, -(i as f64))).collect();
    for &size in &[1usize, 2, 3, 5] {
        let comms = MemComm::group(size);
        let original = Arc::new(original.clone());
        let handles: Vec<_> = comms
            .into_iter()
            .map(|comm| {
                let original = original.clone();
                thread::spawn(move || {
                    let local: Vec<Complex64> = EvenDecomposition::new(n_frames, size)
                        .indices_for(comm.rank())
                        .map(|i| original[i])
                        .collect();
                    reduce::gather_frames(&comm, &local, n_frames).unwrap()
                })
            })
            .collect();
        for (rank, handle) in handles.into_iter().enumerate() {
            let result = handle.join().unwrap();
            if rank == 0 {
                assert_eq!(result.unwrap(), *original, "size {}", size);
            } else {
                assert!(result.is_none());
            }
        }
    }
}

#[test]
fn correlate_column_direct_matches_serial() {
    let n_frames = 9;
    let series: Vec<Complex64> = (0..n_frames)
        .map(|i| c((i as f64 * 0.7).sin(), (i as f64 * 0.3).cos()))
        .collect();
    let expect = reduce::autocorrelate_direct(&series, false);
    let comms = MemComm::group(3);
    let series = Arc::new(series);
    let handles: Vec<_> = comms
        .into_iter()
        .map(|comm| {
            let series = series.clone();
            thread::spawn(move || {
                (comm.rank(), reduce::correlate_column_direct(&comm, &series, false).unwrap())
            })
        })
        .collect();
    for handle in handles {
        let (rank, result) = handle.join().unwrap();
        if rank == 0 {
            let got = result.unwrap();
            for (g, e) in got.iter().zip(expect.iter()) {
                assert!((*g - *e).norm() < 1e-12);
            }
        }
    }
}

#[test]
fn queue_sentinels_drain_workers() {
    #[derive(Debug, PartialEq)]
    enum TestJob {
        Work(usize),
        Stop,
    }
    let queue = Arc::new(JobQueue::new(4));
    let workers: Vec<_> = (0..3)
        .map(|_| {
            let queue = queue.clone();
            thread::spawn(move || {
                let mut seen = 0usize;
                loop {
                    match queue.pop() {
                        TestJob::Work(_) => seen += 1,
                        TestJob::Stop => break,
                    }
                }
                seen
            })
        })
        .collect();
    for i in 0..20 {
        queue.push(TestJob::Work(i));
    }
    for _ in 0..3 {
        queue.push_control(TestJob::Stop);
    }
    let total: usize = workers.into_iter().map(|w| w.join().unwrap()).sum();
    assert_eq!(total, 20);
}
