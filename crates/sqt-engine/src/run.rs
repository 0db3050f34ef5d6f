use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use sqt_core::decompose::PartitionPlan;
use sqt_core::error::{ScatterError, ScatterResult};
use sqt_core::factors::ScatterFactors;
use sqt_core::geom::Vec3;
use sqt_core::selection::Selection;
use sqt_core::traj::FrameSource;

use crate::config::ScatterConfig;
use crate::device::ScatterDevice;
use crate::monitor::{MonitorClient, StreamEmitter};
use crate::transport::{Communicator, MemComm};
use crate::writer::SignalWriter;

#[derive(Debug, Clone, Copy)]
pub struct RunSummary {
    pub records: usize,
    pub partitions: usize,
    pub elapsed_ms: u64,
}

/// Drive a whole scattering run in one process: the world of `world_size`
/// ranks is split into partitions per the plan, every rank becomes a
/// thread with its own device, partition rank 0 feeds the signal writer.
///
/// The world rendezvous right after device construction converts any
/// single initialization failure into a global abort; during compute the
/// partitions are independent and a failing partition only takes down its
/// own pipeline.
pub fn run_scattering(
    config: &ScatterConfig,
    source: Arc<dyn FrameSource>,
    selection: Arc<Selection>,
    factors: ScatterFactors,
    world_size: usize,
    output: impl Into<PathBuf>,
    emitter: StreamEmitter,
) -> ScatterResult<RunSummary> {
    config.validate()?;
    selection.validate(source.n_atoms())?;
    let qvectors = config.qvectors();
    let n_frames = source.n_frames();
    let plan = PartitionPlan::plan(
        world_size,
        qvectors.len(),
        n_frames,
        config.runtime.partitions,
    )?;
    emitter.emit_run_started(
        qvectors.len(),
        n_frames,
        plan.partitions,
        plan.partition_size,
    );

    let start = Instant::now();
    let writer = SignalWriter::create(output, n_frames, plan.partitions)?;
    let mut world: Vec<Option<MemComm>> = MemComm::group(world_size)
        .into_iter()
        .map(Some)
        .collect();

    let results: Vec<ScatterResult<()>> = thread::scope(|scope| {
        let mut handles = Vec::with_capacity(world_size);
        for partition in 0..plan.partitions {
            let comms = MemComm::group(plan.partition_size);
            let q_subset: Vec<(usize, Vec3)> = plan
                .qvectors_for(partition)
                .map(|qi| (qi, qvectors[qi]))
                .collect();
            for (rank, comm) in comms.into_iter().enumerate() {
                let world_rank = partition * plan.partition_size + rank;
                let world_comm = world[world_rank]
                    .take()
                    .expect("world rank handle claimed twice");
                let client = writer.client();
                let monitor = MonitorClient::new(emitter, partition);
                let source = source.clone();
                let selection = selection.clone();
                let factors = factors.clone();
                let q_subset = q_subset.clone();
                handles.push(scope.spawn(move || -> ScatterResult<()> {
                    let mut hangup_client = client.clone();
                    let comm: Arc<dyn Communicator> = Arc::new(comm);
                    let device = ScatterDevice::new(
                        comm, config, source, selection, factors, q_subset, client, monitor,
                    );

                    // init rendezvous: one failed rank hangs up everyone
                    let failed = world_comm.all_reduce_max(usize::from(device.is_err()))?;
                    if failed > 0 {
                        let _ = hangup_client.hangup();
                        return match device {
                            Err(e) => Err(e),
                            Ok(_) => Err(ScatterError::Fatal(
                                "initialization failed on another rank".into(),
                            )),
                        };
                    }
                    let mut device = device?;

                    let result = device.run();
                    if rank == 0 {
                        let _ = hangup_client.hangup();
                    }
                    result
                }));
            }
        }
        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|_| Err(ScatterError::Fatal("rank thread panicked".into())))
            })
            .collect()
    });

    let records = writer.join()?;
    let elapsed_ms = start.elapsed().as_millis().try_into().unwrap_or(u64::MAX);

    for result in results {
        if let Err(e) = result {
            emitter.emit_error(e.code(), &e.to_string(), None);
            return Err(e);
        }
    }
    emitter.emit_run_complete(records, elapsed_ms);
    Ok(RunSummary {
        records,
        partitions: plan.partitions,
        elapsed_ms,
    })
}

/// Process exit code for an engine error: 1 initialization, 2 resource
/// exhaustion, 3 fatal compute.
pub fn exit_code(err: &ScatterError) -> i32 {
    match err {
        ScatterError::Config(_) => 1,
        ScatterError::ResourceExhausted(_) => 2,
        _ => 3,
    }
}
