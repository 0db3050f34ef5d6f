use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread::JoinHandle;

use num_complex::Complex64;
use sqt_core::cache::CoordCache;
use sqt_core::coords::Representation;
use sqt_core::decompose::{EvenDecomposition, ModuloDecomposition};
use sqt_core::error::{ScatterError, ScatterResult};
use sqt_core::factors::ScatterFactors;
use sqt_core::geom::Vec3;
use sqt_core::selection::Selection;
use sqt_core::traj::FrameSource;

use crate::config::{
    CorrelationConfig, CorrelationMethod, CorrelationType, KernelFamily, ScatterConfig,
};
use crate::kernels;
use crate::matrix::AmplitudeMatrix;
use crate::monitor::MonitorClient;
use crate::queue::JobQueue;
use crate::reduce;
use crate::transport::Communicator;
use crate::writer::{ResultRecord, WriterClient};

/// Producer backpressure: the job queue holds at most W * workers entries.
const QUEUE_DEPTH_FACTOR: usize = 2;

/// First error wins; everything after drains.
struct AbortState {
    flag: AtomicBool,
    first: Mutex<Option<ScatterError>>,
}

impl AbortState {
    fn new() -> Self {
        Self {
            flag: AtomicBool::new(false),
            first: Mutex::new(None),
        }
    }

    fn set(&self, err: ScatterError) {
        if !self.flag.swap(true, Ordering::SeqCst) {
            if let Ok(mut slot) = self.first.lock() {
                *slot = Some(err);
            }
        }
    }

    fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    fn take(&self) -> Option<ScatterError> {
        self.first.lock().ok().and_then(|mut slot| slot.take())
    }
}

/// Immutable per-q snapshot handed to every job of that q-vector.
struct Staging {
    q: Vec3,
    factors: Arc<Vec<f64>>,
    family: KernelFamily,
    resolution: usize,
    axis: Vec3,
    frames: Arc<Vec<usize>>,
    n_frames: usize,
    correlation: CorrelationConfig,
    matrix: Arc<AmplitudeMatrix>,
    traces: Arc<AmplitudeMatrix>,
    intensities: Arc<AmplitudeMatrix>,
    cache: Arc<CoordCache>,
}

enum Job {
    Frame { row: usize, staging: Arc<Staging> },
    Atom { index: usize, staging: Arc<Staging> },
    Sync,
    Stop,
}

struct WorkerPool {
    queue: Arc<JobQueue<Job>>,
    barrier: Arc<Barrier>,
    abort: Arc<AbortState>,
    handles: Vec<JoinHandle<()>>,
    workers: usize,
}

impl WorkerPool {
    fn start(workers: usize) -> Self {
        let workers = workers.max(1);
        let queue = Arc::new(JobQueue::new(QUEUE_DEPTH_FACTOR * workers));
        let barrier = Arc::new(Barrier::new(workers + 1));
        let abort = Arc::new(AbortState::new());
        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            let queue = queue.clone();
            let barrier = barrier.clone();
            let abort = abort.clone();
            handles.push(std::thread::spawn(move || loop {
                match queue.pop() {
                    Job::Stop => break,
                    Job::Sync => {
                        barrier.wait();
                    }
                    Job::Frame { row, staging } => {
                        if !abort.is_set() {
                            if let Err(e) = compute_frame_row(&staging, row) {
                                abort.set(e);
                            }
                        }
                    }
                    Job::Atom { index, staging } => {
                        if !abort.is_set() {
                            if let Err(e) = compute_atom_trace(&staging, index) {
                                abort.set(e);
                            }
                        }
                    }
                }
            }));
        }
        Self {
            queue,
            barrier,
            abort,
            handles,
            workers,
        }
    }

    /// Wait until every worker reached the end-of-stage barrier.
    fn synchronize(&self) {
        for _ in 0..self.workers {
            self.queue.push_control(Job::Sync);
        }
        self.barrier.wait();
    }

    fn stop(&mut self) {
        for _ in 0..self.workers {
            self.queue.push_control(Job::Stop);
        }
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop();
    }
}

fn compute_frame_row(staging: &Staging, row: usize) -> ScatterResult<()> {
    let frame = staging.frames[row];
    let entry = staging.cache.load(frame)?;
    let cols = staging.matrix.cols();
    let mut out = vec![Complex64::new(0.0, 0.0); cols];
    match staging.family {
        KernelFamily::AllVectors => {
            out[0] = kernels::all_vectors_row(&entry.set, &staging.factors, staging.q);
        }
        KernelFamily::MultipoleSphere => {
            kernels::multipole_sphere_row(
                &entry.set,
                &staging.factors,
                staging.q.norm(),
                staging.resolution,
                &mut out,
            );
        }
        KernelFamily::MultipoleCylinder => {
            kernels::multipole_cylinder_row(
                &entry.set,
                &staging.factors,
                staging.q,
                staging.axis,
                staging.resolution,
                &mut out,
            );
        }
        KernelFamily::SelfVectors => {
            return Err(ScatterError::Fatal(
                "frame job dispatched to the self kernel".into(),
            ))
        }
    }
    let factor = kernels::alignment_factor(staging.q, entry.alignment);
    for v in out.iter_mut() {
        *v *= factor;
    }
    staging.matrix.store_row(row, &out);
    Ok(())
}

fn compute_atom_trace(staging: &Staging, index: usize) -> ScatterResult<()> {
    let n_frames = staging.n_frames;
    let mut trace = vec![Complex64::new(0.0, 0.0); n_frames];
    for (frame, slot) in trace.iter_mut().enumerate() {
        let entry = staging.cache.load(frame)?;
        let position = [entry.set.c1[index], entry.set.c2[index], entry.set.c3[index]];
        let mut value = kernels::self_trace_element(position, staging.factors[index], staging.q);
        value *= kernels::alignment_factor(staging.q, entry.alignment);
        *slot = value;
    }

    let intensities: Vec<Complex64> = trace
        .iter()
        .map(|a| Complex64::new(a.norm_sqr(), 0.0))
        .collect();
    staging.intensities.add_column(0, &intensities);

    if staging.correlation.kind == CorrelationType::Time {
        let corr = match staging.correlation.method {
            CorrelationMethod::Direct => {
                reduce::autocorrelate_direct(&trace, staging.correlation.zeromean)
            }
            CorrelationMethod::Fftw => {
                reduce::autocorrelate_fft(&trace, staging.correlation.zeromean)
            }
        };
        staging.traces.add_column(0, &corr);
    }
    Ok(())
}

/// Orchestrator of one partition rank. Runs the per-q state machine
/// INIT -> STAGED -> COMPUTING -> REDUCING -> WRITTEN over the partition's
/// q-subset; the partition's rank 0 owns the reduced records and the
/// writer handle.
pub struct ScatterDevice {
    comm: Arc<dyn Communicator>,
    family: KernelFamily,
    resolution: usize,
    axis: Vec3,
    correlation: CorrelationConfig,
    matrix_budget: usize,
    cache: Arc<CoordCache>,
    factors: ScatterFactors,
    qvectors: Vec<(usize, Vec3)>,
    frames: Arc<Vec<usize>>,
    atoms: Arc<Vec<usize>>,
    n_frames: usize,
    writer: WriterClient,
    monitor: MonitorClient,
    pool: WorkerPool,
}

impl ScatterDevice {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        comm: Arc<dyn Communicator>,
        config: &ScatterConfig,
        source: Arc<dyn FrameSource>,
        selection: Arc<Selection>,
        factors: ScatterFactors,
        qvectors: Vec<(usize, Vec3)>,
        writer: WriterClient,
        monitor: MonitorClient,
    ) -> ScatterResult<Self> {
        selection.validate(source.n_atoms())?;
        let family = config.kernel_family()?;
        let representation = match family {
            KernelFamily::AllVectors | KernelFamily::SelfVectors => Representation::Cartesian,
            KernelFamily::MultipoleSphere => Representation::Spherical,
            KernelFamily::MultipoleCylinder => Representation::Cylindrical,
        };
        let axis = config.multipole_axis();
        let n_frames = source.n_frames();
        let n_selected = selection.len();
        let cache = Arc::new(CoordCache::new(
            source,
            selection,
            representation,
            axis,
            config.scattering.center,
            config.limits.memory.coordinate_sets,
        ));

        let rank = comm.rank();
        let size = comm.size();
        let frames: Vec<usize> = EvenDecomposition::new(n_frames, size)
            .indices_for(rank)
            .collect();
        let atoms: Vec<usize> = if family == KernelFamily::SelfVectors {
            ModuloDecomposition::new(n_selected, size)
                .indices_for(rank)
                .collect()
        } else {
            Vec::new()
        };

        let needed = match family {
            KernelFamily::SelfVectors => n_frames,
            _ => frames.len(),
        };
        if !cache.fits(needed) {
            monitor.emitter().emit_warning(&format!(
                "coordinate cache holds fewer than {} frames; staging will thrash \
                 (limits.memory.coordinate_sets)",
                needed
            ));
        }

        let pool = WorkerPool::start(config.worker_count());
        Ok(Self {
            comm,
            family,
            resolution: config.resolution(),
            axis,
            correlation: config.scattering.correlation,
            matrix_budget: config.limits.memory.scattering_matrix,
            cache,
            factors,
            qvectors,
            frames: Arc::new(frames),
            atoms: Arc::new(atoms),
            n_frames,
            writer,
            monitor,
            pool,
        })
    }

    pub fn rank(&self) -> usize {
        self.comm.rank()
    }

    /// Process the whole q-subset. On error the first failure is surfaced
    /// with its q context; the caller hangs up writer and monitor.
    pub fn run(&mut self) -> ScatterResult<()> {
        let total = self.qvectors.len();
        let assigned: Vec<(usize, Vec3)> = self.qvectors.clone();
        for (done, (q_index, q)) in assigned.into_iter().enumerate() {
            self.one_vector(q_index, q, done as f64 / total as f64).map_err(|e| {
                self.monitor.emitter().emit_error(
                    e.code(),
                    &e.to_string(),
                    Some(&format!("rank {} q-index {}", self.comm.rank(), q_index)),
                );
                e
            })?;
            if self.comm.rank() == 0 {
                self.monitor.update((done + 1) as f64 / total as f64);
                self.monitor.emitter().emit_vector_done(q_index, q.to_array());
            }
        }
        self.writer.flush()?;
        Ok(())
    }

    fn one_vector(&mut self, q_index: usize, q: Vec3, progress_base: f64) -> ScatterResult<()> {
        // INIT -> STAGED
        self.ram_check(q_index)?;
        self.factors.update(q);
        let columns = kernels::column_count(self.family, self.resolution);
        let is_self = self.family == KernelFamily::SelfVectors;
        let matrix_rows = if is_self { 0 } else { self.frames.len() };
        let trace_rows = if is_self { self.n_frames } else { 0 };
        let staging = Arc::new(Staging {
            q,
            factors: Arc::new(self.factors.snapshot()),
            family: self.family,
            resolution: self.resolution,
            axis: self.axis,
            frames: self.frames.clone(),
            n_frames: self.n_frames,
            correlation: self.correlation,
            matrix: Arc::new(AmplitudeMatrix::new(matrix_rows, columns)),
            traces: Arc::new(AmplitudeMatrix::new(trace_rows, 1)),
            intensities: Arc::new(AmplitudeMatrix::new(trace_rows, 1)),
            cache: self.cache.clone(),
        });

        // STAGED -> COMPUTING
        if is_self {
            for index in self.atoms.iter() {
                self.pool.queue.push(Job::Atom {
                    index: *index,
                    staging: staging.clone(),
                });
            }
        } else {
            for row in 0..self.frames.len() {
                self.pool.queue.push(Job::Frame {
                    row,
                    staging: staging.clone(),
                });
            }
        }
        self.pool.synchronize();
        if self.comm.rank() == 0 {
            // compute stage done, reduction still ahead
            let partial = progress_base + 0.5 / self.qvectors.len().max(1) as f64;
            self.monitor.update(partial);
        }
        let mut local_failure = if self.pool.abort.is_set() {
            Some(
                self.pool
                    .abort
                    .take()
                    .unwrap_or_else(|| ScatterError::Fatal("worker aborted".into())),
            )
        } else {
            None
        };
        if local_failure.is_none() {
            let finite = if is_self {
                staging.traces.is_finite() && staging.intensities.is_finite()
            } else {
                staging.matrix.is_finite()
            };
            if !finite {
                local_failure = Some(ScatterError::NumericOverflow(format!(
                    "rank {} q-index {}",
                    self.comm.rank(),
                    q_index
                )));
            }
        }
        // a rank-local failure must not leave the siblings waiting in the
        // reduction collectives
        let failed = self
            .comm
            .all_reduce_max(usize::from(local_failure.is_some()))?;
        if let Some(e) = local_failure {
            return Err(e);
        }
        if failed > 0 {
            return Err(ScatterError::Fatal(format!(
                "partition aborted by another rank at q-index {}",
                q_index
            )));
        }

        // COMPUTING -> REDUCING
        let record = self.reduce_result(&staging)?;

        // REDUCING -> WRITTEN
        if let Some(record) = record {
            self.writer.write(record)?;
        }
        Ok(())
    }

    /// Estimated peak bytes for this q; fail fast when over budget. Uses
    /// the largest per-rank row count so every rank of a partition reaches
    /// the same verdict.
    fn ram_check(&self, q_index: usize) -> ScatterResult<()> {
        let complex = std::mem::size_of::<Complex64>();
        let columns = kernels::column_count(self.family, self.resolution);
        let workers = self.pool.workers;
        let max_rows = EvenDecomposition::new(self.n_frames, self.comm.size()).max_size();
        let needed = match self.family {
            KernelFamily::SelfVectors => (2 + 2 * workers) * self.n_frames * complex,
            _ => (max_rows + workers) * columns * complex,
        };
        if needed > self.matrix_budget {
            return Err(ScatterError::ResourceExhausted(format!(
                "scattering matrix needs {} bytes at q-index {} but \
                 limits.memory.scattering_matrix is {}",
                needed, q_index, self.matrix_budget
            )));
        }
        Ok(())
    }

    fn reduce_result(&self, staging: &Staging) -> ScatterResult<Option<ResultRecord>> {
        match self.family {
            KernelFamily::SelfVectors => self.reduce_self(staging),
            _ => self.reduce_frame_rows(staging),
        }
    }

    fn reduce_frame_rows(&self, staging: &Staging) -> ScatterResult<Option<ResultRecord>> {
        let comm = self.comm.as_ref();
        let rows = staging.matrix.rows();
        let cols = staging.matrix.cols();
        let data = staging.matrix.snapshot();
        let local_intensities = reduce::row_intensities(&data, rows, cols);
        let global_intensities = reduce::gather_frames(comm, &local_intensities, self.n_frames)?;

        if self.correlation.kind == CorrelationType::None {
            return Ok(global_intensities.map(|global| {
                let (fq, fq2) = frame_stats(&global);
                ResultRecord {
                    q: staging.q,
                    fq0: fq,
                    fq,
                    fq2,
                    fqt: None,
                }
            }));
        }

        let zeromean = self.correlation.zeromean;
        let mut spectrum: Option<Vec<Complex64>> = if comm.rank() == 0 {
            Some(vec![Complex64::new(0.0, 0.0); self.n_frames])
        } else {
            None
        };
        match self.correlation.method {
            CorrelationMethod::Direct => {
                for c in 0..cols {
                    let column: Vec<Complex64> =
                        (0..rows).map(|i| data[i * cols + c]).collect();
                    let series = reduce::assemble_frames(comm, &column, self.n_frames)?;
                    if let Some(part) = reduce::correlate_column_direct(comm, &series, zeromean)? {
                        if let Some(acc) = spectrum.as_mut() {
                            for (slot, v) in acc.iter_mut().zip(part.iter()) {
                                *slot += *v;
                            }
                        }
                    }
                }
            }
            CorrelationMethod::Fftw => {
                // the FFT yields every lag at once, so the columns are what
                // gets spread over the partition
                let mut local_acc = vec![Complex64::new(0.0, 0.0); self.n_frames];
                for c in 0..cols {
                    let column: Vec<Complex64> =
                        (0..rows).map(|i| data[i * cols + c]).collect();
                    let series = reduce::assemble_frames(comm, &column, self.n_frames)?;
                    if c % comm.size() == comm.rank() {
                        let corr = reduce::autocorrelate_fft(&series, zeromean);
                        for (slot, v) in local_acc.iter_mut().zip(corr.iter()) {
                            *slot += *v;
                        }
                    }
                }
                if let Some(reduced) = comm.reduce_sum(&local_acc, 0)? {
                    spectrum = Some(reduced);
                }
            }
        }

        Ok(match (spectrum, global_intensities) {
            (Some(fqt), Some(global)) => {
                let (fq, fq2) = frame_stats(&global);
                let fq0 = fqt.first().copied().unwrap_or_else(|| Complex64::new(0.0, 0.0));
                Some(ResultRecord {
                    q: staging.q,
                    fq0,
                    fq,
                    fq2,
                    fqt: Some(fqt),
                })
            }
            _ => None,
        })
    }

    fn reduce_self(&self, staging: &Staging) -> ScatterResult<Option<ResultRecord>> {
        let comm = self.comm.as_ref();
        let intensities_local = staging.intensities.snapshot();
        let intensities = comm.reduce_sum(&intensities_local, 0)?;

        if self.correlation.kind == CorrelationType::None {
            return Ok(intensities.map(|global| {
                let (fq, fq2) = frame_stats(&global);
                ResultRecord {
                    q: staging.q,
                    fq0: fq,
                    fq,
                    fq2,
                    fqt: None,
                }
            }));
        }

        let traces_local = staging.traces.snapshot();
        let spectrum = comm.reduce_sum(&traces_local, 0)?;
        Ok(match (spectrum, intensities) {
            (Some(fqt), Some(global)) => {
                let (fq, fq2) = frame_stats(&global);
                let fq0 = fqt.first().copied().unwrap_or_else(|| Complex64::new(0.0, 0.0));
                Some(ResultRecord {
                    q: staging.q,
                    fq0,
                    fq,
                    fq2,
                    fqt: Some(fqt),
                })
            }
            _ => None,
        })
    }
}

fn frame_stats(global: &[Complex64]) -> (Complex64, Complex64) {
    if global.is_empty() {
        return (Complex64::new(0.0, 0.0), Complex64::new(0.0, 0.0));
    }
    let n = global.len() as f64;
    let fq = global.iter().sum::<Complex64>() / n;
    let fq2 = global.iter().map(|v| v.norm_sqr()).sum::<f64>() / n;
    (fq, Complex64::new(fq2, 0.0))
}
