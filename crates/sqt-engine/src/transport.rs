use std::sync::{Arc, Condvar, Mutex};

use num_complex::Complex64;
use sqt_core::error::{ScatterError, ScatterResult};

/// Collective primitives over one partition communicator.
///
/// The padding convention of all vector collectives: every rank passes the
/// same element count; receivers de-interleave with the even decomposition.
/// A failing rank aborts the whole partition; there is no collective
/// cancellation.
pub trait Communicator: Send + Sync {
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    fn barrier(&self) -> ScatterResult<()>;

    fn all_reduce_max(&self, value: usize) -> ScatterResult<usize>;

    /// Concatenation of all ranks' buffers at `root`, rank-major.
    fn gather(&self, local: &[Complex64], root: usize)
        -> ScatterResult<Option<Vec<Complex64>>>;

    /// Concatenation of all ranks' buffers on every rank, rank-major.
    fn all_gather(&self, local: &[Complex64]) -> ScatterResult<Vec<Complex64>>;

    /// Element-wise sum at `root`.
    fn reduce_sum(
        &self,
        local: &[Complex64],
        root: usize,
    ) -> ScatterResult<Option<Vec<Complex64>>>;

    /// Root's buffer replicated into every rank's `buf`.
    fn broadcast(&self, buf: &mut Vec<f64>, root: usize) -> ScatterResult<()>;
}

/// Degenerate single-rank communicator.
pub struct LocalComm;

impl Communicator for LocalComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn barrier(&self) -> ScatterResult<()> {
        Ok(())
    }

    fn all_reduce_max(&self, value: usize) -> ScatterResult<usize> {
        Ok(value)
    }

    fn gather(
        &self,
        local: &[Complex64],
        _root: usize,
    ) -> ScatterResult<Option<Vec<Complex64>>> {
        Ok(Some(local.to_vec()))
    }

    fn all_gather(&self, local: &[Complex64]) -> ScatterResult<Vec<Complex64>> {
        Ok(local.to_vec())
    }

    fn reduce_sum(
        &self,
        local: &[Complex64],
        _root: usize,
    ) -> ScatterResult<Option<Vec<Complex64>>> {
        Ok(Some(local.to_vec()))
    }

    fn broadcast(&self, _buf: &mut Vec<f64>, _root: usize) -> ScatterResult<()> {
        Ok(())
    }
}

struct RoundState {
    generation: u64,
    arrived: usize,
    departed: usize,
    contributions: Vec<Option<Vec<f64>>>,
    result: Option<Arc<Vec<Vec<f64>>>>,
}

struct MemGroup {
    size: usize,
    state: Mutex<RoundState>,
    cv: Condvar,
}

/// In-process shared-memory communicator: one handle per rank thread.
///
/// Every collective is a rendezvous: each rank deposits its contribution,
/// the last arrival publishes the assembled round, and the round is retired
/// once every rank has taken its copy. Rank threads must issue collectives
/// in the same order; the generation counter keeps back-to-back rounds from
/// overlapping.
pub struct MemComm {
    rank: usize,
    group: Arc<MemGroup>,
}

impl MemComm {
    /// A connected group of `size` rank handles.
    pub fn group(size: usize) -> Vec<MemComm> {
        assert!(size > 0, "communicator needs at least one rank");
        let group = Arc::new(MemGroup {
            size,
            state: Mutex::new(RoundState {
                generation: 0,
                arrived: 0,
                departed: 0,
                contributions: (0..size).map(|_| None).collect(),
                result: None,
            }),
            cv: Condvar::new(),
        });
        (0..size)
            .map(|rank| MemComm {
                rank,
                group: group.clone(),
            })
            .collect()
    }

    /// One rendezvous round: deposit `payload`, receive every rank's payload.
    fn collect(&self, payload: Vec<f64>) -> ScatterResult<Arc<Vec<Vec<f64>>>> {
        let group = &self.group;
        let mut state = group
            .state
            .lock()
            .map_err(|_| ScatterError::Transport("communicator mutex poisoned".into()))?;
        let generation = state.generation;
        state.contributions[self.rank] = Some(payload);
        state.arrived += 1;
        if state.arrived == group.size {
            let mut parts = Vec::with_capacity(group.size);
            for slot in state.contributions.iter_mut() {
                match slot.take() {
                    Some(part) => parts.push(part),
                    None => {
                        return Err(ScatterError::Transport(
                            "collective round missing a contribution".into(),
                        ))
                    }
                }
            }
            state.result = Some(Arc::new(parts));
            state.generation += 1;
            state.arrived = 0;
            state.departed = 0;
            group.cv.notify_all();
        } else {
            while state.generation == generation {
                state = group
                    .cv
                    .wait(state)
                    .map_err(|_| ScatterError::Transport("communicator mutex poisoned".into()))?;
            }
        }
        let result = state
            .result
            .clone()
            .ok_or_else(|| ScatterError::Transport("collective round lost its result".into()))?;
        state.departed += 1;
        if state.departed == group.size {
            state.result = None;
        }
        Ok(result)
    }

    fn collect_equal(&self, payload: Vec<f64>) -> ScatterResult<Arc<Vec<Vec<f64>>>> {
        let len = payload.len();
        let parts = self.collect(payload)?;
        if parts.iter().any(|p| p.len() != len) {
            return Err(ScatterError::Transport(format!(
                "rank {} collective count mismatch: expected {} elements",
                self.rank, len
            )));
        }
        Ok(parts)
    }
}

fn flatten(values: &[Complex64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(2 * values.len());
    for v in values {
        out.push(v.re);
        out.push(v.im);
    }
    out
}

fn compress(values: &[f64]) -> Vec<Complex64> {
    values
        .chunks_exact(2)
        .map(|pair| Complex64::new(pair[0], pair[1]))
        .collect()
}

impl Communicator for MemComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.group.size
    }

    fn barrier(&self) -> ScatterResult<()> {
        self.collect(Vec::new()).map(|_| ())
    }

    fn all_reduce_max(&self, value: usize) -> ScatterResult<usize> {
        let parts = self.collect_equal(vec![value as f64])?;
        Ok(parts
            .iter()
            .map(|p| p[0] as usize)
            .max()
            .unwrap_or(value))
    }

    fn gather(
        &self,
        local: &[Complex64],
        root: usize,
    ) -> ScatterResult<Option<Vec<Complex64>>> {
        let parts = self.collect_equal(flatten(local))?;
        if self.rank != root {
            return Ok(None);
        }
        let mut out = Vec::with_capacity(local.len() * self.size());
        for part in parts.iter() {
            out.extend(compress(part));
        }
        Ok(Some(out))
    }

    fn all_gather(&self, local: &[Complex64]) -> ScatterResult<Vec<Complex64>> {
        let parts = self.collect_equal(flatten(local))?;
        let mut out = Vec::with_capacity(local.len() * self.size());
        for part in parts.iter() {
            out.extend(compress(part));
        }
        Ok(out)
    }

    fn reduce_sum(
        &self,
        local: &[Complex64],
        root: usize,
    ) -> ScatterResult<Option<Vec<Complex64>>> {
        let parts = self.collect_equal(flatten(local))?;
        if self.rank != root {
            return Ok(None);
        }
        let mut sum = vec![0.0f64; 2 * local.len()];
        for part in parts.iter() {
            for (acc, v) in sum.iter_mut().zip(part.iter()) {
                *acc += v;
            }
        }
        Ok(Some(compress(&sum)))
    }

    fn broadcast(&self, buf: &mut Vec<f64>, root: usize) -> ScatterResult<()> {
        let payload = if self.rank == root {
            buf.clone()
        } else {
            Vec::new()
        };
        let parts = self.collect(payload)?;
        let from_root = parts
            .get(root)
            .ok_or_else(|| ScatterError::Transport("broadcast root out of range".into()))?;
        buf.clear();
        buf.extend_from_slice(from_root);
        Ok(())
    }
}
