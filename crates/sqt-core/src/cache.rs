use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::coords::{CoordSet, Representation};
use crate::error::{ScatterError, ScatterResult};
use crate::geom::Vec3;
use crate::selection::Selection;
use crate::traj::FrameSource;

/// One cached frame: the converted coordinate set plus the post-alignment
/// vector that was subtracted before conversion.
#[derive(Debug, Clone)]
pub struct CoordEntry {
    pub set: CoordSet,
    pub alignment: Vec3,
}

struct CacheState {
    entries: HashMap<usize, Arc<CoordEntry>>,
    // most recently used last
    order: Vec<usize>,
    bytes: usize,
}

/// Lazy, byte-bounded, per-frame coordinate buffer.
///
/// Frame data is immutable once installed; only the LRU metadata is guarded
/// by the mutex, so concurrent loads of distinct missing frames materialize
/// in parallel and insert on completion. Eviction is serialized.
pub struct CoordCache {
    source: Arc<dyn FrameSource>,
    selection: Arc<Selection>,
    representation: Representation,
    axis: Vec3,
    center: bool,
    budget_bytes: usize,
    state: Mutex<CacheState>,
}

impl CoordCache {
    pub fn new(
        source: Arc<dyn FrameSource>,
        selection: Arc<Selection>,
        representation: Representation,
        axis: Vec3,
        center: bool,
        budget_bytes: usize,
    ) -> Self {
        Self {
            source,
            selection,
            representation,
            axis,
            center,
            budget_bytes,
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                order: Vec::new(),
                bytes: 0,
            }),
        }
    }

    pub fn n_frames(&self) -> usize {
        self.source.n_frames()
    }

    /// Bytes one frame occupies once converted.
    pub fn frame_bytes(&self) -> usize {
        3 * std::mem::size_of::<f64>() * self.selection.len()
    }

    /// Whether the budget can hold `n` frames at once.
    pub fn fits(&self, n: usize) -> bool {
        let per = self.frame_bytes();
        per == 0 || n.saturating_mul(per) <= self.budget_bytes
    }

    pub fn load(&self, frame: usize) -> ScatterResult<Arc<CoordEntry>> {
        {
            let mut state = self.lock()?;
            if let Some(entry) = state.entries.get(&frame).cloned() {
                touch(&mut state.order, frame);
                return Ok(entry);
            }
        }

        // Materialize outside the lock so distinct frames load in parallel.
        let raw = self.source.load_frame(frame)?;
        let (set, alignment) = CoordSet::from_frame(
            &raw,
            &self.selection,
            self.representation,
            self.axis,
            self.center,
        );
        let bytes = set.byte_size();
        if bytes > self.budget_bytes {
            return Err(ScatterError::ResourceExhausted(format!(
                "coordinate set budget of {} bytes cannot hold one frame ({} bytes); \
                 raise limits.memory.coordinate_sets",
                self.budget_bytes, bytes
            )));
        }
        let entry = Arc::new(CoordEntry { set, alignment });

        let mut state = self.lock()?;
        if let Some(existing) = state.entries.get(&frame).cloned() {
            // another loader won the race
            touch(&mut state.order, frame);
            return Ok(existing);
        }
        while state.bytes + bytes > self.budget_bytes && !state.order.is_empty() {
            let victim = state.order.remove(0);
            if let Some(old) = state.entries.remove(&victim) {
                state.bytes -= old.set.byte_size();
            }
        }
        state.entries.insert(frame, entry.clone());
        state.order.push(frame);
        state.bytes += bytes;
        Ok(entry)
    }

    fn lock(&self) -> ScatterResult<std::sync::MutexGuard<'_, CacheState>> {
        self.state
            .lock()
            .map_err(|_| ScatterError::Fatal("coordinate cache mutex poisoned".into()))
    }
}

fn touch(order: &mut Vec<usize>, frame: usize) {
    if let Some(pos) = order.iter().position(|&f| f == frame) {
        order.remove(pos);
    }
    order.push(frame);
}
