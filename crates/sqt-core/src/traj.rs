use crate::error::{ScatterError, ScatterResult};

/// Read-only view of a fixed trajectory: NF frames of NA cartesian positions.
///
/// Implementations must re-materialize a frame identically on every call;
/// the coordinate cache relies on this to evict and reload entries.
pub trait FrameSource: Send + Sync {
    fn n_atoms(&self) -> usize;

    fn n_frames(&self) -> usize;

    /// Full cartesian coordinates of one frame, atom-major.
    fn load_frame(&self, frame: usize) -> ScatterResult<Vec<[f64; 3]>>;
}

#[derive(Debug, Clone)]
pub struct InMemoryFrames {
    n_atoms: usize,
    frames: Vec<Vec<[f64; 3]>>,
}

impl InMemoryFrames {
    pub fn new(frames: Vec<Vec<[f64; 3]>>) -> ScatterResult<Self> {
        let n_atoms = frames.first().map(|f| f.len()).unwrap_or(0);
        for (i, frame) in frames.iter().enumerate() {
            if frame.len() != n_atoms {
                return Err(ScatterError::Fatal(format!(
                    "frame {} has {} atoms, expected {}",
                    i,
                    frame.len(),
                    n_atoms
                )));
            }
        }
        Ok(Self { n_atoms, frames })
    }
}

impl FrameSource for InMemoryFrames {
    fn n_atoms(&self) -> usize {
        self.n_atoms
    }

    fn n_frames(&self) -> usize {
        self.frames.len()
    }

    fn load_frame(&self, frame: usize) -> ScatterResult<Vec<[f64; 3]>> {
        self.frames
            .get(frame)
            .cloned()
            .ok_or_else(|| ScatterError::Fatal(format!("frame index {} out of range", frame)))
    }
}
