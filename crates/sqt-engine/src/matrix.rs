use std::sync::Mutex;

use num_complex::Complex64;

/// Per-q amplitude matrix: NFlocal rows, one column per kernel coefficient.
///
/// Workers compute whole rows and install them under a short-lived lock;
/// no two jobs ever target the same row, the lock only serializes the
/// copy-in. Accumulating stores are used by the atom-major self path.
pub struct AmplitudeMatrix {
    rows: usize,
    cols: usize,
    data: Mutex<Vec<Complex64>>,
}

impl AmplitudeMatrix {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: Mutex::new(vec![Complex64::new(0.0, 0.0); rows * cols]),
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn byte_size(&self) -> usize {
        self.rows * self.cols * std::mem::size_of::<Complex64>()
    }

    pub fn store_row(&self, row: usize, values: &[Complex64]) {
        debug_assert_eq!(values.len(), self.cols);
        let mut data = self.data.lock().expect("amplitude matrix mutex poisoned");
        let start = row * self.cols;
        data[start..start + self.cols].copy_from_slice(values);
    }

    /// Element-wise add of a full column vector (self path accumulator).
    pub fn add_column(&self, col: usize, values: &[Complex64]) {
        debug_assert_eq!(values.len(), self.rows);
        let mut data = self.data.lock().expect("amplitude matrix mutex poisoned");
        for (row, v) in values.iter().enumerate() {
            data[row * self.cols + col] += *v;
        }
    }

    /// Immutable copy for the single-threaded reduction stage.
    pub fn snapshot(&self) -> Vec<Complex64> {
        self.data
            .lock()
            .expect("amplitude matrix mutex poisoned")
            .clone()
    }

    /// All amplitudes finite? Checked after the compute stage; a non-finite
    /// entry surfaces as NumericOverflow.
    pub fn is_finite(&self) -> bool {
        self.data
            .lock()
            .expect("amplitude matrix mutex poisoned")
            .iter()
            .all(|v| v.re.is_finite() && v.im.is_finite())
    }
}
