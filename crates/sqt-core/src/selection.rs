use crate::error::{ScatterError, ScatterResult};

/// Subset of trajectory atoms the scattering runs over.
///
/// `indices` are ascending positions into the trajectory's atom list;
/// `elements` is the parallel list of element symbols used by the
/// scattering-factor table.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub indices: Vec<u32>,
    pub elements: Vec<String>,
}

impl Selection {
    pub fn new(indices: Vec<u32>, elements: Vec<String>) -> ScatterResult<Self> {
        if indices.len() != elements.len() {
            return Err(ScatterError::Config(format!(
                "selection has {} indices but {} elements",
                indices.len(),
                elements.len()
            )));
        }
        let mut pairs: Vec<(u32, String)> = indices.into_iter().zip(elements).collect();
        pairs.sort_by_key(|(idx, _)| *idx);
        if pairs.windows(2).any(|w| w[0].0 == w[1].0) {
            return Err(ScatterError::Config(
                "selection contains duplicate atom indices".into(),
            ));
        }
        let (indices, elements) = pairs.into_iter().unzip();
        Ok(Self { indices, elements })
    }

    /// All atoms of a trajectory, single element kind.
    pub fn all(n_atoms: usize, element: &str) -> Self {
        Self {
            indices: (0..n_atoms as u32).collect(),
            elements: vec![element.to_string(); n_atoms],
        }
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn validate(&self, n_atoms: usize) -> ScatterResult<()> {
        for &idx in &self.indices {
            if idx as usize >= n_atoms {
                return Err(ScatterError::Config(format!(
                    "selection index {} out of bounds for trajectory with {} atoms",
                    idx, n_atoms
                )));
            }
        }
        Ok(())
    }
}
