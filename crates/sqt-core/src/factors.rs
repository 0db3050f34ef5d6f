use crate::error::{ScatterError, ScatterResult};
use crate::geom::Vec3;
use crate::selection::Selection;

/// 4-Gaussian X-ray form-factor coefficients,
/// f(q) = sum_i a_i exp(-b_i (q/4pi)^2) + c.
///
/// International Tables for Crystallography, Vol. C, Table 6.1.1.4.
#[derive(Debug, Clone, Copy)]
pub struct FactorCoefficients {
    pub a: [f64; 4],
    pub b: [f64; 4],
    pub c: f64,
}

impl FactorCoefficients {
    fn evaluate(&self, q: f64) -> f64 {
        // tables are parameterized in s = sin(theta)/lambda = q / 4pi
        let s = q / (4.0 * std::f64::consts::PI);
        let s2 = s * s;
        let mut f = self.c;
        for i in 0..4 {
            f += self.a[i] * (-self.b[i] * s2).exp();
        }
        f
    }
}

fn coefficients_for(element: &str) -> Option<FactorCoefficients> {
    let coeffs = match element {
        "H" => FactorCoefficients {
            a: [0.493002, 0.322912, 0.140191, 0.040810],
            b: [10.5109, 26.1257, 3.14236, 57.7997],
            c: 0.003038,
        },
        "C" => FactorCoefficients {
            a: [2.3100, 1.0200, 1.5886, 0.8650],
            b: [20.8439, 10.2075, 0.5687, 51.6512],
            c: 0.2156,
        },
        "N" => FactorCoefficients {
            a: [12.2126, 3.1322, 2.0125, 1.1663],
            b: [0.0057, 9.8933, 28.9975, 0.5826],
            c: -11.529,
        },
        "O" => FactorCoefficients {
            a: [3.0485, 2.2868, 1.5463, 0.8670],
            b: [13.2771, 5.7011, 0.3239, 32.9089],
            c: 0.2508,
        },
        "P" => FactorCoefficients {
            a: [6.4345, 4.1791, 1.7800, 1.4908],
            b: [1.9067, 27.1570, 0.5260, 68.1645],
            c: 1.1149,
        },
        "S" => FactorCoefficients {
            a: [6.9053, 5.2034, 1.4379, 1.5863],
            b: [1.4679, 22.2151, 0.2536, 56.1720],
            c: 0.8669,
        },
        _ => return None,
    };
    Some(coeffs)
}

#[derive(Debug, Clone)]
enum FactorKind {
    Constant(f64),
    Tabulated(FactorCoefficients),
}

/// Per-atom scattering amplitude table for the current |q|.
///
/// `update` recomputes the per-atom scalars; after that workers only read
/// through `get_all`, so the table is handed out as an immutable snapshot
/// per q-vector.
#[derive(Debug, Clone)]
pub struct ScatterFactors {
    kinds: Vec<FactorKind>,
    background: bool,
    current: Vec<f64>,
}

impl ScatterFactors {
    /// Uniform factor for every selected atom; the usual choice in tests
    /// and for neutron scattering off a single species.
    pub fn constant(n_atoms: usize, factor: f64) -> Self {
        Self {
            kinds: vec![FactorKind::Constant(factor); n_atoms],
            background: false,
            current: vec![factor; n_atoms],
        }
    }

    /// Table-driven factors resolved from the selection's element symbols.
    pub fn for_selection(selection: &Selection) -> ScatterResult<Self> {
        let mut kinds = Vec::with_capacity(selection.len());
        for element in &selection.elements {
            let coeffs = coefficients_for(element).ok_or_else(|| {
                ScatterError::Config(format!(
                    "no scattering-factor coefficients for element '{}'",
                    element
                ))
            })?;
            kinds.push(FactorKind::Tabulated(coeffs));
        }
        let current = vec![0.0; kinds.len()];
        let mut table = Self {
            kinds,
            background: false,
            current,
        };
        table.update(Vec3::zero());
        Ok(table)
    }

    /// Subtract the selection-averaged factor from every atom.
    pub fn set_background(&mut self, background: bool) {
        self.background = background;
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// Recompute per-atom factors for the magnitude of `q`.
    pub fn update(&mut self, q: Vec3) {
        let ql = q.norm();
        for (kind, slot) in self.kinds.iter().zip(self.current.iter_mut()) {
            *slot = match kind {
                FactorKind::Constant(f) => *f,
                FactorKind::Tabulated(coeffs) => coeffs.evaluate(ql),
            };
        }
        if self.background && !self.current.is_empty() {
            let mean = self.current.iter().sum::<f64>() / self.current.len() as f64;
            for slot in &mut self.current {
                *slot -= mean;
            }
        }
    }

    pub fn get_all(&self) -> &[f64] {
        &self.current
    }

    /// Snapshot for workers, valid for the q-vector `update` ran with.
    pub fn snapshot(&self) -> Vec<f64> {
        self.current.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn carbon_forward_scattering_is_electron_count() {
        let sel = Selection::all(1, "C");
        let mut table = ScatterFactors::for_selection(&sel).unwrap();
        table.update(Vec3::zero());
        // f(0) = sum a_i + c = Z = 6
        assert!((table.get_all()[0] - 6.0).abs() < 0.05);
    }

    #[test]
    fn factors_decay_with_q() {
        let sel = Selection::all(1, "O");
        let mut table = ScatterFactors::for_selection(&sel).unwrap();
        table.update(Vec3::new(0.5, 0.0, 0.0));
        let low = table.get_all()[0];
        table.update(Vec3::new(5.0, 0.0, 0.0));
        let high = table.get_all()[0];
        assert!(high < low);
    }

    #[test]
    fn background_subtracts_selection_mean() {
        let mut table = ScatterFactors::constant(4, 2.5);
        table.set_background(true);
        table.update(Vec3::new(1.0, 0.0, 0.0));
        assert!(table.get_all().iter().all(|f| f.abs() < 1e-15));
    }

    #[test]
    fn unknown_element_is_config_error() {
        let sel = Selection::all(1, "Xx");
        assert!(matches!(
            ScatterFactors::for_selection(&sel),
            Err(ScatterError::Config(_))
        ));
    }
}
