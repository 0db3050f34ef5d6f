use crate::geom::Vec3;
use crate::selection::Selection;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Representation {
    Cartesian,
    Spherical,
    Cylindrical,
}

/// Per-frame coordinates of the selected atoms in one representation.
///
/// Component meaning by representation:
/// - Cartesian:   c1 = x, c2 = y, c3 = z
/// - Spherical:   c1 = r, c2 = phi, c3 = theta
/// - Cylindrical: c1 = rho, c2 = phi, c3 = z
#[derive(Debug, Clone)]
pub struct CoordSet {
    pub representation: Representation,
    pub c1: Vec<f64>,
    pub c2: Vec<f64>,
    pub c3: Vec<f64>,
}

impl CoordSet {
    pub fn len(&self) -> usize {
        self.c1.len()
    }

    pub fn is_empty(&self) -> bool {
        self.c1.is_empty()
    }

    /// Approximate heap footprint, used by the cache byte budget.
    pub fn byte_size(&self) -> usize {
        3 * std::mem::size_of::<f64>() * self.c1.len()
    }

    /// Extract the selected atoms from a full frame, optionally subtract
    /// the selection centroid, and convert into `representation` with the
    /// multipole axis as the local z direction.
    ///
    /// Returns the set together with the subtracted post-alignment vector
    /// (zero when centering is off).
    pub fn from_frame(
        frame: &[[f64; 3]],
        selection: &Selection,
        representation: Representation,
        axis: Vec3,
        center: bool,
    ) -> (CoordSet, Vec3) {
        let n = selection.len();
        let mut cartesian = Vec::with_capacity(n);
        for &idx in &selection.indices {
            cartesian.push(Vec3::from_array(frame[idx as usize]));
        }

        let alignment = if center && n > 0 {
            let mut sum = Vec3::zero();
            for p in &cartesian {
                sum = sum.add(*p);
            }
            let centroid = sum.scale(1.0 / n as f64);
            for p in &mut cartesian {
                *p = p.sub(centroid);
            }
            centroid
        } else {
            Vec3::zero()
        };

        let (e1, e2, e3) = local_basis(axis);
        let mut c1 = Vec::with_capacity(n);
        let mut c2 = Vec::with_capacity(n);
        let mut c3 = Vec::with_capacity(n);
        for p in &cartesian {
            match representation {
                Representation::Cartesian => {
                    c1.push(p.x);
                    c2.push(p.y);
                    c3.push(p.z);
                }
                Representation::Spherical => {
                    let x = p.dot(e1);
                    let y = p.dot(e2);
                    let z = p.dot(e3);
                    let r = (x * x + y * y + z * z).sqrt();
                    let phi = y.atan2(x);
                    let theta = if r == 0.0 { 0.0 } else { (z / r).clamp(-1.0, 1.0).acos() };
                    c1.push(r);
                    c2.push(phi);
                    c3.push(theta);
                }
                Representation::Cylindrical => {
                    let x = p.dot(e1);
                    let y = p.dot(e2);
                    let z = p.dot(e3);
                    c1.push((x * x + y * y).sqrt());
                    c2.push(y.atan2(x));
                    c3.push(z);
                }
            }
        }

        (
            CoordSet {
                representation,
                c1,
                c2,
                c3,
            },
            alignment,
        )
    }
}

/// Right-handed orthonormal basis with `axis` as e3. For the default
/// axis (0,0,1) this reduces to the global frame.
pub fn local_basis(axis: Vec3) -> (Vec3, Vec3, Vec3) {
    let e3 = axis.unit().unwrap_or(Vec3::new(0.0, 0.0, 1.0));
    let seed = Vec3::new(1.0, 0.0, 0.0);
    let e2 = match e3.cross(seed).unit() {
        Some(v) => v,
        // axis parallel to x: seed with y instead
        None => e3
            .cross(Vec3::new(0.0, 1.0, 0.0))
            .unit()
            .unwrap_or(Vec3::new(0.0, 0.0, 1.0)),
    };
    let e1 = e2.cross(e3);
    (e1, e2, e3)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sel(n: usize) -> Selection {
        Selection::all(n, "H")
    }

    #[test]
    fn default_axis_basis_is_identity() {
        let (e1, e2, e3) = local_basis(Vec3::new(0.0, 0.0, 1.0));
        assert!((e1.x - 1.0).abs() < 1e-15);
        assert!((e2.y - 1.0).abs() < 1e-15);
        assert!((e3.z - 1.0).abs() < 1e-15);
    }

    #[test]
    fn spherical_conversion_matches_known_point() {
        let frame = vec![[0.0, 0.0, 2.0], [1.0, 0.0, 0.0]];
        let (cs, shift) = CoordSet::from_frame(
            &frame,
            &sel(2),
            Representation::Spherical,
            Vec3::new(0.0, 0.0, 1.0),
            false,
        );
        assert_eq!(shift, Vec3::zero());
        // on-axis point: r=2, theta=0
        assert!((cs.c1[0] - 2.0).abs() < 1e-12);
        assert!(cs.c3[0].abs() < 1e-12);
        // equatorial point: r=1, theta=pi/2
        assert!((cs.c1[1] - 1.0).abs() < 1e-12);
        assert!((cs.c3[1] - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
    }

    #[test]
    fn cylindrical_conversion_keeps_signed_z() {
        let frame = vec![[3.0, 0.0, -2.0]];
        let (cs, _) = CoordSet::from_frame(
            &frame,
            &sel(1),
            Representation::Cylindrical,
            Vec3::new(0.0, 0.0, 1.0),
            false,
        );
        assert!((cs.c1[0] - 3.0).abs() < 1e-12);
        assert!((cs.c3[0] + 2.0).abs() < 1e-12);
    }

    #[test]
    fn centering_records_centroid() {
        let frame = vec![[1.0, 1.0, 1.0], [3.0, 1.0, 1.0]];
        let (cs, shift) = CoordSet::from_frame(
            &frame,
            &sel(2),
            Representation::Cartesian,
            Vec3::new(0.0, 0.0, 1.0),
            true,
        );
        assert!((shift.x - 2.0).abs() < 1e-12);
        assert!((cs.c1[0] + 1.0).abs() < 1e-12);
        assert!((cs.c1[1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn tilted_axis_preserves_radius() {
        let frame = vec![[0.0, 3.0, 4.0]];
        let (cs, _) = CoordSet::from_frame(
            &frame,
            &sel(1),
            Representation::Spherical,
            Vec3::new(0.0, 3.0, 4.0),
            false,
        );
        assert!((cs.c1[0] - 5.0).abs() < 1e-12);
        // point lies on the axis
        assert!(cs.c3[0].abs() < 1e-12);
    }
}
