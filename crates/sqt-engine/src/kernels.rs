use num_complex::Complex64;
use sqt_core::coords::CoordSet;
use sqt_core::geom::Vec3;
use sqt_core::special::{bessel_j0, bessel_jn, sph_bessel, spherical_harmonic};

use crate::config::KernelFamily;

/// Column count of the amplitude matrix for one kernel family.
pub fn column_count(family: KernelFamily, resolution: usize) -> usize {
    match family {
        KernelFamily::AllVectors | KernelFamily::SelfVectors => 1,
        KernelFamily::MultipoleSphere => (resolution + 1) * (resolution + 1),
        KernelFamily::MultipoleCylinder => 1 + 4 * resolution,
    }
}

/// Coherent all-atom amplitude of one frame: A = sum_j f_j exp(i q.r_j).
pub fn all_vectors_row(cs: &CoordSet, factors: &[f64], q: Vec3) -> Complex64 {
    let mut a = Complex64::new(0.0, 0.0);
    for j in 0..cs.len() {
        let phase = q.x * cs.c1[j] + q.y * cs.c2[j] + q.z * cs.c3[j];
        a += factors[j] * Complex64::from_polar(1.0, phase);
    }
    a
}

/// Single-atom phase trace over a run of frames (self scattering).
/// Its time autocorrelation carries the f_j^2 weight.
pub fn self_trace_element(position: [f64; 3], factor: f64, q: Vec3) -> Complex64 {
    let phase = q.x * position[0] + q.y * position[1] + q.z * position[2];
    factor * Complex64::from_polar(1.0, phase)
}

/// Spherical multipole coefficients of one frame,
/// a_lm = sum_j f_j 4pi i^l j_l(|q| r_j) Y_lm*(theta_j, phi_j),
/// stored l-major (l^2 + l + m) and normalized by sqrt(4pi) so the plain
/// column-wise |.|^2 sum of the reduction is the intensity.
pub fn multipole_sphere_row(
    cs: &CoordSet,
    factors: &[f64],
    q_length: f64,
    resolution: usize,
    out: &mut [Complex64],
) {
    let four_pi = 4.0 * std::f64::consts::PI;
    out.fill(Complex64::new(0.0, 0.0));
    for j in 0..cs.len() {
        let r = cs.c1[j];
        let phi = cs.c2[j];
        let theta = cs.c3[j];
        let esf = factors[j];
        for l in 0..=resolution {
            let il = Complex64::i().powu(l as u32);
            let prefactor = four_pi * il * esf * sph_bessel(l, q_length * r);
            for m in -(l as i32)..=(l as i32) {
                let ylm = spherical_harmonic(l, m, theta, phi);
                out[l * l + (m + l as i32) as usize] += prefactor * ylm.conj();
            }
        }
    }
    let norm = 1.0 / four_pi.sqrt();
    for a in out.iter_mut() {
        *a *= norm;
    }
}

/// Cylindrical multipole coefficients of one frame, columns
/// {A0, sqrt(1/2) A_l, sqrt(1/2) B_l, sqrt(1/2) C_l, sqrt(1/2) D_l}.
/// The sqrt(1/2) weight makes the squared column sum the orientationally
/// averaged |A|^2.
pub fn multipole_cylinder_row(
    cs: &CoordSet,
    factors: &[f64],
    q: Vec3,
    axis: Vec3,
    resolution: usize,
    out: &mut [Complex64],
) {
    let o = axis.unit().unwrap_or(Vec3::new(0.0, 0.0, 1.0));
    let q_parallel = o.scale(o.dot(q));
    let q_perpendicular = q.sub(q_parallel);
    let qr = q_perpendicular.norm();
    let qz = q_parallel.norm();

    let lmax = resolution;
    let mut a = vec![Complex64::new(0.0, 0.0); lmax + 1];
    let mut b = vec![Complex64::new(0.0, 0.0); lmax + 1];
    let mut c = vec![Complex64::new(0.0, 0.0); lmax + 1];
    let mut d = vec![Complex64::new(0.0, 0.0); lmax + 1];

    for j in 0..cs.len() {
        let r = cs.c1[j];
        let phi = cs.c2[j];
        let z = cs.c3[j];
        let esf = factors[j];

        // sign factor defaults to +1 when z or q_parallel vanishes
        let parallel_sign = if z != 0.0 && qz != 0.0 {
            (z * qz) / (z.abs() * qz.abs())
        } else {
            1.0
        };
        let expi = Complex64::from_polar(1.0, parallel_sign * (z * qz).abs());

        a[0] += expi * bessel_j0(r * qr) * esf;
        for l in 1..=lmax {
            let sign_even = if l % 2 == 0 { 1.0 } else { -1.0 };
            let fac1 = 2.0 * sign_even * bessel_jn(2 * l, r * qr);
            let fac2 = Complex64::i() * (2.0 * (-sign_even) * bessel_jn(2 * l - 1, r * qr));
            let lphi = l as f64;
            a[l] += fac1 * expi * (2.0 * lphi * phi).cos() * esf;
            b[l] += fac1 * expi * (2.0 * lphi * phi).sin() * esf;
            c[l] += fac2 * expi * ((2.0 * lphi - 1.0) * phi).cos() * esf;
            d[l] += fac2 * expi * ((2.0 * lphi - 1.0) * phi).sin() * esf;
        }
    }

    let half_sqrt = 0.5f64.sqrt();
    out[0] = a[0];
    for l in 1..=lmax {
        out[(l - 1) * 4 + 1] = half_sqrt * a[l];
        out[(l - 1) * 4 + 2] = half_sqrt * b[l];
        out[(l - 1) * 4 + 3] = half_sqrt * c[l];
        out[(l - 1) * 4 + 4] = half_sqrt * d[l];
    }
}

/// Post-alignment phase correction, exp(i q.R) with R the vector the cache
/// subtracted from the frame. Restores phases relative to the absolute
/// frame so correlations reflect motion about the selection center.
pub fn alignment_factor(q: Vec3, alignment: Vec3) -> Complex64 {
    Complex64::from_polar(1.0, q.dot(alignment))
}
