use crate::geom::Vec3;

/// Orientation class: the q-vectors sharing one magnitude. Averaging
/// |A|^2 over the members eliminates the orientational dependence when
/// discrete-vector averaging is configured.
#[derive(Debug, Clone)]
pub struct QShell {
    pub magnitude: f64,
    pub members: Vec<usize>,
}

/// Group q-vectors into |q| shells. Magnitudes within `tol` of a shell's
/// representative join that shell; shells come out sorted by magnitude,
/// members keep their input order.
pub fn shells(vectors: &[Vec3], tol: f64) -> Vec<QShell> {
    let mut out: Vec<QShell> = Vec::new();
    for (i, q) in vectors.iter().enumerate() {
        let ql = q.norm();
        match out
            .iter_mut()
            .find(|shell| (shell.magnitude - ql).abs() <= tol)
        {
            Some(shell) => shell.members.push(i),
            None => out.push(QShell {
                magnitude: ql,
                members: vec![i],
            }),
        }
    }
    out.sort_by(|a, b| a.magnitude.total_cmp(&b.magnitude));
    out
}
