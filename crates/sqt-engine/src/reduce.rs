use num_complex::Complex64;
use rustfft::FftPlanner;
use sqt_core::decompose::{EvenDecomposition, ModuloDecomposition};
use sqt_core::error::ScatterResult;

use crate::transport::Communicator;

/// Per-row summed intensity: sum_c A[i,c] conj(A[i,c]). The matrix stays
/// c-wide up to this point; nothing is folded into column 0 beforehand.
pub fn row_intensities(data: &[Complex64], rows: usize, cols: usize) -> Vec<Complex64> {
    let mut out = vec![Complex64::new(0.0, 0.0); rows];
    for (i, slot) in out.iter_mut().enumerate() {
        let mut sum = 0.0;
        for c in 0..cols {
            sum += data[i * cols + c].norm_sqr();
        }
        *slot = Complex64::new(sum, 0.0);
    }
    out
}

/// Gather per-frame values scattered over the partition into the global
/// NF vector at the root rank.
///
/// Every rank pads its block to the negotiated maximum, the root undoes
/// the rank interleaving with the same even decomposition that assigned
/// the frames. Ranks with no frames still join every collective.
pub fn gather_frames(
    comm: &dyn Communicator,
    local: &[Complex64],
    n_frames: usize,
) -> ScatterResult<Option<Vec<Complex64>>> {
    let max_size = comm.all_reduce_max(local.len())?;
    let mut padded = local.to_vec();
    padded.resize(max_size, Complex64::new(0.0, 0.0));
    let gathered = match comm.gather(&padded, 0)? {
        Some(g) => g,
        None => return Ok(None),
    };
    Ok(Some(deinterleave(&gathered, max_size, n_frames, comm.size())))
}

/// All-rank variant of `gather_frames`; every rank assembles the global
/// series (used to feed the correlators).
pub fn assemble_frames(
    comm: &dyn Communicator,
    local: &[Complex64],
    n_frames: usize,
) -> ScatterResult<Vec<Complex64>> {
    let max_size = comm.all_reduce_max(local.len())?;
    let mut padded = local.to_vec();
    padded.resize(max_size, Complex64::new(0.0, 0.0));
    let gathered = comm.all_gather(&padded)?;
    Ok(deinterleave(&gathered, max_size, n_frames, comm.size()))
}

fn deinterleave(
    gathered: &[Complex64],
    stride: usize,
    n_frames: usize,
    n_ranks: usize,
) -> Vec<Complex64> {
    let decomposition = EvenDecomposition::new(n_frames, n_ranks);
    let mut out = vec![Complex64::new(0.0, 0.0); n_frames];
    for rank in 0..n_ranks {
        for (j, frame) in decomposition.indices_for(rank).enumerate() {
            out[frame] = gathered[rank * stride + j];
        }
    }
    out
}

pub fn series_mean(series: &[Complex64]) -> Complex64 {
    if series.is_empty() {
        return Complex64::new(0.0, 0.0);
    }
    series.iter().sum::<Complex64>() / series.len() as f64
}

/// Direct autocorrelation of the lags in `taus`:
/// c(tau) = 1/(NF-tau) sum_k conj(a_k - mu)(a_{k+tau} - mu).
pub fn correlate_lags(
    series: &[Complex64],
    taus: impl Iterator<Item = usize>,
    mean: Complex64,
) -> Vec<Complex64> {
    let n_frames = series.len();
    let mut out = vec![Complex64::new(0.0, 0.0); n_frames];
    for tau in taus {
        let windows = n_frames - tau;
        if windows == 0 {
            continue;
        }
        let mut acc = Complex64::new(0.0, 0.0);
        for k in 0..windows {
            let a1 = series[k] - mean;
            let a2 = series[k + tau] - mean;
            acc += a1.conj() * a2;
        }
        out[tau] = acc / windows as f64;
    }
    out
}

/// Serial direct autocorrelation over all lags (self path and tests).
pub fn autocorrelate_direct(series: &[Complex64], zeromean: bool) -> Vec<Complex64> {
    let mean = if zeromean {
        series_mean(series)
    } else {
        Complex64::new(0.0, 0.0)
    };
    correlate_lags(series, 0..series.len(), mean)
}

/// FFT autocorrelation: zero-pad to 2 NF, forward transform, pointwise
/// |.|^2, inverse transform, unbias each lag by 1/(NF-tau). Matches the
/// direct form to floating-point noise.
pub fn autocorrelate_fft(series: &[Complex64], zeromean: bool) -> Vec<Complex64> {
    let n_frames = series.len();
    if n_frames == 0 {
        return Vec::new();
    }
    let mean = if zeromean {
        series_mean(series)
    } else {
        Complex64::new(0.0, 0.0)
    };
    let size = 2 * n_frames;
    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(size);
    let ifft = planner.plan_fft_inverse(size);
    let mut buf = vec![Complex64::new(0.0, 0.0); size];
    for (slot, v) in buf.iter_mut().zip(series.iter()) {
        *slot = *v - mean;
    }
    fft.process(&mut buf);
    for v in buf.iter_mut() {
        *v = Complex64::new(v.norm_sqr(), 0.0);
    }
    ifft.process(&mut buf);
    let scale = 1.0 / size as f64;
    let mut out = vec![Complex64::new(0.0, 0.0); n_frames];
    for (tau, slot) in out.iter_mut().enumerate() {
        let windows = (n_frames - tau) as f64;
        if windows > 0.0 {
            *slot = buf[tau] * (scale / windows);
        }
    }
    out
}

/// Distributed direct correlation of one assembled column: the lag set is
/// spread round-robin over the partition, partial results reduce-sum into
/// the root's length-NF buffer.
pub fn correlate_column_direct(
    comm: &dyn Communicator,
    series: &[Complex64],
    zeromean: bool,
) -> ScatterResult<Option<Vec<Complex64>>> {
    let mean = if zeromean {
        series_mean(series)
    } else {
        Complex64::new(0.0, 0.0)
    };
    let taus = ModuloDecomposition::new(series.len(), comm.size());
    let local = correlate_lags(series, taus.indices_for(comm.rank()), mean);
    comm.reduce_sum(&local, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series_from(values: &[(f64, f64)]) -> Vec<Complex64> {
        values.iter().map(|&(re, im)| Complex64::new(re, im)).collect()
    }

    #[test]
    fn row_intensities_sum_all_columns() {
        // two rows, two columns
        let data = series_from(&[(1.0, 0.0), (0.0, 2.0), (3.0, 0.0), (0.0, 0.0)]);
        let out = row_intensities(&data, 2, 2);
        assert!((out[0].re - 5.0).abs() < 1e-14);
        assert!((out[1].re - 9.0).abs() < 1e-14);
    }

    #[test]
    fn fft_matches_direct_on_fixed_series() {
        let series = series_from(&[(1.0, 0.5), (-0.5, 1.0), (0.25, -1.5), (2.0, 0.0), (0.0, 0.0)]);
        let direct = autocorrelate_direct(&series, false);
        let fft = autocorrelate_fft(&series, false);
        for (d, f) in direct.iter().zip(fft.iter()) {
            assert!((*d - *f).norm() < 1e-12);
        }
    }

    #[test]
    fn fft_matches_direct_with_zeromean() {
        let series = series_from(&[(3.0, 1.0), (3.5, 1.0), (2.5, 0.5), (3.0, 1.5)]);
        let direct = autocorrelate_direct(&series, true);
        let fft = autocorrelate_fft(&series, true);
        for (d, f) in direct.iter().zip(fft.iter()) {
            assert!((*d - *f).norm() < 1e-12);
        }
    }

    #[test]
    fn constant_series_correlates_to_square() {
        let series = vec![Complex64::new(2.0, 0.0); 6];
        let corr = autocorrelate_direct(&series, false);
        for c in &corr {
            assert!((c.re - 4.0).abs() < 1e-14);
            assert!(c.im.abs() < 1e-14);
        }
        // zero-mean of a constant series vanishes; adding back |mu|^2
        // reproduces the raw correlation
        let centered = autocorrelate_direct(&series, true);
        for (c, raw) in centered.iter().zip(corr.iter()) {
            assert!((*c + Complex64::new(4.0, 0.0) - *raw).norm() < 1e-14);
        }
    }

    #[test]
    fn single_frame_has_no_division_by_zero() {
        let series = vec![Complex64::new(1.5, -0.5)];
        let corr = autocorrelate_direct(&series, false);
        assert_eq!(corr.len(), 1);
        assert!((corr[0].re - 2.5).abs() < 1e-14);
        let fft = autocorrelate_fft(&series, false);
        assert!((fft[0].re - 2.5).abs() < 1e-14);
    }
}
