use std::path::PathBuf;
use std::sync::Arc;

use sqt_core::factors::ScatterFactors;
use sqt_core::geom::Vec3;
use sqt_core::selection::Selection;
use sqt_core::traj::{FrameSource, InMemoryFrames};
use sqt_engine::config::{CorrelationMethod, CorrelationType, ScatterConfig};
use sqt_engine::monitor::StreamEmitter;
use sqt_engine::run::run_scattering;
use sqt_engine::writer::{ResultRecord, SignalReader};

fn temp_path(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!("sqt-it-{}-{}.sqsig", std::process::id(), tag))
}

fn trajectory(n_frames: usize, n_atoms: usize) -> Vec<Vec<[f64; 3]>> {
    (0..n_frames)
        .map(|t| {
            (0..n_atoms)
                .map(|j| {
                    let phase = 0.21 * t as f64 + 0.9 * j as f64;
                    [phase.sin(), phase.cos() * 0.7 + j as f64, 0.4 * phase]
                })
                .collect()
        })
        .collect()
}

fn config_json(correlation: &str, method: &str, partitions: usize, workers: usize) -> String {
    format!(
        r#"{{
            "scattering": {{
                "target": "all",
                "correlation": {{"type": "{}", "method": "{}"}},
                "qvectors": [[0.5, 0.0, 0.0], [0.0, 0.9, 0.0], [0.4, 0.4, 0.1], [1.2, -0.3, 0.6]]
            }},
            "runtime": {{"workers": {}, "partitions": {}}}
        }}"#,
        correlation, method, workers, partitions
    )
}

fn run_sorted(config: &ScatterConfig, frames: Vec<Vec<[f64; 3]>>, world: usize, tag: &str) -> Vec<ResultRecord> {
    let source = Arc::new(InMemoryFrames::new(frames).unwrap());
    let n_atoms = source.n_atoms();
    let selection = Arc::new(Selection::all(n_atoms, "H"));
    let factors = ScatterFactors::constant(n_atoms, 1.0);
    let path = temp_path(tag);
    let summary = run_scattering(
        config,
        source,
        selection,
        factors,
        world,
        &path,
        StreamEmitter::disabled(),
    )
    .unwrap();
    let mut records = SignalReader::open(&path).unwrap().records;
    let _ = std::fs::remove_file(&path);
    assert_eq!(summary.records, records.len());
    records.sort_by_key(|record| {
        config
            .scattering
            .qvectors
            .iter()
            .position(|&q| Vec3::from_array(q) == record.q)
            .unwrap_or(usize::MAX)
    });
    records
}

fn assert_records_close(a: &[ResultRecord], b: &[ResultRecord], tol: f64) {
    assert_eq!(a.len(), b.len());
    for (x, y) in a.iter().zip(b.iter()) {
        assert_eq!(x.q, y.q);
        assert!((x.fq - y.fq).norm() <= tol * x.fq.norm().max(1.0));
        assert!((x.fq2 - y.fq2).norm() <= tol * x.fq2.norm().max(1.0));
        match (&x.fqt, &y.fqt) {
            (None, None) => {}
            (Some(u), Some(v)) => {
                assert_eq!(u.len(), v.len());
                for (p, r) in u.iter().zip(v.iter()) {
                    assert!((*p - *r).norm() <= tol * p.norm().max(1.0));
                }
            }
            _ => panic!("record shape mismatch at q = {:?}", x.q),
        }
    }
}

#[test]
fn two_partitions_of_two_ranks_match_serial_run() {
    // NF=8, 2 partitions x 2 ranks: frames split {0..4} / {4..8} inside
    // each partition, q-set split between partitions
    let config =
        ScatterConfig::from_json(&config_json("time", "direct", 2, 2)).unwrap();
    let serial_config =
        ScatterConfig::from_json(&config_json("time", "direct", 1, 2)).unwrap();
    let frames = trajectory(8, 3);

    let parallel = run_sorted(&config, frames.clone(), 4, "p2x2");
    let serial = run_sorted(&serial_config, frames, 1, "serial");
    assert_records_close(&parallel, &serial, 1e-12);
}

#[test]
fn partition_count_does_not_change_static_results() {
    let frames = trajectory(7, 2);
    let serial_config =
        ScatterConfig::from_json(&config_json("none", "direct", 1, 1)).unwrap();
    let wide_config =
        ScatterConfig::from_json(&config_json("none", "direct", 4, 1)).unwrap();
    let serial = run_sorted(&serial_config, frames.clone(), 1, "static-serial");
    let wide = run_sorted(&wide_config, frames, 4, "static-wide");
    assert_records_close(&wide, &serial, 1e-12);
}

#[test]
fn fftw_method_matches_direct_across_ranks() {
    let frames = trajectory(12, 2);
    let direct_config =
        ScatterConfig::from_json(&config_json("time", "direct", 2, 1)).unwrap();
    let fftw_config =
        ScatterConfig::from_json(&config_json("time", "fftw", 2, 1)).unwrap();
    let direct = run_sorted(&direct_config, frames.clone(), 2, "it-direct");
    let fftw = run_sorted(&fftw_config, frames, 2, "it-fftw");
    assert_records_close(&fftw, &direct, 1e-9);
}

#[test]
fn self_scattering_splits_atoms_across_ranks() {
    let mut config = ScatterConfig::from_json(&config_json("time", "direct", 1, 2)).unwrap();
    config.scattering.kind = sqt_engine::config::ScatteringKind::SelfKind;
    assert_eq!(config.scattering.correlation.kind, CorrelationType::Time);
    assert_eq!(config.scattering.correlation.method, CorrelationMethod::Direct);
    let frames = trajectory(6, 5);

    let serial = run_sorted(&config, frames.clone(), 1, "self-serial");
    let parallel = run_sorted(&config, frames, 3, "self-par");
    assert_records_close(&parallel, &serial, 1e-12);
}
