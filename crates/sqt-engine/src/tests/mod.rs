mod part2;

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use sqt_core::traj::InMemoryFrames;

pub(crate) fn temp_signal_path(tag: &str) -> PathBuf {
    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!(
        "sqt-{}-{}-{}.sqsig",
        std::process::id(),
        tag,
        n
    ))
}

pub(crate) fn source_from(frames: Vec<Vec<[f64; 3]>>) -> InMemoryFrames {
    InMemoryFrames::new(frames).unwrap()
}
