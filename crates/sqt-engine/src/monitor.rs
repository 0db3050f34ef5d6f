//! NDJSON progress events for the scattering run.
//!
//! Events go to stderr so stdout stays free for result summaries.
//!
//! Event types:
//!   - run_started: world/partition layout and q count
//!   - progress: per-partition completed fraction
//!   - vector_done: one q-vector finished and written
//!   - warning: non-fatal condition (e.g. undersized coordinate cache)
//!   - error: fatal condition with kind, rank and q context
//!   - run_complete: record count and wall time

#[derive(Debug, Clone, Copy)]
pub struct StreamEmitter {
    enabled: bool,
}

impl StreamEmitter {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn disabled() -> Self {
        Self { enabled: false }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn emit_json(&self, json: &str) {
        if self.enabled {
            eprintln!("{}", json);
        }
    }

    pub fn emit_run_started(
        &self,
        n_qvectors: usize,
        n_frames: usize,
        partitions: usize,
        partition_size: usize,
    ) {
        self.emit_json(&format!(
            r#"{{"event":"run_started","qvectors":{},"frames":{},"partitions":{},"partition_size":{}}}"#,
            n_qvectors, n_frames, partitions, partition_size
        ));
    }

    pub fn emit_progress(&self, partition: usize, progress: f64) {
        self.emit_json(&format!(
            r#"{{"event":"progress","partition":{},"progress":{:.4}}}"#,
            partition, progress
        ));
    }

    pub fn emit_vector_done(&self, q_index: usize, q: [f64; 3]) {
        self.emit_json(&format!(
            r#"{{"event":"vector_done","q_index":{},"q":[{},{},{}]}}"#,
            q_index, q[0], q[1], q[2]
        ));
    }

    pub fn emit_warning(&self, message: &str) {
        let message = serde_json::to_string(message).unwrap_or_else(|_| "\"\"".to_string());
        self.emit_json(&format!(r#"{{"event":"warning","message":{}}}"#, message));
    }

    pub fn emit_error(&self, code: &str, message: &str, context: Option<&str>) {
        let code = serde_json::to_string(code).unwrap_or_else(|_| "\"unknown\"".to_string());
        let message = serde_json::to_string(message).unwrap_or_else(|_| "\"\"".to_string());
        let ctx = context
            .map(|s| serde_json::to_string(s).unwrap_or_default())
            .unwrap_or_else(|| "null".to_string());
        self.emit_json(&format!(
            r#"{{"event":"error","code":{},"message":{},"context":{}}}"#,
            code, message, ctx
        ));
    }

    pub fn emit_run_complete(&self, records: usize, elapsed_ms: u64) {
        self.emit_json(&format!(
            r#"{{"event":"run_complete","records":{},"elapsed_ms":{}}}"#,
            records, elapsed_ms
        ));
    }
}

/// Progress publisher of one partition. Rate-limits to 0.1% deltas so a
/// busy compute loop cannot flood the stream.
#[derive(Debug, Clone)]
pub struct MonitorClient {
    emitter: StreamEmitter,
    partition: usize,
    last: f64,
}

impl MonitorClient {
    pub fn new(emitter: StreamEmitter, partition: usize) -> Self {
        Self {
            emitter,
            partition,
            last: -1.0,
        }
    }

    pub fn update(&mut self, progress: f64) {
        let progress = progress.clamp(0.0, 1.0);
        if progress - self.last >= 0.001 || progress >= 1.0 {
            self.emitter.emit_progress(self.partition, progress);
            self.last = progress;
        }
    }

    pub fn emitter(&self) -> StreamEmitter {
        self.emitter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_emitter_is_silent() {
        let emitter = StreamEmitter::disabled();
        assert!(!emitter.is_enabled());
        emitter.emit_run_started(4, 16, 2, 2);
        emitter.emit_error("fatal", "boom", None);
    }

    #[test]
    fn monitor_clamps_progress() {
        let mut monitor = MonitorClient::new(StreamEmitter::disabled(), 0);
        monitor.update(2.0);
        assert!((monitor.last - 1.0).abs() < 1e-12);
    }
}
