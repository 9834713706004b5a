//! Optional usage instrumentation, scaled down from the teacher's per-stage buffer usage
//! tracking to the single stage a file-backed queue actually has.
//!
//! Everything here is feature-gated behind `metrics` and is a thin wrapper over the `metrics`
//! facade; none of it is load-bearing for correctness.

#![cfg(feature = "metrics")]

/// Records that `bytes` worth of payload were appended to the queue at `path`.
pub fn record_put(path: &str, bytes: u64) {
    metrics::counter!("filequeue_records_put_total", "path" => path.to_string()).increment(1);
    metrics::counter!("filequeue_bytes_written_total", "path" => path.to_string())
        .increment(bytes);
}

/// Records that one record was consumed from the queue at `path`.
pub fn record_get(path: &str) {
    metrics::counter!("filequeue_records_get_total", "path" => path.to_string()).increment(1);
}

/// Updates the current depth gauge for the queue at `path`.
pub fn set_depth(path: &str, depth: u32) {
    metrics::gauge!("filequeue_depth", "path" => path.to_string()).set(depth as f64);
}
