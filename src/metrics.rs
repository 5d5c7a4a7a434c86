//! Prometheus metrics
//!
//! Scoped to what this crate actually does: part/upload counters and
//! histograms. No auth or zero-copy metrics — those belonged to the
//! surrounding proxy this crate was carved out of.

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram, register_histogram_vec, Counter,
    CounterVec, Histogram, HistogramVec,
};

lazy_static! {
    pub static ref UPLOADS_TOTAL: CounterVec = register_counter_vec!(
        "tus_s3_uploads_total",
        "Total number of uploads by terminal status",
        &["status"]
    )
    .unwrap();

    pub static ref UPLOAD_BYTES_TOTAL: Counter = register_counter!(
        "tus_s3_upload_bytes_total",
        "Total bytes accepted across all writes"
    )
    .unwrap();

    pub static ref UPLOAD_DURATION: HistogramVec = register_histogram_vec!(
        "tus_s3_upload_duration_seconds",
        "Duration of a single write() call in seconds",
        &["status"],
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0]
    )
    .unwrap();

    pub static ref MULTIPART_UPLOADS: CounterVec = register_counter_vec!(
        "tus_s3_multipart_uploads_total",
        "Total multipart uploads by terminal status",
        &["status"]
    )
    .unwrap();

    pub static ref MULTIPART_PARTS: Histogram = register_histogram!(
        "tus_s3_multipart_parts",
        "Number of parts per completed multipart upload",
        vec![1.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0, 5000.0, 10000.0]
    )
    .unwrap();

    pub static ref CARRY_BYTES_TOTAL: Counter = register_counter!(
        "tus_s3_carry_bytes_total",
        "Total bytes persisted as incomplete-part carry objects"
    )
    .unwrap();

    pub static ref ERRORS_TOTAL: CounterVec = register_counter_vec!(
        "tus_s3_errors_total",
        "Total errors by kind",
        &["kind"]
    )
    .unwrap();
}

/// Record a successful `write` call.
pub fn record_upload_success(bytes: u64) {
    UPLOADS_TOTAL.with_label_values(&["success"]).inc();
    UPLOAD_BYTES_TOTAL.inc_by(bytes as f64);
}

/// Record a failed `write` call.
pub fn record_upload_failure() {
    UPLOADS_TOTAL.with_label_values(&["failure"]).inc();
}

/// Record the wall-clock duration of a `write` call.
pub fn record_upload_duration(status: &str, duration_secs: f64) {
    UPLOAD_DURATION
        .with_label_values(&[status])
        .observe(duration_secs);
}

/// Record a completed multipart upload and its final part count.
pub fn record_multipart_upload_success(parts_count: usize) {
    MULTIPART_UPLOADS.with_label_values(&["success"]).inc();
    MULTIPART_PARTS.observe(parts_count as f64);
}

/// Record an aborted or failed multipart upload.
pub fn record_multipart_upload_failure() {
    MULTIPART_UPLOADS.with_label_values(&["failure"]).inc();
}

/// Record bytes persisted to the incomplete-part carry object.
pub fn record_carry_bytes(bytes: u64) {
    CARRY_BYTES_TOTAL.inc_by(bytes as f64);
}

/// Record an error by kind (`"not_found"`, `"storage"`, `"stream"`).
pub fn record_error(kind: &str) {
    ERRORS_TOTAL.with_label_values(&[kind]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_upload_success() {
        record_upload_success(1024);
    }

    #[test]
    fn test_record_upload_duration() {
        record_upload_duration("success", 0.25);
    }

    #[test]
    fn test_record_multipart_upload_success() {
        record_multipart_upload_success(5);
    }

    #[test]
    fn test_record_multipart_upload_failure() {
        record_multipart_upload_failure();
    }

    #[test]
    fn test_record_carry_bytes() {
        record_carry_bytes(2048);
    }

    #[test]
    fn test_record_error() {
        record_error("storage");
    }
}
