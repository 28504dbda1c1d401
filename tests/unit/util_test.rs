//! Tests for utility functions

use prometheus_job_scheduler::util::{init_tracing, now_ms, secs_to_ms};

#[test]
fn test_secs_to_ms() {
    assert_eq!(secs_to_ms(1), 1_000);
    assert_eq!(secs_to_ms(3_600), 3_600_000);
}

#[test]
fn test_now_ms_is_epoch_millis() {
    // 2020-01-01T00:00:00Z
    assert!(now_ms() > 1_577_836_800_000);
}

#[test]
fn test_init_tracing_is_idempotent() {
    init_tracing();
    init_tracing();
    tracing::info!(component = "util_test", "tracing initialized");
}
