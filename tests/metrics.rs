#![cfg(feature = "metrics")]
//! Tests for `sessionframe` metrics helpers.
//!
//! These tests verify that counters and gauges update as expected using
//! `metrics_util::debugging::DebuggingRecorder`.
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use rstest::rstest;
use sessionframe::metrics::{self as sf_metrics, Direction};

/// Creates a debugging recorder and snapshotter for metrics testing.
fn debugging_recorder_setup() -> (Snapshotter, DebuggingRecorder) {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    (snapshotter, recorder)
}

#[rstest]
#[case(Direction::Inbound, "inbound")]
#[case(Direction::Outbound, "outbound")]
fn packet_metric_increments(#[case] direction: Direction, #[case] label: &str) {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || sf_metrics::inc_packets(direction));

    let metrics = snapshotter.snapshot().into_vec();
    let found = metrics.iter().any(|(k, _, _, v)| {
        k.key().name() == sf_metrics::PACKETS_PROCESSED
            && k.key()
                .labels()
                .any(|l| l.key() == "direction" && l.value() == label)
            && matches!(v, DebugValue::Counter(c) if *c > 0)
    });
    assert!(found, "{label} packet metric not recorded");
}

#[rstest]
#[case(sf_metrics::inc_errors as fn(), sf_metrics::ERRORS_TOTAL)]
#[case(sf_metrics::inc_timeouts as fn(), sf_metrics::TIMEOUTS_TOTAL)]
#[case(sf_metrics::inc_session_panics as fn(), sf_metrics::SESSION_PANICS)]
fn counter_metric_increments(#[case] record: fn(), #[case] name: &str) {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, record);

    let metrics = snapshotter.snapshot().into_vec();
    let found = metrics
        .iter()
        .any(|(k, _, _, v)| k.key().name() == name && matches!(v, DebugValue::Counter(1)));
    assert!(found, "{name} not recorded");
}

#[test]
fn session_gauge_rises_and_falls() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        sf_metrics::inc_sessions();
        sf_metrics::inc_sessions();
        sf_metrics::dec_sessions();
    });

    let metrics = snapshotter.snapshot().into_vec();
    let value = metrics
        .iter()
        .find(|(k, _, _, _)| k.key().name() == sf_metrics::SESSIONS_ACTIVE)
        .map(|(_, _, _, v)| v.clone());
    assert!(
        matches!(value, Some(DebugValue::Gauge(g)) if (g.into_inner() - 1.0).abs() < f64::EPSILON)
    );
}
