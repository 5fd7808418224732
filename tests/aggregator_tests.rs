use roda_spike::{
    AggregatorSnapshot, DiagnosticKind, MemoryDiagnostics, SensorMeasurement, Stage, WatermarkPolicy,
    WindowAggregator, WindowSpec, WindowSummary,
};
use std::sync::Arc;

fn reading(sensor_id: i32, ts: i64, value: f32) -> SensorMeasurement {
    SensorMeasurement::new(ts, sensor_id, 1, [value, 0.0, 0.0, 0.0])
}

fn aggregator(spec: WindowSpec, policy: WatermarkPolicy) -> (WindowAggregator, Arc<MemoryDiagnostics>) {
    let diagnostics = Arc::new(MemoryDiagnostics::new());
    (WindowAggregator::new(spec, policy, diagnostics.clone()), diagnostics)
}

fn feed(aggregator: &mut WindowAggregator, readings: &[SensorMeasurement]) -> Vec<WindowSummary> {
    let mut out = Vec::new();
    for r in readings {
        aggregator.process(*r, &mut |s: WindowSummary| out.push(s));
    }
    out
}

fn flush(aggregator: &mut WindowAggregator) -> Vec<WindowSummary> {
    let mut out = Vec::new();
    aggregator.flush(&mut |s: WindowSummary| out.push(s));
    out
}

#[test]
fn test_average_and_latest_value() {
    let (mut agg, _) = aggregator(WindowSpec::from_secs(5, 5), WatermarkPolicy::None);

    // Arrival order differs from event-time order; the latest event time wins.
    let out = feed(
        &mut agg,
        &[reading(7, 1_000, 10.0), reading(7, 3_000, 30.0), reading(7, 2_000, 20.0)],
    );
    assert!(out.is_empty());

    let out = flush(&mut agg);
    assert_eq!(
        out,
        vec![WindowSummary {
            window_start: 0,
            window_end: 5_000,
            average_value: 20.0,
            current_value: 30.0,
            sensor_id: 7,
            measurement_count: 3,
        }]
    );
    assert_eq!(agg.open_window_count(), 0);
}

#[test]
fn test_single_reading_window() {
    let (mut agg, _) = aggregator(WindowSpec::from_secs(5, 5), WatermarkPolicy::None);
    feed(&mut agg, &[reading(3, 4_999, 12.5)]);

    let out = flush(&mut agg);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].average_value, out[0].current_value);
    assert_eq!(out[0].measurement_count, 1);
}

#[test]
fn test_equal_event_times_latest_arrival_wins() {
    let (mut agg, _) = aggregator(WindowSpec::from_secs(5, 5), WatermarkPolicy::None);
    feed(&mut agg, &[reading(1, 2_000, 4.0), reading(1, 2_000, 8.0)]);

    let out = flush(&mut agg);
    assert_eq!(out[0].current_value, 8.0);
    assert_eq!(out[0].average_value, 6.0);
}

#[test]
fn test_overlapping_windows_share_readings() {
    let (mut agg, _) = aggregator(WindowSpec::from_secs(10, 5), WatermarkPolicy::None);
    feed(
        &mut agg,
        &[reading(1, 2_000, 1.0), reading(1, 7_000, 3.0), reading(1, 12_000, 5.0)],
    );

    let out: Vec<(i64, i64, f64, f64, u32)> = flush(&mut agg)
        .iter()
        .map(|s| (s.window_start, s.window_end, s.average_value, s.current_value, s.measurement_count))
        .collect();
    assert_eq!(
        out,
        vec![
            (-5_000, 5_000, 1.0, 1.0, 1),
            (0, 10_000, 2.0, 3.0, 2),
            (5_000, 15_000, 4.0, 5.0, 2),
            (10_000, 20_000, 5.0, 5.0, 1),
        ]
    );
}

#[test]
fn test_negative_event_times_align_to_epoch() {
    let (mut agg, _) = aggregator(WindowSpec::from_secs(5, 5), WatermarkPolicy::None);
    feed(&mut agg, &[reading(1, -1, 2.0)]);

    let out = flush(&mut agg);
    assert_eq!((out[0].window_start, out[0].window_end), (-5_000, 0));
}

#[test]
fn test_bounded_watermark_closes_windows_in_order() {
    let (mut agg, diagnostics) = aggregator(WindowSpec::from_secs(5, 5), WatermarkPolicy::bounded(0));

    let out = feed(&mut agg, &[reading(1, 1_000, 1.0)]);
    assert!(out.is_empty());

    // The watermark reaches the end of [0, 5000).
    let out = feed(&mut agg, &[reading(1, 5_000, 2.0)]);
    assert_eq!(out.len(), 1);
    assert_eq!((out[0].window_start, out[0].current_value), (0, 1.0));

    let out = feed(&mut agg, &[reading(1, 21_000, 3.0)]);
    let starts: Vec<i64> = out.iter().map(|s| s.window_start).collect();
    assert_eq!(starts, vec![5_000]);

    assert!(diagnostics.is_empty());
    assert_eq!(flush(&mut agg).len(), 1);
}

#[test]
fn test_expired_reading_is_dropped_and_reported() {
    let (mut agg, diagnostics) = aggregator(WindowSpec::from_secs(5, 5), WatermarkPolicy::bounded(1_000));

    // Watermark 9000; anything before 8000 is expired.
    feed(&mut agg, &[reading(1, 10_000, 1.0)]);
    let out = feed(&mut agg, &[reading(1, 7_999, 100.0), reading(1, 8_500, 4.0)]);
    assert!(out.is_empty());
    assert_eq!(diagnostics.kinds(), vec![DiagnosticKind::LateDataDropped]);

    // Watermark 11000 reaches 10000 + 1000 lateness: [5000, 10000) closes.
    let out = feed(&mut agg, &[reading(1, 12_000, 1.0)]);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].window_start, 5_000);
    assert_eq!(out[0].measurement_count, 1);
    assert_eq!(out[0].average_value, 4.0);
}

#[test]
fn test_no_watermark_never_drops_and_flushes_by_key() {
    let (mut agg, diagnostics) = aggregator(WindowSpec::from_secs(5, 5), WatermarkPolicy::None);

    let out = feed(
        &mut agg,
        &[reading(9, 100_000, 1.0), reading(2, 0, 1.0), reading(9, 0, 1.0), reading(5, 50_000, 1.0)],
    );
    assert!(out.is_empty());
    assert!(diagnostics.is_empty());
    assert_eq!(agg.watermark(9), None);

    let keys: Vec<(i32, i64)> = flush(&mut agg).iter().map(|s| (s.sensor_id, s.window_start)).collect();
    assert_eq!(keys, vec![(2, 0), (5, 50_000), (9, 0), (9, 100_000)]);
    assert_eq!(agg.key_count(), 0);
}

#[test]
fn test_restored_snapshot_continues_like_uninterrupted_run() {
    let spec = WindowSpec::from_secs(10, 5);
    let policy = WatermarkPolicy::bounded(2_000);
    let readings: Vec<SensorMeasurement> = (0..40)
        .map(|i| reading(i % 3, (i as i64) * 1_300 + (i as i64 % 4) * 500, i as f32))
        .collect();
    let (first, second) = readings.split_at(17);

    let (mut reference, _) = aggregator(spec, policy);
    let mut expected = feed(&mut reference, &readings);
    expected.extend(flush(&mut reference));

    let (mut agg, _) = aggregator(spec, policy);
    let mut actual = feed(&mut agg, first);

    let bytes = agg.snapshot().encode();
    let snapshot = AggregatorSnapshot::decode(&bytes).unwrap();
    assert_eq!(snapshot, agg.snapshot());
    assert_eq!(snapshot.window_count(), agg.open_window_count());

    let mut restored = WindowAggregator::restore(spec, policy, Arc::new(MemoryDiagnostics::new()), snapshot);
    assert_eq!(restored.watermark(1), agg.watermark(1));
    actual.extend(feed(&mut restored, second));
    actual.extend(flush(&mut restored));

    assert_eq!(actual, expected);
}

#[test]
fn test_zero_lateness_drops_disorder_inside_open_window() {
    let (mut agg, diagnostics) = aggregator(WindowSpec::from_secs(5, 5), WatermarkPolicy::bounded(0));
    feed(&mut agg, &[reading(1, 4_000, 10.0), reading(1, 1_000, 30.0)]);
    assert_eq!(diagnostics.kinds(), vec![DiagnosticKind::LateDataDropped]);

    let out = flush(&mut agg);
    assert_eq!(out.len(), 1);
    assert_eq!((out[0].measurement_count, out[0].average_value), (1, 10.0));

    // Three seconds of lateness cover the disorder and keep the reading.
    let (mut agg, diagnostics) = aggregator(WindowSpec::from_secs(5, 5), WatermarkPolicy::bounded(3_000));
    feed(&mut agg, &[reading(1, 4_000, 10.0), reading(1, 1_000, 30.0)]);
    assert!(diagnostics.is_empty());
    assert_eq!(flush(&mut agg)[0].average_value, 20.0);
}
