// benches/benchmarks.rs — Performance benchmarks (criterion)
//
// Hot paths of one dispatch attempt:
//   1. Startup: store open + schema migration
//   2. Throttle check against a populated record map
//   3. record_send with the history already at capacity
//   4. Event line parsing

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use autopromo::dispatch::{DispatchConfig, ThrottleStore, HISTORY_CAPACITY};
use autopromo::store::PrefsStore;
use autopromo::telephony::transport::segment_count;
use autopromo::telephony::TelephonyEvent;

// ─── Helpers ────────────────────────────────────────────────────────────────

/// In-memory store with sending enabled and a one-day window.
fn setup_store() -> Arc<PrefsStore> {
    let prefs = Arc::new(PrefsStore::in_memory().expect("open in-memory store"));
    DispatchConfig {
        enabled: true,
        message_template: "Thanks for calling! 10% off this week.".into(),
        interval_days: 1,
        ..Default::default()
    }
    .save(&prefs)
    .expect("save settings");
    prefs
}

/// Record sends for `n` distinct numbers, one minute apart.
fn populate(throttle: &ThrottleStore, n: usize) {
    let t0 = Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap();
    for i in 0..n {
        throttle
            .record_send(
                &format!("+8210{i:08}"),
                "Thanks for calling",
                t0 + Duration::minutes(i as i64),
            )
            .expect("record send");
    }
}

// ─── Benchmark: Startup ─────────────────────────────────────────────────────

fn bench_startup(c: &mut Criterion) {
    c.bench_function("startup_store_init", |b| {
        b.iter(|| PrefsStore::in_memory().expect("open in-memory store"))
    });
}

// ─── Benchmark: Throttle ────────────────────────────────────────────────────

fn bench_throttle(c: &mut Criterion) {
    let mut group = c.benchmark_group("throttle");
    let now = Utc.with_ymd_and_hms(2026, 10, 18, 9, 0, 0).unwrap();

    group.bench_function("can_send_1000_records", |b| {
        let throttle = ThrottleStore::new(setup_store());
        populate(&throttle, 1000);
        b.iter(|| throttle.can_send(black_box("+821000000500"), now))
    });

    group.bench_function("can_send_unknown_number", |b| {
        let throttle = ThrottleStore::new(setup_store());
        populate(&throttle, 1000);
        b.iter(|| throttle.can_send(black_box("+821099999999"), now))
    });

    group.bench_function("record_send_full_history", |b| {
        let throttle = ThrottleStore::new(setup_store());
        populate(&throttle, HISTORY_CAPACITY);
        let mut i = 0u64;
        b.iter(|| {
            i += 1;
            throttle
                .record_send(
                    black_box(&format!("+8299{i:08}")),
                    "Thanks for calling",
                    now,
                )
                .expect("record send");
        })
    });

    group.finish();
}

// ─── Benchmark: Telephony ───────────────────────────────────────────────────

fn bench_telephony(c: &mut Criterion) {
    let mut group = c.benchmark_group("telephony");

    group.bench_function("parse_event_line", |b| {
        let line = r#"{"state":"RINGING","number":"+821012345678","observed_at":"2026-10-18T09:00:00Z"}"#;
        b.iter(|| TelephonyEvent::parse_line(black_box(line)).expect("parse"))
    });

    group.bench_function("segment_count_long_text", |b| {
        let text = "안녕하세요, 전화 주셔서 감사합니다. ".repeat(20);
        b.iter(|| segment_count(black_box(&text), 70))
    });

    group.finish();
}

// ─── Main ───────────────────────────────────────────────────────────────────

criterion_group!(benches, bench_startup, bench_throttle, bench_telephony);
criterion_main!(benches);
