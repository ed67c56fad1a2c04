// tests/throttle_test.rs — Integration test: throttle window and send history

use std::sync::Arc;
use std::thread;

use chrono::{DateTime, Duration, TimeZone, Utc};
use pretty_assertions::assert_eq;

use autopromo::dispatch::throttle::{KEY_LAST_SEND_TIMES, KEY_SEND_HISTORY};
use autopromo::dispatch::{
    DispatchConfig, Eligibility, Reservation, ThrottleStore, DAY_MILLIS, HISTORY_CAPACITY,
};
use autopromo::store::PrefsStore;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 18, 9, 0, 0).unwrap()
}

fn store_with_interval(days: u32) -> (Arc<PrefsStore>, ThrottleStore) {
    let prefs = Arc::new(PrefsStore::in_memory().unwrap());
    DispatchConfig {
        enabled: true,
        message_template: "Hi".into(),
        interval_days: days,
        ..Default::default()
    }
    .save(&prefs)
    .unwrap();
    let throttle = ThrottleStore::new(prefs.clone());
    (prefs, throttle)
}

#[test]
fn test_zero_interval_always_allows() {
    let (_prefs, throttle) = store_with_interval(0);
    for i in 0..5 {
        throttle.record_send("+8210", "Hi", t0()).unwrap();
        assert!(throttle.can_send("+8210", t0() + Duration::seconds(i)));
    }
    assert!(throttle.can_send("+8210", t0() - Duration::days(1)));
    assert!(throttle.can_send("never-seen", t0()));
}

#[test]
fn test_window_blocks_until_interval_elapsed() {
    for days in [1u32, 3, 30] {
        let (_prefs, throttle) = store_with_interval(days);
        throttle.record_send("+8210", "Hi", t0()).unwrap();

        let window = Duration::milliseconds(i64::from(days) * DAY_MILLIS);
        assert!(!throttle.can_send("+8210", t0()));
        assert!(!throttle.can_send("+8210", t0() + window / 2));
        assert!(!throttle.can_send("+8210", t0() + window - Duration::milliseconds(1)));
        assert!(throttle.can_send("+8210", t0() + window));
        assert!(throttle.can_send("+8210", t0() + window + Duration::days(1)));
    }
}

#[test]
fn test_window_is_per_number() {
    let (_prefs, throttle) = store_with_interval(1);
    throttle.record_send("+8210111", "Hi", t0()).unwrap();
    assert!(!throttle.can_send("+8210111", t0() + Duration::hours(1)));
    assert!(throttle.can_send("+8210222", t0() + Duration::hours(1)));
    // Keys are raw strings, no normalization.
    assert!(throttle.can_send("8210111", t0() + Duration::hours(1)));
}

#[test]
fn test_check_reports_next_eligible_time() {
    let (_prefs, throttle) = store_with_interval(1);
    throttle.record_send("+8210", "Hi", t0()).unwrap();
    let at = t0().timestamp_millis();
    assert_eq!(
        throttle.check("+8210", t0() + Duration::hours(23)),
        Eligibility::Blocked {
            last_sent: at,
            until: at + DAY_MILLIS
        }
    );
}

#[test]
fn test_record_send_updates_record_and_history_together() {
    let (_prefs, throttle) = store_with_interval(1);
    throttle.record_send("+8210111", "Hi", t0()).unwrap();
    throttle
        .record_send("+8210111", "Hi again", t0() + Duration::days(2))
        .unwrap();

    let records = throttle.last_send_times().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(
        records["+8210111"],
        (t0() + Duration::days(2)).timestamp_millis()
    );

    let history = throttle.history().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].message, "Hi");
    assert_eq!(history[1].message, "Hi again");
}

#[test]
fn test_history_is_capped_fifo() {
    let (_prefs, throttle) = store_with_interval(0);
    for i in 0..(HISTORY_CAPACITY as i64 + 1) {
        throttle
            .record_send(&format!("+82{i:04}"), "Hi", t0() + Duration::minutes(i))
            .unwrap();
    }

    let history = throttle.history().unwrap();
    assert_eq!(history.len(), HISTORY_CAPACITY);
    // The very first (oldest) entry went; the rest keep insertion order.
    assert_eq!(history[0].phone_number, "+820001");
    assert_eq!(history[HISTORY_CAPACITY - 1].phone_number, "+820100");
    assert!(history.windows(2).all(|w| w[0].timestamp < w[1].timestamp));

    // Throttle records are never evicted.
    assert_eq!(throttle.last_send_times().unwrap().len(), HISTORY_CAPACITY + 1);
}

#[test]
fn test_corrupt_state_fails_open_and_is_repaired() {
    let (prefs, throttle) = store_with_interval(7);
    prefs.set(KEY_LAST_SEND_TIMES, "{\"+8210\": \"yesterday\"").unwrap();
    prefs.set(KEY_SEND_HISTORY, "not a list").unwrap();

    assert_eq!(throttle.check("+8210", t0()), Eligibility::FailedOpen);
    assert!(throttle.can_send("+8210", t0()));

    throttle.record_send("+8210", "Hi", t0()).unwrap();
    assert!(!throttle.can_send("+8210", t0() + Duration::hours(1)));
    assert_eq!(throttle.history().unwrap().len(), 1);
}

#[test]
fn test_persisted_layout_is_plain_json() {
    let (prefs, throttle) = store_with_interval(1);
    throttle.record_send("+821012345678", "Hi", t0()).unwrap();

    let records = prefs.get(KEY_LAST_SEND_TIMES).unwrap().unwrap();
    assert_eq!(
        records,
        format!("{{\"+821012345678\":{}}}", t0().timestamp_millis())
    );

    let history: serde_json::Value =
        serde_json::from_str(&prefs.get(KEY_SEND_HISTORY).unwrap().unwrap()).unwrap();
    assert_eq!(history[0]["phoneNumber"], "+821012345678");
    assert_eq!(history[0]["message"], "Hi");
    assert_eq!(history[0]["timestamp"], t0().timestamp_millis());
}

#[test]
fn test_concurrent_record_send_loses_no_update() {
    let (_prefs, throttle) = store_with_interval(1);

    let handles: Vec<_> = (0..8)
        .map(|worker| {
            let throttle = throttle.clone();
            thread::spawn(move || {
                for i in 0..10 {
                    let number = format!("+82-{worker}-{i}");
                    throttle
                        .record_send(&number, "Hi", t0() + Duration::seconds(i))
                        .unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(throttle.last_send_times().unwrap().len(), 80);
    assert_eq!(throttle.history().unwrap().len(), 80);
}

#[test]
fn test_state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("autopromo.db");

    {
        let prefs = Arc::new(PrefsStore::open(&path).unwrap());
        DispatchConfig {
            enabled: true,
            message_template: "Hi".into(),
            interval_days: 1,
            ..Default::default()
        }
        .save(&prefs)
        .unwrap();
        ThrottleStore::new(prefs).record_send("+8210", "Hi", t0()).unwrap();
    }

    let throttle = ThrottleStore::new(Arc::new(PrefsStore::open(&path).unwrap()));
    assert!(!throttle.can_send("+8210", t0() + Duration::hours(23)));
    assert!(throttle.can_send("+8210", t0() + Duration::hours(25)));
    assert_eq!(throttle.history().unwrap().len(), 1);
}

#[test]
fn test_reserve_takes_the_window() {
    let (_prefs, throttle) = store_with_interval(1);
    let at = t0().timestamp_millis();

    assert_eq!(
        throttle.reserve("+8210", t0()).unwrap(),
        Reservation::Held { at, previous: None }
    );
    // A second attempt a minute later, even before any history exists, is blocked.
    assert_eq!(
        throttle.reserve("+8210", t0() + Duration::minutes(1)).unwrap(),
        Reservation::Blocked {
            last_sent: at,
            until: at + DAY_MILLIS
        }
    );
    assert!(throttle.history().unwrap().is_empty());
    // Other numbers are unaffected.
    assert!(matches!(
        throttle.reserve("+8210999", t0()).unwrap(),
        Reservation::Held { previous: None, .. }
    ));
}

#[test]
fn test_release_restores_previous_record() {
    let (_prefs, throttle) = store_with_interval(1);
    throttle.record_send("+8210", "Hi", t0()).unwrap();

    let later = t0() + Duration::days(3);
    let held = throttle.reserve("+8210", later).unwrap();
    assert_eq!(
        held,
        Reservation::Held {
            at: later.timestamp_millis(),
            previous: Some(t0().timestamp_millis())
        }
    );
    throttle.release("+8210", held).unwrap();
    assert_eq!(
        throttle.last_send_times().unwrap()["+8210"],
        t0().timestamp_millis()
    );

    // A reservation for a new number is removed entirely.
    let fresh = throttle.reserve("+8210777", later).unwrap();
    throttle.release("+8210777", fresh).unwrap();
    assert!(!throttle.last_send_times().unwrap().contains_key("+8210777"));
}

#[test]
fn test_release_leaves_newer_write_alone() {
    let (_prefs, throttle) = store_with_interval(0);
    let held = throttle.reserve("+8210", t0()).unwrap();
    throttle
        .record_send("+8210", "Hi", t0() + Duration::minutes(5))
        .unwrap();
    throttle.release("+8210", held).unwrap();
    assert_eq!(
        throttle.last_send_times().unwrap()["+8210"],
        (t0() + Duration::minutes(5)).timestamp_millis()
    );
}

#[test]
fn test_reserve_repairs_corrupt_records() {
    let (prefs, throttle) = store_with_interval(1);
    prefs.set(KEY_LAST_SEND_TIMES, "[oops").unwrap();
    assert!(matches!(
        throttle.reserve("+8210", t0()).unwrap(),
        Reservation::Held { previous: None, .. }
    ));
    assert!(!throttle.can_send("+8210", t0() + Duration::hours(1)));
}
