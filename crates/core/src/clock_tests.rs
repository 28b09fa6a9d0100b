// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn system_clock_is_monotonic() {
    let clock = SystemClock;
    let a = clock.now();
    let b = clock.now();
    assert!(b >= a);
}

#[test]
fn system_clock_epoch_is_sane() {
    // Anything after 2020-01-01 and with millisecond precision.
    assert!(SystemClock.epoch_ms() > 1_577_836_800_000);
}

#[test]
fn fake_clock_starts_where_told() {
    let clock = FakeClock::at(42_000);
    assert_eq!(clock.epoch_ms(), 42_000);
}

#[test]
fn fake_clock_advances_both_sources() {
    let clock = FakeClock::at(1_000);
    let start = clock.now();

    clock.advance(Duration::from_secs(90));

    assert_eq!(clock.epoch_ms(), 91_000);
    assert_eq!(clock.now() - start, Duration::from_secs(90));
}

#[test]
fn fake_clock_clones_share_the_timeline() {
    let clock = FakeClock::default();
    let other = clock.clone();

    clock.advance(Duration::from_millis(500));
    assert_eq!(other.epoch_ms(), clock.epoch_ms());
}
