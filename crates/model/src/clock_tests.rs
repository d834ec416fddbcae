// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn zero_time_is_the_epoch() {
    assert!(is_zero_time(zero_time()));
    assert!(!is_zero_time(zero_time() + Duration::seconds(1)));
}

#[test]
fn fake_clock_advances() {
    let clock = FakeClock::new();
    let start = clock.now();
    clock.advance(Duration::minutes(30));
    assert_eq!(clock.now() - start, Duration::minutes(30));
}

#[test]
fn fake_clock_set_overrides() {
    let clock = FakeClock::new();
    let target = DateTime::from_timestamp(31337, 0).unwrap();
    clock.set(target);
    assert_eq!(clock.now(), target);
}

#[test]
fn fake_clock_clones_share_state() {
    let clock = FakeClock::new();
    let other = clock.clone();
    clock.advance(Duration::seconds(5));
    assert_eq!(clock.now(), other.now());
}
