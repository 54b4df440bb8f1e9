//! Maintenance restart decision matrix.

use kakubridge::bridge::maintenance::{restart_due, MaintenanceTimer};
use std::time::Duration;

const SIX_HOURS: Duration = Duration::from_secs(6 * 60 * 60);

#[test]
fn fresh_boot_never_restarts() {
    let timer = MaintenanceTimer::new(SIX_HOURS, 2);
    for hour in 0..24 {
        assert!(!timer.due(hour));
    }
}

#[test]
fn decision_requires_both_conditions() {
    // uptime alone
    assert!(!restart_due(SIX_HOURS * 2, SIX_HOURS, 3, 2));
    // hour alone
    assert!(!restart_due(Duration::from_secs(10), SIX_HOURS, 2, 2));
    // both
    assert!(restart_due(SIX_HOURS * 2, SIX_HOURS, 2, 2));
}

#[test]
fn fires_for_any_configured_hour() {
    let uptime = SIX_HOURS + Duration::from_secs(30);
    for maintenance_hour in 0..24 {
        for hour in 0..24 {
            assert_eq!(
                restart_due(uptime, SIX_HOURS, hour, maintenance_hour),
                hour == maintenance_hour
            );
        }
    }
}

#[test]
fn zero_min_uptime_fires_immediately_in_window() {
    let timer = MaintenanceTimer::new(Duration::ZERO, 5);
    assert!(timer.due(5));
    assert!(!timer.due(6));
}
