//! Maintenance restart policy.
//!
//! Once uptime exceeds the minimum (six hours by default) and the wall-clock
//! hour equals the configured maintenance hour, the bridge restarts
//! unconditionally. This is a coarse self-healing measure, not a cron:
//! it may fire on any loop iteration inside the matching hour, and because
//! uptime resets to zero on restart it works out to once per day.

use std::time::Duration;
use tokio::time::Instant;

/// Pure restart decision; the struct below binds it to real uptime.
pub fn restart_due(
    uptime: Duration,
    min_uptime: Duration,
    current_hour: u32,
    maintenance_hour: u32,
) -> bool {
    uptime >= min_uptime && current_hour == maintenance_hour
}

/// Tracks boot time and answers "restart now?" each loop iteration.
#[derive(Debug, Clone)]
pub struct MaintenanceTimer {
    boot: Instant,
    min_uptime: Duration,
    maintenance_hour: u32,
}

impl MaintenanceTimer {
    pub fn new(min_uptime: Duration, maintenance_hour: u32) -> Self {
        Self {
            boot: Instant::now(),
            min_uptime,
            maintenance_hour,
        }
    }

    pub fn uptime(&self) -> Duration {
        self.boot.elapsed()
    }

    /// `current_hour` comes from the synchronized wall clock (UTC).
    pub fn due(&self, current_hour: u32) -> bool {
        restart_due(
            self.uptime(),
            self.min_uptime,
            current_hour,
            self.maintenance_hour,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIX_HOURS: Duration = Duration::from_secs(6 * 60 * 60);

    #[test]
    fn young_uptime_never_restarts() {
        for hour in 0..24 {
            assert!(!restart_due(Duration::from_secs(60), SIX_HOURS, hour, 2));
        }
    }

    #[test]
    fn old_uptime_restarts_only_in_maintenance_hour() {
        let uptime = SIX_HOURS + Duration::from_secs(1);
        for hour in 0..24 {
            assert_eq!(restart_due(uptime, SIX_HOURS, hour, 2), hour == 2);
        }
    }

    #[test]
    fn boundary_uptime_counts() {
        assert!(restart_due(SIX_HOURS, SIX_HOURS, 2, 2));
    }
}
