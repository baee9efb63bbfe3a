use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WatchdogVerdict {
    /// Still armed; check again after the interval.
    Pending,
    /// The player left the expected path. Reported once, then disarmed.
    Tripped,
    /// Attempts exhausted or already tripped.
    Disarmed,
}

/// Bounded liveness check on the mounted player's location.
///
/// An unobservable location (`None`) counts as healthy, so a player the host
/// cannot inspect is never reported as failed.
#[derive(Debug, Clone)]
pub(crate) struct Watchdog {
    expected_path: String,
    remaining: u32,
    interval: Duration,
}

impl Watchdog {
    pub(crate) fn arm(expected_path: impl Into<String>, attempts: u32, interval: Duration) -> Self {
        Self {
            expected_path: expected_path.into(),
            remaining: attempts,
            interval,
        }
    }

    pub(crate) fn interval(&self) -> Duration {
        self.interval
    }

    pub(crate) fn is_armed(&self) -> bool {
        self.remaining > 0
    }

    pub(crate) fn observe(&mut self, location: Option<&str>) -> WatchdogVerdict {
        if !self.is_armed() {
            return WatchdogVerdict::Disarmed;
        }
        self.remaining -= 1;

        if let Some(location) = location
            && !location.contains(&self.expected_path)
        {
            self.remaining = 0;
            return WatchdogVerdict::Tripped;
        }

        if self.remaining == 0 {
            WatchdogVerdict::Disarmed
        } else {
            WatchdogVerdict::Pending
        }
    }
}
