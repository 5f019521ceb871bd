//! Loop controller state machine.
//!
//! ```text
//!            fetch ok                    fetch failed (n < max)
//!   Running ─────────▶ Running   Running ──────────────────────▶ Backoff
//!   Backoff ─────────▶ Running   Backoff ──────────────────────▶ Backoff
//!        any ── fetch failed (n == max) / interrupt ──▶ Halted (terminal)
//! ```
//!
//! Pure bookkeeping: the runtime asks [`Controller::next_sleep`] how long to
//! wait and feeds cycle results back in. Nothing here touches the clock.

use std::time::Duration;

use serde::Serialize;

use geoferry_core::SyncSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerState {
    Running,
    Backoff,
    Halted,
}

/// Why the controller stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum HaltReason {
    /// `failures` consecutive source fetches failed.
    FailureThreshold { failures: u32 },
    /// Ctrl-C or the shutdown channel.
    Interrupted,
}

#[derive(Debug, Clone)]
pub struct Controller {
    state: ControllerState,
    consecutive_failures: u32,
    max_failures: u32,
    interval: Duration,
    backoff: Duration,
    halt_reason: Option<HaltReason>,
}

impl Controller {
    /// Backoff is a fixed 2× `interval`. A `max_failures` of zero is
    /// treated as one.
    pub fn new(interval: Duration, max_failures: u32) -> Self {
        Self {
            state: ControllerState::Running,
            consecutive_failures: 0,
            max_failures: max_failures.max(1),
            interval,
            backoff: interval.saturating_mul(2),
            halt_reason: None,
        }
    }

    pub fn from_settings(settings: &SyncSettings) -> Self {
        Self {
            backoff: settings.backoff_interval(),
            ..Self::new(settings.poll_interval(), settings.max_consecutive_failures)
        }
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn halt_reason(&self) -> Option<HaltReason> {
        self.halt_reason
    }

    pub fn is_halted(&self) -> bool {
        self.state == ControllerState::Halted
    }

    /// The fetch succeeded; per-record failures do not matter here.
    pub fn on_cycle_success(&mut self) {
        if self.is_halted() {
            return;
        }
        self.consecutive_failures = 0;
        self.state = ControllerState::Running;
    }

    pub fn on_fetch_failure(&mut self) -> ControllerState {
        if self.is_halted() {
            return self.state;
        }
        self.consecutive_failures += 1;
        if self.consecutive_failures >= self.max_failures {
            self.halt(HaltReason::FailureThreshold {
                failures: self.consecutive_failures,
            });
        } else {
            self.state = ControllerState::Backoff;
        }
        self.state
    }

    pub fn interrupt(&mut self) {
        if !self.is_halted() {
            self.halt(HaltReason::Interrupted);
        }
    }

    /// Pause before the next cycle, or `None` once halted.
    pub fn next_sleep(&self) -> Option<Duration> {
        match self.state {
            ControllerState::Running => Some(self.interval),
            ControllerState::Backoff => Some(self.backoff),
            ControllerState::Halted => None,
        }
    }

    fn halt(&mut self, reason: HaltReason) {
        self.state = ControllerState::Halted;
        self.halt_reason = Some(reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> Controller {
        Controller::new(Duration::from_secs(2), 5)
    }

    #[test]
    fn starts_running_at_normal_interval() {
        let c = controller();
        assert_eq!(c.state(), ControllerState::Running);
        assert_eq!(c.next_sleep(), Some(Duration::from_secs(2)));
        assert_eq!(c.halt_reason(), None);
    }

    #[test]
    fn fetch_failure_backs_off_at_double_interval() {
        let mut c = controller();
        assert_eq!(c.on_fetch_failure(), ControllerState::Backoff);
        assert_eq!(c.consecutive_failures(), 1);
        assert_eq!(c.next_sleep(), Some(Duration::from_secs(4)));
    }

    #[test]
    fn fifth_consecutive_failure_halts() {
        let mut c = controller();
        for _ in 0..4 {
            assert_eq!(c.on_fetch_failure(), ControllerState::Backoff);
        }
        assert_eq!(c.on_fetch_failure(), ControllerState::Halted);
        assert_eq!(c.next_sleep(), None);
        assert_eq!(
            c.halt_reason(),
            Some(HaltReason::FailureThreshold { failures: 5 })
        );
    }

    #[test]
    fn success_resets_the_counter() {
        let mut c = controller();
        for _ in 0..4 {
            c.on_fetch_failure();
        }
        c.on_cycle_success();
        assert_eq!(c.state(), ControllerState::Running);
        assert_eq!(c.consecutive_failures(), 0);

        for _ in 0..4 {
            c.on_fetch_failure();
        }
        assert!(!c.is_halted(), "counter restarted from zero");
    }

    #[test]
    fn halted_is_terminal() {
        let mut c = controller();
        c.interrupt();
        assert_eq!(c.halt_reason(), Some(HaltReason::Interrupted));

        c.on_cycle_success();
        c.on_fetch_failure();
        assert!(c.is_halted());
        assert_eq!(c.halt_reason(), Some(HaltReason::Interrupted));
        assert_eq!(c.consecutive_failures(), 0);
    }

    #[test]
    fn zero_threshold_halts_on_first_failure() {
        let mut c = Controller::new(Duration::from_millis(10), 0);
        assert_eq!(c.on_fetch_failure(), ControllerState::Halted);
    }

    #[test]
    fn from_settings_uses_configured_values() {
        let settings = SyncSettings {
            poll_interval_secs: 7,
            max_consecutive_failures: 2,
            ..SyncSettings::default()
        };
        let mut c = Controller::from_settings(&settings);
        assert_eq!(c.next_sleep(), Some(Duration::from_secs(7)));
        c.on_fetch_failure();
        assert_eq!(c.next_sleep(), Some(Duration::from_secs(14)));
        assert_eq!(c.on_fetch_failure(), ControllerState::Halted);
    }
}
