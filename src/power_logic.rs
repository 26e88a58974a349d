//! Power policy: long-press actions on the system button and the
//! auto-sleep deadline.
//!
//! Everything here is a pure function of timestamps handed in by the
//! caller (milliseconds since boot), so it runs unchanged on the host.

use crate::config::{SYS_BUTTON_LONG_PRESS_MS, SYS_BUTTON_VERY_LONG_PRESS_MS};

/// Action requested by holding the system button.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SystemAction {
    /// Forget every bonded host and advertise openly again.
    ClearBonds,
    /// Reboot into the bootloader's firmware-update mode.
    ResetToBootloader,
}

/// Decide what a release after `duration_ms` of holding should do.
///
/// Tiers are inclusive at their lower bound and only the longest matching
/// tier fires.
pub fn classify_hold(duration_ms: u64) -> Option<SystemAction> {
    if duration_ms >= SYS_BUTTON_VERY_LONG_PRESS_MS {
        Some(SystemAction::ResetToBootloader)
    } else if duration_ms >= SYS_BUTTON_LONG_PRESS_MS {
        Some(SystemAction::ClearBonds)
    } else {
        None
    }
}

/// Single pending "go to sleep" deadline.
///
/// Re-arming replaces the pending deadline; nothing accumulates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SleepTimer {
    timeout_ms: Option<u64>,
    deadline_ms: Option<u64>,
}

impl SleepTimer {
    /// A timer with nothing pending.
    pub const fn new() -> Self {
        Self {
            timeout_ms: None,
            deadline_ms: None,
        }
    }

    /// Replace any pending deadline with `now_ms + timeout_ms`.
    pub fn rearm(&mut self, now_ms: u64, timeout_ms: u64) {
        self.timeout_ms = Some(timeout_ms);
        self.deadline_ms = Some(now_ms.saturating_add(timeout_ms));
    }

    /// Drop the pending deadline.
    pub fn disarm(&mut self) {
        self.deadline_ms = None;
    }

    /// Timeout used by the last rearm.
    pub fn timeout_ms(&self) -> Option<u64> {
        self.timeout_ms
    }

    /// Absolute deadline (ms since boot), if armed.
    pub fn deadline_ms(&self) -> Option<u64> {
        self.deadline_ms
    }

    /// Time left before the deadline, if armed.
    pub fn remaining_ms(&self, now_ms: u64) -> Option<u64> {
        self.deadline_ms.map(|d| d.saturating_sub(now_ms))
    }

    pub fn is_expired(&self, now_ms: u64) -> bool {
        matches!(self.deadline_ms, Some(d) if now_ms >= d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_press_does_nothing() {
        assert_eq!(classify_hold(0), None);
        assert_eq!(classify_hold(50), None);
        assert_eq!(classify_hold(2_999), None);
    }

    #[test]
    fn long_press_clears_bonds() {
        assert_eq!(classify_hold(3_000), Some(SystemAction::ClearBonds));
        assert_eq!(classify_hold(5_000), Some(SystemAction::ClearBonds));
        assert_eq!(classify_hold(9_999), Some(SystemAction::ClearBonds));
    }

    #[test]
    fn very_long_press_resets_to_bootloader() {
        assert_eq!(
            classify_hold(10_000),
            Some(SystemAction::ResetToBootloader)
        );
        assert_eq!(
            classify_hold(u64::MAX),
            Some(SystemAction::ResetToBootloader)
        );
    }

    #[test]
    fn timer_starts_disarmed() {
        let timer = SleepTimer::new();
        assert_eq!(timer.deadline_ms(), None);
        assert_eq!(timer.timeout_ms(), None);
        assert!(!timer.is_expired(u64::MAX));
    }

    #[test]
    fn rearm_replaces_pending_deadline() {
        let mut timer = SleepTimer::new();
        timer.rearm(1_000, 60_000);
        assert_eq!(timer.deadline_ms(), Some(61_000));

        timer.rearm(2_000, 600_000);
        assert_eq!(timer.deadline_ms(), Some(602_000));
        assert_eq!(timer.timeout_ms(), Some(600_000));

        // Going back to a shorter timeout shortens the deadline too.
        timer.rearm(3_000, 60_000);
        assert_eq!(timer.deadline_ms(), Some(63_000));
    }

    #[test]
    fn expiry_is_inclusive() {
        let mut timer = SleepTimer::new();
        timer.rearm(0, 60_000);
        assert!(!timer.is_expired(59_999));
        assert!(timer.is_expired(60_000));
        assert_eq!(timer.remaining_ms(59_000), Some(1_000));
        assert_eq!(timer.remaining_ms(70_000), Some(0));
    }

    #[test]
    fn disarm_clears_deadline() {
        let mut timer = SleepTimer::new();
        timer.rearm(0, 10);
        timer.disarm();
        assert!(!timer.is_expired(100));
    }

    #[test]
    fn rearm_saturates_near_max() {
        let mut timer = SleepTimer::new();
        timer.rearm(u64::MAX - 5, 60_000);
        assert_eq!(timer.deadline_ms(), Some(u64::MAX));
    }
}
