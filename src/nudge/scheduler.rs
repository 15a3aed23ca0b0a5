use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::nudge::model::{HistoryEntry, NudgeHistory};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("interval must be at least one second")]
    InvalidInterval,
    #[error("interval too long")]
    IntervalTooLong,
}

/// The single active countdown. The deadline is an absolute instant and the
/// remaining time is always recomputed from it, so a suspended process (or a
/// throttled timer) self-corrects on the next tick instead of drifting the
/// way a decremented counter would.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Countdown {
    Stopped,
    Running {
        target: DateTime<Utc>,
        total_seconds: u64,
    },
}

/// Returned by [`NudgeScheduler::tick`] when a deadline was crossed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FiredNudge {
    pub message: String,
    pub next_target: DateTime<Utc>,
}

#[derive(Debug)]
pub struct NudgeScheduler {
    countdown: Countdown,
    history: NudgeHistory,
}

impl Default for NudgeScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl NudgeScheduler {
    pub fn new() -> Self {
        Self::with_history(NudgeHistory::default())
    }

    pub fn with_history(history: NudgeHistory) -> Self {
        Self {
            countdown: Countdown::Stopped,
            history,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.countdown, Countdown::Running { .. })
    }

    pub fn target(&self) -> Option<DateTime<Utc>> {
        match self.countdown {
            Countdown::Stopped => None,
            Countdown::Running { target, .. } => Some(target),
        }
    }

    pub fn total_seconds(&self) -> u64 {
        match self.countdown {
            Countdown::Stopped => 0,
            Countdown::Running { total_seconds, .. } => total_seconds,
        }
    }

    pub fn history(&self) -> &NudgeHistory {
        &self.history
    }

    /// Arm a new cycle of `interval_seconds`. Rejects a zero or
    /// unrepresentable interval with no state change.
    pub fn start(
        &mut self,
        interval_seconds: u64,
        now: DateTime<Utc>,
    ) -> Result<(), SchedulerError> {
        if interval_seconds == 0 {
            return Err(SchedulerError::InvalidInterval);
        }
        let Some(interval) = interval_duration(interval_seconds) else {
            return Err(SchedulerError::IntervalTooLong);
        };
        self.countdown = Countdown::Running {
            target: now + interval,
            total_seconds: interval_seconds,
        };
        Ok(())
    }

    /// Idempotent; the countdown is dropped and remaining time becomes zero.
    pub fn stop(&mut self) {
        self.countdown = Countdown::Stopped;
    }

    /// Seconds until the current deadline, recomputed from the absolute
    /// target on every call.
    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> u64 {
        match self.countdown {
            Countdown::Stopped => 0,
            Countdown::Running { target, .. } => remaining_from_target(target, now),
        }
    }

    /// Resync against `now`; if the deadline has been reached, record the
    /// firing and re-arm for the next cycle.
    ///
    /// The re-arm happens before the caller performs the nudge action, so a
    /// slow or failing action cannot make a later tick observe the same
    /// expired deadline twice. The next deadline is `now + total`, not
    /// `old target + total`: a delayed fire shifts the cadence forward
    /// rather than scheduling a catch-up.
    pub fn tick(&mut self, now: DateTime<Utc>, message: &str) -> Option<FiredNudge> {
        let Countdown::Running {
            target,
            total_seconds,
        } = self.countdown
        else {
            return None;
        };
        if remaining_from_target(target, now) > 0 {
            return None;
        }

        // In range: start and resume both validated the stored interval.
        let next_target = now + Duration::seconds(total_seconds as i64);
        self.countdown = Countdown::Running {
            target: next_target,
            total_seconds,
        };
        self.history.push(HistoryEntry::record(now, message));
        Some(FiredNudge {
            message: message.to_string(),
            next_target,
        })
    }

    /// Restore a countdown persisted by a previous run. Only a deadline that
    /// is still in the future is resumed; an expired one is discarded so a
    /// restart never fires a backlog of missed nudges. A snapshot interval
    /// too long to schedule is likewise discarded rather than trusted.
    pub fn resume(&mut self, target: DateTime<Utc>, total_seconds: u64, now: DateTime<Utc>) -> bool {
        if total_seconds == 0 || target <= now || interval_duration(total_seconds).is_none() {
            return false;
        }
        self.countdown = Countdown::Running {
            target,
            total_seconds,
        };
        true
    }
}

fn interval_duration(seconds: u64) -> Option<Duration> {
    i64::try_from(seconds).ok().and_then(Duration::try_seconds)
}

fn remaining_from_target(target: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    let ms = (target - now).num_milliseconds();
    if ms <= 0 {
        0
    } else {
        ((ms + 999) / 1000) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(ms).expect("valid timestamp")
    }

    #[test]
    fn start_sets_absolute_deadline() {
        let mut scheduler = NudgeScheduler::new();
        scheduler.start(5, at(0)).expect("start");
        assert!(scheduler.is_running());
        assert_eq!(scheduler.target(), Some(at(5_000)));
        assert_eq!(scheduler.total_seconds(), 5);
        assert_eq!(scheduler.remaining_seconds(at(0)), 5);
    }

    #[test]
    fn zero_interval_is_rejected_without_state_change() {
        let mut scheduler = NudgeScheduler::new();
        assert_eq!(
            scheduler.start(0, at(0)),
            Err(SchedulerError::InvalidInterval)
        );
        assert!(!scheduler.is_running());

        scheduler.start(10, at(0)).expect("start");
        assert_eq!(
            scheduler.start(0, at(1_000)),
            Err(SchedulerError::InvalidInterval)
        );
        assert_eq!(scheduler.target(), Some(at(10_000)));
    }

    #[test]
    fn exact_interval_fires_once_and_rearms_to_full_interval() {
        let mut scheduler = NudgeScheduler::new();
        scheduler.start(5, at(0)).expect("start");

        let fired = scheduler.tick(at(5_000), "hi").expect("fires at deadline");
        assert_eq!(fired.message, "hi");
        assert_eq!(fired.next_target, at(10_000));
        assert_eq!(scheduler.remaining_seconds(at(5_000)), 5);
        assert_eq!(scheduler.history().len(), 1);

        // Same instant again: the deadline moved, so no double fire.
        assert!(scheduler.tick(at(5_000), "hi").is_none());
        assert_eq!(scheduler.history().len(), 1);
    }

    #[test]
    fn remaining_is_recomputed_not_counted_down() {
        let mut scheduler = NudgeScheduler::new();
        scheduler.start(10, at(0)).expect("start");

        // A pile of intermediate ticks must not affect the derived value.
        for t in [1_000, 1_000, 2_000, 2_000, 2_000] {
            assert!(scheduler.tick(at(t), "hi").is_none());
        }
        assert_eq!(scheduler.remaining_seconds(at(3_500)), 7);
        assert_eq!(scheduler.remaining_seconds(at(9_999)), 1);
        assert_eq!(scheduler.remaining_seconds(at(9_000)), 1);
        assert_eq!(scheduler.remaining_seconds(at(10_000)), 0);
    }

    #[test]
    fn remaining_matches_ceiling_of_time_left() {
        let interval = 10u64;
        for t_ms in [0i64, 1, 500, 999, 1_000, 4_321, 9_999] {
            let mut scheduler = NudgeScheduler::new();
            scheduler.start(interval, at(0)).expect("start");
            let expected = ((interval as i64 * 1_000 - t_ms) + 999) / 1_000;
            assert_eq!(
                scheduler.remaining_seconds(at(t_ms)) as i64,
                expected,
                "t_ms={t_ms}"
            );
        }
    }

    #[test]
    fn multi_year_interval_arms_without_overflow() {
        // 2,000,000 hours, past what 32-bit seconds can hold.
        let mut scheduler = NudgeScheduler::new();
        scheduler.start(7_200_000_000, at(0)).expect("start");
        assert_eq!(scheduler.target(), Some(at(7_200_000_000_000)));
        assert_eq!(scheduler.remaining_seconds(at(0)), 7_200_000_000);
    }

    #[test]
    fn unrepresentable_interval_is_rejected() {
        let mut scheduler = NudgeScheduler::new();
        assert_eq!(
            scheduler.start(u64::MAX, at(0)),
            Err(SchedulerError::IntervalTooLong)
        );
        assert!(!scheduler.is_running());
        assert!(!scheduler.resume(at(10_000), u64::MAX, at(0)));
        assert!(!scheduler.is_running());
    }

    #[test]
    fn stop_suppresses_all_future_fires() {
        let mut scheduler = NudgeScheduler::new();
        scheduler.start(5, at(0)).expect("start");
        scheduler.stop();
        scheduler.stop();

        assert!(!scheduler.is_running());
        assert_eq!(scheduler.target(), None);
        assert_eq!(scheduler.remaining_seconds(at(60_000)), 0);
        for t in [5_000, 6_000, 100_000] {
            assert!(scheduler.tick(at(t), "hi").is_none());
        }
        assert!(scheduler.history().is_empty());
    }

    #[test]
    fn delayed_tick_rearms_from_fire_time_not_old_deadline() {
        let mut scheduler = NudgeScheduler::new();
        scheduler.start(5, at(0)).expect("start");

        // Tick arrives 2s late; the next deadline drifts forward with it.
        let fired = scheduler.tick(at(7_000), "hi").expect("fires late");
        assert_eq!(fired.next_target, at(12_000));
    }

    #[test]
    fn suspension_gap_produces_single_fire() {
        let mut scheduler = NudgeScheduler::new();
        scheduler.start(5, at(0)).expect("start");

        // Process slept through several whole intervals; one fire, no backlog.
        let fired = scheduler.tick(at(23_000), "hi").expect("fires after gap");
        assert_eq!(fired.next_target, at(28_000));
        assert!(scheduler.tick(at(23_500), "hi").is_none());
        assert_eq!(scheduler.history().len(), 1);
    }

    #[test]
    fn resume_with_future_deadline_restores_countdown() {
        let mut scheduler = NudgeScheduler::new();
        assert!(scheduler.resume(at(8_000), 10, at(3_000)));
        assert!(scheduler.is_running());
        assert_eq!(scheduler.remaining_seconds(at(3_000)), 5);
        assert_eq!(scheduler.total_seconds(), 10);
    }

    #[test]
    fn resume_with_expired_deadline_is_discarded() {
        let mut scheduler = NudgeScheduler::new();
        assert!(!scheduler.resume(at(8_000), 10, at(8_000)));
        assert!(!scheduler.resume(at(8_000), 10, at(9_000)));
        assert!(!scheduler.resume(at(8_000), 0, at(0)));
        assert!(!scheduler.is_running());
        assert!(scheduler.tick(at(20_000), "hi").is_none());
    }

    #[test]
    fn history_evicts_oldest_after_fifty_fires() {
        let mut scheduler = NudgeScheduler::new();
        scheduler.start(1, at(0)).expect("start");

        for i in 0..51i64 {
            let fired = scheduler.tick(at((i + 1) * 1_000), &format!("m{i}"));
            assert!(fired.is_some(), "fire {i}");
        }

        let entries = scheduler.history().entries();
        assert_eq!(entries.len(), 50);
        assert_eq!(entries[0].message, "m50");
        assert_eq!(entries[49].message, "m1");
        assert!(entries.iter().all(|entry| entry.message != "m0"));
    }

    #[test]
    fn five_second_scenario() {
        let mut scheduler = NudgeScheduler::new();
        scheduler.start(5, at(0)).expect("start");
        assert_eq!(scheduler.target(), Some(at(5_000)));

        assert!(scheduler.tick(at(3_000), "hi").is_none());
        assert_eq!(scheduler.remaining_seconds(at(3_000)), 2);

        let fired = scheduler.tick(at(5_000), "hi").expect("fires");
        assert_eq!(scheduler.target(), Some(at(10_000)));
        assert_eq!(fired.message, "hi");
        assert_eq!(scheduler.history().len(), 1);
        assert_eq!(scheduler.history().entries()[0].message, "hi");
    }
}
