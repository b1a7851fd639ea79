//! Wall-clock driven countdown for a single attempt.
//!
//! The timer does not own a thread or a runtime handle. The caller delivers a
//! tick roughly once per second together with the current time, and the timer
//! recomputes remaining time from its deadline on every tick so a suspended
//! host cannot make the countdown drift.

use chrono::{DateTime, Duration, Utc};

/// Events emitted by [`CountdownTimer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    Tick { remaining_secs: i64 },
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Idle,
    Running,
    Expired,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountdownTimer {
    state: TimerState,
    deadline: Option<DateTime<Utc>>,
    remaining_secs: i64,
}

impl Default for CountdownTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl CountdownTimer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: TimerState::Idle,
            deadline: None,
            remaining_secs: 0,
        }
    }

    /// Starts the countdown. Only an idle timer can be started.
    ///
    /// A zero or negative duration expires immediately: the returned event is
    /// `Expired` and no tick is ever produced.
    pub fn start(&mut self, duration_secs: i64, now: DateTime<Utc>) -> Option<TimerEvent> {
        if self.state != TimerState::Idle {
            return None;
        }
        if duration_secs <= 0 {
            self.deadline = Some(now);
            self.remaining_secs = 0;
            self.state = TimerState::Expired;
            return Some(TimerEvent::Expired);
        }

        self.deadline = Some(now + Duration::seconds(duration_secs));
        self.remaining_secs = duration_secs;
        self.state = TimerState::Running;
        None
    }

    /// Advances the countdown to `now`.
    ///
    /// Returns `None` unless running. Fires `Expired` exactly once, then stops.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Option<TimerEvent> {
        if self.state != TimerState::Running {
            return None;
        }
        let deadline = self.deadline?;

        // Never count back up if the host clock jumps backwards.
        let remaining = remaining_until(deadline, now).min(self.remaining_secs);
        self.remaining_secs = remaining;

        if remaining == 0 {
            self.state = TimerState::Expired;
            Some(TimerEvent::Expired)
        } else {
            Some(TimerEvent::Tick {
                remaining_secs: remaining,
            })
        }
    }

    /// Stops the countdown without emitting anything further.
    pub fn cancel(&mut self) {
        if matches!(self.state, TimerState::Idle | TimerState::Running) {
            self.state = TimerState::Cancelled;
        }
    }

    #[must_use]
    pub fn state(&self) -> TimerState {
        self.state
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state == TimerState::Running
    }

    /// Remaining seconds as of the last `start`/`tick`.
    #[must_use]
    pub fn remaining_secs(&self) -> i64 {
        self.remaining_secs
    }

    #[must_use]
    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.deadline
    }
}

/// Whole seconds left until `deadline`, rounded up, never negative.
fn remaining_until(deadline: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let millis = (deadline - now).num_milliseconds();
    if millis <= 0 {
        0
    } else {
        (millis + 999) / 1000
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn secs(n: i64) -> Duration {
        Duration::seconds(n)
    }

    #[test]
    fn zero_duration_expires_without_tick() {
        let mut timer = CountdownTimer::new();
        assert_eq!(timer.start(0, fixed_now()), Some(TimerEvent::Expired));
        assert_eq!(timer.state(), TimerState::Expired);
        assert_eq!(timer.tick(fixed_now() + secs(1)), None);
    }

    #[test]
    fn negative_duration_expires_immediately() {
        let mut timer = CountdownTimer::new();
        assert_eq!(timer.start(-30, fixed_now()), Some(TimerEvent::Expired));
        assert_eq!(timer.remaining_secs(), 0);
    }

    #[test]
    fn ticks_down_and_expires_once() {
        let start = fixed_now();
        let mut timer = CountdownTimer::new();
        assert_eq!(timer.start(3, start), None);
        assert_eq!(timer.remaining_secs(), 3);

        assert_eq!(
            timer.tick(start + secs(1)),
            Some(TimerEvent::Tick { remaining_secs: 2 })
        );
        assert_eq!(
            timer.tick(start + secs(2)),
            Some(TimerEvent::Tick { remaining_secs: 1 })
        );
        assert_eq!(timer.tick(start + secs(3)), Some(TimerEvent::Expired));
        assert_eq!(timer.tick(start + secs(4)), None);
        assert!(!timer.is_running());
    }

    #[test]
    fn recomputes_after_suspension() {
        let start = fixed_now();
        let mut timer = CountdownTimer::new();
        timer.start(600, start);
        timer.tick(start + secs(1));

        // Host slept for five minutes between two ticks.
        assert_eq!(
            timer.tick(start + secs(301)),
            Some(TimerEvent::Tick { remaining_secs: 299 })
        );

        // Suspended past the deadline: one expiry, no negative remaining.
        assert_eq!(timer.tick(start + secs(10_000)), Some(TimerEvent::Expired));
        assert_eq!(timer.remaining_secs(), 0);
    }

    #[test]
    fn partial_seconds_round_up() {
        let start = fixed_now();
        let mut timer = CountdownTimer::new();
        timer.start(10, start);
        assert_eq!(
            timer.tick(start + Duration::milliseconds(1_500)),
            Some(TimerEvent::Tick { remaining_secs: 9 })
        );
    }

    #[test]
    fn clock_going_backwards_does_not_add_time() {
        let start = fixed_now();
        let mut timer = CountdownTimer::new();
        timer.start(60, start);
        timer.tick(start + secs(30));
        assert_eq!(
            timer.tick(start + secs(5)),
            Some(TimerEvent::Tick { remaining_secs: 30 })
        );
    }

    #[test]
    fn cancel_silences_timer() {
        let start = fixed_now();
        let mut timer = CountdownTimer::new();
        timer.start(5, start);
        timer.cancel();
        assert_eq!(timer.state(), TimerState::Cancelled);
        assert_eq!(timer.tick(start + secs(10)), None);
    }

    #[test]
    fn cannot_restart() {
        let start = fixed_now();
        let mut timer = CountdownTimer::new();
        timer.start(5, start);
        assert_eq!(timer.start(100, start), None);
        assert_eq!(timer.remaining_secs(), 5);
    }
}
