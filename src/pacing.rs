//! Fixed-frame-rate pacing against wall-clock deadlines.
//!
//! Tick `i` of an animation is due at `start + (i+1) * interval`. If a tick
//! overran its deadline the next one fires immediately; we never sleep a
//! negative amount and never skip steps to catch up. Sustained overrun shows
//! up as a slower transition and an overrun count, not as an error.

use crate::Shutdown;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Source of time and the only place the core blocks.
pub trait Clock {
    fn now(&self) -> Instant;

    /// Sleep until `deadline`. Returns `false` if shutdown was requested,
    /// which must wake the sleeper promptly.
    fn sleep_until(&self, deadline: Instant, shutdown: &Shutdown) -> bool;
}

/// Real time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep_until(&self, deadline: Instant, shutdown: &Shutdown) -> bool {
        loop {
            let now = Instant::now();
            if now >= deadline {
                return !shutdown.is_triggered();
            }
            if shutdown.wait_timeout(deadline - now) {
                return false;
            }
        }
    }
}

/// Simulated time: sleeping jumps the clock forward instantly.
///
/// Lets tests check pacing and durations without waiting for them.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    elapsed: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            elapsed: Mutex::new(Duration::ZERO),
        }
    }

    /// Simulated time since the clock was created.
    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Move time forward, as if work took `d`.
    pub fn advance(&self, d: Duration) {
        *self.elapsed.lock().unwrap_or_else(|e| e.into_inner()) += d;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn sleep_until(&self, deadline: Instant, shutdown: &Shutdown) -> bool {
        if shutdown.is_triggered() {
            return false;
        }
        let target = deadline.saturating_duration_since(self.origin);
        let mut elapsed = self.elapsed.lock().unwrap_or_else(|e| e.into_inner());
        if target > *elapsed {
            *elapsed = target;
        }
        true
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn sleep_until(&self, deadline: Instant, shutdown: &Shutdown) -> bool {
        (**self).sleep_until(deadline, shutdown)
    }
}

/// Outcome of waiting for the next tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pace {
    /// Slept until the deadline.
    OnTime,
    /// The deadline had already passed by this much; no sleep.
    Overrun(Duration),
    Cancelled,
}

/// Deadline tracker for one animation run.
#[derive(Clone, Debug)]
pub struct FramePacer {
    start: Instant,
    interval: Duration,
    ticks: u32,
    overruns: u32,
}

impl FramePacer {
    pub fn new(start: Instant, interval: Duration) -> Self {
        Self {
            start,
            interval,
            ticks: 0,
            overruns: 0,
        }
    }

    /// Deadline of the tick in progress.
    pub fn deadline(&self) -> Instant {
        self.start + self.interval * (self.ticks + 1)
    }

    /// Wait for the current tick's deadline and move to the next tick.
    pub fn wait<C: Clock>(&mut self, clock: &C, shutdown: &Shutdown) -> Pace {
        let deadline = self.deadline();
        self.ticks += 1;

        let now = clock.now();
        if now >= deadline {
            if shutdown.is_triggered() {
                return Pace::Cancelled;
            }
            self.overruns += 1;
            let late = now - deadline;
            if self.overruns <= 5 {
                tracing::warn!(
                    "Frame {} late by {}ms (interval {}ms)",
                    self.ticks,
                    late.as_millis(),
                    self.interval.as_millis()
                );
            }
            return Pace::Overrun(late);
        }

        if clock.sleep_until(deadline, shutdown) {
            Pace::OnTime
        } else {
            Pace::Cancelled
        }
    }

    pub fn ticks(&self) -> u32 {
        self.ticks
    }

    pub fn overruns(&self) -> u32 {
        self.overruns
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const TICK: Duration = Duration::from_millis(50);

    #[test]
    fn deadlines_are_anchored_to_start() {
        let clock = ManualClock::new();
        let shutdown = Shutdown::new();
        let mut pacer = FramePacer::new(clock.now(), TICK);

        for _ in 0..10 {
            // Jitter inside the budget must not accumulate.
            clock.advance(Duration::from_millis(7));
            assert_eq!(pacer.wait(&clock, &shutdown), Pace::OnTime);
        }
        assert_eq!(clock.elapsed(), TICK * 10);
        assert_eq!(pacer.overruns(), 0);
    }

    #[test]
    fn overrun_skips_sleep_without_skipping_ticks() {
        let clock = ManualClock::new();
        let shutdown = Shutdown::new();
        let mut pacer = FramePacer::new(clock.now(), TICK);

        clock.advance(Duration::from_millis(180));
        assert_eq!(
            pacer.wait(&clock, &shutdown),
            Pace::Overrun(Duration::from_millis(130))
        );
        assert_eq!(clock.elapsed(), Duration::from_millis(180));

        // Tick 2 is due at 100ms; still late, fires immediately.
        assert_eq!(
            pacer.wait(&clock, &shutdown),
            Pace::Overrun(Duration::from_millis(80))
        );
        // Tick 3 (150ms) late too; tick 4 (200ms) is back on schedule.
        assert!(matches!(pacer.wait(&clock, &shutdown), Pace::Overrun(_)));
        assert_eq!(pacer.wait(&clock, &shutdown), Pace::OnTime);
        assert_eq!(clock.elapsed(), Duration::from_millis(200));
        assert_eq!(pacer.ticks(), 4);
        assert_eq!(pacer.overruns(), 3);
    }

    #[test]
    fn shutdown_cancels_wait() {
        let clock = ManualClock::new();
        let shutdown = Shutdown::new();
        let mut pacer = FramePacer::new(clock.now(), TICK);
        shutdown.trigger();
        assert_eq!(pacer.wait(&clock, &shutdown), Pace::Cancelled);
        assert_eq!(clock.elapsed(), Duration::ZERO);
    }

    #[test]
    fn system_clock_sleep_is_cancellable() {
        let shutdown = Shutdown::new();
        let s = shutdown.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            s.trigger();
        });

        let start = Instant::now();
        let completed = SystemClock.sleep_until(start + Duration::from_secs(30), &shutdown);
        assert!(!completed);
        assert!(start.elapsed() < Duration::from_secs(5));
        handle.join().unwrap();
    }

    #[test]
    fn system_clock_sleeps_until_deadline() {
        let shutdown = Shutdown::new();
        let start = Instant::now();
        assert!(SystemClock.sleep_until(start + Duration::from_millis(15), &shutdown));
        assert!(start.elapsed() >= Duration::from_millis(15));
    }
}
