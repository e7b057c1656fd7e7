//! Fixed-period scheduling for controller loops.
//!
//! Deadlines sit on a lattice `start + n * period`. A loop that overruns
//! skips the missed lattice points instead of firing a burst to catch up,
//! so the drone never sees a flurry of stale commands after a stall.
//! A period too long to schedule leaves the ticker without a next deadline.

use std::time::Duration;

use minstant::Instant;

use crate::clock::deadline_after;

/// Periodic deadline generator.
#[derive(Debug)]
pub struct Ticker {
    period: Duration,
    /// `None` once the next lattice point is past what an `Instant` can hold.
    next: Option<Instant>,
    ticks: u64,
    skipped: u64,
}

impl Ticker {
    /// Creates a ticker whose first deadline is now.
    ///
    /// # Panics
    ///
    /// Panics if `period` is zero.
    #[must_use]
    pub fn new(period: Duration) -> Self {
        assert!(!period.is_zero(), "Ticker period must be > 0");
        Self {
            period,
            next: Some(Instant::now()),
            ticks: 0,
            skipped: 0,
        }
    }

    #[must_use]
    pub const fn period(&self) -> Duration {
        self.period
    }

    /// Time left until the next deadline (zero if it already passed,
    /// `Duration::MAX` if there is none).
    #[must_use]
    pub fn remaining(&self) -> Duration {
        let Some(next) = self.next else {
            return Duration::MAX;
        };
        let now = Instant::now();
        if now >= next { Duration::ZERO } else { next - now }
    }

    /// Whether a next deadline exists.
    #[must_use]
    pub const fn is_scheduled(&self) -> bool {
        self.next.is_some()
    }

    /// Blocks until the next deadline, then advances. Returns the tick index.
    ///
    /// Without a next deadline this blocks forever.
    pub fn wait(&mut self) -> u64 {
        let remaining = self.remaining();
        if !remaining.is_zero() {
            std::thread::sleep(remaining);
        }
        self.advance()
    }

    /// Marks the current deadline as fired and schedules the next one.
    ///
    /// Returns the index of the tick that fired.
    pub fn advance(&mut self) -> u64 {
        let fired = self.ticks;
        self.ticks += 1;
        let Some(next) = self.next.and_then(|next| deadline_after(next, self.period)) else {
            self.next = None;
            return fired;
        };

        let now = Instant::now();
        self.next = if now >= next {
            let behind = (now - next).as_nanos() / self.period.as_nanos();
            let missed = u32::try_from(behind + 1).unwrap_or(u32::MAX);
            self.skipped += u64::from(missed);
            self.period
                .checked_mul(missed)
                .and_then(|catch_up| deadline_after(next, catch_up))
        } else {
            Some(next)
        };
        fired
    }

    /// Ticks fired so far.
    #[must_use]
    pub const fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Deadlines dropped because the loop overran.
    #[must_use]
    pub const fn skipped(&self) -> u64 {
        self.skipped
    }
}
