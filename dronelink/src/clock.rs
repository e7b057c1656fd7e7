//! Deadline arithmetic on [`minstant::Instant`].

use std::time::Duration;

use minstant::Instant;

/// Longest wait turned into a concrete deadline. Anything longer, including
/// `Duration::MAX`, means no deadline at all.
pub(crate) const MAX_DEADLINE: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// `from + wait`, or `None` when that instant is not representable.
///
/// minstant truncates the nanosecond count to 64 bits before adding, so
/// overlong waits are rejected before they reach it.
pub(crate) fn deadline_after(from: Instant, wait: Duration) -> Option<Instant> {
    if wait > MAX_DEADLINE {
        return None;
    }
    from.checked_add(wait)
}
