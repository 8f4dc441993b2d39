//! Monotonic clock helpers.
//!
//! Every deadline in the engine is an [`Instant`]; these helpers keep the
//! "has this deadline passed" comparisons in one place so the loop, the
//! keepalive monitor and the timeout sweep all agree on the edge case
//! (a deadline equal to `now` counts as reached).

use std::time::{Duration, Instant};

/// Current monotonic time.
pub fn now() -> Instant {
    Instant::now()
}

/// Returns `true` when `a` is strictly later than `b`.
pub fn is_after(a: Instant, b: Instant) -> bool {
    a > b
}

/// Returns `true` when `a` is strictly earlier than `b`.
pub fn is_before(a: Instant, b: Instant) -> bool {
    is_after(b, a)
}

/// Returns `true` once `now` has reached `deadline`.
pub fn reached(deadline: Instant, now: Instant) -> bool {
    !is_before(now, deadline)
}

/// Time left until `deadline`, zero if it already passed.
pub fn until(deadline: Instant, now: Instant) -> Duration {
    deadline.saturating_duration_since(now)
}

/// Picks the earlier of two optional deadlines.
pub fn earliest(a: Option<Instant>, b: Option<Instant>) -> Option<Instant> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, None) => a,
        (None, b) => b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_helpers() {
        let base = now();
        let later = base + Duration::from_millis(10);
        assert!(is_after(later, base));
        assert!(is_before(base, later));
        assert!(!is_after(base, base));
        assert!(!is_before(base, base));
    }

    #[test]
    fn test_deadline_equal_to_now_is_reached() {
        let base = now();
        assert!(reached(base, base));
        assert!(!reached(base + Duration::from_millis(1), base));
    }

    #[test]
    fn test_until_saturates_at_zero() {
        let base = now();
        let past = base;
        let current = base + Duration::from_millis(5);
        assert_eq!(until(past, current), Duration::ZERO);
        assert_eq!(until(current, base), Duration::from_millis(5));
    }

    #[test]
    fn test_earliest_picks_min() {
        let base = now();
        let later = base + Duration::from_secs(1);
        assert_eq!(earliest(Some(later), Some(base)), Some(base));
        assert_eq!(earliest(None, Some(later)), Some(later));
        assert_eq!(earliest(None, None), None);
    }
}
