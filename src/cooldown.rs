//! Alert debouncing.
//!
//! The gate is the only thing standing between repeated positive verdicts and
//! an alert storm. Accept/reject is a single atomic compare-and-set over the
//! last-accepted timestamp, so two verdicts completing concurrently can never
//! both pass inside one cooldown interval.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Never-accepted sentinel. Epoch-millis 0 is not a timestamp this system
/// will ever observe from a live clock.
const NEVER: u64 = 0;

pub struct CooldownGate {
    cooldown: Duration,
    last_accept_ms: AtomicU64,
}

impl CooldownGate {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_accept_ms: AtomicU64::new(NEVER),
        }
    }

    /// Atomically accept or reject a positive verdict at `now`.
    ///
    /// Accepts when no alert has been accepted yet or the previous accept is
    /// at least one cooldown interval in the past, and records `now` as the
    /// new last-accept in the same atomic step. On a lost race the check is
    /// re-evaluated against the winner's timestamp, which lands inside the
    /// cooldown, so the loser rejects.
    pub fn try_accept(&self, now: SystemTime) -> bool {
        let now_ms = match now.duration_since(UNIX_EPOCH) {
            Ok(d) => d.as_millis() as u64,
            Err(_) => return false,
        };
        let cooldown_ms = self.cooldown.as_millis() as u64;
        loop {
            let last = self.last_accept_ms.load(Ordering::Acquire);
            if last != NEVER && now_ms.saturating_sub(last) < cooldown_ms {
                return false;
            }
            match self.last_accept_ms.compare_exchange(
                last,
                now_ms,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(_) => continue,
            }
        }
    }

    /// Timestamp of the last accepted alert, if any.
    pub fn last_accept(&self) -> Option<SystemTime> {
        match self.last_accept_ms.load(Ordering::Acquire) {
            NEVER => None,
            ms => Some(UNIX_EPOCH + Duration::from_millis(ms)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn first_positive_is_accepted() {
        let gate = CooldownGate::new(Duration::from_secs(30));
        assert!(gate.try_accept(at(100)));
        assert_eq!(gate.last_accept(), Some(at(100)));
    }

    #[test]
    fn second_positive_inside_cooldown_is_rejected() {
        let gate = CooldownGate::new(Duration::from_secs(30));
        assert!(gate.try_accept(at(100)));
        assert!(!gate.try_accept(at(110)));
        // Rejection leaves the last-accept untouched.
        assert_eq!(gate.last_accept(), Some(at(100)));
    }

    #[test]
    fn positive_after_cooldown_is_accepted() {
        // cooldown=30s: accept at t, reject at t+10, accept at t+31.
        let gate = CooldownGate::new(Duration::from_secs(30));
        assert!(gate.try_accept(at(1000)));
        assert!(!gate.try_accept(at(1010)));
        assert!(gate.try_accept(at(1031)));
    }

    #[test]
    fn boundary_exactly_at_cooldown_is_accepted() {
        let gate = CooldownGate::new(Duration::from_secs(30));
        assert!(gate.try_accept(at(1000)));
        assert!(gate.try_accept(at(1030)));
    }

    #[test]
    fn concurrent_positives_admit_exactly_one() {
        let gate = Arc::new(CooldownGate::new(Duration::from_secs(30)));
        let now = at(500);
        let mut handles = Vec::new();
        for _ in 0..8 {
            let gate = gate.clone();
            handles.push(std::thread::spawn(move || gate.try_accept(now)));
        }
        let accepted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|accepted| *accepted)
            .count();
        assert_eq!(accepted, 1);
    }
}
