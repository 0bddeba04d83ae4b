//! Coil and actuator label tracking.
//!
//! The labels shown alongside readings are the last *committed* pair. Under
//! [`CoilPolicy::Immediate`] every change commits at once. Under
//! [`CoilPolicy::Debounce`] a changed pair must hold steady for the hold
//! period before it replaces the committed one; seeing the committed pair
//! again drops the pending change.

use std::time::{Duration, Instant};

use valvewatch_types::{UNKNOWN_COIL, UNKNOWN_LABEL};

use crate::config::CoilPolicy;

/// A coil/actuator label pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoilState {
    pub coil: String,
    pub actuator: String,
}

impl CoilState {
    pub fn new(coil: impl Into<String>, actuator: impl Into<String>) -> Self {
        Self {
            coil: coil.into(),
            actuator: actuator.into(),
        }
    }
}

impl Default for CoilState {
    fn default() -> Self {
        Self::new(UNKNOWN_COIL, UNKNOWN_LABEL)
    }
}

/// What an observation did to the tracked state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// Same as the committed pair; only the update time moved.
    Unchanged,
    /// The pair was committed right away.
    Committed { from: CoilState, to: CoilState },
    /// The pair is waiting out the hold; commit is due after `hold`.
    Pending { to: CoilState, hold: Duration },
}

#[derive(Debug, Clone)]
struct PendingChange {
    state: CoilState,
    since: Instant,
}

#[derive(Debug)]
pub struct CoilTracker {
    policy: CoilPolicy,
    hold: Duration,
    committed: Option<CoilState>,
    pending: Option<PendingChange>,
    last_update: Option<Instant>,
}

impl CoilTracker {
    pub fn new(policy: CoilPolicy, hold: Duration) -> Self {
        Self {
            policy,
            hold,
            committed: None,
            pending: None,
            last_update: None,
        }
    }

    pub fn observe(&mut self, incoming: CoilState, now: Instant) -> Observation {
        self.last_update = Some(now);

        let Some(committed) = &self.committed else {
            self.committed = Some(incoming.clone());
            return Observation::Committed {
                from: CoilState::default(),
                to: incoming,
            };
        };

        if *committed == incoming {
            self.pending = None;
            return Observation::Unchanged;
        }

        match self.policy {
            CoilPolicy::Immediate => {
                let from = committed.clone();
                self.committed = Some(incoming.clone());
                Observation::Committed { from, to: incoming }
            }
            CoilPolicy::Debounce => {
                if let Some(pending) = &self.pending {
                    if pending.state == incoming {
                        let elapsed = now.saturating_duration_since(pending.since);
                        return Observation::Pending {
                            to: incoming,
                            hold: self.hold.saturating_sub(elapsed),
                        };
                    }
                }
                self.pending = Some(PendingChange {
                    state: incoming.clone(),
                    since: now,
                });
                Observation::Pending {
                    to: incoming,
                    hold: self.hold,
                }
            }
        }
    }

    /// Commit the pending pair if it has been held long enough.
    pub fn commit_due(&mut self, now: Instant) -> Option<(CoilState, CoilState)> {
        let due = self
            .pending
            .as_ref()
            .is_some_and(|p| now.saturating_duration_since(p.since) >= self.hold);
        if !due {
            return None;
        }

        let pending = self.pending.take()?;
        let from = self.committed.replace(pending.state.clone()).unwrap_or_default();
        Some((from, pending.state))
    }

    /// Labels currently shown with readings.
    pub fn displayed(&self) -> CoilState {
        self.committed.clone().unwrap_or_default()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn last_update(&self) -> Option<Instant> {
        self.last_update
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOLD: Duration = Duration::from_secs(10);

    fn pair(coil: &str, actuator: &str) -> CoilState {
        CoilState::new(coil, actuator)
    }

    #[test]
    fn test_first_observation_commits() {
        for policy in [CoilPolicy::Immediate, CoilPolicy::Debounce] {
            let mut tracker = CoilTracker::new(policy, HOLD);
            let now = Instant::now();
            let obs = tracker.observe(pair("left", "forward"), now);
            assert!(matches!(obs, Observation::Committed { .. }));
            assert_eq!(tracker.displayed(), pair("left", "forward"));
        }
    }

    #[test]
    fn test_immediate_applies_changes() {
        let mut tracker = CoilTracker::new(CoilPolicy::Immediate, HOLD);
        let now = Instant::now();
        tracker.observe(pair("left", "forward"), now);

        let obs = tracker.observe(pair("right", "retracted"), now);
        assert_eq!(
            obs,
            Observation::Committed {
                from: pair("left", "forward"),
                to: pair("right", "retracted"),
            }
        );
        assert_eq!(tracker.displayed(), pair("right", "retracted"));
    }

    #[test]
    fn test_unchanged_refreshes_timestamp() {
        let mut tracker = CoilTracker::new(CoilPolicy::Immediate, HOLD);
        let start = Instant::now();
        tracker.observe(pair("left", "forward"), start);

        let later = start + Duration::from_secs(3);
        assert_eq!(tracker.observe(pair("left", "forward"), later), Observation::Unchanged);
        assert_eq!(tracker.last_update(), Some(later));
    }

    #[test]
    fn test_debounce_holds_then_commits() {
        let mut tracker = CoilTracker::new(CoilPolicy::Debounce, HOLD);
        let start = Instant::now();
        tracker.observe(pair("left", "forward"), start);

        let obs = tracker.observe(pair("right", "forward"), start);
        assert_eq!(obs, Observation::Pending { to: pair("right", "forward"), hold: HOLD });
        assert_eq!(tracker.displayed(), pair("left", "forward"));

        assert!(tracker.commit_due(start + Duration::from_secs(9)).is_none());
        let (from, to) = tracker.commit_due(start + HOLD).unwrap();
        assert_eq!(from, pair("left", "forward"));
        assert_eq!(to, pair("right", "forward"));
        assert_eq!(tracker.displayed(), pair("right", "forward"));
        assert!(!tracker.has_pending());
    }

    #[test]
    fn test_debounce_restarts_on_new_pair() {
        let mut tracker = CoilTracker::new(CoilPolicy::Debounce, HOLD);
        let start = Instant::now();
        tracker.observe(pair("left", "forward"), start);
        tracker.observe(pair("right", "forward"), start);

        let later = start + Duration::from_secs(6);
        tracker.observe(pair("right", "retracted"), later);

        // The original hold would have expired here, but the pair changed.
        assert!(tracker.commit_due(start + HOLD).is_none());
        let (_, to) = tracker.commit_due(later + HOLD).unwrap();
        assert_eq!(to, pair("right", "retracted"));
    }

    #[test]
    fn test_debounce_repeat_keeps_original_deadline() {
        let mut tracker = CoilTracker::new(CoilPolicy::Debounce, HOLD);
        let start = Instant::now();
        tracker.observe(pair("left", "forward"), start);
        tracker.observe(pair("right", "forward"), start);

        let obs = tracker.observe(pair("right", "forward"), start + Duration::from_secs(4));
        assert_eq!(
            obs,
            Observation::Pending { to: pair("right", "forward"), hold: Duration::from_secs(6) }
        );
    }

    #[test]
    fn test_debounce_cancelled_by_committed_pair() {
        let mut tracker = CoilTracker::new(CoilPolicy::Debounce, HOLD);
        let start = Instant::now();
        tracker.observe(pair("left", "forward"), start);
        tracker.observe(pair("right", "forward"), start);
        tracker.observe(pair("left", "forward"), start + Duration::from_secs(2));

        assert!(!tracker.has_pending());
        assert!(tracker.commit_due(start + HOLD).is_none());
        assert_eq!(tracker.displayed(), pair("left", "forward"));
    }
}
