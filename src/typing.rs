//! Typing indicator timing policy.
//!
//! Two independent clocks live here. The outbound side rate-limits how often
//! a composing user announces activity. The inbound side decides how long the
//! "peer is typing" state survives after the last observed activity, keeping
//! one deadline per sender so a fresh burst always extends the indicator
//! instead of racing an older timer.

use crate::types::chat::UserId;
use std::collections::HashMap;
use tokio::time::{Duration, Instant};

/// How long the indicator stays on after the last received typing event.
pub const TYPING_INDICATOR_TIMEOUT: Duration = Duration::from_millis(1500);

/// Minimum gap between two outgoing typing announcements for one draft.
pub const TYPING_EMIT_INTERVAL: Duration = Duration::from_millis(1000);

/// Outbound rate gate: at most one typing frame per [`TYPING_EMIT_INTERVAL`].
#[derive(Debug, Default)]
pub struct TypingGate {
    last_emit: Option<Instant>,
}

impl TypingGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether an announcement is due now, and records it if so.
    pub fn should_emit(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last_emit
            && now.duration_since(last) < TYPING_EMIT_INTERVAL
        {
            return false;
        }
        self.last_emit = Some(now);
        true
    }

    /// Forgets the last emission, so the next keystroke announces at once.
    /// Called when a conversation is opened or a message goes out.
    pub fn reset(&mut self) {
        self.last_emit = None;
    }
}

/// Inbound expiry bookkeeping, one deadline per typing sender. A new event
/// for a sender replaces that sender's deadline (cancel and reschedule).
#[derive(Debug, Default)]
pub struct TypingDeadlines {
    deadlines: HashMap<UserId, Instant>,
}

impl TypingDeadlines {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, sender: UserId, now: Instant) {
        self.deadlines.insert(sender, now + TYPING_INDICATOR_TIMEOUT);
    }

    /// Drops expired entries. Returns whether anyone is still typing.
    pub fn prune(&mut self, now: Instant) -> bool {
        self.deadlines.retain(|_, deadline| *deadline > now);
        !self.deadlines.is_empty()
    }

    /// Earliest pending expiry, if any. Drives the session's sleep arm.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.values().min().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    #[tokio::test(start_paused = true)]
    async fn gate_swallows_rapid_keystrokes() {
        let mut gate = TypingGate::new();
        assert!(gate.should_emit(Instant::now()));
        assert!(!gate.should_emit(Instant::now()));

        advance(Duration::from_millis(999)).await;
        assert!(!gate.should_emit(Instant::now()));

        advance(Duration::from_millis(1)).await;
        assert!(gate.should_emit(Instant::now()));
    }

    #[tokio::test(start_paused = true)]
    async fn gate_reset_rearms_immediately() {
        let mut gate = TypingGate::new();
        assert!(gate.should_emit(Instant::now()));
        gate.reset();
        assert!(gate.should_emit(Instant::now()));
    }

    #[tokio::test(start_paused = true)]
    async fn later_activity_extends_the_deadline() {
        let mut deadlines = TypingDeadlines::new();
        deadlines.record(UserId::from("bob"), Instant::now());

        advance(Duration::from_millis(1000)).await;
        deadlines.record(UserId::from("bob"), Instant::now());

        // 1.6s after the first event, 0.6s after the second: still typing.
        advance(Duration::from_millis(600)).await;
        assert!(deadlines.prune(Instant::now()));

        // 1.5s after the second event the entry expires.
        advance(Duration::from_millis(900)).await;
        assert!(!deadlines.prune(Instant::now()));
        assert!(deadlines.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn next_deadline_tracks_the_earliest_sender() {
        let mut deadlines = TypingDeadlines::new();
        let start = Instant::now();
        deadlines.record(UserId::from("bob"), start);

        advance(Duration::from_millis(500)).await;
        deadlines.record(UserId::from("carol"), Instant::now());

        assert_eq!(
            deadlines.next_deadline(),
            Some(start + TYPING_INDICATOR_TIMEOUT)
        );
    }
}
