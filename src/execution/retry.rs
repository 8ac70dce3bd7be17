use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::models::FollowerRelationship;

/// Bounded retry policy for transient adapter errors. Policy rejections
/// and permanent venue errors never pass through here.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, first submission included.
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff before the next attempt after a failed
    /// 1-based `attempt`, capped at `max_backoff`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    pub fn attempts_left(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// Hard wall-clock deadline for a session: the signal's execution time
/// plus the relationship's latency budget. Past this point the session
/// fails rather than silently breaching the latency contract.
pub fn session_deadline(
    relationship: &FollowerRelationship,
    signal_executed_at: DateTime<Utc>,
) -> DateTime<Utc> {
    signal_executed_at + chrono::Duration::milliseconds(relationship.latency_budget_ms())
}

/// Whether sleeping `backoff` before the next attempt would overrun the
/// deadline — if so, the session fails immediately instead of retrying.
pub fn would_exceed_deadline(deadline: DateTime<Utc>, backoff: Duration) -> bool {
    let resume_at =
        Utc::now() + chrono::Duration::from_std(backoff).unwrap_or_else(|_| chrono::Duration::zero());
    resume_at > deadline
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(2), Duration::from_millis(400));
        assert_eq!(policy.backoff(5), Duration::from_secs(2)); // capped
    }

    #[test]
    fn test_attempts_bounded() {
        let policy = RetryPolicy::default();
        assert!(policy.attempts_left(1));
        assert!(policy.attempts_left(2));
        assert!(!policy.attempts_left(3));
    }

    #[test]
    fn test_deadline_check() {
        let deadline = Utc::now() + chrono::Duration::milliseconds(50);
        assert!(would_exceed_deadline(deadline, Duration::from_secs(2)));
        let generous = Utc::now() + chrono::Duration::seconds(30);
        assert!(!would_exceed_deadline(generous, Duration::from_millis(200)));
    }
}
