use chrono::{DateTime, Duration, Utc};

use crate::configuration::IdentitySettings;

/// Consecutive-failure lockout, shared by both identity stores.
#[derive(Debug, Clone)]
pub struct LockoutPolicy {
    pub max_failed_attempts: i32,
    pub duration: Duration,
    pub require_confirmed_email: bool,
}

impl LockoutPolicy {
    pub fn from_settings(settings: &IdentitySettings) -> Self {
        Self {
            max_failed_attempts: settings.max_failed_attempts,
            duration: Duration::minutes(settings.lockout_minutes),
            require_confirmed_email: settings.require_confirmed_email,
        }
    }

    pub fn is_locked(&self, lockout_end: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        matches!(lockout_end, Some(end) if end > now)
    }

    /// Failure count and lockout end after one more failed attempt. Reaching
    /// the threshold locks the account and resets the counter.
    pub fn register_failure(
        &self,
        failed_count: i32,
        now: DateTime<Utc>,
    ) -> (i32, Option<DateTime<Utc>>) {
        let failed_count = failed_count + 1;
        if self.max_failed_attempts > 0 && failed_count >= self.max_failed_attempts {
            (0, Some(now + self.duration))
        } else {
            (failed_count, None)
        }
    }
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self::from_settings(&IdentitySettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> LockoutPolicy {
        LockoutPolicy {
            max_failed_attempts: 3,
            duration: Duration::minutes(10),
            require_confirmed_email: false,
        }
    }

    #[test]
    fn test_locks_on_threshold() {
        let now = Utc::now();
        let policy = policy();

        assert_eq!(policy.register_failure(0, now), (1, None));
        assert_eq!(policy.register_failure(1, now), (2, None));
        assert_eq!(
            policy.register_failure(2, now),
            (0, Some(now + Duration::minutes(10)))
        );
    }

    #[test]
    fn test_lock_expires() {
        let now = Utc::now();
        let policy = policy();
        let end = Some(now + Duration::minutes(10));

        assert!(policy.is_locked(end, now));
        assert!(!policy.is_locked(end, now + Duration::minutes(10)));
        assert!(!policy.is_locked(None, now));
    }

    #[test]
    fn test_zero_threshold_disables_lockout() {
        let mut policy = policy();
        policy.max_failed_attempts = 0;

        assert_eq!(policy.register_failure(100, Utc::now()), (101, None));
    }
}
