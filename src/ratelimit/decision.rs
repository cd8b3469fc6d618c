//! Rate limit decisions.

use serde::Serialize;

/// The answer to one rate limit check.
///
/// `retry_after` is only present on a denial. `remaining` is absent when
/// limiting is disabled or the counter store could not be consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Decision {
    allowed: bool,
    retry_after: Option<u64>,
    remaining: Option<u64>,
}

impl Decision {
    /// Allow without quota metadata.
    pub fn unmetered() -> Self {
        Self {
            allowed: true,
            retry_after: None,
            remaining: None,
        }
    }

    pub fn allow(remaining: u64) -> Self {
        Self {
            allowed: true,
            retry_after: None,
            remaining: Some(remaining),
        }
    }

    pub fn deny(retry_after: u64) -> Self {
        Self {
            allowed: false,
            retry_after: Some(retry_after),
            remaining: Some(0),
        }
    }

    pub fn allowed(&self) -> bool {
        self.allowed
    }

    /// Seconds until the caller may retry.
    pub fn retry_after(&self) -> Option<u64> {
        self.retry_after
    }

    /// Admissions left in the current window.
    pub fn remaining(&self) -> Option<u64> {
        self.remaining
    }
}

/// Why a check could not consult the counter store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Degraded {
    /// No connection to the store.
    StoreUnavailable,
    /// A store operation failed on an established connection.
    StoreError,
}

/// Internal result of a check, before fail-open collapsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    /// Limiting is switched off.
    Disabled,
    Allowed { count: u64, remaining: u64 },
    Denied { count: u64, retry_after: u64 },
    /// Infrastructure trouble; the request is let through.
    Indeterminate(Degraded),
}

impl From<Outcome> for Decision {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Allowed { remaining, .. } => Decision::allow(remaining),
            Outcome::Denied { retry_after, .. } => Decision::deny(retry_after),
            Outcome::Disabled | Outcome::Indeterminate(_) => Decision::unmetered(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degraded_outcomes_collapse_to_unmetered_allow() {
        for outcome in [
            Outcome::Disabled,
            Outcome::Indeterminate(Degraded::StoreUnavailable),
            Outcome::Indeterminate(Degraded::StoreError),
        ] {
            assert_eq!(Decision::from(outcome), Decision::unmetered());
        }
    }

    #[test]
    fn test_denied_reports_zero_remaining() {
        let decision = Decision::from(Outcome::Denied {
            count: 6,
            retry_after: 42,
        });

        assert!(!decision.allowed());
        assert_eq!(decision.retry_after(), Some(42));
        assert_eq!(decision.remaining(), Some(0));
    }

    #[test]
    fn test_serializes_absent_fields_as_null() {
        let json = serde_json::to_string(&Decision::allow(3)).unwrap();
        assert_eq!(json, r#"{"allowed":true,"retry_after":null,"remaining":3}"#);
    }
}
