//! Violation audit records and daily locks.

use chrono::{DateTime, NaiveDate, Utc};
use std::fmt;
use std::str::FromStr;

use super::error::SentinelError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationReason {
    LockedSessionAttempt,
    MaxTradesExceeded,
    TimeWindowViolation,
    MaxLossHit,
    EmotionalCheckFailed,
}

impl ViolationReason {
    pub const ALL: [ViolationReason; 5] = [
        ViolationReason::LockedSessionAttempt,
        ViolationReason::MaxTradesExceeded,
        ViolationReason::TimeWindowViolation,
        ViolationReason::MaxLossHit,
        ViolationReason::EmotionalCheckFailed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationReason::LockedSessionAttempt => "LOCKED_SESSION_ATTEMPT",
            ViolationReason::MaxTradesExceeded => "MAX_TRADES_EXCEEDED",
            ViolationReason::TimeWindowViolation => "TIME_WINDOW_VIOLATION",
            ViolationReason::MaxLossHit => "MAX_LOSS_HIT",
            ViolationReason::EmotionalCheckFailed => "EMOTIONAL_CHECK_FAILED",
        }
    }

    /// Whether this violation locks the session for the rest of the day.
    pub fn locks_session(&self) -> bool {
        matches!(
            self,
            ViolationReason::MaxTradesExceeded
                | ViolationReason::MaxLossHit
                | ViolationReason::EmotionalCheckFailed
        )
    }

    /// Message shown to the trader.
    pub fn message(&self) -> &'static str {
        match self {
            ViolationReason::LockedSessionAttempt => "Session is strictly locked.",
            ViolationReason::MaxTradesExceeded => "Daily trade limit exceeded.",
            ViolationReason::TimeWindowViolation => "Trading window closed.",
            ViolationReason::MaxLossHit => "Daily loss limit hit. Account locked.",
            ViolationReason::EmotionalCheckFailed => "Emotional check failed. Session locked.",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ViolationReason::LockedSessionAttempt => "Locked session attempt",
            ViolationReason::MaxTradesExceeded => "Max trades exceeded",
            ViolationReason::TimeWindowViolation => "Outside trading window",
            ViolationReason::MaxLossHit => "Max daily loss hit",
            ViolationReason::EmotionalCheckFailed => "Emotional check failed",
        }
    }
}

impl fmt::Display for ViolationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ViolationReason {
    type Err = SentinelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ViolationReason::ALL
            .into_iter()
            .find(|r| r.as_str() == s.trim())
            .ok_or_else(|| SentinelError::invalid("reason", format!("unknown reason '{s}'")))
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Violation {
    pub id: i64,
    pub user_id: String,
    pub reason: ViolationReason,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Violation {
    /// Compact `key: value` rendering of the detail payload.
    pub fn details_summary(&self) -> String {
        match &self.details {
            serde_json::Value::Object(map) => map
                .iter()
                .map(|(k, v)| match v {
                    serde_json::Value::String(s) => format!("{k}: {s}"),
                    other => format!("{k}: {other}"),
                })
                .collect::<Vec<_>>()
                .join(", "),
            serde_json::Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

/// At most one per (user, lock_date).
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct DailyLock {
    pub user_id: String,
    pub lock_date: NaiveDate,
    pub reason: ViolationReason,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reason_codes_round_trip() {
        for reason in ViolationReason::ALL {
            assert_eq!(reason.as_str().parse::<ViolationReason>().unwrap(), reason);
        }
        assert!("SOMETHING_ELSE".parse::<ViolationReason>().is_err());
    }

    #[test]
    fn only_count_loss_and_emotional_reasons_lock() {
        assert!(!ViolationReason::LockedSessionAttempt.locks_session());
        assert!(ViolationReason::MaxTradesExceeded.locks_session());
        assert!(!ViolationReason::TimeWindowViolation.locks_session());
        assert!(ViolationReason::MaxLossHit.locks_session());
        assert!(ViolationReason::EmotionalCheckFailed.locks_session());
    }

    #[test]
    fn serde_uses_reason_codes() {
        let encoded = serde_json::to_string(&ViolationReason::MaxLossHit).unwrap();
        assert_eq!(encoded, "\"MAX_LOSS_HIT\"");
    }

    #[test]
    fn details_summary_flattens_object() {
        let v = Violation {
            id: 1,
            user_id: "u".into(),
            reason: ViolationReason::MaxTradesExceeded,
            details: json!({"current": 5, "limit": 5}),
            created_at: Utc::now(),
        };
        assert_eq!(v.details_summary(), "current: 5, limit: 5");

        let v = Violation {
            details: json!({"window": "09:30-16:00"}),
            ..v
        };
        assert_eq!(v.details_summary(), "window: 09:30-16:00");
    }
}
