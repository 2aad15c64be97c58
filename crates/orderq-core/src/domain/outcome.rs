//! Outcome model: what a handler reports back when it did not fail.
//!
//! Both kinds lead to an ack. `Skipped` exists so logs and tests can tell a
//! real state change apart from an idempotent no-op.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeKind {
    /// The side effect happened in this invocation.
    Completed,
    /// Nothing to do (already paid/closed, already notified, order missing).
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub kind: OutcomeKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Outcome {
    pub fn completed() -> Self {
        Self {
            kind: OutcomeKind::Completed,
            reason: None,
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            kind: OutcomeKind::Skipped,
            reason: Some(reason.into()),
        }
    }

    pub fn is_skipped(&self) -> bool {
        self.kind == OutcomeKind::Skipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_kind_serializes_as_required_names() {
        let s = serde_json::to_string(&OutcomeKind::Completed).unwrap();
        assert_eq!(s, "\"COMPLETED\"");

        let s = serde_json::to_string(&Outcome::completed()).unwrap();
        assert_eq!(s, r#"{"kind":"COMPLETED"}"#);
    }

    #[test]
    fn skipped_carries_reason() {
        let o = Outcome::skipped("already paid");
        assert!(o.is_skipped());
        assert_eq!(o.reason.as_deref(), Some("already paid"));
    }
}
