use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::intent::Intent;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

/// One completed exchange: the user's message, the intent it resolved to, and
/// the final agent response. Turns are immutable once recorded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub turn_number: u32,
    pub user_text: String,
    pub intent: Intent,
    pub response: String,
    pub occurred_at: DateTime<Utc>,
}

/// Persisted record of a conversation. Turns are append-only and numbered
/// sequentially from 1; scratch fields are free-form key/value context that
/// handlers may read (e.g. `experience_id` for a reservation request).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationState {
    pub id: ConversationId,
    pub turns: Vec<Turn>,
    pub scratch: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl ConversationState {
    pub fn new(id: ConversationId) -> Self {
        Self { id, turns: Vec::new(), scratch: BTreeMap::new(), created_at: Utc::now() }
    }

    pub fn next_turn_number(&self) -> u32 {
        self.turns.last().map(|turn| turn.turn_number + 1).unwrap_or(1)
    }

    /// Appends a completed turn. The turn number must be the next in sequence;
    /// anything else is an append-only violation.
    pub fn append_turn(&mut self, turn: Turn) -> Result<(), DomainError> {
        let expected = self.next_turn_number();
        if turn.turn_number != expected {
            return Err(DomainError::TurnOutOfOrder {
                conversation_id: self.id.clone(),
                expected,
                got: turn.turn_number,
            });
        }
        if turn.response.is_empty() {
            return Err(DomainError::InvariantViolation(
                "a completed turn must carry a non-empty response".to_string(),
            ));
        }
        self.turns.push(turn);
        Ok(())
    }

    pub fn record_turn(
        &mut self,
        user_text: impl Into<String>,
        intent: Intent,
        response: impl Into<String>,
    ) -> Result<&Turn, DomainError> {
        let turn = Turn {
            turn_number: self.next_turn_number(),
            user_text: user_text.into(),
            intent,
            response: response.into(),
            occurred_at: Utc::now(),
        };
        self.append_turn(turn)?;
        Ok(self.turns.last().expect("turn just appended"))
    }

    pub fn scratch_value(&self, key: &str) -> Option<&str> {
        self.scratch.get(key).map(String::as_str)
    }

    pub fn set_scratch(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.scratch.insert(key.into(), value.into());
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::domain::intent::Intent;
    use crate::errors::DomainError;

    use super::{ConversationId, ConversationState, Turn};

    fn state() -> ConversationState {
        ConversationState::new(ConversationId("conv-1".to_string()))
    }

    #[test]
    fn turns_are_numbered_sequentially_from_one() {
        let mut state = state();
        for n in 1..=3u32 {
            let turn = state
                .record_turn(format!("message {n}"), Intent::Knowledge, "answer")
                .expect("append turn");
            assert_eq!(turn.turn_number, n);
        }
        assert_eq!(state.turns.len(), 3);
    }

    #[test]
    fn out_of_order_append_is_rejected() {
        let mut state = state();
        let error = state
            .append_turn(Turn {
                turn_number: 5,
                user_text: "hi".to_string(),
                intent: Intent::Unknown,
                response: "handled".to_string(),
                occurred_at: Utc::now(),
            })
            .expect_err("turn 5 before turn 1 must fail");
        assert!(matches!(error, DomainError::TurnOutOfOrder { expected: 1, got: 5, .. }));
    }

    #[test]
    fn empty_response_violates_turn_invariant() {
        let mut state = state();
        let error = state.record_turn("hello", Intent::Login, "").expect_err("empty response");
        assert!(matches!(error, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn scratch_fields_round_trip() {
        let mut state = state();
        state.set_scratch("experience_id", "exp-42");
        assert_eq!(state.scratch_value("experience_id"), Some("exp-42"));
        assert_eq!(state.scratch_value("reservation_id"), None);
    }
}
