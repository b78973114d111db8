use serde::{Deserialize, Serialize};

use crate::domain::intent::Intent;

/// Phases of a single conversation turn. Linear; a turn never moves backward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnPhase {
    Received,
    Classified,
    Dispatched,
    Responded,
    Persisted,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnEvent {
    IntentResolved { intent: Intent },
    HandlerInvoked { route: Route },
    ResponseComposed,
    StateWritten,
}

/// Handler a classified intent is dispatched to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Operations,
    Resolver,
    Escalation,
}

impl Route {
    /// Static transition table from intent to handler. Subscription and
    /// reservation work is database-backed; login is treated as an account
    /// lookup and shares the operations handler; anything unclassifiable is
    /// handed to a human.
    pub fn for_intent(intent: Intent) -> Self {
        match intent {
            Intent::Subscription | Intent::Reservation | Intent::Login => Self::Operations,
            Intent::Knowledge => Self::Resolver,
            Intent::Unknown => Self::Escalation,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Operations => "operations",
            Self::Resolver => "resolver",
            Self::Escalation => "escalation",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnTransition {
    pub from: TurnPhase,
    pub to: TurnPhase,
    pub event: TurnEvent,
}
