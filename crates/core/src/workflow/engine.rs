use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::workflow::states::{TurnEvent, TurnPhase, TurnTransition};

pub trait TurnDefinition {
    fn initial_phase(&self) -> TurnPhase;
    fn transition(
        &self,
        current: &TurnPhase,
        event: &TurnEvent,
    ) -> Result<TurnTransition, TurnTransitionError>;
}

/// The single production flow: received → classified → dispatched → responded
/// → persisted, with the dispatched handler fixed by the routing table.
#[derive(Clone, Debug, Default)]
pub struct SupportTurnFlow;

impl TurnDefinition for SupportTurnFlow {
    fn initial_phase(&self) -> TurnPhase {
        TurnPhase::Received
    }

    fn transition(
        &self,
        current: &TurnPhase,
        event: &TurnEvent,
    ) -> Result<TurnTransition, TurnTransitionError> {
        transition_support_turn(current, event)
    }
}

pub struct TurnEngine<F = SupportTurnFlow> {
    flow: F,
}

impl<F> TurnEngine<F>
where
    F: TurnDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn initial_phase(&self) -> TurnPhase {
        self.flow.initial_phase()
    }

    pub fn apply(
        &self,
        current: &TurnPhase,
        event: &TurnEvent,
    ) -> Result<TurnTransition, TurnTransitionError> {
        self.flow.transition(current, event)
    }

    pub fn apply_with_audit<S>(
        &self,
        current: &TurnPhase,
        event: &TurnEvent,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TurnTransition, TurnTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, event);
        match &result {
            Ok(transition) => {
                sink.emit(
                    AuditEvent::new(
                        audit.conversation_id.clone(),
                        audit.correlation_id.clone(),
                        "turn.transition_applied",
                        AuditCategory::Routing,
                        audit.actor.clone(),
                        AuditOutcome::Success,
                    )
                    .with_metadata("from", format!("{:?}", transition.from))
                    .with_metadata("to", format!("{:?}", transition.to)),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::new(
                        audit.conversation_id.clone(),
                        audit.correlation_id.clone(),
                        "turn.transition_rejected",
                        AuditCategory::Routing,
                        audit.actor.clone(),
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

impl Default for TurnEngine<SupportTurnFlow> {
    fn default() -> Self {
        Self::new(SupportTurnFlow)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TurnTransitionError {
    #[error("invalid transition from {phase:?} using event {event:?}")]
    InvalidTransition { phase: TurnPhase, event: TurnEvent },
}

fn transition_support_turn(
    current: &TurnPhase,
    event: &TurnEvent,
) -> Result<TurnTransition, TurnTransitionError> {
    use TurnEvent::{HandlerInvoked, IntentResolved, ResponseComposed, StateWritten};
    use TurnPhase::{Classified, Dispatched, Persisted, Received, Responded};

    let to = match (current, event) {
        (Received, IntentResolved { .. }) => Classified,
        (Classified, HandlerInvoked { .. }) => Dispatched,
        (Dispatched, ResponseComposed) => Responded,
        (Responded, StateWritten) => Persisted,
        _ => {
            return Err(TurnTransitionError::InvalidTransition {
                phase: *current,
                event: event.clone(),
            });
        }
    };

    Ok(TurnTransition { from: *current, to, event: event.clone() })
}

#[cfg(test)]
mod tests {
    use crate::audit::{AuditContext, InMemoryAuditSink};
    use crate::domain::conversation::ConversationId;
    use crate::domain::intent::Intent;
    use crate::workflow::engine::{TurnEngine, TurnTransitionError};
    use crate::workflow::states::{Route, TurnEvent, TurnPhase};

    #[test]
    fn routing_table_matches_intent_contract() {
        assert_eq!(Route::for_intent(Intent::Subscription), Route::Operations);
        assert_eq!(Route::for_intent(Intent::Reservation), Route::Operations);
        assert_eq!(Route::for_intent(Intent::Login), Route::Operations);
        assert_eq!(Route::for_intent(Intent::Knowledge), Route::Resolver);
        assert_eq!(Route::for_intent(Intent::Unknown), Route::Escalation);
    }

    #[test]
    fn happy_path_walks_all_phases_in_order() {
        let engine = TurnEngine::default();
        let mut phase = engine.initial_phase();
        assert_eq!(phase, TurnPhase::Received);

        let events = [
            TurnEvent::IntentResolved { intent: Intent::Knowledge },
            TurnEvent::HandlerInvoked { route: Route::Resolver },
            TurnEvent::ResponseComposed,
            TurnEvent::StateWritten,
        ];
        for event in &events {
            phase = engine.apply(&phase, event).expect("linear walk").to;
        }
        assert_eq!(phase, TurnPhase::Persisted);
    }

    #[test]
    fn out_of_order_event_is_rejected() {
        let engine = TurnEngine::default();
        let error = engine
            .apply(&TurnPhase::Received, &TurnEvent::ResponseComposed)
            .expect_err("cannot respond before classifying");
        assert!(matches!(
            error,
            TurnTransitionError::InvalidTransition { phase: TurnPhase::Received, .. }
        ));
    }

    #[test]
    fn persisted_is_terminal() {
        let engine = TurnEngine::default();
        let error = engine
            .apply(&TurnPhase::Persisted, &TurnEvent::StateWritten)
            .expect_err("no transition out of persisted");
        assert!(matches!(error, TurnTransitionError::InvalidTransition { .. }));
    }

    #[test]
    fn replay_is_deterministic_for_same_event_sequence() {
        let engine = TurnEngine::default();
        let events = [
            TurnEvent::IntentResolved { intent: Intent::Subscription },
            TurnEvent::HandlerInvoked { route: Route::Operations },
            TurnEvent::ResponseComposed,
            TurnEvent::StateWritten,
        ];

        let run = |engine: &TurnEngine| {
            let mut phase = engine.initial_phase();
            let mut trace = Vec::new();
            for event in &events {
                let transition = engine.apply(&phase, event).expect("deterministic run");
                trace.push((transition.from, transition.to));
                phase = transition.to;
            }
            trace
        };

        assert_eq!(run(&engine), run(&engine));
    }

    #[test]
    fn transition_emits_audit_event() {
        let engine = TurnEngine::default();
        let sink = InMemoryAuditSink::default();

        let _ = engine
            .apply_with_audit(
                &TurnPhase::Received,
                &TurnEvent::IntentResolved { intent: Intent::Login },
                &sink,
                &AuditContext::new(
                    Some(ConversationId("conv-7".to_owned())),
                    "req-42",
                    "turn-engine",
                ),
            )
            .expect("transition should succeed");

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].correlation_id, "req-42");
        assert_eq!(events[0].event_type, "turn.transition_applied");
    }

    #[test]
    fn rejected_transition_emits_rejection_audit_event() {
        let engine = TurnEngine::default();
        let sink = InMemoryAuditSink::default();

        let _ = engine
            .apply_with_audit(
                &TurnPhase::Persisted,
                &TurnEvent::ResponseComposed,
                &sink,
                &AuditContext::new(None, "req-43", "turn-engine"),
            )
            .expect_err("persisted is terminal");

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "turn.transition_rejected");
    }
}
