use std::sync::Arc;

use anyhow::{Context, Result};
use uuid::Uuid;

use concierge_core::audit::{
    AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink,
};
use concierge_core::domain::conversation::{ConversationId, ConversationState};
use concierge_core::domain::intent::Intent;
use concierge_core::domain::ticket::TicketId;
use concierge_core::workflow::{Route, TurnEngine, TurnEvent, TurnPhase};
use concierge_db::repositories::ConversationRepository;

use crate::classifier::IntentClassifier;
use crate::escalation::{EscalationContext, EscalationHandler, EscalationOutcome};
use crate::ops::{OperationsHandler, OpsOutcome};
use crate::resolver::{KnowledgeResolver, ResolveOutcome};

/// One inbound user message bound to a conversation.
#[derive(Clone, Debug)]
pub struct TurnRequest {
    pub conversation_id: ConversationId,
    pub user_id: String,
    pub text: String,
}

/// The completed turn as reported back to the transport layer.
#[derive(Clone, Debug, PartialEq)]
pub struct TurnOutcome {
    pub conversation_id: ConversationId,
    pub turn_number: u32,
    pub intent: Intent,
    pub route: Route,
    pub response: String,
    pub escalated: bool,
    pub ticket_id: Option<TicketId>,
}

/// Drives one full pass per message: classify, dispatch per the routing
/// table, convert handler failures into escalations, then append and persist
/// the turn. The workflow engine enforces the phase order; a turn that
/// reaches the caller always went received → classified → dispatched →
/// responded → persisted.
pub struct SupportRuntime {
    classifier: IntentClassifier,
    resolver: KnowledgeResolver,
    ops: OperationsHandler,
    escalation: EscalationHandler,
    conversations: Arc<dyn ConversationRepository>,
    engine: TurnEngine,
    audit: Arc<dyn AuditSink>,
}

impl SupportRuntime {
    pub fn new(
        classifier: IntentClassifier,
        resolver: KnowledgeResolver,
        ops: OperationsHandler,
        escalation: EscalationHandler,
        conversations: Arc<dyn ConversationRepository>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            classifier,
            resolver,
            ops,
            escalation,
            conversations,
            engine: TurnEngine::default(),
            audit,
        }
    }

    pub async fn handle_message(&self, request: TurnRequest) -> Result<TurnOutcome> {
        let correlation_id = Uuid::new_v4().to_string();
        let audit_context = AuditContext::new(
            Some(request.conversation_id.clone()),
            correlation_id.clone(),
            "support-runtime",
        );

        let mut state = self
            .conversations
            .find_by_id(&request.conversation_id)
            .await
            .context("loading conversation state")?
            .unwrap_or_else(|| ConversationState::new(request.conversation_id.clone()));
        if state.scratch_value("user_id").is_none() {
            state.set_scratch("user_id", request.user_id.clone());
        }

        let mut phase = self.engine.initial_phase();
        self.audit.emit(
            AuditEvent::new(
                Some(request.conversation_id.clone()),
                correlation_id.clone(),
                "turn.received",
                AuditCategory::Ingress,
                "support-runtime",
                AuditOutcome::Success,
            )
            .with_metadata("turn_number", state.next_turn_number().to_string()),
        );

        let intent = self.classifier.classify(&request.text).await;
        phase = self
            .engine
            .apply_with_audit(
                &phase,
                &TurnEvent::IntentResolved { intent },
                self.audit.as_ref(),
                &audit_context,
            )
            .context("recording classification")?
            .to;

        let route = Route::for_intent(intent);
        phase = self
            .engine
            .apply_with_audit(
                &phase,
                &TurnEvent::HandlerInvoked { route },
                self.audit.as_ref(),
                &audit_context,
            )
            .context("recording dispatch")?
            .to;

        let (response, escalation) =
            self.dispatch(route, intent, &request, &state, &correlation_id).await;
        let escalated = escalation.is_some();
        let ticket_id = escalation.and_then(|outcome| outcome.ticket_id);

        phase = self
            .engine
            .apply_with_audit(
                &phase,
                &TurnEvent::ResponseComposed,
                self.audit.as_ref(),
                &audit_context,
            )
            .context("recording response")?
            .to;

        let turn_number = state
            .record_turn(request.text.clone(), intent, response.clone())
            .context("appending turn")?
            .turn_number;
        self.conversations.save(&state).await.context("persisting conversation state")?;

        let transition = self
            .engine
            .apply_with_audit(
                &phase,
                &TurnEvent::StateWritten,
                self.audit.as_ref(),
                &audit_context,
            )
            .context("recording persistence")?;
        debug_assert_eq!(transition.to, TurnPhase::Persisted);

        tracing::info!(
            event_name = "turn.completed",
            conversation_id = %request.conversation_id.0,
            correlation_id = %correlation_id,
            intent = intent.as_str(),
            route = route.as_str(),
            turn_number,
            escalated,
            "turn completed"
        );

        Ok(TurnOutcome {
            conversation_id: request.conversation_id,
            turn_number,
            intent,
            route,
            response,
            escalated,
            ticket_id,
        })
    }

    /// Runs the routed handler; any failure or no-answer path re-routes to
    /// the escalation handler, once. Escalation itself is infallible by
    /// construction (it degrades internally).
    async fn dispatch(
        &self,
        route: Route,
        intent: Intent,
        request: &TurnRequest,
        state: &ConversationState,
        correlation_id: &str,
    ) -> (String, Option<EscalationOutcome>) {
        match route {
            Route::Resolver => match self.resolver.resolve(&request.text).await {
                ResolveOutcome::Answered { answer, article_id, confidence } => {
                    self.emit_handler_event(request, correlation_id, "resolver.answered", |event| {
                        event
                            .with_metadata("article_id", article_id.clone())
                            .with_metadata("confidence", format!("{confidence:.3}"))
                    });
                    (answer, None)
                }
                ResolveOutcome::NoAnswer { best_score, .. } => {
                    self.emit_handler_event(request, correlation_id, "resolver.no_answer", |event| {
                        event.with_metadata("best_score", format!("{best_score:.3}"))
                    });
                    let outcome = self
                        .escalate(
                            state,
                            request,
                            intent,
                            Some("knowledge lookup below confidence threshold".to_string()),
                            Some(best_score),
                        )
                        .await;
                    (outcome.message.clone(), Some(outcome))
                }
            },
            Route::Operations => {
                match self.ops.execute(intent, &request.text, state).await {
                    Ok(OpsOutcome::Completed { action, summary, .. }) => {
                        self.emit_handler_event(request, correlation_id, "ops.completed", |event| {
                            event.with_metadata("action", action.as_str())
                        });
                        (summary, None)
                    }
                    Ok(OpsOutcome::NoRecord { description }) => {
                        self.emit_handler_event(request, correlation_id, "ops.no_record", |event| {
                            event.with_metadata("description", description.clone())
                        });
                        let outcome = self
                            .escalate(state, request, intent, Some(description), None)
                            .await;
                        (outcome.message.clone(), Some(outcome))
                    }
                    Err(error) => {
                        tracing::error!(
                            event_name = "ops.handler_failed",
                            conversation_id = %request.conversation_id.0,
                            error = %error,
                            "operations handler failed; escalating"
                        );
                        let outcome = self
                            .escalate(
                                state,
                                request,
                                intent,
                                Some(format!("operations handler failed: {error}")),
                                None,
                            )
                            .await;
                        (outcome.message.clone(), Some(outcome))
                    }
                }
            }
            Route::Escalation => {
                let outcome = self.escalate(state, request, intent, None, None).await;
                (outcome.message.clone(), Some(outcome))
            }
        }
    }

    async fn escalate(
        &self,
        state: &ConversationState,
        request: &TurnRequest,
        intent: Intent,
        detail: Option<String>,
        last_confidence: Option<f64>,
    ) -> EscalationOutcome {
        self.escalation
            .escalate(
                state,
                &request.text,
                EscalationContext {
                    intent: Some(intent.as_str().to_string()),
                    detail,
                    last_confidence,
                },
            )
            .await
    }

    fn emit_handler_event(
        &self,
        request: &TurnRequest,
        correlation_id: &str,
        event_type: &str,
        decorate: impl FnOnce(AuditEvent) -> AuditEvent,
    ) {
        self.audit.emit(decorate(AuditEvent::new(
            Some(request.conversation_id.clone()),
            correlation_id,
            event_type,
            AuditCategory::Handler,
            "support-runtime",
            AuditOutcome::Success,
        )));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};

    use concierge_core::audit::InMemoryAuditSink;
    use concierge_core::config::EscalationConfig;
    use concierge_core::domain::conversation::ConversationId;
    use concierge_core::domain::intent::Intent;
    use concierge_core::domain::reservation::{Experience, ExperienceId};
    use concierge_core::domain::subscription::{Subscription, SubscriptionStatus};
    use concierge_core::domain::user::{UserId, UserProfile};
    use concierge_core::knowledge::{KnowledgeArticle, KnowledgeCorpus};
    use concierge_core::workflow::Route;
    use concierge_db::repositories::{
        ConversationRepository, InMemoryConversationRepository, InMemoryCrmRepository,
        InMemoryTicketRepository, TicketRepository,
    };

    use crate::classifier::IntentClassifier;
    use crate::escalation::EscalationHandler;
    use crate::llm::{FailingLlmClient, LlmClient, ScriptedLlmClient};
    use crate::ops::OperationsHandler;
    use crate::resolver::KnowledgeResolver;

    use super::{SupportRuntime, TurnRequest};

    struct Fixture {
        runtime: SupportRuntime,
        conversations: Arc<InMemoryConversationRepository>,
        tickets: Arc<InMemoryTicketRepository>,
    }

    async fn fixture(llm: Arc<dyn LlmClient>) -> Fixture {
        let crm = Arc::new(InMemoryCrmRepository::default());
        crm.insert_user(UserProfile {
            id: UserId("a4ab87".to_string()),
            full_name: "Avery Castillo".to_string(),
            email: "avery@example.com".to_string(),
            is_blocked: false,
        })
        .await;
        crm.insert_subscription(Subscription {
            user_id: UserId("a4ab87".to_string()),
            status: SubscriptionStatus::Active,
            tier: "basic".to_string(),
            monthly_quota: 3,
        })
        .await;
        crm.insert_experience(Experience {
            id: ExperienceId("exp-museum".to_string()),
            title: "Museum Night".to_string(),
            when: Utc::now() + Duration::days(7),
            slots_available: 5,
        })
        .await;

        let corpus = Arc::new(KnowledgeCorpus::from_articles(vec![KnowledgeArticle {
            id: "kb-reserve".to_string(),
            title: "How to reserve an event".to_string(),
            body: "Open the app, pick an experience, and confirm your reservation.".to_string(),
            tags: vec!["reservation".to_string()],
        }]));

        let conversations = Arc::new(InMemoryConversationRepository::default());
        let tickets = Arc::new(InMemoryTicketRepository::default());

        let runtime = SupportRuntime::new(
            IntentClassifier::new(llm.clone()),
            KnowledgeResolver::new(corpus, Arc::new(FailingLlmClient), 0.55, 3),
            OperationsHandler::new(
                crm.clone(),
                crm.clone(),
                crm.clone(),
                Arc::new(FailingLlmClient),
            ),
            EscalationHandler::new(
                tickets.clone(),
                Arc::new(FailingLlmClient),
                &EscalationConfig { endpoint: None, token: None, timeout_secs: 15 },
            )
            .expect("escalation handler"),
            conversations.clone(),
            Arc::new(InMemoryAuditSink::default()),
        );

        Fixture { runtime, conversations, tickets }
    }

    fn request(text: &str) -> TurnRequest {
        TurnRequest {
            conversation_id: ConversationId("conv-1".to_string()),
            user_id: "a4ab87".to_string(),
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn each_intent_routes_per_the_transition_table() {
        let cases = [
            ("login", Intent::Login, Route::Operations),
            ("subscription", Intent::Subscription, Route::Operations),
            ("reservation", Intent::Reservation, Route::Operations),
            ("knowledge", Intent::Knowledge, Route::Resolver),
            ("nonsense-label", Intent::Unknown, Route::Escalation),
        ];

        for (label, expected_intent, expected_route) in cases {
            let fixture = fixture(Arc::new(ScriptedLlmClient::new([label]))).await;
            let outcome = fixture
                .runtime
                .handle_message(request("how to reserve an event"))
                .await
                .expect("turn");
            assert_eq!(outcome.intent, expected_intent, "label {label}");
            assert_eq!(outcome.route, expected_route, "label {label}");
            assert!(!outcome.response.is_empty());
        }
    }

    #[tokio::test]
    async fn knowledge_answer_includes_the_article_body() {
        let fixture = fixture(Arc::new(ScriptedLlmClient::new(["knowledge"]))).await;
        let outcome = fixture
            .runtime
            .handle_message(request("how to reserve an event"))
            .await
            .expect("turn");

        assert!(!outcome.escalated);
        assert!(outcome.response.contains("confirm your reservation"));
    }

    #[tokio::test]
    async fn no_knowledge_match_escalates_with_handoff_message() {
        let fixture = fixture(Arc::new(ScriptedLlmClient::new(["knowledge"]))).await;
        let outcome = fixture
            .runtime
            .handle_message(request("asdfasdf random text"))
            .await
            .expect("turn");

        assert!(outcome.escalated);
        assert!(outcome.ticket_id.is_some());
        assert!(outcome.response.contains("escalated this to human support"));

        let ticket = fixture
            .tickets
            .find_for_conversation(&ConversationId("conv-1".to_string()))
            .await
            .expect("query")
            .expect("ticket created");
        assert_eq!(ticket.conversation_id.0, "conv-1");
    }

    #[tokio::test]
    async fn subscription_turn_reports_quota_fields() {
        let fixture = fixture(Arc::new(ScriptedLlmClient::new(["subscription"]))).await;
        let outcome =
            fixture.runtime.handle_message(request("subscription")).await.expect("turn");

        assert_eq!(outcome.route, Route::Operations);
        assert!(!outcome.escalated);
        assert!(outcome.response.contains("basic"));
        assert!(outcome.response.contains("3"));
        assert!(outcome.response.contains("remaining"));
    }

    #[tokio::test]
    async fn classifier_outage_degrades_to_escalation_not_error() {
        let fixture = fixture(Arc::new(FailingLlmClient)).await;
        let outcome = fixture.runtime.handle_message(request("anything")).await.expect("turn");

        assert_eq!(outcome.intent, Intent::Unknown);
        assert_eq!(outcome.route, Route::Escalation);
        assert!(!outcome.response.is_empty());
    }

    #[tokio::test]
    async fn missing_record_escalates_instead_of_answering() {
        // No subscription behind this user id: ops reports no record.
        let fixture = fixture(Arc::new(ScriptedLlmClient::new(["subscription"]))).await;
        let mut turn_request = request("subscription");
        turn_request.user_id = "stranger".to_string();
        turn_request.conversation_id = ConversationId("conv-2".to_string());

        let outcome = fixture.runtime.handle_message(turn_request).await.expect("turn");
        assert!(outcome.escalated);
        assert!(outcome.response.contains("escalated"));
    }

    #[tokio::test]
    async fn n_turns_append_in_arrival_order() {
        let fixture = fixture(Arc::new(ScriptedLlmClient::new(["knowledge"]))).await;
        for n in 1..=4u32 {
            let outcome = fixture
                .runtime
                .handle_message(request(&format!("how to reserve an event #{n}")))
                .await
                .expect("turn");
            assert_eq!(outcome.turn_number, n);
        }

        let state = fixture
            .conversations
            .find_by_id(&ConversationId("conv-1".to_string()))
            .await
            .expect("query")
            .expect("state persisted");
        assert_eq!(state.turns.len(), 4);
        for (index, turn) in state.turns.iter().enumerate() {
            assert_eq!(turn.turn_number as usize, index + 1);
            assert!(turn.user_text.ends_with(&format!("#{}", index + 1)));
        }
    }

    #[tokio::test]
    async fn every_turn_has_exactly_one_intent_and_one_response() {
        let fixture = fixture(Arc::new(ScriptedLlmClient::new(["subscription"]))).await;
        fixture.runtime.handle_message(request("subscription")).await.expect("turn");

        let state = fixture
            .conversations
            .find_by_id(&ConversationId("conv-1".to_string()))
            .await
            .expect("query")
            .expect("state persisted");
        assert_eq!(state.turns.len(), 1);
        assert_eq!(state.turns[0].intent, Intent::Subscription);
        assert!(!state.turns[0].response.is_empty());
    }

    #[tokio::test]
    async fn user_binding_is_set_on_first_turn_and_kept_afterwards() {
        let fixture = fixture(Arc::new(ScriptedLlmClient::new(["subscription"]))).await;
        fixture.runtime.handle_message(request("subscription")).await.expect("turn one");

        let mut second = request("subscription");
        second.user_id = "someone-else".to_string();
        fixture.runtime.handle_message(second).await.expect("turn two");

        let state = fixture
            .conversations
            .find_by_id(&ConversationId("conv-1".to_string()))
            .await
            .expect("query")
            .expect("state persisted");
        assert_eq!(state.scratch_value("user_id"), Some("a4ab87"));
    }
}
