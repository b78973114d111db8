use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use secrecy::ExposeSecret;
use serde_json::json;
use uuid::Uuid;

use concierge_core::config::EscalationConfig;
use concierge_core::domain::conversation::ConversationState;
use concierge_core::domain::ticket::{
    Ticket, TicketId, TicketMessage, TicketRole, TicketStatus,
};
use concierge_db::repositories::TicketRepository;

use crate::llm::LlmClient;

const REASON_SYSTEM: &str = "You are an escalation assistant. Given the user message and \
    context, produce a short clear reason for escalation. Respond with ONLY the reason \
    sentence.";

const FALLBACK_REASON: &str = "Escalation required due to low confidence or policy guardrail.";
const HANDOFF_MESSAGE: &str = "I've escalated this to human support.";
const APOLOGY_MESSAGE: &str = "I'm sorry, I can't complete this right now. \
    Please reach out to support directly.";

/// Why a conversation is being handed to a human; folded into the drafted
/// reason and the ticket trail.
#[derive(Clone, Debug, Default)]
pub struct EscalationContext {
    pub intent: Option<String>,
    pub detail: Option<String>,
    pub last_confidence: Option<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EscalationOutcome {
    pub message: String,
    pub ticket_id: Option<TicketId>,
    pub reason: String,
}

/// Creates or escalates the conversation's ticket and notifies the optional
/// external escalation endpoint. The outcome always carries a non-empty
/// user-facing message; an unreachable ticket store degrades to a fixed
/// apology with no ticket id, the terminal failure mode.
pub struct EscalationHandler {
    tickets: Arc<dyn TicketRepository>,
    llm: Arc<dyn LlmClient>,
    webhook: Option<EscalationWebhook>,
}

struct EscalationWebhook {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

impl EscalationHandler {
    pub fn new(
        tickets: Arc<dyn TicketRepository>,
        llm: Arc<dyn LlmClient>,
        config: &EscalationConfig,
    ) -> Result<Self> {
        let webhook = match &config.endpoint {
            Some(endpoint) => Some(EscalationWebhook {
                client: reqwest::Client::builder()
                    .timeout(Duration::from_secs(config.timeout_secs))
                    .build()
                    .context("building escalation http client")?,
                endpoint: endpoint.clone(),
                token: config.token.as_ref().map(|token| token.expose_secret().to_string()),
            }),
            None => None,
        };
        Ok(Self { tickets, llm, webhook })
    }

    pub async fn escalate(
        &self,
        state: &ConversationState,
        user_message: &str,
        context: EscalationContext,
    ) -> EscalationOutcome {
        let reason = self.draft_reason(user_message, &context).await;

        let ticket_id = match self.record_ticket(state, &reason, &context).await {
            Ok(ticket_id) => ticket_id,
            Err(error) => {
                tracing::error!(
                    event_name = "escalation.ticket_store_unavailable",
                    conversation_id = %state.id.0,
                    error = %error,
                    "could not record escalation ticket"
                );
                return EscalationOutcome {
                    message: APOLOGY_MESSAGE.to_string(),
                    ticket_id: None,
                    reason,
                };
            }
        };

        if let Some(webhook) = &self.webhook {
            webhook.notify(&ticket_id, &reason, &context).await;
        }

        EscalationOutcome {
            message: format!("{HANDOFF_MESSAGE} Your ticket id is {ticket_id}."),
            ticket_id: Some(ticket_id),
            reason,
        }
    }

    async fn draft_reason(&self, user_message: &str, context: &EscalationContext) -> String {
        let prompt = format!(
            "Message: {user_message}\nContext: {}\nConfidence: {}",
            json!({ "intent": context.intent, "detail": context.detail }),
            context
                .last_confidence
                .map(|confidence| format!("{confidence:.3}"))
                .unwrap_or_else(|| "none".to_string()),
        );

        match self.llm.complete(REASON_SYSTEM, &prompt).await {
            Ok(reason) if !reason.trim().is_empty() => reason.trim().to_string(),
            Ok(_) | Err(_) => FALLBACK_REASON.to_string(),
        }
    }

    async fn record_ticket(
        &self,
        state: &ConversationState,
        reason: &str,
        context: &EscalationContext,
    ) -> Result<TicketId> {
        let now = Utc::now();
        let mut ticket = match self.tickets.find_for_conversation(&state.id).await? {
            Some(existing) => existing,
            None => Ticket {
                id: TicketId(Uuid::new_v4().to_string()),
                conversation_id: state.id.clone(),
                status: TicketStatus::Open,
                created_at: now,
                updated_at: now,
            },
        };
        ticket.status = TicketStatus::Escalated;
        ticket.updated_at = now;
        let ticket_id = ticket.id.clone();
        self.tickets.save(ticket).await?;

        let confidence_note = context
            .last_confidence
            .map(|confidence| format!("{confidence:.3}"))
            .unwrap_or_else(|| "none".to_string());
        self.tickets
            .append_message(TicketMessage {
                message_id: Uuid::new_v4().to_string(),
                ticket_id: ticket_id.clone(),
                role: TicketRole::System,
                content: format!("Escalated: {reason}. Confidence={confidence_note}"),
                created_at: now,
            })
            .await?;

        Ok(ticket_id)
    }
}

impl EscalationWebhook {
    /// Best effort: a failed webhook is logged and the handoff proceeds.
    async fn notify(&self, ticket_id: &TicketId, reason: &str, context: &EscalationContext) {
        let body = json!({
            "ticket_id": ticket_id.0,
            "reason": reason,
            "payload": {
                "intent": context.intent,
                "detail": context.detail,
                "last_confidence": context.last_confidence,
            },
        });

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        match request.send().await {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => {
                tracing::warn!(
                    event_name = "escalation.webhook_rejected",
                    status = %response.status(),
                    "external escalation endpoint rejected the handoff"
                );
            }
            Err(error) => {
                tracing::warn!(
                    event_name = "escalation.webhook_failed",
                    error = %error,
                    "external escalation endpoint unreachable"
                );
            }
        }
    }
}
