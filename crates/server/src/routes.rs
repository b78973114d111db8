use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use concierge_agent::runtime::{SupportRuntime, TurnRequest};
use concierge_core::domain::conversation::ConversationId;
use concierge_core::errors::ApplicationError;
use concierge_db::repositories::ConversationRepository;

#[derive(Clone)]
pub struct ApiState {
    pub runtime: Arc<SupportRuntime>,
    pub conversations: Arc<dyn ConversationRepository>,
}

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub user_id: String,
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub conversation_id: String,
    pub turn_number: u32,
    pub intent: String,
    pub route: String,
    pub response: String,
    pub escalated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TurnView {
    pub turn_number: u32,
    pub user_text: String,
    pub intent: String,
    pub response: String,
    pub occurred_at: String,
}

#[derive(Debug, Serialize)]
pub struct ConversationView {
    pub conversation_id: String,
    pub turns: Vec<TurnView>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub correlation_id: String,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/conversations/{id}/messages", post(post_message))
        .route("/api/conversations/{id}", get(get_conversation))
        .with_state(state)
}

async fn post_message(
    State(state): State<ApiState>,
    Path(conversation_id): Path<String>,
    Json(body): Json<MessageRequest>,
) -> Result<Json<MessageResponse>, (StatusCode, Json<ErrorResponse>)> {
    let correlation_id = Uuid::new_v4().to_string();
    if body.text.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "message text must not be empty".to_string(),
                correlation_id,
            }),
        ));
    }
    if body.user_id.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "user_id must not be empty".to_string(),
                correlation_id,
            }),
        ));
    }

    let outcome = state
        .runtime
        .handle_message(TurnRequest {
            conversation_id: ConversationId(conversation_id),
            user_id: body.user_id,
            text: body.text,
        })
        .await
        .map_err(|error| {
            tracing::error!(
                event_name = "api.turn_failed",
                correlation_id = %correlation_id,
                error = %error,
                "turn processing failed"
            );
            let interface = ApplicationError::Persistence(error.to_string())
                .into_interface(correlation_id.clone());
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse {
                    error: interface.user_message().to_string(),
                    correlation_id: correlation_id.clone(),
                }),
            )
        })?;

    Ok(Json(MessageResponse {
        conversation_id: outcome.conversation_id.0,
        turn_number: outcome.turn_number,
        intent: outcome.intent.as_str().to_string(),
        route: outcome.route.as_str().to_string(),
        response: outcome.response,
        escalated: outcome.escalated,
        ticket_id: outcome.ticket_id.map(|ticket_id| ticket_id.0),
    }))
}

async fn get_conversation(
    State(state): State<ApiState>,
    Path(conversation_id): Path<String>,
) -> Result<Json<ConversationView>, (StatusCode, Json<ErrorResponse>)> {
    let correlation_id = Uuid::new_v4().to_string();
    let found = state
        .conversations
        .find_by_id(&ConversationId(conversation_id.clone()))
        .await
        .map_err(|error| {
            tracing::error!(
                event_name = "api.conversation_load_failed",
                correlation_id = %correlation_id,
                error = %error,
                "conversation lookup failed"
            );
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse {
                    error: "The service is temporarily unavailable. Please retry shortly."
                        .to_string(),
                    correlation_id: correlation_id.clone(),
                }),
            )
        })?;

    let Some(conversation) = found else {
        return Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("conversation {conversation_id} not found"),
                correlation_id,
            }),
        ));
    };

    Ok(Json(ConversationView {
        conversation_id: conversation.id.0,
        turns: conversation
            .turns
            .into_iter()
            .map(|turn| TurnView {
                turn_number: turn.turn_number,
                user_text: turn.user_text,
                intent: turn.intent.as_str().to_string(),
                response: turn.response,
                occurred_at: turn.occurred_at.to_rfc3339(),
            })
            .collect(),
    }))
}
