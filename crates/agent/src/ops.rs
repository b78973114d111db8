use std::sync::Arc;

use chrono::{DateTime, Datelike, Utc};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use concierge_core::domain::conversation::ConversationState;
use concierge_core::domain::intent::Intent;
use concierge_core::domain::reservation::{
    ExperienceId, Reservation, ReservationId, ReservationStatus,
};
use concierge_core::domain::subscription::{SubscriptionStatus, SubscriptionSummary};
use concierge_core::domain::user::UserId;
use concierge_db::repositories::{
    RepositoryError, ReservationRepository, SubscriptionRepository, UserRepository,
};

use crate::llm::LlmClient;

const SELECTOR_SYSTEM: &str = "You are a tool selector for support operations. Given the user \
    message and context, choose one action from: get_user_profile, get_subscription_status, \
    list_reservations, reserve_experience, cancel_reservation. Respond ONLY as JSON with keys: \
    action, args.";

/// Database-backed handler for login, subscription, and reservation intents.
pub struct OperationsHandler {
    users: Arc<dyn UserRepository>,
    subscriptions: Arc<dyn SubscriptionRepository>,
    reservations: Arc<dyn ReservationRepository>,
    llm: Arc<dyn LlmClient>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpsAction {
    GetUserProfile,
    GetSubscriptionStatus,
    ListReservations,
    ReserveExperience,
    CancelReservation,
}

impl OpsAction {
    fn parse(label: &str) -> Option<Self> {
        match label {
            "get_user_profile" => Some(Self::GetUserProfile),
            "get_subscription_status" => Some(Self::GetSubscriptionStatus),
            "list_reservations" => Some(Self::ListReservations),
            "reserve_experience" => Some(Self::ReserveExperience),
            "cancel_reservation" => Some(Self::CancelReservation),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GetUserProfile => "get_user_profile",
            Self::GetSubscriptionStatus => "get_subscription_status",
            Self::ListReservations => "list_reservations",
            Self::ReserveExperience => "reserve_experience",
            Self::CancelReservation => "cancel_reservation",
        }
    }
}

/// What a dispatched operation came back with. `NoRecord` is the router's cue
/// to escalate; a `Completed` refusal (blocked account, exhausted quota) is a
/// final answer, not an escalation.
#[derive(Clone, Debug, PartialEq)]
pub enum OpsOutcome {
    Completed { action: OpsAction, summary: String, data: serde_json::Value },
    NoRecord { description: String },
}

#[derive(Clone, Debug, Default, Deserialize)]
struct SelectedAction {
    action: String,
    #[serde(default)]
    args: SelectedArgs,
}

#[derive(Clone, Debug, Default, Deserialize)]
struct SelectedArgs {
    experience_id: Option<String>,
    reservation_id: Option<String>,
    upcoming_only: Option<bool>,
}

impl OperationsHandler {
    pub fn new(
        users: Arc<dyn UserRepository>,
        subscriptions: Arc<dyn SubscriptionRepository>,
        reservations: Arc<dyn ReservationRepository>,
        llm: Arc<dyn LlmClient>,
    ) -> Self {
        Self { users, subscriptions, reservations, llm }
    }

    pub async fn execute(
        &self,
        intent: Intent,
        text: &str,
        state: &ConversationState,
    ) -> Result<OpsOutcome, RepositoryError> {
        let Some(user_id) = state.scratch_value("user_id").map(|id| UserId(id.to_string()))
        else {
            return Ok(OpsOutcome::NoRecord {
                description: "no user bound to this conversation".to_string(),
            });
        };

        let (action, args) = self.select_action(intent, text, state).await;
        tracing::debug!(
            event_name = "ops.action_selected",
            action = action.as_str(),
            intent = intent.as_str(),
            "operations action selected"
        );

        match action {
            OpsAction::GetUserProfile => self.user_profile(&user_id).await,
            OpsAction::GetSubscriptionStatus => self.subscription_status(&user_id).await,
            OpsAction::ListReservations => {
                self.list_reservations(&user_id, args.upcoming_only.unwrap_or(true)).await
            }
            OpsAction::ReserveExperience => {
                let experience_id = args
                    .experience_id
                    .or_else(|| state.scratch_value("experience_id").map(str::to_string));
                self.reserve(&user_id, experience_id).await
            }
            OpsAction::CancelReservation => {
                let reservation_id = args
                    .reservation_id
                    .or_else(|| state.scratch_value("reservation_id").map(str::to_string));
                self.cancel(&user_id, reservation_id).await
            }
        }
    }

    /// LLM-assisted selection with a deterministic intent-derived fallback.
    /// The model only picks *which* lookup runs; it never shapes the data.
    async fn select_action(
        &self,
        intent: Intent,
        text: &str,
        state: &ConversationState,
    ) -> (OpsAction, SelectedArgs) {
        let context = json!({
            "intent": intent.as_str(),
            "experience_id": state.scratch_value("experience_id"),
            "reservation_id": state.scratch_value("reservation_id"),
        });
        let prompt = format!("User message: {text}\nContext: {context}");

        match self.llm.complete(SELECTOR_SYSTEM, &prompt).await {
            Ok(reply) => match serde_json::from_str::<SelectedAction>(reply.trim()) {
                Ok(selected) => {
                    if let Some(action) = OpsAction::parse(&selected.action) {
                        return (action, selected.args);
                    }
                    tracing::warn!(
                        event_name = "ops.bad_action",
                        action = %selected.action,
                        "selector picked an unknown action; using fallback"
                    );
                }
                Err(error) => {
                    tracing::warn!(
                        event_name = "ops.unparseable_selection",
                        error = %error,
                        "selector reply was not valid JSON; using fallback"
                    );
                }
            },
            Err(error) => {
                tracing::warn!(
                    event_name = "ops.selector_failed",
                    error = %error,
                    "selector call failed; using fallback"
                );
            }
        }

        (fallback_action(intent, text), SelectedArgs::default())
    }

    async fn user_profile(&self, user_id: &UserId) -> Result<OpsOutcome, RepositoryError> {
        let Some(profile) = self.users.find_by_id(user_id).await? else {
            return Ok(OpsOutcome::NoRecord {
                description: format!("user {} not found", user_id.0),
            });
        };

        let summary = if profile.is_blocked {
            format!(
                "Account {} ({}) is currently blocked. Contact support to restore access.",
                profile.full_name, profile.email
            )
        } else {
            format!("Account {} ({}) is in good standing.", profile.full_name, profile.email)
        };

        Ok(OpsOutcome::Completed {
            action: OpsAction::GetUserProfile,
            summary,
            data: json!({
                "user_id": profile.id.0,
                "full_name": profile.full_name,
                "email": profile.email,
                "is_blocked": profile.is_blocked,
            }),
        })
    }

    async fn subscription_status(&self, user_id: &UserId) -> Result<OpsOutcome, RepositoryError> {
        let Some(subscription) = self.subscriptions.find_for_user(user_id).await? else {
            return Ok(OpsOutcome::NoRecord {
                description: format!("no subscription for user {}", user_id.0),
            });
        };

        let used = self
            .reservations
            .count_reserved_since(user_id, start_of_month(Utc::now()))
            .await?;
        let summary_record = SubscriptionSummary::derive(&subscription, used);

        let summary = format!(
            "Your {} subscription is {}. Monthly quota {}, used {}, {} remaining.",
            summary_record.tier,
            summary_record.status,
            summary_record.monthly_quota,
            summary_record.used_this_month,
            summary_record.remaining_quota,
        );

        Ok(OpsOutcome::Completed {
            action: OpsAction::GetSubscriptionStatus,
            summary,
            data: json!({
                "status": summary_record.status.as_str(),
                "tier": summary_record.tier,
                "monthly_quota": summary_record.monthly_quota,
                "used_this_month": summary_record.used_this_month,
                "remaining_quota": summary_record.remaining_quota,
            }),
        })
    }

    async fn list_reservations(
        &self,
        user_id: &UserId,
        upcoming_only: bool,
    ) -> Result<OpsOutcome, RepositoryError> {
        let listings = self.reservations.list_for_user(user_id, upcoming_only).await?;

        let summary = if listings.is_empty() {
            "You have no upcoming reservations.".to_string()
        } else {
            let lines = listings
                .iter()
                .map(|listing| {
                    format!(
                        "{} on {} ({})",
                        listing.title,
                        listing.when.format("%Y-%m-%d %H:%M"),
                        listing.status.as_str()
                    )
                })
                .collect::<Vec<_>>()
                .join("; ");
            format!("Your reservations: {lines}.")
        };

        let data = json!({
            "reservations": listings
                .iter()
                .map(|listing| {
                    json!({
                        "reservation_id": listing.reservation_id.0,
                        "experience_id": listing.experience_id.0,
                        "title": listing.title,
                        "when": listing.when.to_rfc3339(),
                        "status": listing.status.as_str(),
                    })
                })
                .collect::<Vec<_>>(),
        });

        Ok(OpsOutcome::Completed { action: OpsAction::ListReservations, summary, data })
    }

    async fn reserve(
        &self,
        user_id: &UserId,
        experience_id: Option<String>,
    ) -> Result<OpsOutcome, RepositoryError> {
        let Some(experience_id) = experience_id.map(ExperienceId) else {
            return Ok(OpsOutcome::NoRecord {
                description: "no experience referenced for the reservation request".to_string(),
            });
        };

        let Some(profile) = self.users.find_by_id(user_id).await? else {
            return Ok(OpsOutcome::NoRecord {
                description: format!("user {} not found", user_id.0),
            });
        };
        if profile.is_blocked {
            return Ok(completed_refusal(
                OpsAction::ReserveExperience,
                "Your account is blocked, so new reservations are not possible right now.",
            ));
        }

        let Some(subscription) = self.subscriptions.find_for_user(user_id).await? else {
            return Ok(OpsOutcome::NoRecord {
                description: format!("no subscription for user {}", user_id.0),
            });
        };
        if subscription.status != SubscriptionStatus::Active {
            return Ok(completed_refusal(
                OpsAction::ReserveExperience,
                "Your subscription is not active, so new reservations are not possible.",
            ));
        }

        let used = self
            .reservations
            .count_reserved_since(user_id, start_of_month(Utc::now()))
            .await?;
        if SubscriptionSummary::derive(&subscription, used).remaining_quota == 0 {
            return Ok(completed_refusal(
                OpsAction::ReserveExperience,
                "Your monthly reservation quota is exhausted.",
            ));
        }

        let Some(experience) = self.reservations.find_experience(&experience_id).await? else {
            return Ok(OpsOutcome::NoRecord {
                description: format!("experience {} not found", experience_id.0),
            });
        };
        if experience.slots_available == 0 {
            return Ok(completed_refusal(
                OpsAction::ReserveExperience,
                "That experience has no slots left.",
            ));
        }

        let reservation = Reservation {
            id: ReservationId(short_id()),
            user_id: user_id.clone(),
            experience_id: experience.id.clone(),
            status: ReservationStatus::Reserved,
            created_at: Utc::now(),
        };
        match self.reservations.reserve(reservation.clone()).await {
            Ok(()) => Ok(OpsOutcome::Completed {
                action: OpsAction::ReserveExperience,
                summary: format!(
                    "Reserved {} for {}. Your reservation id is {}.",
                    experience.title,
                    experience.when.format("%Y-%m-%d %H:%M"),
                    reservation.id
                ),
                data: json!({
                    "reservation_id": reservation.id.0,
                    "experience_id": experience.id.0,
                }),
            }),
            // Lost the race for the last slot between the check and the
            // insert; same answer as finding the experience full.
            Err(RepositoryError::Conflict(_)) => Ok(completed_refusal(
                OpsAction::ReserveExperience,
                "That experience has no slots left.",
            )),
            Err(error) => Err(error),
        }
    }

    async fn cancel(
        &self,
        user_id: &UserId,
        reservation_id: Option<String>,
    ) -> Result<OpsOutcome, RepositoryError> {
        let Some(reservation_id) = reservation_id.map(ReservationId) else {
            return Ok(OpsOutcome::NoRecord {
                description: "no reservation referenced for the cancel request".to_string(),
            });
        };

        match self.reservations.cancel(&reservation_id, user_id).await? {
            Some(cancelled) => Ok(OpsOutcome::Completed {
                action: OpsAction::CancelReservation,
                summary: format!("Reservation {} is cancelled.", cancelled.id),
                data: json!({
                    "reservation_id": cancelled.id.0,
                    "status": cancelled.status.as_str(),
                }),
            }),
            None => Ok(OpsOutcome::NoRecord {
                description: format!("no active reservation {}", reservation_id.0),
            }),
        }
    }
}

fn short_id() -> String {
    let id = Uuid::new_v4().simple().to_string();
    id[..6].to_string()
}

fn completed_refusal(action: OpsAction, summary: &str) -> OpsOutcome {
    OpsOutcome::Completed {
        action,
        summary: summary.to_string(),
        data: json!({ "refused": true }),
    }
}

fn fallback_action(intent: Intent, text: &str) -> OpsAction {
    let lowered = text.to_ascii_lowercase();
    match intent {
        Intent::Login => OpsAction::GetUserProfile,
        Intent::Subscription => OpsAction::GetSubscriptionStatus,
        Intent::Reservation => {
            if lowered.contains("cancel") {
                OpsAction::CancelReservation
            } else if lowered.contains("reserve") || lowered.contains("book") {
                OpsAction::ReserveExperience
            } else {
                OpsAction::ListReservations
            }
        }
        // Routed here only through an explicit selector choice; default to
        // the safest read.
        Intent::Knowledge | Intent::Unknown => OpsAction::GetUserProfile,
    }
}

fn start_of_month(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .with_day(1)
        .expect("day 1 exists in every month")
        .and_hms_opt(0, 0, 0)
        .expect("midnight exists")
        .and_utc()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};

    use concierge_core::domain::conversation::{ConversationId, ConversationState};
    use concierge_core::domain::intent::Intent;
    use concierge_core::domain::reservation::{
        Experience, ExperienceId, Reservation, ReservationId, ReservationStatus,
    };
    use concierge_core::domain::subscription::{Subscription, SubscriptionStatus};
    use concierge_core::domain::user::{UserId, UserProfile};
    use concierge_db::repositories::InMemoryCrmRepository;

    use crate::llm::{FailingLlmClient, LlmClient, ScriptedLlmClient};

    use super::{start_of_month, OperationsHandler, OpsAction, OpsOutcome};

    async fn crm() -> Arc<InMemoryCrmRepository> {
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
            slots_available: 2,
        })
        .await;
        crm.insert_reservation(Reservation {
            id: ReservationId("res-0001".to_string()),
            user_id: UserId("a4ab87".to_string()),
            experience_id: ExperienceId("exp-museum".to_string()),
            status: ReservationStatus::Reserved,
            created_at: Utc::now(),
        })
        .await;
        crm
    }

    fn handler(crm: Arc<InMemoryCrmRepository>, llm: Arc<dyn LlmClient>) -> OperationsHandler {
        OperationsHandler::new(crm.clone(), crm.clone(), crm, llm)
    }

    fn conversation() -> ConversationState {
        let mut state = ConversationState::new(ConversationId("conv-1".to_string()));
        state.set_scratch("user_id", "a4ab87");
        state
    }

    #[tokio::test]
    async fn subscription_status_matches_quota_accounting() {
        let handler = handler(crm().await, Arc::new(FailingLlmClient));

        let outcome = handler
            .execute(Intent::Subscription, "subscription", &conversation())
            .await
            .expect("execute");

        match outcome {
            OpsOutcome::Completed { action, summary, data } => {
                assert_eq!(action, OpsAction::GetSubscriptionStatus);
                assert!(summary.contains("basic"));
                assert_eq!(data["status"], "active");
                assert_eq!(data["tier"], "basic");
                assert_eq!(data["monthly_quota"], 3);
                assert_eq!(data["used_this_month"], 1);
                assert_eq!(data["remaining_quota"], 2);
            }
            other => panic!("expected completion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn selector_json_overrides_the_fallback() {
        let handler = handler(
            crm().await,
            Arc::new(ScriptedLlmClient::new([
                r#"{"action": "list_reservations", "args": {"upcoming_only": true}}"#,
            ])),
        );

        let outcome = handler
            .execute(Intent::Subscription, "what's booked for me?", &conversation())
            .await
            .expect("execute");

        match outcome {
            OpsOutcome::Completed { action, summary, .. } => {
                assert_eq!(action, OpsAction::ListReservations);
                assert!(summary.contains("Museum Night"));
            }
            other => panic!("expected completion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn selector_garbage_falls_back_to_intent_defaults() {
        let handler = handler(
            crm().await,
            Arc::new(ScriptedLlmClient::new(["this is not json at all"])),
        );

        let outcome = handler
            .execute(Intent::Login, "who am i", &conversation())
            .await
            .expect("execute");

        match outcome {
            OpsOutcome::Completed { action, data, .. } => {
                assert_eq!(action, OpsAction::GetUserProfile);
                assert_eq!(data["full_name"], "Avery Castillo");
            }
            other => panic!("expected completion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_subscription_reports_no_record() {
        let crm = Arc::new(InMemoryCrmRepository::default());
        crm.insert_user(UserProfile {
            id: UserId("a4ab87".to_string()),
            full_name: "Avery Castillo".to_string(),
            email: "avery@example.com".to_string(),
            is_blocked: false,
        })
        .await;
        let handler = handler(crm, Arc::new(FailingLlmClient));

        let outcome = handler
            .execute(Intent::Subscription, "subscription", &conversation())
            .await
            .expect("execute");
        assert!(matches!(outcome, OpsOutcome::NoRecord { .. }));
    }

    #[tokio::test]
    async fn unbound_conversation_reports_no_record() {
        let handler = handler(crm().await, Arc::new(FailingLlmClient));
        let state = ConversationState::new(ConversationId("conv-x".to_string()));

        let outcome =
            handler.execute(Intent::Subscription, "subscription", &state).await.expect("execute");
        assert!(matches!(outcome, OpsOutcome::NoRecord { .. }));
    }

    #[tokio::test]
    async fn reserve_happy_path_consumes_a_slot() {
        let crm = crm().await;
        let handler = handler(crm.clone(), Arc::new(FailingLlmClient));
        let mut state = conversation();
        state.set_scratch("experience_id", "exp-museum");

        let outcome = handler
            .execute(Intent::Reservation, "please reserve a spot", &state)
            .await
            .expect("execute");

        match outcome {
            OpsOutcome::Completed { action, data, .. } => {
                assert_eq!(action, OpsAction::ReserveExperience);
                assert_eq!(data["experience_id"], "exp-museum");
            }
            other => panic!("expected completion, got {other:?}"),
        }

        use concierge_db::repositories::ReservationRepository;
        let experience = crm
            .find_experience(&ExperienceId("exp-museum".to_string()))
            .await
            .expect("query")
            .expect("present");
        assert_eq!(experience.slots_available, 1);
    }

    #[tokio::test]
    async fn reserve_is_refused_when_quota_is_exhausted() {
        let crm = crm().await;
        crm.insert_subscription(Subscription {
            user_id: UserId("a4ab87".to_string()),
            status: SubscriptionStatus::Active,
            tier: "basic".to_string(),
            monthly_quota: 1,
        })
        .await;
        let handler = handler(crm, Arc::new(FailingLlmClient));
        let mut state = conversation();
        state.set_scratch("experience_id", "exp-museum");

        let outcome = handler
            .execute(Intent::Reservation, "book it", &state)
            .await
            .expect("execute");

        match outcome {
            OpsOutcome::Completed { summary, data, .. } => {
                assert!(summary.contains("quota"));
                assert_eq!(data["refused"], true);
            }
            other => panic!("expected refusal, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancel_unknown_reservation_reports_no_record() {
        let handler = handler(crm().await, Arc::new(FailingLlmClient));
        let mut state = conversation();
        state.set_scratch("reservation_id", "res-missing");

        let outcome = handler
            .execute(Intent::Reservation, "cancel my reservation", &state)
            .await
            .expect("execute");
        assert!(matches!(outcome, OpsOutcome::NoRecord { .. }));
    }

    #[tokio::test]
    async fn cancel_returns_the_slot() {
        let crm = crm().await;
        let handler = handler(crm.clone(), Arc::new(FailingLlmClient));
        let mut state = conversation();
        state.set_scratch("reservation_id", "res-0001");

        let outcome = handler
            .execute(Intent::Reservation, "cancel my reservation", &state)
            .await
            .expect("execute");

        match outcome {
            OpsOutcome::Completed { action, data, .. } => {
                assert_eq!(action, OpsAction::CancelReservation);
                assert_eq!(data["status"], "cancelled");
            }
            other => panic!("expected completion, got {other:?}"),
        }

        use concierge_db::repositories::ReservationRepository;
        let experience = crm
            .find_experience(&ExperienceId("exp-museum".to_string()))
            .await
            .expect("query")
            .expect("present");
        assert_eq!(experience.slots_available, 3);
    }

    #[test]
    fn start_of_month_is_day_one_midnight() {
        let now = "2026-08-07T15:30:00Z".parse().expect("timestamp");
        let start = start_of_month(now);
        assert_eq!(start.to_rfc3339(), "2026-08-01T00:00:00+00:00");
    }
}
