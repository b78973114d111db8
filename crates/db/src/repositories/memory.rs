use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use concierge_core::domain::conversation::{ConversationId, ConversationState};
use concierge_core::domain::reservation::{
    Experience, ExperienceId, Reservation, ReservationId, ReservationListing, ReservationStatus,
};
use concierge_core::domain::subscription::Subscription;
use concierge_core::domain::ticket::{Ticket, TicketId, TicketMessage};
use concierge_core::domain::user::{UserId, UserProfile};

use super::{
    ConversationRepository, RepositoryError, ReservationRepository, SubscriptionRepository,
    TicketRepository, UserRepository,
};

#[derive(Default)]
pub struct InMemoryConversationRepository {
    conversations: RwLock<HashMap<String, ConversationState>>,
}

#[async_trait::async_trait]
impl ConversationRepository for InMemoryConversationRepository {
    async fn find_by_id(
        &self,
        id: &ConversationId,
    ) -> Result<Option<ConversationState>, RepositoryError> {
        let conversations = self.conversations.read().await;
        Ok(conversations.get(&id.0).cloned())
    }

    async fn save(&self, state: &ConversationState) -> Result<(), RepositoryError> {
        let mut conversations = self.conversations.write().await;
        conversations.insert(state.id.0.clone(), state.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryTicketRepository {
    tickets: RwLock<HashMap<String, Ticket>>,
    messages: RwLock<Vec<TicketMessage>>,
}

#[async_trait::async_trait]
impl TicketRepository for InMemoryTicketRepository {
    async fn find_for_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Option<Ticket>, RepositoryError> {
        let tickets = self.tickets.read().await;
        Ok(tickets.values().find(|ticket| ticket.conversation_id == *conversation_id).cloned())
    }

    async fn save(&self, ticket: Ticket) -> Result<(), RepositoryError> {
        let mut tickets = self.tickets.write().await;
        tickets.insert(ticket.id.0.clone(), ticket);
        Ok(())
    }

    async fn append_message(&self, message: TicketMessage) -> Result<(), RepositoryError> {
        let mut messages = self.messages.write().await;
        messages.push(message);
        Ok(())
    }

    async fn list_messages(
        &self,
        ticket_id: &TicketId,
    ) -> Result<Vec<TicketMessage>, RepositoryError> {
        let messages = self.messages.read().await;
        Ok(messages.iter().filter(|message| message.ticket_id == *ticket_id).cloned().collect())
    }
}

/// One fake for the whole crm store; agent tests wire it in for all three
/// repository seams at once.
#[derive(Default)]
pub struct InMemoryCrmRepository {
    users: RwLock<HashMap<String, UserProfile>>,
    subscriptions: RwLock<HashMap<String, Subscription>>,
    experiences: RwLock<HashMap<String, Experience>>,
    reservations: RwLock<HashMap<String, Reservation>>,
}

impl InMemoryCrmRepository {
    pub async fn insert_user(&self, user: UserProfile) {
        self.users.write().await.insert(user.id.0.clone(), user);
    }

    pub async fn insert_subscription(&self, subscription: Subscription) {
        self.subscriptions
            .write()
            .await
            .insert(subscription.user_id.0.clone(), subscription);
    }

    pub async fn insert_experience(&self, experience: Experience) {
        self.experiences.write().await.insert(experience.id.0.clone(), experience);
    }

    pub async fn insert_reservation(&self, reservation: Reservation) {
        self.reservations.write().await.insert(reservation.id.0.clone(), reservation);
    }
}

#[async_trait::async_trait]
impl UserRepository for InMemoryCrmRepository {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<UserProfile>, RepositoryError> {
        let users = self.users.read().await;
        Ok(users.get(&id.0).cloned())
    }
}

#[async_trait::async_trait]
impl SubscriptionRepository for InMemoryCrmRepository {
    async fn find_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<Subscription>, RepositoryError> {
        let subscriptions = self.subscriptions.read().await;
        Ok(subscriptions.get(&user_id.0).cloned())
    }
}

#[async_trait::async_trait]
impl ReservationRepository for InMemoryCrmRepository {
    async fn list_for_user(
        &self,
        user_id: &UserId,
        upcoming_only: bool,
    ) -> Result<Vec<ReservationListing>, RepositoryError> {
        let reservations = self.reservations.read().await;
        let experiences = self.experiences.read().await;
        let now = Utc::now();

        let mut listings: Vec<ReservationListing> = reservations
            .values()
            .filter(|reservation| reservation.user_id == *user_id)
            .filter_map(|reservation| {
                let experience = experiences.get(&reservation.experience_id.0)?;
                if upcoming_only && experience.when < now {
                    return None;
                }
                Some(ReservationListing {
                    reservation_id: reservation.id.clone(),
                    experience_id: experience.id.clone(),
                    title: experience.title.clone(),
                    when: experience.when,
                    status: reservation.status,
                })
            })
            .collect();
        listings.sort_by_key(|listing| listing.when);
        Ok(listings)
    }

    async fn count_reserved_since(
        &self,
        user_id: &UserId,
        since: DateTime<Utc>,
    ) -> Result<u32, RepositoryError> {
        let reservations = self.reservations.read().await;
        Ok(reservations
            .values()
            .filter(|reservation| {
                reservation.user_id == *user_id
                    && reservation.status == ReservationStatus::Reserved
                    && reservation.created_at >= since
            })
            .count() as u32)
    }

    async fn find_experience(
        &self,
        id: &ExperienceId,
    ) -> Result<Option<Experience>, RepositoryError> {
        let experiences = self.experiences.read().await;
        Ok(experiences.get(&id.0).cloned())
    }

    async fn find_by_id(
        &self,
        id: &ReservationId,
    ) -> Result<Option<Reservation>, RepositoryError> {
        let reservations = self.reservations.read().await;
        Ok(reservations.get(&id.0).cloned())
    }

    async fn reserve(&self, reservation: Reservation) -> Result<(), RepositoryError> {
        let mut experiences = self.experiences.write().await;
        let experience = experiences
            .get_mut(&reservation.experience_id.0)
            .ok_or_else(|| RepositoryError::Decode("experience not found".to_string()))?;
        if experience.slots_available == 0 {
            return Err(RepositoryError::Conflict(format!(
                "no slots available for experience {}",
                experience.id.0
            )));
        }
        experience.slots_available -= 1;

        let mut reservations = self.reservations.write().await;
        reservations.insert(reservation.id.0.clone(), reservation);
        Ok(())
    }

    async fn cancel(
        &self,
        id: &ReservationId,
        user_id: &UserId,
    ) -> Result<Option<Reservation>, RepositoryError> {
        let mut reservations = self.reservations.write().await;
        let Some(reservation) = reservations.get_mut(&id.0) else {
            return Ok(None);
        };
        if reservation.user_id != *user_id || reservation.status != ReservationStatus::Reserved {
            return Ok(None);
        }
        reservation.status = ReservationStatus::Cancelled;
        let cancelled = reservation.clone();

        let mut experiences = self.experiences.write().await;
        if let Some(experience) = experiences.get_mut(&cancelled.experience_id.0) {
            experience.slots_available += 1;
        }
        Ok(Some(cancelled))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use concierge_core::domain::conversation::{ConversationId, ConversationState};
    use concierge_core::domain::intent::Intent;
    use concierge_core::domain::reservation::{
        Experience, ExperienceId, Reservation, ReservationId, ReservationStatus,
    };
    use concierge_core::domain::user::UserId;

    use crate::repositories::{
        ConversationRepository, InMemoryConversationRepository, InMemoryCrmRepository,
        RepositoryError, ReservationRepository,
    };

    #[tokio::test]
    async fn in_memory_conversation_repo_round_trip() {
        let repo = InMemoryConversationRepository::default();
        let mut state = ConversationState::new(ConversationId("conv-1".to_string()));
        state.record_turn("hi", Intent::Knowledge, "hello").expect("turn");

        repo.save(&state).await.expect("save");
        let found = repo.find_by_id(&state.id).await.expect("find");
        assert_eq!(found, Some(state));
    }

    #[tokio::test]
    async fn in_memory_reserve_honors_slot_count() {
        let repo = InMemoryCrmRepository::default();
        repo.insert_experience(Experience {
            id: ExperienceId("exp-1".to_string()),
            title: "Gallery Tour".to_string(),
            when: Utc::now() + Duration::days(3),
            slots_available: 1,
        })
        .await;

        let reservation = |id: &str| Reservation {
            id: ReservationId(id.to_string()),
            user_id: UserId("u-1".to_string()),
            experience_id: ExperienceId("exp-1".to_string()),
            status: ReservationStatus::Reserved,
            created_at: Utc::now(),
        };

        repo.reserve(reservation("r-1")).await.expect("reserve");
        let error = repo.reserve(reservation("r-2")).await.expect_err("exhausted");
        assert!(matches!(error, RepositoryError::Conflict(_)));

        repo.cancel(&ReservationId("r-1".to_string()), &UserId("u-1".to_string()))
            .await
            .expect("cancel")
            .expect("present");
        repo.reserve(reservation("r-3")).await.expect("slot returned");
    }
}
