use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use concierge_core::domain::conversation::{ConversationId, ConversationState};
use concierge_core::domain::reservation::{
    Experience, ExperienceId, Reservation, ReservationId, ReservationListing,
};
use concierge_core::domain::subscription::Subscription;
use concierge_core::domain::ticket::{Ticket, TicketId, TicketMessage};
use concierge_core::domain::user::{UserId, UserProfile};

pub mod conversation;
pub mod crm;
pub mod memory;
pub mod ticket;

pub use conversation::SqlConversationRepository;
pub use crm::{SqlReservationRepository, SqlSubscriptionRepository, SqlUserRepository};
pub use memory::{
    InMemoryConversationRepository, InMemoryCrmRepository, InMemoryTicketRepository,
};
pub use ticket::SqlTicketRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("conflict: {0}")]
    Conflict(String),
}

/// Persisted conversation state, loaded and rewritten once per turn.
/// Implementations must keep turns append-only in turn-number order.
#[async_trait]
pub trait ConversationRepository: Send + Sync {
    async fn find_by_id(
        &self,
        id: &ConversationId,
    ) -> Result<Option<ConversationState>, RepositoryError>;
    async fn save(&self, state: &ConversationState) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<UserProfile>, RepositoryError>;
}

#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    async fn find_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<Subscription>, RepositoryError>;
}

#[async_trait]
pub trait ReservationRepository: Send + Sync {
    async fn list_for_user(
        &self,
        user_id: &UserId,
        upcoming_only: bool,
    ) -> Result<Vec<ReservationListing>, RepositoryError>;

    /// Number of still-reserved reservations the user created at or after
    /// `since`; feeds monthly quota accounting.
    async fn count_reserved_since(
        &self,
        user_id: &UserId,
        since: DateTime<Utc>,
    ) -> Result<u32, RepositoryError>;

    async fn find_experience(
        &self,
        id: &ExperienceId,
    ) -> Result<Option<Experience>, RepositoryError>;

    async fn find_by_id(
        &self,
        id: &ReservationId,
    ) -> Result<Option<Reservation>, RepositoryError>;

    /// Inserts the reservation and takes one slot from its experience in a
    /// single transaction; `Conflict` when no slot remains.
    async fn reserve(&self, reservation: Reservation) -> Result<(), RepositoryError>;

    /// Cancels a still-reserved reservation owned by `user_id` and returns
    /// the slot to the experience. `Ok(None)` when no such reservation.
    async fn cancel(
        &self,
        id: &ReservationId,
        user_id: &UserId,
    ) -> Result<Option<Reservation>, RepositoryError>;
}

#[async_trait]
pub trait TicketRepository: Send + Sync {
    async fn find_for_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Option<Ticket>, RepositoryError>;
    async fn save(&self, ticket: Ticket) -> Result<(), RepositoryError>;
    async fn append_message(&self, message: TicketMessage) -> Result<(), RepositoryError>;
    async fn list_messages(
        &self,
        ticket_id: &TicketId,
    ) -> Result<Vec<TicketMessage>, RepositoryError>;
}
