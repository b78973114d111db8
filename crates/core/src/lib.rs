pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod knowledge;
pub mod workflow;

pub use chrono;

pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
pub use domain::conversation::{ConversationId, ConversationState, Turn};
pub use domain::intent::Intent;
pub use domain::reservation::{
    Experience, ExperienceId, Reservation, ReservationId, ReservationListing, ReservationStatus,
};
pub use domain::subscription::{Subscription, SubscriptionStatus, SubscriptionSummary};
pub use domain::ticket::{Ticket, TicketId, TicketMessage, TicketRole, TicketStatus};
pub use domain::user::{UserId, UserProfile};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use knowledge::{KnowledgeArticle, KnowledgeCorpus, RetrievalOutcome, RetrievedArticle};
pub use workflow::{Route, TurnEngine, TurnEvent, TurnPhase, TurnTransition, TurnTransitionError};
