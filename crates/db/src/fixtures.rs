//! Deterministic demo dataset for local runs and smoke checks.

use chrono::{Duration, Utc};

use concierge_core::domain::reservation::{
    Experience, ExperienceId, Reservation, ReservationId, ReservationStatus,
};
use concierge_core::domain::subscription::{Subscription, SubscriptionStatus};
use concierge_core::domain::user::{UserId, UserProfile};

use crate::repositories::RepositoryError;
use crate::DbPool;

#[derive(Clone, Debug)]
pub struct SeedDataset {
    pub users: Vec<UserProfile>,
    pub subscriptions: Vec<Subscription>,
    pub experiences: Vec<Experience>,
    pub reservations: Vec<Reservation>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeedResult {
    pub users: usize,
    pub subscriptions: usize,
    pub experiences: usize,
    pub reservations: usize,
}

impl SeedDataset {
    /// The demo account used across CLI smoke runs: an active basic-tier
    /// member with one upcoming reservation, next to a blocked account for
    /// exercising the refusal paths.
    pub fn demo() -> Self {
        let now = Utc::now();
        Self {
            users: vec![
                UserProfile {
                    id: UserId("a4ab87".to_string()),
                    full_name: "Avery Castillo".to_string(),
                    email: "avery@example.com".to_string(),
                    is_blocked: false,
                },
                UserProfile {
                    id: UserId("b7cd12".to_string()),
                    full_name: "Blake Nilsen".to_string(),
                    email: "blake@example.com".to_string(),
                    is_blocked: true,
                },
            ],
            subscriptions: vec![
                Subscription {
                    user_id: UserId("a4ab87".to_string()),
                    status: SubscriptionStatus::Active,
                    tier: "basic".to_string(),
                    monthly_quota: 3,
                },
                Subscription {
                    user_id: UserId("b7cd12".to_string()),
                    status: SubscriptionStatus::Paused,
                    tier: "premium".to_string(),
                    monthly_quota: 5,
                },
            ],
            experiences: vec![
                Experience {
                    id: ExperienceId("exp-museum".to_string()),
                    title: "Museum Night".to_string(),
                    when: now + Duration::days(7),
                    slots_available: 12,
                },
                Experience {
                    id: ExperienceId("exp-opera".to_string()),
                    title: "Opera Matinee".to_string(),
                    when: now + Duration::days(14),
                    slots_available: 2,
                },
                Experience {
                    id: ExperienceId("exp-archive".to_string()),
                    title: "City Archive Tour".to_string(),
                    when: now - Duration::days(3),
                    slots_available: 0,
                },
            ],
            reservations: vec![Reservation {
                id: ReservationId("res-0001".to_string()),
                user_id: UserId("a4ab87".to_string()),
                experience_id: ExperienceId("exp-museum".to_string()),
                status: ReservationStatus::Reserved,
                created_at: now - Duration::days(1),
            }],
        }
    }

    /// Inserts the dataset into the crm store. Idempotent: rows are keyed on
    /// their fixed ids and replaced on rerun.
    pub async fn apply(&self, crm_pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = crm_pool.begin().await?;

        for user in &self.users {
            sqlx::query(
                "INSERT INTO users (id, full_name, email, is_blocked)
                 VALUES (?, ?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET
                    full_name = excluded.full_name,
                    email = excluded.email,
                    is_blocked = excluded.is_blocked",
            )
            .bind(&user.id.0)
            .bind(&user.full_name)
            .bind(&user.email)
            .bind(user.is_blocked as i64)
            .execute(&mut *tx)
            .await?;
        }

        for subscription in &self.subscriptions {
            sqlx::query(
                "INSERT INTO subscriptions (user_id, status, tier, monthly_quota)
                 VALUES (?, ?, ?, ?)
                 ON CONFLICT(user_id) DO UPDATE SET
                    status = excluded.status,
                    tier = excluded.tier,
                    monthly_quota = excluded.monthly_quota",
            )
            .bind(&subscription.user_id.0)
            .bind(subscription.status.as_str())
            .bind(&subscription.tier)
            .bind(subscription.monthly_quota as i64)
            .execute(&mut *tx)
            .await?;
        }

        for experience in &self.experiences {
            sqlx::query(
                "INSERT INTO experiences (id, title, when_at, slots_available)
                 VALUES (?, ?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET
                    title = excluded.title,
                    when_at = excluded.when_at,
                    slots_available = excluded.slots_available",
            )
            .bind(&experience.id.0)
            .bind(&experience.title)
            .bind(experience.when)
            .bind(experience.slots_available as i64)
            .execute(&mut *tx)
            .await?;
        }

        for reservation in &self.reservations {
            sqlx::query(
                "INSERT INTO reservations (id, user_id, experience_id, status, created_at)
                 VALUES (?, ?, ?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET
                    status = excluded.status",
            )
            .bind(&reservation.id.0)
            .bind(&reservation.user_id.0)
            .bind(&reservation.experience_id.0)
            .bind(reservation.status.as_str())
            .bind(reservation.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(SeedResult {
            users: self.users.len(),
            subscriptions: self.subscriptions.len(),
            experiences: self.experiences.len(),
            reservations: self.reservations.len(),
        })
    }
}
