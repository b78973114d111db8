use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use concierge_core::domain::reservation::{
    Experience, ExperienceId, Reservation, ReservationId, ReservationListing, ReservationStatus,
};
use concierge_core::domain::subscription::{Subscription, SubscriptionStatus};
use concierge_core::domain::user::{UserId, UserProfile};

use super::{
    RepositoryError, ReservationRepository, SubscriptionRepository, UserRepository,
};
use crate::DbPool;

pub struct SqlUserRepository {
    pool: DbPool,
}

impl SqlUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl UserRepository for SqlUserRepository {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<UserProfile>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, full_name, email, is_blocked FROM users WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| UserProfile {
            id: UserId(row.get::<String, _>("id")),
            full_name: row.get::<String, _>("full_name"),
            email: row.get::<String, _>("email"),
            is_blocked: row.get::<i64, _>("is_blocked") != 0,
        }))
    }
}

pub struct SqlSubscriptionRepository {
    pool: DbPool,
}

impl SqlSubscriptionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl SubscriptionRepository for SqlSubscriptionRepository {
    async fn find_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<Subscription>, RepositoryError> {
        let row = sqlx::query(
            "SELECT user_id, status, tier, monthly_quota FROM subscriptions WHERE user_id = ?",
        )
        .bind(&user_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(subscription_from_row).transpose()
    }
}

pub struct SqlReservationRepository {
    pool: DbPool,
}

impl SqlReservationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ReservationRepository for SqlReservationRepository {
    async fn list_for_user(
        &self,
        user_id: &UserId,
        upcoming_only: bool,
    ) -> Result<Vec<ReservationListing>, RepositoryError> {
        let base = "SELECT r.id, r.experience_id, r.status, e.title, e.when_at
             FROM reservations r
             JOIN experiences e ON e.id = r.experience_id
             WHERE r.user_id = ?";
        let rows = if upcoming_only {
            sqlx::query(&format!("{base} AND e.when_at >= ? ORDER BY e.when_at ASC"))
                .bind(&user_id.0)
                .bind(Utc::now())
                .fetch_all(&self.pool)
                .await?
        } else {
            sqlx::query(&format!("{base} ORDER BY e.when_at ASC"))
                .bind(&user_id.0)
                .fetch_all(&self.pool)
                .await?
        };

        rows.into_iter().map(listing_from_row).collect()
    }

    async fn count_reserved_since(
        &self,
        user_id: &UserId,
        since: DateTime<Utc>,
    ) -> Result<u32, RepositoryError> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM reservations
             WHERE user_id = ? AND status = 'reserved' AND created_at >= ?",
        )
        .bind(&user_id.0)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u32)
    }

    async fn find_experience(
        &self,
        id: &ExperienceId,
    ) -> Result<Option<Experience>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, title, when_at, slots_available FROM experiences WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| Experience {
            id: ExperienceId(row.get::<String, _>("id")),
            title: row.get::<String, _>("title"),
            when: row.get::<DateTime<Utc>, _>("when_at"),
            slots_available: row.get::<i64, _>("slots_available") as u32,
        }))
    }

    async fn find_by_id(
        &self,
        id: &ReservationId,
    ) -> Result<Option<Reservation>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, user_id, experience_id, status, created_at
             FROM reservations WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(reservation_from_row).transpose()
    }

    async fn reserve(&self, reservation: Reservation) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let taken = sqlx::query(
            "UPDATE experiences SET slots_available = slots_available - 1
             WHERE id = ? AND slots_available > 0",
        )
        .bind(&reservation.experience_id.0)
        .execute(&mut *tx)
        .await?;

        if taken.rows_affected() == 0 {
            return Err(RepositoryError::Conflict(format!(
                "no slots available for experience {}",
                reservation.experience_id.0
            )));
        }

        sqlx::query(
            "INSERT INTO reservations (id, user_id, experience_id, status, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&reservation.id.0)
        .bind(&reservation.user_id.0)
        .bind(&reservation.experience_id.0)
        .bind(reservation.status.as_str())
        .bind(reservation.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn cancel(
        &self,
        id: &ReservationId,
        user_id: &UserId,
    ) -> Result<Option<Reservation>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "SELECT id, user_id, experience_id, status, created_at
             FROM reservations
             WHERE id = ? AND user_id = ? AND status = 'reserved'",
        )
        .bind(&id.0)
        .bind(&user_id.0)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut reservation = reservation_from_row(row)?;

        sqlx::query("UPDATE reservations SET status = 'cancelled' WHERE id = ?")
            .bind(&reservation.id.0)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "UPDATE experiences SET slots_available = slots_available + 1 WHERE id = ?",
        )
        .bind(&reservation.experience_id.0)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        reservation.status = ReservationStatus::Cancelled;
        Ok(Some(reservation))
    }
}

fn subscription_from_row(row: SqliteRow) -> Result<Subscription, RepositoryError> {
    let status = row
        .get::<String, _>("status")
        .parse::<SubscriptionStatus>()
        .map_err(RepositoryError::Decode)?;

    Ok(Subscription {
        user_id: UserId(row.get::<String, _>("user_id")),
        status,
        tier: row.get::<String, _>("tier"),
        monthly_quota: row.get::<i64, _>("monthly_quota") as u32,
    })
}

fn reservation_from_row(row: SqliteRow) -> Result<Reservation, RepositoryError> {
    let status = row
        .get::<String, _>("status")
        .parse::<ReservationStatus>()
        .map_err(RepositoryError::Decode)?;

    Ok(Reservation {
        id: ReservationId(row.get::<String, _>("id")),
        user_id: UserId(row.get::<String, _>("user_id")),
        experience_id: ExperienceId(row.get::<String, _>("experience_id")),
        status,
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
    })
}

fn listing_from_row(row: SqliteRow) -> Result<ReservationListing, RepositoryError> {
    let status = row
        .get::<String, _>("status")
        .parse::<ReservationStatus>()
        .map_err(RepositoryError::Decode)?;

    Ok(ReservationListing {
        reservation_id: ReservationId(row.get::<String, _>("id")),
        experience_id: ExperienceId(row.get::<String, _>("experience_id")),
        title: row.get::<String, _>("title"),
        when: row.get::<DateTime<Utc>, _>("when_at"),
        status,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use concierge_core::domain::reservation::{
        ExperienceId, Reservation, ReservationId, ReservationStatus,
    };
    use concierge_core::domain::user::UserId;

    use super::{SqlReservationRepository, SqlSubscriptionRepository, SqlUserRepository};
    use crate::connect_with_settings;
    use crate::migrations::run_crm_pending;
    use crate::repositories::{
        RepositoryError, ReservationRepository, SubscriptionRepository, UserRepository,
    };

    async fn pool() -> crate::DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_crm_pending(&pool).await.expect("migrate");
        seed(&pool).await;
        pool
    }

    async fn seed(pool: &crate::DbPool) {
        sqlx::query(
            "INSERT INTO users (id, full_name, email, is_blocked)
             VALUES ('a4ab87', 'Ada Lovelace', 'ada@example.com', 0)",
        )
        .execute(pool)
        .await
        .expect("seed user");
        sqlx::query(
            "INSERT INTO subscriptions (user_id, status, tier, monthly_quota)
             VALUES ('a4ab87', 'active', 'basic', 3)",
        )
        .execute(pool)
        .await
        .expect("seed subscription");
        sqlx::query(
            "INSERT INTO experiences (id, title, when_at, slots_available)
             VALUES ('exp-1', 'Museum Night', ?, 1)",
        )
        .bind(Utc::now() + Duration::days(7))
        .execute(pool)
        .await
        .expect("seed experience");
    }

    #[tokio::test]
    async fn user_lookup_round_trips() {
        let pool = pool().await;
        let repo = SqlUserRepository::new(pool);
        let profile = repo
            .find_by_id(&UserId("a4ab87".to_string()))
            .await
            .expect("query")
            .expect("present");
        assert_eq!(profile.full_name, "Ada Lovelace");
        assert!(!profile.is_blocked);
    }

    #[tokio::test]
    async fn subscription_lookup_round_trips() {
        let pool = pool().await;
        let repo = SqlSubscriptionRepository::new(pool);
        let subscription = repo
            .find_for_user(&UserId("a4ab87".to_string()))
            .await
            .expect("query")
            .expect("present");
        assert_eq!(subscription.tier, "basic");
        assert_eq!(subscription.monthly_quota, 3);
    }

    fn reservation(id: &str) -> Reservation {
        Reservation {
            id: ReservationId(id.to_string()),
            user_id: UserId("a4ab87".to_string()),
            experience_id: ExperienceId("exp-1".to_string()),
            status: ReservationStatus::Reserved,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn reserve_takes_the_last_slot_and_then_conflicts() {
        let pool = pool().await;
        let repo = SqlReservationRepository::new(pool);

        repo.reserve(reservation("r-1")).await.expect("first reserve");
        let error = repo.reserve(reservation("r-2")).await.expect_err("slots exhausted");
        assert!(matches!(error, RepositoryError::Conflict(_)));

        let experience = repo
            .find_experience(&ExperienceId("exp-1".to_string()))
            .await
            .expect("query")
            .expect("present");
        assert_eq!(experience.slots_available, 0);
    }

    #[tokio::test]
    async fn cancel_returns_the_slot() {
        let pool = pool().await;
        let repo = SqlReservationRepository::new(pool);
        repo.reserve(reservation("r-1")).await.expect("reserve");

        let cancelled = repo
            .cancel(&ReservationId("r-1".to_string()), &UserId("a4ab87".to_string()))
            .await
            .expect("cancel")
            .expect("present");
        assert_eq!(cancelled.status, ReservationStatus::Cancelled);

        let experience = repo
            .find_experience(&ExperienceId("exp-1".to_string()))
            .await
            .expect("query")
            .expect("present");
        assert_eq!(experience.slots_available, 1);

        // a second cancel finds nothing still reserved
        let missing = repo
            .cancel(&ReservationId("r-1".to_string()), &UserId("a4ab87".to_string()))
            .await
            .expect("cancel");
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn count_reserved_since_ignores_cancelled_rows() {
        let pool = pool().await;
        let repo = SqlReservationRepository::new(pool);
        repo.reserve(reservation("r-1")).await.expect("reserve");

        let since = Utc::now() - Duration::days(1);
        assert_eq!(
            repo.count_reserved_since(&UserId("a4ab87".to_string()), since)
                .await
                .expect("count"),
            1
        );

        repo.cancel(&ReservationId("r-1".to_string()), &UserId("a4ab87".to_string()))
            .await
            .expect("cancel");
        assert_eq!(
            repo.count_reserved_since(&UserId("a4ab87".to_string()), since)
                .await
                .expect("count"),
            0
        );
    }

    #[tokio::test]
    async fn listing_joins_experience_fields() {
        let pool = pool().await;
        let repo = SqlReservationRepository::new(pool);
        repo.reserve(reservation("r-1")).await.expect("reserve");

        let listings = repo
            .list_for_user(&UserId("a4ab87".to_string()), true)
            .await
            .expect("list");
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].title, "Museum Night");
        assert_eq!(listings[0].status, ReservationStatus::Reserved);
    }
}
