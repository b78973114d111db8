use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

/// The two stores migrate independently: conversations and tickets live in
/// the support store, customer records in the crm store.
pub static SUPPORT_MIGRATOR: Migrator = sqlx::migrate!("../../migrations/support");
pub static CRM_MIGRATOR: Migrator = sqlx::migrate!("../../migrations/crm");

pub async fn run_support_pending(pool: &DbPool) -> Result<(), MigrateError> {
    SUPPORT_MIGRATOR.run(pool).await
}

pub async fn run_crm_pending(pool: &DbPool) -> Result<(), MigrateError> {
    CRM_MIGRATOR.run(pool).await
}

#[cfg(test)]
mod tests {
    use sqlx::Row;

    use super::{run_crm_pending, run_support_pending, CRM_MIGRATOR, SUPPORT_MIGRATOR};
    use crate::connect_with_settings;

    async fn table_names(pool: &sqlx::SqlitePool) -> Vec<String> {
        sqlx::query(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE '_sqlx%' \
             ORDER BY name",
        )
        .fetch_all(pool)
        .await
        .expect("list tables")
        .into_iter()
        .map(|row| row.get::<String, _>("name"))
        .collect()
    }

    #[tokio::test]
    async fn support_migrations_create_baseline_tables() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_support_pending(&pool).await.expect("run support migrations");

        let tables = table_names(&pool).await;
        for expected in ["conversations", "conversation_turns", "tickets", "ticket_messages"] {
            assert!(tables.iter().any(|name| name == expected), "missing table {expected}");
        }
    }

    #[tokio::test]
    async fn crm_migrations_create_baseline_tables() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_crm_pending(&pool).await.expect("run crm migrations");

        let tables = table_names(&pool).await;
        for expected in ["users", "subscriptions", "experiences", "reservations"] {
            assert!(tables.iter().any(|name| name == expected), "missing table {expected}");
        }
    }

    #[tokio::test]
    async fn support_migrations_are_reversible() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_support_pending(&pool).await.expect("run support migrations");

        SUPPORT_MIGRATOR.undo(&pool, 0).await.expect("undo support migrations");
        assert!(table_names(&pool).await.is_empty());
    }

    #[tokio::test]
    async fn crm_migrations_are_reversible() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_crm_pending(&pool).await.expect("run crm migrations");

        CRM_MIGRATOR.undo(&pool, 0).await.expect("undo crm migrations");
        assert!(table_names(&pool).await.is_empty());
    }
}
