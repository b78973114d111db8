use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use concierge_core::domain::conversation::{ConversationId, ConversationState, Turn};
use concierge_core::domain::intent::Intent;

use super::{ConversationRepository, RepositoryError};
use crate::DbPool;

pub struct SqlConversationRepository {
    pool: DbPool,
}

impl SqlConversationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ConversationRepository for SqlConversationRepository {
    async fn find_by_id(
        &self,
        id: &ConversationId,
    ) -> Result<Option<ConversationState>, RepositoryError> {
        let header = sqlx::query(
            "SELECT id, scratch_json, created_at FROM conversations WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        let Some(header) = header else {
            return Ok(None);
        };

        let turn_rows = sqlx::query(
            "SELECT turn_number, user_text, intent, response, occurred_at
             FROM conversation_turns
             WHERE conversation_id = ?
             ORDER BY turn_number ASC",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?;

        let scratch_raw = header.get::<String, _>("scratch_json");
        let scratch = serde_json::from_str::<BTreeMap<String, String>>(&scratch_raw)
            .map_err(|error| RepositoryError::Decode(format!("scratch_json: {error}")))?;

        let turns =
            turn_rows.into_iter().map(turn_from_row).collect::<Result<Vec<_>, _>>()?;

        Ok(Some(ConversationState {
            id: id.clone(),
            turns,
            scratch,
            created_at: header.get::<DateTime<Utc>, _>("created_at"),
        }))
    }

    async fn save(&self, state: &ConversationState) -> Result<(), RepositoryError> {
        let scratch_json = serde_json::to_string(&state.scratch)
            .map_err(|error| RepositoryError::Decode(format!("scratch_json: {error}")))?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO conversations (id, scratch_json, created_at)
             VALUES (?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET scratch_json = excluded.scratch_json",
        )
        .bind(&state.id.0)
        .bind(&scratch_json)
        .bind(state.created_at)
        .execute(&mut *tx)
        .await?;

        // Turns already on disk are immutable; only the tail is new.
        let (persisted,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM conversation_turns WHERE conversation_id = ?",
        )
        .bind(&state.id.0)
        .fetch_one(&mut *tx)
        .await?;

        for turn in state.turns.iter().skip(persisted as usize) {
            sqlx::query(
                "INSERT INTO conversation_turns
                 (conversation_id, turn_number, user_text, intent, response, occurred_at)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&state.id.0)
            .bind(turn.turn_number as i64)
            .bind(&turn.user_text)
            .bind(turn.intent.as_str())
            .bind(&turn.response)
            .bind(turn.occurred_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

fn turn_from_row(row: SqliteRow) -> Result<Turn, RepositoryError> {
    let intent_raw = row.get::<String, _>("intent");
    let intent = intent_raw
        .parse::<Intent>()
        .map_err(|error| RepositoryError::Decode(error.to_string()))?;

    Ok(Turn {
        turn_number: row.get::<i64, _>("turn_number") as u32,
        user_text: row.get::<String, _>("user_text"),
        intent,
        response: row.get::<String, _>("response"),
        occurred_at: row.get::<DateTime<Utc>, _>("occurred_at"),
    })
}
