use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use concierge_core::domain::conversation::ConversationId;
use concierge_core::domain::ticket::{Ticket, TicketId, TicketMessage, TicketRole, TicketStatus};

use super::{RepositoryError, TicketRepository};
use crate::DbPool;

pub struct SqlTicketRepository {
    pool: DbPool,
}

impl SqlTicketRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl TicketRepository for SqlTicketRepository {
    async fn find_for_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Option<Ticket>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, conversation_id, status, created_at, updated_at
             FROM tickets
             WHERE conversation_id = ?
             ORDER BY created_at ASC
             LIMIT 1",
        )
        .bind(&conversation_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ticket_from_row).transpose()
    }

    async fn save(&self, ticket: Ticket) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO tickets (id, conversation_id, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                updated_at = excluded.updated_at",
        )
        .bind(&ticket.id.0)
        .bind(&ticket.conversation_id.0)
        .bind(ticket.status.as_str())
        .bind(ticket.created_at)
        .bind(ticket.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn append_message(&self, message: TicketMessage) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO ticket_messages (message_id, ticket_id, role, content, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&message.message_id)
        .bind(&message.ticket_id.0)
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(message.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_messages(
        &self,
        ticket_id: &TicketId,
    ) -> Result<Vec<TicketMessage>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT message_id, ticket_id, role, content, created_at
             FROM ticket_messages
             WHERE ticket_id = ?
             ORDER BY created_at ASC, message_id ASC",
        )
        .bind(&ticket_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(message_from_row).collect()
    }
}

fn ticket_from_row(row: SqliteRow) -> Result<Ticket, RepositoryError> {
    let status = row
        .get::<String, _>("status")
        .parse::<TicketStatus>()
        .map_err(RepositoryError::Decode)?;

    Ok(Ticket {
        id: TicketId(row.get::<String, _>("id")),
        conversation_id: ConversationId(row.get::<String, _>("conversation_id")),
        status,
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
        updated_at: row.get::<DateTime<Utc>, _>("updated_at"),
    })
}

fn message_from_row(row: SqliteRow) -> Result<TicketMessage, RepositoryError> {
    let role =
        row.get::<String, _>("role").parse::<TicketRole>().map_err(RepositoryError::Decode)?;

    Ok(TicketMessage {
        message_id: row.get::<String, _>("message_id"),
        ticket_id: TicketId(row.get::<String, _>("ticket_id")),
        role,
        content: row.get::<String, _>("content"),
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
    })
}
