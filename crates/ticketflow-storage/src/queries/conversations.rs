// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation (ticket) persistence.

use rusqlite::{OptionalExtension, Row, params};
use ticketflow_core::TicketflowError;
use ticketflow_core::types::Conversation;

use crate::database::{Database, map_tr_err};

pub(crate) const CONVERSATION_COLUMNS: &str = "c.id, c.tenant_id, c.contact_id, c.connection_id, \
     c.queue_id, c.user_id, c.status, c.is_bot, c.use_integration, c.integration_id, \
     c.queue_option_id, c.automation_usage, c.is_out_of_hour";

/// Number of columns in [`CONVERSATION_COLUMNS`].
pub(crate) const CONVERSATION_WIDTH: usize = 13;

pub(crate) fn conversation_from_row(row: &Row<'_>, o: usize) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: row.get(o)?,
        tenant_id: row.get(o + 1)?,
        contact_id: row.get(o + 2)?,
        connection_id: row.get(o + 3)?,
        queue_id: row.get(o + 4)?,
        user_id: row.get(o + 5)?,
        status: row.get(o + 6)?,
        is_bot: row.get(o + 7)?,
        use_integration: row.get(o + 8)?,
        integration_id: row.get(o + 9)?,
        queue_option_id: row.get(o + 10)?,
        automation_usage: row.get(o + 11)?,
        is_out_of_hour: row.get(o + 12)?,
    })
}

pub async fn get_conversation(
    db: &Database,
    id: i64,
) -> Result<Option<Conversation>, TicketflowError> {
    let sql = format!("SELECT {CONVERSATION_COLUMNS} FROM conversations c WHERE c.id = ?1");
    db.connection()
        .call(move |conn| {
            conn.query_row(&sql, params![id], |row| conversation_from_row(row, 0))
                .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Inserts or overwrites every column of the conversation.
pub async fn save_conversation(db: &Database, c: &Conversation) -> Result<(), TicketflowError> {
    let c = c.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO conversations (id, tenant_id, contact_id, connection_id, queue_id,
                   user_id, status, is_bot, use_integration, integration_id, queue_option_id,
                   automation_usage, is_out_of_hour)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                 ON CONFLICT(id) DO UPDATE SET
                   tenant_id = excluded.tenant_id,
                   contact_id = excluded.contact_id,
                   connection_id = excluded.connection_id,
                   queue_id = excluded.queue_id,
                   user_id = excluded.user_id,
                   status = excluded.status,
                   is_bot = excluded.is_bot,
                   use_integration = excluded.use_integration,
                   integration_id = excluded.integration_id,
                   queue_option_id = excluded.queue_option_id,
                   automation_usage = excluded.automation_usage,
                   is_out_of_hour = excluded.is_out_of_hour",
                params![
                    c.id,
                    c.tenant_id,
                    c.contact_id,
                    c.connection_id,
                    c.queue_id,
                    c.user_id,
                    c.status,
                    c.is_bot,
                    c.use_integration,
                    c.integration_id,
                    c.queue_option_id,
                    c.automation_usage,
                    c.is_out_of_hour,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn save_overwrites_automation_flags() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("t.db").to_str().unwrap())
            .await
            .unwrap();

        let mut conv = Conversation {
            id: 10,
            tenant_id: 1,
            contact_id: 2,
            connection_id: Some(3),
            queue_id: Some(4),
            user_id: None,
            status: "pending".into(),
            is_bot: true,
            use_integration: false,
            integration_id: None,
            queue_option_id: None,
            automation_usage: 2,
            is_out_of_hour: Some(false),
        };
        save_conversation(&db, &conv).await.unwrap();

        conv.reset_automation();
        conv.is_out_of_hour = None;
        save_conversation(&db, &conv).await.unwrap();

        let loaded = get_conversation(&db, 10).await.unwrap().unwrap();
        assert_eq!(loaded, conv);
        assert_eq!(loaded.is_out_of_hour, None);
        db.close().await.unwrap();
    }
}
