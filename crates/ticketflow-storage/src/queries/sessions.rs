// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation session CRUD and expiry scans.

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Row, params};
use ticketflow_core::TicketflowError;
use ticketflow_core::types::{ConversationSession, ExpiredSession};

use crate::database::{Database, fmt_ts, map_tr_err, parse_json, parse_ts, to_json};
use crate::queries::conversations::{
    CONVERSATION_COLUMNS, CONVERSATION_WIDTH, conversation_from_row,
};
use crate::queries::directory::contact_from_row;

const SESSION_COLUMNS: &str =
    "s.conversation_id, s.tenant_id, s.step, s.expires_at, s.payload, s.created_at, s.updated_at";
const SESSION_WIDTH: usize = 7;

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<ConversationSession> {
    let expires_at: String = row.get(3)?;
    let payload: String = row.get(4)?;
    let created_at: String = row.get(5)?;
    let updated_at: String = row.get(6)?;
    Ok(ConversationSession {
        conversation_id: row.get(0)?,
        tenant_id: row.get(1)?,
        step: row.get(2)?,
        expires_at: parse_ts(3, &expires_at)?,
        payload: parse_json(4, &payload)?,
        created_at: parse_ts(5, &created_at)?,
        updated_at: parse_ts(6, &updated_at)?,
    })
}

/// Creates the session or replaces the one already owned by the conversation.
pub async fn upsert_session(
    db: &Database,
    session: &ConversationSession,
) -> Result<(), TicketflowError> {
    let payload = to_json(&session.payload)?;
    let s = session.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO conversation_sessions
                   (conversation_id, tenant_id, step, expires_at, payload, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(conversation_id) DO UPDATE SET
                   tenant_id = excluded.tenant_id,
                   step = excluded.step,
                   expires_at = excluded.expires_at,
                   payload = excluded.payload,
                   updated_at = excluded.updated_at",
                params![
                    s.conversation_id,
                    s.tenant_id,
                    s.step,
                    fmt_ts(s.expires_at),
                    payload,
                    fmt_ts(s.created_at),
                    fmt_ts(s.updated_at),
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_session(
    db: &Database,
    conversation_id: i64,
) -> Result<Option<ConversationSession>, TicketflowError> {
    let sql = format!(
        "SELECT {SESSION_COLUMNS} FROM conversation_sessions s WHERE s.conversation_id = ?1"
    );
    db.connection()
        .call(move |conn| {
            conn.query_row(&sql, params![conversation_id], session_from_row)
                .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Deletes the session. Returns `false` if none existed.
pub async fn delete_session(db: &Database, conversation_id: i64) -> Result<bool, TicketflowError> {
    db.connection()
        .call(move |conn| {
            let n = conn.execute(
                "DELETE FROM conversation_sessions WHERE conversation_id = ?1",
                params![conversation_id],
            )?;
            Ok(n > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Sessions whose `expires_at` is before `now`, each with its conversation
/// and that conversation's contact when they still exist.
pub async fn list_expired_sessions(
    db: &Database,
    now: DateTime<Utc>,
) -> Result<Vec<ExpiredSession>, TicketflowError> {
    let sql = format!(
        "SELECT {SESSION_COLUMNS}, {CONVERSATION_COLUMNS},
                ct.id, ct.tenant_id, ct.name, ct.number, ct.email
         FROM conversation_sessions s
         LEFT JOIN conversations c ON c.id = s.conversation_id
         LEFT JOIN contacts ct ON ct.id = c.contact_id
         WHERE s.expires_at < ?1
         ORDER BY s.expires_at ASC"
    );
    let now = fmt_ts(now);
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![now], |row| {
                let session = session_from_row(row)?;
                let conv_id: Option<i64> = row.get(SESSION_WIDTH)?;
                let conversation = match conv_id {
                    Some(_) => Some(conversation_from_row(row, SESSION_WIDTH)?),
                    None => None,
                };
                let contact_offset = SESSION_WIDTH + CONVERSATION_WIDTH;
                let contact_id: Option<i64> = row.get(contact_offset)?;
                let contact = match contact_id {
                    Some(_) => Some(contact_from_row(row, contact_offset)?),
                    None => None,
                };
                Ok(ExpiredSession {
                    session,
                    conversation,
                    contact,
                })
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })
        .await
        .map_err(map_tr_err)
}
