// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tenants, queues, contacts and channel connections.

use std::str::FromStr;

use rusqlite::{OptionalExtension, Row, params};
use ticketflow_core::TicketflowError;
use ticketflow_core::types::{
    ChannelConnection, ConnectionStatus, Contact, Queue, ScheduleMode, Tenant,
};

use crate::database::{Database, conversion_err, map_tr_err, parse_json, to_json};

fn tenant_from_row(row: &Row<'_>) -> rusqlite::Result<Tenant> {
    let mode: String = row.get(2)?;
    let schedules: String = row.get(3)?;
    Ok(Tenant {
        id: row.get(0)?,
        name: row.get(1)?,
        schedule_mode: ScheduleMode::from_str(&mode).map_err(|e| conversion_err(2, e))?,
        schedules: parse_json(3, &schedules)?,
        out_of_hours_message: row.get(4)?,
    })
}

pub async fn get_tenant(db: &Database, id: i64) -> Result<Option<Tenant>, TicketflowError> {
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT id, name, schedule_mode, schedules, out_of_hours_message
                 FROM tenants WHERE id = ?1",
                params![id],
                tenant_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn upsert_tenant(db: &Database, tenant: &Tenant) -> Result<(), TicketflowError> {
    let schedules = to_json(&tenant.schedules)?;
    let tenant = tenant.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO tenants (id, name, schedule_mode, schedules, out_of_hours_message)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                   name = excluded.name,
                   schedule_mode = excluded.schedule_mode,
                   schedules = excluded.schedules,
                   out_of_hours_message = excluded.out_of_hours_message",
                params![
                    tenant.id,
                    tenant.name,
                    tenant.schedule_mode.to_string(),
                    schedules,
                    tenant.out_of_hours_message,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

fn queue_from_row(row: &Row<'_>) -> rusqlite::Result<Queue> {
    let schedules: String = row.get(5)?;
    Ok(Queue {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        name: row.get(2)?,
        greeting_message: row.get(3)?,
        out_of_hours_message: row.get(4)?,
        schedules: parse_json(5, &schedules)?,
    })
}

pub async fn get_queue(db: &Database, id: i64) -> Result<Option<Queue>, TicketflowError> {
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT id, tenant_id, name, greeting_message, out_of_hours_message, schedules
                 FROM queues WHERE id = ?1",
                params![id],
                queue_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn upsert_queue(db: &Database, queue: &Queue) -> Result<(), TicketflowError> {
    let schedules = to_json(&queue.schedules)?;
    let queue = queue.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO queues (id, tenant_id, name, greeting_message, out_of_hours_message, schedules)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                   tenant_id = excluded.tenant_id,
                   name = excluded.name,
                   greeting_message = excluded.greeting_message,
                   out_of_hours_message = excluded.out_of_hours_message,
                   schedules = excluded.schedules",
                params![
                    queue.id,
                    queue.tenant_id,
                    queue.name,
                    queue.greeting_message,
                    queue.out_of_hours_message,
                    schedules,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn add_queue_option(
    db: &Database,
    queue_id: i64,
    title: &str,
) -> Result<i64, TicketflowError> {
    let title = title.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO queue_options (queue_id, title) VALUES (?1, ?2)",
                params![queue_id, title],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn queue_option_ids(db: &Database, queue_id: i64) -> Result<Vec<i64>, TicketflowError> {
    db.connection()
        .call(move |conn| {
            let mut stmt =
                conn.prepare("SELECT id FROM queue_options WHERE queue_id = ?1 ORDER BY id ASC")?;
            let rows = stmt.query_map(params![queue_id], |row| row.get(0))?;
            rows.collect::<rusqlite::Result<Vec<i64>>>()
        })
        .await
        .map_err(map_tr_err)
}

pub(crate) fn contact_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<Contact> {
    Ok(Contact {
        id: row.get(offset)?,
        tenant_id: row.get(offset + 1)?,
        name: row.get(offset + 2)?,
        number: row.get(offset + 3)?,
        email: row.get(offset + 4)?,
    })
}

pub async fn get_contact(db: &Database, id: i64) -> Result<Option<Contact>, TicketflowError> {
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT id, tenant_id, name, number, email FROM contacts WHERE id = ?1",
                params![id],
                |row| contact_from_row(row, 0),
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn upsert_contact(db: &Database, contact: &Contact) -> Result<(), TicketflowError> {
    let contact = contact.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO contacts (id, tenant_id, name, number, email)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                   tenant_id = excluded.tenant_id,
                   name = excluded.name,
                   number = excluded.number,
                   email = excluded.email",
                params![
                    contact.id,
                    contact.tenant_id,
                    contact.name,
                    contact.number,
                    contact.email
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

fn connection_from_row(row: &Row<'_>) -> rusqlite::Result<ChannelConnection> {
    let status: String = row.get(3)?;
    Ok(ChannelConnection {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        name: row.get(2)?,
        status: ConnectionStatus::from_str(&status).map_err(|e| conversion_err(3, e))?,
        is_default: row.get(4)?,
    })
}

pub async fn get_connection(
    db: &Database,
    id: i64,
) -> Result<Option<ChannelConnection>, TicketflowError> {
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT id, tenant_id, name, status, is_default FROM connections WHERE id = ?1",
                params![id],
                connection_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn default_connection(
    db: &Database,
    tenant_id: i64,
) -> Result<Option<ChannelConnection>, TicketflowError> {
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT id, tenant_id, name, status, is_default FROM connections
                 WHERE tenant_id = ?1 AND is_default = 1
                 ORDER BY id ASC LIMIT 1",
                params![tenant_id],
                connection_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn upsert_connection(
    db: &Database,
    connection: &ChannelConnection,
) -> Result<(), TicketflowError> {
    let c = connection.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO connections (id, tenant_id, name, status, is_default)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                   tenant_id = excluded.tenant_id,
                   name = excluded.name,
                   status = excluded.status,
                   is_default = excluded.is_default",
                params![c.id, c.tenant_id, c.name, c.status.to_string(), c.is_default],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
