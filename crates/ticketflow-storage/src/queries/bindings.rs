// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration bindings and assistant definitions.

use std::str::FromStr;

use rusqlite::{OptionalExtension, Row, params};
use ticketflow_core::TicketflowError;
use ticketflow_core::types::{Assistant, IntegrationBinding, IntegrationKind};

use crate::database::{Database, conversion_err, map_tr_err, parse_json, to_json};

fn binding_from_row(row: &Row<'_>) -> rusqlite::Result<IntegrationBinding> {
    let kind: String = row.get(3)?;
    let config: String = row.get(4)?;
    Ok(IntegrationBinding {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        name: row.get(2)?,
        kind: IntegrationKind::from_str(&kind).map_err(|e| conversion_err(3, e))?,
        config: parse_json(4, &config)?,
    })
}

pub async fn get_binding(
    db: &Database,
    id: i64,
) -> Result<Option<IntegrationBinding>, TicketflowError> {
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT id, tenant_id, name, kind, config FROM integration_bindings WHERE id = ?1",
                params![id],
                binding_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn upsert_binding(
    db: &Database,
    binding: &IntegrationBinding,
) -> Result<(), TicketflowError> {
    let config = to_json(&binding.config)?;
    let b = binding.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO integration_bindings (id, tenant_id, name, kind, config)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                   tenant_id = excluded.tenant_id,
                   name = excluded.name,
                   kind = excluded.kind,
                   config = excluded.config",
                params![b.id, b.tenant_id, b.name, b.kind.to_string(), config],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

fn assistant_from_row(row: &Row<'_>) -> rusqlite::Result<Assistant> {
    Ok(Assistant {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        name: row.get(2)?,
        active: row.get(3)?,
        prompt: row.get(4)?,
        model: row.get(5)?,
    })
}

/// Active assistant of a tenant. Never returns another tenant's assistant.
pub async fn find_active_assistant(
    db: &Database,
    tenant_id: i64,
    assistant_id: Option<i64>,
) -> Result<Option<Assistant>, TicketflowError> {
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT id, tenant_id, name, active, prompt, model FROM assistants
                 WHERE tenant_id = ?1 AND active = 1 AND (?2 IS NULL OR id = ?2)
                 ORDER BY id ASC LIMIT 1",
                params![tenant_id, assistant_id],
                assistant_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn upsert_assistant(db: &Database, a: &Assistant) -> Result<(), TicketflowError> {
    let a = a.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO assistants (id, tenant_id, name, active, prompt, model)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                   tenant_id = excluded.tenant_id,
                   name = excluded.name,
                   active = excluded.active,
                   prompt = excluded.prompt,
                   model = excluded.model",
                params![a.id, a.tenant_id, a.name, a.active, a.prompt, a.model],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
