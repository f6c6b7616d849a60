// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scheduled message persistence and status transitions.
//!
//! Status changes are guarded updates (`WHERE status = ...`): a row that
//! already moved on is left alone and the caller sees `false`.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Row, params};
use ticketflow_core::TicketflowError;
use ticketflow_core::types::{
    ClaimedSchedule, NewSchedule, Recurrence, ScheduleStatus, ScheduledMessage,
};

use crate::database::{Database, conversion_err, fmt_ts, map_tr_err, parse_opt_ts, parse_ts};
use crate::queries::directory::contact_from_row;

const SCHEDULE_COLUMNS: &str = "m.id, m.tenant_id, m.contact_id, m.connection_id, m.body, \
     m.media_path, m.send_at, m.status, m.recurrence, m.recurrence_end, m.sent_at, \
     m.created_at, m.updated_at";
const SCHEDULE_WIDTH: usize = 13;

fn schedule_from_row(row: &Row<'_>) -> rusqlite::Result<ScheduledMessage> {
    let send_at: String = row.get(6)?;
    let status: String = row.get(7)?;
    let recurrence: String = row.get(8)?;
    let created_at: String = row.get(11)?;
    let updated_at: String = row.get(12)?;
    Ok(ScheduledMessage {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        contact_id: row.get(2)?,
        connection_id: row.get(3)?,
        body: row.get(4)?,
        media_path: row.get(5)?,
        send_at: parse_ts(6, &send_at)?,
        status: ScheduleStatus::from_str(&status).map_err(|e| conversion_err(7, e))?,
        recurrence: Recurrence::from_str(&recurrence).map_err(|e| conversion_err(8, e))?,
        recurrence_end: parse_opt_ts(9, row.get(9)?)?,
        sent_at: parse_opt_ts(10, row.get(10)?)?,
        created_at: parse_ts(11, &created_at)?,
        updated_at: parse_ts(12, &updated_at)?,
    })
}

/// Inserts every record inside one transaction and returns them with their ids.
pub async fn insert_schedules(
    db: &Database,
    records: Vec<NewSchedule>,
    now: DateTime<Utc>,
) -> Result<Vec<ScheduledMessage>, TicketflowError> {
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let mut inserted = Vec::with_capacity(records.len());
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO scheduled_messages
                       (tenant_id, contact_id, connection_id, body, media_path, send_at, status,
                        recurrence, recurrence_end, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'PENDING', ?7, ?8, ?9, ?9)",
                )?;
                for r in records {
                    stmt.execute(params![
                        r.tenant_id,
                        r.contact_id,
                        r.connection_id,
                        r.body,
                        r.media_path,
                        fmt_ts(r.send_at),
                        r.recurrence.to_string(),
                        r.recurrence_end.map(fmt_ts),
                        fmt_ts(now),
                    ])?;
                    inserted.push(ScheduledMessage {
                        id: tx.last_insert_rowid(),
                        tenant_id: r.tenant_id,
                        contact_id: r.contact_id,
                        connection_id: r.connection_id,
                        body: r.body,
                        media_path: r.media_path,
                        send_at: r.send_at,
                        status: ScheduleStatus::Pending,
                        recurrence: r.recurrence,
                        recurrence_end: r.recurrence_end,
                        sent_at: None,
                        created_at: now,
                        updated_at: now,
                    });
                }
            }
            tx.commit()?;
            Ok(inserted)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_schedule(
    db: &Database,
    id: i64,
) -> Result<Option<ScheduledMessage>, TicketflowError> {
    let sql = format!("SELECT {SCHEDULE_COLUMNS} FROM scheduled_messages m WHERE m.id = ?1");
    db.connection()
        .call(move |conn| conn.query_row(&sql, params![id], schedule_from_row).optional())
        .await
        .map_err(map_tr_err)
}

pub async fn list_schedules(
    db: &Database,
    tenant_id: i64,
) -> Result<Vec<ScheduledMessage>, TicketflowError> {
    let sql = format!(
        "SELECT {SCHEDULE_COLUMNS} FROM scheduled_messages m
         WHERE m.tenant_id = ?1 ORDER BY m.send_at ASC, m.id ASC"
    );
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![tenant_id], schedule_from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })
        .await
        .map_err(map_tr_err)
}

/// Overwrites the editable fields while the record is still PENDING.
pub async fn update_pending_schedule(
    db: &Database,
    s: &ScheduledMessage,
    now: DateTime<Utc>,
) -> Result<bool, TicketflowError> {
    let s = s.clone();
    db.connection()
        .call(move |conn| {
            let n = conn.execute(
                "UPDATE scheduled_messages SET
                   contact_id = ?2, connection_id = ?3, body = ?4, media_path = ?5,
                   send_at = ?6, recurrence = ?7, recurrence_end = ?8, updated_at = ?9
                 WHERE id = ?1 AND status = 'PENDING'",
                params![
                    s.id,
                    s.contact_id,
                    s.connection_id,
                    s.body,
                    s.media_path,
                    fmt_ts(s.send_at),
                    s.recurrence.to_string(),
                    s.recurrence_end.map(fmt_ts),
                    fmt_ts(now),
                ],
            )?;
            Ok(n == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// Claims up to `limit` PENDING records due by `cutoff`.
///
/// Selection and the flip to CLAIMED happen in one transaction on the single
/// writer, and each flip re-checks `status = 'PENDING'`, so two overlapping
/// claim cycles can never both return the same record.
pub async fn claim_due_schedules(
    db: &Database,
    cutoff: DateTime<Utc>,
    limit: usize,
    now: DateTime<Utc>,
) -> Result<Vec<ClaimedSchedule>, TicketflowError> {
    let sql = format!(
        "SELECT {SCHEDULE_COLUMNS}, ct.id, ct.tenant_id, ct.name, ct.number, ct.email
         FROM scheduled_messages m
         LEFT JOIN contacts ct ON ct.id = m.contact_id
         WHERE m.status = 'PENDING' AND m.send_at <= ?1
         ORDER BY m.send_at ASC, m.id ASC
         LIMIT ?2"
    );
    let cutoff = fmt_ts(cutoff);
    let now = fmt_ts(now);
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let candidates = {
                let mut stmt = tx.prepare(&sql)?;
                let rows = stmt.query_map(params![cutoff, limit], |row| {
                    let schedule = schedule_from_row(row)?;
                    let contact_id: Option<i64> = row.get(SCHEDULE_WIDTH)?;
                    let contact = match contact_id {
                        Some(_) => Some(contact_from_row(row, SCHEDULE_WIDTH)?),
                        None => None,
                    };
                    Ok(ClaimedSchedule { schedule, contact })
                })?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            };

            let mut claimed = Vec::with_capacity(candidates.len());
            {
                let mut flip = tx.prepare(
                    "UPDATE scheduled_messages SET status = 'CLAIMED', updated_at = ?2
                     WHERE id = ?1 AND status = 'PENDING'",
                )?;
                for mut c in candidates {
                    if flip.execute(params![c.schedule.id, now])? == 1 {
                        c.schedule.status = ScheduleStatus::Claimed;
                        claimed.push(c);
                    }
                }
            }
            tx.commit()?;
            Ok(claimed)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn mark_schedule_sent(
    db: &Database,
    id: i64,
    sent_at: DateTime<Utc>,
) -> Result<bool, TicketflowError> {
    let sent_at = fmt_ts(sent_at);
    db.connection()
        .call(move |conn| {
            let n = conn.execute(
                "UPDATE scheduled_messages SET status = 'SENT', sent_at = ?2, updated_at = ?2
                 WHERE id = ?1 AND status = 'CLAIMED'",
                params![id, sent_at],
            )?;
            Ok(n == 1)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn cancel_schedule(
    db: &Database,
    id: i64,
    now: DateTime<Utc>,
) -> Result<bool, TicketflowError> {
    let now = fmt_ts(now);
    db.connection()
        .call(move |conn| {
            let n = conn.execute(
                "UPDATE scheduled_messages SET status = 'CANCELLED', updated_at = ?2
                 WHERE id = ?1 AND status IN ('PENDING', 'CLAIMED')",
                params![id, now],
            )?;
            Ok(n == 1)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn new_schedule(send_at: DateTime<Utc>) -> NewSchedule {
        NewSchedule {
            tenant_id: 1,
            contact_id: 2,
            connection_id: 3,
            body: "Hello".into(),
            media_path: None,
            send_at,
            recurrence: Recurrence::None,
            recurrence_end: None,
        }
    }

    #[tokio::test]
    async fn second_claim_sees_nothing() {
        let (db, _dir) = setup_db().await;
        let now = Utc::now();
        insert_schedules(&db, vec![new_schedule(now + Duration::seconds(30))], now)
            .await
            .unwrap();

        let cutoff = now + Duration::seconds(60);
        let first = claim_due_schedules(&db, cutoff, 500, now).await.unwrap();
        let second = claim_due_schedules(&db, cutoff, 500, now).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].schedule.status, ScheduleStatus::Claimed);
        assert!(second.is_empty());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn claim_respects_cutoff_and_limit() {
        let (db, _dir) = setup_db().await;
        let now = Utc::now();
        let records = (0..5)
            .map(|i| new_schedule(now + Duration::seconds(i * 10)))
            .chain([new_schedule(now + Duration::hours(2))])
            .collect();
        insert_schedules(&db, records, now).await.unwrap();

        let cutoff = now + Duration::seconds(60);
        let batch = claim_due_schedules(&db, cutoff, 3, now).await.unwrap();
        assert_eq!(batch.len(), 3);
        let rest = claim_due_schedules(&db, cutoff, 3, now).await.unwrap();
        assert_eq!(rest.len(), 2);
        assert!(claim_due_schedules(&db, cutoff, 3, now).await.unwrap().is_empty());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn lifecycle_guards() {
        let (db, _dir) = setup_db().await;
        let now = Utc::now();
        let rec = insert_schedules(&db, vec![new_schedule(now)], now)
            .await
            .unwrap()
            .remove(0);

        // Not claimed yet.
        assert!(!mark_schedule_sent(&db, rec.id, now).await.unwrap());

        let mut edited = rec.clone();
        edited.body = "Hi there".into();
        assert!(update_pending_schedule(&db, &edited, now).await.unwrap());

        claim_due_schedules(&db, now, 10, now).await.unwrap();
        assert!(!update_pending_schedule(&db, &edited, now).await.unwrap());
        assert!(mark_schedule_sent(&db, rec.id, now).await.unwrap());

        let sent = get_schedule(&db, rec.id).await.unwrap().unwrap();
        assert_eq!(sent.status, ScheduleStatus::Sent);
        assert_eq!(sent.body, "Hi there");
        assert!(sent.sent_at.is_some());
        assert!(!cancel_schedule(&db, rec.id, now).await.unwrap());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn cancel_pending_record() {
        let (db, _dir) = setup_db().await;
        let now = Utc::now();
        let rec = insert_schedules(&db, vec![new_schedule(now)], now)
            .await
            .unwrap()
            .remove(0);
        assert!(cancel_schedule(&db, rec.id, now).await.unwrap());
        assert!(claim_due_schedules(&db, now, 10, now).await.unwrap().is_empty());
        assert_eq!(
            get_schedule(&db, rec.id).await.unwrap().unwrap().status,
            ScheduleStatus::Cancelled
        );
        db.close().await.unwrap();
    }
}
