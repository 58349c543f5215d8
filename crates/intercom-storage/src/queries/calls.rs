// SPDX-FileCopyrightText: 2026 Intercom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Call and participant persistence.
//!
//! Each mutating operation runs in one transaction on the connection thread
//! and gates its status change on an `UPDATE ... WHERE status = ...` whose
//! affected-row count decides the outcome. The conditional writes take the
//! write lock up front (`BEGIN IMMEDIATE`) so a second process on the same
//! file waits on the busy timeout instead of failing the lock upgrade.

use chrono::{DateTime, Utc};
use intercom_core::api::{HistoryPage, HistoryQuery, Pagination};
use intercom_core::traits::{AnswerWrite, DeclineWrite, EndWrite};
use intercom_core::{Call, CallId, CallSnapshot, IntercomError, Participant, UserType};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params, params_from_iter};

use crate::database::Database;
use crate::models::{decode_enum, decode_opt_ts, decode_ts, encode_ts};

const CALL_COLUMNS: &str = "id, channel_name, apartment_id, apartment_number, building_id, \
     doorman_id, status, started_at, answered_at, ended_at, duration_seconds, end_cause";

/// Page size used when a history query reaches the store without a limit.
pub const DEFAULT_HISTORY_LIMIT: u32 = 50;

const PENDING: &str = "('invited', 'ringing', 'notified')";

fn aliased_call_columns() -> String {
    CALL_COLUMNS
        .split(',')
        .map(|col| format!("c.{}", col.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn call_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Call> {
    Ok(Call {
        id: CallId(row.get(0)?),
        channel_name: row.get(1)?,
        apartment_id: row.get(2)?,
        apartment_number: row.get(3)?,
        building_id: row.get(4)?,
        doorman_id: row.get(5)?,
        status: decode_enum(6, row.get(6)?)?,
        started_at: decode_ts(7, row.get(7)?)?,
        answered_at: decode_opt_ts(8, row.get(8)?)?,
        ended_at: decode_opt_ts(9, row.get(9)?)?,
        duration_seconds: row.get(10)?,
        end_cause: row.get(11)?,
    })
}

fn participant_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Participant> {
    Ok(Participant {
        call_id: CallId(row.get(0)?),
        user_id: row.get(1)?,
        user_type: decode_enum(2, row.get(2)?)?,
        status: decode_enum(3, row.get(3)?)?,
        name: row.get(4)?,
        joined_at: decode_opt_ts(5, row.get(5)?)?,
        left_at: decode_opt_ts(6, row.get(6)?)?,
    })
}

/// Reads a call and its participants using whatever connection or
/// transaction the caller holds.
fn load_snapshot(conn: &Connection, id: &str) -> rusqlite::Result<Option<CallSnapshot>> {
    let call = conn
        .query_row(
            &format!("SELECT {CALL_COLUMNS} FROM calls WHERE id = ?1"),
            params![id],
            call_from_row,
        )
        .optional()?;
    let Some(call) = call else {
        return Ok(None);
    };
    let mut stmt = conn.prepare(
        "SELECT call_id, user_id, user_type, status, name, joined_at, left_at
         FROM call_participants WHERE call_id = ?1 ORDER BY position",
    )?;
    let participants = stmt
        .query_map(params![id], participant_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(Some(CallSnapshot { call, participants }))
}

fn reload(conn: &Connection, id: &str) -> rusqlite::Result<CallSnapshot> {
    load_snapshot(conn, id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
}

/// Inserts a call with all of its participants.
pub async fn insert_call(
    db: &Database,
    call: &Call,
    participants: &[Participant],
) -> Result<(), IntercomError> {
    let call = call.clone();
    let participants = participants.to_vec();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            let tx = conn.transaction()?;
            tx.execute(
                &format!(
                    "INSERT INTO calls ({CALL_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
                ),
                params![
                    call.id.as_str(),
                    call.channel_name,
                    call.apartment_id,
                    call.apartment_number,
                    call.building_id,
                    call.doorman_id,
                    call.status.to_string(),
                    encode_ts(&call.started_at),
                    call.answered_at.as_ref().map(encode_ts),
                    call.ended_at.as_ref().map(encode_ts),
                    call.duration_seconds,
                    call.end_cause,
                ],
            )?;
            for (position, p) in participants.iter().enumerate() {
                tx.execute(
                    "INSERT INTO call_participants
                         (call_id, user_id, user_type, status, name, joined_at, left_at, position)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        p.call_id.as_str(),
                        p.user_id,
                        p.user_type.to_string(),
                        p.status.to_string(),
                        p.name,
                        p.joined_at.as_ref().map(encode_ts),
                        p.left_at.as_ref().map(encode_ts),
                        position as i64,
                    ],
                )?;
            }
            tx.commit()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Reads a call snapshot.
pub async fn get_call(db: &Database, id: &CallId) -> Result<Option<CallSnapshot>, IntercomError> {
    let id = id.0.clone();
    db.connection()
        .call(move |conn| -> Result<Option<CallSnapshot>, rusqlite::Error> {
            load_snapshot(conn, &id)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// First-answer-wins write.
pub async fn answer_call(
    db: &Database,
    id: &CallId,
    user_id: &str,
    at: DateTime<Utc>,
) -> Result<AnswerWrite, IntercomError> {
    let id = id.0.clone();
    let user_id = user_id.to_string();
    db.connection()
        .call(move |conn| -> Result<AnswerWrite, rusqlite::Error> {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let Some(snapshot) = load_snapshot(&tx, &id)? else {
                return Ok(AnswerWrite::CallMissing);
            };
            let Some(answerer) = snapshot.participant(&user_id).cloned() else {
                return Ok(AnswerWrite::NotParticipant);
            };
            if !snapshot.call.status.is_ringing() {
                return Ok(AnswerWrite::NotRinging(snapshot.call.status));
            }
            if !answerer.status.is_pending() {
                return Ok(AnswerWrite::ParticipantNotPending(answerer.status));
            }

            let at = encode_ts(&at);
            let won = tx.execute(
                "UPDATE calls SET status = 'active', answered_at = ?1
                 WHERE id = ?2 AND status = 'ringing'",
                params![at, id],
            )?;
            if won == 0 {
                let status = reload(&tx, &id)?.call.status;
                return Ok(AnswerWrite::NotRinging(status));
            }

            tx.execute(
                "UPDATE call_participants SET status = 'connected', joined_at = ?1
                 WHERE call_id = ?2 AND user_id = ?3",
                params![at, id, user_id],
            )?;
            if answerer.user_type == UserType::Resident {
                tx.execute(
                    &format!(
                        "UPDATE call_participants SET status = 'missed', left_at = ?1
                         WHERE call_id = ?2 AND user_id != ?3 AND user_type = 'resident'
                           AND status IN {PENDING}"
                    ),
                    params![at, id, user_id],
                )?;
            }
            let snapshot = reload(&tx, &id)?;
            tx.commit()?;
            Ok(AnswerWrite::Answered(snapshot))
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Records a decline and flips the call to `declined` once no resident is
/// left to answer.
pub async fn decline_call(
    db: &Database,
    id: &CallId,
    user_id: &str,
    at: DateTime<Utc>,
) -> Result<DeclineWrite, IntercomError> {
    let id = id.0.clone();
    let user_id = user_id.to_string();
    db.connection()
        .call(move |conn| -> Result<DeclineWrite, rusqlite::Error> {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let Some(snapshot) = load_snapshot(&tx, &id)? else {
                return Ok(DeclineWrite::CallMissing);
            };
            if snapshot.participant(&user_id).is_none() {
                return Ok(DeclineWrite::NotParticipant);
            }
            if !snapshot.call.status.is_ringing() {
                return Ok(DeclineWrite::NotRinging(snapshot.call.status));
            }

            let at = encode_ts(&at);
            tx.execute(
                &format!(
                    "UPDATE call_participants SET status = 'declined', left_at = ?1
                     WHERE call_id = ?2 AND user_id = ?3 AND status IN {PENDING}"
                ),
                params![at, id, user_id],
            )?;

            let remaining: i64 = tx.query_row(
                "SELECT COUNT(*) FROM call_participants
                 WHERE call_id = ?1 AND user_type = 'resident' AND status != 'declined'",
                params![id],
                |row| row.get(0),
            )?;
            let call_declined = remaining == 0
                && tx.execute(
                    "UPDATE calls SET status = 'declined', ended_at = ?1, end_cause = 'declined'
                     WHERE id = ?2 AND status = 'ringing'",
                    params![at, id],
                )? == 1;
            if call_declined {
                // The doorman's leg closes with the call.
                tx.execute(
                    "UPDATE call_participants SET status = 'disconnected', left_at = ?1
                     WHERE call_id = ?2 AND user_type = 'doorman' AND status = 'connected'",
                    params![at, id],
                )?;
            }

            let snapshot = reload(&tx, &id)?;
            tx.commit()?;
            Ok(DeclineWrite::Recorded {
                snapshot,
                call_declined,
            })
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Ends a ringing or active call.
pub async fn end_call(
    db: &Database,
    id: &CallId,
    ended_by: Option<&str>,
    cause: &str,
    at: DateTime<Utc>,
) -> Result<EndWrite, IntercomError> {
    let id = id.0.clone();
    let ended_by = ended_by.map(str::to_string);
    let cause = cause.to_string();
    db.connection()
        .call(move |conn| -> Result<EndWrite, rusqlite::Error> {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let Some(snapshot) = load_snapshot(&tx, &id)? else {
                return Ok(EndWrite::CallMissing);
            };
            if snapshot.call.status.is_final() {
                return Ok(EndWrite::AlreadyFinal(snapshot));
            }

            let duration = snapshot
                .call
                .answered_at
                .map(|answered| (at - answered).num_seconds().max(0));
            let at = encode_ts(&at);
            let changed = tx.execute(
                "UPDATE calls SET status = 'ended', ended_at = ?1, duration_seconds = ?2, end_cause = ?3
                 WHERE id = ?4 AND status IN ('ringing', 'active')",
                params![at, duration, cause, id],
            )?;
            if changed == 0 {
                return Ok(EndWrite::AlreadyFinal(reload(&tx, &id)?));
            }

            if let Some(ender) = &ended_by {
                tx.execute(
                    &format!(
                        "UPDATE call_participants SET status = 'disconnected', left_at = ?1
                         WHERE call_id = ?2 AND user_id = ?3 AND status IN {PENDING}"
                    ),
                    params![at, id, ender],
                )?;
            }
            tx.execute(
                "UPDATE call_participants SET status = 'disconnected', left_at = ?1
                 WHERE call_id = ?2 AND status IN ('connected', 'ringing')",
                params![at, id],
            )?;
            tx.execute(
                "UPDATE call_participants SET status = 'missed', left_at = ?1
                 WHERE call_id = ?2 AND status IN ('invited', 'notified')",
                params![at, id],
            )?;

            let snapshot = reload(&tx, &id)?;
            tx.commit()?;
            Ok(EndWrite::Ended(snapshot))
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Filtered, paginated call history, newest first.
pub async fn call_history(db: &Database, query: &HistoryQuery) -> Result<HistoryPage, IntercomError> {
    let query = query.clone();
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    let offset = query.offset.unwrap_or(0);
    db.connection()
        .call(move |conn| -> Result<HistoryPage, rusqlite::Error> {
            let mut clauses = vec!["c.building_id = ?".to_string()];
            let mut values = vec![Value::Text(query.building_id.clone())];
            if let Some(user_id) = &query.user_id {
                if query.user_type.as_deref() == Some("doorman") {
                    clauses.push("c.doorman_id = ?".into());
                } else {
                    clauses.push(
                        "EXISTS (SELECT 1 FROM call_participants p
                                 WHERE p.call_id = c.id AND p.user_id = ?)"
                            .into(),
                    );
                }
                values.push(Value::Text(user_id.clone()));
            }
            if let Some(status) = query.status {
                clauses.push("c.status = ?".into());
                values.push(Value::Text(status.to_string()));
            }
            let filter = clauses.join(" AND ");

            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM calls c WHERE {filter}"),
                params_from_iter(values.iter()),
                |row| row.get(0),
            )?;

            let columns = aliased_call_columns();
            values.push(Value::Integer(i64::from(limit)));
            values.push(Value::Integer(i64::from(offset)));
            let mut stmt = conn.prepare(&format!(
                "SELECT {columns} FROM calls c WHERE {filter}
                 ORDER BY c.started_at DESC, c.id LIMIT ? OFFSET ?"
            ))?;
            let calls = stmt
                .query_map(params_from_iter(values.iter()), call_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(HistoryPage {
                calls,
                pagination: Pagination {
                    limit,
                    offset,
                    total: u64::try_from(total).unwrap_or(0),
                },
            })
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Ringing or active calls of a building, newest first.
pub async fn open_calls(db: &Database, building_id: &str) -> Result<Vec<Call>, IntercomError> {
    let building_id = building_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<Call>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CALL_COLUMNS} FROM calls
                 WHERE building_id = ?1 AND status IN ('ringing', 'active')
                 ORDER BY started_at DESC"
            ))?;
            let calls = stmt
                .query_map(params![building_id], call_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(calls)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Ringing calls on which `user_id` is a resident still waiting to answer.
pub async fn pending_calls_for(db: &Database, user_id: &str) -> Result<Vec<Call>, IntercomError> {
    let user_id = user_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<Call>, rusqlite::Error> {
            let columns = aliased_call_columns();
            let mut stmt = conn.prepare(&format!(
                "SELECT {columns} FROM calls c
                 JOIN call_participants p ON p.call_id = c.id
                 WHERE p.user_id = ?1 AND p.user_type = 'resident'
                   AND p.status IN {PENDING} AND c.status = 'ringing'
                 ORDER BY c.started_at DESC"
            ))?;
            let calls = stmt
                .query_map(params![user_id], call_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(calls)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Ids of calls still ringing that started strictly before `cutoff`.
pub async fn ringing_before(
    db: &Database,
    cutoff: DateTime<Utc>,
) -> Result<Vec<CallId>, IntercomError> {
    let cutoff = encode_ts(&cutoff);
    db.connection()
        .call(move |conn| -> Result<Vec<CallId>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT id FROM calls WHERE status = 'ringing' AND started_at < ?1
                 ORDER BY started_at",
            )?;
            let ids = stmt
                .query_map(params![cutoff], |row| row.get::<_, String>(0).map(CallId))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(ids)
        })
        .await
        .map_err(crate::database::map_tr_err)
}
