//! Message inbox, event log and the chain clock.
//!
//! The inbox holds signed messages queued by clients until the next step
//! applies them in id order. The event log keeps every event a step
//! emitted, for indexers. The clock is the last step's height and time.

use crate::db;
use heirloom_core::{Address, BlockTime, InheritanceEvent, PlanId};
use rusqlite::{params, Connection};
use thiserror::Error;

const CLOCK_HEIGHT: &str = "clock_height";
const CLOCK_TIME: &str = "clock_time";

#[derive(Error, Debug)]
pub enum JournalError {
    #[error("database error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("corrupt journal: {0}")]
    Corrupt(String),
}

/// A message waiting in the inbox. `body` is the JSON the client queued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedMsg {
    pub id: i64,
    pub signer: Address,
    pub body: String,
}

fn to_sql(value: u64, what: &str) -> Result<i64, JournalError> {
    i64::try_from(value).map_err(|_| JournalError::Corrupt(format!("{} {} out of range", what, value)))
}

pub fn enqueue(
    conn: &Connection,
    signer: &Address,
    body: &str,
    queued_at: u64,
) -> Result<i64, JournalError> {
    conn.execute(
        "INSERT INTO inbox (signer, body, queued_at) VALUES (?1, ?2, ?3)",
        params![signer.as_str(), body, to_sql(queued_at, "queued_at")?],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Unapplied messages, oldest first.
pub fn pending(conn: &Connection) -> Result<Vec<QueuedMsg>, JournalError> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, signer, body FROM inbox WHERE applied_at IS NULL ORDER BY id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(QueuedMsg {
            id: row.get(0)?,
            signer: Address::new(row.get::<_, String>(1)?),
            body: row.get(2)?,
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Record that a message was applied at `height`, with the rejection
/// reason if it failed.
pub fn mark_applied(
    conn: &Connection,
    id: i64,
    height: u64,
    error: Option<&str>,
) -> Result<(), JournalError> {
    conn.execute(
        "UPDATE inbox SET applied_at = ?2, error_msg = ?3 WHERE id = ?1",
        params![id, to_sql(height, "height")?, error],
    )?;
    Ok(())
}

/// The outcome recorded for message `id`: `None` while still queued,
/// `Some(None)` once applied cleanly, `Some(Some(reason))` if rejected.
pub fn outcome(conn: &Connection, id: i64) -> Result<Option<Option<String>>, JournalError> {
    let row: (Option<i64>, Option<String>) = conn.query_row(
        "SELECT applied_at, error_msg FROM inbox WHERE id = ?1",
        params![id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    Ok(row.0.map(|_| row.1))
}

pub fn append_events(
    conn: &Connection,
    at: BlockTime,
    events: &[InheritanceEvent],
) -> Result<usize, JournalError> {
    let height = to_sql(at.height, "height")?;
    let time = to_sql(at.time, "time")?;
    let mut stmt = conn.prepare_cached(
        "INSERT INTO event_log (height, time, plan_id, kind, body) VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for event in events {
        stmt.execute(params![
            height,
            time,
            to_sql(event.plan_id(), "plan id")?,
            event.name(),
            serde_json::to_string(event)?
        ])?;
    }
    Ok(events.len())
}

pub fn events_for_plan(
    conn: &Connection,
    plan_id: PlanId,
) -> Result<Vec<InheritanceEvent>, JournalError> {
    let mut stmt =
        conn.prepare_cached("SELECT body FROM event_log WHERE plan_id = ?1 ORDER BY id")?;
    let rows = stmt.query_map(params![to_sql(plan_id, "plan id")?], |row| {
        row.get::<_, String>(0)
    })?;

    let mut events = Vec::new();
    for body in rows {
        events.push(serde_json::from_str(&body?)?);
    }
    Ok(events)
}

/// The last step's height and time, if any step has run.
pub fn chain_clock(conn: &Connection) -> Result<Option<BlockTime>, JournalError> {
    let height = db::meta_get(conn, CLOCK_HEIGHT)?;
    let time = db::meta_get(conn, CLOCK_TIME)?;
    match (height, time) {
        (Some(h), Some(t)) => {
            let parse = |v: &str| {
                v.parse::<u64>()
                    .map_err(|_| JournalError::Corrupt(format!("clock value {:?}", v)))
            };
            Ok(Some(BlockTime::new(parse(&h)?, parse(&t)?)))
        }
        (None, None) => Ok(None),
        _ => Err(JournalError::Corrupt("clock half written".into())),
    }
}

pub fn set_chain_clock(conn: &Connection, at: BlockTime) -> Result<(), JournalError> {
    let tx = conn.unchecked_transaction()?;
    db::meta_set(&tx, CLOCK_HEIGHT, &at.height.to_string())?;
    db::meta_set(&tx, CLOCK_TIME, &at.time.to_string())?;
    tx.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbox_drains_in_order() {
        let conn = db::open_in_memory().unwrap();
        let owner = Address::from("heir1owner");
        let first = enqueue(&conn, &owner, r#"{"type":"cancel_plan","plan_id":1}"#, 10).unwrap();
        let second = enqueue(&conn, &owner, r#"{"type":"cancel_plan","plan_id":2}"#, 11).unwrap();

        let queued = pending(&conn).unwrap();
        assert_eq!(queued.iter().map(|m| m.id).collect::<Vec<_>>(), vec![first, second]);
        assert_eq!(outcome(&conn, first).unwrap(), None);

        mark_applied(&conn, first, 5, None).unwrap();
        mark_applied(&conn, second, 5, Some("plan 2 not found")).unwrap();
        assert!(pending(&conn).unwrap().is_empty());
        assert_eq!(outcome(&conn, first).unwrap(), Some(None));
        assert_eq!(
            outcome(&conn, second).unwrap(),
            Some(Some("plan 2 not found".to_string()))
        );
    }

    #[test]
    fn test_event_log_per_plan() {
        let conn = db::open_in_memory().unwrap();
        let events = vec![
            InheritanceEvent::PlanCreated {
                plan_id: 1,
                owner: Address::from("heir1owner"),
            },
            InheritanceEvent::PlanCancelled { plan_id: 2 },
            InheritanceEvent::PlanCancelled { plan_id: 1 },
        ];
        assert_eq!(append_events(&conn, BlockTime::new(3, 30), &events).unwrap(), 3);

        let logged = events_for_plan(&conn, 1).unwrap();
        assert_eq!(logged, vec![events[0].clone(), events[2].clone()]);
    }

    #[test]
    fn test_chain_clock() {
        let conn = db::open_in_memory().unwrap();
        assert_eq!(chain_clock(&conn).unwrap(), None);
        set_chain_clock(&conn, BlockTime::new(12, 1_700_000_000)).unwrap();
        assert_eq!(
            chain_clock(&conn).unwrap(),
            Some(BlockTime::new(12, 1_700_000_000))
        );
    }
}
