//! `PlanStore` and `ActivityStore` over SQLite.

use crate::db;
use heirloom_core::{
    ActivityRecord, ActivityStore, Address, BeneficiaryClaim, InheritancePlan, LockedPool,
    PlanId, PlanStore, StoreError, SwitchTrigger, TransferredAsset,
};
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use std::path::Path;

const LAST_PLAN_ID: &str = "last_plan_id";

pub struct SqliteStore {
    conn: Connection,
}

fn backend(e: rusqlite::Error) -> StoreError {
    StoreError::backend(e)
}

fn decode<T: DeserializeOwned>(body: String) -> Result<T, StoreError> {
    Ok(serde_json::from_str(&body)?)
}

/// Plan ids come back from SQLite as i64.
fn plan_id(raw: i64) -> Result<PlanId, StoreError> {
    PlanId::try_from(raw).map_err(|_| StoreError::Corrupt(format!("negative plan id {}", raw)))
}

fn sql_id(id: PlanId) -> Result<i64, StoreError> {
    i64::try_from(id).map_err(|_| StoreError::Corrupt(format!("plan id {} out of range", id)))
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = db::open_db(path).map_err(backend)?;
        log::debug!("Plan store opened at {}", path.display());
        Ok(Self { conn })
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Ok(Self {
            conn: db::open_in_memory().map_err(backend)?,
        })
    }

    /// The underlying connection, shared with the inbox and event log.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    fn bodies(&self, sql: &str, id: PlanId) -> Result<Vec<String>, StoreError> {
        let mut stmt = self.conn.prepare_cached(sql).map_err(backend)?;
        let rows = stmt
            .query_map(params![sql_id(id)?], |row| row.get::<_, String>(0))
            .map_err(backend)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(backend)
    }

    fn body(&self, sql: &str, id: PlanId) -> Result<Option<String>, StoreError> {
        self.conn
            .query_row(sql, params![sql_id(id)?], |row| row.get(0))
            .optional()
            .map_err(backend)
    }

    fn ids(&self, sql: &str, key: &str) -> Result<Vec<PlanId>, StoreError> {
        let mut stmt = self.conn.prepare_cached(sql).map_err(backend)?;
        let rows = stmt
            .query_map(params![key], |row| row.get::<_, i64>(0))
            .map_err(backend)?;
        rows.map(|r| r.map_err(backend).and_then(plan_id)).collect()
    }
}

impl PlanStore for SqliteStore {
    fn next_plan_id(&mut self) -> Result<PlanId, StoreError> {
        let last = match db::meta_get(&self.conn, LAST_PLAN_ID).map_err(backend)? {
            Some(v) => v
                .parse::<PlanId>()
                .map_err(|_| StoreError::Corrupt(format!("{} = {:?}", LAST_PLAN_ID, v)))?,
            None => 0,
        };
        let next = last + 1;
        db::meta_set(&self.conn, LAST_PLAN_ID, &next.to_string()).map_err(backend)?;
        Ok(next)
    }

    fn put_plan(&mut self, plan: &InheritancePlan) -> Result<(), StoreError> {
        let body = serde_json::to_string(plan)?;
        let id = sql_id(plan.id)?;
        let tx = self.conn.transaction().map_err(backend)?;
        tx.execute(
            "INSERT INTO plans (id, owner, status, body) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                owner = excluded.owner,
                status = excluded.status,
                body = excluded.body",
            params![id, plan.owner.as_str(), plan.status.as_str(), body],
        )
        .map_err(backend)?;
        tx.execute("DELETE FROM plan_beneficiaries WHERE plan_id = ?1", params![id])
            .map_err(backend)?;
        for b in &plan.beneficiaries {
            tx.execute(
                "INSERT OR IGNORE INTO plan_beneficiaries (plan_id, address) VALUES (?1, ?2)",
                params![id, b.address.as_str()],
            )
            .map_err(backend)?;
        }
        tx.commit().map_err(backend)
    }

    fn plan(&self, id: PlanId) -> Result<Option<InheritancePlan>, StoreError> {
        self.body("SELECT body FROM plans WHERE id = ?1", id)?
            .map(decode)
            .transpose()
    }

    fn plan_ids(&self) -> Result<Vec<PlanId>, StoreError> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT id FROM plans ORDER BY id")
            .map_err(backend)?;
        let rows = stmt
            .query_map([], |row| row.get::<_, i64>(0))
            .map_err(backend)?;
        rows.map(|r| r.map_err(backend).and_then(plan_id)).collect()
    }

    fn plans_by_owner(&self, owner: &Address) -> Result<Vec<PlanId>, StoreError> {
        self.ids("SELECT id FROM plans WHERE owner = ?1 ORDER BY id", owner.as_str())
    }

    fn plans_by_beneficiary(&self, beneficiary: &Address) -> Result<Vec<PlanId>, StoreError> {
        self.ids(
            "SELECT plan_id FROM plan_beneficiaries WHERE address = ?1 ORDER BY plan_id",
            beneficiary.as_str(),
        )
    }

    fn trigger(&self, plan_id: PlanId) -> Result<Option<SwitchTrigger>, StoreError> {
        self.body("SELECT body FROM triggers WHERE plan_id = ?1", plan_id)?
            .map(decode)
            .transpose()
    }

    fn put_trigger(&mut self, trigger: &SwitchTrigger) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT INTO triggers (plan_id, body) VALUES (?1, ?2)
                 ON CONFLICT(plan_id) DO UPDATE SET body = excluded.body",
                params![sql_id(trigger.plan_id)?, serde_json::to_string(trigger)?],
            )
            .map_err(backend)?;
        Ok(())
    }

    fn remove_trigger(&mut self, plan_id: PlanId) -> Result<Option<SwitchTrigger>, StoreError> {
        let existing = self.trigger(plan_id)?;
        if existing.is_some() {
            self.conn
                .execute("DELETE FROM triggers WHERE plan_id = ?1", params![sql_id(plan_id)?])
                .map_err(backend)?;
        }
        Ok(existing)
    }

    fn claims(&self, plan_id: PlanId) -> Result<Vec<BeneficiaryClaim>, StoreError> {
        self.bodies(
            "SELECT body FROM claims WHERE plan_id = ?1 ORDER BY priority",
            plan_id,
        )?
        .into_iter()
        .map(decode)
        .collect()
    }

    fn put_claim(&mut self, claim: &BeneficiaryClaim) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT INTO claims (plan_id, priority, body) VALUES (?1, ?2, ?3)
                 ON CONFLICT(plan_id, priority) DO UPDATE SET body = excluded.body",
                params![
                    sql_id(claim.plan_id)?,
                    claim.priority,
                    serde_json::to_string(claim)?
                ],
            )
            .map_err(backend)?;
        Ok(())
    }

    fn locked_pool(&self, plan_id: PlanId) -> Result<Option<LockedPool>, StoreError> {
        self.body("SELECT body FROM locks WHERE plan_id = ?1", plan_id)?
            .map(decode)
            .transpose()
    }

    fn put_locked_pool(&mut self, pool: &LockedPool) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT INTO locks (plan_id, body) VALUES (?1, ?2)
                 ON CONFLICT(plan_id) DO UPDATE SET body = excluded.body",
                params![sql_id(pool.plan_id)?, serde_json::to_string(pool)?],
            )
            .map_err(backend)?;
        Ok(())
    }

    fn remove_locked_pool(&mut self, plan_id: PlanId) -> Result<Option<LockedPool>, StoreError> {
        let existing = self.locked_pool(plan_id)?;
        if existing.is_some() {
            self.conn
                .execute("DELETE FROM locks WHERE plan_id = ?1", params![sql_id(plan_id)?])
                .map_err(backend)?;
        }
        Ok(existing)
    }

    fn append_transfer(&mut self, record: &TransferredAsset) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT INTO transfers (plan_id, body) VALUES (?1, ?2)",
                params![sql_id(record.plan_id)?, serde_json::to_string(record)?],
            )
            .map_err(backend)?;
        Ok(())
    }

    fn transfers(&self, plan_id: PlanId) -> Result<Vec<TransferredAsset>, StoreError> {
        self.bodies(
            "SELECT body FROM transfers WHERE plan_id = ?1 ORDER BY id",
            plan_id,
        )?
        .into_iter()
        .map(decode)
        .collect()
    }
}

impl ActivityStore for SqliteStore {
    fn activity(&self, address: &Address) -> Result<Option<ActivityRecord>, StoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT height, time FROM activity WHERE address = ?1",
                params![address.as_str()],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()
            .map_err(backend)?;

        row.map(|(height, time)| {
            Ok(ActivityRecord {
                address: address.clone(),
                last_activity_height: u64::try_from(height)
                    .map_err(|_| StoreError::Corrupt(format!("activity height {}", height)))?,
                last_activity_time: u64::try_from(time)
                    .map_err(|_| StoreError::Corrupt(format!("activity time {}", time)))?,
            })
        })
        .transpose()
    }

    fn put_activity(&mut self, record: &ActivityRecord) -> Result<(), StoreError> {
        let height = i64::try_from(record.last_activity_height)
            .map_err(|_| StoreError::Corrupt("activity height out of range".into()))?;
        let time = i64::try_from(record.last_activity_time)
            .map_err(|_| StoreError::Corrupt("activity time out of range".into()))?;
        self.conn
            .execute(
                "INSERT INTO activity (address, height, time) VALUES (?1, ?2, ?3)
                 ON CONFLICT(address) DO UPDATE SET
                    height = excluded.height,
                    time = excluded.time",
                params![record.address.as_str(), height, time],
            )
            .map_err(backend)?;
        Ok(())
    }
}
