//! A host backed by the same SQLite file: balances, share registry and
//! ban list.
//!
//! Standalone deployments use this as the chain the engine runs on; an
//! embedding chain would implement the host traits over its own modules
//! instead.

use crate::db;
use heirloom_core::{
    Address, Amount, AssetId, BalanceLedger, BanRegistry, EquityHolding, EquityRegistry,
    HostError,
};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

pub struct SqliteLedger {
    conn: Connection,
}

fn unavailable(e: rusqlite::Error) -> HostError {
    HostError::Unavailable(e.to_string())
}

fn parse_amount(raw: &str) -> Result<Amount, HostError> {
    raw.parse()
        .map_err(|_| HostError::Unavailable(format!("corrupt amount {:?}", raw)))
}

impl SqliteLedger {
    pub fn open(path: &Path) -> Result<Self, HostError> {
        let conn = db::open_db(path).map_err(unavailable)?;
        log::debug!("Ledger opened at {}", path.display());
        Ok(Self { conn })
    }

    pub fn in_memory() -> Result<Self, HostError> {
        Ok(Self {
            conn: db::open_in_memory().map_err(unavailable)?,
        })
    }

    /// Credit `amount` of `denom` to `owner`.
    pub fn mint(&mut self, owner: &Address, denom: &str, amount: Amount) -> Result<(), HostError> {
        let current = self.balance(owner, denom)?;
        set_balance(&self.conn, owner, denom, current.saturating_add(amount))
    }

    pub fn issue_shares(
        &mut self,
        owner: &Address,
        company_id: &str,
        class_id: &str,
        shares: Amount,
    ) -> Result<(), HostError> {
        let current = share_count(&self.conn, owner, company_id, class_id)?;
        set_shares(&self.conn, owner, company_id, class_id, current.saturating_add(shares))
    }

    pub fn ban(&mut self, address: &Address) -> Result<(), HostError> {
        self.conn
            .execute(
                "INSERT OR IGNORE INTO bans (address) VALUES (?1)",
                params![address.as_str()],
            )
            .map_err(unavailable)?;
        Ok(())
    }

    pub fn unban(&mut self, address: &Address) -> Result<(), HostError> {
        self.conn
            .execute("DELETE FROM bans WHERE address = ?1", params![address.as_str()])
            .map_err(unavailable)?;
        Ok(())
    }
}

fn set_balance(conn: &Connection, owner: &Address, denom: &str, amount: Amount) -> Result<(), HostError> {
    conn.execute(
        "INSERT INTO balances (owner, denom, amount) VALUES (?1, ?2, ?3)
         ON CONFLICT(owner, denom) DO UPDATE SET amount = excluded.amount",
        params![owner.as_str(), denom, amount.to_string()],
    )
    .map_err(unavailable)?;
    Ok(())
}

fn share_count(
    conn: &Connection,
    owner: &Address,
    company_id: &str,
    class_id: &str,
) -> Result<Amount, HostError> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT shares FROM shares WHERE owner = ?1 AND company_id = ?2 AND class_id = ?3",
            params![owner.as_str(), company_id, class_id],
            |row| row.get(0),
        )
        .optional()
        .map_err(unavailable)?;
    raw.as_deref().map(parse_amount).transpose().map(|s| s.unwrap_or(0))
}

fn set_shares(
    conn: &Connection,
    owner: &Address,
    company_id: &str,
    class_id: &str,
    shares: Amount,
) -> Result<(), HostError> {
    conn.execute(
        "INSERT INTO shares (owner, company_id, class_id, shares) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(owner, company_id, class_id) DO UPDATE SET shares = excluded.shares",
        params![owner.as_str(), company_id, class_id, shares.to_string()],
    )
    .map_err(unavailable)?;
    Ok(())
}

impl BalanceLedger for SqliteLedger {
    fn balance(&self, owner: &Address, denom: &str) -> Result<Amount, HostError> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT amount FROM balances WHERE owner = ?1 AND denom = ?2",
                params![owner.as_str(), denom],
                |row| row.get(0),
            )
            .optional()
            .map_err(unavailable)?;
        raw.as_deref().map(parse_amount).transpose().map(|a| a.unwrap_or(0))
    }

    fn balances(&self, owner: &Address) -> Result<Vec<(String, Amount)>, HostError> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT denom, amount FROM balances WHERE owner = ?1 ORDER BY denom")
            .map_err(unavailable)?;
        let rows = stmt
            .query_map(params![owner.as_str()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(unavailable)?;

        let mut balances = Vec::new();
        for row in rows {
            let (denom, raw) = row.map_err(unavailable)?;
            let amount = parse_amount(&raw)?;
            if amount > 0 {
                balances.push((denom, amount));
            }
        }
        Ok(balances)
    }

    /// Debit and credit commit together or not at all.
    fn send(
        &mut self,
        from: &Address,
        to: &Address,
        denom: &str,
        amount: Amount,
    ) -> Result<(), HostError> {
        let available = self.balance(from, denom)?;
        if available < amount {
            return Err(HostError::InsufficientFunds {
                owner: from.clone(),
                asset: AssetId::custom(denom),
                available,
                required: amount,
            });
        }
        if from == to {
            return Ok(());
        }
        let credited = self.balance(to, denom)?;

        let tx = self.conn.transaction().map_err(unavailable)?;
        set_balance(&tx, from, denom, available - amount)?;
        set_balance(&tx, to, denom, credited.saturating_add(amount))?;
        tx.commit().map_err(unavailable)
    }
}

impl EquityRegistry for SqliteLedger {
    fn holdings_by_owner(&self, owner: &Address) -> Result<Vec<EquityHolding>, HostError> {
        let mut stmt = self
            .conn
            .prepare_cached(
                "SELECT company_id, class_id, shares FROM shares
                 WHERE owner = ?1 ORDER BY company_id, class_id",
            )
            .map_err(unavailable)?;
        let rows = stmt
            .query_map(params![owner.as_str()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .map_err(unavailable)?;

        let mut holdings = Vec::new();
        for row in rows {
            let (company_id, class_id, raw) = row.map_err(unavailable)?;
            let shares = parse_amount(&raw)?;
            if shares > 0 {
                holdings.push(EquityHolding {
                    company_id,
                    class_id,
                    shares,
                });
            }
        }
        Ok(holdings)
    }

    fn transfer_shares(
        &mut self,
        from: &Address,
        to: &Address,
        company_id: &str,
        class_id: &str,
        shares: Amount,
    ) -> Result<(), HostError> {
        let available = share_count(&self.conn, from, company_id, class_id)?;
        if available < shares {
            return Err(HostError::InsufficientFunds {
                owner: from.clone(),
                asset: AssetId::equity(company_id, class_id),
                available,
                required: shares,
            });
        }
        if from == to {
            return Ok(());
        }
        let credited = share_count(&self.conn, to, company_id, class_id)?;

        let tx = self.conn.transaction().map_err(unavailable)?;
        set_shares(&tx, from, company_id, class_id, available - shares)?;
        set_shares(&tx, to, company_id, class_id, credited.saturating_add(shares))?;
        tx.commit().map_err(unavailable)
    }
}

impl BanRegistry for SqliteLedger {
    fn is_banned(&self, address: &Address) -> Result<bool, HostError> {
        self.conn
            .query_row(
                "SELECT 1 FROM bans WHERE address = ?1",
                params![address.as_str()],
                |_| Ok(()),
            )
            .optional()
            .map(|row| row.is_some())
            .map_err(unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Address {
        Address::from(s)
    }

    #[test]
    fn test_send_moves_and_checks_funds() {
        let mut ledger = SqliteLedger::in_memory().unwrap();
        ledger.mint(&addr("heir1owner"), "uheir", 1_000).unwrap();

        ledger
            .send(&addr("heir1owner"), &addr("heir1alice"), "uheir", 600)
            .unwrap();
        assert_eq!(ledger.balance(&addr("heir1owner"), "uheir").unwrap(), 400);
        assert_eq!(ledger.balance(&addr("heir1alice"), "uheir").unwrap(), 600);

        let err = ledger
            .send(&addr("heir1owner"), &addr("heir1alice"), "uheir", 401)
            .unwrap_err();
        assert!(matches!(err, HostError::InsufficientFunds { available: 400, .. }));
        assert_eq!(ledger.balance(&addr("heir1owner"), "uheir").unwrap(), 400);
    }

    #[test]
    fn test_amounts_beyond_u64() {
        let mut ledger = SqliteLedger::in_memory().unwrap();
        let big = u64::MAX as u128 * 4;
        ledger.mint(&addr("heir1owner"), "uheir", big).unwrap();
        assert_eq!(
            ledger.balances(&addr("heir1owner")).unwrap(),
            vec![("uheir".to_string(), big)]
        );
    }

    #[test]
    fn test_shares_and_bans() {
        let mut ledger = SqliteLedger::in_memory().unwrap();
        ledger
            .issue_shares(&addr("heir1owner"), "acme", "common", 500)
            .unwrap();
        ledger
            .transfer_shares(&addr("heir1owner"), &addr("heir1bob"), "acme", "common", 500)
            .unwrap();
        assert!(ledger.holdings_by_owner(&addr("heir1owner")).unwrap().is_empty());
        assert_eq!(
            ledger.holdings_by_owner(&addr("heir1bob")).unwrap()[0].shares,
            500
        );

        assert!(!ledger.is_banned(&addr("heir1bob")).unwrap());
        ledger.ban(&addr("heir1bob")).unwrap();
        assert!(ledger.is_banned(&addr("heir1bob")).unwrap());
        ledger.unban(&addr("heir1bob")).unwrap();
        assert!(!ledger.is_banned(&addr("heir1bob")).unwrap());
    }
}
