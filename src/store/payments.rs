//! Payment ledger. A row per invoice or receipt; settlement is idempotent.

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};
use tracing::info;

use super::subscriptions::{Subscription, grant_in};
use super::{Database, StoreError, to_ts};
use crate::payments::plans::Plan;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    CryptoBot,
    Transfer,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::CryptoBot => "cryptobot",
            Provider::Transfer => "transfer",
        }
    }

    fn from_str(s: &str) -> Option<Self> {
        match s {
            "cryptobot" => Some(Provider::CryptoBot),
            "transfer" => Some(Provider::Transfer),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStatus {
    Pending,
    Paid,
    Rejected,
}

impl PaymentStatus {
    fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Rejected => "rejected",
        }
    }

    fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PaymentStatus::Pending),
            "paid" => Some(PaymentStatus::Paid),
            "rejected" => Some(PaymentStatus::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payment {
    pub id: i64,
    pub provider: Provider,
    pub external_id: String,
    pub user_id: i64,
    pub plan: Plan,
    pub amount_rub: u32,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    Credited { payment: Payment, subscription: Subscription },
    /// Already paid or rejected; nothing changed.
    AlreadySettled,
    Unknown,
}

fn invalid(idx: usize, what: &str, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        Type::Text,
        format!("unknown {what} '{value}'").into(),
    )
}

const PAYMENT_COLUMNS: &str = "id, provider, external_id, user_id, plan, amount_rub, status, created_at";

fn payment_from_row(row: &Row<'_>) -> rusqlite::Result<Payment> {
    let provider: String = row.get(1)?;
    let plan: String = row.get(4)?;
    let status: String = row.get(6)?;
    let created_at: i64 = row.get(7)?;

    Ok(Payment {
        id: row.get(0)?,
        provider: Provider::from_str(&provider).ok_or_else(|| invalid(1, "provider", &provider))?,
        external_id: row.get(2)?,
        user_id: row.get(3)?,
        plan: Plan::from_key(&plan).ok_or_else(|| invalid(4, "plan", &plan))?,
        amount_rub: row.get(5)?,
        status: PaymentStatus::from_str(&status).ok_or_else(|| invalid(6, "status", &status))?,
        created_at: DateTime::from_timestamp(created_at, 0)
            .ok_or_else(|| invalid(7, "timestamp", &created_at.to_string()))?,
    })
}

fn load(conn: &Connection, id: i64) -> Result<Option<Payment>, StoreError> {
    Ok(conn
        .query_row(
            &format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = ?1"),
            params![id],
            payment_from_row,
        )
        .optional()?)
}

fn upsert_pending(
    conn: &Connection,
    provider: Provider,
    external_id: &str,
    user_id: i64,
    plan: Plan,
    amount_rub: u32,
    now: DateTime<Utc>,
) -> Result<i64, StoreError> {
    conn.execute(
        "INSERT OR IGNORE INTO payments (provider, external_id, user_id, plan, amount_rub, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            provider.as_str(),
            external_id,
            user_id,
            plan.key(),
            amount_rub,
            PaymentStatus::Pending.as_str(),
            to_ts(now)
        ],
    )?;
    let id = conn.query_row(
        "SELECT id FROM payments WHERE provider = ?1 AND external_id = ?2",
        params![provider.as_str(), external_id],
        |row| row.get(0),
    )?;
    Ok(id)
}

/// Marks a pending row paid and grants its plan. Caller owns the transaction.
fn settle_in(conn: &Connection, id: i64, now: DateTime<Utc>) -> Result<Settlement, StoreError> {
    let Some(payment) = load(conn, id)? else {
        return Ok(Settlement::Unknown);
    };

    let updated = conn.execute(
        "UPDATE payments SET status = ?2, settled_at = ?3 WHERE id = ?1 AND status = ?4",
        params![id, PaymentStatus::Paid.as_str(), to_ts(now), PaymentStatus::Pending.as_str()],
    )?;
    if updated == 0 {
        return Ok(Settlement::AlreadySettled);
    }

    let subscription = grant_in(conn, payment.user_id, payment.plan.term(), payment.plan.key(), now)?;
    Ok(Settlement::Credited {
        payment: Payment { status: PaymentStatus::Paid, ..payment },
        subscription,
    })
}

impl Database {
    /// Records an issued invoice as pending. Re-recording returns the existing id.
    pub fn record_invoice(
        &self,
        provider: Provider,
        external_id: &str,
        user_id: i64,
        plan: Plan,
        amount_rub: u32,
        now: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        upsert_pending(&self.conn(), provider, external_id, user_id, plan, amount_rub, now)
    }

    /// Opens a manual-transfer request keyed by the receipt message
    /// (`<chat_id>:<message_id>`), so the same file sent twice is two requests.
    pub fn open_transfer(
        &self,
        user_id: i64,
        plan: Plan,
        amount_rub: u32,
        receipt_chat: i64,
        receipt_message: i32,
        now: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let receipt = format!("{receipt_chat}:{receipt_message}");
        self.record_invoice(Provider::Transfer, &receipt, user_id, plan, amount_rub, now)
    }

    /// Settles a provider invoice, creating the ledger row if it was never
    /// recorded. A repeated notification for the same invoice changes nothing.
    pub fn settle(
        &self,
        provider: Provider,
        external_id: &str,
        user_id: i64,
        plan: Plan,
        amount_rub: u32,
        now: DateTime<Utc>,
    ) -> Result<Settlement, StoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let id = upsert_pending(&tx, provider, external_id, user_id, plan, amount_rub, now)?;
        let settlement = settle_in(&tx, id, now)?;
        tx.commit()?;

        if let Settlement::Credited { payment, .. } = &settlement {
            info!(target: "payments", "💰 Settled {} payment {} ({}) for user {}", provider.as_str(), external_id, payment.plan.key(), user_id);
        }
        Ok(settlement)
    }

    pub fn settle_by_id(&self, id: i64, now: DateTime<Utc>) -> Result<Settlement, StoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let settlement = settle_in(&tx, id, now)?;
        tx.commit()?;

        if let Settlement::Credited { payment, .. } = &settlement {
            info!(target: "payments", "💰 Approved payment #{} ({}) for user {}", id, payment.plan.key(), payment.user_id);
        }
        Ok(settlement)
    }

    /// Rejects a pending payment. Returns the payment if it was pending.
    pub fn reject(&self, id: i64, now: DateTime<Utc>) -> Result<Option<Payment>, StoreError> {
        let conn = self.conn();
        let updated = conn.execute(
            "UPDATE payments SET status = ?2, settled_at = ?3 WHERE id = ?1 AND status = ?4",
            params![id, PaymentStatus::Rejected.as_str(), to_ts(now), PaymentStatus::Pending.as_str()],
        )?;
        if updated == 0 {
            return Ok(None);
        }
        info!(target: "payments", "✖ Rejected payment #{}", id);
        load(&conn, id)
    }

    pub fn payment(&self, id: i64) -> Result<Option<Payment>, StoreError> {
        load(&self.conn(), id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_settle_credits_once() {
        let db = Database::in_memory().unwrap();
        let now = Utc::now();

        let first = db.settle(Provider::CryptoBot, "inv-1", 7, Plan::Month, 99, now).unwrap();
        let Settlement::Credited { payment, subscription } = first else {
            panic!("expected credit");
        };
        assert_eq!(payment.status, PaymentStatus::Paid);
        assert_eq!(subscription.plan, "30_days");

        let again = db.settle(Provider::CryptoBot, "inv-1", 7, Plan::Month, 99, now).unwrap();
        assert_eq!(again, Settlement::AlreadySettled);

        let sub = db.subscription(7).unwrap().unwrap();
        assert_eq!(sub.expires_at.map(|t| t.timestamp()), Some((now + Duration::days(30)).timestamp()));
    }

    #[test]
    fn test_recorded_invoice_is_settled_in_place() {
        let db = Database::in_memory().unwrap();
        let now = Utc::now();
        let id = db.record_invoice(Provider::CryptoBot, "inv-2", 7, Plan::Week, 39, now).unwrap();
        assert_eq!(db.record_invoice(Provider::CryptoBot, "inv-2", 7, Plan::Week, 39, now).unwrap(), id);
        assert_eq!(db.payment(id).unwrap().unwrap().status, PaymentStatus::Pending);

        db.settle(Provider::CryptoBot, "inv-2", 7, Plan::Week, 39, now).unwrap();
        assert_eq!(db.payment(id).unwrap().unwrap().status, PaymentStatus::Paid);
    }

    #[test]
    fn test_transfer_approve_and_reject() {
        let db = Database::in_memory().unwrap();
        let now = Utc::now();
        let approved = db.open_transfer(1, Plan::Forever, 1499, 1, 10, now).unwrap();
        let rejected = db.open_transfer(2, Plan::Week, 39, 2, 11, now).unwrap();

        assert!(matches!(db.settle_by_id(approved, now).unwrap(), Settlement::Credited { .. }));
        assert!(db.subscription(1).unwrap().unwrap().is_forever());
        assert_eq!(db.settle_by_id(approved, now).unwrap(), Settlement::AlreadySettled);

        let payment = db.reject(rejected, now).unwrap().unwrap();
        assert_eq!(payment.status, PaymentStatus::Rejected);
        assert_eq!(payment.user_id, 2);
        assert_eq!(db.reject(rejected, now).unwrap(), None);
        assert_eq!(db.settle_by_id(rejected, now).unwrap(), Settlement::AlreadySettled);
        assert!(db.subscription(2).unwrap().is_none());
    }

    #[test]
    fn test_same_receipt_file_sent_twice_opens_separate_requests() {
        let db = Database::in_memory().unwrap();
        let now = Utc::now();
        let first = db.open_transfer(1, Plan::Week, 39, 1, 50, now).unwrap();
        db.settle_by_id(first, now).unwrap();

        // Another user forwards the same screenshot for a different plan
        let second = db.open_transfer(2, Plan::Forever, 1499, 2, 50, now).unwrap();
        assert_ne!(first, second);

        let payment = db.payment(second).unwrap().unwrap();
        assert_eq!(payment.user_id, 2);
        assert_eq!(payment.plan, Plan::Forever);
        assert_eq!(payment.status, PaymentStatus::Pending);
        assert_eq!(payment.external_id, "2:50");

        assert!(matches!(db.settle_by_id(second, now).unwrap(), Settlement::Credited { .. }));
        assert!(db.subscription(2).unwrap().unwrap().is_forever());
    }

    #[test]
    fn test_settle_unknown_id() {
        let db = Database::in_memory().unwrap();
        assert_eq!(db.settle_by_id(404, Utc::now()).unwrap(), Settlement::Unknown);
    }
}
