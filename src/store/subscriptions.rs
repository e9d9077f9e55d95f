use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use tracing::info;

use super::{Database, StoreError, from_ts, to_ts};
use crate::payments::plans::Term;

/// Plan label given to the registration trial.
pub const TRIAL_PLAN: &str = "trial";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub user_id: i64,
    pub plan: String,
    /// `None` is the "forever" sentinel.
    pub expires_at: Option<DateTime<Utc>>,
}

impl Subscription {
    pub fn is_forever(&self) -> bool {
        self.expires_at.is_none()
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            None => true,
            Some(expires_at) => expires_at > now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    Registered(Subscription),
    AlreadyRegistered,
}

pub(crate) fn load(conn: &Connection, user_id: i64) -> Result<Option<Subscription>, StoreError> {
    let row = conn
        .query_row(
            "SELECT plan, expires_at FROM subscriptions WHERE user_id = ?1",
            params![user_id],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, Option<i64>>(1)?)),
        )
        .optional()?;

    match row {
        None => Ok(None),
        Some((plan, expires_at)) => Ok(Some(Subscription {
            user_id,
            plan,
            expires_at: expires_at.map(from_ts).transpose()?,
        })),
    }
}

fn add_days(from: DateTime<Utc>, days: u32) -> Result<DateTime<Utc>, StoreError> {
    Duration::try_days(i64::from(days))
        .and_then(|delta| from.checked_add_signed(delta))
        .ok_or_else(|| StoreError::OutOfRange(format!("{from} + {days} days")))
}

/// Extends an active subscription additively, restarts a lapsed one from
/// `now`. A forever subscription absorbs day grants unchanged.
/// Callers run this inside a transaction.
pub(crate) fn grant_in(
    conn: &Connection,
    user_id: i64,
    term: Term,
    plan: &str,
    now: DateTime<Utc>,
) -> Result<Subscription, StoreError> {
    let current = load(conn, user_id)?;

    let expires_at = match (term, current) {
        (_, Some(sub)) if sub.is_forever() => return Ok(sub),
        (Term::Forever, _) => None,
        (Term::Days(days), Some(Subscription { expires_at: Some(old), .. })) if old > now => {
            Some(add_days(old, days)?)
        }
        (Term::Days(days), _) => Some(add_days(now, days)?),
    };

    conn.execute(
        "INSERT INTO subscriptions (user_id, plan, expires_at, updated_at) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(user_id) DO UPDATE SET
            plan = excluded.plan,
            expires_at = excluded.expires_at,
            updated_at = excluded.updated_at",
        params![user_id, plan, expires_at.map(to_ts), to_ts(now)],
    )?;

    Ok(Subscription {
        user_id,
        plan: plan.to_string(),
        expires_at,
    })
}

impl Database {
    /// Creates the user and their trial subscription in one transaction.
    pub fn register(
        &self,
        user_id: i64,
        trial_days: u32,
        now: DateTime<Utc>,
    ) -> Result<Registration, StoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let inserted = tx.execute(
            "INSERT OR IGNORE INTO users (user_id, first_seen) VALUES (?1, ?2)",
            params![user_id, to_ts(now)],
        )?;
        if inserted == 0 {
            return Ok(Registration::AlreadyRegistered);
        }

        let subscription = grant_in(&tx, user_id, Term::Days(trial_days), TRIAL_PLAN, now)?;
        tx.commit()?;

        info!("📝 Registered user {} (trial {} days)", user_id, trial_days);
        Ok(Registration::Registered(subscription))
    }

    pub fn is_registered(&self, user_id: i64) -> Result<bool, StoreError> {
        let conn = self.conn();
        let found = conn
            .query_row("SELECT 1 FROM users WHERE user_id = ?1", params![user_id], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    pub fn subscription(&self, user_id: i64) -> Result<Option<Subscription>, StoreError> {
        load(&self.conn(), user_id)
    }

    pub fn is_entitled(&self, user_id: i64, now: DateTime<Utc>) -> Result<bool, StoreError> {
        Ok(self.subscription(user_id)?.is_some_and(|sub| sub.is_active(now)))
    }

    pub fn grant(
        &self,
        user_id: i64,
        term: Term,
        plan: &str,
        now: DateTime<Utc>,
    ) -> Result<Subscription, StoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let subscription = grant_in(&tx, user_id, term, plan, now)?;
        tx.commit()?;

        info!(target: "payments", "🎟 Granted {} to user {} ({:?})", plan, user_id, subscription.expires_at);
        Ok(subscription)
    }

    /// Deletes the subscription. Returns whether one existed.
    pub fn revoke(&self, user_id: i64) -> Result<bool, StoreError> {
        let conn = self.conn();
        let deleted = conn.execute("DELETE FROM subscriptions WHERE user_id = ?1", params![user_id])?;
        if deleted > 0 {
            info!(target: "payments", "🗑 Revoked subscription of user {}", user_id);
        }
        Ok(deleted > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_register_creates_trial() {
        let db = Database::in_memory().unwrap();
        let reg = db.register(100, 7, now()).unwrap();
        let Registration::Registered(sub) = reg else {
            panic!("expected registration");
        };
        assert_eq!(sub.plan, TRIAL_PLAN);
        assert_eq!(sub.expires_at, Some(now() + Duration::days(7)));
        assert!(db.is_registered(100).unwrap());
        assert!(db.is_entitled(100, now()).unwrap());
    }

    #[test]
    fn test_register_twice_is_noop() {
        let db = Database::in_memory().unwrap();
        db.register(100, 7, now()).unwrap();
        let later = now() + Duration::days(3);
        assert_eq!(db.register(100, 7, later).unwrap(), Registration::AlreadyRegistered);
        let sub = db.subscription(100).unwrap().unwrap();
        assert_eq!(sub.expires_at, Some(now() + Duration::days(7)));
    }

    #[test]
    fn test_grant_extends_active_subscription() {
        let db = Database::in_memory().unwrap();
        db.grant(1, Term::Days(10), "10_days", now()).unwrap();
        let sub = db.grant(1, Term::Days(30), "30_days", now()).unwrap();
        assert_eq!(sub.expires_at, Some(now() + Duration::days(40)));
        assert_eq!(sub.plan, "30_days");
    }

    #[test]
    fn test_grant_resets_lapsed_subscription() {
        let db = Database::in_memory().unwrap();
        db.grant(1, Term::Days(5), "5_days", now()).unwrap();
        let later = now() + Duration::days(20);
        assert!(!db.is_entitled(1, later).unwrap());

        let sub = db.grant(1, Term::Days(30), "30_days", later).unwrap();
        assert_eq!(sub.expires_at, Some(later + Duration::days(30)));
    }

    #[test]
    fn test_forever_is_always_entitled_and_absorbs_day_grants() {
        let db = Database::in_memory().unwrap();
        db.grant(1, Term::Forever, "forever", now()).unwrap();
        assert!(db.is_entitled(1, now() + Duration::days(100_000)).unwrap());

        let sub = db.grant(1, Term::Days(30), "30_days", now()).unwrap();
        assert!(sub.is_forever());
        assert_eq!(sub.plan, "forever");
    }

    #[test]
    fn test_grant_past_calendar_end_is_refused() {
        let db = Database::in_memory().unwrap();
        db.grant(42, Term::Days(30), "30_days", now()).unwrap();

        let result = db.grant(42, Term::Days(4_000_000_000), "4000000000_days", now());
        assert!(matches!(result, Err(StoreError::OutOfRange(_))));

        // The lock is released and the old subscription is untouched
        let sub = db.subscription(42).unwrap().unwrap();
        assert_eq!(sub.expires_at, Some(now() + Duration::days(30)));
    }

    #[test]
    fn test_revoke() {
        let db = Database::in_memory().unwrap();
        db.grant(1, Term::Days(30), "30_days", now()).unwrap();
        assert!(db.revoke(1).unwrap());
        assert!(!db.revoke(1).unwrap());
        assert!(!db.is_entitled(1, now()).unwrap());
    }

    #[test]
    fn test_unknown_user_not_entitled() {
        let db = Database::in_memory().unwrap();
        assert!(!db.is_entitled(999, now()).unwrap());
        assert!(!db.is_registered(999).unwrap());
    }
}
