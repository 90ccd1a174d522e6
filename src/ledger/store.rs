//! Ledger rows and indexes stored in RocksDB.
//!
//! Key layout:
//! - `user:subject:{subject}` user row, `user:id:{id}` subject lookup
//! - `withdrawal:row:{id}` request row
//! - `withdrawal:pending:{created_ms}{id}` FIFO queue of pending requests
//! - `withdrawal:user:{user_id}:{inv_ms}{id}` and `withdrawal:all:{inv_ms}{id}` newest first
//! - `daily:{date}` global conversion stats, `payout:paid:{date}` paid total
//! - `{spin,vote,purchase}:ref:{ref}` consumed idempotency keys
//! - `config:*` runtime settings, `ban:{wallet}` stored bans

use super::{
    fields::{Field, FieldChange},
    models::{
        BanEntry, ConversionRate, DailyConversionStats, TokenAmount, User, WithdrawalRequest,
        WithdrawalStatus,
    },
};
use crate::{
    errors::{StorageError, VoidError, VoidResult},
    storage::{LedgerDb, TxnScope},
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

const USER_SUBJECT_PREFIX: &str = "user:subject:";
const USER_ID_PREFIX: &str = "user:id:";
const WITHDRAWAL_ROW_PREFIX: &str = "withdrawal:row:";
const WITHDRAWAL_PENDING_PREFIX: &[u8] = b"withdrawal:pending:";
const WITHDRAWAL_ALL_PREFIX: &[u8] = b"withdrawal:all:";
const WITHDRAWAL_USER_PREFIX: &str = "withdrawal:user:";
const DAILY_STATS_PREFIX: &str = "daily:";
const PAID_TOTAL_PREFIX: &str = "payout:paid:";
const PAYOUT_CLAIM_PREFIX: &str = "payout:inflight:";
const CONVERSION_RATE_KEY: &[u8] = b"config:conversion_rate";
const BAN_PREFIX: &str = "ban:";

/// Action types that consume a client transaction reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    Spin,
    Vote,
    Purchase,
}

impl RefKind {
    fn prefix(&self) -> &'static str {
        match self {
            RefKind::Spin => "spin:ref:",
            RefKind::Vote => "vote:ref:",
            RefKind::Purchase => "purchase:ref:",
        }
    }
}

fn user_key(subject: &str) -> Vec<u8> {
    format!("{}{}", USER_SUBJECT_PREFIX, subject).into_bytes()
}

fn user_id_key(id: &str) -> Vec<u8> {
    format!("{}{}", USER_ID_PREFIX, id).into_bytes()
}

fn withdrawal_key(id: &str) -> Vec<u8> {
    format!("{}{}", WITHDRAWAL_ROW_PREFIX, id).into_bytes()
}

fn pending_index_key(request: &WithdrawalRequest) -> Vec<u8> {
    // prefix | created_ms(be) | id
    let created = request.created_at.timestamp_millis().max(0) as u64;
    let mut key = Vec::with_capacity(WITHDRAWAL_PENDING_PREFIX.len() + 8 + request.id.len());
    key.extend_from_slice(WITHDRAWAL_PENDING_PREFIX);
    key.extend_from_slice(&created.to_be_bytes());
    key.extend_from_slice(request.id.as_bytes());
    key
}

fn newest_first_key(prefix: &[u8], request: &WithdrawalRequest) -> Vec<u8> {
    let inv_created = u64::MAX - request.created_at.timestamp_millis().max(0) as u64;
    let mut key = Vec::with_capacity(prefix.len() + 8 + request.id.len());
    key.extend_from_slice(prefix);
    key.extend_from_slice(&inv_created.to_be_bytes());
    key.extend_from_slice(request.id.as_bytes());
    key
}

fn user_withdrawals_prefix(user_id: &str) -> Vec<u8> {
    format!("{}{}:", WITHDRAWAL_USER_PREFIX, user_id).into_bytes()
}

fn daily_stats_key(date: NaiveDate) -> Vec<u8> {
    format!("{}{}", DAILY_STATS_PREFIX, date.format("%Y-%m-%d")).into_bytes()
}

fn paid_total_key(date: NaiveDate) -> Vec<u8> {
    format!("{}{}", PAID_TOTAL_PREFIX, date.format("%Y-%m-%d")).into_bytes()
}

fn payout_claim_key(id: &str) -> Vec<u8> {
    format!("{}{}", PAYOUT_CLAIM_PREFIX, id).into_bytes()
}

fn reference_key(kind: RefKind, reference: &str) -> Vec<u8> {
    format!("{}{}", kind.prefix(), reference).into_bytes()
}

fn ban_key(wallet: &str) -> Vec<u8> {
    format!("{}{}", BAN_PREFIX, wallet.to_lowercase()).into_bytes()
}

/// Admin edit of a withdrawal request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WithdrawalUpdate {
    pub status: Option<WithdrawalStatus>,
    pub transaction_hash: Option<String>,
    pub admin_note: Option<String>,
}

/// Typed access to the ledger
#[derive(Clone)]
pub struct LedgerStore {
    db: LedgerDb,
    numeric_ceiling: u64,
}

impl LedgerStore {
    pub fn new(db: LedgerDb, numeric_ceiling: u64) -> Self {
        Self { db, numeric_ceiling }
    }

    pub fn open<P: AsRef<std::path::Path>>(path: P, numeric_ceiling: u64) -> VoidResult<Self> {
        Ok(Self::new(LedgerDb::open(path)?, numeric_ceiling))
    }

    pub fn numeric_ceiling(&self) -> u64 {
        self.numeric_ceiling
    }

    /// Run `op` in one storage transaction
    pub fn transaction<T, F>(&self, label: &str, mut op: F) -> VoidResult<T>
    where
        F: FnMut(&LedgerTxn<'_, '_>) -> VoidResult<T>,
    {
        let ceiling = self.numeric_ceiling;
        self.db.transaction(label, |scope| {
            op(&LedgerTxn {
                scope,
                numeric_ceiling: ceiling,
            })
        })
    }

    pub fn find_user(&self, subject: &str) -> VoidResult<Option<User>> {
        self.db.get_json(&user_key(subject))
    }

    pub fn get_user(&self, subject: &str) -> VoidResult<User> {
        self.find_user(subject)?
            .ok_or_else(|| VoidError::NotFound("User".to_string()))
    }

    pub fn find_user_by_id(&self, id: &str) -> VoidResult<Option<User>> {
        match self.db.get_json::<String>(&user_id_key(id))? {
            Some(subject) => self.find_user(&subject),
            None => Ok(None),
        }
    }

    /// Create the user on first sight, otherwise refresh wallet and login time.
    /// Never touches balances.
    pub fn upsert_by_subject(&self, subject: &str, wallet: &str, now: DateTime<Utc>) -> VoidResult<User> {
        if subject.trim().is_empty() {
            return Err(VoidError::Validation("subject_id is required".to_string()));
        }
        self.transaction("upsert_user", |txn| {
            let key = user_key(subject);
            let user = match txn.scope.lock_json::<User>(&key)? {
                Some(mut user) => {
                    if !wallet.is_empty() {
                        user.wallet_address = wallet.to_string();
                    }
                    user.last_login = now;
                    user
                }
                None => {
                    let user = User::new(subject, wallet, now);
                    txn.scope.put_json(&user_id_key(&user.id), &user.subject_id)?;
                    tracing::info!(subject = %user.log_prefix(), user_id = %user.id, "created user");
                    user
                }
            };
            txn.put_user(&user, now)?;
            Ok(user)
        })
    }

    /// Apply typed changes to one user atomically
    pub fn apply_delta(
        &self,
        subject: &str,
        changes: &[(Field, FieldChange)],
        now: DateTime<Utc>,
    ) -> VoidResult<User> {
        self.transaction("apply_delta", |txn| {
            let mut user = txn.lock_user(subject)?;
            txn.apply_changes(&mut user, changes)?;
            txn.put_user(&user, now)?;
            Ok(user)
        })
    }

    /// All users ordered by lifetime total, highest first
    pub fn top_users(&self, limit: usize) -> VoidResult<Vec<User>> {
        let rows = self.db.scan_prefix(USER_SUBJECT_PREFIX.as_bytes(), usize::MAX)?;
        let mut users = Vec::with_capacity(rows.len());
        for (key, value) in rows {
            users.push(decode::<User>(&key, &value)?);
        }
        users.sort_by(|a, b| b.total_collected.cmp(&a.total_collected));
        users.truncate(limit);
        Ok(users)
    }

    pub fn get_withdrawal(&self, id: &str) -> VoidResult<Option<WithdrawalRequest>> {
        self.db.get_json(&withdrawal_key(id))
    }

    /// A user's requests, newest first
    pub fn withdrawals_for_user(&self, user_id: &str, limit: usize) -> VoidResult<Vec<WithdrawalRequest>> {
        self.load_indexed(&user_withdrawals_prefix(user_id), limit, |_| true)
    }

    /// Admin listing, newest first, optionally filtered by status
    pub fn list_withdrawals(
        &self,
        status: Option<WithdrawalStatus>,
        limit: usize,
    ) -> VoidResult<Vec<WithdrawalRequest>> {
        self.load_indexed(WITHDRAWAL_ALL_PREFIX, limit, |w| {
            status.map_or(true, |s| w.status == s)
        })
    }

    /// Oldest pending requests first
    pub fn oldest_pending(&self, limit: usize) -> VoidResult<Vec<WithdrawalRequest>> {
        self.load_indexed(WITHDRAWAL_PENDING_PREFIX, limit, |w| {
            w.status == WithdrawalStatus::Pending
        })
    }

    pub fn count_pending(&self) -> VoidResult<usize> {
        Ok(self.db.scan_prefix(WITHDRAWAL_PENDING_PREFIX, usize::MAX)?.len())
    }

    fn load_indexed<P>(&self, prefix: &[u8], limit: usize, keep: P) -> VoidResult<Vec<WithdrawalRequest>>
    where
        P: Fn(&WithdrawalRequest) -> bool,
    {
        let mut requests = Vec::new();
        for (key, value) in self.db.scan_prefix(prefix, usize::MAX)? {
            if requests.len() >= limit {
                break;
            }
            let id: String = decode(&key, &value)?;
            match self.get_withdrawal(&id)? {
                Some(request) if keep(&request) => requests.push(request),
                Some(_) => {}
                None => tracing::warn!(withdrawal_id = %id, "index entry without withdrawal row"),
            }
        }
        Ok(requests)
    }

    /// Admin status change. Terminal states refuse any further transition;
    /// `processed_at` is stamped only on `paid`.
    pub fn update_withdrawal_status(
        &self,
        id: &str,
        update: &WithdrawalUpdate,
        now: DateTime<Utc>,
    ) -> VoidResult<WithdrawalRequest> {
        self.transaction("update_withdrawal", |txn| {
            let mut request = txn
                .lock_withdrawal(id)?
                .ok_or_else(|| VoidError::NotFound("Withdrawal".to_string()))?;
            let previous = request.status;

            if let Some(next) = update.status {
                if next != previous && !previous.can_transition_to(next) {
                    return Err(VoidError::InvalidTransition {
                        from: previous.to_string(),
                        to: next.to_string(),
                    });
                }
                if next == previous && previous.is_terminal() {
                    return Err(VoidError::InvalidTransition {
                        from: previous.to_string(),
                        to: next.to_string(),
                    });
                }
                request.status = next;
                if next == WithdrawalStatus::Paid && previous != WithdrawalStatus::Paid {
                    request.processed_at = Some(now);
                    txn.add_paid_total(now.date_naive(), request.token_amount)?;
                }
            } else if previous.is_terminal() && update.transaction_hash.is_some() {
                return Err(VoidError::InvalidTransition {
                    from: previous.to_string(),
                    to: previous.to_string(),
                });
            }

            if let Some(hash) = &update.transaction_hash {
                request.transaction_hash = Some(hash.clone());
            }
            if let Some(note) = &update.admin_note {
                request.admin_note = Some(note.clone());
            }

            txn.save_withdrawal(previous, &request)?;
            Ok(request)
        })
    }

    pub fn daily_stats(&self, date: NaiveDate) -> VoidResult<DailyConversionStats> {
        Ok(self
            .db
            .get_json(&daily_stats_key(date))?
            .unwrap_or_else(|| DailyConversionStats::empty(date)))
    }

    /// When a payout batch took this request, if a transfer is still in flight
    pub fn payout_claimed_at(&self, id: &str) -> VoidResult<Option<DateTime<Utc>>> {
        self.get_json(&payout_claim_key(id))
    }

    pub fn paid_total(&self, date: NaiveDate) -> VoidResult<TokenAmount> {
        Ok(self.db.get_json(&paid_total_key(date))?.unwrap_or(TokenAmount::ZERO))
    }

    pub fn conversion_rate(&self) -> VoidResult<Option<ConversionRate>> {
        self.db.get_json(CONVERSION_RATE_KEY)
    }

    pub fn set_conversion_rate(&self, rate: &ConversionRate) -> VoidResult<()> {
        self.transaction("set_conversion_rate", |txn| {
            txn.scope.put_json(CONVERSION_RATE_KEY, rate)
        })?;
        tracing::info!(
            particles_per_step = rate.particles_per_step,
            token_price_usd = rate.token_price_usd,
            "conversion rate updated"
        );
        Ok(())
    }

    pub fn ban_wallet(&self, wallet: &str, reason: Option<String>, now: DateTime<Utc>) -> VoidResult<BanEntry> {
        let entry = BanEntry {
            wallet: wallet.to_lowercase(),
            reason,
            created_at: now,
        };
        self.transaction("ban_wallet", |txn| txn.scope.put_json(&ban_key(wallet), &entry))?;
        tracing::warn!(wallet = %entry.wallet, "wallet banned");
        Ok(entry)
    }

    pub fn is_banned(&self, wallet: &str) -> VoidResult<bool> {
        if wallet.is_empty() {
            return Ok(false);
        }
        Ok(self.db.get_json::<BanEntry>(&ban_key(wallet))?.is_some())
    }

    pub fn list_bans(&self) -> VoidResult<Vec<BanEntry>> {
        self.db
            .scan_prefix(BAN_PREFIX.as_bytes(), usize::MAX)?
            .into_iter()
            .map(|(key, value)| decode(&key, &value))
            .collect()
    }

    /// Read a raw config value, creating it with `init` on first use
    pub fn get_or_init_config<T, F>(&self, name: &str, init: F) -> VoidResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: Fn() -> T,
    {
        let key = format!("config:{}", name).into_bytes();
        self.transaction("config_init", |txn| match txn.scope.lock_json::<T>(&key)? {
            Some(value) => Ok(value),
            None => {
                let value = init();
                txn.scope.put_json(&key, &value)?;
                Ok(value)
            }
        })
    }

    pub fn get_json<T: DeserializeOwned>(&self, key: &[u8]) -> VoidResult<Option<T>> {
        self.db.get_json(key)
    }
}

/// Typed view of an open transaction
pub struct LedgerTxn<'a, 'db> {
    scope: &'a TxnScope<'db>,
    numeric_ceiling: u64,
}

impl<'a, 'db> LedgerTxn<'a, 'db> {
    /// Lock and load a user row
    pub fn lock_user(&self, subject: &str) -> VoidResult<User> {
        self.scope
            .lock_json(&user_key(subject))?
            .ok_or_else(|| VoidError::NotFound("User".to_string()))
    }

    pub fn put_user(&self, user: &User, now: DateTime<Utc>) -> VoidResult<()> {
        let mut stamped = user.clone();
        stamped.updated_at = now;
        self.scope.put_json(&user_key(&user.subject_id), &stamped)
    }

    pub fn apply_changes(&self, user: &mut User, changes: &[(Field, FieldChange)]) -> VoidResult<()> {
        for (field, change) in changes {
            user.apply_change(*field, change, self.numeric_ceiling)?;
        }
        Ok(())
    }

    pub fn lock_daily_stats(&self, date: NaiveDate) -> VoidResult<DailyConversionStats> {
        Ok(self
            .scope
            .lock_json(&daily_stats_key(date))?
            .unwrap_or_else(|| DailyConversionStats::empty(date)))
    }

    pub fn read_daily_stats(&self, date: NaiveDate) -> VoidResult<Option<DailyConversionStats>> {
        self.scope.read_json(&daily_stats_key(date))
    }

    pub fn put_daily_stats(&self, stats: &DailyConversionStats) -> VoidResult<()> {
        self.scope.put_json(&daily_stats_key(stats.date), stats)
    }

    pub fn read_conversion_rate(&self) -> VoidResult<Option<ConversionRate>> {
        self.scope.read_json(CONVERSION_RATE_KEY)
    }

    pub fn is_banned(&self, wallet: &str) -> VoidResult<bool> {
        if wallet.is_empty() {
            return Ok(false);
        }
        Ok(self.scope.read_json::<BanEntry>(&ban_key(wallet))?.is_some())
    }

    /// Write a new request with its queue and listing index entries
    pub fn insert_withdrawal(&self, request: &WithdrawalRequest) -> VoidResult<()> {
        self.scope.put_json(&withdrawal_key(&request.id), request)?;
        self.scope.put_json(&newest_first_key(WITHDRAWAL_ALL_PREFIX, request), &request.id)?;
        self.scope.put_json(
            &newest_first_key(&user_withdrawals_prefix(&request.user_id), request),
            &request.id,
        )?;
        if request.status == WithdrawalStatus::Pending {
            self.scope.put_json(&pending_index_key(request), &request.id)?;
        }
        Ok(())
    }

    pub fn lock_withdrawal(&self, id: &str) -> VoidResult<Option<WithdrawalRequest>> {
        self.scope.lock_json(&withdrawal_key(id))
    }

    /// Persist a request. Leaving `pending` drops it from the queue and clears any
    /// payout claim.
    pub fn save_withdrawal(&self, previous: WithdrawalStatus, request: &WithdrawalRequest) -> VoidResult<()> {
        self.scope.put_json(&withdrawal_key(&request.id), request)?;
        if previous == WithdrawalStatus::Pending && request.status != WithdrawalStatus::Pending {
            self.scope.delete(&pending_index_key(request))?;
            self.scope.delete(&payout_claim_key(&request.id))?;
        }
        Ok(())
    }

    /// Mark a request as handed to the payment rail. `Ok(false)` when another
    /// batch already holds the claim.
    pub fn claim_payout(&self, id: &str, now: DateTime<Utc>) -> VoidResult<bool> {
        let key = payout_claim_key(id);
        if self.scope.lock_json::<DateTime<Utc>>(&key)?.is_some() {
            return Ok(false);
        }
        self.scope.put_json(&key, &now)?;
        Ok(true)
    }

    pub fn release_payout(&self, id: &str) -> VoidResult<()> {
        self.scope.delete(&payout_claim_key(id))
    }

    pub fn lock_paid_total(&self, date: NaiveDate) -> VoidResult<TokenAmount> {
        Ok(self.scope.lock_json(&paid_total_key(date))?.unwrap_or(TokenAmount::ZERO))
    }

    pub fn add_paid_total(&self, date: NaiveDate, amount: TokenAmount) -> VoidResult<TokenAmount> {
        let total = self.lock_paid_total(date)?.saturating_add(amount);
        self.scope.put_json(&paid_total_key(date), &total)?;
        Ok(total)
    }

    /// Lock an idempotency key. Fails if it was already consumed.
    pub fn claim_reference(&self, kind: RefKind, reference: &str) -> VoidResult<()> {
        if reference.trim().is_empty() {
            return Err(VoidError::Validation("transaction_ref is required".to_string()));
        }
        let existing: Option<serde_json::Value> = self.scope.lock_json(&reference_key(kind, reference))?;
        if existing.is_some() {
            return Err(VoidError::DuplicateTransaction(reference.to_string()));
        }
        Ok(())
    }

    /// Record what a claimed reference paid for
    pub fn put_reference<T: Serialize>(&self, kind: RefKind, reference: &str, record: &T) -> VoidResult<()> {
        self.scope.put_json(&reference_key(kind, reference), record)
    }

    /// Lock and read an arbitrary row
    pub fn lock_row<T: DeserializeOwned>(&self, key: &[u8]) -> VoidResult<Option<T>> {
        self.scope.lock_json(key)
    }

    pub fn put_row<T: Serialize>(&self, key: &[u8], value: &T) -> VoidResult<()> {
        self.scope.put_json(key, value)
    }
}

fn decode<T: for<'de> Deserialize<'de>>(key: &[u8], value: &[u8]) -> VoidResult<T> {
    serde_json::from_slice(value).map_err(|e| {
        VoidError::Storage(StorageError::CorruptedData(format!(
            "Failed to decode {}: {}",
            String::from_utf8_lossy(key),
            e
        )))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::fields::FieldValue;
    use chrono::Duration;
    use tempfile::TempDir;

    const CEILING: u64 = 9_000_000_000_000_000_000;

    fn store() -> (TempDir, LedgerStore) {
        let dir = TempDir::new().unwrap();
        let store = LedgerStore::open(dir.path(), CEILING).unwrap();
        (dir, store)
    }

    fn request(user: &User, created_at: DateTime<Utc>) -> WithdrawalRequest {
        WithdrawalRequest {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user.id.clone(),
            subject_id: user.subject_id.clone(),
            wallet_address: user.wallet_address.clone(),
            token_amount: TokenAmount::from_micro(10_000),
            resource_spent: 150_000,
            status: WithdrawalStatus::Pending,
            transaction_hash: None,
            admin_note: None,
            created_at,
            processed_at: None,
        }
    }

    #[test]
    fn test_upsert_creates_then_updates_login() {
        let (_dir, store) = store();
        let t0 = Utc::now();
        let created = store.upsert_by_subject("subj", "0xaaa", t0).unwrap();
        store
            .apply_delta("subj", &[(Field::Particles, FieldChange::Increment(500))], t0)
            .unwrap();

        let later = t0 + Duration::hours(1);
        let again = store.upsert_by_subject("subj", "0xbbb", later).unwrap();
        assert_eq!(again.id, created.id);
        assert_eq!(again.balance, 500);
        assert_eq!(again.wallet_address, "0xbbb");
        assert_eq!(again.last_login, later);
        assert_eq!(store.find_user_by_id(&created.id).unwrap().unwrap().subject_id, "subj");
    }

    #[test]
    fn test_apply_delta_missing_user() {
        let (_dir, store) = store();
        let err = store
            .apply_delta("ghost", &[(Field::Particles, FieldChange::Increment(1))], Utc::now())
            .unwrap_err();
        assert!(matches!(err, VoidError::NotFound(_)));
    }

    #[test]
    fn test_apply_delta_is_all_or_nothing() {
        let (_dir, store) = store();
        let now = Utc::now();
        store.upsert_by_subject("subj", "0xaaa", now).unwrap();

        let result = store.apply_delta(
            "subj",
            &[
                (Field::TotalClicks, FieldChange::Replace(FieldValue::Number(10))),
                (Field::Particles, FieldChange::Increment(-1)),
            ],
            now,
        );
        assert!(result.is_err());
        assert_eq!(store.get_user("subj").unwrap().progress.total_clicks, 0);
    }

    #[test]
    fn test_withdrawal_indexes_and_transitions() {
        let (_dir, store) = store();
        let now = Utc::now();
        let user = store.upsert_by_subject("subj", "0xaaa", now).unwrap();
        let first = request(&user, now - Duration::minutes(2));
        let second = request(&user, now - Duration::minutes(1));
        store
            .transaction("seed", |txn| {
                txn.insert_withdrawal(&second)?;
                txn.insert_withdrawal(&first)
            })
            .unwrap();

        let pending = store.oldest_pending(10).unwrap();
        assert_eq!(pending[0].id, first.id);
        let history = store.withdrawals_for_user(&user.id, 20).unwrap();
        assert_eq!(history[0].id, second.id);

        let update = WithdrawalUpdate {
            status: Some(WithdrawalStatus::Paid),
            transaction_hash: Some("0xhash".into()),
            admin_note: None,
        };
        let paid = store.update_withdrawal_status(&first.id, &update, now).unwrap();
        assert_eq!(paid.processed_at, Some(now));
        assert_eq!(store.count_pending().unwrap(), 1);
        assert_eq!(store.paid_total(now.date_naive()).unwrap(), first.token_amount);

        let reject = WithdrawalUpdate {
            status: Some(WithdrawalStatus::Rejected),
            ..Default::default()
        };
        let err = store.update_withdrawal_status(&first.id, &reject, now).unwrap_err();
        assert!(matches!(err, VoidError::InvalidTransition { .. }));

        let approve = WithdrawalUpdate {
            status: Some(WithdrawalStatus::Approved),
            ..Default::default()
        };
        let approved = store.update_withdrawal_status(&second.id, &approve, now).unwrap();
        assert_eq!(approved.processed_at, None);
        assert_eq!(
            store.list_withdrawals(Some(WithdrawalStatus::Approved), 50).unwrap().len(),
            1
        );
    }

    #[test]
    fn test_reference_claimed_once() {
        let (_dir, store) = store();
        store
            .transaction("spin", |txn| {
                txn.claim_reference(RefKind::Spin, "ref-1")?;
                txn.put_reference(RefKind::Spin, "ref-1", &"log")
            })
            .unwrap();

        let err = store
            .transaction("spin", |txn| txn.claim_reference(RefKind::Spin, "ref-1"))
            .unwrap_err();
        assert!(matches!(err, VoidError::DuplicateTransaction(_)));

        // Same reference under another action type is independent
        store
            .transaction("vote", |txn| txn.claim_reference(RefKind::Vote, "ref-1"))
            .unwrap();
    }

    #[test]
    fn test_payout_claim_is_exclusive_until_request_leaves_pending() {
        let (_dir, store) = store();
        let now = Utc::now();
        let user = store.upsert_by_subject("subj", "0xabc", now).unwrap();
        let pending = request(&user, now);
        store.transaction("insert", |txn| txn.insert_withdrawal(&pending)).unwrap();

        assert!(store.transaction("claim", |txn| txn.claim_payout(&pending.id, now)).unwrap());
        assert!(!store.transaction("claim", |txn| txn.claim_payout(&pending.id, now)).unwrap());
        assert_eq!(store.payout_claimed_at(&pending.id).unwrap(), Some(now));

        store
            .update_withdrawal_status(
                &pending.id,
                &WithdrawalUpdate {
                    status: Some(WithdrawalStatus::Rejected),
                    ..Default::default()
                },
                now,
            )
            .unwrap();
        assert_eq!(store.payout_claimed_at(&pending.id).unwrap(), None);
    }

    #[test]
    fn test_bans_are_case_insensitive() {
        let (_dir, store) = store();
        store.ban_wallet("0xABCdef", None, Utc::now()).unwrap();
        assert!(store.is_banned("0xabcDEF").unwrap());
        assert!(!store.is_banned("0x123").unwrap());
        assert_eq!(store.list_bans().unwrap().len(), 1);
    }
}
