//! Withdrawal Queue & Payout Processor
//!
//! Drains the oldest pending withdrawal requests through the payment rail under the
//! hot-wallet reserve and the daily payout ceiling. Storage transactions are opened
//! before and after each rail call, never across it, and run on the blocking pool.
//!
//! Batches are serialized by an in-process lock. Each request is also claimed in
//! storage, in the same transaction that confirms it is still pending, before its
//! transfer starts. A claim left behind by a crash keeps the request out of later
//! batches until an admin moves it out of `pending`.

use super::rail::{PaymentRail, PayoutError};
use crate::{
    config::{EconomyConfig, PayoutConfig},
    errors::{VoidError, VoidResult},
    ledger::{LedgerStore, TokenAmount, WithdrawalRequest, WithdrawalStatus},
    metrics::EconomyMetrics,
    storage::run_blocking,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::{sync::Arc, time::Duration};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// Prefix of the note left on requests whose transfer outcome is unknown
pub const RECONCILE_NOTE_PREFIX: &str = "Payout outcome unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    ExceedsSingleLimit,
    ExceedsDailyBudget,
    InsufficientLiquidity,
    StatusChanged,
    AwaitingReconciliation,
    /// Another batch holds the claim on this request
    InFlight,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ItemOutcome {
    Paid { transaction_hash: String },
    Skipped { reason: SkipReason },
    Rejected { note: String },
    Failed { error: String, outcome_unknown: bool },
}

impl ItemOutcome {
    fn label(&self) -> &'static str {
        match self {
            ItemOutcome::Paid { .. } => "paid",
            ItemOutcome::Skipped { .. } => "skipped",
            ItemOutcome::Rejected { .. } => "rejected",
            ItemOutcome::Failed { outcome_unknown: true, .. } => "timeout",
            ItemOutcome::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PayoutItemReport {
    pub id: String,
    pub wallet_address: String,
    pub amount: TokenAmount,
    #[serde(flatten)]
    pub outcome: ItemOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum BatchAbort {
    LiquidityLow { balance: TokenAmount, min_required: TokenAmount },
    DailyPayoutLimitReached { paid_today: TokenAmount, max_daily: TokenAmount },
    RailUnavailable { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub processed: usize,
    pub successful: usize,
    pub results: Vec<PayoutItemReport>,
    pub remaining_daily_budget: TokenAmount,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum BatchOutcome {
    NoPending,
    Aborted(BatchAbort),
    Completed(BatchReport),
}

#[derive(Debug, Clone, Serialize)]
pub struct PayoutStatus {
    pub pending_count: usize,
    pub paid_today: TokenAmount,
    pub remaining_daily_budget: TokenAmount,
    pub hot_wallet_balance: Option<TokenAmount>,
    pub max_single_payout: TokenAmount,
    pub max_daily_payout: TokenAmount,
    pub min_hot_wallet_balance: TokenAmount,
    pub rail: String,
}

/// Running limits for one batch
struct BatchBudget {
    remaining_daily: TokenAmount,
    liquidity: TokenAmount,
}

pub struct PayoutProcessor {
    ledger: Arc<LedgerStore>,
    rail: Arc<dyn PaymentRail>,
    config: PayoutConfig,
    banned_wallets: Vec<String>,
    metrics: Arc<EconomyMetrics>,
    batch_lock: Mutex<()>,
}

impl PayoutProcessor {
    pub fn new(
        ledger: Arc<LedgerStore>,
        rail: Arc<dyn PaymentRail>,
        config: PayoutConfig,
        economy: &EconomyConfig,
        metrics: Arc<EconomyMetrics>,
    ) -> Self {
        Self {
            ledger,
            rail,
            config,
            banned_wallets: economy.banned_wallets.iter().map(|w| w.to_lowercase()).collect(),
            metrics,
            batch_lock: Mutex::new(()),
        }
    }

    fn transfer_timeout(&self) -> Duration {
        Duration::from_secs(self.config.transfer_timeout_secs)
    }

    /// Run `op` against the ledger on the blocking pool
    async fn with_ledger<T, F>(&self, op: F) -> VoidResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&LedgerStore) -> VoidResult<T> + Send + 'static,
    {
        let ledger = self.ledger.clone();
        run_blocking(move || op(&ledger)).await
    }

    async fn is_banned(&self, wallet: &str) -> VoidResult<bool> {
        if self.banned_wallets.contains(&wallet.to_lowercase()) {
            return Ok(true);
        }
        let wallet = wallet.to_string();
        self.with_ledger(move |ledger| ledger.is_banned(&wallet)).await
    }

    async fn paid_total(&self, date: NaiveDate) -> VoidResult<TokenAmount> {
        self.with_ledger(move |ledger| ledger.paid_total(date)).await
    }

    async fn count_pending(&self) -> VoidResult<usize> {
        self.with_ledger(|ledger| ledger.count_pending()).await
    }

    async fn hot_wallet_balance(&self) -> Result<TokenAmount, PayoutError> {
        match tokio::time::timeout(self.transfer_timeout(), self.rail.hot_wallet_balance()).await {
            Ok(result) => result,
            Err(_) => Err(PayoutError::Timeout(self.config.transfer_timeout_secs)),
        }
    }

    /// Process one batch of the oldest pending requests
    pub async fn process_batch(&self, now: DateTime<Utc>) -> VoidResult<BatchOutcome> {
        let _batch = self.batch_lock.lock().await;

        let batch_size = self.config.batch_size;
        let pending = self
            .with_ledger(move |ledger| ledger.oldest_pending(batch_size))
            .await?;
        self.metrics.set_pending_withdrawals(self.count_pending().await?);
        if pending.is_empty() {
            return Ok(BatchOutcome::NoPending);
        }

        let min_reserve = self.config.min_hot_wallet_balance();
        let balance = match self.hot_wallet_balance().await {
            Ok(balance) => balance,
            Err(e) => {
                error!(rail = self.rail.name(), error = %e, "hot wallet balance unavailable");
                return Ok(BatchOutcome::Aborted(BatchAbort::RailUnavailable { error: e.to_string() }));
            }
        };
        if balance < min_reserve {
            warn!(balance = %balance, min_required = %min_reserve, "hot wallet below reserve, batch aborted");
            return Ok(BatchOutcome::Aborted(BatchAbort::LiquidityLow {
                balance,
                min_required: min_reserve,
            }));
        }

        let max_daily = self.config.max_daily_payout();
        let paid_today = self.paid_total(now.date_naive()).await?;
        if paid_today >= max_daily {
            warn!(paid_today = %paid_today, max_daily = %max_daily, "daily payout limit reached, batch aborted");
            return Ok(BatchOutcome::Aborted(BatchAbort::DailyPayoutLimitReached {
                paid_today,
                max_daily,
            }));
        }

        let mut budget = BatchBudget {
            remaining_daily: max_daily.saturating_sub(paid_today),
            liquidity: balance,
        };

        let mut results = Vec::with_capacity(pending.len());
        for request in &pending {
            let outcome = match self.process_one(request, &mut budget, now).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(withdrawal_id = %request.id, error = %e, "payout item failed");
                    ItemOutcome::Failed {
                        error: e.to_string(),
                        outcome_unknown: false,
                    }
                }
            };
            self.metrics.record_payout(outcome.label());
            results.push(PayoutItemReport {
                id: request.id.clone(),
                wallet_address: request.wallet_address.clone(),
                amount: request.token_amount,
                outcome,
            });
        }

        let successful = results
            .iter()
            .filter(|r| matches!(r.outcome, ItemOutcome::Paid { .. }))
            .count();
        info!(
            processed = results.len(),
            successful,
            remaining_daily_budget = %budget.remaining_daily,
            "payout batch complete"
        );

        Ok(BatchOutcome::Completed(BatchReport {
            processed: results.len(),
            successful,
            results,
            remaining_daily_budget: budget.remaining_daily,
        }))
    }

    async fn process_one(
        &self,
        request: &WithdrawalRequest,
        budget: &mut BatchBudget,
        now: DateTime<Utc>,
    ) -> VoidResult<ItemOutcome> {
        let amount = request.token_amount;

        if self.is_banned(&request.wallet_address).await? {
            return self.reject_banned(request).await;
        }
        if request
            .admin_note
            .as_deref()
            .is_some_and(|note| note.starts_with(RECONCILE_NOTE_PREFIX))
        {
            return Ok(skipped(SkipReason::AwaitingReconciliation));
        }
        if amount > self.config.max_single_payout() {
            return Ok(skipped(SkipReason::ExceedsSingleLimit));
        }
        if amount > budget.remaining_daily {
            return Ok(skipped(SkipReason::ExceedsDailyBudget));
        }
        if budget.liquidity.saturating_sub(amount) < self.config.min_hot_wallet_balance()
            || budget.liquidity < amount
        {
            return Ok(skipped(SkipReason::InsufficientLiquidity));
        }

        if let Some(reason) = self.claim(&request.id, now).await? {
            return Ok(skipped(reason));
        }

        let transfer = tokio::time::timeout(
            self.transfer_timeout(),
            self.rail.transfer(&request.wallet_address, amount),
        )
        .await;

        match transfer {
            Ok(Ok(receipt)) => {
                budget.remaining_daily = budget.remaining_daily.saturating_sub(amount);
                budget.liquidity = budget.liquidity.saturating_sub(amount);
                self.record_paid(&request.id, &receipt.transaction_hash, now).await?;
                info!(
                    withdrawal_id = %request.id,
                    amount = %amount,
                    transaction_hash = %receipt.transaction_hash,
                    "payout sent"
                );
                Ok(ItemOutcome::Paid {
                    transaction_hash: receipt.transaction_hash,
                })
            }
            Ok(Err(e)) => {
                warn!(withdrawal_id = %request.id, error = %e, "payout transfer failed");
                self.annotate_pending(&request.id, format!("Payout failed: {}", e)).await?;
                Ok(ItemOutcome::Failed {
                    error: e.to_string(),
                    outcome_unknown: false,
                })
            }
            Err(_) => {
                // The transfer may still land; count it against the budget
                budget.remaining_daily = budget.remaining_daily.saturating_sub(amount);
                budget.liquidity = budget.liquidity.saturating_sub(amount);
                let secs = self.config.transfer_timeout_secs;
                error!(withdrawal_id = %request.id, timeout_secs = secs, "payout transfer timed out");
                self.annotate_pending(
                    &request.id,
                    format!("{} after {}s timeout; reconcile before retrying", RECONCILE_NOTE_PREFIX, secs),
                )
                .await?;
                Ok(ItemOutcome::Failed {
                    error: PayoutError::Timeout(secs).to_string(),
                    outcome_unknown: true,
                })
            }
        }
    }

    /// Confirm the request is still pending and take its payout claim in one
    /// transaction. `Some(reason)` when it must be skipped.
    async fn claim(&self, id: &str, now: DateTime<Utc>) -> VoidResult<Option<SkipReason>> {
        let id = id.to_string();
        self.with_ledger(move |ledger| {
            ledger.transaction("payout_claim", |txn| {
                let pending = txn
                    .lock_withdrawal(&id)?
                    .is_some_and(|w| w.status == WithdrawalStatus::Pending);
                if !pending {
                    return Ok(Some(SkipReason::StatusChanged));
                }
                if !txn.claim_payout(&id, now)? {
                    return Ok(Some(SkipReason::InFlight));
                }
                Ok(None)
            })
        })
        .await
    }

    async fn reject_banned(&self, request: &WithdrawalRequest) -> VoidResult<ItemOutcome> {
        let note = "Banned wallet: payout blocked".to_string();
        let id = request.id.clone();
        let row_note = note.clone();
        let rejected = self
            .with_ledger(move |ledger| {
                ledger.transaction("payout_reject", |txn| {
                    let Some(mut current) = txn.lock_withdrawal(&id)? else {
                        return Err(VoidError::NotFound("Withdrawal".to_string()));
                    };
                    if current.status != WithdrawalStatus::Pending {
                        return Ok(false);
                    }
                    current.status = WithdrawalStatus::Rejected;
                    current.admin_note = Some(row_note.clone());
                    txn.save_withdrawal(WithdrawalStatus::Pending, &current)?;
                    Ok(true)
                })
            })
            .await?;

        if !rejected {
            return Ok(skipped(SkipReason::StatusChanged));
        }
        warn!(withdrawal_id = %request.id, wallet = %request.wallet_address, "payout to banned wallet rejected");
        Ok(ItemOutcome::Rejected { note })
    }

    /// Mark a sent transfer as paid and add it to today's paid total. A request an
    /// admin already marked paid is not counted twice.
    async fn record_paid(&self, id: &str, hash: &str, now: DateTime<Utc>) -> VoidResult<()> {
        let id = id.to_string();
        let hash = hash.to_string();
        self.with_ledger(move |ledger| {
            ledger.transaction("payout_record", |txn| {
                let Some(mut current) = txn.lock_withdrawal(&id)? else {
                    return Err(VoidError::NotFound("Withdrawal".to_string()));
                };
                let previous = current.status;
                if previous.can_transition_to(WithdrawalStatus::Paid) {
                    current.status = WithdrawalStatus::Paid;
                    current.processed_at = Some(now);
                    current.transaction_hash = Some(hash.clone());
                } else {
                    warn!(withdrawal_id = %id, status = %previous, "transfer settled after status change");
                    current.admin_note = Some(format!(
                        "Transfer {} settled after status changed to {}; reconcile",
                        hash, previous
                    ));
                    if previous != WithdrawalStatus::Paid {
                        current.transaction_hash = Some(hash.clone());
                    }
                }
                if previous != WithdrawalStatus::Paid {
                    txn.add_paid_total(now.date_naive(), current.token_amount)?;
                }
                txn.release_payout(&id)?;
                txn.save_withdrawal(previous, &current)
            })
        })
        .await
    }

    /// Note an unpaid outcome on a still-pending request and drop its claim
    async fn annotate_pending(&self, id: &str, note: String) -> VoidResult<()> {
        let id = id.to_string();
        self.with_ledger(move |ledger| {
            ledger.transaction("payout_note", |txn| {
                if let Some(mut current) = txn.lock_withdrawal(&id)? {
                    if current.status == WithdrawalStatus::Pending {
                        current.admin_note = Some(note.clone());
                        txn.save_withdrawal(WithdrawalStatus::Pending, &current)?;
                    }
                }
                txn.release_payout(&id)
            })
        })
        .await
    }

    pub async fn payout_status(&self, now: DateTime<Utc>) -> VoidResult<PayoutStatus> {
        let paid_today = self.paid_total(now.date_naive()).await?;
        let max_daily = self.config.max_daily_payout();
        let hot_wallet_balance = match self.hot_wallet_balance().await {
            Ok(balance) => Some(balance),
            Err(e) => {
                warn!(error = %e, "hot wallet balance unavailable");
                None
            }
        };

        Ok(PayoutStatus {
            pending_count: self.count_pending().await?,
            paid_today,
            remaining_daily_budget: max_daily.saturating_sub(paid_today),
            hot_wallet_balance,
            max_single_payout: self.config.max_single_payout(),
            max_daily_payout: max_daily,
            min_hot_wallet_balance: self.config.min_hot_wallet_balance(),
            rail: self.rail.name().to_string(),
        })
    }
}

fn skipped(reason: SkipReason) -> ItemOutcome {
    ItemOutcome::Skipped { reason }
}
