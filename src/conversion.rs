//! Conversion Service
//!
//! Turns particles into a pending withdrawal request. The user row and today's stats
//! row are locked for the whole check-debit-record sequence, so concurrent
//! conversions serialize per user and on the global pool.

use crate::{
    config::EconomyConfig,
    errors::{VoidError, VoidResult},
    ledger::{
        models::subject_prefix, ConversionRate, Field, FieldChange, LedgerStore, TokenAmount,
        WithdrawalRequest, WithdrawalStatus,
    },
    limits::{ConversionLimits, GlobalLimitState, LimitDecision},
    metrics::EconomyMetrics,
};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Micro-token units in one conversion step (0.01 token)
const STEP_UNITS: u128 = 10_000;

/// Particles charged for `amount`, rounded up to whole particles
pub fn resource_cost_for_amount(amount: TokenAmount, particles_per_step: u64) -> u64 {
    let scaled = amount.micro() as u128 * particles_per_step as u128;
    let cost = scaled.div_ceil(STEP_UNITS);
    cost.min(u64::MAX as u128) as u64
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversionReceipt {
    pub withdrawal_id: String,
    pub status: WithdrawalStatus,
    pub token_amount: TokenAmount,
    pub resource_spent: u64,
    pub new_total: TokenAmount,
    pub remaining: TokenAmount,
    pub new_balance: u64,
}

/// Public view of today's global pool
#[derive(Debug, Clone, Serialize)]
pub struct DailyStatsView {
    pub total_claimed: TokenAmount,
    pub max_daily: TokenAmount,
    pub remaining: TokenAmount,
    pub conversions_today: u64,
    pub limit_reached: bool,
}

pub struct ConversionService {
    ledger: Arc<LedgerStore>,
    limits: ConversionLimits,
    economy: EconomyConfig,
    metrics: Arc<EconomyMetrics>,
}

impl ConversionService {
    pub fn new(ledger: Arc<LedgerStore>, economy: EconomyConfig, metrics: Arc<EconomyMetrics>) -> Self {
        Self {
            ledger,
            limits: ConversionLimits::from_config(&economy),
            economy,
            metrics,
        }
    }

    fn is_config_banned(&self, subject: &str, wallet: &str) -> bool {
        self.economy.banned_subjects.iter().any(|s| s == subject)
            || (!wallet.is_empty()
                && self
                    .economy
                    .banned_wallets
                    .iter()
                    .any(|w| w.eq_ignore_ascii_case(wallet)))
    }

    pub fn convert(&self, subject: &str, token_amount: f64, now: DateTime<Utc>) -> VoidResult<ConversionReceipt> {
        let amount = TokenAmount::from_decimal(token_amount)
            .filter(|a| !a.is_zero())
            .ok_or_else(|| VoidError::Validation("token_amount must be a positive number".to_string()))?;

        let result = self.ledger.transaction("convert", |txn| {
            let mut user = txn.lock_user(subject)?;

            if self.is_config_banned(&user.subject_id, &user.wallet_address)
                || txn.is_banned(&user.wallet_address)?
            {
                return Err(VoidError::AccountSuspended);
            }

            let particles_per_step = txn
                .read_conversion_rate()?
                .map(|r| r.particles_per_step)
                .unwrap_or(self.economy.default_particles_per_step);
            let cost = resource_cost_for_amount(amount, particles_per_step);

            let today = now.date_naive();
            let mut stats = txn.lock_daily_stats(today)?;
            let yesterday = (now - Duration::days(1)).date_naive();
            let global = GlobalLimitState {
                today: stats.clone(),
                yesterday_limit_reached_at: txn
                    .read_daily_stats(yesterday)?
                    .and_then(|s| s.limit_reached_at),
            };

            if let LimitDecision::Denied(denial) =
                self.limits.check_limits(&user, amount, cost, &global, now)
            {
                return Err(VoidError::Denied(denial));
            }

            txn.apply_changes(&mut user, &[(Field::Particles, FieldChange::Increment(-(cost as i128)))])?;
            user.last_conversion_at = Some(now);
            user.conversion_window = self.limits.personal.record(&user.conversion_window, now);
            if user.daily_withdrawal_date == Some(today) {
                user.daily_withdrawal_count += 1;
                user.daily_withdrawal_amount = user.daily_withdrawal_amount.saturating_add(amount);
            } else {
                user.daily_withdrawal_date = Some(today);
                user.daily_withdrawal_count = 1;
                user.daily_withdrawal_amount = amount;
            }

            let request = WithdrawalRequest {
                id: uuid::Uuid::new_v4().to_string(),
                user_id: user.id.clone(),
                subject_id: user.subject_id.clone(),
                wallet_address: user.wallet_address.clone(),
                token_amount: amount,
                resource_spent: cost,
                status: WithdrawalStatus::Pending,
                transaction_hash: None,
                admin_note: None,
                created_at: now,
                processed_at: None,
            };
            txn.insert_withdrawal(&request)?;

            stats.total_token_claimed = stats.total_token_claimed.saturating_add(amount);
            stats.conversion_count += 1;
            if stats.total_token_claimed >= self.limits.global_daily_cap && stats.limit_reached_at.is_none() {
                stats.limit_reached_at = Some(now);
            }
            txn.put_daily_stats(&stats)?;
            txn.put_user(&user, now)?;

            Ok(ConversionReceipt {
                withdrawal_id: request.id,
                status: request.status,
                token_amount: amount,
                resource_spent: cost,
                new_total: stats.total_token_claimed,
                remaining: self.limits.global_daily_cap.saturating_sub(stats.total_token_claimed),
                new_balance: user.balance,
            })
        });

        match &result {
            Ok(receipt) => {
                self.metrics.record_conversion("success");
                info!(
                    subject = %subject_prefix(subject),
                    withdrawal_id = %receipt.withdrawal_id,
                    amount = %receipt.token_amount,
                    cost = receipt.resource_spent,
                    new_total = %receipt.new_total,
                    "conversion recorded"
                );
                if receipt.remaining.is_zero() {
                    warn!(total = %receipt.new_total, "global daily conversion limit reached");
                }
            }
            Err(VoidError::Denied(denial)) => {
                self.metrics.record_conversion(denial.reason.code());
                info!(subject = %subject_prefix(subject), reason = denial.reason.code(), "conversion denied");
            }
            Err(VoidError::AccountSuspended) => {
                self.metrics.record_conversion("account_suspended");
                warn!(subject = %subject_prefix(subject), "conversion attempt from banned account");
            }
            Err(e) => {
                self.metrics.record_conversion("error");
                warn!(subject = %subject_prefix(subject), error = %e, "conversion failed");
            }
        }
        result
    }

    pub fn daily_stats(&self, now: DateTime<Utc>) -> VoidResult<DailyStatsView> {
        let today = self.ledger.daily_stats(now.date_naive())?;
        let yesterday = self.ledger.daily_stats((now - Duration::days(1)).date_naive())?;
        let cap = self.limits.global_daily_cap;

        let cooldown_active = today
            .limit_reached_at
            .or(yesterday.limit_reached_at)
            .is_some_and(|at| now < at + self.limits.global_cooldown);
        let limit_reached = today.total_token_claimed >= cap || cooldown_active;

        Ok(DailyStatsView {
            total_claimed: today.total_token_claimed,
            max_daily: cap,
            remaining: if limit_reached {
                TokenAmount::ZERO
            } else {
                cap.saturating_sub(today.total_token_claimed)
            },
            conversions_today: today.conversion_count,
            limit_reached,
        })
    }

    /// Stored rate, or one built from configuration defaults
    pub fn current_rate(&self, now: DateTime<Utc>) -> VoidResult<ConversionRate> {
        Ok(self.ledger.conversion_rate()?.unwrap_or_else(|| ConversionRate {
            particles_per_step: self.economy.default_particles_per_step,
            token_price_usd: self.economy.target_price_usd,
            base_rate: self.economy.base_rate,
            target_price: self.economy.target_price_usd,
            last_update: now,
        }))
    }

    /// Re-derive the rate from a token price: `floor(base_rate * price / target_price)`
    pub fn update_rate(&self, token_price_usd: f64, now: DateTime<Utc>) -> VoidResult<ConversionRate> {
        if !token_price_usd.is_finite() || token_price_usd <= 0.0 {
            return Err(VoidError::Validation("token_price_usd must be a positive number".to_string()));
        }
        let target = self.economy.target_price_usd;
        let particles_per_step = (self.economy.base_rate as f64 * token_price_usd / target).floor();
        if particles_per_step < 1.0 || particles_per_step >= u64::MAX as f64 {
            return Err(VoidError::Validation(format!(
                "token_price_usd {} yields an unusable rate",
                token_price_usd
            )));
        }

        let rate = ConversionRate {
            particles_per_step: particles_per_step as u64,
            token_price_usd,
            base_rate: self.economy.base_rate,
            target_price: target,
            last_update: now,
        };
        self.ledger.set_conversion_rate(&rate)?;
        Ok(rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cost_rounds_up() {
        assert_eq!(resource_cost_for_amount(TokenAmount::from_micro(5_000), 150_000), 75_000);
        assert_eq!(resource_cost_for_amount(TokenAmount::from_micro(10_000), 150_000), 150_000);
        assert_eq!(resource_cost_for_amount(TokenAmount::from_micro(1), 150_000), 15);
        assert_eq!(resource_cost_for_amount(TokenAmount::from_micro(1), 3), 1);
        assert_eq!(resource_cost_for_amount(TokenAmount::from_micro(u64::MAX), u64::MAX), u64::MAX);
    }
}
