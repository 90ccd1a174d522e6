//! Rate Limit & Cooldown Engine
//!
//! Pure decision functions over durable state. Callers load the rows inside a storage
//! transaction, ask for a decision, and write the result back in the same transaction.

use crate::ledger::{DailyConversionStats, TokenAmount, User, models::WindowState};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    PersonalCooldown,
    DailyLimitReached,
    GlobalCooldownActive,
    InsufficientBalance,
    SpinCooldown,
}

impl DenialReason {
    pub fn code(&self) -> &'static str {
        match self {
            DenialReason::PersonalCooldown => "personal_cooldown",
            DenialReason::DailyLimitReached => "daily_limit_reached",
            DenialReason::GlobalCooldownActive => "global_cooldown_active",
            DenialReason::InsufficientBalance => "insufficient_balance",
            DenialReason::SpinCooldown => "spin_cooldown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitScope {
    User,
    Global,
}

/// Why a request was refused and when it may be retried
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitDenial {
    pub reason: DenialReason,
    pub scope: LimitScope,
    pub retry_at: Option<DateTime<Utc>>,
}

impl LimitDenial {
    pub fn message(&self) -> String {
        match (self.reason, self.scope) {
            (DenialReason::PersonalCooldown, _) => {
                "You can only convert once every 24 hours".to_string()
            }
            (DenialReason::DailyLimitReached, LimitScope::User) => {
                "Your daily conversion limit has been reached".to_string()
            }
            (DenialReason::DailyLimitReached, LimitScope::Global) => {
                "Global daily limit reached. Try again tomorrow!".to_string()
            }
            (DenialReason::GlobalCooldownActive, _) => {
                "Conversions are paused after the daily limit was reached".to_string()
            }
            (DenialReason::InsufficientBalance, _) => "Not enough particles".to_string(),
            (DenialReason::SpinCooldown, _) => "Free spin already used, come back later".to_string(),
        }
    }

    /// Human hint such as `23h 59m`, relative to `now`
    pub fn retry_hint(&self, now: DateTime<Utc>) -> Option<String> {
        let wait = self.retry_at? - now;
        let minutes = wait.num_minutes().max(0);
        Some(format!("{}h {}m", minutes / 60, minutes % 60))
    }
}

impl fmt::Display for LimitDenial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.reason.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LimitDecision {
    Allowed,
    Denied(LimitDenial),
}

/// At most `max_count` events per window. The window opens at the first event
/// and closes `window` later; `None` never closes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowRule {
    pub feature: &'static str,
    pub window: Option<Duration>,
    pub max_count: u32,
}

impl WindowRule {
    fn window_open(&self, state: &WindowState, now: DateTime<Utc>) -> bool {
        match (state.started_at, self.window) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(start), Some(window)) => now < start + window,
        }
    }

    /// `Err(retry_at)` when the window is full; `retry_at` is `None` for windows
    /// that never close.
    pub fn check(&self, state: &WindowState, now: DateTime<Utc>) -> Result<(), Option<DateTime<Utc>>> {
        if !self.window_open(state, now) || state.count < self.max_count {
            return Ok(());
        }
        Err(match (state.started_at, self.window) {
            (Some(start), Some(window)) => Some(start + window),
            _ => None,
        })
    }

    /// State after one more event at `now`
    pub fn record(&self, state: &WindowState, now: DateTime<Utc>) -> WindowState {
        if self.window_open(state, now) {
            WindowState {
                started_at: state.started_at,
                count: state.count.saturating_add(1),
            }
        } else {
            WindowState {
                started_at: Some(now),
                count: 1,
            }
        }
    }
}

/// Global totals visible to one conversion
#[derive(Debug, Clone)]
pub struct GlobalLimitState {
    pub today: DailyConversionStats,
    pub yesterday_limit_reached_at: Option<DateTime<Utc>>,
}

impl GlobalLimitState {
    fn last_limit_reached_at(&self) -> Option<DateTime<Utc>> {
        self.today.limit_reached_at.or(self.yesterday_limit_reached_at)
    }
}

#[derive(Debug, Clone)]
pub struct ConversionLimits {
    pub personal: WindowRule,
    pub per_user_daily_cap: TokenAmount,
    pub global_daily_cap: TokenAmount,
    pub global_cooldown: Duration,
}

impl ConversionLimits {
    pub fn from_config(economy: &crate::config::EconomyConfig) -> Self {
        Self {
            personal: WindowRule {
                feature: "conversion",
                window: Some(Duration::hours(economy.conversion_cooldown_hours)),
                max_count: 1,
            },
            per_user_daily_cap: economy.per_user_daily_cap(),
            global_daily_cap: economy.global_daily_cap(),
            global_cooldown: Duration::hours(economy.global_cooldown_hours),
        }
    }

    /// Evaluate all caps in order: personal cooldown, per-user daily amount,
    /// global pool, global cooldown, then balance.
    pub fn check_limits(
        &self,
        user: &User,
        amount: TokenAmount,
        cost: u64,
        global: &GlobalLimitState,
        now: DateTime<Utc>,
    ) -> LimitDecision {
        if let Err(retry_at) = self.personal.check(&user.conversion_window, now) {
            return deny(DenialReason::PersonalCooldown, LimitScope::User, retry_at);
        }

        let today = now.date_naive();
        let next_midnight = next_utc_midnight(today);

        let user_total = user.withdrawn_on(today).saturating_add(amount);
        if user_total > self.per_user_daily_cap {
            return deny(DenialReason::DailyLimitReached, LimitScope::User, Some(next_midnight));
        }

        if global.today.total_token_claimed >= self.global_daily_cap {
            return deny(DenialReason::DailyLimitReached, LimitScope::Global, Some(next_midnight));
        }

        if let Some(reached_at) = global.last_limit_reached_at() {
            let until = reached_at + self.global_cooldown;
            if now < until {
                return deny(DenialReason::GlobalCooldownActive, LimitScope::Global, Some(until));
            }
        }

        if user.balance < cost {
            return deny(DenialReason::InsufficientBalance, LimitScope::User, None);
        }

        LimitDecision::Allowed
    }
}

fn deny(reason: DenialReason, scope: LimitScope, retry_at: Option<DateTime<Utc>>) -> LimitDecision {
    LimitDecision::Denied(LimitDenial {
        reason,
        scope,
        retry_at,
    })
}

pub fn next_utc_midnight(day: NaiveDate) -> DateTime<Utc> {
    let next = day.succ_opt().unwrap_or(day);
    Utc.from_utc_datetime(&next.and_time(NaiveTime::MIN))
}
