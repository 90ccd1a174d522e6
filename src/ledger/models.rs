//! Persistent ledger records

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, fmt};

/// Token quantity in micro-units (1 token = 1_000_000)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenAmount(u64);

impl TokenAmount {
    pub const UNITS_PER_TOKEN: u64 = 1_000_000;
    pub const ZERO: TokenAmount = TokenAmount(0);

    pub const fn from_micro(units: u64) -> Self {
        Self(units)
    }

    /// Round a decimal token value to micro precision. `None` for NaN, infinities,
    /// negatives and values that do not fit.
    pub fn from_decimal(tokens: f64) -> Option<Self> {
        if !tokens.is_finite() || tokens < 0.0 {
            return None;
        }
        let units = (tokens * Self::UNITS_PER_TOKEN as f64).round();
        if units >= u64::MAX as f64 {
            return None;
        }
        Some(Self(units as u64))
    }

    pub const fn micro(self) -> u64 {
        self.0
    }

    pub fn as_decimal(self) -> f64 {
        self.0 as f64 / Self::UNITS_PER_TOKEN as f64
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / Self::UNITS_PER_TOKEN;
        let frac = self.0 % Self::UNITS_PER_TOKEN;
        if frac == 0 {
            return write!(f, "{}", whole);
        }
        let digits = format!("{:06}", frac);
        write!(f, "{}.{}", whole, digits.trim_end_matches('0'))
    }
}

/// Player account. Serialized field names double as the sync wire names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub subject_id: String,
    pub wallet_address: String,
    #[serde(rename = "particles")]
    pub balance: u64,
    #[serde(rename = "total_particles_collected")]
    pub total_collected: u64,
    pub vip_tier: u8,
    pub premium_vip: bool,
    pub last_conversion_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub conversion_window: WindowState,
    #[serde(default)]
    pub free_spin_window: WindowState,
    pub daily_withdrawal_date: Option<NaiveDate>,
    pub daily_withdrawal_count: u32,
    pub daily_withdrawal_amount: TokenAmount,
    #[serde(flatten)]
    pub progress: GameProgress,
    #[serde(flatten)]
    pub missions: MissionProgress,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login: DateTime<Utc>,
}

impl User {
    pub fn new(subject_id: &str, wallet_address: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            subject_id: subject_id.to_string(),
            wallet_address: wallet_address.to_string(),
            balance: 0,
            total_collected: 0,
            vip_tier: 0,
            premium_vip: false,
            last_conversion_at: None,
            conversion_window: WindowState::default(),
            free_spin_window: WindowState::default(),
            daily_withdrawal_date: None,
            daily_withdrawal_count: 0,
            daily_withdrawal_amount: TokenAmount::ZERO,
            progress: GameProgress::default(),
            missions: MissionProgress::default(),
            created_at: now,
            updated_at: now,
            last_login: now,
        }
    }

    /// Amount already converted on `day`
    pub fn withdrawn_on(&self, day: NaiveDate) -> TokenAmount {
        if self.daily_withdrawal_date == Some(day) {
            self.daily_withdrawal_amount
        } else {
            TokenAmount::ZERO
        }
    }

    /// Display name used on the leaderboard
    pub fn display_name(&self) -> String {
        let tag: String = self
            .subject_id
            .trim_start_matches("0x")
            .chars()
            .take(4)
            .collect::<String>()
            .to_uppercase();
        format!("User {}", tag)
    }

    /// First characters of the subject id, for logs
    pub fn log_prefix(&self) -> &str {
        subject_prefix(&self.subject_id)
    }
}

pub fn subject_prefix(subject: &str) -> &str {
    match subject.char_indices().nth(10) {
        Some((idx, _)) => &subject[..idx],
        None => subject,
    }
}

/// Counter window state for [`crate::limits::WindowRule`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowState {
    pub started_at: Option<DateTime<Utc>>,
    pub count: u32,
}

/// Client-synced gameplay progress
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameProgress {
    pub particles_per_click: u64,
    pub particles_per_second: u64,
    pub total_clicks: u64,
    pub total_passive_particles: u64,
    pub upgrade_click_power: u64,
    pub upgrade_auto_collector: u64,
    pub upgrade_multiplier: u64,
    pub upgrade_offline: u64,
    pub login_streak: u64,
    pub premium_auto_save: bool,
    pub premium_statistics: bool,
    pub premium_notifications: bool,
    pub premium_lucky_particle: bool,
    pub premium_offline_earnings: bool,
    pub premium_daily_bonus: bool,
    pub premium_particle_skin: Option<String>,
    pub premium_background_theme: Option<String>,
    pub unlocked_skins: Vec<String>,
    pub unlocked_themes: Vec<String>,
    pub last_daily_bonus_time: Option<DateTime<Utc>>,
    pub last_daily_reset: Option<DateTime<Utc>>,
}

/// Per-day mission counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MissionProgress {
    #[serde(rename = "mission_day")]
    pub day: Option<NaiveDate>,
    pub daily_clicks: u64,
    pub daily_passive_particles: u64,
    pub daily_particles_collected: u64,
    pub claimed_missions: BTreeSet<String>,
}

impl MissionProgress {
    /// Reset counters when `today` differs from the recorded day
    pub fn roll_over(&mut self, today: NaiveDate) {
        if self.day != Some(today) {
            *self = MissionProgress {
                day: Some(today),
                ..Default::default()
            };
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalStatus {
    Pending,
    Approved,
    Paid,
    Rejected,
}

impl WithdrawalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WithdrawalStatus::Pending => "pending",
            WithdrawalStatus::Approved => "approved",
            WithdrawalStatus::Paid => "paid",
            WithdrawalStatus::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(WithdrawalStatus::Pending),
            "approved" => Some(WithdrawalStatus::Approved),
            "paid" => Some(WithdrawalStatus::Paid),
            "rejected" => Some(WithdrawalStatus::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WithdrawalStatus::Paid | WithdrawalStatus::Rejected)
    }

    pub fn can_transition_to(&self, next: WithdrawalStatus) -> bool {
        use WithdrawalStatus::*;
        matches!(
            (self, next),
            (Pending, Approved) | (Pending, Paid) | (Pending, Rejected) | (Approved, Paid) | (Approved, Rejected)
        )
    }
}

impl fmt::Display for WithdrawalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub id: String,
    pub user_id: String,
    pub subject_id: String,
    pub wallet_address: String,
    pub token_amount: TokenAmount,
    pub resource_spent: u64,
    pub status: WithdrawalStatus,
    pub transaction_hash: Option<String>,
    pub admin_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Global conversion totals for one UTC date
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyConversionStats {
    pub date: NaiveDate,
    pub total_token_claimed: TokenAmount,
    pub conversion_count: u64,
    pub limit_reached_at: Option<DateTime<Utc>>,
}

impl DailyConversionStats {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            total_token_claimed: TokenAmount::ZERO,
            conversion_count: 0,
            limit_reached_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionRate {
    /// Particles per 0.01 token
    pub particles_per_step: u64,
    pub token_price_usd: f64,
    pub base_rate: u64,
    pub target_price: f64,
    pub last_update: DateTime<Utc>,
}

/// Stored block-list entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BanEntry {
    pub wallet: String,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_amount_decimal_rounding() {
        assert_eq!(TokenAmount::from_decimal(0.005), Some(TokenAmount::from_micro(5_000)));
        assert_eq!(TokenAmount::from_decimal(99.995), Some(TokenAmount::from_micro(99_995_000)));
        assert_eq!(TokenAmount::from_decimal(f64::NAN), None);
        assert_eq!(TokenAmount::from_decimal(-1.0), None);
        assert_eq!(TokenAmount::from_micro(1_250_000).to_string(), "1.25");
        assert_eq!(TokenAmount::from_micro(7_000_000).to_string(), "7");
    }

    #[test]
    fn test_withdrawal_transitions() {
        use WithdrawalStatus::*;
        assert!(Pending.can_transition_to(Approved));
        assert!(Approved.can_transition_to(Paid));
        assert!(Approved.can_transition_to(Rejected));
        assert!(!Paid.can_transition_to(Rejected));
        assert!(!Rejected.can_transition_to(Pending));
        assert!(!Approved.can_transition_to(Pending));
        assert!(Paid.is_terminal());
    }

    #[test]
    fn test_mission_roll_over_resets_counters() {
        let day1 = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let mut progress = MissionProgress {
            day: Some(day1),
            daily_clicks: 700,
            claimed_missions: ["daily_click_500".to_string()].into_iter().collect(),
            ..Default::default()
        };

        progress.roll_over(day1);
        assert_eq!(progress.daily_clicks, 700);

        progress.roll_over(day1.succ_opt().unwrap());
        assert_eq!(progress.daily_clicks, 0);
        assert!(progress.claimed_missions.is_empty());
    }

    #[test]
    fn test_user_serializes_with_wire_names() {
        let user = User::new("0xabcdef1234567890", "0xwallet", Utc::now());
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("particles").is_some());
        assert!(json.get("total_particles_collected").is_some());
        assert!(json.get("upgrade_click_power").is_some());
        assert_eq!(user.display_name(), "User ABCD");
        assert_eq!(user.log_prefix(), "0xabcdef12");
    }
}
