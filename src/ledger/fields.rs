//! Typed user fields and the rules for changing them
//!
//! Every mutable user column is a [`Field`] with a [`FieldKind`]. Writes arrive as
//! [`FieldChange`]s and are checked here before they touch the row.

use super::models::User;
use crate::errors::{VoidError, VoidResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Particles,
    TotalParticlesCollected,
    ParticlesPerClick,
    ParticlesPerSecond,
    TotalClicks,
    TotalPassiveParticles,
    UpgradeClickPower,
    UpgradeAutoCollector,
    UpgradeMultiplier,
    UpgradeOffline,
    LoginStreak,
    DailyClicks,
    DailyPassiveParticles,
    DailyParticlesCollected,
    VipTier,
    PremiumVip,
    PremiumAutoSave,
    PremiumStatistics,
    PremiumNotifications,
    PremiumLuckyParticle,
    PremiumOfflineEarnings,
    PremiumDailyBonus,
    PremiumParticleSkin,
    PremiumBackgroundTheme,
    UnlockedSkins,
    UnlockedThemes,
    LastDailyBonusTime,
    LastDailyReset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Spendable balance, gain-capped per sync
    Balance,
    /// Monotone lifetime counter
    Lifetime,
    Numeric,
    /// Monotone, server-written only
    Tier,
    /// Once true, stays true
    OneWayFlag,
    Flag,
    Text,
    List,
    Timestamp,
}

impl Field {
    pub const ALL: [Field; 28] = [
        Field::Particles,
        Field::TotalParticlesCollected,
        Field::ParticlesPerClick,
        Field::ParticlesPerSecond,
        Field::TotalClicks,
        Field::TotalPassiveParticles,
        Field::UpgradeClickPower,
        Field::UpgradeAutoCollector,
        Field::UpgradeMultiplier,
        Field::UpgradeOffline,
        Field::LoginStreak,
        Field::DailyClicks,
        Field::DailyPassiveParticles,
        Field::DailyParticlesCollected,
        Field::VipTier,
        Field::PremiumVip,
        Field::PremiumAutoSave,
        Field::PremiumStatistics,
        Field::PremiumNotifications,
        Field::PremiumLuckyParticle,
        Field::PremiumOfflineEarnings,
        Field::PremiumDailyBonus,
        Field::PremiumParticleSkin,
        Field::PremiumBackgroundTheme,
        Field::UnlockedSkins,
        Field::UnlockedThemes,
        Field::LastDailyBonusTime,
        Field::LastDailyReset,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Field::Particles => "particles",
            Field::TotalParticlesCollected => "total_particles_collected",
            Field::ParticlesPerClick => "particles_per_click",
            Field::ParticlesPerSecond => "particles_per_second",
            Field::TotalClicks => "total_clicks",
            Field::TotalPassiveParticles => "total_passive_particles",
            Field::UpgradeClickPower => "upgrade_click_power",
            Field::UpgradeAutoCollector => "upgrade_auto_collector",
            Field::UpgradeMultiplier => "upgrade_multiplier",
            Field::UpgradeOffline => "upgrade_offline",
            Field::LoginStreak => "login_streak",
            Field::DailyClicks => "daily_clicks",
            Field::DailyPassiveParticles => "daily_passive_particles",
            Field::DailyParticlesCollected => "daily_particles_collected",
            Field::VipTier => "vip_tier",
            Field::PremiumVip => "premium_vip",
            Field::PremiumAutoSave => "premium_auto_save",
            Field::PremiumStatistics => "premium_statistics",
            Field::PremiumNotifications => "premium_notifications",
            Field::PremiumLuckyParticle => "premium_lucky_particle",
            Field::PremiumOfflineEarnings => "premium_offline_earnings",
            Field::PremiumDailyBonus => "premium_daily_bonus",
            Field::PremiumParticleSkin => "premium_particle_skin",
            Field::PremiumBackgroundTheme => "premium_background_theme",
            Field::UnlockedSkins => "unlocked_skins",
            Field::UnlockedThemes => "unlocked_themes",
            Field::LastDailyBonusTime => "last_daily_bonus_time",
            Field::LastDailyReset => "last_daily_reset",
        }
    }

    pub fn from_name(name: &str) -> Option<Field> {
        Field::ALL.iter().copied().find(|f| f.name() == name)
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            Field::Particles => FieldKind::Balance,
            Field::TotalParticlesCollected => FieldKind::Lifetime,
            Field::VipTier => FieldKind::Tier,
            Field::PremiumVip => FieldKind::OneWayFlag,
            Field::PremiumAutoSave
            | Field::PremiumStatistics
            | Field::PremiumNotifications
            | Field::PremiumLuckyParticle
            | Field::PremiumOfflineEarnings
            | Field::PremiumDailyBonus => FieldKind::Flag,
            Field::PremiumParticleSkin | Field::PremiumBackgroundTheme => FieldKind::Text,
            Field::UnlockedSkins | Field::UnlockedThemes => FieldKind::List,
            Field::LastDailyBonusTime | Field::LastDailyReset => FieldKind::Timestamp,
            _ => FieldKind::Numeric,
        }
    }

    /// Whether a client sync may write this field
    pub fn client_writable(&self) -> bool {
        !matches!(self, Field::VipTier)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self.kind(),
            FieldKind::Balance | FieldKind::Lifetime | FieldKind::Numeric | FieldKind::Tier
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(u64),
    Flag(bool),
    Text(Option<String>),
    List(Vec<String>),
    Timestamp(Option<DateTime<Utc>>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldChange {
    Increment(i128),
    Replace(FieldValue),
}

impl User {
    pub fn number(&self, field: Field) -> Option<u64> {
        let value = match field {
            Field::Particles => self.balance,
            Field::TotalParticlesCollected => self.total_collected,
            Field::ParticlesPerClick => self.progress.particles_per_click,
            Field::ParticlesPerSecond => self.progress.particles_per_second,
            Field::TotalClicks => self.progress.total_clicks,
            Field::TotalPassiveParticles => self.progress.total_passive_particles,
            Field::UpgradeClickPower => self.progress.upgrade_click_power,
            Field::UpgradeAutoCollector => self.progress.upgrade_auto_collector,
            Field::UpgradeMultiplier => self.progress.upgrade_multiplier,
            Field::UpgradeOffline => self.progress.upgrade_offline,
            Field::LoginStreak => self.progress.login_streak,
            Field::DailyClicks => self.missions.daily_clicks,
            Field::DailyPassiveParticles => self.missions.daily_passive_particles,
            Field::DailyParticlesCollected => self.missions.daily_particles_collected,
            Field::VipTier => self.vip_tier as u64,
            _ => return None,
        };
        Some(value)
    }

    pub fn flag(&self, field: Field) -> Option<bool> {
        let value = match field {
            Field::PremiumVip => self.premium_vip,
            Field::PremiumAutoSave => self.progress.premium_auto_save,
            Field::PremiumStatistics => self.progress.premium_statistics,
            Field::PremiumNotifications => self.progress.premium_notifications,
            Field::PremiumLuckyParticle => self.progress.premium_lucky_particle,
            Field::PremiumOfflineEarnings => self.progress.premium_offline_earnings,
            Field::PremiumDailyBonus => self.progress.premium_daily_bonus,
            _ => return None,
        };
        Some(value)
    }

    fn number_slot(&mut self, field: Field) -> Option<&mut u64> {
        Some(match field {
            Field::Particles => &mut self.balance,
            Field::TotalParticlesCollected => &mut self.total_collected,
            Field::ParticlesPerClick => &mut self.progress.particles_per_click,
            Field::ParticlesPerSecond => &mut self.progress.particles_per_second,
            Field::TotalClicks => &mut self.progress.total_clicks,
            Field::TotalPassiveParticles => &mut self.progress.total_passive_particles,
            Field::UpgradeClickPower => &mut self.progress.upgrade_click_power,
            Field::UpgradeAutoCollector => &mut self.progress.upgrade_auto_collector,
            Field::UpgradeMultiplier => &mut self.progress.upgrade_multiplier,
            Field::UpgradeOffline => &mut self.progress.upgrade_offline,
            Field::LoginStreak => &mut self.progress.login_streak,
            Field::DailyClicks => &mut self.missions.daily_clicks,
            Field::DailyPassiveParticles => &mut self.missions.daily_passive_particles,
            Field::DailyParticlesCollected => &mut self.missions.daily_particles_collected,
            _ => return None,
        })
    }

    fn flag_slot(&mut self, field: Field) -> Option<&mut bool> {
        Some(match field {
            Field::PremiumVip => &mut self.premium_vip,
            Field::PremiumAutoSave => &mut self.progress.premium_auto_save,
            Field::PremiumStatistics => &mut self.progress.premium_statistics,
            Field::PremiumNotifications => &mut self.progress.premium_notifications,
            Field::PremiumLuckyParticle => &mut self.progress.premium_lucky_particle,
            Field::PremiumOfflineEarnings => &mut self.progress.premium_offline_earnings,
            Field::PremiumDailyBonus => &mut self.progress.premium_daily_bonus,
            _ => return None,
        })
    }

    /// Apply one change under the field's rules.
    ///
    /// Increments saturate at `ceiling`, replacements above it are refused, and
    /// nothing goes below zero. Lifetime, tier and one-way fields never decrease.
    pub fn apply_change(&mut self, field: Field, change: &FieldChange, ceiling: u64) -> VoidResult<()> {
        if field == Field::VipTier {
            return self.apply_tier_change(change);
        }

        if field.is_numeric() {
            let current = self.number(field).unwrap_or(0);
            let next = match change {
                FieldChange::Increment(delta) => {
                    let target = current as i128 + delta;
                    if target < 0 {
                        return Err(VoidError::InsufficientBalance {
                            required: delta.unsigned_abs().min(u64::MAX as u128) as u64,
                            available: current,
                        });
                    }
                    target.min(ceiling as i128) as u64
                }
                FieldChange::Replace(FieldValue::Number(value)) => {
                    if *value > ceiling {
                        return Err(VoidError::ValueOutOfRange {
                            field: field.name().to_string(),
                            value: *value as i128,
                        });
                    }
                    *value
                }
                FieldChange::Replace(_) => return Err(type_mismatch(field)),
            };

            if field.kind() == FieldKind::Lifetime && next < current {
                return Err(VoidError::Validation(format!(
                    "{} cannot decrease ({} -> {})",
                    field.name(),
                    current,
                    next
                )));
            }
            if let Some(slot) = self.number_slot(field) {
                *slot = next;
            }
            return Ok(());
        }

        let FieldChange::Replace(value) = change else {
            return Err(type_mismatch(field));
        };

        match (field.kind(), value) {
            (FieldKind::OneWayFlag, FieldValue::Flag(flag)) => {
                if let Some(slot) = self.flag_slot(field) {
                    *slot = *slot || *flag;
                }
            }
            (FieldKind::Flag, FieldValue::Flag(flag)) => {
                if let Some(slot) = self.flag_slot(field) {
                    *slot = *flag;
                }
            }
            (FieldKind::Text, FieldValue::Text(text)) => match field {
                Field::PremiumParticleSkin => self.progress.premium_particle_skin = text.clone(),
                _ => self.progress.premium_background_theme = text.clone(),
            },
            (FieldKind::List, FieldValue::List(items)) => match field {
                Field::UnlockedSkins => self.progress.unlocked_skins = items.clone(),
                _ => self.progress.unlocked_themes = items.clone(),
            },
            (FieldKind::Timestamp, FieldValue::Timestamp(at)) => match field {
                Field::LastDailyBonusTime => self.progress.last_daily_bonus_time = *at,
                _ => self.progress.last_daily_reset = *at,
            },
            _ => return Err(type_mismatch(field)),
        }
        Ok(())
    }

    fn apply_tier_change(&mut self, change: &FieldChange) -> VoidResult<()> {
        let next = match change {
            FieldChange::Increment(delta) => self.vip_tier as i128 + delta,
            FieldChange::Replace(FieldValue::Number(tier)) => *tier as i128,
            FieldChange::Replace(_) => return Err(type_mismatch(Field::VipTier)),
        };
        if next < self.vip_tier as i128 {
            return Err(VoidError::Validation(format!(
                "vip_tier cannot decrease ({} -> {})",
                self.vip_tier, next
            )));
        }
        if next > crate::games::types::MAX_VIP_TIER as i128 {
            return Err(VoidError::ValueOutOfRange {
                field: "vip_tier".to_string(),
                value: next,
            });
        }
        self.vip_tier = next as u8;
        Ok(())
    }
}

fn type_mismatch(field: Field) -> VoidError {
    VoidError::Validation(format!("Wrong value type for {}", field.name()))
}
