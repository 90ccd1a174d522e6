//! Chance-Reward Engine
//!
//! Resolves slot-machine spins server-side. A spin draws from the VRF, maps the draw
//! through the variant's prize table, credits the reward and writes the spin log in
//! one transaction keyed by the client's transaction reference.

use super::{
    tables::PrizeTable,
    types::{RewardSpec, SpinLog, SpinReward, SpinVariant, VRFBundle},
    vrf_engine::VrfDrawEngine,
};
use crate::{
    config::SpinConfig,
    errors::{VoidError, VoidResult},
    ledger::{models::subject_prefix, Field, FieldChange, FieldValue, LedgerStore, RefKind, TokenAmount},
    limits::{DenialReason, LimitDenial, LimitScope, WindowRule},
    metrics::EconomyMetrics,
};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::{collections::HashMap, sync::Arc};
use tracing::info;

const VRF_KEYPAIR_CONFIG: &str = "vrf_keypair";

#[derive(Debug, Clone, Serialize)]
pub struct SpinOutcome {
    pub transaction_ref: String,
    pub variant: SpinVariant,
    pub tier: String,
    pub reward: SpinReward,
    pub fallback: bool,
    pub message: String,
    pub vip_tier: u8,
    pub new_balance: u64,
    pub draw_ppm: u32,
    pub vrf: VRFBundle,
}

pub struct ChanceRewardEngine {
    ledger: Arc<LedgerStore>,
    tables: HashMap<SpinVariant, PrizeTable>,
    vrf: VrfDrawEngine,
    free_rule: WindowRule,
    config: SpinConfig,
    metrics: Arc<EconomyMetrics>,
}

impl ChanceRewardEngine {
    pub fn new(
        ledger: Arc<LedgerStore>,
        vrf: VrfDrawEngine,
        config: SpinConfig,
        metrics: Arc<EconomyMetrics>,
    ) -> VoidResult<Self> {
        let mut tables = HashMap::new();
        for variant in SpinVariant::ALL {
            tables.insert(variant, PrizeTable::compile(variant, config.tiers(variant))?);
        }
        let free_rule = WindowRule {
            feature: "free_spin",
            window: Some(Duration::hours(config.free_spin_cooldown_hours)),
            max_count: 1,
        };
        Ok(Self {
            ledger,
            tables,
            vrf,
            free_rule,
            config,
            metrics,
        })
    }

    /// Engine whose VRF key is persisted in the ledger, created on first start
    pub fn with_stored_key(
        ledger: Arc<LedgerStore>,
        config: SpinConfig,
        metrics: Arc<EconomyMetrics>,
    ) -> VoidResult<Self> {
        let key_hex: String = ledger.get_or_init_config(VRF_KEYPAIR_CONFIG, || {
            hex::encode(VrfDrawEngine::new_random().keypair_bytes())
        })?;
        let bytes = hex::decode(&key_hex).map_err(|e| {
            VoidError::Storage(crate::errors::StorageError::CorruptedData(format!(
                "VRF keypair: {}",
                e
            )))
        })?;
        let vrf = VrfDrawEngine::from_keypair_bytes(&bytes)
            .map_err(|e| VoidError::Storage(crate::errors::StorageError::CorruptedData(e)))?;
        info!(public_key = %vrf.public_key_hex(), "spin VRF key loaded");
        Self::new(ledger, vrf, config, metrics)
    }

    pub fn public_key_hex(&self) -> String {
        self.vrf.public_key_hex()
    }

    fn table(&self, variant: SpinVariant) -> VoidResult<&PrizeTable> {
        self.tables
            .get(&variant)
            .ok_or_else(|| VoidError::Validation(format!("No prize table for {}", variant)))
    }

    pub fn resolve_spin(
        &self,
        subject: &str,
        transaction_ref: &str,
        variant: SpinVariant,
        now: DateTime<Utc>,
    ) -> VoidResult<SpinOutcome> {
        if transaction_ref.trim().is_empty() {
            return Err(VoidError::Validation("transaction_ref is required".to_string()));
        }

        let table = self.table(variant)?;
        let draw = self.vrf.draw(variant.as_str(), transaction_ref, subject);
        let prize = table.resolve(draw.ppm);

        let outcome = self.ledger.transaction("resolve_spin", |txn| {
            txn.claim_reference(RefKind::Spin, transaction_ref)?;
            let mut user = txn.lock_user(subject)?;

            if variant == SpinVariant::Free {
                if let Err(retry_at) = self.free_rule.check(&user.free_spin_window, now) {
                    return Err(VoidError::Denied(LimitDenial {
                        reason: DenialReason::SpinCooldown,
                        scope: LimitScope::User,
                        retry_at,
                    }));
                }
                user.free_spin_window = self.free_rule.record(&user.free_spin_window, now);
            }

            let (reward, fallback) = match (prize.reward.amount_for(draw.magnitude), prize.reward) {
                (Some(amount), _) => (SpinReward::Particles(amount), false),
                (None, RewardSpec::VipTier { tier }) if tier > user.vip_tier => (SpinReward::VipTier(tier), false),
                (None, _) => (SpinReward::Particles(self.config.fallback_particles), true),
            };

            let changes = match reward {
                SpinReward::Particles(amount) => vec![
                    (Field::Particles, FieldChange::Increment(amount as i128)),
                    (Field::TotalParticlesCollected, FieldChange::Increment(amount as i128)),
                ],
                SpinReward::VipTier(tier) => vec![
                    (Field::VipTier, FieldChange::Replace(FieldValue::Number(tier as u64))),
                    (Field::PremiumVip, FieldChange::Replace(FieldValue::Flag(true))),
                ],
            };
            txn.apply_changes(&mut user, &changes)?;

            let log = SpinLog {
                transaction_ref: transaction_ref.to_string(),
                user_id: user.id.clone(),
                subject_id: user.subject_id.clone(),
                variant,
                cost: self.config.cost(variant),
                tier: prize.id.clone(),
                reward,
                fallback,
                vip_tier_after: user.vip_tier,
                draw_ppm: draw.ppm,
                vrf: draw.bundle.clone(),
                created_at: now,
            };
            txn.put_reference(RefKind::Spin, transaction_ref, &log)?;
            txn.put_user(&user, now)?;

            Ok(SpinOutcome {
                transaction_ref: transaction_ref.to_string(),
                variant,
                tier: prize.id.clone(),
                reward,
                fallback,
                message: reward_message(reward, fallback),
                vip_tier: user.vip_tier,
                new_balance: user.balance,
                draw_ppm: draw.ppm,
                vrf: draw.bundle.clone(),
            })
        })?;

        self.metrics.record_spin(variant.as_str(), &outcome.tier);
        info!(
            subject = %subject_prefix(subject),
            variant = %variant,
            tier = %outcome.tier,
            draw_ppm = outcome.draw_ppm,
            cost = %self.config.cost(variant),
            "spin resolved"
        );
        Ok(outcome)
    }

    /// Price of a paid spin
    pub fn cost(&self, variant: SpinVariant) -> TokenAmount {
        self.config.cost(variant)
    }
}

fn reward_message(reward: SpinReward, fallback: bool) -> String {
    match (reward, fallback) {
        (SpinReward::VipTier(tier), _) => format!("Jackpot! VIP tier {} unlocked", tier),
        (SpinReward::Particles(amount), true) => {
            format!("You already hold that tier. {} particles instead!", amount)
        }
        (SpinReward::Particles(amount), false) => format!("You won {} particles!", amount),
    }
}
