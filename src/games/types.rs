use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Highest VIP tier a spin or purchase can grant
pub const MAX_VIP_TIER: u8 = 4;

/// Spin variants
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SpinVariant {
    Free,
    Small,
    Big,
}

impl SpinVariant {
    pub const ALL: [SpinVariant; 3] = [SpinVariant::Free, SpinVariant::Small, SpinVariant::Big];

    pub fn as_str(&self) -> &'static str {
        match self {
            SpinVariant::Free => "free",
            SpinVariant::Small => "small",
            SpinVariant::Big => "big",
        }
    }
}

impl fmt::Display for SpinVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SpinVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(SpinVariant::Free),
            "small" => Ok(SpinVariant::Small),
            "big" => Ok(SpinVariant::Big),
            other => Err(format!("Unknown spin variant: {}", other)),
        }
    }
}

/// What a prize tier pays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RewardSpec {
    /// Uniform in `[min, max)`
    Particles { min: u64, max: u64 },
    VipTier { tier: u8 },
}

impl RewardSpec {
    /// Particle amount selected by a draw magnitude; `None` for tier rewards
    pub fn amount_for(&self, magnitude: u64) -> Option<u64> {
        match *self {
            RewardSpec::Particles { min, max } => {
                let span = max.saturating_sub(min).max(1);
                Some(min + magnitude % span)
            }
            RewardSpec::VipTier { .. } => None,
        }
    }
}

/// One row of a prize table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrizeTier {
    pub id: String,
    /// Parts per million
    pub probability_ppm: u32,
    pub reward: RewardSpec,
}

/// What a resolved spin granted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SpinReward {
    Particles(u64),
    VipTier(u8),
}

/// VRF proof bundle for verification
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VRFBundle {
    pub vrf_output: String,
    pub vrf_proof: String,
    pub public_key: String,
    pub input_message: String,
}

/// Immutable record of one spin, stored under its transaction reference
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpinLog {
    pub transaction_ref: String,
    pub user_id: String,
    pub subject_id: String,
    pub variant: SpinVariant,
    pub cost: crate::ledger::TokenAmount,
    pub tier: String,
    pub reward: SpinReward,
    /// A VIP tier the player already held was paid out as particles
    pub fallback: bool,
    pub vip_tier_after: u8,
    pub draw_ppm: u32,
    pub vrf: VRFBundle,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_parse() {
        assert_eq!("big".parse::<SpinVariant>().unwrap(), SpinVariant::Big);
        assert!("huge".parse::<SpinVariant>().is_err());
        assert_eq!(SpinVariant::Small.to_string(), "small");
    }

    #[test]
    fn test_reward_serialization() {
        let json = serde_json::to_value(SpinReward::VipTier(3)).unwrap();
        assert_eq!(json, serde_json::json!({"type": "vip_tier", "value": 3}));

        let spec: RewardSpec = serde_json::from_str(r#"{"type":"particles","min":10,"max":20}"#).unwrap();
        assert_eq!(spec, RewardSpec::Particles { min: 10, max: 20 });
    }

    #[test]
    fn test_amount_for_stays_in_half_open_range() {
        let spec = RewardSpec::Particles { min: 50_000, max: 200_000 };
        assert_eq!(spec.amount_for(0), Some(50_000));
        assert_eq!(spec.amount_for(149_999), Some(199_999));
        assert_eq!(spec.amount_for(150_000), Some(50_000));
        assert_eq!(spec.amount_for(u64::MAX), Some(50_000 + u64::MAX % 150_000));

        let single = RewardSpec::Particles { min: 35_000, max: 35_001 };
        assert_eq!(single.amount_for(12_345), Some(35_000));

        assert_eq!(RewardSpec::VipTier { tier: 3 }.amount_for(0), None);
    }
}
