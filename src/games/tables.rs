//! Prize tables compiled into cumulative thresholds

use super::types::{PrizeTier, RewardSpec, SpinVariant, MAX_VIP_TIER};
use crate::errors::{ConfigurationError, VoidResult};

/// Total probability mass of a table
pub const PPM_TOTAL: u32 = 1_000_000;

/// Ordered `(cumulative_threshold, tier)` list. The first entry whose threshold is
/// greater than the draw wins.
#[derive(Debug, Clone)]
pub struct PrizeTable {
    entries: Vec<(u32, PrizeTier)>,
    last: PrizeTier,
}

impl PrizeTable {
    /// Validate and compile a tier list. Probabilities must sum to exactly
    /// [`PPM_TOTAL`] and particle ranges must be non-empty.
    pub fn compile(variant: SpinVariant, tiers: &[PrizeTier]) -> VoidResult<Self> {
        let field = format!("spins.{}", variant);
        if tiers.is_empty() {
            return Err(ConfigurationError::MissingRequired(field).into());
        }

        let mut cumulative: u32 = 0;
        let mut entries = Vec::with_capacity(tiers.len());
        for tier in tiers {
            match tier.reward {
                RewardSpec::Particles { min, max } if max <= min => {
                    return Err(invalid(&field, &tier.id, "particle range needs max > min"));
                }
                RewardSpec::VipTier { tier: t } if t == 0 || t > MAX_VIP_TIER => {
                    return Err(invalid(&field, &tier.id, "VIP tier out of range"));
                }
                _ => {}
            }
            if tier.probability_ppm == 0 {
                continue;
            }
            cumulative = cumulative
                .checked_add(tier.probability_ppm)
                .filter(|c| *c <= PPM_TOTAL)
                .ok_or_else(|| invalid(&field, &tier.id, "probabilities exceed 1_000_000 ppm"))?;
            entries.push((cumulative, tier.clone()));
        }

        if cumulative != PPM_TOTAL {
            return Err(invalid(
                &field,
                &cumulative.to_string(),
                "probabilities must sum to exactly 1_000_000 ppm",
            ));
        }

        let last = entries
            .last()
            .map(|(_, tier)| tier.clone())
            .ok_or_else(|| invalid(&field, "0", "table has no reachable tier"))?;
        Ok(Self { entries, last })
    }

    /// Tier for a draw in `[0, PPM_TOTAL)`
    pub fn resolve(&self, draw_ppm: u32) -> &PrizeTier {
        let draw = draw_ppm % PPM_TOTAL;
        self.entries
            .iter()
            .find(|(threshold, _)| *threshold > draw)
            .map(|(_, tier)| tier)
            .unwrap_or(&self.last)
    }

    pub fn tiers(&self) -> impl Iterator<Item = &PrizeTier> {
        self.entries.iter().map(|(_, tier)| tier)
    }
}

fn invalid(field: &str, value: &str, reason: &str) -> crate::errors::VoidError {
    ConfigurationError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SpinConfig;

    fn table(variant: SpinVariant) -> PrizeTable {
        let config = SpinConfig::default();
        PrizeTable::compile(variant, config.tiers(variant)).unwrap()
    }

    #[test]
    fn test_default_tables_sum_to_one() {
        for variant in SpinVariant::ALL {
            let t = table(variant);
            let total: u32 = t.tiers().map(|tier| tier.probability_ppm).sum();
            assert_eq!(total, PPM_TOTAL);
        }
    }

    #[test]
    fn test_threshold_boundaries() {
        let small = table(SpinVariant::Small);
        assert_eq!(small.resolve(0).id, "gold");
        assert_eq!(small.resolve(99).id, "gold");
        assert_eq!(small.resolve(100).id, "silver");
        assert_eq!(small.resolve(1_099).id, "silver");
        assert_eq!(small.resolve(1_100).id, "bronze");
        assert_eq!(small.resolve(6_100).id, "particles_high");
        assert_eq!(small.resolve(999_999).id, "particles_low");
    }

    #[test]
    fn test_invalid_tables_rejected() {
        let mut tiers = SpinConfig::default().big;
        tiers.pop();
        assert!(PrizeTable::compile(SpinVariant::Big, &tiers).is_err());

        let bad_range = vec![PrizeTier {
            id: "flat".into(),
            probability_ppm: PPM_TOTAL,
            reward: RewardSpec::Particles { min: 5, max: 5 },
        }];
        assert!(PrizeTable::compile(SpinVariant::Free, &bad_range).is_err());
        assert!(PrizeTable::compile(SpinVariant::Free, &[]).is_err());
    }
}
