//! Configuration management for the Void Collector economy service
//!
//! Settings come from an optional TOML file, then `VOID_*` environment overrides,
//! then validation. Economy amounts are written in decimal tokens and converted to
//! [`TokenAmount`] at the point of use.

use crate::{
    errors::{ConfigurationError, VoidResult},
    games::{tables::PrizeTable, types::{PrizeTier, RewardSpec, SpinVariant}},
    ledger::models::TokenAmount,
};
use serde::{Deserialize, Serialize};
use std::{env, path::Path};

/// Root configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub economy: EconomyConfig,
    pub payout: PayoutConfig,
    pub sanitizer: SanitizerConfig,
    pub spins: SpinConfig,
    pub missions: MissionsConfig,
    pub engagement: EngagementConfig,
    pub admin: AdminConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub enabled: bool,
    pub listen_address: String,
    pub port: u16,
    pub request_timeout_secs: u64,
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_address: "0.0.0.0".to_string(),
            port: 8080,
            request_timeout_secs: 30,
            cors_origins: vec!["*".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "./void_data".to_string(),
        }
    }
}

/// Conversion limits and exchange-rate defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EconomyConfig {
    /// Global pool shared by all players per UTC day
    pub global_daily_cap_tokens: f64,
    pub per_user_daily_cap_tokens: f64,
    pub conversion_cooldown_hours: i64,
    pub global_cooldown_hours: i64,
    /// Particles per 0.01 token when no rate has been stored
    pub default_particles_per_step: u64,
    pub base_rate: u64,
    pub target_price_usd: f64,
    pub banned_wallets: Vec<String>,
    pub banned_subjects: Vec<String>,
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            global_daily_cap_tokens: 100.0,
            per_user_daily_cap_tokens: 0.05,
            conversion_cooldown_hours: 24,
            global_cooldown_hours: 24,
            default_particles_per_step: 150_000,
            base_rate: 250_000,
            target_price_usd: 0.50,
            banned_wallets: vec![
                "0xbfab37c6703e853944696dc9400be77f3878df7b".to_string(),
                "0x6109446d72bc62e2fda20bc04aa799cd6cff763c".to_string(),
                "0x947fdf4a44d0440b6d67de370193875deac10ba0".to_string(),
                "0x53670ca56dd6d0a0d991ff0be2b4af24643d1532".to_string(),
            ],
            banned_subjects: vec![],
        }
    }
}

impl EconomyConfig {
    pub fn global_daily_cap(&self) -> TokenAmount {
        TokenAmount::from_decimal(self.global_daily_cap_tokens).unwrap_or(TokenAmount::ZERO)
    }

    pub fn per_user_daily_cap(&self) -> TokenAmount {
        TokenAmount::from_decimal(self.per_user_daily_cap_tokens).unwrap_or(TokenAmount::ZERO)
    }
}

/// Payout processor limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PayoutConfig {
    pub batch_size: usize,
    pub max_single_payout_tokens: f64,
    pub max_daily_payout_tokens: f64,
    pub min_hot_wallet_balance_tokens: f64,
    pub transfer_timeout_secs: u64,
    /// Opening balance of the in-process rail
    pub simulated_hot_wallet_tokens: f64,
}

impl Default for PayoutConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            max_single_payout_tokens: 0.05,
            max_daily_payout_tokens: 10.0,
            min_hot_wallet_balance_tokens: 0.1,
            transfer_timeout_secs: 30,
            simulated_hot_wallet_tokens: 50.0,
        }
    }
}

impl PayoutConfig {
    pub fn max_single_payout(&self) -> TokenAmount {
        TokenAmount::from_decimal(self.max_single_payout_tokens).unwrap_or(TokenAmount::ZERO)
    }

    pub fn max_daily_payout(&self) -> TokenAmount {
        TokenAmount::from_decimal(self.max_daily_payout_tokens).unwrap_or(TokenAmount::ZERO)
    }

    pub fn min_hot_wallet_balance(&self) -> TokenAmount {
        TokenAmount::from_decimal(self.min_hot_wallet_balance_tokens).unwrap_or(TokenAmount::ZERO)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SanitizerConfig {
    pub max_gain_per_sync: u64,
    pub numeric_ceiling: u64,
    pub near_zero: u64,
    pub meaningful_progress: u64,
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        Self {
            max_gain_per_sync: 500_000,
            numeric_ceiling: 9_000_000_000_000_000_000,
            near_zero: 100,
            meaningful_progress: 1_000,
        }
    }
}

/// Spin prices and prize tables
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpinConfig {
    pub small_cost_tokens: f64,
    pub big_cost_tokens: f64,
    /// Paid instead of a VIP tier the player already holds
    pub fallback_particles: u64,
    /// One free spin per player per window
    pub free_spin_cooldown_hours: i64,
    pub free: Vec<PrizeTier>,
    pub small: Vec<PrizeTier>,
    pub big: Vec<PrizeTier>,
}

impl Default for SpinConfig {
    fn default() -> Self {
        Self {
            small_cost_tokens: 0.45,
            big_cost_tokens: 1.5,
            fallback_particles: 200_000,
            free_spin_cooldown_hours: 24,
            free: vec![
                particles("cosmic_35k", 30_000, 35_000, 35_001),
                particles("stellar_30k", 70_000, 30_000, 30_001),
                particles("nova_25k", 120_000, 25_000, 25_001),
                particles("orbit_20k", 180_000, 20_000, 20_001),
                particles("comet_15k", 250_000, 15_000, 15_001),
                particles("dust_10k", 350_000, 10_000, 10_001),
            ],
            small: vec![
                vip("gold", 100, 3),
                vip("silver", 1_000, 2),
                vip("bronze", 5_000, 1),
                particles("particles_high", 99_390, 50_000, 200_000),
                particles("particles_low", 894_510, 10_000, 50_000),
            ],
            big: vec![
                vip("platinum", 500, 4),
                vip("gold", 2_000, 3),
                vip("silver", 5_000, 2),
                vip("bronze", 10_000, 1),
                particles("particles_high", 294_750, 300_000, 1_000_000),
                particles("particles_low", 687_750, 50_000, 300_000),
            ],
        }
    }
}

fn particles(id: &str, probability_ppm: u32, min: u64, max: u64) -> PrizeTier {
    PrizeTier {
        id: id.to_string(),
        probability_ppm,
        reward: RewardSpec::Particles { min, max },
    }
}

fn vip(id: &str, probability_ppm: u32, tier: u8) -> PrizeTier {
    PrizeTier {
        id: id.to_string(),
        probability_ppm,
        reward: RewardSpec::VipTier { tier },
    }
}

impl SpinConfig {
    pub fn tiers(&self, variant: SpinVariant) -> &[PrizeTier] {
        match variant {
            SpinVariant::Free => &self.free,
            SpinVariant::Small => &self.small,
            SpinVariant::Big => &self.big,
        }
    }

    pub fn cost(&self, variant: SpinVariant) -> TokenAmount {
        let tokens = match variant {
            SpinVariant::Free => 0.0,
            SpinVariant::Small => self.small_cost_tokens,
            SpinVariant::Big => self.big_cost_tokens,
        };
        TokenAmount::from_decimal(tokens).unwrap_or(TokenAmount::ZERO)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissionDefinition {
    pub id: String,
    pub target: u64,
    pub reward: u64,
    pub metric: MissionMetric,
}

/// Which daily counter a mission measures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionMetric {
    ParticlesCollected,
    Clicks,
    PassiveParticles,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MissionsConfig {
    pub catalog: Vec<MissionDefinition>,
}

impl Default for MissionsConfig {
    fn default() -> Self {
        Self {
            catalog: vec![
                MissionDefinition {
                    id: "daily_collect_10k".to_string(),
                    target: 10_000,
                    reward: 2_500,
                    metric: MissionMetric::ParticlesCollected,
                },
                MissionDefinition {
                    id: "daily_click_500".to_string(),
                    target: 500,
                    reward: 1_000,
                    metric: MissionMetric::Clicks,
                },
                MissionDefinition {
                    id: "daily_passive_5k".to_string(),
                    target: 5_000,
                    reward: 1_500,
                    metric: MissionMetric::PassiveParticles,
                },
            ],
        }
    }
}

impl MissionsConfig {
    pub fn find(&self, mission_id: &str) -> Option<&MissionDefinition> {
        self.catalog.iter().find(|m| m.id == mission_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngagementConfig {
    pub max_votes_per_poll: u32,
    pub leaderboard_size: usize,
    pub withdrawal_history_limit: usize,
    pub vip_skins: Vec<String>,
    pub vip_themes: Vec<String>,
}

impl Default for EngagementConfig {
    fn default() -> Self {
        Self {
            max_votes_per_poll: 10,
            leaderboard_size: 50,
            withdrawal_history_limit: 20,
            vip_skins: vec!["default".into(), "rainbow".into(), "gold".into()],
            vip_themes: vec!["default".into(), "nebula".into(), "galaxy".into()],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Bearer secret for `/api/admin/*` and payout routes
    pub secret: String,
}

/// Configuration loader with environment variable support
pub struct ConfigLoader {
    config_path: Option<String>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Load configuration from file and environment variables
    pub fn load(&self) -> VoidResult<AppConfig> {
        let mut config = match self.config_path {
            Some(ref path) => self.load_from_file(path)?,
            None => AppConfig::default(),
        };

        self.apply_env_overrides(&mut config)?;
        self.validate(&config)?;

        Ok(config)
    }

    fn load_from_file(&self, path: &str) -> VoidResult<AppConfig> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConfigurationError::LoadFailed(format!("Failed to read {}: {}", path, e))
        })?;

        toml::from_str(&content)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to parse TOML: {}", e)).into())
    }

    fn apply_env_overrides(&self, config: &mut AppConfig) -> VoidResult<()> {
        if let Ok(port) = env::var("VOID_API_PORT") {
            config.server.port = parse_env("VOID_API_PORT", port, "Invalid port number")?;
        }
        if let Ok(data_dir) = env::var("VOID_DATA_DIR") {
            config.storage.data_dir = data_dir;
        }
        if let Ok(secret) = env::var("VOID_ADMIN_SECRET") {
            config.admin.secret = secret;
        }
        if let Ok(cap) = env::var("VOID_GLOBAL_DAILY_CAP") {
            config.economy.global_daily_cap_tokens =
                parse_env("VOID_GLOBAL_DAILY_CAP", cap, "Invalid token amount")?;
        }
        if let Ok(min) = env::var("VOID_HOT_WALLET_MIN") {
            config.payout.min_hot_wallet_balance_tokens =
                parse_env("VOID_HOT_WALLET_MIN", min, "Invalid token amount")?;
        }
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self, config: &AppConfig) -> VoidResult<()> {
        if config.server.enabled && config.server.port == 0 {
            return Err(invalid("server.port", "0", "API port cannot be zero when API is enabled"));
        }
        if config.server.enabled && config.admin.secret.is_empty() {
            return Err(ConfigurationError::MissingRequired("admin.secret".to_string()).into());
        }
        if config.storage.data_dir.is_empty() {
            return Err(ConfigurationError::MissingRequired("storage.data_dir".to_string()).into());
        }

        let economy = &config.economy;
        for (field, value) in [
            ("economy.global_daily_cap_tokens", economy.global_daily_cap_tokens),
            ("economy.per_user_daily_cap_tokens", economy.per_user_daily_cap_tokens),
            ("economy.target_price_usd", economy.target_price_usd),
            ("payout.max_single_payout_tokens", config.payout.max_single_payout_tokens),
            ("payout.max_daily_payout_tokens", config.payout.max_daily_payout_tokens),
        ] {
            if !positive_amount(value) {
                return Err(invalid(field, &value.to_string(), "Must be a positive token amount"));
            }
        }
        if economy.default_particles_per_step == 0 {
            return Err(invalid("economy.default_particles_per_step", "0", "Rate cannot be zero"));
        }
        if economy.conversion_cooldown_hours <= 0 || economy.global_cooldown_hours <= 0 {
            return Err(invalid(
                "economy.cooldown_hours",
                &economy.conversion_cooldown_hours.to_string(),
                "Cooldowns must be positive",
            ));
        }

        if config.spins.free_spin_cooldown_hours <= 0 {
            return Err(invalid(
                "spins.free_spin_cooldown_hours",
                &config.spins.free_spin_cooldown_hours.to_string(),
                "Cooldowns must be positive",
            ));
        }

        if config.payout.batch_size == 0 {
            return Err(invalid("payout.batch_size", "0", "Batch size cannot be zero"));
        }
        if config.payout.transfer_timeout_secs == 0 {
            return Err(invalid("payout.transfer_timeout_secs", "0", "Timeout cannot be zero"));
        }

        if config.sanitizer.near_zero > config.sanitizer.meaningful_progress {
            return Err(invalid(
                "sanitizer.near_zero",
                &config.sanitizer.near_zero.to_string(),
                "Must not exceed meaningful_progress",
            ));
        }

        for variant in SpinVariant::ALL {
            PrizeTable::compile(variant, config.spins.tiers(variant))?;
        }

        if config.missions.catalog.iter().any(|m| m.target == 0) {
            return Err(invalid("missions.catalog", "target = 0", "Mission targets must be positive"));
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self, config: &AppConfig, path: &str) -> VoidResult<()> {
        let toml_string = toml::to_string_pretty(config).map_err(|e| {
            ConfigurationError::SaveFailed(format!("Failed to serialize config: {}", e))
        })?;

        std::fs::write(path, toml_string).map_err(|e| {
            ConfigurationError::SaveFailed(format!("Failed to write to {}: {}", path, e)).into()
        })
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_env<T: std::str::FromStr>(field: &str, value: String, reason: &str) -> VoidResult<T> {
    value.parse().map_err(|_| {
        ConfigurationError::InvalidValue {
            field: field.to_string(),
            value,
            reason: reason.to_string(),
        }
        .into()
    })
}

fn invalid(field: &str, value: &str, reason: &str) -> crate::errors::VoidError {
    ConfigurationError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

fn positive_amount(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

/// Builder pattern for creating configurations
pub struct ConfigBuilder {
    config: AppConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
        }
    }

    pub fn data_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config.storage.data_dir = path.as_ref().to_string_lossy().to_string();
        self
    }

    pub fn admin_secret(mut self, secret: &str) -> Self {
        self.config.admin.secret = secret.to_string();
        self
    }

    pub fn economy(mut self, economy: EconomyConfig) -> Self {
        self.config.economy = economy;
        self
    }

    pub fn global_daily_cap(mut self, tokens: f64) -> Self {
        self.config.economy.global_daily_cap_tokens = tokens;
        self
    }

    pub fn payout(mut self, payout: PayoutConfig) -> Self {
        self.config.payout = payout;
        self
    }

    pub fn spins(mut self, spins: SpinConfig) -> Self {
        self.config.spins = spins;
        self
    }

    pub fn build(self) -> AppConfig {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Generate a sample configuration file
pub fn generate_sample_config(path: &str) -> VoidResult<()> {
    let mut config = AppConfig::default();
    config.admin.secret = "change-me".to_string();
    ConfigLoader::new().save(&config, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn valid_config() -> AppConfig {
        ConfigBuilder::new().admin_secret("s3cret").build()
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.payout.batch_size, 10);
        assert_eq!(config.sanitizer.max_gain_per_sync, 500_000);
        assert_eq!(config.economy.global_daily_cap(), TokenAmount::from_micro(100_000_000));
        assert_eq!(config.missions.catalog.len(), 3);
    }

    #[test]
    fn test_config_validation() {
        let loader = ConfigLoader::new();
        let mut config = valid_config();
        assert!(loader.validate(&config).is_ok());

        config.server.port = 0;
        assert!(loader.validate(&config).is_err());
    }

    #[test]
    fn test_missing_admin_secret_rejected() {
        let config = AppConfig::default();
        let err = ConfigLoader::new().validate(&config).unwrap_err();
        assert!(err.to_string().contains("admin.secret"));

        let mut offline = AppConfig::default();
        offline.server.enabled = false;
        assert!(ConfigLoader::new().validate(&offline).is_ok());
    }

    #[test]
    fn test_unbalanced_spin_table_rejected() {
        let mut config = valid_config();
        config.spins.small[0].probability_ppm += 1;
        assert!(ConfigLoader::new().validate(&config).is_err());
    }

    #[test]
    fn test_non_positive_cap_rejected() {
        let mut config = valid_config();
        config.economy.global_daily_cap_tokens = 0.0;
        assert!(ConfigLoader::new().validate(&config).is_err());

        config.economy.global_daily_cap_tokens = f64::NAN;
        assert!(ConfigLoader::new().validate(&config).is_err());
    }

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new()
            .data_dir("/tmp/void")
            .global_daily_cap(7.0)
            .build();

        assert_eq!(config.storage.data_dir, "/tmp/void");
        assert_eq!(config.economy.global_daily_cap(), TokenAmount::from_micro(7_000_000));
    }

    #[test]
    fn test_save_and_load_config() -> VoidResult<()> {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_str().unwrap();

        let original = valid_config();
        let loader = ConfigLoader::new();
        loader.save(&original, path)?;

        let loaded = ConfigLoader::new().with_path(path).load()?;

        assert_eq!(loaded.server.port, original.server.port);
        assert_eq!(loaded.spins.big, original.spins.big);
        assert_eq!(loaded.missions.catalog, original.missions.catalog);
        Ok(())
    }

    #[test]
    fn test_partial_file_uses_defaults() -> VoidResult<()> {
        let temp_file = NamedTempFile::new().unwrap();
        std::fs::write(
            temp_file.path(),
            "[admin]\nsecret = \"x\"\n\n[economy]\nglobal_daily_cap_tokens = 7.0\n",
        )
        .unwrap();

        let loaded = ConfigLoader::new().with_path(temp_file.path()).load()?;
        assert_eq!(loaded.economy.global_daily_cap_tokens, 7.0);
        assert_eq!(loaded.economy.per_user_daily_cap_tokens, 0.05);
        assert_eq!(loaded.payout.batch_size, 10);
        Ok(())
    }
}
