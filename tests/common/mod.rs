#![allow(dead_code)]

use chrono::Utc;
use std::sync::Arc;
use tempfile::TempDir;
use void_collector::{
    config::{ConfigBuilder, EconomyConfig, PayoutConfig},
    ledger::{Field, FieldChange, FieldValue, TokenAmount},
    payout::SimulatedRail,
    AppConfig, ServiceContainer,
};

pub const ADMIN_SECRET: &str = "test-admin-secret";

pub struct TestEnv {
    pub _dir: TempDir,
    pub services: Arc<ServiceContainer>,
    pub rail: Arc<SimulatedRail>,
}

pub fn economy(particles_per_step: u64) -> EconomyConfig {
    EconomyConfig {
        default_particles_per_step: particles_per_step,
        banned_wallets: Vec::new(),
        ..EconomyConfig::default()
    }
}

pub fn env_with(economy: EconomyConfig, payout: PayoutConfig) -> TestEnv {
    let dir = TempDir::new().unwrap();
    let config: AppConfig = ConfigBuilder::new()
        .data_dir(dir.path())
        .admin_secret(ADMIN_SECRET)
        .economy(economy)
        .payout(payout)
        .build();
    let rail = Arc::new(SimulatedRail::new(TokenAmount::from_micro(50_000_000)));
    let services = Arc::new(ServiceContainer::open(config, rail.clone()).unwrap());
    TestEnv {
        _dir: dir,
        services,
        rail,
    }
}

pub fn env() -> TestEnv {
    env_with(economy(75_000), PayoutConfig::default())
}

/// `0x` + 40 hex digits derived from `n`
pub fn wallet(n: u32) -> String {
    format!("0x{:040x}", n)
}

/// Create a user holding `balance` particles
pub fn seed_user(env: &TestEnv, subject: &str, wallet: &str, balance: u64) {
    let ledger = env.services.ledger();
    let now = Utc::now();
    ledger.upsert_by_subject(subject, wallet, now).unwrap();
    ledger
        .apply_delta(
            subject,
            &[
                (Field::Particles, FieldChange::Replace(FieldValue::Number(balance))),
                (Field::TotalParticlesCollected, FieldChange::Increment(balance as i128)),
            ],
            now,
        )
        .unwrap();
}
