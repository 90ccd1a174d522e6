//! Service container wiring the ledger, the economy services and the payment rail
//!
//! Everything shares one [`LedgerStore`] and one metrics registry.

use crate::{
    config::AppConfig,
    conversion::ConversionService,
    engagement::EngagementService,
    errors::{ConfigurationError, VoidResult},
    games::spin::ChanceRewardEngine,
    ledger::{LedgerStore, TokenAmount},
    metrics::EconomyMetrics,
    payout::{PaymentRail, PayoutProcessor, SimulatedRail},
    sanitizer::{Sanitizer, SyncService},
};
use std::sync::Arc;
use tracing::info;

pub struct ServiceContainer {
    config: AppConfig,
    ledger: Arc<LedgerStore>,
    metrics: Arc<EconomyMetrics>,
    pub sync: SyncService,
    pub conversion: ConversionService,
    pub spins: ChanceRewardEngine,
    pub payouts: PayoutProcessor,
    pub engagement: EngagementService,
}

impl ServiceContainer {
    /// Open the ledger under `config.storage.data_dir` and build every service
    pub fn open(config: AppConfig, rail: Arc<dyn PaymentRail>) -> VoidResult<Self> {
        let ledger = Arc::new(LedgerStore::open(
            &config.storage.data_dir,
            config.sanitizer.numeric_ceiling,
        )?);
        Self::with_ledger(config, ledger, rail)
    }

    pub fn with_ledger(
        config: AppConfig,
        ledger: Arc<LedgerStore>,
        rail: Arc<dyn PaymentRail>,
    ) -> VoidResult<Self> {
        let metrics = Arc::new(
            EconomyMetrics::new()
                .map_err(|e| ConfigurationError::LoadFailed(format!("metrics registry: {}", e)))?,
        );

        let sync = SyncService::new(
            ledger.clone(),
            Sanitizer::new(config.sanitizer.clone()),
            metrics.clone(),
        );
        let conversion = ConversionService::new(ledger.clone(), config.economy.clone(), metrics.clone());
        let spins = ChanceRewardEngine::with_stored_key(ledger.clone(), config.spins.clone(), metrics.clone())?;
        let payouts = PayoutProcessor::new(
            ledger.clone(),
            rail,
            config.payout.clone(),
            &config.economy,
            metrics.clone(),
        );
        let engagement = EngagementService::new(
            ledger.clone(),
            config.missions.clone(),
            config.engagement.clone(),
        );

        info!(data_dir = %config.storage.data_dir, "economy services ready");
        Ok(Self {
            config,
            ledger,
            metrics,
            sync,
            conversion,
            spins,
            payouts,
            engagement,
        })
    }

    /// Rail backed by the in-process hot wallet ledger
    pub fn simulated_rail(config: &AppConfig) -> Arc<dyn PaymentRail> {
        let opening = TokenAmount::from_decimal(config.payout.simulated_hot_wallet_tokens)
            .unwrap_or(TokenAmount::ZERO);
        Arc::new(SimulatedRail::new(opening))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn ledger(&self) -> Arc<LedgerStore> {
        Arc::clone(&self.ledger)
    }

    pub fn metrics(&self) -> Arc<EconomyMetrics> {
        Arc::clone(&self.metrics)
    }
}
