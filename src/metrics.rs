//! Prometheus metrics for the economy service
//!
//! Scraped at `GET /metrics`. Each service holds an `Arc<EconomyMetrics>` and bumps
//! its counters after the storage transaction has committed.

use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

pub struct EconomyMetrics {
    registry: Registry,
    conversions: IntCounterVec,
    spins: IntCounterVec,
    payouts: IntCounterVec,
    syncs: IntCounterVec,
    pending_withdrawals: IntGauge,
}

impl EconomyMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let conversions = IntCounterVec::new(
            Opts::new("void_conversions_total", "Conversion attempts by outcome"),
            &["outcome"],
        )?;
        let spins = IntCounterVec::new(
            Opts::new("void_spins_total", "Resolved spins by variant and prize tier"),
            &["variant", "tier"],
        )?;
        let payouts = IntCounterVec::new(
            Opts::new("void_payouts_total", "Payout items by outcome"),
            &["outcome"],
        )?;
        let syncs = IntCounterVec::new(
            Opts::new("void_sync_total", "Game-state syncs by outcome"),
            &["outcome"],
        )?;
        let pending_withdrawals = IntGauge::new(
            "void_pending_withdrawals",
            "Pending withdrawal requests seen by the last payout batch",
        )?;

        registry.register(Box::new(conversions.clone()))?;
        registry.register(Box::new(spins.clone()))?;
        registry.register(Box::new(payouts.clone()))?;
        registry.register(Box::new(syncs.clone()))?;
        registry.register(Box::new(pending_withdrawals.clone()))?;

        Ok(Self {
            registry,
            conversions,
            spins,
            payouts,
            syncs,
            pending_withdrawals,
        })
    }

    pub fn record_conversion(&self, outcome: &str) {
        self.conversions.with_label_values(&[outcome]).inc();
    }

    pub fn record_spin(&self, variant: &str, tier: &str) {
        self.spins.with_label_values(&[variant, tier]).inc();
    }

    pub fn record_payout(&self, outcome: &str) {
        self.payouts.with_label_values(&[outcome]).inc();
    }

    pub fn record_sync(&self, outcome: &str) {
        self.syncs.with_label_values(&[outcome]).inc();
    }

    pub fn set_pending_withdrawals(&self, count: usize) {
        self.pending_withdrawals.set(count as i64);
    }

    pub fn conversions(&self, outcome: &str) -> u64 {
        self.conversions.with_label_values(&[outcome]).get()
    }

    /// Text exposition format
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!(error = %e, "failed to encode metrics");
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_contains_counters() {
        let metrics = EconomyMetrics::new().unwrap();
        metrics.record_conversion("success");
        metrics.record_conversion("success");
        metrics.record_spin("small", "gold");

        let text = metrics.render();
        assert!(text.contains("void_conversions_total{outcome=\"success\"} 2"));
        assert!(text.contains("void_spins_total{tier=\"gold\",variant=\"small\"} 1"));
        assert_eq!(metrics.conversions("success"), 2);
    }
}
