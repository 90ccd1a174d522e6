mod common;

use chrono::Utc;
use common::{env, seed_user, wallet};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use void_collector::{
    config::SpinConfig,
    games::{PrizeTable, SpinReward, SpinVariant, VrfDrawEngine},
    ledger::TokenAmount,
    sanitizer::{Adjustment, SyncOutcome, SyncRejection},
    VoidError,
};

fn payload(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

#[test]
fn test_spin_reference_is_single_use() {
    let env = env();
    seed_user(&env, "spinner", &wallet(1), 0);
    let now = Utc::now();

    let outcome = env
        .services
        .spins
        .resolve_spin("spinner", "ref-0001", SpinVariant::Free, now)
        .unwrap();
    let SpinReward::Particles(amount) = outcome.reward else {
        panic!("free table only pays particles");
    };
    assert!((10_000..=35_000).contains(&amount));
    assert_eq!(outcome.new_balance, amount);

    let err = env
        .services
        .spins
        .resolve_spin("spinner", "ref-0001", SpinVariant::Free, now)
        .unwrap_err();
    assert!(matches!(err, VoidError::DuplicateTransaction(_)));

    let user = env.services.ledger().get_user("spinner").unwrap();
    assert_eq!(user.balance, amount);
    assert_eq!(user.total_collected, amount);
}

#[test]
fn test_spin_draw_is_bound_to_its_input() {
    let env = env();
    seed_user(&env, "spinner", &wallet(1), 0);

    let outcome = env
        .services
        .spins
        .resolve_spin("spinner", "ref-proof", SpinVariant::Small, Utc::now())
        .unwrap();

    assert_eq!(outcome.vrf.input_message, "small:ref-proof:spinner");
    assert_eq!(outcome.vrf.public_key, env.services.spins.public_key_hex());
    assert!(VrfDrawEngine::verify_vrf_proof(&outcome.vrf, "small:ref-proof:spinner").unwrap());
    assert!(!VrfDrawEngine::verify_vrf_proof(&outcome.vrf, "small:ref-other:spinner").unwrap());
}

#[test]
fn test_every_ppm_maps_to_its_tier_mass() {
    let config = SpinConfig::default();
    for variant in SpinVariant::ALL {
        let table = PrizeTable::compile(variant, config.tiers(variant)).unwrap();
        let mut counts: HashMap<String, u32> = HashMap::new();
        for ppm in 0..1_000_000u32 {
            *counts.entry(table.resolve(ppm).id.clone()).or_default() += 1;
        }
        for tier in config.tiers(variant) {
            assert_eq!(
                counts.get(&tier.id).copied().unwrap_or(0),
                tier.probability_ppm,
                "{} tier {}",
                variant,
                tier.id
            );
        }
    }
}

#[test]
fn test_vrf_draws_follow_free_table() {
    const DRAWS: u32 = 10_000;
    let config = SpinConfig::default();
    let table = PrizeTable::compile(SpinVariant::Free, &config.free).unwrap();
    let vrf = VrfDrawEngine::new_random();

    let mut counts: HashMap<String, u32> = HashMap::new();
    for i in 0..DRAWS {
        let draw = vrf.draw("free", &format!("ref-{}", i), "subject");
        *counts.entry(table.resolve(draw.ppm).id.clone()).or_default() += 1;
    }

    for tier in &config.free {
        let p = tier.probability_ppm as f64 / 1_000_000.0;
        let expected = DRAWS as f64 * p;
        let sigma = (DRAWS as f64 * p * (1.0 - p)).sqrt();
        let observed = counts.get(&tier.id).copied().unwrap_or(0) as f64;
        assert!(
            (observed - expected).abs() <= 5.0 * sigma,
            "tier {} observed {} expected {:.0}",
            tier.id,
            observed,
            expected
        );
    }
}

#[test]
fn test_sync_regression_leaves_record_untouched() {
    let env = env();
    seed_user(&env, "veteran", &wallet(1), 5_000_000);
    let before = env.services.ledger().get_user("veteran").unwrap();

    let outcome = env
        .services
        .sync
        .apply_sync("veteran", &payload(json!({"total_particles_collected": 0})), Utc::now())
        .unwrap();
    assert!(matches!(
        outcome,
        SyncOutcome::Rejected(SyncRejection::RegressionDetected {
            stored_total: 5_000_000,
            incoming_total: 0
        })
    ));

    let after = env.services.ledger().get_user("veteran").unwrap();
    assert_eq!(after.total_collected, before.total_collected);
    assert_eq!(after.balance, before.balance);
}

#[test]
fn test_sync_repairs_missing_lifetime_and_clamps_gain() {
    let env = env();
    seed_user(&env, "veteran", &wallet(1), 5_000_000);

    let outcome = env
        .services
        .sync
        .apply_sync(
            "veteran",
            &payload(json!({
                "particles": 4_000,
                "total_particles_collected": 0,
                "total_clicks": "120",
                "is_admin": true
            })),
            Utc::now(),
        )
        .unwrap();
    let SyncOutcome::Saved { user, adjustments } = outcome else {
        panic!("sync should be saved");
    };
    assert_eq!(user.balance, 4_000);
    assert_eq!(user.total_collected, 5_000_000);
    assert_eq!(user.progress.total_clicks, 120);
    assert!(adjustments.contains(&Adjustment::Dropped {
        field: "is_admin".to_string()
    }));

    let outcome = env
        .services
        .sync
        .apply_sync("veteran", &payload(json!({"particles": 9_000_000})), Utc::now())
        .unwrap();
    let SyncOutcome::Saved { user, .. } = outcome else {
        panic!("sync should be saved");
    };
    assert_eq!(user.balance, 4_000 + 500_000);
}

#[test]
fn test_purchased_vip_survives_client_sync() {
    let env = env();
    seed_user(&env, "patron", &wallet(1), 1_000);
    let now = Utc::now();

    let purchase = env
        .services
        .engagement
        .purchase_tier("patron", 2, "purchase-1", TokenAmount::from_micro(2_000_000), now)
        .unwrap();
    assert_eq!(purchase.tier, 2);
    assert!(purchase.premium_vip);

    let outcome = env
        .services
        .sync
        .apply_sync(
            "patron",
            &payload(json!({"premium_vip": false, "vip_tier": 0, "particles": 1_500})),
            now,
        )
        .unwrap();
    assert!(matches!(outcome, SyncOutcome::Saved { .. }));

    let user = env.services.ledger().get_user("patron").unwrap();
    assert!(user.premium_vip);
    assert_eq!(user.vip_tier, 2);
    assert_eq!(user.balance, 1_500);

    // A lower purchase never downgrades
    let purchase = env
        .services
        .engagement
        .purchase_tier("patron", 1, "purchase-2", TokenAmount::ZERO, now)
        .unwrap();
    assert_eq!(purchase.tier, 2);
}
