//! Conversion limits end to end against a real RocksDB ledger

mod common;

use chrono::{Duration, Utc};
use common::{economy, env, env_with, seed_user, wallet};
use futures::future::join_all;
use void_collector::{
    config::PayoutConfig,
    ledger::{DailyConversionStats, TokenAmount, WithdrawalStatus},
    limits::{DenialReason, LimitScope},
    VoidError,
};

fn denial_reason(err: VoidError) -> (DenialReason, LimitScope) {
    match err {
        VoidError::Denied(denial) => (denial.reason, denial.scope),
        other => panic!("expected a limit denial, got {:?}", other),
    }
}

#[test]
fn test_first_conversion_debits_and_second_hits_cooldown() {
    let env = env();
    seed_user(&env, "subject-a", &wallet(1), 150_000);
    let now = Utc::now();

    let receipt = env.services.conversion.convert("subject-a", 0.01, now).unwrap();
    assert_eq!(receipt.status, WithdrawalStatus::Pending);
    assert_eq!(receipt.resource_spent, 75_000);
    assert_eq!(receipt.new_balance, 75_000);
    assert_eq!(receipt.new_total, TokenAmount::from_micro(10_000));
    assert_eq!(receipt.remaining, TokenAmount::from_micro(100_000_000 - 10_000));

    let user = env.services.ledger().get_user("subject-a").unwrap();
    assert_eq!(user.balance, 75_000);

    let err = env
        .services
        .conversion
        .convert("subject-a", 0.01, now + Duration::seconds(1))
        .unwrap_err();
    assert_eq!(denial_reason(err), (DenialReason::PersonalCooldown, LimitScope::User));

    // Nothing moved on the denied call
    assert_eq!(env.services.ledger().get_user("subject-a").unwrap().balance, 75_000);
    assert_eq!(env.services.conversion.daily_stats(now).unwrap().conversions_today, 1);
}

#[test]
fn test_cooldown_expires_after_window() {
    let env = env();
    seed_user(&env, "subject-a", &wallet(1), 1_000_000);
    let now = Utc::now();

    env.services.conversion.convert("subject-a", 0.01, now).unwrap();
    let later = now + Duration::hours(24) + Duration::seconds(1);
    assert!(env.services.conversion.convert("subject-a", 0.01, later).is_ok());
}

#[test]
fn test_request_that_crosses_cap_is_admitted_then_pool_closes() {
    let env = env();
    seed_user(&env, "subject-a", &wallet(1), 1_000_000);
    seed_user(&env, "subject-b", &wallet(2), 1_000_000);
    let now = Utc::now();
    let today = now.date_naive();

    env.services
        .ledger()
        .transaction("seed_stats", |txn| {
            txn.put_daily_stats(&DailyConversionStats {
                date: today,
                total_token_claimed: TokenAmount::from_micro(99_995_000),
                conversion_count: 500,
                limit_reached_at: None,
            })
        })
        .unwrap();

    let receipt = env.services.conversion.convert("subject-a", 0.01, now).unwrap();
    assert_eq!(receipt.new_total, TokenAmount::from_micro(100_005_000));

    let stats = env.services.ledger().daily_stats(today).unwrap();
    assert!(stats.limit_reached_at.is_some());

    let err = env.services.conversion.convert("subject-b", 0.01, now).unwrap_err();
    assert_eq!(denial_reason(err), (DenialReason::DailyLimitReached, LimitScope::Global));

    let view = env.services.conversion.daily_stats(now).unwrap();
    assert!(view.limit_reached);
    assert_eq!(view.remaining, TokenAmount::ZERO);
}

#[test]
fn test_global_cooldown_carries_into_next_day() {
    let env = env();
    seed_user(&env, "subject-a", &wallet(1), 1_000_000);
    let now = Utc::now();
    let yesterday = (now - Duration::days(1)).date_naive();

    env.services
        .ledger()
        .transaction("seed_stats", |txn| {
            txn.put_daily_stats(&DailyConversionStats {
                date: yesterday,
                total_token_claimed: TokenAmount::from_micro(100_000_000),
                conversion_count: 9_000,
                limit_reached_at: Some(now - Duration::hours(2)),
            })
        })
        .unwrap();

    let err = env.services.conversion.convert("subject-a", 0.01, now).unwrap_err();
    assert_eq!(denial_reason(err), (DenialReason::GlobalCooldownActive, LimitScope::Global));
}

#[test]
fn test_per_user_cap_and_insufficient_balance() {
    let env = env();
    seed_user(&env, "rich", &wallet(1), 10_000_000);
    seed_user(&env, "poor", &wallet(2), 10);
    let now = Utc::now();

    let err = env.services.conversion.convert("rich", 0.06, now).unwrap_err();
    assert_eq!(denial_reason(err), (DenialReason::DailyLimitReached, LimitScope::User));

    let err = env.services.conversion.convert("poor", 0.01, now).unwrap_err();
    assert_eq!(denial_reason(err), (DenialReason::InsufficientBalance, LimitScope::User));
    assert_eq!(env.services.ledger().get_user("poor").unwrap().balance, 10);
}

#[test]
fn test_banned_wallet_and_bad_input() {
    let env = env();
    seed_user(&env, "banned", &wallet(0xabc), 1_000_000);
    env.services
        .ledger()
        .ban_wallet(&wallet(0xabc).to_uppercase(), None, Utc::now())
        .unwrap();

    assert!(matches!(
        env.services.conversion.convert("banned", 0.01, Utc::now()),
        Err(VoidError::AccountSuspended)
    ));
    assert!(matches!(
        env.services.conversion.convert("banned", -1.0, Utc::now()),
        Err(VoidError::Validation(_))
    ));
    assert!(matches!(
        env.services.conversion.convert("nobody", 0.01, Utc::now()),
        Err(VoidError::NotFound(_))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_conversions_respect_global_cap() {
    let mut economy = economy(75_000);
    economy.global_daily_cap_tokens = 0.05;
    let env = env_with(economy, PayoutConfig::default());

    let subjects: Vec<String> = (0..12).map(|i| format!("racer-{}", i)).collect();
    for (i, subject) in subjects.iter().enumerate() {
        seed_user(&env, subject, &wallet(100 + i as u32), 1_000_000);
    }

    let now = Utc::now();
    let tasks = subjects.iter().cloned().map(|subject| {
        let services = env.services.clone();
        tokio::task::spawn_blocking(move || services.conversion.convert(&subject, 0.01, now))
    });
    let results = join_all(tasks).await;

    let successes = results
        .into_iter()
        .map(|joined| joined.unwrap())
        .filter(|r| r.is_ok())
        .count();
    assert_eq!(successes, 5);

    let stats = env.services.ledger().daily_stats(now.date_naive()).unwrap();
    assert_eq!(stats.total_token_claimed, TokenAmount::from_micro(50_000));
    assert_eq!(stats.conversion_count, 5);
    assert_eq!(env.services.ledger().count_pending().unwrap(), 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_from_one_user_convert_once() {
    let env = env();
    seed_user(&env, "spammer", &wallet(9), 1_000_000);
    let now = Utc::now();

    let tasks = (0..8).map(|_| {
        let services = env.services.clone();
        tokio::task::spawn_blocking(move || services.conversion.convert("spammer", 0.01, now))
    });
    let successes = join_all(tasks)
        .await
        .into_iter()
        .filter(|joined| matches!(joined, Ok(Ok(_))))
        .count();

    assert_eq!(successes, 1);
    assert_eq!(env.services.ledger().get_user("spammer").unwrap().balance, 1_000_000 - 75_000);
}
