//! Engagement features: daily missions, survey votes, premium tier purchases,
//! leaderboard and withdrawal history.

use crate::{
    config::{EngagementConfig, MissionMetric, MissionsConfig},
    errors::{VoidError, VoidResult},
    games::types::MAX_VIP_TIER,
    ledger::{
        models::{subject_prefix, WindowState}, Field, FieldChange, FieldValue, LedgerStore, RefKind, TokenAmount,
        User, WithdrawalRequest,
    },
    limits::WindowRule,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr, sync::Arc};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteChoice {
    Yes,
    No,
}

impl fmt::Display for VoteChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            VoteChoice::Yes => "yes",
            VoteChoice::No => "no",
        })
    }
}

impl FromStr for VoteChoice {
    type Err = VoidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "yes" => Ok(VoteChoice::Yes),
            "no" => Ok(VoteChoice::No),
            _ => Err(VoidError::Validation("Vote must be yes or no".to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollTally {
    pub yes: u64,
    pub no: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PollResults {
    pub poll_id: String,
    pub yes_count: u64,
    pub no_count: u64,
    /// Votes cast by the asking user, when one was named
    pub user_votes: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct VoteRecord {
    poll_id: String,
    subject_id: String,
    choice: VoteChoice,
    vote_number: u32,
    cost: TokenAmount,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PurchaseRecord {
    subject_id: String,
    tier: u8,
    amount: TokenAmount,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MissionClaim {
    pub mission_id: String,
    pub reward: u64,
    pub new_balance: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TierPurchase {
    pub tier: u8,
    pub premium_vip: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub name: String,
    pub score: u64,
    pub vip: bool,
}

fn vote_state_key(poll_id: &str, subject: &str) -> Vec<u8> {
    format!("vote:poll:{}:{}", poll_id, subject).into_bytes()
}

fn tally_key(poll_id: &str) -> Vec<u8> {
    format!("vote:tally:{}", poll_id).into_bytes()
}

pub struct EngagementService {
    ledger: Arc<LedgerStore>,
    missions: MissionsConfig,
    config: EngagementConfig,
    vote_rule: WindowRule,
}

impl EngagementService {
    pub fn new(ledger: Arc<LedgerStore>, missions: MissionsConfig, config: EngagementConfig) -> Self {
        let vote_rule = WindowRule {
            feature: "survey_vote",
            window: None,
            max_count: config.max_votes_per_poll,
        };
        Self {
            ledger,
            missions,
            config,
            vote_rule,
        }
    }

    /// Credit a completed daily mission once per UTC day
    pub fn claim_mission(&self, subject: &str, mission_id: &str, now: DateTime<Utc>) -> VoidResult<MissionClaim> {
        let mission = self
            .missions
            .find(mission_id)
            .ok_or_else(|| VoidError::Validation(format!("Unknown mission: {}", mission_id)))?;

        let claim = self.ledger.transaction("claim_mission", |txn| {
            let mut user = txn.lock_user(subject)?;
            user.missions.roll_over(now.date_naive());

            if user.missions.claimed_missions.contains(&mission.id) {
                return Err(VoidError::MissionAlreadyClaimed(mission.id.clone()));
            }
            let progress = match mission.metric {
                MissionMetric::ParticlesCollected => user.missions.daily_particles_collected,
                MissionMetric::Clicks => user.missions.daily_clicks,
                MissionMetric::PassiveParticles => user.missions.daily_passive_particles,
            };
            if progress < mission.target {
                return Err(VoidError::MissionIncomplete {
                    mission: mission.id.clone(),
                    progress,
                    target: mission.target,
                });
            }

            let reward = mission.reward as i128;
            txn.apply_changes(
                &mut user,
                &[
                    (Field::Particles, FieldChange::Increment(reward)),
                    (Field::TotalParticlesCollected, FieldChange::Increment(reward)),
                    (Field::DailyParticlesCollected, FieldChange::Increment(reward)),
                ],
            )?;
            user.missions.claimed_missions.insert(mission.id.clone());
            txn.put_user(&user, now)?;

            Ok(MissionClaim {
                mission_id: mission.id.clone(),
                reward: mission.reward,
                new_balance: user.balance,
            })
        })?;

        info!(subject = %subject_prefix(subject), mission = %mission_id, reward = claim.reward, "mission claimed");
        Ok(claim)
    }

    /// Record one paid survey vote and return the poll's tallies
    pub fn cast_vote(
        &self,
        subject: &str,
        poll_id: &str,
        choice: VoteChoice,
        transaction_ref: &str,
        cost: TokenAmount,
        now: DateTime<Utc>,
    ) -> VoidResult<PollTally> {
        if poll_id.trim().is_empty() {
            return Err(VoidError::Validation("poll_id is required".to_string()));
        }

        let tally = self.ledger.transaction("cast_vote", |txn| {
            txn.claim_reference(RefKind::Vote, transaction_ref)?;
            let user = txn.lock_user(subject)?;

            let state_key = vote_state_key(poll_id, &user.subject_id);
            let state: WindowState = txn.lock_row(&state_key)?.unwrap_or_default();
            if self.vote_rule.check(&state, now).is_err() {
                return Err(VoidError::VoteLimitReached {
                    poll_id: poll_id.to_string(),
                    max: self.vote_rule.max_count,
                });
            }
            let state = self.vote_rule.record(&state, now);
            txn.put_row(&state_key, &state)?;

            let tally_key = tally_key(poll_id);
            let mut tally: PollTally = txn.lock_row(&tally_key)?.unwrap_or_default();
            match choice {
                VoteChoice::Yes => tally.yes += 1,
                VoteChoice::No => tally.no += 1,
            }
            txn.put_row(&tally_key, &tally)?;

            txn.put_reference(
                RefKind::Vote,
                transaction_ref,
                &VoteRecord {
                    poll_id: poll_id.to_string(),
                    subject_id: user.subject_id.clone(),
                    choice,
                    vote_number: state.count,
                    cost,
                    created_at: now,
                },
            )?;
            Ok(tally)
        })?;

        info!(subject = %subject_prefix(subject), poll = %poll_id, choice = %choice, "vote recorded");
        Ok(tally)
    }

    pub fn poll_results(&self, poll_id: &str, subject: Option<&str>) -> VoidResult<PollResults> {
        let tally: PollTally = self.ledger.get_json(&tally_key(poll_id))?.unwrap_or_default();
        let user_votes = match subject {
            Some(subject) => self
                .ledger
                .get_json::<WindowState>(&vote_state_key(poll_id, subject))?
                .map(|state| state.count)
                .unwrap_or(0),
            None => 0,
        };
        Ok(PollResults {
            poll_id: poll_id.to_string(),
            yes_count: tally.yes,
            no_count: tally.no,
            user_votes,
        })
    }

    /// Grant a purchased premium tier. The stored tier never goes down.
    pub fn purchase_tier(
        &self,
        subject: &str,
        tier: u8,
        transaction_ref: &str,
        amount: TokenAmount,
        now: DateTime<Utc>,
    ) -> VoidResult<TierPurchase> {
        if tier == 0 || tier > MAX_VIP_TIER {
            return Err(VoidError::Validation("Invalid tier".to_string()));
        }

        let purchase = self.ledger.transaction("purchase_tier", |txn| {
            txn.claim_reference(RefKind::Purchase, transaction_ref)?;
            let mut user = txn.lock_user(subject)?;

            let target = user.vip_tier.max(tier);
            let mut changes = vec![(Field::VipTier, FieldChange::Replace(FieldValue::Number(target as u64)))];
            for flag in [
                Field::PremiumVip,
                Field::PremiumLuckyParticle,
                Field::PremiumOfflineEarnings,
                Field::PremiumDailyBonus,
            ] {
                changes.push((flag, FieldChange::Replace(FieldValue::Flag(true))));
            }
            changes.push((
                Field::UnlockedSkins,
                FieldChange::Replace(FieldValue::List(merged(&user.progress.unlocked_skins, &self.config.vip_skins))),
            ));
            changes.push((
                Field::UnlockedThemes,
                FieldChange::Replace(FieldValue::List(merged(&user.progress.unlocked_themes, &self.config.vip_themes))),
            ));
            txn.apply_changes(&mut user, &changes)?;

            txn.put_reference(
                RefKind::Purchase,
                transaction_ref,
                &PurchaseRecord {
                    subject_id: user.subject_id.clone(),
                    tier,
                    amount,
                    created_at: now,
                },
            )?;
            txn.put_user(&user, now)?;

            Ok(TierPurchase {
                tier: user.vip_tier,
                premium_vip: user.premium_vip,
            })
        })?;

        info!(subject = %subject_prefix(subject), tier, amount = %amount, "tier purchased");
        Ok(purchase)
    }

    pub fn leaderboard(&self) -> VoidResult<Vec<LeaderboardEntry>> {
        let users = self.ledger.top_users(self.config.leaderboard_size)?;
        Ok(users
            .iter()
            .enumerate()
            .map(|(idx, user)| LeaderboardEntry {
                rank: idx + 1,
                name: user.display_name(),
                score: user.total_collected,
                vip: user.vip_tier > 0,
            })
            .collect())
    }

    pub fn withdrawal_history(&self, subject: &str) -> VoidResult<Vec<WithdrawalRequest>> {
        let user: User = self.ledger.get_user(subject)?;
        self.ledger
            .withdrawals_for_user(&user.id, self.config.withdrawal_history_limit)
    }
}

/// `existing` followed by any of `extra` not already present
fn merged(existing: &[String], extra: &[String]) -> Vec<String> {
    let mut out = existing.to_vec();
    for item in extra {
        if !out.contains(item) {
            out.push(item.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    fn service() -> (TempDir, Arc<LedgerStore>, EngagementService) {
        let dir = TempDir::new().unwrap();
        let ledger = Arc::new(LedgerStore::open(dir.path(), 9_000_000_000_000_000_000).unwrap());
        let svc = EngagementService::new(ledger.clone(), MissionsConfig::default(), EngagementConfig::default());
        (dir, ledger, svc)
    }

    #[test]
    fn test_mission_claim_rules() {
        let (_dir, ledger, svc) = service();
        let now = Utc::now();
        ledger.upsert_by_subject("subj", "0xabc", now).unwrap();

        let err = svc.claim_mission("subj", "daily_click_500", now).unwrap_err();
        assert!(matches!(err, VoidError::MissionIncomplete { progress: 0, target: 500, .. }));

        ledger
            .transaction("seed", |txn| {
                let mut user = txn.lock_user("subj")?;
                user.missions.roll_over(now.date_naive());
                user.missions.daily_clicks = 600;
                txn.put_user(&user, now)
            })
            .unwrap();

        let claim = svc.claim_mission("subj", "daily_click_500", now).unwrap();
        assert_eq!(claim.reward, 1_000);
        assert_eq!(claim.new_balance, 1_000);

        let err = svc.claim_mission("subj", "daily_click_500", now).unwrap_err();
        assert!(matches!(err, VoidError::MissionAlreadyClaimed(_)));

        // New day resets progress and the claimed set
        let err = svc
            .claim_mission("subj", "daily_click_500", now + Duration::days(1))
            .unwrap_err();
        assert!(matches!(err, VoidError::MissionIncomplete { .. }));

        assert!(matches!(
            svc.claim_mission("subj", "nope", now),
            Err(VoidError::Validation(_))
        ));
    }

    #[test]
    fn test_vote_cap_and_idempotency() {
        let (_dir, ledger, svc) = service();
        let now = Utc::now();
        ledger.upsert_by_subject("subj", "0xabc", now).unwrap();
        let cost = TokenAmount::from_micro(10_000);

        for i in 0..10 {
            let choice = if i % 2 == 0 { VoteChoice::Yes } else { VoteChoice::No };
            svc.cast_vote("subj", "poll_001", choice, &format!("ref-{}", i), cost, now)
                .unwrap();
        }

        let err = svc
            .cast_vote("subj", "poll_001", VoteChoice::Yes, "ref-0", cost, now)
            .unwrap_err();
        assert!(matches!(err, VoidError::DuplicateTransaction(_)));

        let err = svc
            .cast_vote("subj", "poll_001", VoteChoice::Yes, "ref-10", cost, now)
            .unwrap_err();
        assert!(matches!(err, VoidError::VoteLimitReached { max: 10, .. }));

        let results = svc.poll_results("poll_001", Some("subj")).unwrap();
        assert_eq!((results.yes_count, results.no_count, results.user_votes), (5, 5, 10));

        // Other polls have their own cap
        assert!(svc
            .cast_vote("subj", "poll_002", VoteChoice::No, "ref-10", cost, now)
            .is_ok());
    }

    #[test]
    fn test_purchase_never_downgrades() {
        let (_dir, ledger, svc) = service();
        let now = Utc::now();
        ledger.upsert_by_subject("subj", "0xabc", now).unwrap();

        let first = svc.purchase_tier("subj", 3, "p-1", TokenAmount::from_micro(1), now).unwrap();
        assert_eq!(first.tier, 3);
        let second = svc.purchase_tier("subj", 1, "p-2", TokenAmount::from_micro(1), now).unwrap();
        assert_eq!(second.tier, 3);

        let user = ledger.get_user("subj").unwrap();
        assert!(user.premium_vip && user.progress.premium_lucky_particle);
        assert_eq!(user.progress.unlocked_themes, vec!["default", "nebula", "galaxy"]);

        assert!(matches!(
            svc.purchase_tier("subj", 2, "p-1", TokenAmount::from_micro(1), now),
            Err(VoidError::DuplicateTransaction(_))
        ));
        assert!(matches!(
            svc.purchase_tier("subj", 5, "p-3", TokenAmount::from_micro(1), now),
            Err(VoidError::Validation(_))
        ));
    }

    #[test]
    fn test_leaderboard_order() {
        let (_dir, ledger, svc) = service();
        let now = Utc::now();
        for (subject, total) in [("0xaaaa1", 10u64), ("0xbbbb2", 30), ("0xcccc3", 20)] {
            ledger.upsert_by_subject(subject, "", now).unwrap();
            ledger
                .apply_delta(
                    subject,
                    &[(Field::TotalParticlesCollected, FieldChange::Increment(total as i128))],
                    now,
                )
                .unwrap();
        }

        let board = svc.leaderboard().unwrap();
        let scores: Vec<u64> = board.iter().map(|e| e.score).collect();
        assert_eq!(scores, vec![30, 20, 10]);
        assert_eq!(board[0].name, "User BBBB");
        assert_eq!(board[0].rank, 1);
    }
}
