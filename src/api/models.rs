//! API Request and Response Models

use crate::{
    conversion::{ConversionReceipt, DailyStatsView},
    games::types::SpinVariant,
    ledger::{ConversionRate, User, WithdrawalRequest, WithdrawalStatus},
    sanitizer::Adjustment,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubjectQuery {
    pub subject: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyRequest {
    pub subject_id: String,
    #[serde(default)]
    pub wallet_address: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyResponse {
    pub success: bool,
    pub user: User,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncSavedResponse {
    pub saved: bool,
    pub user: User,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub adjustments: Vec<Adjustment>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncRejectedResponse {
    pub saved: bool,
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConvertRequest {
    pub subject_id: String,
    pub token_amount: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConvertResponse {
    pub success: bool,
    pub status: WithdrawalStatus,
    pub withdrawal_id: String,
    pub token_amount: f64,
    pub particles_spent: u64,
    pub new_balance: u64,
    /// Global total claimed today after this conversion
    pub new_total: f64,
    /// Global budget left today
    pub remaining: f64,
}

impl From<ConversionReceipt> for ConvertResponse {
    fn from(receipt: ConversionReceipt) -> Self {
        Self {
            success: true,
            status: receipt.status,
            withdrawal_id: receipt.withdrawal_id,
            token_amount: receipt.token_amount.as_decimal(),
            particles_spent: receipt.resource_spent,
            new_balance: receipt.new_balance,
            new_total: receipt.new_total.as_decimal(),
            remaining: receipt.remaining.as_decimal(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyStatsResponse {
    pub total_claimed: f64,
    pub max_daily: f64,
    pub remaining: f64,
    pub conversions_today: u64,
    pub limit_reached: bool,
}

impl From<DailyStatsView> for DailyStatsResponse {
    fn from(view: DailyStatsView) -> Self {
        Self {
            total_claimed: view.total_claimed.as_decimal(),
            max_daily: view.max_daily.as_decimal(),
            remaining: view.remaining.as_decimal(),
            conversions_today: view.conversions_today,
            limit_reached: view.limit_reached,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RateResponse {
    pub particles_per_step: u64,
    pub token_price_usd: f64,
    pub base_rate: u64,
    pub target_price: f64,
    pub last_update: DateTime<Utc>,
}

impl From<ConversionRate> for RateResponse {
    fn from(rate: ConversionRate) -> Self {
        Self {
            particles_per_step: rate.particles_per_step,
            token_price_usd: rate.token_price_usd,
            base_rate: rate.base_rate,
            target_price: rate.target_price,
            last_update: rate.last_update,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpinRequest {
    pub subject_id: String,
    pub transaction_ref: String,
    pub variant: SpinVariant,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MissionClaimRequest {
    pub subject_id: String,
    pub mission_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VoteRequest {
    pub subject_id: String,
    pub poll_id: String,
    pub vote: String,
    pub transaction_ref: String,
    #[serde(default)]
    pub vote_cost: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VoteResponse {
    pub success: bool,
    pub yes_count: u64,
    pub no_count: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollQuery {
    #[serde(default = "default_poll")]
    pub poll_id: String,
    #[serde(default)]
    pub subject: Option<String>,
}

fn default_poll() -> String {
    "poll_001".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct PurchaseTierRequest {
    pub subject_id: String,
    pub tier: u8,
    pub transaction_ref: String,
    #[serde(default)]
    pub amount: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WithdrawalView {
    pub id: String,
    pub wallet_address: String,
    pub token_amount: f64,
    pub particles_spent: u64,
    pub status: WithdrawalStatus,
    pub transaction_hash: Option<String>,
    pub admin_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl From<WithdrawalRequest> for WithdrawalView {
    fn from(request: WithdrawalRequest) -> Self {
        Self {
            id: request.id,
            wallet_address: request.wallet_address,
            token_amount: request.token_amount.as_decimal(),
            particles_spent: request.resource_spent,
            status: request.status,
            transaction_hash: request.transaction_hash,
            admin_note: request.admin_note,
            created_at: request.created_at,
            processed_at: request.processed_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WithdrawalsResponse {
    pub withdrawals: Vec<WithdrawalView>,
}

impl From<Vec<WithdrawalRequest>> for WithdrawalsResponse {
    fn from(requests: Vec<WithdrawalRequest>) -> Self {
        Self {
            withdrawals: requests.into_iter().map(WithdrawalView::from).collect(),
        }
    }
}

// Admin

#[derive(Debug, Clone, Deserialize)]
pub struct AdminWithdrawalsQuery {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default = "default_admin_limit")]
    pub limit: usize,
}

fn default_admin_limit() -> usize {
    100
}

#[derive(Debug, Clone, Deserialize)]
pub struct WithdrawalPatchRequest {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub transaction_hash: Option<String>,
    #[serde(default)]
    pub admin_note: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BulkWithdrawalRequest {
    pub ids: Vec<String>,
    pub status: String,
    #[serde(default)]
    pub admin_note: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkItemResult {
    pub id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkWithdrawalResponse {
    pub updated: usize,
    pub results: Vec<BulkItemResult>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateUpdateRequest {
    pub token_price_usd: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BanRequest {
    pub wallet: String,
    #[serde(default)]
    pub reason: Option<String>,
}
