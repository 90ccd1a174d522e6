//! Admin and payout handlers. Mounted behind [`super::middleware::require_admin`].

use super::{
    errors::ApiError,
    extract::{ApiJson, ApiQuery},
    handlers::{blocking, AppState},
    middleware::RequestId,
    models::*,
};
use crate::{
    ledger::{BanEntry, WithdrawalStatus, WithdrawalUpdate},
    payout::{BatchOutcome, PayoutStatus},
};
use axum::{extract::State, Extension, Json};
use chrono::Utc;
use std::sync::Arc;
use tracing::info;

type ApiResult<T> = Result<Json<T>, ApiError>;

fn parse_status(request_id: &str, raw: &str) -> Result<WithdrawalStatus, ApiError> {
    WithdrawalStatus::parse(raw)
        .ok_or_else(|| ApiError::bad_request(request_id, format!("Invalid status: {}", raw)))
}

/// GET /api/admin/withdrawals?status={status}&limit={n}
pub async fn list_withdrawals_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<AdminWithdrawalsQuery>,
) -> ApiResult<WithdrawalsResponse> {
    let status = match query.status.as_deref() {
        Some(raw) if raw != "all" => Some(parse_status(&request_id.0, raw)?),
        _ => None,
    };
    let limit = query.limit;
    blocking(&state, move |services| services.ledger().list_withdrawals(status, limit))
        .await
        .map(|list| Json(list.into()))
        .map_err(|e| ApiError::from_error(&request_id.0, "admin_list_withdrawals", None, e))
}

/// PATCH /api/admin/withdrawals
pub async fn update_withdrawal_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<WithdrawalPatchRequest>,
) -> ApiResult<WithdrawalView> {
    let status = match req.status.as_deref() {
        Some(raw) => Some(parse_status(&request_id.0, raw)?),
        None => None,
    };
    let update = WithdrawalUpdate {
        status,
        transaction_hash: req.transaction_hash,
        admin_note: req.admin_note,
    };

    let id = req.id;
    let updated = blocking(&state, move |services| {
        services.ledger().update_withdrawal_status(&id, &update, Utc::now())
    })
    .await
    .map_err(|e| ApiError::from_error(&request_id.0, "admin_update_withdrawal", None, e))?;
    info!(withdrawal_id = %updated.id, status = %updated.status, "withdrawal updated by admin");
    Ok(Json(updated.into()))
}

/// POST /api/admin/withdrawals
/// Applies one status to many requests; each id succeeds or fails on its own.
pub async fn bulk_update_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<BulkWithdrawalRequest>,
) -> ApiResult<BulkWithdrawalResponse> {
    let status = parse_status(&request_id.0, &req.status)?;
    let update = WithdrawalUpdate {
        status: Some(status),
        transaction_hash: None,
        admin_note: req.admin_note,
    };

    let ids = req.ids;
    let results = blocking(&state, move |services| {
        let ledger = services.ledger();
        let now = Utc::now();
        Ok(ids
            .into_iter()
            .map(|id| match ledger.update_withdrawal_status(&id, &update, now) {
                Ok(_) => BulkItemResult {
                    id,
                    success: true,
                    error: None,
                },
                Err(e) => BulkItemResult {
                    id,
                    success: false,
                    error: Some(e.to_string()),
                },
            })
            .collect::<Vec<_>>())
    })
    .await
    .map_err(|e| ApiError::from_error(&request_id.0, "admin_bulk_update", None, e))?;

    let updated = results.iter().filter(|r| r.success).count();
    info!(updated, requested = results.len(), status = %status, "bulk withdrawal update");
    Ok(Json(BulkWithdrawalResponse { updated, results }))
}

/// POST /api/payout/process
pub async fn process_payouts_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<BatchOutcome> {
    state
        .services
        .payouts
        .process_batch(Utc::now())
        .await
        .map(Json)
        .map_err(|e| ApiError::from_error(&request_id.0, "process_payouts", None, e))
}

/// GET /api/payout/process
pub async fn payout_status_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<PayoutStatus> {
    state
        .services
        .payouts
        .payout_status(Utc::now())
        .await
        .map(Json)
        .map_err(|e| ApiError::from_error(&request_id.0, "payout_status", None, e))
}

/// POST /api/admin/conversion-rate
pub async fn update_rate_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<RateUpdateRequest>,
) -> ApiResult<RateResponse> {
    let price = req.token_price_usd;
    let rate = blocking(&state, move |services| services.conversion.update_rate(price, Utc::now()))
        .await
        .map_err(|e| ApiError::from_error(&request_id.0, "update_rate", None, e))?;
    info!(particles_per_step = rate.particles_per_step, price = rate.token_price_usd, "conversion rate updated");
    Ok(Json(rate.into()))
}

/// POST /api/admin/bans
pub async fn ban_wallet_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<BanRequest>,
) -> ApiResult<BanEntry> {
    if req.wallet.trim().is_empty() {
        return Err(ApiError::bad_request(&request_id.0, "wallet is required"));
    }
    blocking(&state, move |services| {
        services.ledger().ban_wallet(&req.wallet, req.reason, Utc::now())
    })
    .await
    .map(Json)
        .map_err(|e| ApiError::from_error(&request_id.0, "ban_wallet", None, e))
}

/// GET /api/admin/bans
pub async fn list_bans_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Vec<BanEntry>> {
    blocking(&state, |services| services.ledger().list_bans())
        .await
        .map(Json)
        .map_err(|e| ApiError::from_error(&request_id.0, "list_bans", None, e))
}
