//! Request Handlers
//!
//! Player-facing endpoints. Every handler reads the request id from the extension set
//! by [`super::middleware::request_id_middleware`] and maps service errors through
//! [`ApiError::from_error`]. Service calls hit RocksDB and run on the blocking pool.

use super::{
    errors::ApiError,
    extract::{ApiJson, ApiQuery},
    middleware::RequestId,
    models::*,
};
use crate::{
    engagement::{LeaderboardEntry, MissionClaim, PollResults, TierPurchase, VoteChoice},
    errors::VoidResult,
    games::spin::SpinOutcome,
    ledger::{TokenAmount, User},
    sanitizer::SyncOutcome,
    services::ServiceContainer,
    storage::run_blocking,
};
use axum::{
    extract::State,
    http::{header::CONTENT_TYPE, HeaderValue},
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::Utc;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

/// Shared application state
pub struct AppState {
    pub services: Arc<ServiceContainer>,
    /// `None` disables the admin routes
    pub admin_secret_digest: Option<[u8; 32]>,
    pub version: String,
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Run a service call off the async workers
pub(super) async fn blocking<T, F>(state: &AppState, op: F) -> VoidResult<T>
where
    T: Send + 'static,
    F: FnOnce(&ServiceContainer) -> VoidResult<T> + Send + 'static,
{
    let services = state.services.clone();
    run_blocking(move || op(&services)).await
}

/// Health check handler
/// GET /health
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "Running".to_string(),
        version: state.version.clone(),
    })
}

/// Prometheus text exposition
/// GET /metrics
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    if let Ok(pending) = blocking(&state, |services| services.ledger().count_pending()).await {
        state.services.metrics().set_pending_withdrawals(pending);
    }
    let mut response = state.services.metrics().render().into_response();
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; version=0.0.4"),
    );
    response
}

/// POST /api/verify
pub async fn verify_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<VerifyRequest>,
) -> ApiResult<VerifyResponse> {
    let subject = req.subject_id.clone();
    let user = blocking(&state, move |services| {
        let wallet = req.wallet_address.as_deref().unwrap_or("");
        services.ledger().upsert_by_subject(&req.subject_id, wallet, Utc::now())
    })
    .await
    .map_err(|e| ApiError::from_error(&request_id.0, "verify", Some(&subject), e))?;
    Ok(Json(VerifyResponse { success: true, user }))
}

/// GET /api/game-state?subject={subject}
pub async fn get_game_state_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<SubjectQuery>,
) -> ApiResult<User> {
    let subject = query.subject.clone();
    blocking(&state, move |services| services.ledger().get_user(&query.subject))
        .await
        .map(Json)
        .map_err(|e| ApiError::from_error(&request_id.0, "get_game_state", Some(&subject), e))
}

/// POST /api/game-state
/// Regressions come back as `200 {saved:false, reason}` so the client can re-pull.
pub async fn sync_game_state_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    ApiJson(mut payload): ApiJson<Map<String, Value>>,
) -> Result<Response, ApiError> {
    let subject = match payload.remove("subject_id") {
        Some(Value::String(s)) if !s.is_empty() => s,
        _ => return Err(ApiError::bad_request(&request_id.0, "subject_id is required")),
    };

    let sync_subject = subject.clone();
    let outcome = blocking(&state, move |services| {
        services.sync.apply_sync(&sync_subject, &payload, Utc::now())
    })
    .await
    .map_err(|e| ApiError::from_error(&request_id.0, "sync", Some(&subject), e))?;

    Ok(match outcome {
        SyncOutcome::Saved { user, adjustments } => {
            debug!(adjustments = adjustments.len(), "sync saved");
            Json(SyncSavedResponse {
                saved: true,
                user,
                adjustments,
            })
            .into_response()
        }
        SyncOutcome::Rejected(rejection) => Json(SyncRejectedResponse {
            saved: false,
            reason: rejection.code().to_string(),
        })
        .into_response(),
    })
}

/// POST /api/convert
pub async fn convert_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<ConvertRequest>,
) -> ApiResult<ConvertResponse> {
    let subject = req.subject_id.clone();
    blocking(&state, move |services| {
        services.conversion.convert(&req.subject_id, req.token_amount, Utc::now())
    })
    .await
    .map(|receipt| Json(receipt.into()))
    .map_err(|e| ApiError::from_error(&request_id.0, "convert", Some(&subject), e))
}

/// GET /api/daily-stats
pub async fn daily_stats_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<DailyStatsResponse> {
    blocking(&state, |services| services.conversion.daily_stats(Utc::now()))
        .await
        .map(|view| Json(view.into()))
        .map_err(|e| ApiError::from_error(&request_id.0, "daily_stats", None, e))
}

/// GET /api/conversion-rate
pub async fn conversion_rate_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<RateResponse> {
    blocking(&state, |services| services.conversion.current_rate(Utc::now()))
        .await
        .map(|rate| Json(rate.into()))
        .map_err(|e| ApiError::from_error(&request_id.0, "conversion_rate", None, e))
}

/// POST /api/minigames/spin
pub async fn spin_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<SpinRequest>,
) -> ApiResult<SpinOutcome> {
    let subject = req.subject_id.clone();
    blocking(&state, move |services| {
        services
            .spins
            .resolve_spin(&req.subject_id, &req.transaction_ref, req.variant, Utc::now())
    })
    .await
    .map(Json)
    .map_err(|e| ApiError::from_error(&request_id.0, "spin", Some(&subject), e))
}

/// GET /api/user/withdrawals?subject={subject}
pub async fn user_withdrawals_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<SubjectQuery>,
) -> ApiResult<WithdrawalsResponse> {
    let subject = query.subject.clone();
    blocking(&state, move |services| services.engagement.withdrawal_history(&query.subject))
        .await
        .map(|list| Json(list.into()))
        .map_err(|e| ApiError::from_error(&request_id.0, "withdrawal_history", Some(&subject), e))
}

/// POST /api/missions/claim
pub async fn claim_mission_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<MissionClaimRequest>,
) -> ApiResult<MissionClaim> {
    let subject = req.subject_id.clone();
    blocking(&state, move |services| {
        services
            .engagement
            .claim_mission(&req.subject_id, &req.mission_id, Utc::now())
    })
    .await
    .map(Json)
    .map_err(|e| ApiError::from_error(&request_id.0, "claim_mission", Some(&subject), e))
}

/// POST /api/survey/vote
pub async fn vote_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<VoteRequest>,
) -> ApiResult<VoteResponse> {
    let subject = req.subject_id.clone();
    let fail = |e| ApiError::from_error(&request_id.0, "vote", Some(&subject), e);
    let choice: VoteChoice = req.vote.parse().map_err(fail)?;
    let cost = req
        .vote_cost
        .and_then(TokenAmount::from_decimal)
        .unwrap_or(TokenAmount::ZERO);

    let tally = blocking(&state, move |services| {
        services.engagement.cast_vote(
            &req.subject_id,
            &req.poll_id,
            choice,
            &req.transaction_ref,
            cost,
            Utc::now(),
        )
    })
    .await
    .map_err(fail)?;
    Ok(Json(VoteResponse {
        success: true,
        yes_count: tally.yes,
        no_count: tally.no,
    }))
}

/// GET /api/survey/poll?poll_id={id}&subject={subject}
pub async fn poll_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<PollQuery>,
) -> ApiResult<PollResults> {
    let subject = query.subject.clone();
    blocking(&state, move |services| {
        services
            .engagement
            .poll_results(&query.poll_id, query.subject.as_deref())
    })
    .await
    .map(Json)
    .map_err(|e| ApiError::from_error(&request_id.0, "poll", subject.as_deref(), e))
}

/// POST /api/purchase-tier
pub async fn purchase_tier_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<PurchaseTierRequest>,
) -> ApiResult<TierPurchase> {
    let subject = req.subject_id.clone();
    let amount = req
        .amount
        .and_then(TokenAmount::from_decimal)
        .unwrap_or(TokenAmount::ZERO);
    blocking(&state, move |services| {
        services
            .engagement
            .purchase_tier(&req.subject_id, req.tier, &req.transaction_ref, amount, Utc::now())
    })
    .await
    .map(Json)
    .map_err(|e| ApiError::from_error(&request_id.0, "purchase_tier", Some(&subject), e))
}

/// GET /api/leaderboard
pub async fn leaderboard_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Vec<LeaderboardEntry>> {
    blocking(&state, |services| services.engagement.leaderboard())
        .await
        .map(Json)
        .map_err(|e| ApiError::from_error(&request_id.0, "leaderboard", None, e))
}
