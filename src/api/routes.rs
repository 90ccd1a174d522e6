//! Route Definitions
//!
//! Player routes and guarded admin routes under `/api`, plus `/health` and `/metrics`.

use super::{admin::*, handlers::*, middleware::require_admin};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Build the API router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    let admin = Router::new()
        .route(
            "/admin/withdrawals",
            get(list_withdrawals_handler)
                .post(bulk_update_handler)
                .patch(update_withdrawal_handler),
        )
        .route("/admin/conversion-rate", post(update_rate_handler))
        .route("/admin/bans", get(list_bans_handler).post(ban_wallet_handler))
        .route("/payout/process", get(payout_status_handler).post(process_payouts_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    let player = Router::new()
        .route("/verify", post(verify_handler))
        .route("/game-state", get(get_game_state_handler).post(sync_game_state_handler))
        .route("/convert", post(convert_handler))
        .route("/daily-stats", get(daily_stats_handler))
        .route("/conversion-rate", get(conversion_rate_handler))
        .route("/minigames/spin", post(spin_handler))
        .route("/user/withdrawals", get(user_withdrawals_handler))
        .route("/missions/claim", post(claim_mission_handler))
        .route("/survey/vote", post(vote_handler))
        .route("/survey/poll", get(poll_handler))
        .route("/purchase-tier", post(purchase_tier_handler))
        .route("/leaderboard", get(leaderboard_handler));

    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .nest("/api", player.merge(admin))
        .with_state(state)
}
