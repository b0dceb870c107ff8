use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::get;
use axum::{Json, Router};

use crate::auth::AuthService;
use crate::error::AppError;
use crate::state::AppState;
use crate::store::RouteStore;
use crate::types::route::Route;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/history", get(history))
        .route("/api/activity", get(activity))
}

/// Completed routes of the signed-in user, newest first.
async fn history(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Route>>, AppError> {
    let user = state
        .session(&headers)?
        .current_user_id()
        .ok_or_else(|| AppError::Unauthorized("Sign in to see your route history".to_string()))?;

    Ok(Json(state.routes.find_completed_for_user(user).await?))
}

/// Completed routes of everyone, newest first.
async fn activity(State(state): State<AppState>) -> Result<Json<Vec<Route>>, AppError> {
    Ok(Json(state.routes.find_all_completed().await?))
}
