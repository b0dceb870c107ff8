use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;

use crate::auth::AuthService;
use crate::error::{AppError, StoreError};
use crate::state::AppState;
use crate::store::http::CreatedRoute;
use crate::store::RouteStore;
use crate::tracking::stats::RouteStats;
use crate::types::route::{NewRoute, Route, RouteUpdate};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/routes", post(create_route))
        .route(
            "/api/routes/:id",
            get(route_detail).patch(update_route).delete(delete_route),
        )
        .route("/api/active-route", get(active_route))
}

#[derive(Serialize)]
struct RouteDetail {
    #[serde(flatten)]
    route: Route,
    is_owner: bool,
    average_speed_kmh: f64,
    distance_label: String,
    duration_label: String,
}

async fn create_route(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(mut route): Json<NewRoute>,
) -> Result<(StatusCode, Json<CreatedRoute>), AppError> {
    let auth = state.session(&headers)?;
    route.user_id = auth.current_user_id();

    let id = state.routes.insert(route).await?;
    tracing::info!("Route {} created", id);

    Ok((StatusCode::CREATED, Json(CreatedRoute { id })))
}

async fn route_detail(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<RouteDetail>, AppError> {
    let auth = state.session(&headers)?;
    let route = state
        .routes
        .find_by_id(id)
        .await?
        .ok_or(StoreError::NotFound(id))?;

    let stats = RouteStats::from_points(&route.points);
    let is_owner = route.user_id.is_some() && route.user_id == auth.current_user_id();

    Ok(Json(RouteDetail {
        is_owner,
        average_speed_kmh: stats.average_speed_kmh(),
        distance_label: stats.distance_label(),
        duration_label: stats.duration_label(),
        route,
    }))
}

async fn update_route(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(update): Json<RouteUpdate>,
) -> Result<Json<Route>, AppError> {
    let auth = state.session(&headers)?;
    let route = state
        .routes
        .update(id, auth.current_user_id(), update)
        .await?;
    tracing::debug!(
        "Route {} updated ({:?}, {} points)",
        id,
        route.status,
        route.points.len()
    );
    Ok(Json(route))
}

async fn delete_route(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    let auth = state.session(&headers)?;
    state.routes.delete(id, auth.current_user_id()).await?;
    tracing::info!("Route {} deleted", id);
    Ok(StatusCode::NO_CONTENT)
}

async fn active_route(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Option<Route>>, AppError> {
    let auth = state.session(&headers)?;
    let route = state.routes.find_active_for_user(auth.current_user_id()).await?;
    Ok(Json(route))
}
