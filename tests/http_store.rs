mod common;

use axum::Router;
use common::{active_route, walk};
use trilhos_rs::error::StoreError;
use trilhos_rs::store::http::HttpRouteStore;
use trilhos_rs::store::RouteStore;
use trilhos_rs::types::route::{RouteStatus, RouteUpdate};
use trilhos_rs::{config::Config, routes, state::AppState};
use uuid::Uuid;

const SECRET: &str = "http-store-secret";

async fn serve() -> (String, AppState) {
    let state = AppState::new(Config {
        jwt_secret: SECRET.to_string(),
        ..Config::default()
    });
    let app = Router::new()
        .merge(routes::tracking::router())
        .merge(routes::history::router())
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    (format!("http://{}", addr), state)
}

#[tokio::test]
async fn round_trips_a_route_through_the_api() {
    let (base_url, state) = serve().await;
    let user = Uuid::new_v4();
    let token = state.session_token(user).expect("token");
    let store = HttpRouteStore::new(&base_url, Some(token));

    let id = store
        .insert(active_route(None, "Harbour", walk(2, 0, 30_000)))
        .await
        .expect("insert");

    let active = store
        .find_active_for_user(Some(user))
        .await
        .expect("active")
        .expect("route");
    assert_eq!(active.id, id);
    assert_eq!(active.user_id, Some(user));
    assert_eq!(active.duration, 30_000);

    let updated = store
        .update(id, Some(user), RouteUpdate::points(walk(4, 0, 30_000)))
        .await
        .expect("update");
    assert_eq!(updated.points.len(), 4);
    assert_eq!(updated.duration, 90_000);

    store
        .update(id, Some(user), RouteUpdate::complete("Harbour loop".to_string(), walk(4, 0, 30_000)))
        .await
        .expect("complete");
    let history = store.find_completed_for_user(user).await.expect("history");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].name, "Harbour loop");
    assert_eq!(history[0].status, RouteStatus::Completed);
    assert_eq!(store.find_all_completed().await.expect("activity").len(), 1);

    store.delete(id, Some(user)).await.expect("delete");
    assert!(store.find_by_id(id).await.expect("find").is_none());
}

#[tokio::test]
async fn missing_route_maps_to_not_found() {
    let (base_url, _state) = serve().await;
    let store = HttpRouteStore::new(base_url, None);

    let err = store
        .update(404, None, RouteUpdate::abandon())
        .await
        .expect_err("missing");
    assert!(matches!(err, StoreError::NotFound(404)));
    assert!(matches!(store.delete(404, None).await, Err(StoreError::NotFound(404))));
    assert!(store.find_active_for_user(None).await.expect("active").is_none());
}

#[tokio::test]
async fn history_without_session_is_rejected() {
    let (base_url, _state) = serve().await;
    let store = HttpRouteStore::new(base_url, None);

    let err = store
        .find_completed_for_user(Uuid::new_v4())
        .await
        .expect_err("unauthorized");
    assert!(matches!(err, StoreError::Rejected { status: 401, .. }));
}

#[tokio::test]
async fn unreachable_server_is_unavailable() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let store = HttpRouteStore::new(format!("http://{}", addr), None);
    let err = store
        .insert(active_route(None, "Nowhere", walk(1, 0, 1_000)))
        .await
        .expect_err("offline");
    assert!(matches!(err, StoreError::Unavailable(_)));
}
