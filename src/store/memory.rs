use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::StoreError;
use crate::store::RouteStore;
use crate::types::route::{normalize_name, NewRoute, Route, RouteMetrics, RouteStatus, RouteUpdate};

/// Process-local route table. Clones share the same table.
#[derive(Clone, Default)]
pub struct MemoryRouteStore {
    routes: Arc<DashMap<i64, Route>>,
    next_id: Arc<AtomicI64>,
}

impl MemoryRouteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    fn insert_route(&self, new: NewRoute) -> Result<i64, StoreError> {
        let name = normalize_name(&new.name)
            .ok_or_else(|| StoreError::Invalid("Route name must not be empty".to_string()))?;
        let metrics = RouteMetrics::from_points(&new.points);
        let point_count = new.points.len();
        let now = Utc::now();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;

        self.routes.insert(
            id,
            Route {
                id,
                user_id: new.user_id,
                name,
                points: new.points,
                total_distance: metrics.total_distance,
                duration: metrics.duration,
                status: new.status,
                created_at: new.created_at.unwrap_or(now),
                updated_at: now,
            },
        );

        tracing::debug!("Inserted route {} ({} points)", id, point_count);
        Ok(id)
    }

    fn update_route(&self, id: i64, owner: Option<Uuid>, update: RouteUpdate) -> Result<Route, StoreError> {
        let name = match update.name.as_deref() {
            Some(raw) => Some(
                normalize_name(raw)
                    .ok_or_else(|| StoreError::Invalid("Route name must not be empty".to_string()))?,
            ),
            None => None,
        };

        let mut route = self
            .routes
            .get_mut(&id)
            .filter(|route| owns(route, owner))
            .ok_or(StoreError::NotFound(id))?;

        if let Some(name) = name {
            route.name = name;
        }
        if let Some(points) = update.points {
            let metrics = RouteMetrics::from_points(&points);
            route.points = points;
            route.total_distance = metrics.total_distance;
            route.duration = metrics.duration;
        }
        if let Some(status) = update.status {
            route.status = status;
        }
        route.updated_at = Utc::now();

        Ok(route.clone())
    }

    fn delete_route(&self, id: i64, owner: Option<Uuid>) -> Result<(), StoreError> {
        self.routes
            .remove_if(&id, |_, route| owns(route, owner))
            .map(|_| ())
            .ok_or(StoreError::NotFound(id))
    }

    fn collect(&self, keep: impl Fn(&Route) -> bool) -> Vec<Route> {
        let mut routes: Vec<Route> = self
            .routes
            .iter()
            .filter(|entry| keep(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        routes.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        routes
    }
}

fn owns(route: &Route, owner: Option<Uuid>) -> bool {
    match owner {
        Some(owner) => route.user_id == Some(owner),
        None => true,
    }
}

impl RouteStore for MemoryRouteStore {
    async fn insert(&self, route: NewRoute) -> Result<i64, StoreError> {
        self.insert_route(route)
    }

    async fn update(&self, id: i64, owner: Option<Uuid>, update: RouteUpdate) -> Result<Route, StoreError> {
        self.update_route(id, owner, update)
    }

    async fn delete(&self, id: i64, owner: Option<Uuid>) -> Result<(), StoreError> {
        self.delete_route(id, owner)
    }

    async fn find_active_for_user(&self, user_id: Option<Uuid>) -> Result<Option<Route>, StoreError> {
        Ok(self
            .collect(|r| r.status == RouteStatus::Active && r.user_id == user_id)
            .into_iter()
            .next())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Route>, StoreError> {
        Ok(self.routes.get(&id).map(|entry| entry.value().clone()))
    }

    async fn find_completed_for_user(&self, user_id: Uuid) -> Result<Vec<Route>, StoreError> {
        Ok(self.collect(|r| r.status == RouteStatus::Completed && r.user_id == Some(user_id)))
    }

    async fn find_all_completed(&self) -> Result<Vec<Route>, StoreError> {
        Ok(self.collect(|r| r.status == RouteStatus::Completed))
    }
}
