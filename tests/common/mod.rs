#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use trilhos_rs::error::StoreError;
use trilhos_rs::store::memory::MemoryRouteStore;
use trilhos_rs::store::RouteStore;
use trilhos_rs::types::route::{LocationSample, NewRoute, Route, RouteStatus, RouteUpdate};
use uuid::Uuid;

/// A [`MemoryRouteStore`] that can be taken offline or slowed down.
#[derive(Clone, Default)]
pub struct FlakyStore {
    pub inner: MemoryRouteStore,
    offline: Arc<AtomicBool>,
    delay_ms: Arc<AtomicU64>,
    calls: Arc<AtomicUsize>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn gate(&self) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("network is down".to_string()));
        }
        Ok(())
    }
}

impl RouteStore for FlakyStore {
    async fn insert(&self, route: NewRoute) -> Result<i64, StoreError> {
        self.gate().await?;
        self.inner.insert(route).await
    }

    async fn update(&self, id: i64, owner: Option<Uuid>, update: RouteUpdate) -> Result<Route, StoreError> {
        self.gate().await?;
        self.inner.update(id, owner, update).await
    }

    async fn delete(&self, id: i64, owner: Option<Uuid>) -> Result<(), StoreError> {
        self.gate().await?;
        self.inner.delete(id, owner).await
    }

    async fn find_active_for_user(&self, user_id: Option<Uuid>) -> Result<Option<Route>, StoreError> {
        self.gate().await?;
        self.inner.find_active_for_user(user_id).await
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Route>, StoreError> {
        self.gate().await?;
        self.inner.find_by_id(id).await
    }

    async fn find_completed_for_user(&self, user_id: Uuid) -> Result<Vec<Route>, StoreError> {
        self.gate().await?;
        self.inner.find_completed_for_user(user_id).await
    }

    async fn find_all_completed(&self) -> Result<Vec<Route>, StoreError> {
        self.gate().await?;
        self.inner.find_all_completed().await
    }
}

/// Samples walking east along the equator, one every `step_ms`.
pub fn walk(count: usize, start_ms: i64, step_ms: i64) -> Vec<LocationSample> {
    (0..count)
        .map(|i| LocationSample::at(0.0, i as f64 * 0.0001, start_ms + i as i64 * step_ms))
        .collect()
}

pub fn active_route(user_id: Option<Uuid>, name: &str, points: Vec<LocationSample>) -> NewRoute {
    NewRoute {
        user_id,
        name: name.to_string(),
        points,
        status: RouteStatus::Active,
        created_at: None,
    }
}

/// Lets spawned tasks run; with paused time this also advances the clock.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}
