//! Route storage: the remote store seam and the local pending-route cache.

pub mod http;
pub mod local;
pub mod memory;

use std::future::Future;
use std::sync::Arc;

use uuid::Uuid;

use crate::error::StoreError;
use crate::types::route::{NewRoute, Route, RouteUpdate};

/// The authoritative route store.
///
/// `owner` on mutations is applied iff it is `Some`: the mutation then only
/// matches a route whose `user_id` equals it. With `None` the route is
/// addressed by id alone.
pub trait RouteStore: Send + Sync + 'static {
    fn insert(&self, route: NewRoute) -> impl Future<Output = Result<i64, StoreError>> + Send;

    fn update(
        &self,
        id: i64,
        owner: Option<Uuid>,
        update: RouteUpdate,
    ) -> impl Future<Output = Result<Route, StoreError>> + Send;

    fn delete(
        &self,
        id: i64,
        owner: Option<Uuid>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Most recent active route owned by `user_id` (`None` = anonymous routes).
    fn find_active_for_user(
        &self,
        user_id: Option<Uuid>,
    ) -> impl Future<Output = Result<Option<Route>, StoreError>> + Send;

    fn find_by_id(&self, id: i64) -> impl Future<Output = Result<Option<Route>, StoreError>> + Send;

    fn find_completed_for_user(
        &self,
        user_id: Uuid,
    ) -> impl Future<Output = Result<Vec<Route>, StoreError>> + Send;

    fn find_all_completed(&self) -> impl Future<Output = Result<Vec<Route>, StoreError>> + Send;
}

impl<T: RouteStore> RouteStore for Arc<T> {
    fn insert(&self, route: NewRoute) -> impl Future<Output = Result<i64, StoreError>> + Send {
        (**self).insert(route)
    }

    fn update(
        &self,
        id: i64,
        owner: Option<Uuid>,
        update: RouteUpdate,
    ) -> impl Future<Output = Result<Route, StoreError>> + Send {
        (**self).update(id, owner, update)
    }

    fn delete(
        &self,
        id: i64,
        owner: Option<Uuid>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        (**self).delete(id, owner)
    }

    fn find_active_for_user(
        &self,
        user_id: Option<Uuid>,
    ) -> impl Future<Output = Result<Option<Route>, StoreError>> + Send {
        (**self).find_active_for_user(user_id)
    }

    fn find_by_id(&self, id: i64) -> impl Future<Output = Result<Option<Route>, StoreError>> + Send {
        (**self).find_by_id(id)
    }

    fn find_completed_for_user(
        &self,
        user_id: Uuid,
    ) -> impl Future<Output = Result<Vec<Route>, StoreError>> + Send {
        (**self).find_completed_for_user(user_id)
    }

    fn find_all_completed(&self) -> impl Future<Output = Result<Vec<Route>, StoreError>> + Send {
        (**self).find_all_completed()
    }
}
