//! Owns the in-progress route and decides where it is persisted.
//!
//! The remote [`RouteStore`] is always tried first; the [`LocalCache`] slot
//! holds whatever the remote store has not confirmed. No public operation
//! returns an error: failures degrade to the cache or come back as a
//! boolean / outcome value.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::DateTime;
use serde::Serialize;
use uuid::Uuid;

use crate::auth::AuthService;
use crate::config::{CompletionCachePolicy, TrackingConfig};
use crate::error::StoreError;
use crate::geocode::{generate_route_name, ReverseGeocoder};
use crate::store::local::LocalCache;
use crate::store::RouteStore;
use crate::tracking::lock;
use crate::types::pending::PendingRoute;
use crate::types::route::{normalize_name, LocationSample, NewRoute, RouteMetrics, RouteStatus, RouteUpdate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// No route being tracked. A route adopted for resumption waits here.
    #[default]
    Idle,
    Active,
    /// Finalize or discard in flight.
    Saving,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    /// Remote store unreachable; points were mirrored to the local cache.
    Failed,
    /// Another save was in flight, or there was nothing to save.
    Skipped,
}

impl SaveOutcome {
    pub fn is_success(self) -> bool {
        matches!(self, SaveOutcome::Saved)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Remote(i64),
    /// Remote insert failed; the route lives in the local cache only.
    LocalOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Nothing,
    /// An active remote route was adopted.
    ResumedRemote(i64),
    /// A cached route was pushed to the remote store and adopted.
    SyncedPending(i64),
    /// A cached route could not be pushed; it stays cached and was adopted
    /// as a local-only route.
    PendingOffline,
}

impl ReconcileOutcome {
    pub fn has_route(self) -> bool {
        !matches!(self, ReconcileOutcome::Nothing)
    }
}

/// What the UI reads from the reconciler.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteSnapshot {
    pub route_id: Option<i64>,
    pub name: String,
    pub points: Vec<LocationSample>,
    pub phase: Phase,
    pub has_route_to_resume: bool,
    pub is_saving: bool,
}

#[derive(Debug, Default)]
struct RouteState {
    phase: Phase,
    route_id: Option<i64>,
    name: String,
    points: Vec<LocationSample>,
    started_at: i64,
    has_route_to_resume: bool,
    /// A completed route kept only so its points stay on screen.
    display_only: bool,
    /// Bumped whenever the in-memory route is replaced, so late results of
    /// network calls never land on a different route.
    session: u64,
}

impl RouteState {
    fn has_route(&self) -> bool {
        !self.display_only && (self.route_id.is_some() || !self.points.is_empty())
    }

    /// Whether a network result started under `session` may still be
    /// applied. A finalize or discard in flight owns the route.
    fn accepts(&self, session: u64) -> bool {
        self.session == session && self.phase != Phase::Saving
    }

    fn replace(&mut self, next: RouteState) -> u64 {
        let session = self.session + 1;
        *self = RouteState { session, ..next };
        session
    }

    fn reset(&mut self) {
        self.replace(RouteState::default());
    }

    fn pending(&self) -> PendingRoute {
        PendingRoute {
            route_id: self.route_id,
            points: self.points.clone(),
            name: self.name.clone(),
            started_at: self.started_at,
            needs_sync: true,
        }
    }
}

struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct RouteReconciler<S, G> {
    store: S,
    geocoder: G,
    cache: LocalCache,
    auth: Arc<dyn AuthService>,
    policy: CompletionCachePolicy,
    geocode_timeout: Duration,
    state: Mutex<RouteState>,
    save_in_flight: AtomicBool,
}

impl<S: RouteStore, G: ReverseGeocoder> RouteReconciler<S, G> {
    pub fn new(
        store: S,
        geocoder: G,
        cache: LocalCache,
        auth: Arc<dyn AuthService>,
        config: &TrackingConfig,
    ) -> Self {
        Self {
            store,
            geocoder,
            cache,
            auth,
            policy: config.completion_cache_policy,
            geocode_timeout: config.geocode_timeout,
            state: Mutex::new(RouteState::default()),
            save_in_flight: AtomicBool::new(false),
        }
    }

    /// Builds the reconciler and runs [`reconcile`](Self::reconcile) once.
    pub async fn open(
        store: S,
        geocoder: G,
        cache: LocalCache,
        auth: Arc<dyn AuthService>,
        config: &TrackingConfig,
    ) -> (Self, ReconcileOutcome) {
        let reconciler = Self::new(store, geocoder, cache, auth, config);
        let outcome = reconciler.reconcile().await;
        (reconciler, outcome)
    }

    fn state(&self) -> MutexGuard<'_, RouteState> {
        lock(&self.state)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn cache(&self) -> &LocalCache {
        &self.cache
    }

    /// Looks for an interrupted route: first an active remote route of the
    /// current user, then a cached route flagged for sync.
    pub async fn reconcile(&self) -> ReconcileOutcome {
        let user = self.auth.current_user_id();
        let cached = self.cache.load();

        match self.store.find_active_for_user(user).await {
            Ok(Some(route)) => {
                let mut points = route.points;
                if let Some(newer) = cached
                    .as_ref()
                    .filter(|p| p.route_id == Some(route.id) && p.points.len() > points.len())
                {
                    tracing::info!(
                        "Local cache holds {} unsaved points for route {}",
                        newer.points.len() - points.len(),
                        route.id
                    );
                    points = newer.points.clone();
                }
                let started_at = points
                    .first()
                    .map(|p| p.timestamp)
                    .unwrap_or_else(|| route.created_at.timestamp_millis());
                self.adopt(Some(route.id), route.name, points, started_at);
                tracing::info!("Found active route {} to resume", route.id);
                return ReconcileOutcome::ResumedRemote(route.id);
            }
            Ok(None) => {}
            Err(err) => tracing::warn!("Could not look up active route: {}", err),
        }

        let Some(pending) = cached.filter(|p| p.needs_sync) else {
            return ReconcileOutcome::Nothing;
        };

        match self.push_pending(&pending, user).await {
            Ok(id) => {
                self.cache.clear();
                tracing::info!("Synced cached route as {}", id);
                self.adopt(Some(id), pending.name, pending.points, pending.started_at);
                ReconcileOutcome::SyncedPending(id)
            }
            Err(err) => {
                tracing::warn!("Cached route stays local, sync failed: {}", err);
                self.adopt(pending.route_id, pending.name, pending.points, pending.started_at);
                ReconcileOutcome::PendingOffline
            }
        }
    }

    fn adopt(&self, route_id: Option<i64>, name: String, points: Vec<LocationSample>, started_at: i64) {
        self.state().replace(RouteState {
            phase: Phase::Idle,
            route_id,
            name,
            points,
            started_at,
            has_route_to_resume: true,
            display_only: false,
            session: 0,
        });
    }

    async fn push_pending(&self, pending: &PendingRoute, user: Option<Uuid>) -> Result<i64, StoreError> {
        match pending.route_id {
            Some(id) => self
                .store
                .update(id, user, RouteUpdate::points(pending.points.clone()))
                .await
                .map(|_| id),
            None => {
                self.store
                    .insert(NewRoute {
                        user_id: user,
                        name: pending.name.clone(),
                        points: pending.points.clone(),
                        status: RouteStatus::Active,
                        created_at: DateTime::from_timestamp_millis(pending.started_at),
                    })
                    .await
            }
        }
    }

    /// Starts a new route at `start`. Never fails: without the remote store
    /// the route is kept in the local cache.
    pub async fn create_new_route(&self, start: LocationSample) -> CreateOutcome {
        let session = self.state().replace(RouteState {
            phase: Phase::Active,
            points: vec![start],
            started_at: start.timestamp,
            ..RouteState::default()
        });

        let name = generate_route_name(&self.geocoder, &start, self.geocode_timeout).await;
        let user = self.auth.current_user_id();
        let inserted = self
            .store
            .insert(NewRoute {
                user_id: user,
                name: name.clone(),
                points: vec![start],
                status: RouteStatus::Active,
                created_at: None,
            })
            .await;

        let applied = {
            let mut state = self.state();
            let current = state.accepts(session);
            if current {
                state.name = name;
                match &inserted {
                    Ok(id) => {
                        state.route_id = Some(*id);
                        tracing::info!("Created route {} \"{}\"", id, state.name);
                    }
                    Err(err) => {
                        tracing::warn!("Remote route creation failed, keeping route locally: {}", err);
                        self.cache.save(&state.pending());
                    }
                }
            }
            current
        };

        match inserted {
            Ok(id) => {
                if !applied {
                    tracing::warn!("Route was replaced while it was being created");
                    self.abandon_orphan(id, user).await;
                }
                CreateOutcome::Remote(id)
            }
            Err(_) => CreateOutcome::LocalOnly,
        }
    }

    /// Appends a sample as-is.
    pub fn add_point(&self, sample: LocationSample) {
        self.state().points.push(sample);
    }

    /// Pushes the current points to the remote store; on failure mirrors
    /// them into the local cache. Concurrent calls are skipped, not queued.
    pub async fn save_route(&self) -> SaveOutcome {
        if self.save_in_flight.swap(true, Ordering::SeqCst) {
            tracing::debug!("Save already in flight, skipping");
            return SaveOutcome::Skipped;
        }
        let _in_flight = InFlight(&self.save_in_flight);

        let (session, snapshot) = {
            let state = self.state();
            if !state.has_route() || state.phase == Phase::Saving {
                return SaveOutcome::Skipped;
            }
            (state.session, state.pending())
        };

        let metrics = RouteMetrics::from_points(&snapshot.points);
        let user = self.auth.current_user_id();
        match self.push_pending(&snapshot, user).await {
            Ok(id) => {
                let current = {
                    let mut state = self.state();
                    let current = state.accepts(session);
                    if current {
                        if state.route_id.is_none() {
                            state.route_id = Some(id);
                            tracing::info!("Local route synced as {}", id);
                        }
                        if self.cache.load().is_some_and(|p| {
                            p.route_id == Some(id) || (p.route_id.is_none() && snapshot.route_id.is_none())
                        }) {
                            self.cache.clear();
                        }
                    }
                    current
                };
                if !current {
                    if snapshot.route_id.is_none() {
                        self.abandon_orphan(id, user).await;
                    }
                    return SaveOutcome::Skipped;
                }
                tracing::debug!(
                    "Saved route {} ({} points, {:.0}m, {}ms)",
                    id,
                    snapshot.points.len(),
                    metrics.total_distance,
                    metrics.duration
                );
                SaveOutcome::Saved
            }
            Err(err) => {
                let state = self.state();
                if state.accepts(session) {
                    tracing::warn!("Route save failed, mirroring to local cache: {}", err);
                    self.mirror_to_cache(&snapshot);
                } else {
                    tracing::debug!("Route save failed after the route was finalized: {}", err);
                }
                SaveOutcome::Failed
            }
        }
    }

    /// Marks a remote route created for an in-memory route that no longer
    /// exists, so it is never offered for resumption.
    async fn abandon_orphan(&self, id: i64, user: Option<Uuid>) {
        tracing::warn!("Abandoning route {} created for a route that was already finalized", id);
        if let Err(err) = self.store.update(id, user, RouteUpdate::abandon()).await {
            tracing::warn!("Could not abandon orphaned route {}: {}", id, err);
        }
    }

    fn mirror_to_cache(&self, snapshot: &PendingRoute) {
        match self.cache.load() {
            Some(cached) if cached.route_id == snapshot.route_id => {
                self.cache.update_points(&snapshot.points)
            }
            _ => self.cache.save(snapshot),
        }
    }

    /// Finalizes the route under `name` (blank keeps the current name).
    /// A local-only route is synced first. Returns whether the remote store
    /// confirmed the completion.
    pub async fn complete_route(&self, name: &str) -> bool {
        let (session, previous_phase, snapshot) = {
            let mut state = self.state();
            if !state.has_route() || state.phase == Phase::Saving {
                return false;
            }
            let previous = state.phase;
            state.phase = Phase::Saving;
            (state.session, previous, state.pending())
        };

        let name = normalize_name(name).unwrap_or_else(|| snapshot.name.clone());
        let metrics = RouteMetrics::from_points(&snapshot.points);
        let user = self.auth.current_user_id();

        let synced = match snapshot.route_id {
            Some(id) => Ok(id),
            None => self
                .push_pending(&PendingRoute { name: name.clone(), ..snapshot.clone() }, user)
                .await,
        };
        let success = match &synced {
            Ok(id) => match self
                .store
                .update(*id, user, RouteUpdate::complete(name.clone(), snapshot.points.clone()))
                .await
            {
                Ok(_) => {
                    tracing::info!(
                        "Completed route {} \"{}\" ({:.0}m, {}ms)",
                        id,
                        name,
                        metrics.total_distance,
                        metrics.duration
                    );
                    true
                }
                Err(err) => {
                    tracing::warn!("Completing route {} failed: {}", id, err);
                    false
                }
            },
            Err(err) => {
                tracing::warn!("Could not sync local route before completing: {}", err);
                false
            }
        };

        let mut state = self.state();
        match self.policy {
            CompletionCachePolicy::AlwaysClear => {
                if !success && synced.is_err() {
                    tracing::warn!("Discarding the only local copy of an unsynced route");
                }
                self.cache.clear();
            }
            CompletionCachePolicy::KeepOnFailure if success => self.cache.clear(),
            CompletionCachePolicy::KeepOnFailure => self.cache.save(&PendingRoute {
                route_id: synced.as_ref().ok().copied(),
                name: name.clone(),
                ..snapshot.clone()
            }),
        }

        if state.session == session {
            if success {
                let points = std::mem::take(&mut state.points);
                state.replace(RouteState {
                    points,
                    display_only: true,
                    ..RouteState::default()
                });
            } else {
                state.phase = previous_phase;
                if let Ok(id) = synced {
                    state.route_id = Some(id);
                }
            }
        }
        success
    }

    /// Marks the route abandoned remotely (when it has an id), then clears
    /// the cache and the in-memory route whatever the remote outcome.
    pub async fn discard_route(&self) -> bool {
        let (session, route_id) = {
            let mut state = self.state();
            if state.phase == Phase::Saving {
                return false;
            }
            state.phase = Phase::Saving;
            (state.session, state.route_id)
        };

        let confirmed = match route_id {
            Some(id) => match self
                .store
                .update(id, self.auth.current_user_id(), RouteUpdate::abandon())
                .await
            {
                Ok(_) => {
                    tracing::info!("Abandoned route {}", id);
                    true
                }
                Err(err) => {
                    tracing::warn!("Could not mark route {} abandoned: {}", id, err);
                    false
                }
            },
            None => true,
        };

        let mut state = self.state();
        self.cache.clear();
        if state.session == session {
            state.reset();
        }
        confirmed
    }

    /// Accepts the adopted route for further tracking. The caller restarts
    /// the sampler.
    pub fn resume_route(&self) {
        let mut state = self.state();
        state.has_route_to_resume = false;
        if state.has_route() && state.phase == Phase::Idle {
            state.phase = Phase::Active;
        }
    }

    pub fn route_id(&self) -> Option<i64> {
        self.state().route_id
    }

    pub fn route_name(&self) -> String {
        self.state().name.clone()
    }

    pub fn points(&self) -> Vec<LocationSample> {
        self.state().points.clone()
    }

    pub fn point_count(&self) -> usize {
        self.state().points.len()
    }

    pub fn has_route(&self) -> bool {
        self.state().has_route()
    }

    pub fn has_route_to_resume(&self) -> bool {
        self.state().has_route_to_resume
    }

    pub fn phase(&self) -> Phase {
        self.state().phase
    }

    pub fn is_saving(&self) -> bool {
        self.state().phase == Phase::Saving
    }

    pub fn snapshot(&self) -> RouteSnapshot {
        let state = self.state();
        RouteSnapshot {
            route_id: state.route_id,
            name: state.name.clone(),
            points: state.points.clone(),
            phase: state.phase,
            has_route_to_resume: state.has_route_to_resume,
            is_saving: state.phase == Phase::Saving,
        }
    }
}
