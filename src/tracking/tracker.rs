use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::auth::AuthService;
use crate::config::TrackingConfig;
use crate::error::{GeolocationError, TrackingError};
use crate::geocode::ReverseGeocoder;
use crate::store::local::LocalCache;
use crate::store::RouteStore;
use crate::tracking::autosave::AutoSave;
use crate::tracking::reconciler::{Phase, ReconcileOutcome, RouteReconciler};
use crate::tracking::sampler::{GeolocationSampler, PositionSource};
use crate::tracking::stats::RouteStats;
use crate::types::route::LocationSample;

#[derive(Debug, Clone, Serialize)]
pub struct TrackingState {
    pub is_tracking: bool,
    pub current_position: Option<LocationSample>,
    pub route_id: Option<i64>,
    pub route_name: String,
    pub points: Vec<LocationSample>,
    pub error: Option<String>,
    pub stats: RouteStats,
    pub show_save_dialog: bool,
    pub is_saving: bool,
    pub has_route_to_resume: bool,
}

/// One tracking screen: sampler, reconciler and auto-save wired together.
pub struct Tracker<P, S, G> {
    sampler: Arc<GeolocationSampler<P>>,
    reconciler: Arc<RouteReconciler<S, G>>,
    autosave: Arc<AutoSave<RouteReconciler<S, G>>>,
    show_save_dialog: AtomicBool,
}

impl<P, S, G> Tracker<P, S, G>
where
    P: PositionSource,
    S: RouteStore,
    G: ReverseGeocoder,
{
    pub fn new(
        source: Option<Arc<P>>,
        store: S,
        geocoder: G,
        cache: LocalCache,
        auth: Arc<dyn AuthService>,
        config: &TrackingConfig,
    ) -> Self {
        let reconciler = Arc::new(RouteReconciler::new(store, geocoder, cache, auth, config));
        let autosave = Arc::new(AutoSave::new(reconciler.clone(), config.autosave));
        let sampler = Arc::new(GeolocationSampler::new(source, config.geolocation));

        let on_position = {
            let reconciler = reconciler.clone();
            let autosave = autosave.clone();
            Arc::new(move |sample: &LocationSample| {
                reconciler.add_point(*sample);
                autosave.record_change();
            })
        };
        sampler.set_on_position(on_position);

        let on_error = {
            let autosave = autosave.clone();
            Arc::new(move |_: &GeolocationError| autosave.set_enabled(false))
        };
        sampler.set_on_error(on_error);

        Self {
            sampler,
            reconciler,
            autosave,
            show_save_dialog: AtomicBool::new(false),
        }
    }

    /// Recovers an interrupted route, if any. Call once after construction.
    pub async fn init(&self) -> ReconcileOutcome {
        self.reconciler.reconcile().await
    }

    /// Takes a first fix and starts a new route with it.
    pub async fn start_tracking(&self) -> Result<(), TrackingError> {
        if self.reconciler.has_route_to_resume() {
            return Err(TrackingError::ResumePending);
        }
        self.begin(false).await
    }

    async fn begin(&self, continue_route: bool) -> Result<(), TrackingError> {
        let first = self.sampler.start().await?;
        if continue_route && self.reconciler.phase() == Phase::Active && self.reconciler.has_route() {
            self.reconciler.add_point(first);
            self.autosave.record_change();
        } else {
            self.reconciler.create_new_route(first).await;
        }

        self.show_save_dialog.store(false, Ordering::SeqCst);
        self.autosave.set_enabled(self.sampler.is_tracking());
        Ok(())
    }

    /// Stops sampling and asks for a name when anything was recorded.
    pub fn stop_tracking(&self) {
        self.sampler.stop();
        self.autosave.set_enabled(false);
        if self.reconciler.has_route() {
            self.show_save_dialog.store(true, Ordering::SeqCst);
        }
    }

    pub async fn save_route(&self, name: &str) -> bool {
        let success = self.reconciler.complete_route(name).await;
        if success {
            self.show_save_dialog.store(false, Ordering::SeqCst);
        }
        success
    }

    /// Drops the current or resumable route.
    pub async fn discard_route(&self) -> bool {
        self.show_save_dialog.store(false, Ordering::SeqCst);
        self.sampler.stop();
        self.autosave.set_enabled(false);
        self.reconciler.discard_route().await
    }

    /// Continues the adopted route and restarts sampling. New fixes are
    /// appended to its points.
    pub async fn resume(&self) -> Result<(), TrackingError> {
        self.reconciler.resume_route();
        self.begin(true).await
    }

    pub fn close_save_dialog(&self) {
        self.show_save_dialog.store(false, Ordering::SeqCst);
    }

    pub fn state(&self) -> TrackingState {
        let route = self.reconciler.snapshot();
        TrackingState {
            is_tracking: self.sampler.is_tracking(),
            current_position: self.sampler.current_position(),
            route_id: route.route_id,
            route_name: route.name,
            stats: RouteStats::from_points(&route.points),
            points: route.points,
            error: self.sampler.error(),
            show_save_dialog: self.show_save_dialog.load(Ordering::SeqCst),
            is_saving: route.is_saving,
            has_route_to_resume: route.has_route_to_resume,
        }
    }

    pub fn sampler(&self) -> &GeolocationSampler<P> {
        &self.sampler
    }

    pub fn reconciler(&self) -> &RouteReconciler<S, G> {
        &self.reconciler
    }

    pub fn autosave(&self) -> &AutoSave<RouteReconciler<S, G>> {
        &self.autosave
    }
}
