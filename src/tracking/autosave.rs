//! Background persistence of the route being tracked.
//!
//! A save is due when the point threshold is reached, or on every interval
//! tick that finds unsaved changes. A due save is dropped when one is
//! already in flight.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::AutoSaveConfig;
use crate::geocode::ReverseGeocoder;
use crate::store::RouteStore;
use crate::tracking::lock;
use crate::tracking::reconciler::{RouteReconciler, SaveOutcome};

/// Whatever the scheduler persists.
pub trait SaveTarget: Send + Sync + 'static {
    fn save(&self) -> impl Future<Output = SaveOutcome> + Send;
}

impl<S: RouteStore, G: ReverseGeocoder> SaveTarget for RouteReconciler<S, G> {
    fn save(&self) -> impl Future<Output = SaveOutcome> + Send {
        self.save_route()
    }
}

pub struct AutoSave<T> {
    inner: Arc<Inner<T>>,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

struct Inner<T> {
    target: Arc<T>,
    config: AutoSaveConfig,
    changes: AtomicUsize,
    enabled: AtomicBool,
    in_flight: AtomicBool,
    last_save: Mutex<Option<Instant>>,
}

struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl<T: SaveTarget> Inner<T> {
    async fn run_save(&self) -> SaveOutcome {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            return SaveOutcome::Skipped;
        }
        let _in_flight = InFlight(&self.in_flight);

        let captured = self.changes.load(Ordering::SeqCst);
        let outcome = self.target.save().await;
        if outcome.is_success() {
            let _ = self
                .changes
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some(n.saturating_sub(captured)));
            *lock(&self.last_save) = Some(Instant::now());
        }
        outcome
    }

    /// Starts a save in the background unless one is already running.
    fn trigger(self: &Arc<Self>) {
        if self.in_flight.load(Ordering::SeqCst) {
            tracing::debug!("Auto-save due while another save is in flight, skipping");
            return;
        }
        let Ok(handle) = Handle::try_current() else {
            tracing::warn!("Auto-save due outside of a runtime, skipping");
            return;
        };
        let inner = self.clone();
        handle.spawn(async move {
            if let SaveOutcome::Failed = inner.run_save().await {
                tracing::warn!("Auto-save failed, will retry on the next trigger");
            }
        });
    }
}

impl<T: SaveTarget> AutoSave<T> {
    pub fn new(target: Arc<T>, config: AutoSaveConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                target,
                config,
                changes: AtomicUsize::new(0),
                enabled: AtomicBool::new(false),
                in_flight: AtomicBool::new(false),
                last_save: Mutex::new(None),
            }),
            ticker: Mutex::new(None),
        }
    }

    /// Turns the scheduler on or off. Enabling starts the interval timer,
    /// disabling cancels it; a save already dispatched runs to completion.
    pub fn set_enabled(&self, enabled: bool) {
        let was = self.inner.enabled.swap(enabled, Ordering::SeqCst);
        if was == enabled {
            return;
        }

        let mut ticker = lock(&self.ticker);
        if let Some(task) = ticker.take() {
            task.abort();
        }
        if !enabled {
            return;
        }

        let Ok(handle) = Handle::try_current() else {
            tracing::warn!("Auto-save enabled outside of a runtime, interval saves are off");
            return;
        };
        let inner = self.inner.clone();
        let period = inner.config.interval;
        *lock(&inner.last_save) = Some(Instant::now());
        *ticker = Some(handle.spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if inner.changes.load(Ordering::SeqCst) > 0 {
                    inner.trigger();
                }
            }
        }));
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    /// Counts one change and fires a save once the threshold is reached.
    pub fn record_change(&self) {
        let count = self.inner.changes.fetch_add(1, Ordering::SeqCst) + 1;
        if self.is_enabled() && count >= self.inner.config.point_threshold {
            self.inner.trigger();
        }
    }

    /// Saves right away, unless a save is already in flight.
    pub async fn save_now(&self) -> SaveOutcome {
        self.inner.run_save().await
    }

    pub fn changes_since_last_save(&self) -> usize {
        self.inner.changes.load(Ordering::SeqCst)
    }

    pub fn is_saving(&self) -> bool {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    pub fn last_save(&self) -> Option<Instant> {
        *lock(&self.inner.last_save)
    }
}

impl<T> Drop for AutoSave<T> {
    fn drop(&mut self) {
        if let Some(task) = lock(&self.ticker).take() {
            task.abort();
        }
    }
}
