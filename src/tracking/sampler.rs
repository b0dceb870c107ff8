//! Live position sampling on top of a [`PositionSource`].

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::config::GeolocationConfig;
use crate::error::GeolocationError;
use crate::tracking::lock;
use crate::types::route::LocationSample;

pub type PositionUpdate = Result<LocationSample, GeolocationError>;
pub type PositionCallback = Arc<dyn Fn(&LocationSample) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(&GeolocationError) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionOptions {
    pub enable_high_accuracy: bool,
    pub timeout: Duration,
    /// Oldest cached fix the source may hand out instead of a fresh one.
    pub maximum_age: Duration,
}

/// Device capability delivering GPS fixes.
pub trait PositionSource: Send + Sync + 'static {
    fn is_supported(&self) -> bool {
        true
    }

    /// One-shot fix. The caller bounds it with `options.timeout`.
    fn current_position(&self, options: PositionOptions) -> impl Future<Output = PositionUpdate> + Send;

    /// Continuous fixes, in order, until the receiver is dropped.
    fn watch_position(&self, options: PositionOptions) -> mpsc::UnboundedReceiver<PositionUpdate>;
}

/// A [`PositionSource`] fed by the host: a GPS daemon, a mobile bridge or a
/// test pushes fixes in, every open watch receives them.
#[derive(Clone)]
pub struct ChannelPositionSource {
    inner: Arc<ChannelInner>,
}

struct ChannelInner {
    supported: bool,
    latest: Mutex<Option<(LocationSample, Instant)>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<PositionUpdate>>>,
}

impl ChannelPositionSource {
    pub fn new() -> Self {
        Self::with_support(true)
    }

    /// A device without location hardware.
    pub fn unsupported() -> Self {
        Self::with_support(false)
    }

    fn with_support(supported: bool) -> Self {
        Self {
            inner: Arc::new(ChannelInner {
                supported,
                latest: Mutex::new(None),
                subscribers: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn push(&self, sample: LocationSample) {
        *lock(&self.inner.latest) = Some((sample, Instant::now()));
        self.broadcast(Ok(sample));
    }

    pub fn fail(&self, err: GeolocationError) {
        self.broadcast(Err(err));
    }

    /// Ends every open watch.
    pub fn close(&self) {
        lock(&self.inner.subscribers).clear();
    }

    pub fn watcher_count(&self) -> usize {
        let mut subscribers = lock(&self.inner.subscribers);
        subscribers.retain(|tx| !tx.is_closed());
        subscribers.len()
    }

    fn broadcast(&self, update: PositionUpdate) {
        lock(&self.inner.subscribers).retain(|tx| tx.send(update.clone()).is_ok());
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<PositionUpdate> {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.inner.subscribers).push(tx);
        rx
    }
}

impl Default for ChannelPositionSource {
    fn default() -> Self {
        Self::new()
    }
}

impl PositionSource for ChannelPositionSource {
    fn is_supported(&self) -> bool {
        self.inner.supported
    }

    async fn current_position(&self, options: PositionOptions) -> PositionUpdate {
        let mut updates = self.subscribe();
        let cached = *lock(&self.inner.latest);
        if let Some((sample, seen_at)) = cached {
            if !options.maximum_age.is_zero() && seen_at.elapsed() <= options.maximum_age {
                return Ok(sample);
            }
        }
        updates.recv().await.unwrap_or(Err(GeolocationError::SourceClosed))
    }

    fn watch_position(&self, _options: PositionOptions) -> mpsc::UnboundedReceiver<PositionUpdate> {
        self.subscribe()
    }
}

/// Wraps a position source into a start/stop tracking lifecycle with an
/// observable current position and error string.
pub struct GeolocationSampler<P> {
    source: Option<Arc<P>>,
    config: GeolocationConfig,
    shared: Arc<SamplerShared>,
    watch_task: Mutex<Option<JoinHandle<()>>>,
}

struct SamplerShared {
    position: watch::Sender<Option<LocationSample>>,
    tracking: AtomicBool,
    generation: AtomicU64,
    error: Mutex<Option<String>>,
    on_position: Mutex<Option<PositionCallback>>,
    on_error: Mutex<Option<ErrorCallback>>,
}

impl SamplerShared {
    fn publish(&self, generation: u64, sample: LocationSample) -> bool {
        if self.generation.load(Ordering::SeqCst) != generation {
            return false;
        }
        self.position.send_replace(Some(sample));
        let callback = lock(&self.on_position).clone();
        if let Some(callback) = callback {
            callback(&sample);
        }
        true
    }

    fn fail(&self, generation: u64, err: &GeolocationError) {
        if self.generation.load(Ordering::SeqCst) != generation {
            return;
        }
        tracing::warn!("Position watch failed: {}", err);
        *lock(&self.error) = Some(format!("Error: {}", err));
        self.tracking.store(false, Ordering::SeqCst);
        let callback = lock(&self.on_error).clone();
        if let Some(callback) = callback {
            callback(err);
        }
    }
}

impl<P: PositionSource> GeolocationSampler<P> {
    /// `source` is `None` on devices without geolocation.
    pub fn new(source: Option<Arc<P>>, config: GeolocationConfig) -> Self {
        let (position, _) = watch::channel(None);
        Self {
            source,
            config,
            shared: Arc::new(SamplerShared {
                position,
                tracking: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                error: Mutex::new(None),
                on_position: Mutex::new(None),
                on_error: Mutex::new(None),
            }),
            watch_task: Mutex::new(None),
        }
    }

    /// Called with every watch update after the first fix.
    pub fn set_on_position(&self, callback: PositionCallback) {
        *lock(&self.shared.on_position) = Some(callback);
    }

    /// Called when a watch error ends tracking.
    pub fn set_on_error(&self, callback: ErrorCallback) {
        *lock(&self.shared.on_error) = Some(callback);
    }

    /// Takes a first fix and starts watching. On failure nothing is watched
    /// and the error string is set.
    pub async fn start(&self) -> Result<LocationSample, GeolocationError> {
        self.cancel_watch();

        let Some(source) = self.source.clone().filter(|s| s.is_supported()) else {
            let err = GeolocationError::Unsupported;
            *lock(&self.shared.error) = Some(err.to_string());
            return Err(err);
        };
        *lock(&self.shared.error) = None;

        let initial = PositionOptions {
            enable_high_accuracy: self.config.high_accuracy,
            timeout: self.config.initial_timeout,
            maximum_age: Duration::ZERO,
        };
        let first = tokio::time::timeout(initial.timeout, source.current_position(initial))
            .await
            .unwrap_or(Err(GeolocationError::Timeout));
        let first = match first {
            Ok(sample) => sample,
            Err(err) => {
                tracing::warn!("Could not get initial position: {}", err);
                *lock(&self.shared.error) = Some(format!("Error getting position: {}", err));
                return Err(err);
            }
        };

        self.shared.position.send_replace(Some(first));
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.tracking.store(true, Ordering::SeqCst);

        let watch_options = PositionOptions {
            enable_high_accuracy: self.config.high_accuracy,
            timeout: self.config.watch_timeout,
            maximum_age: self.config.maximum_age,
        };
        let updates = source.watch_position(watch_options);
        let task = tokio::spawn(run_watch(
            self.shared.clone(),
            updates,
            watch_options.timeout,
            generation,
        ));
        *lock(&self.watch_task) = Some(task);

        tracing::info!(
            "Tracking started at ({:.5}, {:.5}), accuracy {:.0}m",
            first.latitude,
            first.longitude,
            first.accuracy
        );
        Ok(first)
    }

    /// Cancels the watch. Safe to call repeatedly and from inside the
    /// position callback.
    pub fn stop(&self) {
        self.cancel_watch();
        if self.shared.tracking.swap(false, Ordering::SeqCst) {
            tracing::info!("Tracking stopped");
        }
    }

    fn cancel_watch(&self) {
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(task) = lock(&self.watch_task).take() {
            task.abort();
        }
    }

    pub fn is_tracking(&self) -> bool {
        self.shared.tracking.load(Ordering::SeqCst)
    }

    pub fn current_position(&self) -> Option<LocationSample> {
        *self.shared.position.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<LocationSample>> {
        self.shared.position.subscribe()
    }

    pub fn error(&self) -> Option<String> {
        lock(&self.shared.error).clone()
    }
}

impl<P> Drop for GeolocationSampler<P> {
    fn drop(&mut self) {
        if let Some(task) = lock(&self.watch_task).take() {
            task.abort();
        }
    }
}

async fn run_watch(
    shared: Arc<SamplerShared>,
    mut updates: mpsc::UnboundedReceiver<PositionUpdate>,
    update_timeout: Duration,
    generation: u64,
) {
    loop {
        let update = match tokio::time::timeout(update_timeout, updates.recv()).await {
            Ok(Some(update)) => update,
            Ok(None) => Err(GeolocationError::SourceClosed),
            Err(_) => Err(GeolocationError::Timeout),
        };
        match update {
            Ok(sample) => {
                tracing::debug!("Position update ({:.5}, {:.5})", sample.latitude, sample.longitude);
                if !shared.publish(generation, sample) {
                    return;
                }
            }
            Err(err) => {
                shared.fail(generation, &err);
                return;
            }
        }
    }
}
