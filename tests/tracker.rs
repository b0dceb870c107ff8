mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{active_route, settle, walk, FlakyStore};
use trilhos_rs::auth::SessionAuth;
use trilhos_rs::config::{AutoSaveConfig, TrackingConfig};
use trilhos_rs::error::{GeolocationError, TrackingError};
use trilhos_rs::geocode::NoGeocoder;
use trilhos_rs::store::local::LocalCache;
use trilhos_rs::store::RouteStore;
use trilhos_rs::tracking::reconciler::ReconcileOutcome;
use trilhos_rs::tracking::sampler::ChannelPositionSource;
use trilhos_rs::tracking::tracker::Tracker;
use trilhos_rs::types::route::{LocationSample, RouteStatus};

type TestTracker = Tracker<ChannelPositionSource, FlakyStore, NoGeocoder>;

fn tracker(source: &ChannelPositionSource, store: &FlakyStore, point_threshold: usize) -> TestTracker {
    let config = TrackingConfig {
        autosave: AutoSaveConfig {
            interval: Duration::from_secs(30),
            point_threshold,
        },
        ..TrackingConfig::default()
    };
    Tracker::new(
        Some(Arc::new(source.clone())),
        store.clone(),
        NoGeocoder,
        LocalCache::in_memory(),
        Arc::new(SessionAuth::anonymous()),
        &config,
    )
}

fn fix(i: i64) -> LocationSample {
    LocationSample::at(-23.5505, -46.6333 + i as f64 * 0.0002, 1_700_000_000_000 + i * 1_000)
}

async fn start(tracker: &TestTracker, source: &ChannelPositionSource, first: LocationSample) -> Result<(), TrackingError> {
    let feeder = source.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        feeder.push(first);
    });
    tracker.start_tracking().await
}

#[tokio::test(start_paused = true)]
async fn record_stop_and_save_a_route() {
    let source = ChannelPositionSource::new();
    let store = FlakyStore::new();
    let tracker = tracker(&source, &store, 10);

    assert_eq!(tracker.init().await, ReconcileOutcome::Nothing);
    start(&tracker, &source, fix(0)).await.expect("start");

    let state = tracker.state();
    assert!(state.is_tracking);
    assert!(state.route_id.is_some());
    assert_eq!(state.points.len(), 1);
    assert!(tracker.autosave().is_enabled());

    source.push(fix(1));
    source.push(fix(2));
    settle().await;
    assert_eq!(tracker.state().points.len(), 3);
    assert_eq!(tracker.state().stats.duration, 2_000);

    tracker.stop_tracking();
    let state = tracker.state();
    assert!(!state.is_tracking);
    assert!(state.show_save_dialog);
    assert!(!tracker.autosave().is_enabled());

    assert!(tracker.save_route("Paulista loop").await);
    let state = tracker.state();
    assert!(!state.show_save_dialog);
    assert_eq!(state.route_id, None);
    assert_eq!(state.points.len(), 3);
    assert_eq!(state.stats.point_count, 3);

    tracker.stop_tracking();
    assert!(!tracker.state().show_save_dialog);

    let completed = store.inner.find_all_completed().await.expect("list");
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].name, "Paulista loop");
    assert_eq!(completed[0].points.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn interrupted_route_must_be_resumed_first() {
    let source = ChannelPositionSource::new();
    let store = FlakyStore::new();
    let id = store
        .inner
        .insert(active_route(None, "Earlier", walk(2, 1_000, 1_000)))
        .await
        .expect("insert");
    let tracker = tracker(&source, &store, 10);

    assert_eq!(tracker.init().await, ReconcileOutcome::ResumedRemote(id));
    assert!(tracker.state().has_route_to_resume);
    assert!(matches!(
        tracker.start_tracking().await,
        Err(TrackingError::ResumePending)
    ));

    let feeder = source.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        feeder.push(fix(0));
    });
    tracker.resume().await.expect("resume");

    let state = tracker.state();
    assert_eq!(state.route_id, Some(id));
    assert_eq!(state.route_name, "Earlier");
    assert_eq!(state.points.len(), 3);
    assert!(!state.has_route_to_resume);
    assert!(state.is_tracking);
}

#[tokio::test(start_paused = true)]
async fn point_threshold_saves_while_tracking() {
    let source = ChannelPositionSource::new();
    let store = FlakyStore::new();
    let tracker = tracker(&source, &store, 2);
    start(&tracker, &source, fix(0)).await.expect("start");
    let id = tracker.state().route_id.expect("id");

    source.push(fix(1));
    source.push(fix(2));
    settle().await;

    let route = store.inner.find_by_id(id).await.expect("find").expect("route");
    assert_eq!(route.points.len(), 3);
    assert_eq!(tracker.autosave().changes_since_last_save(), 0);
}

#[tokio::test(start_paused = true)]
async fn geolocation_error_turns_auto_save_off() {
    let source = ChannelPositionSource::new();
    let store = FlakyStore::new();
    let tracker = tracker(&source, &store, 10);
    start(&tracker, &source, fix(0)).await.expect("start");

    source.fail(GeolocationError::PositionUnavailable("no satellites".to_string()));
    settle().await;

    let state = tracker.state();
    assert!(!state.is_tracking);
    assert!(state.error.is_some());
    assert!(!tracker.autosave().is_enabled());
}

#[tokio::test(start_paused = true)]
async fn discard_abandons_the_route() {
    let source = ChannelPositionSource::new();
    let store = FlakyStore::new();
    let tracker = tracker(&source, &store, 10);
    start(&tracker, &source, fix(0)).await.expect("start");
    let id = tracker.state().route_id.expect("id");

    assert!(tracker.discard_route().await);

    let state = tracker.state();
    assert!(!state.is_tracking);
    assert!(state.points.is_empty());
    let route = store.inner.find_by_id(id).await.expect("find").expect("route");
    assert_eq!(route.status, RouteStatus::Abandoned);
}

#[tokio::test(start_paused = true)]
async fn failed_start_leaves_no_route() {
    let source = ChannelPositionSource::unsupported();
    let store = FlakyStore::new();
    let tracker = tracker(&source, &store, 10);

    assert!(matches!(
        tracker.start_tracking().await,
        Err(TrackingError::Geolocation(GeolocationError::Unsupported))
    ));
    let state = tracker.state();
    assert!(!state.is_tracking);
    assert!(state.points.is_empty());
    assert!(!tracker.autosave().is_enabled());
    assert_eq!(store.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn closing_the_dialog_keeps_the_route() {
    let source = ChannelPositionSource::new();
    let store = FlakyStore::new();
    let tracker = tracker(&source, &store, 10);
    start(&tracker, &source, fix(0)).await.expect("start");

    tracker.stop_tracking();
    tracker.close_save_dialog();

    let state = tracker.state();
    assert!(!state.show_save_dialog);
    assert_eq!(state.points.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn restart_after_stop_starts_a_new_route() {
    let source = ChannelPositionSource::new();
    let store = FlakyStore::new();
    let tracker = tracker(&source, &store, 10);
    start(&tracker, &source, fix(0)).await.expect("start");
    let first_id = tracker.state().route_id.expect("id");

    tracker.stop_tracking();
    tracker.close_save_dialog();
    start(&tracker, &source, fix(3_600)).await.expect("restart");

    let state = tracker.state();
    let second_id = state.route_id.expect("id");
    assert_ne!(second_id, first_id);
    assert_eq!(state.points, vec![fix(3_600)]);
    assert_eq!(state.stats.duration, 0);
    assert!(state.is_tracking);

    let earlier = store.inner.find_by_id(first_id).await.expect("find").expect("route");
    assert_eq!(earlier.points.len(), 1);
}
