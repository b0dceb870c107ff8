use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo;

pub const MAX_NAME_LEN: usize = 255;

/// One GPS fix as reported by the position source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationSample {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    pub accuracy: f64,
    pub altitude_accuracy: Option<f64>,
    pub heading: Option<f64>,
    pub speed: Option<f64>,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl LocationSample {
    /// A fix carrying only position and time, as produced by simple receivers.
    pub fn at(latitude: f64, longitude: f64, timestamp: i64) -> Self {
        Self {
            latitude,
            longitude,
            altitude: None,
            accuracy: 0.0,
            altitude_accuracy: None,
            heading: None,
            speed: None,
            timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteStatus {
    #[default]
    Active,
    Completed,
    Abandoned,
}

impl RouteStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, RouteStatus::Active)
    }
}

/// A persisted route as held by the remote store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub id: i64,
    pub user_id: Option<Uuid>,
    pub name: String,
    pub points: Vec<LocationSample>,
    /// Meters.
    pub total_distance: f64,
    /// Milliseconds.
    pub duration: u64,
    pub status: RouteStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Route {
    pub fn start_time(&self) -> Option<i64> {
        self.points.first().map(|p| p.timestamp)
    }
}

/// Insert payload for the remote store. Metrics are derived by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRoute {
    #[serde(default)]
    pub user_id: Option<Uuid>,
    pub name: String,
    pub points: Vec<LocationSample>,
    #[serde(default)]
    pub status: RouteStatus,
    /// Backdated creation time when syncing a route recorded offline.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Partial update. Absent fields are left untouched; when `points` is set
/// the store recomputes distance and duration from it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<Vec<LocationSample>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<RouteStatus>,
}

impl RouteUpdate {
    pub fn points(points: Vec<LocationSample>) -> Self {
        Self {
            points: Some(points),
            ..Self::default()
        }
    }

    pub fn complete(name: String, points: Vec<LocationSample>) -> Self {
        Self {
            name: Some(name),
            points: Some(points),
            status: Some(RouteStatus::Completed),
        }
    }

    pub fn abandon() -> Self {
        Self {
            status: Some(RouteStatus::Abandoned),
            ..Self::default()
        }
    }

    pub fn rename(name: String) -> Self {
        Self {
            name: Some(name),
            ..Self::default()
        }
    }
}

/// Distance and duration as stored alongside a route.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RouteMetrics {
    pub total_distance: f64,
    pub duration: u64,
}

impl RouteMetrics {
    pub fn from_points(points: &[LocationSample]) -> Self {
        Self {
            total_distance: geo::total_distance(points),
            duration: geo::duration(points),
        }
    }
}

/// Trims a user-supplied name and caps it at [`MAX_NAME_LEN`] characters.
/// Returns `None` when nothing is left.
pub fn normalize_name(name: &str) -> Option<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(MAX_NAME_LEN).collect())
}
