use serde::{Deserialize, Serialize};

use crate::types::route::LocationSample;

/// A route held in the local cache until the remote store confirms it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingRoute {
    pub route_id: Option<i64>,
    pub points: Vec<LocationSample>,
    pub name: String,
    /// Milliseconds since the Unix epoch.
    pub started_at: i64,
    pub needs_sync: bool,
}
