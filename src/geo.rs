//! Great-circle distance, route aggregates and display formatting.
//!
//! Samples are measured in the order they were recorded. Out-of-order
//! timestamps are passed through untouched: `duration` only looks at the
//! first and last sample and yields 0 when the last one is older.

use crate::types::route::LocationSample;

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Haversine distance in meters between two `(lat, lon)` pairs in degrees.
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);

    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

pub fn distance_between(a: &LocationSample, b: &LocationSample) -> f64 {
    haversine_distance(a.latitude, a.longitude, b.latitude, b.longitude)
}

/// Sum of consecutive leg distances, in meters.
pub fn total_distance(points: &[LocationSample]) -> f64 {
    points
        .windows(2)
        .map(|pair| distance_between(&pair[0], &pair[1]))
        .sum()
}

/// Milliseconds between the first and last sample.
pub fn duration(points: &[LocationSample]) -> u64 {
    match (points.first(), points.last()) {
        (Some(first), Some(last)) if points.len() >= 2 => {
            u64::try_from(last.timestamp - first.timestamp).unwrap_or(0)
        }
        _ => 0,
    }
}

/// `"850m"` below one kilometer, `"1.50km"` from there on.
pub fn format_distance(meters: f64) -> String {
    if meters < 1000.0 {
        format!("{:.0}m", meters)
    } else {
        format!("{:.2}km", meters / 1000.0)
    }
}

/// `"M:SS"` below an hour, `"H:MM:SS"` otherwise.
pub fn format_duration(milliseconds: u64) -> String {
    let total_seconds = milliseconds / 1000;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}
