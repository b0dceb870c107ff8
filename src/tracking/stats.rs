use serde::{Deserialize, Serialize};

use crate::geo;
use crate::types::route::LocationSample;

/// Aggregates over a point sequence, recomputed on every read.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RouteStats {
    /// Meters.
    pub total_distance: f64,
    /// Milliseconds.
    pub duration: u64,
    pub point_count: usize,
    /// Meters per second.
    pub average_speed: f64,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
}

impl RouteStats {
    pub fn from_points(points: &[LocationSample]) -> Self {
        let total_distance = geo::total_distance(points);
        let duration = geo::duration(points);

        let duration_seconds = duration as f64 / 1000.0;
        let average_speed = if duration_seconds > 0.0 {
            total_distance / duration_seconds
        } else {
            0.0
        };

        Self {
            total_distance,
            duration,
            point_count: points.len(),
            average_speed,
            start_time: points.first().map(|p| p.timestamp),
            end_time: if points.len() > 1 {
                points.last().map(|p| p.timestamp)
            } else {
                None
            },
        }
    }

    pub fn average_speed_kmh(&self) -> f64 {
        self.average_speed * 3.6
    }

    pub fn distance_label(&self) -> String {
        geo::format_distance(self.total_distance)
    }

    pub fn duration_label(&self) -> String {
        geo::format_duration(self.duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_route_has_no_times() {
        let stats = RouteStats::from_points(&[]);
        assert_eq!(stats, RouteStats::default());
    }

    #[test]
    fn single_point_has_start_but_no_end() {
        let stats = RouteStats::from_points(&[LocationSample::at(1.0, 1.0, 7_000)]);
        assert_eq!(stats.point_count, 1);
        assert_eq!(stats.start_time, Some(7_000));
        assert_eq!(stats.end_time, None);
        assert_eq!(stats.average_speed, 0.0);
    }

    #[test]
    fn average_speed_uses_seconds() {
        let points = [
            LocationSample::at(0.0, 0.0, 0),
            LocationSample::at(0.0, 0.01, 100_000),
        ];
        let stats = RouteStats::from_points(&points);
        assert_eq!(stats.end_time, Some(100_000));
        assert!((stats.average_speed - stats.total_distance / 100.0).abs() < 1e-9);
        assert!((stats.average_speed_kmh() - stats.average_speed * 3.6).abs() < 1e-9);
        assert_eq!(stats.duration_label(), "1:40");
        assert_eq!(stats.distance_label(), "1.11km");
    }

    #[test]
    fn zero_duration_means_zero_speed() {
        let points = [LocationSample::at(0.0, 0.0, 5), LocationSample::at(0.0, 0.5, 5)];
        let stats = RouteStats::from_points(&points);
        assert!(stats.total_distance > 0.0);
        assert_eq!(stats.average_speed, 0.0);
    }
}
