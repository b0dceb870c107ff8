//! Reverse geocoding and route-name generation.

use std::future::Future;
use std::time::Duration;

use chrono::Local;
use reqwest::Client;
use serde::Deserialize;

use crate::error::GeocodeError;
use crate::types::route::{LocationSample, MAX_NAME_LEN};

pub trait ReverseGeocoder: Send + Sync + 'static {
    /// A human-readable place name for the coordinate, if one is known.
    fn reverse_geocode(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> impl Future<Output = Result<Option<String>, GeocodeError>> + Send;
}

/// Geocoder for offline use; never knows a place.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGeocoder;

impl ReverseGeocoder for NoGeocoder {
    async fn reverse_geocode(&self, _latitude: f64, _longitude: f64) -> Result<Option<String>, GeocodeError> {
        Ok(None)
    }
}

#[derive(Debug, Deserialize)]
struct ReverseResponse {
    address: Option<Address>,
}

#[derive(Debug, Default, Deserialize)]
struct Address {
    road: Option<String>,
    neighbourhood: Option<String>,
    suburb: Option<String>,
    city_district: Option<String>,
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
}

impl Address {
    fn place_name(self) -> Option<String> {
        [
            self.road,
            self.neighbourhood,
            self.suburb,
            self.city_district,
            self.city,
            self.town,
            self.village,
        ]
        .into_iter()
        .flatten()
        .map(|name| name.trim().to_string())
        .find(|name| !name.is_empty())
    }
}

/// OpenStreetMap Nominatim `/reverse` client.
#[derive(Clone)]
pub struct NominatimGeocoder {
    client: Client,
    base_url: String,
    user_agent: String,
}

impl NominatimGeocoder {
    pub fn new(base_url: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            user_agent: user_agent.into(),
        }
    }
}

impl ReverseGeocoder for NominatimGeocoder {
    async fn reverse_geocode(&self, latitude: f64, longitude: f64) -> Result<Option<String>, GeocodeError> {
        let url = format!(
            "{}/reverse?format=json&lat={}&lon={}&zoom=16",
            self.base_url, latitude, longitude
        );
        let response = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GeocodeError::Status(response.status().as_u16()));
        }

        let payload: ReverseResponse = response.json().await?;
        Ok(payload.address.and_then(Address::place_name))
    }
}

/// Builds a name for a route starting at `start`. Falls back to a
/// timestamp-only name on any geocoder failure or when `budget` runs out.
pub async fn generate_route_name<G: ReverseGeocoder>(
    geocoder: &G,
    start: &LocationSample,
    budget: Duration,
) -> String {
    let stamp = Local::now().format("%b %-d, %I:%M %p").to_string();

    let lookup = tokio::time::timeout(budget, geocoder.reverse_geocode(start.latitude, start.longitude))
        .await
        .unwrap_or(Err(GeocodeError::Timeout));

    let place = match lookup {
        Ok(place) => place,
        Err(err) => {
            tracing::warn!("Reverse geocoding failed, using fallback name: {}", err);
            None
        }
    };

    compose_name(place.as_deref(), &stamp)
}

fn compose_name(place: Option<&str>, stamp: &str) -> String {
    let name = match place {
        Some(place) => format!("{} - {}", place, stamp),
        None => format!("Route - {}", stamp),
    };
    name.chars().take(MAX_NAME_LEN).collect()
}
