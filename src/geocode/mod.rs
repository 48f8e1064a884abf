//! Reverse geocoding and point-of-interest resolution.
//!
//! Coordinates are resolved through a chain of third-party providers
//! (Nominatim first, LocationIQ when a key is configured). Provider payloads
//! share the OSM address layout, so a single extractor picks the most
//! specific named place out of them.

pub mod client;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub use client::{GeocodingClient, Provider};

#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("{provider} request failed: {source}")]
    Http {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{provider} returned HTTP {status}")]
    Status { provider: &'static str, status: u16 },
    #[error("{provider} found nothing: {message}")]
    NoResult { provider: &'static str, message: String },
    #[error("no geocoding provider configured")]
    NoProviders,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResolvedPlace {
    pub display_name: String,
    pub poi: Option<String>,
    pub road: Option<String>,
    pub locality: Option<String>,
    pub region: Option<String>,
    pub postcode: Option<String>,
    pub provider: String,
}

impl ResolvedPlace {
    /// POI, road and locality joined; falls back to the provider's display name.
    pub fn short_address(&self) -> String {
        let parts: Vec<&str> = [&self.poi, &self.road, &self.locality]
            .into_iter()
            .filter_map(|p| p.as_deref())
            .collect();
        if parts.is_empty() {
            self.display_name.clone()
        } else {
            parts.join(", ")
        }
    }

    /// Case-insensitive locality match that ignores "City of" / "City" decorations.
    pub fn is_in_locality(&self, target: &str) -> bool {
        let target = normalize_locality(target);
        if target.is_empty() {
            return true;
        }
        self.locality
            .as_deref()
            .map(|l| normalize_locality(l) == target)
            .unwrap_or(false)
    }
}

fn normalize_locality(name: &str) -> String {
    let lower = name.trim().to_lowercase();
    let lower = lower.strip_prefix("city of ").unwrap_or(&lower);
    lower.strip_suffix(" city").unwrap_or(lower).trim().to_string()
}

#[async_trait]
pub trait ReverseGeocoder: Send + Sync {
    async fn reverse(&self, latitude: f64, longitude: f64) -> Result<ResolvedPlace, GeocodeError>;
}

/// Address keys that name a place, most specific first.
const POI_KEYS: &[&str] = &[
    "amenity",
    "shop",
    "tourism",
    "leisure",
    "healthcare",
    "office",
    "building",
    "public_building",
    "school",
    "college",
    "university",
    "hospital",
    "mall",
    "marketplace",
];

const LOCALITY_KEYS: &[&str] = &["city", "town", "municipality", "village", "suburb"];
const REGION_KEYS: &[&str] = &["state", "region", "province", "county"];

fn field<'a>(address: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    address
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn first_field(address: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| field(address, k)).map(str::to_string)
}

/// Picks the POI name: the place's own name unless it is just the road,
/// then the first named address key. `building=yes` style tags are skipped.
pub fn extract_poi(name: Option<&str>, address: &Map<String, Value>) -> Option<String> {
    let road = field(address, "road");
    if let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) {
        if road.map_or(true, |r| !r.eq_ignore_ascii_case(name)) {
            return Some(name.to_string());
        }
    }

    POI_KEYS
        .iter()
        .filter_map(|k| field(address, k))
        .find(|v| !v.eq_ignore_ascii_case("yes"))
        .map(str::to_string)
}

/// Builds a place from an OSM-style reverse payload.
pub fn place_from_payload(
    provider: &'static str,
    display_name: Option<String>,
    name: Option<&str>,
    address: &Map<String, Value>,
) -> ResolvedPlace {
    ResolvedPlace {
        display_name: display_name.unwrap_or_default(),
        poi: extract_poi(name, address),
        road: field(address, "road").map(str::to_string),
        locality: first_field(address, LOCALITY_KEYS),
        region: first_field(address, REGION_KEYS),
        postcode: field(address, "postcode").map(str::to_string),
        provider: provider.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn address(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn own_name_wins_over_address_keys() {
        let addr = address(json!({ "amenity": "Cafe", "road": "Elias Angeles St" }));
        assert_eq!(extract_poi(Some("Naga Cathedral"), &addr).as_deref(), Some("Naga Cathedral"));
    }

    #[test]
    fn name_equal_to_road_is_not_a_poi() {
        let addr = address(json!({ "road": "Panganiban Drive", "shop": "SM City Naga" }));
        assert_eq!(extract_poi(Some("Panganiban Drive"), &addr).as_deref(), Some("SM City Naga"));
    }

    #[test]
    fn generic_building_tag_is_skipped() {
        let addr = address(json!({ "building": "yes", "school": "Naga Central School" }));
        assert_eq!(extract_poi(None, &addr).as_deref(), Some("Naga Central School"));

        let bare = address(json!({ "building": "yes", "road": "Magsaysay Ave" }));
        assert_eq!(extract_poi(None, &bare), None);
    }

    #[test]
    fn locality_prefers_city_then_town() {
        let addr = address(json!({ "town": "Pili", "suburb": "San Jose", "state": "Camarines Sur" }));
        let place = place_from_payload("nominatim", None, None, &addr);
        assert_eq!(place.locality.as_deref(), Some("Pili"));
        assert_eq!(place.region.as_deref(), Some("Camarines Sur"));
        assert_eq!(place.short_address(), "Pili");
    }

    #[test]
    fn locality_match_ignores_city_decorations() {
        let place = ResolvedPlace {
            display_name: String::new(),
            poi: None,
            road: None,
            locality: Some("Naga City".to_string()),
            region: None,
            postcode: None,
            provider: "nominatim".to_string(),
        };
        assert!(place.is_in_locality("naga"));
        assert!(place.is_in_locality("City of Naga"));
        assert!(!place.is_in_locality("Legazpi"));
    }
}
