use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::{place_from_payload, GeocodeError, ResolvedPlace, ReverseGeocoder};
use crate::config::GeocodingConfig;

/// Cache key: coordinates rounded to 5 decimals (about a metre).
type CoordKey = (i64, i64);

fn coord_key(latitude: f64, longitude: f64) -> CoordKey {
    ((latitude * 1e5).round() as i64, (longitude * 1e5).round() as i64)
}

#[derive(Debug, Clone, PartialEq)]
pub enum Provider {
    Nominatim { base_url: String },
    LocationIq { base_url: String, key: String },
}

impl Provider {
    pub fn name(&self) -> &'static str {
        match self {
            Provider::Nominatim { .. } => "nominatim",
            Provider::LocationIq { .. } => "locationiq",
        }
    }

    fn request(&self, client: &reqwest::Client, latitude: f64, longitude: f64) -> reqwest::RequestBuilder {
        let lat = format!("{latitude:.6}");
        let lon = format!("{longitude:.6}");
        match self {
            Provider::Nominatim { base_url } => client
                .get(format!("{}/reverse", base_url.trim_end_matches('/')))
                .query(&[
                    ("format", "jsonv2"),
                    ("lat", lat.as_str()),
                    ("lon", lon.as_str()),
                    ("addressdetails", "1"),
                    ("zoom", "18"),
                ]),
            Provider::LocationIq { base_url, key } => client
                .get(format!("{}/v1/reverse", base_url.trim_end_matches('/')))
                .query(&[
                    ("key", key.as_str()),
                    ("format", "json"),
                    ("lat", lat.as_str()),
                    ("lon", lon.as_str()),
                    ("addressdetails", "1"),
                ]),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawReverse {
    display_name: Option<String>,
    name: Option<String>,
    #[serde(default)]
    address: Map<String, Value>,
    error: Option<Value>,
}

/// Reverse geocoder over a provider chain with a TTL cache.
#[derive(Clone)]
pub struct GeocodingClient {
    client: reqwest::Client,
    providers: Vec<Provider>,
    cache: Arc<RwLock<HashMap<CoordKey, (Instant, ResolvedPlace)>>>,
    ttl: Duration,
}

impl GeocodingClient {
    pub fn new(providers: Vec<Provider>, user_agent: &str, timeout: Duration, ttl: Duration) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_str(user_agent)?);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;
        Ok(Self {
            client,
            providers,
            cache: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        })
    }

    pub fn from_config(cfg: &GeocodingConfig) -> anyhow::Result<Self> {
        let mut providers = vec![Provider::Nominatim {
            base_url: cfg.nominatim_url.clone(),
        }];
        if let Some(key) = cfg.locationiq_key.as_ref().filter(|k| !k.trim().is_empty()) {
            providers.push(Provider::LocationIq {
                base_url: cfg.locationiq_url.clone(),
                key: key.clone(),
            });
        }
        Self::new(
            providers,
            &cfg.user_agent,
            Duration::from_secs(cfg.timeout_secs),
            Duration::from_secs(cfg.cache_ttl_secs),
        )
    }

    pub fn providers(&self) -> &[Provider] {
        &self.providers
    }

    async fn fetch(&self, provider: &Provider, latitude: f64, longitude: f64) -> Result<ResolvedPlace, GeocodeError> {
        let name = provider.name();
        let response = provider
            .request(&self.client, latitude, longitude)
            .send()
            .await
            .map_err(|source| GeocodeError::Http { provider: name, source })?;

        let status = response.status();
        if !status.is_success() {
            return Err(GeocodeError::Status {
                provider: name,
                status: status.as_u16(),
            });
        }

        let raw: RawReverse = response
            .json()
            .await
            .map_err(|source| GeocodeError::Http { provider: name, source })?;

        if let Some(err) = raw.error {
            let message = err.as_str().map(str::to_string).unwrap_or_else(|| err.to_string());
            return Err(GeocodeError::NoResult { provider: name, message });
        }
        if raw.address.is_empty() && raw.display_name.is_none() {
            return Err(GeocodeError::NoResult {
                provider: name,
                message: "empty payload".to_string(),
            });
        }

        Ok(place_from_payload(name, raw.display_name, raw.name.as_deref(), &raw.address))
    }
}

#[async_trait]
impl ReverseGeocoder for GeocodingClient {
    async fn reverse(&self, latitude: f64, longitude: f64) -> Result<ResolvedPlace, GeocodeError> {
        let key = coord_key(latitude, longitude);
        {
            let cache = self.cache.read().await;
            if let Some((at, place)) = cache.get(&key) {
                if at.elapsed() < self.ttl {
                    return Ok(place.clone());
                }
            }
        }

        let mut last_error = GeocodeError::NoProviders;
        for provider in &self.providers {
            match self.fetch(provider, latitude, longitude).await {
                Ok(place) => {
                    debug!(provider = provider.name(), latitude, longitude, poi = ?place.poi, "reverse geocoded");
                    let mut cache = self.cache.write().await;
                    cache.retain(|_, (at, _)| at.elapsed() < self.ttl);
                    cache.insert(key, (Instant::now(), place.clone()));
                    return Ok(place);
                }
                Err(e) => {
                    warn!(provider = provider.name(), error = %e, "reverse geocoding failed, trying next provider");
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn nominatim_body() -> Value {
        json!({
            "display_name": "Naga Metropolitan Cathedral, Elias Angeles Street, Naga, Camarines Sur, 4400, Philippines",
            "name": "Naga Metropolitan Cathedral",
            "category": "amenity",
            "type": "place_of_worship",
            "address": {
                "amenity": "Naga Metropolitan Cathedral",
                "road": "Elias Angeles Street",
                "city": "Naga",
                "state": "Camarines Sur",
                "postcode": "4400"
            }
        })
    }

    fn client(providers: Vec<Provider>) -> GeocodingClient {
        GeocodingClient::new(providers, "gabaylakad-test", Duration::from_secs(5), Duration::from_secs(60)).unwrap()
    }

    #[tokio::test]
    async fn resolves_through_nominatim_and_caches() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/reverse"))
            .and(query_param("format", "jsonv2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(nominatim_body()))
            .expect(1)
            .mount(&server)
            .await;

        let geocoder = client(vec![Provider::Nominatim { base_url: server.uri() }]);
        let place = geocoder.reverse(13.62412, 123.18731).await.unwrap();
        assert_eq!(place.poi.as_deref(), Some("Naga Metropolitan Cathedral"));
        assert_eq!(place.locality.as_deref(), Some("Naga"));
        assert_eq!(place.postcode.as_deref(), Some("4400"));
        assert_eq!(place.provider, "nominatim");

        // same rounded coordinate, served from cache
        let again = geocoder.reverse(13.624121, 123.187312).await.unwrap();
        assert_eq!(again, place);
    }

    #[tokio::test]
    async fn falls_back_to_locationiq() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/reverse"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/reverse"))
            .and(query_param("key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "display_name": "Magsaysay Avenue, Naga, Camarines Sur",
                "address": { "road": "Magsaysay Avenue", "city": "Naga" }
            })))
            .mount(&server)
            .await;

        let geocoder = client(vec![
            Provider::Nominatim { base_url: server.uri() },
            Provider::LocationIq {
                base_url: server.uri(),
                key: "test-key".to_string(),
            },
        ]);
        let place = geocoder.reverse(13.63, 123.19).await.unwrap();
        assert_eq!(place.provider, "locationiq");
        assert_eq!(place.poi, None);
        assert_eq!(place.short_address(), "Magsaysay Avenue, Naga");
    }

    #[tokio::test]
    async fn error_payload_is_reported_when_chain_is_exhausted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/reverse"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "error": "Unable to geocode" })))
            .mount(&server)
            .await;

        let geocoder = client(vec![Provider::Nominatim { base_url: server.uri() }]);
        let err = geocoder.reverse(0.0, 0.0).await.unwrap_err();
        assert!(matches!(err, GeocodeError::NoResult { provider: "nominatim", ref message } if message == "Unable to geocode"));
    }

    #[test]
    fn locationiq_needs_a_key() {
        let mut cfg = GeocodingConfig::default();
        assert_eq!(GeocodingClient::from_config(&cfg).unwrap().providers().len(), 1);
        cfg.locationiq_key = Some("abc".to_string());
        assert_eq!(GeocodingClient::from_config(&cfg).unwrap().providers().len(), 2);
    }
}
