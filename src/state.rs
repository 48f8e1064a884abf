use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use crate::{
    auth::AuthKeys,
    config::Config,
    geocode::{GeocodingClient, ReverseGeocoder},
    relay::LocationRelay,
    repo::DynStore,
};

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub store: DynStore,
    pub relay: LocationRelay,
    pub auth: Arc<AuthKeys>,
    /// `None` when geocoding is disabled
    pub geocoder: Option<Arc<dyn ReverseGeocoder>>,
}

impl AppState {
    pub fn new(cfg: Config, store: DynStore) -> Result<Self> {
        let geocoder: Option<Arc<dyn ReverseGeocoder>> = if cfg.geocoding.enabled {
            let client = GeocodingClient::from_config(&cfg.geocoding)?;
            info!(providers = client.providers().len(), "reverse geocoding enabled");
            Some(Arc::new(client))
        } else {
            None
        };

        Ok(Self {
            relay: LocationRelay::new(cfg.relay.channel_capacity),
            auth: Arc::new(AuthKeys::new(&cfg.auth.jwt_secret, cfg.auth.token_ttl_minutes)),
            cfg: Arc::new(cfg),
            store,
            geocoder,
        })
    }

    pub fn with_geocoder(mut self, geocoder: Arc<dyn ReverseGeocoder>) -> Self {
        self.geocoder = Some(geocoder);
        self
    }
}
