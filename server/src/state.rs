use std::sync::Arc;

use crate::auth::JwtKeys;
use crate::config::Config;
use crate::domain::notifier::Notifier;
use crate::domain::payments::{PaymentGateway, SimulatedGateway};
use crate::realtime::Hub;
use crate::store::Store;
use crate::utils::pagination::{PageParams, PageRequest};

/// Shared by every handler; cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Store,
    pub tokens: Arc<JwtKeys>,
    pub hub: Hub,
    pub notifier: Notifier,
    pub gateway: Arc<dyn PaymentGateway>,
}

impl AppState {
    pub fn new(config: Config, store: Store) -> Self {
        let tokens = JwtKeys::new(
            &config.jwt_secret,
            config.jwt_access_ttl_minutes,
            config.jwt_refresh_ttl_days,
        );
        let hub = Hub::new();
        let notifier = Notifier::new(store.clone(), hub.clone(), config.channels.clone());
        Self {
            config: Arc::new(config),
            store,
            tokens: Arc::new(tokens),
            hub,
            notifier,
            gateway: Arc::new(SimulatedGateway),
        }
    }

    /// A page window clamped to the configured sizes.
    pub fn page(&self, params: &PageParams) -> PageRequest {
        PageRequest::resolve(
            params,
            self.config.default_page_size,
            self.config.max_page_size,
        )
    }
}
