//! Application State
//!
//! Shared state accessible by all API handlers.
//! Wrapped in Arc for thread-safe sharing across async tasks.

use std::sync::Arc;
use std::time::Instant;

use crate::auth::{AuthService, LogMailer, Mailer};
use crate::config::Config;
use crate::geocoding::{Geocoder, GoogleGeocoder};
use crate::matching::{HospitalSelector, Matcher};
use crate::prediction::{CompletionClient, HealthPredictor, OpenAiClient, PredictionError};
use crate::storage::Database;
use crate::websocket::{ConnectionHub, HubConfig, NotificationService};

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub config: Arc<Config>,
    pub auth: Arc<AuthService>,
    /// Delivers password-reset links
    pub mailer: Arc<dyn Mailer>,
    pub matcher: Matcher,
    pub predictor: HealthPredictor,
    pub selector: HospitalSelector,
    /// Address lookup for registrations without coordinates
    pub geocoder: Option<Arc<dyn Geocoder>>,
    pub notifier: NotificationService,
    /// WebSocket connection hub for chat and notification pushes
    pub ws_hub: Arc<ConnectionHub>,
    /// Server start time for uptime tracking
    pub start_time: Instant,
}

/// External collaborators that tests replace
pub struct Services {
    pub mailer: Arc<dyn Mailer>,
    pub completion: Option<Arc<dyn CompletionClient>>,
    pub geocoder: Option<Arc<dyn Geocoder>>,
}

impl AppState {
    pub fn new(config: Config, db: Arc<Database>, services: Services) -> Self {
        let ws_hub = Arc::new(ConnectionHub::new(HubConfig {
            max_connections: config.api.max_ws_connections,
        }));

        Self {
            auth: Arc::new(AuthService::from_config(&config.auth)),
            matcher: Matcher::new(Arc::clone(&db), config.matching.clone()),
            predictor: HealthPredictor::new(services.completion.clone()),
            selector: HospitalSelector::new(services.completion),
            geocoder: services.geocoder,
            mailer: services.mailer,
            notifier: NotificationService::new(Arc::clone(&db), Arc::clone(&ws_hub)),
            ws_hub,
            db,
            config: Arc::new(config),
            start_time: Instant::now(),
        }
    }

    /// Wire production collaborators from configuration
    pub fn from_config(config: Config, db: Arc<Database>) -> Result<Self, PredictionError> {
        let completion = OpenAiClient::from_config(&config.ai)?
            .map(|client| {
                tracing::info!(model = %client.model(), "Completion model enabled");
                Arc::new(client) as Arc<dyn CompletionClient>
            });
        if completion.is_none() {
            tracing::info!("No completion model configured, predictions use local assessment");
        }

        let geocoder = GoogleGeocoder::from_config(&config.geocoding)
            .map(|geocoder| Arc::new(geocoder) as Arc<dyn Geocoder>);

        Ok(Self::new(
            config,
            db,
            Services {
                mailer: Arc::new(LogMailer),
                completion,
                geocoder,
            },
        ))
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub async fn ws_connection_count(&self) -> usize {
        self.ws_hub.connection_count().await
    }
}
