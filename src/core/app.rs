use crate::api::{Backend, HttpBackend};
use crate::core::config::{Config, KeyCache};
use crate::core::dispatcher::ChatDispatcher;
use crate::core::settings::SettingsRegistry;
use crate::core::store::SpacesStore;
use std::sync::Arc;
use tracing::debug;

/// The services of one client session, wired to a shared backend.
pub struct App {
    pub config: Config,
    pub backend: Arc<dyn Backend>,
    pub store: Arc<SpacesStore>,
    pub settings: SettingsRegistry,
    pub dispatcher: ChatDispatcher,
}

impl App {
    /// Connect to the configured backend over HTTP.
    pub fn from_config(config: Config, key_cache: Option<KeyCache>) -> Self {
        let backend = HttpBackend::new(config.backend_url())
            .with_request_timeout(config.request_timeout());
        debug!(backend_url = %backend.base_url(), "using HTTP backend");
        Self::with_backend(config, Arc::new(backend), key_cache)
    }

    pub fn with_backend(
        config: Config,
        backend: Arc<dyn Backend>,
        key_cache: Option<KeyCache>,
    ) -> Self {
        let store = Arc::new(SpacesStore::new(Arc::clone(&backend)));
        let settings = match key_cache {
            Some(cache) => SettingsRegistry::with_key_cache(Arc::clone(&backend), cache),
            None => SettingsRegistry::new(Arc::clone(&backend)),
        };
        let dispatcher = ChatDispatcher::new(
            Arc::clone(&store),
            settings.clone(),
            Arc::clone(&backend),
        )
        .with_upload_ack_delay(config.upload_ack_delay());

        Self {
            config,
            backend,
            store,
            settings,
            dispatcher,
        }
    }

    /// Model token to use: an explicit choice, then the configured default,
    /// then the first selectable model.
    pub fn pick_model(&self, explicit: Option<&str>) -> Option<String> {
        explicit
            .or(self.config.default_model.as_deref())
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(str::to_string)
            .or_else(|| self.settings.default_model_token())
    }

    /// Drain pending backend notifications before exit.
    pub async fn shutdown(&self) {
        self.store.wait_for_background().await;
        self.settings.wait_for_background().await;
    }
}
